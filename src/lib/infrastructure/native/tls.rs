use super::errors::RpcError;
use crate::config::{Credentials, NodeConfig};
use crate::domain::CanonicalError;
use async_trait::async_trait;
use rustls::{ClientConfig, RootCertStore};
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Byte stream the RPC session runs over.
pub trait RpcStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> RpcStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

pub type BoxedStream = Box<dyn RpcStream>;

/// Opens a fresh transport to the joblet service.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<BoxedStream, RpcError>;

    fn endpoint(&self) -> &str;
}

/// TCP plus mutual TLS, or plain TCP for nodes configured without credentials.
pub struct TlsConnector {
    address: String,
    server_name: ServerName<'static>,
    tls: Option<tokio_rustls::TlsConnector>,
    connect_timeout: Duration,
}

impl TlsConnector {
    pub fn for_node(node: &NodeConfig, connect_timeout: Duration) -> Result<Self, CanonicalError> {
        let server_name = ServerName::try_from(node.host().to_string()).map_err(|err| {
            CanonicalError::config(format!(
                "node '{}' has an invalid address '{}': {err}",
                node.name, node.address
            ))
        })?;
        let tls = match &node.credentials {
            Some(credentials) => Some(tokio_rustls::TlsConnector::from(Arc::new(client_config(
                &node.name,
                credentials,
            )?))),
            None => None,
        };
        Ok(Self {
            address: node.address.clone(),
            server_name,
            tls,
            connect_timeout,
        })
    }
}

#[async_trait]
impl Connector for TlsConnector {
    async fn connect(&self) -> Result<BoxedStream, RpcError> {
        let connect_error = |message: String| RpcError::Connect {
            endpoint: self.address.clone(),
            message,
        };

        let tcp = timeout(self.connect_timeout, TcpStream::connect(&self.address))
            .await
            .map_err(|_| {
                connect_error(format!(
                    "timed out after {}s",
                    self.connect_timeout.as_secs()
                ))
            })?
            .map_err(|err| connect_error(err.to_string()))?;
        let _ = tcp.set_nodelay(true);

        match &self.tls {
            Some(tls) => {
                let stream = tls
                    .connect(self.server_name.clone(), tcp)
                    .await
                    .map_err(|err| connect_error(format!("TLS handshake failed: {err}")))?;
                debug!(endpoint = %self.address, "Established mTLS session");
                Ok(Box::new(stream))
            }
            None => {
                debug!(endpoint = %self.address, "Established insecure TCP session");
                Ok(Box::new(tcp))
            }
        }
    }

    fn endpoint(&self) -> &str {
        &self.address
    }
}

fn client_config(node: &str, credentials: &Credentials) -> Result<ClientConfig, CanonicalError> {
    let invalid = |what: &str, err: &dyn std::fmt::Display| {
        CanonicalError::config(format!("node '{node}' has an invalid {what}: {err}"))
    };

    let mut roots = RootCertStore::empty();
    for cert in CertificateDer::pem_slice_iter(credentials.ca_pem.as_bytes()) {
        let cert = cert.map_err(|err| invalid("CA certificate", &err))?;
        roots
            .add(cert)
            .map_err(|err| invalid("CA certificate", &err))?;
    }
    if roots.is_empty() {
        return Err(CanonicalError::config(format!(
            "node '{node}' has no usable CA certificate"
        )));
    }

    let chain = CertificateDer::pem_slice_iter(credentials.cert_pem.as_bytes())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| invalid("client certificate", &err))?;
    if chain.is_empty() {
        return Err(CanonicalError::config(format!(
            "node '{node}' has no usable client certificate"
        )));
    }
    let key = PrivateKeyDer::from_pem_slice(credentials.key_pem.as_bytes())
        .map_err(|err| invalid("private key", &err))?;

    ClientConfig::builder()
        .with_root_certificates(roots)
        .with_client_auth_cert(chain, key)
        .map_err(|err| invalid("client certificate or key", &err))
}
