use std::fmt;

/// PEM material for mutual TLS. All three parts are present or the node has none at all.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub cert_pem: String,
    pub key_pem: String,
    pub ca_pem: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("cert_pem", &format_args!("<{} bytes>", self.cert_pem.len()))
            .field("key_pem", &"<redacted>")
            .field("ca_pem", &format_args!("<{} bytes>", self.ca_pem.len()))
            .finish()
    }
}

/// Connection settings for one joblet node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub name: String,
    pub address: String,
    pub credentials: Option<Credentials>,
}

impl NodeConfig {
    pub fn is_insecure(&self) -> bool {
        self.credentials.is_none()
    }

    /// Host part of `address`, without port or IPv6 brackets.
    pub fn host(&self) -> &str {
        let address = self.address.as_str();
        if let Some(rest) = address.strip_prefix('[') {
            return rest.split(']').next().unwrap_or(rest);
        }
        match address.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') && port.parse::<u16>().is_ok() => host,
            _ => address,
        }
    }
}
