//! Adapter that speaks joblet's line-delimited JSON-RPC protocol over mutual TLS.

pub mod backend;
pub mod connection;
pub mod errors;
pub mod tls;

pub use backend::NativeBackend;
pub use connection::RpcConnection;
pub use errors::RpcError;
pub use tls::{BoxedStream, Connector, RpcStream, TlsConnector};
