use crate::domain::CanonicalError;
use serde_json::Value;
use thiserror::Error;

pub const NOT_FOUND_CODE: i64 = -32004;
pub const CONFLICT_CODE: i64 = -32009;
pub const INVALID_PARAMS_CODE: i64 = -32602;

/// Failures of the RPC session itself. Converted to [`CanonicalError`] before leaving the adapter.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    #[error("failed to connect to {endpoint}: {message}")]
    Connect { endpoint: String, message: String },

    #[error("connection to {endpoint} lost: {message}")]
    Transport { endpoint: String, message: String },

    #[error("{method} timed out after {seconds}s")]
    Timeout { method: String, seconds: u64 },

    #[error("failed to encode {method} request: {message}")]
    Encode { method: String, message: String },

    #[error("{message}")]
    Remote {
        code: i64,
        message: String,
        data: Option<Value>,
    },
}

impl From<RpcError> for CanonicalError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Connect { .. } | RpcError::Transport { .. } | RpcError::Timeout { .. } => {
                CanonicalError::connection(err.to_string())
            }
            RpcError::Encode { .. } => CanonicalError::internal(err.to_string()),
            RpcError::Remote {
                code,
                message,
                data,
            } => {
                let lowered = message.to_ascii_lowercase();
                let error = match code {
                    NOT_FOUND_CODE => CanonicalError::not_found(message),
                    CONFLICT_CODE => CanonicalError::conflict(message),
                    INVALID_PARAMS_CODE => CanonicalError::validation(message),
                    _ if lowered.contains("not found") => CanonicalError::not_found(message),
                    _ if lowered.contains("already exists") => CanonicalError::conflict(message),
                    _ => CanonicalError::internal(message),
                };
                match data {
                    Some(data) => error.with_detail(format!("code {code}: {data}")),
                    None => error.with_detail(format!("code {code}")),
                }
            }
        }
    }
}
