use serde::Serialize;
use serde_json::{Value, json};
use std::fmt;
use thiserror::Error;

/// Classification shared by every backend so callers never see adapter-specific failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    ConfigError,
    ConnectionError,
    ValidationError,
    UnknownTool,
    NotFound,
    AmbiguousIdentifier,
    Conflict,
    BackendProcessError,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConfigError => "ConfigError",
            ErrorKind::ConnectionError => "ConnectionError",
            ErrorKind::ValidationError => "ValidationError",
            ErrorKind::UnknownTool => "UnknownTool",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::AmbiguousIdentifier => "AmbiguousIdentifier",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::BackendProcessError => "BackendProcessError",
            ErrorKind::InternalError => "InternalError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct CanonicalError {
    pub kind: ErrorKind,
    pub message: String,
    /// Raw backend output kept for logs; never shown to the MCP client.
    pub original_detail: Option<String>,
}

impl CanonicalError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            original_detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        if !detail.trim().is_empty() {
            self.original_detail = Some(detail);
        }
        self
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigError, message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConnectionError, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationError, message)
    }

    pub fn unknown_tool(name: &str) -> Self {
        Self::new(ErrorKind::UnknownTool, format!("unknown tool '{name}'"))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn ambiguous(prefix: &str, candidates: &[String]) -> Self {
        Self::new(
            ErrorKind::AmbiguousIdentifier,
            format!(
                "identifier '{prefix}' matches {} jobs: {}",
                candidates.len(),
                candidates.join(", ")
            ),
        )
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn backend_process(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BackendProcessError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError, message)
    }

    /// Structured payload surfaced to MCP clients alongside the text message.
    pub fn to_payload(&self) -> Value {
        json!({
            "error": {
                "kind": self.kind.as_str(),
                "message": self.message,
            }
        })
    }
}
