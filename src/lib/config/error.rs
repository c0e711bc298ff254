use crate::domain::CanonicalError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when loading the rnx configuration or selecting a node
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found at {path:?}")]
    NotFound { path: PathBuf },

    #[error("failed to read config from {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config from {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("configuration at {path:?} does not define any nodes")]
    NoNodes { path: PathBuf },

    #[error("node '{node}' not found in configuration (available: {available})")]
    NodeNotFound { node: String, available: String },

    #[error("no node specified and no 'default' node is configured (available: {available})")]
    NoDefaultNode { available: String },

    #[error("node '{node}' is missing required field 'address'")]
    MissingAddress { node: String },

    #[error("node '{node}' has incomplete credentials, missing: {missing}")]
    PartialCredentials { node: String, missing: String },

    #[error("node '{node}' has no credentials and insecure connections are not allowed")]
    InsecureNotAllowed { node: String },
}

impl From<ConfigError> for CanonicalError {
    fn from(err: ConfigError) -> Self {
        CanonicalError::config(err.to_string())
    }
}
