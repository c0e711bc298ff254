use super::DEFAULT_CONFIG_PATH;
use super::loader::expand_path;
use clap::ValueEnum;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_RNX_BINARY: &str = "rnx";
pub const DEFAULT_MAX_PROCESSES: usize = 8;
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Which adapter carries tool calls to joblet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Persistent mTLS connection speaking joblet's RPC protocol
    #[default]
    Native,
    /// One `rnx` subprocess per call
    Cli,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Native => f.write_str("native"),
            BackendKind::Cli => f.write_str("cli"),
        }
    }
}

/// Process-wide settings assembled from CLI flags and environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub backend: BackendKind,
    pub config_path: PathBuf,
    pub node: Option<String>,
    pub rnx_binary: PathBuf,
    pub max_processes: usize,
    pub command_timeout: Duration,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub allow_insecure: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            config_path: expand_path(DEFAULT_CONFIG_PATH),
            node: None,
            rnx_binary: PathBuf::from(DEFAULT_RNX_BINARY),
            max_processes: DEFAULT_MAX_PROCESSES,
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            allow_insecure: false,
        }
    }
}
