use crate::config::{
    BackendKind, DEFAULT_COMMAND_TIMEOUT_SECS, DEFAULT_CONFIG_PATH, DEFAULT_CONNECT_TIMEOUT_SECS,
    DEFAULT_MAX_PROCESSES, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_RNX_BINARY, ServerSettings,
    expand_path,
};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "joblet-mcp",
    version,
    about = "MCP server exposing joblet job, volume, network and runtime operations as tools"
)]
pub struct Cli {
    /// Path to the rnx client configuration
    #[arg(long, env = "JOBLET_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,
    /// Node to use from the configuration (defaults to `default`)
    #[arg(long, env = "JOBLET_NODE")]
    pub node: Option<String>,
    #[arg(long, value_enum, env = "JOBLET_BACKEND", default_value_t = BackendKind::Native)]
    pub backend: BackendKind,
    /// rnx executable used by the cli backend
    #[arg(long, env = "RNX_BINARY", default_value = DEFAULT_RNX_BINARY)]
    pub rnx_binary: PathBuf,
    /// Upper bound on concurrent rnx processes
    #[arg(long, env = "JOBLET_MAX_PROCESSES", default_value_t = DEFAULT_MAX_PROCESSES)]
    pub max_processes: usize,
    /// Seconds before an rnx process is killed
    #[arg(long, env = "JOBLET_COMMAND_TIMEOUT", default_value_t = DEFAULT_COMMAND_TIMEOUT_SECS)]
    pub command_timeout: u64,
    /// Seconds to wait for a native RPC response
    #[arg(long, env = "JOBLET_REQUEST_TIMEOUT", default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    pub request_timeout: u64,
    #[arg(long, env = "JOBLET_CONNECT_TIMEOUT", default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS)]
    pub connect_timeout: u64,
    /// Accept nodes without client certificates (plain TCP)
    #[arg(long, env = "JOBLET_ALLOW_INSECURE")]
    pub allow_insecure: bool,
    /// Log filter, e.g. `info` or `joblet_mcp=debug`. Logs go to stderr.
    #[arg(long, env = "JOBLET_LOG")]
    pub log: Option<String>,
    /// Print the tool catalogue as JSON and exit
    #[arg(long)]
    pub list_tools: bool,
}

impl From<&Cli> for ServerSettings {
    fn from(cli: &Cli) -> Self {
        Self {
            backend: cli.backend,
            config_path: expand_path(&cli.config),
            node: cli
                .node
                .as_deref()
                .map(str::trim)
                .filter(|node| !node.is_empty())
                .map(str::to_string),
            rnx_binary: cli.rnx_binary.clone(),
            max_processes: cli.max_processes.max(1),
            command_timeout: Duration::from_secs(cli.command_timeout.max(1)),
            request_timeout: Duration::from_secs(cli.request_timeout.max(1)),
            connect_timeout: Duration::from_secs(cli.connect_timeout.max(1)),
            allow_insecure: cli.allow_insecure,
        }
    }
}
