pub mod error;
pub mod loader;
pub mod node;
pub mod settings;

/// Default rnx config location, shared with the rnx CLI itself
pub const DEFAULT_CONFIG_PATH: &str = "~/.rnx/rnx-config.yml";
pub const DEFAULT_NODE: &str = "default";

pub use error::ConfigError;
pub use loader::{ConfigDocument, ensure_env_loaded, expand_path, load_document, resolve};
pub use node::{Credentials, NodeConfig};
pub use settings::{
    BackendKind, DEFAULT_COMMAND_TIMEOUT_SECS, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_MAX_PROCESSES,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_RNX_BINARY, ServerSettings,
};
