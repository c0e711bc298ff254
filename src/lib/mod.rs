pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use application::backend::JobBackend;
pub use application::dispatch::Dispatcher;
pub use cli::Cli;
pub use config::{BackendKind, ServerSettings};
pub use infrastructure::{native, rpc, subprocess};

use infrastructure::native::NativeBackend;
use infrastructure::subprocess::CliBackend;
use std::error::Error;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt};

pub async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    init_tracing(cli.log.as_deref());
    let settings = ServerSettings::from(&cli);
    debug!(?settings, "CLI arguments parsed");

    if cli.list_tools {
        let registry = application::dispatch::build_registry()?;
        let tools: Vec<_> = registry.specs().map(|spec| spec.to_json()).collect();
        println!("{}", serde_json::to_string_pretty(&tools)?);
        return Ok(());
    }

    info!(backend = %settings.backend, "Starting joblet MCP server");
    let backend = build_backend(&settings)?;
    let dispatcher = Arc::new(Dispatcher::new(backend)?);

    let served = rpc::serve_stdio(Arc::clone(&dispatcher)).await;
    dispatcher.shutdown().await;
    served?;
    info!("Server execution finished");
    Ok(())
}

/// Resolves the node once at startup and builds the selected adapter for it.
pub fn build_backend(settings: &ServerSettings) -> Result<Arc<dyn JobBackend>, Box<dyn Error>> {
    let document = config::load_document(&settings.config_path)?;
    let node = document.select(settings.node.as_deref(), settings.allow_insecure)?;
    info!(
        config = %settings.config_path.display(),
        node = %node.name,
        address = %node.address,
        "Resolved joblet node"
    );

    let backend: Arc<dyn JobBackend> = match settings.backend {
        BackendKind::Native => Arc::new(NativeBackend::connect_lazily(settings, document, &node)?),
        BackendKind::Cli => {
            let mut settings = settings.clone();
            settings.node = Some(node.name);
            Arc::new(CliBackend::from_settings(&settings))
        }
    };
    Ok(backend)
}

/// Logs go to stderr; stdout carries the MCP protocol.
fn init_tracing(filter: Option<&str>) {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let filter = match filter {
            Some(directives) => EnvFilter::new(directives),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        };
        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_level(true)
            .init();
    });
}
