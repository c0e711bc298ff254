use clap::Parser;
use joblet_mcp::{Cli, config, run};
use std::error::Error;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    config::ensure_env_loaded();
    let cli = Cli::parse();
    run(cli).await
}
