mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use taskrelay::config::Config;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // RUST_LOG wins over the older LOG_LEVEL
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(std::env::var("LOG_LEVEL").unwrap_or_default()))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Server(args) => {
            let config = match args.config {
                Some(path) => Config::load_from_path(path)?,
                None => Config::load()?,
            };
            taskrelay::api::run(config, args.address).await?
        }
    }

    Ok(())
}
