use env_logger::Env;

use leetboard::app;
use leetboard::config::Config;

/// Main entry point for the dashboard server.
///
/// Reads its settings from the environment (see `config::Config`),
/// initializes logging, and runs the web application until shutdown.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = Config::from_env()?;
    app::run(config).await
}
