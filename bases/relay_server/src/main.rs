// bases/relay_server/src/main.rs
use clap::Parser;
use color_eyre::Result;

mod config;
mod error;
mod relay;
mod server;

const DEFAULT_LOG_FILTER: &str = "relay_server=info,command_dispatch=info,state_poller=info,\
                                  broadcast_hub=info,save_trigger=info,tower_http=info";

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .init();

    let args = config::CliArgs::parse();
    let config = config::Config::from_args(args)?;

    tracing::info!("Starting player relay on port {}", config.port);

    server::run(config).await?;

    Ok(())
}
