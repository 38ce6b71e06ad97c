//! Binary entry point for the relay.

use clap::Parser;
use relaycast::{Config, RelayState};

/// Bridges a Twitch chat channel to local overlay clients over WebSocket.
#[derive(Parser, Debug)]
#[command(name = "relaycast", version, about)]
struct Args {
    /// Port for the local WebSocket endpoint.
    #[arg(short, long, env = "RELAY_PORT", default_value_t = relaycast::gateway::DEFAULT_PORT)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;

    let state = RelayState::new(config);
    relaycast::serve(state, args.port).await?;
    Ok(())
}
