//! Battle - Match Host
//!
//! Usage: `battle_server [server.ron]`
//!
//! Without a transport in front of it the host plays the duel map with
//! idle players until the time limit, which is how the binary is smoke
//! tested.

use battle_core::scenario::MatchSetup;
use battle_server::{MatchHost, ServerConfig};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("Starting Battle match host");

    if let Err(e) = run().await {
        tracing::error!("Match host failed: {e}");
        std::process::exit(1);
    }
}

async fn run() -> battle_server::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => ServerConfig::load(std::path::Path::new(&path))?,
        None => ServerConfig::default(),
    };

    let mut setup = MatchSetup::duel(config.seed);
    setup.rules = config.rules()?;
    let game = setup.build()?;

    let (host, connections) = MatchHost::new(game, config)?;
    tracing::info!(players = connections.len(), "No transport attached, players stay idle");
    drop(connections);

    let (_stop, shutdown) = watch::channel(false);
    let summary = host.run(shutdown).await?;
    tracing::info!(
        "Match over at tick {} with result {:?}",
        summary.final_tick,
        summary.result
    );
    Ok(())
}
