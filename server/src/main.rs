use std::sync::Arc;

use anyhow::Context;
use crosswire_chats::{Hub, MemoryStore};
use crosswire_config::load as load_config;
use tokio::signal;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(env_filter)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    info!("starting Crosswire chat worker");

    let config = load_config().context("failed to load configuration")?;

    let store = Arc::new(MemoryStore::new());
    let hub = Hub::new(store);

    hub.start(&config.broker)
        .await
        .context("failed to start hub")?;

    hub.load_chats_from_store()
        .await
        .context("failed to load chat registry")?;

    if hub.get_chats().await.is_empty() {
        for name in &config.chat.seed_rooms {
            hub.add_chat(name)
                .await
                .with_context(|| format!("failed to seed room {name}"))?;
            info!(room = %name, "seeded room");
        }
    }

    info!("hub ready, waiting for events");

    shutdown_signal().await;

    if let Err(err) = hub.close().await {
        error!(error = %err, "failed to close broker connection");
    }

    info!("chat worker shut down");
    Ok(())
}

fn shutdown_signal() -> impl std::future::Future<Output = ()> {
    async {
        if let Err(error) = signal::ctrl_c().await {
            error!(?error, "failed to listen for shutdown signal");
        }
        info!("shutdown signal received");
    }
}
