//! Arcade Bridge Server
//!
//! Runs the event bridge and room services behind the WebSocket gateway.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use arcade_bridge::{network::GatewayServer, Bridge, BridgeConfig, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber).context("failed to set tracing subscriber")?;

    info!("Arcade Bridge v{}", VERSION);

    let config = BridgeConfig::from_env().context("invalid configuration")?;
    if !config.auth.is_configured() {
        error!("No AUTH_SECRET or AUTH_PUBLIC_KEY_PEM set; every client will fail to authenticate");
    }
    info!(
        bind = %config.gateway.bind_addr,
        rate_limit = config.rate_limit.enabled,
        per_minute = config.rate_limit.per_minute,
        per_hour = config.rate_limit.per_hour,
        "Configuration loaded"
    );

    let bridge = Bridge::new(&config);
    let gateway = Arc::new(GatewayServer::new(config.gateway.clone(), config.auth.clone(), bridge.clone()));

    let shutdown = gateway.shutdown_handle();
    let cleanup = bridge.spawn_cleanup(shutdown.subscribe());

    let signal_gateway = Arc::clone(&gateway);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, shutting down");
                signal_gateway.shutdown();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    gateway.run().await.context("gateway failed")?;

    let _ = cleanup.await;

    info!("Arcade Bridge stopped");
    Ok(())
}
