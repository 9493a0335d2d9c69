//! `clinicdesk serve` starts the HTTP gateway.

use anyhow::Context;
use clinicdesk_config::AppConfig;
use tracing::info;

pub async fn run(host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let mut config = AppConfig::load().context("Failed to load config")?;

    if let Some(host) = host {
        config.gateway.host = host;
    }
    if let Some(port) = port {
        config.gateway.port = port;
    }

    println!("clinicdesk gateway");
    println!("   Listening: http://{}:{}", config.gateway.host, config.gateway.port);
    println!("   Records:   {}", config.store.data_dir);
    println!("   Model:     {} ({})", config.active_model(), config.default_provider);

    info!(
        host = %config.gateway.host,
        port = config.gateway.port,
        provider = %config.default_provider,
        model = config.active_model(),
        "Starting gateway"
    );

    clinicdesk_gateway::start(config)
        .await
        .context("Gateway failed")
}
