//! ---
//! mfg_section: "01-core-functionality"
//! mfg_subsection: "binary"
//! mfg_type: "source"
//! mfg_scope: "code"
//! mfg_description: "Binary entrypoint for the microfactory gateway daemon."
//! mfg_version: "v0.1.0-alpha"
//! mfg_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;

use mf_api::{spawn_api_server, ApiState};
use mf_bus::{CommandSink, MqttCommandEgress, TelemetryIngestor, TelemetryProcessor};
use mf_common::config::AppConfig;
use mf_common::logging::init_tracing;
use mf_twin::TwinStore;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Microfactory edge gateway daemon",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "ADDR", help = "Override the API listen address")]
    listen: Option<SocketAddr>,

    #[arg(long, value_name = "URL", help = "Override the MQTT broker endpoint")]
    broker: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/gateway.toml"));
    candidates.push(PathBuf::from("/etc/mf-gateway/gateway.toml"));

    let loaded = AppConfig::load_with_source(&candidates)?;
    let mut config = loaded.config;
    if let Some(listen) = cli.listen {
        config.api.listen = listen;
    }
    if let Some(broker) = cli.broker {
        config.bus.broker_url = broker;
    }
    config.validate().context("invalid configuration")?;

    init_tracing("mf-gatewayd", &config.logging)?;
    match &loaded.source {
        Some(path) => info!(config_path = %path.display(), "configuration loaded"),
        None => info!("no configuration file found; using defaults"),
    }

    let twin = Arc::new(TwinStore::new());

    let egress = Arc::new(
        MqttCommandEgress::connect(&config.bus).context("failed to start command egress")?,
    );
    let commands: Arc<dyn CommandSink> = Arc::clone(&egress) as Arc<dyn CommandSink>;

    let processor = TelemetryProcessor::new(
        Arc::clone(&twin),
        Arc::clone(&commands),
        config.gateway.auto_reset_on_alarm,
    );
    let ingestor = TelemetryIngestor::spawn(
        &config.bus,
        processor,
        Duration::from_secs(config.gateway.stats_interval_secs),
    )
    .context("failed to start telemetry ingestion")?;
    info!(
        broker = %config.bus.broker_url,
        auto_reset = config.gateway.auto_reset_on_alarm,
        "telemetry ingestion started"
    );

    let api_server = if config.api.enabled {
        let state = Arc::new(ApiState::new(Arc::clone(&twin), Arc::clone(&commands)));
        let server = spawn_api_server(state, config.api.listen)
            .context("failed to start the api server")?;
        info!(address = %server.addr(), "api server started");
        Some(server)
    } else {
        info!("api server disabled by configuration");
        None
    };

    signal::ctrl_c()
        .await
        .context("failed to install ctrl-c handler")?;
    info!("shutdown signal received");

    if let Some(server) = api_server {
        server.shutdown().await?;
    }
    ingestor.shutdown().await;
    egress.shutdown().await;
    info!("gateway stopped");

    Ok(())
}
