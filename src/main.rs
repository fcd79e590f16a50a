//! nrf2mqtt - gateway entry point
//!
//! Brings up the radio (fatal on failure), connects to MQTT, and runs until
//! SIGINT or SIGTERM.

use clap::{Parser, Subcommand};
use nrf2mqtt::config::{ConfigOverrides, GatewayConfig, RadioDriver};
use nrf2mqtt::error::{redact_credentials, GatewayError, GatewayResult};
use nrf2mqtt::observability::{init_default_logging, metrics, HealthServer};
use nrf2mqtt::radio::{LoopbackRadio, RadioLink, WirelessTransport};
use nrf2mqtt::transport::MqttTransport;
use nrf2mqtt::{Broker, Gateway};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn, Instrument};

/// Bidirectional nRF24 mesh to MQTT gateway
#[derive(Parser)]
#[command(name = "nrf2mqtt")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Radio chip-enable pin
    #[arg(long, env = "NRF_CE_PIN")]
    ce_pin: Option<u16>,

    /// Radio chip-select pin
    #[arg(long, env = "NRF_CSN_PIN")]
    csn_pin: Option<u16>,

    /// MQTT broker, as a URL or host[:port]
    #[arg(long, env = "MQTT_BROKER")]
    broker: Option<String>,

    /// Gateway node name, used as the MQTT client id
    #[arg(long)]
    node_name: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway (default)
    Run,
    /// Validate configuration
    Config {
        /// Print the effective configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting nrf2mqtt v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e.redacted());
            process::exit(1);
        }
    };

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Gateway failed: {}", e.redacted());
        process::exit(1);
    }

    info!("Gateway shutdown complete");
}

fn load_configuration(cli: &Cli) -> GatewayResult<GatewayConfig> {
    let mut config = match &cli.config {
        Some(path) => load_file(path)?,
        None => {
            let default_paths = ["nrf2mqtt.toml", "config/nrf2mqtt.toml"];
            match default_paths.iter().map(Path::new).find(|p| p.exists()) {
                Some(path) => load_file(path)?,
                None => {
                    info!("No configuration file found, using defaults and command-line flags");
                    GatewayConfig::default()
                }
            }
        }
    };

    config.apply_overrides(&ConfigOverrides {
        ce_pin: cli.ce_pin,
        csn_pin: cli.csn_pin,
        broker_url: cli.broker.clone(),
        node_name: cli.node_name.clone(),
    });
    config.validate()?;
    Ok(config)
}

fn load_file(path: &Path) -> GatewayResult<GatewayConfig> {
    info!("Loading configuration from: {}", path.display());
    Ok(GatewayConfig::load_from_file(path)?)
}

fn handle_config_command(config: &GatewayConfig, show: bool) -> GatewayResult<()> {
    if show {
        println!("{}", redact_credentials(&config.to_toml()?));
    }
    info!("Configuration validation complete");
    Ok(())
}

async fn run(config: GatewayConfig) -> GatewayResult<()> {
    match config.radio.driver {
        #[cfg(feature = "serial")]
        RadioDriver::Serial => {
            let link = nrf2mqtt::radio::SerialRadio::new(config.radio.serial_settings());
            run_gateway(config, link).await
        }
        #[cfg(not(feature = "serial"))]
        RadioDriver::Serial => Err(GatewayError::internal(
            "serial radio support was not compiled in; rebuild with --features serial",
        )),
        RadioDriver::Loopback => {
            warn!("Using the loopback radio, no frames will reach real hardware");
            run_gateway(config, LoopbackRadio::new()).await
        }
    }
}

async fn run_gateway<L: RadioLink + 'static>(config: GatewayConfig, link: L) -> GatewayResult<()> {
    let span = nrf2mqtt::gateway_span!("run", node = %config.gateway.node_name);
    async move {
        let collector = metrics();
        collector.set_gateway_state("initializing");

        let broker = Arc::new(Broker::new(config.protocol.separator));
        let mut radio = WirelessTransport::new(link, config.radio.wireless_config());
        let mut mqtt = MqttTransport::new(&config.gateway.node_name, &config.mqtt)?;

        let gateway = Gateway::new(
            broker.clone(),
            Arc::new(radio.handle()),
            Arc::new(mqtt.handle()),
            mqtt.topics().clone(),
        );

        let on_frame = gateway.clone();
        radio.set_on_receive(move |addr, frame| on_frame.on_radio_frame(addr, &frame));
        let on_lost = gateway.clone();
        radio.set_on_disconnect(move |addr| on_lost.on_disconnect(addr));
        let on_message = gateway.clone();
        mqtt.set_on_message(move |addr, action, payload| {
            on_message.on_mqtt_message(addr, action, payload)
        });

        // A radio that does not come up is fatal
        radio.start()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let health_server = config.health.as_ref().map(|health| {
            let server = Arc::new(HealthServer::new(
                config.gateway.node_name.clone(),
                health.port,
                broker.clone(),
            ));
            server.set_radio_running(true);
            spawn_health_server(server.clone(), shutdown_rx.clone());
            server
        });

        info!(broker = %redact_credentials(&config.mqtt.broker_url), "Connecting to MQTT");
        if let Err(e) = mqtt.connect().await {
            warn!("MQTT not connected yet, retrying in the background: {}", e);
        }

        collector.set_gateway_state("running");
        info!("Gateway running");

        wait_for_shutdown().await?;

        collector.set_gateway_state("stopping");
        let _ = shutdown_tx.send(true);
        if let Err(e) = mqtt.disconnect().await {
            warn!("Error during MQTT disconnect: {}", e);
        }
        radio.stop();
        if let Some(server) = health_server {
            server.set_radio_running(false);
        }

        collector.set_gateway_state("stopped");
        Ok::<(), GatewayError>(())
    }
    .instrument(span)
    .await
}

fn spawn_health_server(server: Arc<HealthServer>, mut shutdown_rx: watch::Receiver<bool>) {
    tokio::spawn(async move {
        let shutdown = async move {
            let _ = shutdown_rx.wait_for(|stop| *stop).await;
        };
        if let Err(e) = server.start(shutdown).await {
            error!("Health server error: {}", e);
        }
    });
}

async fn wait_for_shutdown() -> GatewayResult<()> {
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .map_err(|e| GatewayError::internal(format!("Cannot install SIGINT handler: {e}")))?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .map_err(|e| GatewayError::internal(format!("Cannot install SIGTERM handler: {e}")))?;

    tokio::select! {
        _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully..."),
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
    }
    Ok(())
}
