//! `hivegate` command-line entry point.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use hivegate_runner::{CancelToken, Gateway, GatewayConfig, UdpSource};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// SmartHive LoRa gateway: forwards new sensor records as CSV lines.
#[derive(Parser, Debug)]
#[command(name = "hivegate", version, about)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Inbound address, overriding the configuration
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Log filter, e.g. "info" or "hivegate_runner=debug" (default: RUST_LOG or info)
    #[arg(long)]
    log_level: Option<String>,

    /// Validate the configuration and exit
    #[arg(long)]
    check_config: bool,
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(args: &Args) -> Result<GatewayConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => GatewayConfig::load(path)?,
        None => GatewayConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    Ok(config)
}

#[cfg(feature = "prometheus")]
fn install_metrics(config: &GatewayConfig) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(addr) = config.metrics_listen {
        hivegate_metrics::install_prometheus(addr)?;
        info!("Prometheus metrics on http://{}/metrics", addr);
    }
    Ok(())
}

#[cfg(not(feature = "prometheus"))]
fn install_metrics(config: &GatewayConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.metrics_listen.is_some() {
        tracing::warn!(
            "metrics_listen is set but hivegate was built without the prometheus feature"
        );
    }
    Ok(())
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&args)?;
    if args.check_config {
        info!("Configuration OK");
        return Ok(());
    }
    install_metrics(&config)?;

    let source = UdpSource::bind(config.listen, config.poll_timeout())?;
    info!("Listening on {}", source.local_addr()?);

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || handler_token.cancel())?;

    let mut gateway = Gateway::from_config(source, &config)?.with_cancel_token(cancel);
    gateway.run()?;
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.log_level.as_deref());

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
