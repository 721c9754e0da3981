//! healthlb - a health-aware round-robin TCP load balancer
//!
//! Usage:
//!     healthlb [--config <path>] [--port <port>] [--backend <host:port>]...
//!
//! See --help for more options.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

use healthlb::config::{load_config, validate_config, BackendConfig, Config};
use healthlb::util::init_logging;
use healthlb::LoadBalancer;

/// A health-aware round-robin TCP load balancer.
#[derive(Parser, Debug)]
#[command(name = "healthlb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file (built-in defaults when omitted)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the listening port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Replace the backend list; repeat for each backend, in order
    #[arg(short, long = "backend", value_name = "HOST:PORT")]
    backends: Vec<BackendConfig>,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path).with_context(|| {
            format!("failed to load configuration from '{}'", path.display())
        })?,
        None => Config::default(),
    };

    // CLI overrides
    if let Some(port) = cli.port {
        config.listener.port = port;
    }
    if !cli.backends.is_empty() {
        config.backends = cli.backends.clone();
    }
    if let Some(level) = &cli.log_level {
        config.global.log_level = level.clone();
    }
    validate_config(&config)
        .map_err(anyhow::Error::msg)
        .context("invalid configuration")?;

    init_logging(&config.global.log_level, &config.global.log_format);

    if cli.validate {
        info!("Configuration is valid");
        println!("Configuration is valid.");
        println!("  Listen: {}", config.listener.socket_addr());
        println!(
            "  Health check: every {} (timeout {})",
            humantime::format_duration(config.health_check.interval),
            humantime::format_duration(config.health_check.timeout)
        );
        println!("  Backends: {}", config.backends.len());
        for (index, backend) in config.backends.iter().enumerate() {
            println!("    [{}] {}", index, backend);
        }
        return Ok(());
    }

    info!(
        config_path = ?cli.config,
        listen = %config.listener.socket_addr(),
        backends = config.backends.len(),
        "healthlb starting"
    );

    for (index, backend) in config.backends.iter().enumerate() {
        info!(index, backend = %backend, "configured backend");
    }

    run(config)
}

/// Run the load balancer with the given configuration.
fn run(config: Config) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    runtime.block_on(run_async(config))
}

/// Async entry point for the load balancer.
async fn run_async(config: Config) -> Result<()> {
    let listen = config.listener.socket_addr();

    let balancer = LoadBalancer::start(config)
        .await
        .with_context(|| format!("failed to bind listener on {}", listen))?;

    info!("press Ctrl+C to stop");

    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("received shutdown signal");
        }
        Err(e) => {
            error!(error = %e, "failed to listen for shutdown signal");
        }
    }

    balancer.shutdown().await;
    Ok(())
}
