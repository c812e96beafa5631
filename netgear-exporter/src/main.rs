//! Prometheus exporter for Netgear cable modems.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

use netgear_exporter::config::LogFormat;
use netgear_exporter::{ExporterConfig, HttpServer, MetricStore, ModemPoller};

const FLAG_NOTE: &str = "Flags take two dashes: --url, --user, --pass. \
The single-dash forms -url, -user and -pass are not accepted.";

/// Prometheus exporter for Netgear cable modems.
#[derive(Parser, Debug)]
#[command(name = "netgear-exporter")]
#[command(about = "Export Netgear cable modem DOCSIS channel statistics as Prometheus metrics")]
#[command(version)]
#[command(after_help = FLAG_NOTE)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: Option<String>,

    /// Base URL of the modem web UI (overrides config).
    #[arg(long)]
    url: Option<String>,

    /// Username to log in with (overrides config).
    #[arg(long)]
    user: Option<String>,

    /// Password to log in with (overrides config).
    #[arg(long)]
    pass: Option<String>,

    /// HTTP listen address (overrides config).
    #[arg(long)]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        ExporterConfig::load_from_file(config_path)?
    } else {
        ExporterConfig::default()
    };

    // Override from CLI
    if let Some(url) = args.url {
        config.modem.url = url;
    }
    if let Some(user) = args.user {
        config.modem.username = user;
    }
    if let Some(pass) = args.pass {
        config.modem.password = pass;
    }
    if let Some(listen) = args.listen {
        config.prometheus.listen = listen;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    config.validate()?;

    // Initialize logging
    let log_level = config.logging.level.parse().unwrap_or(Level::INFO);
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("netgear_exporter={}", log_level).parse()?)
        .add_directive(format!("reqwest={}", Level::WARN).parse()?);

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }

    info!("Starting Netgear exporter");

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let store = Arc::new(MetricStore::new(
        config.prometheus.clone(),
        config.poll.evict_stale_channels,
    ));

    // Parse listen address
    let listen_addr = config
        .prometheus
        .listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;

    let poller = ModemPoller::new(config.modem.clone(), &config.poll, store.clone())?;
    let http_server = HttpServer::bind(
        store.clone(),
        poller.subscribe(),
        listen_addr,
        &config.prometheus.path,
    )
    .await?;

    // Start HTTP server; /ready reports 503 until the first cycle completes
    let http_shutdown = shutdown_rx.clone();
    let http_task = tokio::spawn(async move {
        if let Err(e) = http_server.serve(http_shutdown).await {
            error!("HTTP server error: {}", e);
        }
    });

    let poll_result = tokio::select! {
        result = poller.run(shutdown_rx.clone()) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
            Ok(())
        }
        _ = async {
            #[cfg(unix)]
            {
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        sigterm.recv().await;
                    }
                    Err(_) => std::future::pending::<()>().await,
                }
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("Received SIGTERM, shutting down...");
            Ok(())
        }
    };

    // Signal shutdown
    shutdown_tx.send(true)?;

    let _ = tokio::time::timeout(Duration::from_secs(5), http_task).await;

    let stats = store.stats();
    info!(
        scrapes = stats.scrapes,
        records_projected = stats.records_projected,
        field_errors = stats.field_errors,
        series_count = store.series_count(),
        "Final statistics"
    );

    if let Err(e) = poll_result {
        error!("Exporter terminated: {}", e);
        return Err(e.into());
    }

    info!("Exporter stopped");
    Ok(())
}
