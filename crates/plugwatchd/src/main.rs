//! plugwatchd - smart-plug power telemetry exporter.
//!
//! Polls every configured device's status endpoint on its own task and serves
//! the latest readings to Prometheus in the text exposition format.

mod access_log;
mod background;
mod handlers;
mod state;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tower_http::compression::CompressionLayer;
use tracing::{Level, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use plugwatch_core::device::{DEFAULT_ENERGY_DIVISOR, HttpClient};
use plugwatch_core::metrics::MetricSet;
use plugwatch_core::poller::PollerConfig;
use plugwatch_core::registry::DeviceRegistry;

use access_log::AccessLogLayer;
use state::SharedMetrics;

// ============================================================
// CLI
// ============================================================

#[derive(Parser)]
#[command(
    name = "plugwatchd",
    about = "Smart-plug power telemetry exporter for Prometheus",
    version = plugwatch_core::VERSION
)]
struct Args {
    /// Comma-separated `name:address` device list, e.g. "kitchen:192.168.18.126".
    #[arg(long, default_value = "", env = "SHELLY_DEVICES")]
    devices: String,

    /// Listen address for the scrape endpoint.
    #[arg(long, default_value = "0.0.0.0:9100", env = "PLUGWATCH_LISTEN")]
    listen: String,

    /// Delay after each poll attempt, in milliseconds.
    #[arg(long, default_value = "1000", env = "PLUGWATCH_INTERVAL_MS")]
    interval_ms: u64,

    /// Per-request device timeout, in milliseconds.
    #[arg(long, default_value = "2000", env = "PLUGWATCH_TIMEOUT_MS")]
    timeout_ms: u64,

    /// Divisor turning the device's `aenergy.total` into watt-hours.
    #[arg(long, default_value_t = DEFAULT_ENERGY_DIVISOR, env = "PLUGWATCH_ENERGY_DIVISOR")]
    energy_divisor: f64,

    /// Also write logs to a daily-rotated file in this directory.
    #[arg(long, value_name = "DIR", env = "PLUGWATCH_LOG_DIR")]
    log_file: Option<PathBuf>,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Runtime settings derived from [`Args`] after validation.
#[derive(Debug)]
struct Settings {
    listen: SocketAddr,
    timeout: Duration,
    poller: PollerConfig,
}

impl Args {
    fn settings(&self) -> Result<Settings, String> {
        let listen: SocketAddr = self
            .listen
            .parse()
            .map_err(|e| format!("invalid listen address '{}': {}", self.listen, e))?;
        if self.interval_ms == 0 {
            return Err("interval must be greater than zero".to_string());
        }
        if self.timeout_ms == 0 {
            return Err("timeout must be greater than zero".to_string());
        }
        if !(self.energy_divisor.is_finite() && self.energy_divisor > 0.0) {
            return Err(format!(
                "energy divisor must be a positive number, got {}",
                self.energy_divisor
            ));
        }
        Ok(Settings {
            listen,
            timeout: Duration::from_millis(self.timeout_ms),
            poller: PollerConfig {
                interval: Duration::from_millis(self.interval_ms),
                energy_divisor: self.energy_divisor,
            },
        })
    }
}

// ============================================================
// Logging
// ============================================================

/// Initializes the tracing subscriber. `RUST_LOG` overrides the level flags.
/// The returned guard flushes the file writer and must live until exit.
fn init_logging(verbose: u8, quiet: bool, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("plugwatchd={level},plugwatch_core={level}"))
    });

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "plugwatchd.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    guard
}

// ============================================================
// Main
// ============================================================

fn main() {
    let args = Args::parse();

    let _log_guard = init_logging(args.verbose, args.quiet, args.log_file.as_deref());

    let settings = match args.settings() {
        Ok(s) => s,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to build tokio runtime");
            process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(async_main(&args.devices, settings)) {
        error!("{}", e);
        process::exit(1);
    }
}

async fn async_main(devices: &str, settings: Settings) -> Result<(), String> {
    info!(version = plugwatch_core::VERSION, "plugwatchd starting");

    let registry = DeviceRegistry::parse(devices);
    if registry.is_empty() {
        warn!("no devices configured, serving an empty metric set");
    } else {
        info!(devices = registry.len(), "device registry loaded");
    }

    let metrics: SharedMetrics = Arc::new(
        MetricSet::new(&registry).map_err(|e| format!("failed to create metrics: {}", e))?,
    );

    let client = Arc::new(
        HttpClient::new(settings.timeout)
            .map_err(|e| format!("failed to create device client: {}", e))?,
    );

    info!(
        interval_ms = settings.poller.interval.as_millis() as u64,
        timeout_ms = settings.timeout.as_millis() as u64,
        energy_divisor = settings.poller.energy_divisor,
        "poll settings"
    );
    let pollers =
        background::spawn_pollers(&registry, client, Arc::clone(&metrics), settings.poller);

    let app = handlers::router(metrics)
        .layer(AccessLogLayer)
        .layer(CompressionLayer::new())
        .into_make_service_with_connect_info::<SocketAddr>();

    let listener = tokio::net::TcpListener::bind(settings.listen)
        .await
        .map_err(|e| format!("failed to bind {}: {}", settings.listen, e))?;
    info!(addr = %settings.listen, pollers = pollers.len(), "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| format!("server error: {}", e))?;

    info!("shutdown complete");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("received shutdown signal");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("plugwatchd").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_match_exporter_conventions() {
        let settings = parse(&[]).settings().unwrap();
        assert_eq!(settings.listen, "0.0.0.0:9100".parse::<SocketAddr>().unwrap());
        assert_eq!(settings.timeout, Duration::from_secs(2));
        assert_eq!(settings.poller.interval, Duration::from_secs(1));
        assert_eq!(settings.poller.energy_divisor, 60.0);
    }

    #[test]
    fn rejects_invalid_settings() {
        assert!(parse(&["--listen", "nowhere"]).settings().is_err());
        assert!(parse(&["--interval-ms", "0"]).settings().is_err());
        assert!(parse(&["--timeout-ms", "0"]).settings().is_err());
        assert!(parse(&["--energy-divisor", "0"]).settings().is_err());
        assert!(parse(&["--energy-divisor", "-60"]).settings().is_err());
    }

    #[test]
    fn accepts_custom_settings() {
        let args = parse(&[
            "--devices",
            "kitchen:10.0.0.1",
            "--listen",
            "127.0.0.1:9110",
            "--interval-ms",
            "500",
            "--energy-divisor",
            "3600",
        ]);
        assert_eq!(args.devices, "kitchen:10.0.0.1");
        let settings = args.settings().unwrap();
        assert_eq!(settings.listen.port(), 9110);
        assert_eq!(settings.poller.interval, Duration::from_millis(500));
        assert_eq!(settings.poller.energy_divisor, 3600.0);
    }

    #[tokio::test]
    async fn bind_conflict_is_an_error() {
        let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let settings = Settings {
            listen: taken.local_addr().unwrap(),
            timeout: Duration::from_millis(100),
            poller: PollerConfig::default(),
        };
        let err = async_main("", settings).await.unwrap_err();
        assert!(err.starts_with("failed to bind"), "{}", err);
    }
}
