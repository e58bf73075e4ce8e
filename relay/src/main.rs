use chrono::Utc;
use clap::{Args, Parser};
use config::{Config, ConfigError, LoggingConfig, MetricsConfig};
use metrics_exporter_statsd::StatsdBuilder;
use order_relay::batch;
use order_relay::errors::OrderRelayError;
use order_relay::metrics_defs::ALL_METRICS;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

mod config;

#[derive(Parser)]
enum CliCommand {
    /// Serve the order webhook and the admin endpoints
    Serve(ConfigArgs),
    /// Copy the provider's product catalog into the storefront
    ImportProducts(ConfigArgs),
    /// Recreate today's provider orders on the storefront
    FetchOrders(ConfigArgs),
}

#[derive(Args)]
struct ConfigArgs {
    #[arg(long, default_value = "relay.yaml")]
    config: PathBuf,
}

impl CliCommand {
    fn config_path(&self) -> &PathBuf {
        match self {
            CliCommand::Serve(args)
            | CliCommand::ImportProducts(args)
            | CliCommand::FetchOrders(args) => &args.config,
        }
    }
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Relay(#[from] OrderRelayError),
    #[error("could not start runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("could not set up metrics: {0}")]
    Metrics(String),
    #[error("could not reach the storefront")]
    StorefrontUnavailable,
    #[error("{failed} of {attempted} items failed")]
    BatchFailed { attempted: usize, failed: usize },
}

fn main() -> ExitCode {
    let cli = CliCommand::parse();

    let mut config = match Config::from_file(cli.config_path()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    config.overlay_env();

    let _sentry = init_logging(&config.logging);

    match run(cli, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Exiting");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: CliCommand, config: Config) -> Result<(), CliError> {
    if let Some(metrics) = &config.metrics {
        init_metrics(metrics)?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(dispatch(cli, config))
}

async fn dispatch(cli: CliCommand, config: Config) -> Result<(), CliError> {
    match cli {
        CliCommand::Serve(_) => {
            tracing::info!(
                host = %config.relay.listener.host,
                port = config.relay.listener.port,
                "Starting order relay"
            );
            order_relay::run(config.relay).await?;
            Ok(())
        }
        CliCommand::ImportProducts(_) => {
            let (fulfillment, storefront) =
                order_relay::upstream_clients(&config.relay, order_relay::http_client()?)?;
            if !batch::check_connection(&storefront).await {
                return Err(CliError::StorefrontUnavailable);
            }
            let summary = batch::import_products(&fulfillment, &storefront).await;
            check_summary(summary)
        }
        CliCommand::FetchOrders(_) => {
            let (fulfillment, storefront) =
                order_relay::upstream_clients(&config.relay, order_relay::http_client()?)?;
            if !batch::check_connection(&storefront).await {
                return Err(CliError::StorefrontUnavailable);
            }
            let (from, to) = batch::today_window(Utc::now());
            let summary = batch::fetch_orders(
                &fulfillment,
                &storefront,
                config.relay.batch.variant_id,
                from,
                to,
            )
            .await;
            check_summary(summary)
        }
    }
}

fn check_summary(summary: batch::BatchSummary) -> Result<(), CliError> {
    if summary.failed > 0 {
        return Err(CliError::BatchFailed {
            attempted: summary.attempted,
            failed: summary.failed,
        });
    }
    Ok(())
}

/// Installs the tracing subscriber, forwarding to Sentry when a DSN is set.
/// The returned guard flushes Sentry on drop.
fn init_logging(logging: &LoggingConfig) -> Option<sentry::ClientInitGuard> {
    let guard = logging.sentry_dsn.as_deref().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    let level = logging.level.as_deref().unwrap_or("info");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(guard.as_ref().map(|_| sentry::integrations::tracing::layer()))
        .init();

    guard
}

fn init_metrics(metrics: &MetricsConfig) -> Result<(), CliError> {
    let recorder = StatsdBuilder::from(metrics.statsd_host.clone(), metrics.statsd_port)
        .build(Some(metrics.prefix.as_str()))
        .map_err(|e| CliError::Metrics(e.to_string()))?;
    metrics::set_global_recorder(recorder)
        .map_err(|_| CliError::Metrics("a recorder is already installed".to_string()))?;
    shared::metrics_defs::describe_all(ALL_METRICS);

    Ok(())
}
