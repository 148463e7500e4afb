//! `read-streams`: runs every configured alert stream until interrupted.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod config;

use std::path::PathBuf;
use std::process::ExitCode;

use alertstreams_broker_memory::MemoryBrokerFactory;
use alertstreams_broker_nats::NatsBrokerFactory;
use alertstreams_handlers::register_builtin_handlers;
use alertstreams_registry::{BrokerRegistry, ConfigurationError, build};
use alertstreams_stream::HandlerRegistry;
use alertstreams_supervisor::{Supervisor, WorkerOutcome};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// CLI-specific error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Stream configuration problems
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Handler registration error
    #[error(transparent)]
    Handlers(#[from] alertstreams_stream::Error),

    /// No active stream in the configuration
    #[error("no active streams configured")]
    NoStreams,

    /// Configuration file is not valid
    #[error("invalid configuration file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Configuration file could not be read
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// File path
        path: PathBuf,
        /// IO error
        source: std::io::Error,
    },

    /// Broker kind registration error
    #[error(transparent)]
    Registry(#[from] alertstreams_registry::Error),

    /// Supervisor settings are unusable
    #[error("invalid supervisor settings: {0}")]
    Supervisor(String),

    /// Supervisor error
    #[error(transparent)]
    Run(#[from] alertstreams_supervisor::Error),
}

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the stream configuration file (TOML)
    #[arg(long, short, env = "ALERTSTREAMS_CONFIG")]
    config: PathBuf,

    /// Validate the configuration and exit without connecting
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("read-streams: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<ExitCode, Error> {
    let config = Config::load(&args.config)?;

    let mut handlers = HandlerRegistry::new();
    register_builtin_handlers(&mut handlers)?;

    let streams = build(&config.streams, &handlers, &broker_registry()?)?;
    if streams.is_empty() {
        return Err(Error::NoStreams);
    }

    if args.check {
        info!(streams = streams.len(), "configuration is valid");
        return Ok(ExitCode::SUCCESS);
    }

    let supervisor = Supervisor::new(config.supervisor.policy());
    spawn_signal_handler(supervisor.shutdown_token());

    let reports = supervisor.run(streams).await?;

    for report in &reports {
        match &report.outcome {
            WorkerOutcome::Cancelled => {}
            WorkerOutcome::Fatal(e) => error!(stream_id = %report.stream_id, error = %e, "stream failed"),
            WorkerOutcome::Panicked(e) => {
                error!(stream_id = %report.stream_id, error = %e, "stream worker panicked");
            }
        }
    }

    if reports.iter().all(|report| report.is_failure()) {
        error!("every stream failed");
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn broker_registry() -> Result<BrokerRegistry, Error> {
    let mut brokers = BrokerRegistry::new();
    brokers
        .register(MemoryBrokerFactory::default())?
        .register(NatsBrokerFactory)?;

    #[cfg(feature = "kafka")]
    brokers
        .register(alertstreams_broker_kafka::KafkaBrokerFactory)?
        .register(alertstreams_broker_kafka::HopskotchBrokerFactory)?
        .register(alertstreams_broker_kafka::GcnBrokerFactory)?;

    Ok(brokers)
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutting down");
        shutdown.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM"),
                _ = sigint.recv() => info!("Received SIGINT"),
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "failed to install signal handlers, waiting for ctrl-c");
            let _ = tokio::signal::ctrl_c().await;
            info!("Received interrupt signal");
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Received interrupt signal");
}
