use anyhow::{anyhow, Context, Result};
use clap::Parser;
use loghive_core::{Config, ConnectionGauge, IngestionError, LogHiveError};
use loghive_ingestion::TcpIngestion;
use loghive_output::{StatusServer, StatusState};
use loghive_pipeline::Pipeline;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// loghive - per-source log collection server
#[derive(Parser, Debug)]
#[command(name = "loghive")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root directory for collected logs (overrides config)
    #[arg(long)]
    logs_dir: Option<PathBuf>,

    /// TCP ingestion port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// HTTP status port (overrides config)
    #[arg(long)]
    status_port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Print the default configuration and exit
    #[arg(long)]
    print_config: bool,
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Wait for shutdown or for either server to stop, then stop both
///
/// A server task ending on its own (bind or accept failure, panic) is an error.
async fn supervise(
    mut ingestion: JoinHandle<Result<(), IngestionError>>,
    mut status: Option<JoinHandle<Result<(), LogHiveError>>>,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let outcome = tokio::select! {
        _ = shutdown => {
            info!("Shutdown requested");
            Ok(())
        }
        result = &mut ingestion => task_outcome("TCP ingestion", result),
        result = async {
            match status.as_mut() {
                Some(task) => task.await,
                None => std::future::pending().await,
            }
        } => task_outcome("Status server", result),
    };

    ingestion.abort();
    if let Some(task) = status {
        task.abort();
    }
    outcome
}

fn task_outcome<E>(name: &str, result: Result<Result<(), E>, JoinError>) -> Result<()>
where
    E: std::error::Error + Send + Sync + 'static,
{
    match result {
        Ok(Ok(())) => Err(anyhow!("{} stopped unexpectedly", name)),
        Ok(Err(e)) => Err(anyhow::Error::new(e).context(format!("{} stopped", name))),
        Err(e) => Err(anyhow::Error::new(e).context(format!("{} task failed", name))),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --print-config
    if args.print_config {
        let config = Config::default();
        println!("{}", config.to_toml()?);
        return Ok(());
    }

    // Load configuration
    let mut config = if let Some(ref config_path) = args.config {
        Config::from_file(config_path)
            .with_context(|| format!("loading {}", config_path.display()))?
    } else {
        Config::default()
    };
    if let Some(logs_dir) = args.logs_dir {
        config.storage.logs_dir = logs_dir;
    }
    if let Some(port) = args.port {
        config.ingestion.port = port;
    }
    if let Some(port) = args.status_port {
        config.status.port = port;
    }

    // CLI --verbose flag overrides config to use DEBUG level
    let level = if args.verbose {
        Level::DEBUG
    } else {
        parse_level(&config.general.log_level)
    };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
    info!(instance = %config.general.instance_name, "Starting loghive");

    std::fs::create_dir_all(&config.storage.logs_dir).with_context(|| {
        format!("creating logs directory {}", config.storage.logs_dir.display())
    })?;

    let pipeline = Arc::new(Pipeline::from_config(&config));
    let gauge = ConnectionGauge::new();

    let ingestion = TcpIngestion::new(config.ingestion.clone(), pipeline.clone(), gauge.clone());
    let ingestion_task = tokio::spawn(ingestion.run());

    let status_task = if config.status.enabled {
        let state = Arc::new(StatusState {
            instance_name: config.general.instance_name.clone(),
            model: Arc::clone(pipeline.model()),
            registry: Arc::clone(pipeline.registry()),
            gauge: gauge.clone(),
        });
        let server = StatusServer::new(config.status.clone(), state);
        Some(tokio::spawn(async move { server.run().await }))
    } else {
        None
    };

    info!(
        ingestion = %config.ingestion.bind_addr(),
        status = config.status.enabled,
        logs_dir = %config.storage.logs_dir.display(),
        "loghive running"
    );

    let outcome = supervise(ingestion_task, status_task, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    })
    .await;

    info!(
        records = pipeline.model().total(),
        write_errors = pipeline.write_errors(),
        "loghive stopped"
    );

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("trace"), Level::TRACE);
        assert_eq!(parse_level("WARN"), Level::WARN);
        assert_eq!(parse_level("unknown"), Level::INFO);
    }

    #[test]
    fn test_args_overrides() {
        let args = Args::parse_from([
            "loghive",
            "--logs-dir",
            "/tmp/logs",
            "--port",
            "7000",
            "--status-port",
            "7001",
            "-v",
        ]);
        assert_eq!(args.logs_dir, Some(PathBuf::from("/tmp/logs")));
        assert_eq!(args.port, Some(7000));
        assert_eq!(args.status_port, Some(7001));
        assert!(args.verbose);
        assert!(!args.print_config);
    }

    #[tokio::test]
    async fn test_supervise_fails_when_status_server_stops() {
        let ingestion = tokio::spawn(std::future::pending::<Result<(), IngestionError>>());
        let status = tokio::spawn(async {
            Err::<(), _>(LogHiveError::Status("Failed to bind 0.0.0.0:9900".to_string()))
        });

        let outcome = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            supervise(ingestion, Some(status), std::future::pending()),
        )
        .await
        .unwrap();

        let message = format!("{:#}", outcome.unwrap_err());
        assert!(message.contains("Status server stopped"));
        assert!(message.contains("Failed to bind"));
    }

    #[tokio::test]
    async fn test_supervise_shutdown_without_status_server() {
        let ingestion = tokio::spawn(std::future::pending::<Result<(), IngestionError>>());
        let outcome = supervise(ingestion, None, async {}).await;
        assert!(outcome.is_ok());
    }
}
