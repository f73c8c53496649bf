//! Aviation message ingester.
//!
//! Picks up bulletin files from product input directories, stores the
//! messages they contain and moves each file to its archive or fail
//! directory.

use anyhow::Result;
use clap::Parser;
use ingester::config_loader::{load_config, validate_log_settings};
use ingester::IngesterService;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ingester")]
#[command(about = "Aviation weather message file ingester")]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "INGESTER_CONFIG", default_value = "/etc/ingester/config.yaml")]
    config: PathBuf,

    /// Log level, overrides the configuration file
    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (json or pretty), overrides the configuration file
    #[arg(long, env = "LOG_FORMAT")]
    log_format: Option<String>,

    /// Process the files currently present and exit
    #[arg(long)]
    once: bool,
}

fn init_tracing(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = fmt().with_env_filter(filter).with_target(true).with_thread_ids(true);
    if format == "pretty" {
        builder.pretty().init();
    } else {
        builder.json().init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = load_config(&args.config)?;
    let level = args.log_level.clone().unwrap_or_else(|| config.logging.level.clone());
    let format = args.log_format.clone().unwrap_or_else(|| config.logging.format.clone());
    validate_log_settings(&level, &format)?;
    init_tracing(&level, &format);

    info!(
        config = %args.config.display(),
        products = config.products.len(),
        populators = config.populators.len(),
        "Starting aviation message ingester"
    );

    let service = IngesterService::from_config(&config)?;

    if args.once {
        info!("Running single processing cycle");
        let reports = service.run_once().await?;
        let archived = reports
            .iter()
            .filter(|report| report.outcome == ingestion::FileOutcome::Archived)
            .count();
        info!(
            files = reports.len(),
            archived,
            failed = reports.len() - archived,
            "Processing cycle complete"
        );
        return Ok(());
    }

    info!("Starting continuous polling");
    let drained = service.run(shutdown_signal()).await?;
    if !drained {
        anyhow::bail!("Shutdown timed out with files still in flight");
    }
    Ok(())
}
