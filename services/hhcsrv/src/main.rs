//! Home Heat Control polling service
//!
//! Polls the configured unit, logs every updated value and exits cleanly on Ctrl+C.

use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;

use clap::Parser;
use common::logging::{get_log_level, init_with_config, set_log_level, LogConfig};
use errors::{config_error, HeatResult};
use tracing::{error, info, warn, Level};

use hhcsrv::{EngineConfig, UpdateEvent};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "hhcsrv",
    version = env!("CARGO_PKG_VERSION"),
    about = "Home Heat Control Modbus polling service",
    long_about = None
)]
struct Args {
    /// YAML configuration file; `HHC_*` environment variables override it
    #[arg(short = 'c', long, env = "HHC_CONFIG")]
    config: Option<PathBuf>,

    /// Startup log level (trace, debug, info, warn, error); `log_level` in the
    /// configuration replaces it once loaded
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Directory for daily rolling log files
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Write the log file as JSON lines
    #[arg(long)]
    json: bool,

    /// Validation mode - only validate configuration and point table
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let level = match Level::from_str(&args.log_level) {
        Ok(level) => level,
        Err(_) => {
            eprintln!("unknown log level '{}'", args.log_level);
            return ExitCode::FAILURE;
        },
    };
    if let Err(e) = init_with_config(LogConfig {
        service_name: "hhcsrv".to_string(),
        log_dir: args.log_dir.clone(),
        level,
        enable_json: args.json,
    }) {
        eprintln!("failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("hhcsrv stopped [{}]: {}", e.error_code(), e);
            ExitCode::FAILURE
        },
    }
}

/// Switch to the filter named in the configuration, if any
fn apply_log_level(config: &EngineConfig) -> HeatResult<()> {
    if let Some(directive) = config.log_level.as_deref() {
        set_log_level(directive)
            .map_err(|e| config_error!("log_level '{}' rejected: {}", directive, e))?;
    }
    Ok(())
}

async fn run(args: Args) -> HeatResult<()> {
    let config = EngineConfig::load(args.config.as_deref())?;
    apply_log_level(&config)?;
    info!("Log filter: {}", get_log_level().unwrap_or_default());
    if args.validate {
        let registry = config.registry()?;
        info!("Configuration valid: {} points", registry.len());
        return Ok(());
    }

    let engine = config.build_engine()?;
    let reader = engine.clone();
    let handle = engine
        .subscribe(Arc::new(move |event: &UpdateEvent| match event {
            UpdateEvent::Poll { updated } => {
                for key in updated {
                    info!("{} = {}", key, reader.get_value(key));
                }
            },
            UpdateEvent::Write { key } => info!("{} written", key),
            UpdateEvent::Stale => warn!("All values invalidated"),
        }))
        .await;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    engine.unsubscribe(handle).await;
    let stats = engine.stats();
    info!(
        "Stopped after {} ticks ({} failed, {} skipped)",
        stats.ticks_total, stats.ticks_failed, stats.ticks_skipped
    );
    Ok(())
}
