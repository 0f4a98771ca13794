//! Unified logging module for Home Heat Control hosts
//!
//! Console output always, plus an optional daily rolling log file. The engine
//! crates only emit `tracing` events; installing the subscriber is the host's job.
//! The filter stays reloadable so a host can change verbosity after startup, for
//! example once its configuration file has been read.

use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use errors::{HeatError, HeatResult};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    reload,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Bracketed tag and ANSI colour for a level
fn level_style(level: Level) -> (&'static str, &'static str) {
    match level {
        Level::ERROR => ("[ERROR]", "\x1b[31m"),
        Level::WARN => ("[WARN]", "\x1b[33m"),
        Level::INFO => ("[INFO]", "\x1b[32m"),
        Level::DEBUG => ("[DEBUG]", "\x1b[34m"),
        Level::TRACE => ("[TRACE]", "\x1b[35m"),
    }
}

/// One line per event: `2025-12-02T00:50:44.809Z [INFO] hhcsrv::engine: message`
struct LineFormat {
    with_target: bool,
}

impl<S, N> FormatEvent<S, N> for LineFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();
        let (tag, colour) = level_style(*metadata.level());

        write!(writer, "{} ", chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"))?;
        if writer.has_ansi_escapes() {
            write!(writer, "{colour}{tag}\x1b[0m ")?;
        } else {
            write!(writer, "{tag} ")?;
        }
        if self.with_target {
            write!(writer, "{}: ", metadata.target())?;
        }
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

type FilterHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

/// Runtime handles of the installed subscriber
struct LogControl {
    filter: FilterHandle,
    /// Filter directive currently applied
    directive: Mutex<String>,
    /// Keeps the non-blocking file writer flushing until exit
    _file_guard: Mutex<Option<WorkerGuard>>,
}

static LOG_CONTROL: OnceLock<LogControl> = OnceLock::new();

/// Logger configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name used for the file prefix and the default crate filter
    pub service_name: String,
    /// Directory for the rolling log file; `None` logs to console only
    pub log_dir: Option<PathBuf>,
    /// Base level applied when `RUST_LOG` is not set
    pub level: Level,
    /// JSON lines in the log file instead of the bracketed format
    pub enable_json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "hhcsrv".to_string(),
            log_dir: None,
            level: Level::INFO,
            enable_json: false,
        }
    }
}

/// Filter used when `RUST_LOG` is absent: base level, engine crate one step louder.
fn default_directive(config: &LogConfig) -> String {
    let crate_level = match config.level {
        Level::ERROR => "warn",
        Level::WARN => "info",
        Level::INFO | Level::DEBUG => "debug",
        Level::TRACE => "trace",
    };
    format!(
        "{},{}={}",
        config.level.as_str().to_lowercase(),
        config.service_name,
        crate_level
    )
}

fn parse_directive(directive: &str) -> HeatResult<EnvFilter> {
    EnvFilter::try_new(directive)
        .map_err(|e| HeatError::Configuration(format!("invalid log filter '{directive}': {e}")))
}

/// Install the global subscriber.
///
/// Respects `RUST_LOG` when set. Fails if a global subscriber is already installed.
pub fn init_with_config(config: LogConfig) -> HeatResult<()> {
    let directive = std::env::var("RUST_LOG").unwrap_or_else(|_| default_directive(&config));
    let (filter, handle) = reload::Layer::new(parse_directive(&directive)?);

    let console = fmt::layer()
        .with_ansi(true)
        .event_format(LineFormat { with_target: false })
        .boxed();

    let (file, file_guard) = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender =
                tracing_appender::rolling::daily(dir, format!("{}.log", config.service_name));
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = if config.enable_json {
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_target(true)
                    .boxed()
            } else {
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .event_format(LineFormat { with_target: true })
                    .boxed()
            };
            (Some(layer), Some(guard))
        },
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| HeatError::Internal(format!("logging already initialized: {e}")))?;

    let control = LogControl {
        filter: handle,
        directive: Mutex::new(directive.clone()),
        _file_guard: Mutex::new(file_guard),
    };
    if LOG_CONTROL.set(control).is_err() {
        return Err(HeatError::Internal("logging already initialized".to_string()));
    }

    tracing::info!(
        "Logging {} at '{}' (file: {:?})",
        config.service_name,
        directive,
        config.log_dir
    );
    Ok(())
}

/// Replace the active filter.
///
/// Accepts a plain level (`"debug"`) or a full directive (`"info,hhcsrv=trace"`).
pub fn set_log_level(directive: &str) -> HeatResult<()> {
    let control = LOG_CONTROL
        .get()
        .ok_or_else(|| HeatError::Internal("logging not initialized".to_string()))?;
    control
        .filter
        .reload(parse_directive(directive)?)
        .map_err(|e| HeatError::Internal(format!("failed to reload log filter: {e}")))?;

    if let Ok(mut current) = control.directive.lock() {
        *current = directive.to_string();
    }
    tracing::info!("Log filter changed to '{}'", directive);
    Ok(())
}

/// Filter directive currently applied; `None` before initialization
pub fn get_log_level() -> Option<String> {
    let control = LOG_CONTROL.get()?;
    let current = control.directive.lock().ok()?;
    Some(current.clone())
}
