//! Unified logging module for gateway services
//!
//! Console output plus daily rolling log files. Raw device traffic is logged
//! under the [`FRAME_TARGET`] target and can be split into its own file so the
//! service log stays readable with thousands of connected devices.

use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter,
    fmt::{
        self,
        format::{FmtSpan, Writer},
        FmtContext, FormatEvent, FormatFields,
    },
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Tracing target used for hex dumps of device frames
pub const FRAME_TARGET: &str = "device_frames";

/// Environment variable overriding the log root directory
pub const LOG_DIR_ENV: &str = "DEVSRV_LOG_DIR";

/// Custom format for log level with brackets: `[INFO]`, `[WARN]`, etc.
fn format_level(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

/// Event formatter that outputs: `timestamp [LEVEL] message`
///
/// Example output: `2025-12-02T00:50:44.809000Z [INFO] 0123456789AB registered`
struct BracketedLevelFormat;

impl<S, N> FormatEvent<S, N> for BracketedLevelFormat
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
        let now = chrono::Utc::now();
        write!(writer, "{} ", now.format("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        let level = *event.metadata().level();
        if writer.has_ansi_escapes() {
            let color = match level {
                Level::TRACE => "\x1b[35m",
                Level::DEBUG => "\x1b[34m",
                Level::INFO => "\x1b[32m",
                Level::WARN => "\x1b[33m",
                Level::ERROR => "\x1b[31m",
            };
            write!(writer, "{}{}\x1b[0m ", color, format_level(&level))?;
        } else {
            write!(writer, "{} ", format_level(&level))?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

// Non-blocking writer guards must live as long as the process
static GUARDS: OnceLock<Mutex<Vec<WorkerGuard>>> = OnceLock::new();

/// Global log root directory (initialized once from config or env)
static LOG_ROOT: OnceLock<PathBuf> = OnceLock::new();

/// Initialize log root directory
///
/// Priority:
/// 1. `DEVSRV_LOG_DIR` environment variable (highest)
/// 2. `config_dir` parameter (from the configuration file)
/// 3. Default value "logs" (lowest)
pub fn init_log_root(config_dir: Option<&str>) {
    LOG_ROOT.get_or_init(|| {
        std::env::var(LOG_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                config_dir
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("logs"))
            })
    });
}

/// Get log root directory, falling back to env or "logs" if never initialized
pub fn get_log_root() -> PathBuf {
    LOG_ROOT.get().cloned().unwrap_or_else(|| {
        std::env::var(LOG_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("logs"))
    })
}

/// Logger configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Service name, used as the log file prefix
    pub service_name: String,
    /// Directory for log files
    pub log_dir: PathBuf,
    /// Console log level (ignored when RUST_LOG is set)
    pub console_level: Level,
    /// Emit JSON lines to the service log file
    pub enable_json: bool,
    /// Colored console output
    pub ansi: bool,
    /// Write device frame dumps to a separate `{service}_frames` file
    pub enable_frame_log: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".to_string(),
            log_dir: get_log_root(),
            console_level: Level::INFO,
            enable_json: false,
            ansi: true,
            enable_frame_log: true,
        }
    }
}

impl LogConfig {
    /// Filter directive used when RUST_LOG is not set
    fn default_filter(&self) -> String {
        let frames = if self.enable_frame_log {
            "debug"
        } else {
            "off"
        };
        format!(
            "{},{}={},{}={}",
            self.console_level.as_str().to_lowercase(),
            self.service_name,
            self.console_level.as_str().to_lowercase(),
            FRAME_TARGET,
            frames
        )
    }
}

fn keep_guard(guard: WorkerGuard) {
    let guards = GUARDS.get_or_init(|| Mutex::new(Vec::new()));
    match guards.lock() {
        Ok(mut guards) => guards.push(guard),
        Err(poisoned) => poisoned.into_inner().push(guard),
    }
}

/// Initialize logging system with configuration
pub fn init_with_config(config: LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    fs::create_dir_all(&config.log_dir)?;

    let env_filter = match std::env::var("RUST_LOG") {
        Ok(spec) => EnvFilter::try_new(spec)?,
        Err(_) => EnvFilter::try_new(config.default_filter())?,
    };

    let service_appender =
        tracing_appender::rolling::daily(&config.log_dir, format!("{}.log", config.service_name));
    let (service_writer, guard) = tracing_appender::non_blocking(service_appender);
    keep_guard(guard);

    let console_layer = fmt::layer()
        .with_ansi(config.ansi)
        .event_format(BracketedLevelFormat)
        .with_filter(filter::filter_fn(|metadata| {
            metadata.target() != FRAME_TARGET
        }))
        .boxed();

    let service_file_layer = if config.enable_json {
        fmt::layer()
            .json()
            .with_writer(service_writer)
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(filter::filter_fn(|metadata| {
                metadata.target() != FRAME_TARGET
            }))
            .boxed()
    } else {
        fmt::layer()
            .with_writer(service_writer)
            .with_ansi(false)
            .event_format(BracketedLevelFormat)
            .with_filter(filter::filter_fn(|metadata| {
                metadata.target() != FRAME_TARGET
            }))
            .boxed()
    };

    let frame_file_layer = if config.enable_frame_log {
        let frame_appender = tracing_appender::rolling::daily(
            &config.log_dir,
            format!("{}_frames.log", config.service_name),
        );
        let (frame_writer, frame_guard) = tracing_appender::non_blocking(frame_appender);
        keep_guard(frame_guard);

        Some(
            fmt::layer()
                .with_writer(frame_writer)
                .with_ansi(false)
                .event_format(BracketedLevelFormat)
                .with_filter(filter::filter_fn(|metadata| {
                    metadata.target() == FRAME_TARGET
                }))
                .boxed(),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(service_file_layer)
        .with(frame_file_layer)
        .try_init()?;

    tracing::info!("Logging: {} @ {:?}", config.service_name, config.log_dir);
    Ok(())
}

/// Report a fatal error through the installed subscriber, or to `fallback`
/// when logging never came up
pub fn report_failure(
    code: &str,
    message: impl std::fmt::Display,
    fallback: &mut impl std::io::Write,
) {
    if tracing::dispatcher::has_been_set() {
        tracing::error!(code, "{}", message);
    } else {
        let _ = writeln!(fallback, "[ERROR] {}: {}", code, message);
    }
}

/// Parse a level name, defaulting to INFO for anything unrecognised
pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}
