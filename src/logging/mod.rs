//! Logging infrastructure - structured tracing for every dispatch layer
//!
//! Targets: `dispatch`, `lifecycle`, `marshal`, `harness`, `activation`.
//! Output goes to stdout, stderr or a daily-rotated file, in pretty, compact
//! or JSON form. Initialization happens at most once per process.

use crate::outcome::ResultCode;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::Level;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, human-readable
    Pretty,
    /// One line per event
    #[default]
    Compact,
    /// Structured JSON
    Json,
}

/// Log output destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
    /// Daily-rotated file `directory/prefix.YYYY-MM-DD`
    File { directory: String, prefix: String },
}

impl LogOutput {
    /// File output for a path like `logs/vtcall.log`
    pub fn file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let directory = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| ".".to_string());
        let prefix = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "vtcall.log".to_string());
        Self::File { directory, prefix }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Emit span enter/close events
    pub show_spans: bool,
    /// Extra filter directives, e.g. `"dispatch=trace,lifecycle=debug"`
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Compact,
            output: LogOutput::Stderr,
            show_spans: false,
            filter: None,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by environment variables
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Apply environment overrides on top of this configuration
    pub fn with_env(mut self) -> Self {
        // VTCALL_LOG_LEVEL: trace, debug, info, warn, error
        if let Some(level) = std::env::var("VTCALL_LOG_LEVEL")
            .ok()
            .and_then(|v| parse_level(&v))
        {
            self.level = level;
        }

        // VTCALL_LOG_FILE: path of the log file
        if let Ok(path) = std::env::var("VTCALL_LOG_FILE") {
            self.output = LogOutput::file(path);
        }

        if std::env::var("VTCALL_LOG_JSON").is_ok() {
            self.format = LogFormat::Json;
        }
        if std::env::var("VTCALL_LOG_SPANS").is_ok() {
            self.show_spans = true;
        }
        self
    }

    /// Everything, including per-call dispatch traces
    pub fn verbose() -> Self {
        Self {
            level: Level::TRACE,
            show_spans: true,
            ..Self::default()
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

/// Parse a level name, case-insensitively
pub fn parse_level(s: &str) -> Option<Level> {
    s.trim().parse().ok()
}

/// Initialize from environment variables
pub fn init() -> Option<WorkerGuard> {
    init_with_config(LogConfig::from_env())
}

/// Install the global subscriber.
///
/// Returns the writer guard; keep it alive until exit so buffered lines are
/// flushed. Later calls, or a subscriber installed elsewhere, leave the
/// existing one in place and return `None`.
pub fn init_with_config(config: LogConfig) -> Option<WorkerGuard> {
    let mut guard = None;
    LOGGER_INITIALIZED.get_or_init(|| {
        let (installed, writer_guard) = match &config.output {
            LogOutput::Stdout => {
                let (writer, g) = tracing_appender::non_blocking(std::io::stdout());
                (install(writer, &config), g)
            }
            LogOutput::Stderr => {
                let (writer, g) = tracing_appender::non_blocking(std::io::stderr());
                (install(writer, &config), g)
            }
            LogOutput::File { directory, prefix } => {
                let appender = rolling::daily(directory, prefix);
                let (writer, g) = tracing_appender::non_blocking(appender);
                (install(writer, &config), g)
            }
        };
        if installed {
            guard = Some(writer_guard);
        }
    });
    guard
}

/// Whether `init` has run in this process
pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

fn install<W>(writer: W, config: &LogConfig) -> bool
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = build_filter(config);
    let spans = span_events(config.show_spans);

    let result = match config.format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .pretty()
                    .with_span_events(spans)
                    .with_filter(filter),
            )
            .try_init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .compact()
                    .with_target(true)
                    .with_span_events(spans)
                    .with_filter(filter),
            )
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .json()
                    .with_span_events(spans)
                    .with_filter(filter),
            )
            .try_init(),
    };
    result.is_ok()
}

fn build_filter(config: &LogConfig) -> EnvFilter {
    let base = EnvFilter::from_default_env().add_directive(config.level.into());

    match &config.filter {
        Some(directives) => directives
            .split(',')
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .fold(base, |filter, directive| match directive.parse() {
                Ok(parsed) => filter.add_directive(parsed),
                Err(_) => {
                    tracing::warn!("invalid filter directive: {}", directive);
                    filter
                }
            }),
        None => base,
    }
}

fn span_events(enabled: bool) -> FmtSpan {
    if enabled {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    }
}

// ============================================================================
// Dispatch-specific events
// ============================================================================

/// A foreign method reported a failure code
pub fn log_foreign_failure(interface: &str, method: &str, code: ResultCode) {
    tracing::debug!(
        target: "dispatch",
        event = "foreign_failure",
        interface,
        method,
        %code,
        "foreign method failed"
    );
}

/// A factory call succeeded without producing an object
pub fn log_partial_success(interface: &str, method: &str, code: ResultCode) {
    tracing::info!(
        target: "dispatch",
        event = "partial_success",
        interface,
        method,
        %code,
        "call succeeded without producing an object"
    );
}

/// Session teardown started
pub fn log_teardown(objects: usize) {
    tracing::info!(
        target: "harness",
        event = "teardown",
        objects,
        "releasing session objects"
    );
}

/// Timing helpers
pub mod perf {
    use std::time::Instant;
    use tracing::debug;

    /// Guard that logs the elapsed time of an operation when dropped
    #[must_use]
    pub fn track(operation: &'static str) -> PerformanceGuard {
        PerformanceGuard {
            operation,
            start: Instant::now(),
        }
    }

    pub struct PerformanceGuard {
        operation: &'static str,
        start: Instant,
    }

    impl Drop for PerformanceGuard {
        fn drop(&mut self) {
            debug!(
                target: "harness",
                operation = self.operation,
                duration_us = self.start.elapsed().as_micros() as u64,
                "operation completed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = LogConfig::default();
        assert_eq!(config.level, Level::INFO);
        assert_eq!(config.output, LogOutput::Stderr);

        let verbose = LogConfig::verbose();
        assert_eq!(verbose.level, Level::TRACE);
        assert!(verbose.show_spans);

        let custom = LogConfig::new()
            .with_level(Level::DEBUG)
            .with_format(LogFormat::Json)
            .with_filter("dispatch=trace");
        assert_eq!(custom.format, LogFormat::Json);
        assert_eq!(custom.filter.as_deref(), Some("dispatch=trace"));
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("trace"), Some(Level::TRACE));
        assert_eq!(parse_level("WARN"), Some(Level::WARN));
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    fn test_file_output_split() {
        assert_eq!(
            LogOutput::file("logs/vtcall.log"),
            LogOutput::File {
                directory: "logs".into(),
                prefix: "vtcall.log".into()
            }
        );
        assert_eq!(
            LogOutput::file("run.log"),
            LogOutput::File {
                directory: ".".into(),
                prefix: "run.log".into()
            }
        );
    }

    #[test]
    fn test_init_idempotent() {
        let _guard = init_with_config(LogConfig::default().with_level(Level::ERROR));
        assert!(init().is_none());
        assert!(is_initialized());
    }
}
