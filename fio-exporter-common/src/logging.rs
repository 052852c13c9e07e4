//! Structured logging initialization for the exporter.
//!
//! The exporter logs every discarded line and every field that fails to
//! decode, so operators can spot a fio version drift from the log stream
//! alone. Output goes to the console and optionally to a daily-rotated file.

use anyhow::Result;
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::Subscriber;
use tracing_subscriber::{
    EnvFilter, fmt,
    fmt::writer::{BoxMakeWriter, MakeWriterExt},
    util::SubscriberInitExt,
};

const ENV_LEVEL: &str = "FIO_EXPORTER_LOG_LEVEL";
const ENV_FORMAT: &str = "FIO_EXPORTER_LOG_FORMAT";
const ENV_FILE: &str = "FIO_EXPORTER_LOG_FILE";
const ENV_TARGETS: &str = "FIO_EXPORTER_LOG_TARGETS";

/// Logging output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Multi-line human readable output.
    Pretty,
    /// One JSON object per event.
    Json,
    /// Single-line human readable output.
    #[default]
    Compact,
}

impl LogFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            "compact" => Some(Self::Compact),
            _ => None,
        }
    }
}

/// Configuration for logging initialization.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Base log level (trace, debug, info, warn, error, off).
    pub level: String,
    /// Output format.
    pub format: LogFormat,
    /// Optional file that receives a copy of every event, rotated daily.
    pub file_path: Option<PathBuf>,
    /// Per-target level overrides, e.g. `fio_exporter::runner=trace`.
    pub targets: BTreeMap<String, String>,
    /// Include source file and line in each event.
    pub with_file_line: bool,
    /// Write console logs to stderr instead of stdout.
    pub use_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            file_path: None,
            targets: BTreeMap::new(),
            with_file_line: false,
            use_stderr: false,
        }
    }
}

impl LogConfig {
    /// Build a logging configuration from `FIO_EXPORTER_LOG_*` variables.
    ///
    /// Unparseable values are ignored and the defaults kept.
    pub fn from_env(default_level: &str) -> Self {
        let mut config = Self {
            level: std::env::var(ENV_LEVEL).unwrap_or_else(|_| default_level.to_string()),
            ..Self::default()
        };

        if let Some(format) = std::env::var(ENV_FORMAT)
            .ok()
            .and_then(|value| LogFormat::parse(&value))
        {
            config.format = format;
        }

        config.file_path = std::env::var(ENV_FILE)
            .ok()
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);

        if let Ok(targets) = std::env::var(ENV_TARGETS) {
            config.targets = parse_target_overrides(&targets);
        }

        config
    }

    /// Override the base log level.
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Write console logs to stderr.
    pub fn with_stderr(mut self) -> Self {
        self.use_stderr = true;
        self
    }

    /// Build the effective filter. `RUST_LOG` wins when it parses.
    pub fn env_filter(&self) -> EnvFilter {
        if std::env::var_os("RUST_LOG").is_some() {
            if let Ok(filter) = EnvFilter::try_from_default_env() {
                return filter;
            }
        }

        let directives = std::iter::once(self.level.clone())
            .chain(
                self.targets
                    .iter()
                    .map(|(target, level)| format!("{target}={level}")),
            )
            .collect::<Vec<_>>()
            .join(",");
        EnvFilter::new(directives)
    }
}

/// Keeps the non-blocking file writer alive; drop it only at process exit.
pub struct LoggingGuards {
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Install the global tracing subscriber.
///
/// Calling this twice is not an error; the second call keeps the first
/// subscriber, which lets tests initialize logging freely.
pub fn init_logging(config: &LogConfig) -> Result<LoggingGuards> {
    let filter = config.env_filter();
    let (writer, file_guard) = build_writer(config);
    let ansi = file_guard.is_none() && config.format != LogFormat::Json;

    let builder = fmt::Subscriber::builder()
        .with_writer(writer)
        .with_target(true)
        .with_file(config.with_file_line)
        .with_line_number(config.with_file_line)
        .with_env_filter(filter)
        .with_ansi(ansi);

    match config.format {
        LogFormat::Pretty => install(builder.pretty().finish(), file_guard),
        LogFormat::Json => install(builder.json().finish(), file_guard),
        LogFormat::Compact => install(builder.compact().finish(), file_guard),
    }
}

fn build_writer(
    config: &LogConfig,
) -> (
    BoxMakeWriter,
    Option<tracing_appender::non_blocking::WorkerGuard>,
) {
    let console = if config.use_stderr {
        BoxMakeWriter::new(std::io::stderr)
    } else {
        BoxMakeWriter::new(std::io::stdout)
    };

    let Some(path) = config.file_path.as_ref() else {
        return (console, None);
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .unwrap_or_else(|| OsStr::new("fio-exporter.log"));
    let appender = tracing_appender::rolling::daily(dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
    (BoxMakeWriter::new(console.and(non_blocking)), Some(guard))
}

fn install<S>(
    subscriber: S,
    file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
) -> Result<LoggingGuards>
where
    S: Subscriber + Send + Sync + 'static,
{
    if let Err(err) = subscriber.try_init() {
        if !err.to_string().contains("already") {
            return Err(err.into());
        }
    }

    Ok(LoggingGuards {
        _file_guard: file_guard,
    })
}

fn parse_target_overrides(value: &str) -> BTreeMap<String, String> {
    value
        .split(',')
        .filter_map(|entry| entry.split_once('='))
        .filter_map(|(target, level)| {
            let target = target.trim();
            let level = level.trim().to_ascii_lowercase();
            (!target.is_empty() && is_valid_level(&level)).then(|| (target.to_string(), level))
        })
        .collect()
}

fn is_valid_level(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error" | "off")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_targets_skips_invalid_entries() {
        let targets =
            parse_target_overrides("fio_exporter::runner=debug, hyper=WARN,invalid,axum=loud,=info");
        assert_eq!(
            targets.get("fio_exporter::runner"),
            Some(&"debug".to_string())
        );
        assert_eq!(targets.get("hyper"), Some(&"warn".to_string()));
        assert!(!targets.contains_key("invalid"));
        assert!(!targets.contains_key("axum"));
        assert_eq!(targets.len(), 2);
    }

    #[test]
    fn test_env_filter_includes_overrides() {
        let mut config = LogConfig::default().with_level("warn");
        config
            .targets
            .insert("fio_exporter::scheduler".to_string(), "trace".to_string());
        let rendered = config.env_filter().to_string();
        assert!(rendered.contains("warn"));
        assert!(rendered.contains("fio_exporter::scheduler=trace"));
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse(" JSON "), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("pretty"), Some(LogFormat::Pretty));
        assert_eq!(LogFormat::parse("compact"), Some(LogFormat::Compact));
        assert_eq!(LogFormat::parse("xml"), None);
    }

    #[test]
    fn test_init_logging_twice_is_ok() {
        let config = LogConfig::default().with_stderr();
        assert!(init_logging(&config).is_ok());
        assert!(init_logging(&config).is_ok());
    }
}
