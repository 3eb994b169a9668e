/// Structured logging for the exporter.
///
/// Events go through `tracing` with a `stage` field naming the pipeline
/// step and, where relevant, the batch number. Console output is always on;
/// a log file is added when `Settings::log_file` is set. `RUST_LOG` overrides
/// the configured level.

use serde::Deserialize;
use std::fmt;
use std::path::Path;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt as fmt_layer, prelude::*};

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    #[serde(alias = "warn")]
    Warning,
    Error,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline Stages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Normalize,
    Export,
    System,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Fetch => write!(f, "FETCH"),
            Stage::Normalize => write!(f, "NORMALIZE"),
            Stage::Export => write!(f, "EXPORT"),
            Stage::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Status Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Ok,
    /// 401: the key was rejected.
    Unauthorized,
    /// Anything else; the body may still hold groups.
    Unexpected(u16),
}

impl fmt::Display for StatusClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusClass::Ok => write!(f, "OK"),
            StatusClass::Unauthorized => write!(f, "Bad server request (401 Unauthorized)"),
            StatusClass::Unexpected(code) => write!(f, "Status Code {}", code),
        }
    }
}

pub fn classify_status(status: u16) -> StatusClass {
    match status {
        200 => StatusClass::Ok,
        401 => StatusClass::Unauthorized,
        other => StatusClass::Unexpected(other),
    }
}

/// Logs the server status line for a batch at a level matching its class.
pub fn log_status(batch: u32, status: u16) {
    let class = classify_status(status);
    match class {
        StatusClass::Ok => info!(stage = %Stage::Fetch, batch = batch + 1, status, "Server request: {}", class),
        StatusClass::Unauthorized => error!(stage = %Stage::Fetch, batch = batch + 1, status, "Server request: {}", class),
        StatusClass::Unexpected(_) => warn!(stage = %Stage::Fetch, batch = batch + 1, status, "Server request: {}", class),
    }
}

// ---------------------------------------------------------------------------
// Initialization
// ---------------------------------------------------------------------------

/// Installs the global subscriber. The returned guard must be held until
/// exit so buffered file output is flushed.
pub fn init_logging(min_level: LogLevel, log_file: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(min_level.directive()));

    let console_layer = fmt_layer::layer().with_target(false).with_writer(std::io::stderr);

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let name = path.file_name().map(|n| n.to_os_string()).unwrap_or_else(|| "meetup_export.log".into());
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt_layer::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    // A subscriber may already be installed (tests, embedding); keep it.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    guard
}

// ---------------------------------------------------------------------------
// Run Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary once every page has been fetched and normalized.
pub fn log_run_summary(pages: usize, groups: usize) {
    let message = format!("Run complete: {} groups across {} batches", groups, pages);

    if groups == 0 {
        warn!(stage = %Stage::System, pages, groups, "{}", message);
    } else {
        info!(stage = %Stage::System, pages, groups, "{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warning);
        assert!(LogLevel::Warning < LogLevel::Error);
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(classify_status(200), StatusClass::Ok);
        assert_eq!(classify_status(401), StatusClass::Unauthorized);
        assert_eq!(classify_status(429), StatusClass::Unexpected(429));
        assert_eq!(classify_status(500), StatusClass::Unexpected(500));
    }

    #[test]
    fn test_status_class_messages() {
        assert_eq!(StatusClass::Ok.to_string(), "OK");
        assert_eq!(StatusClass::Unexpected(503).to_string(), "Status Code 503");
    }

    #[test]
    fn test_log_level_maps_to_filter_directive() {
        assert_eq!(LogLevel::Debug.directive(), "debug");
        assert_eq!(LogLevel::Info.directive(), "info");
        assert_eq!(LogLevel::Warning.directive(), "warn");
        assert_eq!(LogLevel::Error.directive(), "error");
    }

    #[test]
    fn test_log_level_accepts_warn_alias() {
        #[derive(Deserialize)]
        struct Wrapper {
            level: LogLevel,
        }
        let parsed: Wrapper = toml::from_str(r#"level = "warn""#).unwrap();
        assert_eq!(parsed.level, LogLevel::Warning);
    }
}
