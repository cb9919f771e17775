//! Logging setup for applications embedding the client
//!
//! The library itself only emits `tracing` events. Applications that do not
//! install their own subscriber can call [`setup_logging`]; it is safe to call
//! more than once (later calls are no-ops).

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

use crate::errors::{ClientError, ClientResult};

/// Configuration for the logging system
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// The log level to use
    pub level: Level,
    /// Whether to enable JSON formatting
    pub json: bool,
    /// Whether to include file and line information
    pub file_info: bool,
    /// Whether to log span open/close
    pub log_spans: bool,
    /// Application name logged at startup
    pub app_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: Level::INFO,
            json: false,
            file_info: false,
            log_spans: false,
            app_name: "verto".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn new(level: Level, app_name: impl Into<String>) -> Self {
        LoggingConfig {
            level,
            app_name: app_name.into(),
            ..Default::default()
        }
    }

    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }

    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }

    pub fn with_spans(mut self) -> Self {
        self.log_spans = true;
        self
    }
}

/// Install a global `tracing` subscriber.
///
/// `RUST_LOG` directives are honored on top of the configured level. Returns
/// `false` when a subscriber was already installed.
pub fn setup_logging(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::from_default_env().add_directive(config.level.into());

    let span_events = if config.log_spans {
        FmtSpan::ACTIVE
    } else {
        FmtSpan::NONE
    };

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_span_events(span_events)
        .with_file(config.file_info)
        .with_line_number(config.file_info);

    let installed = if config.json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    };

    if installed {
        tracing::info!("Starting {} v{}", config.app_name, env!("CARGO_PKG_VERSION"));
    }
    installed
}

/// Parse a log level from a string
pub fn parse_log_level(level: &str) -> ClientResult<Level> {
    Level::from_str(level)
        .map_err(|_| ClientError::Configuration(format!("Invalid log level: {}", level)))
}
