//! Structured logging setup and component-tagged log macros.

use tracing_subscriber::EnvFilter;

/// Component tags attached to log records.
pub struct Component;

impl Component {
    pub const STORE: &'static str = "store";
    pub const SERVICE: &'static str = "service";
    pub const CLI: &'static str = "cli";
    pub const IPC: &'static str = "ipc";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn parse(s: &str) -> Option<LogLevel> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// requested level; unknown level strings fall back to `info`.
pub fn init_logging(level: &str) {
    let level = LogLevel::parse(level).unwrap_or(LogLevel::Info);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[macro_export]
macro_rules! log_service_info {
    ($msg:expr $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = $crate::logging::Component::SERVICE $(, $key = $value)*, $msg)
    };
}

#[macro_export]
macro_rules! log_service_warn {
    ($msg:expr $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = $crate::logging::Component::SERVICE $(, $key = $value)*, $msg)
    };
}

#[macro_export]
macro_rules! log_service_error {
    ($msg:expr $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::error!(component = $crate::logging::Component::SERVICE $(, $key = $value)*, $msg)
    };
}

#[macro_export]
macro_rules! log_service_debug {
    ($msg:expr $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = $crate::logging::Component::SERVICE $(, $key = $value)*, $msg)
    };
}
