//! Service logging
//!
//! Build output never goes through `tracing`; it is streamed to stdout and
//! each project's `log.txt` by [`crate::deploy::log::BuildLog`].

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::errors::DeployError;

/// Crates whose request-level chatter is capped at `warn`
const QUIET_TARGETS: &[&str] = &["hyper", "hyper_util", "reqwest", "h2", "rustls"];

/// Log level as written in `settings.json`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    #[serde(alias = "warning")]
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Filter directives for this level. HTTP plumbing stays at `warn`.
    pub fn directives(&self) -> String {
        let mut directives = self.as_str().to_string();
        if matches!(self, LogLevel::Trace | LogLevel::Debug | LogLevel::Info) {
            for target in QUIET_TARGETS {
                directives.push_str(&format!(",{}=warn", target));
            }
        }
        directives
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_lowercase()))
            .map_err(|_| format!("Invalid log level: {}", s))
    }
}

/// Logging options
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    pub log_level: LogLevel,

    /// One JSON object per line instead of the human format
    pub json_format: bool,
}

/// Install the global subscriber. `RUST_LOG` replaces the configured level.
pub fn init_logging(options: LogOptions) -> Result<(), DeployError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(options.log_level.directives()));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if options.json_format {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()
    };

    installed.map_err(|e| DeployError::ConfigError(format!("Logging already initialized: {}", e)))
}
