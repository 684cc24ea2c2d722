use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{Result, TelematicsError};
use crate::types::Config;

/// Settings for the process-wide tracing subscriber and the log storage service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set
    pub filter: String,
    pub json: bool,
    /// Bytes a log storage session may hold before it stops itself
    pub storage_limit_bytes: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "libtelematics=info".to_string(),
            json: false,
            storage_limit_bytes: 1024 * 1024,
        }
    }
}

impl Config for LoggingConfig {
    fn validate(&self) -> Result<()> {
        if self.filter.trim().is_empty() {
            return Err(TelematicsError::config("logging.filter must not be empty"));
        }
        if self.storage_limit_bytes == 0 {
            return Err(TelematicsError::config(
                "logging.storage_limit_bytes must be positive",
            ));
        }
        EnvFilter::try_new(&self.filter)
            .map(|_| ())
            .map_err(|e| TelematicsError::config(format!("logging.filter: {e}")))
    }
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn init_logger(config: &LoggingConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_thread_ids(false)
                    .with_file(false)
                    .json(),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .compact(),
            )
            .try_init()
    };
    installed.map_err(|e| TelematicsError::LoggerError {
        message: e.to_string(),
    })
}
