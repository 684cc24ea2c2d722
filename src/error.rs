use thiserror::Error;

/// Runtime errors raised by the service plumbing itself (registry, configuration, I/O).
///
/// Domain operations never return this type. Each contract has its own closed
/// error enumeration next to its trait.
#[derive(Error, Debug)]
pub enum TelematicsError {
    #[error("Service not found: {name}")]
    ServiceNotFound { name: String },

    #[error("Service {name} is not registered as {expected}")]
    ServiceTypeMismatch { name: String, expected: &'static str },

    #[error("Service already registered: {name}")]
    DuplicateService { name: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid parameter: {message}")]
    InvalidParameter { message: String },

    #[error("Logger initialisation failed: {message}")]
    LoggerError { message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Lock poisoned")]
    LockPoisoned,
}

impl TelematicsError {
    pub fn config(message: impl Into<String>) -> Self {
        TelematicsError::ConfigError {
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        TelematicsError::InvalidParameter {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TelematicsError>;
