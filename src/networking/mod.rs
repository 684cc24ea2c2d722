//! Networking domain contracts: unit identity and on-board log storage.

pub mod log_storage;
pub mod tcu_info;

pub use log_storage::{LogLevel, LogRecord, LogStorage, LogType, LoggingError, LoggingService};
pub use tcu_info::{EngineType, TcuInfo, TcuInfoConfig, TcuInfoError, TcuInfoService};
