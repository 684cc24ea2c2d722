use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::event::Event;
use crate::logging::LoggingConfig;
use crate::types::{Service, Timestamp};

pub const LOGGING_SERVICE_NAME: &str = "stla.networking.logging.service.base";

/// Longest application or context identifier accepted in a filter
pub const MAX_LOG_ID_LEN: usize = 4;

const RECORD_OVERHEAD_BYTES: usize = 16;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingError {
    #[error("log storage operation failed")]
    Error = 1,
}

/// Record priority, most severe first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Fatal = 1,
    Critical = 2,
    Error = 3,
    Warning = 4,
    Notice = 5,
    Information = 6,
    Debug = 7,
    Trace = 8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogType {
    /// Full TCU trace
    #[default]
    Tcu = 0,
    /// Modem processor only
    Nad = 1,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: Timestamp,
    pub source: LogType,
    pub app_id: String,
    pub ctx_id: String,
    pub level: LogLevel,
    pub message: String,
}

impl LogRecord {
    fn stored_len(&self) -> usize {
        RECORD_OVERHEAD_BYTES + self.app_id.len() + self.ctx_id.len() + self.message.len()
    }
}

/// Content of the last finished storage session for one log type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredLog {
    pub log_type: LogType,
    pub records: Vec<LogRecord>,
    pub bytes: usize,
}

pub trait LoggingService: Service {
    /// Starts storing records at `level` or more severe that match `filter`
    /// (`"APPID CTXID, APPID CTXID"`; empty keeps everything). `lifecycles` is the
    /// number of following start-ups that resume storage automatically.
    /// False if a session already runs or the filter is malformed.
    fn start_log_storage(&self, level: LogLevel, filter: &str, lifecycles: u32) -> bool;
    /// False if no session runs, including after the byte limit stopped it.
    fn stop_log_storage(&self) -> bool;
    /// Last finished session of `log_type`
    fn stored_logs(&self, log_type: LogType) -> Option<StoredLog>;
    fn clear_log_storage(&self) -> Result<(), LoggingError>;
    fn log_storage_stopped(&self) -> &Event<()>;
}

pub(crate) fn parse_filter(filter: &str) -> Option<Vec<(String, String)>> {
    if filter.trim().is_empty() {
        return Some(Vec::new());
    }
    filter
        .split(',')
        .map(|entry| {
            let mut ids = entry.split_whitespace();
            match (ids.next(), ids.next(), ids.next()) {
                (Some(app), Some(ctx), None)
                    if app.len() <= MAX_LOG_ID_LEN && ctx.len() <= MAX_LOG_ID_LEN =>
                {
                    Some((app.to_string(), ctx.to_string()))
                }
                _ => None,
            }
        })
        .collect()
}

#[derive(Debug, Clone)]
struct Activation {
    level: LogLevel,
    filter: Vec<(String, String)>,
}

impl Activation {
    fn accepts(&self, record: &LogRecord) -> bool {
        record.level <= self.level
            && (self.filter.is_empty()
                || self
                    .filter
                    .iter()
                    .any(|(app, ctx)| *app == record.app_id && *ctx == record.ctx_id))
    }
}

struct Session {
    activation: Activation,
    logs: BTreeMap<LogType, StoredLog>,
    bytes: usize,
}

#[derive(Default)]
struct StorageState {
    session: Option<Session>,
    stored: BTreeMap<LogType, StoredLog>,
    /// Activation replayed at the next start-ups
    pending: Option<(Activation, u32)>,
}

impl StorageState {
    fn close_session(&mut self) -> bool {
        match self.session.take() {
            Some(session) => {
                self.stored.extend(session.logs);
                true
            }
            None => false,
        }
    }
}

/// Log storage sessions bounded by the configured byte limit.
pub struct LogStorage {
    limit_bytes: usize,
    state: Mutex<StorageState>,
    stopped: Event<()>,
}

impl LogStorage {
    pub fn new(config: &LoggingConfig) -> Self {
        Self {
            limit_bytes: config.storage_limit_bytes,
            state: Mutex::new(StorageState::default()),
            stopped: Event::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.state
            .lock()
            .map(|s| s.session.is_some())
            .unwrap_or(false)
    }

    /// Ingests one record into the running session.
    pub fn record(&self, record: LogRecord) {
        let limit_reached = match self.state.lock() {
            Ok(mut state) => {
                let Some(session) = state.session.as_mut() else {
                    return;
                };
                if !session.activation.accepts(&record) {
                    return;
                }
                let len = record.stored_len();
                if session.bytes + len > self.limit_bytes {
                    warn!(bytes = session.bytes, "log storage limit reached");
                    state.close_session()
                } else {
                    session.bytes += len;
                    let log = session.logs.entry(record.source).or_insert_with(|| StoredLog {
                        log_type: record.source,
                        ..StoredLog::default()
                    });
                    log.bytes += len;
                    log.records.push(record);
                    false
                }
            }
            Err(_) => false,
        };
        if limit_reached {
            self.stopped.notify(&());
        }
    }

    /// Resumes storage at start-up while activation cycles remain.
    pub fn on_lifecycle_start(&self) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        if state.session.is_some() {
            return false;
        }
        let activation = match state.pending.as_mut() {
            Some((activation, cycles)) if *cycles > 0 => {
                *cycles -= 1;
                activation.clone()
            }
            _ => return false,
        };
        if state.pending.as_ref().is_some_and(|(_, cycles)| *cycles == 0) {
            state.pending = None;
        }
        info!(level = ?activation.level, "log storage resumed at start-up");
        state.session = Some(Session {
            activation,
            logs: BTreeMap::new(),
            bytes: 0,
        });
        true
    }
}

impl Service for LogStorage {
    fn service_name(&self) -> &'static str {
        LOGGING_SERVICE_NAME
    }
}

impl LoggingService for LogStorage {
    fn start_log_storage(&self, level: LogLevel, filter: &str, lifecycles: u32) -> bool {
        let Some(filter) = parse_filter(filter) else {
            warn!(filter, "malformed log storage filter");
            return false;
        };
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        if state.session.is_some() {
            debug!("log storage already running");
            return false;
        }
        let activation = Activation { level, filter };
        state.pending = (lifecycles > 0).then(|| (activation.clone(), lifecycles));
        state.session = Some(Session {
            activation,
            logs: BTreeMap::new(),
            bytes: 0,
        });
        info!(?level, lifecycles, "log storage started");
        true
    }

    fn stop_log_storage(&self) -> bool {
        let stopped = self
            .state
            .lock()
            .map(|mut state| state.close_session())
            .unwrap_or(false);
        if stopped {
            info!("log storage stopped");
            self.stopped.notify(&());
        }
        stopped
    }

    fn stored_logs(&self, log_type: LogType) -> Option<StoredLog> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.stored.get(&log_type).cloned())
    }

    fn clear_log_storage(&self) -> Result<(), LoggingError> {
        let mut state = self.state.lock().map_err(|_| LoggingError::Error)?;
        if state.session.is_some() {
            return Err(LoggingError::Error);
        }
        state.stored.clear();
        Ok(())
    }

    fn log_storage_stopped(&self) -> &Event<()> {
        &self.stopped
    }
}
