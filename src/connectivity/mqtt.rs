use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::MqttConfig;
use crate::event::Event;
use crate::types::{AppContext, Service};

pub const MQTT_CONF_SERVICE_NAME: &str = "stla.connectivity.mqttconf.service.base";

/// Configuration items are indexed `0..MAX_CONF_ITEM`
pub const MAX_CONF_ITEM: usize = 10;

/// Broker parameters only device management may change
const RESERVED_KEYS: &[&str] = &[
    "remote_clientid",
    "keepalive_interval",
    "cleansession",
    "notifications",
    "notification_topic",
    "bridge_protocol_version",
    "try_private",
    "sys_interval",
    "max_connections",
    "persistence",
    "persistence_file",
    "persistence_location",
    "log_dest",
];

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MqttConfError {
    #[error("operation not allowed")]
    MethodNotAllowed = 1,
    #[error("configuration exceeds the available memory")]
    OutOfMemory = 2,
    #[error("index out of range")]
    IdInvalid = 3,
    #[error("index not set")]
    IdUnused = 4,
    #[error("broker configured by another application")]
    BrokerAlreadyConfigured = 5,
    #[error("MQTT manager does not respond")]
    BrokerNotAvailable = 6,
    #[error("unknown error")]
    UnknownError = 7,
}

impl MqttConfError {
    pub fn code(self) -> u32 {
        self as u32
    }
}

/// Per-application view of the broker configuration
pub trait MqttConfHandler: Send + Sync {
    /// True when the broker is configured through the application framework
    fn adk_mode(&self) -> Result<bool, MqttConfError>;
    /// Switching mode wipes every item; setting the current mode is a no-op.
    /// Enabling ADK mode locks every other bundle out until DM mode is restored.
    fn set_adk_mode(&self, adk_mode: bool) -> Result<(), MqttConfError>;
    /// Indexes of the items set, ascending
    fn index_list(&self) -> Result<Vec<u32>, MqttConfError>;
    fn item(&self, index: u32) -> Result<String, MqttConfError>;
    /// Creates or replaces the item. On failure the previous value is kept.
    fn set_item(&self, index: u32, config: &str) -> Result<(), MqttConfError>;
    fn delete_item(&self, index: u32) -> Result<(), MqttConfError>;
}

pub trait MqttConfService: Service {
    /// Once a bundle has enabled ADK mode or stored a configuration, no other
    /// bundle gets a handler.
    fn handler(&self, ctx: &AppContext) -> Result<Arc<dyn MqttConfHandler>, MqttConfError>;
    fn is_service_ready(&self) -> Result<(), MqttConfError>;
    fn service_status_changed(&self) -> &Event<Result<(), MqttConfError>>;
}

struct MqttState {
    available: bool,
    adk_mode: bool,
    items: BTreeMap<u32, String>,
    owner: Option<String>,
}

struct MqttInner {
    config: MqttConfig,
    state: Mutex<MqttState>,
}

impl MqttInner {
    /// Locks the state after checking that `bundle` may use the broker.
    fn access(&self, bundle: &str) -> Result<MutexGuard<'_, MqttState>, MqttConfError> {
        let state = self.state.lock().map_err(|_| MqttConfError::UnknownError)?;
        if !state.available {
            return Err(MqttConfError::BrokerNotAvailable);
        }
        if state.owner.as_deref().is_some_and(|owner| owner != bundle) {
            return Err(MqttConfError::BrokerAlreadyConfigured);
        }
        Ok(state)
    }

    fn check_index(&self, index: u32) -> Result<(), MqttConfError> {
        if index as usize >= self.config.slots {
            return Err(MqttConfError::IdInvalid);
        }
        Ok(())
    }
}

fn reserved_key(config: &str) -> Option<&str> {
    config
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_whitespace().next())
        .find(|key| RESERVED_KEYS.contains(key))
}

struct BundleHandler {
    bundle: String,
    inner: Arc<MqttInner>,
}

impl MqttConfHandler for BundleHandler {
    fn adk_mode(&self) -> Result<bool, MqttConfError> {
        Ok(self.inner.access(&self.bundle)?.adk_mode)
    }

    fn set_adk_mode(&self, adk_mode: bool) -> Result<(), MqttConfError> {
        let mut state = self.inner.access(&self.bundle)?;
        if state.adk_mode == adk_mode {
            return Ok(());
        }
        state.adk_mode = adk_mode;
        state.items.clear();
        // ADK mode reserves the broker to the bundle that enabled it
        state.owner = adk_mode.then(|| self.bundle.clone());
        info!(bundle = %self.bundle, adk_mode, "mqtt configuration mode changed");
        Ok(())
    }

    fn index_list(&self) -> Result<Vec<u32>, MqttConfError> {
        Ok(self.inner.access(&self.bundle)?.items.keys().copied().collect())
    }

    fn item(&self, index: u32) -> Result<String, MqttConfError> {
        self.inner.check_index(index)?;
        self.inner
            .access(&self.bundle)?
            .items
            .get(&index)
            .cloned()
            .ok_or(MqttConfError::IdUnused)
    }

    fn set_item(&self, index: u32, config: &str) -> Result<(), MqttConfError> {
        self.inner.check_index(index)?;
        let mut state = self.inner.access(&self.bundle)?;
        if !state.adk_mode {
            return Err(MqttConfError::MethodNotAllowed);
        }
        if let Some(key) = reserved_key(config) {
            warn!(bundle = %self.bundle, key, "mqtt parameter reserved to device management");
            return Err(MqttConfError::MethodNotAllowed);
        }
        let others: usize = state
            .items
            .iter()
            .filter(|(i, _)| **i != index)
            .map(|(_, item)| item.len())
            .sum();
        if others + config.len() > self.inner.config.total_size_bytes {
            return Err(MqttConfError::OutOfMemory);
        }
        state.items.insert(index, config.to_string());
        if state.owner.is_none() {
            state.owner = Some(self.bundle.clone());
        }
        debug!(bundle = %self.bundle, index, "mqtt item stored");
        Ok(())
    }

    fn delete_item(&self, index: u32) -> Result<(), MqttConfError> {
        self.inner.check_index(index)?;
        let mut state = self.inner.access(&self.bundle)?;
        state
            .items
            .remove(&index)
            .map(|_| ())
            .ok_or(MqttConfError::IdUnused)
    }
}

/// Broker configuration slots kept in memory.
pub struct MqttConfStore {
    inner: Arc<MqttInner>,
    handlers: Mutex<BTreeMap<String, Arc<BundleHandler>>>,
    status_changed: Event<Result<(), MqttConfError>>,
}

impl MqttConfStore {
    pub fn new(config: MqttConfig) -> Self {
        Self {
            inner: Arc::new(MqttInner {
                config,
                state: Mutex::new(MqttState {
                    available: true,
                    adk_mode: false,
                    items: BTreeMap::new(),
                    owner: None,
                }),
            }),
            handlers: Mutex::new(BTreeMap::new()),
            status_changed: Event::new(),
        }
    }

    /// Broker manager reachability
    pub fn set_broker_available(&self, available: bool) {
        let changed = match self.inner.state.lock() {
            Ok(mut state) if state.available != available => {
                state.available = available;
                true
            }
            _ => false,
        };
        if changed {
            info!(available, "mqtt broker availability changed");
            self.status_changed.notify(&self.is_service_ready());
        }
    }
}

impl Service for MqttConfStore {
    fn service_name(&self) -> &'static str {
        MQTT_CONF_SERVICE_NAME
    }
}

impl MqttConfService for MqttConfStore {
    fn handler(&self, ctx: &AppContext) -> Result<Arc<dyn MqttConfHandler>, MqttConfError> {
        if ctx.symbolic_name.is_empty() {
            return Err(MqttConfError::MethodNotAllowed);
        }
        drop(self.inner.access(&ctx.symbolic_name)?);
        let mut handlers = self.handlers.lock().map_err(|_| MqttConfError::UnknownError)?;
        let handler = handlers
            .entry(ctx.symbolic_name.clone())
            .or_insert_with(|| {
                Arc::new(BundleHandler {
                    bundle: ctx.symbolic_name.clone(),
                    inner: self.inner.clone(),
                })
            })
            .clone();
        Ok(handler)
    }

    fn is_service_ready(&self) -> Result<(), MqttConfError> {
        let state = self.inner.state.lock().map_err(|_| MqttConfError::UnknownError)?;
        if state.available {
            Ok(())
        } else {
            Err(MqttConfError::BrokerNotAvailable)
        }
    }

    fn service_status_changed(&self) -> &Event<Result<(), MqttConfError>> {
        &self.status_changed
    }
}
