use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::PersistenceConfig;
use crate::event::{Event, Subscription};
use crate::types::Service;

pub const PERSISTENCE_SERVICE_NAME: &str = "com.stellantis.PersistenceServiceAppFwk";
pub const PUBLIC_SERVICE_SCOPE: &str = "PUBLIC_SRV";
pub const PUBLIC_CRITICAL_SCOPE: &str = "PUBLIC_SEC";

const INT_KEY_SIZE: usize = 4;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PclError {
    #[error("persistence backend call failed")]
    Generic,
    #[error("invalid argument")]
    InvalidArg,
    #[error("internal error")]
    Internal,
    #[error("access denied")]
    AccessDenied,
    #[error("not enough space available")]
    NoQuota,
    #[error("key already exists")]
    KeyExists,
    #[error("service disabled")]
    ServiceDisabled,
    #[error("key not found")]
    KeyNotFound,
}

impl PclError {
    pub fn code(self) -> i32 {
        match self {
            PclError::Generic => -99,
            PclError::InvalidArg => -98,
            PclError::Internal => -97,
            PclError::AccessDenied => -96,
            PclError::NoQuota => -95,
            PclError::KeyExists => -94,
            PclError::ServiceDisabled => -93,
            PclError::KeyNotFound => -92,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotifyStatus {
    NoChange = 0,
    Created = 1,
    Modified = 2,
    Deleted = 3,
    RecoveredToDefault = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatabaseState {
    Unknown = 0,
    Normal = 1,
    /// System services are recovering mandatory data
    Corrupted = 2,
    /// Recovery finished; applications may recreate their keys
    RestoredToDefault = 3,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotification {
    pub notify_status: NotifyStatus,
    pub key_id: String,
}

pub type ChangeCallback = Box<dyn Fn(&ChangeNotification) + Send + Sync>;

/// Owner of a key. `Shared` keys are visible to every bundle.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyScope {
    Bundle(String),
    Shared,
}

impl KeyScope {
    pub fn bundle(name: impl Into<String>) -> Self {
        KeyScope::Bundle(name.into())
    }
}

/// Typed key/value persistence
pub trait PersistenceService: Service {
    fn key_create_byte_array(&self, scope: &KeyScope, key: &str, max_size: usize)
        -> Result<(), PclError>;
    fn key_create_int(&self, scope: &KeyScope, key: &str) -> Result<(), PclError>;
    fn key_delete(&self, scope: &KeyScope, key: &str) -> Result<(), PclError>;

    /// Secured variants, limited to the secured key size
    fn key_create_byte_array_critical(
        &self,
        scope: &KeyScope,
        key: &str,
        max_size: usize,
    ) -> Result<(), PclError>;
    fn key_create_int_critical(&self, scope: &KeyScope, key: &str) -> Result<(), PclError>;
    fn key_delete_critical(&self, scope: &KeyScope, key: &str) -> Result<(), PclError>;

    /// Removes every key owned by `bundle`
    fn remove_app_keys(&self, bundle: &str) -> Result<(), PclError>;

    fn read_byte_array(&self, scope: &KeyScope, key: &str) -> Result<Vec<u8>, PclError>;
    fn write_byte_array(&self, scope: &KeyScope, key: &str, data: &[u8]) -> Result<(), PclError>;
    fn key_size(&self, scope: &KeyScope, key: &str) -> Result<usize, PclError>;
    fn read_int(&self, scope: &KeyScope, key: &str) -> Result<u32, PclError>;
    fn write_int(&self, scope: &KeyScope, key: &str, value: u32) -> Result<(), PclError>;

    fn register_notify_on_change(
        &self,
        scope: &KeyScope,
        key: &str,
        callback: ChangeCallback,
    ) -> Result<Subscription, PclError>;

    fn used_space(&self) -> Result<usize, PclError>;
    fn remaining_space(&self) -> Result<usize, PclError>;
    fn database_state(&self) -> DatabaseState;
    fn database_state_changed(&self) -> &Event<DatabaseState>;
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Bytes { max_size: usize, data: Option<Vec<u8>> },
    Int(Option<u32>),
}

#[derive(Debug)]
struct Entry {
    critical: bool,
    value: Value,
    watchers: Event<ChangeNotification>,
}

impl Entry {
    fn reserved(&self) -> usize {
        match self.value {
            Value::Bytes { max_size, .. } => max_size,
            Value::Int(_) => INT_KEY_SIZE,
        }
    }
}

struct StoreState {
    enabled: bool,
    keys: BTreeMap<(KeyScope, String), Entry>,
}

/// In-memory key/value store with quota accounting.
///
/// Creating a key reserves its maximum size against the quota, so writes
/// never fail for lack of space.
pub struct KeyValueStore {
    config: PersistenceConfig,
    state: Mutex<StoreState>,
    db_state: RwLock<DatabaseState>,
    db_events: Event<DatabaseState>,
}

impl KeyValueStore {
    pub fn new(config: PersistenceConfig) -> Self {
        Self {
            config,
            state: Mutex::new(StoreState {
                enabled: true,
                keys: BTreeMap::new(),
            }),
            db_state: RwLock::new(DatabaseState::Normal),
            db_events: Event::new(),
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, StoreState>, PclError> {
        let state = self.state.lock().map_err(|_| PclError::Internal)?;
        if !state.enabled {
            return Err(PclError::ServiceDisabled);
        }
        Ok(state)
    }

    pub fn set_enabled(&self, enabled: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.enabled = enabled;
        }
    }

    fn check_key(&self, scope: &KeyScope, key: &str) -> Result<(), PclError> {
        if key.is_empty() || key.len() > self.config.key_name_max_len {
            return Err(PclError::InvalidArg);
        }
        if let KeyScope::Bundle(bundle) = scope {
            if bundle.is_empty() {
                return Err(PclError::InvalidArg);
            }
        }
        Ok(())
    }

    fn create(
        &self,
        scope: &KeyScope,
        key: &str,
        critical: bool,
        value: Value,
    ) -> Result<(), PclError> {
        self.check_key(scope, key)?;
        let size = match value {
            Value::Bytes { max_size, .. } => {
                let limit = if critical {
                    self.config.secured_key_max_size
                } else {
                    self.config.key_max_size
                };
                if max_size == 0 {
                    return Err(PclError::Internal);
                }
                if max_size > limit {
                    return Err(PclError::InvalidArg);
                }
                max_size
            }
            Value::Int(_) => INT_KEY_SIZE,
        };

        let mut state = self.state()?;
        let id = (scope.clone(), key.to_string());
        if state.keys.contains_key(&id) {
            return Err(PclError::KeyExists);
        }
        let used: usize = state.keys.values().map(Entry::reserved).sum();
        if used + size > self.config.quota_bytes {
            warn!(key, size, used, "persistence quota exhausted");
            return Err(PclError::NoQuota);
        }
        state.keys.insert(
            id,
            Entry {
                critical,
                value,
                watchers: Event::new(),
            },
        );
        debug!(?scope, key, critical, "key created");
        Ok(())
    }

    fn delete(&self, scope: &KeyScope, key: &str, critical: bool) -> Result<(), PclError> {
        self.check_key(scope, key)?;
        let entry = {
            let mut state = self.state()?;
            let id = (scope.clone(), key.to_string());
            match state.keys.get(&id) {
                None => return Err(PclError::KeyNotFound),
                Some(entry) if entry.critical != critical => return Err(PclError::AccessDenied),
                Some(_) => {}
            }
            state.keys.remove(&id).ok_or(PclError::KeyNotFound)?
        };
        debug!(?scope, key, "key deleted");
        entry.watchers.notify(&ChangeNotification {
            notify_status: NotifyStatus::Deleted,
            key_id: key.to_string(),
        });
        Ok(())
    }

    /// Runs `access` on the entry, then tells its watchers about `status` if any.
    fn with_entry<T, F>(
        &self,
        scope: &KeyScope,
        key: &str,
        status: Option<NotifyStatus>,
        access: F,
    ) -> Result<T, PclError>
    where
        F: FnOnce(&mut Entry) -> Result<T, PclError>,
    {
        self.check_key(scope, key)?;
        let (result, watchers) = {
            let mut state = self.state()?;
            let entry = state
                .keys
                .get_mut(&(scope.clone(), key.to_string()))
                .ok_or(PclError::KeyNotFound)?;
            (access(&mut *entry)?, entry.watchers.clone())
        };
        if let Some(notify_status) = status {
            watchers.notify(&ChangeNotification {
                notify_status,
                key_id: key.to_string(),
            });
        }
        Ok(result)
    }

    /// System notification about database recovery
    pub fn set_database_state(&self, new_state: DatabaseState) {
        if let Ok(mut current) = self.db_state.write() {
            *current = new_state;
        }
        if new_state == DatabaseState::RestoredToDefault {
            let dropped: Vec<(String, Event<ChangeNotification>)> = match self.state.lock() {
                Ok(mut state) => std::mem::take(&mut state.keys)
                    .into_iter()
                    .map(|((_, key), entry)| (key, entry.watchers))
                    .collect(),
                Err(_) => Vec::new(),
            };
            for (key_id, watchers) in dropped {
                watchers.notify(&ChangeNotification {
                    notify_status: NotifyStatus::RecoveredToDefault,
                    key_id,
                });
            }
        }
        info!(state = ?new_state, "persistence database state changed");
        self.db_events.notify(&new_state);
    }
}

impl Service for KeyValueStore {
    fn service_name(&self) -> &'static str {
        PERSISTENCE_SERVICE_NAME
    }
}

impl PersistenceService for KeyValueStore {
    fn key_create_byte_array(
        &self,
        scope: &KeyScope,
        key: &str,
        max_size: usize,
    ) -> Result<(), PclError> {
        self.create(
            scope,
            key,
            false,
            Value::Bytes {
                max_size,
                data: None,
            },
        )
    }

    fn key_create_int(&self, scope: &KeyScope, key: &str) -> Result<(), PclError> {
        self.create(scope, key, false, Value::Int(None))
    }

    fn key_delete(&self, scope: &KeyScope, key: &str) -> Result<(), PclError> {
        self.delete(scope, key, false)
    }

    fn key_create_byte_array_critical(
        &self,
        scope: &KeyScope,
        key: &str,
        max_size: usize,
    ) -> Result<(), PclError> {
        self.create(
            scope,
            key,
            true,
            Value::Bytes {
                max_size,
                data: None,
            },
        )
    }

    fn key_create_int_critical(&self, scope: &KeyScope, key: &str) -> Result<(), PclError> {
        self.create(scope, key, true, Value::Int(None))
    }

    fn key_delete_critical(&self, scope: &KeyScope, key: &str) -> Result<(), PclError> {
        self.delete(scope, key, true)
    }

    fn remove_app_keys(&self, bundle: &str) -> Result<(), PclError> {
        if bundle.is_empty() {
            return Err(PclError::InvalidArg);
        }
        let removed: Vec<(String, Entry)> = {
            let mut state = self.state()?;
            let ids: Vec<(KeyScope, String)> = state
                .keys
                .keys()
                .filter(|(scope, _)| matches!(scope, KeyScope::Bundle(b) if b == bundle))
                .cloned()
                .collect();
            ids.into_iter()
                .filter_map(|id| state.keys.remove(&id).map(|entry| (id.1, entry)))
                .collect()
        };
        info!(bundle, count = removed.len(), "application keys removed");
        for (key_id, entry) in removed {
            entry.watchers.notify(&ChangeNotification {
                notify_status: NotifyStatus::Deleted,
                key_id,
            });
        }
        Ok(())
    }

    fn read_byte_array(&self, scope: &KeyScope, key: &str) -> Result<Vec<u8>, PclError> {
        self.with_entry(scope, key, None, |entry| match &entry.value {
            Value::Bytes {
                data: Some(data), ..
            } => Ok(data.clone()),
            Value::Bytes { data: None, .. } => Err(PclError::KeyNotFound),
            Value::Int(_) => Err(PclError::InvalidArg),
        })
    }

    fn write_byte_array(&self, scope: &KeyScope, key: &str, data: &[u8]) -> Result<(), PclError> {
        let status = Some(NotifyStatus::Modified);
        self.with_entry(scope, key, status, |entry| match &mut entry.value {
            Value::Bytes { max_size, .. } if data.len() > *max_size => Err(PclError::InvalidArg),
            Value::Bytes { data: slot, .. } => {
                *slot = Some(data.to_vec());
                Ok(())
            }
            Value::Int(_) => Err(PclError::InvalidArg),
        })
    }

    fn key_size(&self, scope: &KeyScope, key: &str) -> Result<usize, PclError> {
        self.with_entry(scope, key, None, |entry| match &entry.value {
            Value::Bytes { data, .. } => Ok(data.as_ref().map(Vec::len).unwrap_or(0)),
            Value::Int(_) => Ok(INT_KEY_SIZE),
        })
    }

    fn read_int(&self, scope: &KeyScope, key: &str) -> Result<u32, PclError> {
        self.with_entry(scope, key, None, |entry| match entry.value {
            Value::Int(Some(value)) => Ok(value),
            Value::Int(None) => Err(PclError::KeyNotFound),
            Value::Bytes { .. } => Err(PclError::InvalidArg),
        })
    }

    fn write_int(&self, scope: &KeyScope, key: &str, value: u32) -> Result<(), PclError> {
        let status = Some(NotifyStatus::Modified);
        self.with_entry(scope, key, status, |entry| match &mut entry.value {
            Value::Int(slot) => {
                *slot = Some(value);
                Ok(())
            }
            Value::Bytes { .. } => Err(PclError::InvalidArg),
        })
    }

    fn register_notify_on_change(
        &self,
        scope: &KeyScope,
        key: &str,
        callback: ChangeCallback,
    ) -> Result<Subscription, PclError> {
        self.with_entry(scope, key, None, |entry| {
            Ok(entry.watchers.subscribe(callback))
        })
    }

    fn used_space(&self) -> Result<usize, PclError> {
        Ok(self.state()?.keys.values().map(Entry::reserved).sum())
    }

    fn remaining_space(&self) -> Result<usize, PclError> {
        let used = self.used_space()?;
        Ok(self.config.quota_bytes.saturating_sub(used))
    }

    fn database_state(&self) -> DatabaseState {
        self.db_state
            .read()
            .map(|s| *s)
            .unwrap_or(DatabaseState::Unknown)
    }

    fn database_state_changed(&self) -> &Event<DatabaseState> {
        &self.db_events
    }
}
