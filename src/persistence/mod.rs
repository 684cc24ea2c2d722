//! Storage contracts: typed key/value persistence and file data storage.

pub mod dss;
pub mod pcl;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TelematicsError};
use crate::types::Config;

pub use dss::{DataStorage, DataStorageService};
pub use pcl::{KeyScope, KeyValueStore, PclError, PersistenceService};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Bytes reservable across all keys
    pub quota_bytes: usize,
    pub key_max_size: usize,
    pub secured_key_max_size: usize,
    pub key_name_max_len: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            quota_bytes: 5 * 1024 * 1024,
            key_max_size: 5 * 1024 * 1024,
            secured_key_max_size: 25 * 1024,
            key_name_max_len: 100,
        }
    }
}

impl Config for PersistenceConfig {
    fn validate(&self) -> Result<()> {
        if self.quota_bytes == 0 || self.key_max_size == 0 || self.key_name_max_len == 0 {
            return Err(TelematicsError::config("persistence limits must be positive"));
        }
        if self.secured_key_max_size > self.key_max_size {
            return Err(TelematicsError::config(
                "persistence.secured_key_max_size exceeds key_max_size",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataStorageConfig {
    pub namespace_quota_kib: u32,
    pub total_capacity_kib: u32,
    /// Target of synchronous saves; saves are in-memory only when unset
    pub root_dir: Option<PathBuf>,
}

impl Default for DataStorageConfig {
    fn default() -> Self {
        Self {
            namespace_quota_kib: 1024,
            total_capacity_kib: 16 * 1024,
            root_dir: None,
        }
    }
}

impl Config for DataStorageConfig {
    fn validate(&self) -> Result<()> {
        if self.namespace_quota_kib == 0 || self.namespace_quota_kib > self.total_capacity_kib {
            return Err(TelematicsError::config(
                "data_storage.namespace_quota_kib must be within total capacity",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
