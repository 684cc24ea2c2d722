//! TOML configuration for every service of the crate.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::connectivity::{Lwm2mConfig, MqttConfig};
use crate::error::Result;
use crate::lifecycle::LifecycleConfig;
use crate::logging::LoggingConfig;
use crate::networking::TcuInfoConfig;
use crate::persistence::{DataStorageConfig, PersistenceConfig};
use crate::positioning::PositioningConfig;
use crate::types::Config;
use crate::vehicle::RemoteAccessConfig;

/// All sections are optional and fall back to their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelematicsConfig {
    pub lifecycle: LifecycleConfig,
    pub persistence: PersistenceConfig,
    pub data_storage: DataStorageConfig,
    pub mqtt: MqttConfig,
    pub lwm2m: Lwm2mConfig,
    pub positioning: PositioningConfig,
    pub remote_access: RemoteAccessConfig,
    pub logging: LoggingConfig,
    pub tcu_info: TcuInfoConfig,
}

impl TelematicsConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
}

impl Config for TelematicsConfig {
    fn validate(&self) -> Result<()> {
        self.lifecycle.validate()?;
        self.persistence.validate()?;
        self.data_storage.validate()?;
        self.mqtt.validate()?;
        self.lwm2m.validate()?;
        self.positioning.validate()?;
        self.remote_access.validate()?;
        self.logging.validate()?;
        self.tcu_info.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TelematicsError;
    use std::io::Write;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = TelematicsConfig::from_toml_str("").unwrap();
        assert_eq!(config.lifecycle.max_rtc_alarms, 5);
        assert_eq!(config.mqtt.slots, 10);
        assert_eq!(config.positioning.cache_window_s, 120);
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = TelematicsConfig::from_toml_str(
            r#"
            [lifecycle]
            max_can_wakeup_retries = 5

            [logging]
            filter = "libtelematics=debug"
            json = true

            [tcu_info]
            uin = "0123ABCD"

            [remote_access]
            disabled = ["unlock_trunk"]
            "#,
        )
        .unwrap();
        assert_eq!(config.lifecycle.max_can_wakeup_retries, 5);
        assert!(config.logging.json);
        assert_eq!(config.tcu_info.uin, "0123ABCD");
        assert_eq!(config.remote_access.disabled.len(), 1);
    }

    #[test]
    fn test_invalid_section_rejected() {
        let result = TelematicsConfig::from_toml_str("[mqtt]\nslots = 11\n");
        assert!(matches!(result, Err(TelematicsError::ConfigError { .. })));
    }

    #[test]
    fn test_malformed_toml() {
        let result = TelematicsConfig::from_toml_str("[lifecycle\n");
        assert!(matches!(result, Err(TelematicsError::TomlError(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[positioning]\nintake_timeout_ms = 5000").unwrap();

        let config = TelematicsConfig::from_file(file.path()).unwrap();
        assert_eq!(config.positioning.intake_timeout_ms, 5000);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = TelematicsConfig::from_file(dir.path().join("absent.toml"));
        assert!(matches!(result, Err(TelematicsError::IoError(_))));
    }
}
