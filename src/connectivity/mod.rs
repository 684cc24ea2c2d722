//! Connectivity contracts: MQTT broker configuration, LwM2M general purpose
//! objects, SMS messaging and Wi-Fi status.

pub mod lwm2m;
pub mod mqtt;
pub mod sms;
pub mod wifi;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TelematicsError};
use crate::types::Config;

pub use lwm2m::{Lwm2mAppFwkService, Lwm2mError, Lwm2mService};
pub use mqtt::{MqttConfError, MqttConfService, MqttConfStore};
pub use sms::{SmsError, SmsGateway, SmsServiceProvider};
pub use wifi::{WifiError, WifiMonitor, WifiServiceProvider};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub slots: usize,
    /// Sum of all stored configuration strings
    pub total_size_bytes: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            slots: mqtt::MAX_CONF_ITEM,
            total_size_bytes: 16 * 1024,
        }
    }
}

impl Config for MqttConfig {
    fn validate(&self) -> Result<()> {
        if self.slots == 0 || self.slots > mqtt::MAX_CONF_ITEM {
            return Err(TelematicsError::config(format!(
                "mqtt.slots must be within 1..={}",
                mqtt::MAX_CONF_ITEM
            )));
        }
        if self.total_size_bytes == 0 {
            return Err(TelematicsError::config("mqtt.total_size_bytes must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Lwm2mConfig {
    /// General purpose instances shared by every application
    pub max_instances: usize,
    pub max_instance_bytes: usize,
}

impl Default for Lwm2mConfig {
    fn default() -> Self {
        Self {
            max_instances: 16,
            max_instance_bytes: 4096,
        }
    }
}

impl Config for Lwm2mConfig {
    fn validate(&self) -> Result<()> {
        if self.max_instances == 0 || self.max_instance_bytes == 0 {
            return Err(TelematicsError::config("lwm2m limits must be positive"));
        }
        Ok(())
    }
}
