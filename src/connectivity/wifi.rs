use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::event::Event;
use crate::types::Service;

pub const WIFI_SERVICE_NAME: &str = "stla.connectivity.wifi.service.base";

/// IEEE 802.11 revision of a network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhyStandard {
    Unknown = 0,
    ModeB = 1,
    ModeBg = 2,
    ModeBgn = 3,
    ModeA = 4,
    ModeAn = 5,
    ModeAnac = 6,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiError {
    #[error("wifi request failed")]
    Error = 1,
    #[error("wifi service not initialized")]
    NotInitialized = 2,
    #[error("wifi manager not ready")]
    ManagerNotReady = 3,
    #[error("wifi client not ready")]
    ClientNotReady = 4,
    #[error("wifi client not enabled")]
    ClientNotEnabled = 5,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceState {
    Connecting = 0,
    Connected = 1,
    Disconnecting = 2,
    Disconnected = 3,
    Failure = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Security {
    None = 0,
    WpaPsk = 1,
    WpaEap = 2,
    Wpa2Wps = 3,
    Wpa2Psk = 4,
    Wpa2Eap = 5,
    Wep = 6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetState {
    Off = 0,
    EnablingSta = 1,
    EnablingAp = 2,
    EnabledSta = 3,
    EnabledAp = 4,
    Disabling = 5,
    Recovering = 6,
    Failure = 7,
}

/// One visible network. Only `ssid` and `mac` are filled outside client mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub ssid: String,
    pub rssi: u32,
    pub channel: u32,
    pub cipher: String,
    pub mac: String,
    pub phy_standard: PhyStandard,
    pub connection_status: ServiceState,
    pub security: Security,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceList {
    pub services: Vec<ServiceConfig>,
}

impl ServiceList {
    pub fn services_num(&self) -> usize {
        self.services.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiStatus {
    pub connection_status: ServiceState,
    pub mode: NetState,
}

impl Default for WifiStatus {
    fn default() -> Self {
        Self {
            connection_status: ServiceState::Disconnected,
            mode: NetState::Off,
        }
    }
}

/// Both channels only signal a change; read the new values through the getters.
#[derive(Debug, Default)]
pub struct WifiEvents {
    pub remote_services_changed: Event<()>,
    pub remote_status_changed: Event<()>,
}

pub trait WifiServiceProvider: Service {
    /// Empty unless the TCU is an enabled station.
    fn wifi_services(&self) -> Result<ServiceList, WifiError>;
    fn wifi_status(&self) -> WifiStatus;
    fn events(&self) -> &WifiEvents;
}

struct WifiState {
    manager_ready: bool,
    client_ready: bool,
    status: WifiStatus,
    services: Vec<ServiceConfig>,
}

/// Last Wi-Fi state reported by the connectivity manager.
pub struct WifiMonitor {
    state: Mutex<WifiState>,
    events: WifiEvents,
}

impl WifiMonitor {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(WifiState {
                manager_ready: false,
                client_ready: false,
                status: WifiStatus::default(),
                services: Vec::new(),
            }),
            events: WifiEvents::default(),
        }
    }

    pub fn set_manager_ready(&self, ready: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.manager_ready = ready;
        }
    }

    pub fn set_client_ready(&self, ready: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.client_ready = ready;
        }
    }

    pub fn update_status(&self, status: WifiStatus) {
        let (changed, mode_changed) = match self.state.lock() {
            Ok(mut state) => {
                let previous = std::mem::replace(&mut state.status, status);
                (previous != status, previous.mode != status.mode)
            }
            Err(_) => return,
        };
        if changed {
            info!(mode = ?status.mode, connection = ?status.connection_status, "wifi status changed");
            self.events.remote_status_changed.notify(&());
        }
        if mode_changed {
            self.events.remote_services_changed.notify(&());
        }
    }

    pub fn update_services(&self, services: Vec<ServiceConfig>) {
        if let Ok(mut state) = self.state.lock() {
            state.services = services;
        }
        self.events.remote_services_changed.notify(&());
    }
}

impl Default for WifiMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Service for WifiMonitor {
    fn service_name(&self) -> &'static str {
        WIFI_SERVICE_NAME
    }
}

impl WifiServiceProvider for WifiMonitor {
    fn wifi_services(&self) -> Result<ServiceList, WifiError> {
        let state = self.state.lock().map_err(|_| WifiError::Error)?;
        if !state.manager_ready {
            return Err(WifiError::ManagerNotReady);
        }
        if state.status.mode != NetState::EnabledSta {
            return Ok(ServiceList::default());
        }
        if !state.client_ready {
            return Err(WifiError::ClientNotReady);
        }
        Ok(ServiceList {
            services: state.services.clone(),
        })
    }

    fn wifi_status(&self) -> WifiStatus {
        self.state
            .lock()
            .map(|state| state.status)
            .unwrap_or_default()
    }

    fn events(&self) -> &WifiEvents {
        &self.events
    }
}
