use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::error::{Result, TelematicsError};
use crate::event::Event;
use crate::persistence::{KeyScope, PersistenceService};
use crate::types::{Config, Service};

pub const TCU_INFO_SERVICE_NAME: &str = "stla.networking.tcu-info.service.base";

/// Shared persistence key holding the vehicle engine type
pub const VEHICLE_ENGINE_TYPE_KEY: &str = "VEHICLE_ENGINE_TYPE";

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcuInfoError {
    #[error("internal communication error")]
    Error = 1,
    #[error("invalid argument")]
    InvalidArgument = 2,
    #[error("persistence read failed")]
    ErrorPers = 3,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineType {
    #[default]
    Undefined = 0,
    GasolineTank = 1,
    DieselTank = 2,
    CompressedNaturalGas = 3,
    LiquidPropaneGas = 4,
    /// Above 42 V and 100 Ah
    ElectricEnergyStorage = 5,
    HydrogenStorage = 6,
    GasolineAndElectric = 7,
    DieselAndElectric = 8,
}

impl TryFrom<u32> for EngineType {
    type Error = TcuInfoError;

    fn try_from(raw: u32) -> std::result::Result<Self, Self::Error> {
        Ok(match raw {
            0 => EngineType::Undefined,
            1 => EngineType::GasolineTank,
            2 => EngineType::DieselTank,
            3 => EngineType::CompressedNaturalGas,
            4 => EngineType::LiquidPropaneGas,
            5 => EngineType::ElectricEnergyStorage,
            6 => EngineType::HydrogenStorage,
            7 => EngineType::GasolineAndElectric,
            8 => EngineType::DieselAndElectric,
            _ => return Err(TcuInfoError::InvalidArgument),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInfo {
    pub app_name: String,
    pub app_version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppFwkServiceInfo {
    pub service_name: String,
    pub service_version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppFrameworkInfo {
    pub app_fwk_version: String,
    pub services_info: Vec<AppFwkServiceInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirmwareInfo {
    pub vendor: String,
    pub fw_version: String,
    pub fw_serial_number: String,
    pub date_of_production: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareInfo {
    pub vendor: String,
    pub hw_version: String,
    pub hw_serial_number: String,
    pub date_of_production: String,
}

#[derive(Debug, Default)]
pub struct TcuInfoEvents {
    /// True once synchronised, false when a re-synchronisation starts
    pub time_synchronization: Event<bool>,
    /// Celsius
    pub nad_temperature: Event<i32>,
}

pub trait TcuInfoService: Service {
    fn hw_number(&self) -> String;
    fn uin(&self) -> String;
    fn apps_information(&self) -> Vec<AppInfo>;
    fn app_fwk_information(&self) -> AppFrameworkInfo;
    fn firmware_information(&self) -> FirmwareInfo;
    fn hardware_information(&self) -> HardwareInfo;
    fn is_time_synchronized(&self) -> bool;
    fn vehicle_engine_type(&self) -> std::result::Result<EngineType, TcuInfoError>;
    /// Processor temperature in Celsius
    fn nad_temperature(&self) -> std::result::Result<i32, TcuInfoError>;
    fn events(&self) -> &TcuInfoEvents;
}

/// Static identity of the unit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TcuInfoConfig {
    pub hw_number: String,
    /// Unique identification number
    pub uin: String,
    pub app_fwk_version: String,
    pub firmware: FirmwareInfo,
    pub hardware: HardwareInfo,
}

impl Default for TcuInfoConfig {
    fn default() -> Self {
        Self {
            hw_number: String::new(),
            uin: String::new(),
            app_fwk_version: crate::VERSION.to_string(),
            firmware: FirmwareInfo::default(),
            hardware: HardwareInfo::default(),
        }
    }
}

impl Config for TcuInfoConfig {
    fn validate(&self) -> Result<()> {
        if self.app_fwk_version.trim().is_empty() {
            return Err(TelematicsError::config(
                "tcu_info.app_fwk_version must not be empty",
            ));
        }
        if !self.uin.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(TelematicsError::config("tcu_info.uin must be alphanumeric"));
        }
        Ok(())
    }
}

#[derive(Default)]
struct Runtime {
    apps: Vec<AppInfo>,
    services: Vec<AppFwkServiceInfo>,
    time_synchronized: bool,
    nad_temperature: Option<i32>,
}

/// Unit identity plus the runtime facts reported by the platform.
pub struct TcuInfo {
    config: TcuInfoConfig,
    persistence: Arc<dyn PersistenceService>,
    runtime: RwLock<Runtime>,
    events: TcuInfoEvents,
}

impl TcuInfo {
    pub fn new(config: TcuInfoConfig, persistence: Arc<dyn PersistenceService>) -> Self {
        Self {
            config,
            persistence,
            runtime: RwLock::new(Runtime::default()),
            events: TcuInfoEvents::default(),
        }
    }

    /// Adds or updates an installed application
    pub fn register_app(&self, app: AppInfo) {
        if let Ok(mut runtime) = self.runtime.write() {
            match runtime.apps.iter_mut().find(|a| a.app_name == app.app_name) {
                Some(existing) => *existing = app,
                None => runtime.apps.push(app),
            }
        }
    }

    pub fn register_service(&self, service: AppFwkServiceInfo) {
        if let Ok(mut runtime) = self.runtime.write() {
            runtime
                .services
                .retain(|s| s.service_name != service.service_name);
            runtime.services.push(service);
        }
    }

    pub fn set_time_synchronized(&self, synchronized: bool) {
        let changed = match self.runtime.write() {
            Ok(mut runtime) => {
                std::mem::replace(&mut runtime.time_synchronized, synchronized) != synchronized
            }
            Err(_) => false,
        };
        if changed {
            info!(synchronized, "system time synchronisation");
            self.events.time_synchronization.notify(&synchronized);
        }
    }

    pub fn update_nad_temperature(&self, celsius: i32) {
        if let Ok(mut runtime) = self.runtime.write() {
            runtime.nad_temperature = Some(celsius);
        }
        self.events.nad_temperature.notify(&celsius);
    }

    fn read<T: Default>(&self, f: impl FnOnce(&Runtime) -> T) -> T {
        self.runtime.read().map(|r| f(&r)).unwrap_or_default()
    }
}

impl Service for TcuInfo {
    fn service_name(&self) -> &'static str {
        TCU_INFO_SERVICE_NAME
    }
}

impl TcuInfoService for TcuInfo {
    fn hw_number(&self) -> String {
        self.config.hw_number.clone()
    }

    fn uin(&self) -> String {
        self.config.uin.clone()
    }

    fn apps_information(&self) -> Vec<AppInfo> {
        self.read(|r| r.apps.clone())
    }

    fn app_fwk_information(&self) -> AppFrameworkInfo {
        AppFrameworkInfo {
            app_fwk_version: self.config.app_fwk_version.clone(),
            services_info: self.read(|r| r.services.clone()),
        }
    }

    fn firmware_information(&self) -> FirmwareInfo {
        self.config.firmware.clone()
    }

    fn hardware_information(&self) -> HardwareInfo {
        self.config.hardware.clone()
    }

    fn is_time_synchronized(&self) -> bool {
        self.read(|r| r.time_synchronized)
    }

    fn vehicle_engine_type(&self) -> std::result::Result<EngineType, TcuInfoError> {
        let raw = self
            .persistence
            .read_int(&KeyScope::Shared, VEHICLE_ENGINE_TYPE_KEY)
            .map_err(|e| {
                warn!(error = %e, "engine type not readable");
                TcuInfoError::ErrorPers
            })?;
        EngineType::try_from(raw).map_err(|_| {
            warn!(raw, "stored engine type out of range");
            TcuInfoError::ErrorPers
        })
    }

    fn nad_temperature(&self) -> std::result::Result<i32, TcuInfoError> {
        self.runtime
            .read()
            .map_err(|_| TcuInfoError::Error)?
            .nad_temperature
            .ok_or(TcuInfoError::Error)
    }

    fn events(&self) -> &TcuInfoEvents {
        &self.events
    }
}
