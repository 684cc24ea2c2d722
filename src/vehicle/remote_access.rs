use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::{Result, TelematicsError};
use crate::types::{CanId, Config, Frame, Port, Service};

pub const REMOTE_ACCESS_SERVICE_NAME: &str = "stla.networking.remote-access.service.base";

pub const ECRAN_INFO_PRG_RTAB_REM_SIZE: usize = 2;
pub const ECRAN_INFO_PRG_CLIM_REM_SIZE: usize = 7;
pub const ECRAN_INFO_PRG_CLIM_REM_2_SIZE: usize = 7;
pub const IMMO_PASSWORD_SIZE: usize = 7;

// Frame identifiers on the comfort bus
pub const ID_REMOTE_REQUEST: CanId = 0x3E5;
pub const ID_ECRAN_INFO_PRG_RTAB_REM: CanId = 0x3E6;
pub const ID_ECRAN_INFO_PRG_CLIM_REM: CanId = 0x3E7;
pub const ID_ECRAN_INFO_PRG_CLIM_REM_2: CanId = 0x3E8;
pub const ID_WEB_INFO: CanId = 0x3E9;
pub const ID_IMMOBILIZER: CanId = 0x3EA;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasError {
    #[error("vehicle communication failed")]
    Error = 1,
    #[error("invalid argument")]
    InvalidArgument = 2,
    #[error("not supported on this architecture")]
    NotSupported = 3,
}

/// Command identity, used to disable commands per vehicle architecture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    LockAllDoors,
    LockAllDoorsConfirmed,
    UnlockAllDoors,
    UnlockDriverDoor,
    UnlockTrunk,
    HornOff,
    HornOn,
    LightsOff,
    LightsOn,
    EcranInfoPrgRtabRem,
    EcranInfoPrgClimRem,
    EcranInfoPrgClimRem2,
    ChargeData,
    ChargeLimitationDaily,
    ChargeLimitationTrip,
    InfoLocationWeb,
    No2WebValue,
    O3WebValue,
    Pm25WebValue,
    So2WebValue,
    ImmoOff,
    ImmoOn,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCommand {
    LockAllDoors,
    LockAllDoorsConfirmed,
    UnlockAllDoors,
    UnlockDriverDoor,
    UnlockTrunk,
    HornOff,
    HornOn,
    LightsOff,
    LightsOn,
    EcranInfoPrgRtabRem([u8; ECRAN_INFO_PRG_RTAB_REM_SIZE]),
    EcranInfoPrgClimRem([u8; ECRAN_INFO_PRG_CLIM_REM_SIZE]),
    EcranInfoPrgClimRem2([u8; ECRAN_INFO_PRG_CLIM_REM_2_SIZE]),
    ChargeData(bool),
    ChargeLimitationDaily,
    ChargeLimitationTrip,
    /// 2 bits
    InfoLocationWeb(u8),
    /// 12 bits
    No2WebValue(u16),
    /// 11 bits
    O3WebValue(u16),
    /// 10 bits
    Pm25WebValue(u16),
    /// 12 bits
    So2WebValue(u16),
    ImmoOff(String),
    ImmoOn(String),
}

fn check_width(value: u16, bits: u32) -> std::result::Result<(), RasError> {
    if u32::from(value) >= 1 << bits {
        return Err(RasError::InvalidArgument);
    }
    Ok(())
}

fn immobilizer_frame(on: bool, password: &str) -> std::result::Result<Frame, RasError> {
    if password.len() != IMMO_PASSWORD_SIZE {
        return Err(RasError::InvalidArgument);
    }
    let mut data = Vec::with_capacity(1 + IMMO_PASSWORD_SIZE);
    data.push(u8::from(on));
    data.extend_from_slice(password.as_bytes());
    Ok(Frame {
        id: ID_IMMOBILIZER,
        data,
        ..Frame::default()
    })
}

fn web_value_frame(selector: u8, value: u16) -> Frame {
    let [hi, lo] = value.to_be_bytes();
    Frame {
        id: ID_WEB_INFO,
        data: vec![selector, hi, lo],
        ..Frame::default()
    }
}

impl RemoteCommand {
    pub fn kind(&self) -> CommandKind {
        match self {
            RemoteCommand::LockAllDoors => CommandKind::LockAllDoors,
            RemoteCommand::LockAllDoorsConfirmed => CommandKind::LockAllDoorsConfirmed,
            RemoteCommand::UnlockAllDoors => CommandKind::UnlockAllDoors,
            RemoteCommand::UnlockDriverDoor => CommandKind::UnlockDriverDoor,
            RemoteCommand::UnlockTrunk => CommandKind::UnlockTrunk,
            RemoteCommand::HornOff => CommandKind::HornOff,
            RemoteCommand::HornOn => CommandKind::HornOn,
            RemoteCommand::LightsOff => CommandKind::LightsOff,
            RemoteCommand::LightsOn => CommandKind::LightsOn,
            RemoteCommand::EcranInfoPrgRtabRem(_) => CommandKind::EcranInfoPrgRtabRem,
            RemoteCommand::EcranInfoPrgClimRem(_) => CommandKind::EcranInfoPrgClimRem,
            RemoteCommand::EcranInfoPrgClimRem2(_) => CommandKind::EcranInfoPrgClimRem2,
            RemoteCommand::ChargeData(_) => CommandKind::ChargeData,
            RemoteCommand::ChargeLimitationDaily => CommandKind::ChargeLimitationDaily,
            RemoteCommand::ChargeLimitationTrip => CommandKind::ChargeLimitationTrip,
            RemoteCommand::InfoLocationWeb(_) => CommandKind::InfoLocationWeb,
            RemoteCommand::No2WebValue(_) => CommandKind::No2WebValue,
            RemoteCommand::O3WebValue(_) => CommandKind::O3WebValue,
            RemoteCommand::Pm25WebValue(_) => CommandKind::Pm25WebValue,
            RemoteCommand::So2WebValue(_) => CommandKind::So2WebValue,
            RemoteCommand::ImmoOff(_) => CommandKind::ImmoOff,
            RemoteCommand::ImmoOn(_) => CommandKind::ImmoOn,
        }
    }

    /// Request frame, after range checks on the payload.
    pub fn encode(&self) -> std::result::Result<Frame, RasError> {
        let request = |code: u8, arg: u8| Frame {
            id: ID_REMOTE_REQUEST,
            data: vec![code, arg],
            ..Frame::default()
        };
        let raw = |id: CanId, bytes: &[u8]| Frame {
            id,
            data: bytes.to_vec(),
            ..Frame::default()
        };
        let frame = match self {
            RemoteCommand::LockAllDoors => request(0x01, 0),
            RemoteCommand::LockAllDoorsConfirmed => request(0x02, 0),
            RemoteCommand::UnlockAllDoors => request(0x03, 0),
            RemoteCommand::UnlockDriverDoor => request(0x04, 0),
            RemoteCommand::UnlockTrunk => request(0x05, 0),
            RemoteCommand::HornOff => request(0x10, 0),
            RemoteCommand::HornOn => request(0x10, 1),
            RemoteCommand::LightsOff => request(0x11, 0),
            RemoteCommand::LightsOn => request(0x11, 1),
            RemoteCommand::ChargeData(on) => request(0x20, u8::from(*on)),
            RemoteCommand::ChargeLimitationDaily => request(0x21, 0),
            RemoteCommand::ChargeLimitationTrip => request(0x22, 0),
            RemoteCommand::EcranInfoPrgRtabRem(bytes) => raw(ID_ECRAN_INFO_PRG_RTAB_REM, bytes),
            RemoteCommand::EcranInfoPrgClimRem(bytes) => raw(ID_ECRAN_INFO_PRG_CLIM_REM, bytes),
            RemoteCommand::EcranInfoPrgClimRem2(bytes) => {
                raw(ID_ECRAN_INFO_PRG_CLIM_REM_2, bytes)
            }
            RemoteCommand::InfoLocationWeb(value) => {
                check_width(u16::from(*value), 2)?;
                web_value_frame(0x00, u16::from(*value))
            }
            RemoteCommand::No2WebValue(value) => {
                check_width(*value, 12)?;
                web_value_frame(0x01, *value)
            }
            RemoteCommand::O3WebValue(value) => {
                check_width(*value, 11)?;
                web_value_frame(0x02, *value)
            }
            RemoteCommand::Pm25WebValue(value) => {
                check_width(*value, 10)?;
                web_value_frame(0x03, *value)
            }
            RemoteCommand::So2WebValue(value) => {
                check_width(*value, 12)?;
                web_value_frame(0x04, *value)
            }
            RemoteCommand::ImmoOff(password) => immobilizer_frame(false, password)?,
            RemoteCommand::ImmoOn(password) => immobilizer_frame(true, password)?,
        };
        Ok(frame)
    }
}

pub trait RemoteAccessService: Service {
    fn request_lock_all_doors(&self) -> std::result::Result<(), RasError>;
    fn request_lock_all_doors_confirmed(&self) -> std::result::Result<(), RasError>;
    fn request_unlock_all_doors(&self) -> std::result::Result<(), RasError>;
    fn request_unlock_driver_door(&self) -> std::result::Result<(), RasError>;
    fn request_unlock_trunk(&self) -> std::result::Result<(), RasError>;
    fn request_remote_horn_off(&self) -> std::result::Result<(), RasError>;
    fn request_remote_horn_on(&self) -> std::result::Result<(), RasError>;
    fn request_turn_lights_off(&self) -> std::result::Result<(), RasError>;
    fn request_turn_lights_on(&self) -> std::result::Result<(), RasError>;
    fn send_ecran_info_prg_rtab_rem(
        &self,
        data: [u8; ECRAN_INFO_PRG_RTAB_REM_SIZE],
    ) -> std::result::Result<(), RasError>;
    fn send_ecran_info_prg_clim_rem(
        &self,
        data: [u8; ECRAN_INFO_PRG_CLIM_REM_SIZE],
    ) -> std::result::Result<(), RasError>;
    fn send_ecran_info_prg_clim_rem_2(
        &self,
        data: [u8; ECRAN_INFO_PRG_CLIM_REM_2_SIZE],
    ) -> std::result::Result<(), RasError>;
    fn request_charge_data(&self, request: bool) -> std::result::Result<(), RasError>;
    fn remote_charge_limitation_daily(&self) -> std::result::Result<(), RasError>;
    fn remote_charge_limitation_trip(&self) -> std::result::Result<(), RasError>;
    fn send_info_location_web(&self, value: u8) -> std::result::Result<(), RasError>;
    fn send_no2_web_value(&self, value: u16) -> std::result::Result<(), RasError>;
    fn send_o3_web_value(&self, value: u16) -> std::result::Result<(), RasError>;
    fn send_pm25_web_value(&self, value: u16) -> std::result::Result<(), RasError>;
    fn send_so2_web_value(&self, value: u16) -> std::result::Result<(), RasError>;
    /// `password` must be exactly 7 bytes
    fn request_immo_off(&self, password: &str) -> std::result::Result<(), RasError>;
    fn request_immo_on(&self, password: &str) -> std::result::Result<(), RasError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteAccessConfig {
    pub timeout_ms: u32,
    /// Commands the vehicle architecture does not carry
    pub disabled: Vec<CommandKind>,
}

impl Default for RemoteAccessConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 100,
            disabled: Vec::new(),
        }
    }
}

impl Config for RemoteAccessConfig {
    fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(TelematicsError::config(
                "remote_access.timeout_ms must be positive",
            ));
        }
        Ok(())
    }
}

/// Sends remote access requests to the vehicle through a bus port.
pub struct RemoteAccessGateway<P: Port> {
    config: RemoteAccessConfig,
    port: Mutex<P>,
}

impl<P: Port> RemoteAccessGateway<P> {
    pub fn new(config: RemoteAccessConfig, mut port: P) -> Result<Self> {
        config.validate()?;
        port.set_timeout(config.timeout_ms)?;
        Ok(Self {
            config,
            port: Mutex::new(port),
        })
    }

    pub fn dispatch(&self, command: RemoteCommand) -> std::result::Result<(), RasError> {
        if self.config.disabled.contains(&command.kind()) {
            warn!(command = ?command.kind(), "remote command not supported");
            return Err(RasError::NotSupported);
        }
        let frame = command.encode()?;
        let mut port = self.port.lock().map_err(|_| RasError::Error)?;
        port.send(&frame).map_err(|e| {
            warn!(command = ?command.kind(), error = %e, "remote command send failed");
            RasError::Error
        })?;
        debug!(command = ?command.kind(), id = frame.id, "remote command sent");
        Ok(())
    }

    /// Gives back the port, e.g. to inspect a recording double.
    pub fn into_port(self) -> Option<P> {
        self.port.into_inner().ok()
    }
}

impl<P: Port> Service for RemoteAccessGateway<P> {
    fn service_name(&self) -> &'static str {
        REMOTE_ACCESS_SERVICE_NAME
    }
}

impl<P: Port> RemoteAccessService for RemoteAccessGateway<P> {
    fn request_lock_all_doors(&self) -> std::result::Result<(), RasError> {
        self.dispatch(RemoteCommand::LockAllDoors)
    }

    fn request_lock_all_doors_confirmed(&self) -> std::result::Result<(), RasError> {
        self.dispatch(RemoteCommand::LockAllDoorsConfirmed)
    }

    fn request_unlock_all_doors(&self) -> std::result::Result<(), RasError> {
        self.dispatch(RemoteCommand::UnlockAllDoors)
    }

    fn request_unlock_driver_door(&self) -> std::result::Result<(), RasError> {
        self.dispatch(RemoteCommand::UnlockDriverDoor)
    }

    fn request_unlock_trunk(&self) -> std::result::Result<(), RasError> {
        self.dispatch(RemoteCommand::UnlockTrunk)
    }

    fn request_remote_horn_off(&self) -> std::result::Result<(), RasError> {
        self.dispatch(RemoteCommand::HornOff)
    }

    fn request_remote_horn_on(&self) -> std::result::Result<(), RasError> {
        self.dispatch(RemoteCommand::HornOn)
    }

    fn request_turn_lights_off(&self) -> std::result::Result<(), RasError> {
        self.dispatch(RemoteCommand::LightsOff)
    }

    fn request_turn_lights_on(&self) -> std::result::Result<(), RasError> {
        self.dispatch(RemoteCommand::LightsOn)
    }

    fn send_ecran_info_prg_rtab_rem(
        &self,
        data: [u8; ECRAN_INFO_PRG_RTAB_REM_SIZE],
    ) -> std::result::Result<(), RasError> {
        self.dispatch(RemoteCommand::EcranInfoPrgRtabRem(data))
    }

    fn send_ecran_info_prg_clim_rem(
        &self,
        data: [u8; ECRAN_INFO_PRG_CLIM_REM_SIZE],
    ) -> std::result::Result<(), RasError> {
        self.dispatch(RemoteCommand::EcranInfoPrgClimRem(data))
    }

    fn send_ecran_info_prg_clim_rem_2(
        &self,
        data: [u8; ECRAN_INFO_PRG_CLIM_REM_2_SIZE],
    ) -> std::result::Result<(), RasError> {
        self.dispatch(RemoteCommand::EcranInfoPrgClimRem2(data))
    }

    fn request_charge_data(&self, request: bool) -> std::result::Result<(), RasError> {
        self.dispatch(RemoteCommand::ChargeData(request))
    }

    fn remote_charge_limitation_daily(&self) -> std::result::Result<(), RasError> {
        self.dispatch(RemoteCommand::ChargeLimitationDaily)
    }

    fn remote_charge_limitation_trip(&self) -> std::result::Result<(), RasError> {
        self.dispatch(RemoteCommand::ChargeLimitationTrip)
    }

    fn send_info_location_web(&self, value: u8) -> std::result::Result<(), RasError> {
        self.dispatch(RemoteCommand::InfoLocationWeb(value))
    }

    fn send_no2_web_value(&self, value: u16) -> std::result::Result<(), RasError> {
        self.dispatch(RemoteCommand::No2WebValue(value))
    }

    fn send_o3_web_value(&self, value: u16) -> std::result::Result<(), RasError> {
        self.dispatch(RemoteCommand::O3WebValue(value))
    }

    fn send_pm25_web_value(&self, value: u16) -> std::result::Result<(), RasError> {
        self.dispatch(RemoteCommand::Pm25WebValue(value))
    }

    fn send_so2_web_value(&self, value: u16) -> std::result::Result<(), RasError> {
        self.dispatch(RemoteCommand::So2WebValue(value))
    }

    fn request_immo_off(&self, password: &str) -> std::result::Result<(), RasError> {
        self.dispatch(RemoteCommand::ImmoOff(password.to_string()))
    }

    fn request_immo_on(&self, password: &str) -> std::result::Result<(), RasError> {
        self.dispatch(RemoteCommand::ImmoOn(password.to_string()))
    }
}
