//! GNSS and enhanced (dead reckoning) positioning contracts.

pub mod hub;
pub mod provider;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{Result, TelematicsError};
use crate::event::Event;
use crate::types::{Config, Service, Timestamp};

pub use hub::PositioningHub;
pub use provider::PosDataCache;

pub const POSITIONING_SERVICE_NAME: &str = "com.stla.PositioningService";

/// Longest past window a data request may ask for
pub const MAX_PAST_SECONDS: u32 = 120;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositioningError {
    #[error("invalid argument")]
    InvalidArgument,
    #[error("positioning data unavailable")]
    Unavailable,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GnssFixStatus {
    #[default]
    NoFix,
    TimeOnly,
    Fix2D,
    Fix3D,
}

bitflags! {
    /// Valid fields of a [`GnssPosition`]
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct GnssPositionValidity: u32 {
        const LATITUDE = 0x0000_0001;
        const LONGITUDE = 0x0000_0002;
        const ALTITUDE_MSL = 0x0000_0004;
        const HSPEED = 0x0000_0010;
        const VSPEED = 0x0000_0020;
        const HEADING = 0x0000_0040;
        const PDOP = 0x0000_0080;
        const HDOP = 0x0000_0100;
        const VDOP = 0x0000_0200;
        const USAT = 0x0000_0400;
        const TSAT = 0x0000_0800;
        const VSAT = 0x0000_1000;
        const SHPOS = 0x0000_2000;
        const FIX_STATUS = 0x0002_0000;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GnssPosition {
    /// ms
    pub timestamp: Timestamp,
    pub latitude: f64,
    pub longitude: f64,
    /// m
    pub altitude_msl: f32,
    /// m/s
    pub h_speed: f32,
    pub v_speed: f32,
    /// degrees from north
    pub heading: f32,
    pub pdop: f32,
    pub hdop: f32,
    pub vdop: f32,
    pub used_satellites: u16,
    pub tracked_satellites: u16,
    pub visible_satellites: u16,
    pub sigma_h_position: f32,
    pub fix_status: GnssFixStatus,
    pub validity: GnssPositionValidity,
}

impl GnssPosition {
    pub fn has_horizontal_position(&self) -> bool {
        self.validity
            .contains(GnssPositionValidity::LATITUDE | GnssPositionValidity::LONGITUDE)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct GnssTimeValidity: u32 {
        const DATE = 0x0000_0001;
        const TIME = 0x0000_0002;
        const MSEC = 0x0000_0004;
    }
}

/// UTC time reported by the receiver
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GnssTime {
    pub timestamp: Timestamp,
    pub year: u16,
    /// 0..=11
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub ms: u16,
    pub validity: GnssTimeValidity,
}

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct GnssSystem: u32 {
        const GPS = 0x0000_0001;
        const GLONASS = 0x0000_0002;
        const GALILEO = 0x0000_0004;
        const BEIDOU = 0x0000_0008;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct SatelliteStatus: u32 {
        const USED = 0x0000_0001;
        const EPHEMERIS_AVAILABLE = 0x0000_0002;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SatelliteDetail {
    pub timestamp: Timestamp,
    pub system: GnssSystem,
    pub satellite_id: u16,
    /// degrees
    pub azimuth: u16,
    pub elevation: u16,
    /// dBHz
    pub cn0: u16,
    pub status: SatelliteStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnhancedPositionFixType {
    #[default]
    None,
    GnssOnly,
    DrOnly,
    GnssDr,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeadReckoningStatus {
    /// Sensor fault or no GNSS position
    #[default]
    Fault,
    Calibrating,
    Calibrated,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadReckoningInfo {
    pub status: DeadReckoningStatus,
    /// Percent; above 50 means a good calibration
    pub quality: u8,
}

bitflags! {
    /// Valid fields of an [`EnhancedPosition`]
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct EnhancedValidity: u32 {
        const HPOS = 0x0000_0001;
        const SHPOS = 0x0000_0002;
        const HSPEED = 0x0000_0010;
        const HEADING = 0x0000_0040;
        const DR_INFO = 0x4000_0000;
        const FIX_TYPE = 0x8000_0000;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EnhancedPosition {
    pub timestamp: Timestamp,
    pub latitude: f64,
    pub longitude: f64,
    pub h_speed: f32,
    pub heading: f32,
    pub sigma_h_position: f32,
    pub dr_info: DeadReckoningInfo,
    pub fix_type: EnhancedPositionFixType,
    pub validity: EnhancedValidity,
}

impl EnhancedPosition {
    /// Produced by a calibrated dead reckoning algorithm
    pub fn is_calibrated(&self) -> bool {
        self.validity.contains(EnhancedValidity::DR_INFO)
            && self.dr_info.status == DeadReckoningStatus::Calibrated
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineStatus {
    NotRunning = 0,
    Starting = 1,
    Running = 2,
    Stopped = 3,
    #[default]
    Unknown = 4,
}

/// Vehicle power mode (SEV)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SevStatus {
    Stop = 0,
    Contact = 1,
    Dem = 2,
    NotUsed = 3,
    #[default]
    Unknown = 4,
}

#[derive(Debug, Default)]
pub struct PositioningEvents {
    pub gnss_position_update: Event<GnssPosition>,
    pub gnss_time_update: Event<GnssTime>,
    pub satellite_details_update: Event<Vec<SatelliteDetail>>,
    pub enhanced_position_update: Event<EnhancedPosition>,
    /// Meters travelled in the current trip
    pub traveled_distance_update: Event<u32>,
}

pub trait PositioningService: Service {
    fn gnss_position(&self) -> GnssPosition;
    /// Last 3D fix of this power cycle; `fix_status` is `NoFix` if there was none.
    fn last_valid_gnss_position(&self) -> GnssPosition;
    fn gnss_time(&self) -> GnssTime;
    fn satellite_details(&self) -> Vec<SatelliteDetail>;
    /// Seconds from the first sample to the first 3D fix, 0 until then
    fn time_to_first_fix(&self) -> u32;
    fn enhanced_position(&self) -> EnhancedPosition;
    /// Last position from a calibrated DR algorithm, otherwise fix type `None`
    fn last_valid_enhanced_position(&self) -> EnhancedPosition;
    /// Meters
    fn traveled_distance(&self) -> u32;
    fn events(&self) -> &PositioningEvents;
}

pub type PosTriggerId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GnssPayload {
    pub trigger_id: PosTriggerId,
    pub data: GnssPosition,
}

#[derive(Debug, Default)]
pub struct PosDataEvents {
    pub cached_data_deliver: Event<GnssPayload>,
    pub live_data_deliver: Event<GnssPayload>,
    pub data_intake_interrupted: Event<()>,
    pub data_intake_resumed: Event<()>,
}

/// Windowed access to GNSS positions
pub trait PosDataProvider: Send + Sync {
    /// Sends cached samples of the last `past_s` seconds (at most
    /// [`MAX_PAST_SECONDS`]) then live samples for `future_s` seconds, or
    /// until cancelled when `future_s` is 0.
    fn pos_data_request(&self, past_s: u32, future_s: u32)
        -> std::result::Result<PosTriggerId, PositioningError>;
    /// False if `id` is not an active trigger
    fn cancel(&self, id: PosTriggerId) -> bool;
    fn events(&self) -> &PosDataEvents;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PositioningConfig {
    pub cache_window_s: u32,
    /// Missing samples for longer than this interrupt the intake
    pub intake_timeout_ms: u64,
    /// Engine off time that ends a trip
    pub trip_end_delay_ms: u64,
}

impl Default for PositioningConfig {
    fn default() -> Self {
        Self {
            cache_window_s: MAX_PAST_SECONDS,
            intake_timeout_ms: 3000,
            trip_end_delay_ms: 10_000,
        }
    }
}

impl Config for PositioningConfig {
    fn validate(&self) -> Result<()> {
        if self.cache_window_s < MAX_PAST_SECONDS {
            return Err(TelematicsError::config(format!(
                "positioning.cache_window_s must cover {} s",
                MAX_PAST_SECONDS
            )));
        }
        if self.intake_timeout_ms == 0 {
            return Err(TelematicsError::config(
                "positioning.intake_timeout_ms must be positive",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
