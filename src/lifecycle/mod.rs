//! Application lifecycle and power management contracts.
//!
//! Every application obtains one [`LifecycleMonitor`] from the
//! [`EarlyInitService`]. The monitor tells the application which state it
//! must enter, tracks the availability of the services it depends on, and
//! exposes the power subsystem: CAN wake-up, RTC alarms, keep-awake requests
//! and backup battery telemetry.

pub mod early_init;
pub mod monitor;
pub mod supervision;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{Result, TelematicsError};
use crate::event::Event;
use crate::types::{AppContext, Config, Service};

pub use early_init::EarlyInit;
pub use monitor::AppLifecycleMonitor;

pub const EARLY_INIT_SERVICE_NAME: &str = "stla.appfwk.einitbundle.service";

/// Outcome of a failed lifecycle operation
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LcmError {
    #[error("generic failure")]
    Failure = 1,
    #[error("invalid argument")]
    InvalidArg = 2,
    #[error("duplicated registration")]
    DuplicateReg = 3,
    #[error("application not registered")]
    NotRegistered = 4,
    #[error("internal error")]
    InternalErr = 5,
    #[error("operation not allowed")]
    NoPerm = 6,
    #[error("service busy, try again")]
    Busy = 7,
}

impl LcmError {
    /// Wire value; success is 0
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Only `Busy` may succeed on retry without a state change
    pub fn is_retryable(self) -> bool {
        self == LcmError::Busy
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppState {
    Initializing = 0,
    Idle = 1,
    Normal = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppStateReason {
    None = 0,
    Shutdown = 1,
    SuspendRam = 2,
    Reboot = 3,
    ServicesReady = 4,
    ServicesNotReady = 5,
}

/// State an application has to enter, always paired with its cause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppStateRecord {
    pub state: AppState,
    pub reason: AppStateReason,
}

impl AppStateRecord {
    pub const fn new(state: AppState, reason: AppStateReason) -> Self {
        Self { state, reason }
    }
}

impl Default for AppStateRecord {
    fn default() -> Self {
        Self::new(AppState::Initializing, AppStateReason::None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SrvState {
    Unavailable = 0,
    Initializing = 1,
    Available = 2,
}

/// Service state change reported by a service to the early-init bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SrvStateRecord {
    pub state: SrvState,
    pub service_name: String,
}

impl SrvStateRecord {
    pub fn new(service_name: impl Into<String>, state: SrvState) -> Self {
        Self {
            state,
            service_name: service_name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SrvDisableReason {
    NotAllowed = 0,
    LowPower = 1,
    DepsUnavailable = 2,
}

/// Global RTC alarm handle
pub type RtcAlarmHandle = i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    Emergency = 0,
    Nominal = 1,
    Update = 3,
    BeforeSleep = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CanNetworkState {
    Off = 0,
    On = 1,
    OffToCause = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParkModeState {
    Off = 0,
    On = 1,
}

/// Pairs the global handle with the index returned by `create_rtc_alarm`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtcAlarmCreated {
    pub alarm_handle: RtcAlarmHandle,
    pub index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackupBatteryStatus {
    Absent = 0,
    Broken = 1,
    InactiveCharging = 2,
    Inactive = 3,
    /// BUB is the active power source
    Active = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BubSoc {
    AbsentOrBroken = 0,
    VeryLow = 1,
    Low = 2,
    High = 3,
    Full = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BubSoh {
    Absent = 0,
    Broken = 1,
    Operational = 2,
    InProgress = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeepAwakeRequest {
    Inactive = 0,
    Active = 1,
}

impl TryFrom<u32> for KeepAwakeRequest {
    type Error = LcmError;

    fn try_from(value: u32) -> std::result::Result<Self, LcmError> {
        match value {
            0 => Ok(KeepAwakeRequest::Inactive),
            1 => Ok(KeepAwakeRequest::Active),
            _ => Err(LcmError::InvalidArg),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeepAwakeStatus {
    Inactive = 0,
    Active = 1,
    Finished = 2,
    RjctOnBub = 3,
    RjctForcedShutdown = 4,
    RjctWrongState = 5,
    RjctAppShutdown = 6,
    Pending = 7,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CauseX {
    None = 0,
    Cause1 = 1,
    Cause2 = 2,
    Cause3 = 3,
    Cause4 = 4,
    Cause5 = 5,
    Cause6 = 6,
    Cause7 = 7,
    Cause8 = 8,
}

impl TryFrom<u32> for CauseX {
    type Error = LcmError;

    fn try_from(value: u32) -> std::result::Result<Self, LcmError> {
        Ok(match value {
            0 => CauseX::None,
            1 => CauseX::Cause1,
            2 => CauseX::Cause2,
            3 => CauseX::Cause3,
            4 => CauseX::Cause4,
            5 => CauseX::Cause5,
            6 => CauseX::Cause6,
            7 => CauseX::Cause7,
            8 => CauseX::Cause8,
            _ => return Err(LcmError::InvalidArg),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WakeupReason {
    Can = 0,
    /// eCall or aCall
    Ecall = 1,
    /// Deprecated
    Bcall = 2,
    PowerSupplyLost = 3,
    Sms = 4,
    Data = 5,
    /// Deprecated
    Rtc = 6,
    VehicleMovement = 7,
    VoiceCall = 8,
    /// General purpose timer expired
    Gpt = 9,
    Generic = 10,
    /// Application RTC alarm expired
    RtcApp = 11,
    RtcSwm = 12,
    /// Set while the lifecycle state is `BeforeSleep`
    Undefined = 13,
}

/// Acknowledgement forwarded to the lifecycle coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppStateAck {
    pub app: String,
    pub state: AppStateRecord,
}

/// Notification channels of a lifecycle monitor
#[derive(Debug, Default)]
pub struct LifecycleEvents {
    pub app_state: Event<AppStateRecord>,
    pub opt_service_available: Event<String>,
    pub opt_service_unavailable: Event<String>,
    pub lifecycle_state: Event<LifecycleState>,
    pub can_network_state: Event<CanNetworkState>,
    pub park_mode_state: Event<ParkModeState>,
    pub rtc_alarm_created: Event<RtcAlarmCreated>,
    pub rtc_alarm_expired: Event<RtcAlarmHandle>,
    pub rtc_alarm_deleted: Event<RtcAlarmHandle>,
    pub backup_battery_status: Event<BackupBatteryStatus>,
    /// Cyclic, millivolts
    pub backup_battery_voltage: Event<u32>,
    /// Cyclic, degrees Celsius
    pub backup_battery_temperature: Event<i32>,
    pub backup_battery_soh: Event<BubSoh>,
    pub backup_battery_charge_level: Event<BubSoc>,
    pub wakeup_reason: Event<WakeupReason>,
    pub keep_awake_status: Event<KeepAwakeStatus>,
}

/// Per-application lifecycle contract
pub trait LifecycleMonitor: Send + Sync {
    fn app_name(&self) -> &str;

    /// Last state requested through the `app_state` channel
    fn requested_app_state(&self) -> AppStateRecord;

    /// Reports that the application finished its transition to `state`.
    fn ack_app_state(&self, state: AppStateRecord);

    /// Starts dependency notifications once the application has subscribed.
    ///
    /// A state already requested before the call (for instance `Normal`
    /// because every mandatory service was up) is delivered on `app_state`,
    /// and every available optional service on `opt_service_available`.
    /// Later calls do nothing.
    fn start(&self);

    /// `InvalidArg` if `name` is not a declared dependency
    fn service_availability(&self, name: &str) -> std::result::Result<bool, LcmError>;

    /// On `Pending`, wait for the `keep_awake_status` event for the outcome.
    fn keep_awake_request(
        &self,
        request: KeepAwakeRequest,
    ) -> std::result::Result<KeepAwakeStatus, LcmError>;

    fn request_can_wakeup(&self, cause: CauseX) -> std::result::Result<(), LcmError>;

    fn can_state(&self) -> std::result::Result<CanNetworkState, LcmError>;
    fn park_mode_state(&self) -> std::result::Result<ParkModeState, LcmError>;

    /// Returns the local index; the global handle follows on `rtc_alarm_created`.
    fn create_rtc_alarm(&self, cycles: u32, period_minutes: u32)
        -> std::result::Result<u32, LcmError>;
    fn delete_rtc_alarm(&self, handle: RtcAlarmHandle) -> std::result::Result<(), LcmError>;
    fn acknowledge_rtc_alarm(&self, handle: RtcAlarmHandle) -> std::result::Result<(), LcmError>;

    fn backup_battery_status(&self) -> std::result::Result<BackupBatteryStatus, LcmError>;
    fn backup_battery_voltage(&self) -> std::result::Result<u32, LcmError>;
    fn backup_battery_temperature(&self) -> std::result::Result<i32, LcmError>;
    fn backup_battery_soh(&self) -> std::result::Result<BubSoh, LcmError>;
    fn backup_battery_charge_level(&self) -> std::result::Result<BubSoc, LcmError>;

    /// `Busy` until every wake-up source has been validated
    fn wakeup_reason(&self) -> std::result::Result<WakeupReason, LcmError>;
    fn lifecycle_state(&self) -> std::result::Result<LifecycleState, LcmError>;
    fn is_cdno_active(&self) -> std::result::Result<bool, LcmError>;

    fn events(&self) -> &LifecycleEvents;
}

/// Identity of the early-init bundle instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceId {
    pub id: String,
    pub third_party: bool,
}

/// Factory for lifecycle monitors
pub trait EarlyInitService: Service {
    fn instance_id(&self) -> InstanceId;

    fn lifecycle_monitor(
        &self,
        ctx: &AppContext,
        mandatory: &[String],
        optional: &[String],
    ) -> std::result::Result<Arc<dyn LifecycleMonitor>, LcmError>;
}

/// How keep-awake activations are confirmed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeepAwakeConfirmation {
    /// The request is granted synchronously
    Immediate,
    /// The request returns `Pending`; the coordinator resolves it later
    Deferred,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub max_rtc_alarms: usize,
    pub max_alarm_cycles: u32,
    pub min_alarm_period_minutes: u32,
    pub max_alarm_period_minutes: u32,
    pub max_can_wakeup_retries: u32,
    pub keep_awake_confirmation: KeepAwakeConfirmation,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            max_rtc_alarms: 5,
            max_alarm_cycles: 255,
            min_alarm_period_minutes: 5,
            max_alarm_period_minutes: 65535,
            max_can_wakeup_retries: 3,
            keep_awake_confirmation: KeepAwakeConfirmation::Immediate,
        }
    }
}

impl Config for LifecycleConfig {
    fn validate(&self) -> Result<()> {
        if self.max_rtc_alarms == 0 || self.max_alarm_cycles == 0 {
            return Err(TelematicsError::config(
                "lifecycle alarm limits must be positive",
            ));
        }
        if self.min_alarm_period_minutes == 0
            || self.min_alarm_period_minutes > self.max_alarm_period_minutes
        {
            return Err(TelematicsError::config(
                "lifecycle alarm period range is empty",
            ));
        }
        Ok(())
    }
}
