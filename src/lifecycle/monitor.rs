use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use super::*;

struct RtcAlarm {
    index: u32,
    cycles_left: u32,
    period_minutes: u32,
    expired: bool,
}

struct MonitorState {
    dependencies: BTreeMap<String, SrvState>,
    app_state: AppStateRecord,
    registered: bool,
    /// Dependency notifications are held back until the application subscribed
    started: bool,
    lifecycle_state: LifecycleState,
    can_state: CanNetworkState,
    park_mode: ParkModeState,
    battery_status: BackupBatteryStatus,
    battery_voltage: Option<u32>,
    battery_temperature: Option<i32>,
    battery_soh: BubSoh,
    battery_soc: BubSoc,
    wakeup_reason: Option<WakeupReason>,
    cdno_active: bool,
    keep_awake: KeepAwakeStatus,
    can_cause: CauseX,
    can_retries: u32,
    alarms: BTreeMap<RtcAlarmHandle, RtcAlarm>,
    next_index: u32,
}

/// Lifecycle monitor of a single application.
///
/// The application side uses the [`LifecycleMonitor`] trait. The `on_*`
/// methods are the system side: they update the cached value first and then
/// publish, so a getter never returns a value older than the last
/// notification delivered on the same channel.
pub struct AppLifecycleMonitor {
    app: String,
    config: LifecycleConfig,
    mandatory: BTreeSet<String>,
    state: Mutex<MonitorState>,
    events: LifecycleEvents,
    acks: Event<AppStateAck>,
    handles: Arc<AtomicI32>,
}

impl AppLifecycleMonitor {
    /// Creates a registered, started monitor with every dependency `Unavailable`.
    pub fn new(
        app: impl Into<String>,
        mandatory: &[String],
        optional: &[String],
        config: LifecycleConfig,
    ) -> Self {
        let mut monitor = Self::with_coordinator(
            app,
            mandatory,
            optional,
            config,
            Event::new(),
            Arc::new(AtomicI32::new(1)),
        );
        if let Ok(state) = monitor.state.get_mut() {
            state.started = true;
        }
        monitor
    }

    pub(crate) fn with_coordinator(
        app: impl Into<String>,
        mandatory: &[String],
        optional: &[String],
        config: LifecycleConfig,
        acks: Event<AppStateAck>,
        handles: Arc<AtomicI32>,
    ) -> Self {
        let dependencies = mandatory
            .iter()
            .chain(optional.iter())
            .map(|name| (name.clone(), SrvState::Unavailable))
            .collect();
        Self {
            app: app.into(),
            config,
            mandatory: mandatory.iter().cloned().collect(),
            state: Mutex::new(MonitorState {
                dependencies,
                app_state: AppStateRecord::default(),
                registered: true,
                started: false,
                lifecycle_state: LifecycleState::Nominal,
                can_state: CanNetworkState::Off,
                park_mode: ParkModeState::Off,
                battery_status: BackupBatteryStatus::Inactive,
                battery_voltage: None,
                battery_temperature: None,
                battery_soh: BubSoh::InProgress,
                battery_soc: BubSoc::Full,
                wakeup_reason: None,
                cdno_active: false,
                keep_awake: KeepAwakeStatus::Inactive,
                can_cause: CauseX::None,
                can_retries: 0,
                alarms: BTreeMap::new(),
                next_index: 0,
            }),
            events: LifecycleEvents::default(),
            acks,
            handles,
        }
    }

    fn state(&self) -> std::result::Result<MutexGuard<'_, MonitorState>, LcmError> {
        self.state.lock().map_err(|_| LcmError::InternalErr)
    }

    /// Applies `update` under the lock, then publishes its result on `event`.
    fn publish<V, F>(&self, event: &Event<V>, update: F)
    where
        V: 'static,
        F: FnOnce(&mut MonitorState) -> V,
    {
        let value = match self.state() {
            Ok(mut state) => update(&mut state),
            Err(_) => {
                warn!(app = %self.app, "lifecycle state lock poisoned, notification dropped");
                return;
            }
        };
        event.notify(&value);
    }

    fn mandatory_ready(&self, state: &MonitorState) -> bool {
        self.mandatory
            .iter()
            .all(|name| state.dependencies.get(name) == Some(&SrvState::Available))
    }

    /// Dependency resolution input. Names outside the declared dependencies are ignored.
    pub fn on_service_state(&self, record: &SrvStateRecord) {
        let name = &record.service_name;
        let mut app_change = None;
        let mut optional_change = None;
        {
            let Ok(mut state) = self.state() else {
                return;
            };
            let was_ready = self.mandatory_ready(&state);
            let previous = match state.dependencies.get_mut(name) {
                Some(slot) => std::mem::replace(slot, record.state),
                None => {
                    debug!(app = %self.app, service = %name, "state of undeclared service ignored");
                    return;
                }
            };
            if previous == record.state {
                return;
            }

            if self.mandatory.contains(name) {
                let now_ready = self.mandatory_ready(&state);
                let next = if now_ready && !was_ready {
                    Some(AppStateRecord::new(AppState::Normal, AppStateReason::ServicesReady))
                } else if was_ready && !now_ready {
                    Some(AppStateRecord::new(
                        AppState::Idle,
                        AppStateReason::ServicesNotReady,
                    ))
                } else {
                    None
                };
                if let Some(next) = next {
                    state.app_state = next;
                    app_change = Some(next);
                }
            } else if record.state == SrvState::Available {
                optional_change = Some(true);
            } else if previous == SrvState::Available || record.state == SrvState::Unavailable {
                optional_change = Some(false);
            }
            if !state.started {
                app_change = None;
                optional_change = None;
            }
        }

        if let Some(next) = app_change {
            info!(app = %self.app, service = %name, ?next, "application state change requested");
            self.events.app_state.notify(&next);
        }
        match optional_change {
            Some(true) => {
                self.events.opt_service_available.notify(name);
            }
            Some(false) => {
                self.events.opt_service_unavailable.notify(name);
            }
            None => {}
        }
    }

    /// Publishes the current readiness if all mandatory dependencies are already available.
    pub fn refresh_readiness(&self) {
        let ready = match self.state() {
            Ok(mut state) => {
                if self.mandatory_ready(&state) && state.app_state.state != AppState::Normal {
                    let next =
                        AppStateRecord::new(AppState::Normal, AppStateReason::ServicesReady);
                    state.app_state = next;
                    state.started.then_some(next)
                } else {
                    None
                }
            }
            Err(_) => None,
        };
        if let Some(next) = ready {
            info!(app = %self.app, "all mandatory services available");
            self.events.app_state.notify(&next);
        }
    }

    fn request_stop(&self, reason: AppStateReason) {
        let mut forced = false;
        self.publish(&self.events.app_state, |state| {
            if reason == AppStateReason::Shutdown
                && matches!(
                    state.keep_awake,
                    KeepAwakeStatus::Active | KeepAwakeStatus::Pending
                )
            {
                state.keep_awake = KeepAwakeStatus::RjctForcedShutdown;
                forced = true;
            }
            state.app_state = AppStateRecord::new(AppState::Idle, reason);
            state.app_state
        });
        info!(app = %self.app, ?reason, "application stop requested");
        if forced {
            self.events
                .keep_awake_status
                .notify(&KeepAwakeStatus::RjctForcedShutdown);
        }
    }

    pub fn on_shutdown(&self) {
        self.request_stop(AppStateReason::Shutdown);
    }

    pub fn on_suspend(&self) {
        self.request_stop(AppStateReason::SuspendRam);
    }

    pub fn on_reboot(&self) {
        self.request_stop(AppStateReason::Reboot);
    }

    /// Registration with the TCU state manager; unregistered monitors reject power requests.
    pub fn set_registered(&self, registered: bool) {
        if let Ok(mut state) = self.state() {
            state.registered = registered;
        }
    }

    pub fn on_lifecycle_state(&self, value: LifecycleState) {
        self.publish(&self.events.lifecycle_state, |state| {
            state.lifecycle_state = value;
            if value == LifecycleState::BeforeSleep {
                state.wakeup_reason = Some(WakeupReason::Undefined);
            }
            value
        });
    }

    pub fn on_can_state(&self, value: CanNetworkState) {
        self.publish(&self.events.can_network_state, |state| {
            state.can_state = value;
            if value == CanNetworkState::On {
                state.can_retries = 0;
            }
            value
        });
    }

    pub fn on_park_mode(&self, value: ParkModeState) {
        self.publish(&self.events.park_mode_state, |state| {
            state.park_mode = value;
            value
        });
    }

    pub fn on_battery_status(&self, value: BackupBatteryStatus) {
        self.publish(&self.events.backup_battery_status, |state| {
            state.battery_status = value;
            value
        });
    }

    pub fn on_battery_voltage(&self, millivolts: u32) {
        self.publish(&self.events.backup_battery_voltage, |state| {
            state.battery_voltage = Some(millivolts);
            millivolts
        });
    }

    pub fn on_battery_temperature(&self, celsius: i32) {
        self.publish(&self.events.backup_battery_temperature, |state| {
            state.battery_temperature = Some(celsius);
            celsius
        });
    }

    pub fn on_battery_soh(&self, value: BubSoh) {
        self.publish(&self.events.backup_battery_soh, |state| {
            state.battery_soh = value;
            value
        });
    }

    pub fn on_battery_charge_level(&self, value: BubSoc) {
        self.publish(&self.events.backup_battery_charge_level, |state| {
            state.battery_soc = value;
            value
        });
    }

    pub fn on_wakeup_reason(&self, value: WakeupReason) {
        self.publish(&self.events.wakeup_reason, |state| {
            state.wakeup_reason = Some(value);
            value
        });
    }

    pub fn on_cdno(&self, active: bool) {
        if let Ok(mut state) = self.state() {
            state.cdno_active = active;
        }
    }

    /// Marks an armed alarm as expired. Returns false for unknown or already expired handles.
    pub fn on_rtc_alarm_expired(&self, handle: RtcAlarmHandle) -> bool {
        let fired = match self.state() {
            Ok(mut state) => match state.alarms.get_mut(&handle) {
                Some(alarm) if !alarm.expired => {
                    alarm.expired = true;
                    state.wakeup_reason = Some(WakeupReason::RtcApp);
                    true
                }
                _ => false,
            },
            Err(_) => false,
        };
        if fired {
            info!(app = %self.app, handle, "rtc alarm expired");
            self.events.rtc_alarm_expired.notify(&handle);
        }
        fired
    }

    /// The acknowledgement window elapsed; the expiry counts as acknowledged.
    pub fn on_rtc_alarm_ack_timeout(&self, handle: RtcAlarmHandle) {
        if let Err(err) = self.consume_expiry(handle) {
            debug!(app = %self.app, handle, %err, "ack timeout for alarm without pending expiry");
        }
    }

    /// Delivers the coordinator's answer to a `Pending` keep-awake request.
    pub fn resolve_keep_awake(&self, status: KeepAwakeStatus) -> bool {
        let resolved = match self.state() {
            Ok(mut state) if state.keep_awake == KeepAwakeStatus::Pending => {
                state.keep_awake = status;
                true
            }
            _ => false,
        };
        if resolved {
            self.events.keep_awake_status.notify(&status);
        }
        resolved
    }

    pub fn rtc_alarm_count(&self) -> usize {
        self.state().map(|s| s.alarms.len()).unwrap_or(0)
    }

    fn consume_expiry(&self, handle: RtcAlarmHandle) -> std::result::Result<(), LcmError> {
        let deleted = {
            let mut state = self.state()?;
            let alarm = state.alarms.get_mut(&handle).ok_or(LcmError::InvalidArg)?;
            if !alarm.expired {
                return Err(LcmError::NoPerm);
            }
            alarm.expired = false;
            alarm.cycles_left = alarm.cycles_left.saturating_sub(1);
            if alarm.cycles_left == 0 {
                state.alarms.remove(&handle);
                true
            } else {
                false
            }
        };
        if deleted {
            info!(app = %self.app, handle, "rtc alarm cycles exhausted");
            self.events.rtc_alarm_deleted.notify(&handle);
        }
        Ok(())
    }
}

impl LifecycleMonitor for AppLifecycleMonitor {
    fn app_name(&self) -> &str {
        &self.app
    }

    fn requested_app_state(&self) -> AppStateRecord {
        self.state().map(|s| s.app_state).unwrap_or_default()
    }

    fn ack_app_state(&self, state: AppStateRecord) {
        debug!(app = %self.app, ?state, "application state acknowledged");
        // Detached: the coordinator is informed off the caller's thread.
        drop(self.acks.notify_async(AppStateAck {
            app: self.app.clone(),
            state,
        }));
    }

    fn start(&self) {
        let (pending, available) = match self.state() {
            Ok(mut state) => {
                if std::mem::replace(&mut state.started, true) {
                    return;
                }
                let pending = (state.app_state != AppStateRecord::default())
                    .then_some(state.app_state);
                let available: Vec<String> = state
                    .dependencies
                    .iter()
                    .filter(|(name, srv)| {
                        **srv == SrvState::Available && !self.mandatory.contains(*name)
                    })
                    .map(|(name, _)| name.clone())
                    .collect();
                (pending, available)
            }
            Err(_) => return,
        };
        debug!(app = %self.app, ?pending, "lifecycle monitor started");
        if let Some(next) = pending {
            self.events.app_state.notify(&next);
        }
        for name in &available {
            self.events.opt_service_available.notify(name);
        }
    }

    fn service_availability(&self, name: &str) -> std::result::Result<bool, LcmError> {
        let state = self.state()?;
        match state.dependencies.get(name) {
            Some(srv) => Ok(*srv == SrvState::Available),
            None => Err(LcmError::InvalidArg),
        }
    }

    fn keep_awake_request(
        &self,
        request: KeepAwakeRequest,
    ) -> std::result::Result<KeepAwakeStatus, LcmError> {
        let outcome = {
            let mut state = self.state()?;
            if !state.registered {
                return Err(LcmError::NotRegistered);
            }
            match request {
                KeepAwakeRequest::Active => {
                    let rejection = if state.battery_status == BackupBatteryStatus::Active {
                        Some(KeepAwakeStatus::RjctOnBub)
                    } else if state.app_state.reason == AppStateReason::Shutdown {
                        Some(KeepAwakeStatus::RjctAppShutdown)
                    } else if !matches!(
                        state.lifecycle_state,
                        LifecycleState::Nominal | LifecycleState::BeforeSleep
                    ) {
                        Some(KeepAwakeStatus::RjctWrongState)
                    } else {
                        None
                    };
                    match rejection {
                        Some(status) => {
                            state.keep_awake = status;
                            Err(status)
                        }
                        None => {
                            let status = match self.config.keep_awake_confirmation {
                                KeepAwakeConfirmation::Immediate => KeepAwakeStatus::Active,
                                KeepAwakeConfirmation::Deferred => KeepAwakeStatus::Pending,
                            };
                            state.keep_awake = status;
                            Ok(status)
                        }
                    }
                }
                KeepAwakeRequest::Inactive => {
                    let status = if matches!(
                        state.keep_awake,
                        KeepAwakeStatus::Active | KeepAwakeStatus::Pending
                    ) {
                        KeepAwakeStatus::Finished
                    } else {
                        KeepAwakeStatus::Inactive
                    };
                    state.keep_awake = status;
                    Ok(status)
                }
            }
        };

        match outcome {
            Ok(status) => {
                debug!(app = %self.app, ?status, "keep awake updated");
                self.events.keep_awake_status.notify(&status);
                Ok(status)
            }
            Err(status) => {
                warn!(app = %self.app, ?status, "keep awake rejected");
                self.events.keep_awake_status.notify(&status);
                Err(LcmError::NoPerm)
            }
        }
    }

    fn request_can_wakeup(&self, cause: CauseX) -> std::result::Result<(), LcmError> {
        let mut state = self.state()?;
        if !state.registered {
            return Err(LcmError::NotRegistered);
        }
        if cause == CauseX::None {
            state.can_cause = CauseX::None;
            return Ok(());
        }
        if !matches!(
            state.lifecycle_state,
            LifecycleState::Nominal | LifecycleState::BeforeSleep
        ) || state.can_state == CanNetworkState::On
            || state.can_retries >= self.config.max_can_wakeup_retries
        {
            warn!(
                app = %self.app,
                ?cause,
                retries = state.can_retries,
                "can wakeup rejected"
            );
            return Err(LcmError::NoPerm);
        }
        state.can_retries += 1;
        state.can_cause = cause;
        info!(app = %self.app, ?cause, "can wakeup requested");
        Ok(())
    }

    fn can_state(&self) -> std::result::Result<CanNetworkState, LcmError> {
        Ok(self.state()?.can_state)
    }

    fn park_mode_state(&self) -> std::result::Result<ParkModeState, LcmError> {
        Ok(self.state()?.park_mode)
    }

    fn create_rtc_alarm(
        &self,
        cycles: u32,
        period_minutes: u32,
    ) -> std::result::Result<u32, LcmError> {
        let created = {
            let mut state = self.state()?;
            if !state.registered {
                return Err(LcmError::NotRegistered);
            }
            if cycles == 0
                || cycles > self.config.max_alarm_cycles
                || period_minutes < self.config.min_alarm_period_minutes
                || period_minutes > self.config.max_alarm_period_minutes
            {
                return Err(LcmError::InvalidArg);
            }
            if state.lifecycle_state != LifecycleState::BeforeSleep {
                return Err(LcmError::NoPerm);
            }
            if state.alarms.len() >= self.config.max_rtc_alarms {
                warn!(app = %self.app, "rtc alarm quota reached");
                return Err(LcmError::NoPerm);
            }

            let index = state.next_index;
            state.next_index = state.next_index.wrapping_add(1);
            let alarm_handle = self.handles.fetch_add(1, Ordering::Relaxed);
            state.alarms.insert(
                alarm_handle,
                RtcAlarm {
                    index,
                    cycles_left: cycles,
                    period_minutes,
                    expired: false,
                },
            );
            RtcAlarmCreated {
                alarm_handle,
                index,
            }
        };
        info!(
            app = %self.app,
            handle = created.alarm_handle,
            index = created.index,
            cycles,
            period_minutes,
            "rtc alarm created"
        );
        self.events.rtc_alarm_created.notify(&created);
        Ok(created.index)
    }

    fn delete_rtc_alarm(&self, handle: RtcAlarmHandle) -> std::result::Result<(), LcmError> {
        {
            let mut state = self.state()?;
            let alarm = state.alarms.get(&handle).ok_or(LcmError::InvalidArg)?;
            if alarm.expired {
                return Err(LcmError::NoPerm);
            }
            debug!(
                app = %self.app,
                handle,
                index = alarm.index,
                period_minutes = alarm.period_minutes,
                "rtc alarm cancelled"
            );
            state.alarms.remove(&handle);
        }
        self.events.rtc_alarm_deleted.notify(&handle);
        Ok(())
    }

    fn acknowledge_rtc_alarm(&self, handle: RtcAlarmHandle) -> std::result::Result<(), LcmError> {
        self.consume_expiry(handle)
    }

    fn backup_battery_status(&self) -> std::result::Result<BackupBatteryStatus, LcmError> {
        Ok(self.state()?.battery_status)
    }

    fn backup_battery_voltage(&self) -> std::result::Result<u32, LcmError> {
        self.state()?.battery_voltage.ok_or(LcmError::Failure)
    }

    fn backup_battery_temperature(&self) -> std::result::Result<i32, LcmError> {
        self.state()?.battery_temperature.ok_or(LcmError::Failure)
    }

    fn backup_battery_soh(&self) -> std::result::Result<BubSoh, LcmError> {
        Ok(self.state()?.battery_soh)
    }

    fn backup_battery_charge_level(&self) -> std::result::Result<BubSoc, LcmError> {
        Ok(self.state()?.battery_soc)
    }

    fn wakeup_reason(&self) -> std::result::Result<WakeupReason, LcmError> {
        self.state()?.wakeup_reason.ok_or(LcmError::Busy)
    }

    fn lifecycle_state(&self) -> std::result::Result<LifecycleState, LcmError> {
        Ok(self.state()?.lifecycle_state)
    }

    fn is_cdno_active(&self) -> std::result::Result<bool, LcmError> {
        Ok(self.state()?.cdno_active)
    }

    fn events(&self) -> &LifecycleEvents {
        &self.events
    }
}
