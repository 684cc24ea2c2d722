use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::event::Event;
use crate::types::Service;

pub const SMS_SERVICE_NAME: &str = "stla.connectivity.sms.service.base";

/// Payload bytes per message
pub const SMS_MAX_DATA_LEN: usize = 161;
/// Phone address bytes, terminator included
pub const SMS_MAX_ADDR_LEN: usize = 33;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmsError {
    #[error("client registration error")]
    ClientRegError = 1,
    #[error("invalid PSA header")]
    InvalidHeader = 2,
    #[error("network not available")]
    NoNetwork = 3,
    #[error("SIM missing or not functional")]
    SimFailure = 4,
    #[error("message corrupted")]
    Corrupted = 5,
    #[error("SMS manager not available")]
    ServiceNotAvailable = 6,
    #[error("invalid argument")]
    InvalidArgument = 7,
    #[error("unknown error")]
    UnknownError = 8,
}

impl SmsError {
    pub fn code(self) -> u32 {
        self as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SmsEcu {
    Tcu = 0,
    Ivi = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SmsServiceType {
    Generic = 0,
    Acall = 1,
    Ecall = 2,
    Lifecycle = 3,
    DeviceManagement = 4,
    AppFwk = 5,
    RemoteMonitoring = 6,
    Unknown = 7,
}

/// PSA object type. Its meaning depends on the service type, so several
/// names share a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjType(pub u8);

impl ObjType {
    pub const WAKE_UP: ObjType = ObjType(0);
    pub const GENERAL_PURPOSE: ObjType = ObjType(0);
    pub const REGISTRATION_UPDATE: ObjType = ObjType(0);
    pub const MSG_REQUEST: ObjType = ObjType(0);
    pub const MSG1: ObjType = ObjType(1);
    pub const MSG2: ObjType = ObjType(2);
    pub const STOP: ObjType = ObjType(3);
    pub const UNKNOWN: ObjType = ObjType(4);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SmsStatus {
    Unread = 0,
    Read = 1,
    Unsent = 2,
    Sent = 3,
    Deleted = 4,
    NotDeleted = 5,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SmsFormat {
    Unknown = 0,
    Raw = 1,
    /// GSM 7-bit default alphabet
    Text = 2,
    /// UCS-2
    UcText = 3,
    Binary = 4,
}

/// Incoming message with its decoded PSA header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsReceived {
    pub msg_id: u16,
    /// Payload, PSA header included
    pub data: Vec<u8>,
    pub ecu: SmsEcu,
    pub service_type: SmsServiceType,
    pub obj_type: ObjType,
    pub obj_version: u8,
    pub obj_id: u8,
    pub format: SmsFormat,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsSend {
    pub data: Vec<u8>,
    pub phone: String,
    /// Filled in by the manager when reporting delivery
    pub status: SmsStatus,
}

impl SmsSend {
    pub fn new(phone: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            phone: phone.into(),
            status: SmsStatus::Unsent,
        }
    }
}

pub trait SmsManager: Send + Sync {
    /// Replays the stored messages of `app` through `msg_received`.
    fn get_msg(&self, app: &str) -> Result<(), SmsError>;
    /// Delivery is reported on `send_status`.
    fn send(&self, msg: &SmsSend) -> Result<(), SmsError>;
    /// Deletes an acknowledged message from storage.
    fn ack_msg(&self, msg_id: u16) -> Result<(), SmsError>;
    fn msg_received(&self) -> &Event<SmsReceived>;
    fn send_status(&self) -> &Event<SmsSend>;
}

pub trait SmsServiceProvider: Service {
    /// Registering twice returns the same manager.
    fn register(&self, app: &str) -> Result<Arc<dyn SmsManager>, SmsError>;
    /// Stored messages are kept after unregistering.
    fn unregister(&self, app: &str) -> Result<(), SmsError>;
}

struct Modem {
    available: bool,
    sim_ready: bool,
    network: bool,
}

struct SmsState {
    modem: Modem,
    clients: BTreeMap<String, Arc<ClientManager>>,
    stored: BTreeMap<u16, (String, SmsReceived)>,
}

struct SmsInner {
    state: Mutex<SmsState>,
}

impl SmsInner {
    fn lock(&self) -> Result<MutexGuard<'_, SmsState>, SmsError> {
        self.state.lock().map_err(|_| SmsError::UnknownError)
    }
}

struct ClientManager {
    app: String,
    inner: Weak<SmsInner>,
    received: Event<SmsReceived>,
    status: Event<SmsSend>,
}

impl ClientManager {
    /// Locks the state if this manager is still the registered one for its app.
    fn registered<T, F>(&self, access: F) -> Result<T, SmsError>
    where
        F: FnOnce(&mut SmsState) -> Result<T, SmsError>,
    {
        let inner = self.inner.upgrade().ok_or(SmsError::ServiceNotAvailable)?;
        let mut state = inner.lock()?;
        let current = state
            .clients
            .get(&self.app)
            .is_some_and(|client| std::ptr::eq(Arc::as_ptr(client), self));
        if !current {
            return Err(SmsError::ClientRegError);
        }
        access(&mut *state)
    }
}

fn check_outgoing(msg: &SmsSend) -> Result<(), SmsError> {
    if msg.data.is_empty() || msg.data.len() > SMS_MAX_DATA_LEN {
        return Err(SmsError::InvalidArgument);
    }
    let digits = msg.phone.strip_prefix('+').unwrap_or(&msg.phone);
    if digits.is_empty()
        || msg.phone.len() >= SMS_MAX_ADDR_LEN
        || !digits.chars().all(|c| c.is_ascii_digit())
    {
        return Err(SmsError::InvalidArgument);
    }
    Ok(())
}

impl SmsManager for ClientManager {
    fn get_msg(&self, app: &str) -> Result<(), SmsError> {
        if app != self.app {
            return Err(SmsError::ClientRegError);
        }
        let pending: Vec<SmsReceived> = self.registered(|state| {
            Ok(state
                .stored
                .values()
                .filter(|(owner, _)| *owner == self.app)
                .map(|(_, msg)| msg.clone())
                .collect())
        })?;
        debug!(app, count = pending.len(), "forwarding stored messages");
        for msg in &pending {
            self.received.notify(msg);
        }
        Ok(())
    }

    fn send(&self, msg: &SmsSend) -> Result<(), SmsError> {
        check_outgoing(msg)?;
        self.registered(|state| {
            let modem = &state.modem;
            if !modem.available {
                Err(SmsError::ServiceNotAvailable)
            } else if !modem.sim_ready {
                Err(SmsError::SimFailure)
            } else if !modem.network {
                Err(SmsError::NoNetwork)
            } else {
                Ok(())
            }
        })?;
        info!(app = %self.app, len = msg.data.len(), "sms sent");
        let mut report = msg.clone();
        report.status = SmsStatus::Sent;
        self.status.notify(&report);
        Ok(())
    }

    fn ack_msg(&self, msg_id: u16) -> Result<(), SmsError> {
        self.registered(|state| {
            let owned = state
                .stored
                .get(&msg_id)
                .is_some_and(|(owner, _)| *owner == self.app);
            if !owned {
                return Err(SmsError::InvalidArgument);
            }
            state.stored.remove(&msg_id);
            Ok(())
        })
    }

    fn msg_received(&self) -> &Event<SmsReceived> {
        &self.received
    }

    fn send_status(&self) -> &Event<SmsSend> {
        &self.status
    }
}

/// SMS client registry with an in-memory message store.
///
/// Incoming messages arrive already decoded through [`SmsGateway::deliver`];
/// PDU parsing is the modem's job.
pub struct SmsGateway {
    inner: Arc<SmsInner>,
}

impl SmsGateway {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SmsInner {
                state: Mutex::new(SmsState {
                    modem: Modem {
                        available: true,
                        sim_ready: true,
                        network: true,
                    },
                    clients: BTreeMap::new(),
                    stored: BTreeMap::new(),
                }),
            }),
        }
    }

    pub fn set_service_available(&self, available: bool) {
        if let Ok(mut state) = self.inner.lock() {
            state.modem.available = available;
        }
    }

    pub fn set_sim_ready(&self, ready: bool) {
        if let Ok(mut state) = self.inner.lock() {
            state.modem.sim_ready = ready;
        }
    }

    pub fn set_network(&self, attached: bool) {
        if let Ok(mut state) = self.inner.lock() {
            state.modem.network = attached;
        }
    }

    /// Stores an incoming message for `app` and forwards it if `app` is registered.
    pub fn deliver(&self, app: &str, msg: SmsReceived) -> Result<(), SmsError> {
        if msg.data.len() > SMS_MAX_DATA_LEN {
            return Err(SmsError::Corrupted);
        }
        if msg.service_type != SmsServiceType::AppFwk {
            warn!(app, service = ?msg.service_type, "sms not addressed to applications");
            return Err(SmsError::InvalidHeader);
        }
        let client = {
            let mut state = self.inner.lock()?;
            state.stored.insert(msg.msg_id, (app.to_string(), msg.clone()));
            state.clients.get(app).cloned()
        };
        if let Some(client) = client {
            client.received.notify(&msg);
        }
        Ok(())
    }

    pub fn stored_count(&self) -> usize {
        self.inner.lock().map(|state| state.stored.len()).unwrap_or(0)
    }
}

impl Default for SmsGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl Service for SmsGateway {
    fn service_name(&self) -> &'static str {
        SMS_SERVICE_NAME
    }
}

impl SmsServiceProvider for SmsGateway {
    fn register(&self, app: &str) -> Result<Arc<dyn SmsManager>, SmsError> {
        if app.is_empty() {
            return Err(SmsError::InvalidArgument);
        }
        let mut state = self.inner.lock()?;
        if !state.modem.available {
            return Err(SmsError::ServiceNotAvailable);
        }
        let manager = state
            .clients
            .entry(app.to_string())
            .or_insert_with(|| {
                info!(app, "sms client registered");
                Arc::new(ClientManager {
                    app: app.to_string(),
                    inner: Arc::downgrade(&self.inner),
                    received: Event::new(),
                    status: Event::new(),
                })
            })
            .clone();
        Ok(manager)
    }

    fn unregister(&self, app: &str) -> Result<(), SmsError> {
        let mut state = self.inner.lock()?;
        if state.clients.remove(app).is_none() {
            return Err(SmsError::ClientRegError);
        }
        info!(app, "sms client unregistered");
        Ok(())
    }
}
