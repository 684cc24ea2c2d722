use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::event::Event;
use crate::types::{RemoteCallable, RemoteEndpoint, Service};

pub const AUDIO_SERVICE_NAME: &str = "stla.tcu.audio.service.base";
pub const XCALL_SERVICE_NAME: &str = "stla.tcu.xcall.service.base";
pub const XCALL_BUNDLE_NAME: &str = "stla.tcu.xcall.app";

pub const AUDIO_REMOTE_ENDPOINT: RemoteEndpoint = RemoteEndpoint {
    bundle: XCALL_BUNDLE_NAME,
    service: "Stla.TCU.Xcall.PublicAudio",
    host: "127.0.0.1",
    port: 835,
    object: "PublicAudioRemoteObject",
};

pub const ECALL_REMOTE_ENDPOINT: RemoteEndpoint = RemoteEndpoint {
    bundle: XCALL_BUNDLE_NAME,
    service: "Stla.TCU.Xcall.PublicEcall",
    host: "127.0.0.1",
    port: 834,
    object: "PublicEcallRemoteObject",
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EcallState {
    Unknown = -1,
    #[default]
    Idle = 0,
    /// Calling or talking to the emergency operator
    OnGoing = 1,
    /// Operator hung up and may call back
    WaitingForCallback = 2,
}

impl EcallState {
    pub fn is_active(self) -> bool {
        matches!(self, EcallState::OnGoing | EcallState::WaitingForCallback)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EcallReason {
    #[default]
    Unknown = -1,
    NotTriggered = 0,
    ManualTriggered = 1,
    AutomaticTriggered = 2,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ButtonState {
    Unavailable = -1,
    #[default]
    NotPressed = 0,
    ShortPressed = 1,
    LongPressed = 2,
    LongReleased = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallButton {
    Ecall,
    Acall,
}

/// Summary of the last emergency call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcallDescription {
    /// Unix seconds
    pub started_at: i64,
    pub reason: EcallReason,
    pub vin: String,
}

pub trait PublicAudio: Send + Sync {
    /// True if playback may start: no eCall or aCall running and a non-empty name.
    fn play_audio_file(&self, name: &str) -> bool;
}

pub trait PublicEcall: Send + Sync {
    /// `Idle` when no call runs
    fn ecall_state(&self) -> EcallState;
    fn ecall_reason(&self) -> EcallReason;
    fn last_ecall_description(&self) -> EcallDescription;
    fn ecall_button_state(&self) -> ButtonState;
    fn acall_button_state(&self) -> ButtonState;
}

pub trait AudioService: Service + PublicAudio {}

pub trait XcallService: Service + PublicEcall {}

#[derive(Debug, Default)]
pub struct XcallEvents {
    pub ecall_state_changed: Event<EcallState>,
    /// Accepted playback requests, by file name
    pub audio_playback: Event<String>,
}

#[derive(Debug, Default)]
struct CallState {
    state: EcallState,
    reason: EcallReason,
    last: EcallDescription,
    ecall_button: ButtonState,
    acall_button: ButtonState,
    acall_active: bool,
}

/// Emergency and assistance call status shared by the audio and xcall endpoints.
#[derive(Default)]
pub struct XcallStatus {
    state: RwLock<CallState>,
    events: XcallEvents,
}

impl XcallStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &XcallEvents {
        &self.events
    }

    fn set_state(&self, update: impl FnOnce(&mut CallState)) {
        let changed = match self.state.write() {
            Ok(mut call) => {
                let before = call.state;
                update(&mut call);
                (before != call.state).then_some(call.state)
            }
            Err(_) => None,
        };
        if let Some(state) = changed {
            info!(?state, "ecall state changed");
            self.events.ecall_state_changed.notify(&state);
        }
    }

    pub fn start_ecall(&self, reason: EcallReason, started_at: i64, vin: &str) {
        self.set_state(|call| {
            call.state = EcallState::OnGoing;
            call.reason = reason;
            call.last = EcallDescription {
                started_at,
                reason,
                vin: vin.to_string(),
            };
        });
    }

    pub fn await_callback(&self) {
        self.set_state(|call| call.state = EcallState::WaitingForCallback);
    }

    pub fn end_ecall(&self) {
        self.set_state(|call| {
            call.state = EcallState::Idle;
            call.reason = EcallReason::NotTriggered;
        });
    }

    pub fn set_acall_active(&self, active: bool) {
        if let Ok(mut call) = self.state.write() {
            call.acall_active = active;
        }
    }

    pub fn set_button_state(&self, button: CallButton, state: ButtonState) {
        if let Ok(mut call) = self.state.write() {
            match button {
                CallButton::Ecall => call.ecall_button = state,
                CallButton::Acall => call.acall_button = state,
            }
        }
    }

    fn read<T: Default>(&self, f: impl FnOnce(&CallState) -> T) -> T {
        self.state.read().map(|call| f(&call)).unwrap_or_default()
    }

    pub fn audio_endpoint(self: &Arc<Self>) -> AudioEndpoint {
        AudioEndpoint(self.clone())
    }

    pub fn ecall_endpoint(self: &Arc<Self>) -> EcallEndpoint {
        EcallEndpoint(self.clone())
    }
}

impl PublicAudio for XcallStatus {
    fn play_audio_file(&self, name: &str) -> bool {
        if name.is_empty() {
            return false;
        }
        let busy = self
            .state
            .read()
            .map(|call| call.state.is_active() || call.acall_active)
            .unwrap_or(true);
        if busy {
            warn!(file = name, "audio playback refused during call");
            return false;
        }
        self.events.audio_playback.notify(&name.to_string());
        true
    }
}

impl PublicEcall for XcallStatus {
    fn ecall_state(&self) -> EcallState {
        self.read(|call| call.state)
    }

    fn ecall_reason(&self) -> EcallReason {
        self.read(|call| call.reason)
    }

    fn last_ecall_description(&self) -> EcallDescription {
        self.read(|call| call.last.clone())
    }

    fn ecall_button_state(&self) -> ButtonState {
        self.read(|call| call.ecall_button)
    }

    fn acall_button_state(&self) -> ButtonState {
        self.read(|call| call.acall_button)
    }
}

/// Audio service view of an [`XcallStatus`]
#[derive(Clone)]
pub struct AudioEndpoint(Arc<XcallStatus>);

impl Service for AudioEndpoint {
    fn service_name(&self) -> &'static str {
        AUDIO_SERVICE_NAME
    }
}

impl PublicAudio for AudioEndpoint {
    fn play_audio_file(&self, name: &str) -> bool {
        self.0.play_audio_file(name)
    }
}

impl AudioService for AudioEndpoint {}

impl RemoteCallable for AudioEndpoint {
    fn endpoint(&self) -> RemoteEndpoint {
        AUDIO_REMOTE_ENDPOINT
    }
}

/// Xcall service view of an [`XcallStatus`]
#[derive(Clone)]
pub struct EcallEndpoint(Arc<XcallStatus>);

impl Service for EcallEndpoint {
    fn service_name(&self) -> &'static str {
        XCALL_SERVICE_NAME
    }
}

impl PublicEcall for EcallEndpoint {
    fn ecall_state(&self) -> EcallState {
        self.0.ecall_state()
    }

    fn ecall_reason(&self) -> EcallReason {
        self.0.ecall_reason()
    }

    fn last_ecall_description(&self) -> EcallDescription {
        self.0.last_ecall_description()
    }

    fn ecall_button_state(&self) -> ButtonState {
        self.0.ecall_button_state()
    }

    fn acall_button_state(&self) -> ButtonState {
        self.0.acall_button_state()
    }
}

impl XcallService for EcallEndpoint {}

impl RemoteCallable for EcallEndpoint {
    fn endpoint(&self) -> RemoteEndpoint {
        ECALL_REMOTE_ENDPOINT
    }
}
