//! Recording test doubles for the vehicle bus.

use std::sync::{Arc, Mutex};

use crate::error::{Result, TelematicsError};
use crate::types::{Frame, Port};

/// Mock frame handler function type
pub type MockFrameHandler = Box<dyn Fn(&Frame) -> Result<()> + Send + Sync>;

/// Port that records every frame it is asked to send
pub struct MockPort {
    sent: Arc<Mutex<Vec<Frame>>>,
    handler: Option<MockFrameHandler>,
    pub timeout_ms: u32,
}

impl MockPort {
    pub fn new(handler: Option<MockFrameHandler>) -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            handler,
            timeout_ms: 0,
        }
    }

    /// Accepts every frame
    pub fn new_recording() -> Self {
        Self::new(None)
    }

    /// Rejects every frame as if the bus were down
    pub fn new_error() -> Self {
        Self::new(Some(Box::new(|_: &Frame| {
            Err(TelematicsError::invalid("bus not available"))
        })))
    }

    /// Shared view of the frames sent so far, usable after the port moved.
    pub fn sent(&self) -> Arc<Mutex<Vec<Frame>>> {
        self.sent.clone()
    }

    pub fn set_frame_handler(&mut self, handler: Option<MockFrameHandler>) {
        self.handler = handler;
    }
}

impl Default for MockPort {
    fn default() -> Self {
        Self::new_recording()
    }
}

impl Port for MockPort {
    fn send(&mut self, frame: &Frame) -> Result<()> {
        if let Some(handler) = &self.handler {
            handler(frame)?;
        }
        self.sent
            .lock()
            .map_err(|_| TelematicsError::LockPoisoned)?
            .push(frame.clone());
        Ok(())
    }

    fn set_timeout(&mut self, timeout_ms: u32) -> Result<()> {
        self.timeout_ms = timeout_ms;
        Ok(())
    }
}
