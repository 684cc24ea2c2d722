use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::event::Event;
use crate::types::Service;

pub const SUPERVISION_SERVICE_NAME: &str = "stla.appfwk.supervision.service.base";

/// Per-second resource sample of a third-party application
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcessInfo {
    /// Percent of one core
    pub cpu_load: f32,
    /// Proportional set size in KiB
    pub pss_mem: u32,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisionError {
    #[error("no sample collected yet")]
    NotAvailable,
    #[error("sample out of range")]
    InvalidSample,
}

pub trait Supervision3rd: Service {
    fn cpu_load(&self) -> Result<f32, SupervisionError>;
    fn pss_memory_kb(&self) -> Result<u32, SupervisionError>;
    fn process_info_updates(&self) -> &Event<ProcessInfo>;
}

#[derive(Debug, Default)]
pub struct ProcessSupervisor {
    last: RwLock<Option<ProcessInfo>>,
    updates: Event<ProcessInfo>,
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, info: ProcessInfo) -> Result<(), SupervisionError> {
        if !info.cpu_load.is_finite() || !(0.0..=100.0).contains(&info.cpu_load) {
            return Err(SupervisionError::InvalidSample);
        }
        *self
            .last
            .write()
            .map_err(|_| SupervisionError::NotAvailable)? = Some(info);
        debug!(cpu = info.cpu_load, pss = info.pss_mem, "process sample");
        self.updates.notify(&info);
        Ok(())
    }

    fn sample(&self) -> Result<ProcessInfo, SupervisionError> {
        self.last
            .read()
            .ok()
            .and_then(|last| *last)
            .ok_or(SupervisionError::NotAvailable)
    }
}

impl Service for ProcessSupervisor {
    fn service_name(&self) -> &'static str {
        SUPERVISION_SERVICE_NAME
    }
}

impl Supervision3rd for ProcessSupervisor {
    fn cpu_load(&self) -> Result<f32, SupervisionError> {
        self.sample().map(|s| s.cpu_load)
    }

    fn pss_memory_kb(&self) -> Result<u32, SupervisionError> {
        self.sample().map(|s| s.pss_mem)
    }

    fn process_info_updates(&self) -> &Event<ProcessInfo> {
        &self.updates
    }
}
