use std::collections::BTreeMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::event::Event;
use crate::types::Service;

pub const DIAGNOSIS_SERVICE_NAME: &str = "stla.diagnosis.client.service";

/// Diagnostic trouble code, 3 significant bytes
pub type DtcCode = u32;

pub const MAX_DTC_CODE: DtcCode = 0x00FF_FFFF;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagError {
    #[error("DTC code does not fit in 3 bytes")]
    InvalidDtc,
    #[error("diagnosis table unavailable")]
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DtcStatus {
    ConfirmedPresent = 3,
    ConfirmedAbsent = 4,
    /// Never reported by the monitoring domain
    NotAvailable = 0xFF,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DtcConfirmation {
    pub code: DtcCode,
    pub status: DtcStatus,
}

fn check_code(code: DtcCode) -> Result<(), DiagError> {
    if code > MAX_DTC_CODE {
        return Err(DiagError::InvalidDtc);
    }
    Ok(())
}

pub trait DiagnosisService: Service {
    fn query_dtc_status(&self, code: DtcCode) -> Result<DtcStatus, DiagError>;
    /// Ascending order
    fn query_all_confirmed_present_dtcs(&self) -> Vec<DtcCode>;
    fn dtc_confirmation(&self) -> &Event<DtcConfirmation>;
}

/// Confirmed DTC states reported by the monitoring domains.
pub struct DtcTable {
    table: RwLock<BTreeMap<DtcCode, DtcStatus>>,
    dtc_confirmation: Event<DtcConfirmation>,
}

impl DtcTable {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(BTreeMap::new()),
            dtc_confirmation: Event::new(),
        }
    }

    /// Records a confirmation; only a change of status is notified.
    pub fn confirm(&self, code: DtcCode, present: bool) -> Result<(), DiagError> {
        check_code(code)?;
        let status = if present {
            DtcStatus::ConfirmedPresent
        } else {
            DtcStatus::ConfirmedAbsent
        };
        let previous = self
            .table
            .write()
            .map_err(|_| DiagError::Unavailable)?
            .insert(code, status);
        if previous == Some(status) {
            debug!(code = format_args!("{code:06X}"), "DTC status unchanged");
            return Ok(());
        }
        info!(code = format_args!("{code:06X}"), ?status, "DTC confirmed");
        self.dtc_confirmation
            .notify(&DtcConfirmation { code, status });
        Ok(())
    }

    pub fn clear(&self) {
        if let Ok(mut table) = self.table.write() {
            table.clear();
        }
    }
}

impl Default for DtcTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Service for DtcTable {
    fn service_name(&self) -> &'static str {
        DIAGNOSIS_SERVICE_NAME
    }
}

impl DiagnosisService for DtcTable {
    fn query_dtc_status(&self, code: DtcCode) -> Result<DtcStatus, DiagError> {
        check_code(code)?;
        let table = self.table.read().map_err(|_| DiagError::Unavailable)?;
        Ok(table.get(&code).copied().unwrap_or(DtcStatus::NotAvailable))
    }

    fn query_all_confirmed_present_dtcs(&self) -> Vec<DtcCode> {
        self.table
            .read()
            .map(|table| {
                table
                    .iter()
                    .filter(|(_, status)| **status == DtcStatus::ConfirmedPresent)
                    .map(|(code, _)| *code)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn dtc_confirmation(&self) -> &Event<DtcConfirmation> {
        &self.dtc_confirmation
    }
}
