//! Vehicle-facing contracts: diagnostic trouble codes and remote access requests.

pub mod diagnosis;
pub mod remote_access;

pub use diagnosis::{DiagError, DiagnosisService, DtcStatus, DtcTable};
pub use remote_access::{
    RasError, RemoteAccessConfig, RemoteAccessGateway, RemoteAccessService, RemoteCommand,
};

#[cfg(test)]
mod tests;
