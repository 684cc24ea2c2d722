use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TelematicsError};

/// CAN ID type
pub type CanId = u32;

/// Generic frame data type
pub type FrameData = Vec<u8>;

/// Timestamp in milliseconds
pub type Timestamp = u64;

/// Frame exchanged with the vehicle bus
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub id: CanId,
    pub data: FrameData,
    pub timestamp: Timestamp,
    pub is_extended: bool,
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            id: 0,
            data: Vec::new(),
            timestamp: 0,
            is_extended: false,
        }
    }
}

/// Configuration trait that must be implemented by all configuration sections
pub trait Config: Send + Sync {
    fn validate(&self) -> Result<()>;
}

/// Port trait that must be implemented by platform-specific vehicle bus code
pub trait Port: Send + Sync {
    fn send(&mut self, frame: &Frame) -> Result<()>;
    fn set_timeout(&mut self, timeout_ms: u32) -> Result<()>;
}

/// Capability tag carried by every service contract.
///
/// The name is the lookup key under which an implementation is expected to be
/// registered.
pub trait Service: Send + Sync {
    fn service_name(&self) -> &'static str;
}

/// Marker for contracts that are also reachable through an out-of-process endpoint.
pub trait RemoteCallable: Service {
    fn endpoint(&self) -> RemoteEndpoint;
}

/// Address of a remote object served over the secondary RPC transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteEndpoint {
    pub bundle: &'static str,
    pub service: &'static str,
    pub host: &'static str,
    pub port: u16,
    pub object: &'static str,
}

impl RemoteEndpoint {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| TelematicsError::invalid(format!("bad endpoint {}", self.host)))
    }
}

/// Context of the application bundle calling into a service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppContext {
    pub symbolic_name: String,
}

impl AppContext {
    pub fn new(symbolic_name: impl Into<String>) -> Self {
        Self {
            symbolic_name: symbolic_name.into(),
        }
    }
}
