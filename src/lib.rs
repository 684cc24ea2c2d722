// Service domains
pub mod connectivity; // MQTT, LwM2M, SMS, Wi-Fi
pub mod lifecycle; // Power state, early init, supervision
pub mod media; // Radio, audio, eCall
pub mod networking; // TCU info, log storage
pub mod persistence; // Key/value and file storage
pub mod positioning; // GNSS and dead reckoning
pub mod vehicle; // Diagnosis, remote access

// Re-exports for convenience
pub use connectivity::{lwm2m, mqtt, sms, wifi};
pub use lifecycle::{AppLifecycleMonitor, EarlyInit};
pub use persistence::{dss, pcl};
pub use registry::ServiceRegistry;

// Runtime plumbing
pub mod config;
pub mod event;
pub mod logging;
pub mod registry;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Common types and traits
pub mod error;
pub mod types;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
