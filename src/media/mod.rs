//! In-cabin media contracts: broadcast radio, audio playback and emergency calls.

pub mod radio;
pub mod xcall;

pub use radio::{BroadcastReceiverCache, BroadcastReceiverService};
pub use xcall::{AudioService, PublicAudio, PublicEcall, XcallService, XcallStatus};

#[cfg(test)]
mod tests;
