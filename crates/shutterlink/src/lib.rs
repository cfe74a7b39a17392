//! shutterlink — tethered camera control over a PTP-style wire protocol.

pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod protocol;
pub mod ptp;
pub mod reconnect;
pub mod transport;

pub use error::Error;
