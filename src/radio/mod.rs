//! Radio side of the gateway
//!
//! [`RadioLink`] is the boundary to the mesh driver. [`wireless`] runs the
//! poll loop over a link and keeps one [`queue::NodeQueue`] per destination so
//! that delivery to each node is ordered and retried independently.

pub mod loopback;
pub mod queue;
#[cfg(feature = "serial")]
pub mod serial;
pub mod slip;
pub mod wireless;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use loopback::LoopbackRadio;
pub use queue::NodeQueue;
#[cfg(feature = "serial")]
pub use serial::SerialRadio;
pub use wireless::{WirelessConfig, WirelessHandle, WirelessTransport};

/// Mesh node address
pub type RadioAddress = u16;

/// Transmit power
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerLevel {
    Min,
    Low,
    High,
    Max,
}

impl PowerLevel {
    pub fn as_byte(self) -> u8 {
        match self {
            PowerLevel::Min => 0,
            PowerLevel::Low => 1,
            PowerLevel::High => 2,
            PowerLevel::Max => 3,
        }
    }
}

/// Air data rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataRate {
    #[serde(rename = "250kbps")]
    Kbps250,
    #[serde(rename = "1mbps")]
    Mbps1,
    #[serde(rename = "2mbps")]
    Mbps2,
}

impl DataRate {
    pub fn as_byte(self) -> u8 {
        match self {
            DataRate::Mbps1 => 0,
            DataRate::Mbps2 => 1,
            DataRate::Kbps250 => 2,
        }
    }
}

#[derive(Debug, Error)]
pub enum RadioError {
    #[error("Radio hardware is not responding")]
    HardwareNotResponding,
    #[error("Radio I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "serial")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
    #[error("Radio protocol error: {0}")]
    Protocol(String),
    #[error("Wireless transport already started")]
    AlreadyStarted,
}

/// Primitives of the mesh driver.
///
/// Sends are unreliable and inbound frames must be polled; the wireless
/// transport owns the link exclusively once started.
pub trait RadioLink: Send {
    /// Bring up the hardware. Failure is fatal at startup.
    fn begin(&mut self) -> Result<(), RadioError>;

    fn set_power_level(&mut self, level: PowerLevel);

    fn set_data_rate(&mut self, rate: DataRate);

    /// Attempt one delivery; `true` when the link confirms it
    fn send(&mut self, to: RadioAddress, payload: &[u8]) -> bool;

    /// Service network-layer bookkeeping
    fn poll(&mut self);

    fn frame_available(&mut self) -> bool;

    /// Take the next inbound frame, if any
    fn read(&mut self) -> Option<(RadioAddress, Vec<u8>)>;

    fn power_down(&mut self);
}

/// Outbound side of the radio as seen by the gateway
pub trait RadioSender: Send + Sync {
    /// Queue a frame for delivery to `to`
    fn write(&self, to: RadioAddress, frame: Vec<u8>);
}
