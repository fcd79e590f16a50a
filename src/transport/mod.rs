//! MQTT side of the gateway
//!
//! [`MqttPublisher`] is the seam the gateway publishes through, so routing can
//! be exercised against a recording publisher without a broker.

pub mod mqtt;

pub use mqtt::MqttError;

/// Outbound MQTT publishing as seen by the gateway
pub trait MqttPublisher: Send + Sync {
    /// Fire-and-forget publish of a UTF-8 payload
    fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<(), MqttError>;
}

/// Type alias for the MQTT transport
pub type MqttTransport = mqtt::MqttClient;
