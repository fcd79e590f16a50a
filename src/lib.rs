//! nrf2mqtt - nRF24 mesh to MQTT gateway
//!
//! Bridges a mesh of battery-powered locomotives and handheld keypads on an
//! nRF24 radio network to an MQTT bus, in both directions.
//!
//! # Overview
//!
//! - [`radio`]: the link boundary, per-node delivery queues and the poll loop
//! - [`protocol`]: one-byte radio commands, the `cab/<addr>/<action>` topic
//!   namespace and the translation table between them
//! - [`broker`]: device registry, keypad/locomotive pairing and routing
//! - [`transport`]: the rumqttc client
//! - [`gateway`]: executes the broker's routing decisions on both transports
//!
//! # Quick Start
//!
//! ```rust
//! use nrf2mqtt::broker::{Broker, Dispatch};
//!
//! let broker = Broker::new(' ');
//! let out = broker.receive_radio(3, b"AL 3 Loco 1.0");
//! assert!(matches!(&out[0], Dispatch::Mqtt { action, retain: true, .. } if action == "intro"));
//! ```

pub mod broker;
pub mod config;
pub mod error;
pub mod gateway;
pub mod observability;
pub mod protocol;
pub mod radio;
pub mod testing;
pub mod transport;

pub use broker::{Broker, Dispatch};
pub use config::{ConfigError, ConfigOverrides, GatewayConfig};
pub use error::{GatewayError, GatewayResult};
pub use gateway::Gateway;
pub use radio::{RadioAddress, RadioLink, WirelessTransport};
pub use transport::mqtt::MqttClient;
