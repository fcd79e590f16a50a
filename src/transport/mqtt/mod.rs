//! MQTT v5 client for the `cab/<addr>/<action>` namespace
//!
//! Pure logic is kept apart from I/O:
//!
//! - [`connection`] - connection states, backoff policy and client options
//! - [`message_handler`] - event routing and inbound message filtering
//! - [`health_monitor`] - reconnection decisions and state transitions
//! - [`echo`] - self-echo suppression when `no_local` is unavailable
//! - [`client`] - the rumqttc event loop supervisor and publishing handle

pub mod client;
pub mod connection;
pub mod echo;
pub mod health_monitor;
pub mod message_handler;

pub use client::{MessageCallback, MqttClient, MqttHandle};
pub use connection::{ConnectionState, MqttError, ReconnectConfig};
pub use echo::EchoFilter;
pub use health_monitor::{ConnectionEvent, HealthMonitor, ReconnectionDecision};
pub use message_handler::{EventRoute, MessageHandler};
