//! Testing utilities and mock implementations
//!
//! Lets the gateway be exercised without radio hardware or an MQTT broker.

pub mod mocks;

pub use mocks::*;
