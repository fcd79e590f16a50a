//! Radio wire format, MQTT topic namespace and the translation table between them

pub mod commands;
pub mod heartbeat;
pub mod topics;
pub mod translator;

pub use heartbeat::{FieldKind, FormatError, HeartbeatFormat, HeartbeatValue};
pub use topics::{validate_node_name, TopicScheme, ValidationError};
pub use translator::{Codec, CodecContext, MqttMessage, RouteEntry, Translator, ROUTES};
