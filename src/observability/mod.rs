//! Observability: structured logging, process-wide metrics and the
//! optional health HTTP server.

pub mod health;
pub mod logging;
pub mod metrics;

pub use health::HealthServer;
pub use logging::{init_default_logging, init_logging, LogFormat};
pub use metrics::{metrics, MetricsCollector, MetricsSnapshot};

// Span macros for structured logging
pub use logging::{gateway_span, mqtt_span, radio_span};
