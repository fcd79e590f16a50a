//! Pure reconnection and state-transition logic for the MQTT client

use super::connection::{ConnectionState, ReconnectConfig};
use std::time::Duration;
use tracing::{error, info, warn};

pub struct HealthMonitor;

impl HealthMonitor {
    /// Decide whether to retry after a connection loss
    pub fn should_attempt_reconnection(
        current_attempts: u32,
        config: &ReconnectConfig,
        shutdown_requested: bool,
    ) -> ReconnectionDecision {
        if shutdown_requested {
            return ReconnectionDecision::AbortShutdownRequested;
        }

        if let Some(max_attempts) = config.max_attempts {
            if current_attempts >= max_attempts {
                return ReconnectionDecision::AbortMaxAttemptsExceeded;
            }
        }

        ReconnectionDecision::Proceed {
            attempt: current_attempts + 1,
            delay_ms: config.calculate_backoff_delay(current_attempts + 1),
        }
    }

    /// How long `connect()` waits for the first ConnAck
    pub fn calculate_connection_timeout(config: &ReconnectConfig) -> Duration {
        match config.calculate_max_total_time() {
            Some(max_total_time) => Duration::from_millis(max_total_time + 30000),
            None => Duration::from_secs(60),
        }
    }

    pub fn determine_next_state(event: ConnectionEvent) -> ConnectionState {
        match event {
            ConnectionEvent::ConnAckReceived => {
                info!("MQTT client connected");
                ConnectionState::Connected
            }
            ConnectionEvent::DisconnectedByBroker => {
                warn!("MQTT broker disconnected the gateway");
                ConnectionState::Disconnected("Broker disconnected".to_string())
            }
            ConnectionEvent::NetworkError(error) => {
                error!("MQTT event loop error: {}", error);
                ConnectionState::Disconnected(error)
            }
            ConnectionEvent::ReconnectionStarted(attempt) => {
                info!("Starting reconnection attempt {}", attempt);
                ConnectionState::Reconnecting(attempt)
            }
            ConnectionEvent::PermanentFailure(reason) => {
                error!("Permanent connection failure: {}", reason);
                ConnectionState::PermanentlyDisconnected(reason)
            }
        }
    }

    pub fn can_publish(state: &ConnectionState) -> bool {
        matches!(state, ConnectionState::Connected)
    }
}

#[derive(Debug, PartialEq)]
pub enum ReconnectionDecision {
    Proceed { attempt: u32, delay_ms: u64 },
    AbortShutdownRequested,
    AbortMaxAttemptsExceeded,
}

/// Connection events that trigger state transitions
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    ConnAckReceived,
    DisconnectedByBroker,
    NetworkError(String),
    ReconnectionStarted(u32),
    PermanentFailure(String),
}
