//! Pure connection state management for the MQTT client
//!
//! Connection states, the reconnection backoff policy, transport errors and
//! the translation of the `[mqtt]` config section into rumqttc options.

use crate::config::MqttSection;
use rumqttc::v5::MqttOptions;
use rumqttc::Transport as RumqttcTransport;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Connection state for the MQTT client
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// Initial state, waiting for the first ConnAck
    Connecting,
    /// ConnAck received, publishing allowed
    Connected,
    /// Disconnected with reason
    Disconnected(String),
    /// Waiting to retry (attempt count)
    Reconnecting(u32),
    /// Gave up after the configured number of attempts
    PermanentlyDisconnected(String),
}

/// Reconnection backoff configuration
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of reconnection attempts (None = unlimited)
    pub max_attempts: Option<u32>,
    /// Backoff delays in milliseconds, one per attempt
    pub backoff_pattern: Vec<u64>,
    /// Delay once the pattern is exhausted
    pub sustained_delay: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            backoff_pattern: vec![25, 50, 100, 250],
            sustained_delay: 250,
        }
    }
}

impl ReconnectConfig {
    /// Total delay across all attempts, or None when retries are unlimited
    pub fn calculate_max_total_time(&self) -> Option<u64> {
        self.max_attempts.map(|max_attempts| {
            (1..=max_attempts)
                .map(|attempt| self.calculate_backoff_delay(attempt))
                .sum()
        })
    }

    /// Delay before `attempt` (1-based): the pattern, then the sustained delay
    pub fn calculate_backoff_delay(&self, attempt: u32) -> u64 {
        let index = attempt.saturating_sub(1) as usize;
        self.backoff_pattern
            .get(index)
            .copied()
            .unwrap_or(self.sustained_delay)
    }
}

#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Connection failed")]
    ConnectionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Publishing failed")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Subscription failed")]
    SubscriptionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Not connected - current state: {state:?}")]
    NotConnected { state: ConnectionState },
    #[error("Connection failed: {0}")]
    ConnectionFailedStr(String),
}

/// Build rumqttc options from the `[mqtt]` section.
///
/// The node name is used verbatim as the client id. `mqtts://` URLs enable TLS
/// and credentials are read from the environment variables the section names.
pub fn configure_mqtt_options(
    node_name: &str,
    config: &MqttSection,
) -> Result<MqttOptions, MqttError> {
    let url = Url::parse(&config.broker_url)
        .map_err(|_| MqttError::InvalidBrokerUrl(config.broker_url.clone()))?;

    let host = url
        .host_str()
        .ok_or_else(|| MqttError::InvalidBrokerUrl(config.broker_url.clone()))?;
    let port = url
        .port()
        .unwrap_or(if url.scheme() == "mqtts" { 8883 } else { 1883 });

    let mut mqtt_options = MqttOptions::new(node_name, host, port);

    if url.scheme() == "mqtts" {
        mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    if let Some(username_env) = &config.username_env {
        if let Ok(username) = std::env::var(username_env) {
            let password = config
                .password_env
                .as_ref()
                .and_then(|env_name| std::env::var(env_name).ok())
                .unwrap_or_default();
            mqtt_options.set_credentials(&username, &password);
        }
    }

    mqtt_options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
    mqtt_options.set_clean_start(true);

    Ok(mqtt_options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_mqtt_config() -> MqttSection {
        MqttSection {
            broker_url: "mqtt://localhost:1883".to_string(),
            ..MqttSection::default()
        }
    }

    #[test]
    fn test_reconnect_config_default() {
        let config = ReconnectConfig::default();
        assert_eq!(config.max_attempts, None);
        assert_eq!(config.backoff_pattern, vec![25, 50, 100, 250]);
        assert_eq!(config.sustained_delay, 250);
    }

    #[test]
    fn test_calculate_backoff_delay() {
        let config = ReconnectConfig::default();
        assert_eq!(config.calculate_backoff_delay(1), 25);
        assert_eq!(config.calculate_backoff_delay(2), 50);
        assert_eq!(config.calculate_backoff_delay(3), 100);
        assert_eq!(config.calculate_backoff_delay(4), 250);
        assert_eq!(config.calculate_backoff_delay(5), 250);
        assert_eq!(config.calculate_backoff_delay(100), 250);
    }

    #[test]
    fn test_empty_pattern_uses_sustained_delay() {
        let config = ReconnectConfig {
            max_attempts: None,
            backoff_pattern: vec![],
            sustained_delay: 500,
        };
        assert_eq!(config.calculate_backoff_delay(1), 500);
    }

    #[test]
    fn test_calculate_max_total_time() {
        let config = ReconnectConfig {
            max_attempts: Some(6),
            ..ReconnectConfig::default()
        };
        assert_eq!(config.calculate_max_total_time(), Some(25 + 50 + 100 + 250 + 250 + 250));
        assert_eq!(ReconnectConfig::default().calculate_max_total_time(), None);
    }

    #[test]
    fn test_configure_mqtt_options() {
        let options = configure_mqtt_options("RCC_Station", &test_mqtt_config()).unwrap();
        assert_eq!(options.client_id(), "RCC_Station");
        assert_eq!(options.broker_address(), ("localhost".to_string(), 1883));
    }

    #[test]
    fn test_default_ports_by_scheme() {
        let mut config = test_mqtt_config();
        config.broker_url = "mqtt://broker.local".to_string();
        let options = configure_mqtt_options("gw", &config).unwrap();
        assert_eq!(options.broker_address().1, 1883);

        config.broker_url = "mqtts://broker.local".to_string();
        let options = configure_mqtt_options("gw", &config).unwrap();
        assert_eq!(options.broker_address().1, 8883);
    }

    #[test]
    fn test_invalid_broker_url() {
        let mut config = test_mqtt_config();
        config.broker_url = "invalid-url".to_string();
        let result = configure_mqtt_options("gw", &config);
        assert!(matches!(result, Err(MqttError::InvalidBrokerUrl(_))));
    }

    #[test]
    fn test_connection_state_equality() {
        assert_eq!(ConnectionState::Connected, ConnectionState::Connected);
        assert_ne!(
            ConnectionState::Connected,
            ConnectionState::Disconnected("test".to_string())
        );
    }
}
