//! Gateway configuration
//!
//! A TOML file with `[gateway]`, `[radio]`, `[mqtt]`, `[protocol]` and an
//! optional `[health]` section. Only `[mqtt].broker_url` is required in a file;
//! everything else has a default. Command-line flags are applied on top with
//! [`ConfigOverrides`].

use crate::protocol::{validate_node_name, TopicScheme};
use crate::radio::{DataRate, PowerLevel, WirelessConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GatewayConfig {
    #[serde(default)]
    pub gateway: GatewaySection,
    #[serde(default)]
    pub radio: RadioSection,
    pub mqtt: MqttSection,
    #[serde(default)]
    pub protocol: ProtocolSection,
    /// Omitted means no HTTP health server
    pub health: Option<HealthSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewaySection {
    /// MQTT client id (must match [a-zA-Z0-9._-]+)
    #[serde(default = "default_node_name")]
    pub node_name: String,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            node_name: default_node_name(),
        }
    }
}

fn default_node_name() -> String {
    "RCC_Station".to_string()
}

/// Which [`crate::radio::RadioLink`] to drive
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RadioDriver {
    /// nRF24 modem on a USB serial port
    Serial,
    /// No hardware; every send succeeds
    Loopback,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RadioSection {
    pub driver: RadioDriver,
    pub ce_pin: u16,
    pub csn_pin: u16,
    pub serial_port: String,
    pub baud_rate: u32,
    pub power_level: PowerLevel,
    pub data_rate: DataRate,
    pub disconnect_timeout_ms: u64,
    pub idle_sleep_ms: u64,
    /// How long to wait for the modem to answer a command
    pub reply_timeout_ms: u64,
}

impl Default for RadioSection {
    fn default() -> Self {
        Self {
            driver: RadioDriver::Serial,
            ce_pin: 25,
            csn_pin: 0,
            serial_port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
            power_level: PowerLevel::Low,
            data_rate: DataRate::Kbps250,
            disconnect_timeout_ms: 5000,
            idle_sleep_ms: 10,
            reply_timeout_ms: 500,
        }
    }
}

impl RadioSection {
    pub fn wireless_config(&self) -> WirelessConfig {
        WirelessConfig {
            power_level: self.power_level,
            data_rate: self.data_rate,
            disconnect_timeout: Duration::from_millis(self.disconnect_timeout_ms),
            idle_sleep: Duration::from_millis(self.idle_sleep_ms),
        }
    }

    #[cfg(feature = "serial")]
    pub fn serial_settings(&self) -> crate::radio::serial::SerialSettings {
        crate::radio::serial::SerialSettings {
            port_name: self.serial_port.clone(),
            baud_rate: self.baud_rate,
            ce_pin: self.ce_pin,
            csn_pin: self.csn_pin,
            reply_timeout: Duration::from_millis(self.reply_timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// MQTT broker URL with protocol and port
    pub broker_url: String,
    /// Environment variable containing username
    pub username_env: Option<String>,
    /// Environment variable containing password
    pub password_env: Option<String>,
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
    /// Ask the broker not to echo our own publishes; when false the
    /// client filters echoes itself
    #[serde(default = "default_no_local")]
    pub no_local: bool,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

impl Default for MqttSection {
    fn default() -> Self {
        Self {
            broker_url: "mqtt://127.0.0.1:1883".to_string(),
            username_env: None,
            password_env: None,
            topic_prefix: default_topic_prefix(),
            no_local: default_no_local(),
            keep_alive_secs: default_keep_alive(),
        }
    }
}

impl MqttSection {
    pub fn topic_scheme(&self) -> TopicScheme {
        TopicScheme::new(&self.topic_prefix)
    }
}

fn default_topic_prefix() -> String {
    crate::protocol::topics::DEFAULT_PREFIX.to_string()
}

fn default_no_local() -> bool {
    true
}

fn default_keep_alive() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProtocolSection {
    /// Field separator used in intro, directory and key/value payloads
    pub separator: char,
}

impl Default for ProtocolSection {
    fn default() -> Self {
        Self { separator: ' ' }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthSection {
    pub port: u16,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid node name: {0}")]
    InvalidNodeName(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Values given on the command line, applied over the file
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub ce_pin: Option<u16>,
    pub csn_pin: Option<u16>,
    pub broker_url: Option<String>,
    pub node_name: Option<String>,
}

impl GatewayConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: GatewayConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ce_pin) = overrides.ce_pin {
            self.radio.ce_pin = ce_pin;
        }
        if let Some(csn_pin) = overrides.csn_pin {
            self.radio.csn_pin = csn_pin;
        }
        if let Some(broker_url) = &overrides.broker_url {
            self.mqtt.broker_url = normalize_broker_url(broker_url);
        }
        if let Some(node_name) = &overrides.node_name {
            self.gateway.node_name = node_name.clone();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_node_name(&self.gateway.node_name)
            .map_err(|e| ConfigError::InvalidNodeName(format!("'{}': {e}", self.gateway.node_name)))?;

        let url = Url::parse(&self.mqtt.broker_url).map_err(|e| {
            ConfigError::InvalidConfig(format!("broker_url '{}': {e}", self.mqtt.broker_url))
        })?;
        if !matches!(url.scheme(), "mqtt" | "mqtts") || url.host_str().is_none() {
            return Err(ConfigError::InvalidConfig(format!(
                "broker_url '{}' must be mqtt://host[:port] or mqtts://host[:port]",
                self.mqtt.broker_url
            )));
        }

        let prefix = self.mqtt.topic_prefix.trim_matches('/');
        if prefix.is_empty() || prefix.contains(['#', '+']) {
            return Err(ConfigError::InvalidConfig(format!(
                "topic_prefix '{}' must be a non-empty topic without wildcards",
                self.mqtt.topic_prefix
            )));
        }

        if !matches!(self.protocol.separator, ' ' | ',') {
            return Err(ConfigError::InvalidConfig(format!(
                "separator {:?} must be a space or a comma",
                self.protocol.separator
            )));
        }

        if self.radio.disconnect_timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "disconnect_timeout_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Render as TOML for `config --show`
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidConfig(e.to_string()))
    }
}

/// Accept a bare `host[:port]` on the command line
fn normalize_broker_url(broker: &str) -> String {
    if broker.contains("://") {
        broker.to_string()
    } else {
        format!("mqtt://{broker}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config() {
        let toml_content = r#"
[gateway]
node_name = "RCC_Station"

[radio]
driver = "loopback"
ce_pin = 22
csn_pin = 1
serial_port = "/dev/ttyACM0"
baud_rate = 57600
power_level = "max"
data_rate = "1mbps"
disconnect_timeout_ms = 3000
idle_sleep_ms = 5

[mqtt]
broker_url = "mqtt://192.168.1.10:1883"
username_env = "MQTT_USERNAME"
password_env = "MQTT_PASSWORD"
topic_prefix = "rcc"
no_local = false

[protocol]
separator = ","

[health]
port = 8080
"#;

        let config: GatewayConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.gateway.node_name, "RCC_Station");
        assert_eq!(config.radio.driver, RadioDriver::Loopback);
        assert_eq!(config.radio.ce_pin, 22);
        assert_eq!(config.radio.power_level, PowerLevel::Max);
        assert_eq!(config.radio.data_rate, DataRate::Mbps1);
        assert_eq!(config.mqtt.topic_prefix, "rcc");
        assert!(!config.mqtt.no_local);
        assert_eq!(config.mqtt.keep_alive_secs, 60);
        assert_eq!(config.protocol.separator, ',');
        assert_eq!(config.health, Some(HealthSection { port: 8080 }));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let toml_content = r#"
[mqtt]
broker_url = "mqtt://localhost:1883"
"#;

        let config: GatewayConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.gateway.node_name, "RCC_Station");
        assert_eq!(config.radio, RadioSection::default());
        assert_eq!(config.mqtt.topic_prefix, "cab");
        assert!(config.mqtt.no_local);
        assert_eq!(config.protocol.separator, ' ');
        assert!(config.health.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_mqtt_section_is_an_error() {
        let result: Result<GatewayConfig, _> = toml::from_str("[gateway]\nnode_name = \"x\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_node_name() {
        let mut config = GatewayConfig::default();
        config.gateway.node_name = "bad name!".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidNodeName(_))
        ));
    }

    #[test]
    fn test_invalid_values() {
        let mut config = GatewayConfig::default();
        config.mqtt.broker_url = "http://localhost".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidConfig(_))));

        let mut config = GatewayConfig::default();
        config.mqtt.topic_prefix = "cab/#".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidConfig(_))));

        let mut config = GatewayConfig::default();
        config.protocol.separator = ';';
        assert!(matches!(config.validate(), Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_overrides_take_precedence() {
        let mut config = GatewayConfig::default();
        config.apply_overrides(&ConfigOverrides {
            ce_pin: Some(17),
            csn_pin: Some(1),
            broker_url: Some("broker.local:1884".to_string()),
            node_name: Some("Yard".to_string()),
        });

        assert_eq!(config.radio.ce_pin, 17);
        assert_eq!(config.radio.csn_pin, 1);
        assert_eq!(config.mqtt.broker_url, "mqtt://broker.local:1884");
        assert_eq!(config.gateway.node_name, "Yard");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_wireless_config_conversion() {
        let radio = RadioSection {
            disconnect_timeout_ms: 1500,
            idle_sleep_ms: 2,
            ..RadioSection::default()
        };
        let wireless = radio.wireless_config();
        assert_eq!(wireless.disconnect_timeout, Duration::from_millis(1500));
        assert_eq!(wireless.idle_sleep, Duration::from_millis(2));
        assert_eq!(wireless.power_level, PowerLevel::Low);
    }

    #[test]
    fn test_show_round_trips() {
        let config = GatewayConfig::default();
        let rendered = config.to_toml().unwrap();
        let parsed: GatewayConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }
}
