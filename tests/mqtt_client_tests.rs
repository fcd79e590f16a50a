//! MQTT client tests that need no running broker

use nrf2mqtt::config::MqttSection;
use nrf2mqtt::transport::mqtt::{ConnectionState, MqttClient, MqttError, ReconnectConfig};
use nrf2mqtt::transport::MqttPublisher;
use tokio_test::{assert_err, assert_ok};

fn test_mqtt_config(broker_url: &str) -> MqttSection {
    MqttSection {
        broker_url: broker_url.to_string(),
        ..MqttSection::default()
    }
}

#[tokio::test]
async fn test_mqtt_client_creation() {
    let client = assert_ok!(MqttClient::new(
        "RCC_Station",
        &test_mqtt_config("mqtt://localhost:1883")
    ));
    assert_eq!(client.connection_state(), ConnectionState::Connecting);
    assert_eq!(client.topics().wildcard(), "cab/#");
}

#[tokio::test]
async fn test_invalid_broker_url_is_rejected() {
    let result = MqttClient::new("RCC_Station", &test_mqtt_config("not a url"));
    assert!(matches!(result, Err(MqttError::InvalidBrokerUrl(_))));
}

#[tokio::test]
async fn test_publish_before_connect_is_refused() {
    let client =
        MqttClient::new("RCC_Station", &test_mqtt_config("mqtt://localhost:1883")).unwrap();
    let result = client.handle().publish("cab/3/throttle", "10", false);
    assert!(matches!(result, Err(MqttError::NotConnected { .. })));
}

#[tokio::test]
async fn test_connect_gives_up_after_max_attempts() {
    // Nothing listens on port 1 on the loopback interface
    let mut client = MqttClient::new("RCC_Station", &test_mqtt_config("mqtt://127.0.0.1:1"))
        .unwrap()
        .with_reconnect_config(ReconnectConfig {
            max_attempts: Some(2),
            backoff_pattern: vec![10, 10],
            sustained_delay: 10,
        });

    assert_err!(client.connect().await);
    assert!(matches!(
        client.connection_state(),
        ConnectionState::PermanentlyDisconnected(_)
    ));

    assert_ok!(client.disconnect().await);
}
