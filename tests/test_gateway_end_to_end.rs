//! End-to-end routing through a running wireless transport
//!
//! A real poll thread drives a [`MockRadio`]; MQTT is a recording publisher.

use nrf2mqtt::broker::Broker;
use nrf2mqtt::protocol::TopicScheme;
use nrf2mqtt::radio::{WirelessConfig, WirelessTransport};
use nrf2mqtt::testing::{MockRadio, RecordingPublisher};
use nrf2mqtt::Gateway;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

struct Harness {
    radio: MockRadio,
    publisher: RecordingPublisher,
    gateway: Gateway,
    transport: WirelessTransport<MockRadio>,
}

fn start_gateway(disconnect_timeout: Duration) -> Harness {
    let radio = MockRadio::new();
    let publisher = RecordingPublisher::new();
    let config = WirelessConfig {
        disconnect_timeout,
        idle_sleep: Duration::from_millis(1),
        ..WirelessConfig::default()
    };
    let mut transport = WirelessTransport::new(radio.clone(), config);

    let gateway = Gateway::new(
        Arc::new(Broker::new(' ')),
        Arc::new(transport.handle()),
        Arc::new(publisher.clone()),
        TopicScheme::default(),
    );

    let on_frame = gateway.clone();
    transport.set_on_receive(move |addr, frame| on_frame.on_radio_frame(addr, &frame));
    let on_lost = gateway.clone();
    transport.set_on_disconnect(move |addr| on_lost.on_disconnect(addr));
    transport.start().unwrap();

    Harness {
        radio,
        publisher,
        gateway,
        transport,
    }
}

#[test]
fn test_introduction_and_throttle_round_trip() {
    let mut h = start_gateway(Duration::from_secs(5));

    h.radio.inject(3, b"AL 3 Loco 1.0 BBBI".to_vec());
    assert!(wait_until(|| h.publisher.topics() == vec!["cab/3/intro"]));

    h.gateway.on_mqtt_message(3, "throttle", "16");
    assert!(wait_until(|| h.radio.sent_to(3) == vec![b"T\x10".to_vec()]));

    h.radio.inject(3, b"H\x01\x02\x00\x00\x01\x00".to_vec());
    assert!(wait_until(|| h
        .publisher
        .published()
        .iter()
        .any(|m| m.topic == "cab/3/heartbeat/values" && m.payload == "1 2 65536")));

    h.transport.stop();
    assert_eq!(h.radio.power_down_count(), 1);
}

#[test]
fn test_keypad_drives_paired_locomotive() {
    let mut h = start_gateway(Duration::from_secs(5));

    h.radio.inject(3, b"AL 3 Loco 1.0".to_vec());
    h.radio.inject(5, b"AK 5 Pad 1.0".to_vec());
    h.radio.inject(5, vec![b'B', 3]);
    assert!(wait_until(|| h.gateway.broker().partner(5) == Some(3)));

    h.radio.inject(5, b"D\x01".to_vec());
    assert!(wait_until(|| h.radio.sent_to(3) == vec![b"D\x01".to_vec()]));
    assert!(wait_until(|| h
        .publisher
        .published()
        .iter()
        .any(|m| m.topic == "cab/3/direction" && m.payload == "FORWARD")));

    h.transport.stop();
}

#[test]
fn test_unknown_node_is_asked_to_introduce() {
    let mut h = start_gateway(Duration::from_secs(5));

    h.radio.inject(9, b"T\x05".to_vec());
    assert!(wait_until(|| h.radio.sent_to(9) == vec![b"A".to_vec()]));
    assert!(h.publisher.published().is_empty());

    h.transport.stop();
}

#[test]
fn test_unreachable_node_is_forgotten() {
    let mut h = start_gateway(Duration::from_millis(30));

    h.radio.inject(3, b"AL 3 Loco 1.0".to_vec());
    assert!(wait_until(|| h.gateway.broker().device(3).is_some()));

    h.radio.fail_sends_to(3);
    h.gateway.on_mqtt_message(3, "throttle", "10");

    assert!(wait_until(|| h.gateway.broker().device(3).is_none()));
    assert!(h.radio.sent_to(3).is_empty());
    assert!(h.radio.failed_attempts() > 0);

    h.transport.stop();
}

#[test]
fn test_start_fails_when_hardware_is_missing() {
    let mut transport =
        WirelessTransport::new(MockRadio::with_failing_begin(), WirelessConfig::default());
    assert!(transport.start().is_err());
    assert!(!transport.is_running());
}
