//! Mock implementations for testing
//!
//! A scriptable [`MockRadio`] link plus recording stand-ins for the two
//! outbound seams the gateway talks through.

use crate::radio::{DataRate, PowerLevel, RadioAddress, RadioError, RadioLink, RadioSender};
use crate::transport::mqtt::ConnectionState;
use crate::transport::{MqttError, MqttPublisher};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

pub type SentFrame = (RadioAddress, Vec<u8>);

#[derive(Debug, Default)]
struct MockRadioState {
    inbound: VecDeque<SentFrame>,
    sent: Vec<SentFrame>,
    failed_attempts: usize,
    unreachable: HashSet<RadioAddress>,
    begin_fails: bool,
    begun: bool,
    power_level: Option<PowerLevel>,
    data_rate: Option<DataRate>,
    power_downs: usize,
}

/// In-memory radio link. Clones share state, so a test can keep one clone
/// while the wireless transport owns the other.
#[derive(Debug, Clone, Default)]
pub struct MockRadio {
    state: Arc<Mutex<MockRadioState>>,
}

impl MockRadio {
    pub fn new() -> Self {
        Self::default()
    }

    /// A link whose `begin` reports dead hardware
    pub fn with_failing_begin() -> Self {
        let radio = Self::new();
        radio.state().begin_fails = true;
        radio
    }

    fn state(&self) -> MutexGuard<'_, MockRadioState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Queue a frame as if node `from` had transmitted it
    pub fn inject(&self, from: RadioAddress, payload: Vec<u8>) {
        self.state().inbound.push_back((from, payload));
    }

    /// Every later send to `addr` fails
    pub fn fail_sends_to(&self, addr: RadioAddress) {
        self.state().unreachable.insert(addr);
    }

    pub fn restore(&self, addr: RadioAddress) {
        self.state().unreachable.remove(&addr);
    }

    /// Successfully delivered frames, in send order
    pub fn sent(&self) -> Vec<SentFrame> {
        self.state().sent.clone()
    }

    pub fn sent_to(&self, addr: RadioAddress) -> Vec<Vec<u8>> {
        self.state()
            .sent
            .iter()
            .filter(|(to, _)| *to == addr)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    pub fn failed_attempts(&self) -> usize {
        self.state().failed_attempts
    }

    pub fn is_begun(&self) -> bool {
        self.state().begun
    }

    pub fn settings(&self) -> (Option<PowerLevel>, Option<DataRate>) {
        let state = self.state();
        (state.power_level, state.data_rate)
    }

    pub fn power_down_count(&self) -> usize {
        self.state().power_downs
    }
}

impl RadioLink for MockRadio {
    fn begin(&mut self) -> Result<(), RadioError> {
        let mut state = self.state();
        if state.begin_fails {
            return Err(RadioError::HardwareNotResponding);
        }
        state.begun = true;
        Ok(())
    }

    fn set_power_level(&mut self, level: PowerLevel) {
        self.state().power_level = Some(level);
    }

    fn set_data_rate(&mut self, rate: DataRate) {
        self.state().data_rate = Some(rate);
    }

    fn send(&mut self, to: RadioAddress, payload: &[u8]) -> bool {
        let mut state = self.state();
        if state.unreachable.contains(&to) {
            state.failed_attempts += 1;
            return false;
        }
        state.sent.push((to, payload.to_vec()));
        true
    }

    fn poll(&mut self) {}

    fn frame_available(&mut self) -> bool {
        !self.state().inbound.is_empty()
    }

    fn read(&mut self) -> Option<(RadioAddress, Vec<u8>)> {
        self.state().inbound.pop_front()
    }

    fn power_down(&mut self) {
        self.state().power_downs += 1;
    }
}

/// Radio sender that records frames instead of queueing them
#[derive(Debug, Clone, Default)]
pub struct RecordingRadioSender {
    frames: Arc<Mutex<Vec<SentFrame>>>,
}

impl RecordingRadioSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<SentFrame> {
        self.frames.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn clear(&self) {
        self.frames.lock().unwrap_or_else(|p| p.into_inner()).clear();
    }
}

impl RadioSender for RecordingRadioSender {
    fn write(&self, to: RadioAddress, frame: Vec<u8>) {
        self.frames
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((to, frame));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

/// MQTT publisher that records publishes, or refuses them while "offline"
#[derive(Debug, Clone, Default)]
pub struct RecordingPublisher {
    published: Arc<Mutex<Vec<PublishedMessage>>>,
    should_fail: bool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A publisher that behaves like a disconnected client
    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn topics(&self) -> Vec<String> {
        self.published().into_iter().map(|m| m.topic).collect()
    }

    pub fn clear(&self) {
        self.published
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clear();
    }
}

impl MqttPublisher for RecordingPublisher {
    fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<(), MqttError> {
        if self.should_fail {
            return Err(MqttError::NotConnected {
                state: ConnectionState::Disconnected("mock offline".to_string()),
            });
        }
        self.published
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(PublishedMessage {
                topic: topic.to_string(),
                payload: payload.to_string(),
                retain,
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_radio_clones_share_state() {
        let radio = MockRadio::new();
        let mut link = radio.clone();

        radio.inject(3, b"T\x05".to_vec());
        assert!(link.frame_available());
        assert_eq!(link.read(), Some((3, b"T\x05".to_vec())));
        assert!(!link.frame_available());

        assert!(link.send(4, b"x"));
        assert_eq!(radio.sent(), vec![(4, b"x".to_vec())]);
    }

    #[test]
    fn test_mock_radio_unreachable_node() {
        let radio = MockRadio::new();
        let mut link = radio.clone();
        radio.fail_sends_to(9);

        assert!(!link.send(9, b"x"));
        assert_eq!(radio.failed_attempts(), 1);
        radio.restore(9);
        assert!(link.send(9, b"x"));
        assert_eq!(radio.sent_to(9), vec![b"x".to_vec()]);
    }

    #[test]
    fn test_mock_radio_failing_begin() {
        let mut link = MockRadio::with_failing_begin();
        assert!(matches!(
            link.begin(),
            Err(RadioError::HardwareNotResponding)
        ));
        assert!(!link.is_begun());
    }

    #[test]
    fn test_recording_publisher() {
        let publisher = RecordingPublisher::new();
        publisher.publish("cab/3/intro", "L 3 Loco 1.0", true).unwrap();
        assert_eq!(publisher.topics(), vec!["cab/3/intro"]);
        assert!(publisher.published()[0].retain);

        let offline = RecordingPublisher::with_failure();
        assert!(offline.publish("cab/3/throttle", "10", false).is_err());
        assert!(offline.published().is_empty());
    }
}
