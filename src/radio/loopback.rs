//! Radio link with no hardware behind it
//!
//! Every send is accepted and nothing is ever received. Used to run the
//! gateway against a broker on a machine without a modem attached.

use super::{DataRate, PowerLevel, RadioAddress, RadioError, RadioLink};
use tracing::debug;

#[derive(Debug, Default)]
pub struct LoopbackRadio {
    sent: u64,
}

impl LoopbackRadio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }
}

impl RadioLink for LoopbackRadio {
    fn begin(&mut self) -> Result<(), RadioError> {
        debug!("Loopback radio up");
        Ok(())
    }

    fn set_power_level(&mut self, _level: PowerLevel) {}

    fn set_data_rate(&mut self, _rate: DataRate) {}

    fn send(&mut self, to: RadioAddress, payload: &[u8]) -> bool {
        debug!(addr = to, len = payload.len(), "Loopback radio discarding frame");
        self.sent += 1;
        true
    }

    fn poll(&mut self) {}

    fn frame_available(&mut self) -> bool {
        false
    }

    fn read(&mut self) -> Option<(RadioAddress, Vec<u8>)> {
        None
    }

    fn power_down(&mut self) {
        debug!(sent = self.sent, "Loopback radio down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_every_send() {
        let mut radio = LoopbackRadio::new();
        assert!(radio.begin().is_ok());
        assert!(radio.send(1, b"A"));
        assert!(radio.send(2, b""));
        assert_eq!(radio.sent(), 2);
        assert!(!radio.frame_available());
        assert!(radio.read().is_none());
    }
}
