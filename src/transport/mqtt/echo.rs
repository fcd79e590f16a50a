//! Self-echo suppression for brokers that ignore the `no_local` option
//!
//! Remembers the last `(topic, payload)` this process published. The first
//! inbound message equal to it is reported as an echo and the memory cleared.

use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct EchoFilter {
    last: Mutex<Option<(String, Vec<u8>)>>,
}

impl EchoFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, topic: &str, payload: &[u8]) {
        let mut last = self.last.lock().unwrap_or_else(|p| p.into_inner());
        *last = Some((topic.to_string(), payload.to_vec()));
    }

    /// True, once, for the message most recently recorded
    pub fn is_echo(&self, topic: &str, payload: &[u8]) -> bool {
        let mut last = self.last.lock().unwrap_or_else(|p| p.into_inner());
        let matches = last
            .as_ref()
            .is_some_and(|(t, p)| t == topic && p.as_slice() == payload);
        if matches {
            *last = None;
        }
        matches
    }
}
