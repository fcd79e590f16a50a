//! Thread-safe metrics collection system
//!
//! Atomic counters for the radio side, the MQTT side and the gateway
//! lifecycle. A single global collector is shared by every component.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

/// Thread-safe metrics collector using atomics
pub struct MetricsCollector {
    // Radio metrics
    frames_received: AtomicU64,
    frames_sent: AtomicU64,
    send_retries: AtomicU64,
    nodes_disconnected: AtomicU64,
    frames_dropped: AtomicU64,

    // MQTT metrics
    mqtt_connected: AtomicBool,
    connection_attempts: AtomicU64,
    connections_established: AtomicU64,
    messages_received: AtomicU64,
    messages_published: AtomicU64,
    publish_failures: AtomicU64,
    echoes_suppressed: AtomicU64,
    connection_start_time: AtomicU64,

    // Broker metrics
    known_devices: AtomicU64,
    active_pairings: AtomicU64,

    // Lifecycle metrics
    gateway_state: Mutex<String>,
    uptime_start: AtomicU64,
    state_transitions: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            frames_received: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            send_retries: AtomicU64::new(0),
            nodes_disconnected: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            mqtt_connected: AtomicBool::new(false),
            connection_attempts: AtomicU64::new(0),
            connections_established: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            messages_published: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
            echoes_suppressed: AtomicU64::new(0),
            connection_start_time: AtomicU64::new(0),
            known_devices: AtomicU64::new(0),
            active_pairings: AtomicU64::new(0),
            gateway_state: Mutex::new("initializing".to_string()),
            uptime_start: AtomicU64::new(current_timestamp()),
            state_transitions: AtomicU64::new(0),
        }
    }

    // Radio metrics

    pub fn radio_frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn radio_frame_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn radio_send_retry(&self) {
        self.send_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn radio_node_disconnected(&self) {
        self.nodes_disconnected.fetch_add(1, Ordering::Relaxed);
    }

    /// A frame or message that could not be parsed or routed
    pub fn frame_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    // MQTT metrics

    pub fn connection_attempt(&self) {
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_established(&self) {
        self.connections_established.fetch_add(1, Ordering::Relaxed);
        self.set_mqtt_connected(true);
    }

    /// Record the connection flag; the connect time is kept on the rising edge
    pub fn set_mqtt_connected(&self, connected: bool) {
        let was_connected = self.mqtt_connected.swap(connected, Ordering::Relaxed);
        if connected && !was_connected {
            self.connection_start_time
                .store(current_timestamp(), Ordering::Relaxed);
        }
    }

    pub fn mqtt_message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mqtt_message_published(&self) {
        self.messages_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mqtt_publish_failed(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn echo_suppressed(&self) {
        self.echoes_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    // Broker metrics

    pub fn set_device_counts(&self, devices: usize, pairings: usize) {
        self.known_devices.store(devices as u64, Ordering::Relaxed);
        self.active_pairings.store(pairings as u64, Ordering::Relaxed);
    }

    // Lifecycle metrics

    pub fn set_gateway_state(&self, state: &str) {
        let mut current = self
            .gateway_state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if *current != state {
            *current = state.to_string();
            self.state_transitions.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.frames_received,
            &self.frames_sent,
            &self.send_retries,
            &self.nodes_disconnected,
            &self.frames_dropped,
            &self.connection_attempts,
            &self.connections_established,
            &self.messages_received,
            &self.messages_published,
            &self.publish_failures,
            &self.echoes_suppressed,
            &self.connection_start_time,
            &self.known_devices,
            &self.active_pairings,
            &self.state_transitions,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.mqtt_connected.store(false, Ordering::Relaxed);
        self.uptime_start
            .store(current_timestamp(), Ordering::Relaxed);

        let mut state = self
            .gateway_state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *state = "initializing".to_string();
    }

    fn calculate_connection_duration(&self, now: u64) -> u64 {
        if !self.mqtt_connected.load(Ordering::Relaxed) {
            return 0;
        }
        now.saturating_sub(self.connection_start_time.load(Ordering::Relaxed))
    }

    /// Get complete metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        let now = current_timestamp();
        let current_state = self
            .gateway_state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        MetricsSnapshot {
            radio: RadioMetrics {
                frames_received: self.frames_received.load(Ordering::Relaxed),
                frames_sent: self.frames_sent.load(Ordering::Relaxed),
                send_retries: self.send_retries.load(Ordering::Relaxed),
                nodes_disconnected: self.nodes_disconnected.load(Ordering::Relaxed),
                frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            },
            mqtt: MqttMetrics {
                connected: self.mqtt_connected.load(Ordering::Relaxed),
                connection_attempts: self.connection_attempts.load(Ordering::Relaxed),
                connections_established: self.connections_established.load(Ordering::Relaxed),
                messages_received: self.messages_received.load(Ordering::Relaxed),
                messages_published: self.messages_published.load(Ordering::Relaxed),
                publish_failures: self.publish_failures.load(Ordering::Relaxed),
                echoes_suppressed: self.echoes_suppressed.load(Ordering::Relaxed),
                connection_duration_seconds: self.calculate_connection_duration(now),
            },
            broker: BrokerMetrics {
                known_devices: self.known_devices.load(Ordering::Relaxed),
                active_pairings: self.active_pairings.load(Ordering::Relaxed),
            },
            lifecycle: LifecycleMetrics {
                current_state,
                uptime_seconds: now.saturating_sub(self.uptime_start.load(Ordering::Relaxed)),
                state_transitions: self.state_transitions.load(Ordering::Relaxed),
            },
            timestamp: now,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub radio: RadioMetrics,
    pub mqtt: MqttMetrics,
    pub broker: BrokerMetrics,
    pub lifecycle: LifecycleMetrics,
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
pub struct RadioMetrics {
    pub frames_received: u64,
    pub frames_sent: u64,
    pub send_retries: u64,
    pub nodes_disconnected: u64,
    pub frames_dropped: u64,
}

#[derive(Debug, Serialize)]
pub struct MqttMetrics {
    pub connected: bool,
    pub connection_attempts: u64,
    pub connections_established: u64,
    pub messages_received: u64,
    pub messages_published: u64,
    pub publish_failures: u64,
    pub echoes_suppressed: u64,
    pub connection_duration_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct BrokerMetrics {
    pub known_devices: u64,
    pub active_pairings: u64,
}

#[derive(Debug, Serialize)]
pub struct LifecycleMetrics {
    pub current_state: String,
    pub uptime_seconds: u64,
    pub state_transitions: u64,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_radio_metrics() {
        let collector = MetricsCollector::new();

        collector.radio_frame_received();
        collector.radio_frame_received();
        collector.radio_frame_sent();
        collector.radio_send_retry();
        collector.radio_node_disconnected();
        collector.frame_dropped();

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.radio.frames_received, 2);
        assert_eq!(snapshot.radio.frames_sent, 1);
        assert_eq!(snapshot.radio.send_retries, 1);
        assert_eq!(snapshot.radio.nodes_disconnected, 1);
        assert_eq!(snapshot.radio.frames_dropped, 1);
    }

    #[test]
    fn test_mqtt_metrics() {
        let collector = MetricsCollector::new();

        collector.connection_attempt();
        collector.connection_established();
        collector.mqtt_message_published();
        collector.mqtt_publish_failed();
        collector.mqtt_message_received();
        collector.echo_suppressed();

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.mqtt.connection_attempts, 1);
        assert_eq!(snapshot.mqtt.connections_established, 1);
        assert_eq!(snapshot.mqtt.messages_published, 1);
        assert_eq!(snapshot.mqtt.publish_failures, 1);
        assert_eq!(snapshot.mqtt.messages_received, 1);
        assert_eq!(snapshot.mqtt.echoes_suppressed, 1);
        assert!(snapshot.mqtt.connected);

        collector.set_mqtt_connected(false);
        let snapshot = collector.snapshot();
        assert!(!snapshot.mqtt.connected);
        assert_eq!(snapshot.mqtt.connection_duration_seconds, 0);
    }

    #[test]
    fn test_device_counts_and_state() {
        let collector = MetricsCollector::new();

        collector.set_device_counts(3, 1);
        collector.set_gateway_state("running");
        collector.set_gateway_state("running");
        collector.set_gateway_state("stopping");

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.broker.known_devices, 3);
        assert_eq!(snapshot.broker.active_pairings, 1);
        assert_eq!(snapshot.lifecycle.current_state, "stopping");
        assert_eq!(snapshot.lifecycle.state_transitions, 2);
    }

    #[test]
    fn test_thread_safety() {
        let collector = Arc::new(MetricsCollector::new());

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let collector = Arc::clone(&collector);
                thread::spawn(move || {
                    for _ in 0..100 {
                        collector.radio_frame_received();
                        collector.mqtt_message_published();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.radio.frames_received, 1000);
        assert_eq!(snapshot.mqtt.messages_published, 1000);
    }

    #[test]
    fn test_reset_functionality() {
        let collector = MetricsCollector::new();

        collector.radio_frame_received();
        collector.connection_established();
        collector.set_gateway_state("running");

        collector.reset();

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.radio.frames_received, 0);
        assert!(!snapshot.mqtt.connected);
        assert_eq!(snapshot.lifecycle.current_state, "initializing");
        assert_eq!(snapshot.lifecycle.state_transitions, 0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let collector = MetricsCollector::new();
        let json = serde_json::to_value(collector.snapshot()).unwrap();
        assert!(json["radio"]["frames_received"].is_u64());
        assert!(json["mqtt"]["connected"].is_boolean());
        assert_eq!(json["lifecycle"]["current_state"], "initializing");
    }
}
