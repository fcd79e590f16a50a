//! Stateful router between the radio mesh and MQTT
//!
//! The broker owns the device [`Registry`] and the [`PairingTable`] behind a
//! single lock, so introductions and subscriptions arriving from the radio
//! poll loop and the MQTT event loop are serialized. Routing is pure with
//! respect to I/O: every call returns the list of [`Dispatch`] actions the
//! caller must carry out, in order.

pub mod pairing;
pub mod registry;

pub use pairing::PairingTable;
pub use registry::{DeviceDescriptor, DeviceKind, Registry, TransportOrigin};

use crate::observability::metrics::metrics;
use crate::protocol::commands::*;
use crate::protocol::{CodecContext, Translator};
use crate::radio::RadioAddress;
use serde::Serialize;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// One outbound action decided by the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Queue `frame` for radio node `addr`
    Radio { addr: RadioAddress, frame: Vec<u8> },
    /// Publish `payload` on `<prefix>/<addr>/<action>`
    Mqtt {
        addr: RadioAddress,
        action: String,
        payload: String,
        retain: bool,
    },
}

impl Dispatch {
    fn mqtt(addr: RadioAddress, action: impl Into<String>, payload: impl Into<String>) -> Self {
        let action = action.into();
        let retain = action == MQ_INTRO;
        Dispatch::Mqtt {
            addr,
            action,
            payload: payload.into(),
            retain,
        }
    }
}

/// Registry and pairings as served by the health endpoint
#[derive(Debug, Clone, Serialize)]
pub struct BrokerSnapshot {
    pub devices: Vec<DeviceDescriptor>,
    pub pairings: Vec<(RadioAddress, RadioAddress)>,
}

#[derive(Debug, Default)]
struct BrokerState {
    registry: Registry,
    pairings: PairingTable,
}

impl BrokerState {
    fn publish_counts(&self) {
        metrics().set_device_counts(self.registry.len(), self.pairings.len());
    }

    /// Address MQTT sees for traffic from `addr`: locomotives speak for
    /// themselves, keypads speak for the locomotive they are paired with
    fn mqtt_address(&self, addr: RadioAddress) -> RadioAddress {
        match self.registry.get(addr).map(|d| d.kind) {
            Some(DeviceKind::Keypad) => self.pairings.partner(addr).unwrap_or(addr),
            _ => addr,
        }
    }

    fn is_radio_device(&self, addr: RadioAddress) -> bool {
        self.registry
            .get(addr)
            .map_or(true, |d| d.origin == TransportOrigin::Radio)
    }
}

pub struct Broker {
    translator: Translator,
    separator: char,
    state: Mutex<BrokerState>,
}

impl Broker {
    pub fn new(separator: char) -> Self {
        Self {
            translator: Translator::new(),
            separator,
            state: Mutex::new(BrokerState::default()),
        }
    }

    pub fn separator(&self) -> char {
        self.separator
    }

    fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Route a frame received from radio node `addr`
    pub fn receive_radio(&self, addr: RadioAddress, frame: &[u8]) -> Vec<Dispatch> {
        let Some((&command, payload)) = frame.split_first() else {
            return Vec::new();
        };
        let mut state = self.state();

        if !state.registry.contains(addr) && command != CMD_INTRO {
            debug!(addr = addr, command = %command_name(command), "Unknown node, requesting introduction");
            return vec![Dispatch::Radio {
                addr,
                frame: vec![CMD_INTRO],
            }];
        }

        match command {
            CMD_SUBSCRIBE => {
                match payload.first() {
                    Some(0) => {
                        state.pairings.unsubscribe(addr);
                    }
                    Some(&partner) => {
                        state.pairings.subscribe(addr, RadioAddress::from(partner));
                    }
                    None => warn!(addr = addr, "Subscribe frame without partner address"),
                }
                state.publish_counts();
                return Vec::new();
            }
            CMD_LIST_CABS => {
                return vec![Dispatch::Radio {
                    addr,
                    frame: self.directory_frame(&state.registry),
                }];
            }
            CMD_PING => {
                return vec![Dispatch::Radio {
                    addr,
                    frame: frame.to_vec(),
                }];
            }
            CMD_INTRO => {
                let Ok(intro) = std::str::from_utf8(payload) else {
                    warn!(addr = addr, bytes = ?frame, "Introduction is not valid UTF-8");
                    metrics().frame_dropped();
                    return Vec::new();
                };
                if state
                    .registry
                    .introduce(addr, intro, self.separator, TransportOrigin::Radio)
                    .is_none()
                {
                    metrics().frame_dropped();
                    return Vec::new();
                }
                state.publish_counts();
            }
            CMD_HEARTBEAT_KEYS => {
                if let Ok(keys) = std::str::from_utf8(payload) {
                    state.registry.set_heartbeat_keys(addr, keys, self.separator);
                }
            }
            _ => {}
        }

        let heartbeat = state
            .registry
            .get(addr)
            .and_then(|d| d.heartbeat_format.as_ref());
        let ctx = CodecContext::new(self.separator).with_heartbeat(heartbeat);
        let Some(message) = self.translator.to_mqtt(command, payload, &ctx) else {
            warn!(
                addr = addr,
                command = %command_name(command),
                bytes = ?frame,
                "Dropping untranslatable radio frame"
            );
            metrics().frame_dropped();
            return Vec::new();
        };

        let mut dispatches = vec![Dispatch::mqtt(
            state.mqtt_address(addr),
            message.action,
            message.payload,
        )];

        if let Some(partner) = state.pairings.partner(addr) {
            if state.is_radio_device(partner) {
                dispatches.push(Dispatch::Radio {
                    addr: partner,
                    frame: frame.to_vec(),
                });
            }
        }

        dispatches
    }

    /// Route an MQTT message addressed to node `addr`
    pub fn receive_mqtt(&self, addr: RadioAddress, action: &str, payload: &str) -> Vec<Dispatch> {
        let mut state = self.state();

        if !state.registry.contains(addr) && action != MQ_INTRO {
            if action == MQ_INTRO_REQ {
                debug!(addr = addr, "Introduction request for unknown node");
                return Vec::new();
            }
            debug!(addr = addr, action = %action, "Unknown node, requesting introduction");
            return vec![Dispatch::mqtt(addr, MQ_INTRO_REQ, "")];
        }

        if action == MQ_INTRO {
            if state
                .registry
                .introduce(addr, payload, self.separator, TransportOrigin::Mqtt)
                .is_none()
            {
                metrics().frame_dropped();
                return Vec::new();
            }
            state.publish_counts();
        }

        let heartbeat = state
            .registry
            .get(addr)
            .and_then(|d| d.heartbeat_format.as_ref());
        let ctx = CodecContext::new(self.separator).with_heartbeat(heartbeat);
        let Some(frame) = self.translator.to_radio(action, payload, &ctx) else {
            warn!(
                addr = addr,
                action = %action,
                payload = %payload,
                "Dropping untranslatable MQTT message"
            );
            metrics().frame_dropped();
            return Vec::new();
        };

        let mut dispatches = Vec::with_capacity(2);
        if state.is_radio_device(addr) {
            dispatches.push(Dispatch::Radio {
                addr,
                frame: frame.clone(),
            });
        }
        if let Some(partner) = state.pairings.partner(addr) {
            if state.is_radio_device(partner) {
                dispatches.push(Dispatch::Radio {
                    addr: partner,
                    frame,
                });
            }
        }
        dispatches
    }

    /// Drop everything known about `addr`; called when the node goes unreachable
    pub fn forget(&self, addr: RadioAddress) -> bool {
        let mut state = self.state();
        let known = state.registry.remove(addr).is_some();
        let paired = state.pairings.unsubscribe(addr).is_some();
        if known || paired {
            info!(addr = addr, "Forgot node");
            state.publish_counts();
        }
        known || paired
    }

    /// Directory frame listing every known device
    pub fn directory(&self) -> Vec<u8> {
        self.directory_frame(&self.state().registry)
    }

    fn directory_frame(&self, registry: &Registry) -> Vec<u8> {
        let sep = self.separator.to_string();
        let entries: Vec<String> = registry
            .iter()
            .map(|d| [d.kind.code(), &d.addr.to_string(), &d.name].join(&sep))
            .collect();

        let mut frame = vec![CMD_LIST_CABS];
        frame.extend_from_slice(entries.join(&sep).as_bytes());
        frame
    }

    pub fn device(&self, addr: RadioAddress) -> Option<DeviceDescriptor> {
        self.state().registry.get(addr).cloned()
    }

    pub fn partner(&self, addr: RadioAddress) -> Option<RadioAddress> {
        self.state().pairings.partner(addr)
    }

    pub fn snapshot(&self) -> BrokerSnapshot {
        let state = self.state();
        BrokerSnapshot {
            devices: state.registry.iter().cloned().collect(),
            pairings: state.pairings.pairs(),
        }
    }
}
