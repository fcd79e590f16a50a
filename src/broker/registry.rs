//! Device registry, rebuilt from introductions after every restart

use crate::protocol::commands::{TYPE_KEYPAD, TYPE_LOCO};
use crate::protocol::HeartbeatFormat;
use crate::radio::RadioAddress;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeviceKind {
    Loco,
    Keypad,
}

impl DeviceKind {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            TYPE_LOCO => Some(DeviceKind::Loco),
            TYPE_KEYPAD => Some(DeviceKind::Keypad),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            DeviceKind::Loco => TYPE_LOCO,
            DeviceKind::Keypad => TYPE_KEYPAD,
        }
    }
}

/// Side of the gateway a device introduced itself on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransportOrigin {
    Radio,
    Mqtt,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceDescriptor {
    pub kind: DeviceKind,
    pub addr: RadioAddress,
    pub name: String,
    pub firmware_version: String,
    #[serde(serialize_with = "serialize_format")]
    pub heartbeat_format: Option<HeartbeatFormat>,
    /// Field names from the device's `heartbeat/keys` report
    pub heartbeat_keys: Vec<String>,
    pub origin: TransportOrigin,
    pub introduced_at: DateTime<Utc>,
}

fn serialize_format<S: Serializer>(
    format: &Option<HeartbeatFormat>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    format
        .as_ref()
        .map(HeartbeatFormat::advertised)
        .serialize(serializer)
}

impl DeviceDescriptor {
    /// Parse an introduction payload: `Type SEP Addr SEP Name SEP Version [SEP Format]`.
    ///
    /// `addr` is the address the introduction arrived from; the address field
    /// inside the payload is informational only.
    pub fn from_intro(
        addr: RadioAddress,
        payload: &str,
        separator: char,
        origin: TransportOrigin,
    ) -> Option<Self> {
        let fields: Vec<&str> = payload.split(separator).collect();
        if fields.len() < 4 {
            warn!(addr = addr, payload = %payload, "Introduction has too few fields");
            return None;
        }

        let Some(kind) = DeviceKind::from_code(fields[0]) else {
            warn!(addr = addr, kind = %fields[0], "Introduction has unknown device type");
            return None;
        };

        if fields[1].parse::<RadioAddress>().ok() != Some(addr) {
            debug!(
                addr = addr,
                advertised = %fields[1],
                "Introduction address differs from source address"
            );
        }

        let heartbeat_format = match fields.get(4).filter(|f| !f.is_empty()) {
            Some(advertised) => match HeartbeatFormat::parse(advertised) {
                Ok(format) => Some(format),
                Err(e) => {
                    warn!(addr = addr, format = %advertised, "Ignoring heartbeat format: {}", e);
                    None
                }
            },
            None => None,
        };

        Some(Self {
            kind,
            addr,
            name: fields[2].to_string(),
            firmware_version: fields[3].to_string(),
            heartbeat_format,
            heartbeat_keys: Vec::new(),
            origin,
            introduced_at: Utc::now(),
        })
    }

    /// Fold a repeated introduction into this descriptor
    fn merge(&mut self, newer: DeviceDescriptor) {
        self.kind = newer.kind;
        self.name = newer.name;
        self.firmware_version = newer.firmware_version;
        self.origin = newer.origin;
        self.introduced_at = newer.introduced_at;
        if newer.heartbeat_format.is_some() {
            self.heartbeat_format = newer.heartbeat_format;
        }
    }
}

/// Known devices keyed by address, iterated in ascending address order
#[derive(Debug, Default)]
pub struct Registry {
    devices: BTreeMap<RadioAddress, DeviceDescriptor>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, addr: RadioAddress) -> Option<&DeviceDescriptor> {
        self.devices.get(&addr)
    }

    pub fn contains(&self, addr: RadioAddress) -> bool {
        self.devices.contains_key(&addr)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceDescriptor> {
        self.devices.values()
    }

    /// Create or merge the entry for `addr` from an introduction payload
    pub fn introduce(
        &mut self,
        addr: RadioAddress,
        payload: &str,
        separator: char,
        origin: TransportOrigin,
    ) -> Option<&DeviceDescriptor> {
        let descriptor = DeviceDescriptor::from_intro(addr, payload, separator, origin)?;
        let entry = self
            .devices
            .entry(addr)
            .and_modify(|existing| existing.merge(descriptor.clone()))
            .or_insert(descriptor);
        info!(
            addr = addr,
            kind = ?entry.kind,
            name = %entry.name,
            version = %entry.firmware_version,
            origin = ?entry.origin,
            "Registered device"
        );
        Some(entry)
    }

    pub fn set_heartbeat_keys(&mut self, addr: RadioAddress, keys: &str, separator: char) {
        if let Some(device) = self.devices.get_mut(&addr) {
            device.heartbeat_keys = keys
                .split(separator)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect();
        }
    }

    pub fn remove(&mut self, addr: RadioAddress) -> Option<DeviceDescriptor> {
        self.devices.remove(&addr)
    }
}
