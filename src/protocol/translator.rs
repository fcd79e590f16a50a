//! Translation between radio frames and MQTT messages
//!
//! The translator is a fixed, ordered table of [`RouteEntry`] rows. Each row
//! ties one radio command byte to one MQTT action pattern and a [`Codec`] that
//! converts payloads in both directions. MQTT actions are matched by prefix and
//! the first matching row wins, so more specific patterns are declared ahead
//! of more general ones sharing the same prefix (`heartbeat/values` before
//! `heartbeat`, `function/get` before `function/`).

use super::commands::*;
use super::heartbeat::HeartbeatFormat;
use tracing::debug;

/// Per-call inputs a codec may need beyond the payload itself
#[derive(Debug, Clone, Copy)]
pub struct CodecContext<'a> {
    /// Field separator for key/value pairs, heartbeat values and introductions
    pub separator: char,
    /// Heartbeat layout of the device the frame belongs to, when known
    pub heartbeat: Option<&'a HeartbeatFormat>,
}

impl<'a> CodecContext<'a> {
    pub fn new(separator: char) -> Self {
        Self {
            separator,
            heartbeat: None,
        }
    }

    pub fn with_heartbeat(mut self, heartbeat: Option<&'a HeartbeatFormat>) -> Self {
        self.heartbeat = heartbeat;
        self
    }
}

/// Payload conversion rule for one route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// Device introduction, UTF-8 passthrough
    Intro,
    /// UTF-8 passthrough
    Text,
    /// Values packed per the device heartbeat layout
    Heartbeat,
    /// Single unsigned byte, `abs` and clamped on the way to radio
    Integer,
    /// Direction name or index as a single byte
    Direction,
    /// Function number in the low 7 bits, bit 7 set when ON
    FunctionSet,
    /// `key SEP value`, key embedded in the MQTT action
    KeyValue,
}

impl Codec {
    /// MQTT payload to radio payload (command byte not included)
    pub fn encode(self, key: &str, payload: &str, ctx: &CodecContext<'_>) -> Option<Vec<u8>> {
        match self {
            Codec::Intro | Codec::Text => Some(payload.as_bytes().to_vec()),
            Codec::Integer => {
                let value: i64 = payload.trim().parse().ok()?;
                Some(vec![value.unsigned_abs().min(u8::MAX as u64) as u8])
            }
            Codec::Direction => DIRECTIONS
                .iter()
                .enumerate()
                .find(|(index, name)| **name == payload || index.to_string() == payload)
                .map(|(index, _)| vec![index as u8]),
            Codec::FunctionSet => {
                let function: u32 = key.parse().ok()?;
                let on = if payload == FUNCTION_ON { 0x80 } else { 0 };
                Some(vec![(function & 0x7F) as u8 | on])
            }
            Codec::KeyValue => {
                if key.is_empty() {
                    return None;
                }
                Some(format!("{key}{}{payload}", ctx.separator).into_bytes())
            }
            Codec::Heartbeat => {
                if payload.trim().is_empty() {
                    // Empty heartbeat asks the device to report
                    return Some(vec![0]);
                }
                let format = ctx.heartbeat?;
                let values: Vec<&str> = payload
                    .split(|c: char| c == ctx.separator || c == ',' || c.is_whitespace())
                    .filter(|v| !v.is_empty())
                    .collect();
                format.encode(&values)
            }
        }
    }

    /// Radio payload to `(key, MQTT payload)`
    pub fn decode(self, payload: &[u8], ctx: &CodecContext<'_>) -> Option<(String, String)> {
        match self {
            Codec::Intro | Codec::Text => {
                let text = std::str::from_utf8(payload).ok()?;
                Some((String::new(), text.to_string()))
            }
            Codec::Integer => Some((String::new(), payload.first()?.to_string())),
            Codec::Direction => {
                let name = DIRECTIONS.get(*payload.first()? as usize)?;
                Some((String::new(), name.to_string()))
            }
            Codec::FunctionSet => {
                let byte = *payload.first()?;
                let state = if byte & 0x80 != 0 {
                    FUNCTION_ON
                } else {
                    FUNCTION_OFF
                };
                Some(((byte & 0x7F).to_string(), state.to_string()))
            }
            Codec::KeyValue => {
                let text = std::str::from_utf8(payload).ok()?;
                let (key, value) = text.split_once(ctx.separator)?;
                Some((key.to_string(), value.to_string()))
            }
            Codec::Heartbeat => {
                let values = ctx.heartbeat?.decode(payload)?;
                let separator = ctx.separator.to_string();
                let rendered: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                Some((String::new(), rendered.join(&separator)))
            }
        }
    }
}

/// One row of the translation table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteEntry {
    pub command: u8,
    pub pattern: &'static str,
    pub codec: Codec,
}

impl RouteEntry {
    const fn new(command: u8, pattern: &'static str, codec: Codec) -> Self {
        Self {
            command,
            pattern,
            codec,
        }
    }
}

/// Ordered translation table; first match wins
pub const ROUTES: [RouteEntry; 15] = [
    RouteEntry::new(CMD_INTRO, MQ_INTRO, Codec::Intro),
    RouteEntry::new(CMD_HEARTBEAT_KEYS, MQ_HEARTBEAT_KEYS, Codec::Text),
    RouteEntry::new(CMD_HEARTBEAT, MQ_HEARTBEAT_VALUES, Codec::Heartbeat),
    RouteEntry::new(CMD_HEARTBEAT, MQ_HEARTBEAT, Codec::Heartbeat),
    RouteEntry::new(CMD_THROTTLE, MQ_THROTTLE, Codec::Integer),
    RouteEntry::new(CMD_DIRECTION, MQ_DIRECTION, Codec::Direction),
    RouteEntry::new(CMD_FUNCTION_LIST_REQ, MQ_FUNCTION_LIST_REQ, Codec::Text),
    RouteEntry::new(CMD_FUNCTION_LIST, MQ_FUNCTION_LIST, Codec::Text),
    RouteEntry::new(CMD_FUNCTION_NAME, MQ_FUNCTION_NAME, Codec::KeyValue),
    RouteEntry::new(CMD_FUNCTION_GET, MQ_FUNCTION_GET, Codec::Integer),
    RouteEntry::new(CMD_FUNCTION_SET, MQ_FUNCTION_SET, Codec::FunctionSet),
    RouteEntry::new(CMD_VALUE_LIST_REQ, MQ_VALUE_LIST_REQ, Codec::Text),
    RouteEntry::new(CMD_VALUE_LIST, MQ_VALUE_LIST, Codec::Text),
    RouteEntry::new(CMD_VALUE_GET, MQ_VALUE_GET, Codec::Text),
    RouteEntry::new(CMD_VALUE_SET, MQ_VALUE_SET, Codec::KeyValue),
];

/// An MQTT-side message: action suffix under `cab/<addr>/` and its payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttMessage {
    pub action: String,
    pub payload: String,
}

impl MqttMessage {
    pub fn new(action: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            payload: payload.into(),
        }
    }
}

/// Stateless protocol translator over the [`ROUTES`] table
#[derive(Debug, Clone)]
pub struct Translator {
    routes: &'static [RouteEntry],
}

impl Default for Translator {
    fn default() -> Self {
        Self::new()
    }
}

impl Translator {
    pub fn new() -> Self {
        Self { routes: &ROUTES }
    }

    pub fn routes(&self) -> &[RouteEntry] {
        self.routes
    }

    /// Find the first route whose pattern prefixes `action`, with the embedded key
    pub fn match_action<'a>(&self, action: &'a str) -> Option<(&RouteEntry, &'a str)> {
        self.routes
            .iter()
            .find_map(|entry| action.strip_prefix(entry.pattern).map(|key| (entry, key)))
    }

    /// Translate an MQTT action and payload into a complete radio frame.
    ///
    /// Returns `None` when no route matches or the codec rejects the payload;
    /// callers drop the message in that case.
    pub fn to_radio(&self, action: &str, payload: &str, ctx: &CodecContext<'_>) -> Option<Vec<u8>> {
        let Some((entry, key)) = self.match_action(action) else {
            debug!(action = %action, "No route for MQTT action");
            return None;
        };

        let Some(body) = entry.codec.encode(key, payload, ctx) else {
            debug!(action = %action, payload = %payload, "Codec rejected MQTT payload");
            return None;
        };

        let mut frame = Vec::with_capacity(body.len() + 1);
        frame.push(entry.command);
        frame.extend_from_slice(&body);
        Some(frame)
    }

    /// Translate a radio command and payload into an MQTT action and payload
    pub fn to_mqtt(&self, command: u8, payload: &[u8], ctx: &CodecContext<'_>) -> Option<MqttMessage> {
        let entry = self.routes.iter().find(|entry| entry.command == command)?;
        let (key, value) = entry.codec.decode(payload, ctx)?;
        Some(MqttMessage::new(format!("{}{}", entry.pattern, key), value))
    }

    /// Split a raw frame and translate it
    pub fn frame_to_mqtt(&self, frame: &[u8], ctx: &CodecContext<'_>) -> Option<MqttMessage> {
        let (&command, payload) = frame.split_first()?;
        self.to_mqtt(command, payload, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> CodecContext<'static> {
        CodecContext::new(' ')
    }

    #[test]
    fn test_literal_vectors() {
        let t = Translator::new();
        assert_eq!(t.to_radio("throttle", "99", &ctx()), Some(b"T\x63".to_vec()));
        assert_eq!(t.to_radio("function/3", "ON", &ctx()), Some(b"F\x83".to_vec()));
        assert_eq!(t.to_radio("function/3", "OFF", &ctx()), Some(b"F\x03".to_vec()));
        assert_eq!(t.to_radio("direction", "FORWARD", &ctx()), Some(b"D\x01".to_vec()));
        assert_eq!(
            t.to_mqtt(b'G', b"zupa", &ctx()),
            Some(MqttMessage::new("value/get", "zupa"))
        );
    }

    #[test]
    fn test_to_radio_table() {
        let t = Translator::new();
        let cases: Vec<(&str, &str, Option<&[u8]>)> = vec![
            ("function/get", "2", Some(b"P\x02")),
            ("value/get", "zupa", Some(b"Gzupa")),
            ("value/zupa", "abc", Some(b"Szupa abc")),
            ("value/list/req", "", Some(b"L")),
            ("value/list/req", "a", Some(b"La")),
            ("direction", "REVERSE", Some(b"D\x00")),
            ("direction", "STOP", Some(b"D\x02")),
            ("direction", "3", Some(b"D\x03")),
            ("throttle", "-1", Some(b"T\x01")),
            ("throttle", "1000", Some(b"T\xff")),
            ("throttle", "a", None),
            ("function/get", "a", None),
            ("direction", "FOR", None),
            ("function/x", "ON", None),
            ("value/", "abc", None),
            ("unknown/action", "1", None),
            ("intro", "L 3 Rcc 0.9 BBBI", Some(b"AL 3 Rcc 0.9 BBBI")),
        ];

        for (action, payload, expected) in cases {
            assert_eq!(
                t.to_radio(action, payload, &ctx()),
                expected.map(|e| e.to_vec()),
                "{action}+{payload}"
            );
        }
    }

    #[test]
    fn test_specific_patterns_precede_general_ones() {
        let t = Translator::new();
        let (entry, key) = t.match_action("function/get").unwrap();
        assert_eq!(entry.command, CMD_FUNCTION_GET);
        assert_eq!(key, "");

        let (entry, key) = t.match_action("function/7").unwrap();
        assert_eq!(entry.command, CMD_FUNCTION_SET);
        assert_eq!(key, "7");

        let (entry, _) = t.match_action("heartbeat/values").unwrap();
        assert_eq!(entry.pattern, MQ_HEARTBEAT_VALUES);

        let (entry, key) = t.match_action("value/tempC").unwrap();
        assert_eq!(entry.command, CMD_VALUE_SET);
        assert_eq!(key, "tempC");

        let (entry, key) = t.match_action("intro/req").unwrap();
        assert_eq!(entry.command, CMD_INTRO);
        assert_eq!(key, "/req");
    }

    #[test]
    fn test_to_mqtt_decoding() {
        let t = Translator::new();
        assert_eq!(
            t.to_mqtt(b'T', &[99], &ctx()),
            Some(MqttMessage::new("throttle", "99"))
        );
        assert_eq!(
            t.to_mqtt(b'F', &[0x83], &ctx()),
            Some(MqttMessage::new("function/3", "ON"))
        );
        assert_eq!(
            t.to_mqtt(b'S', b"zupa abc def", &ctx()),
            Some(MqttMessage::new("value/zupa", "abc def"))
        );
        assert_eq!(
            t.to_mqtt(b'M', b"2 Horn", &ctx()),
            Some(MqttMessage::new("function/name/2", "Horn"))
        );
        assert_eq!(
            t.to_mqtt(b'J', b"speed max", &ctx()),
            Some(MqttMessage::new("value/list", "speed max"))
        );
    }

    #[test]
    fn test_to_mqtt_rejects_malformed() {
        let t = Translator::new();
        assert_eq!(t.to_mqtt(b'Z', b"x", &ctx()), None);
        assert_eq!(t.to_mqtt(b'T', b"", &ctx()), None);
        assert_eq!(t.to_mqtt(b'D', &[4], &ctx()), None);
        assert_eq!(t.to_mqtt(b'S', b"novalue", &ctx()), None);
        assert_eq!(t.to_mqtt(b'G', &[0xff, 0xfe], &ctx()), None);
    }

    #[test]
    fn test_heartbeat_requires_format() {
        let t = Translator::new();
        let format = HeartbeatFormat::parse("BBBI").unwrap();
        let known = ctx().with_heartbeat(Some(&format));
        let frame = b"\x01\x02\x00\x00\x01\x00";

        assert_eq!(t.to_mqtt(b'H', frame, &ctx()), None);
        assert_eq!(
            t.to_mqtt(b'H', frame, &known),
            Some(MqttMessage::new("heartbeat/values", "1 2 65536"))
        );
        assert_eq!(t.to_mqtt(b'H', &frame[..5], &known), None);

        assert_eq!(
            t.to_radio("heartbeat/values", "1 2 65536", &known),
            Some(b"H\x01\x02\x00\x00\x01\x00".to_vec())
        );
        assert_eq!(t.to_radio("heartbeat/values", "1,2,65536", &known), t.to_radio("heartbeat/values", "1 2 65536", &known));
        assert_eq!(t.to_radio("heartbeat/values", "1 2 3", &ctx()), None);
    }

    #[test]
    fn test_empty_heartbeat_is_a_request() {
        let t = Translator::new();
        assert_eq!(t.to_radio("heartbeat/values", "", &ctx()), Some(b"H\x00".to_vec()));
        assert_eq!(t.to_radio("heartbeat", "", &ctx()), Some(b"H\x00".to_vec()));
    }

    #[test]
    fn test_comma_separator() {
        let t = Translator::new();
        let comma = CodecContext::new(',');
        assert_eq!(t.to_radio("value/zupa", "abc", &comma), Some(b"Szupa,abc".to_vec()));
        assert_eq!(
            t.to_mqtt(b'S', b"zupa,abc", &comma),
            Some(MqttMessage::new("value/zupa", "abc"))
        );
    }

    #[test]
    fn test_frame_to_mqtt_splits_command() {
        let t = Translator::new();
        assert_eq!(
            t.frame_to_mqtt(b"D\x01", &ctx()),
            Some(MqttMessage::new("direction", "FORWARD"))
        );
        assert_eq!(t.frame_to_mqtt(b"", &ctx()), None);
    }
}
