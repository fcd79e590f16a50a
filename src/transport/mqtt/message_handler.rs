//! Pure routing decisions for MQTT events
//!
//! Turns rumqttc events into [`EventRoute`] values and decides which inbound
//! publishes reach the broker.

use crate::protocol::TopicScheme;
use crate::radio::RadioAddress;
use rumqttc::v5::mqttbytes::v5::{Filter, Packet};
use rumqttc::v5::{mqttbytes::QoS, Event};
use tracing::debug;

pub struct MessageHandler;

impl MessageHandler {
    /// Accept a publish for routing, returning its address and action.
    ///
    /// Retained messages are state replays, not commands, and are skipped
    /// along with topics outside the `<prefix>/<addr>/<action>` namespace.
    pub fn should_process_message<'a>(
        topic: &'a str,
        retain: bool,
        scheme: &TopicScheme,
    ) -> Option<(RadioAddress, &'a str)> {
        if retain {
            debug!("Ignoring retained message on topic: {}", topic);
            return None;
        }

        let parsed = scheme.parse(topic);
        if parsed.is_none() {
            debug!("Ignoring message outside the gateway namespace: {}", topic);
        }
        parsed
    }

    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(_) => EventRoute::ConnectionAcknowledged,
                Packet::Publish(publish) => EventRoute::MessageReceived {
                    topic: String::from_utf8_lossy(&publish.topic).to_string(),
                    payload: publish.payload.to_vec(),
                    retain: publish.retain,
                },
                Packet::Disconnect(_) => EventRoute::Disconnected,
                Packet::SubAck(suback) => EventRoute::SubscriptionConfirmed {
                    packet_id: suback.pkid,
                    reason_codes: suback
                        .return_codes
                        .iter()
                        .map(|code| format!("{code:?}"))
                        .collect(),
                },
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }

    /// Retained publishes (introductions) go out at QoS 1, everything else at QoS 0
    pub fn determine_qos_level(retain: bool) -> QoS {
        match retain {
            true => QoS::AtLeastOnce,
            false => QoS::AtMostOnce,
        }
    }

    /// The single namespace-wide subscription
    pub fn build_subscription_filter(scheme: &TopicScheme, no_local: bool) -> Filter {
        let mut filter = Filter::new(scheme.wildcard(), QoS::AtLeastOnce);
        filter.nolocal = no_local;
        filter
    }
}

#[derive(Debug, Clone)]
pub enum EventRoute {
    ConnectionAcknowledged,
    MessageReceived {
        topic: String,
        payload: Vec<u8>,
        retain: bool,
    },
    Disconnected,
    SubscriptionConfirmed {
        packet_id: u16,
        reason_codes: Vec<String>,
    },
    /// PingResp, PubAck and similar
    InfrastructureEvent(String),
    OutgoingEvent,
}
