//! Glue between the broker and the two transports
//!
//! The radio poll thread and the MQTT event loop both call into [`Gateway`];
//! it asks the [`Broker`] what to do and carries out the resulting
//! [`Dispatch`] list through the [`RadioSender`] and [`MqttPublisher`] seams.

use crate::broker::{Broker, Dispatch};
use crate::observability::metrics::metrics;
use crate::protocol::TopicScheme;
use crate::radio::{RadioAddress, RadioSender};
use crate::transport::MqttPublisher;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct Gateway {
    broker: Arc<Broker>,
    radio: Arc<dyn RadioSender>,
    mqtt: Arc<dyn MqttPublisher>,
    topics: TopicScheme,
}

impl Gateway {
    pub fn new(
        broker: Arc<Broker>,
        radio: Arc<dyn RadioSender>,
        mqtt: Arc<dyn MqttPublisher>,
        topics: TopicScheme,
    ) -> Self {
        Self {
            broker,
            radio,
            mqtt,
            topics,
        }
    }

    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    /// A frame arrived from radio node `addr`
    pub fn on_radio_frame(&self, addr: RadioAddress, frame: &[u8]) {
        debug!(addr, bytes = ?frame, "[RF] <");
        let dispatches = self.broker.receive_radio(addr, frame);
        self.execute(dispatches);
    }

    /// A message arrived on `<prefix>/<addr>/<action>`
    pub fn on_mqtt_message(&self, addr: RadioAddress, action: &str, payload: &str) {
        debug!(addr, action, payload, "[MQ] <");
        let dispatches = self.broker.receive_mqtt(addr, action, payload);
        self.execute(dispatches);
    }

    /// Radio node `addr` stopped acknowledging
    pub fn on_disconnect(&self, addr: RadioAddress) {
        if self.broker.forget(addr) {
            info!(addr, "Forgot unreachable device");
        } else {
            debug!(addr, "Unreachable node was never introduced");
        }
    }

    fn execute(&self, dispatches: Vec<Dispatch>) {
        for dispatch in dispatches {
            match dispatch {
                Dispatch::Radio { addr, frame } => {
                    debug!(addr, bytes = ?frame, "[RF] >");
                    self.radio.write(addr, frame);
                }
                Dispatch::Mqtt {
                    addr,
                    action,
                    payload,
                    retain,
                } => {
                    let topic = self.topics.build(addr, &action);
                    match self.mqtt.publish(&topic, &payload, retain) {
                        Ok(()) => metrics().mqtt_message_published(),
                        Err(e) => {
                            metrics().mqtt_publish_failed();
                            warn!(topic = %topic, error = %e, "Dropping MQTT publish");
                        }
                    }
                }
            }
        }
    }
}
