//! Impure I/O side of the MQTT transport
//!
//! [`MqttClient`] owns the rumqttc event loop and runs it under a supervisor
//! task that re-subscribes on every ConnAck and backs off between retries
//! after connection loss. Publishing goes through the cloneable
//! [`MqttHandle`], which is usable from the radio worker thread.

use super::connection::{configure_mqtt_options, ConnectionState, MqttError, ReconnectConfig};
use super::echo::EchoFilter;
use super::health_monitor::{ConnectionEvent, HealthMonitor, ReconnectionDecision};
use super::message_handler::{EventRoute, MessageHandler};
use crate::config::MqttSection;
use crate::observability::metrics::metrics;
use crate::protocol::TopicScheme;
use crate::radio::RadioAddress;
use crate::transport::MqttPublisher;
use bytes::Bytes;
use rumqttc::v5::mqttbytes::v5::Filter;
use rumqttc::v5::{AsyncClient, EventLoop};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

/// Inbound message callback: `(addr, action, payload)`
pub type MessageCallback = Arc<dyn Fn(RadioAddress, &str, &str) + Send + Sync>;

/// Cloneable publishing side of the client
#[derive(Clone)]
pub struct MqttHandle {
    client: AsyncClient,
    state_rx: watch::Receiver<ConnectionState>,
    echo: Option<Arc<EchoFilter>>,
}

impl MqttHandle {
    pub fn connection_state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }
}

impl MqttPublisher for MqttHandle {
    fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<(), MqttError> {
        let state = self.connection_state();
        if !HealthMonitor::can_publish(&state) {
            return Err(MqttError::NotConnected { state });
        }

        let qos = MessageHandler::determine_qos_level(retain);
        self.client
            .try_publish(topic, qos, retain, Bytes::copy_from_slice(payload.as_bytes()))
            .map_err(|e| MqttError::PublishFailed(Box::new(e)))?;

        if let Some(echo) = &self.echo {
            echo.record(topic, payload.as_bytes());
        }
        debug!("[MQ] > {} {}", topic, payload);
        Ok(())
    }
}

/// Everything the supervisor task needs besides the event loop
struct Supervisor {
    client: AsyncClient,
    filter: Filter,
    topics: TopicScheme,
    state_tx: watch::Sender<ConnectionState>,
    shutdown_rx: watch::Receiver<bool>,
    reconnect_config: ReconnectConfig,
    on_message: Option<MessageCallback>,
    echo: Option<Arc<EchoFilter>>,
}

pub struct MqttClient {
    node_name: String,
    topics: TopicScheme,
    no_local: bool,
    client: AsyncClient,
    event_loop: Option<EventLoop>,
    state_tx: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,
    shutdown_tx: Option<watch::Sender<bool>>,
    event_loop_handle: Option<JoinHandle<()>>,
    reconnect_config: ReconnectConfig,
    on_message: Option<MessageCallback>,
    echo: Option<Arc<EchoFilter>>,
}

impl MqttClient {
    pub fn new(node_name: &str, config: &MqttSection) -> Result<Self, MqttError> {
        let mqtt_options = configure_mqtt_options(node_name, config)?;
        let (client, event_loop) = AsyncClient::new(mqtt_options, 10);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);

        let echo = (!config.no_local).then(|| Arc::new(EchoFilter::new()));
        if echo.is_some() {
            info!("no_local disabled, suppressing self-echo with the last-published cache");
        }

        Ok(Self {
            node_name: node_name.to_string(),
            topics: TopicScheme::new(&config.topic_prefix),
            no_local: config.no_local,
            client,
            event_loop: Some(event_loop),
            state_tx,
            state_rx,
            shutdown_tx: None,
            event_loop_handle: None,
            reconnect_config: ReconnectConfig::default(),
            on_message: None,
            echo,
        })
    }

    pub fn with_reconnect_config(mut self, reconnect_config: ReconnectConfig) -> Self {
        self.reconnect_config = reconnect_config;
        self
    }

    pub fn topics(&self) -> &TopicScheme {
        &self.topics
    }

    pub fn handle(&self) -> MqttHandle {
        MqttHandle {
            client: self.client.clone(),
            state_rx: self.state_rx.clone(),
            echo: self.echo.clone(),
        }
    }

    /// Register the inbound message callback. Must be set before [`connect`](Self::connect).
    pub fn set_on_message<F>(&mut self, callback: F)
    where
        F: Fn(RadioAddress, &str, &str) + Send + Sync + 'static,
    {
        self.on_message = Some(Arc::new(callback));
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    /// Start the event loop supervisor and wait for the first ConnAck
    pub async fn connect(&mut self) -> Result<(), MqttError> {
        let event_loop = self.event_loop.take().ok_or_else(|| {
            MqttError::ConnectionFailedStr("Event loop already started".to_string())
        })?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.shutdown_tx = Some(shutdown_tx);

        let supervisor = Supervisor {
            client: self.client.clone(),
            filter: MessageHandler::build_subscription_filter(&self.topics, self.no_local),
            topics: self.topics.clone(),
            state_tx: self.state_tx.clone(),
            shutdown_rx,
            reconnect_config: self.reconnect_config.clone(),
            on_message: self.on_message.clone(),
            echo: self.echo.clone(),
        };

        let span = crate::mqtt_span!("event_loop", node = %self.node_name);
        self.event_loop_handle = Some(tokio::spawn(supervisor.run(event_loop).instrument(span)));

        let timeout = HealthMonitor::calculate_connection_timeout(&self.reconnect_config);
        Self::wait_for_connection_confirmation(self.state_rx.clone(), timeout).await
    }

    async fn wait_for_connection_confirmation(
        mut state_rx: watch::Receiver<ConnectionState>,
        timeout: Duration,
    ) -> Result<(), MqttError> {
        let result = tokio::time::timeout(timeout, async {
            loop {
                match &*state_rx.borrow_and_update() {
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::PermanentlyDisconnected(reason) => {
                        return Err(MqttError::ConnectionFailedStr(format!(
                            "Permanently disconnected: {reason}"
                        )));
                    }
                    _ => {}
                }
                if state_rx.changed().await.is_err() {
                    return Err(MqttError::ConnectionFailedStr(
                        "State channel closed".to_string(),
                    ));
                }
            }
        })
        .await;

        match result {
            Ok(outcome) => outcome,
            Err(_) => Err(MqttError::ConnectionFailedStr(
                "ConnAck timeout - no connection confirmation received".to_string(),
            )),
        }
    }

    /// Disconnect from the broker and stop the supervisor
    pub async fn disconnect(&mut self) -> Result<(), MqttError> {
        let disconnect_result = if HealthMonitor::can_publish(&self.connection_state()) {
            self.client
                .try_disconnect()
                .map_err(|e| MqttError::ConnectionFailed(Box::new(e)))
        } else {
            Ok(())
        };

        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(true);
        }

        if let Some(handle) = self.event_loop_handle.take() {
            match tokio::time::timeout(Duration::from_secs(2), handle).await {
                Ok(Ok(())) => info!("MQTT event loop shut down gracefully"),
                Ok(Err(e)) if !e.is_cancelled() => warn!("MQTT event loop ended with error: {}", e),
                Err(_) => warn!("MQTT event loop didn't shut down in time, aborting"),
                _ => {}
            }
        }

        let _ = self
            .state_tx
            .send(ConnectionState::Disconnected("Client disconnected".to_string()));
        metrics().set_mqtt_connected(false);
        info!("MQTT client disconnected");
        disconnect_result
    }
}

impl Drop for MqttClient {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(true);
        }
        if let Some(handle) = self.event_loop_handle.take() {
            handle.abort();
        }
    }
}

impl Supervisor {
    async fn run(mut self, mut event_loop: EventLoop) {
        info!("Starting MQTT event loop supervisor");
        let mut reconnect_attempts = 0u32;

        loop {
            tokio::select! {
                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping MQTT supervisor");
                        break;
                    }
                }
                event = event_loop.poll() => {
                    let keep_going = match event {
                        Ok(event) => {
                            let route = MessageHandler::route_mqtt_event(&event);
                            self.process_event_route(route, &mut reconnect_attempts).await
                        }
                        Err(e) => {
                            self.set_state(ConnectionEvent::NetworkError(e.to_string()));
                            self.reconnect(&mut reconnect_attempts).await
                        }
                    };
                    if !keep_going {
                        break;
                    }
                }
            }
        }

        info!("MQTT event loop stopped");
    }

    fn set_state(&self, event: ConnectionEvent) {
        let state = HealthMonitor::determine_next_state(event);
        metrics().set_mqtt_connected(HealthMonitor::can_publish(&state));
        let _ = self.state_tx.send(state);
    }

    /// Returns `false` when the supervisor should stop
    async fn process_event_route(&self, route: EventRoute, reconnect_attempts: &mut u32) -> bool {
        match route {
            EventRoute::ConnectionAcknowledged => {
                *reconnect_attempts = 0;
                metrics().connection_established();
                self.subscribe();
                self.set_state(ConnectionEvent::ConnAckReceived);
                true
            }
            EventRoute::MessageReceived {
                topic,
                payload,
                retain,
            } => {
                self.handle_message_received(&topic, &payload, retain);
                true
            }
            EventRoute::Disconnected => {
                self.set_state(ConnectionEvent::DisconnectedByBroker);
                self.reconnect(reconnect_attempts).await
            }
            EventRoute::SubscriptionConfirmed {
                packet_id,
                reason_codes,
            } => {
                debug!(target: "mqtt_transport", packet_id, "Subscription confirmed: {:?}", reason_codes);
                true
            }
            EventRoute::InfrastructureEvent(event) => {
                debug!(target: "mqtt_transport", "MQTT event: {}", event);
                true
            }
            EventRoute::OutgoingEvent => true,
        }
    }

    fn subscribe(&self) {
        match self.client.try_subscribe_many(vec![self.filter.clone()]) {
            Ok(()) => info!(
                filter = %self.filter.path,
                no_local = self.filter.nolocal,
                "Subscribed to gateway namespace"
            ),
            Err(e) => error!("Failed to subscribe to {}: {}", self.filter.path, e),
        }
    }

    fn handle_message_received(&self, topic: &str, payload: &[u8], retain: bool) {
        metrics().mqtt_message_received();

        if self
            .echo
            .as_ref()
            .is_some_and(|echo| echo.is_echo(topic, payload))
        {
            debug!("Suppressed self-echo on {}", topic);
            metrics().echo_suppressed();
            return;
        }

        let Some((addr, action)) = MessageHandler::should_process_message(topic, retain, &self.topics)
        else {
            return;
        };

        let Ok(payload) = std::str::from_utf8(payload) else {
            warn!(topic = %topic, bytes = ?payload, "Dropping MQTT payload that is not UTF-8");
            metrics().frame_dropped();
            return;
        };

        debug!("[MQ] < {} {}", topic, payload);
        if let Some(on_message) = &self.on_message {
            on_message(addr, action, payload);
        }
    }

    /// Back off before the event loop's next poll reconnects
    async fn reconnect(&self, reconnect_attempts: &mut u32) -> bool {
        let decision = HealthMonitor::should_attempt_reconnection(
            *reconnect_attempts,
            &self.reconnect_config,
            *self.shutdown_rx.borrow(),
        );

        match decision {
            ReconnectionDecision::Proceed { attempt, delay_ms } => {
                *reconnect_attempts = attempt;
                metrics().connection_attempt();
                self.set_state(ConnectionEvent::ReconnectionStarted(attempt));
                Self::interruptible_sleep(self.shutdown_rx.clone(), delay_ms).await
            }
            ReconnectionDecision::AbortShutdownRequested => {
                info!("Shutdown signal received, stopping reconnection");
                false
            }
            ReconnectionDecision::AbortMaxAttemptsExceeded => {
                let reason = format!(
                    "Max reconnection attempts ({}) exceeded",
                    *reconnect_attempts
                );
                self.set_state(ConnectionEvent::PermanentFailure(reason));
                false
            }
        }
    }

    /// Returns `true` if the sleep completed, `false` if shutdown was requested
    async fn interruptible_sleep(mut shutdown_rx: watch::Receiver<bool>, delay_ms: u64) -> bool {
        tokio::select! {
            _ = shutdown_rx.changed() => !*shutdown_rx.borrow(),
            _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => true,
        }
    }
}
