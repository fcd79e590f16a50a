//! Wireless transport: the radio poll loop and per-node delivery queues
//!
//! The transport moves through `Stopped -> Running -> Stopped`. While running,
//! a dedicated worker thread owns the [`RadioLink`] and on every tick:
//!
//! 1. services the link's network-layer bookkeeping,
//! 2. drains inbound frames, creating a [`NodeQueue`] for unseen sources and
//!    handing each frame to the receive callback,
//! 3. ticks every node queue once, then evicts the ones that stayed
//!    undeliverable past the disconnect timeout and fires the disconnect
//!    callback for each.
//!
//! Sends happen with the node map unlocked, so [`WirelessHandle::write`] never
//! waits on the link. A tick that moved nothing is followed by a short sleep.
//! The link is powered down exactly once when the worker exits, whichever way
//! it exits.

use super::queue::NodeQueue;
use super::{DataRate, PowerLevel, RadioAddress, RadioError, RadioLink, RadioSender};
use crate::observability::metrics::metrics;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub type ReceiveCallback = Arc<dyn Fn(RadioAddress, Vec<u8>) + Send + Sync>;
pub type DisconnectCallback = Arc<dyn Fn(RadioAddress) + Send + Sync>;

type NodeMap = Arc<Mutex<HashMap<RadioAddress, NodeQueue>>>;

fn lock_nodes(nodes: &NodeMap) -> MutexGuard<'_, HashMap<RadioAddress, NodeQueue>> {
    nodes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Radio settings applied at start plus poll loop timing
#[derive(Debug, Clone)]
pub struct WirelessConfig {
    pub power_level: PowerLevel,
    pub data_rate: DataRate,
    /// Sustained send failure after which a node is evicted
    pub disconnect_timeout: Duration,
    /// Sleep after a tick that made no progress
    pub idle_sleep: Duration,
}

impl Default for WirelessConfig {
    fn default() -> Self {
        Self {
            power_level: PowerLevel::Low,
            data_rate: DataRate::Kbps250,
            disconnect_timeout: Duration::from_secs(5),
            idle_sleep: Duration::from_millis(10),
        }
    }
}

/// Cloneable handle for queueing outbound frames from any thread
#[derive(Clone)]
pub struct WirelessHandle {
    nodes: NodeMap,
}

impl WirelessHandle {
    /// Queue `frame` for `to`, creating its delivery queue on first use
    pub fn write(&self, to: RadioAddress, frame: Vec<u8>) {
        debug!(addr = to, bytes = ?frame, "[NF] >");
        lock_nodes(&self.nodes)
            .entry(to)
            .or_insert_with(|| NodeQueue::new(to))
            .push(frame);
    }

    /// Addresses that currently have a delivery queue
    pub fn known_nodes(&self) -> Vec<RadioAddress> {
        let mut addrs: Vec<_> = lock_nodes(&self.nodes).keys().copied().collect();
        addrs.sort_unstable();
        addrs
    }

    /// Frames waiting for `to`
    pub fn pending(&self, to: RadioAddress) -> usize {
        lock_nodes(&self.nodes).get(&to).map_or(0, NodeQueue::pending)
    }
}

impl RadioSender for WirelessHandle {
    fn write(&self, to: RadioAddress, frame: Vec<u8>) {
        WirelessHandle::write(self, to, frame)
    }
}

pub struct WirelessTransport<L: RadioLink + 'static> {
    link: Option<L>,
    config: WirelessConfig,
    nodes: NodeMap,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    on_receive: Option<ReceiveCallback>,
    on_disconnect: Option<DisconnectCallback>,
}

impl<L: RadioLink + 'static> WirelessTransport<L> {
    pub fn new(link: L, config: WirelessConfig) -> Self {
        Self {
            link: Some(link),
            config,
            nodes: Arc::new(Mutex::new(HashMap::new())),
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
            on_receive: None,
            on_disconnect: None,
        }
    }

    pub fn handle(&self) -> WirelessHandle {
        WirelessHandle {
            nodes: self.nodes.clone(),
        }
    }

    /// Register the inbound frame callback. Must be set before [`start`](Self::start).
    pub fn set_on_receive<F>(&mut self, callback: F)
    where
        F: Fn(RadioAddress, Vec<u8>) + Send + Sync + 'static,
    {
        self.on_receive = Some(Arc::new(callback));
    }

    /// Register the node-unreachable callback. Must be set before [`start`](Self::start).
    pub fn set_on_disconnect<F>(&mut self, callback: F)
    where
        F: Fn(RadioAddress) + Send + Sync + 'static,
    {
        self.on_disconnect = Some(Arc::new(callback));
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn write(&self, to: RadioAddress, frame: Vec<u8>) {
        self.handle().write(to, frame);
    }

    /// Initialise the radio and start the poll worker.
    ///
    /// A radio that does not come up is reported as
    /// [`RadioError::HardwareNotResponding`] and the transport stays stopped.
    pub fn start(&mut self) -> Result<(), RadioError> {
        let mut link = self.link.take().ok_or(RadioError::AlreadyStarted)?;
        if let Err(e) = link.begin() {
            error!("*** Radio hardware is not responding: {}", e);
            self.link = Some(link);
            return Err(e);
        }
        link.set_power_level(self.config.power_level);
        link.set_data_rate(self.config.data_rate);

        self.running.store(true, Ordering::SeqCst);
        let poll_loop = PollLoop {
            link: PoweredLink { link },
            nodes: self.nodes.clone(),
            running: self.running.clone(),
            config: self.config.clone(),
            on_receive: self.on_receive.clone(),
            on_disconnect: self.on_disconnect.clone(),
        };

        let worker = std::thread::Builder::new()
            .name("radio-poll".to_string())
            .spawn(move || poll_loop.run())?;
        self.worker = Some(worker);

        info!(
            power = ?self.config.power_level,
            rate = ?self.config.data_rate,
            "Wireless transport started"
        );
        Ok(())
    }

    /// Signal the worker to stop at the next tick boundary and wait for it
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Radio poll worker panicked");
            }
            info!("Wireless transport stopped");
        }
    }
}

impl<L: RadioLink + 'static> Drop for WirelessTransport<L> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Owns the link inside the worker and powers it down when dropped
struct PoweredLink<L: RadioLink> {
    link: L,
}

impl<L: RadioLink> Deref for PoweredLink<L> {
    type Target = L;

    fn deref(&self) -> &L {
        &self.link
    }
}

impl<L: RadioLink> DerefMut for PoweredLink<L> {
    fn deref_mut(&mut self) -> &mut L {
        &mut self.link
    }
}

impl<L: RadioLink> Drop for PoweredLink<L> {
    fn drop(&mut self) {
        self.link.power_down();
        info!("Radio powered down");
    }
}

struct PollLoop<L: RadioLink> {
    link: PoweredLink<L>,
    nodes: NodeMap,
    running: Arc<AtomicBool>,
    config: WirelessConfig,
    on_receive: Option<ReceiveCallback>,
    on_disconnect: Option<DisconnectCallback>,
}

impl<L: RadioLink> PollLoop<L> {
    fn run(mut self) {
        let span = crate::radio_span!("poll_loop");
        let _guard = span.enter();
        info!("Radio poll loop running");

        while self.running.load(Ordering::SeqCst) {
            if !self.tick() {
                std::thread::sleep(self.config.idle_sleep);
            }
        }

        info!("Radio poll loop exiting");
    }

    /// One pass of the loop body; `true` when anything moved
    fn tick(&mut self) -> bool {
        let mut progressed = false;

        self.link.poll();
        while self.link.frame_available() {
            let Some((from, payload)) = self.link.read() else {
                break;
            };
            progressed = true;
            metrics().radio_frame_received();

            lock_nodes(&self.nodes)
                .entry(from)
                .or_insert_with(|| NodeQueue::new(from));

            if payload.is_empty() {
                debug!(addr = from, "Ignoring empty radio frame");
                continue;
            }
            debug!(addr = from, bytes = ?payload, "[NF] <");
            if let Some(on_receive) = &self.on_receive {
                on_receive(from, payload);
            }
        }

        // Take due frames under the lock, send with it released
        let due: Vec<(RadioAddress, Vec<u8>)> = lock_nodes(&self.nodes)
            .values_mut()
            .filter_map(|queue| queue.next_frame().map(|frame| (queue.addr(), frame)))
            .collect();

        let results: Vec<(RadioAddress, bool)> = due
            .into_iter()
            .map(|(to, frame)| (to, self.link.send(to, &frame)))
            .collect();

        let mut disconnected = Vec::new();
        {
            let mut nodes = lock_nodes(&self.nodes);
            for (to, delivered) in results {
                if let Some(queue) = nodes.get_mut(&to) {
                    queue.record_attempt(delivered);
                }
                if delivered {
                    progressed = true;
                    metrics().radio_frame_sent();
                } else {
                    metrics().radio_send_retry();
                }
            }

            disconnected.extend(
                nodes
                    .values()
                    .filter(|queue| queue.is_disconnected(self.config.disconnect_timeout))
                    .map(NodeQueue::addr),
            );
            for addr in &disconnected {
                if let Some(queue) = nodes.remove(addr) {
                    warn!(
                        addr = addr,
                        discarded = queue.pending(),
                        "Node unreachable, dropping its delivery queue"
                    );
                }
            }
        }

        for addr in disconnected {
            metrics().radio_node_disconnected();
            if let Some(on_disconnect) = &self.on_disconnect {
                on_disconnect(addr);
            }
        }

        progressed
    }
}
