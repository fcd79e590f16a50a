//! Per-destination delivery queue
//!
//! Holds at most one in-flight frame plus a FIFO backlog. The in-flight frame
//! is retried on every tick until the link accepts it; a failure timer started
//! on the first failed attempt decides when the destination is unreachable.

use super::RadioAddress;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct NodeQueue {
    addr: RadioAddress,
    in_flight: Option<Vec<u8>>,
    backlog: VecDeque<Vec<u8>>,
    failing_since: Option<Instant>,
}

impl NodeQueue {
    pub fn new(addr: RadioAddress) -> Self {
        Self {
            addr,
            in_flight: None,
            backlog: VecDeque::new(),
            failing_since: None,
        }
    }

    pub fn addr(&self) -> RadioAddress {
        self.addr
    }

    /// Append to the backlog. Never blocks, never drops.
    pub fn push(&mut self, payload: Vec<u8>) {
        self.backlog.push_back(payload);
    }

    /// Frames not yet delivered, including the in-flight one
    pub fn pending(&self) -> usize {
        self.backlog.len() + usize::from(self.in_flight.is_some())
    }

    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    /// One delivery attempt; returns `true` when a frame was delivered
    pub fn tick<F>(&mut self, send: F) -> bool
    where
        F: FnOnce(RadioAddress, &[u8]) -> bool,
    {
        self.tick_at(Instant::now(), send)
    }

    pub fn tick_at<F>(&mut self, now: Instant, send: F) -> bool
    where
        F: FnOnce(RadioAddress, &[u8]) -> bool,
    {
        let Some(frame) = self.next_frame() else {
            return false;
        };
        let delivered = send(self.addr, &frame);
        self.record_attempt_at(now, delivered);
        delivered
    }

    /// Promote the backlog head if nothing is in flight and return a copy of
    /// the in-flight frame. Pair with [`record_attempt`](Self::record_attempt)
    /// when the send happens away from the queue.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        if self.in_flight.is_none() {
            self.in_flight = self.backlog.pop_front();
        }
        self.in_flight.clone()
    }

    pub fn record_attempt(&mut self, delivered: bool) {
        self.record_attempt_at(Instant::now(), delivered);
    }

    pub fn record_attempt_at(&mut self, now: Instant, delivered: bool) {
        if self.in_flight.is_none() {
            return;
        }
        if delivered {
            self.in_flight = None;
            self.failing_since = None;
        } else {
            self.failing_since.get_or_insert(now);
        }
    }

    /// True once sends have failed continuously for longer than `timeout`
    pub fn is_disconnected(&self, timeout: Duration) -> bool {
        self.is_disconnected_at(Instant::now(), timeout)
    }

    pub fn is_disconnected_at(&self, now: Instant, timeout: Duration) -> bool {
        self.failing_since
            .is_some_and(|since| now.saturating_duration_since(since) > timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_queue_makes_no_progress() {
        let mut queue = NodeQueue::new(3);
        let mut called = false;
        assert!(!queue.tick(|_, _| {
            called = true;
            true
        }));
        assert!(!called);
        assert!(!queue.is_disconnected(Duration::ZERO));
    }

    #[test]
    fn test_delivers_in_fifo_order_one_per_tick() {
        let mut queue = NodeQueue::new(3);
        for i in 0..4u8 {
            queue.push(vec![i]);
        }

        let mut delivered = Vec::new();
        for _ in 0..4 {
            assert!(queue.tick(|addr, frame| {
                assert_eq!(addr, 3);
                delivered.push(frame.to_vec());
                true
            }));
        }

        assert_eq!(delivered, vec![vec![0], vec![1], vec![2], vec![3]]);
        assert!(queue.is_idle());
        assert!(!queue.tick(|_, _| true));
    }

    #[test]
    fn test_split_attempt_keeps_order_across_pushes() {
        let mut queue = NodeQueue::new(6);
        queue.push(b"first".to_vec());

        let frame = queue.next_frame().unwrap();
        queue.push(b"second".to_vec());
        queue.record_attempt(false);
        assert_eq!(queue.pending(), 2);

        assert_eq!(queue.next_frame(), Some(frame));
        queue.record_attempt(true);
        assert_eq!(queue.next_frame(), Some(b"second".to_vec()));
    }

    #[test]
    fn test_failed_frame_is_retried_before_backlog() {
        let mut queue = NodeQueue::new(1);
        queue.push(b"first".to_vec());
        queue.push(b"second".to_vec());

        assert!(!queue.tick(|_, _| false));
        assert_eq!(queue.pending(), 2);

        let mut sent = Vec::new();
        assert!(queue.tick(|_, frame| {
            sent.push(frame.to_vec());
            true
        }));
        assert_eq!(sent, vec![b"first".to_vec()]);
        assert_eq!(queue.pending(), 1);
    }

    #[test]
    fn test_disconnect_after_sustained_failure() {
        let timeout = Duration::from_secs(5);
        let start = Instant::now();
        let mut queue = NodeQueue::new(7);
        for i in 0..3u8 {
            queue.push(vec![i]);
        }

        assert!(!queue.tick_at(start, |_, _| false));
        assert!(!queue.is_disconnected_at(start + Duration::from_secs(1), timeout));

        assert!(!queue.tick_at(start + Duration::from_secs(3), |_, _| false));
        assert!(!queue.is_disconnected_at(start + Duration::from_secs(5), timeout));
        assert!(queue.is_disconnected_at(start + Duration::from_secs(6), timeout));
        assert_eq!(queue.pending(), 3);
    }

    #[test]
    fn test_success_resets_failure_timer() {
        let timeout = Duration::from_secs(5);
        let start = Instant::now();
        let mut queue = NodeQueue::new(7);
        queue.push(vec![1]);
        queue.push(vec![2]);

        queue.tick_at(start, |_, _| false);
        queue.tick_at(start + Duration::from_secs(4), |_, _| true);
        assert!(!queue.is_disconnected_at(start + Duration::from_secs(10), timeout));

        queue.tick_at(start + Duration::from_secs(10), |_, _| false);
        assert!(!queue.is_disconnected_at(start + Duration::from_secs(14), timeout));
        assert!(queue.is_disconnected_at(start + Duration::from_secs(16), timeout));
    }
}
