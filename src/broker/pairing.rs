//! Symmetric 1:1 pairing between a keypad and a locomotive
//!
//! Each pairing `a <-> b` is held as the two entries `a -> b` and `b -> a`.
//! Every mutation takes `&mut self`, so callers holding the broker lock never
//! observe a half-built pairing.

use crate::radio::RadioAddress;
use std::collections::HashMap;
use tracing::info;

#[derive(Debug, Default)]
pub struct PairingTable {
    links: HashMap<RadioAddress, RadioAddress>,
}

impl PairingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn partner(&self, addr: RadioAddress) -> Option<RadioAddress> {
        self.links.get(&addr).copied()
    }

    /// Pair `addr` with `partner`, dissolving any pairing either side had.
    ///
    /// Returns `false` when nothing changed (already paired, or self-pairing).
    pub fn subscribe(&mut self, addr: RadioAddress, partner: RadioAddress) -> bool {
        if addr == partner {
            return false;
        }
        if self.partner(addr) == Some(partner) && self.partner(partner) == Some(addr) {
            info!(addr = addr, partner = partner, "Already paired");
            return false;
        }

        self.unsubscribe(addr);
        self.unsubscribe(partner);
        self.links.insert(addr, partner);
        self.links.insert(partner, addr);
        info!(addr = addr, partner = partner, "Paired");
        true
    }

    /// Dissolve the pairing `addr` takes part in, returning the former partner
    pub fn unsubscribe(&mut self, addr: RadioAddress) -> Option<RadioAddress> {
        let partner = self.links.remove(&addr)?;
        if self.links.get(&partner) == Some(&addr) {
            self.links.remove(&partner);
        }
        info!(addr = addr, partner = partner, "Unpaired");
        Some(partner)
    }

    /// Active pairings as `(lower, higher)` address pairs in ascending order
    pub fn pairs(&self) -> Vec<(RadioAddress, RadioAddress)> {
        let mut pairs: Vec<_> = self
            .links
            .iter()
            .filter(|(a, b)| a < b)
            .map(|(a, b)| (*a, *b))
            .collect();
        pairs.sort_unstable();
        pairs
    }

    pub fn len(&self) -> usize {
        self.links.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}
