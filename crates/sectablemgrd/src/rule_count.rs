//! Per-network policy-rule reference counting
//!
//! Tracks how many installed policy rules reference each network's
//! private routing table. The count gates the blanket fwmark setup:
//! exactly one routing strategy (manual per-route rules or fwmark
//! routing) may be active for a network at a time.

use std::collections::HashMap;

use crate::types::NetworkId;

/// Reference counter over currently-installed policy rules.
///
/// Invariant: a network id is present in the map if and only if its
/// count is at least one; removing the last reference deletes the entry.
#[derive(Debug, Default)]
pub struct RuleRefCounter {
    counts: HashMap<NetworkId, u32>,
}

impl RuleRefCounter {
    /// Creates an empty counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one reference for a network.
    pub fn increment(&mut self, net_id: NetworkId) {
        *self.counts.entry(net_id).or_insert(0) += 1;
    }

    /// Releases one reference for a network; the entry is removed when
    /// the count drops below one. Decrementing an absent id is a no-op.
    pub fn decrement(&mut self, net_id: NetworkId) {
        if let Some(count) = self.counts.get_mut(&net_id) {
            *count -= 1;
            if *count < 1 {
                self.counts.remove(&net_id);
            }
        }
    }

    /// Current reference count for a network (zero when absent).
    pub fn count(&self, net_id: NetworkId) -> u32 {
        self.counts.get(&net_id).copied().unwrap_or(0)
    }

    /// Returns true if the network has any installed rule references.
    pub fn is_busy(&self, net_id: NetworkId) -> bool {
        self.counts.contains_key(&net_id)
    }
}
