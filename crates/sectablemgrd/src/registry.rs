//! Network-identity registry seam
//!
//! The registry that maps interfaces to network ids and tracks
//! UID-to-network ownership lives outside this daemon. The manager
//! consumes it through [`NetworkRegistry`]; [`StaticRegistry`] is the
//! in-memory implementation used for wiring and tests.

use std::collections::HashMap;

use crate::types::NetworkId;

/// External network-identity registry consumed by the policy manager.
pub trait NetworkRegistry: Send + Sync {
    /// Resolves the network id for an interface, if one is registered.
    fn network_id(&self, iface: &str) -> Option<NetworkId>;

    /// Associates a UID range with a network (`Some`) or releases the
    /// association (`None`). Returns false when the binding is rejected,
    /// e.g. because the range overlaps another network's exclusive
    /// ownership.
    fn bind_uid_range(&mut self, uid_start: u32, uid_end: u32, net_id: Option<NetworkId>) -> bool;

    /// The network currently owning a UID; the default network (id 0)
    /// when the UID is unbound.
    fn network_for_uid(&self, uid: u32) -> NetworkId;
}

/// In-memory registry with exclusive UID-range ownership.
#[derive(Debug, Default)]
pub struct StaticRegistry {
    interfaces: HashMap<String, NetworkId>,
    uid_ranges: Vec<(u32, u32, NetworkId)>,
}

impl StaticRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an interface-to-network mapping.
    pub fn register_interface(&mut self, iface: impl Into<String>, net_id: NetworkId) {
        self.interfaces.insert(iface.into(), net_id);
    }

    /// Removes an interface-to-network mapping.
    pub fn unregister_interface(&mut self, iface: &str) {
        self.interfaces.remove(iface);
    }

    fn overlaps(&self, uid_start: u32, uid_end: u32) -> bool {
        self.uid_ranges
            .iter()
            .any(|&(start, end, _)| uid_start <= end && uid_end >= start)
    }
}

impl NetworkRegistry for StaticRegistry {
    fn network_id(&self, iface: &str) -> Option<NetworkId> {
        self.interfaces.get(iface).copied()
    }

    fn bind_uid_range(&mut self, uid_start: u32, uid_end: u32, net_id: Option<NetworkId>) -> bool {
        if uid_start > uid_end {
            return false;
        }
        match net_id {
            Some(id) => {
                if self.overlaps(uid_start, uid_end) {
                    return false;
                }
                self.uid_ranges.push((uid_start, uid_end, id));
                true
            }
            None => {
                let before = self.uid_ranges.len();
                self.uid_ranges
                    .retain(|&(start, end, _)| (start, end) != (uid_start, uid_end));
                self.uid_ranges.len() != before
            }
        }
    }

    fn network_for_uid(&self, uid: u32) -> NetworkId {
        self.uid_ranges
            .iter()
            .find(|&&(start, end, _)| uid >= start && uid <= end)
            .map(|&(_, _, id)| id)
            .unwrap_or(NetworkId(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interface_lookup() {
        let mut registry = StaticRegistry::new();
        registry.register_interface("tun0", NetworkId(5));

        assert_eq!(registry.network_id("tun0"), Some(NetworkId(5)));
        assert_eq!(registry.network_id("tun1"), None);

        registry.unregister_interface("tun0");
        assert_eq!(registry.network_id("tun0"), None);
    }

    #[test]
    fn test_bind_and_release_uid_range() {
        let mut registry = StaticRegistry::new();
        assert!(registry.bind_uid_range(10000, 10999, Some(NetworkId(5))));
        assert_eq!(registry.network_for_uid(10500), NetworkId(5));

        assert!(registry.bind_uid_range(10000, 10999, None));
        assert_eq!(registry.network_for_uid(10500), NetworkId(0));
    }

    #[test]
    fn test_overlapping_range_rejected() {
        let mut registry = StaticRegistry::new();
        assert!(registry.bind_uid_range(10000, 10999, Some(NetworkId(5))));

        // Overlap at either edge, or full containment, is rejected.
        assert!(!registry.bind_uid_range(10500, 11500, Some(NetworkId(6))));
        assert!(!registry.bind_uid_range(9000, 10000, Some(NetworkId(6))));
        assert!(!registry.bind_uid_range(10100, 10200, Some(NetworkId(6))));

        // A disjoint range is fine.
        assert!(registry.bind_uid_range(20000, 20999, Some(NetworkId(6))));
    }

    #[test]
    fn test_release_unknown_range_fails() {
        let mut registry = StaticRegistry::new();
        assert!(!registry.bind_uid_range(10000, 10999, None));
    }

    #[test]
    fn test_inverted_range_rejected() {
        let mut registry = StaticRegistry::new();
        assert!(!registry.bind_uid_range(10999, 10000, Some(NetworkId(5))));
    }

    #[test]
    fn test_unbound_uid_maps_to_default_network() {
        let registry = StaticRegistry::new();
        assert_eq!(registry.network_for_uid(1234), NetworkId(0));
    }
}
