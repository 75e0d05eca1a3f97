//! Type definitions for sectablemgrd

use serde::{Deserialize, Serialize};

/// Offset added to a network id to derive its routing-table index.
///
/// The derived value doubles as the fwmark for that network, so the
/// same number selects both the mark and the table it routes to.
pub const BASE_TABLE_NUMBER: u32 = 1000;

/// Mark carried by packets that must bypass secondary-table routing.
pub const PROTECT_MARK: u32 = 0x1;

/// Priority of the per-network fwmark policy rules.
pub const RULE_PRIO: u32 = 100;

/// Priority of host-exemption rules; evaluated before [`RULE_PRIO`].
pub const EXEMPT_PRIO: u32 = 99;

/// Master mangle chain hooked into OUTPUT; holds the bypass rules,
/// per-interface jump rules, and UID owner rules.
pub const LOCAL_MANGLE_OUTPUT: &str = "st_mangle_OUTPUT";

/// Mangle chain holding host-exemption mark rules.
pub const LOCAL_MANGLE_EXEMPT: &str = "st_mangle_EXEMPT";

/// NAT postrouting chain holding the per-interface masquerade rules.
pub const LOCAL_NAT_POSTROUTING: &str = "st_nat_POSTROUTING";

/// Filter chain holding the v6 reject fallback rules.
pub const LOCAL_FILTER_OUTPUT: &str = "st_filter_OUTPUT";

/// Position at which per-interface jump rules are inserted into
/// [`LOCAL_MANGLE_OUTPUT`]: after the two bootstrap bypass rules,
/// ahead of any UID owner rules.
pub const MANGLE_JUMP_POSITION: u32 = 3;

/// Legacy privileged-service owner exempted from secondary routing.
// TODO: Remove once the legacy VPN daemons no longer route directly.
pub const LEGACY_VPN_OWNER: &str = "vpn";

/// Opaque identifier of a logical network, allocated by the external
/// network-identity registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NetworkId(pub u32);

impl std::fmt::Display for NetworkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Maps a network id to its routing-table index.
///
/// The returned value is used simultaneously as the kernel routing-table
/// index and as the fwmark; every component derives it through this
/// function so the two interpretations cannot drift apart.
pub fn table_for(net_id: NetworkId) -> u32 {
    BASE_TABLE_NUMBER + net_id.0
}

/// Name of the dedicated mangle chain for an interface.
pub fn iface_chain(iface: &str) -> String {
    format!("st_mangle_{}_OUTPUT", iface)
}

/// Whether a route/rule is being installed or removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAction {
    Add,
    Del,
}

impl RouteAction {
    /// The `ip` subcommand word for this action.
    pub fn ip_word(&self) -> &'static str {
        match self {
            RouteAction::Add => "add",
            RouteAction::Del => "del",
        }
    }

    /// The `iptables` append/delete flag for this action.
    pub fn iptables_flag(&self) -> &'static str {
        match self {
            RouteAction::Add => "-A",
            RouteAction::Del => "-D",
        }
    }

    /// Returns true for the install direction.
    pub fn is_add(&self) -> bool {
        matches!(self, RouteAction::Add)
    }
}

/// Address family of a route, rule, or destination host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    /// Both families, in the order install sequences walk them.
    pub const BOTH: [AddressFamily; 2] = [AddressFamily::V4, AddressFamily::V6];

    /// Determines the family from an address literal: a colon means v6.
    pub fn of(addr: &str) -> Self {
        if addr.contains(':') {
            AddressFamily::V6
        } else {
            AddressFamily::V4
        }
    }

    /// The `ip` family selector flag.
    pub fn ip_flag(&self) -> &'static str {
        match self {
            AddressFamily::V4 => "-4",
            AddressFamily::V6 => "-6",
        }
    }

    /// The iptables binary for this family.
    pub fn iptables_cmd(&self) -> &'static str {
        match self {
            AddressFamily::V4 => netpolicy_common::shell::IPTABLES_CMD,
            AddressFamily::V6 => netpolicy_common::shell::IP6TABLES_CMD,
        }
    }

    /// The "no gateway" sentinel address for this family.
    pub fn unspecified_addr(&self) -> &'static str {
        match self {
            AddressFamily::V4 => "0.0.0.0",
            AddressFamily::V6 => "::",
        }
    }
}

/// Returns true if `gateway` is the all-zero "no gateway" sentinel,
/// meaning the route is emitted as a direct `dev`-only route.
pub fn is_no_gateway(gateway: &str) -> bool {
    gateway == AddressFamily::V4.unspecified_addr()
        || gateway == AddressFamily::V6.unspecified_addr()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_for_offset() {
        assert_eq!(table_for(NetworkId(0)), BASE_TABLE_NUMBER);
        assert_eq!(table_for(NetworkId(5)), 1005);
        assert_eq!(table_for(NetworkId(42)), 1042);
    }

    #[test]
    fn test_table_for_injective() {
        // Distinct ids map to distinct tables across the valid range.
        let tables: Vec<u32> = (0..64).map(|id| table_for(NetworkId(id))).collect();
        let mut deduped = tables.clone();
        deduped.dedup();
        assert_eq!(tables, deduped);
    }

    #[test]
    fn test_iface_chain() {
        assert_eq!(iface_chain("tun0"), "st_mangle_tun0_OUTPUT");
        assert_eq!(iface_chain("ppp0"), "st_mangle_ppp0_OUTPUT");
    }

    #[test]
    fn test_address_family_of() {
        assert_eq!(AddressFamily::of("192.168.1.1"), AddressFamily::V4);
        assert_eq!(AddressFamily::of("2001:db8::1"), AddressFamily::V6);
        assert_eq!(AddressFamily::of("::"), AddressFamily::V6);
        assert_eq!(AddressFamily::of("0.0.0.0"), AddressFamily::V4);
    }

    #[test]
    fn test_is_no_gateway() {
        assert!(is_no_gateway("::"));
        assert!(is_no_gateway("0.0.0.0"));
        assert!(!is_no_gateway("192.168.1.1"));
        assert!(!is_no_gateway("fe80::1"));
    }

    #[test]
    fn test_exempt_prio_orders_before_rule_prio() {
        assert!(EXEMPT_PRIO < RULE_PRIO);
    }

    #[test]
    fn test_route_action_words() {
        assert_eq!(RouteAction::Add.ip_word(), "add");
        assert_eq!(RouteAction::Del.ip_word(), "del");
        assert_eq!(RouteAction::Add.iptables_flag(), "-A");
        assert_eq!(RouteAction::Del.iptables_flag(), "-D");
    }
}
