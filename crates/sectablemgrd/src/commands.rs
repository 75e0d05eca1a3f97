//! Shell command builders for secondary-table routing operations
//!
//! Pure builders only: every kernel-facing command string is assembled
//! here, and the manager decides ordering and aggregation. Interface
//! names, addresses, and hosts come from the command socket, so all of
//! them pass through `shellquote`.

use netpolicy_common::shell::{self, IP_CMD};

use crate::types::{
    iface_chain, AddressFamily, EXEMPT_PRIO, LEGACY_VPN_OWNER, LOCAL_FILTER_OUTPUT,
    LOCAL_MANGLE_EXEMPT, LOCAL_MANGLE_OUTPUT, LOCAL_NAT_POSTROUTING, MANGLE_JUMP_POSITION,
    PROTECT_MARK, RULE_PRIO, RouteAction,
};

/// Build a destination route command in a network's private table.
///
/// An all-zero gateway is handled by the caller passing `gateway = None`,
/// which emits a direct `dev`-only route.
pub fn build_table_route_cmd(
    action: RouteAction,
    iface: &str,
    dest: &str,
    prefix: u8,
    gateway: Option<&str>,
    table: u32,
) -> String {
    match gateway {
        Some(gw) => format!(
            "{} route {} {}/{} via {} dev {} table {}",
            IP_CMD,
            action.ip_word(),
            shell::shellquote(dest),
            prefix,
            shell::shellquote(gw),
            shell::shellquote(iface),
            table
        ),
        None => format!(
            "{} route {} {}/{} dev {} table {}",
            IP_CMD,
            action.ip_word(),
            shell::shellquote(dest),
            prefix,
            shell::shellquote(iface),
            table
        ),
    }
}

/// Build a default route command in a network's private table.
pub fn build_default_route_cmd(
    family: AddressFamily,
    action: RouteAction,
    iface: &str,
    table: u32,
) -> String {
    format!(
        "{} {} route {} default dev {} table {}",
        IP_CMD,
        family.ip_flag(),
        action.ip_word(),
        shell::shellquote(iface),
        table
    )
}

/// Build a fwmark policy rule command: marked packets consult the
/// network's private table. Mark and table are the same derived value.
pub fn build_fwmark_rule_cmd(family: AddressFamily, action: RouteAction, mark: u32) -> String {
    format!(
        "{} {} rule {} prio {} fwmark {} table {}",
        IP_CMD,
        family.ip_flag(),
        action.ip_word(),
        RULE_PRIO,
        mark,
        mark
    )
}

/// Build a source-address policy rule command into a network's table.
pub fn build_from_rule_cmd(
    family: AddressFamily,
    action: RouteAction,
    addr: &str,
    table: u32,
) -> String {
    format!(
        "{} {} rule {} from {} table {}",
        IP_CMD,
        family.ip_flag(),
        action.ip_word(),
        shell::shellquote(addr),
        table
    )
}

/// Build a single-address route command in a network's table.
pub fn build_local_route_cmd(action: RouteAction, iface: &str, addr: &str, table: u32) -> String {
    format!(
        "{} route {} {} dev {} table {}",
        IP_CMD,
        action.ip_word(),
        shell::shellquote(addr),
        shell::shellquote(iface),
        table
    )
}

/// Build a mangle chain creation command.
pub fn build_chain_new_cmd(family: AddressFamily, chain: &str) -> String {
    format!(
        "{} -t mangle -N {}",
        family.iptables_cmd(),
        shell::shellquote(chain)
    )
}

/// Build a mangle chain flush command.
pub fn build_chain_flush_cmd(family: AddressFamily, chain: &str) -> String {
    format!(
        "{} -t mangle -F {}",
        family.iptables_cmd(),
        shell::shellquote(chain)
    )
}

/// Build a mangle chain delete command. The chain must already be
/// flushed and unreferenced or the kernel refuses with "chain in use".
pub fn build_chain_delete_cmd(family: AddressFamily, chain: &str) -> String {
    format!(
        "{} -t mangle -X {}",
        family.iptables_cmd(),
        shell::shellquote(chain)
    )
}

/// Build the jump rule sending marked packets from the master output
/// chain into an interface's dedicated chain.
///
/// Inserted (not appended) at a fixed near-top position so marked
/// packets are diverted before any UID owner rules run.
pub fn build_jump_insert_cmd(family: AddressFamily, mark: u32, chain: &str) -> String {
    format!(
        "{} -t mangle -I {} {} -m mark --mark {} -g {}",
        family.iptables_cmd(),
        LOCAL_MANGLE_OUTPUT,
        MANGLE_JUMP_POSITION,
        mark,
        shell::shellquote(chain)
    )
}

/// Build the delete for the jump rule installed by [`build_jump_insert_cmd`].
pub fn build_jump_delete_cmd(family: AddressFamily, mark: u32, chain: &str) -> String {
    format!(
        "{} -t mangle -D {} -m mark --mark {} -g {}",
        family.iptables_cmd(),
        LOCAL_MANGLE_OUTPUT,
        mark,
        shell::shellquote(chain)
    )
}

/// Build the unconditional mark-clear rule inside an interface chain.
///
/// A packet pre-marked at socket level has already been routed once it
/// reaches this chain; the mark must not persist into later firewalling.
pub fn build_mark_clear_cmd(family: AddressFamily, chain: &str) -> String {
    format!(
        "{} -t mangle -A {} -j MARK --set-mark 0",
        family.iptables_cmd(),
        shell::shellquote(chain)
    )
}

/// Build a destination-match mark rule inside an interface chain.
pub fn build_fwmark_route_cmd(
    family: AddressFamily,
    action: RouteAction,
    iface: &str,
    dest: &str,
    prefix: u8,
    mark: u32,
) -> String {
    format!(
        "{} -t mangle {} {} -d {}/{} -j MARK --set-mark {}",
        family.iptables_cmd(),
        action.iptables_flag(),
        shell::shellquote(&iface_chain(iface)),
        shell::shellquote(dest),
        prefix,
        mark
    )
}

/// Build the NAT masquerade rule for marked traffic leaving an interface.
pub fn build_masquerade_cmd(
    family: AddressFamily,
    action: RouteAction,
    iface: &str,
    mark: u32,
) -> String {
    format!(
        "{} -t nat {} {} -o {} -m mark --mark {} -j MASQUERADE",
        family.iptables_cmd(),
        action.iptables_flag(),
        LOCAL_NAT_POSTROUTING,
        shell::shellquote(iface),
        mark
    )
}

/// Build the v6 reject fallback rule applied when v6 NAT is unavailable,
/// so marked IPv6 traffic cannot leak unrouted.
pub fn build_v6_reject_cmd(action: RouteAction, iface: &str, mark: u32) -> String {
    format!(
        "{} -t filter {} {} -o {} -m mark --mark {} -j REJECT",
        AddressFamily::V6.iptables_cmd(),
        action.iptables_flag(),
        LOCAL_FILTER_OUTPUT,
        shell::shellquote(iface),
        mark
    )
}

/// Build the owner-match rule funneling a UID range's traffic into an
/// interface's dedicated chain.
pub fn build_uid_rule_cmd(
    family: AddressFamily,
    action: RouteAction,
    uid_start: u32,
    uid_end: u32,
    iface: &str,
) -> String {
    format!(
        "{} -t mangle {} {} -m owner --uid-owner {}-{} -g {}",
        family.iptables_cmd(),
        action.iptables_flag(),
        LOCAL_MANGLE_OUTPUT,
        uid_start,
        uid_end,
        shell::shellquote(&iface_chain(iface))
    )
}

/// Build the exempt-chain rule setting the bypass mark for a destination.
pub fn build_exempt_mark_cmd(family: AddressFamily, action: RouteAction, host: &str) -> String {
    format!(
        "{} -t mangle {} {} -d {} -j MARK --set-mark {}",
        family.iptables_cmd(),
        action.iptables_flag(),
        LOCAL_MANGLE_EXEMPT,
        shell::shellquote(host),
        PROTECT_MARK
    )
}

/// Build the high-priority policy rule sending exempted destinations to
/// the main table, ahead of any fwmark rule.
pub fn build_exempt_rule_cmd(family: AddressFamily, action: RouteAction, host: &str) -> String {
    format!(
        "{} {} rule {} prio {} to {} table main",
        IP_CMD,
        family.ip_flag(),
        action.ip_word(),
        EXEMPT_PRIO,
        shell::shellquote(host)
    )
}

/// Build the bootstrap bypass rule that returns immediately for packets
/// already carrying the protect mark.
pub fn build_bypass_protect_cmd(family: AddressFamily) -> String {
    format!(
        "{} -t mangle -A {} -m mark --mark {} -j RETURN",
        family.iptables_cmd(),
        LOCAL_MANGLE_OUTPUT,
        PROTECT_MARK
    )
}

/// Build the bootstrap bypass rule for the legacy privileged VPN owner.
pub fn build_bypass_legacy_owner_cmd(family: AddressFamily) -> String {
    format!(
        "{} -t mangle -A {} -m owner --uid-owner {} -j RETURN",
        family.iptables_cmd(),
        LOCAL_MANGLE_OUTPUT,
        LEGACY_VPN_OWNER
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AddressFamily::{V4, V6};

    #[test]
    fn test_build_table_route_cmd_via_gateway() {
        let cmd = build_table_route_cmd(
            RouteAction::Add,
            "tun0",
            "10.1.0.0",
            16,
            Some("10.1.0.1"),
            1005,
        );
        assert!(cmd.contains("ip route add"));
        assert!(cmd.contains("\"10.1.0.0\"/16"));
        assert!(cmd.contains("via \"10.1.0.1\""));
        assert!(cmd.contains("dev \"tun0\""));
        assert!(cmd.contains("table 1005"));
    }

    #[test]
    fn test_build_table_route_cmd_dev_only() {
        let cmd = build_table_route_cmd(RouteAction::Del, "tun0", "10.1.0.0", 16, None, 1005);
        assert!(cmd.contains("ip route del"));
        assert!(!cmd.contains("via"));
        assert!(cmd.contains("dev \"tun0\""));
    }

    #[test]
    fn test_build_default_route_cmd() {
        let cmd = build_default_route_cmd(V4, RouteAction::Add, "tun0", 1005);
        assert!(cmd.contains("ip -4 route add default dev \"tun0\" table 1005"));

        let cmd = build_default_route_cmd(V6, RouteAction::Del, "tun0", 1005);
        assert!(cmd.contains("ip -6 route del default dev \"tun0\" table 1005"));
    }

    #[test]
    fn test_build_fwmark_rule_cmd_mark_equals_table() {
        let cmd = build_fwmark_rule_cmd(V4, RouteAction::Add, 1005);
        assert!(cmd.contains("rule add prio 100 fwmark 1005 table 1005"));
    }

    #[test]
    fn test_build_from_rule_cmd() {
        let cmd = build_from_rule_cmd(V6, RouteAction::Add, "2001:db8::2", 1005);
        assert!(cmd.contains("ip -6 rule add from \"2001:db8::2\" table 1005"));
    }

    #[test]
    fn test_build_local_route_cmd() {
        let cmd = build_local_route_cmd(RouteAction::Add, "tun0", "10.1.0.2", 1005);
        assert!(cmd.contains("ip route add \"10.1.0.2\" dev \"tun0\" table 1005"));
    }

    #[test]
    fn test_build_chain_lifecycle_cmds() {
        let chain = iface_chain("tun0");
        assert!(build_chain_new_cmd(V4, &chain).contains("iptables -t mangle -N"));
        assert!(build_chain_flush_cmd(V6, &chain).contains("ip6tables -t mangle -F"));
        assert!(build_chain_delete_cmd(V4, &chain).contains("iptables -t mangle -X"));
    }

    #[test]
    fn test_build_jump_insert_cmd_position() {
        let cmd = build_jump_insert_cmd(V4, 1005, &iface_chain("tun0"));
        assert!(cmd.contains("-I st_mangle_OUTPUT 3"));
        assert!(cmd.contains("--mark 1005"));
        assert!(cmd.contains("-g \"st_mangle_tun0_OUTPUT\""));
    }

    #[test]
    fn test_build_jump_delete_cmd_has_no_position() {
        let cmd = build_jump_delete_cmd(V4, 1005, &iface_chain("tun0"));
        assert!(cmd.contains("-D st_mangle_OUTPUT -m mark"));
        assert!(!cmd.contains("-D st_mangle_OUTPUT 3"));
    }

    #[test]
    fn test_build_mark_clear_cmd() {
        let cmd = build_mark_clear_cmd(V6, &iface_chain("tun0"));
        assert!(cmd.contains("-A \"st_mangle_tun0_OUTPUT\" -j MARK --set-mark 0"));
    }

    #[test]
    fn test_build_fwmark_route_cmd() {
        let cmd = build_fwmark_route_cmd(V4, RouteAction::Add, "tun0", "172.16.0.0", 12, 1005);
        assert!(cmd.contains("-A \"st_mangle_tun0_OUTPUT\""));
        assert!(cmd.contains("-d \"172.16.0.0\"/12"));
        assert!(cmd.contains("--set-mark 1005"));
    }

    #[test]
    fn test_build_masquerade_cmd() {
        let cmd = build_masquerade_cmd(V4, RouteAction::Add, "tun0", 1005);
        assert!(cmd.contains("-t nat -A st_nat_POSTROUTING"));
        assert!(cmd.contains("-o \"tun0\" -m mark --mark 1005 -j MASQUERADE"));
    }

    #[test]
    fn test_build_v6_reject_cmd() {
        let cmd = build_v6_reject_cmd(RouteAction::Add, "tun0", 1005);
        assert!(cmd.starts_with("/sbin/ip6tables"));
        assert!(cmd.contains("-t filter -A st_filter_OUTPUT"));
        assert!(cmd.contains("--mark 1005 -j REJECT"));
    }

    #[test]
    fn test_build_uid_rule_cmd() {
        let cmd = build_uid_rule_cmd(V4, RouteAction::Add, 10000, 10999, "tun0");
        assert!(cmd.contains("-m owner --uid-owner 10000-10999"));
        assert!(cmd.contains("-g \"st_mangle_tun0_OUTPUT\""));
    }

    #[test]
    fn test_build_exempt_cmds() {
        let mark = build_exempt_mark_cmd(V4, RouteAction::Add, "8.8.8.8");
        assert!(mark.contains("-A st_mangle_EXEMPT -d \"8.8.8.8\" -j MARK --set-mark 1"));

        let rule = build_exempt_rule_cmd(V4, RouteAction::Add, "8.8.8.8");
        assert!(rule.contains("rule add prio 99 to \"8.8.8.8\" table main"));
    }

    #[test]
    fn test_build_bypass_cmds() {
        let protect = build_bypass_protect_cmd(V4);
        assert!(protect.contains("-A st_mangle_OUTPUT -m mark --mark 1 -j RETURN"));

        let legacy = build_bypass_legacy_owner_cmd(V6);
        assert!(legacy.starts_with("/sbin/ip6tables"));
        assert!(legacy.contains("--uid-owner vpn -j RETURN"));
    }

    #[test]
    fn test_shellquote_safety() {
        let cmd = build_table_route_cmd(
            RouteAction::Add,
            "tun0; rm -rf /",
            "10.0.0.0",
            8,
            None,
            1001,
        );
        // Should be quoted to prevent injection
        assert!(cmd.contains("\"tun0; rm -rf /\""));
    }
}
