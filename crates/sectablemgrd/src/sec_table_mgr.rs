//! Secondary-table manager - routes per-network traffic through private
//! kernel routing tables selected by fwmark or originating UID

use netpolicy_common::{shell, CmdOutcome, NetPolicyError, NetPolicyResult};
use tracing::{debug, info, instrument, warn};

use crate::commands::*;
use crate::registry::NetworkRegistry;
use crate::rule_count::RuleRefCounter;
use crate::types::*;

/// Secondary-table policy manager
///
/// Owns the rule reference counter and issues the ordered command
/// sequences that install and remove per-network routing state. The
/// daemon front end holds the manager behind a `tokio::sync::Mutex`, so
/// every check-then-act sequence here runs under one exclusive borrow
/// and two concurrent enables cannot both observe "not busy".
pub struct SecTableMgr<R: NetworkRegistry> {
    /// External interface-to-network and UID-ownership registry
    registry: R,

    /// Policy-rule references per network id
    rule_count: RuleRefCounter,

    /// Testing support
    #[cfg(test)]
    mock_mode: bool,
    #[cfg(test)]
    captured_commands: Vec<String>,
    #[cfg(test)]
    failing_patterns: Vec<String>,
}

impl<R: NetworkRegistry> SecTableMgr<R> {
    /// Create a new SecTableMgr instance
    pub fn new(registry: R) -> Self {
        Self {
            registry,
            rule_count: RuleRefCounter::new(),
            #[cfg(test)]
            mock_mode: false,
            #[cfg(test)]
            captured_commands: Vec::new(),
            #[cfg(test)]
            failing_patterns: Vec::new(),
        }
    }

    /// Access the identity registry
    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Current rule-reference count for a network
    pub fn rule_references(&self, net_id: NetworkId) -> u32 {
        self.rule_count.count(net_id)
    }

    fn resolve(&self, iface: &str) -> NetPolicyResult<NetworkId> {
        self.registry
            .network_id(iface)
            .ok_or_else(|| NetPolicyError::unknown_interface(iface))
    }

    /// One-time creation of the base mangle hook state: flush the master
    /// and exempt chains, then install the protect-mark bypass and the
    /// legacy privileged-owner bypass.
    #[instrument(skip(self))]
    pub async fn setup_iptables_hooks(&mut self) -> NetPolicyResult<()> {
        let mut outcome = CmdOutcome::new();

        for family in AddressFamily::BOTH {
            let cmd = build_chain_flush_cmd(family, LOCAL_MANGLE_OUTPUT);
            let ok = self.run(&cmd).await;
            outcome.record(&cmd, ok);
        }
        for family in AddressFamily::BOTH {
            let cmd = build_chain_flush_cmd(family, LOCAL_MANGLE_EXEMPT);
            let ok = self.run(&cmd).await;
            outcome.record(&cmd, ok);
        }

        // Skip anything already carrying the protect mark.
        for family in AddressFamily::BOTH {
            let cmd = build_bypass_protect_cmd(family);
            let ok = self.run(&cmd).await;
            outcome.record(&cmd, ok);
        }

        // Keep the legacy VPN daemons clear of secondary routes.
        for family in AddressFamily::BOTH {
            let cmd = build_bypass_legacy_owner_cmd(family);
            let ok = self.run(&cmd).await;
            outcome.record(&cmd, ok);
        }

        info!("Base mangle hooks initialized");
        outcome.into_result()
    }

    /// Add a destination route to an interface's private table
    #[instrument(skip(self))]
    pub async fn add_route(
        &mut self,
        iface: &str,
        dest: &str,
        prefix: u8,
        gateway: &str,
    ) -> NetPolicyResult<()> {
        self.modify_route(RouteAction::Add, iface, dest, prefix, gateway)
            .await
    }

    /// Remove a destination route from an interface's private table
    #[instrument(skip(self))]
    pub async fn remove_route(
        &mut self,
        iface: &str,
        dest: &str,
        prefix: u8,
        gateway: &str,
    ) -> NetPolicyResult<()> {
        self.modify_route(RouteAction::Del, iface, dest, prefix, gateway)
            .await
    }

    async fn modify_route(
        &mut self,
        action: RouteAction,
        iface: &str,
        dest: &str,
        prefix: u8,
        gateway: &str,
    ) -> NetPolicyResult<()> {
        let net_id = self.resolve(iface)?;
        let table = table_for(net_id);

        let gateway = if is_no_gateway(gateway) {
            None
        } else {
            Some(gateway)
        };
        let cmd = build_table_route_cmd(action, iface, dest, prefix, gateway, table);

        if !self.run(&cmd).await {
            warn!(iface, dest, prefix, table, "route modification failed");
            return Err(NetPolicyError::command_failed(cmd));
        }

        match action {
            RouteAction::Add => self.rule_count.increment(net_id),
            RouteAction::Del => self.rule_count.decrement(net_id),
        }
        info!(iface, dest, prefix, table, "Route modified");
        Ok(())
    }

    /// Add or remove a single-address route in a network's table.
    ///
    /// The reference count is mutated before the command runs: a removal
    /// may legitimately fail once the interface is already gone, and the
    /// reference must still be released or the network id stays busy
    /// forever.
    #[instrument(skip(self))]
    pub async fn modify_local_route(
        &mut self,
        net_id: NetworkId,
        action: RouteAction,
        iface: &str,
        addr: &str,
    ) -> NetPolicyResult<()> {
        match action {
            RouteAction::Add => self.rule_count.increment(net_id),
            RouteAction::Del => self.rule_count.decrement(net_id),
        }

        let cmd = build_local_route_cmd(action, iface, addr, table_for(net_id));
        if self.run(&cmd).await {
            Ok(())
        } else {
            Err(NetPolicyError::command_failed(cmd))
        }
    }

    /// Add or remove a source-address policy rule into a network's table
    #[instrument(skip(self))]
    pub async fn modify_from_rule(
        &mut self,
        net_id: NetworkId,
        action: RouteAction,
        addr: &str,
    ) -> NetPolicyResult<()> {
        let cmd = build_from_rule_cmd(AddressFamily::of(addr), action, addr, table_for(net_id));
        if !self.run(&cmd).await {
            return Err(NetPolicyError::command_failed(cmd));
        }

        match action {
            RouteAction::Add => self.rule_count.increment(net_id),
            RouteAction::Del => self.rule_count.decrement(net_id),
        }
        Ok(())
    }

    /// Establish the full mark-based routing path for an interface
    #[instrument(skip(self))]
    pub async fn enable_fwmark_routing(&mut self, iface: &str) -> NetPolicyResult<()> {
        self.set_fwmark_routing(iface, RouteAction::Add).await
    }

    /// Tear down the mark-based routing path for an interface
    #[instrument(skip(self))]
    pub async fn disable_fwmark_routing(&mut self, iface: &str) -> NetPolicyResult<()> {
        self.set_fwmark_routing(iface, RouteAction::Del).await
    }

    async fn set_fwmark_routing(&mut self, iface: &str, action: RouteAction) -> NetPolicyResult<()> {
        let net_id = self.resolve(iface)?;

        // Manual per-route rules and blanket fwmark routing are mutually
        // exclusive strategies for one network. Fail fast before any
        // kernel state changes.
        if self.rule_count.is_busy(net_id) {
            let count = self.rule_count.count(net_id);
            debug!(iface, net_id = net_id.0, count, "network busy, refusing fwmark setup");
            return Err(NetPolicyError::ResourceBusy {
                net_id: net_id.0,
                count,
            });
        }

        let mark = table_for(net_id);
        let chain = iface_chain(iface);
        let mut outcome = CmdOutcome::new();

        // Catch-all route in the private table plus the mark rule that
        // steers marked packets into it. v4 and v6 are independent; a v6
        // failure must not block the v4 path.
        for family in AddressFamily::BOTH {
            let cmd = build_default_route_cmd(family, action, iface, mark);
            let ok = self.run(&cmd).await;
            outcome.record(&cmd, ok);

            let cmd = build_fwmark_rule_cmd(family, action, mark);
            let ok = self.run(&cmd).await;
            outcome.record(&cmd, ok);
        }

        if action.is_add() {
            for family in AddressFamily::BOTH {
                let cmd = build_chain_new_cmd(family, &chain);
                let ok = self.run(&cmd).await;
                outcome.record(&cmd, ok);

                let cmd = build_jump_insert_cmd(family, mark, &chain);
                let ok = self.run(&cmd).await;
                outcome.record(&cmd, ok);

                // Packets pre-marked via SO_MARK must not keep the mark
                // once they have been routed through this chain.
                let cmd = build_mark_clear_cmd(family, &chain);
                let ok = self.run(&cmd).await;
                outcome.record(&cmd, ok);
            }
        } else {
            // Teardown order is forced by the kernel: the jump rule
            // referencing the chain first, then flush, then destroy.
            for family in AddressFamily::BOTH {
                let cmd = build_jump_delete_cmd(family, mark, &chain);
                let ok = self.run(&cmd).await;
                outcome.record(&cmd, ok);

                let cmd = build_chain_flush_cmd(family, &chain);
                let ok = self.run(&cmd).await;
                outcome.record(&cmd, ok);

                let cmd = build_chain_delete_cmd(family, &chain);
                let ok = self.run(&cmd).await;
                outcome.record(&cmd, ok);
            }
        }

        let cmd = build_masquerade_cmd(AddressFamily::V4, action, iface, mark);
        let ok = self.run(&cmd).await;
        outcome.record(&cmd, ok);

        // IPv6 NAT may be absent from the kernel. When the masquerade
        // attempt fails, reject marked v6 traffic instead of letting it
        // leave unsourced.
        let cmd = build_masquerade_cmd(AddressFamily::V6, action, iface, mark);
        if !self.run(&cmd).await {
            let cmd = build_v6_reject_cmd(action, iface, mark);
            let ok = self.run(&cmd).await;
            outcome.record(&cmd, ok);
        }

        if outcome.ok() {
            info!(iface, mark, action = action.ip_word(), "fwmark routing updated");
        } else {
            warn!(
                iface,
                mark,
                failed = outcome.failed_count(),
                "fwmark routing sequence completed with failures"
            );
        }
        outcome.into_result()
    }

    /// Mark traffic for a destination inside an interface's chain
    #[instrument(skip(self))]
    pub async fn add_fwmark_route(
        &mut self,
        iface: &str,
        dest: &str,
        prefix: u8,
    ) -> NetPolicyResult<()> {
        self.set_fwmark_route(iface, dest, prefix, RouteAction::Add)
            .await
    }

    /// Remove a destination mark rule from an interface's chain
    #[instrument(skip(self))]
    pub async fn remove_fwmark_route(
        &mut self,
        iface: &str,
        dest: &str,
        prefix: u8,
    ) -> NetPolicyResult<()> {
        self.set_fwmark_route(iface, dest, prefix, RouteAction::Del)
            .await
    }

    async fn set_fwmark_route(
        &mut self,
        iface: &str,
        dest: &str,
        prefix: u8,
        action: RouteAction,
    ) -> NetPolicyResult<()> {
        let net_id = self.resolve(iface)?;
        let cmd = build_fwmark_route_cmd(
            AddressFamily::of(dest),
            action,
            iface,
            dest,
            prefix,
            table_for(net_id),
        );
        if self.run(&cmd).await {
            Ok(())
        } else {
            Err(NetPolicyError::command_failed(cmd))
        }
    }

    /// Bind a UID range to an interface's network and funnel its traffic
    /// into the interface chain
    #[instrument(skip(self))]
    pub async fn add_uid_binding(
        &mut self,
        iface: &str,
        uid_start: u32,
        uid_end: u32,
    ) -> NetPolicyResult<()> {
        self.set_uid_binding(iface, uid_start, uid_end, RouteAction::Add)
            .await
    }

    /// Release a UID-range binding and remove its owner rule
    #[instrument(skip(self))]
    pub async fn remove_uid_binding(
        &mut self,
        iface: &str,
        uid_start: u32,
        uid_end: u32,
    ) -> NetPolicyResult<()> {
        self.set_uid_binding(iface, uid_start, uid_end, RouteAction::Del)
            .await
    }

    async fn set_uid_binding(
        &mut self,
        iface: &str,
        uid_start: u32,
        uid_end: u32,
        action: RouteAction,
    ) -> NetPolicyResult<()> {
        let net_id = self.resolve(iface)?;

        // The registry enforces exclusive ownership; a rejection aborts
        // before any kernel command runs.
        let bind_to = action.is_add().then_some(net_id);
        if !self.registry.bind_uid_range(uid_start, uid_end, bind_to) {
            return Err(NetPolicyError::invalid_argument(format!(
                "UID range {}-{} rejected by identity registry",
                uid_start, uid_end
            )));
        }

        let mut outcome = CmdOutcome::new();
        for family in AddressFamily::BOTH {
            let cmd = build_uid_rule_cmd(family, action, uid_start, uid_end, iface);
            let ok = self.run(&cmd).await;
            outcome.record(&cmd, ok);
        }

        info!(
            iface,
            uid_start,
            uid_end,
            action = action.ip_word(),
            "UID binding updated"
        );
        outcome.into_result()
    }

    /// Exempt a destination host from secondary-table routing
    #[instrument(skip(self))]
    pub async fn add_host_exemption(&mut self, host: &str) -> NetPolicyResult<()> {
        self.set_host_exemption(host, RouteAction::Add).await
    }

    /// Remove a destination host exemption
    #[instrument(skip(self))]
    pub async fn remove_host_exemption(&mut self, host: &str) -> NetPolicyResult<()> {
        self.set_host_exemption(host, RouteAction::Del).await
    }

    async fn set_host_exemption(&mut self, host: &str, action: RouteAction) -> NetPolicyResult<()> {
        let family = AddressFamily::of(host);
        let mut outcome = CmdOutcome::new();

        // Two effects, both required for the exemption to hold: the
        // bypass mark for the destination, and a rule ahead of every
        // fwmark rule that keeps it on the main table.
        let cmd = build_exempt_mark_cmd(family, action, host);
        let ok = self.run(&cmd).await;
        outcome.record(&cmd, ok);

        let cmd = build_exempt_rule_cmd(family, action, host);
        let ok = self.run(&cmd).await;
        outcome.record(&cmd, ok);

        outcome.into_result()
    }

    /// The fwmark of the network currently owning a UID
    pub fn get_mark_for_uid(&self, uid: u32) -> u32 {
        table_for(self.registry.network_for_uid(uid))
    }

    /// The privileged bypass mark
    pub fn protect_mark(&self) -> u32 {
        PROTECT_MARK
    }

    /// Execute shell command (with mock mode support)
    async fn run(&mut self, cmd: &str) -> bool {
        #[cfg(test)]
        if self.mock_mode {
            let ok = !self
                .failing_patterns
                .iter()
                .any(|pattern| cmd.contains(pattern.as_str()));
            self.captured_commands.push(cmd.to_string());
            return ok;
        }

        match shell::exec(cmd).await {
            Ok(result) => result.success(),
            Err(e) => {
                warn!(error = %e, "failed to spawn routing command");
                false
            }
        }
    }

    #[cfg(test)]
    pub fn with_mock_mode(mut self) -> Self {
        self.mock_mode = true;
        self
    }

    #[cfg(test)]
    pub fn with_failing_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.failing_patterns.push(pattern.into());
        self
    }

    #[cfg(test)]
    pub fn captured_commands(&self) -> &[String] {
        &self.captured_commands
    }

    #[cfg(test)]
    pub fn clear_captured(&mut self) {
        self.captured_commands.clear();
    }
}
