// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! Management access to an agent: the lock that serializes it, and the
//! accessors for its configuration, local information, remote tables, and
//! statistics.
//!
//! Every setter takes a `commit` flag.  The value is always validated, but
//! it is only applied, and the state machines rerun, when `commit` is set.

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use slog::info;

use protocol::types as protocol_types;
use protocol::types::ChassisId;
use protocol::types::ManagementAddress;
use protocol::types::NetworkAddress;
use protocol::types::PortId;

use crate::agent::AgentContext;
use crate::agent::RemoteTableStats;
use crate::errors::LldpdError;
use crate::fsm;
use crate::mib;
use crate::mib::SystemInfo;
use crate::neighbors::Neighbor;
use crate::port::PortEntry;
use crate::port::Stats;
use crate::port::TlvFilter;
use crate::types;
use crate::types::AdminStatus;
use crate::types::LldpdResult;

/// A shareable handle on an agent.  Holding the guard returned by `lock` is
/// what keeps management operations from interleaving with a dispatch.
#[derive(Clone)]
pub struct LldpAgent(Arc<Mutex<AgentContext>>);

impl LldpAgent {
    pub fn new(ctx: AgentContext) -> Self {
        LldpAgent(Arc::new(Mutex::new(ctx)))
    }

    pub fn lock(&self) -> LldpdResult<MutexGuard<'_, AgentContext>> {
        self.0
            .lock()
            .map_err(|_| LldpdError::Other("agent lock poisoned".into()))
    }
}

fn check_range(
    name: &str,
    value: u16,
    range: RangeInclusive<u16>,
) -> LldpdResult<()> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(LldpdError::Invalid(format!(
            "{name} {value} outside of {}..={}",
            range.start(),
            range.end()
        )))
    }
}

// tx_delay may be no more than a quarter of msg_tx_interval
fn check_tx_delay(tx_delay: u16, msg_tx_interval: u16) -> LldpdResult<()> {
    if tx_delay > msg_tx_interval / 4 {
        Err(LldpdError::Invalid(format!(
            "tx_delay {tx_delay} exceeds a quarter of msg_tx_interval \
             {msg_tx_interval}"
        )))
    } else {
        Ok(())
    }
}

/// Verify that every tunable is within its legal range.
pub(crate) fn validate_agent(agent: &types::Agent) -> LldpdResult<()> {
    check_range(
        "msg_tx_interval",
        agent.msg_tx_interval,
        types::MSG_TX_INTERVAL_RANGE,
    )?;
    check_range("msg_tx_hold", agent.msg_tx_hold, types::MSG_TX_HOLD_RANGE)?;
    check_range(
        "reinit_delay",
        agent.reinit_delay,
        types::REINIT_DELAY_RANGE,
    )?;
    check_range("tx_delay", agent.tx_delay, types::TX_DELAY_RANGE)?;
    check_range(
        "notification_interval",
        agent.notification_interval,
        types::NOTIFICATION_INTERVAL_RANGE,
    )?;
    check_tx_delay(agent.tx_delay, agent.msg_tx_interval)?;
    if agent.max_neighbors == 0 {
        return Err(LldpdError::Invalid("max_neighbors must be non-zero".into()));
    }
    Ok(())
}

// Agent-wide tunables
impl AgentContext {
    pub fn msg_tx_interval(&self) -> u16 {
        self.agent.msg_tx_interval
    }

    pub fn set_msg_tx_interval(
        &mut self,
        interval: u16,
        commit: bool,
    ) -> LldpdResult<()> {
        check_range("msg_tx_interval", interval, types::MSG_TX_INTERVAL_RANGE)?;
        check_tx_delay(self.agent.tx_delay, interval)?;
        if commit {
            info!(self.log, "msg_tx_interval set to {interval}");
            self.agent.msg_tx_interval = interval;
            // The advertised TTL has changed
            self.something_changed_local();
            fsm::lldp_fsm(self);
        }
        Ok(())
    }

    pub fn msg_tx_hold(&self) -> u16 {
        self.agent.msg_tx_hold
    }

    pub fn set_msg_tx_hold(&mut self, hold: u16, commit: bool) -> LldpdResult<()> {
        check_range("msg_tx_hold", hold, types::MSG_TX_HOLD_RANGE)?;
        if commit {
            info!(self.log, "msg_tx_hold set to {hold}");
            self.agent.msg_tx_hold = hold;
            self.something_changed_local();
            fsm::lldp_fsm(self);
        }
        Ok(())
    }

    pub fn reinit_delay(&self) -> u16 {
        self.agent.reinit_delay
    }

    pub fn set_reinit_delay(
        &mut self,
        delay: u16,
        commit: bool,
    ) -> LldpdResult<()> {
        check_range("reinit_delay", delay, types::REINIT_DELAY_RANGE)?;
        if commit {
            self.agent.reinit_delay = delay;
        }
        Ok(())
    }

    pub fn tx_delay(&self) -> u16 {
        self.agent.tx_delay
    }

    pub fn set_tx_delay(&mut self, delay: u16, commit: bool) -> LldpdResult<()> {
        check_range("tx_delay", delay, types::TX_DELAY_RANGE)?;
        check_tx_delay(delay, self.agent.msg_tx_interval)?;
        if commit {
            self.agent.tx_delay = delay;
        }
        Ok(())
    }

    pub fn notification_interval(&self) -> u16 {
        self.agent.notification_interval
    }

    pub fn set_notification_interval(
        &mut self,
        interval: u16,
        commit: bool,
    ) -> LldpdResult<()> {
        check_range(
            "notification_interval",
            interval,
            types::NOTIFICATION_INTERVAL_RANGE,
        )?;
        if commit {
            self.agent.notification_interval = interval;
            self.notification_timer = self.notification_timer.min(interval);
        }
        Ok(())
    }
}

// Per-port configuration
impl AgentContext {
    pub fn admin_status(&self, port_index: u32) -> LldpdResult<AdminStatus> {
        self.port(port_index).map(|p| p.admin_status)
    }

    pub fn set_admin_status(
        &mut self,
        port_index: u32,
        status: AdminStatus,
        commit: bool,
    ) -> LldpdResult<()> {
        let idx = self.port_position(port_index)?;
        if commit {
            let port = &mut self.ports[idx];
            if port.admin_status != status {
                info!(port.log, "admin status {} -> {}", port.admin_status, status);
                port.admin_status = status;
            }
            fsm::lldp_fsm(self);
        }
        Ok(())
    }

    pub fn notification_enable(&self, port_index: u32) -> LldpdResult<bool> {
        self.port(port_index).map(|p| p.notification_enable)
    }

    pub fn set_notification_enable(
        &mut self,
        port_index: u32,
        enable: bool,
        commit: bool,
    ) -> LldpdResult<()> {
        let port = self.port_mut(port_index)?;
        if commit {
            port.notification_enable = enable;
        }
        Ok(())
    }

    /// The lldpPortConfigTLVsTxEnable bitmask for the port
    pub fn basic_tlv_filter(&self, port_index: u32) -> LldpdResult<u8> {
        self.port(port_index).map(|p| p.tlv_filter.bits())
    }

    pub fn set_basic_tlv_filter(
        &mut self,
        port_index: u32,
        mask: u8,
        commit: bool,
    ) -> LldpdResult<()> {
        let filter = TlvFilter::new(mask)?;
        let port = self.port_mut(port_index)?;
        if commit && port.tlv_filter != filter {
            port.tlv_filter = filter;
            port.something_changed_local = true;
            fsm::lldp_fsm(self);
        }
        Ok(())
    }
}

// Local system information
impl AgentContext {
    // Validate a candidate set of local information, including checking that
    // the resulting LLDPDU still fits on every port, then apply it.
    fn update_sysinfo<F>(&mut self, commit: bool, f: F) -> LldpdResult<()>
    where
        F: FnOnce(&mut SystemInfo) -> LldpdResult<()>,
    {
        let mut sysinfo = self.sysinfo.clone();
        f(&mut sysinfo)?;
        sysinfo.validate()?;
        for port in &self.ports {
            mib::build_info_frame(&self.agent, &sysinfo, port)
                .map_err(|e| LldpdError::Invalid(e.to_string()))?;
        }
        if commit {
            self.sysinfo = sysinfo;
            self.something_changed_local();
            fsm::lldp_fsm(self);
        }
        Ok(())
    }

    pub fn local_chassis_id(&self) -> &ChassisId {
        &self.sysinfo.chassis_id
    }

    pub fn set_chassis_id(
        &mut self,
        chassis_id: ChassisId,
        commit: bool,
    ) -> LldpdResult<()> {
        self.update_sysinfo(commit, |s| {
            s.chassis_id = chassis_id;
            Ok(())
        })
    }

    pub fn local_system_name(&self) -> Option<&str> {
        self.sysinfo.system_name.as_deref()
    }

    pub fn set_system_name(
        &mut self,
        name: Option<String>,
        commit: bool,
    ) -> LldpdResult<()> {
        self.update_sysinfo(commit, |s| {
            s.system_name = name;
            Ok(())
        })
    }

    pub fn local_system_description(&self) -> Option<&str> {
        self.sysinfo.system_description.as_deref()
    }

    pub fn set_system_description(
        &mut self,
        desc: Option<String>,
        commit: bool,
    ) -> LldpdResult<()> {
        self.update_sysinfo(commit, |s| {
            s.system_description = desc;
            Ok(())
        })
    }

    /// The supported and enabled capabilities, as bitmasks
    pub fn local_system_capabilities(&self) -> (u16, u16) {
        match &self.sysinfo.capabilities {
            Some((avail, enabled)) => (
                protocol_types::capabilities_to_u16(avail),
                protocol_types::capabilities_to_u16(enabled),
            ),
            None => (0, 0),
        }
    }

    /// Set the supported and enabled capabilities.  Clearing both stops the
    /// capabilities TLV from being sent at all.
    pub fn set_system_capabilities(
        &mut self,
        supported: u16,
        enabled: u16,
        commit: bool,
    ) -> LldpdResult<()> {
        self.update_sysinfo(commit, |s| {
            s.capabilities = if supported == 0 && enabled == 0 {
                None
            } else {
                let avail = protocol_types::capabilities_from_u16(supported);
                let enabled = protocol_types::capabilities_from_u16(enabled);
                if protocol_types::capabilities_to_u16(&avail) != supported {
                    return Err(LldpdError::Invalid(format!(
                        "unknown capabilities in {supported:#x}"
                    )));
                }
                Some((avail, enabled))
            };
            Ok(())
        })
    }

    pub fn local_management_addresses(&self) -> &[ManagementAddress] {
        &self.sysinfo.management_addresses
    }

    /// Returns the index of the management address, if we advertise it
    pub fn find_local_management_address(
        &self,
        addr: &NetworkAddress,
    ) -> Option<usize> {
        self.sysinfo
            .management_addresses
            .iter()
            .position(|ma| &ma.addr == addr)
    }

    pub fn local_management_address(
        &self,
        index: usize,
    ) -> Option<&ManagementAddress> {
        self.sysinfo.management_addresses.get(index)
    }

    pub fn add_management_address(
        &mut self,
        addr: ManagementAddress,
        commit: bool,
    ) -> LldpdResult<()> {
        if self.find_local_management_address(&addr.addr).is_some() {
            return Err(LldpdError::Invalid(format!(
                "management address {} already present",
                addr.addr
            )));
        }
        self.update_sysinfo(commit, |s| {
            s.management_addresses.push(addr);
            Ok(())
        })
    }

    pub fn remove_management_address(
        &mut self,
        addr: &NetworkAddress,
        commit: bool,
    ) -> LldpdResult<()> {
        let idx = self.find_local_management_address(addr).ok_or_else(|| {
            LldpdError::Missing(format!("no management address {addr}"))
        })?;
        self.update_sysinfo(commit, |s| {
            s.management_addresses.remove(idx);
            Ok(())
        })
    }

    pub fn clear_management_addresses(&mut self, commit: bool) -> LldpdResult<()> {
        self.update_sysinfo(commit, |s| {
            s.management_addresses.clear();
            Ok(())
        })
    }

    pub fn local_port_id(&self, port_index: u32) -> LldpdResult<&PortId> {
        self.port(port_index).map(|p| &p.port_id)
    }

    pub fn set_port_id(
        &mut self,
        port_index: u32,
        port_id: PortId,
        commit: bool,
    ) -> LldpdResult<()> {
        self.update_port_info(port_index, commit, port_id, |p| &mut p.port_id)
    }

    pub fn local_port_description(
        &self,
        port_index: u32,
    ) -> LldpdResult<Option<&str>> {
        self.port(port_index).map(|p| p.port_description.as_deref())
    }

    pub fn set_port_description(
        &mut self,
        port_index: u32,
        desc: Option<String>,
        commit: bool,
    ) -> LldpdResult<()> {
        self.update_port_info(port_index, commit, desc, |p| {
            &mut p.port_description
        })
    }

    // Install a candidate value for one of the port's local fields, and check
    // that the port's LLDPDU still encodes and fits.  The old value is put
    // back if the check fails or the change isn't being committed.
    fn update_port_info<T>(
        &mut self,
        port_index: u32,
        commit: bool,
        value: T,
        field: fn(&mut PortEntry) -> &mut T,
    ) -> LldpdResult<()> {
        let idx = self.port_position(port_index)?;
        let old = std::mem::replace(field(&mut self.ports[idx]), value);
        let port = &self.ports[idx];
        let checked = mib::validate_port(port).and_then(|_| {
            mib::build_info_frame(&self.agent, &self.sysinfo, port)
                .map(|_| ())
                .map_err(|e| LldpdError::Invalid(e.to_string()))
        });
        if checked.is_err() || !commit {
            *field(&mut self.ports[idx]) = old;
            return checked;
        }
        self.ports[idx].something_changed_local = true;
        fsm::lldp_fsm(self);
        Ok(())
    }
}

// Remote tables and statistics
impl AgentContext {
    /// Look up a neighbor by its lldpRemEntry index: the time it was last
    /// changed, the port it was heard on, and its remote index.
    pub fn find_remote_entry(
        &self,
        time_mark: u32,
        port_index: u32,
        rem_index: u32,
    ) -> Option<&Neighbor> {
        self.port(port_index)
            .ok()?
            .neighbors
            .values()
            .find(|n| n.time_mark == time_mark && n.rem_index == rem_index)
    }

    /// Every neighbor known to the agent, with the index of the port it was
    /// heard on.
    pub fn remote_entries(&self) -> impl Iterator<Item = (u32, &Neighbor)> {
        self.ports
            .iter()
            .flat_map(|p| p.neighbors.values().map(|n| (p.port_index, n)))
    }

    pub fn stats(&self, port_index: u32) -> LldpdResult<Stats> {
        self.port(port_index).map(|p| p.stats.clone())
    }

    pub fn remote_table_stats(&self) -> RemoteTableStats {
        self.remote
    }
}
