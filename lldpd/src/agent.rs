// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

use slog::debug;
use slog::info;
use slog::trace;

use crate::errors::LldpdError;
use crate::fsm;
use crate::mib::SystemInfo;
use crate::port::PortConfig;
use crate::port::PortEntry;
use crate::transport::Transport;
use crate::types;
use crate::types::LldpdResult;

/// Remote table statistics from the lldpStatistics MIB group
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RemoteTableStats {
    /// Agent uptime when an entry was last created, modified or deleted
    pub last_change_time: u32,
    pub inserts: u64,
    pub deletes: u64,
    /// Neighbors we had to ignore for lack of space
    pub drops: u64,
    pub ageouts: u64,
}

/// Called with the current remote table statistics when the remote tables
/// have changed, no more often than once per notification interval.
pub type NotificationHandler = Box<dyn FnMut(&RemoteTableStats) + Send>;

/// All state for a single LLDP agent: the administrator-configured
/// tunables, the local system information we advertise, and one entry per
/// port.  Every mutating operation takes `&mut self`, so callers sharing
/// an agent must hold the management lock (see `mgmt::LldpAgent`).
pub struct AgentContext {
    pub(crate) log: slog::Logger,
    pub(crate) agent: types::Agent,
    pub(crate) sysinfo: SystemInfo,
    pub(crate) ports: Vec<PortEntry>,
    pub(crate) transport: Box<dyn Transport>,

    /// Set whenever a machine on an enabled port changes state, requiring
    /// another dispatch pass
    pub(crate) busy: bool,
    /// Seconds since the agent was created
    pub(crate) sys_time: u32,

    pub(crate) remote: RemoteTableStats,
    pub(crate) next_rem_index: u32,

    pub(crate) notification_pending: bool,
    pub(crate) notification_timer: u16,
    pub(crate) notification_handler: Option<NotificationHandler>,

    /// Passes taken by the most recent dispatch
    pub(crate) last_passes: u32,
    /// Internal consistency failures detected by the dispatcher
    pub(crate) fsm_errors: u64,
}

impl std::fmt::Debug for AgentContext {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("AgentContext")
            .field("agent", &self.agent)
            .field("sysinfo", &self.sysinfo)
            .field("ports", &self.ports)
            .field("busy", &self.busy)
            .field("sys_time", &self.sys_time)
            .field("remote", &self.remote)
            .finish_non_exhaustive()
    }
}

impl AgentContext {
    /// Build an agent managing the given ports.  Port indices are assigned
    /// in order, starting at 1.  The machines don't run until `init_fsm`
    /// is called.
    pub fn new(
        log: &slog::Logger,
        agent: types::Agent,
        sysinfo: SystemInfo,
        ports: Vec<PortConfig>,
        transport: Box<dyn Transport>,
    ) -> LldpdResult<Self> {
        crate::mgmt::validate_agent(&agent)?;
        sysinfo.validate()?;
        if ports.is_empty() {
            return Err(LldpdError::Invalid("agent has no ports".into()));
        }

        let log = log.new(slog::o!("unit" => "agent"));
        let ports = ports
            .into_iter()
            .enumerate()
            .map(|(idx, cfg)| {
                PortEntry::new(&log, idx as u32 + 1, cfg, agent.admin_status)
            })
            .collect::<Vec<PortEntry>>();
        for port in &ports {
            crate::mib::validate_port(port)?;
        }

        Ok(AgentContext {
            log,
            agent,
            sysinfo,
            ports,
            transport,
            busy: false,
            sys_time: 0,
            remote: RemoteTableStats::default(),
            next_rem_index: 1,
            notification_pending: false,
            notification_timer: 0,
            notification_handler: None,
            last_passes: 0,
            fsm_errors: 0,
        })
    }

    pub fn set_notification_handler(&mut self, handler: NotificationHandler) {
        self.notification_handler = Some(handler);
    }

    /// Enter the initial state of every port's machines, and run them to
    /// quiescence.
    pub fn init_fsm(&mut self) {
        fsm::init_fsm(self)
    }

    /// Run the state machines of every port until no more transitions are
    /// possible.
    pub fn fsm(&mut self) {
        fsm::lldp_fsm(self)
    }

    /// Advance every timer by one second, then dispatch.
    pub fn tick(&mut self) {
        self.sys_time = self.sys_time.wrapping_add(1);
        for port in self.ports.iter_mut() {
            if port.tick() {
                trace!(port.log, "neighbor information has aged out");
            }
        }

        self.notification_timer = self.notification_timer.saturating_sub(1);
        if self.notification_timer == 0 && self.notification_pending {
            self.notify();
        }

        fsm::lldp_fsm(self)
    }

    fn notify(&mut self) {
        self.notification_pending = false;
        self.notification_timer = self.agent.notification_interval;
        info!(self.log, "remote tables changed";
            "inserts" => self.remote.inserts,
            "deletes" => self.remote.deletes,
            "drops" => self.remote.drops,
            "ageouts" => self.remote.ageouts);
        let stats = self.remote;
        if let Some(handler) = self.notification_handler.as_mut() {
            handler(&stats);
        }
    }

    /// Deliver a frame received on a port.  Frames arriving on ports that
    /// aren't receiving, and frames that aren't addressed to one of the LLDP
    /// group addresses with the LLDP ethertype, are silently ignored.
    pub fn process_frame(&mut self, port_index: u32, frame: &[u8]) {
        let Ok(idx) = self.port_position(port_index) else {
            debug!(self.log, "dropping frame for unknown port {port_index}");
            return;
        };
        let port = &mut self.ports[idx];
        if !port.port_enabled || !port.admin_status.has_rx() {
            trace!(port.log, "dropping frame on non-receiving port");
            return;
        }
        if !crate::mib::is_lldp_frame(frame) {
            trace!(port.log, "ignoring non-LLDP frame");
            return;
        }
        port.rx_frame = Some(frame.to_vec());
        port.rcv_frame = true;
        fsm::lldp_fsm(self)
    }

    /// Record the link state of a port, as reported by the host.
    pub fn set_port_enabled(
        &mut self,
        port_index: u32,
        enabled: bool,
    ) -> LldpdResult<()> {
        let idx = self.port_position(port_index)?;
        let port = &mut self.ports[idx];
        if port.port_enabled != enabled {
            info!(port.log, "link {}", if enabled { "up" } else { "down" });
            port.port_enabled = enabled;
        }
        fsm::lldp_fsm(self);
        Ok(())
    }

    pub(crate) fn port_position(&self, port_index: u32) -> LldpdResult<usize> {
        self.ports
            .iter()
            .position(|p| p.port_index == port_index)
            .ok_or_else(|| {
                LldpdError::Missing(format!("no such port: {port_index}"))
            })
    }

    pub fn port(&self, port_index: u32) -> LldpdResult<&PortEntry> {
        self.port_position(port_index).map(|idx| &self.ports[idx])
    }

    pub(crate) fn port_mut(
        &mut self,
        port_index: u32,
    ) -> LldpdResult<&mut PortEntry> {
        let idx = self.port_position(port_index)?;
        Ok(&mut self.ports[idx])
    }

    pub fn ports(&self) -> &[PortEntry] {
        &self.ports
    }

    pub fn port_by_name(&self, name: &str) -> Option<&PortEntry> {
        self.ports.iter().find(|p| p.name == name)
    }

    pub fn busy(&self) -> bool {
        self.busy
    }

    pub fn sys_time(&self) -> u32 {
        self.sys_time
    }

    pub fn last_passes(&self) -> u32 {
        self.last_passes
    }

    pub fn fsm_errors(&self) -> u64 {
        self.fsm_errors
    }

    // Note that the remote tables changed on this port.
    pub(crate) fn remote_changed(&mut self, idx: usize) {
        self.remote.last_change_time = self.sys_time;
        self.ports[idx].something_changed_remote = true;
    }

    // Local information changed; every port needs to advertise it.
    pub(crate) fn something_changed_local(&mut self) {
        for port in self.ports.iter_mut() {
            port.something_changed_local = true;
        }
    }
}
