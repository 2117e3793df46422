// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

use std::collections::BTreeMap;

use protocol::types::PortId;
use protocol::MacAddr;

use crate::errors::LldpdError;
use crate::neighbors::Neighbor;
use crate::neighbors::NeighborId;
use crate::rx_fsm::RxPending;
use crate::rx_fsm::RxState;
use crate::tx_fsm::TxState;
use crate::types::AdminStatus;
use crate::types::LldpdResult;

/// Statistics described in section 10.5.2.2 of the standard
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    /// How many times a neighbor's record has been deleted because its TTL
    /// expired
    pub ageouts_total: u64,
    /// How many LLDP frames have been discarded because of an invalid TLV or
    /// lack of local space
    pub frames_discarded_total: u64,
    /// LLDPDU frames discarded because of a detected error
    pub frames_in_errors_total: u64,
    /// Count of all LLDPDU frames received
    pub frames_in_total: u64,
    /// Count of all LLDPDU frames transmitted
    pub frames_out_total: u64,
    /// TLVs that were received and discarded for any reason
    pub tlvs_discarded_total: u64,
    /// Well-formed TLVs that were discarded because they were not recognized.
    pub tlvs_unrecognized_total: u64,
}

/// Which of the optional basic TLVs are included in the LLDPDUs sent on a
/// port.  This mirrors the lldpPortConfigTLVsTxEnable MIB object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TlvFilter(u8);

impl TlvFilter {
    pub const PORT_DESC: u8 = 0x01;
    pub const SYS_NAME: u8 = 0x02;
    pub const SYS_DESC: u8 = 0x04;
    pub const SYS_CAP: u8 = 0x08;
    pub const ALL: u8 = 0x0f;

    pub fn new(mask: u8) -> LldpdResult<Self> {
        if mask & !Self::ALL != 0 {
            Err(LldpdError::Invalid(format!("invalid TLV filter: {mask:#x}")))
        } else {
            Ok(TlvFilter(mask))
        }
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, bit: u8) -> bool {
        self.0 & bit != 0
    }
}

impl Default for TlvFilter {
    fn default() -> Self {
        TlvFilter(Self::ALL)
    }
}

/// The host-supplied description of a port managed by the agent
#[derive(Clone, Debug)]
pub struct PortConfig {
    /// Name of the interface on which LLDPDUs are sent and received.
    pub name: String,
    pub mac: MacAddr,
    pub port_id: PortId,
    pub port_description: Option<String>,
}

impl PortConfig {
    /// Use the interface name as both the port ID and its description.
    pub fn new(name: impl ToString, mac: MacAddr) -> Self {
        let name = name.to_string();
        PortConfig {
            port_id: PortId::InterfaceName(name.clone()),
            port_description: Some(name.clone()),
            name,
            mac,
        }
    }
}

/// All of the per-port state of the agent: configuration, the variables
/// shared by the two state machines, statistics and the remote systems
/// learned on this port.
#[derive(Debug)]
pub struct PortEntry {
    pub(crate) log: slog::Logger,

    /// Stable, 1-based port number, as used by lldpPortConfigPortNum
    pub port_index: u32,
    pub name: String,
    pub mac: MacAddr,

    /// Set by the host when the link is operational
    pub port_enabled: bool,
    /// Whether the agent should be sending, receiving, or both.
    pub admin_status: AdminStatus,
    /// Whether remote table changes on this port should generate
    /// notifications
    pub notification_enable: bool,
    pub tlv_filter: TlvFilter,

    /// Local information advertised for this port
    pub port_id: PortId,
    pub port_description: Option<String>,

    pub rx_state: RxState,
    pub tx_state: TxState,

    /// The values below are variables and timers defined in section 10.5 of
    /// the standard.  Timers count down once per tick and stop at 0.

    /// Remaining validity of the information we most recently advertised
    pub tx_ttl: u16,
    /// Time until the next periodic transmission
    pub tx_ttr: u16,
    /// Minimum delay before the next transmission
    pub tx_delay_while: u16,
    /// Time remaining before the tx machine may reinitialize after a
    /// shutdown
    pub tx_shutdown_while: u16,
    pub something_changed_local: bool,
    pub something_changed_remote: bool,

    pub rcv_frame: bool,
    pub rx_info_age: bool,
    pub bad_frame: bool,
    pub rx_changes: bool,
    pub rx_ttl: u16,
    /// A received frame waiting for the rx machine
    pub(crate) rx_frame: Option<Vec<u8>>,
    /// The outcome of processing the last received frame
    pub(crate) rx_pending: Option<RxPending>,

    /// Counters of packets in, packets out, etc.
    pub stats: Stats,
    /// Neighbors we are currently aware of
    pub neighbors: BTreeMap<NeighborId, Neighbor>,
}

impl PortEntry {
    pub(crate) fn new(
        log: &slog::Logger,
        port_index: u32,
        cfg: PortConfig,
        admin_status: AdminStatus,
    ) -> Self {
        PortEntry {
            log: log.new(slog::o!("port" => port_index, "iface" => cfg.name.clone())),
            port_index,
            name: cfg.name,
            mac: cfg.mac,
            port_enabled: false,
            admin_status,
            notification_enable: false,
            tlv_filter: TlvFilter::default(),
            port_id: cfg.port_id,
            port_description: cfg.port_description,
            rx_state: RxState::RxLldpInitialize,
            tx_state: TxState::TxLldpInitialize,
            tx_ttl: 0,
            tx_ttr: 0,
            tx_delay_while: 0,
            tx_shutdown_while: 0,
            something_changed_local: false,
            something_changed_remote: false,
            rcv_frame: false,
            rx_info_age: false,
            bad_frame: false,
            rx_changes: false,
            rx_ttl: 0,
            rx_frame: None,
            rx_pending: None,
            stats: Stats::default(),
            neighbors: BTreeMap::new(),
        }
    }

    // Advance the per-port countdowns by one second.  Returns true if any
    // neighbor's information has expired.
    pub(crate) fn tick(&mut self) -> bool {
        self.tx_ttl = self.tx_ttl.saturating_sub(1);
        self.tx_ttr = self.tx_ttr.saturating_sub(1);
        self.tx_delay_while = self.tx_delay_while.saturating_sub(1);
        self.tx_shutdown_while = self.tx_shutdown_while.saturating_sub(1);

        let mut aged = false;
        for neighbor in self.neighbors.values_mut() {
            neighbor.rx_info_ttl = neighbor.rx_info_ttl.saturating_sub(1);
            aged |= neighbor.rx_info_ttl == 0;
        }
        if aged {
            self.rx_info_age = true;
        }
        aged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tlv_filter() {
        assert_eq!(TlvFilter::default().bits(), TlvFilter::ALL);
        let f = TlvFilter::new(TlvFilter::SYS_NAME | TlvFilter::SYS_CAP).unwrap();
        assert!(f.contains(TlvFilter::SYS_NAME));
        assert!(!f.contains(TlvFilter::PORT_DESC));
        assert!(TlvFilter::new(0x10).is_err());
    }

    #[test]
    fn test_timers_stop_at_zero() {
        let log = slog::Logger::root(slog::Discard, slog::o!());
        let cfg = PortConfig::new("eth0", MacAddr::new(2, 0, 0, 0, 0, 1));
        let mut port = PortEntry::new(&log, 1, cfg, AdminStatus::default());
        port.tx_ttr = 1;
        port.tx_delay_while = 2;
        assert!(!port.tick());
        assert_eq!((port.tx_ttl, port.tx_ttr, port.tx_delay_while), (0, 0, 1));
        assert!(!port.tick());
        assert_eq!((port.tx_ttr, port.tx_delay_while), (0, 0));
        assert!(!port.rx_info_age);
    }
}
