// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use crate::errors;

pub type LldpdResult<T> = Result<T, errors::LldpdError>;

/// Legal values for the tunables below, from the LLDP MIB in section 12 of
/// the standard.
pub const MSG_TX_INTERVAL_RANGE: RangeInclusive<u16> = 5..=32768;
pub const MSG_TX_HOLD_RANGE: RangeInclusive<u16> = 2..=10;
pub const REINIT_DELAY_RANGE: RangeInclusive<u16> = 1..=10;
pub const TX_DELAY_RANGE: RangeInclusive<u16> = 1..=8192;
pub const NOTIFICATION_INTERVAL_RANGE: RangeInclusive<u16> = 5..=3600;

/// This structure contains the global state described in section 10.5.3
/// of the standard that can be configured by an administrator.  The values
/// that are updated dynamically are all stored in the per-port structs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Agent {
    /// Initial admin status for each port
    pub admin_status: AdminStatus,
    /// Multiplier of msg_tx_interval, used to calculate TTL.
    pub msg_tx_hold: u16,
    /// Time between LLDPDU transmissions, in ticks.
    pub msg_tx_interval: u16,
    /// After becoming disabled, time in seconds to wait before attempting
    /// reinitialization.
    pub reinit_delay: u16,
    /// Minimum delay between successive LLDPDU transmissions
    pub tx_delay: u16,
    /// Minimum time between remote table change notifications
    pub notification_interval: u16,
    /// Number of neighbors we are willing to track on a single port
    pub max_neighbors: usize,
}

impl Default for Agent {
    /// Returns an Agent struct with all fields set as recommended by the
    /// standard
    fn default() -> Self {
        Agent {
            admin_status: AdminStatus::default(),
            msg_tx_hold: 4,
            msg_tx_interval: 30,
            reinit_delay: 2,
            tx_delay: 2,
            notification_interval: 5,
            max_neighbors: 16,
        }
    }
}

impl Agent {
    /// The TTL advertised in our information LLDPDUs
    pub fn tx_ttl(&self) -> u16 {
        let ttl = self.msg_tx_interval as u32 * self.msg_tx_hold as u32;
        ttl.min(u16::MAX as u32) as u16
    }
}

/// Whether the agent should be sending, receiving, or both.  The
/// discriminants match the lldpPortConfigAdminStatus MIB object.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[repr(u8)]
pub enum AdminStatus {
    EnabledTxOnly = 1,
    EnabledRxOnly = 2,
    #[default]
    EnabledRxTx = 3,
    Disabled = 4,
}

impl AdminStatus {
    pub fn has_rx(self) -> bool {
        self == AdminStatus::EnabledRxTx || self == AdminStatus::EnabledRxOnly
    }

    pub fn has_tx(self) -> bool {
        self == AdminStatus::EnabledRxTx || self == AdminStatus::EnabledTxOnly
    }
}

impl TryFrom<u8> for AdminStatus {
    type Error = errors::LldpdError;

    fn try_from(x: u8) -> LldpdResult<Self> {
        match x {
            1 => Ok(AdminStatus::EnabledTxOnly),
            2 => Ok(AdminStatus::EnabledRxOnly),
            3 => Ok(AdminStatus::EnabledRxTx),
            4 => Ok(AdminStatus::Disabled),
            x => Err(errors::LldpdError::Invalid(format!(
                "invalid admin status: {x}"
            ))),
        }
    }
}

impl From<AdminStatus> for u8 {
    fn from(x: AdminStatus) -> u8 {
        x as u8
    }
}

impl FromStr for AdminStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "txonly" | "tx" => Ok(AdminStatus::EnabledTxOnly),
            "rxonly" | "rx" => Ok(AdminStatus::EnabledRxOnly),
            "rxtx" | "txrx" => Ok(AdminStatus::EnabledRxTx),
            "disabled" => Ok(AdminStatus::Disabled),
            _ => Err(format!("invalid admin status: {s}")),
        }
    }
}

impl fmt::Display for AdminStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            AdminStatus::EnabledTxOnly => "txonly",
            AdminStatus::EnabledRxOnly => "rxonly",
            AdminStatus::EnabledRxTx => "rxtx",
            AdminStatus::Disabled => "disabled",
        };
        write!(f, "{s}")
    }
}

#[test]
fn test_admin_status() {
    assert_eq!(AdminStatus::try_from(3).unwrap(), AdminStatus::EnabledRxTx);
    assert!(AdminStatus::try_from(0).is_err());
    assert!(AdminStatus::try_from(5).is_err());
    assert_eq!(u8::from(AdminStatus::Disabled), 4);
    assert_eq!("rx".parse::<AdminStatus>(), Ok(AdminStatus::EnabledRxOnly));
    assert!(!AdminStatus::EnabledTxOnly.has_rx());
    assert!(AdminStatus::EnabledTxOnly.has_tx());
    assert!(!AdminStatus::Disabled.has_tx());
}

#[test]
fn test_tx_ttl() {
    let mut agent = Agent::default();
    assert_eq!(agent.tx_ttl(), 120);
    agent.msg_tx_interval = 32768;
    agent.msg_tx_hold = 10;
    assert_eq!(agent.tx_ttl(), u16::MAX);
}
