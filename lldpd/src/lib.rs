// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! An IEEE 802.1AB LLDP agent.  Each port runs a receive and a transmit
//! state machine, and the agent drives all of them to quiescence whenever
//! a timer expires, a frame arrives, or the configuration changes.

pub mod agent;
pub mod errors;
pub mod fsm;
pub mod mgmt;
pub mod mib;
pub mod neighbors;
pub mod port;
pub mod rx_fsm;
pub mod transport;
pub mod tx_fsm;
pub mod types;

pub use agent::AgentContext;
pub use errors::LldpdError;
pub use mgmt::LldpAgent;
pub use types::LldpdResult;
