// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! The transmit state machine, as described by section 10.5.4 and figure
//! 10-2 of the standard.

use std::fmt;

use slog::debug;
use slog::error;
use slog::trace;

use crate::agent::AgentContext;
use crate::mib;
use crate::types::LldpdResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxState {
    TxLldpInitialize,
    TxIdle,
    TxShutdownFrame,
    TxInfoFrame,
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            TxState::TxLldpInitialize => "TX_LLDP_INITIALIZE",
            TxState::TxIdle => "TX_IDLE",
            TxState::TxShutdownFrame => "TX_SHUTDOWN_FRAME",
            TxState::TxInfoFrame => "TX_INFO_FRAME",
        };
        write!(f, "{s}")
    }
}

pub(crate) fn init_tx_fsm(ctx: &mut AgentContext, idx: usize) {
    change_tx_state(ctx, idx, TxState::TxLldpInitialize);
}

pub(crate) fn tx_fsm(ctx: &mut AgentContext, idx: usize) {
    let port = &ctx.ports[idx];

    let next = if !port.port_enabled {
        // The global transition supersedes all other exit conditions
        (port.tx_state != TxState::TxLldpInitialize)
            .then_some(TxState::TxLldpInitialize)
    } else {
        match port.tx_state {
            TxState::TxLldpInitialize => {
                port.admin_status.has_tx().then_some(TxState::TxIdle)
            }
            TxState::TxIdle => {
                if !port.admin_status.has_tx() {
                    Some(TxState::TxShutdownFrame)
                } else if port.tx_delay_while == 0
                    && (port.tx_ttr == 0 || port.something_changed_local)
                {
                    Some(TxState::TxInfoFrame)
                } else {
                    None
                }
            }
            TxState::TxShutdownFrame => (port.tx_shutdown_while == 0)
                .then_some(TxState::TxLldpInitialize),
            TxState::TxInfoFrame => Some(TxState::TxIdle),
        }
    };

    if let Some(next) = next {
        change_tx_state(ctx, idx, next);
    }
}

pub(crate) fn change_tx_state(
    ctx: &mut AgentContext,
    idx: usize,
    new_state: TxState,
) {
    let port = &mut ctx.ports[idx];
    if port.tx_state != new_state {
        debug!(port.log, "TX state machine {} -> {}", port.tx_state, new_state);
    }
    port.tx_state = new_state;

    // Entry procedures run exactly once per state change
    match new_state {
        TxState::TxLldpInitialize => {
            port.tx_ttl = 0;
            port.tx_ttr = 0;
            port.tx_delay_while = 0;
        }
        TxState::TxIdle => {
            port.tx_ttl = ctx.agent.tx_ttl();
            port.tx_ttr = ctx.agent.msg_tx_interval;
            port.something_changed_local = false;
            port.tx_delay_while = ctx.agent.tx_delay;
        }
        TxState::TxShutdownFrame => {
            let frame = mib::build_shutdown_frame(&ctx.sysinfo, port);
            tx_frame(ctx, idx, frame);
            ctx.ports[idx].tx_shutdown_while = ctx.agent.reinit_delay;
        }
        TxState::TxInfoFrame => {
            let frame = mib::build_info_frame(&ctx.agent, &ctx.sysinfo, port);
            tx_frame(ctx, idx, frame);
        }
    }

    if ctx.ports[idx].port_enabled {
        ctx.busy = true;
    }
}

// Hand a frame to the transport.  Failures are logged and otherwise have no
// effect on the state machine.
fn tx_frame(ctx: &mut AgentContext, idx: usize, frame: LldpdResult<Vec<u8>>) {
    let port_index = ctx.ports[idx].port_index;
    let result =
        frame.and_then(|frame| ctx.transport.send(port_index, &frame));
    let port = &mut ctx.ports[idx];
    match result {
        Ok(()) => {
            trace!(port.log, "transmit LLDPDU");
            port.stats.frames_out_total += 1;
        }
        Err(e) => {
            error!(port.log, "failed to xmit lldpdu"; "err" => e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use protocol::packet::Packet;
    use protocol::types::Lldpdu;

    use super::*;
    use crate::agent::tests::running_agent;
    use crate::agent::tests::test_agent;
    use crate::rx_fsm::RxState;
    use crate::types;
    use crate::types::AdminStatus;

    fn decode(frame: &[u8]) -> Lldpdu {
        let packet = Packet::parse(frame).unwrap().unwrap();
        Lldpdu::decode(&packet.lldp_hdr.lldp_data).unwrap().lldpdu
    }

    #[test]
    fn test_end_to_end() {
        let agent = types::Agent {
            msg_tx_interval: 30,
            msg_tx_hold: 4,
            reinit_delay: 2,
            tx_delay: 2,
            ..Default::default()
        };
        let (mut ctx, recorder) = test_agent(agent, 1);
        ctx.ports[0].port_enabled = true;
        ctx.init_fsm();

        let port = ctx.port(1).unwrap();
        assert_eq!(port.tx_state, TxState::TxIdle);
        assert_eq!(port.tx_ttl, 120);
        assert_eq!(port.tx_ttr, 30);
        assert_eq!(port.tx_delay_while, 2);

        for tick in 1..30 {
            ctx.tick();
            assert_eq!(ctx.port(1).unwrap().tx_state, TxState::TxIdle);
            assert!(recorder.frames().is_empty(), "frame sent at tick {tick}");
        }
        assert_eq!(ctx.port(1).unwrap().tx_delay_while, 0);

        ctx.tick();
        let frames = recorder.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].0, 1);
        let lldpdu = decode(&frames[0].1);
        assert_eq!(lldpdu.ttl, 120);
        assert_eq!(lldpdu.system_name.as_deref(), Some("switch0"));

        let port = ctx.port(1).unwrap();
        assert_eq!(port.tx_state, TxState::TxIdle);
        assert_eq!(port.tx_ttr, 30);
        assert_eq!(port.tx_delay_while, 2);
        assert_eq!(port.stats.frames_out_total, 1);
    }

    #[test]
    fn test_periodic_transmission() {
        let (mut ctx, recorder) = running_agent(1);
        for _ in 0..90 {
            ctx.tick();
        }
        assert_eq!(recorder.frames().len(), 3);
        assert_eq!(ctx.port(1).unwrap().stats.frames_out_total, 3);
    }

    #[test]
    fn test_local_change_sends_immediately() {
        let (mut ctx, recorder) = running_agent(1);
        ctx.tick();
        ctx.tick();
        assert_eq!(ctx.port(1).unwrap().tx_delay_while, 0);
        assert_eq!(ctx.port(1).unwrap().tx_ttr, 28);

        ctx.set_system_name(Some("renamed".to_string()), true).unwrap();
        let frames = recorder.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(decode(&frames[0].1).system_name.as_deref(), Some("renamed"));

        let port = ctx.port(1).unwrap();
        assert_eq!(port.tx_ttr, 30);
        assert!(!port.something_changed_local);
    }

    #[test]
    fn test_tx_delay_holds_back_changes() {
        let (mut ctx, recorder) = running_agent(1);
        // tx_delay_while is still running from TX_IDLE entry
        ctx.set_system_name(Some("renamed".to_string()), true).unwrap();
        assert!(recorder.frames().is_empty());
        assert!(ctx.port(1).unwrap().something_changed_local);

        ctx.tick();
        assert!(recorder.frames().is_empty());
        ctx.tick();
        assert_eq!(recorder.frames().len(), 1);
    }

    #[test]
    fn test_shutdown_on_disable() {
        let (mut ctx, recorder) = running_agent(1);
        ctx.set_admin_status(1, AdminStatus::Disabled, true).unwrap();

        let port = ctx.port(1).unwrap();
        assert_eq!(port.tx_state, TxState::TxShutdownFrame);
        assert_eq!(port.tx_shutdown_while, 2);
        let frames = recorder.frames();
        assert_eq!(frames.len(), 1);
        let lldpdu = decode(&frames[0].1);
        assert_eq!(lldpdu.ttl, 0);
        assert_eq!(lldpdu.system_name, None);

        ctx.tick();
        assert_eq!(ctx.port(1).unwrap().tx_state, TxState::TxShutdownFrame);
        ctx.tick();
        let port = ctx.port(1).unwrap();
        assert_eq!(port.tx_state, TxState::TxLldpInitialize);
        assert_eq!(port.rx_state, RxState::RxLldpInitialize);
        assert_eq!(recorder.frames().len(), 1);

        // Nothing more is sent while disabled
        for _ in 0..60 {
            ctx.tick();
        }
        assert_eq!(recorder.frames().len(), 1);
    }

    #[test]
    fn test_reenable_after_shutdown() {
        let (mut ctx, recorder) = running_agent(1);
        ctx.set_admin_status(1, AdminStatus::EnabledRxOnly, true).unwrap();
        ctx.tick();
        ctx.tick();
        assert_eq!(ctx.port(1).unwrap().tx_state, TxState::TxLldpInitialize);

        ctx.set_admin_status(1, AdminStatus::EnabledRxTx, true).unwrap();
        let port = ctx.port(1).unwrap();
        assert_eq!(port.tx_state, TxState::TxIdle);
        assert_eq!(port.rx_state, RxState::RxWaitForFrame);
        assert_eq!(recorder.frames().len(), 1);
    }

    #[test]
    fn test_global_preemption() {
        let (mut ctx, recorder) = running_agent(1);
        ctx.set_admin_status(1, AdminStatus::Disabled, true).unwrap();
        assert_eq!(ctx.port(1).unwrap().tx_state, TxState::TxShutdownFrame);

        // The shutdown timer is still running, but the link going down wins
        ctx.set_port_enabled(1, false).unwrap();
        let port = ctx.port(1).unwrap();
        assert_eq!(port.tx_state, TxState::TxLldpInitialize);
        assert_eq!(port.rx_state, RxState::LldpWaitPortOperational);
        assert_eq!(port.tx_ttr, 0);
        assert_eq!(port.tx_delay_while, 0);
        assert_eq!(recorder.frames().len(), 1);
    }

    #[test]
    fn test_preemption_from_idle() {
        let (mut ctx, _) = running_agent(2);
        ctx.set_port_enabled(2, false).unwrap();
        assert_eq!(ctx.port(2).unwrap().tx_state, TxState::TxLldpInitialize);
        assert_eq!(
            ctx.port(2).unwrap().rx_state,
            RxState::LldpWaitPortOperational
        );
        // The other port is unaffected
        assert_eq!(ctx.port(1).unwrap().tx_state, TxState::TxIdle);
        assert_eq!(ctx.port(1).unwrap().rx_state, RxState::RxWaitForFrame);

        ctx.set_port_enabled(2, true).unwrap();
        assert_eq!(ctx.port(2).unwrap().tx_state, TxState::TxIdle);
        assert_eq!(ctx.port(2).unwrap().rx_state, RxState::RxWaitForFrame);
    }

    #[test]
    fn test_transmit_failure_not_counted() {
        let (mut ctx, recorder) = running_agent(1);
        recorder.set_failing(true);
        for _ in 0..30 {
            ctx.tick();
        }
        let port = ctx.port(1).unwrap();
        assert_eq!(port.tx_state, TxState::TxIdle);
        assert_eq!(port.tx_ttr, 30);
        assert_eq!(port.stats.frames_out_total, 0);
    }
}
