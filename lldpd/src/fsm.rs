// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! The agent-level dispatcher that runs every port's state machines to a
//! fixed point.

use slog::error;

use crate::agent::AgentContext;
use crate::rx_fsm;
use crate::tx_fsm;

/// Each dispatch pass performs at least one transition on some port, and no
/// machine can make more than a handful of transitions without an external
/// event.  Needing more passes than this means the machines are looping.
pub const FSM_PASS_SLACK: u32 = 16;

/// Put every port's machines into their initial states, then run them.
pub fn init_fsm(ctx: &mut AgentContext) {
    for idx in 0..ctx.ports.len() {
        rx_fsm::init_rx_fsm(ctx, idx);
        tx_fsm::init_tx_fsm(ctx, idx);
    }
    lldp_fsm(ctx);
}

/// Run the RX machines of all ports and then, if none of them changed
/// state, the TX machines of all ports.  Repeat until a full pass makes no
/// transitions.
pub fn lldp_fsm(ctx: &mut AgentContext) {
    let limit = ctx.ports.len() as u32 + FSM_PASS_SLACK;
    let mut passes = 0;

    loop {
        passes += 1;
        ctx.busy = false;

        for idx in 0..ctx.ports.len() {
            rx_fsm::rx_fsm(ctx, idx);
        }
        if !ctx.busy {
            for idx in 0..ctx.ports.len() {
                tx_fsm::tx_fsm(ctx, idx);
            }
        }

        if !ctx.busy {
            break;
        }
        if passes >= limit {
            fsm_error(ctx, passes);
            break;
        }
    }
    ctx.last_passes = passes;
}

// The machines failed to settle.  This can only result from a logic error,
// so there is nothing to do beyond reporting it.
fn fsm_error(ctx: &mut AgentContext, passes: u32) {
    ctx.fsm_errors += 1;
    ctx.busy = false;
    let states = ctx
        .ports
        .iter()
        .map(|p| format!("{}:{}/{}", p.port_index, p.rx_state, p.tx_state))
        .collect::<Vec<String>>()
        .join(" ");
    error!(ctx.log, "state machines failed to converge";
        "passes" => passes,
        "states" => states);
}
