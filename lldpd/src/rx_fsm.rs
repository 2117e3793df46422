// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! The receive state machine, as described by section 10.5.5 and figure
//! 10-3 of the standard.

use std::collections::btree_map::Entry;
use std::fmt;

use chrono::Utc;
use slog::debug;
use slog::info;
use slog::trace;

use protocol::packet::Packet;
use protocol::types::Lldpdu;

use crate::agent::AgentContext;
use crate::neighbors::Neighbor;
use crate::neighbors::NeighborId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RxState {
    LldpWaitPortOperational,
    DeleteAgedInfo,
    RxLldpInitialize,
    RxWaitForFrame,
    RxFrame,
    DeleteInfo,
    UpdateInfo,
}

impl fmt::Display for RxState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            RxState::LldpWaitPortOperational => "LLDP_WAIT_PORT_OPERATIONAL",
            RxState::DeleteAgedInfo => "DELETE_AGED_INFO",
            RxState::RxLldpInitialize => "RX_LLDP_INITIALIZE",
            RxState::RxWaitForFrame => "RX_WAIT_FOR_FRAME",
            RxState::RxFrame => "RX_FRAME",
            RxState::DeleteInfo => "DELETE_INFO",
            RxState::UpdateInfo => "UPDATE_INFO",
        };
        write!(f, "{s}")
    }
}

/// What RX_FRAME decided to do with the frame it processed, carried over
/// to the DELETE_INFO or UPDATE_INFO state.
#[derive(Clone, Debug)]
pub(crate) enum RxPending {
    /// Insert or replace the neighbor advertising this LLDPDU
    Update(Box<Lldpdu>),
    /// The neighbor sent a shutdown LLDPDU
    Shutdown(NeighborId),
}

pub(crate) fn init_rx_fsm(ctx: &mut AgentContext, idx: usize) {
    change_rx_state(ctx, idx, RxState::RxLldpInitialize);
}

pub(crate) fn rx_fsm(ctx: &mut AgentContext, idx: usize) {
    let port = &ctx.ports[idx];

    // The global transition supersedes all other exit conditions
    let next = if !port.rx_info_age && !port.port_enabled {
        (port.rx_state != RxState::LldpWaitPortOperational)
            .then_some(RxState::LldpWaitPortOperational)
    } else {
        match port.rx_state {
            RxState::LldpWaitPortOperational => {
                if port.rx_info_age {
                    Some(RxState::DeleteAgedInfo)
                } else if port.port_enabled {
                    Some(RxState::RxLldpInitialize)
                } else {
                    None
                }
            }
            RxState::DeleteAgedInfo => Some(RxState::LldpWaitPortOperational),
            RxState::RxLldpInitialize => port
                .admin_status
                .has_rx()
                .then_some(RxState::RxWaitForFrame),
            RxState::RxWaitForFrame => {
                if port.rx_info_age {
                    Some(RxState::DeleteInfo)
                } else if !port.admin_status.has_rx() {
                    Some(RxState::RxLldpInitialize)
                } else if port.rcv_frame {
                    Some(RxState::RxFrame)
                } else {
                    None
                }
            }
            RxState::RxFrame => {
                if port.bad_frame {
                    Some(RxState::RxWaitForFrame)
                } else if port.rx_ttl == 0 {
                    Some(RxState::DeleteInfo)
                } else if port.rx_changes {
                    Some(RxState::UpdateInfo)
                } else {
                    Some(RxState::RxWaitForFrame)
                }
            }
            RxState::DeleteInfo | RxState::UpdateInfo => {
                Some(RxState::RxWaitForFrame)
            }
        }
    };

    if let Some(next) = next {
        change_rx_state(ctx, idx, next);
    }
}

pub(crate) fn change_rx_state(
    ctx: &mut AgentContext,
    idx: usize,
    new_state: RxState,
) {
    let port = &mut ctx.ports[idx];
    if port.rx_state != new_state {
        debug!(port.log, "RX state machine {} -> {}", port.rx_state, new_state);
    }
    port.rx_state = new_state;

    // Entry procedures run exactly once per state change
    match new_state {
        RxState::LldpWaitPortOperational => {}
        RxState::DeleteAgedInfo => {
            delete_aged(ctx, idx);
            let port = &mut ctx.ports[idx];
            port.rx_info_age = false;
            port.something_changed_remote = true;
        }
        RxState::RxLldpInitialize => rx_initialize(ctx, idx),
        RxState::RxWaitForFrame => {
            let port = &mut ctx.ports[idx];
            port.bad_frame = false;
            port.rx_info_age = false;
            port.something_changed_remote = false;
        }
        RxState::RxFrame => rx_process_frame(ctx, idx),
        RxState::DeleteInfo => {
            delete_aged(ctx, idx);
            if let Some(RxPending::Shutdown(id)) = ctx.ports[idx].rx_pending.take()
            {
                delete_neighbor(ctx, idx, &id);
            }
            ctx.ports[idx].something_changed_remote = true;
        }
        RxState::UpdateInfo => {
            if let Some(RxPending::Update(lldpdu)) = ctx.ports[idx].rx_pending.take()
            {
                update_neighbor(ctx, idx, *lldpdu);
            }
            ctx.ports[idx].something_changed_remote = true;
        }
    }

    // The notification itself is sent from the tick, subject to the
    // notification interval.
    let port = &ctx.ports[idx];
    if port.something_changed_remote && port.notification_enable {
        ctx.notification_pending = true;
    }

    if ctx.ports[idx].port_enabled {
        ctx.busy = true;
    }
}

// Forget everything we know about the port's neighbors.
fn rx_initialize(ctx: &mut AgentContext, idx: usize) {
    let port = &mut ctx.ports[idx];
    port.rcv_frame = false;
    port.rx_frame = None;
    port.rx_pending = None;
    let deleted = std::mem::take(&mut port.neighbors).len();
    if deleted > 0 {
        debug!(port.log, "flushed {deleted} neighbors");
        ctx.remote.deletes += deleted as u64;
        ctx.remote_changed(idx);
    }
}

// Remove every neighbor whose information has expired, counting each as an
// ageout.
fn delete_aged(ctx: &mut AgentContext, idx: usize) {
    let port = &mut ctx.ports[idx];
    let mut aged = 0;
    port.neighbors.retain(|id, n| {
        if n.rx_info_ttl == 0 {
            info!(port.log, "neighbor {id} TTL expired";
                "last_seen" => n.last_seen.to_rfc3339());
            aged += 1;
            false
        } else {
            true
        }
    });
    if aged > 0 {
        port.stats.ageouts_total += aged;
        ctx.remote.ageouts += aged;
        ctx.remote.deletes += aged;
        ctx.remote_changed(idx);
    }
}

fn delete_neighbor(ctx: &mut AgentContext, idx: usize, id: &NeighborId) {
    let port = &mut ctx.ports[idx];
    if port.neighbors.remove(id).is_some() {
        info!(port.log, "neighbor {id} shut down");
        ctx.remote.deletes += 1;
        ctx.remote_changed(idx);
    }
}

fn update_neighbor(ctx: &mut AgentContext, idx: usize, lldpdu: Lldpdu) {
    let id = NeighborId::new(&lldpdu);
    let time_mark = ctx.sys_time;
    let port = &mut ctx.ports[idx];
    match port.neighbors.entry(id.clone()) {
        Entry::Vacant(e) => {
            let rem_index = ctx.next_rem_index;
            ctx.next_rem_index = ctx.next_rem_index.wrapping_add(1).max(1);
            let n = e.insert(Neighbor::from_lldpdu(lldpdu, rem_index, time_mark));
            info!(port.log, "new neighbor {id}";
                "name" => n.system_name().unwrap_or_default().to_string(),
                "first_seen" => n.first_seen.to_rfc3339());
            ctx.remote.inserts += 1;
        }
        Entry::Occupied(e) => {
            let n = e.into_mut();
            let unchanged_for = Utc::now() - n.last_changed;
            n.update(lldpdu, time_mark);
            info!(port.log, "updated neighbor {id}";
                "first_seen" => n.first_seen.to_rfc3339(),
                "unchanged_secs" => unchanged_for.num_seconds());
        }
    }
    ctx.remote_changed(idx);
}

// The RX_FRAME entry procedure: validate the frame and decide whether it
// refreshes, changes, or removes what we know about its sender.
fn rx_process_frame(ctx: &mut AgentContext, idx: usize) {
    let max_neighbors = ctx.agent.max_neighbors;
    let port = &mut ctx.ports[idx];
    port.rx_changes = false;
    port.rcv_frame = false;
    port.rx_pending = None;

    let Some(frame) = port.rx_frame.take() else {
        return;
    };
    port.stats.frames_in_total += 1;

    let decoded = match Packet::parse(&frame).and_then(|packet| match packet {
        Some(p) => Lldpdu::decode(&p.lldp_hdr.lldp_data),
        None => Err(protocol::types::Error::Invalid(
            "not an LLDP frame".to_string(),
        )),
    }) {
        Ok(d) => d,
        Err(e) => {
            debug!(port.log, "discarding bad LLDPDU"; "err" => e.to_string());
            port.bad_frame = true;
            port.stats.frames_discarded_total += 1;
            port.stats.frames_in_errors_total += 1;
            return;
        }
    };

    port.stats.tlvs_discarded_total += decoded.tlvs_discarded as u64;
    port.stats.tlvs_unrecognized_total += decoded.tlvs_unrecognized as u64;

    let lldpdu = decoded.lldpdu;
    let id = NeighborId::new(&lldpdu);
    port.rx_ttl = lldpdu.ttl;
    if lldpdu.ttl == 0 {
        port.rx_pending = Some(RxPending::Shutdown(id));
        return;
    }

    let table_full = port.neighbors.len() >= max_neighbors;
    match port.neighbors.get_mut(&id) {
        Some(n) if n.lldpdu == lldpdu => {
            trace!(port.log, "refresh neighbor {id}");
            n.refresh(lldpdu.ttl);
        }
        Some(_) => {
            port.rx_changes = true;
            port.rx_pending = Some(RxPending::Update(Box::new(lldpdu)));
        }
        None if table_full => {
            debug!(port.log, "no room for neighbor {id}");
            port.stats.frames_discarded_total += 1;
            ctx.remote.drops += 1;
        }
        None => {
            port.rx_changes = true;
            port.rx_pending = Some(RxPending::Update(Box::new(lldpdu)));
        }
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use protocol::types::ChassisId;
    use protocol::types::PortId;
    use protocol::MacAddr;

    use super::*;
    use crate::agent::tests::running_agent;
    use crate::mib::tests::peer_frame;
    use crate::mib::tests::peer_frame_from;
    use crate::types;

    #[test]
    fn test_new_neighbor() {
        let (mut ctx, _) = running_agent(1);
        ctx.process_frame(1, &peer_frame(120));

        let port = ctx.port(1).unwrap();
        assert_eq!(port.rx_state, RxState::RxWaitForFrame);
        assert_eq!(port.stats.frames_in_total, 1);
        assert_eq!(port.neighbors.len(), 1);
        let n = port.neighbors.values().next().unwrap();
        assert_eq!(n.rx_info_ttl, 120);
        assert_eq!(n.rem_index, 1);
        assert_eq!(n.system_name(), Some("peer"));
        assert_eq!(ctx.remote.inserts, 1);
        assert!(!ctx.busy());
    }

    #[test]
    fn test_wire_frame() {
        let (mut ctx, _) = running_agent(1);
        let frame = hex!(
            "0180 c200 000e 0007 436c f0d7 88cc"
            "0207 0400 0743 6cf0 d7"
            "0405 0565 7468 30"
            "0602 0078"
            "0a02 7377"
            "0000"
        );
        ctx.process_frame(1, &frame);

        let port = ctx.port(1).unwrap();
        let n = port.neighbors.values().next().unwrap();
        assert_eq!(
            n.chassis_id(),
            &ChassisId::MacAddress(MacAddr::new(0x00, 0x07, 0x43, 0x6c, 0xf0, 0xd7))
        );
        assert_eq!(n.port_id(), &PortId::InterfaceName("eth0".into()));
        assert_eq!(n.system_name(), Some("sw"));
        assert_eq!(n.rx_info_ttl, 120);
    }

    #[test]
    fn test_refresh_is_not_a_change() {
        let (mut ctx, _) = running_agent(1);
        ctx.process_frame(1, &peer_frame(120));
        for _ in 0..10 {
            ctx.tick();
        }
        assert_eq!(
            ctx.port(1).unwrap().neighbors.values().next().unwrap().rx_info_ttl,
            110
        );
        let last_change = ctx.remote.last_change_time;

        ctx.process_frame(1, &peer_frame(120));
        let port = ctx.port(1).unwrap();
        let n = port.neighbors.values().next().unwrap();
        assert_eq!(n.rx_info_ttl, 120);
        assert_eq!(n.time_mark, 0);
        assert_eq!(ctx.remote.inserts, 1);
        assert_eq!(ctx.remote.last_change_time, last_change);
        assert_eq!(port.stats.frames_in_total, 2);
    }

    #[test]
    fn test_remote_change_latches_notification() {
        let (mut ctx, _) = running_agent(2);
        ctx.set_notification_enable(1, true, true).unwrap();

        ctx.process_frame(2, &peer_frame(120));
        assert!(!ctx.notification_pending);

        ctx.process_frame(1, &peer_frame(120));
        assert!(ctx.notification_pending);
        // Cleared again once the machine is waiting for the next frame
        assert!(!ctx.port(1).unwrap().something_changed_remote);

        ctx.notification_pending = false;
        ctx.process_frame(1, &peer_frame(120));
        assert!(!ctx.notification_pending);
    }

    #[test]
    fn test_changed_neighbor() {
        let (mut ctx, _) = running_agent(1);
        ctx.process_frame(1, &peer_frame(120));
        ctx.tick();
        ctx.process_frame(1, &peer_frame(60));

        let port = ctx.port(1).unwrap();
        assert_eq!(port.neighbors.len(), 1);
        let n = port.neighbors.values().next().unwrap();
        assert_eq!(n.lldpdu.ttl, 60);
        assert_eq!(n.rem_index, 1);
        assert_eq!(n.time_mark, 1);
        assert_eq!(ctx.remote.inserts, 1);
        assert_eq!(ctx.remote.last_change_time, 1);
    }

    #[test]
    fn test_shutdown_frame_deletes_neighbor() {
        let (mut ctx, _) = running_agent(1);
        ctx.process_frame(1, &peer_frame(120));
        assert_eq!(ctx.port(1).unwrap().neighbors.len(), 1);

        ctx.process_frame(1, &peer_frame(0));
        let port = ctx.port(1).unwrap();
        assert!(port.neighbors.is_empty());
        assert_eq!(port.rx_state, RxState::RxWaitForFrame);
        assert_eq!(port.stats.ageouts_total, 0);
        assert_eq!(ctx.remote.deletes, 1);
        assert_eq!(ctx.remote.ageouts, 0);
    }

    #[test]
    fn test_bad_frame_counted() {
        let (mut ctx, _) = running_agent(1);
        // Chassis ID with no payload
        let mut frame = peer_frame(120);
        frame.truncate(14);
        frame.extend_from_slice(&[0x02, 0x00, 0x00, 0x00]);
        ctx.process_frame(1, &frame);

        let port = ctx.port(1).unwrap();
        assert_eq!(port.rx_state, RxState::RxWaitForFrame);
        assert!(!port.bad_frame);
        assert_eq!(port.stats.frames_in_total, 1);
        assert_eq!(port.stats.frames_in_errors_total, 1);
        assert_eq!(port.stats.frames_discarded_total, 1);
        assert!(port.neighbors.is_empty());

        // The machine carries on with the next frame
        ctx.process_frame(1, &peer_frame(120));
        let port = ctx.port(1).unwrap();
        assert_eq!(port.neighbors.len(), 1);
        assert_eq!(port.stats.frames_in_errors_total, 1);
    }

    #[test]
    fn test_tolerated_tlvs_counted() {
        let (mut ctx, _) = running_agent(1);
        let mut frame = peer_frame(120);
        let end = frame.len() - 2;
        // a reserved TLV type, and a truncated capabilities TLV
        let tail = frame.split_off(end);
        frame.extend_from_slice(&[0x12, 0x02, 0xaa, 0xbb, 0x0e, 0x02, 0x00, 0x14]);
        frame.extend_from_slice(&tail);
        ctx.process_frame(1, &frame);

        let port = ctx.port(1).unwrap();
        assert_eq!(port.neighbors.len(), 1);
        assert_eq!(port.stats.tlvs_unrecognized_total, 1);
        assert_eq!(port.stats.tlvs_discarded_total, 1);
        assert_eq!(port.stats.frames_in_errors_total, 0);
    }

    #[test]
    fn test_table_overflow() {
        let agent = types::Agent {
            max_neighbors: 1,
            ..Default::default()
        };
        let (mut ctx, _) = crate::agent::tests::test_agent(agent, 1);
        ctx.ports[0].port_enabled = true;
        ctx.init_fsm();

        ctx.process_frame(1, &peer_frame_from("peer-a", 120));
        ctx.process_frame(1, &peer_frame_from("peer-b", 120));

        let port = ctx.port(1).unwrap();
        assert_eq!(port.neighbors.len(), 1);
        assert_eq!(port.stats.frames_discarded_total, 1);
        assert_eq!(port.stats.frames_in_errors_total, 0);
        assert_eq!(ctx.remote.drops, 1);
        assert_eq!(ctx.remote.inserts, 1);
    }

    #[test]
    fn test_aging() {
        let (mut ctx, _) = running_agent(1);
        ctx.process_frame(1, &peer_frame(3));
        ctx.tick();
        ctx.tick();
        assert_eq!(ctx.port(1).unwrap().neighbors.len(), 1);
        ctx.tick();

        let port = ctx.port(1).unwrap();
        assert!(port.neighbors.is_empty());
        assert!(!port.rx_info_age);
        assert_eq!(port.rx_state, RxState::RxWaitForFrame);
        assert_eq!(port.stats.ageouts_total, 1);
        assert_eq!(ctx.remote.ageouts, 1);
        assert_eq!(ctx.remote.deletes, 1);
    }

    #[test]
    fn test_aging_while_port_down_is_idempotent() {
        let (mut ctx, _) = running_agent(1);
        ctx.process_frame(1, &peer_frame(2));
        ctx.set_port_enabled(1, false).unwrap();
        assert_eq!(ctx.port(1).unwrap().rx_state, RxState::LldpWaitPortOperational);
        // The neighbor survives the link going down, until it ages out
        assert_eq!(ctx.port(1).unwrap().neighbors.len(), 1);

        ctx.tick();
        ctx.tick();
        let port = ctx.port(1).unwrap();
        assert!(port.neighbors.is_empty());
        assert_eq!(port.rx_state, RxState::DeleteAgedInfo);
        assert_eq!(port.stats.ageouts_total, 1);

        for _ in 0..3 {
            ctx.fsm();
            ctx.tick();
        }
        let port = ctx.port(1).unwrap();
        assert_eq!(port.rx_state, RxState::LldpWaitPortOperational);
        assert_eq!(port.stats.ageouts_total, 1);
        assert_eq!(ctx.remote.ageouts, 1);
        assert_eq!(ctx.remote.deletes, 1);
    }

    #[test]
    fn test_rx_disable_flushes_neighbors() {
        let (mut ctx, _) = running_agent(1);
        ctx.process_frame(1, &peer_frame(120));
        ctx.set_admin_status(1, types::AdminStatus::EnabledTxOnly, true)
            .unwrap();

        let port = ctx.port(1).unwrap();
        assert_eq!(port.rx_state, RxState::RxLldpInitialize);
        assert!(port.neighbors.is_empty());
        assert_eq!(ctx.remote.deletes, 1);
        assert_eq!(ctx.remote.ageouts, 0);
    }
}
