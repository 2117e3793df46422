// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! The remote systems MIB: what we have learned about our neighbors.

use std::fmt;

use chrono::DateTime;
use chrono::Utc;

use protocol::types::ChassisId;
use protocol::types::Lldpdu;
use protocol::types::ManagementAddress;
use protocol::types::NetworkAddress;
use protocol::types::PortId;

/// A neighbor is identified by its MSAP: the chassis ID and port ID it
/// advertises.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct NeighborId {
    pub chassis_id: ChassisId,
    pub port_id: PortId,
}

impl NeighborId {
    pub fn new(lldpdu: &Lldpdu) -> Self {
        NeighborId {
            chassis_id: lldpdu.chassis_id.clone(),
            port_id: lldpdu.port_id.clone(),
        }
    }
}

impl fmt::Display for NeighborId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} / {}", self.chassis_id, self.port_id)
    }
}

/// This struct is used to record information about a neighbor whose
/// advertisements we have received.
#[derive(Clone, Debug)]
pub struct Neighbor {
    /// Index assigned when the neighbor was first seen, as used by the
    /// lldpRemIndex MIB object
    pub rem_index: u32,
    /// Agent uptime when this entry was last created or modified
    pub time_mark: u32,
    /// Seconds until this information expires
    pub rx_info_ttl: u16,
    /// When the neighbor was first seen.  Note: this is reset if the
    /// neighbor's TTL expires and we subsequently rediscover it.
    pub first_seen: DateTime<Utc>,
    /// When we last received an advertisement from this system.
    pub last_seen: DateTime<Utc>,
    /// When the data advertised by this system last changed
    pub last_changed: DateTime<Utc>,

    /// The latest advertised data received from this neighbor
    pub lldpdu: Lldpdu,
}

impl Neighbor {
    pub fn from_lldpdu(lldpdu: Lldpdu, rem_index: u32, time_mark: u32) -> Self {
        let now = Utc::now();

        Neighbor {
            rem_index,
            time_mark,
            rx_info_ttl: lldpdu.ttl,
            first_seen: now,
            last_seen: now,
            last_changed: now,
            lldpdu,
        }
    }

    /// An identical LLDPDU arrived: restart the TTL countdown.
    pub fn refresh(&mut self, ttl: u16) {
        self.rx_info_ttl = ttl;
        self.last_seen = Utc::now();
    }

    /// The neighbor's advertised information changed.
    pub fn update(&mut self, lldpdu: Lldpdu, time_mark: u32) {
        let now = Utc::now();
        self.rx_info_ttl = lldpdu.ttl;
        self.time_mark = time_mark;
        self.last_seen = now;
        self.last_changed = now;
        self.lldpdu = lldpdu;
    }

    pub fn chassis_id(&self) -> &ChassisId {
        &self.lldpdu.chassis_id
    }

    pub fn port_id(&self) -> &PortId {
        &self.lldpdu.port_id
    }

    pub fn port_description(&self) -> Option<&str> {
        self.lldpdu.port_description.as_deref()
    }

    pub fn system_name(&self) -> Option<&str> {
        self.lldpdu.system_name.as_deref()
    }

    pub fn system_description(&self) -> Option<&str> {
        self.lldpdu.system_description.as_deref()
    }

    /// The supported and enabled capability bitmasks.  A neighbor that
    /// didn't advertise its capabilities reports none.
    pub fn system_capabilities(&self) -> (u16, u16) {
        match &self.lldpdu.system_capabilities {
            Some((avail, enabled)) => (
                protocol::types::capabilities_to_u16(avail),
                protocol::types::capabilities_to_u16(enabled),
            ),
            None => (0, 0),
        }
    }

    pub fn find_management_address(
        &self,
        addr: &NetworkAddress,
    ) -> Option<usize> {
        self.lldpdu
            .management_addresses
            .iter()
            .position(|ma| &ma.addr == addr)
    }

    pub fn management_address(&self, index: usize) -> Option<&ManagementAddress> {
        self.lldpdu.management_addresses.get(index)
    }

    /// Return the information string of the index'th unrecognized TLV with
    /// the given type.
    pub fn unknown_tlv(&self, tlv_type: u8, index: usize) -> Option<&[u8]> {
        self.lldpdu
            .unknown_tlvs
            .iter()
            .filter(|t| t.tlv_type == tlv_type)
            .nth(index)
            .map(|t| t.info.as_slice())
    }

    /// Return the information string of the index'th organizationally
    /// specific TLV with the given OUI and subtype.
    pub fn org_def_info(
        &self,
        oui: u32,
        subtype: u8,
        index: usize,
    ) -> Option<&[u8]> {
        self.lldpdu
            .organizationally_specific
            .iter()
            .filter(|os| os.oui_u32() == oui && os.subtype == subtype)
            .nth(index)
            .map(|os| os.info.as_slice())
    }
}
