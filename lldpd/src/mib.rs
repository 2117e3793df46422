// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! The local systems MIB, and construction of the LLDPDUs that advertise it.

use std::collections::BTreeSet;

use protocol::packet::EthHdr;
use protocol::packet::LldpTlv;
use protocol::packet::Packet;
use protocol::packet::ETHER_LLDP;
use protocol::types as protocol_types;
use protocol::types::ChassisId;
use protocol::types::Lldpdu;
use protocol::types::ManagementAddress;
use protocol::types::Scope;
use protocol::types::SystemCapabilities;
use protocol::types::TlvType;
use protocol::MacAddr;

use crate::errors::LldpdError;
use crate::port::PortEntry;
use crate::port::TlvFilter;
use crate::types::Agent;
use crate::types::LldpdResult;

/// Largest LLDPDU that fits in an untagged ethernet frame
pub const MAX_LLDPDU_SIZE: usize = 1500;

/// Information about this system, advertised on every port
#[derive(Debug, Clone)]
pub struct SystemInfo {
    pub chassis_id: ChassisId,
    pub system_name: Option<String>,
    pub system_description: Option<String>,
    pub capabilities:
        Option<(BTreeSet<SystemCapabilities>, BTreeSet<SystemCapabilities>)>,
    pub management_addresses: Vec<ManagementAddress>,
}

fn invalid(e: protocol_types::Error) -> LldpdError {
    LldpdError::Invalid(e.to_string())
}

impl SystemInfo {
    pub fn new(chassis_id: ChassisId) -> Self {
        SystemInfo {
            chassis_id,
            system_name: None,
            system_description: None,
            capabilities: None,
            management_addresses: Vec::new(),
        }
    }

    /// Verify that everything here can be encoded in an LLDPDU.
    pub fn validate(&self) -> LldpdResult<()> {
        LldpTlv::try_from(&self.chassis_id).map_err(invalid)?;
        if let Some(name) = &self.system_name {
            protocol_types::string_to_tlv(TlvType::SystemName, name)
                .map_err(invalid)?;
        }
        if let Some(desc) = &self.system_description {
            protocol_types::string_to_tlv(TlvType::SystemDescription, desc)
                .map_err(invalid)?;
        }
        if let Some((avail, enabled)) = &self.capabilities {
            protocol_types::capabilities_to_tlv(avail, enabled)
                .map_err(invalid)?;
        }
        for ma in &self.management_addresses {
            LldpTlv::try_from(ma).map_err(invalid)?;
        }
        Ok(())
    }
}

/// Verify that the per-port information can be encoded in an LLDPDU.
pub fn validate_port(port: &PortEntry) -> LldpdResult<()> {
    LldpTlv::try_from(&port.port_id).map_err(invalid)?;
    if let Some(desc) = &port.port_description {
        protocol_types::string_to_tlv(TlvType::PortDescription, desc)
            .map_err(invalid)?;
    }
    Ok(())
}

/// Construct an LLDPDU with all of the information we want to advertise on
/// this port, subject to the port's TLV filter.
pub fn build_lldpdu(
    agent: &Agent,
    sysinfo: &SystemInfo,
    port: &PortEntry,
) -> Lldpdu {
    let filter = port.tlv_filter;
    let mut lldpdu = Lldpdu::new(
        sysinfo.chassis_id.clone(),
        port.port_id.clone(),
        agent.tx_ttl(),
    );
    if filter.contains(TlvFilter::PORT_DESC) {
        lldpdu.port_description = port.port_description.clone();
    }
    if filter.contains(TlvFilter::SYS_NAME) {
        lldpdu.system_name = sysinfo.system_name.clone();
    }
    if filter.contains(TlvFilter::SYS_DESC) {
        lldpdu.system_description = sysinfo.system_description.clone();
    }
    if filter.contains(TlvFilter::SYS_CAP) {
        lldpdu.system_capabilities = sysinfo.capabilities.clone();
    }
    lldpdu.management_addresses = sysinfo.management_addresses.clone();
    lldpdu
}

// Wrap the TLVs in an ethernet frame addressed to the nearest bridge
fn build_frame(src: MacAddr, tlvs: &[LldpTlv]) -> LldpdResult<Vec<u8>> {
    let mut packet = Packet::new(Scope::Bridge.into(), src);
    tlvs.iter().for_each(|tlv| packet.add_tlv(tlv));
    let size = packet.lldp_hdr.size();
    if size > MAX_LLDPDU_SIZE {
        return Err(LldpdError::Protocol(format!(
            "LLDPDU of {size} bytes exceeds {MAX_LLDPDU_SIZE}"
        )));
    }
    Ok(packet.deparse())
}

/// Construct an information LLDPDU frame reflecting the current local MIB.
pub fn build_info_frame(
    agent: &Agent,
    sysinfo: &SystemInfo,
    port: &PortEntry,
) -> LldpdResult<Vec<u8>> {
    let lldpdu = build_lldpdu(agent, sysinfo, port);
    let tlvs: Vec<LldpTlv> = (&lldpdu).try_into()?;
    build_frame(port.mac, &tlvs)
}

/// Construct a shutdown LLDPDU frame: our chassis ID and port ID, with a TTL
/// of 0 to notify neighbors that this port is going away immediately.
pub fn build_shutdown_frame(
    sysinfo: &SystemInfo,
    port: &PortEntry,
) -> LldpdResult<Vec<u8>> {
    let tlvs = vec![
        LldpTlv::try_from(&sysinfo.chassis_id)?,
        LldpTlv::try_from(&port.port_id)?,
        protocol_types::ttl_to_tlv(0),
        LldpTlv::new(TlvType::EndOfLLDPDU.into(), &[])?,
    ];
    build_frame(port.mac, &tlvs)
}

/// Is this frame addressed to one of the LLDP group addresses, carrying
/// the LLDP ethertype?
pub fn is_lldp_frame(frame: &[u8]) -> bool {
    EthHdr::parse(frame)
        .map(|hdr| {
            hdr.eth_type == ETHER_LLDP && Scope::is_lldp_addr(hdr.eth_dmac)
        })
        .unwrap_or(false)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::net::IpAddr;
    use std::net::Ipv4Addr;

    use protocol::types::InterfaceNum;
    use protocol::types::PortId;

    use super::*;
    use crate::agent::tests::running_agent;

    /// An LLDPDU frame from a neighbor, ending with the system name "peer"
    /// and the End TLV.
    pub fn peer_frame_from(chassis: &str, ttl: u16) -> Vec<u8> {
        let mut lldpdu = Lldpdu::new(
            ChassisId::LocallyAssigned(chassis.to_string()),
            PortId::InterfaceName("eth0".to_string()),
            ttl,
        );
        lldpdu.system_name = Some("peer".to_string());
        let tlvs: Vec<LldpTlv> = (&lldpdu).try_into().unwrap();
        build_frame(MacAddr::new(0x02, 0, 0, 0, 0, 0x99), &tlvs).unwrap()
    }

    pub fn peer_frame(ttl: u16) -> Vec<u8> {
        peer_frame_from("peer", ttl)
    }

    fn decode(frame: &[u8]) -> Lldpdu {
        let packet = Packet::parse(frame).unwrap().unwrap();
        assert_eq!(packet.eth_hdr.eth_dmac, MacAddr::from(Scope::Bridge));
        Lldpdu::decode(&packet.lldp_hdr.lldp_data).unwrap().lldpdu
    }

    #[test]
    fn test_info_lldpdu() {
        let (mut ctx, _) = running_agent(1);
        ctx.sysinfo.management_addresses.push(ManagementAddress {
            addr: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)).into(),
            interface_num: InterfaceNum::IfIndex(1),
            oid: None,
        });
        let frame =
            build_info_frame(&ctx.agent, &ctx.sysinfo, &ctx.ports[0]).unwrap();
        let lldpdu = decode(&frame);
        assert_eq!(lldpdu.ttl, 120);
        assert_eq!(lldpdu.chassis_id, ctx.sysinfo.chassis_id);
        assert_eq!(lldpdu.port_id, PortId::InterfaceName("qsfp1".into()));
        assert_eq!(lldpdu.port_description.as_deref(), Some("qsfp1"));
        assert_eq!(lldpdu.system_name.as_deref(), Some("switch0"));
        assert_eq!(lldpdu.management_addresses.len(), 1);
    }

    #[test]
    fn test_basic_tlv_filter() {
        let (mut ctx, _) = running_agent(1);
        ctx.ports[0].tlv_filter = TlvFilter::new(TlvFilter::SYS_DESC).unwrap();
        let lldpdu = build_lldpdu(&ctx.agent, &ctx.sysinfo, &ctx.ports[0]);
        assert_eq!(lldpdu.port_description, None);
        assert_eq!(lldpdu.system_name, None);
        assert_eq!(lldpdu.system_description.as_deref(), Some("test switch"));
    }

    #[test]
    fn test_shutdown_lldpdu() {
        let (ctx, _) = running_agent(1);
        let frame = build_shutdown_frame(&ctx.sysinfo, &ctx.ports[0]).unwrap();
        let packet = Packet::parse(&frame).unwrap().unwrap();
        assert_eq!(packet.lldp_hdr.lldp_data.len(), 4);
        let lldpdu = decode(&frame);
        assert_eq!(lldpdu.ttl, 0);
        assert_eq!(lldpdu.system_name, None);
    }

    #[test]
    fn test_oversized_lldpdu() {
        let (mut ctx, _) = running_agent(1);
        for i in 0..200u8 {
            ctx.sysinfo.management_addresses.push(ManagementAddress {
                addr: IpAddr::V4(Ipv4Addr::new(10, 0, 1, i)).into(),
                interface_num: InterfaceNum::IfIndex(1),
                oid: None,
            });
        }
        assert!(
            build_info_frame(&ctx.agent, &ctx.sysinfo, &ctx.ports[0]).is_err()
        );
    }

    #[test]
    fn test_is_lldp_frame() {
        let mut frame = peer_frame(120);
        assert!(is_lldp_frame(&frame));
        // nearest customer bridge
        frame[5] = 0x00;
        assert!(is_lldp_frame(&frame));
        frame[5] = 0x01;
        assert!(!is_lldp_frame(&frame));
        assert!(!is_lldp_frame(&frame[..10]));
    }

    #[test]
    fn test_sysinfo_validation() {
        let mut sysinfo =
            SystemInfo::new(ChassisId::ChassisComponent(String::new()));
        assert!(sysinfo.validate().is_err());
        sysinfo.chassis_id = ChassisId::ChassisComponent("ok".into());
        sysinfo.system_name = Some("x".repeat(256));
        assert!(sysinfo.validate().is_err());
        sysinfo.system_name = Some("x".repeat(255));
        assert!(sysinfo.validate().is_ok());
    }
}
