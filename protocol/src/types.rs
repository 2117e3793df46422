// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;

use crate::macaddr::MacAddr;
use crate::packet::LldpTlv;

/// Reasons an LLDPDU (or one of its TLVs) could not be used.  The receive
/// path maps these onto the statistics counters of section 9.2.6 of the
/// standard, so the variants track how far the damage reaches rather than
/// what exactly was wrong.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The frame ended in the middle of a header or a TLV
    #[error("truncated frame: {0}")]
    Truncated(String),
    /// One of the mandatory ChassisId, PortId or TTL TLVs was missing,
    /// repeated, or malformed.  The whole LLDPDU must be discarded.
    #[error("mandatory TLV error: {0}")]
    Mandatory(String),
    /// A single TLV had bad contents
    #[error("malformed TLV: {0}")]
    Malformed(String),
    /// The caller asked us to encode something that can't be represented
    #[error("invalid value: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, Error>;

fn malformed(message: impl ToString) -> Error {
    Error::Malformed(message.to_string())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lldpdu {
    pub chassis_id: ChassisId,
    pub port_id: PortId,
    pub ttl: u16,
    pub port_description: Option<String>,
    pub system_name: Option<String>,
    pub system_description: Option<String>,
    pub system_capabilities:
        Option<(BTreeSet<SystemCapabilities>, BTreeSet<SystemCapabilities>)>,
    pub management_addresses: Vec<ManagementAddress>,
    pub organizationally_specific: Vec<OrganizationallySpecific>,
    /// Well-formed TLVs using a type reserved for future standardization
    pub unknown_tlvs: Vec<UnknownTlv>,
}

impl Lldpdu {
    /// Build the minimal LLDPDU: the three mandatory TLVs and nothing else.
    pub fn new(chassis_id: ChassisId, port_id: PortId, ttl: u16) -> Self {
        Lldpdu {
            chassis_id,
            port_id,
            ttl,
            port_description: None,
            system_name: None,
            system_description: None,
            system_capabilities: None,
            management_addresses: Vec::new(),
            organizationally_specific: Vec::new(),
            unknown_tlvs: Vec::new(),
        }
    }
}

impl fmt::Display for Lldpdu {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Chassis ID: {}", self.chassis_id)?;
        writeln!(f, "Port ID: {}", self.port_id)?;
        writeln!(f, "Time To Live: {} seconds", self.ttl)?;
        if let Some(pd) = &self.port_description {
            writeln!(f, "Port description: {pd}")?;
        }
        if let Some(sn) = &self.system_name {
            writeln!(f, "System name: {sn}")?;
        }
        if let Some(sd) = &self.system_description {
            writeln!(f, "System description: {sd}")?;
        }
        if let Some((avail, enabled)) = &self.system_capabilities {
            writeln!(
                f,
                "System capabilities: {:#06x} enabled: {:#06x}",
                capabilities_to_u16(avail),
                capabilities_to_u16(enabled)
            )?;
        }
        for ma in &self.management_addresses {
            writeln!(f, "Management address: {ma}")?;
        }
        for os in &self.organizationally_specific {
            writeln!(f, "Organizationally Specific: {os}")?;
        }
        for u in &self.unknown_tlvs {
            writeln!(f, "Unknown TLV: {u}")?;
        }
        Ok(())
    }
}

impl TryFrom<&Lldpdu> for Vec<LldpTlv> {
    type Error = Error;

    fn try_from(lldpdu: &Lldpdu) -> Result<Self> {
        let mut lldp_data: Vec<LldpTlv> = Vec::new();
        lldp_data.push((&lldpdu.chassis_id).try_into()?);
        lldp_data.push((&lldpdu.port_id).try_into()?);
        lldp_data.push(ttl_to_tlv(lldpdu.ttl));
        if let Some(pd) = &lldpdu.port_description {
            lldp_data.push(string_to_tlv(TlvType::PortDescription, pd)?);
        }
        if let Some(sn) = &lldpdu.system_name {
            lldp_data.push(string_to_tlv(TlvType::SystemName, sn)?);
        }
        if let Some(sd) = &lldpdu.system_description {
            lldp_data.push(string_to_tlv(TlvType::SystemDescription, sd)?);
        }
        if let Some((avail, enabled)) = &lldpdu.system_capabilities {
            lldp_data.push(capabilities_to_tlv(avail, enabled)?);
        }
        for ma in &lldpdu.management_addresses {
            lldp_data.push(ma.try_into()?);
        }
        for os in &lldpdu.organizationally_specific {
            lldp_data.push(os.try_into()?)
        }
        for u in &lldpdu.unknown_tlvs {
            lldp_data.push(LldpTlv::new(u.tlv_type, &u.info)?)
        }
        lldp_data.push(LldpTlv::new(TlvType::EndOfLLDPDU as u8, &[0u8; 0])?);

        Ok(lldp_data)
    }
}

/// The result of decoding a received LLDPDU.  Problems confined to a single
/// optional TLV don't invalidate the LLDPDU; they are tallied here so the
/// receiver can account for them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decoded {
    pub lldpdu: Lldpdu,
    /// Optional TLVs that were malformed or duplicated and were dropped
    pub tlvs_discarded: u32,
    /// Well-formed TLVs we don't interpret
    pub tlvs_unrecognized: u32,
}

impl Lldpdu {
    /// Decode the TLVs of a received LLDPDU following the validation rules of
    /// section 10.3.2 of the standard.
    pub fn decode(data: &[LldpTlv]) -> Result<Decoded> {
        let mut tlvs = data.iter();

        let chassis_id = tlvs
            .next()
            .ok_or(Error::Mandatory("LLDP packet has no ChassisId".into()))
            .and_then(|tlv| {
                ChassisId::try_from(tlv)
                    .map_err(|e| Error::Mandatory(format!("ChassisId: {e}")))
            })?;
        let port_id = tlvs
            .next()
            .ok_or(Error::Mandatory("LLDP packet has no PortId".into()))
            .and_then(|tlv| {
                PortId::try_from(tlv)
                    .map_err(|e| Error::Mandatory(format!("PortId: {e}")))
            })?;
        let ttl = tlvs
            .next()
            .ok_or(Error::Mandatory("LLDP packet has no TTL".into()))
            .and_then(|tlv| {
                ttl_from_tlv(tlv)
                    .map_err(|e| Error::Mandatory(format!("TTL: {e}")))
            })?;

        let mut decoded = Decoded {
            lldpdu: Lldpdu::new(chassis_id, port_id, ttl),
            tlvs_discarded: 0,
            tlvs_unrecognized: 0,
        };

        for tlv in tlvs {
            let tlv_type = match TlvType::try_from(tlv.lldp_tlv_type) {
                Ok(t) => t,
                Err(_) => {
                    decoded.tlvs_unrecognized += 1;
                    decoded.lldpdu.unknown_tlvs.push(UnknownTlv {
                        tlv_type: tlv.lldp_tlv_type,
                        info: tlv.lldp_tlv_octets.clone(),
                    });
                    continue;
                }
            };

            match tlv_type {
                TlvType::EndOfLLDPDU => break,
                TlvType::ChassisId | TlvType::PortId | TlvType::Ttl => {
                    return Err(Error::Mandatory(format!(
                        "LLDP packet has multiple {tlv_type:?} TLVs"
                    )))
                }
                _ => {
                    if decoded.apply_optional(tlv_type, tlv).is_err() {
                        decoded.tlvs_discarded += 1;
                    }
                }
            }
        }
        Ok(decoded)
    }
}

impl Decoded {
    fn apply_optional(&mut self, tlv_type: TlvType, tlv: &LldpTlv) -> Result<()> {
        let l = &mut self.lldpdu;
        let d = &tlv.lldp_tlv_octets;
        let single = |present: bool| {
            if present {
                Err(malformed(format!("duplicate {tlv_type:?} TLV")))
            } else {
                Ok(())
            }
        };

        match tlv_type {
            TlvType::PortDescription => {
                single(l.port_description.is_some())?;
                l.port_description = Some(display_string("PortDescription", d)?);
            }
            TlvType::SystemName => {
                single(l.system_name.is_some())?;
                l.system_name = Some(display_string("SystemName", d)?);
            }
            TlvType::SystemDescription => {
                single(l.system_description.is_some())?;
                l.system_description =
                    Some(display_string("SystemDescription", d)?);
            }
            TlvType::SystemCapabilities => {
                single(l.system_capabilities.is_some())?;
                l.system_capabilities = Some(capabilities_from_tlv(tlv)?);
            }
            TlvType::ManagementAddress => {
                l.management_addresses.push(tlv.try_into()?)
            }
            TlvType::OrganizationallySpecific => {
                // We don't interpret any organizationally specific TLVs, but
                // keep them so they can be reported.
                l.organizationally_specific.push(tlv.try_into()?);
                self.tlvs_unrecognized += 1;
            }
            TlvType::EndOfLLDPDU
            | TlvType::ChassisId
            | TlvType::PortId
            | TlvType::Ttl => {
                return Err(malformed("not an optional TLV"));
            }
        }
        Ok(())
    }
}

fn expect_type(tlv: &LldpTlv, expected_type: TlvType) -> Result<()> {
    if tlv.lldp_tlv_type != expected_type as u8 {
        Err(malformed(format!(
            "expected {expected_type:?}, found type {}",
            tlv.lldp_tlv_type
        )))
    } else if tlv.lldp_tlv_size as usize != tlv.lldp_tlv_octets.len() {
        Err(malformed("TLV payload size doesn't match the TLV header"))
    } else {
        Ok(())
    }
}

fn hex2str(data: &[u8]) -> String {
    if data.is_empty() {
        "null".to_string()
    } else {
        data.iter()
            .map(|a| format!("{a:02x}"))
            .collect::<Vec<String>>()
            .join(":")
    }
}

/// A TLV whose type is in the range reserved for future standardization
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownTlv {
    pub tlv_type: u8,
    pub info: Vec<u8>,
}

impl fmt::Display for UnknownTlv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "type {} data: {}", self.tlv_type, hex2str(&self.info))
    }
}

// IANA Address Family Numbers for the address types we currently support as
// seen in:
// https://www.iana.org/assignments/address-family-numbers/address-family-numbers.xhtml
const IANA_IPV4: u8 = 1;
const IANA_IPV6: u8 = 2;
const IANA_802: u8 = 6;

#[derive(
    Clone,
    Debug,
    Hash,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
)]
pub enum NetworkAddress {
    IpAddr(IpAddr),
    IEEE802(Vec<u8>),
}

impl From<IpAddr> for NetworkAddress {
    fn from(addr: IpAddr) -> Self {
        NetworkAddress::IpAddr(addr)
    }
}

impl fmt::Display for NetworkAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NetworkAddress::IpAddr(ip) => write!(f, "{ip}"),
            NetworkAddress::IEEE802(addr) => {
                write!(f, "IEEE802({})", hex2str(addr))
            }
        }
    }
}

impl NetworkAddress {
    /// An address is represented as a string of octets, where the first
    /// contains the IANA address family number and the remaining octets
    /// contain the address itself.
    pub fn to_octets(&self) -> Vec<u8> {
        let mut v = vec![];
        match self {
            NetworkAddress::IpAddr(IpAddr::V4(ip)) => {
                v.push(IANA_IPV4);
                v.extend(ip.octets())
            }
            NetworkAddress::IpAddr(IpAddr::V6(ip)) => {
                v.push(IANA_IPV6);
                v.extend(ip.octets())
            }
            NetworkAddress::IEEE802(addr) => {
                v.push(IANA_802);
                v.extend(addr)
            }
        }
        v
    }

    pub fn from_octets(data: &[u8]) -> Result<NetworkAddress> {
        let len = data.len();
        if len == 0 {
            return Err(malformed("address has no payload"));
        }
        match data[0] {
            IANA_IPV4 => <[u8; 4]>::try_from(&data[1..])
                .map(|a| NetworkAddress::IpAddr(IpAddr::from(a)))
                .map_err(|_| malformed("invalid sized IPv4 address")),
            IANA_IPV6 => <[u8; 16]>::try_from(&data[1..])
                .map(|a| NetworkAddress::IpAddr(IpAddr::from(a)))
                .map_err(|_| malformed("invalid sized IPv6 address")),
            IANA_802 => Ok(NetworkAddress::IEEE802(data[1..].to_vec())),
            x => Err(malformed(format!(
                "unsupported address type {x} - len {len}"
            ))),
        }
    }
}

#[derive(
    Clone,
    Debug,
    Hash,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
)]
pub enum ChassisId {
    ChassisComponent(String), // RFC 6993
    InterfaceAlias(String),   // RFC 2863
    PortComponent(String),    // RFC 6993
    MacAddress(MacAddr),
    NetworkAddress(NetworkAddress),
    InterfaceName(String), // RFC 2863
    LocallyAssigned(String),
}

impl fmt::Display for ChassisId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ChassisId::ChassisComponent(s) => {
                write!(f, "Chassis Component - {s}")
            }
            ChassisId::InterfaceAlias(s) => write!(f, "Interface Alias - {s}"),
            ChassisId::PortComponent(s) => write!(f, "Port Component - {s}"),
            ChassisId::MacAddress(mac) => write!(f, "Mac Address - {mac}"),
            ChassisId::NetworkAddress(addr) => {
                write!(f, "Network Address - {addr}")
            }
            ChassisId::InterfaceName(s) => write!(f, "Interface Name - {s}"),
            ChassisId::LocallyAssigned(s) => {
                write!(f, "Locally assigned - {s}")
            }
        }
    }
}

impl ChassisId {
    /// The subtype and identifier octets, as they appear on the wire and in
    /// the lldpLocChassisIdSubtype/lldpLocChassisId MIB objects.
    pub fn to_octets(&self) -> (ChassisIdSubtype, Vec<u8>) {
        match self {
            ChassisId::ChassisComponent(s) => {
                (ChassisIdSubtype::ChassisComponent, s.as_bytes().to_vec())
            }
            ChassisId::InterfaceAlias(s) => {
                (ChassisIdSubtype::InterfaceAlias, s.as_bytes().to_vec())
            }
            ChassisId::PortComponent(s) => {
                (ChassisIdSubtype::PortComponent, s.as_bytes().to_vec())
            }
            ChassisId::MacAddress(mac) => {
                (ChassisIdSubtype::MacAddress, mac.to_vec())
            }
            ChassisId::NetworkAddress(addr) => {
                (ChassisIdSubtype::NetworkAddress, addr.to_octets())
            }
            ChassisId::InterfaceName(s) => {
                (ChassisIdSubtype::InterfaceName, s.as_bytes().to_vec())
            }
            ChassisId::LocallyAssigned(s) => {
                (ChassisIdSubtype::LocallyAssigned, s.as_bytes().to_vec())
            }
        }
    }
}

// Both ID TLVs carry a one-octet subtype followed by 1-255 octets of id.
fn id_to_tlv(tlv_type: TlvType, subtype: u8, id: Vec<u8>) -> Result<LldpTlv> {
    if id.is_empty() {
        Err(Error::Invalid(format!("0-length {tlv_type:?}")))
    } else if id.len() > 255 {
        Err(Error::Invalid(format!("{tlv_type:?} exceeds 255 octets")))
    } else {
        let mut lldp_tlv_octets = vec![subtype];
        lldp_tlv_octets.extend(id);
        Ok(LldpTlv {
            lldp_tlv_type: tlv_type.into(),
            lldp_tlv_size: lldp_tlv_octets.len() as u16,
            lldp_tlv_octets,
        })
    }
}

fn id_from_tlv(tlv: &LldpTlv, tlv_type: TlvType) -> Result<(u8, &[u8])> {
    expect_type(tlv, tlv_type)?;
    if tlv.lldp_tlv_size < 2 {
        Err(malformed(format!("{tlv_type:?} TLV has no payload")))
    } else {
        Ok((tlv.lldp_tlv_octets[0], &tlv.lldp_tlv_octets[1..]))
    }
}

fn mac_from_octets(data: &[u8]) -> Result<MacAddr> {
    MacAddr::from_slice(data).map_err(|e| malformed(format!("mac address: {e}")))
}

impl TryFrom<&ChassisId> for LldpTlv {
    type Error = Error;

    fn try_from(id: &ChassisId) -> Result<Self> {
        let (subtype, octets) = id.to_octets();
        id_to_tlv(TlvType::ChassisId, subtype.into(), octets)
    }
}

impl TryFrom<&LldpTlv> for ChassisId {
    type Error = Error;

    fn try_from(tlv: &LldpTlv) -> Result<Self> {
        let (subtype, data) = id_from_tlv(tlv, TlvType::ChassisId)?;
        let s = || id_string("ChassisId", data);
        match ChassisIdSubtype::try_from(subtype)? {
            ChassisIdSubtype::Reserved => {
                Err(malformed("found ChassisId with Reserved subtype"))
            }
            ChassisIdSubtype::ChassisComponent => {
                Ok(ChassisId::ChassisComponent(s()?))
            }
            ChassisIdSubtype::InterfaceAlias => {
                Ok(ChassisId::InterfaceAlias(s()?))
            }
            ChassisIdSubtype::PortComponent => Ok(ChassisId::PortComponent(s()?)),
            ChassisIdSubtype::MacAddress => {
                Ok(ChassisId::MacAddress(mac_from_octets(data)?))
            }
            ChassisIdSubtype::NetworkAddress => Ok(ChassisId::NetworkAddress(
                NetworkAddress::from_octets(data)?,
            )),
            ChassisIdSubtype::InterfaceName => Ok(ChassisId::InterfaceName(s()?)),
            ChassisIdSubtype::LocallyAssigned => {
                Ok(ChassisId::LocallyAssigned(s()?))
            }
        }
    }
}

#[derive(
    Clone,
    Debug,
    Hash,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
)]
pub enum PortId {
    InterfaceAlias(String), // RFC 2863
    PortComponent(String),  //  RFC 6933
    MacAddress(MacAddr),
    NetworkAddress(NetworkAddress),
    InterfaceName(String),  // RFC 2863
    AgentCircuitId(String), // RFC 3046
    LocallyAssigned(String),
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PortId::InterfaceAlias(s) => write!(f, "Interface Alias - {s}"),
            PortId::PortComponent(s) => write!(f, "Port Component - {s}"),
            PortId::MacAddress(mac) => write!(f, "Mac Address - {mac}"),
            PortId::NetworkAddress(addr) => {
                write!(f, "Network Address - {addr}")
            }
            PortId::InterfaceName(s) => write!(f, "Interface Name - {s}"),
            PortId::AgentCircuitId(s) => write!(f, "Agent Circuit ID - {s}"),
            PortId::LocallyAssigned(s) => {
                write!(f, "Locally assigned - {s}")
            }
        }
    }
}

impl PortId {
    /// The subtype and identifier octets, as they appear on the wire and in
    /// the lldpLocPortIdSubtype/lldpLocPortId MIB objects.
    pub fn to_octets(&self) -> (PortIdSubtype, Vec<u8>) {
        match self {
            PortId::InterfaceAlias(s) => {
                (PortIdSubtype::InterfaceAlias, s.as_bytes().to_vec())
            }
            PortId::PortComponent(s) => {
                (PortIdSubtype::PortComponent, s.as_bytes().to_vec())
            }
            PortId::MacAddress(mac) => (PortIdSubtype::MacAddress, mac.to_vec()),
            PortId::NetworkAddress(addr) => {
                (PortIdSubtype::NetworkAddress, addr.to_octets())
            }
            PortId::InterfaceName(s) => {
                (PortIdSubtype::InterfaceName, s.as_bytes().to_vec())
            }
            PortId::AgentCircuitId(s) => {
                (PortIdSubtype::AgentCircuitId, s.as_bytes().to_vec())
            }
            PortId::LocallyAssigned(s) => {
                (PortIdSubtype::LocallyAssigned, s.as_bytes().to_vec())
            }
        }
    }
}

impl TryFrom<&PortId> for LldpTlv {
    type Error = Error;

    fn try_from(id: &PortId) -> Result<Self> {
        let (subtype, octets) = id.to_octets();
        id_to_tlv(TlvType::PortId, subtype.into(), octets)
    }
}

impl TryFrom<&LldpTlv> for PortId {
    type Error = Error;

    fn try_from(tlv: &LldpTlv) -> Result<Self> {
        let (subtype, data) = id_from_tlv(tlv, TlvType::PortId)?;
        let s = || id_string("PortId", data);
        match PortIdSubtype::try_from(subtype)? {
            PortIdSubtype::Reserved => {
                Err(malformed("found PortId with Reserved subtype"))
            }
            PortIdSubtype::InterfaceAlias => Ok(PortId::InterfaceAlias(s()?)),
            PortIdSubtype::PortComponent => Ok(PortId::PortComponent(s()?)),
            PortIdSubtype::MacAddress => {
                Ok(PortId::MacAddress(mac_from_octets(data)?))
            }
            PortIdSubtype::NetworkAddress => Ok(PortId::NetworkAddress(
                NetworkAddress::from_octets(data)?,
            )),
            PortIdSubtype::InterfaceName => Ok(PortId::InterfaceName(s()?)),
            PortIdSubtype::AgentCircuitId => Ok(PortId::AgentCircuitId(s()?)),
            PortIdSubtype::LocallyAssigned => Ok(PortId::LocallyAssigned(s()?)),
        }
    }
}

pub fn ttl_to_tlv(ttl: u16) -> LldpTlv {
    LldpTlv {
        lldp_tlv_type: TlvType::Ttl.into(),
        lldp_tlv_size: 2,
        lldp_tlv_octets: ttl.to_be_bytes().to_vec(),
    }
}

/// Extract the TTL.  Octets beyond the first two are tolerated and ignored.
pub fn ttl_from_tlv(tlv: &LldpTlv) -> Result<u16> {
    expect_type(tlv, TlvType::Ttl)?;
    match tlv.lldp_tlv_octets.as_slice() {
        [hi, lo, ..] => Ok(u16::from_be_bytes([*hi, *lo])),
        _ => Err(malformed("payload is too short for a TTL")),
    }
}

pub fn capabilities_to_u16(all: &BTreeSet<SystemCapabilities>) -> u16 {
    all.iter().fold(0, |acc, c| acc | u16::from(*c))
}

pub fn capabilities_from_u16(bits: u16) -> BTreeSet<SystemCapabilities> {
    (1u16..=16)
        .filter(|idx| bits & (1 << (idx - 1)) != 0)
        .filter_map(|idx| SystemCapabilities::try_from(idx).ok())
        .collect()
}

pub fn capabilities_to_tlv(
    avail: &BTreeSet<SystemCapabilities>,
    enabled: &BTreeSet<SystemCapabilities>,
) -> Result<LldpTlv> {
    if !avail.is_superset(enabled) {
        return Err(Error::Invalid(
            "cannot enable capabilities that aren't available".into(),
        ));
    }
    let mut capabilities = capabilities_to_u16(avail).to_be_bytes().to_vec();
    capabilities.extend_from_slice(&capabilities_to_u16(enabled).to_be_bytes());
    Ok(LldpTlv {
        lldp_tlv_type: TlvType::SystemCapabilities.into(),
        lldp_tlv_size: 4,
        lldp_tlv_octets: capabilities,
    })
}

/// Decode the capabilities bitmasks.  Bits we have no name for are ignored.
pub fn capabilities_from_tlv(
    tlv: &LldpTlv,
) -> Result<(BTreeSet<SystemCapabilities>, BTreeSet<SystemCapabilities>)> {
    expect_type(tlv, TlvType::SystemCapabilities)?;
    match tlv.lldp_tlv_octets.as_slice() {
        [a0, a1, e0, e1] => Ok((
            capabilities_from_u16(u16::from_be_bytes([*a0, *a1])),
            capabilities_from_u16(u16::from_be_bytes([*e0, *e1])),
        )),
        _ => Err(malformed("capabilities field is not 4 octets")),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InterfaceNum {
    Unknown(u32),
    IfIndex(u32),
    PortNumber(u32),
}

impl fmt::Display for InterfaceNum {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            InterfaceNum::Unknown(id) => write!(f, "Unknown ({id})"),
            InterfaceNum::IfIndex(id) => write!(f, "IfIndex ({id})"),
            InterfaceNum::PortNumber(id) => write!(f, "PortNumber ({id})"),
        }
    }
}

impl InterfaceNum {
    pub fn subtype(&self) -> InterfaceNumSubtype {
        match self {
            InterfaceNum::Unknown(_) => InterfaceNumSubtype::Unknown,
            InterfaceNum::IfIndex(_) => InterfaceNumSubtype::IfIndex,
            InterfaceNum::PortNumber(_) => InterfaceNumSubtype::PortNumber,
        }
    }

    pub fn number(&self) -> u32 {
        match self {
            InterfaceNum::Unknown(n)
            | InterfaceNum::IfIndex(n)
            | InterfaceNum::PortNumber(n) => *n,
        }
    }
}

/// Interface numbering subtypes, as defined by section 9.5.9.5
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InterfaceNumSubtype {
    Unknown = 1,
    IfIndex,
    PortNumber,
}

impl TryFrom<u8> for InterfaceNumSubtype {
    type Error = Error;

    fn try_from(t: u8) -> Result<Self> {
        match t {
            1 => Ok(InterfaceNumSubtype::Unknown),
            2 => Ok(InterfaceNumSubtype::IfIndex),
            3 => Ok(InterfaceNumSubtype::PortNumber),
            x => Err(malformed(format!("invalid Interface Number subtype: {x}"))),
        }
    }
}

impl From<InterfaceNumSubtype> for u8 {
    fn from(x: InterfaceNumSubtype) -> u8 {
        x as u8
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagementAddress {
    pub addr: NetworkAddress,
    pub interface_num: InterfaceNum,
    /// BER-encoded object identifier of the hardware component or protocol
    /// entity associated with the address
    pub oid: Option<Vec<u8>>,
}

impl fmt::Display for ManagementAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.oid {
            Some(oid) => write!(
                f,
                "{} ({}) (OID: {})",
                self.addr,
                self.interface_num,
                hex2str(oid)
            ),
            None => write!(f, "{} ({})", self.addr, self.interface_num),
        }
    }
}

impl TryFrom<&ManagementAddress> for LldpTlv {
    type Error = Error;

    fn try_from(from: &ManagementAddress) -> Result<Self> {
        let oid = from.oid.clone().unwrap_or_default();
        if oid.len() > 128 {
            return Err(Error::Invalid(
                "OID must be no more than 128 bytes long".into(),
            ));
        }
        let addr = from.addr.to_octets();
        if addr.len() > 32 {
            return Err(Error::Invalid(
                "management address exceeds 31 octets".into(),
            ));
        }

        let mut payload = Vec::with_capacity(addr.len() + oid.len() + 7);
        payload.push(addr.len() as u8);
        payload.extend(addr);
        payload.push(from.interface_num.subtype().into());
        payload.extend(from.interface_num.number().to_be_bytes());
        payload.push(oid.len() as u8);
        payload.extend(oid);

        Ok(LldpTlv {
            lldp_tlv_type: TlvType::ManagementAddress.into(),
            lldp_tlv_size: payload.len() as u16,
            lldp_tlv_octets: payload,
        })
    }
}

impl TryFrom<&LldpTlv> for ManagementAddress {
    type Error = Error;

    fn try_from(tlv: &LldpTlv) -> Result<Self> {
        expect_type(tlv, TlvType::ManagementAddress)?;
        let d = &tlv.lldp_tlv_octets;

        let addr_len = *d.first().ok_or(malformed("management address is empty"))?
            as usize;
        if !(2..=32).contains(&addr_len) {
            return Err(malformed("invalid management address length"));
        }
        let iface_start = 1 + addr_len;
        let oid_len_at = iface_start + 5; // subtype + 4 bytes of data
        if d.len() <= oid_len_at {
            return Err(malformed("management address TLV is too short"));
        }
        let oid_len = d[oid_len_at] as usize;
        if oid_len > 128 || d.len() != oid_len_at + 1 + oid_len {
            return Err(malformed("management address OID length mismatch"));
        }

        let addr = NetworkAddress::from_octets(&d[1..iface_start])?;
        let num = u32::from_be_bytes([
            d[iface_start + 1],
            d[iface_start + 2],
            d[iface_start + 3],
            d[iface_start + 4],
        ]);
        let interface_num = match InterfaceNumSubtype::try_from(d[iface_start])? {
            InterfaceNumSubtype::Unknown => InterfaceNum::Unknown(num),
            InterfaceNumSubtype::IfIndex => InterfaceNum::IfIndex(num),
            InterfaceNumSubtype::PortNumber => InterfaceNum::PortNumber(num),
        };
        let oid = match oid_len {
            0 => None,
            _ => Some(d[oid_len_at + 1..].to_vec()),
        };

        Ok(ManagementAddress {
            addr,
            interface_num,
            oid,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrganizationallySpecific {
    pub oui: [u8; 3],
    pub subtype: u8,
    pub info: Vec<u8>,
}

impl OrganizationallySpecific {
    /// The OUI packed into the low 24 bits, as used to index the
    /// lldpRemOrgDefInfoTable
    pub fn oui_u32(&self) -> u32 {
        u32::from_be_bytes([0, self.oui[0], self.oui[1], self.oui[2]])
    }
}

impl fmt::Display for OrganizationallySpecific {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "oui: {:02x}{:02x}{:02x} subtype: {:x}  data: {}",
            self.oui[0],
            self.oui[1],
            self.oui[2],
            self.subtype,
            hex2str(&self.info)
        )
    }
}

impl TryFrom<&OrganizationallySpecific> for LldpTlv {
    type Error = Error;

    fn try_from(from: &OrganizationallySpecific) -> Result<Self> {
        let mut payload = from.oui.to_vec();
        payload.push(from.subtype);
        payload.extend_from_slice(&from.info);
        LldpTlv::new(TlvType::OrganizationallySpecific.into(), &payload)
    }
}

impl TryFrom<&LldpTlv> for OrganizationallySpecific {
    type Error = Error;

    fn try_from(tlv: &LldpTlv) -> Result<Self> {
        expect_type(tlv, TlvType::OrganizationallySpecific)?;
        match tlv.lldp_tlv_octets.as_slice() {
            [o0, o1, o2, subtype, info @ ..] => Ok(OrganizationallySpecific {
                oui: [*o0, *o1, *o2],
                subtype: *subtype,
                info: info.to_vec(),
            }),
            _ => Err(malformed("OrganizationallySpecific TLV is too short")),
        }
    }
}

pub fn string_to_tlv(tlv_type: TlvType, data: &str) -> Result<LldpTlv> {
    let lldp_tlv_type = match tlv_type {
        TlvType::PortDescription
        | TlvType::SystemName
        | TlvType::SystemDescription => Ok(tlv_type as u8),
        _ => Err(Error::Invalid(
            "TLV type doesn't contain string data".into(),
        )),
    }?;

    let lldp_tlv_octets = data.as_bytes().to_vec();
    if lldp_tlv_octets.len() > 255 {
        return Err(Error::Invalid("string exceeds 255 octets".into()));
    }
    Ok(LldpTlv {
        lldp_tlv_type,
        lldp_tlv_size: lldp_tlv_octets.len() as u16,
        lldp_tlv_octets,
    })
}

// Identifiers must be non-empty
fn id_string(label: &str, data: &[u8]) -> Result<String> {
    let s = display_string(label, data)?;
    if s.is_empty() {
        Err(malformed(format!("found empty payload for {label}")))
    } else {
        Ok(s)
    }
}

fn display_string(label: &str, data: &[u8]) -> Result<String> {
    if data.len() > 255 {
        return Err(malformed(format!(
            "payload for {label} exceeded 255 characters"
        )));
    }
    String::from_utf8(data.to_vec())
        .map_err(|_| malformed(format!("invalid bytes in {label}")))
}

/// The propagation scope, and associated MAC addresses, is defined by
/// section 7.1.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    Bridge,
    NonTPMRBridge,
    CustomerBridge,
}

impl Scope {
    pub const ALL: [Scope; 3] =
        [Scope::Bridge, Scope::NonTPMRBridge, Scope::CustomerBridge];

    /// Is this one of the group addresses LLDPDUs are sent to?
    pub fn is_lldp_addr(mac: MacAddr) -> bool {
        Scope::ALL.iter().any(|s| MacAddr::from(*s) == mac)
    }
}

impl From<Scope> for MacAddr {
    fn from(s: Scope) -> MacAddr {
        match s {
            Scope::Bridge => MacAddr::new(0x01, 0x80, 0xc2, 0x00, 0x00, 0x0E),
            Scope::NonTPMRBridge => {
                MacAddr::new(0x01, 0x80, 0xc2, 0x00, 0x00, 0x03)
            }
            Scope::CustomerBridge => {
                MacAddr::new(0x01, 0x80, 0xc2, 0x00, 0x00, 0x00)
            }
        }
    }
}

/// TLV Type values as defined in table 8-1
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum TlvType {
    EndOfLLDPDU = 0,
    ChassisId,
    PortId,
    Ttl,
    PortDescription,
    SystemName,
    SystemDescription,
    SystemCapabilities,
    ManagementAddress,
    OrganizationallySpecific = 127,
}

impl TryFrom<u8> for TlvType {
    type Error = Error;

    fn try_from(t: u8) -> Result<Self> {
        match t {
            0 => Ok(TlvType::EndOfLLDPDU),
            1 => Ok(TlvType::ChassisId),
            2 => Ok(TlvType::PortId),
            3 => Ok(TlvType::Ttl),
            4 => Ok(TlvType::PortDescription),
            5 => Ok(TlvType::SystemName),
            6 => Ok(TlvType::SystemDescription),
            7 => Ok(TlvType::SystemCapabilities),
            8 => Ok(TlvType::ManagementAddress),
            127 => Ok(TlvType::OrganizationallySpecific),
            x => Err(malformed(format!("reserved TLV type {x}"))),
        }
    }
}

impl From<TlvType> for u8 {
    fn from(x: TlvType) -> u8 {
        x as u8
    }
}

/// Chassis ID Subtype values as defined in table 8-2.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum ChassisIdSubtype {
    Reserved = 0,
    ChassisComponent,
    InterfaceAlias,
    PortComponent,
    MacAddress,
    NetworkAddress,
    InterfaceName,
    LocallyAssigned,
}

impl TryFrom<u8> for ChassisIdSubtype {
    type Error = Error;

    fn try_from(id: u8) -> Result<Self> {
        match id {
            0 => Ok(ChassisIdSubtype::Reserved),
            1 => Ok(ChassisIdSubtype::ChassisComponent),
            2 => Ok(ChassisIdSubtype::InterfaceAlias),
            3 => Ok(ChassisIdSubtype::PortComponent),
            4 => Ok(ChassisIdSubtype::MacAddress),
            5 => Ok(ChassisIdSubtype::NetworkAddress),
            6 => Ok(ChassisIdSubtype::InterfaceName),
            7 => Ok(ChassisIdSubtype::LocallyAssigned),
            x => Err(malformed(format!("invalid ChassisId subtype {x}"))),
        }
    }
}

impl From<ChassisIdSubtype> for u8 {
    fn from(x: ChassisIdSubtype) -> u8 {
        x as u8
    }
}

/// Port ID Subtype values as defined by table 8-3.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum PortIdSubtype {
    Reserved = 0,
    InterfaceAlias,
    PortComponent,
    MacAddress,
    NetworkAddress,
    InterfaceName,
    AgentCircuitId,
    LocallyAssigned,
}

impl TryFrom<u8> for PortIdSubtype {
    type Error = Error;

    fn try_from(id: u8) -> Result<Self> {
        match id {
            0 => Ok(PortIdSubtype::Reserved),
            1 => Ok(PortIdSubtype::InterfaceAlias),
            2 => Ok(PortIdSubtype::PortComponent),
            3 => Ok(PortIdSubtype::MacAddress),
            4 => Ok(PortIdSubtype::NetworkAddress),
            5 => Ok(PortIdSubtype::InterfaceName),
            6 => Ok(PortIdSubtype::AgentCircuitId),
            7 => Ok(PortIdSubtype::LocallyAssigned),
            x => Err(malformed(format!("invalid PortId subtype {x}"))),
        }
    }
}

impl From<PortIdSubtype> for u8 {
    fn from(x: PortIdSubtype) -> u8 {
        x as u8
    }
}

/// System Capabilities are defined by table 8-4.  In an LLDPDU a
/// system's available and enabled capabilities are represented by bitmasks,
/// with the value below acting as the index into that bitmask.
#[derive(
    Clone,
    Copy,
    Debug,
    Hash,
    Eq,
    PartialEq,
    PartialOrd,
    Ord,
)]
#[repr(u8)]
pub enum SystemCapabilities {
    Other = 1,
    Repeater,
    MacBridgeComponent,
    AccessPoint,
    Router,
    Telephone,
    Docsis,
    StationOnly,
    CVlanComponent,
    SVlanComponent,
    MacRelayComponent,
}

impl TryFrom<u16> for SystemCapabilities {
    type Error = Error;

    fn try_from(c: u16) -> Result<Self> {
        match c {
            1 => Ok(SystemCapabilities::Other),
            2 => Ok(SystemCapabilities::Repeater),
            3 => Ok(SystemCapabilities::MacBridgeComponent),
            4 => Ok(SystemCapabilities::AccessPoint),
            5 => Ok(SystemCapabilities::Router),
            6 => Ok(SystemCapabilities::Telephone),
            7 => Ok(SystemCapabilities::Docsis),
            8 => Ok(SystemCapabilities::StationOnly),
            9 => Ok(SystemCapabilities::CVlanComponent),
            10 => Ok(SystemCapabilities::SVlanComponent),
            11 => Ok(SystemCapabilities::MacRelayComponent),
            x => Err(malformed(format!("invalid capability: {x}"))),
        }
    }
}

impl From<SystemCapabilities> for u16 {
    fn from(x: SystemCapabilities) -> u16 {
        // The standard numbers the bits starting at 1 rather than 0, so
        // we need to subtract one from the index when computing the bitmask.
        1u16 << (x as u16 - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn tlv(tlv_type: u8, data: &[u8]) -> LldpTlv {
        LldpTlv::new(tlv_type, data).unwrap()
    }

    fn minimal() -> Vec<LldpTlv> {
        vec![
            tlv(1, b"\x07switch0"),
            tlv(2, b"\x05qsfp0"),
            tlv(3, &[0, 120]),
        ]
    }

    #[test]
    fn verify_chassis_subtype() -> Result<()> {
        assert_eq!(
            ChassisIdSubtype::try_from(1)?,
            ChassisIdSubtype::ChassisComponent
        );
        assert_eq!(ChassisIdSubtype::try_from(4)?, ChassisIdSubtype::MacAddress);
        assert_eq!(
            ChassisIdSubtype::try_from(7)?,
            ChassisIdSubtype::LocallyAssigned
        );
        assert!(ChassisIdSubtype::try_from(8).is_err());
        Ok(())
    }

    #[test]
    fn verify_port_subtype() -> Result<()> {
        assert_eq!(PortIdSubtype::try_from(0)?, PortIdSubtype::Reserved);
        assert_eq!(PortIdSubtype::try_from(5)?, PortIdSubtype::InterfaceName);
        assert_eq!(PortIdSubtype::try_from(6)?, PortIdSubtype::AgentCircuitId);
        assert!(PortIdSubtype::try_from(8).is_err());
        Ok(())
    }

    #[test]
    fn test_decode_minimal() {
        let d = Lldpdu::decode(&minimal()).unwrap();
        assert_eq!(
            d.lldpdu.chassis_id,
            ChassisId::LocallyAssigned("switch0".to_string())
        );
        assert_eq!(d.lldpdu.port_id, PortId::InterfaceName("qsfp0".to_string()));
        assert_eq!(d.lldpdu.ttl, 120);
        assert_eq!(d.tlvs_discarded, 0);
        assert_eq!(d.tlvs_unrecognized, 0);
    }

    #[test]
    fn test_encode_decode() {
        let mut lldpdu = Lldpdu::new(
            ChassisId::MacAddress(MacAddr::new(0xa8, 0x40, 0x25, 1, 2, 3)),
            PortId::LocallyAssigned("port 1".to_string()),
            120,
        );
        lldpdu.system_name = Some("sled-7".to_string());
        lldpdu.port_description = Some(String::new());
        let mut avail = BTreeSet::new();
        avail.insert(SystemCapabilities::Router);
        avail.insert(SystemCapabilities::MacBridgeComponent);
        let mut enabled = BTreeSet::new();
        enabled.insert(SystemCapabilities::Router);
        lldpdu.system_capabilities = Some((avail, enabled));
        lldpdu.management_addresses.push(ManagementAddress {
            addr: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)).into(),
            interface_num: InterfaceNum::IfIndex(3),
            oid: None,
        });

        let tlvs: Vec<LldpTlv> = (&lldpdu).try_into().unwrap();
        assert_eq!(tlvs.last().unwrap().lldp_tlv_type, 0);
        let d = Lldpdu::decode(&tlvs).unwrap();
        assert_eq!(d.lldpdu, lldpdu);
    }

    #[test]
    fn test_missing_mandatory() {
        let tlvs = minimal();
        assert!(matches!(
            Lldpdu::decode(&tlvs[..2]),
            Err(Error::Mandatory(_))
        ));

        // PortId before ChassisId
        let swapped = vec![tlvs[1].clone(), tlvs[0].clone(), tlvs[2].clone()];
        assert!(matches!(Lldpdu::decode(&swapped), Err(Error::Mandatory(_))));

        // A 0-length chassis id
        let mut bad = minimal();
        bad[0] = tlv(1, &[7]);
        assert!(matches!(Lldpdu::decode(&bad), Err(Error::Mandatory(_))));
    }

    #[test]
    fn test_repeated_mandatory() {
        let mut tlvs = minimal();
        tlvs.push(tlv(3, &[0, 30]));
        assert!(matches!(Lldpdu::decode(&tlvs), Err(Error::Mandatory(_))));
    }

    #[test]
    fn test_tolerated_tlvs() {
        let mut tlvs = minimal();
        // reserved type
        tlvs.push(tlv(42, b"future"));
        // org specific - kept but not interpreted
        tlvs.push(tlv(127, &[0x00, 0x80, 0xc2, 0x01, 0x00, 0x01]));
        // truncated capabilities
        tlvs.push(tlv(7, &[0x00, 0x14]));
        // duplicate system name
        tlvs.push(tlv(5, b"first"));
        tlvs.push(tlv(5, b"second"));
        tlvs.push(tlv(0, &[]));
        // Anything after the End TLV is ignored
        tlvs.push(tlv(5, b"ignored"));

        let d = Lldpdu::decode(&tlvs).unwrap();
        assert_eq!(d.tlvs_unrecognized, 2);
        assert_eq!(d.tlvs_discarded, 2);
        assert_eq!(d.lldpdu.system_name.as_deref(), Some("first"));
        assert_eq!(d.lldpdu.system_capabilities, None);
        assert_eq!(d.lldpdu.unknown_tlvs.len(), 1);
        assert_eq!(d.lldpdu.unknown_tlvs[0].tlv_type, 42);
        assert_eq!(d.lldpdu.organizationally_specific[0].oui_u32(), 0x0080c2);
    }

    #[test]
    fn test_ttl_with_trailing_octets() {
        let mut tlvs = minimal();
        tlvs[2] = tlv(3, &[0x01, 0x00, 0xff]);
        assert_eq!(Lldpdu::decode(&tlvs).unwrap().lldpdu.ttl, 256);
    }

    #[test]
    fn test_capabilities_bits() {
        let caps = capabilities_from_u16(0x0014);
        assert!(caps.contains(&SystemCapabilities::MacBridgeComponent));
        assert!(caps.contains(&SystemCapabilities::Router));
        assert_eq!(capabilities_to_u16(&caps), 0x0014);
        // Unnamed bits are dropped
        assert_eq!(capabilities_to_u16(&capabilities_from_u16(0x8004)), 0x0004);
    }

    #[test]
    fn test_management_address_oid() {
        let ma = ManagementAddress {
            addr: NetworkAddress::IEEE802(vec![0xa8, 0x40, 0x25, 0, 0, 1]),
            interface_num: InterfaceNum::PortNumber(17),
            oid: Some(vec![0x2b, 0x06, 0x01]),
        };
        let tlv: LldpTlv = (&ma).try_into().unwrap();
        assert_eq!(ManagementAddress::try_from(&tlv).unwrap(), ma);

        let mut short = tlv.clone();
        short.lldp_tlv_octets.pop();
        short.lldp_tlv_size -= 1;
        assert!(ManagementAddress::try_from(&short).is_err());
    }
}
