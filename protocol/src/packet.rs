// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! Ethernet framing and the raw TLV layer of an LLDPDU.

use crate::macaddr::MacAddr;
use crate::types::Error;
use crate::types::Result;

pub const ETHER_VLAN: u16 = 0x8100;
pub const ETHER_LLDP: u16 = 0x88cc;
pub const ETHER_LEN: u16 = 14;

/// Largest payload a TLV length field can describe.
pub const TLV_MAX_OCTETS: usize = 511;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    pub eth_hdr: EthHdr,
    pub lldp_hdr: LldpHdr,
}

impl Packet {
    pub fn new(eth_dmac: MacAddr, eth_smac: MacAddr) -> Packet {
        Packet {
            eth_hdr: EthHdr {
                eth_dmac,
                eth_smac,
                eth_8021q: None,
                eth_type: ETHER_LLDP,
                eth_size: ETHER_LEN,
            },
            lldp_hdr: LldpHdr {
                lldp_data: Vec::new(),
            },
        }
    }

    /// Parse a raw frame.  Frames that are not LLDP return `Ok(None)`.
    pub fn parse(data: &[u8]) -> Result<Option<Packet>> {
        let eth_hdr = EthHdr::parse(data)?;
        if eth_hdr.eth_type != ETHER_LLDP {
            return Ok(None);
        }
        let lldp_hdr = LldpHdr::parse(&data[eth_hdr.eth_size as usize..])?;
        Ok(Some(Packet { eth_hdr, lldp_hdr }))
    }

    pub fn deparse(&self) -> Vec<u8> {
        let mut bytes =
            Vec::with_capacity(self.eth_hdr.eth_size as usize + self.lldp_hdr.size());
        self.eth_hdr.deparse(&mut bytes);
        self.lldp_hdr.deparse(&mut bytes);
        bytes
    }

    pub fn add_tlv(&mut self, tlv: &LldpTlv) {
        self.lldp_hdr.lldp_data.push(tlv.clone());
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EthQHdr {
    pub eth_pcp: u8,       // 802.1q Priority code point
    pub eth_dei: u8,       // 802.1q Drop eligible indicator
    pub eth_vlan_tag: u16, // 802.1q VID
}

impl From<EthQHdr> for u16 {
    fn from(x: EthQHdr) -> Self {
        ((x.eth_pcp as u16) << 13) | ((x.eth_dei as u16) << 12) | x.eth_vlan_tag
    }
}

impl From<u16> for EthQHdr {
    fn from(x: u16) -> Self {
        EthQHdr {
            eth_pcp: ((x >> 13) & 0x07) as u8,
            eth_dei: ((x >> 12) & 0x01) as u8,
            eth_vlan_tag: x & 0xfff,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EthHdr {
    pub eth_dmac: MacAddr,
    pub eth_smac: MacAddr,
    pub eth_8021q: Option<EthQHdr>,
    pub eth_type: u16,
    /// Size of the ethernet header, including any 802.1q tag
    pub eth_size: u16,
}

impl EthHdr {
    pub fn parse(data: &[u8]) -> Result<EthHdr> {
        if data.len() < ETHER_LEN as usize {
            return Err(Error::Truncated("ethernet header too short".into()));
        }
        let mac = |d: &[u8]| {
            MacAddr::from_slice(d).map_err(|e| Error::Truncated(e.to_string()))
        };
        let mut eth_hdr = EthHdr {
            eth_dmac: mac(&data[0..6])?,
            eth_smac: mac(&data[6..12])?,
            eth_8021q: None,
            eth_type: get_u16(&data[12..])?,
            eth_size: ETHER_LEN,
        };

        if eth_hdr.eth_type == ETHER_VLAN {
            eth_hdr.eth_size = ETHER_LEN + 4;
            if data.len() < eth_hdr.eth_size as usize {
                return Err(Error::Truncated("vlan header too short".into()));
            }
            eth_hdr.eth_8021q = Some(get_u16(&data[14..])?.into());
            eth_hdr.eth_type = get_u16(&data[16..])?;
        }
        Ok(eth_hdr)
    }

    pub fn deparse(&self, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&self.eth_dmac.to_vec());
        bytes.extend_from_slice(&self.eth_smac.to_vec());
        if let Some(q) = self.eth_8021q {
            bytes.extend_from_slice(&ETHER_VLAN.to_be_bytes());
            bytes.extend_from_slice(&u16::from(q).to_be_bytes());
        }
        bytes.extend_from_slice(&self.eth_type.to_be_bytes());
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LldpHdr {
    pub lldp_data: Vec<LldpTlv>,
}

impl LldpHdr {
    /// Split the payload into TLVs.  Parsing stops after the End Of LLDPDU
    /// TLV; anything following it is link-layer padding.  A payload that
    /// runs out without an End TLV is accepted as long as every TLV it
    /// contains is complete.
    pub fn parse(data: &[u8]) -> Result<LldpHdr> {
        let mut lldp_data = Vec::new();
        let mut offset = 0;
        while offset < data.len() {
            let (tlv, bytes) = LldpTlv::parse(&data[offset..])?;
            let done = tlv.lldp_tlv_type == 0;
            offset += bytes;
            lldp_data.push(tlv);
            if done {
                break;
            }
        }
        if lldp_data.is_empty() {
            return Err(Error::Truncated("lldp packet has no data".into()));
        }
        Ok(LldpHdr { lldp_data })
    }

    pub fn size(&self) -> usize {
        self.lldp_data
            .iter()
            .map(|tlv| 2 + tlv.lldp_tlv_size as usize)
            .sum()
    }

    pub fn deparse(&self, bytes: &mut Vec<u8>) {
        for tlv in &self.lldp_data {
            tlv.deparse(bytes);
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LldpTlv {
    pub lldp_tlv_type: u8,  // 7 bits
    pub lldp_tlv_size: u16, // 9 bits
    pub lldp_tlv_octets: Vec<u8>,
}

impl LldpTlv {
    pub fn new(tlv_type: u8, tlv_data: &[u8]) -> Result<Self> {
        let tlv_size = tlv_data.len();
        if tlv_type & 0x80 != 0 {
            Err(Error::Invalid("Invalid tlv_type".into()))
        } else if tlv_size > TLV_MAX_OCTETS {
            Err(Error::Invalid("tlv_data exceeds 511 octets".into()))
        } else {
            Ok(LldpTlv {
                lldp_tlv_type: tlv_type,
                lldp_tlv_size: tlv_size as u16,
                lldp_tlv_octets: tlv_data.into(),
            })
        }
    }

    fn parse(data: &[u8]) -> Result<(LldpTlv, usize)> {
        if data.len() < 2 {
            return Err(Error::Truncated("lldp tlv prefix too short".into()));
        }

        let word = get_u16(data)?;
        let lldp_tlv_type = (word >> 9) as u8;
        let lldp_tlv_size = word & 0x1ff;
        let end = 2 + lldp_tlv_size as usize;

        if end > data.len() {
            return Err(Error::Truncated(format!(
                "lldp tlv type {lldp_tlv_type} claims {lldp_tlv_size} octets"
            )));
        }
        Ok((
            LldpTlv {
                lldp_tlv_type,
                lldp_tlv_size,
                lldp_tlv_octets: data[2..end].to_vec(),
            },
            end,
        ))
    }

    fn deparse(&self, bytes: &mut Vec<u8>) {
        let w = (self.lldp_tlv_type as u16) << 9 | self.lldp_tlv_size;
        bytes.extend_from_slice(&w.to_be_bytes());
        bytes.extend_from_slice(&self.lldp_tlv_octets);
    }
}

fn get_u16(data: &[u8]) -> Result<u16> {
    if data.len() < 2 {
        Err(Error::Truncated("buffer too small".into()))
    } else {
        Ok((data[0] as u16) << 8 | data[1] as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_lldp_parse() {
        let bytes = hex!(
            "
            0180 c200 000e 0007 436c f0d7 88cc 0207
            0400 0743 6cf0 d704 0703 0007 436c f0d7
            0602 0078 fe19 0080 c209 8000 0100 0032
            3200 0000 0000 0002 0202 0202 0202 02fe
            0600 80c2 0b88 08fe 0500 80c2 0c00 0000
        "
        );

        let p = Packet::parse(&bytes).unwrap().expect("lldp packet");
        assert_eq!(p.eth_hdr.eth_dmac, MacAddr::new(1, 0x80, 0xc2, 0, 0, 0x0e));
        assert_eq!(p.eth_hdr.eth_type, ETHER_LLDP);

        let hdr = p.lldp_hdr;
        assert_eq!(hdr.lldp_data.len(), 7);

        let expected = [
            (1, 7),    // chassis ID
            (2, 7),    // port ID ID
            (3, 2),    // ttl
            (127, 25), // ETS config
            (127, 6),  // flow control
            (127, 5),  // application protocl
            (0, 0),    // end of LLDPU
        ];

        for (idx, case) in expected.iter().enumerate() {
            assert_eq!(hdr.lldp_data[idx].lldp_tlv_type, case.0);
            assert_eq!(hdr.lldp_data[idx].lldp_tlv_size, case.1);
        }
    }

    #[test]
    fn test_non_lldp_frame() {
        // An IPv4 ethertype is silently ignored
        let bytes = hex!("ffff ffff ffff 0007 436c f0d7 0800 4500");
        assert_eq!(Packet::parse(&bytes).unwrap(), None);
    }

    #[test]
    fn test_vlan_tagged_frame() {
        let bytes = hex!(
            "
            0180 c200 000e 0007 436c f0d7 8100 2064
            88cc 0000
        "
        );
        let p = Packet::parse(&bytes).unwrap().expect("lldp packet");
        let q = p.eth_hdr.eth_8021q.expect("802.1q tag");
        assert_eq!(q.eth_pcp, 1);
        assert_eq!(q.eth_vlan_tag, 100);
        assert_eq!(p.lldp_hdr.lldp_data.len(), 1);
        assert_eq!(p.deparse(), bytes.to_vec());
    }

    #[test]
    fn test_truncated_tlv() {
        // The port ID claims 7 octets but only 3 are present
        let bytes = hex!("0180 c200 000e 0007 436c f0d7 88cc 0207 0400 07");
        assert!(matches!(Packet::parse(&bytes), Err(Error::Truncated(_))));
    }

    #[test]
    fn test_padding_after_end() {
        let bytes = hex!(
            "
            0180 c200 000e 0007 436c f0d7 88cc 0000
            0000 0000 0000 0000
        "
        );
        let p = Packet::parse(&bytes).unwrap().expect("lldp packet");
        assert_eq!(p.lldp_hdr.lldp_data.len(), 1);
    }
}
