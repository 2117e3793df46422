// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// An EUI-48 MAC address, used for layer-2 addressing.
#[derive(
    Clone,
    Copy,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
)]
pub struct MacAddr {
    a: [u8; 6],
}

impl From<[u8; 6]> for MacAddr {
    fn from(a: [u8; 6]) -> Self {
        Self { a }
    }
}

impl MacAddr {
    pub const ZERO: Self = MacAddr {
        a: [0, 0, 0, 0, 0, 0],
    };

    /// Create a new MAC address from octets in network byte order.
    pub const fn new(o0: u8, o1: u8, o2: u8, o3: u8, o4: u8, o5: u8) -> MacAddr {
        MacAddr {
            a: [o0, o1, o2, o3, o4, o5],
        }
    }

    /// Create a new MAC address from a slice of exactly 6 octets in network
    /// byte order.
    pub fn from_slice(s: &[u8]) -> Result<MacAddr, MacError> {
        match s.len().cmp(&6) {
            std::cmp::Ordering::Less => Err(MacError::TooShort),
            std::cmp::Ordering::Greater => Err(MacError::TooLong),
            std::cmp::Ordering::Equal => {
                Ok(MacAddr::new(s[0], s[1], s[2], s[3], s[4], s[5]))
            }
        }
    }

    /// Convert `self` to an array of bytes in network byte order.
    pub fn to_vec(self) -> Vec<u8> {
        self.a.to_vec()
    }

    /// Return `true` if `self` is the null MAC address, all zeros.
    pub fn is_null(self) -> bool {
        self == MacAddr::ZERO
    }

    /// Return `true` if the group bit of the first octet is set.
    pub fn is_multicast(self) -> bool {
        self.a[0] & 0x01 != 0
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MacError {
    /// Too few octets to be a valid MAC address
    #[error("Too few octets")]
    TooShort,
    /// Too many octets to be a valid MAC address
    #[error("Too many octets")]
    TooLong,
    /// Found an octet with a non-hexadecimal character or invalid separator
    #[error("Invalid octect")]
    InvalidOctet,
}

impl FromStr for MacAddr {
    type Err = MacError;

    fn from_str(s: &str) -> Result<Self, MacError> {
        let v: Vec<&str> = s.split(':').collect();

        match v.len().cmp(&6) {
            std::cmp::Ordering::Less => Err(MacError::TooShort),
            std::cmp::Ordering::Greater => Err(MacError::TooLong),
            std::cmp::Ordering::Equal => {
                let mut m = MacAddr::ZERO;
                for (i, octet) in v.iter().enumerate() {
                    m.a[i] = u8::from_str_radix(octet, 16)
                        .map_err(|_| MacError::InvalidOctet)?;
                }
                Ok(m)
            }
        }
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.a[0], self.a[1], self.a[2], self.a[3], self.a[4], self.a[5]
        )
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl From<MacAddr> for [u8; 6] {
    fn from(mac: MacAddr) -> [u8; 6] {
        mac.a
    }
}

#[test]
fn test_mac_parse() {
    let mac: MacAddr = "a8:40:25:0a:0b:0c".parse().unwrap();
    assert_eq!(mac, MacAddr::new(0xa8, 0x40, 0x25, 0x0a, 0x0b, 0x0c));
    assert_eq!(mac.to_string(), "a8:40:25:0a:0b:0c");
    assert!(!mac.is_multicast());

    assert_eq!("a8:40:25".parse::<MacAddr>(), Err(MacError::TooShort));
    assert_eq!(
        "a8:40:25:0a:0b:0c:0d".parse::<MacAddr>(),
        Err(MacError::TooLong)
    );
    assert_eq!(
        "a8:40:25:0a:0b:zz".parse::<MacAddr>(),
        Err(MacError::InvalidOctet)
    );
}

#[test]
fn test_mac_from_slice() {
    assert_eq!(MacAddr::from_slice(&[1, 2, 3]), Err(MacError::TooShort));
    assert_eq!(
        MacAddr::from_slice(&[1, 0x80, 0xc2, 0, 0, 0x0e]),
        Ok(MacAddr::new(1, 0x80, 0xc2, 0, 0, 0x0e))
    );
    assert!(MacAddr::new(1, 0x80, 0xc2, 0, 0, 0x0e).is_multicast());
}
