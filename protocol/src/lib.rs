// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! Wire formats for the Link Layer Discovery Protocol, as defined by IEEE
//! 802.1AB.

pub mod macaddr;
pub mod packet;
pub mod types;

pub use macaddr::MacAddr;
