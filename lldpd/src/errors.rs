// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

use std::convert;

#[derive(Debug, thiserror::Error)]
pub enum LldpdError {
    #[error("I/O error: {0:?}")]
    Io(std::io::Error),
    #[error("No such resource: {0}")]
    Missing(String),
    #[error("Invalid argument: {0}")]
    Invalid(String),
    #[error("LLDP protocol error: {0}")]
    Protocol(String),
    /// The lower layer refused or failed to send a frame
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("error: {0}")]
    Other(String),
}

impl convert::From<std::io::Error> for LldpdError {
    fn from(err: std::io::Error) -> Self {
        LldpdError::Io(err)
    }
}

impl convert::From<protocol::types::Error> for LldpdError {
    fn from(err: protocol::types::Error) -> Self {
        LldpdError::Protocol(err.to_string())
    }
}

impl convert::From<String> for LldpdError {
    fn from(err: String) -> Self {
        LldpdError::Other(err)
    }
}

impl convert::From<&str> for LldpdError {
    fn from(err: &str) -> Self {
        LldpdError::Other(err.to_string())
    }
}

impl convert::From<anyhow::Error> for LldpdError {
    fn from(err: anyhow::Error) -> Self {
        LldpdError::Other(err.to_string())
    }
}
