// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! Raw ethernet access to the host's interfaces.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use pnet_datalink::Channel;
use pnet_datalink::DataLinkReceiver;
use pnet_datalink::DataLinkSender;
use slog::debug;
use slog::error;
use tokio::sync::mpsc;

use lldpd::mib;
use lldpd::transport::Transport;
use lldpd::LldpdError;
use lldpd::LldpdResult;
use protocol::packet::EthHdr;
use protocol::MacAddr;

/// A frame received on the port with the given index
pub type RxFrame = (u32, Vec<u8>);

/// An interface opened for LLDP traffic
pub struct Interface {
    pub name: String,
    pub mac: MacAddr,
    pub tx: Box<dyn DataLinkSender>,
    pub rx: Box<dyn DataLinkReceiver>,
}

pub fn open(name: &str) -> LldpdResult<Interface> {
    let iface = pnet_datalink::interfaces()
        .into_iter()
        .find(|i| i.name == name)
        .ok_or_else(|| LldpdError::Missing(format!("no such interface: {name}")))?;
    let mac = iface
        .mac
        .map(|m| MacAddr::new(m.0, m.1, m.2, m.3, m.4, m.5))
        .ok_or_else(|| {
            LldpdError::Invalid(format!("{name} has no mac address"))
        })?;

    // The timeout lets the receive thread notice when the daemon exits
    let config = pnet_datalink::Config {
        read_timeout: Some(Duration::from_secs(1)),
        ..Default::default()
    };
    match pnet_datalink::channel(&iface, config) {
        Ok(Channel::Ethernet(tx, rx)) => Ok(Interface {
            name: name.to_string(),
            mac,
            tx,
            rx,
        }),
        Ok(_) => Err(LldpdError::Transport(format!(
            "{name}: unsupported channel type"
        ))),
        Err(e) => Err(LldpdError::Transport(format!(
            "failed to open {name}: {e}"
        ))),
    }
}

/// Is the link on this interface up?
#[cfg(target_os = "linux")]
pub fn link_up(name: &str) -> bool {
    std::fs::read_to_string(format!("/sys/class/net/{name}/operstate"))
        .map(|state| matches!(state.trim(), "up" | "unknown"))
        .unwrap_or(false)
}

#[cfg(not(target_os = "linux"))]
pub fn link_up(name: &str) -> bool {
    pnet_datalink::interfaces()
        .iter()
        .any(|i| i.name == name && i.is_up())
}

/// Sends the agent's frames out of the matching interface
#[derive(Default)]
pub struct PnetTransport {
    senders: BTreeMap<u32, Box<dyn DataLinkSender>>,
}

impl PnetTransport {
    pub fn add_port(&mut self, port_index: u32, tx: Box<dyn DataLinkSender>) {
        self.senders.insert(port_index, tx);
    }
}

impl Transport for PnetTransport {
    fn send(&mut self, port_index: u32, frame: &[u8]) -> LldpdResult<()> {
        let tx = self.senders.get_mut(&port_index).ok_or_else(|| {
            LldpdError::Missing(format!("no sender for port {port_index}"))
        })?;
        match tx.send_to(frame, None) {
            Some(Ok(())) => Ok(()),
            Some(Err(e)) => Err(LldpdError::Transport(e.to_string())),
            None => Err(LldpdError::Transport("send buffer full".into())),
        }
    }
}

/// Forward every LLDP frame arriving on the interface to the agent's task.
/// Frames we sent ourselves are dropped.  The thread exits when `done` is
/// set, when the agent's task goes away, or when the interface fails.
pub fn spawn_receiver(
    log: slog::Logger,
    port_index: u32,
    mac: MacAddr,
    mut rx: Box<dyn DataLinkReceiver>,
    frames: mpsc::UnboundedSender<RxFrame>,
    done: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        while !done.load(Ordering::Relaxed) {
            match rx.next() {
                Ok(frame) => {
                    if !mib::is_lldp_frame(frame) {
                        continue;
                    }
                    if EthHdr::parse(frame).is_ok_and(|h| h.eth_smac == mac) {
                        continue;
                    }
                    if frames.send((port_index, frame.to_vec())).is_err() {
                        break;
                    }
                }
                Err(e)
                    if e.kind() == ErrorKind::TimedOut
                        || e.kind() == ErrorKind::WouldBlock
                        || e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    error!(log, "receive failed"; "err" => e.to_string());
                    break;
                }
            }
        }
        debug!(log, "receiver exiting");
    })
}
