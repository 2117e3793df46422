// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::StreamExt;
use signal_hook::consts::signal::*;
use signal_hook_tokio::Signals;
use slog::debug;
use slog::error;
use slog::info;
use structopt::StructOpt;
use tokio::sync::mpsc;

use lldpd::mib::SystemInfo;
use lldpd::port::PortConfig;
use lldpd::types;
use lldpd::types::AdminStatus;
use lldpd::AgentContext;
use lldpd::LldpAgent;
use lldpd::LldpdResult;
use protocol::types::ChassisId;

mod plat;

#[derive(Debug, StructOpt)]
#[structopt(name = "lldpd", about = "Oxide LLDP daemon")]
enum Args {
    /// Run the LLDP agent on a set of interfaces.
    Run(Opt),
}

#[derive(Clone, Debug, StructOpt)]
pub(crate) struct Opt {
    #[structopt(long, about = "log file")]
    log_file: Option<String>,

    #[structopt(
        long,
        short = "l",
        default_value = "json",
        about = "log format",
        help = "format logs for 'human' or 'json' consumption"
    )]
    log_format: common::logging::LogFormat,

    #[structopt(
        long = "interface",
        short = "i",
        required = true,
        number_of_values = 1,
        help = "interface to run LLDP on (may be repeated)"
    )]
    interfaces: Vec<String>,

    #[structopt(
        long = "chassis",
        short = "c",
        about = "String to use as the ChassisID"
    )]
    chassis_id: Option<String>,

    #[structopt(
        long = "name",
        short = "n",
        about = "String to use as the SystemName"
    )]
    system_name: Option<String>,

    #[structopt(
        long = "desc",
        short = "d",
        about = "String to use as the SystemDescription"
    )]
    system_description: Option<String>,

    #[structopt(long, default_value = "30", help = "seconds between LLDPDUs")]
    msg_tx_interval: u16,

    #[structopt(
        long,
        default_value = "4",
        help = "multiple of msg-tx-interval advertised as our TTL"
    )]
    msg_tx_hold: u16,

    #[structopt(
        long,
        default_value = "2",
        help = "seconds to wait after a shutdown before reinitializing"
    )]
    reinit_delay: u16,

    #[structopt(
        long,
        default_value = "2",
        help = "minimum seconds between successive LLDPDUs"
    )]
    tx_delay: u16,

    #[structopt(
        long,
        default_value = "rxtx",
        help = "initial admin status: rxtx, rxonly, txonly, or disabled"
    )]
    admin_status: AdminStatus,
}

fn get_uname(opt: &str) -> String {
    const UNAME: &str = "/usr/bin/uname";

    if let Ok(out) = std::process::Command::new(UNAME).args(vec![opt]).output()
    {
        if out.status.success() {
            return String::from_utf8_lossy(&out.stdout).trim().to_string();
        }
    }
    "unknown".to_string()
}

fn get_sysinfo(opts: &Opt) -> SystemInfo {
    let chassis_id = match &opts.chassis_id {
        Some(c) => c.to_string(),
        None => get_uname("-n"),
    };
    let system_name = match &opts.system_name {
        Some(s) => s.to_string(),
        None => get_uname("-n"),
    };
    let system_description = match &opts.system_description {
        Some(d) => d.to_string(),
        None => get_uname("-a"),
    };
    let mut sysinfo = SystemInfo::new(ChassisId::ChassisComponent(chassis_id));
    sysinfo.system_name = Some(system_name);
    sysinfo.system_description = Some(system_description);
    sysinfo
}

fn get_agent(opts: &Opt) -> types::Agent {
    types::Agent {
        admin_status: opts.admin_status,
        msg_tx_interval: opts.msg_tx_interval,
        msg_tx_hold: opts.msg_tx_hold,
        reinit_delay: opts.reinit_delay,
        tx_delay: opts.tx_delay,
        ..Default::default()
    }
}

// Poll the link state of every port, then advance the agent's clock.
fn tick(agent: &LldpAgent, names: &[String]) -> LldpdResult<()> {
    let mut ctx = agent.lock()?;
    for (idx, name) in names.iter().enumerate() {
        ctx.set_port_enabled(idx as u32 + 1, plat::link_up(name))?;
    }
    ctx.tick();
    Ok(())
}

// Stop advertising on every port, sending each neighbor a shutdown LLDPDU.
fn shutdown(agent: &LldpAgent, nports: usize) -> LldpdResult<()> {
    let mut ctx = agent.lock()?;
    for port_index in 1..=nports as u32 {
        ctx.set_admin_status(port_index, AdminStatus::Disabled, true)?;
    }
    Ok(())
}

async fn run_lldpd(opts: Opt) -> LldpdResult<()> {
    let log = common::logging::init("lldpd", &opts.log_file, opts.log_format)?;

    let sysinfo = get_sysinfo(&opts);
    debug!(log, "system info: {sysinfo:?}");

    let mut transport = plat::PnetTransport::default();
    let mut ports = Vec::new();
    let mut receivers = Vec::new();
    for (idx, name) in opts.interfaces.iter().enumerate() {
        let iface = plat::open(name)?;
        info!(log, "opened {}", iface.name; "mac" => iface.mac.to_string());
        let port_index = idx as u32 + 1;
        transport.add_port(port_index, iface.tx);
        ports.push(PortConfig::new(name, iface.mac));
        receivers.push((port_index, iface.mac, iface.rx));
    }

    let mut ctx = AgentContext::new(
        &log,
        get_agent(&opts),
        sysinfo,
        ports,
        Box::new(transport),
    )?;
    ctx.init_fsm();
    let agent = LldpAgent::new(ctx);

    let done = Arc::new(AtomicBool::new(false));
    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel();
    let threads = receivers
        .into_iter()
        .map(|(port_index, mac, rx)| {
            let log = log.new(slog::o!("unit" => "receiver",
                "port" => port_index));
            plat::spawn_receiver(
                log,
                port_index,
                mac,
                rx,
                frame_tx.clone(),
                done.clone(),
            )
        })
        .collect::<Vec<_>>();
    drop(frame_tx);

    let mut signals = Signals::new([SIGTERM, SIGQUIT, SIGINT])?;
    let period = Duration::from_secs(1);
    let mut ticker =
        tokio::time::interval_at(tokio::time::Instant::now() + period, period);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = tick(&agent, &opts.interfaces) {
                    error!(log, "tick failed: {e}");
                }
            }
            Some((port_index, frame)) = frame_rx.recv() => {
                agent.lock()?.process_frame(port_index, &frame);
            }
            Some(signal) = signals.next() => {
                info!(log, "caught signal {signal} - exiting");
                break;
            }
        }
    }

    if let Err(e) = shutdown(&agent, opts.interfaces.len()) {
        error!(log, "failed to shut down ports: {e}");
    }
    signals.handle().close();
    done.store(true, Ordering::Relaxed);
    for t in threads {
        if t.join().is_err() {
            error!(log, "receiver thread panicked");
        }
    }

    info!(log, "exiting");
    Ok(())
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> LldpdResult<()> {
    let args = Args::from_args();

    match args {
        Args::Run(opt) => run_lldpd(opt).await,
    }
}
