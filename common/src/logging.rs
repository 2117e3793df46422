// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

use std::fs::File;
use std::str::FromStr;

use slog::{o, Drain};

/// How log records are rendered
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum LogFormat {
    /// Terminal-friendly text
    Human,
    /// Bunyan-style JSON, one record per line
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "h" | "human" => Ok(LogFormat::Human),
            "j" | "json" => Ok(LogFormat::Json),
            _ => Err(format!("invalid log format: {s}")),
        }
    }
}

// Records are handed to a background thread, so a slow sink never holds up
// the state machines.
const ASYNC_CHAN_SIZE: usize = 32768;

fn async_root<D>(drain: D) -> slog::Logger
where
    D: Drain<Ok = (), Err = slog::Never> + Send + 'static,
{
    let drain = slog_async::Async::new(drain)
        .chan_size(ASYNC_CHAN_SIZE)
        .build()
        .fuse();
    slog::Logger::root(drain, o!())
}

fn file_root(name: &'static str, file: File, format: LogFormat) -> slog::Logger {
    match format {
        LogFormat::Json => {
            async_root(slog_bunyan::with_name(name, file).build().fuse())
        }
        LogFormat::Human => {
            let decorator = slog_term::PlainDecorator::new(file);
            async_root(slog_term::FullFormat::new(decorator).build().fuse())
        }
    }
}

/// Build the root logger for a daemon, writing to `log_file` if one is
/// given and to stdout otherwise.  An existing log file is appended to.
pub fn init(
    name: &'static str,
    log_file: &Option<String>,
    log_format: LogFormat,
) -> anyhow::Result<slog::Logger> {
    let log = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            file_root(name, file, log_format)
        }
        None => match log_format {
            LogFormat::Json => async_root(
                slog_bunyan::with_name(name, std::io::stdout()).build().fuse(),
            ),
            LogFormat::Human => {
                let decorator = slog_term::TermDecorator::new().build();
                async_root(slog_term::FullFormat::new(decorator).build().fuse())
            }
        },
    };
    Ok(log)
}
