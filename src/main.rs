// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Hub server entry point.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{CommandFactory, Parser};
use smarthub::broker::{Broker, DEFAULT_PORT};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding the registry and device records
    #[arg(default_value = ".")]
    data_dir: PathBuf,

    /// Listening port
    #[arg(default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Listening address
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Seconds a client may take to send its message (0 disables the limit)
    #[arg(long, default_value_t = 10)]
    read_timeout_secs: u64,

    /// Port devices accept pushed CONTROL messages on
    #[arg(long)]
    device_port: Option<u16>,
}

/// Splits the command line into what `Args` understands and unknown flags.
///
/// Unknown flags are dropped on their own; whatever follows them is parsed
/// as usual.
fn split_args(raw: impl IntoIterator<Item = String>) -> (Vec<String>, Vec<String>) {
    let command = Args::command();
    let takes_value = |flag: &str| {
        command.get_arguments().find_map(|arg| {
            let long = arg.get_long().is_some_and(|l| flag.strip_prefix("--") == Some(l));
            let short = arg.get_short().is_some_and(|c| flag == format!("-{c}"));
            (long || short).then_some(arg.get_action().takes_values())
        })
    };

    let mut known = Vec::new();
    let mut unknown = Vec::new();
    let mut raw = raw.into_iter();
    known.extend(raw.next());

    let mut positional_only = false;
    while let Some(arg) = raw.next() {
        if positional_only || arg == "-" || !arg.starts_with('-') {
            known.push(arg);
            continue;
        }
        if arg == "--" {
            positional_only = true;
            known.push(arg);
            continue;
        }

        let (flag, inline_value) = match arg.split_once('=') {
            Some((flag, _)) => (flag.to_string(), true),
            None => (arg.clone(), false),
        };
        match takes_value(&flag) {
            Some(true) => {
                known.push(arg);
                if !inline_value {
                    known.extend(raw.next());
                }
            }
            Some(false) => known.push(arg),
            None if matches!(flag.as_str(), "-h" | "--help" | "-V" | "--version") => known.push(arg),
            None => unknown.push(arg),
        }
    }
    (known, unknown)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "smarthub=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let (known, unknown) = split_args(std::env::args());
    for flag in &unknown {
        tracing::warn!(flag = %flag, "Ignoring unrecognised argument");
    }
    let args = Args::parse_from(known);
    let read_timeout = (args.read_timeout_secs > 0).then(|| Duration::from_secs(args.read_timeout_secs));

    let broker = match Broker::builder()
        .host(args.host)
        .port(args.port)
        .data_dir(args.data_dir)
        .read_timeout(read_timeout)
        .device_port(args.device_port)
        .build()
        .await
    {
        Ok(broker) => broker,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start hub");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = broker.run().await {
        tracing::error!(error = %e, "Hub stopped with an error");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
