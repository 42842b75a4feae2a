// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Firmware protection and update tool for fwseal bootloaders.
//!
//! Usage:
//!   fwseal keygen secret.bin
//!   fwseal protect --infile firmware.bin --outfile firmware.prot --version 3 --message "v3" --secret secret.bin
//!   fwseal update --firmware firmware.prot --port /dev/ttyACM0
//!   fwseal inspect firmware.prot --secret secret.bin
//!   fwseal emulate --listen tcp:127.0.0.1:5555 --secret secret.bin --out received.bin

mod cli;
mod commands;
mod config;
mod transport;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    let args = cli::Cli::parse();
    init_logging(if args.debug { "debug" } else { "info" });
    cli::run(args)
}

/// Log to stderr; `RUST_LOG` overrides `level`.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .ok();
}
