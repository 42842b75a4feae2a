// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command-line interface definitions.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands;
use crate::config::ToolConfig;
use crate::transport::LinkSpec;

/// Command-line arguments.
#[derive(Parser)]
#[command(name = "fwseal")]
#[command(about = "Protect firmware images and deliver them to an fwseal bootloader")]
pub struct Cli {
    /// Protocol and session settings (TOML)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Generate a fresh key and header file
    Keygen {
        /// Secret material output file
        #[arg(value_name = "FILE")]
        out: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Package a firmware image into a protected bundle
    Protect {
        /// Raw firmware binary
        #[arg(short, long, value_name = "FILE")]
        infile: PathBuf,

        /// Protected bundle output
        #[arg(short, long, value_name = "FILE")]
        outfile: PathBuf,

        /// Firmware version (0 = debug build, keeps the installed version)
        #[arg(short, long)]
        version: u16,

        /// Release message shown by the bootloader
        #[arg(short, long, default_value = "")]
        message: String,

        /// Secret material file shared with the bootloader
        #[arg(short, long)]
        secret: PathBuf,

        /// Accept an empty firmware image
        #[arg(long)]
        allow_empty: bool,
    },

    /// Deliver a protected bundle to a bootloader
    ///
    /// The bootloader must already be in update mode: the 'U' request is
    /// sent once and then the tool waits for the echo.
    Update {
        /// Protected bundle
        #[arg(short, long, value_name = "FILE")]
        firmware: PathBuf,

        /// Link to the bootloader: serial device, unix:<path> or tcp:<host:port>
        #[arg(short, long)]
        port: LinkSpec,
    },

    /// Decrypt a protected bundle and show its contents
    Inspect {
        /// Protected bundle
        #[arg(value_name = "FILE")]
        bundle: PathBuf,

        /// Secret material file
        #[arg(short, long)]
        secret: PathBuf,

        /// Write the decrypted firmware here
        #[arg(long, value_name = "FILE")]
        extract: Option<PathBuf>,
    },

    /// Run a bootloader emulator that accepts one update
    Emulate {
        /// Where to listen: unix:<path> or tcp:<host:port>
        #[arg(short, long)]
        listen: LinkSpec,

        /// Secret material file
        #[arg(short, long)]
        secret: PathBuf,

        /// Version reported as already installed
        #[arg(long, default_value = "0")]
        installed_version: u16,

        /// File receiving the accepted firmware
        #[arg(short, long)]
        out: PathBuf,
    },
}

/// Execute the parsed CLI command.
pub fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => ToolConfig::load(path)?,
        None => ToolConfig::default(),
    };

    match cli.command {
        Commands::Keygen { out, force } => commands::keygen(&config, &out, force),
        Commands::Protect {
            infile,
            outfile,
            version,
            message,
            secret,
            allow_empty,
        } => commands::protect(
            &config,
            &infile,
            &outfile,
            version,
            &message,
            &secret,
            allow_empty,
        ),
        Commands::Update { firmware, port } => commands::update(&config, &firmware, &port),
        Commands::Inspect {
            bundle,
            secret,
            extract,
        } => commands::inspect(&config, &bundle, &secret, extract.as_deref()),
        Commands::Emulate {
            listen,
            secret,
            installed_version,
            out,
        } => commands::emulate(&config, &listen, &secret, installed_version, &out),
    }
}
