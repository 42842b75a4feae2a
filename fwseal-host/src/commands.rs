// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command implementations.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use crc::{Crc, CRC_32_ISO_HDLC};
use indicatif::{ProgressBar, ProgressStyle};

use fwseal_common::bundle::{open_bundle, Bundle, BundleBuilder};
use fwseal_common::frame::FrameCodec;
use fwseal_common::receiver::Receiver;
use fwseal_common::secret::SecretMaterial;
use fwseal_common::session::UpdateSession;
use fwseal_common::transport::StreamTransport;

use crate::config::ToolConfig;
use crate::transport::{Link, LinkSpec, Listener, DEFAULT_TIMEOUT_MS};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

fn load_secret(config: &ToolConfig, path: &Path) -> Result<SecretMaterial> {
    SecretMaterial::load(path, &config.protocol)
        .with_context(|| format!("Failed to load secret material {}", path.display()))
}

fn load_bundle(config: &ToolConfig, path: &Path) -> Result<Bundle> {
    Bundle::load(path, &config.protocol)
        .with_context(|| format!("Failed to load bundle {}", path.display()))
}

/// Write a new key and header file, readable by the owner only.
pub fn keygen(config: &ToolConfig, out: &Path, force: bool) -> Result<()> {
    config.protocol.validate()?;
    let secret = SecretMaterial::generate(&config.protocol);

    let mut options = OpenOptions::new();
    options.write(true);
    if force {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(out)
        .with_context(|| format!("Failed to create {}", out.display()))?;
    file.write_all(&secret.to_bytes())?;

    println!(
        "Secret:   {} ({}-bit key, {} bytes)",
        out.display(),
        config.protocol.key_len() * 8,
        config.protocol.secret_len()
    );
    Ok(())
}

/// Package firmware and release message into a protected bundle.
pub fn protect(
    config: &ToolConfig,
    infile: &Path,
    outfile: &Path,
    version: u16,
    message: &str,
    secret: &Path,
    allow_empty: bool,
) -> Result<()> {
    let firmware =
        fs::read(infile).with_context(|| format!("Failed to read {}", infile.display()))?;
    let secret = load_secret(config, secret)?;

    println!(
        "Firmware: {} ({} bytes, CRC32: 0x{:08x})",
        infile.display(),
        firmware.len(),
        CRC32.checksum(&firmware)
    );
    println!("Version:  {}", version);
    if !message.is_empty() {
        println!("Message:  {}", message);
    }

    let bundle = BundleBuilder::new(&config.protocol, &secret)?
        .allow_empty_firmware(allow_empty)
        .build(&firmware, version, message)
        .context("Failed to build bundle")?;
    bundle
        .save(outfile)
        .with_context(|| format!("Failed to write {}", outfile.display()))?;

    println!(
        "Bundle:   {} ({} frames, {} bytes)",
        outfile.display(),
        bundle.frame_count(),
        bundle.as_bytes().len()
    );
    Ok(())
}

/// Replay a protected bundle to the bootloader.
pub fn update(config: &ToolConfig, bundle: &Path, port: &LinkSpec) -> Result<()> {
    let bundle_path = bundle;
    let bundle = load_bundle(config, bundle_path)?;
    let link = Link::open(port, Duration::from_millis(DEFAULT_TIMEOUT_MS))?;

    println!(
        "Bundle:   {} ({} frames)",
        bundle_path.display(),
        bundle.frame_count()
    );
    println!("Link:     {}", port);
    println!();
    // The request byte goes out once. A bootloader that is not yet listening
    // will miss it, so the device must already be in update mode.
    println!("Requesting update mode (put the bootloader in update mode first)...");
    if config.session.handshake_timeout_ms.is_none() {
        println!("No handshake timeout set; set session.handshake-timeout-ms to bound the wait.");
    }

    let pb = ProgressBar::new(bundle.frame_count() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} frames ({eta})")?
            .progress_chars("#>-"),
    );
    let bar = pb.clone();

    let mut session = UpdateSession::new(StreamTransport::new(link), config.session)
        .on_frame_acknowledged(move |done, _| bar.set_position(done as u64));

    let report = match session.run(&bundle) {
        Ok(report) => report,
        Err(failure) => {
            pb.abandon();
            return Err(failure).context("Update aborted");
        }
    };
    pb.finish_with_message("Update complete");
    session.close()?;

    println!();
    println!(
        "Firmware delivered: {} frames, {} resends",
        report.frames_sent, report.total_retries
    );
    Ok(())
}

/// Decrypt a bundle and print what the bootloader would install.
pub fn inspect(
    config: &ToolConfig,
    bundle: &Path,
    secret: &Path,
    extract: Option<&Path>,
) -> Result<()> {
    let bundle_path = bundle;
    let bundle = load_bundle(config, bundle_path)?;
    let secret = load_secret(config, secret)?;
    let codec = FrameCodec::new(&config.protocol, &secret)?;

    let image = open_bundle(&bundle, &codec)
        .with_context(|| format!("Failed to open {}", bundle_path.display()))?;

    println!("Bundle:   {} ({} frames)", bundle_path.display(), bundle.frame_count());
    println!(
        "Version:  {}{}",
        image.version,
        if image.version == 0 { " (debug)" } else { "" }
    );
    println!(
        "Firmware: {} bytes, CRC32: 0x{:08x}",
        image.firmware.len(),
        CRC32.checksum(&image.firmware)
    );
    println!("Message:  {}", image.message);

    if let Some(path) = extract {
        fs::write(path, &image.firmware)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Extracted firmware to {}", path.display());
    }
    Ok(())
}

/// Serve one update like a bootloader would and store the firmware.
pub fn emulate(
    config: &ToolConfig,
    listen: &LinkSpec,
    secret: &Path,
    installed_version: u16,
    out: &Path,
) -> Result<()> {
    let secret = load_secret(config, secret)?;
    let codec = FrameCodec::new(&config.protocol, &secret)?;
    let listener = Listener::bind(listen)?;

    println!("Emulated bootloader (installed version {})", installed_version);
    println!("Listening on {}", listener.describe());

    let mut transport = StreamTransport::new(listener.accept()?);
    let mut receiver = Receiver::new(codec, installed_version);
    let image = receiver
        .serve(&mut transport)
        .context("Emulated bootloader stopped")?;

    fs::write(out, &image.firmware)
        .with_context(|| format!("Failed to write {}", out.display()))?;

    println!();
    println!("Accepted version {}", image.version);
    println!(
        "Firmware: {} ({} bytes, CRC32: 0x{:08x})",
        out.display(),
        image.firmware.len(),
        CRC32.checksum(&image.firmware)
    );
    if !image.message.is_empty() {
        println!("Message:  {}", image.message);
    }
    Ok(())
}
