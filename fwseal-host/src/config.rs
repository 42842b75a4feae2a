// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Optional TOML settings file.
//!
//! ```toml
//! [protocol]
//! key-length = "aes128"
//! nonce-length = "long"
//!
//! [session]
//! max-retries = 5
//! response-delay-ms = 50
//! ```
//!
//! Every key is optional; missing ones take the bootloader defaults.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use fwseal_common::config::{ProtocolConfig, SessionConfig};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct ToolConfig {
    pub protocol: ProtocolConfig,
    pub session: SessionConfig,
}

impl ToolConfig {
    pub fn load(path: &Path) -> Result<Self> {
        info!(path = %path.display(), "loading configuration");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Invalid configuration {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.protocol.validate()?;
        Ok(config)
    }
}
