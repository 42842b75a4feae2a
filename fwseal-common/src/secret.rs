// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Secret material shared with the bootloader out of band.
//!
//! File layout: `key ∥ 0x0a ∥ header`, where the key is 16 or 32 bytes
//! (per [`ProtocolConfig::key_length`]) and the header is 16 bytes. The
//! header is the associated data bound to every frame.

use std::fmt;
use std::fs;
use std::path::Path;

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::config::{ProtocolConfig, HEADER_LEN, SECRET_SEPARATOR};
use crate::error::ConfigError;

/// AEAD key plus associated-data header. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretMaterial {
    key: Vec<u8>,
    header: [u8; HEADER_LEN],
}

impl SecretMaterial {
    /// Parse secret material, rejecting anything but the exact layout for `cfg`.
    pub fn parse(bytes: &[u8], cfg: &ProtocolConfig) -> Result<Self, ConfigError> {
        let key_len = cfg.key_len();
        let expected = cfg.secret_len();
        if bytes.len() != expected {
            return Err(ConfigError::SecretLength {
                expected,
                actual: bytes.len(),
            });
        }
        if bytes[key_len] != SECRET_SEPARATOR {
            return Err(ConfigError::MissingSeparator { key_len });
        }

        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&bytes[key_len + 1..]);
        Ok(Self {
            key: bytes[..key_len].to_vec(),
            header,
        })
    }

    /// Read and parse a secret material file.
    pub fn load(path: &Path, cfg: &ProtocolConfig) -> Result<Self, ConfigError> {
        let mut bytes = fs::read(path)?;
        let parsed = Self::parse(&bytes, cfg);
        bytes.zeroize();
        parsed
    }

    /// Draw a fresh key and header from the OS RNG.
    pub fn generate(cfg: &ProtocolConfig) -> Self {
        let mut key = vec![0u8; cfg.key_len()];
        let mut header = [0u8; HEADER_LEN];
        OsRng.fill_bytes(&mut key);
        OsRng.fill_bytes(&mut header);
        Self { key, header }
    }

    /// Serialize in the on-disk layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.key.len() + 1 + HEADER_LEN);
        out.extend_from_slice(&self.key);
        out.push(SECRET_SEPARATOR);
        out.extend_from_slice(&self.header);
        out
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn header(&self) -> &[u8; HEADER_LEN] {
        &self.header
    }
}

impl fmt::Debug for SecretMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretMaterial")
            .field("key_len", &self.key.len())
            .finish_non_exhaustive()
    }
}
