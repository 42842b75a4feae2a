// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Wire contract and session parameters.
//!
//! Both protocol ends must agree on every field of [`ProtocolConfig`]; the
//! receiver has no way to learn them from the byte stream. [`SessionConfig`]
//! only affects the sending side.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// --- Fixed sizes ---

/// GCM authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Length of the associated-data header shared with the bootloader.
pub const HEADER_LEN: usize = 16;

/// Separator between key and header in the secret material file.
pub const SECRET_SEPARATOR: u8 = 0x0A;

/// Smallest plaintext block able to hold a START frame (type + 3 x u16).
pub const MIN_BLOCK_SIZE: usize = 7;

pub const MAX_BLOCK_SIZE: usize = 256;

pub const DEFAULT_BLOCK_SIZE: usize = 16;

pub const DEFAULT_MAX_RETRIES: u8 = 10;

pub const DEFAULT_RESPONSE_DELAY_MS: u64 = 100;

/// AES key size. A peer running AES-128 needs `Aes128` and a 16-byte key
/// file; the 256-bit default is not what every bootloader build expects.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum KeyLength {
    Aes128,
    #[default]
    Aes256,
}

impl KeyLength {
    pub fn bytes(self) -> usize {
        match self {
            KeyLength::Aes128 => 16,
            KeyLength::Aes256 => 32,
        }
    }
}

/// GCM nonce size. `Short` is the 96-bit native size, `Long` a 128-bit
/// nonce carried in full on the wire.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum NonceLength {
    Short,
    #[default]
    Long,
}

impl NonceLength {
    pub fn bytes(self) -> usize {
        match self {
            NonceLength::Short => 12,
            NonceLength::Long => 16,
        }
    }
}

/// Endianness of the integer fields inside a START frame.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

impl ByteOrder {
    pub fn write_u16(self, value: u16) -> [u8; 2] {
        match self {
            ByteOrder::Little => value.to_le_bytes(),
            ByteOrder::Big => value.to_be_bytes(),
        }
    }

    pub fn read_u16(self, bytes: [u8; 2]) -> u16 {
        match self {
            ByteOrder::Little => u16::from_le_bytes(bytes),
            ByteOrder::Big => u16::from_be_bytes(bytes),
        }
    }
}

/// Placement of tag and nonce after the ciphertext block.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum WireOrder {
    /// `ciphertext ∥ tag ∥ nonce`
    #[default]
    TagThenNonce,
    /// `ciphertext ∥ nonce ∥ tag`
    NonceThenTag,
}

/// Frame layout shared by the packaging tool, the update client and the
/// bootloader. The defaults are a starting point, not a description of any
/// particular bootloader build; both ends must be configured alike.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct ProtocolConfig {
    pub key_length: KeyLength,
    pub nonce_length: NonceLength,
    /// Plaintext bytes per frame, type byte included.
    pub block_size: usize,
    pub byte_order: ByteOrder,
    pub wire_order: WireOrder,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            key_length: KeyLength::default(),
            nonce_length: NonceLength::default(),
            block_size: DEFAULT_BLOCK_SIZE,
            byte_order: ByteOrder::default(),
            wire_order: WireOrder::default(),
        }
    }
}

impl ProtocolConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&self.block_size) {
            return Err(ConfigError::InvalidBlockSize(self.block_size));
        }
        Ok(())
    }

    pub fn key_len(&self) -> usize {
        self.key_length.bytes()
    }

    pub fn nonce_len(&self) -> usize {
        self.nonce_length.bytes()
    }

    /// Payload bytes carried by one DATA frame.
    pub fn chunk_size(&self) -> usize {
        self.block_size - 1
    }

    /// Encrypted length of every non-response frame on the wire.
    pub fn frame_len(&self) -> usize {
        self.block_size + TAG_LEN + self.nonce_len()
    }

    /// Encrypted length of the START frame. Same as [`Self::frame_len`]
    /// in this layout; kept separate so callers never assume it.
    pub fn start_frame_len(&self) -> usize {
        self.frame_len()
    }

    /// Exact size of a secret material file for this configuration.
    pub fn secret_len(&self) -> usize {
        self.key_len() + 1 + HEADER_LEN
    }
}

/// Sender-side retry and pacing policy.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct SessionConfig {
    /// Resends allowed per frame before giving up.
    pub max_retries: u8,
    /// Pause between writing a frame and reading its response.
    pub response_delay_ms: u64,
    /// `None` waits for the handshake echo forever.
    pub handshake_timeout_ms: Option<u64>,
    /// Count a read timeout before any response byte as an ERROR response.
    /// Once the type byte has arrived, timeouts only extend the wait for the
    /// code byte (at most `max_retries` times) and never trigger a resend.
    pub retry_on_timeout: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            response_delay_ms: DEFAULT_RESPONSE_DELAY_MS,
            handshake_timeout_ms: None,
            retry_on_timeout: false,
        }
    }
}

impl SessionConfig {
    pub fn response_delay(&self) -> Duration {
        Duration::from_millis(self.response_delay_ms)
    }

    pub fn handshake_timeout(&self) -> Option<Duration> {
        self.handshake_timeout_ms.map(Duration::from_millis)
    }
}
