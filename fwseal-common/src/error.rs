// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Error taxonomy for packaging and delivery.
//!
//! Messages never include key or header bytes.

use std::io;

use thiserror::Error;

/// Malformed configuration or secret material. Always fatal.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("secret material is {actual} bytes, expected {expected}")]
    SecretLength { expected: usize, actual: usize },

    #[error("secret material has no 0x0a separator after the {key_len}-byte key")]
    MissingSeparator { key_len: usize },

    #[error("block size {0} is outside the supported range")]
    InvalidBlockSize(usize),

    #[error("failed to read secret material: {0}")]
    Io(#[from] io::Error),
}

/// AEAD tag verification failed. No plaintext is released.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("frame authentication failed")]
pub struct AuthError;

/// A single frame could not be decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("malformed frame: {actual} bytes, expected {expected}")]
    Malformed { expected: usize, actual: usize },

    #[error("unknown frame type 0x{0:02x}")]
    UnknownType(u8),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("frame encryption failed")]
    Encrypt,
}

/// Building, loading or opening a protected bundle failed.
#[derive(Error, Debug)]
pub enum BundleError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("firmware image is empty")]
    EmptyFirmware,

    #[error("firmware image is {0} bytes, the START frame can describe at most 65535")]
    FirmwareTooLarge(usize),

    #[error("release message is {0} bytes with terminator, at most 65535 allowed")]
    MessageTooLarge(usize),

    #[error("release message contains a NUL byte")]
    MessageContainsNul,

    #[error("bundle is {len} bytes, not a whole number of {frame_len}-byte frames")]
    Misaligned { len: usize, frame_len: usize },

    #[error("bundle holds {0} frames, a START and an END frame are required")]
    TooFewFrames(usize),

    #[error("frame {index}: {source}")]
    Frame {
        index: usize,
        #[source]
        source: FrameError,
    },

    #[error("frame {index}: expected {expected}, found {found}")]
    UnexpectedFrame {
        index: usize,
        expected: &'static str,
        found: &'static str,
    },

    #[error("bundle has {extra} frames after END")]
    TrailingFrames { extra: usize },

    #[error("bundle ends before frame {0}")]
    Truncated(usize),

    #[error("bundle I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// Terminal outcome of an update session. ERROR responses within the retry
/// budget never surface here.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("protocol violation: response type 0x{response_type:02x}, code 0x{code:02x}")]
    ProtocolViolation { response_type: u8, code: u8 },

    #[error("frame rejected {attempts} times, giving up")]
    RetryExhausted { attempts: u32 },

    #[error("peer aborted the update")]
    PeerAborted,

    #[error("no handshake echo within {0:?}")]
    HandshakeTimeout(std::time::Duration),

    #[error("transport error: {0}")]
    Io(#[from] io::Error),
}

/// Copyable classification of a [`SessionError`], kept in the session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    ProtocolViolation,
    RetryExhausted,
    PeerAborted,
    HandshakeTimeout,
    Io,
}

impl SessionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SessionError::ProtocolViolation { .. } => FailureKind::ProtocolViolation,
            SessionError::RetryExhausted { .. } => FailureKind::RetryExhausted,
            SessionError::PeerAborted => FailureKind::PeerAborted,
            SessionError::HandshakeTimeout(_) => FailureKind::HandshakeTimeout,
            SessionError::Io(_) => FailureKind::Io,
        }
    }
}

/// A failed session, with the index of the frame in flight when it stopped.
/// `frame_index` is `None` when the handshake itself failed.
#[derive(Error, Debug)]
#[error("update failed at {}: {error}", describe_index(.frame_index))]
pub struct SessionFailure {
    pub frame_index: Option<usize>,
    #[source]
    pub error: SessionError,
}

fn describe_index(index: &Option<usize>) -> String {
    match index {
        Some(i) => format!("frame {}", i),
        None => "handshake".to_string(),
    }
}

/// The receiving end stopped before an update completed.
#[derive(Error, Debug)]
pub enum ReceiverError {
    #[error("too many rejected frames while expecting {expected}")]
    Aborted { expected: &'static str },

    #[error("transport error: {0}")]
    Io(#[from] io::Error),
}
