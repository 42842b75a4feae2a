// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Frame layouts and their encrypted wire form.
//!
//! Plaintext block (`block_size` bytes, 16 by default):
//!
//! ```text
//! START: [ 0x01 | version u16 | firmware_len u16 | message_len u16 | random pad ]
//! DATA:  [ 0x02 | chunk (<= block_size - 1)                        | random pad ]
//! END:   [ 0x03 |                                                    random pad ]
//! ```
//!
//! On the wire each block becomes `ciphertext ∥ tag(16) ∥ nonce` (or
//! `ciphertext ∥ nonce ∥ tag` with [`WireOrder::NonceThenTag`]). RESPONSE
//! frames travel unencrypted as `[0x04, code]`.

use rand::rngs::OsRng;
use rand::RngCore;

use crate::aead::{AeadCodec, Sealed};
use crate::config::{ProtocolConfig, WireOrder, TAG_LEN};
use crate::error::{ConfigError, FrameError};
use crate::secret::SecretMaterial;

/// Frame type byte, first byte of every plaintext block.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Start = 1,
    Data = 2,
    End = 3,
    Response = 4,
}

impl FrameType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(FrameType::Start),
            2 => Some(FrameType::Data),
            3 => Some(FrameType::End),
            4 => Some(FrameType::Response),
            _ => None,
        }
    }
}

/// Status carried by a RESPONSE frame.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    Ok = 0,
    Error = 1,
    End = 2,
}

impl ResponseCode {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(ResponseCode::Ok),
            1 => Some(ResponseCode::Error),
            2 => Some(ResponseCode::End),
            _ => None,
        }
    }
}

/// Decoded protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Start {
        version: u16,
        firmware_len: u16,
        message_len: u16,
    },
    /// Chunk bytes followed by padding; the START lengths say how much is real.
    Data { payload: Vec<u8> },
    End,
    Response { status: ResponseCode },
}

impl Frame {
    pub fn name(&self) -> &'static str {
        match self {
            Frame::Start { .. } => "START",
            Frame::Data { .. } => "DATA",
            Frame::End => "END",
            Frame::Response { .. } => "RESPONSE",
        }
    }
}

/// Split `data` into ordered chunks of at most `chunk_size` bytes.
///
/// Empty input yields no chunks; only the last chunk may be short, and an
/// exact multiple of `chunk_size` never produces a trailing empty chunk.
pub fn chunks(data: &[u8], chunk_size: usize) -> impl Iterator<Item = &[u8]> {
    data.chunks(chunk_size)
}

/// Number of chunks [`chunks`] yields for `len` bytes.
pub fn chunk_count(len: usize, chunk_size: usize) -> usize {
    len.div_ceil(chunk_size)
}

pub fn encode_response(code: ResponseCode) -> [u8; 2] {
    [FrameType::Response as u8, code as u8]
}

/// `None` unless the type byte is RESPONSE and the code is known.
pub fn decode_response(bytes: [u8; 2]) -> Option<ResponseCode> {
    if bytes[0] != FrameType::Response as u8 {
        return None;
    }
    ResponseCode::from_byte(bytes[1])
}

/// Encodes and decodes encrypted frames for one configuration and secret.
pub struct FrameCodec {
    cfg: ProtocolConfig,
    aead: AeadCodec,
}

impl FrameCodec {
    pub fn new(cfg: &ProtocolConfig, secret: &SecretMaterial) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self {
            cfg: *cfg,
            aead: AeadCodec::new(cfg, secret)?,
        })
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.cfg
    }

    pub fn encode_start(
        &self,
        version: u16,
        firmware_len: u16,
        message_len: u16,
    ) -> Result<Vec<u8>, FrameError> {
        let order = self.cfg.byte_order;
        let mut body = [0u8; 6];
        body[0..2].copy_from_slice(&order.write_u16(version));
        body[2..4].copy_from_slice(&order.write_u16(firmware_len));
        body[4..6].copy_from_slice(&order.write_u16(message_len));
        self.encode_block(FrameType::Start, &body)
    }

    pub fn encode_data(&self, chunk: &[u8]) -> Result<Vec<u8>, FrameError> {
        self.encode_block(FrameType::Data, chunk)
    }

    pub fn encode_end(&self) -> Result<Vec<u8>, FrameError> {
        self.encode_block(FrameType::End, &[])
    }

    /// Build `type ∥ body ∥ random pad`, seal it and lay it out for the wire.
    pub fn encode_block(&self, frame_type: FrameType, body: &[u8]) -> Result<Vec<u8>, FrameError> {
        let block_size = self.cfg.block_size;
        if body.len() > self.cfg.chunk_size() {
            return Err(FrameError::Malformed {
                expected: self.cfg.chunk_size(),
                actual: body.len(),
            });
        }

        let mut block = vec![0u8; block_size];
        block[0] = frame_type as u8;
        block[1..1 + body.len()].copy_from_slice(body);
        OsRng.fill_bytes(&mut block[1 + body.len()..]);

        let sealed = self.aead.seal(&block)?;
        Ok(self.lay_out(sealed))
    }

    fn lay_out(&self, sealed: Sealed) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.cfg.frame_len());
        out.extend_from_slice(&sealed.ciphertext);
        match self.cfg.wire_order {
            WireOrder::TagThenNonce => {
                out.extend_from_slice(&sealed.tag);
                out.extend_from_slice(&sealed.nonce);
            }
            WireOrder::NonceThenTag => {
                out.extend_from_slice(&sealed.nonce);
                out.extend_from_slice(&sealed.tag);
            }
        }
        out
    }

    /// Authenticate, decrypt and classify one wire frame.
    pub fn decode(&self, bytes: &[u8]) -> Result<Frame, FrameError> {
        let expected = self.cfg.frame_len();
        if bytes.len() != expected {
            return Err(FrameError::Malformed {
                expected,
                actual: bytes.len(),
            });
        }

        let block_size = self.cfg.block_size;
        let (ciphertext, rest) = bytes.split_at(block_size);
        let (tag, nonce) = match self.cfg.wire_order {
            WireOrder::TagThenNonce => rest.split_at(TAG_LEN),
            WireOrder::NonceThenTag => {
                let (nonce, tag) = rest.split_at(self.cfg.nonce_len());
                (tag, nonce)
            }
        };

        let block = self.aead.open(ciphertext, tag, nonce)?;
        match FrameType::from_byte(block[0]) {
            Some(FrameType::Start) => {
                let order = self.cfg.byte_order;
                Ok(Frame::Start {
                    version: order.read_u16([block[1], block[2]]),
                    firmware_len: order.read_u16([block[3], block[4]]),
                    message_len: order.read_u16([block[5], block[6]]),
                })
            }
            Some(FrameType::Data) => Ok(Frame::Data {
                payload: block[1..].to_vec(),
            }),
            Some(FrameType::End) => Ok(Frame::End),
            _ => Err(FrameError::UnknownType(block[0])),
        }
    }
}
