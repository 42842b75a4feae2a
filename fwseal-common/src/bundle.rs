// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Protected firmware bundle.
//!
//! A bundle is a flat concatenation of encrypted frames with no container:
//! one START, the firmware DATA frames, the release message DATA frames
//! (message bytes plus a NUL terminator), one END. Frame boundaries follow
//! from the fixed frame length of the [`ProtocolConfig`].
//!
//! Frame order and count are deterministic for given inputs. Frame bytes
//! are not, since nonces and padding are random.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::config::ProtocolConfig;
use crate::error::{BundleError, FrameError};
use crate::frame::{chunk_count, chunks, Frame, FrameCodec};
use crate::secret::SecretMaterial;

/// Largest length a START frame field can describe.
pub const MAX_SECTION_LEN: usize = u16::MAX as usize;

/// Encrypted frame sequence, immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    bytes: Vec<u8>,
    frame_len: usize,
}

impl Bundle {
    /// Wrap raw bundle bytes, checking only the frame grid.
    pub fn from_bytes(bytes: Vec<u8>, cfg: &ProtocolConfig) -> Result<Self, BundleError> {
        cfg.validate()?;
        let frame_len = cfg.frame_len();
        if bytes.len() % frame_len != 0 {
            return Err(BundleError::Misaligned {
                len: bytes.len(),
                frame_len,
            });
        }
        let count = bytes.len() / frame_len;
        if count < 2 {
            return Err(BundleError::TooFewFrames(count));
        }
        Ok(Self { bytes, frame_len })
    }

    pub fn load(path: &Path, cfg: &ProtocolConfig) -> Result<Self, BundleError> {
        Self::from_bytes(fs::read(path)?, cfg)
    }

    pub fn save(&self, path: &Path) -> Result<(), BundleError> {
        fs::write(path, &self.bytes)?;
        Ok(())
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    pub fn frame_count(&self) -> usize {
        self.bytes.len() / self.frame_len
    }

    pub fn frame(&self, index: usize) -> Option<&[u8]> {
        let start = index.checked_mul(self.frame_len)?;
        self.bytes.get(start..start + self.frame_len)
    }

    /// Frames in transmission order.
    pub fn frames(&self) -> impl Iterator<Item = &[u8]> {
        self.bytes.chunks_exact(self.frame_len)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Packaging step: firmware + version + release message -> [`Bundle`].
pub struct BundleBuilder {
    codec: FrameCodec,
    allow_empty_firmware: bool,
}

impl BundleBuilder {
    /// Fails with a configuration error before any encryption if the secret
    /// does not fit `cfg`.
    pub fn new(cfg: &ProtocolConfig, secret: &SecretMaterial) -> Result<Self, BundleError> {
        Ok(Self {
            codec: FrameCodec::new(cfg, secret)?,
            allow_empty_firmware: false,
        })
    }

    /// Accept a zero-length firmware image (START with `firmware_len = 0`).
    pub fn allow_empty_firmware(mut self, allow: bool) -> Self {
        self.allow_empty_firmware = allow;
        self
    }

    pub fn build(&self, firmware: &[u8], version: u16, message: &str) -> Result<Bundle, BundleError> {
        if firmware.is_empty() && !self.allow_empty_firmware {
            return Err(BundleError::EmptyFirmware);
        }
        if firmware.len() > MAX_SECTION_LEN {
            return Err(BundleError::FirmwareTooLarge(firmware.len()));
        }
        let message = encode_message(message)?;

        let cfg = self.codec.config();
        let chunk_size = cfg.chunk_size();
        let frame_count =
            2 + chunk_count(firmware.len(), chunk_size) + chunk_count(message.len(), chunk_size);

        let mut bytes = Vec::with_capacity(frame_count * cfg.frame_len());
        let seal_err = |index: usize| move |source: FrameError| BundleError::Frame { index, source };

        bytes.extend(
            self.codec
                .encode_start(version, firmware.len() as u16, message.len() as u16)
                .map_err(seal_err(0))?,
        );
        for (i, chunk) in chunks(firmware, chunk_size)
            .chain(chunks(&message, chunk_size))
            .enumerate()
        {
            bytes.extend(self.codec.encode_data(chunk).map_err(seal_err(i + 1))?);
        }
        bytes.extend(self.codec.encode_end().map_err(seal_err(frame_count - 1))?);

        debug!(
            version,
            firmware_len = firmware.len(),
            message_len = message.len(),
            frames = frame_count,
            "bundle built"
        );

        Ok(Bundle {
            bytes,
            frame_len: cfg.frame_len(),
        })
    }
}

/// Release message bytes with the NUL terminator the bootloader expects.
pub fn encode_message(message: &str) -> Result<Vec<u8>, BundleError> {
    if message.as_bytes().contains(&0) {
        return Err(BundleError::MessageContainsNul);
    }
    let mut bytes = Vec::with_capacity(message.len() + 1);
    bytes.extend_from_slice(message.as_bytes());
    bytes.push(0);
    if bytes.len() > MAX_SECTION_LEN {
        return Err(BundleError::MessageTooLarge(bytes.len()));
    }
    Ok(bytes)
}

/// Decrypted content of a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateImage {
    pub version: u16,
    pub firmware: Vec<u8>,
    pub message: String,
}

/// Incremental reassembly of an update from decoded frames, in order.
///
/// Shared by [`open_bundle`] and the receiver so both enforce the same
/// sequence: START, exactly the announced DATA frames, END.
#[derive(Debug)]
pub struct Assembler {
    chunk_size: usize,
    stage: Stage,
}

#[derive(Debug)]
enum Stage {
    AwaitStart,
    Data {
        version: u16,
        firmware_len: usize,
        message_len: usize,
        firmware: Vec<u8>,
        message: Vec<u8>,
    },
    AwaitEnd {
        version: u16,
        firmware: Vec<u8>,
        message: Vec<u8>,
    },
    Done,
}

/// What the assembler wants next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    Start,
    FirmwareData,
    MessageData,
    End,
    Nothing,
}

impl Expect {
    pub fn name(self) -> &'static str {
        match self {
            Expect::Start => "START",
            Expect::FirmwareData => "firmware DATA",
            Expect::MessageData => "message DATA",
            Expect::End => "END",
            Expect::Nothing => "no more frames",
        }
    }
}

/// Result of feeding one frame to the [`Assembler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Accepted,
    Complete(UpdateImage),
    /// Frame does not fit the sequence; assembler state is unchanged.
    Unexpected { expected: Expect },
}

impl Assembler {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            stage: Stage::AwaitStart,
        }
    }

    pub fn expect(&self) -> Expect {
        match &self.stage {
            Stage::AwaitStart => Expect::Start,
            Stage::Data {
                firmware_len,
                firmware,
                ..
            } if firmware.len() < *firmware_len => Expect::FirmwareData,
            Stage::Data { .. } => Expect::MessageData,
            Stage::AwaitEnd { .. } => Expect::End,
            Stage::Done => Expect::Nothing,
        }
    }

    pub fn push(&mut self, frame: Frame) -> Step {
        let expected = self.expect();
        let stage = std::mem::replace(&mut self.stage, Stage::Done);
        let (stage, step) = match (stage, frame) {
            (
                Stage::AwaitStart,
                Frame::Start {
                    version,
                    firmware_len,
                    message_len,
                },
            ) => {
                let stage = Stage::Data {
                    version,
                    firmware_len: firmware_len as usize,
                    message_len: message_len as usize,
                    firmware: Vec::with_capacity(firmware_len as usize),
                    message: Vec::with_capacity(message_len as usize),
                };
                (Self::settle(stage), Step::Accepted)
            }
            (
                Stage::Data {
                    version,
                    firmware_len,
                    message_len,
                    mut firmware,
                    mut message,
                },
                Frame::Data { payload },
            ) => {
                let (target, want) = if firmware.len() < firmware_len {
                    (&mut firmware, firmware_len)
                } else {
                    (&mut message, message_len)
                };
                let take = (want - target.len()).min(self.chunk_size).min(payload.len());
                target.extend_from_slice(&payload[..take]);
                let stage = Stage::Data {
                    version,
                    firmware_len,
                    message_len,
                    firmware,
                    message,
                };
                (Self::settle(stage), Step::Accepted)
            }
            (
                Stage::AwaitEnd {
                    version,
                    firmware,
                    message,
                },
                Frame::End,
            ) => (
                Stage::Done,
                Step::Complete(UpdateImage {
                    version,
                    firmware,
                    message: decode_message(&message),
                }),
            ),
            (stage, _) => (stage, Step::Unexpected { expected }),
        };
        self.stage = stage;
        step
    }

    /// Move from DATA to END once both sections are full.
    fn settle(stage: Stage) -> Stage {
        match stage {
            Stage::Data {
                version,
                firmware_len,
                message_len,
                firmware,
                message,
            } if firmware.len() == firmware_len && message.len() == message_len => {
                Stage::AwaitEnd {
                    version,
                    firmware,
                    message,
                }
            }
            other => other,
        }
    }
}

/// Strip the NUL terminator. Bundles built elsewhere may carry invalid
/// UTF-8, which is replaced rather than rejected.
fn decode_message(bytes: &[u8]) -> String {
    let text = bytes.strip_suffix(&[0]).unwrap_or(bytes);
    String::from_utf8_lossy(text).into_owned()
}

/// Decrypt every frame and reassemble version, firmware and message.
pub fn open_bundle(bundle: &Bundle, codec: &FrameCodec) -> Result<UpdateImage, BundleError> {
    let mut assembler = Assembler::new(codec.config().chunk_size());
    let mut frames = bundle.frames().enumerate();

    for (index, bytes) in frames.by_ref() {
        let frame = codec
            .decode(bytes)
            .map_err(|source| BundleError::Frame { index, source })?;
        let found = frame.name();
        match assembler.push(frame) {
            Step::Accepted => {}
            Step::Complete(image) => {
                let extra = bundle.frame_count() - index - 1;
                if extra > 0 {
                    return Err(BundleError::TrailingFrames { extra });
                }
                return Ok(image);
            }
            Step::Unexpected { expected } => {
                return Err(BundleError::UnexpectedFrame {
                    index,
                    expected: expected.name(),
                    found,
                });
            }
        }
    }

    Err(BundleError::Truncated(bundle.frame_count()))
}
