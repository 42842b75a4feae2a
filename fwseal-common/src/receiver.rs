// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Receiving end of the update protocol, without flash access.
//!
//! Mirrors the bootloader's acceptance rules so the wire contract can be
//! exercised from the host:
//! - every frame must authenticate and carry the type the sequence expects;
//! - START may not lower the installed version (version 0 is a debug build
//!   and keeps the installed version);
//! - a rejected frame is answered with ERROR, and more than
//!   [`MAX_REJECTIONS`] rejections before the next accepted frame are
//!   answered with END, aborting the update.

use tracing::{debug, info, warn};

use crate::bundle::{Assembler, Expect, Step, UpdateImage};
use crate::error::ReceiverError;
use crate::frame::{encode_response, Frame, FrameCodec, ResponseCode};
use crate::session::HANDSHAKE_BYTE;
use crate::transport::Transport;

/// Rejections tolerated between two accepted frames.
pub const MAX_REJECTIONS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    Receiving,
    Complete,
    Aborted,
}

pub struct Receiver {
    codec: FrameCodec,
    installed_version: u16,
    assembler: Assembler,
    rejections: u32,
    state: ReceiverState,
    image: Option<UpdateImage>,
}

impl Receiver {
    pub fn new(codec: FrameCodec, installed_version: u16) -> Self {
        let chunk_size = codec.config().chunk_size();
        Self {
            codec,
            installed_version,
            assembler: Assembler::new(chunk_size),
            rejections: 0,
            state: ReceiverState::Receiving,
            image: None,
        }
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    /// Frame kind the receiver is waiting for.
    pub fn expect(&self) -> Expect {
        self.assembler.expect()
    }

    /// Bytes to read for the next frame.
    pub fn frame_len(&self) -> usize {
        match self.expect() {
            Expect::Start => self.codec.config().start_frame_len(),
            _ => self.codec.config().frame_len(),
        }
    }

    pub fn image(&self) -> Option<&UpdateImage> {
        self.image.as_ref()
    }

    pub fn into_image(self) -> Option<UpdateImage> {
        self.image
    }

    /// Process one wire frame and return the response to send.
    pub fn accept(&mut self, bytes: &[u8]) -> ResponseCode {
        if self.state != ReceiverState::Receiving {
            return ResponseCode::End;
        }

        let expected = self.expect();
        let frame = match self.codec.decode(bytes) {
            Ok(frame) => self.apply_version_policy(frame),
            Err(e) => {
                debug!(error = %e, expected = expected.name(), "frame not decoded");
                return self.reject();
            }
        };
        let Some(frame) = frame else {
            return self.reject();
        };

        match self.assembler.push(frame) {
            Step::Accepted => {
                self.rejections = 0;
                ResponseCode::Ok
            }
            Step::Complete(image) => {
                info!(
                    version = image.version,
                    firmware_len = image.firmware.len(),
                    "update received"
                );
                self.rejections = 0;
                self.image = Some(image);
                self.state = ReceiverState::Complete;
                ResponseCode::Ok
            }
            Step::Unexpected { expected } => {
                debug!(expected = expected.name(), "frame out of sequence");
                self.reject()
            }
        }
    }

    /// Resolve debug version 0 and refuse downgrades. `None` rejects.
    fn apply_version_policy(&self, frame: Frame) -> Option<Frame> {
        match frame {
            Frame::Start {
                version,
                firmware_len,
                message_len,
            } => {
                let version = if version == 0 {
                    self.installed_version
                } else {
                    version
                };
                if version < self.installed_version {
                    warn!(
                        version,
                        installed = self.installed_version,
                        "refusing firmware downgrade"
                    );
                    return None;
                }
                Some(Frame::Start {
                    version,
                    firmware_len,
                    message_len,
                })
            }
            other => Some(other),
        }
    }

    fn reject(&mut self) -> ResponseCode {
        self.rejections += 1;
        if self.rejections > MAX_REJECTIONS {
            warn!(expected = self.expect().name(), "too many bad frames, aborting");
            self.state = ReceiverState::Aborted;
            ResponseCode::End
        } else {
            ResponseCode::Error
        }
    }

    /// Bootloader loop over a transport: wait for the handshake byte, echo
    /// it, then read and answer frames until the update completes or aborts.
    pub fn serve<T: Transport>(&mut self, transport: &mut T) -> Result<UpdateImage, ReceiverError> {
        loop {
            let byte = transport.read(1)?;
            if byte.first() == Some(&HANDSHAKE_BYTE) {
                break;
            }
        }
        transport.write(&[HANDSHAKE_BYTE])?;
        info!("entered update mode");

        loop {
            let expected = self.expect();
            let frame = transport.read(self.frame_len())?;
            let response = self.accept(&frame);
            transport.write(&encode_response(response))?;

            match self.state {
                ReceiverState::Receiving => {}
                ReceiverState::Complete => {
                    return self.image.clone().ok_or(ReceiverError::Aborted {
                        expected: expected.name(),
                    });
                }
                ReceiverState::Aborted => {
                    return Err(ReceiverError::Aborted {
                        expected: expected.name(),
                    });
                }
            }
        }
    }
}
