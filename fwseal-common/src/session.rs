// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Client side of the update protocol.
//!
//! The session is strictly half-duplex: write one frame, read its two-byte
//! RESPONSE, and only then move on. Responses are handled as follows:
//! - OK: advance to the next frame.
//! - ERROR: resend the same bytes, up to `max_retries` times per frame.
//! - END: the peer gave up; abort without retrying.
//! - anything else: protocol violation; abort without retrying.

use std::io;
use std::thread;
use std::time::Instant;

use tracing::{debug, info, trace, warn};

use crate::bundle::Bundle;
use crate::config::SessionConfig;
use crate::error::{FailureKind, SessionError, SessionFailure};
use crate::frame::{decode_response, ResponseCode};
use crate::transport::{is_timeout, Transport};

/// Byte written to request update mode; the bootloader echoes it back.
pub const HANDSHAKE_BYTE: u8 = b'U';

/// Overall session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Handshaking,
    Sending,
    Succeeded,
    Failed(FailureKind),
}

/// Summary of a delivered bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionReport {
    pub frames_sent: usize,
    pub last_frame_index: usize,
    pub total_retries: u32,
}

/// Progress callback: `(frames acknowledged, total frames)`.
pub type FrameObserver = Box<dyn FnMut(usize, usize)>;

/// One update attempt over an exclusively owned transport.
pub struct UpdateSession<T: Transport> {
    transport: T,
    config: SessionConfig,
    status: SessionStatus,
    retries: u8,
    total_retries: u32,
    observer: Option<FrameObserver>,
}

/// Peer reply classified for the retry loop.
enum Reply {
    Accepted,
    Rejected,
}

impl<T: Transport> UpdateSession<T> {
    pub fn new(transport: T, config: SessionConfig) -> Self {
        Self {
            transport,
            config,
            status: SessionStatus::Idle,
            retries: 0,
            total_retries: 0,
            observer: None,
        }
    }

    /// Call `observer` after every acknowledged frame.
    pub fn on_frame_acknowledged(mut self, observer: impl FnMut(usize, usize) + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Resends spent on the current (or last) frame.
    pub fn retries(&self) -> u8 {
        self.retries
    }

    pub fn total_retries(&self) -> u32 {
        self.total_retries
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    pub fn close(&mut self) -> Result<(), SessionError> {
        self.transport.close()?;
        Ok(())
    }

    /// Request update mode and wait for the echo. Bytes other than the echo
    /// are discarded. Waits forever unless a handshake timeout is set.
    pub fn handshake(&mut self) -> Result<(), SessionError> {
        self.status = SessionStatus::Handshaking;
        let timeout = self.config.handshake_timeout();
        let started = Instant::now();

        self.transport.write(&[HANDSHAKE_BYTE])?;
        info!("waiting for bootloader to enter update mode");

        loop {
            if let Some(limit) = timeout {
                if started.elapsed() >= limit {
                    return Err(SessionError::HandshakeTimeout(limit));
                }
            }
            match self.transport.read(1) {
                Ok(byte) if byte.first() == Some(&HANDSHAKE_BYTE) => break,
                Ok(byte) => trace!(?byte, "discarding byte before handshake echo"),
                Err(e) if is_timeout(&e) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        info!("bootloader in update mode");
        Ok(())
    }

    /// Write one frame and wait until the peer accepts it, resending the
    /// identical bytes on ERROR. Returns the number of resends used.
    pub fn send_frame(&mut self, frame: &[u8]) -> Result<u8, SessionError> {
        self.retries = 0;
        self.transport.write(frame)?;

        loop {
            match self.await_response()? {
                Reply::Accepted => return Ok(self.retries),
                Reply::Rejected if self.retries >= self.config.max_retries => {
                    return Err(SessionError::RetryExhausted {
                        attempts: u32::from(self.retries) + 1,
                    });
                }
                Reply::Rejected => {
                    self.retries += 1;
                    self.total_retries += 1;
                    warn!(
                        retry = self.retries,
                        max = self.config.max_retries,
                        "frame rejected, resending"
                    );
                    self.transport.write(frame)?;
                }
            }
        }
    }

    fn await_response(&mut self) -> Result<Reply, SessionError> {
        let delay = self.config.response_delay();
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        let response_type = match self.read_byte() {
            Ok(byte) => byte,
            Err(e) if self.config.retry_on_timeout && is_timeout(&e) => {
                debug!("response timed out, counting as ERROR");
                return Ok(Reply::Rejected);
            }
            Err(e) => return Err(e.into()),
        };
        // The peer has started answering. Resending now would pair its late
        // code byte with the wrong frame, so keep waiting for it instead.
        let mut stalls = 0u8;
        let code = loop {
            match self.read_byte() {
                Ok(code) => break code,
                Err(e)
                    if self.config.retry_on_timeout
                        && is_timeout(&e)
                        && stalls < self.config.max_retries =>
                {
                    stalls += 1;
                    debug!(stalls, "response code late, waiting");
                }
                Err(e) => return Err(e.into()),
            }
        };

        match decode_response([response_type, code]) {
            Some(ResponseCode::Ok) => Ok(Reply::Accepted),
            Some(ResponseCode::Error) => Ok(Reply::Rejected),
            Some(ResponseCode::End) => Err(SessionError::PeerAborted),
            None => Err(SessionError::ProtocolViolation {
                response_type,
                code,
            }),
        }
    }

    fn read_byte(&mut self) -> io::Result<u8> {
        let bytes = self.transport.read(1)?;
        bytes
            .first()
            .copied()
            .ok_or_else(|| io::ErrorKind::UnexpectedEof.into())
    }

    /// Handshake, then deliver every frame of `bundle` in order, stopping at
    /// the first failure.
    pub fn run(&mut self, bundle: &Bundle) -> Result<SessionReport, SessionFailure> {
        let result = self.deliver(bundle);
        self.status = match &result {
            Ok(_) => SessionStatus::Succeeded,
            Err(failure) => SessionStatus::Failed(failure.error.kind()),
        };
        if let Err(failure) = &result {
            warn!(kind = ?failure.error.kind(), frame = ?failure.frame_index, "update aborted");
        }
        result
    }

    fn deliver(&mut self, bundle: &Bundle) -> Result<SessionReport, SessionFailure> {
        self.handshake().map_err(|error| SessionFailure {
            frame_index: None,
            error,
        })?;
        self.status = SessionStatus::Sending;

        let total = bundle.frame_count();
        for (index, frame) in bundle.frames().enumerate() {
            let resends = self.send_frame(frame).map_err(|error| SessionFailure {
                frame_index: Some(index),
                error,
            })?;
            debug!(index, total, resends, "frame acknowledged");
            if let Some(observer) = self.observer.as_mut() {
                observer(index + 1, total);
            }
        }

        info!(frames = total, retries = self.total_retries, "update delivered");
        Ok(SessionReport {
            frames_sent: total,
            last_frame_index: total - 1,
            total_retries: self.total_retries,
        })
    }
}
