// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Unit tests for the update session against a scripted peer.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;

use fwseal_common::bundle::{Bundle, BundleBuilder};
use fwseal_common::config::{ProtocolConfig, SessionConfig};
use fwseal_common::error::{FailureKind, SessionError};
use fwseal_common::secret::SecretMaterial;
use fwseal_common::session::{SessionStatus, UpdateSession, HANDSHAKE_BYTE};
use fwseal_common::transport::Transport;

const OK: [u8; 2] = [4, 0];
const ERROR: [u8; 2] = [4, 1];
const END: [u8; 2] = [4, 2];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Write(Vec<u8>),
    Read(usize),
}

/// Byte-stream peer: echoes the handshake (after optional noise), then
/// serves scripted response bytes, falling back to a default reply.
struct ScriptedPeer {
    handshake: VecDeque<io::Result<u8>>,
    in_update: bool,
    responses: VecDeque<io::Result<u8>>,
    default: Option<[u8; 2]>,
    events: Vec<Event>,
}

impl ScriptedPeer {
    fn new() -> Self {
        Self {
            handshake: VecDeque::from([Ok(HANDSHAKE_BYTE)]),
            in_update: false,
            responses: VecDeque::new(),
            default: None,
            events: Vec::new(),
        }
    }

    fn always(mut self, reply: [u8; 2]) -> Self {
        self.default = Some(reply);
        self
    }

    fn then(self, reply: [u8; 2]) -> Self {
        self.then_bytes(&reply)
    }

    fn then_bytes(mut self, bytes: &[u8]) -> Self {
        self.responses.extend(bytes.iter().map(|&b| Ok(b)));
        self
    }

    fn then_err(mut self, kind: io::ErrorKind) -> Self {
        self.responses.push_back(Err(kind.into()));
        self
    }

    fn writes(&self) -> Vec<&Vec<u8>> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Write(bytes) if bytes.len() > 1 => Some(bytes),
                _ => None,
            })
            .collect()
    }

    fn next_byte(&mut self) -> io::Result<u8> {
        if !self.in_update {
            let byte = self
                .handshake
                .pop_front()
                .unwrap_or_else(|| Err(io::ErrorKind::UnexpectedEof.into()))?;
            self.in_update = byte == HANDSHAKE_BYTE;
            return Ok(byte);
        }
        if self.responses.is_empty() {
            if let Some(reply) = self.default {
                self.responses.extend(reply.iter().map(|&b| Ok(b)));
            }
        }
        self.responses
            .pop_front()
            .unwrap_or_else(|| Err(io::ErrorKind::UnexpectedEof.into()))
    }
}

impl Transport for ScriptedPeer {
    fn read(&mut self, n: usize) -> io::Result<Vec<u8>> {
        self.events.push(Event::Read(n));
        (0..n).map(|_| self.next_byte()).collect()
    }

    fn read_until(&mut self, _delimiter: u8) -> io::Result<Vec<u8>> {
        Err(io::ErrorKind::Unsupported.into())
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.events.push(Event::Write(bytes.to_vec()));
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn quick() -> SessionConfig {
    SessionConfig {
        response_delay_ms: 0,
        ..SessionConfig::default()
    }
}

fn reference_bundle() -> Bundle {
    let cfg = ProtocolConfig::default();
    let secret = SecretMaterial::generate(&cfg);
    let firmware: Vec<u8> = (0..60).collect();
    BundleBuilder::new(&cfg, &secret)
        .unwrap()
        .build(&firmware, 5, "hello")
        .unwrap()
}

// =============================================================================
// Successful delivery
// =============================================================================

#[test]
fn test_delivers_reference_bundle() {
    let bundle = reference_bundle();
    let mut peer = ScriptedPeer::new().always(OK);
    let mut session = UpdateSession::new(&mut peer, quick());

    let report = session.run(&bundle).unwrap();
    assert_eq!(report.frames_sent, 7);
    assert_eq!(report.last_frame_index, 6);
    assert_eq!(report.total_retries, 0);
    assert_eq!(session.status(), SessionStatus::Succeeded);

    let writes = peer.writes();
    assert_eq!(writes.len(), 7);
    for (written, frame) in writes.iter().zip(bundle.frames()) {
        assert_eq!(written.as_slice(), frame);
    }
}

#[test]
fn test_half_duplex_ordering() {
    let bundle = reference_bundle();
    let mut peer = ScriptedPeer::new().always(OK);
    UpdateSession::new(&mut peer, quick()).run(&bundle).unwrap();

    // one handshake byte, then each frame is written and its two response
    // bytes read before the next frame goes out
    assert_eq!(peer.events[0], Event::Write(vec![HANDSHAKE_BYTE]));
    assert_eq!(peer.events[1], Event::Read(1));
    let exchanges = &peer.events[2..];
    assert_eq!(exchanges.len(), 7 * 3);
    for exchange in exchanges.chunks(3) {
        assert!(matches!(&exchange[0], Event::Write(b) if b.len() == 48));
        assert_eq!(exchange[1], Event::Read(1));
        assert_eq!(exchange[2], Event::Read(1));
    }
}

#[test]
fn test_observer_sees_every_acknowledged_frame() {
    let bundle = reference_bundle();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);

    let mut peer = ScriptedPeer::new().always(OK);
    let mut session = UpdateSession::new(&mut peer, quick())
        .on_frame_acknowledged(move |done, total| sink.borrow_mut().push((done, total)));
    session.run(&bundle).unwrap();

    let expected: Vec<(usize, usize)> = (1..=7).map(|i| (i, 7)).collect();
    assert_eq!(*seen.borrow(), expected);
}

#[test]
fn test_handshake_discards_noise() {
    let bundle = reference_bundle();
    let mut peer = ScriptedPeer::new().always(OK);
    peer.handshake = VecDeque::from([
        Ok(b'\r'),
        Ok(b'\n'),
        Err(io::ErrorKind::TimedOut.into()),
        Ok(b'x'),
        Ok(HANDSHAKE_BYTE),
    ]);
    let report = UpdateSession::new(&mut peer, quick()).run(&bundle).unwrap();
    assert_eq!(report.frames_sent, 7);
}

// =============================================================================
// Retries
// =============================================================================

#[test]
fn test_resends_identical_bytes_after_error() {
    let bundle = reference_bundle();
    let mut peer = ScriptedPeer::new()
        .then(OK)
        .then(ERROR)
        .then(ERROR)
        .always(OK);
    let mut session = UpdateSession::new(&mut peer, quick());
    let report = session.run(&bundle).unwrap();
    assert_eq!(report.total_retries, 2);

    let writes = peer.writes();
    assert_eq!(writes.len(), 9);
    // frame 1 was written three times
    assert_eq!(writes[1].as_slice(), bundle.frame(1).unwrap());
    assert_eq!(writes[2].as_slice(), bundle.frame(1).unwrap());
    assert_eq!(writes[3].as_slice(), bundle.frame(1).unwrap());
    assert_eq!(writes[4].as_slice(), bundle.frame(2).unwrap());
}

#[test]
fn test_retry_budget_is_per_frame() {
    let bundle = reference_bundle();
    let mut peer = ScriptedPeer::new();
    // every frame needs ten resends and still gets through
    for _ in 0..bundle.frame_count() {
        for _ in 0..10 {
            peer = peer.then(ERROR);
        }
        peer = peer.then(OK);
    }
    let report = UpdateSession::new(&mut peer, quick()).run(&bundle).unwrap();
    assert_eq!(report.total_retries, 70);
}

#[test]
fn test_always_error_exhausts_retries() {
    let bundle = reference_bundle();
    let mut peer = ScriptedPeer::new().always(ERROR);
    let mut session = UpdateSession::new(&mut peer, quick());

    let failure = session.run(&bundle).unwrap_err();
    assert_eq!(failure.frame_index, Some(0));
    assert!(matches!(
        failure.error,
        SessionError::RetryExhausted { attempts: 11 }
    ));
    assert_eq!(session.retries(), 10);
    assert_eq!(
        session.status(),
        SessionStatus::Failed(FailureKind::RetryExhausted)
    );

    // original write plus exactly ten resends, all byte-identical
    let writes = peer.writes();
    assert_eq!(writes.len(), 11);
    for written in writes {
        assert_eq!(written.as_slice(), bundle.frame(0).unwrap());
    }
}

#[test]
fn test_zero_retry_budget() {
    let bundle = reference_bundle();
    let mut peer = ScriptedPeer::new().then(OK).then(ERROR);
    let config = SessionConfig {
        max_retries: 0,
        ..quick()
    };
    let failure = UpdateSession::new(&mut peer, config)
        .run(&bundle)
        .unwrap_err();
    assert_eq!(failure.frame_index, Some(1));
    assert!(matches!(
        failure.error,
        SessionError::RetryExhausted { attempts: 1 }
    ));
    assert_eq!(peer.writes().len(), 2);
}

#[test]
fn test_timeout_counts_as_error_when_enabled() {
    let bundle = reference_bundle();
    let mut peer = ScriptedPeer::new()
        .then_err(io::ErrorKind::TimedOut)
        .always(OK);
    let config = SessionConfig {
        retry_on_timeout: true,
        ..quick()
    };
    let report = UpdateSession::new(&mut peer, config).run(&bundle).unwrap();
    assert_eq!(report.total_retries, 1);
    assert_eq!(peer.writes().len(), 8);
}

#[test]
fn test_timeout_is_fatal_by_default() {
    let bundle = reference_bundle();
    let mut peer = ScriptedPeer::new()
        .then(OK)
        .then_err(io::ErrorKind::TimedOut);
    let failure = UpdateSession::new(&mut peer, quick())
        .run(&bundle)
        .unwrap_err();
    assert_eq!(failure.frame_index, Some(1));
    assert_eq!(failure.error.kind(), FailureKind::Io);
}

#[test]
fn test_late_response_code_is_awaited_not_resent() {
    let bundle = reference_bundle();
    let mut peer = ScriptedPeer::new()
        .then_bytes(&[4])
        .then_err(io::ErrorKind::TimedOut)
        .then_bytes(&[0])
        .always(OK);
    let config = SessionConfig {
        retry_on_timeout: true,
        ..quick()
    };
    let mut session = UpdateSession::new(&mut peer, config);
    let report = session.run(&bundle).unwrap();
    assert_eq!(report.frames_sent, 7);
    assert_eq!(report.total_retries, 0);
    assert_eq!(peer.writes().len(), 7);
}

#[test]
fn test_late_response_code_is_fatal_without_timeout_retry() {
    let bundle = reference_bundle();
    let mut peer = ScriptedPeer::new()
        .then_bytes(&[4])
        .then_err(io::ErrorKind::TimedOut)
        .then_bytes(&[0])
        .always(OK);
    let failure = UpdateSession::new(&mut peer, quick())
        .run(&bundle)
        .unwrap_err();
    assert_eq!(failure.frame_index, Some(0));
    assert_eq!(failure.error.kind(), FailureKind::Io);
    assert_eq!(peer.writes().len(), 1);
}

#[test]
fn test_missing_response_code_gives_up_without_resending() {
    let bundle = reference_bundle();
    let mut peer = ScriptedPeer::new().then_bytes(&[4]);
    for _ in 0..4 {
        peer = peer.then_err(io::ErrorKind::TimedOut);
    }
    let config = SessionConfig {
        retry_on_timeout: true,
        max_retries: 3,
        ..quick()
    };
    let failure = UpdateSession::new(&mut peer, config)
        .run(&bundle)
        .unwrap_err();
    assert_eq!(failure.frame_index, Some(0));
    assert_eq!(failure.error.kind(), FailureKind::Io);
    assert_eq!(peer.writes().len(), 1);
}

// =============================================================================
// Aborts
// =============================================================================

#[test]
fn test_unknown_response_type_is_violation() {
    let bundle = reference_bundle();
    let mut peer = ScriptedPeer::new().then(OK).then([0x09, 0x00]).always(OK);
    let mut session = UpdateSession::new(&mut peer, quick());

    let failure = session.run(&bundle).unwrap_err();
    assert_eq!(failure.frame_index, Some(1));
    assert!(matches!(
        failure.error,
        SessionError::ProtocolViolation {
            response_type: 0x09,
            code: 0x00
        }
    ));
    assert_eq!(session.total_retries(), 0);
    assert_eq!(peer.writes().len(), 2);
}

#[test]
fn test_unknown_response_code_is_violation() {
    let bundle = reference_bundle();
    let mut peer = ScriptedPeer::new().then([4, 7]);
    let failure = UpdateSession::new(&mut peer, quick())
        .run(&bundle)
        .unwrap_err();
    assert!(matches!(
        failure.error,
        SessionError::ProtocolViolation {
            response_type: 4,
            code: 7
        }
    ));
}

#[test]
fn test_end_response_aborts_without_retry() {
    let bundle = reference_bundle();
    let mut peer = ScriptedPeer::new().then(OK).then(OK).then(END).always(OK);
    let mut session = UpdateSession::new(&mut peer, quick());

    let failure = session.run(&bundle).unwrap_err();
    assert_eq!(failure.frame_index, Some(2));
    assert!(matches!(failure.error, SessionError::PeerAborted));
    assert_eq!(
        session.status(),
        SessionStatus::Failed(FailureKind::PeerAborted)
    );
    assert_eq!(peer.writes().len(), 3);
}

#[test]
fn test_closed_channel_during_transfer() {
    let bundle = reference_bundle();
    let mut peer = ScriptedPeer::new().then(OK);
    let failure = UpdateSession::new(&mut peer, quick())
        .run(&bundle)
        .unwrap_err();
    assert_eq!(failure.frame_index, Some(1));
    assert!(matches!(failure.error, SessionError::Io(_)));
}

#[test]
fn test_handshake_failure_has_no_frame_index() {
    let bundle = reference_bundle();
    let mut peer = ScriptedPeer::new().always(OK);
    peer.handshake.clear();
    let mut session = UpdateSession::new(&mut peer, quick());

    let failure = session.run(&bundle).unwrap_err();
    assert_eq!(failure.frame_index, None);
    assert!(failure.to_string().contains("handshake"));
    assert_eq!(peer.writes().len(), 0);
}

#[test]
fn test_handshake_timeout() {
    let bundle = reference_bundle();
    let mut peer = ScriptedPeer::new();
    peer.handshake = (0..10_000)
        .map(|_| Err(io::ErrorKind::TimedOut.into()))
        .collect();
    let config = SessionConfig {
        handshake_timeout_ms: Some(0),
        ..quick()
    };
    let mut session = UpdateSession::new(&mut peer, config);

    let failure = session.run(&bundle).unwrap_err();
    assert!(matches!(failure.error, SessionError::HandshakeTimeout(_)));
    assert_eq!(
        session.status(),
        SessionStatus::Failed(FailureKind::HandshakeTimeout)
    );
}
