// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Protected firmware bundles and the update protocol that delivers them.
//!
//! - [`bundle`]: packaging firmware + release message into encrypted frames
//! - [`session`]: client state machine replaying a bundle to a bootloader
//! - [`receiver`]: the bootloader's acceptance rules, hardware-free
//!
//! Both ends share one [`ProtocolConfig`]; nothing here keeps global state.

pub mod aead;
pub mod bundle;
pub mod config;
pub mod error;
pub mod frame;
pub mod receiver;
pub mod secret;
pub mod session;
pub mod transport;

// Re-export commonly used types
pub use bundle::{open_bundle, Bundle, BundleBuilder, UpdateImage};
pub use config::{ByteOrder, KeyLength, NonceLength, ProtocolConfig, SessionConfig, WireOrder};
pub use error::{AuthError, BundleError, ConfigError, FrameError, SessionError, SessionFailure};
pub use frame::{Frame, FrameCodec, FrameType, ResponseCode};
pub use receiver::Receiver;
pub use secret::SecretMaterial;
pub use session::{SessionReport, SessionStatus, UpdateSession};
pub use transport::{StreamTransport, Transport};
