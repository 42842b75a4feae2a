// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! AES-GCM sealing of frame blocks.
//!
//! Every [`AeadCodec::seal`] call draws a fresh nonce from the OS RNG; a
//! nonce is never derived or reused. The codec performs no padding:
//! ciphertext length always equals plaintext length.

use aes_gcm::aead::consts::{U12, U16};
use aes_gcm::aead::{self, AeadInPlace, KeyInit};
use aes_gcm::aes::{Aes128, Aes256};
use aes_gcm::AesGcm;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroize;

use crate::config::{KeyLength, NonceLength, ProtocolConfig, HEADER_LEN, TAG_LEN};
use crate::error::{AuthError, ConfigError, FrameError};
use crate::secret::SecretMaterial;

type Aes128GcmShort = AesGcm<Aes128, U12>;
type Aes128GcmLong = AesGcm<Aes128, U16>;
type Aes256GcmShort = AesGcm<Aes256, U12>;
type Aes256GcmLong = AesGcm<Aes256, U16>;

enum Cipher {
    Aes128Short(Aes128GcmShort),
    Aes128Long(Aes128GcmLong),
    Aes256Short(Aes256GcmShort),
    Aes256Long(Aes256GcmLong),
}

/// Output of one sealing operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub ciphertext: Vec<u8>,
    pub tag: [u8; TAG_LEN],
    pub nonce: Vec<u8>,
}

/// Authenticated encryption bound to one key and header.
pub struct AeadCodec {
    cipher: Cipher,
    header: [u8; HEADER_LEN],
    nonce_len: usize,
}

impl AeadCodec {
    pub fn new(cfg: &ProtocolConfig, secret: &SecretMaterial) -> Result<Self, ConfigError> {
        let key = secret.key();
        let invalid = || ConfigError::SecretLength {
            expected: cfg.secret_len(),
            actual: key.len() + 1 + HEADER_LEN,
        };

        let cipher = match (cfg.key_length, cfg.nonce_length) {
            (KeyLength::Aes128, NonceLength::Short) => {
                Cipher::Aes128Short(Aes128GcmShort::new_from_slice(key).map_err(|_| invalid())?)
            }
            (KeyLength::Aes128, NonceLength::Long) => {
                Cipher::Aes128Long(Aes128GcmLong::new_from_slice(key).map_err(|_| invalid())?)
            }
            (KeyLength::Aes256, NonceLength::Short) => {
                Cipher::Aes256Short(Aes256GcmShort::new_from_slice(key).map_err(|_| invalid())?)
            }
            (KeyLength::Aes256, NonceLength::Long) => {
                Cipher::Aes256Long(Aes256GcmLong::new_from_slice(key).map_err(|_| invalid())?)
            }
        };

        Ok(Self {
            cipher,
            header: *secret.header(),
            nonce_len: cfg.nonce_len(),
        })
    }

    pub fn nonce_len(&self) -> usize {
        self.nonce_len
    }

    /// Encrypt `plaintext` under a fresh random nonce, binding the header.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Sealed, FrameError> {
        let mut nonce = vec![0u8; self.nonce_len];
        OsRng.fill_bytes(&mut nonce);

        let mut ciphertext = plaintext.to_vec();
        let tag = match &self.cipher {
            Cipher::Aes128Short(c) => seal_with(c, &nonce, &self.header, &mut ciphertext),
            Cipher::Aes128Long(c) => seal_with(c, &nonce, &self.header, &mut ciphertext),
            Cipher::Aes256Short(c) => seal_with(c, &nonce, &self.header, &mut ciphertext),
            Cipher::Aes256Long(c) => seal_with(c, &nonce, &self.header, &mut ciphertext),
        }?;

        Ok(Sealed {
            ciphertext,
            tag,
            nonce,
        })
    }

    /// Verify and decrypt. Any mismatch, including a wrong-length tag or
    /// nonce, yields [`AuthError`] and no plaintext.
    pub fn open(&self, ciphertext: &[u8], tag: &[u8], nonce: &[u8]) -> Result<Vec<u8>, AuthError> {
        if tag.len() != TAG_LEN || nonce.len() != self.nonce_len {
            return Err(AuthError);
        }

        let mut buf = ciphertext.to_vec();
        let result = match &self.cipher {
            Cipher::Aes128Short(c) => open_with(c, nonce, &self.header, &mut buf, tag),
            Cipher::Aes128Long(c) => open_with(c, nonce, &self.header, &mut buf, tag),
            Cipher::Aes256Short(c) => open_with(c, nonce, &self.header, &mut buf, tag),
            Cipher::Aes256Long(c) => open_with(c, nonce, &self.header, &mut buf, tag),
        };

        match result {
            Ok(()) => Ok(buf),
            Err(e) => {
                buf.zeroize();
                Err(e)
            }
        }
    }
}

fn seal_with<C>(
    cipher: &C,
    nonce: &[u8],
    aad: &[u8],
    buf: &mut [u8],
) -> Result<[u8; TAG_LEN], FrameError>
where
    C: AeadInPlace<TagSize = U16>,
{
    let tag = cipher
        .encrypt_in_place_detached(aead::Nonce::<C>::from_slice(nonce), aad, buf)
        .map_err(|_| FrameError::Encrypt)?;
    let mut out = [0u8; TAG_LEN];
    out.copy_from_slice(&tag);
    Ok(out)
}

fn open_with<C>(
    cipher: &C,
    nonce: &[u8],
    aad: &[u8],
    buf: &mut [u8],
    tag: &[u8],
) -> Result<(), AuthError>
where
    C: AeadInPlace<TagSize = U16>,
{
    cipher
        .decrypt_in_place_detached(
            aead::Nonce::<C>::from_slice(nonce),
            aad,
            buf,
            aead::Tag::<C>::from_slice(tag),
        )
        .map_err(|_| AuthError)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec(cfg: &ProtocolConfig) -> AeadCodec {
        AeadCodec::new(cfg, &SecretMaterial::generate(cfg)).unwrap()
    }

    #[test]
    fn seal_open_all_variants() {
        for key_length in [KeyLength::Aes128, KeyLength::Aes256] {
            for nonce_length in [NonceLength::Short, NonceLength::Long] {
                let cfg = ProtocolConfig {
                    key_length,
                    nonce_length,
                    ..ProtocolConfig::default()
                };
                let codec = codec(&cfg);
                let sealed = codec.seal(b"sixteen byte blk").unwrap();
                assert_eq!(sealed.ciphertext.len(), 16);
                assert_eq!(sealed.nonce.len(), cfg.nonce_len());
                let plain = codec
                    .open(&sealed.ciphertext, &sealed.tag, &sealed.nonce)
                    .unwrap();
                assert_eq!(plain, b"sixteen byte blk");
            }
        }
    }

    #[test]
    fn truncated_tag_is_auth_error() {
        let codec = codec(&ProtocolConfig::default());
        let sealed = codec.seal(b"abc").unwrap();
        assert_eq!(
            codec.open(&sealed.ciphertext, &sealed.tag[..15], &sealed.nonce),
            Err(AuthError)
        );
    }

    #[test]
    fn other_header_is_rejected() {
        let cfg = ProtocolConfig::default();
        let secret = SecretMaterial::generate(&cfg);
        let mut other = secret.to_bytes();
        let last = other.len() - 1;
        other[last] ^= 0x01;
        let other = SecretMaterial::parse(&other, &cfg).unwrap();

        let sealed = AeadCodec::new(&cfg, &secret).unwrap().seal(b"data").unwrap();
        let opener = AeadCodec::new(&cfg, &other).unwrap();
        assert!(opener
            .open(&sealed.ciphertext, &sealed.tag, &sealed.nonce)
            .is_err());
    }

    #[test]
    fn mismatched_key_length_is_config_error() {
        let secret = SecretMaterial::generate(&ProtocolConfig::default());
        let cfg = ProtocolConfig {
            key_length: KeyLength::Aes128,
            ..ProtocolConfig::default()
        };
        assert!(matches!(
            AeadCodec::new(&cfg, &secret),
            Err(ConfigError::SecretLength { .. })
        ));
    }
}
