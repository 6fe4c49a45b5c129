//! # Key Capability
//!
//! The ledger consumes an externally supplied `{publicKey, privateKey}` pair
//! and never generates or persists keys itself. Whatever loads keys (a file,
//! a KMS, an environment variable) hands the raw X25519 bytes to
//! [`KeyPair::from_private_bytes`] or [`KeyPair::from_hex`].
//!
//! Private key bytes are never logged and `KeyPair`'s `Debug` output shows
//! only the public half.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};

use crate::config::X25519_KEY_LENGTH;

/// Errors raised while importing key material.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid key encoding: expected {X25519_KEY_LENGTH} hex-encoded bytes")]
    InvalidEncoding,

    #[error("keypair validation failed: public key does not match private key")]
    KeypairMismatch,
}

/// Public half of a record key pair. Safe to share and serialize.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey(X25519Public);

impl PublicKey {
    /// Wrap raw X25519 public key bytes.
    pub fn from_bytes(bytes: [u8; X25519_KEY_LENGTH]) -> Self {
        Self(X25519Public::from(bytes))
    }

    /// Parse a hex-encoded public key.
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        Ok(Self::from_bytes(decode_key_hex(s)?))
    }

    pub fn to_bytes(&self) -> [u8; X25519_KEY_LENGTH] {
        self.0.to_bytes()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0.as_bytes())
    }

    pub(crate) fn as_x25519(&self) -> &X25519Public {
        &self.0
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// A record encryption key pair.
///
/// `KeyPair` intentionally does not implement `Serialize`. Persisting a
/// private key is the caller's business, not the ledger's.
#[derive(Clone)]
pub struct KeyPair {
    public_key: PublicKey,
    private_key: StaticSecret,
}

impl KeyPair {
    /// Build a key pair from raw private key bytes; the public key is derived.
    pub fn from_private_bytes(bytes: [u8; X25519_KEY_LENGTH]) -> Self {
        let private_key = StaticSecret::from(bytes);
        let public_key = PublicKey(X25519Public::from(&private_key));
        Self {
            public_key,
            private_key,
        }
    }

    /// Build a key pair from hex-encoded private key bytes.
    pub fn from_hex(private_hex: &str) -> Result<Self, KeyError> {
        Ok(Self::from_private_bytes(decode_key_hex(private_hex)?))
    }

    /// Build a key pair from both halves, checking that they belong together.
    pub fn from_parts(
        public_key: PublicKey,
        private_bytes: [u8; X25519_KEY_LENGTH],
    ) -> Result<Self, KeyError> {
        let pair = Self::from_private_bytes(private_bytes);
        if pair.public_key != public_key {
            return Err(KeyError::KeypairMismatch);
        }
        Ok(pair)
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub(crate) fn diffie_hellman(&self, peer: &X25519Public) -> [u8; 32] {
        *self.private_key.diffie_hellman(peer).as_bytes()
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

fn decode_key_hex(s: &str) -> Result<[u8; X25519_KEY_LENGTH], KeyError> {
    let bytes = hex::decode(s.trim()).map_err(|_| KeyError::InvalidEncoding)?;
    bytes.try_into().map_err(|_| KeyError::InvalidEncoding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_key_is_derived_deterministically() {
        let a = KeyPair::from_private_bytes([9u8; 32]);
        let b = KeyPair::from_private_bytes([9u8; 32]);
        assert_eq!(a.public_key(), b.public_key());
    }

    #[test]
    fn hex_import_matches_raw_import() {
        let raw = KeyPair::from_private_bytes([0x11; 32]);
        let parsed = KeyPair::from_hex(&hex::encode([0x11u8; 32])).unwrap();
        assert_eq!(raw.public_key(), parsed.public_key());
    }

    #[test]
    fn public_key_hex_roundtrip() {
        let pk = *KeyPair::from_private_bytes([5u8; 32]).public_key();
        assert_eq!(PublicKey::from_hex(&pk.to_hex()).unwrap(), pk);
    }

    #[test]
    fn rejects_short_key() {
        assert!(matches!(
            KeyPair::from_hex("abcd"),
            Err(KeyError::InvalidEncoding)
        ));
    }

    #[test]
    fn from_parts_detects_mismatch() {
        let other = *KeyPair::from_private_bytes([2u8; 32]).public_key();
        assert!(matches!(
            KeyPair::from_parts(other, [1u8; 32]),
            Err(KeyError::KeypairMismatch)
        ));
    }

    #[test]
    fn debug_hides_private_key() {
        let pair = KeyPair::from_private_bytes([0xAB; 32]);
        let rendered = format!("{pair:?}");
        assert!(!rendered.contains(&hex::encode([0xABu8; 32])));
        assert!(rendered.contains("public_key"));
    }
}
