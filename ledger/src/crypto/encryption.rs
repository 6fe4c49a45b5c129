//! # Record Encryption
//!
//! Two layers:
//!
//! - [`encrypt`] / [`decrypt`]: AES-256-GCM with a random 96-bit nonce.
//!   Wire format is `nonce || ciphertext+tag`.
//! - [`seal`] / [`open_sealed`]: asymmetric "sealed box" built on top. The
//!   sender generates an ephemeral X25519 secret, runs Diffie-Hellman against
//!   the recipient's public key, and derives the AES key with BLAKE3's
//!   `derive_key` over `shared || ephemeral_public || recipient_public`.
//!   Wire format is `ephemeral_public || nonce || ciphertext+tag`.
//!
//! Only the holder of the recipient's private key can open a sealed box.
//! Opening with any other key pair fails authentication; it never yields
//! garbage plaintext.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;
use x25519_dalek::{EphemeralSecret, PublicKey as X25519Public};

use crate::config::{AES_KEY_LENGTH, AES_NONCE_LENGTH, SEALED_BOX_KDF_CONTEXT, X25519_KEY_LENGTH};
use crate::crypto::keys::{KeyPair, PublicKey};

/// Errors that can occur during encryption/decryption.
///
/// Kept vague on purpose: "wrong key" and "corrupted ciphertext" look the
/// same from the outside.
#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("encryption failed")]
    EncryptFailed,

    #[error("decryption failed -- wrong key or corrupted ciphertext")]
    DecryptFailed,

    #[error("ciphertext too short")]
    CiphertextTooShort,

    #[error("ciphertext is not valid hex")]
    InvalidEncoding,
}

/// Encrypt plaintext with AES-256-GCM using a random nonce.
///
/// Returns `nonce || ciphertext`, where the ciphertext carries the 16-byte
/// GCM tag.
pub fn encrypt(key: &[u8; AES_KEY_LENGTH], plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::EncryptFailed)?;

    let mut nonce_bytes = [0u8; AES_NONCE_LENGTH];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| EncryptionError::EncryptFailed)?;

    let mut out = Vec::with_capacity(AES_NONCE_LENGTH + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt data previously produced by [`encrypt`].
pub fn decrypt(key: &[u8; AES_KEY_LENGTH], data: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    if data.len() < AES_NONCE_LENGTH {
        return Err(EncryptionError::CiphertextTooShort);
    }

    let (nonce_bytes, ciphertext) = data.split_at(AES_NONCE_LENGTH);
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::DecryptFailed)?;
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| EncryptionError::DecryptFailed)
}

/// Encrypt `plaintext` so that only the owner of `recipient` can read it.
pub fn seal(recipient: &PublicKey, plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_public = X25519Public::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(recipient.as_x25519());

    let key = derive_box_key(
        shared.as_bytes(),
        ephemeral_public.as_bytes(),
        &recipient.to_bytes(),
    );
    let body = encrypt(&key, plaintext)?;

    let mut out = Vec::with_capacity(X25519_KEY_LENGTH + body.len());
    out.extend_from_slice(ephemeral_public.as_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

/// Open a box produced by [`seal`] with the recipient's key pair.
pub fn open_sealed(keys: &KeyPair, sealed: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    if sealed.len() < X25519_KEY_LENGTH + AES_NONCE_LENGTH {
        return Err(EncryptionError::CiphertextTooShort);
    }

    let (ephemeral_bytes, body) = sealed.split_at(X25519_KEY_LENGTH);
    let mut ephemeral = [0u8; X25519_KEY_LENGTH];
    ephemeral.copy_from_slice(ephemeral_bytes);

    let shared = keys.diffie_hellman(&X25519Public::from(ephemeral));
    let key = derive_box_key(&shared, &ephemeral, &keys.public_key().to_bytes());
    decrypt(&key, body)
}

/// Hex wrapper around [`seal`], for embedding in JSON records.
pub fn seal_hex(recipient: &PublicKey, plaintext: &[u8]) -> Result<String, EncryptionError> {
    seal(recipient, plaintext).map(hex::encode)
}

/// Hex wrapper around [`open_sealed`].
pub fn open_sealed_hex(keys: &KeyPair, sealed_hex: &str) -> Result<Vec<u8>, EncryptionError> {
    let sealed = hex::decode(sealed_hex).map_err(|_| EncryptionError::InvalidEncoding)?;
    open_sealed(keys, &sealed)
}

/// Raw DH output is not uniformly random; run it through a KDF bound to both
/// public keys.
fn derive_box_key(
    shared: &[u8; 32],
    ephemeral_public: &[u8; 32],
    recipient_public: &[u8; 32],
) -> [u8; AES_KEY_LENGTH] {
    let mut material = Vec::with_capacity(96);
    material.extend_from_slice(shared);
    material.extend_from_slice(ephemeral_public);
    material.extend_from_slice(recipient_public);
    blake3::derive_key(SEALED_BOX_KDF_CONTEXT, &material)
}
