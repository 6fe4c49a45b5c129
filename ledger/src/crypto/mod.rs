//! # Cryptographic Primitives
//!
//! Hashing for chain linkage and record attestation, plus the encryption
//! transform applied to sealed records. Everything here is a thin wrapper
//! around audited crates:
//!
//! - **SHA-256** (`sha2`) for block and record digests.
//! - **X25519** (`x25519-dalek`) for the sealed-box key agreement.
//! - **BLAKE3** (`blake3`) as the sealed-box KDF.
//! - **AES-256-GCM** (`aes-gcm`) for the record body.

pub mod encryption;
pub mod hash;
pub mod keys;

pub use encryption::{decrypt, encrypt, open_sealed, seal, EncryptionError};
pub use hash::{canonical_json, hash_link, hash_value, sha256};
pub use keys::{KeyError, KeyPair, PublicKey};
