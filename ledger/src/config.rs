//! # Ledger Configuration & Constants
//!
//! Every magic string and length used by the ledger lives here. The on-disk
//! names are part of the persisted format: changing them after a directory
//! has been written means that directory can no longer be opened.

use std::path::PathBuf;

use crate::crypto::keys::KeyPair;

// ---------------------------------------------------------------------------
// Chain Layout
// ---------------------------------------------------------------------------

/// `prev` value of the genesis block. No real digest is a single character,
/// so this can never collide with a block hash.
pub const GENESIS_PREV: &str = "0";

/// Id assigned to the genesis block. The first appended block gets `1`.
pub const GENESIS_ID: u64 = 0;

/// Name of the chain metadata file inside the chain directory. This is the
/// only file in the directory that is ever overwritten.
pub const CHAIN_META_FILE: &str = ".chain-meta";

/// Scratch name the metadata is written to before being renamed into place.
pub const CHAIN_META_TMP_FILE: &str = ".chain-meta.tmp";

/// Advisory lock file held for the lifetime of an open store.
pub const LOCK_FILE: &str = "LOCK";

/// Extension of block blobs and storage records.
pub const BLOB_EXTENSION: &str = "json";

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// The digest used for block linkage and record attestation.
pub const PRIMARY_HASH_FUNCTION: &str = "SHA-256";

/// Digest length in bytes. Hex-encoded hashes are twice this long.
pub const HASH_OUTPUT_LENGTH: usize = 32;

/// AES-256-GCM key length in bytes.
pub const AES_KEY_LENGTH: usize = 32;

/// AES-256-GCM nonce length in bytes. 96 bits.
pub const AES_NONCE_LENGTH: usize = 12;

/// AES-256-GCM authentication tag length in bytes.
pub const AES_TAG_LENGTH: usize = 16;

/// X25519 public and private key length in bytes.
pub const X25519_KEY_LENGTH: usize = 32;

/// BLAKE3 `derive_key` context for sealed-box encryption keys.
/// Format: "[application] [date] [purpose]", as BLAKE3 recommends.
pub const SEALED_BOX_KDF_CONTEXT: &str = "strata 2026-01-01 sealed record key";

// ---------------------------------------------------------------------------
// Storage Layer
// ---------------------------------------------------------------------------

/// Configuration for a [`RecordStore`](crate::storage::records::RecordStore).
///
/// Keys are passed in explicitly rather than looked up from any shared cache,
/// so two stores in the same process can use different key pairs.
#[derive(Clone, Debug)]
pub struct StorageConfig {
    /// Directory holding one `{id}.json` file per record.
    pub dir: PathBuf,
    /// Key pair used to seal and open encrypted records. Plaintext-only
    /// stores can leave this empty.
    pub keys: Option<KeyPair>,
}

impl StorageConfig {
    /// Plaintext-only configuration rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            keys: None,
        }
    }

    /// Attach the key pair used for encrypted records.
    pub fn with_keys(mut self, keys: KeyPair) -> Self {
        self.keys = Some(keys);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_sentinel_cannot_be_a_digest() {
        assert_ne!(GENESIS_PREV.len(), HASH_OUTPUT_LENGTH * 2);
    }

    #[test]
    fn meta_file_names_are_hidden() {
        assert!(CHAIN_META_FILE.starts_with('.'));
        assert!(CHAIN_META_TMP_FILE.starts_with(CHAIN_META_FILE));
    }

    #[test]
    fn storage_config_builder() {
        let config = StorageConfig::new("/tmp/records");
        assert!(config.keys.is_none());
        assert_eq!(config.dir, PathBuf::from("/tmp/records"));
    }
}
