//! # Record Store
//!
//! Per-entity records bound to the chain. Every save appends an attestation
//! block `{id, hash}` to the [`ChainStore`], where `hash` is the content hash
//! of the record's logical value, and then writes the record file pointing
//! at that block:
//!
//! ```text
//! {storageDir}/{id}.json = { data, encrypted, timestamp, blockHash }
//! ```
//!
//! Loading reverses the transform and checks the result against the
//! attesting block before returning it. An edited record file no longer
//! matches the hash its block recorded; editing the block as well breaks the
//! chain's own linkage. Corruption is detectable, not preventable.
//!
//! The hash is always taken over the plaintext, so an attestation does not
//! depend on which key pair sealed the record.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;
use tracing::{debug, warn};

use super::block::now_millis;
use super::chain::{write_synced, ChainError, ChainStore};
use crate::config::{StorageConfig, BLOB_EXTENSION};
use crate::crypto::encryption::{open_sealed_hex, seal_hex, EncryptionError};
use crate::crypto::hash::{canonical_json, hash_value, CanonicalError};
use crate::crypto::keys::KeyPair;

/// Longest accepted record id.
const MAX_ID_LENGTH: usize = 128;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors raised by the record store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("record not found: {0}")]
    NotFound(String),

    /// The record does not match the block that attests it.
    #[error("integrity violation for record {id}: {reason}")]
    Integrity { id: String, reason: String },

    #[error("record {0} requires a key pair but none is configured")]
    MissingKey(String),

    #[error("invalid record id: {0:?}")]
    InvalidId(String),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Encryption(#[from] EncryptionError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::NotFound(_) => true,
            StorageError::Chain(e) => e.is_not_found(),
            _ => false,
        }
    }

    pub fn is_integrity_violation(&self) -> bool {
        matches!(self, StorageError::Integrity { .. })
    }
}

impl From<CanonicalError> for StorageError {
    fn from(e: CanonicalError) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A record file as stored on disk.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageRecord {
    /// The plaintext value, or a hex sealed box when `encrypted` is set.
    pub data: Value,
    pub encrypted: bool,
    /// Write time, ms since epoch.
    pub timestamp: i64,
    /// Hash of the chain block attesting this record.
    pub block_hash: String,
}

/// Payload of an attestation block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    pub id: String,
    pub hash: String,
}

/// Options for [`RecordStore::save_data`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SaveOptions {
    pub encrypted: bool,
}

impl SaveOptions {
    pub fn encrypted() -> Self {
        Self { encrypted: true }
    }
}

// ---------------------------------------------------------------------------
// RecordStore
// ---------------------------------------------------------------------------

/// Chain-bound record store.
///
/// Owns its record directory; shares the [`ChainStore`] it attests into.
/// Keep the record directory separate from the chain directory.
#[derive(Debug)]
pub struct RecordStore {
    dir: PathBuf,
    keys: Option<KeyPair>,
    chain: Arc<ChainStore>,
}

impl RecordStore {
    /// Open (creating if needed) the record directory named by `config`.
    pub async fn open(config: StorageConfig, chain: Arc<ChainStore>) -> StorageResult<Self> {
        fs::create_dir_all(&config.dir).await?;
        debug!(dir = %config.dir.display(), encrypted = config.keys.is_some(), "record store opened");
        Ok(Self {
            dir: config.dir,
            keys: config.keys,
            chain,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn chain(&self) -> &Arc<ChainStore> {
        &self.chain
    }

    /// Check, without touching disk, that [`save_data`](Self::save_data)
    /// would accept `id` with `opts`.
    pub fn check_save(&self, id: &str, opts: SaveOptions) -> StorageResult<()> {
        validate_id(id)?;
        if opts.encrypted && self.keys.is_none() {
            return Err(StorageError::MissingKey(id.to_string()));
        }
        Ok(())
    }

    /// Save `value` under `id`, attesting it on the chain.
    ///
    /// The chain block is appended before the record file is replaced; if
    /// the process dies in between, the previous record (and its own
    /// attestation) is left intact.
    pub async fn save_data<T: Serialize + ?Sized>(
        &self,
        id: &str,
        value: &T,
        opts: SaveOptions,
    ) -> StorageResult<StorageRecord> {
        self.check_save(id, opts)?;

        let plaintext =
            serde_json::to_value(value).map_err(|e| StorageError::Serialization(e.to_string()))?;
        let hash = hash_value(&plaintext)?;

        let data = if opts.encrypted {
            let keys = self
                .keys
                .as_ref()
                .ok_or_else(|| StorageError::MissingKey(id.to_string()))?;
            Value::String(seal_hex(keys.public_key(), &canonical_json(&plaintext)?)?)
        } else {
            plaintext
        };

        let block = self
            .chain
            .add_block(&Attestation {
                id: id.to_string(),
                hash,
            })
            .await?;

        let record = StorageRecord {
            data,
            encrypted: opts.encrypted,
            timestamp: now_millis(),
            block_hash: block.hash,
        };
        self.write_record(id, &record).await?;

        debug!(id, block = block.id, encrypted = opts.encrypted, "record saved");
        Ok(record)
    }

    /// Load, decrypt and validate the record stored under `id`.
    ///
    /// Returns `Ok(None)` if there is no such record. A record that fails
    /// validation is never returned.
    pub async fn load_value(&self, id: &str) -> StorageResult<Option<Value>> {
        let record = match self.read_record(id).await {
            Ok(record) => record,
            Err(StorageError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let plaintext = if record.encrypted {
            let keys = self
                .keys
                .as_ref()
                .ok_or_else(|| StorageError::MissingKey(id.to_string()))?;
            let sealed = record.data.as_str().ok_or_else(|| StorageError::Integrity {
                id: id.to_string(),
                reason: "encrypted record data is not a string".into(),
            })?;
            let bytes = open_sealed_hex(keys, sealed)?;
            serde_json::from_slice(&bytes).map_err(|e| StorageError::Integrity {
                id: id.to_string(),
                reason: format!("decrypted payload is not JSON: {e}"),
            })?
        } else {
            record.data
        };

        self.validate(id, &plaintext, &record.block_hash).await?;
        Ok(Some(plaintext))
    }

    /// Typed form of [`load_value`](Self::load_value).
    pub async fn load_data<T: DeserializeOwned>(&self, id: &str) -> StorageResult<Option<T>> {
        match self.load_value(id).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| StorageError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    /// Check `plaintext` against the block stored under `block_hash`.
    ///
    /// The block must exist, hash to its own name, be reachable from the
    /// chain tail, and carry an attestation for `id` whose hash equals the
    /// plaintext's content hash.
    pub async fn validate(&self, id: &str, plaintext: &Value, block_hash: &str) -> StorageResult<()> {
        let violation = |reason: String| {
            warn!(id, block = %block_hash, reason = %reason, "record integrity violation");
            StorageError::Integrity {
                id: id.to_string(),
                reason,
            }
        };

        let block = match self.chain.read_block(block_hash).await {
            Ok(block) => block,
            Err(ChainError::NotFound(_)) => {
                return Err(violation(format!("attesting block {block_hash} not found")))
            }
            Err(ChainError::Serialization(e)) => return Err(violation(e)),
            Err(e) => return Err(e.into()),
        };
        block.verify(block_hash).map_err(&violation)?;
        if !self.chain.contains(block_hash).await? {
            return Err(violation(format!(
                "attesting block {block_hash} is not on the chain"
            )));
        }

        let attestation: Attestation = serde_json::from_value(block.data)
            .map_err(|_| violation(format!("block {} is not a record attestation", block.id)))?;

        if attestation.id != id {
            return Err(violation(format!(
                "block {} attests record {:?}",
                block.id, attestation.id
            )));
        }

        let actual = hash_value(plaintext)?;
        if attestation.hash != actual {
            return Err(violation(format!(
                "content hash mismatch: attested={}, actual={}",
                attestation.hash, actual
            )));
        }

        Ok(())
    }

    /// Read the raw record file without decrypting or validating it.
    pub async fn read_record(&self, id: &str) -> StorageResult<StorageRecord> {
        validate_id(id)?;
        let bytes = match fs::read(self.record_path(id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes).map_err(|e| StorageError::Integrity {
            id: id.to_string(),
            reason: format!("record file is not valid: {e}"),
        })
    }

    /// Ids of all stored records, sorted.
    pub async fn ids(&self) -> StorageResult<Vec<String>> {
        let mut ids = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(id) = name.strip_suffix(&format!(".{BLOB_EXTENSION}")) {
                if validate_id(id).is_ok() {
                    ids.push(id.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.{BLOB_EXTENSION}"))
    }

    async fn write_record(&self, id: &str, record: &StorageRecord) -> StorageResult<()> {
        let bytes = serde_json::to_vec_pretty(record)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let tmp = self.dir.join(format!(".{id}.{BLOB_EXTENSION}.tmp"));
        write_synced(&tmp, &bytes).await?;
        fs::rename(&tmp, self.record_path(id)).await?;
        Ok(())
    }
}

/// Record ids become file names: `[A-Za-z0-9_.-]+`, not starting with `.`.
fn validate_id(id: &str) -> StorageResult<()> {
    let ok = !id.is_empty()
        && id.len() <= MAX_ID_LENGTH
        && !id.starts_with('.')
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.'));
    if ok {
        Ok(())
    } else {
        Err(StorageError::InvalidId(id.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
