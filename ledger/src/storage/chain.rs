//! # Chain Store
//!
//! The block store: a directory of content-addressed block blobs plus one
//! small metadata file pointing at the tail.
//!
//! ## Directory Layout
//!
//! | File              | Contents                                   | Mutability        |
//! |-------------------|--------------------------------------------|-------------------|
//! | `.chain-meta`     | `{tailHash, nextId}`                       | atomically replaced |
//! | `{hash}.json`     | `{id, prev, timestamp, data}`              | written once      |
//! | `LOCK`            | pid of the owning process                  | advisory lock     |
//!
//! ## Append Ordering
//!
//! `add_block` writes and syncs the blob first, then writes the new metadata
//! to `.chain-meta.tmp`, syncs it and renames it over `.chain-meta`. A crash
//! between the two steps leaves an orphaned blob and the old, still valid
//! tail. The metadata never points at a blob that is not fully on disk.
//!
//! ## Validation
//!
//! There is no forward index. Validation walks backwards from the tail (or
//! any given hash) following `prev` links, recomputing each block's hash and
//! comparing it with the name it was stored under. The walk can be bounded
//! with `last`, in which case it only vouches for the blocks it touched.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::block::{Block, BlockRef, ChainMeta};
use super::lock::{DirLock, LockError};
use crate::config::{BLOB_EXTENSION, CHAIN_META_FILE, CHAIN_META_TMP_FILE};
use crate::crypto::hash::{is_digest, CanonicalError};

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during chain operations.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("block not found: {0}")]
    NotFound(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("chain directory already locked: {}", .0.display())]
    Locked(PathBuf),

    #[error("corrupt chain metadata: {0}")]
    CorruptMeta(String),
}

impl ChainError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ChainError::NotFound(_))
    }
}

impl From<CanonicalError> for ChainError {
    fn from(e: CanonicalError) -> Self {
        ChainError::Serialization(e.to_string())
    }
}

impl From<LockError> for ChainError {
    fn from(e: LockError) -> Self {
        match e {
            LockError::Held(path) => ChainError::Locked(path),
            LockError::Io(e) => ChainError::Io(e),
        }
    }
}

pub type ChainResult<T> = Result<T, ChainError>;

// ---------------------------------------------------------------------------
// Validation Types
// ---------------------------------------------------------------------------

/// Bounds for [`ChainStore::verify`].
#[derive(Clone, Debug, Default)]
pub struct ValidateOptions {
    /// Stop after this many blocks have been checked. `None` walks to the root.
    pub last: Option<usize>,
    /// Start from this hash instead of the current tail.
    pub from: Option<String>,
}

impl ValidateOptions {
    /// Check only the `n` most recent blocks.
    pub fn last(n: usize) -> Self {
        Self {
            last: Some(n),
            from: None,
        }
    }

    /// Start the walk at `hash`.
    pub fn from(mut self, hash: impl Into<String>) -> Self {
        self.from = Some(hash.into());
        self
    }
}

/// How a validation walk ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid,
    /// The walk hit a block that is missing, unreadable, or does not match
    /// the hash it is referenced by.
    Broken { at: String, reason: String },
}

/// Result of a validation walk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationReport {
    /// Number of blocks that passed before the walk ended.
    pub checked: usize,
    pub outcome: ValidationOutcome,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.outcome == ValidationOutcome::Valid
    }
}

/// A block together with the hash it is stored under.
#[derive(Clone, Debug, PartialEq)]
pub struct ChainEntry {
    pub hash: String,
    pub block: Block,
}

// ---------------------------------------------------------------------------
// ChainStore
// ---------------------------------------------------------------------------

/// Handle to an open chain directory.
///
/// Only [`open`](Self::open) constructs one, and it returns after genesis
/// creation or metadata load has finished, so a `ChainStore` is always
/// fully initialized.
///
/// # Concurrency
///
/// Appends are serialized by an in-process mutex around the whole
/// read-tail, write-blob, write-metadata sequence, and the directory is
/// flock'd for the lifetime of the handle. Reads take no write lock: blobs
/// are immutable and the in-memory metadata is swapped only after the new
/// metadata file is in place. Share a store across tasks with `Arc`.
#[derive(Debug)]
pub struct ChainStore {
    dir: PathBuf,
    meta: RwLock<ChainMeta>,
    write_lock: Mutex<()>,
    _lock: DirLock,
}

impl ChainStore {
    /// Open the chain in `dir`, creating the directory and a genesis block if
    /// no metadata exists yet.
    ///
    /// Does not load the chain: only `{tailHash, nextId}` is read.
    pub async fn open(dir: impl AsRef<Path>) -> ChainResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;
        let lock = DirLock::acquire(&dir)?;

        let meta_path = dir.join(CHAIN_META_FILE);
        let meta = match fs::read(&meta_path).await {
            Ok(bytes) => {
                let meta: ChainMeta = serde_json::from_slice(&bytes)
                    .map_err(|e| ChainError::CorruptMeta(e.to_string()))?;
                info!(
                    dir = %dir.display(),
                    tail = %meta.tail_hash,
                    next_id = meta.next_id,
                    "chain opened"
                );
                meta
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let genesis = Block::genesis();
                let hash = genesis.compute_hash()?;
                write_blob(&dir, &hash, &genesis).await?;
                let meta = ChainMeta {
                    tail_hash: hash,
                    next_id: genesis.id + 1,
                };
                write_meta(&dir, &meta).await?;
                info!(dir = %dir.display(), genesis = %meta.tail_hash, "chain initialized");
                meta
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            dir,
            meta: RwLock::new(meta),
            write_lock: Mutex::new(()),
            _lock: lock,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Hash of the most recently appended block.
    pub fn tail_hash(&self) -> String {
        self.meta.read().tail_hash.clone()
    }

    /// Id the next appended block will receive.
    pub fn next_id(&self) -> u64 {
        self.meta.read().next_id
    }

    /// Snapshot of the current metadata.
    pub fn meta(&self) -> ChainMeta {
        self.meta.read().clone()
    }

    // -- Writes -------------------------------------------------------------

    /// Append `data` as a new block on top of the current tail.
    pub async fn add_block<T: Serialize + ?Sized>(&self, data: &T) -> ChainResult<BlockRef> {
        let data: Value =
            serde_json::to_value(data).map_err(|e| ChainError::Serialization(e.to_string()))?;

        let _guard = self.write_lock.lock().await;
        let current = self.meta();

        let block = Block::next(current.next_id, current.tail_hash, data);
        let hash = block.compute_hash()?;
        write_blob(&self.dir, &hash, &block).await?;

        let next = ChainMeta {
            tail_hash: hash.clone(),
            next_id: block.id + 1,
        };
        write_meta(&self.dir, &next).await?;
        *self.meta.write() = next;

        debug!(id = block.id, hash = %hash, prev = %block.prev, "block appended");
        Ok(BlockRef { id: block.id, hash })
    }

    // -- Reads --------------------------------------------------------------

    /// Load the block stored under `hash`.
    ///
    /// Anything that is not a digest this store could have produced is
    /// reported as `NotFound` without touching the filesystem.
    pub async fn read_block(&self, hash: &str) -> ChainResult<Block> {
        if !is_digest(hash) {
            return Err(ChainError::NotFound(hash.to_string()));
        }

        let bytes = match fs::read(self.blob_path(hash)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ChainError::NotFound(hash.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&bytes)
            .map_err(|e| ChainError::Serialization(format!("block {hash}: {e}")))
    }

    /// Load the current tail block.
    pub async fn last_block(&self) -> ChainResult<Block> {
        self.read_block(&self.tail_hash()).await
    }

    /// Blocks from `from` (default: tail) back towards the root, newest
    /// first, at most `limit` of them.
    pub async fn history(
        &self,
        from: Option<&str>,
        limit: Option<usize>,
    ) -> ChainResult<Vec<ChainEntry>> {
        let mut hash = from.map(str::to_string).unwrap_or_else(|| self.tail_hash());
        let mut entries = Vec::new();

        while limit.map_or(true, |n| entries.len() < n) {
            let block = self.read_block(&hash).await?;
            let prev = block.prev.clone();
            let done = block.is_genesis();
            entries.push(ChainEntry { hash, block });
            if done {
                break;
            }
            hash = prev;
        }

        Ok(entries)
    }

    /// Whether `hash` is reachable by walking back from the tail.
    ///
    /// A well-formed blob sitting in the directory is not enough: orphans
    /// left by a crash, or planted by hand, are not part of the chain. The
    /// walk stops as soon as it passes the target's id, and treats a
    /// missing link or ids that fail to decrease as "not reachable".
    pub async fn contains(&self, hash: &str) -> ChainResult<bool> {
        let target = match self.read_block(hash).await {
            Ok(block) => block,
            Err(ChainError::NotFound(_)) | Err(ChainError::Serialization(_)) => return Ok(false),
            Err(e) => return Err(e),
        };

        let mut current = self.tail_hash();
        let mut last_id: Option<u64> = None;
        loop {
            if current == hash {
                return Ok(true);
            }
            let block = match self.read_block(&current).await {
                Ok(block) => block,
                Err(ChainError::NotFound(_)) | Err(ChainError::Serialization(_)) => {
                    return Ok(false)
                }
                Err(e) => return Err(e),
            };
            if block.id <= target.id
                || block.is_genesis()
                || last_id.is_some_and(|id| block.id >= id)
            {
                return Ok(false);
            }
            last_id = Some(block.id);
            current = block.prev;
        }
    }

    // -- Validation ---------------------------------------------------------

    /// Walk the chain backwards and report where, if anywhere, it breaks.
    ///
    /// Missing blobs, unparseable blobs, hash mismatches, and id gaps all
    /// end the walk with [`ValidationOutcome::Broken`]. Only genuine I/O
    /// failures are returned as errors.
    pub async fn verify(&self, opts: ValidateOptions) -> ChainResult<ValidationReport> {
        let mut hash = opts.from.unwrap_or_else(|| self.tail_hash());
        let mut checked = 0usize;
        let mut expected_id: Option<u64> = None;

        let broken = |checked: usize, at: &str, reason: String| -> ChainResult<ValidationReport> {
            warn!(at = %at, reason = %reason, "chain validation failed");
            Ok(ValidationReport {
                checked,
                outcome: ValidationOutcome::Broken {
                    at: at.to_string(),
                    reason,
                },
            })
        };

        loop {
            if opts.last.is_some_and(|n| checked >= n) {
                break;
            }

            let block = match self.read_block(&hash).await {
                Ok(block) => block,
                Err(ChainError::NotFound(_)) => {
                    return broken(checked, &hash, "dangling reference".into())
                }
                Err(ChainError::Serialization(e)) => return broken(checked, &hash, e),
                Err(e) => return Err(e),
            };

            if let Err(reason) = block.verify(&hash) {
                return broken(checked, &hash, reason);
            }
            if let Some(id) = expected_id {
                if block.id != id {
                    return broken(
                        checked,
                        &hash,
                        format!("expected id {id}, found {}", block.id),
                    );
                }
            }

            checked += 1;
            if block.is_genesis() {
                break;
            }
            // verify() guarantees a non-genesis block has id >= 1.
            expected_id = Some(block.id - 1);
            hash = block.prev;
        }

        debug!(checked, "chain validation passed");
        Ok(ValidationReport {
            checked,
            outcome: ValidationOutcome::Valid,
        })
    }

    /// Boolean form of [`verify`](Self::verify).
    pub async fn is_valid(&self, opts: ValidateOptions) -> ChainResult<bool> {
        Ok(self.verify(opts).await?.is_valid())
    }

    fn blob_path(&self, hash: &str) -> PathBuf {
        blob_path(&self.dir, hash)
    }
}

// ---------------------------------------------------------------------------
// File Helpers
// ---------------------------------------------------------------------------

pub(crate) fn blob_path(dir: &Path, hash: &str) -> PathBuf {
    dir.join(format!("{hash}.{BLOB_EXTENSION}"))
}

async fn write_blob(dir: &Path, hash: &str, block: &Block) -> ChainResult<()> {
    let bytes =
        serde_json::to_vec_pretty(block).map_err(|e| ChainError::Serialization(e.to_string()))?;
    write_synced(&blob_path(dir, hash), &bytes).await
}

async fn write_meta(dir: &Path, meta: &ChainMeta) -> ChainResult<()> {
    let bytes =
        serde_json::to_vec_pretty(meta).map_err(|e| ChainError::Serialization(e.to_string()))?;
    let tmp = dir.join(CHAIN_META_TMP_FILE);
    write_synced(&tmp, &bytes).await?;
    fs::rename(&tmp, dir.join(CHAIN_META_FILE)).await?;
    Ok(())
}

pub(crate) async fn write_synced(path: &Path, bytes: &[u8]) -> ChainResult<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn corrupt(store: &ChainStore, hash: &str, from: &str, to: &str) {
        let path = store.blob_path(hash);
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains(from), "blob does not contain {from}");
        std::fs::write(&path, text.replacen(from, to, 1)).unwrap();
    }

    #[tokio::test]
    async fn fresh_directory_gets_genesis() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChainStore::open(dir.path()).await.unwrap();

        assert_eq!(store.next_id(), 1);
        let genesis = store.last_block().await.unwrap();
        assert_eq!(genesis.id, 0);
        assert_eq!(genesis.prev, "0");
        assert_eq!(genesis.data, json!({}));
        assert!(store.is_valid(ValidateOptions::default()).await.unwrap());
    }

    #[tokio::test]
    async fn metadata_file_shape() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChainStore::open(dir.path()).await.unwrap();
        store.add_block(&json!({"a": 1})).await.unwrap();

        let raw = std::fs::read(dir.path().join(CHAIN_META_FILE)).unwrap();
        let value: Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(value["nextId"], json!(2));
        assert_eq!(value["tailHash"], json!(store.tail_hash()));
        assert!(!dir.path().join(CHAIN_META_TMP_FILE).exists());
    }

    #[tokio::test]
    async fn add_block_links_to_tail() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChainStore::open(dir.path()).await.unwrap();
        let genesis_hash = store.tail_hash();

        let first = store.add_block(&json!({"value": 13.5})).await.unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(store.tail_hash(), first.hash);

        let block = store.read_block(&first.hash).await.unwrap();
        assert_eq!(block.prev, genesis_hash);
        assert_eq!(block.data, json!({"value": 13.5}));
    }

    #[tokio::test]
    async fn reopen_resumes_from_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let tail = {
            let store = ChainStore::open(dir.path()).await.unwrap();
            store.add_block(&json!(1)).await.unwrap();
            store.add_block(&json!(2)).await.unwrap().hash
        };

        let store = ChainStore::open(dir.path()).await.unwrap();
        assert_eq!(store.tail_hash(), tail);
        assert_eq!(store.next_id(), 3);
        let third = store.add_block(&json!(3)).await.unwrap();
        assert_eq!(third.id, 3);
        assert!(store.is_valid(ValidateOptions::default()).await.unwrap());
    }

    #[tokio::test]
    async fn second_open_is_locked_out() {
        let dir = tempfile::tempdir().unwrap();
        let _store = ChainStore::open(dir.path()).await.unwrap();
        let err = ChainStore::open(dir.path()).await.unwrap_err();
        assert!(matches!(err, ChainError::Locked(_)));
    }

    #[tokio::test]
    async fn read_unknown_hash_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChainStore::open(dir.path()).await.unwrap();

        let unknown = "ab".repeat(32);
        assert!(store.read_block(&unknown).await.unwrap_err().is_not_found());
        assert!(store.read_block("../LOCK").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn history_walks_to_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChainStore::open(dir.path()).await.unwrap();
        for i in 0..5 {
            store.add_block(&json!({"i": i})).await.unwrap();
        }

        let all = store.history(None, None).await.unwrap();
        assert_eq!(all.len(), 6);
        let ids: Vec<u64> = all.iter().map(|e| e.block.id).collect();
        assert_eq!(ids, vec![5, 4, 3, 2, 1, 0]);

        let recent = store.history(None, Some(2)).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].hash, store.tail_hash());
    }

    #[tokio::test]
    async fn verify_counts_checked_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChainStore::open(dir.path()).await.unwrap();
        for i in 0..3 {
            store.add_block(&json!(i)).await.unwrap();
        }

        let full = store.verify(ValidateOptions::default()).await.unwrap();
        assert!(full.is_valid());
        assert_eq!(full.checked, 4);

        let bounded = store.verify(ValidateOptions::last(2)).await.unwrap();
        assert!(bounded.is_valid());
        assert_eq!(bounded.checked, 2);
    }

    #[tokio::test]
    async fn tampered_blob_breaks_full_walk_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChainStore::open(dir.path()).await.unwrap();

        let oldest = store.add_block(&json!({"value": 13.5})).await.unwrap();
        store.add_block(&json!({"value": 13.6})).await.unwrap();
        store.add_block(&json!({"value": 13.2})).await.unwrap();

        corrupt(&store, &oldest.hash, "13.5", "13.7");

        let report = store.verify(ValidateOptions::default()).await.unwrap();
        assert!(matches!(
            report.outcome,
            ValidationOutcome::Broken { ref at, .. } if *at == oldest.hash
        ));
        assert_eq!(report.checked, 2);
        assert!(store.is_valid(ValidateOptions::last(2)).await.unwrap());
    }

    #[tokio::test]
    async fn unparseable_blob_is_invalid_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChainStore::open(dir.path()).await.unwrap();
        let r = store.add_block(&json!({"value": 1})).await.unwrap();

        std::fs::write(store.blob_path(&r.hash), b"{ not json").unwrap();
        assert!(!store.is_valid(ValidateOptions::default()).await.unwrap());
    }

    #[tokio::test]
    async fn missing_blob_is_dangling_reference() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChainStore::open(dir.path()).await.unwrap();
        let first = store.add_block(&json!(1)).await.unwrap();
        store.add_block(&json!(2)).await.unwrap();

        std::fs::remove_file(store.blob_path(&first.hash)).unwrap();
        let report = store.verify(ValidateOptions::default()).await.unwrap();
        assert!(matches!(
            report.outcome,
            ValidationOutcome::Broken { ref reason, .. } if reason == "dangling reference"
        ));
    }

    #[tokio::test]
    async fn verify_from_unknown_hash_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChainStore::open(dir.path()).await.unwrap();
        let opts = ValidateOptions::default().from("cd".repeat(32));
        assert!(!store.is_valid(opts).await.unwrap());
    }

    #[tokio::test]
    async fn id_gap_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChainStore::open(dir.path()).await.unwrap();
        let first = store.add_block(&json!("a")).await.unwrap();

        // A block claiming id 5 on top of block 1 hashes fine but breaks the
        // id sequence.
        let forged = Block::next(5, first.hash.clone(), json!("b"));
        let hash = forged.compute_hash().unwrap();
        write_blob(store.dir(), &hash, &forged).await.unwrap();

        let report = store
            .verify(ValidateOptions::default().from(hash))
            .await
            .unwrap();
        assert!(!report.is_valid());
        assert_eq!(report.checked, 1);
    }

    #[tokio::test]
    async fn concurrent_appends_are_serialized() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ChainStore::open(dir.path()).await.unwrap());

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.add_block(&json!({"writer": i})).await })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap().id);
        }
        ids.sort_unstable();
        assert_eq!(ids, (1..=16).collect::<Vec<u64>>());

        let report = store.verify(ValidateOptions::default()).await.unwrap();
        assert!(report.is_valid());
        assert_eq!(report.checked, 17);
    }
}
