//! # Block Structure
//!
//! A block is one immutable entry of the chain. It is persisted as
//! `{chainDir}/{hash}.json` and never rewritten.
//!
//! ## Block Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  id: u64          (assigned by the store)    │
//! │  prev: String     (predecessor hash or "0")  │
//! │  timestamp: i64   (ms since epoch, info only)│
//! │  data: Value      (committed payload)        │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! The hash is not stored inside the blob; it is the blob's file name. A
//! block's identity is `hash_link(prev, data)`, so editing the payload
//! detaches the file from its own name.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{GENESIS_ID, GENESIS_PREV};
use crate::crypto::hash::{hash_link, CanonicalError};

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

/// One entry of the chain, as stored on disk.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Monotonic id, genesis = 0.
    pub id: u64,
    /// Hash of the preceding block, or [`GENESIS_PREV`] for the root.
    pub prev: String,
    /// Creation time in milliseconds since the Unix epoch. Not hashed.
    pub timestamp: i64,
    /// The committed value.
    pub data: Value,
}

impl Block {
    /// The root block: id 0, `prev = "0"`, empty object payload.
    pub fn genesis() -> Self {
        Self {
            id: GENESIS_ID,
            prev: GENESIS_PREV.to_string(),
            timestamp: now_millis(),
            data: Value::Object(Default::default()),
        }
    }

    /// A block extending `prev`, stamped with the current time.
    pub fn next(id: u64, prev: impl Into<String>, data: Value) -> Self {
        Self {
            id,
            prev: prev.into(),
            timestamp: now_millis(),
            data,
        }
    }

    /// Recompute this block's content hash.
    pub fn compute_hash(&self) -> Result<String, CanonicalError> {
        hash_link(&self.prev, &self.data)
    }

    /// Check that this block is the one stored under `expected_hash`.
    ///
    /// Also enforces the genesis shape: only id 0 may point at the sentinel,
    /// and id 0 must point at it.
    pub fn verify(&self, expected_hash: &str) -> Result<(), String> {
        let computed = self.compute_hash().map_err(|e| e.to_string())?;
        if computed != expected_hash {
            return Err(format!(
                "block {} hash mismatch: stored={}, computed={}",
                self.id, expected_hash, computed
            ));
        }

        if (self.id == GENESIS_ID) != (self.prev == GENESIS_PREV) {
            return Err(format!(
                "block {} has prev={:?}; only the genesis block may reference the sentinel",
                self.id, self.prev
            ));
        }

        Ok(())
    }

    pub fn is_genesis(&self) -> bool {
        self.prev == GENESIS_PREV
    }
}

/// What [`ChainStore::add_block`](super::chain::ChainStore::add_block)
/// hands back: where the new block landed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    pub id: u64,
    pub hash: String,
}

// ---------------------------------------------------------------------------
// Chain Metadata
// ---------------------------------------------------------------------------

/// Contents of `.chain-meta`: the tail pointer and the next id to assign.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainMeta {
    pub tail_hash: String,
    pub next_id: u64,
}

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
