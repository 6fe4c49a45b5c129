//! # Reader Capability
//!
//! The only view of persistent state a contract procedure ever gets. A
//! [`Reader`] can look at blocks and records but has no method that appends
//! or writes anything, so the procedure's return value is its only way to
//! change state.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use strata_ledger::storage::{
    Block, ChainEntry, ChainError, ChainStore, RecordStore, StorageError,
};

/// Errors surfaced to a procedure by its reader.
#[derive(Debug, Error)]
pub enum ReadError {
    /// The procedure asked for a record but the contract has no record store.
    #[error("no record store is bound to this contract")]
    NoRecordStore,

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A block or record did not have the shape the procedure asked for.
    #[error("unexpected data shape: {0}")]
    Shape(String),
}

/// Read-only access to a chain and, optionally, its record store.
#[derive(Clone, Debug)]
pub struct Reader {
    chain: Arc<ChainStore>,
    records: Option<Arc<RecordStore>>,
}

impl Reader {
    pub(crate) fn new(chain: Arc<ChainStore>, records: Option<Arc<RecordStore>>) -> Self {
        Self { chain, records }
    }

    /// Hash of the chain tail at the time of the call.
    pub fn tail_hash(&self) -> String {
        self.chain.tail_hash()
    }

    /// The current tail block.
    pub async fn last_block(&self) -> Result<Block, ReadError> {
        Ok(self.chain.last_block().await?)
    }

    /// The block stored under `hash`.
    pub async fn block(&self, hash: &str) -> Result<Block, ReadError> {
        Ok(self.chain.read_block(hash).await?)
    }

    /// Up to `limit` most recent blocks, newest first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<ChainEntry>, ReadError> {
        Ok(self.chain.history(None, Some(limit)).await?)
    }

    /// A validated record, or `None` if it does not exist.
    pub async fn record(&self, id: &str) -> Result<Option<Value>, ReadError> {
        let records = self.records.as_ref().ok_or(ReadError::NoRecordStore)?;
        Ok(records.load_value(id).await?)
    }

    /// Typed form of [`record`](Self::record).
    pub async fn record_as<T: DeserializeOwned>(&self, id: &str) -> Result<Option<T>, ReadError> {
        match self.record(id).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| ReadError::Shape(format!("record {id}: {e}"))),
            None => Ok(None),
        }
    }

    /// The tail block's payload, deserialized.
    pub async fn last_data<T: DeserializeOwned>(&self) -> Result<T, ReadError> {
        let block = self.last_block().await?;
        serde_json::from_value(block.data)
            .map_err(|e| ReadError::Shape(format!("block {}: {e}", block.id)))
    }
}
