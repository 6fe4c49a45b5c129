//! # Storage Module
//!
//! Persistence for the ledger: the hash-chained block store and the
//! chain-bound record store layered on it.
//!
//! ## Architecture
//!
//! ```text
//! block.rs    Block, BlockRef and ChainMeta types, hash/verify
//! chain.rs    ChainStore: append, read, backward validation walk
//! records.rs  RecordStore: sealed/plain records attested on the chain
//! lock.rs     flock guard keeping one writer per chain directory
//! ```
//!
//! ## Data Flow
//!
//! ```text
//! save_data(id, value) ──► ChainStore::add_block({id, hash(value)})
//!          │                          │
//!          ▼                          ▼
//!   {records}/{id}.json      {chain}/{hash}.json + .chain-meta
//! ```
//!
//! ## Design Decisions
//!
//! 1. **Files, not an embedded database.** Blobs are named by their own
//!    hash, so a blob edited in place no longer verifies under its name.
//!    No separate checksum index is needed.
//!
//! 2. **One overwritten file.** `.chain-meta` holds only the tail pointer and
//!    next id and stays constant-size however long the chain gets.
//!
//! 3. **JSON on disk.** Blocks and records are meant to be inspectable with
//!    a text editor; canonical JSON is also what gets hashed.

pub mod block;
pub mod chain;
pub mod lock;
pub mod records;

pub use block::{Block, BlockRef, ChainMeta};
pub use chain::{
    ChainEntry, ChainError, ChainResult, ChainStore, ValidateOptions, ValidationOutcome,
    ValidationReport,
};
pub use records::{Attestation, RecordStore, SaveOptions, StorageError, StorageRecord, StorageResult};
