// Copyright (c) 2026 Strata Contributors. MIT License.
// See LICENSE for details.

//! # Strata Ledger
//!
//! A local, single-writer, tamper-evident record store: an append-only
//! chain of hash-linked blocks on disk, plus a record store whose entries
//! are each attested by a block on that chain.
//!
//! ## Architecture
//!
//! - **crypto**: canonical JSON hashing, X25519 key capability, sealed-box
//!   encryption.
//! - **storage**: the block store ([`ChainStore`]) and the chain-bound
//!   record store ([`RecordStore`]).
//! - **config**: on-disk names, cryptographic lengths, storage config.
//!
//! ## What this is not
//!
//! There is no networking, consensus, forking or multi-writer merge. One
//! process owns a chain directory at a time and the chain is a singly linked
//! list walkable only from tail to root.

pub mod config;
pub mod crypto;
pub mod storage;

pub use config::StorageConfig;
pub use crypto::keys::{KeyPair, PublicKey};
pub use storage::{
    Block, BlockRef, ChainError, ChainStore, RecordStore, SaveOptions, StorageError,
    ValidateOptions,
};
