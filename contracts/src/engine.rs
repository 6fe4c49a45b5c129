//! # Contract Engine
//!
//! Runs a contract procedure against a read-only view of the chain and
//! commits the outcome back onto it. The protocol for one execution:
//!
//! 1. Build a [`Reader`] over the bound chain (and record store, if any).
//! 2. Call the procedure with `(reader, args)`.
//! 3. **Success**: commit the returned value through the [`Sink`] (a new
//!    block, or a chain-attested record) and hand it back to the caller.
//! 4. **Failure**: commit a [`Diagnostic`] block naming the contract, its
//!    arguments and the error, then return the original error.
//!
//! Either way exactly one block is appended, so the chain doubles as an
//! audit log of every invocation and not only of successful ones.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use strata_ledger::storage::{BlockRef, ChainError, ChainStore, RecordStore, SaveOptions, StorageError};

use crate::reader::Reader;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while executing or loading contracts.
#[derive(Debug, Error)]
pub enum ContractError {
    /// No contract is registered under this name.
    #[error("contract not found: {0}")]
    NotFound(String),

    /// The procedure itself failed. A diagnostic block has been recorded.
    #[error("contract {contract} failed: {error}")]
    ProcedureFailure {
        /// Name of the failing contract.
        contract: String,
        /// The error the procedure returned.
        error: anyhow::Error,
    },

    /// The procedure failed and the diagnostic block could not be written
    /// either.
    #[error("contract {contract} failed ({error}) and the failure could not be recorded: {commit}")]
    FailureNotRecorded {
        /// Name of the failing contract.
        contract: String,
        /// The error the procedure returned.
        error: anyhow::Error,
        /// Why the diagnostic block could not be appended.
        commit: ChainError,
    },

    /// The contract commits into a record but no record store is bound.
    #[error("contract {0} commits to a record but no record store is bound")]
    NoRecordStore(String),

    /// A persisted contract definition is malformed or was tampered with.
    #[error("invalid contract definition: {0}")]
    InvalidDefinition(String),

    /// A persisted contract names a template this process does not provide.
    #[error("unknown contract template: {0}")]
    UnknownTemplate(String),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ContractError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ContractError::NotFound(_))
    }

    /// The procedure's own error, if this is a procedure failure.
    pub fn procedure_error(&self) -> Option<&anyhow::Error> {
        match self {
            ContractError::ProcedureFailure { error, .. }
            | ContractError::FailureNotRecorded { error, .. } => Some(error),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Contract Trait
// ---------------------------------------------------------------------------

/// A named procedure: reads through a [`Reader`], returns a value to commit.
#[async_trait]
pub trait Contract: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, reader: &Reader, args: Value) -> anyhow::Result<Value>;
}

/// Closure-backed [`Contract`]; build one with [`contract_fn`].
pub struct FnContract<F> {
    name: String,
    f: F,
}

/// Wrap an async closure as a contract.
///
/// ```ignore
/// let latest = contract_fn("latest", |reader, _args| {
///     Box::pin(async move { Ok::<_, anyhow::Error>(reader.last_block().await?.data) })
/// });
/// ```
pub fn contract_fn<F>(name: impl Into<String>, f: F) -> FnContract<F>
where
    F: for<'a> Fn(&'a Reader, Value) -> BoxFuture<'a, anyhow::Result<Value>> + Send + Sync,
{
    FnContract {
        name: name.into(),
        f,
    }
}

#[async_trait]
impl<F> Contract for FnContract<F>
where
    F: for<'a> Fn(&'a Reader, Value) -> BoxFuture<'a, anyhow::Result<Value>> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, reader: &Reader, args: Value) -> anyhow::Result<Value> {
        (self.f)(reader, args).await
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Where a successful result is committed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Sink {
    /// Append the result as a new block.
    #[default]
    Chain,
    /// Save the result as record `id`; the record store appends the
    /// attestation block.
    Record { id: String, encrypted: bool },
}

/// Block payload recorded when a procedure fails.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub contract: String,
    pub args: Value,
    pub error: String,
    /// Failure time, ms since epoch.
    pub timestamp: i64,
}

// ---------------------------------------------------------------------------
// SmartContract
// ---------------------------------------------------------------------------

/// A contract bound to the stores it reads from and commits into.
#[derive(Clone)]
pub struct SmartContract {
    chain: Arc<ChainStore>,
    records: Option<Arc<RecordStore>>,
    contract: Arc<dyn Contract>,
    sink: Sink,
}

impl SmartContract {
    pub fn new(chain: Arc<ChainStore>, contract: Arc<dyn Contract>) -> Self {
        Self {
            chain,
            records: None,
            contract,
            sink: Sink::Chain,
        }
    }

    /// Give the procedure read access to `records` (and allow
    /// [`Sink::Record`]).
    pub fn with_storage(mut self, records: Arc<RecordStore>) -> Self {
        self.records = Some(records);
        self
    }

    pub fn with_sink(mut self, sink: Sink) -> Self {
        self.sink = sink;
        self
    }

    pub fn name(&self) -> &str {
        self.contract.name()
    }

    /// Run the procedure once and commit its outcome.
    ///
    /// # Errors
    ///
    /// - [`ContractError::NoRecordStore`] before anything runs, if the sink
    ///   needs a record store that is not bound.
    /// - [`ContractError::Storage`] before anything runs, if the record sink
    ///   names an invalid id or asks for encryption without a key pair.
    /// - [`ContractError::ProcedureFailure`] if the procedure failed; the
    ///   diagnostic block is already on the chain.
    /// - Chain or storage errors if committing the result failed.
    pub async fn execute(&self, args: Value) -> Result<Value, ContractError> {
        match (&self.sink, &self.records) {
            (Sink::Record { .. }, None) => {
                return Err(ContractError::NoRecordStore(self.name().to_string()))
            }
            (Sink::Record { id, encrypted }, Some(records)) => records.check_save(
                id,
                SaveOptions {
                    encrypted: *encrypted,
                },
            )?,
            (Sink::Chain, _) => {}
        }

        let reader = Reader::new(Arc::clone(&self.chain), self.records.clone());
        match self.contract.run(&reader, args.clone()).await {
            Ok(result) => {
                // No diagnostic on a commit error: the procedure did succeed.
                let block_hash = self.commit(&result).await?;
                info!(contract = self.name(), block = %block_hash, "contract executed");
                Ok(result)
            }
            Err(error) => match self.record_failure(&args, &error.to_string()).await {
                Ok(block) => {
                    warn!(
                        contract = self.name(),
                        block = block.id,
                        error = %error,
                        "contract failed, diagnostic recorded"
                    );
                    Err(ContractError::ProcedureFailure {
                        contract: self.name().to_string(),
                        error,
                    })
                }
                Err(commit) => Err(ContractError::FailureNotRecorded {
                    contract: self.name().to_string(),
                    error,
                    commit,
                }),
            },
        }
    }

    /// Commit a successful result; returns the hash of the block that now
    /// carries or attests it.
    async fn commit(&self, result: &Value) -> Result<String, ContractError> {
        match &self.sink {
            Sink::Chain => Ok(self.chain.add_block(result).await?.hash),
            Sink::Record { id, encrypted } => {
                let records = self
                    .records
                    .as_ref()
                    .ok_or_else(|| ContractError::NoRecordStore(self.name().to_string()))?;
                let record = records
                    .save_data(id, result, SaveOptions { encrypted: *encrypted })
                    .await?;
                Ok(record.block_hash)
            }
        }
    }

    async fn record_failure(&self, args: &Value, error: &str) -> Result<BlockRef, ChainError> {
        let diagnostic = Diagnostic {
            contract: self.name().to_string(),
            args: args.clone(),
            error: error.to_string(),
            timestamp: Utc::now().timestamp_millis(),
        };
        self.chain.add_block(&diagnostic).await
    }
}

impl std::fmt::Debug for SmartContract {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartContract")
            .field("contract", &self.name())
            .field("sink", &self.sink)
            .field("storage", &self.records.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use serde_json::json;
    use strata_ledger::storage::ValidateOptions;
    use strata_ledger::StorageConfig;
    use tempfile::TempDir;

    async fn chain() -> (TempDir, Arc<ChainStore>) {
        let dir = tempfile::tempdir().unwrap();
        let chain = Arc::new(ChainStore::open(dir.path().join("chain")).await.unwrap());
        (dir, chain)
    }

    fn doubler() -> Arc<dyn Contract> {
        Arc::new(contract_fn("double", |reader, args| {
            Box::pin(async move {
                let last = reader.last_block().await?;
                let base = last.data["value"].as_f64().unwrap_or(0.0);
                let factor = args["factor"].as_f64().unwrap_or(2.0);
                Ok::<_, anyhow::Error>(json!({"value": base * factor}))
            })
        }))
    }

    fn failing() -> Arc<dyn Contract> {
        Arc::new(contract_fn("explode", |_reader, args| {
            Box::pin(async move {
                if args.is_object() {
                    bail!("refusing args {args}");
                }
                Ok::<_, anyhow::Error>(args)
            })
        }))
    }

    #[tokio::test]
    async fn success_appends_result_block() {
        let (_dir, chain) = chain().await;
        chain.add_block(&json!({"value": 3.0})).await.unwrap();

        let contract = SmartContract::new(Arc::clone(&chain), doubler());
        let result = contract.execute(json!({"factor": 2.0})).await.unwrap();

        assert_eq!(result, json!({"value": 6.0}));
        assert_eq!(chain.next_id(), 3);
        assert_eq!(chain.last_block().await.unwrap().data, result);
    }

    #[tokio::test]
    async fn failure_appends_diagnostic_and_propagates() {
        let (_dir, chain) = chain().await;
        let contract = SmartContract::new(Arc::clone(&chain), failing());

        let err = contract.execute(json!({"x": 1})).await.unwrap_err();
        assert!(matches!(err, ContractError::ProcedureFailure { ref contract, .. } if contract == "explode"));
        assert!(err
            .procedure_error()
            .unwrap()
            .to_string()
            .contains("refusing args"));

        assert_eq!(chain.next_id(), 2);
        let diagnostic: Diagnostic =
            serde_json::from_value(chain.last_block().await.unwrap().data).unwrap();
        assert_eq!(diagnostic.contract, "explode");
        assert_eq!(diagnostic.args, json!({"x": 1}));
        assert!(diagnostic.error.contains("refusing args"));
        assert!(chain.is_valid(ValidateOptions::default()).await.unwrap());
    }

    #[tokio::test]
    async fn record_sink_without_store_fails_before_running() {
        let (_dir, chain) = chain().await;
        let contract = SmartContract::new(Arc::clone(&chain), doubler()).with_sink(Sink::Record {
            id: "out".into(),
            encrypted: false,
        });

        let err = contract.execute(json!({})).await.unwrap_err();
        assert!(matches!(err, ContractError::NoRecordStore(_)));
        assert_eq!(chain.next_id(), 1);
    }

    #[tokio::test]
    async fn record_sink_saves_attested_record() {
        let (dir, chain) = chain().await;
        let records = Arc::new(
            RecordStore::open(StorageConfig::new(dir.path().join("rec")), Arc::clone(&chain))
                .await
                .unwrap(),
        );
        chain.add_block(&json!({"value": 5.0})).await.unwrap();

        let contract = SmartContract::new(Arc::clone(&chain), doubler())
            .with_storage(Arc::clone(&records))
            .with_sink(Sink::Record {
                id: "doubled".into(),
                encrypted: false,
            });
        contract.execute(json!({"factor": 3.0})).await.unwrap();

        assert_eq!(chain.next_id(), 3);
        assert_eq!(
            records.load_value("doubled").await.unwrap(),
            Some(json!({"value": 15.0}))
        );
    }

    #[tokio::test]
    async fn unusable_record_sink_is_rejected_before_running() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let (dir, chain) = chain().await;
        let records = Arc::new(
            RecordStore::open(StorageConfig::new(dir.path().join("rec")), Arc::clone(&chain))
                .await
                .unwrap(),
        );
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let marker: Arc<dyn Contract> = Arc::new(contract_fn("mark", move |_reader, args| {
            flag.store(true, Ordering::SeqCst);
            Box::pin(async move { Ok::<_, anyhow::Error>(args) })
        }));

        for sink in [
            Sink::Record {
                id: "../escape".into(),
                encrypted: false,
            },
            Sink::Record {
                id: "sealed".into(),
                encrypted: true,
            },
        ] {
            let contract = SmartContract::new(Arc::clone(&chain), Arc::clone(&marker))
                .with_storage(Arc::clone(&records))
                .with_sink(sink);
            let err = contract.execute(json!({})).await.unwrap_err();
            assert!(matches!(
                err,
                ContractError::Storage(StorageError::InvalidId(_))
                    | ContractError::Storage(StorageError::MissingKey(_))
            ));
        }

        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(chain.next_id(), 1);
    }
}
