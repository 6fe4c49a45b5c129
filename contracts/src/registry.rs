//! # Contract Registry
//!
//! Name-addressed contracts bound to one chain (and optionally one record
//! store). Registration and lookup are lock-free through `dashmap`, so the
//! registry can be shared behind an `Arc` and used from many tasks.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

use strata_ledger::storage::{ChainStore, RecordStore};

use crate::engine::{Contract, ContractError, SmartContract, Sink};

pub struct ContractRegistry {
    chain: Arc<ChainStore>,
    records: Option<Arc<RecordStore>>,
    contracts: DashMap<String, Arc<dyn Contract>>,
}

impl ContractRegistry {
    pub fn new(chain: Arc<ChainStore>) -> Self {
        Self {
            chain,
            records: None,
            contracts: DashMap::new(),
        }
    }

    /// Bind a record store; every contract executed through this registry
    /// can then read records and commit into them.
    pub fn with_storage(mut self, records: Arc<RecordStore>) -> Self {
        self.records = Some(records);
        self
    }

    /// Register `contract` under `name`, returning whatever it replaced.
    pub fn register(
        &self,
        name: impl Into<String>,
        contract: Arc<dyn Contract>,
    ) -> Option<Arc<dyn Contract>> {
        let name = name.into();
        debug!(name = %name, "contract registered");
        self.contracts.insert(name, contract)
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<dyn Contract>> {
        self.contracts.remove(name).map(|(_, contract)| contract)
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<dyn Contract>, ContractError> {
        self.contracts
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| ContractError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.contracts.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.contracts.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    /// Execute the contract registered under `name`, committing to the chain.
    ///
    /// An unknown name fails with [`ContractError::NotFound`] and leaves the
    /// chain untouched.
    pub async fn execute(&self, name: &str, args: Value) -> Result<Value, ContractError> {
        self.execute_into(name, args, Sink::Chain).await
    }

    /// Like [`execute`](Self::execute) but with an explicit [`Sink`].
    pub async fn execute_into(
        &self,
        name: &str,
        args: Value,
        sink: Sink,
    ) -> Result<Value, ContractError> {
        let contract = self.bind(name)?.with_sink(sink);
        contract.execute(args).await
    }

    /// Build the [`SmartContract`] for `name` without running it.
    pub fn bind(&self, name: &str) -> Result<SmartContract, ContractError> {
        let contract = SmartContract::new(Arc::clone(&self.chain), self.lookup(name)?);
        Ok(match &self.records {
            Some(records) => contract.with_storage(Arc::clone(records)),
            None => contract,
        })
    }
}

impl std::fmt::Debug for ContractRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractRegistry")
            .field("contracts", &self.names())
            .field("storage", &self.records.is_some())
            .finish()
    }
}
