//! # Contract Catalog
//!
//! Contracts addressable by block hash. A definition on the chain is plain
//! data: a name, a template kind and JSON parameters:
//!
//! ```json
//! { "contract": { "name": "cap", "template": "threshold", "params": { "max": 10 } } }
//! ```
//!
//! Loading one looks the template up in a table of factories registered by
//! the host process and hands it the parameters. Executable code never comes
//! from disk, so a tampered or forged definition can at worst pick a
//! different trusted template or feed it parameters the factory rejects.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use strata_ledger::storage::{BlockRef, ChainStore};

use crate::engine::{Contract, ContractError};

/// Builds a contract from `(name, params)`, rejecting params it cannot use.
pub type TemplateFactory =
    Arc<dyn Fn(&str, &Value) -> Result<Arc<dyn Contract>, ContractError> + Send + Sync>;

/// A contract as persisted on the chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContractDefinition {
    pub name: String,
    pub template: String,
    #[serde(default)]
    pub params: Value,
}

impl ContractDefinition {
    pub fn new(name: impl Into<String>, template: impl Into<String>, params: Value) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
            params,
        }
    }
}

/// Block payload wrapping a definition.
#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct DefinitionBlock {
    contract: ContractDefinition,
}

pub struct ContractCatalog {
    chain: Arc<ChainStore>,
    templates: RwLock<HashMap<String, TemplateFactory>>,
}

impl ContractCatalog {
    pub fn new(chain: Arc<ChainStore>) -> Self {
        Self {
            chain,
            templates: RwLock::new(HashMap::new()),
        }
    }

    /// Register the factory for template `kind`, replacing any previous one.
    pub fn register_template<F>(&self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&str, &Value) -> Result<Arc<dyn Contract>, ContractError> + Send + Sync + 'static,
    {
        let kind = kind.into();
        debug!(template = %kind, "contract template registered");
        self.templates.write().insert(kind, Arc::new(factory));
    }

    /// Registered template kinds, sorted.
    pub fn templates(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.templates.read().keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Persist `def` as a block. The factory is run once first so that a
    /// definition which could never load is not written.
    pub async fn save(&self, def: &ContractDefinition) -> Result<BlockRef, ContractError> {
        self.instantiate(def)?;
        let block = self
            .chain
            .add_block(&DefinitionBlock {
                contract: def.clone(),
            })
            .await?;
        info!(contract = %def.name, template = %def.template, block = block.id, "contract saved");
        Ok(block)
    }

    /// Read, verify and instantiate the definition stored in block `hash`.
    ///
    /// # Errors
    ///
    /// - [`ContractError::NotFound`] if no such block exists.
    /// - [`ContractError::InvalidDefinition`] if the block fails its hash
    ///   check or is not shaped like a definition.
    /// - [`ContractError::UnknownTemplate`] if its template is not registered.
    /// - Whatever the factory returns for unusable params.
    pub async fn load(&self, hash: &str) -> Result<Arc<dyn Contract>, ContractError> {
        let block = match self.chain.read_block(hash).await {
            Ok(block) => block,
            Err(e) if e.is_not_found() => return Err(ContractError::NotFound(hash.to_string())),
            Err(e) => return Err(e.into()),
        };
        block
            .verify(hash)
            .map_err(|reason| ContractError::InvalidDefinition(format!("block {hash}: {reason}")))?;

        let DefinitionBlock { contract: def } = serde_json::from_value(block.data)
            .map_err(|e| ContractError::InvalidDefinition(format!("block {hash}: {e}")))?;
        self.instantiate(&def)
    }

    fn instantiate(&self, def: &ContractDefinition) -> Result<Arc<dyn Contract>, ContractError> {
        if def.name.trim().is_empty() {
            return Err(ContractError::InvalidDefinition("empty contract name".into()));
        }
        let factory = self
            .templates
            .read()
            .get(&def.template)
            .cloned()
            .ok_or_else(|| ContractError::UnknownTemplate(def.template.clone()))?;
        factory(&def.name, &def.params)
    }
}

impl std::fmt::Debug for ContractCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractCatalog")
            .field("templates", &self.templates())
            .finish()
    }
}
