// Copyright (c) 2026 Strata Contributors. MIT License.
// See LICENSE for details.

//! # Strata Contracts
//!
//! Procedures that read a Strata chain and commit what they compute back
//! onto it:
//!
//! - **Engine**: [`SmartContract`] runs one [`Contract`] against a
//!   read-only [`Reader`], then appends either its result or a
//!   [`Diagnostic`] describing its failure.
//! - **Registry**: [`ContractRegistry`] maps names to contracts and
//!   executes them by name.
//! - **Catalog**: [`ContractCatalog`] stores contract definitions on the
//!   chain itself and rebuilds them from trusted templates.
//!
//! ## Design Principles
//!
//! 1. Procedures never write. The reader has no mutating method; the return
//!    value is the only way a procedure changes state.
//! 2. Every execution leaves exactly one block behind, success or failure.
//! 3. Definitions on disk are data. Code comes only from templates the host
//!    process registers.

pub mod catalog;
pub mod engine;
pub mod reader;
pub mod registry;

pub use catalog::{ContractCatalog, ContractDefinition, TemplateFactory};
pub use engine::{contract_fn, Contract, ContractError, Diagnostic, FnContract, Sink, SmartContract};
pub use reader::{ReadError, Reader};
pub use registry::ContractRegistry;
