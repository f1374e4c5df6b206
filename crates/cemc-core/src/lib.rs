//! # cemc Core Library
//!
//! Cluster-expansion Monte Carlo building blocks: incremental correlation
//! functions for lattice configurations and connectivity tracking of solute
//! clusters.
//!
//! ## Architectural Philosophy
//!
//! The library follows a three-layer architecture so that data, state and
//! procedures stay separate.
//!
//! - **[`core`]: The Foundation.** Stateless descriptions of a lattice model:
//!   species interning (`SymbolTable`), the neighbour `TranslationMatrix`, site
//!   basis functions and the `ClusterCatalog`, plus the serde `ModelDescription`
//!   that a host fills in.
//!
//! - **[`engine`]: The Logic Core.** The stateful layer. `CeUpdater` maintains
//!   correlation functions incrementally with exact undo, and `ClusterTracker`
//!   maintains an asymmetric union forest over solute sites with side-effect
//!   free probing.
//!
//! - **[`workflows`]: The Public API.** Complete procedures built on the
//!   engine: canonical and semi-grand-canonical Metropolis sampling with an
//!   optional cluster connectivity constraint.

pub mod core;
pub mod engine;
pub mod workflows;
