//! # Core Module
//!
//! Stateless building blocks of a cluster-expansion model: what sits on every
//! lattice site, how sites relate to each other by translation, which groups of
//! sites form clusters, and how species are turned into numbers.
//!
//! - **Symbols** ([`symbols`]) - Per-site species with interned ids
//! - **Translation** ([`translation`]) - `(site, offset) -> site` table and its inverse
//! - **Basis functions** ([`basis`]) - Species -> value tables indexed by decoration digit
//! - **Clusters** ([`cluster`]) - Per symmetry group cluster catalog, correlation function names
//! - **Model** ([`model`]) - Serializable description used to build an updater, TOML loading
//!
//! Nothing in here changes after construction except the symbol table, and that
//! only through the engine's move primitives.

pub mod basis;
pub mod cluster;
pub mod model;
pub mod symbols;
pub mod translation;
