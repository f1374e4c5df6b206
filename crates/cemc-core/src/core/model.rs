use super::cluster::CatalogError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Everything needed to build a [`CeUpdater`](crate::engine::updater::CeUpdater).
///
/// This is the data boundary with whatever hosts the simulation: plain owned
/// containers in, plain owned containers out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelDescription {
    /// Species on every site.
    pub symbols: Vec<String>,
    /// Translation symmetry group of every site.
    pub symmetry_groups: Vec<usize>,
    /// `translation[site][offset]` is the neighbouring site.
    pub translation: Vec<Vec<usize>>,
    /// One table per symmetry group: cluster name -> member offset tuples.
    pub clusters: Vec<BTreeMap<String, Vec<Vec<usize>>>>,
    /// `basis_functions[bf][species]`.
    pub basis_functions: Vec<BTreeMap<String, f64>>,
    /// Correlation functions to track.
    pub correlation_functions: Vec<String>,
    pub ecis: BTreeMap<String, f64>,
    /// Decoration permutations keyed by cluster arity (`"2"`, `"3"`, ...).
    #[serde(default)]
    pub permutations: BTreeMap<String, Vec<Vec<usize>>>,
}

#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
}

impl ModelDescription {
    pub fn load(path: &Path) -> Result<Self, ModelLoadError> {
        let content = std::fs::read_to_string(path).map_err(|e| ModelLoadError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ModelLoadError::Toml {
            path: path.to_string_lossy().to_string(),
            source: e,
        })
    }

    pub fn num_sites(&self) -> usize {
        self.symbols.len()
    }

    pub fn permutations_by_arity(&self) -> Result<BTreeMap<usize, Vec<Vec<usize>>>, CatalogError> {
        self.permutations
            .iter()
            .map(|(key, perms)| {
                key.trim()
                    .parse::<usize>()
                    .map(|arity| (arity, perms.clone()))
                    .map_err(|_| CatalogError::PermutationKey(key.clone()))
            })
            .collect()
    }
}
