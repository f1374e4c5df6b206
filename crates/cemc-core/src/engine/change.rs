use super::error::EngineError;
use serde::{Deserialize, Serialize};

/// One site mutation: `index` goes from `old_symbol` to `new_symbol`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolChange {
    pub index: usize,
    pub old_symbol: String,
    pub new_symbol: String,
}

/// The canonical constant-composition move: two sites exchange species.
pub type SwapMove = [SymbolChange; 2];

impl SymbolChange {
    pub fn new(index: usize, old_symbol: impl Into<String>, new_symbol: impl Into<String>) -> Self {
        Self {
            index,
            old_symbol: old_symbol.into(),
            new_symbol: new_symbol.into(),
        }
    }

    pub fn reversed(&self) -> Self {
        Self {
            index: self.index,
            old_symbol: self.new_symbol.clone(),
            new_symbol: self.old_symbol.clone(),
        }
    }
}

impl From<(usize, &str, &str)> for SymbolChange {
    fn from((index, old_symbol, new_symbol): (usize, &str, &str)) -> Self {
        Self::new(index, old_symbol, new_symbol)
    }
}

/// Builds the pair of changes that exchanges the species of two sites.
pub fn swap(a: usize, symbol_a: &str, b: usize, symbol_b: &str) -> SwapMove {
    [
        SymbolChange::new(a, symbol_a, symbol_b),
        SymbolChange::new(b, symbol_b, symbol_a),
    ]
}

/// Checks the shape of a move: one or two changes on distinct sites, all
/// inside a lattice of `num_sites`.
pub fn validate_move(changes: &[SymbolChange], num_sites: usize) -> Result<(), EngineError> {
    if changes.is_empty() || changes.len() > 2 {
        return Err(EngineError::InvalidArgument(format!(
            "A move consists of one or two changes, got {}",
            changes.len()
        )));
    }
    if let Some(change) = changes.iter().find(|c| c.index >= num_sites) {
        return Err(EngineError::InvalidArgument(format!(
            "Site {} is out of range for a lattice of {} sites",
            change.index, num_sites
        )));
    }
    if changes.len() == 2 && changes[0].index == changes[1].index {
        return Err(EngineError::InvalidArgument(format!(
            "Both changes of a paired move target site {}",
            changes[0].index
        )));
    }
    Ok(())
}
