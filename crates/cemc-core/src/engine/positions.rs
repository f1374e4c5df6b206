use super::change::SymbolChange;
use crate::core::symbols::SymbolTable;
use std::collections::BTreeMap;

/// Species -> sorted list of the sites currently holding it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AtomPositionTracker {
    positions: BTreeMap<String, Vec<usize>>,
}

impl AtomPositionTracker {
    pub fn from_symbols(symbols: &SymbolTable) -> Self {
        let mut positions: BTreeMap<String, Vec<usize>> = symbols
            .unique_species()
            .iter()
            .map(|s| (s.clone(), Vec::new()))
            .collect();
        for site in 0..symbols.len() {
            if let Some(sites) = positions.get_mut(symbols.symbol(site)) {
                sites.push(site);
            }
        }
        Self { positions }
    }

    pub fn apply(&mut self, change: &SymbolChange) {
        if change.old_symbol == change.new_symbol {
            return;
        }
        if let Some(sites) = self.positions.get_mut(&change.old_symbol) {
            if let Ok(pos) = sites.binary_search(&change.index) {
                sites.remove(pos);
            }
        }
        let sites = self.positions.entry(change.new_symbol.clone()).or_default();
        if let Err(pos) = sites.binary_search(&change.index) {
            sites.insert(pos, change.index);
        }
    }

    pub fn positions(&self, species: &str) -> &[usize] {
        self.positions.get(species).map_or(&[], Vec::as_slice)
    }
}
