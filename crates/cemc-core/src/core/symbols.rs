use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum SymbolError {
    #[error("Site {site} holds species '{species}', which is not a known species")]
    UnknownSpecies { site: usize, species: String },
    #[error("Site index {site} is out of range for a lattice of {len} sites")]
    SiteOutOfRange { site: usize, len: usize },
}

/// Per-site species labels with an interned integer id for each site.
///
/// The set of known species is fixed at construction. Hot paths (basis
/// function lookups) use [`SymbolTable::id`]; the string view is kept for the
/// host boundary and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolTable {
    ids: Vec<u32>,
    species: Vec<String>,
    lookup: HashMap<String, u32>,
}

impl SymbolTable {
    pub fn new<S: AsRef<str>>(symbols: &[S], known_species: &[String]) -> Result<Self, SymbolError> {
        let mut species: Vec<String> = Vec::with_capacity(known_species.len());
        let mut lookup = HashMap::with_capacity(known_species.len());
        for name in known_species {
            if !lookup.contains_key(name) {
                lookup.insert(name.clone(), species.len() as u32);
                species.push(name.clone());
            }
        }

        let ids = symbols
            .iter()
            .enumerate()
            .map(|(site, symbol)| {
                lookup
                    .get(symbol.as_ref())
                    .copied()
                    .ok_or_else(|| SymbolError::UnknownSpecies {
                        site,
                        species: symbol.as_ref().to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            ids,
            species,
            lookup,
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[inline]
    pub fn id(&self, site: usize) -> u32 {
        self.ids[site]
    }

    #[inline]
    pub fn symbol(&self, site: usize) -> &str {
        &self.species[self.ids[site] as usize]
    }

    pub fn id_of(&self, species: &str) -> Option<u32> {
        self.lookup.get(species).copied()
    }

    pub fn species_name(&self, id: u32) -> Option<&str> {
        self.species.get(id as usize).map(String::as_str)
    }

    pub fn unique_species(&self) -> &[String] {
        &self.species
    }

    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    pub fn set_symbol(&mut self, site: usize, species: &str) -> Result<(), SymbolError> {
        if site >= self.ids.len() {
            return Err(SymbolError::SiteOutOfRange {
                site,
                len: self.ids.len(),
            });
        }
        let id = self
            .id_of(species)
            .ok_or_else(|| SymbolError::UnknownSpecies {
                site,
                species: species.to_string(),
            })?;
        self.ids[site] = id;
        Ok(())
    }

    pub fn to_symbols(&self) -> Vec<String> {
        (0..self.len()).map(|i| self.symbol(i).to_string()).collect()
    }

    pub fn count(&self, species: &str) -> usize {
        match self.id_of(species) {
            Some(id) => self.ids.iter().filter(|&&s| s == id).count(),
            None => 0,
        }
    }

    /// Returns true if every cached id points at a registered species.
    pub fn is_consistent(&self) -> bool {
        self.ids.iter().all(|&id| (id as usize) < self.species.len())
    }
}
