use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum BasisError {
    #[error("No basis functions were given")]
    Empty,
    #[error("Basis function {index} has no value for species '{species}'")]
    MissingSpecies { index: usize, species: String },
}

/// Site basis functions, stored as `values[bf][species_id]`.
///
/// Species ids follow the sorted order of every species named by any basis
/// function, which is also the order the symbol table interns them in.
#[derive(Debug, Clone, PartialEq)]
pub struct BasisFunctions {
    species: Vec<String>,
    values: Vec<Vec<f64>>,
}

impl BasisFunctions {
    pub fn new(raw: &[BTreeMap<String, f64>]) -> Result<Self, BasisError> {
        if raw.is_empty() {
            return Err(BasisError::Empty);
        }

        let species: Vec<String> = raw
            .iter()
            .flat_map(|bf| bf.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let values = raw
            .iter()
            .enumerate()
            .map(|(index, bf)| {
                species
                    .iter()
                    .map(|name| {
                        bf.get(name).copied().ok_or_else(|| BasisError::MissingSpecies {
                            index,
                            species: name.clone(),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { species, values })
    }

    #[inline]
    pub fn get(&self, bf: usize, species_id: u32) -> f64 {
        self.values[bf][species_id as usize]
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn species(&self) -> &[String] {
        &self.species
    }
}
