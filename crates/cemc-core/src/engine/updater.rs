use super::change::{SymbolChange, validate_move};
use super::error::EngineError;
use super::history::CfHistory;
use super::positions::AtomPositionTracker;
use super::vibration::LinearVibCorrection;
use crate::core::basis::BasisFunctions;
use crate::core::cluster::{
    ClusterCatalog, CorrelationTerm, expand_decoration, validate_decoration_numbers,
};
use crate::core::model::ModelDescription;
use crate::core::symbols::SymbolTable;
use crate::core::translation::TranslationMatrix;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, trace};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Ready,
    /// The last ECI update did not match the correlation functions.
    InitFailed,
}

/// How one correlation function is evaluated.
#[derive(Debug, Clone, PartialEq)]
enum TermPlan {
    Constant,
    Cluster {
        cluster: String,
        /// One basis function index per site, one row per decoration permutation.
        decorations: Vec<Vec<usize>>,
        /// `1 / (occurrences * permutations)`.
        weight: f64,
    },
}

/// Keeps the correlation functions of a lattice configuration up to date as
/// single sites change.
///
/// A change at site `s` only touches occurrences that contain `s`: those
/// anchored at `s` and those anchored at any site that reaches `s` through the
/// translation table. Each is evaluated before and after the change and the
/// running mean moves by the difference, so the cost of a move is independent
/// of the lattice size.
///
/// Moves are speculative until [`clear_history`](Self::clear_history) commits
/// them; [`undo_changes`](Self::undo_changes) restores species and correlation
/// functions exactly.
#[derive(Debug, Clone)]
pub struct CeUpdater {
    symbols: SymbolTable,
    basis: BasisFunctions,
    catalog: Arc<ClusterCatalog>,
    translation: Arc<TranslationMatrix>,
    names: Vec<String>,
    index: HashMap<String, usize>,
    plans: Vec<TermPlan>,
    by_cluster: BTreeMap<String, Vec<usize>>,
    cf: Vec<f64>,
    ecis: BTreeMap<String, f64>,
    eci_terms: Vec<(usize, f64)>,
    history: CfHistory,
    positions: Option<AtomPositionTracker>,
    vib_correction: Option<LinearVibCorrection>,
    vib_temperature: f64,
    status: ReadyState,
}

impl CeUpdater {
    pub fn new(model: &ModelDescription) -> Result<Self, EngineError> {
        info!(
            "Initializing CE updater for {} sites and {} correlation functions...",
            model.num_sites(),
            model.correlation_functions.len()
        );

        let translation = TranslationMatrix::new(&model.translation)?;
        let num_sites = model.num_sites();
        if translation.num_sites() != num_sites || model.symmetry_groups.len() != num_sites {
            return Err(EngineError::Configuration(format!(
                "Lattice size mismatch: {} symbols, {} translation rows, {} symmetry group entries",
                num_sites,
                translation.num_sites(),
                model.symmetry_groups.len()
            )));
        }

        let basis = BasisFunctions::new(&model.basis_functions)?;
        let symbols = SymbolTable::new(&model.symbols, basis.species())
            .map_err(|e| EngineError::Configuration(e.to_string()))?;
        let catalog = ClusterCatalog::new(
            &model.clusters,
            &model.symmetry_groups,
            &model.permutations_by_arity()?,
            translation.num_offsets(),
        )?;

        validate_decoration_numbers(model.correlation_functions.iter().map(String::as_str))?;

        let mut names = Vec::with_capacity(model.correlation_functions.len());
        let mut index = HashMap::with_capacity(model.correlation_functions.len());
        let mut plans = Vec::with_capacity(model.correlation_functions.len());
        let mut by_cluster: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for name in &model.correlation_functions {
            if index.contains_key(name) {
                return Err(EngineError::Configuration(format!(
                    "Correlation function '{name}' is listed more than once"
                )));
            }
            let plan = Self::plan_term(name, &catalog, &basis)?;
            if let TermPlan::Cluster { cluster, .. } = &plan {
                by_cluster.entry(cluster.clone()).or_default().push(plans.len());
            }
            index.insert(name.clone(), plans.len());
            names.push(name.clone());
            plans.push(plan);
        }

        let mut updater = Self {
            symbols,
            basis,
            catalog: Arc::new(catalog),
            translation: Arc::new(translation),
            names,
            index,
            plans,
            by_cluster,
            cf: Vec::new(),
            ecis: BTreeMap::new(),
            eci_terms: Vec::new(),
            history: CfHistory::default(),
            positions: None,
            vib_correction: None,
            vib_temperature: 0.0,
            status: ReadyState::Ready,
        };
        updater.cf = updater.full_recompute();
        updater.set_ecis(model.ecis.clone())?;

        info!(
            "CE updater initialized. Initial energy: {:.6}",
            updater.energy()?
        );
        Ok(updater)
    }

    /// Replaces the pending-change capacity. Any pending changes are dropped
    /// without being reverted.
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history = CfHistory::with_capacity(capacity);
        self
    }

    fn plan_term(
        name: &str,
        catalog: &ClusterCatalog,
        basis: &BasisFunctions,
    ) -> Result<TermPlan, EngineError> {
        let (cluster, decoration) = match CorrelationTerm::parse(name)? {
            CorrelationTerm::Constant => return Ok(TermPlan::Constant),
            CorrelationTerm::Cluster {
                cluster,
                decoration,
            } => (cluster, decoration),
        };

        let arity = catalog.arity_of(&cluster).ok_or_else(|| {
            EngineError::Configuration(format!(
                "Correlation function '{name}' refers to unknown cluster '{cluster}'"
            ))
        })?;
        let decoration = expand_decoration(name, &decoration, arity)?;
        if let Some(&bf) = decoration.iter().find(|&&bf| bf >= basis.len()) {
            return Err(EngineError::Configuration(format!(
                "Correlation function '{name}' uses basis function {bf}, only {} are defined",
                basis.len()
            )));
        }

        let occurrences = catalog.occurrences(&cluster);
        if occurrences == 0 {
            return Err(EngineError::Configuration(format!(
                "Cluster '{cluster}' has no occurrences on this lattice"
            )));
        }

        let decorations: Vec<Vec<usize>> = catalog
            .permutations(arity)
            .iter()
            .map(|perm| perm.iter().map(|&p| decoration[p]).collect())
            .collect();
        let weight = 1.0 / (occurrences as f64 * decorations.len() as f64);
        debug!(
            "Planned '{}': cluster '{}', {} occurrences, {} decoration permutations",
            name,
            cluster,
            occurrences,
            decorations.len()
        );

        Ok(TermPlan::Cluster {
            cluster,
            decorations,
            weight,
        })
    }

    /// Replaces the ECIs. Every key must name a tracked correlation function;
    /// otherwise the updater is marked [`ReadyState::InitFailed`] until a valid
    /// set is given.
    pub fn set_ecis(&mut self, ecis: BTreeMap<String, f64>) -> Result<(), EngineError> {
        let missing: Vec<&str> = ecis
            .keys()
            .filter(|name| !self.index.contains_key(*name))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            self.status = ReadyState::InitFailed;
            return Err(EngineError::Configuration(format!(
                "ECIs without a matching correlation function: {missing:?}"
            )));
        }

        self.eci_terms = ecis
            .iter()
            .map(|(name, &eci)| (self.index[name], eci))
            .collect();
        self.ecis = ecis;
        self.status = ReadyState::Ready;
        Ok(())
    }

    pub fn status(&self) -> ReadyState {
        self.status
    }

    pub fn is_ready(&self) -> bool {
        self.status == ReadyState::Ready
    }

    fn ensure_ready(&self) -> Result<(), EngineError> {
        match self.status {
            ReadyState::Ready => Ok(()),
            ReadyState::InitFailed => Err(EngineError::NotInitialized),
        }
    }

    /// `sum_i eci_i * cf_i`, plus the vibrational correction when one is set.
    pub fn energy(&self) -> Result<f64, EngineError> {
        self.ensure_ready()?;
        let ce: f64 = self
            .eci_terms
            .iter()
            .map(|&(idx, eci)| eci * self.cf[idx])
            .sum();
        Ok(ce + self.vib_energy(self.vib_temperature))
    }

    /// Applies one or two changes and returns the new energy. The changes stay
    /// pending until [`clear_history`](Self::clear_history) or
    /// [`undo_changes`](Self::undo_changes).
    pub fn calculate(&mut self, changes: &[SymbolChange]) -> Result<f64, EngineError> {
        self.ensure_ready()?;
        validate_move(changes, self.symbols.len())?;
        let new_ids = changes
            .iter()
            .map(|change| self.check_change(change))
            .collect::<Result<Vec<_>, _>>()?;
        if self.history.remaining() < changes.len() {
            return Err(EngineError::Logic(format!(
                "Cannot propose {} change(s) with {} already pending (capacity {})",
                changes.len(),
                self.history.len(),
                self.history.capacity()
            )));
        }

        for (change, new_id) in changes.iter().zip(new_ids) {
            self.apply_change(change, new_id)?;
        }
        let energy = self.energy()?;
        trace!("Proposed {:?}: energy {:.6}", changes, energy);
        Ok(energy)
    }

    /// Applies a single change. Used on its own to prepare a configuration
    /// before committing it with [`clear_history`](Self::clear_history).
    pub fn update_cf(&mut self, change: &SymbolChange) -> Result<(), EngineError> {
        self.ensure_ready()?;
        validate_move(std::slice::from_ref(change), self.symbols.len())?;
        let new_id = self.check_change(change)?;
        self.apply_change(change, new_id)
    }

    fn check_change(&self, change: &SymbolChange) -> Result<u32, EngineError> {
        let current = self.symbols.symbol(change.index);
        if current != change.old_symbol {
            return Err(EngineError::InvalidArgument(format!(
                "Site {} holds '{}', but the change expects '{}'",
                change.index, current, change.old_symbol
            )));
        }
        self.symbols.id_of(&change.new_symbol).ok_or_else(|| {
            EngineError::InvalidArgument(format!(
                "Species '{}' has no basis function values",
                change.new_symbol
            ))
        })
    }

    fn apply_change(&mut self, change: &SymbolChange, new_id: u32) -> Result<(), EngineError> {
        self.history.push(change.clone(), self.cf.clone())?;
        for (term, delta) in self.correlation_deltas(change.index, new_id) {
            self.cf[term] += delta;
        }
        self.symbols.set_symbol(change.index, &change.new_symbol)?;
        if let Some(positions) = &mut self.positions {
            positions.apply(change);
        }
        Ok(())
    }

    /// Change of every cluster correlation function if `site` took species
    /// `new_id`, evaluated against the current configuration.
    fn correlation_deltas(&self, site: usize, new_id: u32) -> Vec<(usize, f64)> {
        let mut deltas = Vec::new();
        let mut touched = Vec::new();
        for (cluster, terms) in &self.by_cluster {
            self.occurrences_touching(site, cluster, &mut touched);
            if touched.is_empty() {
                continue;
            }
            for &term in terms {
                let TermPlan::Cluster {
                    decorations,
                    weight,
                    ..
                } = &self.plans[term]
                else {
                    continue;
                };
                let mut delta = 0.0;
                for &(anchor, tuple_idx) in &touched {
                    let group = self.catalog.site_group(anchor);
                    let Some(geometry) = self.catalog.get(group, cluster) else {
                        continue;
                    };
                    let tuple = &geometry.members()[tuple_idx];
                    let before = self.occurrence_value(anchor, tuple, decorations, None);
                    let after =
                        self.occurrence_value(anchor, tuple, decorations, Some((site, new_id)));
                    delta += after - before;
                }
                deltas.push((term, delta * weight));
            }
        }
        deltas
    }

    /// Collects every `(anchor, tuple)` occurrence of `cluster` containing
    /// `site`, without duplicates.
    fn occurrences_touching(&self, site: usize, cluster: &str, out: &mut Vec<(usize, usize)>) {
        out.clear();
        if let Some(geometry) = self.catalog.get(self.catalog.site_group(site), cluster) {
            out.extend((0..geometry.members().len()).map(|t| (site, t)));
        }
        for &(anchor, offset) in self.translation.anchors_reaching(site) {
            if let Some(geometry) = self.catalog.get(self.catalog.site_group(anchor), cluster) {
                out.extend(
                    geometry
                        .tuples_with_offset(offset)
                        .iter()
                        .map(|&t| (anchor, t)),
                );
            }
        }
        out.sort_unstable();
        out.dedup();
    }

    #[inline]
    fn occurrence_value(
        &self,
        anchor: usize,
        tuple: &[usize],
        decorations: &[Vec<usize>],
        substitution: Option<(usize, u32)>,
    ) -> f64 {
        let species = |site: usize| match substitution {
            Some((changed, id)) if changed == site => id,
            _ => self.symbols.id(site),
        };
        decorations
            .iter()
            .map(|dec| {
                tuple
                    .iter()
                    .zip(&dec[1..])
                    .fold(self.basis.get(dec[0], species(anchor)), |acc, (&offset, &bf)| {
                        acc * self.basis.get(bf, species(self.translation.get(anchor, offset)))
                    })
            })
            .sum()
    }

    fn evaluate_term(&self, plan: &TermPlan) -> f64 {
        match plan {
            TermPlan::Constant => 1.0,
            TermPlan::Cluster {
                cluster,
                decorations,
                weight,
            } => {
                let mut sum = 0.0;
                for anchor in 0..self.symbols.len() {
                    let group = self.catalog.site_group(anchor);
                    if let Some(geometry) = self.catalog.get(group, cluster) {
                        for tuple in geometry.members() {
                            sum += self.occurrence_value(anchor, tuple, decorations, None);
                        }
                    }
                }
                sum * weight
            }
        }
    }

    /// Evaluates every correlation function from scratch over the whole
    /// lattice. Does not touch the incrementally maintained values.
    pub fn full_recompute(&self) -> Vec<f64> {
        #[cfg(not(feature = "parallel"))]
        let values = self.plans.iter().map(|p| self.evaluate_term(p)).collect();

        #[cfg(feature = "parallel")]
        let values = self.plans.par_iter().map(|p| self.evaluate_term(p)).collect();

        values
    }

    /// Compares the incremental values with a full recomputation.
    pub fn verify_consistency(&self, tolerance: f64) -> Result<(), EngineError> {
        let fresh = self.full_recompute();
        for ((name, &incremental), exact) in self.names.iter().zip(&self.cf).zip(fresh) {
            if (incremental - exact).abs() > tolerance {
                return Err(EngineError::Consistency(format!(
                    "Correlation function '{name}' drifted: incremental {incremental}, recomputed {exact}"
                )));
            }
        }
        Ok(())
    }

    /// Reverts every pending change, newest first.
    pub fn undo_changes(&mut self) -> Result<(), EngineError> {
        if self.history.is_empty() {
            return Err(EngineError::Logic(
                "undo_changes called with no pending changes".to_string(),
            ));
        }
        while let Some(record) = self.history.pop() {
            let reverse = record.change.reversed();
            self.symbols.set_symbol(reverse.index, &reverse.new_symbol)?;
            if let Some(positions) = &mut self.positions {
                positions.apply(&reverse);
            }
            self.cf = record.previous_cf;
        }
        Ok(())
    }

    /// Commits the pending changes.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn history(&self) -> &CfHistory {
        &self.history
    }

    /// Replaces the whole configuration and recomputes from scratch.
    pub fn set_symbols<S: AsRef<str>>(&mut self, symbols: &[S]) -> Result<(), EngineError> {
        if symbols.len() != self.symbols.len() {
            return Err(EngineError::InvalidArgument(format!(
                "Expected {} symbols, got {}",
                self.symbols.len(),
                symbols.len()
            )));
        }
        self.symbols = SymbolTable::new(symbols, self.basis.species())?;
        self.history.clear();
        self.cf = self.full_recompute();
        if self.positions.is_some() {
            self.positions = Some(AtomPositionTracker::from_symbols(&self.symbols));
        }
        Ok(())
    }

    /// Correlation functions that carry an ECI.
    pub fn correlation_functions(&self) -> BTreeMap<String, f64> {
        self.ecis
            .keys()
            .map(|name| (name.clone(), self.cf[self.index[name]]))
            .collect()
    }

    pub fn all_correlation_functions(&self) -> BTreeMap<String, f64> {
        self.names
            .iter()
            .cloned()
            .zip(self.cf.iter().copied())
            .collect()
    }

    pub fn correlation(&self, name: &str) -> Option<f64> {
        self.index.get(name).map(|&idx| self.cf[idx])
    }

    /// Values of the single-site correlation functions (`c1_*`).
    pub fn singlets(&self) -> BTreeMap<String, f64> {
        self.names
            .iter()
            .zip(&self.cf)
            .filter(|(name, _)| name.starts_with("c1_"))
            .map(|(name, &value)| (name.clone(), value))
            .collect()
    }

    pub fn ecis(&self) -> &BTreeMap<String, f64> {
        &self.ecis
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn catalog(&self) -> &Arc<ClusterCatalog> {
        &self.catalog
    }

    pub fn translation(&self) -> &Arc<TranslationMatrix> {
        &self.translation
    }

    pub fn num_sites(&self) -> usize {
        self.symbols.len()
    }

    /// Starts keeping a species -> sites index in sync with every change.
    pub fn enable_position_tracking(&mut self) {
        self.positions = Some(AtomPositionTracker::from_symbols(&self.symbols));
    }

    pub fn positions(&self, species: &str) -> Option<&[usize]> {
        self.positions.as_ref().map(|p| p.positions(species))
    }

    /// Adds `k_B T * sum eci_per_kbt * cf` to [`energy`](Self::energy),
    /// evaluated at `temperature`.
    pub fn add_linear_vib_correction(
        &mut self,
        eci_per_kbt: BTreeMap<String, f64>,
        temperature: f64,
    ) -> Result<(), EngineError> {
        let correction = LinearVibCorrection::new(eci_per_kbt);
        if let Some(name) = correction.names().find(|n| !self.index.contains_key(*n)) {
            return Err(EngineError::Configuration(format!(
                "Vibrational ECI '{name}' has no matching correlation function"
            )));
        }
        self.vib_correction = Some(correction);
        self.vib_temperature = temperature;
        Ok(())
    }

    pub fn set_vib_temperature(&mut self, temperature: f64) {
        self.vib_temperature = temperature;
    }

    /// Vibrational energy at `temperature`; zero without a correction.
    pub fn vib_energy(&self, temperature: f64) -> f64 {
        self.vib_correction
            .as_ref()
            .map_or(0.0, |vib| vib.energy(temperature, |name| self.correlation(name)))
    }
}
