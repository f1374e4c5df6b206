use crate::core::symbols::SymbolTable;
use crate::engine::change::SymbolChange;
use crate::engine::config::MonteCarloConfig;
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::tracker::ClusterTracker;
use crate::engine::tracker::statistics::ClusterStatistics;
use crate::engine::updater::CeUpdater;
use crate::engine::vibration::BOLTZMANN_EV;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{info, trace};

const CONSISTENCY_TOLERANCE: f64 = 1e-8;

#[derive(Debug, Error)]
pub enum MonteCarloError {
    #[error("Engine error: {source}")]
    Engine {
        #[from]
        source: EngineError,
    },
    #[error("No move is possible: every site holds '{0}'")]
    SingleSpecies(String),
    #[error(
        "Chemical potential '{name}' does not name a singlet correlation function. Available singlets: {available:?}"
    )]
    UnknownChemicalPotential { name: String, available: Vec<String> },
    #[error("The semi-grand-canonical ensemble needs at least one chemical potential")]
    MissingChemicalPotentials,
}

/// One recorded sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub sweep: usize,
    pub energy: f64,
    pub acceptance_ratio: f64,
    pub number_of_clusters: Option<usize>,
    pub max_cluster_size: Option<usize>,
}

/// Thermal average of one singlet correlation function.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SingletAverage {
    pub mean: f64,
    /// `<s^2> - <s>^2` over the recorded samples.
    pub variance: f64,
    /// Zero for singlets without a chemical potential.
    pub chemical_potential: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonteCarloResult {
    pub temperature: f64,
    /// Energy of the final configuration under the model's own ECIs.
    pub final_energy: f64,
    pub mean_energy: f64,
    pub mean_energy_sq: f64,
    /// `(<E^2> - <E>^2) / (k_B T^2)`, in eV/K.
    pub heat_capacity: f64,
    pub acceptance_ratio: f64,
    pub rejected_by_constraint: u64,
    pub mean_correlation_functions: BTreeMap<String, f64>,
    pub singlets: BTreeMap<String, SingletAverage>,
    pub cluster_statistics: Option<ClusterStatistics>,
    pub samples: Vec<Sample>,
}

/// Draws a trial move from the current configuration. `None` means the draw
/// was a no-op and is not counted as an attempt.
pub(crate) type ProposeFn = fn(&SymbolTable, &mut StdRng) -> Option<Vec<SymbolChange>>;

#[derive(Default)]
struct Counters {
    attempted: u64,
    accepted: u64,
    rejected_by_constraint: u64,
}

impl Counters {
    fn acceptance_ratio(&self) -> f64 {
        if self.attempted == 0 {
            0.0
        } else {
            self.accepted as f64 / self.attempted as f64
        }
    }
}

#[derive(Default)]
struct Accumulator {
    energy_sum: f64,
    energy_sq_sum: f64,
    cf_sums: BTreeMap<String, f64>,
    cf_sq_sums: BTreeMap<String, f64>,
    count: usize,
}

impl Accumulator {
    fn record(&mut self, energy: f64, cf: BTreeMap<String, f64>) {
        self.energy_sum += energy;
        self.energy_sq_sum += energy * energy;
        for (name, value) in cf {
            *self.cf_sq_sums.entry(name.clone()).or_insert(0.0) += value * value;
            *self.cf_sums.entry(name).or_insert(0.0) += value;
        }
        self.count += 1;
    }

    fn mean(&self, sum: f64) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            sum / self.count as f64
        }
    }

    fn cf_mean(&self, name: &str) -> f64 {
        self.mean(self.cf_sums.get(name).copied().unwrap_or(0.0))
    }

    fn cf_variance(&self, name: &str) -> f64 {
        let mean = self.cf_mean(name);
        let mean_sq = self.mean(self.cf_sq_sums.get(name).copied().unwrap_or(0.0));
        (mean_sq - mean * mean).max(0.0)
    }
}

/// Markov chain state shared by every ensemble.
struct Chain {
    tracker: Option<ClusterTracker>,
    forbid_new_clusters: bool,
    beta: f64,
    rng: StdRng,
    /// Energy the acceptance test sees. Includes the chemical potential terms
    /// when they were folded into the ECIs.
    energy: f64,
    counters: Counters,
}

impl Chain {
    fn attempt(
        &mut self,
        updater: &mut CeUpdater,
        changes: &[SymbolChange],
    ) -> Result<(), EngineError> {
        self.counters.attempted += 1;
        let new_energy = updater.calculate(changes)?;
        let delta = new_energy - self.energy;
        let mut accept = delta <= 0.0 || self.rng.r#gen::<f64>() < (-self.beta * delta).exp();

        if accept && self.forbid_new_clusters {
            if let Some(tracker) = self.tracker.as_mut() {
                if tracker.move_creates_new_cluster(changes)? {
                    accept = false;
                    self.counters.rejected_by_constraint += 1;
                }
            }
        }

        if accept {
            updater.clear_history();
            if let Some(tracker) = self.tracker.as_mut() {
                tracker.update_clusters(changes)?;
            }
            self.energy = new_energy;
            self.counters.accepted += 1;
        } else {
            updater.undo_changes()?;
        }
        trace!("Move {:?}: dE = {:.6}, accepted = {}", changes, delta, accept);
        Ok(())
    }
}

/// `energy + sum_i mu_i * cf_i`: removes folded chemical potential terms again.
fn internal_energy(
    updater: &CeUpdater,
    energy: f64,
    chemical_potentials: &BTreeMap<String, f64>,
) -> f64 {
    energy
        + chemical_potentials
            .iter()
            .map(|(name, mu)| mu * updater.correlation(name).unwrap_or(0.0))
            .sum::<f64>()
}

/// Runs equilibration and sampling sweeps with moves drawn by `propose`.
///
/// Every accepted move is committed to the updater and, when a connectivity
/// constraint is configured, to the cluster tracker. Rejected moves are undone
/// and never reach the tracker. The updater ends in the last accepted
/// configuration with an empty history.
///
/// `chemical_potentials` must already be folded into the updater's ECIs; the
/// recorded energies have them removed again.
pub(crate) fn sample(
    updater: &mut CeUpdater,
    config: &MonteCarloConfig,
    chemical_potentials: &BTreeMap<String, f64>,
    reporter: &ProgressReporter,
    propose: ProposeFn,
) -> Result<MonteCarloResult, MonteCarloError> {
    let sampling = &config.sampling;
    reporter.report(Progress::PhaseStart {
        name: "Preparation",
    });
    let tracker = config
        .constraint
        .as_ref()
        .map(|c| ClusterTracker::new(updater, &c.tracker))
        .transpose()?;
    let mut chain = Chain {
        tracker,
        forbid_new_clusters: config
            .constraint
            .as_ref()
            .is_some_and(|c| c.forbid_new_clusters),
        beta: 1.0 / (BOLTZMANN_EV * sampling.temperature),
        rng: match sampling.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        },
        energy: updater.energy()?,
        counters: Counters::default(),
    };
    let mut accumulator = Accumulator::default();
    let mut samples = Vec::new();
    reporter.report(Progress::PhaseFinish);

    let total_sweeps = sampling.equilibration_sweeps + sampling.sweeps;
    reporter.report(Progress::PhaseStart { name: "Sampling" });
    reporter.report(Progress::TaskStart {
        total_steps: total_sweeps as u64,
    });
    for sweep in 0..total_sweeps {
        for _ in 0..updater.num_sites() {
            if let Some(changes) = propose(updater.symbols(), &mut chain.rng) {
                chain.attempt(updater, &changes)?;
            }
        }

        if let Some(interval) = config.consistency_check_interval {
            if (sweep + 1) % interval == 0 {
                updater.verify_consistency(CONSISTENCY_TOLERANCE)?;
            }
        }

        let sampling_sweep = sweep + 1;
        let energy = internal_energy(updater, chain.energy, chemical_potentials);
        if sampling_sweep > sampling.equilibration_sweeps
            && (sampling_sweep - sampling.equilibration_sweeps) % sampling.sample_interval == 0
        {
            accumulator.record(energy, updater.all_correlation_functions());
            let stats = chain.tracker.as_ref().map(|t| t.statistics()).transpose()?;
            samples.push(Sample {
                sweep: sampling_sweep,
                energy,
                acceptance_ratio: chain.counters.acceptance_ratio(),
                number_of_clusters: stats.as_ref().map(|s| s.number_of_clusters),
                max_cluster_size: stats.as_ref().map(|s| s.max_size),
            });
            reporter.report(Progress::StatusUpdate {
                text: format!(
                    "E = {energy:.4} eV, {}/{} accepted",
                    chain.counters.accepted, chain.counters.attempted
                ),
            });
        }

        if sampling_sweep == sampling.equilibration_sweeps && sampling.equilibration_sweeps > 0 {
            reporter.report(Progress::StatusUpdate {
                text: format!("Equilibrated, E = {energy:.6} eV"),
            });
        }
        reporter.report(Progress::TaskIncrement { amount: 1 });
    }
    reporter.report(Progress::TaskFinish);
    reporter.report(Progress::PhaseFinish);

    let mean_energy = accumulator.mean(accumulator.energy_sum);
    let mean_energy_sq = accumulator.mean(accumulator.energy_sq_sum);
    let variance = (mean_energy_sq - mean_energy * mean_energy).max(0.0);
    let mean_correlation_functions = accumulator
        .cf_sums
        .keys()
        .map(|name| (name.clone(), accumulator.cf_mean(name)))
        .collect();
    let singlets = updater
        .singlets()
        .into_keys()
        .map(|name| {
            let average = SingletAverage {
                mean: accumulator.cf_mean(&name),
                variance: accumulator.cf_variance(&name),
                chemical_potential: chemical_potentials.get(&name).copied().unwrap_or(0.0),
            };
            (name, average)
        })
        .collect();
    let cluster_statistics = chain.tracker.as_ref().map(|t| t.statistics()).transpose()?;

    let result = MonteCarloResult {
        temperature: sampling.temperature,
        final_energy: internal_energy(updater, chain.energy, chemical_potentials),
        mean_energy,
        mean_energy_sq,
        heat_capacity: variance / (BOLTZMANN_EV * sampling.temperature.powi(2)),
        acceptance_ratio: chain.counters.acceptance_ratio(),
        rejected_by_constraint: chain.counters.rejected_by_constraint,
        mean_correlation_functions,
        singlets,
        cluster_statistics,
        samples,
    };
    info!(
        "Workflow complete. <E> = {:.6} eV, acceptance {:.3}, {} samples.",
        result.mean_energy,
        result.acceptance_ratio,
        result.samples.len()
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulator_reports_means_and_variances() {
        let mut accumulator = Accumulator::default();
        for value in [1.0, -1.0, 1.0, -1.0] {
            accumulator.record(2.0 * value, BTreeMap::from([("c1_0".to_string(), value)]));
        }
        assert_eq!(accumulator.mean(accumulator.energy_sum), 0.0);
        assert_eq!(accumulator.mean(accumulator.energy_sq_sum), 4.0);
        assert_eq!(accumulator.cf_mean("c1_0"), 0.0);
        assert_eq!(accumulator.cf_variance("c1_0"), 1.0);
        assert_eq!(accumulator.cf_variance("c1_1"), 0.0);
    }

    #[test]
    fn empty_accumulator_yields_zeros() {
        let accumulator = Accumulator::default();
        assert_eq!(accumulator.mean(accumulator.energy_sum), 0.0);
        assert_eq!(accumulator.cf_mean("c0"), 0.0);
    }

    #[test]
    fn acceptance_ratio_without_attempts_is_zero() {
        assert_eq!(Counters::default().acceptance_ratio(), 0.0);
    }
}
