use super::metropolis::{self, MonteCarloError, MonteCarloResult};
use crate::core::symbols::SymbolTable;
use crate::engine::change::{SymbolChange, swap};
use crate::engine::config::MonteCarloConfig;
use crate::engine::progress::ProgressReporter;
use crate::engine::updater::CeUpdater;
use rand::Rng;
use rand::rngs::StdRng;
use std::collections::BTreeMap;
use tracing::{info, instrument};

/// Metropolis sampling of paired swaps at fixed composition.
///
/// Chemical potentials in `config.ensemble` are not applied: at fixed
/// composition they only shift every energy by the same constant.
#[instrument(
    skip_all,
    name = "canonical_mc_workflow",
    fields(temperature = config.sampling.temperature, sweeps = config.sampling.sweeps)
)]
pub fn run(
    updater: &mut CeUpdater,
    config: &MonteCarloConfig,
    reporter: &ProgressReporter,
) -> Result<MonteCarloResult, MonteCarloError> {
    let sampling = &config.sampling;
    info!(
        "Starting canonical Monte Carlo at {:.1} K: {} equilibration + {} sampling sweeps.",
        sampling.temperature, sampling.equilibration_sweeps, sampling.sweeps
    );

    let symbols = updater.symbols();
    let present = symbols
        .unique_species()
        .iter()
        .filter(|s| symbols.count(s) > 0)
        .count();
    if present < 2 {
        return Err(MonteCarloError::SingleSpecies(symbols.symbol(0).to_string()));
    }

    metropolis::sample(updater, config, &BTreeMap::new(), reporter, propose_swap)
}

fn propose_swap(symbols: &SymbolTable, rng: &mut StdRng) -> Option<Vec<SymbolChange>> {
    let n = symbols.len();
    let a = rng.gen_range(0..n);
    let b = rng.gen_range(0..n);
    let (sa, sb) = (symbols.symbol(a), symbols.symbol(b));
    if sa == sb {
        return None;
    }
    Some(swap(a, sa, b, sb).to_vec())
}
