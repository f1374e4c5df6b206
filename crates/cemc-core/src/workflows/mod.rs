//! # Workflows Module
//!
//! High-level procedures that drive the engine through complete simulations.
//!
//! - **Canonical Monte Carlo** ([`canonical`]) - Metropolis sampling of paired
//!   swaps at fixed composition.
//! - **Semi-grand-canonical Monte Carlo** ([`sgc`]) - single-site flips at
//!   fixed chemical potentials, reporting thermal averages of the singlets.
//!
//! Both share the sweep loop in [`metropolis`]: optional solute connectivity
//! constraint, periodic consistency checks of the incremental correlation
//! functions, and sample collection.

pub mod canonical;
pub mod metropolis;
pub mod sgc;

pub use metropolis::{MonteCarloError, MonteCarloResult, Sample, SingletAverage};

use crate::engine::config::{Ensemble, MonteCarloConfig};
use crate::engine::progress::ProgressReporter;
use crate::engine::updater::CeUpdater;

/// Runs the workflow that samples `config.ensemble`.
pub fn run(
    updater: &mut CeUpdater,
    config: &MonteCarloConfig,
    reporter: &ProgressReporter,
) -> Result<MonteCarloResult, MonteCarloError> {
    match config.ensemble {
        Ensemble::Canonical => canonical::run(updater, config, reporter),
        Ensemble::SemiGrandCanonical { .. } => sgc::run(updater, config, reporter),
    }
}
