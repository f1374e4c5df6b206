use super::metropolis::{self, MonteCarloError, MonteCarloResult};
use crate::core::symbols::SymbolTable;
use crate::engine::change::SymbolChange;
use crate::engine::config::MonteCarloConfig;
use crate::engine::progress::ProgressReporter;
use crate::engine::updater::CeUpdater;
use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

/// Metropolis sampling of single-site flips at fixed chemical potentials.
///
/// The chemical potentials are subtracted from the matching singlet ECIs for
/// the duration of the run, so the acceptance test sees `E - sum_i mu_i * s_i`.
/// The original ECIs are restored before returning, also when sampling fails.
/// Energies in the result are evaluated with the original ECIs.
#[instrument(
    skip_all,
    name = "sgc_mc_workflow",
    fields(temperature = config.sampling.temperature, sweeps = config.sampling.sweeps)
)]
pub fn run(
    updater: &mut CeUpdater,
    config: &MonteCarloConfig,
    reporter: &ProgressReporter,
) -> Result<MonteCarloResult, MonteCarloError> {
    let chemical_potentials = config
        .ensemble
        .chemical_potentials()
        .filter(|mus| !mus.is_empty())
        .ok_or(MonteCarloError::MissingChemicalPotentials)?;
    let sampling = &config.sampling;
    info!(
        "Starting semi-grand-canonical Monte Carlo at {:.1} K with mu = {:?}.",
        sampling.temperature, chemical_potentials
    );

    if updater.symbols().unique_species().len() < 2 {
        return Err(MonteCarloError::SingleSpecies(
            updater.symbols().symbol(0).to_string(),
        ));
    }

    let original = updater.ecis().clone();
    let folded = fold_chemical_potentials(updater, chemical_potentials)?;
    updater.set_ecis(folded)?;
    debug!("Chemical potentials folded into the singlet ECIs.");

    let outcome = metropolis::sample(updater, config, chemical_potentials, reporter, propose_flip);
    updater.set_ecis(original)?;
    outcome
}

/// `eci[c1_k] - mu_k` for every chemical potential; singlets without an ECI
/// start from zero.
fn fold_chemical_potentials(
    updater: &CeUpdater,
    chemical_potentials: &BTreeMap<String, f64>,
) -> Result<BTreeMap<String, f64>, MonteCarloError> {
    let singlets = updater.singlets();
    let mut ecis = updater.ecis().clone();
    for (name, mu) in chemical_potentials {
        if !singlets.contains_key(name) {
            return Err(MonteCarloError::UnknownChemicalPotential {
                name: name.clone(),
                available: singlets.keys().cloned().collect(),
            });
        }
        *ecis.entry(name.clone()).or_insert(0.0) -= mu;
    }
    Ok(ecis)
}

fn propose_flip(symbols: &SymbolTable, rng: &mut StdRng) -> Option<Vec<SymbolChange>> {
    let site = rng.gen_range(0..symbols.len());
    let current = symbols.symbol(site);
    let others: Vec<&str> = symbols
        .unique_species()
        .iter()
        .map(String::as_str)
        .filter(|&species| species != current)
        .collect();
    let new_symbol = others.choose(rng)?;
    Some(vec![SymbolChange::new(site, current, *new_symbol)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::ModelDescription;
    use crate::engine::config::{ClusterConstraint, MonteCarloConfigBuilder};
    use crate::engine::tracker::TrackerConfig;
    use rand::SeedableRng;

    fn ring_model(symbols: &[&str], pair_eci: f64) -> ModelDescription {
        let n = symbols.len();
        let mut clusters = BTreeMap::new();
        clusters.insert("c1".to_string(), vec![vec![]]);
        clusters.insert("c2_d0000_0".to_string(), vec![vec![0], vec![1]]);
        ModelDescription {
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            symmetry_groups: vec![0; n],
            translation: (0..n).map(|i| vec![(i + 1) % n, (i + n - 1) % n]).collect(),
            clusters: vec![clusters],
            basis_functions: vec![BTreeMap::from([
                ("A".to_string(), 1.0),
                ("B".to_string(), -1.0),
            ])],
            correlation_functions: vec!["c0".into(), "c1_0".into(), "c2_d0000_0_00".into()],
            ecis: BTreeMap::from([
                ("c0".to_string(), -1.0),
                ("c2_d0000_0_00".to_string(), pair_eci),
            ]),
            permutations: BTreeMap::new(),
        }
    }

    const RING: [&str; 8] = ["A", "A", "A", "B", "B", "B", "B", "B"];

    fn sgc_config(mu: f64) -> MonteCarloConfigBuilder {
        MonteCarloConfigBuilder::new()
            .temperature(300.0)
            .sweeps(30)
            .seed(11)
            .chemical_potential("c1_0", mu)
    }

    #[test]
    fn large_chemical_potential_fills_the_lattice() {
        let mut updater = CeUpdater::new(&ring_model(&RING, 0.0)).unwrap();
        let original = updater.ecis().clone();
        let config = sgc_config(3.0).build().unwrap();
        let result = run(&mut updater, &config, &ProgressReporter::new()).unwrap();

        assert_eq!(updater.symbols().count("A"), 8);
        assert_eq!(updater.ecis(), &original);
        assert!(updater.history().is_empty());
        // Without pair interactions the internal energy is c0 alone.
        assert!((result.final_energy + 1.0).abs() < 1e-12);
        assert!((result.mean_energy + 1.0).abs() < 1e-9);
        assert!(result.heat_capacity < 1e-6);

        let singlet = &result.singlets["c1_0"];
        assert_eq!(singlet.chemical_potential, 3.0);
        assert!(singlet.mean > 0.5);
        assert!((result.samples.last().unwrap().energy + 1.0).abs() < 1e-12);
    }

    #[test]
    fn zero_chemical_potential_without_interactions_accepts_every_flip() {
        let mut updater = CeUpdater::new(&ring_model(&RING, 0.0)).unwrap();
        let config = sgc_config(0.0).build().unwrap();
        let result = run(&mut updater, &config, &ProgressReporter::new()).unwrap();
        assert_eq!(result.acceptance_ratio, 1.0);
        assert_eq!(result.samples.len(), 30);
        assert!(result.singlets["c1_0"].variance > 0.0);
    }

    #[test]
    fn flips_keep_the_incremental_state_consistent() {
        let mut updater = CeUpdater::new(&ring_model(&RING, 0.08)).unwrap();
        let config = sgc_config(-0.05)
            .temperature(1200.0)
            .consistency_check_interval(5)
            .build()
            .unwrap();
        let result = run(&mut updater, &config, &ProgressReporter::new()).unwrap();
        updater.verify_consistency(1e-10).unwrap();
        assert!((result.final_energy - updater.energy().unwrap()).abs() < 1e-12);
        assert!(result.acceptance_ratio > 0.0);
    }

    #[test]
    fn unknown_chemical_potential_leaves_the_updater_untouched() {
        let mut updater = CeUpdater::new(&ring_model(&RING, 0.1)).unwrap();
        let original = updater.ecis().clone();
        let config = MonteCarloConfigBuilder::new()
            .temperature(300.0)
            .sweeps(1)
            .chemical_potential("c2_d0000_0_00", 0.1)
            .build()
            .unwrap();
        let err = run(&mut updater, &config, &ProgressReporter::new()).unwrap_err();
        match err {
            MonteCarloError::UnknownChemicalPotential { name, available } => {
                assert_eq!(name, "c2_d0000_0_00");
                assert_eq!(available, vec!["c1_0"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(updater.ecis(), &original);
        assert!(updater.is_ready());
    }

    #[test]
    fn canonical_configuration_is_rejected() {
        let mut updater = CeUpdater::new(&ring_model(&RING, 0.0)).unwrap();
        let config = MonteCarloConfigBuilder::new()
            .temperature(300.0)
            .sweeps(1)
            .build()
            .unwrap();
        let err = run(&mut updater, &config, &ProgressReporter::new()).unwrap_err();
        assert!(matches!(err, MonteCarloError::MissingChemicalPotentials));
    }

    #[test]
    fn growing_solutes_stay_in_one_cluster_under_the_constraint() {
        let mut updater = CeUpdater::new(&ring_model(&RING, 0.0)).unwrap();
        let constraint = ClusterConstraint {
            tracker: TrackerConfig::new(["c2_d0000_0"], ["A"]).with_invariant_checks(true),
            forbid_new_clusters: true,
        };
        let config = sgc_config(3.0).sweeps(40).constraint(constraint).build().unwrap();
        let result = run(&mut updater, &config, &ProgressReporter::new()).unwrap();

        assert_eq!(updater.symbols().count("A"), 8);
        let stats = result.cluster_statistics.unwrap();
        assert_eq!(stats.number_of_clusters, 1);
        assert_eq!(stats.cluster_sizes, vec![8]);
        assert!(result.samples.iter().all(|s| s.number_of_clusters == Some(1)));
    }

    #[test]
    fn flips_always_change_the_species() {
        let updater = CeUpdater::new(&ring_model(&RING, 0.0)).unwrap();
        let mut rng = StdRng::seed_from_u64(4);
        for _ in 0..50 {
            let changes = propose_flip(updater.symbols(), &mut rng).unwrap();
            assert_eq!(changes.len(), 1);
            let change = &changes[0];
            assert_eq!(change.old_symbol, updater.symbols().symbol(change.index));
            assert_ne!(change.old_symbol, change.new_symbol);
        }
    }
}
