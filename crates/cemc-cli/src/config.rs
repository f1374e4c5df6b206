use crate::cli::RunArgs;
use crate::error::{CliError, Result};
use cemc::engine::config as core_config;
use cemc::engine::tracker::TrackerConfig;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

const DEFAULT_TEMPERATURE: f64 = 600.0;
const DEFAULT_SWEEPS: usize = 1000;

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialSamplingConfig {
    temperature: Option<f64>,
    sweeps: Option<usize>,
    #[serde(rename = "equilibration-sweeps")]
    equilibration_sweeps: Option<usize>,
    #[serde(rename = "sample-interval")]
    sample_interval: Option<usize>,
    seed: Option<u64>,
    #[serde(rename = "consistency-check-interval")]
    consistency_check_interval: Option<usize>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialClusterConstraint {
    #[serde(rename = "cluster-names", default)]
    cluster_names: Vec<String>,
    #[serde(default)]
    elements: Vec<String>,
    #[serde(rename = "forbid-new-clusters")]
    forbid_new_clusters: Option<bool>,
    #[serde(rename = "check-invariants")]
    check_invariants: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialRunConfig {
    sampling: Option<PartialSamplingConfig>,
    #[serde(rename = "cluster-constraint")]
    cluster_constraint: Option<PartialClusterConstraint>,
    /// Singlet name to chemical potential in eV.
    #[serde(rename = "chemical-potentials", default)]
    chemical_potentials: BTreeMap<String, f64>,
}

impl PartialRunConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading run configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Command-line values win over the file, which wins over the defaults.
    pub fn merge_with_cli(mut self, args: &RunArgs) -> Result<core_config::MonteCarloConfig> {
        self.apply_set_values(&args.set_values)?;

        let sampling = self.sampling.take().unwrap_or_default();
        let mut builder = core_config::MonteCarloConfigBuilder::new()
            .temperature(
                args.temperature
                    .or(sampling.temperature)
                    .unwrap_or(DEFAULT_TEMPERATURE),
            )
            .sweeps(args.sweeps.or(sampling.sweeps).unwrap_or(DEFAULT_SWEEPS))
            .equilibration_sweeps(
                args.equilibration_sweeps
                    .or(sampling.equilibration_sweeps)
                    .unwrap_or(0),
            )
            .sample_interval(args.sample_interval.or(sampling.sample_interval).unwrap_or(1));

        if let Some(seed) = args.seed.or(sampling.seed) {
            builder = builder.seed(seed);
        }
        if let Some(interval) = args
            .consistency_check_interval
            .or(sampling.consistency_check_interval)
        {
            builder = builder.consistency_check_interval(interval);
        }
        if let Some(constraint) = Self::merge_constraint(self.cluster_constraint.take(), args)? {
            builder = builder.constraint(constraint);
        }
        for entry in &args.chemical_potentials {
            let Some((singlet, value)) = entry.split_once('=') else {
                return Err(CliError::Config(format!(
                    "Invalid --mu format: '{}'. Expected SINGLET=EV.",
                    entry
                )));
            };
            self.chemical_potentials
                .insert(singlet.trim().to_string(), parse_value("--mu", value, "float")?);
        }
        for (singlet, mu) in self.chemical_potentials {
            builder = builder.chemical_potential(singlet, mu);
        }

        builder.build().map_err(|e| CliError::Config(e.to_string()))
    }

    fn merge_constraint(
        partial: Option<PartialClusterConstraint>,
        args: &RunArgs,
    ) -> Result<Option<core_config::ClusterConstraint>> {
        let partial = partial.unwrap_or_default();
        let cluster_names = if args.cluster_names.is_empty() {
            partial.cluster_names
        } else {
            args.cluster_names.clone()
        };
        let elements = if args.elements.is_empty() {
            partial.elements
        } else {
            args.elements.clone()
        };
        let forbid_new_clusters =
            args.forbid_new_clusters || partial.forbid_new_clusters.unwrap_or(false);

        match (cluster_names.is_empty(), elements.is_empty()) {
            (true, true) if forbid_new_clusters => Err(CliError::Config(
                "`forbid-new-clusters` needs `cluster-names` and `elements`.".to_string(),
            )),
            (true, true) => Ok(None),
            (true, false) => Err(CliError::Config(
                "`cluster-constraint` requires at least one entry in `cluster-names`.".to_string(),
            )),
            (false, true) => Err(CliError::Config(
                "`cluster-constraint` requires at least one entry in `elements`.".to_string(),
            )),
            (false, false) => {
                let mut tracker = TrackerConfig::new(cluster_names, elements);
                if let Some(check) = partial.check_invariants {
                    tracker = tracker.with_invariant_checks(check);
                }
                Ok(Some(core_config::ClusterConstraint {
                    tracker,
                    forbid_new_clusters,
                }))
            }
        }
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let Some((key, value_str)) = kv_pair.split_once('=') else {
                return Err(CliError::Config(format!(
                    "Invalid --set format: '{}'. Expected KEY=VALUE.",
                    kv_pair
                )));
            };

            match key {
                "sampling.temperature" => {
                    self.sampling.get_or_insert_with(Default::default).temperature =
                        Some(parse_value(key, value_str, "float")?);
                }
                "sampling.sweeps" => {
                    self.sampling.get_or_insert_with(Default::default).sweeps =
                        Some(parse_value(key, value_str, "integer")?);
                }
                "sampling.equilibration-sweeps" => {
                    self.sampling.get_or_insert_with(Default::default).equilibration_sweeps =
                        Some(parse_value(key, value_str, "integer")?);
                }
                "sampling.sample-interval" => {
                    self.sampling.get_or_insert_with(Default::default).sample_interval =
                        Some(parse_value(key, value_str, "integer")?);
                }
                "sampling.seed" => {
                    self.sampling.get_or_insert_with(Default::default).seed =
                        Some(parse_value(key, value_str, "integer")?);
                }
                "sampling.consistency-check-interval" => {
                    self.sampling
                        .get_or_insert_with(Default::default)
                        .consistency_check_interval = Some(parse_value(key, value_str, "integer")?);
                }
                "cluster-constraint.forbid-new-clusters" => {
                    self.cluster_constraint
                        .get_or_insert_with(Default::default)
                        .forbid_new_clusters = Some(parse_value(key, value_str, "boolean")?);
                }
                "cluster-constraint.check-invariants" => {
                    self.cluster_constraint
                        .get_or_insert_with(Default::default)
                        .check_invariants = Some(parse_value(key, value_str, "boolean")?);
                }
                _ if key.starts_with("chemical-potentials.") => {
                    let singlet = &key["chemical-potentials.".len()..];
                    self.chemical_potentials
                        .insert(singlet.to_string(), parse_value(key, value_str, "float")?);
                }
                _ => {
                    return Err(CliError::Config(format!(
                        "Unsupported configuration key for --set: '{}'",
                        key
                    )));
                }
            }
        }
        Ok(())
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str, kind: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| CliError::Config(format!("Invalid {} value for {}: {}", kind, key, value)))
}
