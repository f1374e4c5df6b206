use super::tracker::TrackerConfig;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// Solute connectivity constraint applied while sampling.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterConstraint {
    pub tracker: TrackerConfig,
    /// Reject every move that would split the solutes over more than one root.
    pub forbid_new_clusters: bool,
}

/// Which moves are proposed and which thermodynamic variables are held fixed.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Ensemble {
    /// Paired swaps at fixed composition.
    #[default]
    Canonical,
    /// Single-site flips at fixed chemical potentials. Keys are singlet
    /// correlation function names (`c1_*`), values are in eV.
    SemiGrandCanonical {
        chemical_potentials: BTreeMap<String, f64>,
    },
}

impl Ensemble {
    pub fn chemical_potentials(&self) -> Option<&BTreeMap<String, f64>> {
        match self {
            Self::Canonical => None,
            Self::SemiGrandCanonical {
                chemical_potentials,
            } => Some(chemical_potentials),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SamplingConfig {
    /// Kelvin.
    pub temperature: f64,
    /// Sweeps whose samples are kept. One sweep is one attempted move per site.
    pub sweeps: usize,
    pub equilibration_sweeps: usize,
    /// Sweeps between two recorded samples.
    pub sample_interval: usize,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonteCarloConfig {
    pub sampling: SamplingConfig,
    pub ensemble: Ensemble,
    pub constraint: Option<ClusterConstraint>,
    /// Compare the incremental correlation functions with a full
    /// recomputation every this many sweeps.
    pub consistency_check_interval: Option<usize>,
}

#[derive(Default)]
pub struct MonteCarloConfigBuilder {
    temperature: Option<f64>,
    sweeps: Option<usize>,
    equilibration_sweeps: Option<usize>,
    sample_interval: Option<usize>,
    seed: Option<u64>,
    chemical_potentials: BTreeMap<String, f64>,
    constraint: Option<ClusterConstraint>,
    consistency_check_interval: Option<usize>,
}

impl MonteCarloConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn temperature(mut self, kelvin: f64) -> Self {
        self.temperature = Some(kelvin);
        self
    }
    pub fn sweeps(mut self, sweeps: usize) -> Self {
        self.sweeps = Some(sweeps);
        self
    }
    pub fn equilibration_sweeps(mut self, sweeps: usize) -> Self {
        self.equilibration_sweeps = Some(sweeps);
        self
    }
    pub fn sample_interval(mut self, sweeps: usize) -> Self {
        self.sample_interval = Some(sweeps);
        self
    }
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
    /// Switches to the semi-grand-canonical ensemble. Can be repeated, one
    /// call per singlet.
    pub fn chemical_potential(mut self, singlet: impl Into<String>, ev: f64) -> Self {
        self.chemical_potentials.insert(singlet.into(), ev);
        self
    }
    pub fn constraint(mut self, constraint: ClusterConstraint) -> Self {
        self.constraint = Some(constraint);
        self
    }
    pub fn consistency_check_interval(mut self, sweeps: usize) -> Self {
        self.consistency_check_interval = Some(sweeps);
        self
    }

    pub fn build(self) -> Result<MonteCarloConfig, ConfigError> {
        let temperature = self
            .temperature
            .ok_or(ConfigError::MissingParameter("temperature"))?;
        if !(temperature.is_finite() && temperature > 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "temperature",
                reason: format!("must be a positive number of kelvin, got {temperature}"),
            });
        }
        let sweeps = self.sweeps.ok_or(ConfigError::MissingParameter("sweeps"))?;
        if sweeps == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "sweeps",
                reason: "at least one sweep is needed".to_string(),
            });
        }
        let sample_interval = self.sample_interval.unwrap_or(1);
        if sample_interval == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "sample_interval",
                reason: "must be at least one sweep".to_string(),
            });
        }
        if self.consistency_check_interval == Some(0) {
            return Err(ConfigError::InvalidParameter {
                name: "consistency_check_interval",
                reason: "must be at least one sweep".to_string(),
            });
        }

        if let Some((name, mu)) = self
            .chemical_potentials
            .iter()
            .find(|(_, mu)| !mu.is_finite())
        {
            return Err(ConfigError::InvalidParameter {
                name: "chemical_potential",
                reason: format!("'{name}' must be finite, got {mu}"),
            });
        }
        let ensemble = if self.chemical_potentials.is_empty() {
            Ensemble::Canonical
        } else {
            Ensemble::SemiGrandCanonical {
                chemical_potentials: self.chemical_potentials,
            }
        };

        Ok(MonteCarloConfig {
            sampling: SamplingConfig {
                temperature,
                sweeps,
                equilibration_sweeps: self.equilibration_sweeps.unwrap_or(0),
                sample_interval,
                seed: self.seed,
            },
            ensemble,
            constraint: self.constraint,
            consistency_check_interval: self.consistency_check_interval,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_applies_defaults() {
        let config = MonteCarloConfigBuilder::new()
            .temperature(600.0)
            .sweeps(10)
            .build()
            .unwrap();
        assert_eq!(config.sampling.sample_interval, 1);
        assert_eq!(config.sampling.equilibration_sweeps, 0);
        assert_eq!(config.sampling.seed, None);
        assert!(config.constraint.is_none());
        assert_eq!(config.ensemble, Ensemble::Canonical);
    }

    #[test]
    fn chemical_potentials_select_the_semi_grand_canonical_ensemble() {
        let config = MonteCarloConfigBuilder::new()
            .temperature(600.0)
            .sweeps(10)
            .chemical_potential("c1_0", -0.1)
            .chemical_potential("c1_1", 0.05)
            .build()
            .unwrap();
        let mus = config.ensemble.chemical_potentials().unwrap();
        assert_eq!(mus.len(), 2);
        assert_eq!(mus["c1_0"], -0.1);

        let err = MonteCarloConfigBuilder::new()
            .temperature(600.0)
            .sweeps(10)
            .chemical_potential("c1_0", f64::NAN)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidParameter { name: "chemical_potential", .. }
        ));
    }

    #[test]
    fn build_reports_missing_parameters() {
        let err = MonteCarloConfigBuilder::new().sweeps(10).build().unwrap_err();
        assert_eq!(err, ConfigError::MissingParameter("temperature"));
        let err = MonteCarloConfigBuilder::new()
            .temperature(300.0)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingParameter("sweeps"));
    }

    #[test]
    fn build_rejects_invalid_values() {
        let base = || MonteCarloConfigBuilder::new().temperature(300.0).sweeps(5);
        assert!(matches!(
            MonteCarloConfigBuilder::new().temperature(-1.0).sweeps(5).build(),
            Err(ConfigError::InvalidParameter { name: "temperature", .. })
        ));
        assert!(matches!(
            base().sample_interval(0).build(),
            Err(ConfigError::InvalidParameter { name: "sample_interval", .. })
        ));
        assert!(matches!(
            base().consistency_check_interval(0).build(),
            Err(ConfigError::InvalidParameter { .. })
        ));
        assert!(matches!(
            MonteCarloConfigBuilder::new().temperature(300.0).sweeps(0).build(),
            Err(ConfigError::InvalidParameter { name: "sweeps", .. })
        ));
    }
}
