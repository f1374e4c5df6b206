use std::collections::BTreeMap;

/// Boltzmann constant in eV/K.
pub const BOLTZMANN_EV: f64 = 8.617333262e-5;

/// Vibrational free energy that is linear in the correlation functions:
/// `F_vib(T) = k_B T * sum_i eci_per_kbt[i] * cf[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearVibCorrection {
    eci_per_kbt: BTreeMap<String, f64>,
}

impl LinearVibCorrection {
    pub fn new(eci_per_kbt: BTreeMap<String, f64>) -> Self {
        Self { eci_per_kbt }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.eci_per_kbt.keys().map(String::as_str)
    }

    /// `cf` resolves a correlation function name to its current value;
    /// unknown names contribute nothing.
    pub fn energy<F>(&self, temperature: f64, cf: F) -> f64
    where
        F: Fn(&str) -> Option<f64>,
    {
        let sum: f64 = self
            .eci_per_kbt
            .iter()
            .filter_map(|(name, eci)| cf(name).map(|value| eci * value))
            .sum();
        BOLTZMANN_EV * temperature * sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn energy_scales_with_temperature() {
        let vib = LinearVibCorrection::new(BTreeMap::from([
            ("c0".to_string(), 2.0),
            ("c1_0".to_string(), -1.0),
        ]));
        let lookup = |name: &str| match name {
            "c0" => Some(1.0),
            "c1_0" => Some(0.5),
            _ => None,
        };
        let e300 = vib.energy(300.0, lookup);
        assert!((e300 - BOLTZMANN_EV * 300.0 * 1.5).abs() < 1e-15);
        assert!((vib.energy(600.0, lookup) - 2.0 * e300).abs() < 1e-15);
        assert_eq!(vib.energy(0.0, lookup), 0.0);
    }
}
