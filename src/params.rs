//! Model parameters for both engines, loadable from a JSON file and validated
//! before any run starts. Defaults reproduce the reference scenario: a
//! 120×120 lattice with a 0.3% initial seeding, and a population of 10,000
//! with ten index cases, each with a 30% transmission reduction applied
//! mid-run.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::EpiError;

/// Parameters for the stochastic lattice engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GridParameters {
    /// Lattice side length; the grid holds `size * size` cells.
    pub size: usize,
    /// Probability that a cell starts out Infected.
    pub initial_infected_fraction: f64,
    /// Probability that a single infected neighbor infects a susceptible
    /// cell in one step.
    pub beta: f64,
    /// Probability that an infected cell recovers in one step.
    pub gamma: f64,
    /// Number of steps to run.
    pub steps: u32,
    /// Completed-step count at which `beta` is rescaled once; `None` disables
    /// the policy.
    pub policy_step: Option<u32>,
    /// Factor applied to `beta` when the policy fires.
    pub policy_beta_factor: f64,
}

impl Default for GridParameters {
    fn default() -> Self {
        Self {
            size: 120,
            initial_infected_fraction: 0.003,
            beta: 0.35,
            gamma: 0.02,
            steps: 300,
            policy_step: Some(100),
            policy_beta_factor: 0.7,
        }
    }
}

/// Parameters for the deterministic compartmental engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SirParameters {
    /// Total population; the population is closed.
    pub population: f64,
    pub initial_infected: f64,
    pub initial_recovered: f64,
    /// Infection rate per day.
    pub beta: f64,
    /// Recovery rate per day.
    pub gamma: f64,
    /// Total simulated duration in days.
    pub days: f64,
    /// Euler sub-step size in days; `days / dt` must be an integer.
    pub dt: f64,
    /// Simulated day from which `policy_beta` applies; `None` disables the
    /// policy scenario.
    pub policy_day: Option<f64>,
    /// Transmission rate in effect from `policy_day` onward.
    pub policy_beta: Option<f64>,
}

impl Default for SirParameters {
    fn default() -> Self {
        Self {
            population: 10_000.0,
            initial_infected: 10.0,
            initial_recovered: 0.0,
            beta: 0.30,
            gamma: 0.08,
            days: 180.0,
            dt: 0.25,
            policy_day: Some(30.0),
            policy_beta: Some(0.30 * 0.70),
        }
    }
}

/// Top-level parameters covering both engines plus the random seed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameters {
    pub seed: u64,
    pub grid: GridParameters,
    pub sir: SirParameters,
}

fn check_probability(name: &str, value: f64) -> Result<(), EpiError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(EpiError::EpiError(format!(
            "{name} must be a probability in [0, 1], got {value}"
        )));
    }
    Ok(())
}

fn check_rate(name: &str, value: f64) -> Result<(), EpiError> {
    if !value.is_finite() || value < 0.0 {
        return Err(EpiError::EpiError(format!(
            "{name} must be a non-negative finite rate, got {value}"
        )));
    }
    Ok(())
}

impl GridParameters {
    /// # Errors
    /// Returns an `EpiError` describing the first invalid field.
    pub fn validate(&self) -> Result<(), EpiError> {
        if self.size == 0 {
            return Err("grid.size must be positive".into());
        }
        check_probability("grid.initial_infected_fraction", self.initial_infected_fraction)?;
        check_probability("grid.beta", self.beta)?;
        check_probability("grid.gamma", self.gamma)?;
        if !self.policy_beta_factor.is_finite() || self.policy_beta_factor < 0.0 {
            return Err("grid.policy_beta_factor must be non-negative".into());
        }
        // The rescaled beta must remain a valid per-neighbor probability.
        check_probability("grid.beta * grid.policy_beta_factor", self.beta * self.policy_beta_factor)?;
        Ok(())
    }
}

impl SirParameters {
    /// # Errors
    /// Returns an `EpiError` describing the first invalid field.
    pub fn validate(&self) -> Result<(), EpiError> {
        if !self.population.is_finite() || self.population <= 0.0 {
            return Err("sir.population must be positive".into());
        }
        if self.initial_infected < 0.0 || self.initial_recovered < 0.0 {
            return Err("sir initial compartments must be non-negative".into());
        }
        if self.initial_infected + self.initial_recovered > self.population {
            return Err("sir initial compartments exceed the population".into());
        }
        check_rate("sir.beta", self.beta)?;
        check_rate("sir.gamma", self.gamma)?;
        if self.days <= 0.0 || self.dt <= 0.0 {
            return Err("sir.days and sir.dt must be positive".into());
        }
        let sub_steps = self.days / self.dt;
        if (sub_steps - sub_steps.round()).abs() > 1e-9 {
            return Err(EpiError::EpiError(format!(
                "sir.days ({}) must be an integer multiple of sir.dt ({})",
                self.days, self.dt
            )));
        }
        if let Some(day) = self.policy_day {
            if !(0.0..=self.days).contains(&day) {
                return Err("sir.policy_day must lie within the simulated duration".into());
            }
        }
        if let Some(beta) = self.policy_beta {
            check_rate("sir.policy_beta", beta)?;
        }
        Ok(())
    }

    /// Number of Euler sub-steps implied by `days / dt`. Call `validate`
    /// first; divisibility is assumed here.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    #[must_use]
    pub fn sub_steps(&self) -> usize {
        (self.days / self.dt).round() as usize
    }
}

impl Parameters {
    /// Validates every field of both engines' parameter sets. Configuration
    /// errors are rejected here, before a run starts, rather than discovered
    /// mid-run.
    ///
    /// # Errors
    /// Returns an `EpiError` describing the first invalid field.
    pub fn validate(&self) -> Result<(), EpiError> {
        self.grid.validate()?;
        self.sir.validate()
    }

    /// Loads and validates parameters from a JSON file.
    ///
    /// # Errors
    /// Returns an `EpiError` if the file cannot be read or parsed, or if the
    /// resulting parameters fail validation.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, EpiError> {
        let file = File::open(path)?;
        let params: Parameters = serde_json::from_reader(BufReader::new(file))?;
        params.validate()?;
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_validate() {
        Parameters::default().validate().unwrap();
    }

    #[test]
    fn rejects_zero_grid_size() {
        let mut params = Parameters::default();
        params.grid.size = 0;
        let err = params.validate().unwrap_err();
        assert!(matches!(err, EpiError::EpiError(msg) if msg.contains("grid.size")));
    }

    #[test]
    fn rejects_beta_above_one() {
        let mut params = Parameters::default();
        params.grid.beta = 1.5;
        assert!(params.validate().is_err());
    }

    #[test]
    fn rejects_negative_population() {
        let mut params = Parameters::default();
        params.sir.population = -10.0;
        assert!(params.validate().is_err());
    }

    #[test]
    fn rejects_overfull_initial_compartments() {
        let mut params = Parameters::default();
        params.sir.initial_infected = params.sir.population + 1.0;
        assert!(params.validate().is_err());
    }

    #[test]
    fn rejects_non_divisible_days() {
        let mut params = Parameters::default();
        params.sir.days = 10.0;
        params.sir.dt = 0.3;
        let err = params.validate().unwrap_err();
        assert!(matches!(err, EpiError::EpiError(msg) if msg.contains("integer multiple")));
    }

    #[test]
    fn accepts_exactly_divisible_days() {
        let mut params = Parameters::default();
        params.sir.days = 180.0;
        params.sir.dt = 0.25;
        params.validate().unwrap();
        assert_eq!(params.sir.sub_steps(), 720);
    }

    #[test]
    fn rejects_policy_day_outside_run() {
        let mut params = Parameters::default();
        params.sir.policy_day = Some(params.sir.days + 1.0);
        assert!(params.validate().is_err());
    }

    #[test]
    fn loads_partial_json_with_defaults() {
        let mut file = tempfile::NamedTempFile::with_suffix(".json").unwrap();
        write!(file, r#"{{"seed": 42, "grid": {{"size": 30}}}}"#).unwrap();
        let params = Parameters::from_json_file(file.path()).unwrap();
        assert_eq!(params.seed, 42);
        assert_eq!(params.grid.size, 30);
        // Untouched fields keep their defaults
        assert_eq!(params.grid.steps, 300);
        assert_eq!(params.sir.sub_steps(), 720);
    }

    #[test]
    fn load_rejects_invalid_config() {
        let mut file = tempfile::NamedTempFile::with_suffix(".json").unwrap();
        write!(file, r#"{{"grid": {{"beta": 2.0}}}}"#).unwrap();
        assert!(Parameters::from_json_file(file.path()).is_err());
    }
}
