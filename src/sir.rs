//! The compartmental engine: a deterministic SIR model over a closed
//! population, integrated with explicit forward Euler at a fixed sub-step.
//!
//! The update is the classic mass-action form, kept in its explicit-Euler
//! shape for output compatibility:
//!
//! ```text
//! new_infections = beta_t * S * I / N
//! new_recoveries = gamma * I
//! S' = S - new_infections * dt
//! I' = I + (new_infections - new_recoveries) * dt
//! R' = R + new_recoveries * dt
//! ```
//!
//! Unlike the lattice engine's one-shot parameter mutation, the policy here
//! is a pure predicate re-evaluated every sub-step: once elapsed simulated
//! time reaches the policy day, the post-policy transmission rate is used for
//! that sub-step. Nothing in the engine is mutated, so the same parameters
//! can be run with and without the policy for a scenario comparison.

use serde::{Deserialize, Serialize};

use crate::params::SirParameters;

/// A time-based transmission-rate switch. Pure: `beta_for` decides which
/// rate applies at a given elapsed time without mutating anything.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolicyChange {
    /// Simulated day from which `beta` applies.
    pub day: f64,
    /// Transmission rate in effect from `day` onward.
    pub beta: f64,
}

impl PolicyChange {
    /// The transmission rate in effect at `elapsed` simulated days. The
    /// comparison is inclusive: a sub-step starting exactly on the policy day
    /// already uses the post-policy rate.
    #[must_use]
    pub fn beta_for(&self, elapsed: f64, baseline: f64) -> f64 {
        if elapsed >= self.day {
            self.beta
        } else {
            baseline
        }
    }
}

/// One recorded sub-step of a compartmental run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SirSample {
    /// Elapsed simulated time in days.
    pub t: f64,
    pub s: f64,
    pub i: f64,
    pub r: f64,
}

/// The full output time series of a run: `sub_steps + 1` samples including
/// the initial condition.
#[derive(Debug, Clone, PartialEq)]
pub struct SirSeries {
    samples: Vec<SirSample>,
}

impl SirSeries {
    #[must_use]
    pub fn samples(&self) -> &[SirSample] {
        &self.samples
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Peak infected count and the simulated day at which it occurs. Ties
    /// break to the first occurrence.
    #[must_use]
    pub fn peak_infected(&self) -> (f64, f64) {
        let mut peak = f64::NEG_INFINITY;
        let mut peak_day = 0.0;
        for sample in &self.samples {
            if sample.i > peak {
                peak = sample.i;
                peak_day = sample.t;
            }
        }
        (peak, peak_day)
    }

    /// Final attack rate: the fraction of the population ever infected,
    /// `R_final / N`.
    #[must_use]
    pub fn attack_rate(&self, population: f64) -> f64 {
        self.samples.last().map_or(0.0, |s| s.r / population)
    }
}

/// Runs the explicit-Euler integration for the configured duration and
/// returns the full time series. `policy` is `None` for the baseline
/// scenario. Parameters are assumed validated; in particular `days / dt`
/// must divide exactly.
#[must_use]
pub fn run_sir(params: &SirParameters, policy: Option<PolicyChange>) -> SirSeries {
    let n = params.population;
    let dt = params.dt;
    let sub_steps = params.sub_steps();

    let mut s = n - params.initial_infected - params.initial_recovered;
    let mut i = params.initial_infected;
    let mut r = params.initial_recovered;

    let mut samples = Vec::with_capacity(sub_steps + 1);
    samples.push(SirSample { t: 0.0, s, i, r });

    for k in 0..sub_steps {
        #[allow(clippy::cast_precision_loss)]
        let elapsed = k as f64 * dt;
        let beta_t = match policy {
            Some(p) => p.beta_for(elapsed, params.beta),
            None => params.beta,
        };

        let new_infections = beta_t * s * i / n;
        let new_recoveries = params.gamma * i;

        s -= new_infections * dt;
        i += (new_infections - new_recoveries) * dt;
        r += new_recoveries * dt;

        #[allow(clippy::cast_precision_loss)]
        let t = (k + 1) as f64 * dt;
        samples.push(SirSample { t, s, i, r });
    }

    SirSeries { samples }
}

/// Convenience wrapper building the [`PolicyChange`] out of the parameter
/// set, when both the policy day and the post-policy rate are configured.
#[must_use]
pub fn policy_from_parameters(params: &SirParameters) -> Option<PolicyChange> {
    match (params.policy_day, params.policy_beta) {
        (Some(day), Some(beta)) => Some(PolicyChange { day, beta }),
        _ => None,
    }
}
