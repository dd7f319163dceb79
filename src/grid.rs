//! The stochastic lattice engine: an N×N toroidal grid of cells, each an
//! independent stochastic agent with a health status, updated once per step
//! from local neighbor pressure.
//!
//! Each step is computed in two phases: every transition decision is drawn
//! against a snapshot of the pre-step lattice, and only then are all
//! decisions committed. This keeps results independent of cell iteration
//! order. Random draws are consumed in a fixed order (one infection draw per
//! cell in row-major order, then one recovery draw per cell in row-major
//! order), so a given seed reproduces a run bit-for-bit.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::params::GridParameters;

/// Health status of a single cell. Transitions are monotonic:
/// Susceptible → Infected → Recovered, with Recovered terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Susceptible,
    Infected,
    Recovered,
}

/// Aggregate cell counts for one step; `total()` always equals the number of
/// cells in the lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCounts {
    pub susceptible: usize,
    pub infected: usize,
    pub recovered: usize,
}

impl StateCounts {
    #[must_use]
    pub fn total(&self) -> usize {
        self.susceptible + self.infected + self.recovered
    }
}

/// A square lattice of cell health statuses, stored row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lattice {
    size: usize,
    cells: Vec<HealthStatus>,
}

impl Lattice {
    /// Creates an all-susceptible lattice with `size * size` cells.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self::filled(size, HealthStatus::Susceptible)
    }

    /// Creates a lattice with every cell in the given status.
    #[must_use]
    pub fn filled(size: usize, status: HealthStatus) -> Self {
        Self {
            size,
            cells: vec![status; size * size],
        }
    }

    /// Side length of the lattice.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> HealthStatus {
        self.cells[row * self.size + col]
    }

    pub(crate) fn set(&mut self, row: usize, col: usize, status: HealthStatus) {
        self.cells[row * self.size + col] = status;
    }

    /// Row-major view of all cells.
    #[must_use]
    pub fn cells(&self) -> &[HealthStatus] {
        &self.cells
    }

    /// Counts cells in each status.
    #[must_use]
    pub fn counts(&self) -> StateCounts {
        let mut counts = StateCounts {
            susceptible: 0,
            infected: 0,
            recovered: 0,
        };
        for cell in &self.cells {
            match cell {
                HealthStatus::Susceptible => counts.susceptible += 1,
                HealthStatus::Infected => counts.infected += 1,
                HealthStatus::Recovered => counts.recovered += 1,
            }
        }
        counts
    }
}

/// Returns, for every cell, how many of its four orthogonal neighbors are
/// Infected, with toroidal wraparound: the neighbor "above" the first row is
/// the last row, and symmetrically for columns. Counts are in `[0, 4]`.
///
/// Pure and side-effect free; called once per step against the pre-step
/// lattice.
#[must_use]
pub fn infected_neighbors(lattice: &Lattice) -> Vec<u8> {
    let size = lattice.size();
    let mut counts = vec![0u8; size * size];
    for row in 0..size {
        let up = (row + size - 1) % size;
        let down = (row + 1) % size;
        for col in 0..size {
            let left = (col + size - 1) % size;
            let right = (col + 1) % size;
            let mut k = 0u8;
            if lattice.get(up, col) == HealthStatus::Infected {
                k += 1;
            }
            if lattice.get(down, col) == HealthStatus::Infected {
                k += 1;
            }
            if lattice.get(row, left) == HealthStatus::Infected {
                k += 1;
            }
            if lattice.get(row, right) == HealthStatus::Infected {
                k += 1;
            }
            counts[row * size + col] = k;
        }
    }
    counts
}

/// Probability that a susceptible cell with `k` infected neighbors becomes
/// infected in one step: the chance that at least one of `k` independent
/// Bernoulli(`beta`) exposures succeeds. Stays a valid probability for any
/// `k`, unlike the naive `k * beta`.
#[must_use]
pub fn infection_probability(beta: f64, k: u8) -> f64 {
    1.0 - (1.0 - beta).powi(i32::from(k))
}

/// One-shot policy: once the configured number of steps has completed,
/// rescale the engine's transmission parameter permanently. The `applied`
/// flag guards against double-application if the driver replays steps.
#[derive(Debug, Clone)]
pub struct BetaReduction {
    step: u32,
    factor: f64,
    applied: bool,
}

impl BetaReduction {
    #[must_use]
    pub fn new(step: u32, factor: f64) -> Self {
        Self {
            step,
            factor,
            applied: false,
        }
    }

    /// Rescales `beta` if the trigger point has been reached and the policy
    /// has not fired yet. Returns whether the policy fired this call.
    fn maybe_apply(&mut self, completed_steps: u32, beta: &mut f64) -> bool {
        if self.applied || completed_steps < self.step {
            return false;
        }
        *beta *= self.factor;
        self.applied = true;
        true
    }
}

/// The lattice engine. Owns the grid, both transition parameters, and the
/// seeded random stream; the driver calls [`GridEngine::step`] once per step.
pub struct GridEngine {
    lattice: Lattice,
    beta: f64,
    gamma: f64,
    steps_completed: u32,
    policy: Option<BetaReduction>,
    rng: StdRng,
}

impl GridEngine {
    /// Creates an engine over an all-susceptible lattice.
    #[must_use]
    pub fn new(size: usize, beta: f64, gamma: f64, seed: u64) -> Self {
        Self {
            lattice: Lattice::new(size),
            beta,
            gamma,
            steps_completed: 0,
            policy: None,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Builds a fully-configured engine from validated parameters and seeds
    /// the initial infections.
    #[must_use]
    pub fn from_parameters(params: &GridParameters, seed: u64) -> Self {
        let mut engine = Self::new(params.size, params.beta, params.gamma, seed);
        if let Some(step) = params.policy_step {
            engine = engine.with_policy(BetaReduction::new(step, params.policy_beta_factor));
        }
        engine.seed_infections(params.initial_infected_fraction);
        engine
    }

    /// Attaches a one-shot beta-reduction policy.
    #[must_use]
    pub fn with_policy(mut self, policy: BetaReduction) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Infects each cell independently with probability `fraction`, consuming
    /// one draw per cell in row-major order.
    pub fn seed_infections(&mut self, fraction: f64) {
        for cell in &mut self.lattice.cells {
            if self.rng.random::<f64>() < fraction {
                *cell = HealthStatus::Infected;
            }
        }
    }

    /// Read-only view of the current lattice.
    #[must_use]
    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    /// Transmission parameter currently in effect (post-policy once the
    /// policy has fired).
    #[must_use]
    pub fn beta(&self) -> f64 {
        self.beta
    }

    #[must_use]
    pub fn steps_completed(&self) -> u32 {
        self.steps_completed
    }

    /// Advances the lattice by one step and returns the post-step counts.
    ///
    /// Draw order: one infection draw per cell in row-major order, then one
    /// recovery draw per cell in row-major order. Every cell consumes a draw
    /// in each pass regardless of its status, so the stream position depends
    /// only on the step number and lattice size.
    pub fn step(&mut self) -> StateCounts {
        if let Some(policy) = self.policy.as_mut() {
            if policy.maybe_apply(self.steps_completed, &mut self.beta) {
                log::info!(
                    "beta reduced to {} after {} steps",
                    self.beta,
                    self.steps_completed
                );
            }
        }

        let neighbors = infected_neighbors(&self.lattice);
        let n_cells = self.lattice.cells.len();

        // Phase 1: decide every transition against the pre-step lattice.
        let mut infect = vec![false; n_cells];
        for idx in 0..n_cells {
            let draw = self.rng.random::<f64>();
            if self.lattice.cells[idx] == HealthStatus::Susceptible {
                infect[idx] = draw < infection_probability(self.beta, neighbors[idx]);
            }
        }
        let mut recover = vec![false; n_cells];
        for idx in 0..n_cells {
            let draw = self.rng.random::<f64>();
            if self.lattice.cells[idx] == HealthStatus::Infected {
                recover[idx] = draw < self.gamma;
            }
        }

        // Phase 2: commit. The decision sets are disjoint because a cell was
        // either Susceptible or Infected before the step, never both.
        for idx in 0..n_cells {
            if infect[idx] {
                self.lattice.cells[idx] = HealthStatus::Infected;
            } else if recover[idx] {
                self.lattice.cells[idx] = HealthStatus::Recovered;
            }
        }

        self.steps_completed += 1;
        self.lattice.counts()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn infected_lattice(size: usize) -> Lattice {
        Lattice::filled(size, HealthStatus::Infected)
    }

    #[test]
    fn neighbor_counts_on_uniform_infected_lattice() {
        // Wraparound means every cell of an all-infected 3×3 grid sees
        // exactly its four orthogonal neighbors.
        let lattice = infected_lattice(3);
        let counts = infected_neighbors(&lattice);
        assert_eq!(counts.len(), 9);
        assert!(counts.iter().all(|&k| k == 4));
    }

    #[test]
    fn neighbor_counts_wrap_across_edges() {
        let mut lattice = Lattice::new(4);
        lattice.set(0, 0, HealthStatus::Infected);
        let counts = infected_neighbors(&lattice);
        // The infected corner is a neighbor of its wrapped partners only.
        assert_eq!(counts[1], 1); // (0,1) right neighbor
        assert_eq!(counts[3], 1); // (0,3) wraps left to (0,0)
        assert_eq!(counts[4], 1); // (1,0) below
        assert_eq!(counts[12], 1); // (3,0) wraps up to (0,0)
        assert_eq!(counts[0], 0);
        assert_eq!(counts[5], 0);
    }

    #[test]
    fn infection_probability_composition() {
        assert_approx_eq!(infection_probability(0.0, 4), 0.0);
        assert_approx_eq!(infection_probability(0.35, 0), 0.0);
        assert_approx_eq!(infection_probability(1.0, 1), 1.0);
        assert_approx_eq!(infection_probability(0.35, 2), 1.0 - 0.65 * 0.65);
        // Stays a probability even at full neighbor pressure.
        let p = infection_probability(0.35, 4);
        assert!(p > 0.0 && p < 1.0);
    }

    #[test]
    fn counts_conserve_cell_total() {
        let mut engine = GridEngine::new(20, 0.35, 0.02, 0);
        engine.seed_infections(0.05);
        for _ in 0..50 {
            let counts = engine.step();
            assert_eq!(counts.total(), 400);
        }
    }

    #[test]
    fn zero_beta_never_infects() {
        let mut engine = GridEngine::new(10, 0.0, 0.02, 7);
        engine.seed_infections(0.2);
        let initial = engine.lattice().counts();
        for _ in 0..30 {
            let counts = engine.step();
            // No new infections: everyone outside S started infected.
            assert_eq!(counts.susceptible, initial.susceptible);
        }
    }

    #[test]
    fn zero_gamma_never_recovers() {
        let mut engine = GridEngine::new(10, 0.35, 0.0, 7);
        engine.seed_infections(0.2);
        for _ in 0..30 {
            let counts = engine.step();
            assert_eq!(counts.recovered, 0);
        }
    }

    #[test]
    fn transitions_are_monotonic() {
        let mut engine = GridEngine::new(15, 0.5, 0.3, 3);
        engine.seed_infections(0.1);
        let mut prev = engine.lattice().clone();
        for _ in 0..40 {
            engine.step();
            let current = engine.lattice();
            for (before, after) in prev.cells().iter().zip(current.cells()) {
                match before {
                    HealthStatus::Susceptible => {}
                    HealthStatus::Infected => {
                        assert_ne!(*after, HealthStatus::Susceptible);
                    }
                    HealthStatus::Recovered => {
                        assert_eq!(*after, HealthStatus::Recovered);
                    }
                }
            }
            prev = current.clone();
        }
    }

    #[test]
    fn identical_seeds_reproduce_runs_bit_for_bit() {
        let mut a = GridEngine::new(25, 0.35, 0.02, 42);
        let mut b = GridEngine::new(25, 0.35, 0.02, 42);
        a.seed_infections(0.05);
        b.seed_infections(0.05);
        assert_eq!(a.lattice(), b.lattice());
        for _ in 0..60 {
            let counts_a = a.step();
            let counts_b = b.step();
            assert_eq!(counts_a, counts_b);
            assert_eq!(a.lattice(), b.lattice());
        }
    }

    #[test]
    fn different_seeds_diverge() {
        let mut a = GridEngine::new(25, 0.35, 0.02, 1);
        let mut b = GridEngine::new(25, 0.35, 0.02, 2);
        a.seed_infections(0.05);
        b.seed_infections(0.05);
        assert_ne!(a.lattice(), b.lattice());
    }

    #[test]
    fn policy_rescales_beta_exactly_once() {
        let mut engine =
            GridEngine::new(10, 0.35, 0.02, 0).with_policy(BetaReduction::new(100, 0.7));
        engine.seed_infections(0.1);
        for _ in 0..100 {
            engine.step();
            assert!(engine.beta() <= 0.35);
        }
        // Steps 0..=99 ran with the unmodified beta; the 101st step (100
        // completed) applies the reduction before drawing.
        assert_approx_eq!(engine.beta(), 0.35);
        engine.step();
        assert_approx_eq!(engine.beta(), 0.35 * 0.7);
        for _ in 0..49 {
            engine.step();
        }
        // Never re-applied.
        assert_approx_eq!(engine.beta(), 0.35 * 0.7);
    }

    #[test]
    fn pre_policy_steps_use_unmodified_beta() {
        // A policy engine and a policy-free engine with the same seed must
        // agree on every lattice up to the trigger point, which shows the
        // draws through step 100 were taken against the original beta.
        let mut with_policy =
            GridEngine::new(20, 0.35, 0.02, 9).with_policy(BetaReduction::new(100, 0.7));
        let mut without_policy = GridEngine::new(20, 0.35, 0.02, 9);
        with_policy.seed_infections(0.05);
        without_policy.seed_infections(0.05);
        for _ in 0..100 {
            with_policy.step();
            without_policy.step();
            assert_eq!(with_policy.lattice(), without_policy.lattice());
        }
    }

    #[test]
    fn policy_fires_even_if_trigger_step_is_skipped() {
        let mut beta = 0.35;
        let mut policy = BetaReduction::new(100, 0.7);
        assert!(!policy.maybe_apply(99, &mut beta));
        // Driver replayed past the equality point.
        assert!(policy.maybe_apply(150, &mut beta));
        assert!(!policy.maybe_apply(151, &mut beta));
        assert_approx_eq!(beta, 0.35 * 0.7);
    }

    #[test]
    fn seed_fraction_extremes() {
        let mut all = GridEngine::new(8, 0.1, 0.1, 0);
        all.seed_infections(1.0);
        assert_eq!(all.lattice().counts().infected, 64);

        let mut none = GridEngine::new(8, 0.1, 0.1, 0);
        none.seed_infections(0.0);
        assert_eq!(none.lattice().counts().susceptible, 64);
    }

    #[test]
    fn from_parameters_wires_policy_and_seeding() {
        let params = crate::params::GridParameters {
            size: 12,
            initial_infected_fraction: 1.0,
            beta: 0.2,
            gamma: 0.1,
            steps: 10,
            policy_step: Some(2),
            policy_beta_factor: 0.5,
        };
        let mut engine = GridEngine::from_parameters(&params, 5);
        assert_eq!(engine.lattice().counts().infected, 144);
        engine.step();
        engine.step();
        engine.step();
        assert_approx_eq!(engine.beta(), 0.1);
    }
}
