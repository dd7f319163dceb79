//! Infectious-disease spread under two complementary formalisms, sharing a
//! common contract (state → update rule → time series):
//!
//! * A spatially-explicit stochastic cellular automaton: an N×N toroidal
//!   lattice of agents, each Susceptible, Infected, or Recovered, updated
//!   once per step from the infection pressure of its four orthogonal
//!   neighbors ([`grid`]).
//! * A population-level deterministic SIR compartmental model, integrated
//!   with explicit forward Euler at a fixed sub-step ([`sir`]).
//!
//! Both support a mid-run policy intervention that changes the transmission
//! parameter, through deliberately different mechanisms: the lattice engine
//! rescales its parameter once at a configured step count, while the
//! compartmental engine re-evaluates a pure time predicate every sub-step so
//! the same parameter set can be run with and without the switch for a
//! scenario comparison.
//!
//! The surrounding modules supply configuration ([`params`]), CSV output
//! ([`report`]), logging ([`log`]), and the command-line driver ([`runner`]).

pub mod error;
pub mod grid;
pub mod log;
pub mod params;
pub mod report;
pub mod runner;
pub mod sir;

pub use error::EpiError;
