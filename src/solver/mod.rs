//! Nodal solver and time-stepping engine.
//!
//! This module provides the numerical engine for circuit simulation.
//!
//! ## Nodal Analysis
//!
//! Every element is reduced to a Norton equivalent: a conductance in
//! parallel with an injected current. The system is then
//! ```text
//! G v = i
//! ```
//! where:
//! - G is the conductance matrix, one row per non-ground node
//! - v is the vector of node voltages
//! - i is the sum of injected currents into each node
//!
//! ## Time step
//!
//! Each step solves the system, then iterates until the nonlinear and
//! switching elements are self-consistent (see [`ConvergenceEngine`]), and
//! finally advances the reactive state with explicit Euler.

mod convergence;
mod flux_search;
mod integrator;
mod mna;
mod simulator;

pub use convergence::{ConvergenceEngine, Outcome, RetryReason};
pub use flux_search::{BoundsViolation, FluxProbe, FluxSearch, SearchState, SearchStep};
pub use mna::{stamp_conductances, stamp_sources, LinearSystem};
pub use simulator::{Simulator, SimulatorConfig, StepStats};

/// Iteration cap of the primary convergence pass and of the fallback pass.
pub const DEFAULT_MAX_ITERATIONS: usize = 1024;

/// Conductance of an open switch or a blocking diode.
pub const DEFAULT_OPEN_CONDUCTANCE: f64 = 1e-9;

/// Bracket width, in volts, at which the flux search stops.
pub const DEFAULT_FLUX_TOLERANCE: f64 = 1e-9;
