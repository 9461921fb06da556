//! # Switchsim Core
//!
//! A time-stepping simulator for switching power converter circuits.
//!
//! This library provides:
//! - A line-oriented netlist format for describing circuit topologies
//! - Nodal analysis with Norton companion models and a cached LU factorization
//! - Ideal switches, threshold diodes, Shockley diodes and multi-winding
//!   transformers, settled by an iterative convergence engine every step
//! - Probe tracing for the command line frontend
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`netlist`] - Parser for the netlist text format
//! - [`circuit`] - Topology builder, element arena and validation
//! - [`components`] - Element models (resistors, capacitors, diodes, windings, etc.)
//! - [`solver`] - Matrix assembly, convergence engine, integration and the simulator
//! - [`probe`] - Probe expressions and trace output (CLI only)
//!
//! ## Usage
//!
//! ```
//! use switchsim_core::Simulator;
//!
//! let netlist = "\
//! 1 0 V1 V=12 R=1m
//! 1 2 S1 R=10m
//! 2 3 L1 L=100u
//! 0 2 D1 R=10m
//! 3 0 C1 C=100u R=10m
//! 3 0 RL R=10
//! ";
//! let mut sim = Simulator::from_netlist(netlist, 1e-7)?;
//! for step in 0..1000 {
//!     if sim.set_switch("S1", step % 100 < 50)? {
//!         sim.force_recalc()?;
//!     }
//!     sim.advance_step()?;
//! }
//! let v_out = sim.node_voltage(3);
//! # assert!(v_out.is_some());
//! # Ok::<(), switchsim_core::SimError>(())
//! ```
//!
//! ## Simulation Method
//!
//! For each time step of fixed length `dt`:
//!
//! 1. Inject the Norton currents of all companion models and solve `G v = i`
//! 2. Re-solve until every Shockley diode agrees with its exponential law,
//!    every threshold diode matches its voltage and the transformer flux
//!    balances
//! 3. Advance inductors, capacitors and transformer cores by explicit Euler
//!
//! The conductance matrix is only re-factored when a switch, diode state or
//! resistance changes.

pub mod circuit;
pub mod components;
pub mod error;
pub mod netlist;
pub mod solver;

#[cfg(feature = "cli")]
pub mod probe;

// Re-export main types for convenience
pub use circuit::{Circuit, TopologyBuilder};
pub use error::{ErrorKind, Result, SimError};
pub use solver::{Simulator, SimulatorConfig, StepStats};

/// Default time step in seconds
pub const DEFAULT_TIME_STEP: f64 = 1e-7;
