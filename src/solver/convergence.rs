//! Per-step convergence checks.
//!
//! After every solve the engine looks for the first reason the solution is
//! not yet self-consistent, in this order:
//! 1. a Shockley diode whose linear model disagrees with the exponential law
//! 2. threshold diodes whose conduction state no longer matches their voltage
//! 3. the flux-balance search of the flux-linked transformer
//!
//! The caller re-solves and asks again until the step converges.

use tracing::trace;

use super::flux_search::{FluxProbe, FluxSearch, SearchState, SearchStep};
use super::mna::LinearSystem;
use crate::circuit::{Circuit, ElementId};
use crate::components::Element;
use crate::error::{Result, SimError};

/// Why the solution has to be recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    /// A Shockley diode moved its linearization point
    ShockleyDiode,
    /// A threshold diode toggled
    Diode,
    /// The flux search applied a new trial voltage
    Transformer,
}

impl RetryReason {
    /// Whether the conductance matrix must be re-assembled before re-solving.
    ///
    /// A new trial voltage only changes injected currents.
    pub fn changes_conductance(&self) -> bool {
        !matches!(self, RetryReason::Transformer)
    }
}

/// Result of one convergence check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Converged,
    Retry(RetryReason),
}

/// Runs the convergence checks and owns the flux search.
#[derive(Debug, Clone)]
pub struct ConvergenceEngine {
    search: FluxSearch,
}

impl ConvergenceEngine {
    /// Create an engine whose flux search stops at `flux_tolerance` volts.
    pub fn new(flux_tolerance: f64) -> Self {
        Self {
            search: FluxSearch::new(flux_tolerance),
        }
    }

    /// The flux search of the current step.
    pub fn search(&self) -> &FluxSearch {
        &self.search
    }

    /// End the step; the next step starts a fresh flux search.
    pub fn reset(&mut self) {
        self.search.reset();
    }

    /// Check the last solve. In the fallback pass diodes with an
    /// `on_recalc` hint are pinned to it.
    pub fn evaluate(
        &mut self,
        circuit: &mut Circuit,
        system: &LinearSystem,
        fallback: bool,
    ) -> Result<Outcome> {
        if circuit.has_shockley && check_shockley_diodes(circuit, system) {
            return Ok(Outcome::Retry(RetryReason::ShockleyDiode));
        }

        if check_diodes(circuit, system, fallback) {
            return Ok(Outcome::Retry(RetryReason::Diode));
        }

        if let Some(primary) = circuit.flux_primary {
            if self.search.state() == SearchState::Idle {
                self.search.start(primary);
            }
            let step = {
                let mut probe = CircuitProbe::new(circuit, system, primary);
                self.search.resume(&mut probe)
            };
            match step {
                Ok(SearchStep::Retry) => {
                    trace!(
                        state = ?self.search.state(),
                        volts = self.search.trial_voltage(),
                        "flux search trial"
                    );
                    return Ok(Outcome::Retry(RetryReason::Transformer));
                }
                Ok(SearchStep::Done) => {}
                Err(violation) => {
                    return Err(SimError::SearchBounds {
                        transformer: circuit.element(primary).name().to_string(),
                        target: violation.target,
                        lobo_flux: violation.lobo_flux,
                        hibo_flux: violation.hibo_flux,
                    });
                }
            }
        }

        Ok(Outcome::Converged)
    }
}

/// Step every Shockley operating point; true on the first diode whose
/// currents disagree.
fn check_shockley_diodes(circuit: &mut Circuit, system: &LinearSystem) -> bool {
    for element in circuit.elements.iter_mut() {
        if let Element::ShockleyDiode(d) = element {
            if d.needs_relinearization(system.across(d.nodes)) {
                trace!(name = %d.name, v_diode = d.v_diode, "shockley diode not settled");
                return true;
            }
        }
    }
    false
}

/// Update every threshold diode; true if any toggled.
fn check_diodes(circuit: &mut Circuit, system: &LinearSystem, fallback: bool) -> bool {
    let mut changed = false;
    for element in circuit.elements.iter_mut() {
        if let Element::Diode(d) = element {
            if d.update_state(system.across(d.nodes), fallback) {
                trace!(name = %d.name, conducting = d.conducting, "diode toggled");
                changed = true;
            }
        }
    }
    changed
}

/// Record the converged junction voltage of every Shockley diode.
pub fn settle_shockley_diodes(circuit: &mut Circuit, system: &LinearSystem) {
    for element in circuit.elements.iter_mut() {
        if let Element::ShockleyDiode(d) = element {
            d.settle(system.across(d.nodes));
        }
    }
}

/// The flux-linked transformer as seen by the flux search.
struct CircuitProbe<'a> {
    circuit: &'a mut Circuit,
    system: &'a LinearSystem,
    primary: ElementId,
    windings: Vec<ElementId>,
    n_primary: f64,
    lbase: f64,
    bounds: (f64, f64),
}

impl<'a> CircuitProbe<'a> {
    fn new(circuit: &'a mut Circuit, system: &'a LinearSystem, primary: ElementId) -> Self {
        let windings = circuit.windings(primary).to_vec();
        let (n_primary, lbase, bounds) = match circuit.element(primary).winding() {
            Some(w) => w.magnetics.as_ref().map_or((w.turns, 0.0, (0.0, 0.0)), |m| {
                (w.turns, m.lbase, (m.v_min, m.v_max))
            }),
            None => (1.0, 0.0, (0.0, 0.0)),
        };
        Self {
            circuit,
            system,
            primary,
            windings,
            n_primary,
            lbase,
            bounds,
        }
    }
}

impl FluxProbe for CircuitProbe<'_> {
    fn bounds(&self) -> (f64, f64) {
        self.bounds
    }

    fn apply_voltage(&mut self, volts: f64) {
        for id in &self.windings {
            if let Some(w) = self.circuit.element_mut(*id).winding_mut() {
                w.apply_primary_voltage(volts, self.n_primary);
            }
        }
    }

    fn trial_flux(&self) -> f64 {
        self.windings
            .iter()
            .filter_map(|id| self.circuit.element(*id).winding())
            .map(|w| w.flux_contribution(self.system.across(w.nodes), self.lbase))
            .sum()
    }

    fn target_flux(&self) -> f64 {
        self.circuit
            .element(self.primary)
            .winding()
            .and_then(|w| w.magnetics.as_ref())
            .map_or(0.0, |m| m.flux)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::mna::{stamp_conductances, stamp_sources};
    use approx::assert_relative_eq;

    fn solved(netlist: &str) -> (Circuit, LinearSystem) {
        let mut circuit = Circuit::parse(netlist).unwrap();
        let mut system = LinearSystem::new(circuit.node_count);
        stamp_conductances(&mut circuit, &mut system, 1e-9);
        system.factor().unwrap();
        stamp_sources(&mut circuit, &mut system);
        system.solve().unwrap();
        (circuit, system)
    }

    #[test]
    fn test_linear_circuit_converges_immediately() {
        let (mut circuit, system) = solved("1 0 V1 V=10 R=1\n1 0 R1 R=10\n");
        let mut engine = ConvergenceEngine::new(1e-9);
        assert_eq!(
            engine.evaluate(&mut circuit, &system, false).unwrap(),
            Outcome::Converged
        );
    }

    #[test]
    fn test_reverse_biased_diode_retries() {
        // Diode starts conducting but sees a negative voltage
        let (mut circuit, system) = solved("1 0 V1 V=-10 R=1\n1 0 D1 R=0.01\n");
        let mut engine = ConvergenceEngine::new(1e-9);
        assert_eq!(
            engine.evaluate(&mut circuit, &system, false).unwrap(),
            Outcome::Retry(RetryReason::Diode)
        );
        match circuit.element(ElementId(1)) {
            Element::Diode(d) => assert!(!d.conducting),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_flux_search_drives_windings() {
        let (mut circuit, system) = solved(
            "\
1 0 V1 V=10 R=0.01
1 0 T1 R=0.01 N=1 primary=1 Lbase=1m Vmin=-100 Vmax=100
2 0 T1 R=0.01 N=2
2 0 RL R=10
",
        );
        let mut engine = ConvergenceEngine::new(1e-9);
        assert_eq!(
            engine.evaluate(&mut circuit, &system, false).unwrap(),
            Outcome::Retry(RetryReason::Transformer)
        );
        assert_eq!(engine.search().state(), SearchState::LoboPost);
        // Lower bound applied to the secondary: -100 V * 2 / 0.01 ohm
        let secondary = circuit.element(ElementId(2)).winding().unwrap();
        assert_relative_eq!(secondary.i_src, -100.0 * 2.0 / 0.01);

        engine.reset();
        assert_eq!(engine.search().state(), SearchState::Idle);
    }

    #[test]
    fn test_retry_reason_conductance() {
        assert!(RetryReason::Diode.changes_conductance());
        assert!(RetryReason::ShockleyDiode.changes_conductance());
        assert!(!RetryReason::Transformer.changes_conductance());
    }
}
