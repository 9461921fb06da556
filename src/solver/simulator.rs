//! Main simulator interface.

use tracing::{debug, error, trace, warn};

use crate::circuit::{Circuit, ElementId, NodeId};
use crate::components::{Capacitor, Diode, Element, Inductor, Resistor, Switch, VoltageSource};
use crate::error::{Result, SimError};

use super::convergence::{settle_shockley_diodes, ConvergenceEngine, Outcome};
use super::integrator;
use super::mna::{stamp_conductances, stamp_sources, LinearSystem};
use super::{DEFAULT_FLUX_TOLERANCE, DEFAULT_MAX_ITERATIONS, DEFAULT_OPEN_CONDUCTANCE};

/// Configuration for the simulator.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Re-solves allowed per step before the fallback pass.
    pub max_iterations: usize,
    /// Re-solves allowed in the fallback pass.
    pub fallback_max_iterations: usize,
    /// Conductance stamped by open switches and blocking diodes.
    pub open_conductance: f64,
    /// Bracket width (volts) at which the flux search stops.
    pub flux_tolerance: f64,
    /// Put every threshold diode into conduction when a switch changes state.
    pub close_diodes_on_switch: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            fallback_max_iterations: DEFAULT_MAX_ITERATIONS,
            open_conductance: DEFAULT_OPEN_CONDUCTANCE,
            flux_tolerance: DEFAULT_FLUX_TOLERANCE,
            close_diodes_on_switch: false,
        }
    }
}

impl SimulatorConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the iteration cap of the primary convergence pass.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the iteration cap of the fallback pass.
    pub fn with_fallback_max_iterations(mut self, max_iterations: usize) -> Self {
        self.fallback_max_iterations = max_iterations;
        self
    }

    /// Set the conductance of open switches and blocking diodes.
    pub fn with_open_conductance(mut self, conductance: f64) -> Self {
        self.open_conductance = conductance;
        self
    }

    /// Set the flux search tolerance (in volts).
    ///
    /// Each halving of the tolerance costs one more re-solve per step while
    /// the flux-linked transformer is searching.
    pub fn with_flux_tolerance(mut self, tolerance: f64) -> Self {
        self.flux_tolerance = tolerance;
        self
    }

    /// Close every threshold diode whenever a switch changes state.
    ///
    /// Converters whose freewheeling path opens with the switch settle in
    /// fewer iterations with this enabled.
    pub fn with_close_diodes_on_switch(mut self, enabled: bool) -> Self {
        self.close_diodes_on_switch = enabled;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 || self.fallback_max_iterations == 0 {
            return Err(SimError::InvalidSimulationParam {
                message: "iteration caps must be at least 1".to_string(),
            });
        }
        if !(self.open_conductance.is_finite() && self.open_conductance > 0.0) {
            return Err(SimError::InvalidSimulationParam {
                message: format!("open conductance must be positive, got {}", self.open_conductance),
            });
        }
        if !(self.flux_tolerance.is_finite() && self.flux_tolerance > 0.0) {
            return Err(SimError::InvalidSimulationParam {
                message: format!("flux tolerance must be positive, got {}", self.flux_tolerance),
            });
        }
        Ok(())
    }
}

/// How the last step converged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepStats {
    /// Re-solves across both passes
    pub iterations: usize,
    /// Whether the fallback pass was entered
    pub fallback: bool,
    /// Bisection halvings of the flux search
    pub flux_search_iterations: usize,
}

/// The main circuit simulator.
///
/// Owns the circuit, the nodal system and the per-step convergence state.
/// Each [`Simulator::advance_step`] moves time forward by the fixed `dt`.
#[derive(Debug)]
pub struct Simulator {
    /// The circuit being simulated
    circuit: Circuit,
    /// Nodal system and its factorization
    system: LinearSystem,
    engine: ConvergenceEngine,
    config: SimulatorConfig,
    /// Time step
    dt: f64,
    /// Completed steps
    steps: u64,
    /// A control changed the conductance matrix since the last factorization
    recalc_pending: bool,
    stats: StepStats,
}

impl Simulator {
    /// Create a new simulator for the given circuit with default configuration.
    pub fn new(circuit: Circuit, dt: f64) -> Result<Self> {
        Self::with_config(circuit, dt, SimulatorConfig::default())
    }

    /// Create a new simulator for the given circuit with custom configuration.
    ///
    /// Allocates the nodal system and performs the first factorization.
    pub fn with_config(circuit: Circuit, dt: f64, config: SimulatorConfig) -> Result<Self> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(SimError::InvalidSimulationParam {
                message: format!("time step must be positive, got {}", dt),
            });
        }
        config.validate()?;

        let system = LinearSystem::new(circuit.node_count);
        let engine = ConvergenceEngine::new(config.flux_tolerance);
        let mut sim = Self {
            circuit,
            system,
            engine,
            config,
            dt,
            steps: 0,
            recalc_pending: false,
            stats: StepStats::default(),
        };
        sim.recalc()?;

        debug!(
            nodes = sim.circuit.node_count,
            elements = sim.circuit.elements.len(),
            dt,
            "simulator ready"
        );
        Ok(sim)
    }

    /// Parse netlist text, finalize it and create a simulator.
    pub fn from_netlist(text: &str, dt: f64) -> Result<Self> {
        Self::new(Circuit::parse(text)?, dt)
    }

    /// Get the time step.
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Get a reference to the circuit.
    pub fn circuit(&self) -> &Circuit {
        &self.circuit
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Number of completed steps.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Simulated time, `steps * dt`.
    pub fn time(&self) -> f64 {
        self.steps as f64 * self.dt
    }

    /// Convergence statistics of the last completed step.
    pub fn step_stats(&self) -> StepStats {
        self.stats
    }

    /// Resolve an element name to its handle.
    pub fn element_id(&self, name: &str) -> Option<ElementId> {
        self.circuit.find(name)
    }

    // ------------------------------------------------------------------
    // Controls
    // ------------------------------------------------------------------

    /// Set the voltage of a voltage source. Takes effect at the next step.
    pub fn set_voltage_source(&mut self, name: &str, volts: f64) -> Result<()> {
        check_finite(name, "V", volts)?;
        let source = self.typed_mut(name, "voltage source", |e| match e {
            Element::VoltageSource(v) => Some(v),
            _ => None,
        })?;
        source.set_voltage(volts);
        Ok(())
    }

    /// Open or close a switch. Returns whether the conductance matrix
    /// changed and a recalc is due.
    pub fn set_switch(&mut self, name: &str, closed: bool) -> Result<bool> {
        let switch: &mut Switch = self.typed_mut(name, "switch", |e| match e {
            Element::Switch(s) => Some(s),
            _ => None,
        })?;
        if !switch.set_closed(closed) {
            return Ok(false);
        }

        if self.config.close_diodes_on_switch {
            for element in self.circuit.elements.iter_mut() {
                if let Element::Diode(d) = element {
                    d.conducting = true;
                }
            }
        }
        trace!(name, closed, "switch changed");
        self.recalc_pending = true;
        Ok(true)
    }

    /// Preset the conduction state of a threshold diode before the next step.
    ///
    /// The convergence engine still corrects a wrong hint. Returns whether
    /// a recalc is due.
    pub fn set_diode_hint(&mut self, name: &str, conducting: bool) -> Result<bool> {
        let diode: &mut Diode = self.typed_mut(name, "diode", |e| match e {
            Element::Diode(d) => Some(d),
            _ => None,
        })?;
        let changed = diode.conducting != conducting;
        diode.conducting = conducting;
        if changed {
            self.recalc_pending = true;
        }
        Ok(changed)
    }

    /// Change a resistance. Returns whether a recalc is due.
    pub fn set_resistor(&mut self, name: &str, ohms: f64) -> Result<bool> {
        check_positive(name, "R", ohms)?;
        let resistor: &mut Resistor = self.typed_mut(name, "resistor", |e| match e {
            Element::Resistor(r) => Some(r),
            _ => None,
        })?;
        let changed = resistor.resistance != ohms;
        resistor.resistance = ohms;
        if changed {
            self.recalc_pending = true;
        }
        Ok(changed)
    }

    /// Change an inductance. Inductors stamp no conductance, so no recalc
    /// is needed.
    pub fn set_inductor(&mut self, name: &str, henries: f64) -> Result<()> {
        check_positive(name, "L", henries)?;
        let inductor: &mut Inductor = self.typed_mut(name, "inductor", |e| match e {
            Element::Inductor(l) => Some(l),
            _ => None,
        })?;
        inductor.inductance = henries;
        Ok(())
    }

    /// Overwrite the voltage stored on a capacitor.
    pub fn set_capacitor_voltage(&mut self, name: &str, volts: f64) -> Result<()> {
        check_finite(name, "Vinit", volts)?;
        let capacitor: &mut Capacitor = self.typed_mut(name, "capacitor", |e| match e {
            Element::Capacitor(c) => Some(c),
            _ => None,
        })?;
        capacitor.set_voltage(volts);
        Ok(())
    }

    /// Re-assemble and re-factor the conductance matrix after a control
    /// change.
    ///
    /// With Shockley diodes present the matrix is rebuilt at every step
    /// anyway, so this only clears the pending flag.
    pub fn force_recalc(&mut self) -> Result<()> {
        self.recalc_pending = false;
        if self.circuit.has_shockley {
            return Ok(());
        }
        debug!(step = self.steps, "recalc");
        self.recalc()
    }

    fn recalc(&mut self) -> Result<()> {
        stamp_conductances(&mut self.circuit, &mut self.system, self.config.open_conductance);
        self.system.factor()
    }

    // ------------------------------------------------------------------
    // Stepping
    // ------------------------------------------------------------------

    /// Advance the simulation by one time step.
    ///
    /// Errors are fatal for the run: the state is left mid-step.
    pub fn advance_step(&mut self) -> Result<()> {
        let result = self.run_step();
        if let Err(err) = &result {
            error!(step = self.steps, %err, "step failed");
            self.engine.reset();
        }
        result
    }

    fn run_step(&mut self) -> Result<()> {
        if self.recalc_pending {
            self.force_recalc()?;
        }
        if self.circuit.has_shockley {
            self.recalc()?;
        }
        stamp_sources(&mut self.circuit, &mut self.system);
        self.system.solve()?;

        let mut stats = StepStats::default();
        if !self.settle(false, self.config.max_iterations, &mut stats)? {
            warn!(
                step = self.steps,
                iterations = stats.iterations,
                "recalc loop did not settle, forcing diode states"
            );
            stats.fallback = true;
            if !self.settle(true, self.config.fallback_max_iterations, &mut stats)? {
                return Err(SimError::ConvergenceFailure {
                    iterations: stats.iterations,
                });
            }
        }
        stats.flux_search_iterations = self.engine.search().iterations();

        integrator::integrate(&mut self.circuit, &self.system, self.dt);
        self.engine.reset();
        settle_shockley_diodes(&mut self.circuit, &self.system);

        self.stats = stats;
        self.steps += 1;
        Ok(())
    }

    /// Re-solve until the convergence engine is satisfied or `cap`
    /// re-solves were spent. Returns whether it converged.
    fn settle(&mut self, fallback: bool, cap: usize, stats: &mut StepStats) -> Result<bool> {
        let mut count = 0;
        loop {
            let reason = match self.engine.evaluate(&mut self.circuit, &self.system, fallback)? {
                Outcome::Converged => return Ok(true),
                Outcome::Retry(reason) => reason,
            };
            count += 1;
            stats.iterations += 1;
            trace!(?reason, count, fallback, "re-solving");

            if reason.changes_conductance() || self.circuit.has_shockley {
                self.recalc()?;
            }
            stamp_sources(&mut self.circuit, &mut self.system);
            self.system.solve()?;

            if count >= cap {
                return Ok(false);
            }
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Get the voltage at a node by number. Node 0 is ground.
    pub fn node_voltage(&self, node: usize) -> Option<f64> {
        (node <= self.circuit.node_count).then(|| self.system.voltage(NodeId(node)))
    }

    /// Resistance of a resistor.
    pub fn resistor(&self, name: &str) -> Result<f64> {
        self.typed(name, "resistor", |e| match e {
            Element::Resistor(r) => Some(r.resistance),
            _ => None,
        })
    }

    /// Inductance of an inductor.
    pub fn inductor(&self, name: &str) -> Result<f64> {
        self.typed(name, "inductor", |e| match e {
            Element::Inductor(l) => Some(l.inductance),
            _ => None,
        })
    }

    /// Current of an inductor, flowing n2 to n1 inside the element.
    pub fn inductor_current(&self, name: &str) -> Result<f64> {
        self.typed(name, "inductor", |e| match e {
            Element::Inductor(l) => Some(l.i_src),
            _ => None,
        })
    }

    /// Capacitance of a capacitor.
    pub fn capacitor(&self, name: &str) -> Result<f64> {
        self.typed(name, "capacitor", |e| match e {
            Element::Capacitor(c) => Some(c.capacitance),
            _ => None,
        })
    }

    /// Voltage on the ideal capacitance of a capacitor.
    pub fn capacitor_voltage(&self, name: &str) -> Result<f64> {
        self.typed(name, "capacitor", |e| match e {
            Element::Capacitor(c) => Some(c.voltage()),
            _ => None,
        })
    }

    /// Current a voltage source delivers out of n1.
    pub fn voltage_source_current(&self, name: &str) -> Result<f64> {
        let system = &self.system;
        self.typed(name, "voltage source", |e| match e {
            Element::VoltageSource(v) => Some(source_current(v, system)),
            _ => None,
        })
    }

    /// Magnetizing current of a transformer, by its (shared) name.
    pub fn transformer_magnetizing_current(&self, name: &str) -> Result<f64> {
        self.typed(name, "transformer", |e| match e {
            Element::Transformer(w) => w
                .magnetics
                .as_ref()
                .map(|m| m.flux / m.lbase / w.turns),
            Element::TransformerDirect(w) => w.magnetics.as_ref().map(|m| -m.mag_const),
            _ => None,
        })
    }

    /// Magnetizing inductance of a transformer seen from its primary.
    pub fn transformer_inductance(&self, name: &str) -> Result<f64> {
        self.typed(name, "transformer", |e| {
            let w = e.winding()?;
            w.magnetics.as_ref().map(|m| m.inductance(w.turns))
        })
    }

    /// Current from n1 to n2 through every winding of a transformer, in
    /// netlist order, as solved in the last step.
    pub fn transformer_winding_currents(&self, name: &str) -> Result<Vec<f64>> {
        let id = self.circuit.lookup(name)?;
        let element = self.circuit.element(id);
        let (primary, magnetics) = element
            .winding()
            .and_then(|w| w.magnetics.as_ref().map(|m| (w, m)))
            .ok_or_else(|| wrong_type(name, "transformer"))?;
        let direct = matches!(element, Element::TransformerDirect(_));

        Ok(self
            .circuit
            .windings(id)
            .iter()
            .filter_map(|wid| self.circuit.element(*wid).winding())
            .map(|w| {
                let v = self.system.across(w.nodes);
                if direct {
                    (v - w.turns / primary.turns * magnetics.v_m) / w.resistance
                } else {
                    w.current(v)
                }
            })
            .collect())
    }

    fn typed<T>(
        &self,
        name: &str,
        expected: &'static str,
        pick: impl FnOnce(&Element) -> Option<T>,
    ) -> Result<T> {
        let id = self.circuit.lookup(name)?;
        pick(self.circuit.element(id)).ok_or_else(|| wrong_type(name, expected))
    }

    fn typed_mut<T>(
        &mut self,
        name: &str,
        expected: &'static str,
        pick: impl FnOnce(&mut Element) -> Option<&mut T>,
    ) -> Result<&mut T> {
        let id = self.circuit.lookup(name)?;
        pick(self.circuit.element_mut(id)).ok_or_else(|| wrong_type(name, expected))
    }
}

fn source_current(source: &VoltageSource, system: &LinearSystem) -> f64 {
    source.current(system.across(source.nodes))
}

fn wrong_type(name: &str, expected: &'static str) -> SimError {
    SimError::WrongElementType {
        name: name.to_string(),
        expected,
    }
}

fn check_finite(name: &str, param: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(SimError::invalid_parameter(name, param, format!("must be finite, got {}", value)))
    }
}

fn check_positive(name: &str, param: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SimError::invalid_parameter(name, param, format!("must be positive, got {}", value)))
    }
}
