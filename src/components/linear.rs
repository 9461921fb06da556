//! Linear passive components: Resistor, Capacitor, Inductor.

use super::accumulate_clamped;
use crate::circuit::{ElementId, NodeId};

/// A resistor component.
#[derive(Debug, Clone)]
pub struct Resistor {
    pub id: ElementId,
    pub name: String,
    pub nodes: [NodeId; 2],
    pub resistance: f64,
}

impl Resistor {
    /// Create a new resistor.
    pub fn new(id: ElementId, name: String, nodes: [NodeId; 2], resistance: f64) -> Self {
        Self {
            id,
            name,
            nodes,
            resistance,
        }
    }

    /// Get the conductance (1/R).
    pub fn conductance(&self) -> f64 {
        1.0 / self.resistance
    }
}

/// A capacitor with series resistance.
///
/// Modeled in Norton form: the conductance 1/R in parallel with the injected
/// current `i_src = U / R`, where U is the voltage on the ideal capacitance.
/// Explicit Euler advances U from the current through R:
///   I_tot = i_src - V/R
///   dU    = -I_tot / C * dt
#[derive(Debug, Clone)]
pub struct Capacitor {
    pub id: ElementId,
    pub name: String,
    pub nodes: [NodeId; 2],
    pub resistance: f64,
    pub capacitance: f64,
    /// Injected current, `U / R`
    pub i_src: f64,
}

impl Capacitor {
    /// Create a new capacitor charged to `v_init`.
    pub fn new(
        id: ElementId,
        name: String,
        nodes: [NodeId; 2],
        resistance: f64,
        capacitance: f64,
        v_init: f64,
    ) -> Self {
        Self {
            id,
            name,
            nodes,
            resistance,
            capacitance,
            i_src: v_init / resistance,
        }
    }

    /// Get the conductance of the series resistance.
    pub fn conductance(&self) -> f64 {
        1.0 / self.resistance
    }

    /// Voltage on the ideal capacitance, excluding the series resistor drop.
    pub fn voltage(&self) -> f64 {
        self.i_src * self.resistance
    }

    /// Overwrite the voltage on the ideal capacitance.
    pub fn set_voltage(&mut self, volts: f64) {
        self.i_src = volts / self.resistance;
    }

    /// Advance the stored charge by one step given the terminal voltage.
    pub fn integrate(&mut self, v: f64, dt: f64) {
        let i_r = v / self.resistance;
        let i_tot = self.i_src - i_r;
        let du = -i_tot / self.capacitance * dt;
        self.i_src += du / self.resistance;
    }
}

/// An inductor with optional series (parasitic) resistance.
///
/// The inductor is a pure injected current: it stamps no conductance. Its
/// current `i_src` flows n2 to n1 inside the element and is advanced by
/// explicit Euler:
///   dI = -(V + R * I) / L * dt
///
/// A step that would carry the current through zero stops at zero.
#[derive(Debug, Clone)]
pub struct Inductor {
    pub id: ElementId,
    pub name: String,
    pub nodes: [NodeId; 2],
    pub inductance: f64,
    /// Series resistance; 0 for an ideal inductor
    pub resistance: f64,
    /// Inductor current
    pub i_src: f64,
}

impl Inductor {
    /// Create a new inductor carrying `i_init`.
    pub fn new(
        id: ElementId,
        name: String,
        nodes: [NodeId; 2],
        inductance: f64,
        resistance: f64,
        i_init: f64,
    ) -> Self {
        Self {
            id,
            name,
            nodes,
            inductance,
            resistance,
            i_src: i_init,
        }
    }

    /// Advance the current by one step given the terminal voltage.
    pub fn integrate(&mut self, v: f64, dt: f64) {
        let v_l = v + self.resistance * self.i_src;
        let di = -v_l / self.inductance * dt;
        self.i_src = accumulate_clamped(self.i_src, di);
    }
}
