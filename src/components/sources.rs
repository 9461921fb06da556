//! Voltage sources.

use crate::circuit::{ElementId, NodeId};

/// A voltage source with series resistance.
///
/// Stamped in Norton form: conductance 1/R and injected current V/R, so no
/// extra branch row is needed in the conductance matrix.
#[derive(Debug, Clone)]
pub struct VoltageSource {
    pub id: ElementId,
    pub name: String,
    pub nodes: [NodeId; 2],
    pub resistance: f64,
    pub voltage: f64,
    /// Injected current, `V / R`
    pub i_src: f64,
}

impl VoltageSource {
    /// Create a new voltage source.
    pub fn new(
        id: ElementId,
        name: String,
        nodes: [NodeId; 2],
        resistance: f64,
        voltage: f64,
    ) -> Self {
        Self {
            id,
            name,
            nodes,
            resistance,
            voltage,
            i_src: voltage / resistance,
        }
    }

    /// Set the source voltage.
    pub fn set_voltage(&mut self, voltage: f64) {
        self.voltage = voltage;
        self.i_src = voltage / self.resistance;
    }

    /// Get the conductance of the series resistance.
    pub fn conductance(&self) -> f64 {
        1.0 / self.resistance
    }

    /// Current delivered out of n1 given the terminal voltage V(n1) - V(n2).
    pub fn current(&self, v: f64) -> f64 {
        (self.voltage - v) / self.resistance
    }
}
