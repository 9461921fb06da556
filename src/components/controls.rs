//! Externally controlled switch.

use crate::circuit::{ElementId, NodeId};

/// A switch component.
///
/// Modeled as a resistance:
/// - Closed: its on-resistance R
/// - Open: the simulator's open conductance (1e-9 S by default)
///
/// Switches start closed.
#[derive(Debug, Clone)]
pub struct Switch {
    pub id: ElementId,
    pub name: String,
    pub nodes: [NodeId; 2],
    /// On-resistance
    pub resistance: f64,
    pub closed: bool,
}

impl Switch {
    /// Create a new, closed switch.
    pub fn new(id: ElementId, name: String, nodes: [NodeId; 2], resistance: f64) -> Self {
        Self {
            id,
            name,
            nodes,
            resistance,
            closed: true,
        }
    }

    /// Get the current conductance.
    pub fn conductance(&self, open_conductance: f64) -> f64 {
        if self.closed {
            1.0 / self.resistance
        } else {
            open_conductance
        }
    }

    /// Set the switch state. Returns whether it changed.
    pub fn set_closed(&mut self, closed: bool) -> bool {
        let changed = self.closed != closed;
        self.closed = closed;
        changed
    }
}
