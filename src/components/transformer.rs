//! Transformer windings.
//!
//! A transformer is a group of windings sharing one name. One winding is the
//! primary and owns the core state ([`Magnetics`]); the rest are
//! secondaries pointing back at it. Two kinds exist:
//!
//! - Flux-linked (`T`): every winding is a Norton source whose current is
//!   set from a trial primary voltage. A bisection search picks the trial
//!   voltage for which the windings reproduce the stored core flux.
//! - Direct (`X`): the windings are coupled algebraically through mutual
//!   conductances, and the core is a single magnetizing-current constant.
//!
//! Turn ratios are relative to the primary's `N`.

use super::accumulate_clamped;
use crate::circuit::{ElementId, NodeId};

/// Core state owned by a primary winding.
#[derive(Debug, Clone)]
pub struct Magnetics {
    /// Inductance per turn squared
    pub lbase: f64,
    /// Lower bound of the flux-balance search
    pub v_min: f64,
    /// Upper bound of the flux-balance search
    pub v_max: f64,
    /// All windings of the group, primary included, in netlist order
    pub windings: Vec<ElementId>,
    /// Core flux (flux-linked kind)
    pub flux: f64,
    /// `sum((N_w / N_p)^2 / R_w)` over the group (direct kind)
    pub denom: f64,
    /// Magnetizing constant, the negated magnetizing current (direct kind)
    pub mag_const: f64,
    /// Magnetizing voltage of the last converged step (direct kind)
    pub v_m: f64,
}

impl Magnetics {
    /// Create a demagnetized core.
    pub fn new(lbase: f64, v_min: f64, v_max: f64) -> Self {
        Self {
            lbase,
            v_min,
            v_max,
            windings: Vec::new(),
            flux: 0.0,
            denom: 0.0,
            mag_const: 0.0,
            v_m: 0.0,
        }
    }

    /// Advance the flux of a flux-linked core by one step.
    ///
    /// `v_primary` is the internal voltage of the primary, `R_p * i_src_p`.
    pub fn integrate_flux(&mut self, v_primary: f64, n_primary: f64, dt: f64) {
        self.flux = accumulate_clamped(self.flux, v_primary * dt / n_primary);
    }

    /// Advance the magnetizing constant of a direct core by one step.
    ///
    /// `v_m` is the magnetizing voltage referred to the primary.
    pub fn integrate_direct(&mut self, v_m: f64, n_primary: f64, dt: f64) {
        self.v_m = v_m;
        let delta = -v_m * dt / self.inductance(n_primary);
        self.mag_const = accumulate_clamped(self.mag_const, delta);
    }

    /// Magnetizing inductance seen from a primary with `n_primary` turns.
    pub fn inductance(&self, n_primary: f64) -> f64 {
        self.lbase * n_primary * n_primary
    }
}

/// One transformer winding.
#[derive(Debug, Clone)]
pub struct Winding {
    pub id: ElementId,
    pub name: String,
    pub nodes: [NodeId; 2],
    /// Winding resistance
    pub resistance: f64,
    /// Number of turns
    pub turns: f64,
    /// Injected current (flux-linked kind)
    pub i_src: f64,
    /// Primary of the group; set when the circuit is finalized
    pub primary: Option<ElementId>,
    /// Core state, present on the primary only
    pub magnetics: Option<Magnetics>,
}

impl Winding {
    /// Create a primary winding owning `magnetics`.
    pub fn primary(
        id: ElementId,
        name: String,
        nodes: [NodeId; 2],
        resistance: f64,
        turns: f64,
        magnetics: Magnetics,
    ) -> Self {
        Self {
            id,
            name,
            nodes,
            resistance,
            turns,
            i_src: 0.0,
            primary: Some(id),
            magnetics: Some(magnetics),
        }
    }

    /// Create a secondary winding.
    pub fn secondary(
        id: ElementId,
        name: String,
        nodes: [NodeId; 2],
        resistance: f64,
        turns: f64,
    ) -> Self {
        Self {
            id,
            name,
            nodes,
            resistance,
            turns,
            i_src: 0.0,
            primary: None,
            magnetics: None,
        }
    }

    /// Check if this winding is the primary of its group.
    pub fn is_primary(&self) -> bool {
        self.magnetics.is_some()
    }

    /// Get the conductance of the winding resistance.
    pub fn conductance(&self) -> f64 {
        1.0 / self.resistance
    }

    /// Drive this winding from a primary voltage `v_primary`.
    pub fn apply_primary_voltage(&mut self, v_primary: f64, n_primary: f64) {
        self.i_src = v_primary / self.resistance * self.turns / n_primary;
    }

    /// Flux this winding contributes given its terminal voltage `v`.
    pub fn flux_contribution(&self, v: f64, lbase: f64) -> f64 {
        -(self.i_src - v / self.resistance) * lbase * self.turns
    }

    /// Current from n1 to n2 through a flux-linked winding.
    pub fn current(&self, v: f64) -> f64 {
        v / self.resistance - self.i_src
    }
}
