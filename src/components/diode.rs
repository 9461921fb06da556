//! Diode models.
//!
//! Two models are supported:
//! - [`Diode`]: an ideal switch with on-resistance, toggled by the sign of
//!   its terminal voltage against a threshold.
//! - [`ShockleyDiode`]: the exponential law
//!     I = Is * (exp(V / VT) - 1)
//!   with optional series resistance, linearized around an operating point
//!   and re-linearized until the linear and exponential currents agree.

use crate::circuit::{ElementId, NodeId};

/// Largest change of the Shockley operating point per iteration, in volts.
const MAX_OPERATING_STEP: f64 = 0.1;

/// A threshold (ideal) diode.
///
/// Conducting: conductance 1/R. Blocking: the simulator's open conductance.
/// Diodes start conducting.
#[derive(Debug, Clone)]
pub struct Diode {
    pub id: ElementId,
    pub name: String,
    pub nodes: [NodeId; 2], // [anode, cathode]
    /// On-resistance
    pub resistance: f64,
    /// Voltage magnitude that must be exceeded to toggle
    pub threshold: f64,
    /// State forced during the fallback convergence pass, if any
    pub on_recalc: Option<bool>,
    pub conducting: bool,
}

impl Diode {
    /// Create a new, conducting diode.
    pub fn new(
        id: ElementId,
        name: String,
        nodes: [NodeId; 2],
        resistance: f64,
        threshold: f64,
        on_recalc: Option<bool>,
    ) -> Self {
        Self {
            id,
            name,
            nodes,
            resistance,
            threshold,
            on_recalc,
            conducting: true,
        }
    }

    /// Get the current conductance.
    pub fn conductance(&self, open_conductance: f64) -> f64 {
        if self.conducting {
            1.0 / self.resistance
        } else {
            open_conductance
        }
    }

    /// Update the conduction state from the terminal voltage.
    ///
    /// In the fallback pass a diode with an `on_recalc` hint is pinned to
    /// that state instead. Returns whether the state changed.
    pub fn update_state(&mut self, v: f64, fallback: bool) -> bool {
        if fallback {
            if let Some(forced) = self.on_recalc {
                let changed = self.conducting != forced;
                self.conducting = forced;
                return changed;
            }
        }

        if self.conducting && v < -self.threshold {
            self.conducting = false;
            true
        } else if !self.conducting && v > self.threshold {
            self.conducting = true;
            true
        } else {
            false
        }
    }
}

/// Parameters for the Shockley diode model.
#[derive(Debug, Clone, Copy)]
pub struct ShockleyParams {
    /// Thermal voltage
    pub vt: f64,
    /// Saturation current
    pub is: f64,
    /// Allowed mismatch between linear and exponential current
    pub i_accuracy: f64,
    /// Upper limit of the linearization voltage
    pub v_max: f64,
}

impl Default for ShockleyParams {
    fn default() -> Self {
        Self {
            vt: 26e-3,
            is: 1e-12,
            i_accuracy: 1e-6,
            v_max: 1.5,
        }
    }
}

/// An exponential-law diode with optional series resistance.
///
/// The diode is replaced by its tangent at `v_lin`: a conductance `g_diode`
/// in parallel with an injected current. Together with the series
/// resistance this collapses to one conductance `g_total` and one injected
/// current `i_src`.
#[derive(Debug, Clone)]
pub struct ShockleyDiode {
    pub id: ElementId,
    pub name: String,
    pub nodes: [NodeId; 2], // [anode, cathode]
    /// Series resistance, may be zero
    pub resistance: f64,
    pub params: ShockleyParams,
    pub i_src: f64,
    /// Operating point across the junction
    pub v_diode: f64,
    /// Linearization voltage of the last stamp
    pub v_lin: f64,
    /// `exp(v_lin / VT)` of the last stamp
    pub expval: f64,
    /// Linear-model current at the last stamp
    pub i_model: f64,
    pub g_diode: f64,
    pub g_total: f64,
}

impl ShockleyDiode {
    /// Create a new Shockley diode linearized at 0 V.
    pub fn new(
        id: ElementId,
        name: String,
        nodes: [NodeId; 2],
        resistance: f64,
        params: ShockleyParams,
    ) -> Self {
        let g_diode = params.is / params.vt;
        Self {
            id,
            name,
            nodes,
            resistance,
            params,
            i_src: 0.0,
            v_diode: 0.0,
            v_lin: 0.0,
            expval: 1.0,
            i_model: 0.0,
            g_diode,
            g_total: series(g_diode, resistance),
        }
    }

    /// Current through the linear model at terminal voltage `v`.
    pub fn linear_current(&self, v: f64) -> f64 {
        v * self.g_total - self.i_src
    }

    /// Current of the exponential law at junction voltage `v`.
    pub fn shockley_current(&self, v: f64) -> f64 {
        self.params.is * ((v / self.params.vt).exp() - 1.0)
    }

    /// Move the linearization point given the terminal voltage `v`.
    ///
    /// The junction voltage may move at most 0.1 V away from the operating
    /// point and never above `v_max`. Returns the new `g_total`.
    pub fn relinearize(&mut self, v: f64) -> f64 {
        self.i_model = self.linear_current(v);
        let mut v_lin = v - self.resistance * self.i_model;

        if v_lin > 0.0 {
            let upper = (self.v_diode + MAX_OPERATING_STEP).max(0.0);
            let lower = self.v_diode - MAX_OPERATING_STEP;
            if v_lin > upper {
                v_lin = upper;
            } else if v_lin < lower {
                v_lin = lower;
            }
        }
        v_lin = v_lin.min(self.params.v_max);

        self.v_lin = v_lin;
        self.expval = (v_lin / self.params.vt).exp();
        self.g_diode = self.params.is / self.params.vt * self.expval;
        self.g_total = series(self.g_diode, self.resistance);
        self.g_total
    }

    /// Recompute the injected current from the last linearization.
    pub fn update_norton_current(&mut self) -> f64 {
        let ShockleyParams { vt, is, .. } = self.params;
        let mut i_src = is * (1.0 + (self.v_lin / vt - 1.0) * self.expval);
        if self.g_diode != 0.0 {
            i_src *= self.g_total / self.g_diode;
        }
        self.i_src = i_src;
        i_src
    }

    /// Step the operating point toward the solved junction voltage and
    /// compare the linear current with the exponential law.
    ///
    /// Returns true when they disagree by more than `i_accuracy`.
    pub fn needs_relinearization(&mut self, v: f64) -> bool {
        let i_linear = self.linear_current(v);
        let v_d = v - self.resistance * i_linear;

        if v_d < 0.0 {
            self.v_diode = v_d;
        } else if v_d > self.v_diode + MAX_OPERATING_STEP {
            self.v_diode = (self.v_diode + MAX_OPERATING_STEP).max(0.0);
        } else if v_d < self.v_diode - MAX_OPERATING_STEP {
            self.v_diode -= MAX_OPERATING_STEP;
        } else {
            self.v_diode = v_d;
        }

        (self.shockley_current(v_d) - i_linear).abs() > self.params.i_accuracy
    }

    /// Record the converged junction voltage.
    pub fn settle(&mut self, v: f64) {
        self.v_diode = v - self.resistance * self.linear_current(v);
    }
}

/// Conductance of `g` in series with resistance `r`.
fn series(g: f64, r: f64) -> f64 {
    1.0 / (1.0 / g + r)
}
