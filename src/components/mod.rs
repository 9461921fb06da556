//! Element models for circuit simulation.
//!
//! This module provides models for all supported netlist elements:
//! - Linear: Resistor, Capacitor, Inductor
//! - Sources: Voltage Source (Norton form)
//! - Controls: Switch
//! - Nonlinear: threshold Diode, Shockley Diode
//! - Magnetics: flux-linked and algebraic transformer windings
//!
//! Every element carries an injected current `i_src`. Convention: positive
//! `i_src` flows from n2 to n1 inside the element, and the element voltage
//! is V(n1) - V(n2).

mod controls;
mod diode;
mod linear;
mod sources;
mod transformer;

pub use controls::Switch;
pub use diode::{Diode, ShockleyDiode, ShockleyParams};
pub use linear::{Capacitor, Inductor, Resistor};
pub use sources::VoltageSource;
pub use transformer::{Magnetics, Winding};

use crate::circuit::{ElementId, NodeId};
use crate::error::{Result, SimError};
use crate::netlist::{ElementDef, ElementType};

/// A circuit element.
#[derive(Debug, Clone)]
pub enum Element {
    Resistor(Resistor),
    Capacitor(Capacitor),
    Inductor(Inductor),
    Switch(Switch),
    VoltageSource(VoltageSource),
    Diode(Diode),
    ShockleyDiode(ShockleyDiode),
    Transformer(Winding),
    TransformerDirect(Winding),
}

impl Element {
    /// Create an element from a parsed netlist definition.
    ///
    /// Per-key value ranges were checked by the parser; this checks required
    /// keys and the rules that span several keys.
    pub fn from_def(id: ElementId, def: &ElementDef) -> Result<Self> {
        let name = def.name.clone();
        let nodes = [NodeId(def.nodes[0]), NodeId(def.nodes[1])];

        match def.element_type {
            ElementType::Resistor => Ok(Element::Resistor(Resistor::new(
                id,
                name,
                nodes,
                required(def, "R")?,
            ))),

            ElementType::Capacitor => Ok(Element::Capacitor(Capacitor::new(
                id,
                name,
                nodes,
                required(def, "R")?,
                required(def, "C")?,
                def.param("Vinit").unwrap_or(0.0),
            ))),

            ElementType::Inductor => Ok(Element::Inductor(Inductor::new(
                id,
                name,
                nodes,
                required(def, "L")?,
                def.param("R").unwrap_or(0.0),
                def.param("Iinit").unwrap_or(0.0),
            ))),

            ElementType::Switch => Ok(Element::Switch(Switch::new(
                id,
                name,
                nodes,
                required(def, "R")?,
            ))),

            ElementType::VoltageSource => Ok(Element::VoltageSource(VoltageSource::new(
                id,
                name,
                nodes,
                required(def, "R")?,
                required(def, "V")?,
            ))),

            ElementType::Diode => Ok(Element::Diode(Diode::new(
                id,
                name,
                nodes,
                required(def, "R")?,
                def.param("diode_threshold").unwrap_or(0.0),
                def.param("on_recalc").map(|v| v > 0.5),
            ))),

            ElementType::ShockleyDiode => {
                let defaults = ShockleyParams::default();
                let params = ShockleyParams {
                    vt: def.param("VT").unwrap_or(defaults.vt),
                    is: def.param("Is").unwrap_or(defaults.is),
                    i_accuracy: def.param("Iaccuracy").unwrap_or(defaults.i_accuracy),
                    v_max: def.param("Vmax").unwrap_or(defaults.v_max),
                };
                Ok(Element::ShockleyDiode(ShockleyDiode::new(
                    id,
                    name,
                    nodes,
                    def.param("R").unwrap_or(0.0),
                    params,
                )))
            }

            ElementType::Transformer | ElementType::TransformerDirect => {
                let winding = winding_from_def(id, def, nodes)?;
                if def.element_type == ElementType::Transformer {
                    Ok(Element::Transformer(winding))
                } else {
                    Ok(Element::TransformerDirect(winding))
                }
            }
        }
    }

    /// Get the element handle.
    pub fn id(&self) -> ElementId {
        match self {
            Element::Resistor(r) => r.id,
            Element::Capacitor(c) => c.id,
            Element::Inductor(l) => l.id,
            Element::Switch(s) => s.id,
            Element::VoltageSource(v) => v.id,
            Element::Diode(d) => d.id,
            Element::ShockleyDiode(d) => d.id,
            Element::Transformer(w) | Element::TransformerDirect(w) => w.id,
        }
    }

    /// Get the element name.
    pub fn name(&self) -> &str {
        match self {
            Element::Resistor(r) => &r.name,
            Element::Capacitor(c) => &c.name,
            Element::Inductor(l) => &l.name,
            Element::Switch(s) => &s.name,
            Element::VoltageSource(v) => &v.name,
            Element::Diode(d) => &d.name,
            Element::ShockleyDiode(d) => &d.name,
            Element::Transformer(w) | Element::TransformerDirect(w) => &w.name,
        }
    }

    /// Get the terminal nodes `[n1, n2]`.
    pub fn nodes(&self) -> [NodeId; 2] {
        match self {
            Element::Resistor(r) => r.nodes,
            Element::Capacitor(c) => c.nodes,
            Element::Inductor(l) => l.nodes,
            Element::Switch(s) => s.nodes,
            Element::VoltageSource(v) => v.nodes,
            Element::Diode(d) => d.nodes,
            Element::ShockleyDiode(d) => d.nodes,
            Element::Transformer(w) | Element::TransformerDirect(w) => w.nodes,
        }
    }

    /// Get the injected current.
    pub fn i_src(&self) -> f64 {
        match self {
            Element::Resistor(_) | Element::Switch(_) | Element::Diode(_) => 0.0,
            Element::Capacitor(c) => c.i_src,
            Element::Inductor(l) => l.i_src,
            Element::VoltageSource(v) => v.i_src,
            Element::ShockleyDiode(d) => d.i_src,
            Element::Transformer(w) | Element::TransformerDirect(w) => w.i_src,
        }
    }

    /// Get the netlist type of this element.
    pub fn element_type(&self) -> ElementType {
        match self {
            Element::Resistor(_) => ElementType::Resistor,
            Element::Capacitor(_) => ElementType::Capacitor,
            Element::Inductor(_) => ElementType::Inductor,
            Element::Switch(_) => ElementType::Switch,
            Element::VoltageSource(_) => ElementType::VoltageSource,
            Element::Diode(_) => ElementType::Diode,
            Element::ShockleyDiode(_) => ElementType::ShockleyDiode,
            Element::Transformer(_) => ElementType::Transformer,
            Element::TransformerDirect(_) => ElementType::TransformerDirect,
        }
    }

    /// Get the winding, for transformer elements of either kind.
    pub fn winding(&self) -> Option<&Winding> {
        match self {
            Element::Transformer(w) | Element::TransformerDirect(w) => Some(w),
            _ => None,
        }
    }

    /// Get the winding mutably, for transformer elements of either kind.
    pub fn winding_mut(&mut self) -> Option<&mut Winding> {
        match self {
            Element::Transformer(w) | Element::TransformerDirect(w) => Some(w),
            _ => None,
        }
    }

    /// Check if this element is a transformer primary winding.
    pub fn is_primary(&self) -> bool {
        self.winding().is_some_and(Winding::is_primary)
    }
}

fn required(def: &ElementDef, key: &str) -> Result<f64> {
    def.param(key)
        .ok_or_else(|| SimError::missing_parameter(&def.name, key))
}

fn winding_from_def(id: ElementId, def: &ElementDef, nodes: [NodeId; 2]) -> Result<Winding> {
    let resistance = required(def, "R")?;
    let turns = required(def, "N")?;
    let primary = def.param("primary").is_some_and(|v| v > 0.5);

    if !primary {
        for key in ["Lbase", "Vmin", "Vmax"] {
            if def.has(key) {
                return Err(SimError::invalid_parameter(
                    &def.name,
                    key,
                    "transformer secondary must not have it",
                ));
            }
        }
        return Ok(Winding::secondary(id, def.name.clone(), nodes, resistance, turns));
    }

    let lbase = required(def, "Lbase")?;
    // The flux-balance search needs a bracket; the algebraic kind does not
    let (v_min, v_max) = if def.element_type == ElementType::Transformer {
        (required(def, "Vmin")?, required(def, "Vmax")?)
    } else {
        (def.param("Vmin").unwrap_or(0.0), def.param("Vmax").unwrap_or(0.0))
    };

    Ok(Winding::primary(
        id,
        def.name.clone(),
        nodes,
        resistance,
        turns,
        Magnetics::new(lbase, v_min, v_max),
    ))
}

/// Add `delta` to `value`; a change of sign across zero lands on exactly zero.
///
/// Explicit Euler overshoot otherwise rings around zero.
pub(crate) fn accumulate_clamped(value: f64, delta: f64) -> f64 {
    let updated = value + delta;
    let old_sign = signum(value);
    let new_sign = signum(updated);
    if old_sign != 0 && new_sign != 0 && old_sign != new_sign {
        0.0
    } else {
        updated
    }
}

fn signum(x: f64) -> i32 {
    if x > 0.0 {
        1
    } else if x < 0.0 {
        -1
    } else {
        0
    }
}
