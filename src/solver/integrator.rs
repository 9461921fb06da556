//! Explicit Euler update of the reactive state after a converged solve.

use super::mna::LinearSystem;
use crate::circuit::{Circuit, ElementId};
use crate::components::{Element, Winding};

/// Advance every energy-storing element by `dt` using the converged node
/// voltages: inductors, capacitors, the flux-linked core and every direct
/// core.
pub fn integrate(circuit: &mut Circuit, system: &LinearSystem, dt: f64) {
    for element in circuit.elements.iter_mut() {
        match element {
            Element::Inductor(l) => l.integrate(system.across(l.nodes), dt),
            Element::Capacitor(c) => c.integrate(system.across(c.nodes), dt),
            _ => {}
        }
    }

    if let Some(primary) = circuit.flux_primary {
        integrate_flux(circuit, primary, dt);
    }
    integrate_direct_cores(circuit, system, dt);
}

/// The flux moves by the primary's internal voltage, `R_p * i_src_p`.
fn integrate_flux(circuit: &mut Circuit, primary: ElementId, dt: f64) {
    if let Some(w) = circuit.element_mut(primary).winding_mut() {
        let v_primary = w.resistance * w.i_src;
        let turns = w.turns;
        if let Some(m) = w.magnetics.as_mut() {
            m.integrate_flux(v_primary, turns, dt);
        }
    }
}

fn integrate_direct_cores(circuit: &mut Circuit, system: &LinearSystem, dt: f64) {
    let updates: Vec<(ElementId, f64)> = circuit
        .elements
        .iter()
        .filter_map(|e| match e {
            Element::TransformerDirect(p) if p.is_primary() => {
                Some((p.id, magnetizing_voltage(circuit, system, p)))
            }
            _ => None,
        })
        .collect();

    for (primary, v_m) in updates {
        if let Some(w) = circuit.element_mut(primary).winding_mut() {
            let turns = w.turns;
            if let Some(m) = w.magnetics.as_mut() {
                m.integrate_direct(v_m, turns, dt);
            }
        }
    }
}

/// Magnetizing voltage of a direct transformer, referred to its primary:
///   V_m = (mag_const + sum(V_w / R_w * N_w / N_p)) / denom
pub fn magnetizing_voltage(circuit: &Circuit, system: &LinearSystem, primary: &Winding) -> f64 {
    let Some(m) = primary.magnetics.as_ref() else {
        return 0.0;
    };
    let driven: f64 = m
        .windings
        .iter()
        .filter_map(|id| circuit.element(*id).winding())
        .map(|w| system.across(w.nodes) / w.resistance * w.turns / primary.turns)
        .sum();
    (m.mag_const + driven) / m.denom
}
