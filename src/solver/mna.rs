//! Nodal matrix assembly and solving.
//!
//! Every element is a Norton equivalent, so the system is the plain nodal
//! form `G v = i`: no branch rows are needed. Ground is eliminated; row `k`
//! belongs to node `k + 1`.

use nalgebra::{DMatrix, DVector, Dyn, LU};
use tracing::trace;

use crate::circuit::{Circuit, NodeId};
use crate::components::Element;
use crate::error::{Result, SimError};

/// The nodal system `G v = i` and its factorization.
#[derive(Debug, Clone)]
pub struct LinearSystem {
    size: usize,
    /// Conductance matrix
    g: DMatrix<f64>,
    /// Injected current vector
    isrc: DVector<f64>,
    /// Node voltages of the last solve
    v: DVector<f64>,
    lu: Option<LU<f64, Dyn, Dyn>>,
}

impl LinearSystem {
    /// Create a zeroed system for `size` non-ground nodes.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            g: DMatrix::zeros(size, size),
            isrc: DVector::zeros(size),
            v: DVector::zeros(size),
            lu: None,
        }
    }

    /// Matrix dimension.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The conductance matrix as last assembled.
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.g
    }

    /// The injected current vector as last assembled.
    pub fn sources(&self) -> &DVector<f64> {
        &self.isrc
    }

    /// Node voltages of the last solve.
    pub fn solution(&self) -> &DVector<f64> {
        &self.v
    }

    /// Zero the conductance matrix and drop the factorization.
    pub fn clear_matrix(&mut self) {
        self.g.fill(0.0);
        self.lu = None;
    }

    /// Zero the injected current vector.
    pub fn clear_sources(&mut self) {
        self.isrc.fill(0.0);
    }

    /// Stamp a conductance between two nodes.
    /// For a conductance G between nodes n1 and n2:
    ///   G[n1,n1] += G
    ///   G[n2,n2] += G
    ///   G[n1,n2] -= G
    ///   G[n2,n1] -= G
    pub fn stamp_conductance(&mut self, nodes: [NodeId; 2], g: f64) {
        let (n1, n2) = (nodes[0].index(), nodes[1].index());
        if let Some(i) = n1 {
            self.g[(i, i)] += g;
        }
        if let Some(j) = n2 {
            self.g[(j, j)] += g;
        }
        if let (Some(i), Some(j)) = (n1, n2) {
            self.g[(i, j)] -= g;
            self.g[(j, i)] -= g;
        }
    }

    /// Stamp a transconductance: current into the rows of `rows` driven by
    /// the voltage across `cols`.
    ///   G[r1,c1] += G   G[r2,c2] += G
    ///   G[r1,c2] -= G   G[r2,c1] -= G
    pub fn stamp_mutual(&mut self, rows: [NodeId; 2], cols: [NodeId; 2], g: f64) {
        let (r1, r2) = (rows[0].index(), rows[1].index());
        let (c1, c2) = (cols[0].index(), cols[1].index());
        if let (Some(r), Some(c)) = (r1, c1) {
            self.g[(r, c)] += g;
        }
        if let (Some(r), Some(c)) = (r2, c2) {
            self.g[(r, c)] += g;
        }
        if let (Some(r), Some(c)) = (r1, c2) {
            self.g[(r, c)] -= g;
        }
        if let (Some(r), Some(c)) = (r2, c1) {
            self.g[(r, c)] -= g;
        }
    }

    /// Inject a current flowing from n2 to n1 through the element.
    pub fn inject(&mut self, nodes: [NodeId; 2], current: f64) {
        if let Some(i) = nodes[0].index() {
            self.isrc[i] += current;
        }
        if let Some(j) = nodes[1].index() {
            self.isrc[j] -= current;
        }
    }

    /// LU-factorize the conductance matrix.
    pub fn factor(&mut self) -> Result<()> {
        let lu = self.g.clone().lu();
        if !lu.is_invertible() {
            self.lu = None;
            return Err(SimError::SingularMatrix);
        }
        self.lu = Some(lu);
        Ok(())
    }

    /// Whether a factorization is available.
    pub fn is_factored(&self) -> bool {
        self.lu.is_some()
    }

    /// Solve for the node voltages with the current factorization.
    pub fn solve(&mut self) -> Result<()> {
        let lu = self.lu.as_ref().ok_or(SimError::SolveFailed)?;
        self.v.copy_from(&self.isrc);
        if !lu.solve_mut(&mut self.v) {
            return Err(SimError::SolveFailed);
        }
        if self.v.iter().any(|x| !x.is_finite()) {
            return Err(SimError::SolveFailed);
        }
        Ok(())
    }

    /// Get the voltage at a node (0 for ground).
    pub fn voltage(&self, node: NodeId) -> f64 {
        node.index().map_or(0.0, |i| self.v[i])
    }

    /// Get the voltage V(n1) - V(n2).
    pub fn across(&self, nodes: [NodeId; 2]) -> f64 {
        self.voltage(nodes[0]) - self.voltage(nodes[1])
    }
}

/// Assemble the conductance matrix.
///
/// Shockley diodes are re-linearized at the voltages of the last solve as
/// they are stamped. Open switches and blocking diodes stamp
/// `open_conductance`.
pub fn stamp_conductances(circuit: &mut Circuit, system: &mut LinearSystem, open_conductance: f64) {
    system.clear_matrix();

    for element in circuit.elements.iter_mut() {
        match element {
            Element::Resistor(r) => system.stamp_conductance(r.nodes, r.conductance()),
            Element::Capacitor(c) => system.stamp_conductance(c.nodes, c.conductance()),
            // Pure current source
            Element::Inductor(_) => {}
            Element::Switch(s) => {
                system.stamp_conductance(s.nodes, s.conductance(open_conductance))
            }
            Element::VoltageSource(v) => system.stamp_conductance(v.nodes, v.conductance()),
            Element::Diode(d) => system.stamp_conductance(d.nodes, d.conductance(open_conductance)),
            Element::ShockleyDiode(d) => {
                let v = system.across(d.nodes);
                let g = d.relinearize(v);
                system.stamp_conductance(d.nodes, g);
            }
            Element::Transformer(w) | Element::TransformerDirect(w) => {
                system.stamp_conductance(w.nodes, w.conductance())
            }
        }
    }

    stamp_direct_coupling(circuit, system);
    trace!(size = system.size(), "conductance matrix assembled");
}

/// Mutual conductances between the windings of each direct transformer.
///
/// For windings j and k of a group with primary p:
///   G = -(N_j * N_k) / (R_j * R_k * N_p^2 * denom)
fn stamp_direct_coupling(circuit: &Circuit, system: &mut LinearSystem) {
    for element in &circuit.elements {
        let Element::TransformerDirect(primary) = element else {
            continue;
        };
        let Some(magnetics) = primary.magnetics.as_ref() else {
            continue;
        };
        let scale = primary.turns * primary.turns * magnetics.denom;

        for j in magnetics.windings.iter().filter_map(|id| circuit.element(*id).winding()) {
            for k in magnetics.windings.iter().filter_map(|id| circuit.element(*id).winding()) {
                let g = -(j.turns * k.turns) / (j.resistance * k.resistance * scale);
                system.stamp_mutual(j.nodes, k.nodes, g);
            }
        }
    }
}

/// Assemble the injected current vector.
///
/// Shockley diodes recompute their Norton current from the last
/// linearization. Direct transformer windings inject through their primary.
pub fn stamp_sources(circuit: &mut Circuit, system: &mut LinearSystem) {
    system.clear_sources();

    for element in circuit.elements.iter_mut() {
        match element {
            Element::ShockleyDiode(d) => {
                let i = d.update_norton_current();
                system.inject(d.nodes, i);
            }
            Element::TransformerDirect(_) => {}
            other => {
                let i = other.i_src();
                if i != 0.0 {
                    system.inject(other.nodes(), i);
                }
            }
        }
    }

    inject_direct_magnetizing(circuit, system);
}

/// Magnetizing current of each direct transformer, distributed over its
/// windings by turn ratio.
fn inject_direct_magnetizing(circuit: &Circuit, system: &mut LinearSystem) {
    for element in &circuit.elements {
        let Element::TransformerDirect(primary) = element else {
            continue;
        };
        let Some(magnetics) = primary.magnetics.as_ref() else {
            continue;
        };

        for w in magnetics.windings.iter().filter_map(|id| circuit.element(*id).winding()) {
            let i = (w.turns / primary.turns) / w.resistance * magnetics.mag_const / magnetics.denom;
            system.inject(w.nodes, i);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_divider_solve() {
        // 1 A into node 1; 1 ohm from 1 to 2, 1 ohm from 2 to ground
        let mut sys = LinearSystem::new(2);
        sys.stamp_conductance([NodeId(1), NodeId(2)], 1.0);
        sys.stamp_conductance([NodeId(2), NodeId::GROUND], 1.0);
        sys.inject([NodeId(1), NodeId::GROUND], 1.0);
        sys.factor().unwrap();
        sys.solve().unwrap();
        assert_relative_eq!(sys.voltage(NodeId(1)), 2.0, epsilon = 1e-12);
        assert_relative_eq!(sys.voltage(NodeId(2)), 1.0, epsilon = 1e-12);
        assert_relative_eq!(sys.across([NodeId(1), NodeId(2)]), 1.0, epsilon = 1e-12);
        assert_eq!(sys.voltage(NodeId::GROUND), 0.0);
    }

    #[test]
    fn test_floating_node_is_singular() {
        let mut sys = LinearSystem::new(2);
        sys.stamp_conductance([NodeId(1), NodeId::GROUND], 1.0);
        assert!(matches!(sys.factor(), Err(SimError::SingularMatrix)));
        assert!(!sys.is_factored());
    }

    #[test]
    fn test_solve_without_factor() {
        let mut sys = LinearSystem::new(1);
        assert!(matches!(sys.solve(), Err(SimError::SolveFailed)));
    }

    #[test]
    fn test_mutual_stamp_pattern() {
        let mut sys = LinearSystem::new(4);
        sys.stamp_mutual([NodeId(1), NodeId(2)], [NodeId(3), NodeId(4)], 0.5);
        let g = sys.matrix();
        assert_eq!(g[(0, 2)], 0.5);
        assert_eq!(g[(1, 3)], 0.5);
        assert_eq!(g[(0, 3)], -0.5);
        assert_eq!(g[(1, 2)], -0.5);
        // Not symmetric by itself
        assert_eq!(g[(2, 0)], 0.0);

        let mut sys = LinearSystem::new(1);
        sys.stamp_mutual([NodeId(1), NodeId::GROUND], [NodeId(1), NodeId::GROUND], 0.5);
        assert_eq!(sys.matrix()[(0, 0)], 0.5);
    }

    #[test]
    fn test_stamp_circuit() {
        let mut circuit = Circuit::parse(
            "\
1 0 V1 V=10 R=2
1 2 S1 R=1
2 0 L1 L=1m Iinit=0.5
2 0 D1 R=4
",
        )
        .unwrap();
        let mut sys = LinearSystem::new(circuit.node_count);
        stamp_conductances(&mut circuit, &mut sys, 1e-9);
        stamp_sources(&mut circuit, &mut sys);

        let g = sys.matrix();
        assert_relative_eq!(g[(0, 0)], 0.5 + 1.0);
        assert_relative_eq!(g[(0, 1)], -1.0);
        assert_relative_eq!(g[(1, 1)], 1.0 + 0.25);
        assert_relative_eq!(sys.sources()[0], 5.0);
        assert_relative_eq!(sys.sources()[1], 0.5);
    }

    #[test]
    fn test_direct_transformer_stamp() {
        let mut circuit = Circuit::parse(
            "\
1 0 X1 R=1 N=1 primary=1 Lbase=1m
2 0 X1 R=1 N=2
",
        )
        .unwrap();
        let mut sys = LinearSystem::new(circuit.node_count);
        stamp_conductances(&mut circuit, &mut sys, 1e-9);
        // denom = 1 + 4 = 5
        let g = sys.matrix();
        assert_relative_eq!(g[(0, 0)], 1.0 - 1.0 / 5.0);
        assert_relative_eq!(g[(0, 1)], -2.0 / 5.0);
        assert_relative_eq!(g[(1, 0)], -2.0 / 5.0);
        assert_relative_eq!(g[(1, 1)], 1.0 - 4.0 / 5.0);
    }
}
