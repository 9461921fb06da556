//! Circuit topology: the element arena and its builder.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use super::types::{ElementId, NodeId};
use super::validate;
use crate::components::{Element, Winding};
use crate::error::{Result, SimError};
use crate::netlist::{self, ElementDef, Netlist};

/// Collects elements until the topology is complete.
///
/// Elements may be added from netlist text or one definition at a time.
/// [`TopologyBuilder::finalize`] checks the whole-circuit rules and links
/// transformer windings to their primaries.
#[derive(Debug, Default)]
pub struct TopologyBuilder {
    elements: Vec<Element>,
    nodes: BTreeSet<usize>,
}

impl TopologyBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse netlist text and add every element in it.
    pub fn load(&mut self, text: &str) -> Result<&mut Self> {
        let netlist = netlist::parse(text)?;
        self.load_netlist(&netlist)?;
        Ok(self)
    }

    /// Add every element of a parsed netlist.
    pub fn load_netlist(&mut self, netlist: &Netlist) -> Result<()> {
        for def in &netlist.elements {
            self.add(def)?;
        }
        Ok(())
    }

    /// Add one element definition.
    pub fn add(&mut self, def: &ElementDef) -> Result<ElementId> {
        validate::check_name_available(&self.elements, def)?;

        let id = ElementId(self.elements.len());
        let element = Element::from_def(id, def)?;

        self.nodes.extend(def.nodes);

        debug!(name = %def.name, %id, kind = def.element_type.describe(), "element added");
        self.elements.push(element);
        Ok(id)
    }

    /// Number of elements added so far.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether no element has been added yet.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Check the complete topology and build the circuit.
    pub fn finalize(self) -> Result<Circuit> {
        let Self {
            mut elements,
            nodes,
        } = self;

        let node_count = validate::check_dense_nodes(&nodes)?;
        let flux_primary = validate::check_single_flux_transformer(&elements)?;
        validate::link_transformer_groups(&mut elements)?;
        validate::compute_direct_denominators(&mut elements);

        let names = elements
            .iter()
            .filter(|e| e.winding().map_or(true, Winding::is_primary))
            .map(|e| (e.name().to_string(), e.id()))
            .collect::<HashMap<_, _>>();
        let has_shockley = elements
            .iter()
            .any(|e| matches!(e, Element::ShockleyDiode(_)));

        debug!(
            elements = elements.len(),
            nodes = node_count,
            has_shockley,
            "topology finalized"
        );

        Ok(Circuit {
            elements,
            node_count,
            names,
            flux_primary,
            has_shockley,
        })
    }
}

/// A complete circuit ready for simulation.
#[derive(Debug, Clone)]
pub struct Circuit {
    /// All elements, indexed by [`ElementId`]
    pub elements: Vec<Element>,

    /// Number of non-ground nodes; the conductance matrix is this square
    pub node_count: usize,

    /// Element names to handles; transformer names map to the primary
    names: HashMap<String, ElementId>,

    /// Primary of the flux-linked transformer, if there is one
    pub flux_primary: Option<ElementId>,

    /// Whether any Shockley diode is present
    pub has_shockley: bool,
}

impl Circuit {
    /// Parse netlist text and build a circuit from it.
    pub fn parse(text: &str) -> Result<Self> {
        let mut builder = TopologyBuilder::new();
        builder.load(text)?;
        builder.finalize()
    }

    /// Build a circuit from a parsed netlist.
    pub fn from_netlist(netlist: &Netlist) -> Result<Self> {
        let mut builder = TopologyBuilder::new();
        builder.load_netlist(netlist)?;
        builder.finalize()
    }

    /// Look up an element handle by name.
    pub fn find(&self, name: &str) -> Option<ElementId> {
        self.names.get(name).copied()
    }

    /// Look up an element by name, failing with a lookup error.
    pub fn lookup(&self, name: &str) -> Result<ElementId> {
        self.find(name).ok_or_else(|| SimError::ElementNotFound {
            name: name.to_string(),
        })
    }

    /// Get an element by handle.
    pub fn element(&self, id: ElementId) -> &Element {
        &self.elements[id.0]
    }

    /// Get an element mutably by handle.
    pub fn element_mut(&mut self, id: ElementId) -> &mut Element {
        &mut self.elements[id.0]
    }

    /// Winding handles of the transformer whose primary is `primary`.
    ///
    /// Empty when `primary` is not a primary winding.
    pub fn windings(&self, primary: ElementId) -> &[ElementId] {
        self.element(primary)
            .winding()
            .and_then(|w| w.magnetics.as_ref())
            .map(|m| m.windings.as_slice())
            .unwrap_or(&[])
    }

    /// Iterate over the nodes of the circuit, ground excluded.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> {
        (1..=self.node_count).map(NodeId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_builder_incremental() {
        let netlist = netlist::parse("1 0 V1 V=10 R=1\n1 2 R1 R=10\n2 0 R2 R=10").unwrap();
        let mut builder = TopologyBuilder::new();
        for def in &netlist.elements {
            builder.add(def).unwrap();
        }
        assert_eq!(builder.len(), 3);
        let circuit = builder.finalize().unwrap();
        assert_eq!(circuit.node_count, 2);
        assert_eq!(circuit.find("R2"), Some(ElementId(2)));
        assert_eq!(circuit.find("R9"), None);
        assert!(!circuit.has_shockley);
        assert_eq!(circuit.nodes().collect::<Vec<_>>(), vec![NodeId(1), NodeId(2)]);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let err = Circuit::parse("1 0 R1 R=1\n1 0 R1 R=2").unwrap_err();
        assert!(matches!(err, SimError::DuplicateElement { .. }));
    }

    #[test]
    fn test_node_gap_rejected() {
        let err = Circuit::parse("1 0 R1 R=1\n1 2 R2 R=1\n2 5 R3 R=1").unwrap_err();
        assert!(matches!(err, SimError::NodeNotSeen { node: 3 }));
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_huge_node_number_rejected() {
        let err = Circuit::parse("4000000000 0 R1 R=1\n1 0 R2 R=1").unwrap_err();
        assert!(matches!(err, SimError::NodeNotSeen { node: 2 }));
    }

    #[test]
    fn test_empty_circuit_rejected() {
        let err = Circuit::parse("# nothing here\n").unwrap_err();
        assert!(matches!(err, SimError::TooFewNodes));
    }

    #[test]
    fn test_transformer_group_linking() {
        let circuit = Circuit::parse(
            "\
1 0 V1 V=10 R=0.01
1 0 T1 R=0.01 N=1 primary=1 Lbase=1m Vmin=-100 Vmax=100
2 0 T1 R=0.01 N=2
3 0 T1 R=0.02 N=3
2 0 RL R=10
3 0 RL2 R=10
",
        )
        .unwrap();
        let primary = circuit.find("T1").unwrap();
        assert_eq!(primary, ElementId(1));
        assert_eq!(circuit.flux_primary, Some(primary));
        assert_eq!(
            circuit.windings(primary),
            &[ElementId(1), ElementId(2), ElementId(3)]
        );
        for id in circuit.windings(primary) {
            let winding = circuit.element(*id).winding().unwrap();
            assert_eq!(winding.primary, Some(primary));
        }
        assert!(circuit.windings(ElementId(0)).is_empty());
    }

    #[test]
    fn test_second_flux_transformer_rejected() {
        let err = Circuit::parse(
            "\
1 0 T1 R=1 N=1 primary=1 Lbase=1m Vmin=-1 Vmax=1
2 0 T2 R=1 N=1 primary=1 Lbase=1m Vmin=-1 Vmax=1
",
        )
        .unwrap_err();
        assert!(matches!(err, SimError::InvalidTopology { .. }));
    }

    #[test]
    fn test_secondary_without_primary_rejected() {
        let err = Circuit::parse("1 0 R1 R=1\n1 0 X1 R=1 N=2\n").unwrap_err();
        assert!(matches!(err, SimError::InvalidTopology { .. }));
    }

    #[test]
    fn test_winding_name_rules() {
        // Two primaries of one name
        let err = Circuit::parse(
            "\
1 0 X1 R=1 N=1 primary=1 Lbase=1m
2 0 X1 R=1 N=1 primary=1 Lbase=1m
",
        )
        .unwrap_err();
        assert!(matches!(err, SimError::DuplicateElement { .. }));

        // Secondaries may precede their primary
        let circuit = Circuit::parse(
            "\
2 0 X1 R=1 N=2
1 0 X1 R=1 N=1 primary=1 Lbase=1m
",
        )
        .unwrap();
        assert_eq!(circuit.find("X1"), Some(ElementId(1)));
        assert_eq!(circuit.windings(ElementId(1)), &[ElementId(0), ElementId(1)]);
    }

    #[test]
    fn test_direct_denominator() {
        let circuit = Circuit::parse(
            "\
1 0 X1 R=0.5 N=1 primary=1 Lbase=1m
2 0 X1 R=2 N=2
",
        )
        .unwrap();
        let primary = circuit.find("X1").unwrap();
        let magnetics = circuit
            .element(primary)
            .winding()
            .and_then(|w| w.magnetics.as_ref())
            .unwrap();
        // 1/0.5 + 4/2
        assert!((magnetics.denom - 4.0).abs() < 1e-12);
        assert_eq!(circuit.flux_primary, None);
    }
}
