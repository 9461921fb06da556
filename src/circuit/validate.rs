//! Circuit validation.
//!
//! Checks that span more than one element: name uniqueness, dense node
//! numbering, and transformer grouping.

use std::collections::BTreeSet;

use tracing::trace;

use super::types::ElementId;
use crate::components::Element;
use crate::error::{Result, SimError};
use crate::netlist::{ElementDef, ElementType};

/// Check that `def` may use its name given the elements added so far.
///
/// Windings of one transformer share a name; only one of them may be the
/// primary. Every other name must be unique.
pub fn check_name_available(elements: &[Element], def: &ElementDef) -> Result<()> {
    let def_is_primary = def.param("primary").is_some_and(|v| v > 0.5);

    for existing in elements.iter().filter(|e| e.name() == def.name) {
        let same_kind = existing.element_type() == def.element_type;
        let shareable = def.element_type.is_winding()
            && same_kind
            && !(existing.is_primary() && def_is_primary);
        if !shareable {
            return Err(SimError::DuplicateElement {
                name: def.name.clone(),
            });
        }
    }
    Ok(())
}

/// Check that every node from 0 to the highest referenced one is used.
///
/// Returns the number of non-ground nodes.
pub fn check_dense_nodes(nodes: &BTreeSet<usize>) -> Result<usize> {
    if nodes.len() < 2 {
        return Err(SimError::TooFewNodes);
    }
    // Sorted and distinct: dense exactly when the i-th node is i
    if let Some(node) = (0..).zip(nodes).find_map(|(i, &n)| (i != n).then_some(i)) {
        return Err(SimError::NodeNotSeen { node });
    }
    Ok(nodes.len() - 1)
}

/// Check that at most one flux-linked transformer exists and return its primary.
pub fn check_single_flux_transformer(elements: &[Element]) -> Result<Option<ElementId>> {
    let mut primaries = elements
        .iter()
        .filter(|e| e.element_type() == ElementType::Transformer && e.is_primary());

    let first = primaries.next();
    if let (Some(first), Some(second)) = (first, primaries.next()) {
        return Err(SimError::topology(format!(
            "only one flux-linked transformer is supported, found '{}' and '{}'",
            first.name(),
            second.name()
        )));
    }
    Ok(first.map(Element::id))
}

/// Point every winding at the primary of its group and give each primary
/// the list of its windings.
pub fn link_transformer_groups(elements: &mut [Element]) -> Result<()> {
    let mut links = Vec::new();

    for element in elements.iter() {
        let Some(winding) = element.winding() else {
            continue;
        };
        let kind = element.element_type();
        let primary = elements
            .iter()
            .find(|e| e.element_type() == kind && e.is_primary() && e.name() == winding.name)
            .ok_or_else(|| {
                SimError::topology(format!(
                    "{} '{}' has no primary winding",
                    kind.describe(),
                    winding.name
                ))
            })?;
        links.push((element.id(), primary.id()));
    }

    for (winding, primary) in links {
        trace!(%winding, %primary, "linking winding");
        if let Some(w) = elements[winding.0].winding_mut() {
            w.primary = Some(primary);
        }
        if let Some(m) = elements[primary.0]
            .winding_mut()
            .and_then(|w| w.magnetics.as_mut())
        {
            m.windings.push(winding);
        }
    }
    Ok(())
}

/// Compute `sum((N_w / N_p)^2 / R_w)` for every direct transformer.
pub fn compute_direct_denominators(elements: &mut [Element]) {
    let denominators: Vec<(ElementId, f64)> = elements
        .iter()
        .filter_map(|e| match e {
            Element::TransformerDirect(p) => p.magnetics.as_ref().map(|m| (p, m)),
            _ => None,
        })
        .map(|(p, m)| {
            let denom: f64 = m
                .windings
                .iter()
                .filter_map(|id| elements[id.0].winding())
                .map(|w| (w.turns / p.turns).powi(2) / w.resistance)
                .sum();
            (p.id, denom)
        })
        .collect();

    for (primary, denom) in denominators {
        if let Some(m) = elements[primary.0]
            .winding_mut()
            .and_then(|w| w.magnetics.as_mut())
        {
            m.denom = denom;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(nodes: &[usize]) -> BTreeSet<usize> {
        nodes.iter().copied().collect()
    }

    #[test]
    fn test_dense_nodes() {
        assert_eq!(check_dense_nodes(&set(&[0, 1, 2])).unwrap(), 2);
        assert!(matches!(
            check_dense_nodes(&set(&[0, 1, 3])),
            Err(SimError::NodeNotSeen { node: 2 })
        ));
        assert!(matches!(check_dense_nodes(&set(&[])), Err(SimError::TooFewNodes)));
        assert!(matches!(check_dense_nodes(&set(&[0])), Err(SimError::TooFewNodes)));
        // Ground never referenced
        assert!(matches!(
            check_dense_nodes(&set(&[1, 2])),
            Err(SimError::NodeNotSeen { node: 0 })
        ));
        assert!(matches!(
            check_dense_nodes(&set(&[0, 1, usize::MAX])),
            Err(SimError::NodeNotSeen { node: 2 })
        ));
    }
}
