//! Circuit topology representation and validation.
//!
//! This module provides the internal representation of a circuit after parsing.
//! Elements are added to a [`TopologyBuilder`]; once the topology is complete,
//! [`TopologyBuilder::finalize`] validates it and produces a [`Circuit`] that
//! holds all elements in an arena addressed by [`ElementId`].

mod topology;
mod types;
mod validate;

pub use topology::{Circuit, TopologyBuilder};
pub use types::*;
