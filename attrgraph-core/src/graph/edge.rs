//! Graph Edges
//!
//! An edge records that `from` was read while `to` was being recomputed.
//! Edges are stored once, in the graph's edge table, and referenced by
//! [`EdgeId`] from both endpoints. Two reads of the same node produce two
//! distinct edges.

use super::node::NodeId;

/// Identity of a single edge. Never reused within one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(u64);

impl EdgeId {
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// A dependency link plus its staleness signal.
#[derive(Debug, Clone)]
pub(crate) struct Edge {
    /// The dependency.
    pub from: NodeId,

    /// The dependent.
    pub to: NodeId,

    /// The `from` value changed since `to` last incorporated it.
    pub pending: bool,
}

impl Edge {
    pub fn new(from: NodeId, to: NodeId) -> Self {
        Self {
            from,
            to,
            pending: false,
        }
    }
}
