//! Graph Snapshots
//!
//! A [`GraphValue`] is a plain copy of every node and edge at one instant. It
//! holds no references into the live graph, so any number of snapshots can be
//! kept around, compared, or shipped elsewhere, e.g. to step through a
//! sequence of evaluations in an external viewer.
//!
//! Node values are captured as their `Debug` rendering.

pub mod dot;

pub use dot::{DotOptions, UNEVALUATED};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::graph::NodeId;

/// Copy of the whole graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphValue {
    /// Nodes in creation order.
    pub nodes: Vec<NodeValue>,

    /// Edges grouped by `from` node (in creation order), each group in the
    /// order the edges were captured.
    pub edges: Vec<EdgeValue>,
}

/// Copy of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeValue {
    pub id: NodeId,
    pub name: String,
    pub potentially_dirty: bool,

    /// `Debug` rendering of the cached value; `None` if never evaluated.
    pub value: Option<String>,
}

/// Copy of one edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeValue {
    pub from: NodeId,
    pub to: NodeId,
    pub pending: bool,
}

impl GraphValue {
    /// Look up a node by id.
    pub fn node(&self, id: NodeId) -> Option<&NodeValue> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// Look up the first node with the given name.
    pub fn node_named(&self, name: &str) -> Option<&NodeValue> {
        self.nodes.iter().find(|node| node.name == name)
    }

    /// Edges into `id`, i.e. what it read during its last recompute.
    pub fn incoming(&self, id: NodeId) -> impl Iterator<Item = &EdgeValue> {
        self.edges.iter().filter(move |edge| edge.to == id)
    }

    /// Edges out of `id`.
    pub fn outgoing(&self, id: NodeId) -> impl Iterator<Item = &EdgeValue> {
        self.edges.iter().filter(move |edge| edge.from == id)
    }

    pub fn dirty_nodes(&self) -> impl Iterator<Item = &NodeValue> {
        self.nodes.iter().filter(|node| node.potentially_dirty)
    }

    pub fn pending_edges(&self) -> impl Iterator<Item = &EdgeValue> {
        self.edges.iter().filter(|edge| edge.pending)
    }

    /// Render as a DOT document.
    pub fn to_dot(&self) -> String {
        self.to_dot_with(&DotOptions::default())
    }

    /// Render as a DOT document with custom options.
    pub fn to_dot_with(&self, options: &DotOptions) -> String {
        let mut out = dot::header(options);
        for node in &self.nodes {
            dot::push_node(
                &mut out,
                options,
                node.id,
                &node.name,
                node.value.as_deref(),
                node.potentially_dirty,
            );
        }
        for edge in &self.edges {
            dot::push_edge(&mut out, edge.from, edge.to, edge.pending);
        }
        out.push('}');
        out
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Compact binary encoding for shipping snapshot sequences.
    pub fn to_msgpack(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}
