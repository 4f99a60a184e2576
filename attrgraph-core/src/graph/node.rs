//! Graph Nodes
//!
//! This module defines node identity, the type-independent node record kept
//! in the graph arena, and the typed [`Node`] handle clients hold.

use std::fmt::{self, Debug};
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::cell::{AnyCell, ValueCell};
use super::edge::EdgeId;
use super::GraphInner;
use crate::error::{fatal, GraphError, Result};

/// Unique identifier for a node in its graph.
///
/// Node ids are arena indices. Nodes are never removed, so an id is never
/// reused for the lifetime of the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn from_index(index: usize) -> Self {
        let raw = u32::try_from(index).unwrap_or_else(|_| panic!("graph exceeded {} nodes", u32::MAX));
        Self(raw)
    }

    /// Position of the node in creation order.
    pub fn index(&self) -> usize {
        self.0 as usize
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Externally written value. Never has a rule or incoming edges.
    Source,

    /// Value computed by a rule from other nodes. Never written directly.
    Derived,
}

/// Type-independent state of one node, owned by the graph arena.
pub(crate) struct NodeRecord {
    pub name: String,
    pub kind: NodeKind,

    /// Conservative "cached value may be stale" marker.
    pub potentially_dirty: bool,

    /// Set for the dynamic extent of this node's own validation.
    pub in_progress: bool,

    /// Edges whose `to` is this node, i.e. what the last recompute read.
    pub incoming: SmallVec<[EdgeId; 4]>,

    /// Edges whose `from` is this node.
    pub outgoing: Vec<EdgeId>,

    pub cell: Rc<dyn AnyCell>,
}

impl NodeRecord {
    pub fn new(name: String, kind: NodeKind, cell: Rc<dyn AnyCell>) -> Self {
        Self {
            name,
            kind,
            potentially_dirty: false,
            in_progress: false,
            incoming: SmallVec::new(),
            outgoing: Vec::new(),
            cell,
        }
    }
}

/// Typed handle to a node.
///
/// Handles are cheap to clone and are meant to be captured by the rules of
/// other nodes. A handle does not keep its graph alive.
pub struct Node<T> {
    graph: Weak<GraphInner>,
    id: NodeId,
    _value: PhantomData<fn() -> T>,
}

impl<T> Node<T>
where
    T: Debug + 'static,
{
    pub(crate) fn new(graph: Weak<GraphInner>, id: NodeId) -> Self {
        Self {
            graph,
            id,
            _value: PhantomData,
        }
    }

    fn graph(&self) -> Rc<GraphInner> {
        self.graph
            .upgrade()
            .unwrap_or_else(|| fatal(GraphError::GraphDropped))
    }

    /// Get the node's ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get the node's diagnostic name.
    pub fn name(&self) -> String {
        self.graph().name_of(self.id)
    }

    /// Get the node's kind.
    pub fn kind(&self) -> NodeKind {
        self.graph().kind_of(self.id)
    }

    /// Whether the cached value might be stale.
    pub fn is_potentially_dirty(&self) -> bool {
        self.graph().is_potentially_dirty(self.id)
    }

    /// Get the up-to-date value.
    ///
    /// Inside another node's rule this also records that node's dependency
    /// on this one. Derived nodes are revalidated and recomputed as needed.
    pub fn read(&self) -> T
    where
        T: Clone,
    {
        let graph = self.graph();
        graph.read(self.id, true);
        self.value_of(&graph)
    }

    /// Get the up-to-date value without recording a dependency.
    pub fn read_untracked(&self) -> T
    where
        T: Clone,
    {
        let graph = self.graph();
        graph.read(self.id, false);
        self.value_of(&graph)
    }

    /// Get the cached value as-is, without validation or dependency capture.
    pub fn cached(&self) -> Option<T>
    where
        T: Clone,
    {
        let graph = self.graph();
        graph.with_cell(self.id, |cell: &ValueCell<T>| cell.get())
    }

    /// Replace a source node's value and flag everything downstream.
    ///
    /// # Panics
    ///
    /// Panics if this is a derived node. Use [`Node::try_write`] to check
    /// instead.
    pub fn write(&self, value: T) {
        if let Err(err) = self.try_write(value) {
            fatal(err);
        }
    }

    /// Like [`Node::write`], but reports a derived node as an error.
    pub fn try_write(&self, value: T) -> Result<()> {
        let graph = self.graph();
        if graph.kind_of(self.id) == NodeKind::Derived {
            return Err(GraphError::WriteToDerived {
                name: graph.name_of(self.id),
            });
        }
        graph.with_cell(self.id, |cell: &ValueCell<T>| cell.set(value));
        graph.invalidate_dependents(self.id);
        Ok(())
    }

    /// Read-modify-write of a source node.
    pub fn update<F>(&self, f: F)
    where
        T: Clone,
        F: FnOnce(&mut T),
    {
        let mut value = self.read();
        f(&mut value);
        self.write(value);
    }

    fn value_of(&self, graph: &GraphInner) -> T
    where
        T: Clone,
    {
        graph
            .with_cell(self.id, |cell: &ValueCell<T>| cell.get())
            .unwrap_or_else(|| {
                fatal(GraphError::Uninitialized {
                    name: graph.name_of(self.id),
                })
            })
    }
}

impl<T> Clone for Node<T> {
    fn clone(&self) -> Self {
        Self {
            graph: Weak::clone(&self.graph),
            id: self.id,
            _value: PhantomData,
        }
    }
}

impl<T> Debug for Node<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}
