//! Dependency Graph
//!
//! This module implements the graph of source and derived nodes and the
//! demand-driven algorithm that keeps derived values up to date.
//!
//! # Overview
//!
//! - Nodes represent either externally written values (sources) or values
//!   computed by a rule (derived).
//! - Edges represent dependencies: if C read A during its last recompute,
//!   there is an edge from A to C.
//!
//! Edges are discovered, not declared. While a derived node's rule runs, the
//! node sits in the graph's evaluation slot and every read performed by the
//! rule adds an edge to it. Before each recompute the node's incoming edges
//! are dropped, so a rule that reads different nodes on different runs always
//! ends up with exactly the edges of its latest run.
//!
//! Writing a source pushes a conservative `potentially_dirty` flag forward
//! along existing edges and marks the source's own edges pending. Reading a
//! derived node pulls: it first settles its dependencies, then recomputes only
//! if one of its incoming edges is pending.
//!
//! # Design Decisions
//!
//! 1. All node state lives in one arena owned by the graph. Edges, handles
//!    and the evaluation slot refer to nodes by [`NodeId`], never by owning
//!    pointer.
//!
//! 2. Value types vary per node, so the arena stores the typed part behind
//!    a trait object and keeps everything the algorithm needs untyped.
//!
//! 3. The graph is single-threaded (`Rc`/`RefCell`). Callers that share one
//!    graph between threads must serialize access themselves.

mod cell;
mod context;
mod edge;
mod node;
mod recompute;

pub use node::{Node, NodeId, NodeKind};

use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::rc::Rc;

use indexmap::IndexMap;

use self::cell::{AnyCell, ValueCell};
use self::edge::{Edge, EdgeId};
use self::node::NodeRecord;
use crate::error::{fatal, GraphError};
use crate::snapshot::{dot, DotOptions, EdgeValue, GraphValue, NodeValue};

/// Shared state behind a [`Graph`] and its node handles.
pub(crate) struct GraphInner {
    /// All nodes, in creation order.
    pub(crate) nodes: RefCell<Vec<NodeRecord>>,

    /// All live edges. Endpoints keep the ids.
    pub(crate) edges: RefCell<IndexMap<EdgeId, Edge>>,

    next_edge: Cell<u64>,

    /// The node whose rule is running, if any.
    pub(crate) current: Cell<Option<NodeId>>,
}

/// An incremental computation graph.
///
/// # Example
///
/// ```rust
/// use attrgraph_core::Graph;
///
/// let graph = Graph::new();
/// let a = graph.source("A", 10);
/// let b = graph.source("B", 20);
///
/// let c = graph.derived("C", {
///     let (a, b) = (a.clone(), b.clone());
///     move || a.read() + b.read()
/// });
///
/// assert_eq!(c.read(), 30);
///
/// a.write(40);
/// assert!(c.is_potentially_dirty());
/// assert_eq!(c.read(), 60);
/// ```
pub struct Graph {
    inner: Rc<GraphInner>,
}

impl Graph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(GraphInner {
                nodes: RefCell::new(Vec::new()),
                edges: RefCell::new(IndexMap::new()),
                next_edge: Cell::new(0),
                current: Cell::new(None),
            }),
        }
    }

    pub(crate) fn inner(&self) -> &GraphInner {
        &self.inner
    }

    /// Create a source node holding `value`.
    pub fn source<T>(&self, name: impl Into<String>, value: T) -> Node<T>
    where
        T: Debug + 'static,
    {
        self.insert(name.into(), NodeKind::Source, Rc::new(ValueCell::source(value)))
    }

    /// Create a derived node computed by `rule`.
    ///
    /// The rule does not run until the node is first read. Dependents are
    /// signalled after every recompute, whether or not the value changed.
    pub fn derived<T, F>(&self, name: impl Into<String>, rule: F) -> Node<T>
    where
        T: Debug + 'static,
        F: Fn() -> T + 'static,
    {
        self.insert(
            name.into(),
            NodeKind::Derived,
            Rc::new(ValueCell::derived(Box::new(rule))),
        )
    }

    /// Create a derived node that only signals dependents when a recompute
    /// produces a value different from the previous one.
    pub fn derived_eq<T, F>(&self, name: impl Into<String>, rule: F) -> Node<T>
    where
        T: Debug + PartialEq + 'static,
        F: Fn() -> T + 'static,
    {
        self.insert(
            name.into(),
            NodeKind::Derived,
            Rc::new(ValueCell::derived_eq(Box::new(rule))),
        )
    }

    fn insert<T>(&self, name: String, kind: NodeKind, cell: Rc<dyn AnyCell>) -> Node<T>
    where
        T: Debug + 'static,
    {
        let mut nodes = self.inner.nodes.borrow_mut();
        let id = NodeId::from_index(nodes.len());
        tracing::trace!(node = %name, %id, ?kind, "node created");
        nodes.push(NodeRecord::new(name, kind, cell));
        Node::new(Rc::downgrade(&self.inner), id)
    }

    /// Number of nodes ever created.
    pub fn node_count(&self) -> usize {
        self.inner.nodes.borrow().len()
    }

    /// Number of live edges.
    pub fn edge_count(&self) -> usize {
        self.inner.edges.borrow().len()
    }

    /// The node whose rule is currently running, if any.
    pub fn current_node(&self) -> Option<NodeId> {
        self.inner.current.get()
    }

    /// Copy the current node and edge state.
    ///
    /// Never recomputes anything and never changes the graph.
    pub fn snapshot(&self) -> GraphValue {
        let (records, edges) = self.inner.collect();

        let nodes = records
            .into_iter()
            .map(|record| NodeValue {
                id: record.id,
                name: record.name,
                potentially_dirty: record.potentially_dirty,
                value: record.cell.debug_value(),
            })
            .collect();

        GraphValue { nodes, edges }
    }

    /// Render the live graph as a DOT document.
    pub fn render(&self) -> String {
        self.render_with(&DotOptions::default())
    }

    /// Render the live graph as a DOT document with custom options.
    pub fn render_with(&self, options: &DotOptions) -> String {
        let (records, edges) = self.inner.collect();

        let mut out = dot::header(options);
        for record in &records {
            let value = record.cell.debug_value();
            dot::push_node(
                &mut out,
                options,
                record.id,
                &record.name,
                value.as_deref(),
                record.potentially_dirty,
            );
        }
        for edge in &edges {
            dot::push_edge(&mut out, edge.from, edge.to, edge.pending);
        }
        out.push('}');
        out
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.node_count())
            .field("edges", &self.edge_count())
            .field("current", &self.current_node())
            .finish()
    }
}

struct LiveNode {
    id: NodeId,
    name: String,
    potentially_dirty: bool,
    cell: Rc<dyn AnyCell>,
}

impl GraphInner {
    pub(crate) fn name_of(&self, id: NodeId) -> String {
        self.nodes.borrow()[id.index()].name.clone()
    }

    pub(crate) fn kind_of(&self, id: NodeId) -> NodeKind {
        self.nodes.borrow()[id.index()].kind
    }

    pub(crate) fn is_potentially_dirty(&self, id: NodeId) -> bool {
        self.nodes.borrow()[id.index()].potentially_dirty
    }

    /// Run `f` against the typed cell of `id`.
    ///
    /// The arena is not borrowed while `f` runs.
    pub(crate) fn with_cell<T, R>(&self, id: NodeId, f: impl FnOnce(&ValueCell<T>) -> R) -> R
    where
        T: 'static,
    {
        let cell = Rc::clone(&self.nodes.borrow()[id.index()].cell);
        match cell.as_any().downcast_ref::<ValueCell<T>>() {
            Some(typed) => f(typed),
            None => fatal(GraphError::TypeMismatch {
                name: self.name_of(id),
            }),
        }
    }

    /// Copy out node state and edges in outgoing order.
    ///
    /// Values are left unformatted: a value's `Debug` impl is user code and
    /// must run after the arena borrow is released.
    fn collect(&self) -> (Vec<LiveNode>, Vec<EdgeValue>) {
        let nodes = self.nodes.borrow();
        let edges = self.edges.borrow();

        let records = nodes
            .iter()
            .enumerate()
            .map(|(index, record)| LiveNode {
                id: NodeId::from_index(index),
                name: record.name.clone(),
                potentially_dirty: record.potentially_dirty,
                cell: Rc::clone(&record.cell),
            })
            .collect();

        let edge_values = nodes
            .iter()
            .flat_map(|record| record.outgoing.iter())
            .map(|edge_id| {
                let edge = &edges[edge_id];
                EdgeValue {
                    from: edge.from,
                    to: edge.to,
                    pending: edge.pending,
                }
            })
            .collect();

        (records, edge_values)
    }

    fn next_edge_id(&self) -> EdgeId {
        let raw = self.next_edge.get();
        self.next_edge.set(raw + 1);
        EdgeId::from_raw(raw)
    }
}
