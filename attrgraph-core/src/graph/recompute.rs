//! Recompute-If-Needed
//!
//! # Algorithm
//!
//! Writes push, reads pull:
//!
//! 1. Writing a source marks each of its outgoing edges pending and flags
//!    every node reachable from it `potentially_dirty`. Propagation stops at
//!    nodes that are already flagged.
//! 2. Reading a node first records an edge to the node currently being
//!    evaluated, if any.
//! 3. A derived node that is not flagged and already has a value is
//!    returned as-is.
//! 4. Otherwise its dependencies are validated first (recursively, each one
//!    taking its own fast path when it can). After that, the node recomputes
//!    only if one of its incoming edges is pending, or it never had a value.
//! 5. A recompute drops all incoming edges, runs the rule with the node in
//!    the evaluation slot (rediscovering its edges), and marks its outgoing
//!    edges pending unless this was the very first evaluation.
//!
//! Plain derived nodes never compare old and new values, so a recompute that
//! reproduces the same value still makes dependents recompute. Nodes created
//! with `derived_eq` skip the pending marks in that case.

use std::collections::VecDeque;
use std::mem;

use tracing::{debug, trace};

use super::cell::Evaluation;
use super::context::{EvaluationScope, VisitGuard};
use super::edge::Edge;
use super::node::{NodeId, NodeKind};
use super::GraphInner;
use crate::error::{fatal, GraphError};

impl GraphInner {
    /// Bring `id` up to date.
    ///
    /// With `capture`, the read is attributed to the node currently being
    /// evaluated. Validation of upstream nodes never captures: only a rule's
    /// own reads create edges.
    ///
    /// A rule reading a node that is still being evaluated is fatal. An
    /// uncaptured validation read of such a node returns its cached value as
    /// long as the node has one and is no longer flagged.
    pub(crate) fn read(&self, id: NodeId, capture: bool) {
        let (kind, in_progress, settled) = {
            let nodes = self.nodes.borrow();
            let record = &nodes[id.index()];
            (
                record.kind,
                record.in_progress,
                !record.potentially_dirty && record.cell.has_value(),
            )
        };

        if in_progress {
            // Validation may walk stale edges back into a node that has
            // already cleared its flag and is only recomputing. That node's
            // cached value stands; only a rule reading it is a cycle.
            if !capture && settled {
                trace!(%id, "in-progress node reached by validation");
                return;
            }
            fatal(GraphError::Cycle {
                name: self.name_of(id),
            });
        }

        if capture {
            if let Some(reader) = self.current.get() {
                self.connect(id, reader);
            }
        }

        self.revalidate(id, kind);
    }

    fn revalidate(&self, id: NodeId, kind: NodeKind) {
        if kind == NodeKind::Source {
            return;
        }

        let (dirty, initialized, cell) = {
            let nodes = self.nodes.borrow();
            let record = &nodes[id.index()];
            (record.potentially_dirty, record.cell.has_value(), record.cell.clone())
        };

        if !dirty && initialized {
            trace!(%id, "fast path");
            return;
        }

        let _visit = VisitGuard::enter(self, id);

        let upstream: Vec<NodeId> = {
            let nodes = self.nodes.borrow();
            let edges = self.edges.borrow();
            nodes[id.index()]
                .incoming
                .iter()
                .map(|edge_id| edges[edge_id].from)
                .collect()
        };
        for from in upstream {
            self.read(from, false);
        }

        let has_pending_incoming = {
            let mut nodes = self.nodes.borrow_mut();
            let edges = self.edges.borrow();
            let record = &mut nodes[id.index()];
            record.potentially_dirty = false;
            record.incoming.iter().any(|edge_id| edges[edge_id].pending)
        };

        if !has_pending_incoming && initialized {
            trace!(%id, "validated without recompute");
            return;
        }

        let evaluation = {
            let _scope = EvaluationScope::enter(self, id);
            self.disconnect_incoming(id);
            cell.evaluate()
        };

        let signal = match evaluation {
            Evaluation::NoRule => fatal(GraphError::MissingRule {
                name: self.name_of(id),
            }),
            Evaluation::Changed => initialized,
            Evaluation::Unchanged => false,
        };

        if signal {
            let nodes = self.nodes.borrow();
            let mut edges = self.edges.borrow_mut();
            for edge_id in &nodes[id.index()].outgoing {
                if let Some(edge) = edges.get_mut(edge_id) {
                    edge.pending = true;
                }
            }
        }

        debug!(
            node = %self.name_of(id),
            initial = !initialized,
            signalled = signal,
            "recomputed"
        );
    }

    /// Record that `reader` read `from`.
    fn connect(&self, from: NodeId, reader: NodeId) {
        let edge_id = self.next_edge_id();
        self.edges
            .borrow_mut()
            .insert(edge_id, Edge::new(from, reader));

        let mut nodes = self.nodes.borrow_mut();
        nodes[from.index()].outgoing.push(edge_id);
        nodes[reader.index()].incoming.push(edge_id);

        trace!(%from, to = %reader, edge = edge_id.raw(), "dependency captured");
    }

    /// Drop every incoming edge of `id` from both endpoints.
    fn disconnect_incoming(&self, id: NodeId) {
        let mut nodes = self.nodes.borrow_mut();
        let mut edges = self.edges.borrow_mut();

        let incoming = mem::take(&mut nodes[id.index()].incoming);
        for edge_id in incoming {
            if let Some(edge) = edges.swap_remove(&edge_id) {
                nodes[edge.from.index()]
                    .outgoing
                    .retain(|outgoing| *outgoing != edge_id);
            }
        }
    }

    /// Mark a written source's edges pending and flag everything downstream.
    pub(crate) fn invalidate_dependents(&self, source: NodeId) {
        let mut nodes = self.nodes.borrow_mut();
        let mut edges = self.edges.borrow_mut();

        let mut queue = VecDeque::new();
        for edge_id in &nodes[source.index()].outgoing {
            if let Some(edge) = edges.get_mut(edge_id) {
                edge.pending = true;
                queue.push_back(edge.to);
            }
        }

        let mut flagged = 0usize;
        while let Some(node_id) = queue.pop_front() {
            let record = &mut nodes[node_id.index()];
            if record.potentially_dirty {
                continue;
            }
            record.potentially_dirty = true;
            flagged += 1;

            for edge_id in &record.outgoing {
                if let Some(edge) = edges.get(edge_id) {
                    queue.push_back(edge.to);
                }
            }
        }

        debug!(
            node = %nodes[source.index()].name,
            flagged,
            "source written"
        );
    }
}

#[cfg(test)]
mod tests {
    use crate::graph::{Graph, Node};
    use std::cell::Cell;
    use std::rc::Rc;

    fn counted<T, F>(graph: &Graph, name: &str, calls: &Rc<Cell<u32>>, rule: F) -> Node<T>
    where
        T: std::fmt::Debug + 'static,
        F: Fn() -> T + 'static,
    {
        let calls = calls.clone();
        graph.derived(name, move || {
            calls.set(calls.get() + 1);
            rule()
        })
    }

    fn incoming_names(graph: &Graph, node: &str) -> Vec<String> {
        let snapshot = graph.snapshot();
        let id = snapshot.node_named(node).expect("node exists").id;
        let mut names: Vec<String> = snapshot
            .incoming(id)
            .map(|edge| snapshot.node(edge.from).expect("edge endpoint").name.clone())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn first_read_computes_once() {
        let graph = Graph::new();
        let calls = Rc::new(Cell::new(0));
        let a = graph.source("a", 2);
        let doubled = counted(&graph, "doubled", &calls, {
            let a = a.clone();
            move || a.read() * 2
        });

        assert_eq!(calls.get(), 0);
        assert_eq!(doubled.read(), 4);
        assert_eq!(doubled.read(), 4);
        assert_eq!(doubled.read(), 4);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn write_flags_exactly_the_reachable_nodes() {
        let graph = Graph::new();
        let a = graph.source("a", 1);
        let b = graph.source("b", 1);
        let from_a = graph.derived("from_a", {
            let a = a.clone();
            move || a.read() + 1
        });
        let chained = graph.derived("chained", {
            let from_a = from_a.clone();
            move || from_a.read() + 1
        });
        let from_b = graph.derived("from_b", {
            let b = b.clone();
            move || b.read() + 1
        });

        chained.read();
        from_b.read();

        a.write(10);

        assert!(from_a.is_potentially_dirty());
        assert!(chained.is_potentially_dirty());
        assert!(!from_b.is_potentially_dirty());
        assert!(!a.is_potentially_dirty());
        assert!(!b.is_potentially_dirty());

        let snapshot = graph.snapshot();
        assert_eq!(snapshot.pending_edges().count(), 1);
    }

    #[test]
    fn write_recomputes_downstream_on_read() {
        let graph = Graph::new();
        let calls = Rc::new(Cell::new(0));
        let a = graph.source("a", 1);
        let plus_one = counted(&graph, "plus_one", &calls, {
            let a = a.clone();
            move || a.read() + 1
        });

        assert_eq!(plus_one.read(), 2);
        a.write(5);
        assert_eq!(calls.get(), 1);
        assert_eq!(plus_one.read(), 6);
        assert_eq!(calls.get(), 2);
        assert!(!plus_one.is_potentially_dirty());
    }

    #[test]
    fn identical_write_still_recomputes() {
        let graph = Graph::new();
        let calls = Rc::new(Cell::new(0));
        let a = graph.source("a", 1);
        let mid = graph.derived("mid", {
            let a = a.clone();
            move || a.read() / 100
        });
        let end = counted(&graph, "end", &calls, {
            let mid = mid.clone();
            move || mid.read() + 1
        });

        assert_eq!(end.read(), 1);
        a.write(2);
        assert_eq!(end.read(), 1);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn equality_nodes_stop_propagation() {
        let graph = Graph::new();
        let calls = Rc::new(Cell::new(0));
        let a = graph.source("a", 1);
        let bucket = graph.derived_eq("bucket", {
            let a = a.clone();
            move || a.read() / 100
        });
        let end = counted(&graph, "end", &calls, {
            let bucket = bucket.clone();
            move || bucket.read() + 1
        });

        assert_eq!(end.read(), 1);

        a.write(2);
        assert!(end.is_potentially_dirty());

        // `bucket` recomputes to the same value, so `end` is only validated.
        assert_eq!(end.read(), 1);
        assert_eq!(calls.get(), 1);
        assert!(!end.is_potentially_dirty());
        assert!(!bucket.is_potentially_dirty());
        assert_eq!(graph.snapshot().pending_edges().count(), 0);

        a.write(250);
        assert_eq!(end.read(), 3);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn dependencies_are_rediscovered() {
        let graph = Graph::new();
        let use_left = graph.source("use_left", true);
        let left = graph.source("left", 1);
        let right = graph.source("right", 2);
        let pick = graph.derived("pick", {
            let (use_left, left, right) = (use_left.clone(), left.clone(), right.clone());
            move || if use_left.read() { left.read() } else { right.read() }
        });

        assert_eq!(pick.read(), 1);
        assert_eq!(incoming_names(&graph, "pick"), ["left", "use_left"]);

        use_left.write(false);
        assert_eq!(pick.read(), 2);
        assert_eq!(incoming_names(&graph, "pick"), ["right", "use_left"]);

        // `left` is no longer a dependency.
        left.write(100);
        assert!(!pick.is_potentially_dirty());

        right.write(3);
        assert!(pick.is_potentially_dirty());
        assert_eq!(pick.read(), 3);
    }

    #[test]
    fn repeated_reads_create_distinct_edges() {
        let graph = Graph::new();
        let a = graph.source("a", 3);
        let square = graph.derived("square", {
            let a = a.clone();
            move || a.read() * a.read()
        });

        assert_eq!(square.read(), 9);
        assert_eq!(graph.edge_count(), 2);

        a.write(4);
        assert_eq!(square.read(), 16);
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn clean_reads_are_idempotent() {
        let graph = Graph::new();
        let calls = Rc::new(Cell::new(0));
        let a = graph.source("a", 1);
        let b = counted(&graph, "b", &calls, {
            let a = a.clone();
            move || a.read() + 1
        });

        b.read();
        let first = graph.snapshot();
        b.read();
        let second = graph.snapshot();

        assert_eq!(first, second);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn validation_does_not_add_edges_to_the_reader() {
        let graph = Graph::new();
        let a = graph.source("a", 1);
        let mid = graph.derived("mid", {
            let a = a.clone();
            move || a.read() + 1
        });
        let top = graph.derived("top", {
            let mid = mid.clone();
            move || mid.read() + 1
        });

        assert_eq!(top.read(), 3);
        a.write(2);
        assert_eq!(top.read(), 4);

        assert_eq!(incoming_names(&graph, "top"), ["mid"]);
        assert_eq!(incoming_names(&graph, "mid"), ["a"]);
    }

    #[test]
    fn untracked_reads_do_not_create_edges() {
        let graph = Graph::new();
        let a = graph.source("a", 1);
        let peek = graph.derived("peek", {
            let a = a.clone();
            move || a.read_untracked() * 10
        });

        assert_eq!(peek.read(), 10);
        assert_eq!(graph.edge_count(), 0);

        a.write(2);
        assert!(!peek.is_potentially_dirty());
        assert_eq!(peek.read(), 10);
    }

    #[test]
    fn rule_panic_restores_evaluation_slot() {
        let graph = Graph::new();
        let fail = graph.source("fail", true);
        let fragile = graph.derived("fragile", {
            let fail = fail.clone();
            move || {
                if fail.read() {
                    panic!("rule failed");
                }
                1
            }
        });

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| fragile.read()));
        assert!(result.is_err());
        assert_eq!(graph.current_node(), None);

        fail.write(false);
        assert_eq!(fragile.read(), 1);
    }

    /// Two rules that swap which one depends on the other leave stale edges
    /// pointing back at the node being recomputed.
    #[test]
    fn dependency_direction_can_flip() {
        let graph = Graph::new();
        let flag = graph.source("flag", true);
        let slot: Rc<Cell<Option<Node<i32>>>> = Rc::new(Cell::new(None));
        let x = graph.derived("x", {
            let (flag, slot) = (flag.clone(), slot.clone());
            move || {
                if flag.read() {
                    1
                } else {
                    let y = slot.take().expect("handle installed");
                    let value = y.read() + 1;
                    slot.set(Some(y));
                    value
                }
            }
        });
        let y = graph.derived("y", {
            let (flag, x) = (flag.clone(), x.clone());
            move || if flag.read() { x.read() + 1 } else { 0 }
        });
        slot.set(Some(y.clone()));

        assert_eq!(y.read(), 2);
        assert_eq!(incoming_names(&graph, "y"), ["flag", "x"]);

        flag.write(false);
        assert_eq!(x.read(), 1);
        assert_eq!(y.read(), 0);
        assert_eq!(incoming_names(&graph, "x"), ["flag", "y"]);
        assert_eq!(incoming_names(&graph, "y"), ["flag"]);

        flag.write(true);
        assert_eq!(y.read(), 2);
        assert_eq!(x.read(), 1);
    }

    #[test]
    fn diamond_shares_one_upstream_recompute() {
        let graph = Graph::new();
        let calls = Rc::new(Cell::new(0));
        let s = graph.source("s", 1);
        let m = counted(&graph, "m", &calls, {
            let s = s.clone();
            move || s.read() * 2
        });
        let left = graph.derived("left", {
            let m = m.clone();
            move || m.read() + 1
        });
        let right = graph.derived("right", {
            let m = m.clone();
            move || m.read() + 2
        });
        let top = graph.derived("top", {
            let (left, right) = (left.clone(), right.clone());
            move || left.read() + right.read()
        });

        assert_eq!(top.read(), 7);
        s.write(5);
        assert_eq!(top.read(), 23);
        assert_eq!(calls.get(), 2);
        assert_eq!(graph.snapshot().dirty_nodes().count(), 0);
    }

    #[test]
    #[should_panic(expected = "dependency cycle detected")]
    fn self_reading_rule_is_fatal() {
        let graph = Graph::new();
        let slot: Rc<Cell<Option<Node<i32>>>> = Rc::new(Cell::new(None));
        let slot_clone = slot.clone();
        let looped = graph.derived("looped", move || {
            let me = slot_clone.take().expect("handle installed");
            me.read() + 1
        });
        slot.set(Some(looped.clone()));
        looped.read();
    }

    #[test]
    #[should_panic(expected = "dependency cycle detected")]
    fn mutual_recursion_is_fatal() {
        let graph = Graph::new();
        let slot: Rc<Cell<Option<Node<i32>>>> = Rc::new(Cell::new(None));
        let slot_clone = slot.clone();
        let first = graph.derived("first", move || {
            let second = slot_clone.take().expect("handle installed");
            second.read() + 1
        });
        let second = graph.derived("second", {
            let first = first.clone();
            move || first.read() + 1
        });
        slot.set(Some(second));
        first.read();
    }
}
