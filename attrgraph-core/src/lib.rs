//! Attrgraph Core
//!
//! This crate provides a demand-driven incremental computation engine: a
//! graph of values where some nodes are written from outside (sources) and the
//! rest are pure functions of other nodes (derived).
//!
//! It implements:
//!
//! - Automatic dependency discovery: a derived node's edges are whatever its
//!   rule read on its latest run
//! - Push-based "maybe affected" marking on writes
//! - Pull-based revalidation and recomputation on reads
//! - Snapshots and Graphviz DOT rendering of the engine state
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: node arena, handles, and the recompute algorithm
//! - `snapshot`: detached copies of graph state and their DOT/JSON/MessagePack forms
//! - `error`: the crate error type
//!
//! # Example
//!
//! ```rust
//! use attrgraph_core::Graph;
//!
//! let graph = Graph::new();
//! let width = graph.source("width", 4);
//! let height = graph.source("height", 3);
//!
//! let area = graph.derived("area", {
//!     let (width, height) = (width.clone(), height.clone());
//!     move || width.read() * height.read()
//! });
//!
//! assert_eq!(area.read(), 12);
//!
//! // Writes only flag dependents; nothing runs until the next read.
//! width.write(5);
//! assert!(area.is_potentially_dirty());
//! assert_eq!(area.read(), 15);
//!
//! println!("{}", graph.render());
//! ```

pub mod error;
pub mod graph;
pub mod snapshot;

pub use error::{GraphError, Result};
pub use graph::{Graph, Node, NodeId, NodeKind};
pub use snapshot::{DotOptions, EdgeValue, GraphValue, NodeValue};
