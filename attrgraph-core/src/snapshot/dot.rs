//! DOT Rendering
//!
//! Graphs render as Graphviz DOT: one line per node, one line per edge.
//!
//! ```text
//! digraph {
//! n0 [label="A (10)", style=solid, shape=rect]
//! n2 [label="C (30)", style=filled, shape=rect]
//! n0 -> n2 [style=dashed]
//! }
//! ```
//!
//! Nodes that are potentially dirty are `filled`, pending edges are `dashed`,
//! everything else is `solid`.

use std::fmt::Write as _;

use crate::graph::NodeId;

/// Label text for a node that has never been evaluated.
pub const UNEVALUATED: &str = "<unevaluated>";

/// Options for DOT output. The default produces the plain format above.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DotOptions {
    /// Emitted as `digraph "<name>" {` when set.
    pub graph_name: Option<String>,

    /// Include each node's value in its label.
    pub show_values: bool,
}

impl Default for DotOptions {
    fn default() -> Self {
        Self {
            graph_name: None,
            show_values: true,
        }
    }
}

impl DotOptions {
    /// Name the emitted digraph.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            graph_name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Leave values out of node labels.
    pub fn without_values(mut self) -> Self {
        self.show_values = false;
        self
    }
}

pub(crate) fn header(options: &DotOptions) -> String {
    match &options.graph_name {
        Some(name) => format!("digraph \"{}\" {{\n", escape(name)),
        None => "digraph {\n".to_string(),
    }
}

pub(crate) fn push_node(
    out: &mut String,
    options: &DotOptions,
    id: NodeId,
    name: &str,
    value: Option<&str>,
    potentially_dirty: bool,
) {
    let style = if potentially_dirty { "filled" } else { "solid" };
    let label = if options.show_values {
        format!("{} ({})", name, value.unwrap_or(UNEVALUATED))
    } else {
        name.to_string()
    };
    // Writing to a String cannot fail.
    let _ = writeln!(
        out,
        "{id} [label=\"{}\", style={style}, shape=rect]",
        escape(&label)
    );
}

pub(crate) fn push_edge(out: &mut String, from: NodeId, to: NodeId, pending: bool) {
    let style = if pending { "dashed" } else { "solid" };
    let _ = writeln!(out, "{from} -> {to} [style={style}]");
}

/// Escape text for use inside a double-quoted DOT string.
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
