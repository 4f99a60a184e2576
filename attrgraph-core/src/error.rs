//! Error Types
//!
//! Contract violations (writing a derived node, dependency cycles, using a
//! handle whose graph is gone) are programmer errors. The engine reports them
//! through [`fatal`], which logs and panics. Only the snapshot encoders hand a
//! `GraphError` back to the caller as a value.

use thiserror::Error;

/// Everything that can go wrong inside the graph engine.
#[derive(Debug, Error)]
pub enum GraphError {
    /// A derived node was written. Derived values only come from their rule.
    #[error("cannot write to derived node `{name}`: derived values are computed by their rule")]
    WriteToDerived { name: String },

    /// A derived node was evaluated without a rule.
    #[error("derived node `{name}` has no rule")]
    MissingRule { name: String },

    /// A node was read while its own validation or recomputation was in progress.
    #[error("dependency cycle detected: `{name}` was read while it was being evaluated")]
    Cycle { name: String },

    /// A node handle was used after the graph that created it was dropped.
    #[error("node handle used after its graph was dropped")]
    GraphDropped,

    /// A handle's value type does not match the cell stored in the graph.
    #[error("node `{name}` does not hold a value of the requested type")]
    TypeMismatch { name: String },

    /// A node reported clean but holds no cached value.
    #[error("node `{name}` has no cached value after evaluation")]
    Uninitialized { name: String },

    #[error("snapshot JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("snapshot MessagePack encoding failed: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    #[error("snapshot MessagePack decoding failed: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),
}

/// Result alias used by the fallible parts of the crate.
pub type Result<T> = std::result::Result<T, GraphError>;

/// Report an unrecoverable contract violation and abort the current call stack.
#[cold]
#[track_caller]
pub(crate) fn fatal(err: GraphError) -> ! {
    tracing::error!(error = %err, "graph contract violation");
    panic!("{err}")
}
