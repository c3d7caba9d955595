use thiserror::Error;

use crate::context::Key;

/// Errors raised by user-supplied task functions. These pass through the
/// engine untouched.
pub use anyhow::Error as RuntimeError;

/// Errors produced by the engine.
///
/// The first error anywhere in the call tree aborts the whole run and
/// surfaces to the caller of the outermost invocation. Context writes made
/// before the failure are kept; there is no rollback and no retry.
#[derive(Debug, Error)]
pub enum KeyflowError {
    /// A lookup referenced a context key that holds no value.
    #[error("key '{0}' not found in context")]
    KeyNotFound(Key),

    /// Traversal reached a node key with no definition in the graph.
    #[error("node '{0}' is not defined in the graph")]
    UndefinedNode(Key),

    /// A strategy asked for an edge that is not part of the graph.
    #[error("edge '{0}' -> '{1}' is not defined in the graph")]
    UndefinedEdge(Key, Key),

    /// A task function failed. The underlying error is not translated.
    #[error(transparent)]
    Invocation(#[from] RuntimeError),
}
