//! Engine-level error types.

use thiserror::Error;

/// Errors produced while assembling a graph.
///
/// Touch failures are not listed here: they surface as
/// [`pipeline::ChainFailure`], which carries the in-flight context.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A node with this ID is already registered in the graph.
    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),
}
