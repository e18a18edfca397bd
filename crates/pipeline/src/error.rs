//! Aggregated failure types for a middleware chain.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Error type returned by a single middleware step.
pub type StepError = Box<dyn std::error::Error + Send + Sync>;

/// Outcome of a middleware step (and of the `Next` continuation).
pub type StepResult = Result<(), StepError>;

/// Inner failure: one step raised an error while `context` was in flight.
#[derive(Error)]
#[error("middleware step '{step}' failed: {source}")]
pub struct StepFailure<T> {
    /// `Middleware::name` of the step that failed.
    pub step: String,
    /// The error the step returned.
    #[source]
    pub source: StepError,
    /// The context the chain was running with.
    pub context: Arc<T>,
}

/// Outer failure: the chain was aborted by exactly one [`StepFailure`].
///
/// This is what `Pipeline::run` (and a node's `touch`) reject with.
#[derive(Error)]
#[error("middleware chain aborted: {source}")]
pub struct ChainFailure<T> {
    #[source]
    pub source: StepFailure<T>,
    pub context: Arc<T>,
}

impl<T> StepFailure<T> {
    /// The original error raised by the failing step.
    pub fn cause(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.source.as_ref()
    }
}

impl<T> ChainFailure<T> {
    /// Name of the step that aborted the chain.
    pub fn step(&self) -> &str {
        &self.source.step
    }

    /// The original error raised by the failing step.
    pub fn cause(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.source.cause()
    }
}

// The context is opaque, so the Debug output only names the failure chain.
impl<T> fmt::Debug for StepFailure<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepFailure")
            .field("step", &self.step)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl<T> fmt::Debug for ChainFailure<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainFailure")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}
