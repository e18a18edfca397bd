//! The `Middleware` trait: the contract every step in a chain must fulfil.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{Next, StepResult};

/// A step shared between a node's stack and every in-flight chain.
pub type SharedStep<T> = Arc<dyn Middleware<T>>;

/// One unit of work in a middleware chain.
///
/// A step receives the shared context and the continuation for the rest
/// of the chain. It may mutate the context (through whatever interior
/// mutability `T` provides), call `next.run().await` to proceed, or drop
/// `next` to end the chain early without an error.
///
/// Returning `Err` aborts the chain: no later step runs and the executor
/// reports a [`ChainFailure`](crate::ChainFailure).
#[async_trait]
pub trait Middleware<T>: Send + Sync {
    /// Run this step.
    async fn handle(&self, ctx: &T, next: Next<'_, T>) -> StepResult;

    /// Label used in failures and logs.
    fn name(&self) -> &str {
        "middleware"
    }
}
