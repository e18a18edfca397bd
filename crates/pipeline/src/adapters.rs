//! Closure adapters for building steps without a dedicated type.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::{Middleware, Next, SharedStep, StepResult};

/// A step backed by a closure that controls the continuation itself.
pub struct FnStep<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<T, F> Middleware<T> for FnStep<F>
where
    T: Send + Sync + 'static,
    F: for<'a> Fn(&'a T, Next<'a, T>) -> BoxFuture<'a, StepResult> + Send + Sync,
{
    async fn handle(&self, ctx: &T, next: Next<'_, T>) -> StepResult {
        (self.f)(ctx, next).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<F> fmt::Debug for FnStep<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnStep").field("name", &self.name).finish()
    }
}

/// Build a step from an async closure.
///
/// ```ignore
/// let step = pipeline::from_fn("audit", |ctx: &Ctx, next| {
///     Box::pin(async move {
///         ctx.log("before");
///         next.run().await?;
///         ctx.log("after");
///         Ok(())
///     })
/// });
/// ```
pub fn from_fn<T, F>(name: impl Into<String>, f: F) -> SharedStep<T>
where
    T: Send + Sync + 'static,
    F: for<'a> Fn(&'a T, Next<'a, T>) -> BoxFuture<'a, StepResult> + Send + Sync + 'static,
{
    Arc::new(FnStep {
        name: name.into(),
        f,
    })
}

/// A synchronous step: runs the closure, then continues on success.
pub struct SyncStep<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<T, F> Middleware<T> for SyncStep<F>
where
    T: Send + Sync + 'static,
    F: Fn(&T) -> StepResult + Send + Sync,
{
    async fn handle(&self, ctx: &T, next: Next<'_, T>) -> StepResult {
        (self.f)(ctx)?;
        next.run().await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<F> fmt::Debug for SyncStep<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncStep").field("name", &self.name).finish()
    }
}

/// Build a step that mutates the context synchronously and always
/// continues unless the closure fails.
pub fn step_fn<T, F>(name: impl Into<String>, f: F) -> SharedStep<T>
where
    T: Send + Sync + 'static,
    F: Fn(&T) -> StepResult + Send + Sync + 'static,
{
    Arc::new(SyncStep {
        name: name.into(),
        f,
    })
}
