//! Pipeline executor.
//!
//! `Pipeline` runs an ordered snapshot of middleware steps through a
//! continuation (`Next`):
//! 1. Each invocation walks its own cursor over the shared snapshot, so
//!    concurrent runs of one pipeline never interfere.
//! 2. A step proceeds by calling `next.run().await`; dropping `next`
//!    truncates the rest of the chain silently.
//! 3. A cancelled token stops the chain before the next unstarted step,
//!    again without an error.
//! 4. The first failing step aborts the chain and the run rejects with a
//!    two-level `ChainFailure { StepFailure { original error } }`.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::{ChainFailure, SharedStep, StepError, StepFailure, StepResult};

// ---------------------------------------------------------------------------
// Next
// ---------------------------------------------------------------------------

/// Continuation handed to every step: the not-yet-started rest of the chain.
pub struct Next<'a, T> {
    ctx: &'a Arc<T>,
    remaining: &'a [SharedStep<T>],
    cancel: Option<&'a CancellationToken>,
}

impl<'a, T> Next<'a, T>
where
    T: Send + Sync + 'static,
{
    fn new(
        ctx: &'a Arc<T>,
        remaining: &'a [SharedStep<T>],
        cancel: Option<&'a CancellationToken>,
    ) -> Self {
        Self { ctx, remaining, cancel }
    }

    /// Number of steps that have not started yet.
    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }

    /// Run the next step (and, transitively, whatever it continues into).
    ///
    /// Resolves immediately when the chain is exhausted or the token has
    /// been cancelled. A failure of the next step comes back as a boxed
    /// [`StepFailure`]; a step that simply forwards it with `?` does not
    /// get wrapped a second time.
    pub fn run(self) -> BoxFuture<'a, StepResult> {
        Box::pin(async move {
            if self.cancel.is_some_and(CancellationToken::is_cancelled) {
                trace!(skipped = self.remaining.len(), "chain cancelled");
                return Ok(());
            }

            let Some((step, rest)) = self.remaining.split_first() else {
                return Ok(());
            };

            let next = Next::new(self.ctx, rest, self.cancel);
            match step.handle(&**self.ctx, next).await {
                Ok(()) => Ok(()),
                Err(err) if err.is::<StepFailure<T>>() => Err(err),
                Err(err) => {
                    let failure = StepFailure {
                        step: step.name().to_owned(),
                        source: err,
                        context: Arc::clone(self.ctx),
                    };
                    Err(Box::new(failure) as StepError)
                }
            }
        })
    }
}

impl<T> fmt::Debug for Next<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("remaining", &self.remaining.len())
            .field("cancellable", &self.cancel.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// An ordered, immutable sequence of steps captured at construction time.
///
/// Cloning is cheap; the pipeline itself holds no per-run state.
pub struct Pipeline<T> {
    steps: Arc<[SharedStep<T>]>,
}

impl<T> Pipeline<T>
where
    T: Send + Sync + 'static,
{
    /// Capture `steps` in order.
    pub fn new(steps: impl IntoIterator<Item = SharedStep<T>>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
        }
    }

    /// Number of captured steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step in order over `ctx`.
    ///
    /// # Errors
    /// Returns [`ChainFailure`] wrapping the first step failure.
    pub async fn run(&self, ctx: &Arc<T>) -> Result<(), ChainFailure<T>> {
        self.execute(ctx, None).await
    }

    /// Like [`Pipeline::run`], but stops silently before the first step
    /// that has not started once `cancel` is signalled.
    ///
    /// # Errors
    /// Returns [`ChainFailure`] wrapping the first step failure.
    pub async fn run_with_cancel(
        &self,
        ctx: &Arc<T>,
        cancel: &CancellationToken,
    ) -> Result<(), ChainFailure<T>> {
        self.execute(ctx, Some(cancel)).await
    }

    async fn execute(
        &self,
        ctx: &Arc<T>,
        cancel: Option<&CancellationToken>,
    ) -> Result<(), ChainFailure<T>> {
        let Err(err) = Next::new(ctx, &self.steps, cancel).run().await else {
            return Ok(());
        };

        let source = match err.downcast::<StepFailure<T>>() {
            Ok(failure) => *failure,
            // `Next::run` wraps every step error, so this only covers a
            // failure raised outside any step.
            Err(other) => StepFailure {
                step: "pipeline".to_owned(),
                source: other,
                context: Arc::clone(ctx),
            },
        };

        Err(ChainFailure {
            source,
            context: Arc::clone(ctx),
        })
    }
}

impl<T> Clone for Pipeline<T> {
    fn clone(&self) -> Self {
        Self {
            steps: Arc::clone(&self.steps),
        }
    }
}

impl<T> fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.steps.iter().map(|s| s.name()).collect();
        f.debug_struct("Pipeline").field("steps", &names).finish()
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{call_log, CallLog, MockFailure, MockStep};
    use crate::{from_fn, step_fn};
    use std::time::Duration;

    fn entries(log: &CallLog) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn steps_run_in_order_exactly_once() {
        let log = call_log();
        let pipeline: Pipeline<()> = Pipeline::new([
            MockStep::continuing("a", &log).shared(),
            MockStep::continuing("b", &log).shared(),
            MockStep::continuing("c", &log).shared(),
        ]);

        pipeline.run(&Arc::new(())).await.expect("chain should succeed");
        assert_eq!(entries(&log), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn empty_pipeline_resolves() {
        let pipeline: Pipeline<()> = Pipeline::new(Vec::new());
        assert!(pipeline.is_empty());
        assert!(pipeline.run(&Arc::new(())).await.is_ok());
    }

    #[tokio::test]
    async fn step_without_next_truncates_silently() {
        let log = call_log();
        let pipeline: Pipeline<()> = Pipeline::new([
            MockStep::continuing("a", &log).shared(),
            MockStep::halting("stop", &log).shared(),
            MockStep::continuing("never", &log).shared(),
        ]);

        assert!(pipeline.run(&Arc::new(())).await.is_ok());
        assert_eq!(entries(&log), vec!["a", "stop"]);
    }

    #[tokio::test]
    async fn failing_step_aborts_with_two_level_failure() {
        let log = call_log();
        let ctx = Arc::new(());
        let pipeline: Pipeline<()> = Pipeline::new([
            MockStep::continuing("ok", &log).shared(),
            MockStep::failing("boom", "disk on fire", &log).shared(),
            MockStep::continuing("never", &log).shared(),
        ]);

        let err = pipeline.run(&ctx).await.expect_err("chain should fail");

        assert_eq!(entries(&log), vec!["ok", "boom"]);
        assert_eq!(err.step(), "boom");
        assert!(Arc::ptr_eq(&err.context, &ctx));
        assert!(Arc::ptr_eq(&err.source.context, &ctx));

        let cause = err.cause().downcast_ref::<MockFailure>().expect("original error");
        assert_eq!(cause.0, "disk on fire");

        // outer -> inner -> original
        let inner = std::error::Error::source(&err).expect("inner failure");
        assert!(inner.is::<StepFailure<()>>());
        let original = inner.source().expect("original failure");
        assert!(original.is::<MockFailure>());
    }

    #[tokio::test]
    async fn forwarded_failure_is_not_wrapped_again() {
        let log = call_log();
        let outer = from_fn("outer", |_: &(), next| {
            Box::pin(async move { next.run().await })
        });
        let pipeline: Pipeline<()> = Pipeline::new([
            outer,
            MockStep::failing("inner", "nope", &log).shared(),
        ]);

        let err = pipeline.run(&Arc::new(())).await.expect_err("chain should fail");
        assert_eq!(err.step(), "inner");
        assert!(err.cause().is::<MockFailure>());
    }

    #[tokio::test]
    async fn step_can_recover_from_downstream_failure() {
        let log = call_log();
        let guard = from_fn("guard", |_: &(), next| {
            Box::pin(async move {
                let _recovered = next.run().await;
                Ok(())
            })
        });
        let pipeline: Pipeline<()> = Pipeline::new([
            guard,
            MockStep::failing("inner", "nope", &log).shared(),
        ]);

        assert!(pipeline.run(&Arc::new(())).await.is_ok());
        assert_eq!(entries(&log), vec!["inner"]);
    }

    #[tokio::test]
    async fn post_processing_runs_after_the_rest_of_the_chain() {
        let log = call_log();
        let wrap_log = Arc::clone(&log);
        let wrap = from_fn("wrap", move |_: &(), next| {
            let log = Arc::clone(&wrap_log);
            Box::pin(async move {
                log.lock().unwrap().push("before".into());
                let result = next.run().await;
                log.lock().unwrap().push("after".into());
                result
            })
        });
        let pipeline: Pipeline<()> = Pipeline::new([wrap, MockStep::continuing("inner", &log).shared()]);

        pipeline.run(&Arc::new(())).await.expect("chain should succeed");
        assert_eq!(entries(&log), vec!["before", "inner", "after"]);
    }

    #[tokio::test]
    async fn raw_step_error_names_the_failing_step() {
        let pipeline: Pipeline<()> = Pipeline::new([step_fn("validate", |_: &()| {
            Err(StepError::from("missing field"))
        })]);

        let err = pipeline.run(&Arc::new(())).await.expect_err("chain should fail");
        assert_eq!(err.step(), "validate");
        assert_eq!(err.cause().to_string(), "missing field");
        assert_eq!(
            err.to_string(),
            "middleware chain aborted: middleware step 'validate' failed: missing field"
        );
    }

    #[tokio::test]
    async fn cancelled_token_skips_every_step() {
        let log = call_log();
        let pipeline: Pipeline<()> = Pipeline::new([MockStep::continuing("a", &log).shared()]);
        let token = CancellationToken::new();
        token.cancel();

        assert!(pipeline.run_with_cancel(&Arc::new(()), &token).await.is_ok());
        assert!(entries(&log).is_empty());
    }

    #[tokio::test]
    async fn cancellation_mid_chain_stops_unstarted_steps() {
        let log = call_log();
        let token = CancellationToken::new();
        let trigger = token.clone();
        let pipeline: Pipeline<()> = Pipeline::new([
            MockStep::continuing("a", &log).shared(),
            step_fn("cancel", move |_: &()| {
                trigger.cancel();
                Ok(())
            }),
            MockStep::continuing("never", &log).shared(),
        ]);

        assert!(pipeline.run_with_cancel(&Arc::new(()), &token).await.is_ok());
        assert_eq!(entries(&log), vec!["a"]);
    }

    #[tokio::test]
    async fn concurrent_runs_keep_their_own_cursor() {
        let log = call_log();
        let pipeline: Pipeline<()> = Pipeline::new([
            MockStep::delayed("slow", Duration::from_millis(20), &log).shared(),
            MockStep::continuing("tail", &log).shared(),
        ]);

        let (left, right) = (Arc::new(()), Arc::new(()));
        let (first, second) = tokio::join!(pipeline.run(&left), pipeline.run(&right));
        assert!(first.is_ok() && second.is_ok());

        let seen = entries(&log);
        assert_eq!(seen.iter().filter(|s| *s == "slow").count(), 2);
        assert_eq!(seen.iter().filter(|s| *s == "tail").count(), 2);
    }
}
