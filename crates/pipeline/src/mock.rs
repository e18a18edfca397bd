//! `MockStep`: a test double for `Middleware`.
//!
//! Records every invocation into a log that can be shared between several
//! steps, so tests can assert both call counts and execution order.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::{Middleware, Next, StepResult};

/// Shared, ordered record of step invocations.
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// Create an empty call log.
pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Behaviour injected into `MockStep` at construction time.
#[derive(Debug, Clone)]
pub enum MockBehaviour {
    /// Record the call and continue the chain.
    Continue,
    /// Record the call and end the chain without calling `next`.
    Halt,
    /// Record the call and fail with the given message.
    Fail(String),
    /// Record the call, sleep, then continue.
    Delay(Duration),
}

/// Error raised by a `MockStep` configured with [`MockBehaviour::Fail`].
#[derive(Debug, thiserror::Error)]
#[error("mock step failed: {0}")]
pub struct MockFailure(pub String);

/// A mock step that logs its name on every call.
#[derive(Debug, Clone)]
pub struct MockStep {
    /// Label recorded in the log and reported by `Middleware::name`.
    pub name: String,
    /// What the step will do when invoked.
    pub behaviour: MockBehaviour,
    /// Log every call is appended to (possibly shared with other steps).
    pub calls: CallLog,
}

impl MockStep {
    pub fn new(name: impl Into<String>, behaviour: MockBehaviour, calls: &CallLog) -> Self {
        Self {
            name: name.into(),
            behaviour,
            calls: Arc::clone(calls),
        }
    }

    /// A step that always continues.
    pub fn continuing(name: impl Into<String>, calls: &CallLog) -> Self {
        Self::new(name, MockBehaviour::Continue, calls)
    }

    /// A step that never calls `next`.
    pub fn halting(name: impl Into<String>, calls: &CallLog) -> Self {
        Self::new(name, MockBehaviour::Halt, calls)
    }

    /// A step that always fails.
    pub fn failing(name: impl Into<String>, msg: impl Into<String>, calls: &CallLog) -> Self {
        Self::new(name, MockBehaviour::Fail(msg.into()), calls)
    }

    /// A step that sleeps before continuing.
    pub fn delayed(name: impl Into<String>, delay: Duration, calls: &CallLog) -> Self {
        Self::new(name, MockBehaviour::Delay(delay), calls)
    }

    /// Number of times this step has been invoked.
    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|n| **n == self.name)
            .count()
    }

    /// Wrap into a shareable step.
    pub fn shared<T>(self) -> crate::SharedStep<T>
    where
        T: Send + Sync + 'static,
    {
        Arc::new(self)
    }
}

#[async_trait]
impl<T> Middleware<T> for MockStep
where
    T: Send + Sync + 'static,
{
    async fn handle(&self, _ctx: &T, next: Next<'_, T>) -> StepResult {
        self.calls.lock().unwrap().push(self.name.clone());

        match &self.behaviour {
            MockBehaviour::Continue => next.run().await,
            MockBehaviour::Halt => Ok(()),
            MockBehaviour::Fail(msg) => Err(Box::new(MockFailure(msg.clone()))),
            MockBehaviour::Delay(delay) => {
                tokio::time::sleep(*delay).await;
                next.run().await
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
