//! Node: the unit that activates, runs its middleware stack and fans the
//! context out to linked nodes and sinks.
//!
//! A touch proceeds in three strictly ordered phases:
//! 1. Activation: the node's predicate (or the caller's override) decides
//!    whether anything happens at all.
//! 2. Middleware: a `Pipeline` built from a snapshot of the stack runs over
//!    the context. A failure ends the touch and is returned to the caller.
//! 3. Fan-out: every output whose link predicate accepts the target is
//!    touched on its own task, and every sink is emitted on its own task.
//!    Neither is awaited; the touch returns as soon as phase 2 succeeds.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use dashmap::DashMap;
use futures::future::BoxFuture;
use pipeline::{ChainFailure, Pipeline, SharedStep};
use serde_json::Value;
use tracing::{debug, debug_span, trace, Instrument};
use uuid::Uuid;

use crate::sink::same_sink;
use crate::{Activation, SharedSink, Tree};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Construction options for a node.
pub struct NodeOptions<T> {
    id: Option<String>,
    activation: Activation<T>,
}

impl<T> NodeOptions<T> {
    /// Random ID, always active.
    pub fn new() -> Self {
        Self {
            id: None,
            activation: Activation::Always,
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn activation(mut self, activation: Activation<T>) -> Self {
        self.activation = activation;
        self
    }

    /// Shorthand for `activation(Activation::when(predicate))`.
    pub fn when<F>(self, predicate: F) -> Self
    where
        F: Fn(&Node<T>, &T) -> bool + Send + Sync + 'static,
    {
        self.activation(Activation::when(predicate))
    }
}

impl<T> Default for NodeOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

struct Output<T> {
    // Weak so self-links and cycles never keep nodes alive on their own.
    target: Weak<NodeState<T>>,
    activation: Activation<T>,
}

struct NodeState<T> {
    id: String,
    activation: Activation<T>,
    stack: RwLock<Vec<SharedStep<T>>>,
    outputs: RwLock<HashMap<String, Output<T>>>,
    sinks: RwLock<Vec<SharedSink<T>>>,
    metadata: DashMap<String, Value>,
}

fn read<L>(lock: &RwLock<L>) -> RwLockReadGuard<'_, L> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<L>(lock: &RwLock<L>) -> RwLockWriteGuard<'_, L> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// Handle to a node. Cloning is cheap and yields the same node.
///
/// Nodes are created and owned by a [`Graph`](crate::Graph); links between
/// nodes are weak, so a node lives as long as its graph (or any handle)
/// keeps it.
pub struct Node<T> {
    state: Arc<NodeState<T>>,
}

impl<T> Node<T> {
    pub(crate) fn from_options(options: NodeOptions<T>) -> Self {
        let id = options.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        Self {
            state: Arc::new(NodeState {
                id,
                activation: options.activation,
                stack: RwLock::new(Vec::new()),
                outputs: RwLock::new(HashMap::new()),
                sinks: RwLock::new(Vec::new()),
                metadata: DashMap::new(),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.state.id
    }

    /// The node's own activation predicate.
    pub fn activation(&self) -> Activation<T> {
        self.state.activation.clone()
    }

    // ------ Middleware ------

    /// Append a step to the end of the stack.
    pub fn use_step(&self, step: SharedStep<T>) -> &Self {
        write(&self.state.stack).push(step);
        self
    }

    /// Append several steps, preserving their order.
    pub fn use_steps(&self, steps: impl IntoIterator<Item = SharedStep<T>>) -> &Self {
        write(&self.state.stack).extend(steps);
        self
    }

    pub fn clear_stack(&self) -> &Self {
        write(&self.state.stack).clear();
        self
    }

    /// Snapshot of the current stack, in execution order.
    pub fn stack(&self) -> Vec<SharedStep<T>> {
        read(&self.state.stack).clone()
    }

    // ------ Outputs ------

    /// Link `target` unconditionally.
    pub fn link(&self, target: &Node<T>) -> &Self {
        self.link_with(target, Activation::Always)
    }

    /// Link `target`, gated by `predicate(target, ctx)`.
    pub fn link_when<F>(&self, target: &Node<T>, predicate: F) -> &Self
    where
        F: Fn(&Node<T>, &T) -> bool + Send + Sync + 'static,
    {
        self.link_with(target, Activation::when(predicate))
    }

    /// Insert the link to `target`, replacing the activation of an
    /// existing link to the same node.
    pub fn link_with(&self, target: &Node<T>, activation: Activation<T>) -> &Self {
        let output = Output {
            target: Arc::downgrade(&target.state),
            activation,
        };
        write(&self.state.outputs).insert(target.id().to_owned(), output);
        self
    }

    pub fn unlink(&self, target: &Node<T>) -> &Self {
        write(&self.state.outputs).remove(target.id());
        self
    }

    pub fn unlink_all(&self) -> &Self {
        write(&self.state.outputs).clear();
        self
    }

    /// Live outputs with their link activation. Targets that no longer
    /// exist are left out.
    pub fn outputs(&self) -> Vec<(Node<T>, Activation<T>)> {
        read(&self.state.outputs)
            .iter()
            .filter_map(|(id, output)| {
                let Some(state) = output.target.upgrade() else {
                    trace!(link = %id, "link target dropped");
                    return None;
                };
                Some((Node { state }, output.activation.clone()))
            })
            .collect()
    }

    pub fn is_linked_to(&self, target: &Node<T>) -> bool {
        read(&self.state.outputs)
            .get(target.id())
            .is_some_and(|output| std::ptr::eq(output.target.as_ptr(), Arc::as_ptr(&target.state)))
    }

    // ------ Sinks ------

    /// Register a sink; adding the same `Arc` twice is a no-op.
    pub fn sink(&self, sink: SharedSink<T>) -> &Self {
        let mut sinks = write(&self.state.sinks);
        if !sinks.iter().any(|existing| same_sink(existing, &sink)) {
            sinks.push(sink);
        }
        drop(sinks);
        self
    }

    pub fn unsink(&self, sink: &SharedSink<T>) -> &Self {
        write(&self.state.sinks).retain(|existing| !same_sink(existing, sink));
        self
    }

    pub fn clear_sinks(&self) -> &Self {
        write(&self.state.sinks).clear();
        self
    }

    pub fn sinks(&self) -> Vec<SharedSink<T>> {
        read(&self.state.sinks).clone()
    }

    // ------ Metadata ------

    /// Attach an arbitrary annotation. The engine never reads it.
    pub fn set_meta(&self, key: impl Into<String>, value: impl Into<Value>) -> &Self {
        self.state.metadata.insert(key.into(), value.into());
        self
    }

    pub fn meta(&self, key: &str) -> Option<Value> {
        self.state.metadata.get(key).map(|entry| entry.value().clone())
    }

    pub fn remove_meta(&self, key: &str) -> Option<Value> {
        self.state.metadata.remove(key).map(|(_, value)| value)
    }

    pub fn meta_keys(&self) -> Vec<String> {
        self.state.metadata.iter().map(|entry| entry.key().clone()).collect()
    }

    // ------ Explore ------

    /// Nested ID map of every node reachable through outputs.
    ///
    /// There is no cycle guard: exploring a cyclic graph recurses until
    /// the stack overflows.
    pub fn explore(&self) -> Tree {
        self.outputs()
            .into_iter()
            .map(|(target, _)| (target.id().to_owned(), target.explore()))
            .collect()
    }

    /// [`Node::explore`], nested one level deeper under this node's ID.
    pub fn explore_wrapped(&self) -> Tree {
        Tree::from_iter([(self.id().to_owned(), self.explore())])
    }
}

impl<T> Node<T>
where
    T: Send + Sync + 'static,
{
    /// Activate the node with its own predicate.
    ///
    /// Resolves once the middleware chain is done; linked nodes and sinks
    /// keep running on detached Tokio tasks afterwards, and their outcome
    /// is never reported here.
    ///
    /// # Errors
    /// Returns the [`ChainFailure`] of this node's own middleware chain.
    ///
    /// # Panics
    /// Fan-out spawns tasks, so a touch that reaches fan-out must run
    /// inside a Tokio runtime.
    pub async fn touch(&self, ctx: Arc<T>) -> Result<(), ChainFailure<T>> {
        self.clone().run_touch(ctx, None).await
    }

    /// Like [`Node::touch`], with `activation` replacing the node's own
    /// predicate for this call only.
    ///
    /// # Errors
    /// Returns the [`ChainFailure`] of this node's own middleware chain.
    ///
    /// # Panics
    /// Same as [`Node::touch`]: fan-out must run inside a Tokio runtime.
    pub async fn touch_with(
        &self,
        ctx: Arc<T>,
        activation: &Activation<T>,
    ) -> Result<(), ChainFailure<T>> {
        self.clone().run_touch(ctx, Some(activation.clone())).await
    }

    // Boxed so fan-out can spawn touches of other nodes from inside a touch.
    fn run_touch(
        self,
        ctx: Arc<T>,
        activation: Option<Activation<T>>,
    ) -> BoxFuture<'static, Result<(), ChainFailure<T>>> {
        let span = debug_span!("touch", node = %self.id());
        Box::pin(
            async move {
                let activation = activation.unwrap_or_else(|| self.activation());
                if !activation.should_activate(&self, &ctx) {
                    trace!("activation declined");
                    return Ok(());
                }

                let pipeline = Pipeline::new(self.stack());
                if let Err(failure) = pipeline.run(&ctx).await {
                    debug!(step = failure.step(), "middleware chain failed: {}", failure.cause());
                    return Err(failure);
                }

                self.fan_out(&ctx);
                Ok(())
            }
            .instrument(span),
        )
    }

    fn fan_out(&self, ctx: &Arc<T>) {
        let outputs = self.outputs();
        let sinks = self.sinks();
        let mut touched = 0usize;

        for (target, activation) in outputs {
            if !activation.should_activate(&target, ctx) {
                trace!(link = target.id(), "link declined");
                continue;
            }
            touched += 1;
            let touch = target.run_touch(Arc::clone(ctx), None);
            // Detached: a downstream failure is deliberately dropped.
            drop(tokio::spawn(async move {
                let _ = touch.await;
            }));
        }

        for sink in &sinks {
            let sink = Arc::clone(sink);
            let ctx = Arc::clone(ctx);
            drop(tokio::spawn(async move { sink.emit(ctx).await }.in_current_span()));
        }

        debug!(outputs = touched, sinks = sinks.len(), "fan-out launched");
    }
}

impl<T> Clone for Node<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> PartialEq for Node<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl<T> Eq for Node<T> {}

impl<T> fmt::Debug for Node<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.state.id)
            .field("activation", &self.state.activation)
            .field("steps", &read(&self.state.stack).len())
            .field("outputs", &read(&self.state.outputs).len())
            .field("sinks", &read(&self.state.sinks).len())
            .finish()
    }
}
