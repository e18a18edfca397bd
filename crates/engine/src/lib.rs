//! `engine` crate: nodes, their activation and fan-out, and the graph
//! registry that owns them.
//!
//! A [`Node`] runs its middleware stack through a [`pipeline::Pipeline`]
//! on every touch, then hands the context on to linked nodes and sinks
//! without waiting for them.

pub mod activation;
pub mod error;
pub mod graph;
pub mod node;
pub mod sink;
pub mod tree;

pub use activation::{Activation, Predicate};
pub use error::EngineError;
pub use graph::Graph;
pub use node::{Node, NodeOptions};
pub use sink::{sink_fn, FnSink, SharedSink, Sink};
pub use tree::Tree;

pub use pipeline::{
    from_fn, step_fn, ChainFailure, Middleware, Next, SharedStep, StepError, StepFailure,
    StepResult,
};
