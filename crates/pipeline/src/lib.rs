//! `pipeline` crate: the `Middleware` trait and the executor that runs an
//! ordered chain of steps over a shared context.
//!
//! Every step a node runs implements [`Middleware`]. The engine crate builds
//! a fresh [`Pipeline`] from a node's stack on each touch.

pub mod adapters;
pub mod error;
pub mod executor;
pub mod mock;
pub mod traits;

pub use adapters::{from_fn, step_fn};
pub use error::{ChainFailure, StepError, StepFailure, StepResult};
pub use executor::{Next, Pipeline};
pub use traits::{Middleware, SharedStep};

pub use tokio_util::sync::CancellationToken;
