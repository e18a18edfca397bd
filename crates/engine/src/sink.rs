//! Sinks: terminal observers of a node's context.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

/// A sink shared between a node and its in-flight fan-outs.
///
/// Sinks are compared by pointer identity, so keep the `Arc` around to
/// remove it again with `Node::unsink`.
pub type SharedSink<T> = Arc<dyn Sink<T>>;

/// Receives the context after a node's middleware chain has succeeded.
///
/// Sinks run detached; nothing they do is reported back to the toucher.
#[async_trait]
pub trait Sink<T>: Send + Sync {
    async fn emit(&self, ctx: Arc<T>);
}

/// A sink backed by a synchronous closure.
pub struct FnSink<F>(F);

#[async_trait]
impl<T, F> Sink<T> for FnSink<F>
where
    T: Send + Sync + 'static,
    F: Fn(&T) + Send + Sync,
{
    async fn emit(&self, ctx: Arc<T>) {
        (self.0)(&ctx)
    }
}

impl<F> fmt::Debug for FnSink<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnSink")
    }
}

/// Build a sink from a closure.
pub fn sink_fn<T, F>(f: F) -> SharedSink<T>
where
    T: Send + Sync + 'static,
    F: Fn(&T) + Send + Sync + 'static,
{
    Arc::new(FnSink(f))
}

/// Identity comparison that ignores vtable pointers.
pub(crate) fn same_sink<T>(a: &SharedSink<T>, b: &SharedSink<T>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}
