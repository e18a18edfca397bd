//! Activation predicates for nodes and output links.

use std::fmt;
use std::sync::Arc;

use crate::Node;

/// Predicate closure shared by a node or link.
pub type Predicate<T> = Arc<dyn Fn(&Node<T>, &T) -> bool + Send + Sync>;

/// Decides whether a node (or one of its output links) proceeds.
pub enum Activation<T> {
    /// Always proceed; no closure is evaluated.
    Always,
    /// Proceed when the predicate returns `true` for `(node, context)`.
    When(Predicate<T>),
}

impl<T> Activation<T> {
    /// Wrap a predicate closure.
    pub fn when<F>(predicate: F) -> Self
    where
        F: Fn(&Node<T>, &T) -> bool + Send + Sync + 'static,
    {
        Self::When(Arc::new(predicate))
    }

    /// The single evaluation rule shared by node activation and link
    /// activation. `node` is the node being entered: the owner for its
    /// own activation, the target for a link.
    pub fn should_activate(&self, node: &Node<T>, ctx: &T) -> bool {
        match self {
            Self::Always => true,
            Self::When(predicate) => predicate(node, ctx),
        }
    }

    pub fn is_always(&self) -> bool {
        matches!(self, Self::Always)
    }
}

impl<T> Default for Activation<T> {
    fn default() -> Self {
        Self::Always
    }
}

impl<T> Clone for Activation<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Always => Self::Always,
            Self::When(predicate) => Self::When(Arc::clone(predicate)),
        }
    }
}

impl<T> fmt::Debug for Activation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => f.write_str("Always"),
            Self::When(_) => f.write_str("When(..)"),
        }
    }
}
