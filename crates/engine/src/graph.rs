//! Graph: the registry that owns every node it creates.
//!
//! Links between nodes are weak references, so the registry is what keeps a
//! linked node alive once the caller has dropped its own handle.

use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use crate::{EngineError, Node, NodeOptions};

/// Concurrent `id -> Node` registry. Cloning yields a view of the same graph.
pub struct Graph<T> {
    nodes: Arc<DashMap<String, Node<T>>>,
}

impl<T> Graph<T> {
    pub fn new() -> Self {
        Self {
            nodes: Arc::new(DashMap::new()),
        }
    }

    /// Create and register a node.
    ///
    /// # Errors
    /// [`EngineError::DuplicateNodeId`] if a node with the same ID is
    /// already registered.
    pub fn add_node(&self, options: NodeOptions<T>) -> Result<Node<T>, EngineError> {
        let node = Node::from_options(options);
        match self.nodes.entry(node.id().to_owned()) {
            Entry::Occupied(entry) => Err(EngineError::DuplicateNodeId(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(node.clone());
                debug!(node = node.id(), "node registered");
                Ok(node)
            }
        }
    }

    /// Register an always-active node with the given ID.
    ///
    /// # Errors
    /// [`EngineError::DuplicateNodeId`] if the ID is taken.
    pub fn add(&self, id: impl Into<String>) -> Result<Node<T>, EngineError> {
        self.add_node(NodeOptions::new().id(id))
    }

    pub fn node(&self, id: &str) -> Option<Node<T>> {
        self.nodes.get(id).map(|entry| entry.value().clone())
    }

    /// Unregister a node. Links pointing at it stop firing once the last
    /// handle to it is dropped.
    pub fn remove(&self, id: &str) -> Option<Node<T>> {
        let removed = self.nodes.remove(id).map(|(_, node)| node);
        if removed.is_some() {
            debug!(node = id, "node removed");
        }
        removed
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Registered IDs, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.nodes.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl<T> Default for Graph<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Graph<T> {
    fn clone(&self) -> Self {
        Self {
            nodes: Arc::clone(&self.nodes),
        }
    }
}

impl<T> fmt::Debug for Graph<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph").field("nodes", &self.ids()).finish()
    }
}
