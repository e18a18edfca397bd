//! Nested ID tree produced by `Node::explore`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// `{ id: subtree }` for every output, recursively. Serializes as a plain
/// nested JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tree(BTreeMap<String, Tree>);

impl Tree {
    pub fn get(&self, id: &str) -> Option<&Tree> {
        self.0.get(id)
    }

    /// IDs at this level, sorted.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_leaf(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Tree)> for Tree {
    fn from_iter<I: IntoIterator<Item = (String, Tree)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
