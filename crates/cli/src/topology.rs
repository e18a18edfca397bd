//! JSON topology files: describe a graph, build it, and the context it runs
//! over.
//!
//! ```json
//! {
//!   "nodes": [
//!     { "id": "ingest", "set": { "stage": "ingested" } },
//!     { "id": "alert", "when": { "op": "greater_than", "field": "n", "value": 10 }, "emit": true }
//!   ],
//!   "links": [{ "from": "ingest", "to": "alert" }]
//! }
//! ```

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use engine::{sink_fn, step_fn, Activation, EngineError, Graph, NodeOptions};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;

/// Errors raised while loading or building a topology.
#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    #[error("cannot read topology file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid topology JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A link references a node ID that isn't declared.
    #[error("link references unknown node '{node_id}' ({side} side)")]
    UnknownNodeReference {
        node_id: String,
        side: &'static str,
    },
}

// ---------------------------------------------------------------------------
// File format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Topology {
    pub nodes: Vec<NodeDefinition>,
    #[serde(default)]
    pub links: Vec<LinkDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeDefinition {
    pub id: String,
    /// Node activation; absent means always active.
    #[serde(default)]
    pub when: Option<Condition>,
    /// Fields merged into the state by the node's middleware.
    #[serde(default)]
    pub set: Map<String, Value>,
    /// Attach a sink that prints the state after the node ran.
    #[serde(default)]
    pub emit: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkDefinition {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub when: Option<Condition>,
}

/// Predicate over a top-level field of the JSON state.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    Exists { field: String },
    Equals { field: String, value: Value },
    GreaterThan { field: String, value: f64 },
    LessThan { field: String, value: f64 },
}

impl Condition {
    pub fn holds(&self, state: &Value) -> bool {
        match self {
            Self::Exists { field } => state.get(field).is_some(),
            Self::Equals { field, value } => state.get(field) == Some(value),
            Self::GreaterThan { field, value } => {
                state.get(field).and_then(Value::as_f64).is_some_and(|v| v > *value)
            }
            Self::LessThan { field, value } => {
                state.get(field).and_then(Value::as_f64).is_some_and(|v| v < *value)
            }
        }
    }

    fn activation(&self) -> Activation<Document> {
        let condition = self.clone();
        Activation::when(move |_, doc: &Document| condition.holds(&doc.state()))
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Context shared by every node of one CLI touch: a JSON object plus the
/// order in which nodes ran.
#[derive(Debug, Default)]
pub struct Document {
    state: Mutex<Value>,
    trace: Mutex<Vec<String>>,
}

impl Document {
    pub fn new(state: Value) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
            trace: Mutex::new(Vec::new()),
        })
    }

    pub fn state(&self) -> Value {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn trace(&self) -> Vec<String> {
        self.trace.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn merge(&self, fields: &Map<String, Value>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.is_object() {
            *state = Value::Object(Map::new());
        }
        if let Value::Object(object) = &mut *state {
            object.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
    }

    fn record(&self, id: &str) {
        self.trace
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(id.to_owned());
    }
}

// ---------------------------------------------------------------------------
// Loading + building
// ---------------------------------------------------------------------------

impl Topology {
    /// Read and parse a topology file.
    pub fn load(path: &Path) -> Result<Self, TopologyError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Build a graph with one middleware step (and optionally one sink)
    /// per declared node.
    ///
    /// # Errors
    /// - [`TopologyError::Engine`] if two nodes share an ID.
    /// - [`TopologyError::UnknownNodeReference`] if a link references a
    ///   missing node.
    pub fn build(&self) -> Result<Graph<Document>, TopologyError> {
        let graph = Graph::new();

        for def in &self.nodes {
            let activation = def
                .when
                .as_ref()
                .map_or(Activation::Always, Condition::activation);
            let node = graph.add_node(NodeOptions::new().id(def.id.clone()).activation(activation))?;

            let (id, fields) = (def.id.clone(), def.set.clone());
            node.use_step(step_fn(def.id.clone(), move |doc: &Document| {
                doc.merge(&fields);
                doc.record(&id);
                Ok(())
            }));

            if def.emit {
                let id = def.id.clone();
                node.sink(sink_fn(move |doc: &Document| {
                    println!("{id}: {}", doc.state());
                }));
            }
        }

        for link in &self.links {
            let from = graph.node(&link.from).ok_or_else(|| TopologyError::UnknownNodeReference {
                node_id: link.from.clone(),
                side: "from",
            })?;
            let to = graph.node(&link.to).ok_or_else(|| TopologyError::UnknownNodeReference {
                node_id: link.to.clone(),
                side: "to",
            })?;
            let activation = link
                .when
                .as_ref()
                .map_or(Activation::Always, Condition::activation);
            from.link_with(&to, activation);
        }

        info!(
            "topology built: {} nodes, {} links",
            self.nodes.len(),
            self.links.len()
        );
        Ok(graph)
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn parse(value: Value) -> Topology {
        serde_json::from_value(value).expect("valid topology")
    }

    #[test]
    fn conditions_compare_top_level_fields() {
        let state = json!({ "n": 5, "kind": "order" });

        assert!(Condition::Exists { field: "kind".into() }.holds(&state));
        assert!(!Condition::Exists { field: "missing".into() }.holds(&state));
        assert!(Condition::Equals { field: "kind".into(), value: json!("order") }.holds(&state));
        assert!(Condition::GreaterThan { field: "n".into(), value: 0.0 }.holds(&state));
        assert!(!Condition::LessThan { field: "n".into(), value: 5.0 }.holds(&state));
        assert!(!Condition::GreaterThan { field: "kind".into(), value: 0.0 }.holds(&state));
    }

    #[test]
    fn condition_is_tagged_by_op() {
        let condition: Condition =
            serde_json::from_value(json!({ "op": "greater_than", "field": "n", "value": 0 }))
                .expect("valid condition");
        assert_eq!(condition, Condition::GreaterThan { field: "n".into(), value: 0.0 });
    }

    #[test]
    fn link_to_unknown_node_is_rejected() {
        let topology = parse(json!({
            "nodes": [{ "id": "a" }],
            "links": [{ "from": "a", "to": "ghost" }]
        }));
        assert!(matches!(
            topology.build(),
            Err(TopologyError::UnknownNodeReference { node_id, side: "to" }) if node_id == "ghost"
        ));
    }

    #[test]
    fn duplicate_node_is_rejected() {
        let topology = parse(json!({ "nodes": [{ "id": "a" }, { "id": "a" }] }));
        assert!(matches!(
            topology.build(),
            Err(TopologyError::Engine(EngineError::DuplicateNodeId(id))) if id == "a"
        ));
    }

    #[test]
    fn built_graph_explores_like_the_file() {
        let topology = parse(json!({
            "nodes": [{ "id": "a" }, { "id": "b" }, { "id": "c" }],
            "links": [{ "from": "a", "to": "b" }, { "from": "b", "to": "c" }]
        }));
        let graph = topology.build().expect("valid graph");
        let root = graph.node("a").expect("root exists");

        assert_eq!(
            serde_json::to_value(root.explore_wrapped()).unwrap(),
            json!({ "a": { "b": { "c": {} } } })
        );
    }

    #[tokio::test]
    async fn touch_merges_state_along_qualifying_links() {
        let topology = parse(json!({
            "nodes": [
                { "id": "start", "set": { "stage": "started" } },
                { "id": "big", "set": { "size": "big" } },
                { "id": "small", "set": { "size": "small" } }
            ],
            "links": [
                { "from": "start", "to": "big", "when": { "op": "greater_than", "field": "n", "value": 10 } },
                { "from": "start", "to": "small", "when": { "op": "less_than", "field": "n", "value": 10 } }
            ]
        }));
        let graph = topology.build().expect("valid graph");
        let doc = Document::new(json!({ "n": 42 }));

        graph.node("start").unwrap().touch(Arc::clone(&doc)).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), async {
            while doc.trace().len() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("fan-out should reach 'big'");

        assert_eq!(doc.trace(), vec!["start", "big"]);
        assert_eq!(doc.state(), json!({ "n": 42, "stage": "started", "size": "big" }));
    }
}
