//! The Node Registry: maps a workflow's `node_type` strings to concrete
//! [`NodeExecutor`] implementations.
//!
//! Ground: teacher's `StateGraph::add_node` bookkeeping in `builder.rs`
//! (name -> executor map built up before `compile()`), generalized from
//! "nodes added per-graph" to "node types registered once per process and
//! looked up per-workflow," since PySpur resolves `node_type` against a
//! shared catalog of built-ins (`pyspur-nodes`) rather than building the
//! executor set inline with the graph.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EngineError, Result};
use crate::node::{NodeExecutor, NodeManifestCategory, VisualTag};

/// Coarse resource category used to pick a concurrency pool
///.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCategory {
    Llm,
    Http,
    Compute,
}

/// Static metadata about a registered node type.
#[derive(Clone)]
pub struct NodeTypeDescriptor {
    pub node_type: String,
    pub category: NodeCategory,
    pub executor: Arc<dyn NodeExecutor>,
}

/// The process-wide catalog of node types a [`crate::validator::WorkflowValidator`]
/// and the scheduler resolve `node_type` strings against.
#[derive(Clone, Default)]
pub struct NodeRegistry {
    entries: HashMap<String, NodeTypeDescriptor>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node type. A second registration under the same
    /// `node_type` replaces the first — useful for tests that swap in a
    /// fake executor for a built-in type.
    pub fn register(&mut self, node_type: impl Into<String>, category: NodeCategory, executor: Arc<dyn NodeExecutor>) {
        let node_type = node_type.into();
        self.entries.insert(node_type.clone(), NodeTypeDescriptor { node_type, category, executor });
    }

    pub fn lookup(&self, node_type: &str) -> Result<&NodeTypeDescriptor> {
        self.entries.get(node_type).ok_or_else(|| EngineError::NodeNotRegistered(node_type.to_string()))
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.entries.contains_key(node_type)
    }

    pub fn node_types(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// The registry manifest: every registered node type's declared
    /// schemas and visual metadata, grouped by [`NodeManifestCategory`].
    ///
    /// Ground: spec.md §6, "Node types are discovered via a registry
    /// manifest: `{ category → [ {name, input_schema, output_schema,
    /// config_schema, visual_tag{acronym,color}, has_fixed_output?} ] }`."
    pub fn manifest(&self) -> HashMap<NodeManifestCategory, Vec<NodeManifestEntry>> {
        let mut manifest: HashMap<NodeManifestCategory, Vec<NodeManifestEntry>> = HashMap::new();
        for descriptor in self.entries.values() {
            let entry = NodeManifestEntry {
                name: descriptor.node_type.clone(),
                config_schema: descriptor.executor.config_schema(),
                output_schema: descriptor.executor.output_schema(),
                visual_tag: descriptor.executor.visual_tag(),
                has_fixed_output: descriptor.executor.has_fixed_output(),
            };
            manifest.entry(descriptor.executor.manifest_category()).or_default().push(entry);
        }
        manifest
    }
}

/// One node type's entry in [`NodeRegistry::manifest`].
#[derive(Clone)]
pub struct NodeManifestEntry {
    pub name: String,
    pub config_schema: Option<Value>,
    pub output_schema: Option<Value>,
    pub visual_tag: VisualTag,
    pub has_fixed_output: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{ExecutionContext, NodeOutcome};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct EchoExecutor;

    #[async_trait]
    impl NodeExecutor for EchoExecutor {
        async fn execute(&self, _config: &Value, inputs: Value, _context: &ExecutionContext) -> NodeOutcome {
            NodeOutcome::Completed(inputs)
        }
    }

    #[test]
    fn lookup_missing_type_errors() {
        let registry = NodeRegistry::new();
        assert!(registry.lookup("Input").is_err());
    }

    #[test]
    fn register_then_lookup_succeeds() {
        let mut registry = NodeRegistry::new();
        registry.register("Input", NodeCategory::Compute, Arc::new(EchoExecutor));
        let descriptor = registry.lookup("Input").unwrap();
        assert_eq!(descriptor.node_type, "Input");
        assert_eq!(descriptor.category, NodeCategory::Compute);
        let _ = json!({});
    }

    #[test]
    fn manifest_groups_entries_by_manifest_category_and_carries_visual_tag() {
        let mut registry = NodeRegistry::new();
        registry.register("Echo", NodeCategory::Compute, Arc::new(EchoExecutor));
        let manifest = registry.manifest();
        let entries = manifest.get(&NodeManifestCategory::Primitive).expect("default manifest category present");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "Echo");
        assert_eq!(entries[0].visual_tag.acronym, "ND");
        assert!(!entries[0].has_fixed_output);
    }
}
