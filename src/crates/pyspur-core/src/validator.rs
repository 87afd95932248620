//! The Workflow Validator: the seven structural checks a `WorkflowDefinition`
//! must pass before a run can start.
//!
//! Ground: teacher's `graph.rs` pre-compilation validation (missing-node and
//! cycle checks via a Kahn's-algorithm topological sort) and `subgraph.rs`'s
//! "nested graph validates as its own atomic unit."

use std::collections::{HashMap, HashSet, VecDeque};

use serde_json::Value;

use pyspur_store::{Node, SpurType, WorkflowDefinition};

use crate::error::{EngineError, Result};
use crate::registry::NodeRegistry;

/// The `title` identifier pattern: letters, digits, underscore, not
/// starting with a digit.
fn is_valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

const INPUT_NODE_TYPE: &str = "Input";
const OUTPUT_NODE_TYPE: &str = "Output";
const ROUTER_NODE_TYPE: &str = "Router";

pub struct WorkflowValidator<'a> {
    registry: &'a NodeRegistry,
}

impl<'a> WorkflowValidator<'a> {
    pub fn new(registry: &'a NodeRegistry) -> Self {
        Self { registry }
    }

    /// Run all seven checks against the root scope, then recurse into every
    /// nested `subworkflow` as its own independent scope.
    pub fn validate(&self, definition: &WorkflowDefinition) -> Result<()> {
        self.validate_scope(definition)?;
        for node in &definition.nodes {
            if let Some(sub) = &node.subworkflow {
                self.validate(sub)?;
            }
        }
        Ok(())
    }

    fn validate_scope(&self, definition: &WorkflowDefinition) -> Result<()> {
        self.check_registered_node_types(&definition.nodes)?;
        self.check_unique_titles(&definition.nodes)?;
        self.check_link_endpoints(definition)?;
        self.check_no_illegal_cycles(definition)?;
        let input_id = self.check_single_input(&definition.nodes)?;
        self.check_output_reachable(definition, &input_id)?;
        self.check_router_handles(definition)?;
        self.check_node_configs(&definition.nodes)?;
        if matches!(definition.spur_type, SpurType::Chatbot) {
            self.check_chatbot_contract(&definition.nodes)?;
        }
        Ok(())
    }

    /// Check 6: titles are valid identifiers, unique within this scope.
    fn check_unique_titles(&self, nodes: &[Node]) -> Result<()> {
        let mut seen = HashSet::new();
        for node in nodes {
            if !is_valid_identifier(&node.title) {
                return Err(EngineError::Validation(format!("node title '{}' is not a valid identifier", node.title)));
            }
            if !seen.insert(node.title.as_str()) {
                return Err(EngineError::Validation(format!("duplicate node title '{}' in scope", node.title)));
            }
        }
        Ok(())
    }

    /// Check 3: every link's endpoints reference nodes that exist in this scope.
    fn check_link_endpoints(&self, definition: &WorkflowDefinition) -> Result<()> {
        let ids: HashSet<&str> = definition.nodes.iter().map(|n| n.id.as_str()).collect();
        for link in &definition.links {
            if !ids.contains(link.source_id.as_str()) {
                return Err(EngineError::Validation(format!("link source '{}' does not exist in scope", link.source_id)));
            }
            if !ids.contains(link.target_id.as_str()) {
                return Err(EngineError::Validation(format!("link target '{}' does not exist in scope", link.target_id)));
            }
        }
        Ok(())
    }

    /// Check 4: no cycles among non-loop nodes. A node with a non-empty
    /// `subworkflow` is itself treated as one atomic unit in this scope's
    /// graph — its internal loop-back edges live in its own nested scope
    /// and are checked separately by the recursive `validate` call.
    fn check_no_illegal_cycles(&self, definition: &WorkflowDefinition) -> Result<()> {
        let mut indegree: HashMap<&str, usize> = definition.nodes.iter().map(|n| (n.id.as_str(), 0)).collect();
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for link in &definition.links {
            adjacency.entry(link.source_id.as_str()).or_default().push(link.target_id.as_str());
            *indegree.entry(link.target_id.as_str()).or_insert(0) += 1;
        }

        let mut queue: VecDeque<&str> = indegree.iter().filter(|(_, &d)| d == 0).map(|(id, _)| *id).collect();
        let mut visited = 0usize;
        while let Some(id) = queue.pop_front() {
            visited += 1;
            if let Some(targets) = adjacency.get(id) {
                for &target in targets {
                    let entry = indegree.get_mut(target).expect("target present in indegree map");
                    *entry -= 1;
                    if *entry == 0 {
                        queue.push_back(target);
                    }
                }
            }
        }

        if visited != definition.nodes.len() {
            return Err(EngineError::Validation(
                "workflow contains a cycle outside any loop group's subworkflow".into(),
            ));
        }
        Ok(())
    }

    /// Check 1: exactly one InputNode at this scope.
    fn check_single_input(&self, nodes: &[Node]) -> Result<String> {
        let inputs: Vec<&Node> = nodes.iter().filter(|n| n.node_type == INPUT_NODE_TYPE).collect();
        match inputs.as_slice() {
            [single] => Ok(single.id.clone()),
            [] => Err(EngineError::Validation("workflow scope has no InputNode".into())),
            _ => Err(EngineError::Validation(format!("workflow scope has {} InputNodes, expected exactly one", inputs.len()))),
        }
    }

    /// Check 2: at least one OutputNode reachable from the InputNode.
    fn check_output_reachable(&self, definition: &WorkflowDefinition, input_id: &str) -> Result<()> {
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for link in &definition.links {
            adjacency.entry(link.source_id.as_str()).or_default().push(link.target_id.as_str());
        }
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([input_id]);
        visited.insert(input_id);
        while let Some(id) = queue.pop_front() {
            if let Some(targets) = adjacency.get(id) {
                for &target in targets {
                    if visited.insert(target) {
                        queue.push_back(target);
                    }
                }
            }
        }
        let has_output = definition
            .nodes
            .iter()
            .any(|n| n.node_type == OUTPUT_NODE_TYPE && visited.contains(n.id.as_str()));
        if !has_output {
            return Err(EngineError::Validation("no OutputNode reachable from the InputNode".into()));
        }
        Ok(())
    }

    /// Check 5: router `source_handle` values on outgoing links are present
    /// in that router's `route_map` (stored under `config.route_map`).
    fn check_router_handles(&self, definition: &WorkflowDefinition) -> Result<()> {
        for node in &definition.nodes {
            if node.node_type != ROUTER_NODE_TYPE {
                continue;
            }
            let route_names: HashSet<String> = node
                .config
                .get("route_map")
                .and_then(|v| v.as_object())
                .map(|m| m.keys().cloned().collect())
                .unwrap_or_default();
            for link in definition.links.iter().filter(|l| l.source_id == node.id) {
                if let Some(handle) = &link.source_handle {
                    if !route_names.contains(handle) {
                        return Err(EngineError::Validation(format!(
                            "router '{}' link references unknown route '{}'",
                            node.title, handle
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Check 7: chatbot spurs' InputNode/OutputNode declare the fixed
    /// chat fields.
    fn check_chatbot_contract(&self, nodes: &[Node]) -> Result<()> {
        let input = nodes.iter().find(|n| n.node_type == INPUT_NODE_TYPE);
        let output = nodes.iter().find(|n| n.node_type == OUTPUT_NODE_TYPE);
        let declares = |node: Option<&Node>, field: &str| {
            node.map(|n| n.config.contains_key(field)).unwrap_or(false)
        };
        for field in ["user_message", "session_id", "message_history"] {
            if !declares(input, field) {
                return Err(EngineError::Validation(format!(
                    "chatbot InputNode must declare '{field}'"
                )));
            }
        }
        if !declares(output, "assistant_message") {
            return Err(EngineError::Validation("chatbot OutputNode must declare 'assistant_message'".into()));
        }
        Ok(())
    }

    /// Confirm every node's `node_type` resolves in the registry — not one
    /// of the seven listed checks, but a precondition the scheduler relies
    /// on before it can even ask a node for its schema. Scope-local only;
    /// `validate` recurses into nested `subworkflow`s on its own.
    fn check_registered_node_types(&self, nodes: &[Node]) -> Result<()> {
        for node in nodes {
            self.registry.lookup(&node.node_type)?;
        }
        Ok(())
    }

    /// Validate every node's `config` against its type's declared
    /// `config_schema`, if any (spec.md §4.2 "JSON-schema validation for
    /// node config"). Node types that declare no schema are unconstrained.
    fn check_node_configs(&self, nodes: &[Node]) -> Result<()> {
        for node in nodes {
            let descriptor = self.registry.lookup(&node.node_type)?;
            if let Some(schema) = descriptor.executor.config_schema() {
                let config = Value::Object(node.config.clone());
                crate::schema::validate_node_config(&node.id, &schema, &config)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{ExecutionContext, NodeExecutor, NodeOutcome};
    use crate::registry::NodeCategory;
    use async_trait::async_trait;
    use pyspur_store::{Link, Node};
    use serde_json::json;
    use std::sync::Arc;

    struct EchoExecutor;

    #[async_trait]
    impl NodeExecutor for EchoExecutor {
        async fn execute(&self, _config: &Value, inputs: Value, _context: &ExecutionContext) -> NodeOutcome {
            NodeOutcome::Completed(inputs)
        }
    }

    /// A registry with every node type the tests below reference, so the
    /// registered-type check doesn't mask the structural check each test
    /// actually exercises.
    fn registry() -> NodeRegistry {
        let mut registry = NodeRegistry::new();
        for node_type in ["Input", "PythonFunc", "Output", "Router"] {
            registry.register(node_type, NodeCategory::Compute, Arc::new(EchoExecutor));
        }
        registry
    }

    fn node(id: &str, title: &str, node_type: &str) -> Node {
        Node { id: id.into(), title: title.into(), node_type: node_type.into(), config: serde_json::Map::new(), coordinates: None, parent_id: None, subworkflow: None }
    }

    fn link(source: &str, target: &str) -> Link {
        Link { source_id: source.into(), target_id: target.into(), source_handle: None, target_handle: None }
    }

    fn straight_line() -> WorkflowDefinition {
        WorkflowDefinition {
            nodes: vec![node("n1", "input", "Input"), node("n2", "compute", "PythonFunc"), node("n3", "output", "Output")],
            links: vec![link("n1", "n2"), link("n2", "n3")],
            test_inputs: vec![],
            spur_type: SpurType::Workflow,
        }
    }

    #[test]
    fn straight_line_is_valid() {
        let registry = registry();
        let validator = WorkflowValidator::new(&registry);
        assert!(validator.validate(&straight_line()).is_ok());
    }

    #[test]
    fn duplicate_titles_rejected() {
        let registry = registry();
        let validator = WorkflowValidator::new(&registry);
        let mut def = straight_line();
        def.nodes[1].title = "input".into();
        assert!(validator.validate(&def).is_err());
    }

    #[test]
    fn two_input_nodes_rejected() {
        let registry = registry();
        let validator = WorkflowValidator::new(&registry);
        let mut def = straight_line();
        def.nodes.push(node("n4", "input2", "Input"));
        assert!(validator.validate(&def).is_err());
    }

    #[test]
    fn cycle_outside_loop_rejected() {
        let registry = registry();
        let validator = WorkflowValidator::new(&registry);
        let mut def = straight_line();
        def.links.push(link("n3", "n2"));
        assert!(validator.validate(&def).is_err());
    }

    #[test]
    fn dangling_link_target_rejected() {
        let registry = registry();
        let validator = WorkflowValidator::new(&registry);
        let mut def = straight_line();
        def.links.push(link("n2", "missing"));
        assert!(validator.validate(&def).is_err());
    }

    #[test]
    fn router_unknown_handle_rejected() {
        let registry = registry();
        let validator = WorkflowValidator::new(&registry);
        let mut def = straight_line();
        def.nodes[1].node_type = "Router".into();
        def.nodes[1].config.insert("route_map".into(), json!({"pos": {}}));
        def.links[1].source_handle = Some("neg".into());
        assert!(validator.validate(&def).is_err());
    }

    #[test]
    fn unregistered_node_type_rejected() {
        let registry = registry();
        let validator = WorkflowValidator::new(&registry);
        let mut def = straight_line();
        def.nodes[1].node_type = "NotARealNodeType".into();
        assert!(validator.validate(&def).is_err());
    }

    #[test]
    fn node_config_violating_its_schema_rejected() {
        let mut registry = registry();
        struct SchemaExecutor;
        #[async_trait]
        impl NodeExecutor for SchemaExecutor {
            fn config_schema(&self) -> Option<Value> {
                Some(json!({"type": "object", "required": ["model"]}))
            }
            async fn execute(&self, _config: &Value, inputs: Value, _context: &ExecutionContext) -> NodeOutcome {
                NodeOutcome::Completed(inputs)
            }
        }
        registry.register("Schematic", NodeCategory::Compute, Arc::new(SchemaExecutor));
        let validator = WorkflowValidator::new(&registry);
        let mut def = straight_line();
        def.nodes[1].node_type = "Schematic".into();
        assert!(validator.validate(&def).is_err());
    }
}
