//! A compiled, lookup-friendly view of one `WorkflowDefinition` scope.
//!
//! Ground: teacher's `graph.rs` `Graph` struct (adjacency maps built once at
//! compile time, walked many times during execution) and `pregel/algo.rs`'s
//! topological bookkeeping, narrowed to PySpur's flat node/link shape.

use std::collections::HashMap;

use pyspur_store::{Link, Node, WorkflowDefinition};

pub const INPUT_NODE_TYPE: &str = "Input";
pub const OUTPUT_NODE_TYPE: &str = "Output";

/// One workflow scope (root or a subworkflow), indexed for O(1) predecessor
/// / successor lookups during scheduling.
pub struct CompiledGraph {
    pub nodes: HashMap<String, Node>,
    pub predecessors: HashMap<String, Vec<Link>>,
    pub successors: HashMap<String, Vec<Link>>,
    pub output_node_ids: Vec<String>,
    pub input_node_id: Option<String>,
}

impl CompiledGraph {
    pub fn compile(definition: &WorkflowDefinition) -> Self {
        let mut nodes = HashMap::new();
        let mut predecessors: HashMap<String, Vec<Link>> = HashMap::new();
        let mut successors: HashMap<String, Vec<Link>> = HashMap::new();
        let mut output_node_ids = Vec::new();
        let mut input_node_id = None;

        for node in &definition.nodes {
            if node.node_type == INPUT_NODE_TYPE {
                input_node_id = Some(node.id.clone());
            }
            if node.node_type == OUTPUT_NODE_TYPE {
                output_node_ids.push(node.id.clone());
            }
            nodes.insert(node.id.clone(), node.clone());
        }
        for link in &definition.links {
            predecessors.entry(link.target_id.clone()).or_default().push(link.clone());
            successors.entry(link.source_id.clone()).or_default().push(link.clone());
        }

        Self { nodes, predecessors, successors, output_node_ids, input_node_id }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn predecessor_links(&self, id: &str) -> &[Link] {
        self.predecessors.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn successor_links(&self, id: &str) -> &[Link] {
        self.successors.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Every ancestor of `node_id` (transitive predecessors), used by
    /// `partial_run(rerun_predecessors = true)`.
    pub fn ancestors_of(&self, node_id: &str) -> Vec<String> {
        let mut visited = std::collections::HashSet::new();
        let mut stack = vec![node_id.to_string()];
        let mut out = Vec::new();
        while let Some(id) = stack.pop() {
            for link in self.predecessor_links(&id) {
                if visited.insert(link.source_id.clone()) {
                    out.push(link.source_id.clone());
                    stack.push(link.source_id.clone());
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyspur_store::SpurType;

    fn node(id: &str, node_type: &str) -> Node {
        Node {
            id: id.into(),
            title: id.into(),
            node_type: node_type.into(),
            config: serde_json::Map::new(),
            coordinates: None,
            parent_id: None,
            subworkflow: None,
        }
    }

    fn link(source: &str, target: &str) -> Link {
        Link { source_id: source.into(), target_id: target.into(), source_handle: None, target_handle: None }
    }

    fn straight_line() -> WorkflowDefinition {
        WorkflowDefinition {
            nodes: vec![node("n1", INPUT_NODE_TYPE), node("n2", "PythonFunc"), node("n3", OUTPUT_NODE_TYPE)],
            links: vec![link("n1", "n2"), link("n2", "n3")],
            test_inputs: vec![],
            spur_type: SpurType::Workflow,
        }
    }

    #[test]
    fn compile_indexes_input_and_output_nodes() {
        let graph = CompiledGraph::compile(&straight_line());
        assert_eq!(graph.input_node_id.as_deref(), Some("n1"));
        assert_eq!(graph.output_node_ids, vec!["n3".to_string()]);
        assert!(graph.node("n2").is_some());
        assert!(graph.node("missing").is_none());
    }

    #[test]
    fn predecessor_and_successor_links_are_indexed_both_ways() {
        let graph = CompiledGraph::compile(&straight_line());
        assert!(graph.predecessor_links("n1").is_empty());
        assert_eq!(graph.predecessor_links("n2").len(), 1);
        assert_eq!(graph.predecessor_links("n2")[0].source_id, "n1");
        assert_eq!(graph.successor_links("n1").len(), 1);
        assert_eq!(graph.successor_links("n1")[0].target_id, "n2");
        assert!(graph.successor_links("n3").is_empty());
    }

    #[test]
    fn ancestors_of_walks_transitively_without_duplicates() {
        let mut definition = straight_line();
        // n4 fans into n2 alongside n1, so n2's ancestors are {n1, n4}.
        definition.nodes.push(node("n4", "PythonFunc"));
        definition.links.push(link("n4", "n2"));
        let graph = CompiledGraph::compile(&definition);
        let mut ancestors = graph.ancestors_of("n3");
        ancestors.sort();
        assert_eq!(ancestors, vec!["n1".to_string(), "n2".to_string(), "n4".to_string()]);
    }
}
