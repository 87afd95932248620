//! Built-in node type implementations, registered into a
//! [`pyspur_core::registry::NodeRegistry`] by [`register_builtins`].
//!
//! Ground: teacher's `langgraph-prebuilt` crate (a catalog of ready-made
//! graph node implementations shipped alongside the core graph engine),
//! generalized from "ready-made LangGraph agent patterns" (ReAct,
//! Plan-and-Execute, Reflection) to PySpur's own fixed node vocabulary
//! (spec.md §4.1).

use std::sync::Arc;
use std::collections::HashMap;

use serde_json::Value;

use pyspur_core::llm::ChatModel;
use pyspur_core::registry::{NodeCategory, NodeRegistry};

pub mod agent;
pub mod expr;
pub mod for_loop;
pub mod human_intervention;
pub mod input;
pub mod llm_node;
pub mod output;
pub mod router;
pub mod static_value;
#[cfg(test)]
mod test_support;
pub mod tool;
pub mod transform;

/// Register every built-in node type under its `spec.md` §4.1 name.
///
/// `chat_model` backs both the `Llm` node and the `Agent` node's internal
/// tool-calling loop; callers supply a [`pyspur_core::llm::NullChatModel`]
/// in tests and a real provider client in production.
pub fn register_builtins(registry: &mut NodeRegistry, chat_model: Arc<dyn ChatModel>) {
    registry.register("Input", NodeCategory::Compute, Arc::new(input::InputNode));
    registry.register("Output", NodeCategory::Compute, Arc::new(output::OutputNode));
    registry.register("StaticValue", NodeCategory::Compute, Arc::new(static_value::StaticValueNode));
    registry.register("PythonFunc", NodeCategory::Compute, Arc::new(transform::PythonFuncNode));
    registry.register("Router", NodeCategory::Compute, Arc::new(router::RouterNode));
    registry.register("ForLoop", NodeCategory::Compute, Arc::new(for_loop::ForLoopNode));
    registry.register("HumanIntervention", NodeCategory::Compute, Arc::new(human_intervention::HumanInterventionNode));
    registry.register("Tool", NodeCategory::Http, Arc::new(tool::ToolNode));
    registry.register("Llm", NodeCategory::Llm, Arc::new(llm_node::LlmNode::new(chat_model.clone())));
    registry.register("Agent", NodeCategory::Llm, Arc::new(agent::AgentNode::new(chat_model)));
}

/// A subworkflow's output-node map collapses to a single value the same
/// way `Run.outputs` does: one output node's value directly, several
/// merged into an object keyed by node id.
pub(crate) fn single_subworkflow_output(outputs: &HashMap<String, Value>) -> Value {
    if outputs.len() == 1 {
        return outputs.values().next().cloned().unwrap_or(Value::Null);
    }
    Value::Object(outputs.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyspur_core::llm::NullChatModel;

    #[test]
    fn register_builtins_covers_every_spec_node_type() {
        let mut registry = NodeRegistry::new();
        register_builtins(&mut registry, Arc::new(NullChatModel::new()));
        for node_type in [
            "Input", "Output", "StaticValue", "PythonFunc", "Router", "ForLoop", "HumanIntervention", "Tool", "Llm", "Agent",
        ] {
            assert!(registry.contains(node_type), "missing node type: {node_type}");
        }
    }
}
