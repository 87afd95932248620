//! YAML import/export for workflow definitions: an optional editor-adjacent
//! convenience, the canonical on-the-wire shape stays JSON.
//!
//! Ground: teacher's `YamlGraphDef::from_file`/`from_str`/`validate`
//! load-then-validate pattern, narrowed from the teacher's own
//! handler/channel-name YAML schema to PySpur's existing
//! [`WorkflowDefinition`] serde shape — the format doesn't invent a second
//! schema, it just lets one be authored by hand in YAML instead of JSON.

use std::path::Path;

use pyspur_store::WorkflowDefinition;

use crate::error::Result;
use crate::validator::WorkflowValidator;
use crate::registry::NodeRegistry;

/// Parse a [`WorkflowDefinition`] from a YAML file.
pub fn from_file(path: impl AsRef<Path>) -> Result<WorkflowDefinition> {
    let content = std::fs::read_to_string(path)?;
    from_str(&content)
}

/// Parse a [`WorkflowDefinition`] from a YAML string.
pub fn from_str(yaml: &str) -> Result<WorkflowDefinition> {
    Ok(serde_yaml::from_str(yaml)?)
}

/// Render a [`WorkflowDefinition`] back to YAML.
pub fn to_string(definition: &WorkflowDefinition) -> Result<String> {
    Ok(serde_yaml::to_string(definition)?)
}

/// Parse and structurally validate a definition in one call, the way an
/// editor's "import workflow.yaml" action would.
pub fn load_and_validate(path: impl AsRef<Path>, registry: &NodeRegistry) -> Result<WorkflowDefinition> {
    let definition = from_file(path)?;
    WorkflowValidator::new(registry).validate(&definition)?;
    Ok(definition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyspur_store::SpurType;

    fn sample() -> WorkflowDefinition {
        WorkflowDefinition {
            nodes: vec![pyspur_store::Node {
                id: "n1".into(),
                title: "input".into(),
                node_type: "Input".into(),
                config: serde_json::Map::new(),
                coordinates: None,
                parent_id: None,
                subworkflow: None,
            }],
            links: vec![],
            test_inputs: vec![],
            spur_type: SpurType::Workflow,
        }
    }

    #[test]
    fn round_trips_through_yaml() {
        let yaml = to_string(&sample()).unwrap();
        let parsed = from_str(&yaml).unwrap();
        assert_eq!(parsed.nodes.len(), 1);
        assert_eq!(parsed.nodes[0].node_type, "Input");
    }
}
