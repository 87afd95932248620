//! JSON Schema validation for node `config` and resolved `inputs`/`outputs`.
//!
//! Always-on: every registered node type declares a schema, and a workflow
//! is rejected at validation time if a node's `config` doesn't satisfy it.

use jsonschema::JSONSchema;
use serde_json::Value;

use crate::error::{EngineError, Result};

/// A compiled JSON Schema, ready for repeated validation.
pub struct CompiledSchema {
    schema: JSONSchema,
}

impl CompiledSchema {
    /// Compile `schema`. Node type schemas are registered once per process
    /// (at registry-init time), so the leak below is bounded by the number
    /// of distinct node types, not by validation calls.
    pub fn compile(schema: &Value) -> Result<Self> {
        let leaked: &'static Value = Box::leak(Box::new(schema.clone()));
        let schema = JSONSchema::compile(leaked)
            .map_err(|e| EngineError::Validation(format!("invalid JSON schema: {e}")))?;
        Ok(Self { schema })
    }

    /// Validate `instance`, collecting every violation rather than
    /// stopping at the first (useful for surfacing a complete error to a
    /// workflow author in one pass).
    pub fn validate(&self, instance: &Value) -> std::result::Result<(), Vec<String>> {
        match self.schema.validate(instance) {
            Ok(()) => Ok(()),
            Err(errors) => Err(errors.map(|e| e.to_string()).collect()),
        }
    }

    pub fn is_valid(&self, instance: &Value) -> bool {
        self.schema.is_valid(instance)
    }
}

/// Validate `config` for `node_id` against `schema`, turning the first
/// violation into an [`EngineError::SchemaValidation`].
pub fn validate_node_config(node_id: &str, schema: &Value, config: &Value) -> Result<()> {
    let compiled = CompiledSchema::compile(schema)?;
    compiled.validate(config).map_err(|errors| {
        EngineError::schema_validation(node_id, errors.join("; "))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn valid_instance_passes() {
        let schema = json!({
            "type": "object",
            "properties": {"name": {"type": "string"}},
            "required": ["name"]
        });
        let compiled = CompiledSchema::compile(&schema).unwrap();
        assert!(compiled.is_valid(&json!({"name": "input_1"})));
    }

    #[test]
    fn missing_required_field_fails() {
        let schema = json!({
            "type": "object",
            "properties": {"name": {"type": "string"}},
            "required": ["name"]
        });
        assert!(validate_node_config("n1", &schema, &json!({})).is_err());
    }
}
