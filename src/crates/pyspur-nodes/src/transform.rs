//! `PythonFunc` — declarative multi-field transform.
//!
//! Ground: spec.md §4.1 "PythonFuncNode" and its Design Note permitting a
//! declarative substitute for hosted Python. `config.outputs` is a JSON
//! object of `{ field_name: expression }`; each expression is evaluated by
//! [`crate::expr`] against the node's resolved inputs, and the results are
//! assembled into a single output object keyed by field name.

use async_trait::async_trait;
use serde_json::Value;

use pyspur_core::node::{ExecutionContext, NodeExecutor, NodeOutcome, VisualTag};
use pyspur_core::template::TemplateContext;

use crate::expr;

pub struct PythonFuncNode;

#[async_trait]
impl NodeExecutor for PythonFuncNode {
    fn visual_tag(&self) -> VisualTag {
        VisualTag::new("FN", "#ea580c")
    }

    async fn execute(&self, config: &Value, inputs: Value, _context: &ExecutionContext) -> NodeOutcome {
        let Some(outputs) = config.get("outputs").and_then(Value::as_object) else {
            return NodeOutcome::Failed("PythonFunc config missing 'outputs' object".into());
        };
        let context: TemplateContext = match inputs {
            Value::Object(map) => map.into_iter().collect(),
            _ => TemplateContext::new(),
        };
        let mut result = serde_json::Map::with_capacity(outputs.len());
        for (field, expression) in outputs {
            let Some(expression) = expression.as_str() else {
                return NodeOutcome::Failed(format!("output field '{field}' expression must be a string"));
            };
            match expr::evaluate(expression, &context) {
                Ok(value) => {
                    result.insert(field.clone(), value);
                }
                Err(e) => return NodeOutcome::Failed(format!("output field '{field}': {e}")),
            }
        }
        NodeOutcome::Completed(Value::Object(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::noop_context;
    use serde_json::json;

    #[tokio::test]
    async fn evaluates_each_declared_field() {
        let node = PythonFuncNode;
        let config = json!({"outputs": {"y": "input.x * 2", "label": "\"n=\" + input.x"}});
        let outcome = node.execute(&config, json!({"input": {"x": 3}}), &noop_context()).await;
        assert!(matches!(outcome, NodeOutcome::Completed(v) if v == json!({"y": 6.0, "label": "n=3"})));
    }

    #[tokio::test]
    async fn bad_expression_fails_the_node() {
        let node = PythonFuncNode;
        let config = json!({"outputs": {"y": "input.x +"}});
        let outcome = node.execute(&config, json!({"input": {"x": 3}}), &noop_context()).await;
        assert!(matches!(outcome, NodeOutcome::Failed(_)));
    }
}
