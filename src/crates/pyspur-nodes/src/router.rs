//! `Router` — branches on declared conditions.
//!
//! Ground: spec.md §4.1 "RouterNode" + §4.3 "Route selection policy"
//! (Open Question 1, resolved: first declared-order match wins). The
//! condition language itself lives in `pyspur_core::template::RouteMap`;
//! this node only parses `config.route_map` into that shape and reports
//! which route won. The scheduler (`pyspur-core::scheduler::executor`)
//! reads the router's persisted `Task.inputs` back out as the value it
//! propagates on the winning `source_handle` — this node's own output is
//! just `{ "selected": route_name | null }`.

use async_trait::async_trait;
use serde_json::Value;

use pyspur_core::node::{ExecutionContext, NodeExecutor, NodeManifestCategory, NodeOutcome, VisualTag};
use pyspur_core::template::{Condition, ConditionGroup, RouteMap, TemplateContext};

pub struct RouterNode;

#[async_trait]
impl NodeExecutor for RouterNode {
    fn output_schema(&self) -> Option<Value> {
        Some(serde_json::json!({
            "type": "object",
            "properties": {"selected": {"type": ["string", "null"]}},
            "required": ["selected"]
        }))
    }

    fn has_fixed_output(&self) -> bool {
        true
    }

    fn manifest_category(&self) -> NodeManifestCategory {
        NodeManifestCategory::Logic
    }

    fn visual_tag(&self) -> VisualTag {
        VisualTag::new("RTR", "#ca8a04")
    }

    async fn execute(&self, config: &Value, inputs: Value, _context: &ExecutionContext) -> NodeOutcome {
        let route_map = match parse_route_map(config) {
            Ok(map) => map,
            Err(e) => return NodeOutcome::Failed(format!("invalid route_map: {e}")),
        };
        let context: TemplateContext = match inputs {
            Value::Object(map) => map.into_iter().collect(),
            _ => TemplateContext::new(),
        };
        let selected = route_map.select(&context).map(str::to_string);
        NodeOutcome::Completed(serde_json::json!({ "selected": selected }))
    }
}

fn parse_route_map(config: &Value) -> Result<RouteMap, String> {
    let Some(object) = config.get("route_map").and_then(Value::as_object) else {
        return Ok(RouteMap::default());
    };
    let mut routes = Vec::with_capacity(object.len());
    for (name, spec) in object {
        let conditions = spec
            .get("conditions")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let mut parsed = Vec::with_capacity(conditions.len());
        for condition in conditions {
            let condition: Condition = serde_json::from_value(condition).map_err(|e| e.to_string())?;
            parsed.push(condition);
        }
        routes.push((name.clone(), ConditionGroup { conditions: parsed }));
    }
    Ok(RouteMap { routes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::noop_context;
    use serde_json::json;

    #[tokio::test]
    async fn first_matching_route_wins_in_declared_order() {
        let node = RouterNode;
        let config = json!({
            "route_map": {
                "pos": {"conditions": [{"variable": "input.n", "operator": "greater_than", "value": 0}]},
                "neg": {"conditions": [{"variable": "input.n", "operator": "less_than", "value": 0}]},
            }
        });
        let outcome = node.execute(&config, json!({"input": {"n": 5}}), &noop_context()).await;
        assert!(matches!(outcome, NodeOutcome::Completed(v) if v == json!({"selected": "pos"})));
    }

    #[tokio::test]
    async fn no_match_selects_null() {
        let node = RouterNode;
        let config = json!({
            "route_map": {"pos": {"conditions": [{"variable": "input.n", "operator": "greater_than", "value": 0}]}}
        });
        let outcome = node.execute(&config, json!({"input": {"n": -1}}), &noop_context()).await;
        assert!(matches!(outcome, NodeOutcome::Completed(v) if v == json!({"selected": null})));
    }
}
