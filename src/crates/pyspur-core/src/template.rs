//! The safe template resolver and router condition sublanguage
//!.
//!
//! Ground: teacher's `state_filter.rs`/`managed.rs` path-lookup helpers,
//! narrowed from "arbitrary JSONPath over graph state" to the two concrete
//! uses PySpur needs: `{{ node.field }}` interpolation into node config,
//! and router condition evaluation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EngineError, Result};

/// `node_title -> its resolved outputs`, the namespace templates and
/// router conditions resolve variable paths against.
pub type TemplateContext = HashMap<String, Value>;

/// Resolve a dotted path (`"node_title.field.nested"`) against a context.
///
/// Returns `Value::Null` for a path whose node exists but whose field does
/// not (absent router handle, optional output) rather than erroring — the
/// scheduler treats `Null` as "value absent" when checking required inputs.
pub fn resolve_path(context: &TemplateContext, path: &str) -> Value {
    let mut segments = path.split('.');
    let Some(root) = segments.next() else {
        return Value::Null;
    };
    let mut current = match context.get(root) {
        Some(v) => v.clone(),
        None => return Value::Null,
    };
    for segment in segments {
        current = match current {
            Value::Object(mut map) => map.remove(segment).unwrap_or(Value::Null),
            _ => Value::Null,
        };
    }
    current
}

/// Render every `{{ path }}` placeholder in `text` by substituting the
/// resolved value's display form.
///
/// A template consisting of exactly one placeholder (`"{{ path }}"`, no
/// surrounding text) resolves to the referenced value's native JSON type
/// rather than its stringification — this lets a node config field bind an
/// upstream number or object directly instead of always getting a string.
pub fn render_value(template: &str, context: &TemplateContext) -> Value {
    if let Some(path) = whole_placeholder(template) {
        return resolve_path(context, path);
    }
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let path = after[..end].trim();
                let resolved = resolve_path(context, path);
                out.push_str(&display_value(&resolved));
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    Value::String(out)
}

/// Recursively render every string leaf of a node `config` object.
pub fn render_config(config: &serde_json::Map<String, Value>, context: &TemplateContext) -> serde_json::Map<String, Value> {
    config
        .iter()
        .map(|(k, v)| (k.clone(), render_json(v, context)))
        .collect()
}

fn render_json(value: &Value, context: &TemplateContext) -> Value {
    match value {
        Value::String(s) => render_value(s, context),
        Value::Array(items) => Value::Array(items.iter().map(|v| render_json(v, context)).collect()),
        Value::Object(map) => Value::Object(render_config(map, context)),
        other => other.clone(),
    }
}

fn whole_placeholder(template: &str) -> Option<&str> {
    let trimmed = template.trim();
    let inner = trimmed.strip_prefix("{{")?.strip_suffix("}}")?;
    Some(inner.trim())
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// -- Router condition DSL --------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Contains,
    Equals,
    NumberEquals,
    GreaterThan,
    LessThan,
    StartsWith,
    NotStartsWith,
    IsEmpty,
    IsNotEmpty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOperator {
    And,
    Or,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub variable: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: Value,
    /// How this condition combines with the *running* result of the
    /// conditions before it. The first condition's `logical_operator` is
    /// ignored (there is nothing to combine with yet).
    #[serde(default)]
    pub logical_operator: Option<LogicalOperator>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConditionGroup {
    pub conditions: Vec<Condition>,
}

impl ConditionGroup {
    /// Evaluate this group's conditions left-to-right against `context`,
    /// folding each one in with its declared logical operator.
    pub fn evaluate(&self, context: &TemplateContext) -> bool {
        let mut result: Option<bool> = None;
        for condition in &self.conditions {
            let value = condition.evaluate(context);
            result = Some(match (result, condition.logical_operator) {
                (None, _) => value,
                (Some(prev), Some(LogicalOperator::Or)) => prev || value,
                (Some(prev), _) => prev && value,
            });
        }
        result.unwrap_or(false)
    }
}

impl Condition {
    pub fn evaluate(&self, context: &TemplateContext) -> bool {
        let actual = resolve_path(context, &self.variable);
        evaluate_operator(self.operator, &actual, &self.value)
    }
}

fn evaluate_operator(operator: ConditionOperator, actual: &Value, expected: &Value) -> bool {
    use ConditionOperator::*;
    match operator {
        Contains => as_str(actual).map(|a| a.contains(&as_str(expected).unwrap_or_default())).unwrap_or(false),
        Equals => actual == expected,
        NumberEquals => match (actual.as_f64(), expected.as_f64()) {
            (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
            _ => false,
        },
        GreaterThan => match (actual.as_f64(), expected.as_f64()) {
            (Some(a), Some(b)) => a > b,
            _ => false,
        },
        LessThan => match (actual.as_f64(), expected.as_f64()) {
            (Some(a), Some(b)) => a < b,
            _ => false,
        },
        StartsWith => as_str(actual).map(|a| a.starts_with(&as_str(expected).unwrap_or_default())).unwrap_or(false),
        NotStartsWith => !as_str(actual).map(|a| a.starts_with(&as_str(expected).unwrap_or_default())).unwrap_or(false),
        IsEmpty => is_empty(actual),
        IsNotEmpty => !is_empty(actual),
    }
}

fn as_str(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// A router's full `route_name -> condition_group` map, evaluated in
/// declared order; the first matching route wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteMap {
    pub routes: Vec<(String, ConditionGroup)>,
}

impl RouteMap {
    /// The name of the first route whose conditions evaluate true, or
    /// `None` if no route matches.
    pub fn select(&self, context: &TemplateContext) -> Option<&str> {
        self.routes.iter().find(|(_, group)| group.evaluate(context)).map(|(name, _)| name.as_str())
    }

    /// Validate that every declared route name is non-empty and unique
    ///.
    pub fn validate_route_names(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for (name, _) in &self.routes {
            if name.is_empty() {
                return Err(EngineError::Validation("router route name must not be empty".into()));
            }
            if !seen.insert(name.as_str()) {
                return Err(EngineError::Validation(format!("duplicate router route name: {name}")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> TemplateContext {
        let mut ctx = TemplateContext::new();
        ctx.insert("input".into(), json!({"n": 5, "name": "alice"}));
        ctx
    }

    #[test]
    fn resolves_nested_path() {
        assert_eq!(resolve_path(&ctx(), "input.n"), json!(5));
        assert_eq!(resolve_path(&ctx(), "input.missing"), Value::Null);
    }

    #[test]
    fn whole_placeholder_preserves_type() {
        assert_eq!(render_value("{{ input.n }}", &ctx()), json!(5));
    }

    #[test]
    fn mixed_text_renders_as_string() {
        assert_eq!(render_value("hello {{ input.name }}!", &ctx()), json!("hello alice!"));
    }

    #[test]
    fn router_first_match_wins() {
        let group_pos = ConditionGroup {
            conditions: vec![Condition {
                variable: "input.n".into(),
                operator: ConditionOperator::GreaterThan,
                value: json!(0),
                logical_operator: None,
            }],
        };
        let group_neg = ConditionGroup {
            conditions: vec![Condition {
                variable: "input.n".into(),
                operator: ConditionOperator::LessThan,
                value: json!(0),
                logical_operator: None,
            }],
        };
        let route_map = RouteMap { routes: vec![("pos".into(), group_pos), ("neg".into(), group_neg)] };
        assert_eq!(route_map.select(&ctx()), Some("pos"));
    }

    proptest::proptest! {
        /// Text that never opens a `{{` placeholder passes through the
        /// renderer byte-for-byte — the parser must not mistake plain text
        /// for a template, however it's shaped.
        #[test]
        fn text_without_placeholders_is_returned_unchanged(text in "[^{}]*") {
            let context = TemplateContext::new();
            proptest::prop_assert_eq!(render_value(&text, &context), Value::String(text));
        }

        /// A template consisting of exactly one `{{ path }}` placeholder
        /// round-trips the referenced value's native JSON type, regardless
        /// of the variable name or the amount of surrounding whitespace.
        #[test]
        fn whole_placeholder_round_trips_any_stored_number(
            var_name in "[a-z][a-z0-9_]{0,8}",
            pad_left in " {0,3}",
            pad_right in " {0,3}",
            number in -1_000_000i64..1_000_000i64,
        ) {
            let mut context = TemplateContext::new();
            context.insert(var_name.clone(), serde_json::json!(number));
            let template = format!("{{{{{pad_left}{var_name}{pad_right}}}}}");
            proptest::prop_assert_eq!(render_value(&template, &context), serde_json::json!(number));
        }
    }

    #[test]
    fn and_or_combination() {
        let group = ConditionGroup {
            conditions: vec![
                Condition { variable: "input.n".into(), operator: ConditionOperator::GreaterThan, value: json!(0), logical_operator: None },
                Condition { variable: "input.name".into(), operator: ConditionOperator::Equals, value: json!("bob"), logical_operator: Some(LogicalOperator::Or) },
            ],
        };
        assert!(group.evaluate(&ctx()));
    }
}
