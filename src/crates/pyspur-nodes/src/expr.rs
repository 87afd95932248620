//! A tiny declarative arithmetic expression evaluator.
//!
//! `PythonFuncNode` stands in for PySpur's dynamic Python execution (spec
//! Design Note: "the spec does not require hosting Python... a target
//! implementation may substitute an embedded scripting environment or
//! restrict to declarative transforms"). Rather than embed a scripting
//! runtime not carried anywhere in the teacher's dependency stack, this
//! module restricts `PythonFunc` to declarative transforms: a JSON object
//! of `{ output_field: expression }` pairs, each expression a small
//! arithmetic formula over dotted paths into the node's resolved inputs.
//!
//! Grammar (recursive descent, left-to-right precedence):
//! ```text
//! expr   := term (("+" | "-") term)*
//! term   := unary (("*" | "/") unary)*
//! unary  := "-" unary | atom
//! atom   := number | string | path | "(" expr ")"
//! ```

use pyspur_core::template::{resolve_path, TemplateContext};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum ExprError {
    UnexpectedEnd,
    UnexpectedToken(String),
    NotANumber(String),
    TrailingInput(String),
}

impl std::fmt::Display for ExprError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExprError::UnexpectedEnd => write!(f, "unexpected end of expression"),
            ExprError::UnexpectedToken(t) => write!(f, "unexpected token '{t}'"),
            ExprError::NotANumber(v) => write!(f, "value '{v}' is not numeric"),
            ExprError::TrailingInput(t) => write!(f, "unexpected trailing input starting at '{t}'"),
        }
    }
}

impl std::error::Error for ExprError {}

/// Evaluate `expr` against `context`, returning a JSON number or string.
pub fn evaluate(expr: &str, context: &TemplateContext) -> Result<Value, ExprError> {
    let tokens = tokenize(expr);
    let mut parser = Parser { tokens: &tokens, pos: 0, context };
    let value = parser.parse_expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(ExprError::TrailingInput(parser.tokens[parser.pos].clone()));
    }
    Ok(value)
}

fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if "+-*/()".contains(c) {
            tokens.push(c.to_string());
            i += 1;
        } else if c == '"' || c == '\'' {
            let quote = c;
            let mut lit = String::new();
            i += 1;
            while i < chars.len() && chars[i] != quote {
                lit.push(chars[i]);
                i += 1;
            }
            i += 1; // closing quote
            tokens.push(format!("\"{lit}"));
        } else {
            let mut word = String::new();
            while i < chars.len() && !chars[i].is_whitespace() && !"+-*/()".contains(chars[i]) {
                word.push(chars[i]);
                i += 1;
            }
            tokens.push(word);
        }
    }
    tokens
}

struct Parser<'a> {
    tokens: &'a [String],
    pos: usize,
    context: &'a TemplateContext,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&str> {
        self.tokens.get(self.pos).map(String::as_str)
    }

    fn advance(&mut self) -> Option<&str> {
        let tok = self.tokens.get(self.pos).map(String::as_str);
        self.pos += 1;
        tok
    }

    fn parse_expr(&mut self) -> Result<Value, ExprError> {
        let mut left = self.parse_term()?;
        loop {
            match self.peek() {
                Some("+") => {
                    self.advance();
                    let right = self.parse_term()?;
                    left = add(left, right)?;
                }
                Some("-") => {
                    self.advance();
                    let right = self.parse_term()?;
                    left = Value::from(as_number(&left)? - as_number(&right)?);
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Value, ExprError> {
        let mut left = self.parse_unary()?;
        loop {
            match self.peek() {
                Some("*") => {
                    self.advance();
                    let right = self.parse_unary()?;
                    left = Value::from(as_number(&left)? * as_number(&right)?);
                }
                Some("/") => {
                    self.advance();
                    let right = self.parse_unary()?;
                    left = Value::from(as_number(&left)? / as_number(&right)?);
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Value, ExprError> {
        if self.peek() == Some("-") {
            self.advance();
            let value = self.parse_unary()?;
            return Ok(Value::from(-as_number(&value)?));
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<Value, ExprError> {
        let tok = self.advance().ok_or(ExprError::UnexpectedEnd)?.to_string();
        if tok == "(" {
            let value = self.parse_expr()?;
            match self.advance() {
                Some(")") => Ok(value),
                Some(other) => Err(ExprError::UnexpectedToken(other.to_string())),
                None => Err(ExprError::UnexpectedEnd),
            }
        } else if let Some(lit) = tok.strip_prefix('"') {
            Ok(Value::String(lit.to_string()))
        } else if let Ok(n) = tok.parse::<f64>() {
            Ok(Value::from(n))
        } else {
            Ok(resolve_path(self.context, &tok))
        }
    }
}

fn as_number(value: &Value) -> Result<f64, ExprError> {
    value.as_f64().ok_or_else(|| ExprError::NotANumber(value.to_string()))
}

fn add(left: Value, right: Value) -> Result<Value, ExprError> {
    if let (Value::String(a), b) = (&left, &right) {
        return Ok(Value::String(format!("{a}{}", display(b))));
    }
    if let (a, Value::String(b)) = (&left, &right) {
        if !a.is_string() {
            return Ok(Value::String(format!("{}{b}", display(a))));
        }
    }
    Ok(Value::from(as_number(&left)? + as_number(&right)?))
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> TemplateContext {
        let mut ctx = TemplateContext::new();
        ctx.insert("input".into(), json!({"x": 3, "name": "ada"}));
        ctx
    }

    #[test]
    fn multiplies_path_by_literal() {
        assert_eq!(evaluate("input.x * 2", &ctx()).unwrap(), json!(6.0));
    }

    #[test]
    fn respects_precedence_and_parens() {
        assert_eq!(evaluate("(input.x + 1) * 2", &ctx()).unwrap(), json!(8.0));
        assert_eq!(evaluate("input.x + 1 * 2", &ctx()).unwrap(), json!(5.0));
    }

    #[test]
    fn string_concatenation() {
        assert_eq!(evaluate("\"hello \" + input.name", &ctx()).unwrap(), json!("hello ada"));
    }

    #[test]
    fn unary_minus() {
        assert_eq!(evaluate("-input.x", &ctx()).unwrap(), json!(-3.0));
    }

    #[test]
    fn trailing_input_is_an_error() {
        assert!(evaluate("input.x 2", &ctx()).is_err());
    }
}
