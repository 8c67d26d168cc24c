//! A small, allow-listed expression language for computed columns and row filters.
//!
//! Supported: integer, float, string and boolean literals, list literals, names, arithmetic
//! (`+ - * / // %`), comparisons, `in`/`not in`, `and`/`or`/`not`, indexing and slicing, and the
//! builtins `ord`, `int`, `str`, `len`. There is no attribute access and no way to reach any other
//! function.

mod eval;
mod syntax;

use loaddata_types::cell_text;
use serde_json::{Number, Value};
use thiserror::Error;

/// Runtime value of an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprValue {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    List(Vec<ExprValue>),
}

impl ExprValue {
    /// Converts a JSON scalar or array. Objects and null have no expression counterpart.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(flag) => Some(ExprValue::Bool(*flag)),
            Value::Number(number) => number.as_i64().map(ExprValue::Int).or_else(|| number.as_f64().map(ExprValue::Float)),
            Value::String(text) => Some(ExprValue::Str(text.clone())),
            Value::Array(items) => items.iter().map(ExprValue::from_json).collect::<Option<Vec<_>>>().map(ExprValue::List),
            Value::Null | Value::Object(_) => None,
        }
    }

    /// Converts a scalar result into a cell value.
    pub fn into_json(self) -> Result<Value, ExpressionError> {
        match self {
            ExprValue::Int(number) => Ok(Value::from(number)),
            ExprValue::Float(number) => Number::from_f64(number)
                .map(Value::Number)
                .ok_or_else(|| ExpressionError::Type(format!("non-finite result {}", number))),
            ExprValue::Str(text) => Ok(Value::String(text)),
            ExprValue::Bool(flag) => Ok(Value::Bool(flag)),
            ExprValue::List(_) => Err(ExpressionError::Type("expression must produce a scalar, found list".to_string())),
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            ExprValue::Int(number) => *number != 0,
            ExprValue::Float(number) => *number != 0.0,
            ExprValue::Str(text) => !text.is_empty(),
            ExprValue::Bool(flag) => *flag,
            ExprValue::List(items) => !items.is_empty(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ExprValue::Int(_) => "int",
            ExprValue::Float(_) => "float",
            ExprValue::Str(_) => "str",
            ExprValue::Bool(_) => "bool",
            ExprValue::List(_) => "list",
        }
    }

    /// Text produced by `str()`.
    pub fn display_text(&self) -> String {
        match self {
            ExprValue::Int(number) => number.to_string(),
            ExprValue::Float(number) if number.is_finite() && number.fract() == 0.0 => format!("{:.1}", number),
            ExprValue::Float(number) => number.to_string(),
            ExprValue::Str(text) => text.clone(),
            ExprValue::Bool(true) => "True".to_string(),
            ExprValue::Bool(false) => "False".to_string(),
            ExprValue::List(items) => {
                let rendered: Vec<String> = items
                    .iter()
                    .map(|item| match item {
                        ExprValue::Str(text) => format!("'{}'", text),
                        other => other.display_text(),
                    })
                    .collect();
                format!("[{}]", rendered.join(", "))
            }
        }
    }
}

impl From<&Value> for ExprValue {
    /// Null and objects degrade to their text form.
    fn from(value: &Value) -> Self {
        ExprValue::from_json(value).unwrap_or_else(|| ExprValue::Str(cell_text(value)))
    }
}

/// Longest string `str * int` may produce.
pub const MAX_STRING_LENGTH: usize = 1 << 20;

/// Failures raised while parsing or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },
    #[error("name '{0}' is not defined")]
    UnknownName(String),
    #[error("function '{0}' is not available")]
    UnknownFunction(String),
    #[error("{function}() takes exactly {expected} argument(s), {found} given")]
    Arity { function: String, expected: usize, found: usize },
    #[error("type error: {0}")]
    Type(String),
    #[error("index {index} out of range for length {length}")]
    IndexOutOfRange { index: i64, length: usize },
    #[error("division by zero")]
    DivisionByZero,
    #[error("invalid integer: '{0}'")]
    InvalidInteger(String),
    #[error("integer overflow")]
    Overflow,
    #[error("string result longer than {limit} bytes")]
    StringTooLong { limit: usize },
}

/// A parsed expression, ready to evaluate any number of times.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpression {
    source: String,
    tree: syntax::Expr,
}

impl CompiledExpression {
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        let tree = syntax::parse(source)?;
        Ok(Self {
            source: source.to_string(),
            tree,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Variable names the expression reads.
    pub fn names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.tree.collect_names(&mut names);
        names
    }

    /// Evaluate with `lookup` resolving variable names.
    pub fn evaluate<F>(&self, lookup: F) -> Result<ExprValue, ExpressionError>
    where
        F: Fn(&str) -> Option<ExprValue>,
    {
        eval::evaluate(&self.tree, &lookup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn evaluates_against_lookup() {
        let expression = CompiledExpression::parse("ord(well[0]) * 1000 + int(well[1:])").expect("parse");
        let value = expression
            .evaluate(|name| (name == "well").then(|| ExprValue::Str("A1".to_string())))
            .expect("evaluate");
        assert_eq!(value, ExprValue::Int(65001));
        assert_eq!(expression.names(), vec!["well"]);
    }

    #[test]
    fn converts_scalars_to_json() {
        assert_eq!(ExprValue::Int(3).into_json(), Ok(json!(3)));
        assert_eq!(ExprValue::Float(2.5).into_json(), Ok(json!(2.5)));
        assert_eq!(ExprValue::Str("x".into()).into_json(), Ok(json!("x")));
        assert!(ExprValue::List(vec![]).into_json().is_err());
        assert!(ExprValue::Float(f64::NAN).into_json().is_err());
    }

    #[test]
    fn converts_json_values() {
        assert_eq!(ExprValue::from_json(&json!([1, "a"])), Some(ExprValue::List(vec![ExprValue::Int(1), ExprValue::Str("a".into())])));
        assert_eq!(ExprValue::from_json(&Value::Null), None);
        assert_eq!(ExprValue::from(&Value::Null), ExprValue::Str(String::new()));
    }

    #[test]
    fn str_matches_familiar_rendering() {
        assert_eq!(ExprValue::Float(3.0).display_text(), "3.0");
        assert_eq!(ExprValue::Bool(true).display_text(), "True");
        assert_eq!(
            ExprValue::List(vec![ExprValue::Int(1), ExprValue::Str("a".into())]).display_text(),
            "[1, 'a']"
        );
    }

    #[test]
    fn errors_render_readably() {
        let error = CompiledExpression::parse("site ==").expect_err("incomplete");
        assert_eq!(error.to_string(), "syntax error at offset 7: unexpected end of input");
    }
}
