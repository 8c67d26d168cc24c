//! Cell value resolution.
//!
//! Resolution never fails: a missing source field yields an empty cell and an expression that
//! cannot be evaluated is logged and yields an empty cell, so one bad column cannot abort a row.

use loaddata_types::{ColumnDefinition, ColumnMode, SampleRow};
use serde_json::Value;
use tracing::warn;

use crate::{
    expression::{CompiledExpression, ExprValue, ExpressionError},
    scope::VariableScope,
    templates,
};

/// Symbolic `value` names read from the scope, with the value used when the scope lacks them.
const SYMBOLIC_VALUES: [(&str, i64); 2] = [("channel_index", 0), ("tile", 1)];

/// Expanded column name and resolved cell for one column definition.
pub fn resolve_column(definition: &ColumnDefinition, sample: &SampleRow, scope: &VariableScope) -> (String, Value) {
    let name = templates::expand(&definition.name, scope);
    let value = resolve_column_value(definition, sample, scope);
    (name, value)
}

/// Resolve the cell value of `definition` for `sample` in `scope`.
pub fn resolve_column_value(definition: &ColumnDefinition, sample: &SampleRow, scope: &VariableScope) -> Value {
    match &definition.mode {
        ColumnMode::Source(field) => sample
            .field(field)
            .or_else(|| scope.get(field).cloned())
            .unwrap_or_else(|| Value::String(String::new())),
        ColumnMode::Pattern(pattern) => Value::String(templates::expand(pattern, scope)),
        ColumnMode::Value(literal) => symbolic_value(literal, scope).unwrap_or_else(|| literal.clone()),
        ColumnMode::Expression(source) => match evaluate_expression(source, sample, scope) {
            Ok(value) => value,
            Err(error) => {
                warn!(column = %definition.name, expression = %source, error = %error, "expression evaluation failed; writing empty cell");
                Value::String(String::new())
            }
        },
    }
}

fn symbolic_value(literal: &Value, scope: &VariableScope) -> Option<Value> {
    let name = literal.as_str()?;
    let (name, default) = SYMBOLIC_VALUES.iter().find(|(symbol, _)| *symbol == name)?;
    Some(scope.get(name).cloned().unwrap_or_else(|| Value::from(*default)))
}

/// Evaluates with scope bindings taking precedence over sample fields.
fn evaluate_expression(source: &str, sample: &SampleRow, scope: &VariableScope) -> Result<Value, ExpressionError> {
    let expression = CompiledExpression::parse(source)?;
    let value = expression.evaluate(|name| match scope.get(name) {
        Some(bound) => Some(ExprValue::from(bound)),
        None => sample.field(name).as_ref().map(ExprValue::from),
    })?;
    value.into_json()
}
