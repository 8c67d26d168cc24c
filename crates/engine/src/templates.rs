//! Template expansion for column names and `pattern` values.
//!
//! Two placeholder forms are recognised for every bound variable: `{name:02d}` renders an integer
//! zero-padded to at least two digits, `{name}` renders the value as text. Placeholders naming
//! unbound variables are left in place.

use loaddata_types::cell_text;
use serde_json::Value;
use tracing::debug;

use crate::scope::VariableScope;

/// Expand every placeholder of `template` against `scope`.
///
/// Variables are visited in scope order and, for each one, the padded form is substituted before
/// the plain form so `{cycle:02d}` is never mistaken for a partially matched `{cycle}`.
pub fn expand(template: &str, scope: &VariableScope) -> String {
    if !template.contains('{') {
        return template.to_string();
    }

    let mut result = template.to_string();
    for (name, value) in scope.iter() {
        let padded_placeholder = format!("{{{}:02d}}", name);
        if result.contains(&padded_placeholder) {
            match integer_value(value) {
                Some(number) => result = result.replace(&padded_placeholder, &format!("{:02}", number)),
                None => debug!(variable = name, value = %value, "cannot zero-pad non-integer value; placeholder left unexpanded"),
            }
        }

        let plain_placeholder = format!("{{{}}}", name);
        if result.contains(&plain_placeholder) {
            result = result.replace(&plain_placeholder, &cell_text(value));
        }
    }
    result
}

/// Variable names referenced by placeholders in `template`, in order of appearance.
///
/// Both `{name}` and `{name:02d}` report `name`. Braces that do not enclose an identifier are
/// ignored.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut remainder = template;

    while let Some(start) = remainder.find('{') {
        let after_start = &remainder[start + 1..];
        let Some(end) = after_start.find('}') else {
            break;
        };
        let inner = &after_start[..end];
        let name = inner.strip_suffix(":02d").unwrap_or(inner);
        if is_identifier(name) && !names.iter().any(|existing| existing == name) {
            names.push(name.to_string());
        }
        remainder = &after_start[end + 1..];
    }

    names
}

/// Placeholder variables of `template` that `scope` does not bind.
pub fn unresolved_placeholders(template: &str, scope: &VariableScope) -> Vec<String> {
    placeholders(template).into_iter().filter(|name| !scope.contains(name)).collect()
}

/// Integer conversion for `:02d`: booleans count as 0/1, floats truncate toward zero and strings
/// must hold an integer literal.
fn integer_value(value: &Value) -> Option<i64> {
    match value {
        Value::Bool(flag) => Some(i64::from(*flag)),
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|float| float.is_finite() && float.abs() < 9.0e18)
                .map(|float| float.trunc() as i64)
        }),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn is_identifier(text: &str) -> bool {
    let mut characters = text.chars();
    matches!(characters.next(), Some(first) if first.is_ascii_alphabetic() || first == '_')
        && characters.all(|character| character.is_ascii_alphanumeric() || character == '_')
}
