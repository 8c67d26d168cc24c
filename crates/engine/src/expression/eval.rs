//! Tree-walking evaluator and the allow-listed builtin functions.

use std::cmp::Ordering;

use super::{
    ExprValue, ExpressionError, MAX_STRING_LENGTH,
    syntax::{BinaryOp, Expr, UnaryOp},
};

/// Functions callable from expressions. Nothing outside this list is reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Builtin {
    Ord,
    Int,
    Str,
    Len,
}

impl Builtin {
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        match name {
            "ord" => Some(Builtin::Ord),
            "int" => Some(Builtin::Int),
            "str" => Some(Builtin::Str),
            "len" => Some(Builtin::Len),
            _ => None,
        }
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            Builtin::Ord => "ord",
            Builtin::Int => "int",
            Builtin::Str => "str",
            Builtin::Len => "len",
        }
    }

    fn call(self, argument: ExprValue) -> Result<ExprValue, ExpressionError> {
        match (self, argument) {
            (Builtin::Ord, ExprValue::Str(text)) => {
                let mut characters = text.chars();
                match (characters.next(), characters.next()) {
                    (Some(character), None) => Ok(ExprValue::Int(i64::from(u32::from(character)))),
                    _ => Err(ExpressionError::Type(format!(
                        "ord() expected a character, but string of length {} found",
                        text.chars().count()
                    ))),
                }
            }
            (Builtin::Ord, other) => Err(ExpressionError::Type(format!("ord() expected a string, found {}", other.type_name()))),
            (Builtin::Int, ExprValue::Int(value)) => Ok(ExprValue::Int(value)),
            (Builtin::Int, ExprValue::Bool(flag)) => Ok(ExprValue::Int(i64::from(flag))),
            (Builtin::Int, ExprValue::Float(value)) => float_to_int(value.trunc()),
            (Builtin::Int, ExprValue::Str(text)) => text
                .trim()
                .parse::<i64>()
                .map(ExprValue::Int)
                .map_err(|_| ExpressionError::InvalidInteger(text)),
            (Builtin::Int, other) => Err(ExpressionError::Type(format!("int() cannot convert {}", other.type_name()))),
            (Builtin::Str, value) => Ok(ExprValue::Str(value.display_text())),
            (Builtin::Len, ExprValue::Str(text)) => Ok(ExprValue::Int(text.chars().count() as i64)),
            (Builtin::Len, ExprValue::List(items)) => Ok(ExprValue::Int(items.len() as i64)),
            (Builtin::Len, other) => Err(ExpressionError::Type(format!("len() of unsized {}", other.type_name()))),
        }
    }
}

/// Evaluate `expression`, resolving names through `lookup`.
pub(crate) fn evaluate(expression: &Expr, lookup: &dyn Fn(&str) -> Option<ExprValue>) -> Result<ExprValue, ExpressionError> {
    match expression {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Name(name) => lookup(name).ok_or_else(|| ExpressionError::UnknownName(name.clone())),
        Expr::List(items) => items
            .iter()
            .map(|item| evaluate(item, lookup))
            .collect::<Result<Vec<_>, _>>()
            .map(ExprValue::List),
        Expr::Unary(operator, operand) => {
            let operand = evaluate(operand, lookup)?;
            unary(*operator, operand)
        }
        Expr::Binary(BinaryOp::And, left, right) => {
            let left = evaluate(left, lookup)?;
            if left.is_truthy() { evaluate(right, lookup) } else { Ok(left) }
        }
        Expr::Binary(BinaryOp::Or, left, right) => {
            let left = evaluate(left, lookup)?;
            if left.is_truthy() { Ok(left) } else { evaluate(right, lookup) }
        }
        Expr::Binary(operator, left, right) => {
            let left = evaluate(left, lookup)?;
            let right = evaluate(right, lookup)?;
            binary(*operator, left, right)
        }
        Expr::Index(target, index) => {
            let target = evaluate(target, lookup)?;
            let index = evaluate(index, lookup)?;
            index_value(target, index)
        }
        Expr::Slice { target, start, end } => {
            let target = evaluate(target, lookup)?;
            let start = start.as_ref().map(|bound| evaluate(bound, lookup)).transpose()?;
            let end = end.as_ref().map(|bound| evaluate(bound, lookup)).transpose()?;
            slice_value(target, start, end)
        }
        Expr::Call(builtin, arguments) => {
            let mut values = arguments
                .iter()
                .map(|argument| evaluate(argument, lookup))
                .collect::<Result<Vec<_>, _>>()?;
            match (values.pop(), values.is_empty()) {
                (Some(argument), true) => builtin.call(argument),
                _ => Err(ExpressionError::Arity {
                    function: builtin.name().to_string(),
                    expected: 1,
                    found: arguments.len(),
                }),
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn from_value(value: &ExprValue) -> Option<Self> {
        match value {
            ExprValue::Int(number) => Some(Number::Int(*number)),
            ExprValue::Float(number) => Some(Number::Float(*number)),
            ExprValue::Bool(flag) => Some(Number::Int(i64::from(*flag))),
            _ => None,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Number::Int(number) => number as f64,
            Number::Float(number) => number,
        }
    }
}

fn unary(operator: UnaryOp, operand: ExprValue) -> Result<ExprValue, ExpressionError> {
    match operator {
        UnaryOp::Not => Ok(ExprValue::Bool(!operand.is_truthy())),
        UnaryOp::Plus | UnaryOp::Negate => {
            let number = Number::from_value(&operand)
                .ok_or_else(|| ExpressionError::Type(format!("bad operand type for unary operator: {}", operand.type_name())))?;
            match (operator, number) {
                (UnaryOp::Negate, Number::Int(value)) => value.checked_neg().map(ExprValue::Int).ok_or(ExpressionError::Overflow),
                (UnaryOp::Negate, Number::Float(value)) => Ok(ExprValue::Float(-value)),
                (_, Number::Int(value)) => Ok(ExprValue::Int(value)),
                (_, Number::Float(value)) => Ok(ExprValue::Float(value)),
            }
        }
    }
}

fn binary(operator: BinaryOp, left: ExprValue, right: ExprValue) -> Result<ExprValue, ExpressionError> {
    match operator {
        BinaryOp::Equal => Ok(ExprValue::Bool(values_equal(&left, &right))),
        BinaryOp::NotEqual => Ok(ExprValue::Bool(!values_equal(&left, &right))),
        BinaryOp::Less => Ok(ExprValue::Bool(compare(&left, &right)? == Ordering::Less)),
        BinaryOp::LessEqual => Ok(ExprValue::Bool(compare(&left, &right)? != Ordering::Greater)),
        BinaryOp::Greater => Ok(ExprValue::Bool(compare(&left, &right)? == Ordering::Greater)),
        BinaryOp::GreaterEqual => Ok(ExprValue::Bool(compare(&left, &right)? != Ordering::Less)),
        BinaryOp::In => contains(&right, &left).map(ExprValue::Bool),
        BinaryOp::NotIn => contains(&right, &left).map(|found| ExprValue::Bool(!found)),
        BinaryOp::Add => match (left, right) {
            (ExprValue::Str(left), ExprValue::Str(right)) => Ok(ExprValue::Str(left + &right)),
            (ExprValue::List(mut left), ExprValue::List(right)) => {
                left.extend(right);
                Ok(ExprValue::List(left))
            }
            (left, right) => arithmetic(operator, &left, &right),
        },
        BinaryOp::Multiply => match (&left, &right) {
            (ExprValue::Str(text), ExprValue::Int(count)) | (ExprValue::Int(count), ExprValue::Str(text)) => {
                repeat_text(text, *count).map(ExprValue::Str)
            }
            _ => arithmetic(operator, &left, &right),
        },
        BinaryOp::Subtract | BinaryOp::Divide | BinaryOp::FloorDivide | BinaryOp::Modulo => arithmetic(operator, &left, &right),
        BinaryOp::And | BinaryOp::Or => Err(ExpressionError::Type("logical operators are evaluated lazily".to_string())),
    }
}

/// `str * int`; a non-positive count yields an empty string.
fn repeat_text(text: &str, count: i64) -> Result<String, ExpressionError> {
    let count = usize::try_from(count).unwrap_or(0);
    match text.len().checked_mul(count) {
        Some(length) if length <= MAX_STRING_LENGTH => Ok(text.repeat(count)),
        _ => Err(ExpressionError::StringTooLong { limit: MAX_STRING_LENGTH }),
    }
}

fn arithmetic(operator: BinaryOp, left: &ExprValue, right: &ExprValue) -> Result<ExprValue, ExpressionError> {
    let (Some(left_number), Some(right_number)) = (Number::from_value(left), Number::from_value(right)) else {
        return Err(ExpressionError::Type(format!(
            "unsupported operand types for {:?}: {} and {}",
            operator,
            left.type_name(),
            right.type_name()
        )));
    };

    if let (Number::Int(left), Number::Int(right)) = (left_number, right_number) {
        let result = match operator {
            BinaryOp::Add => left.checked_add(right),
            BinaryOp::Subtract => left.checked_sub(right),
            BinaryOp::Multiply => left.checked_mul(right),
            BinaryOp::Divide => {
                if right == 0 {
                    return Err(ExpressionError::DivisionByZero);
                }
                return Ok(ExprValue::Float(left as f64 / right as f64));
            }
            BinaryOp::FloorDivide => {
                if right == 0 {
                    return Err(ExpressionError::DivisionByZero);
                }
                left.checked_div(right).and_then(|quotient| {
                    if (left % right != 0) && ((left < 0) != (right < 0)) {
                        quotient.checked_sub(1)
                    } else {
                        Some(quotient)
                    }
                })
            }
            BinaryOp::Modulo => {
                if right == 0 {
                    return Err(ExpressionError::DivisionByZero);
                }
                left.checked_rem(right).map(|remainder| {
                    if remainder != 0 && ((remainder < 0) != (right < 0)) {
                        remainder + right
                    } else {
                        remainder
                    }
                })
            }
            _ => None,
        };
        return result.map(ExprValue::Int).ok_or(ExpressionError::Overflow);
    }

    let (left, right) = (left_number.as_f64(), right_number.as_f64());
    let result = match operator {
        BinaryOp::Add => left + right,
        BinaryOp::Subtract => left - right,
        BinaryOp::Multiply => left * right,
        BinaryOp::Divide | BinaryOp::FloorDivide | BinaryOp::Modulo if right == 0.0 => {
            return Err(ExpressionError::DivisionByZero);
        }
        BinaryOp::Divide => left / right,
        BinaryOp::FloorDivide => (left / right).floor(),
        BinaryOp::Modulo => left - right * (left / right).floor(),
        _ => return Err(ExpressionError::Type(format!("unsupported numeric operator {:?}", operator))),
    };
    Ok(ExprValue::Float(result))
}

fn values_equal(left: &ExprValue, right: &ExprValue) -> bool {
    match (left, right) {
        (ExprValue::Str(left), ExprValue::Str(right)) => left == right,
        (ExprValue::List(left), ExprValue::List(right)) => {
            left.len() == right.len() && left.iter().zip(right).all(|(left, right)| values_equal(left, right))
        }
        _ => match (Number::from_value(left), Number::from_value(right)) {
            (Some(Number::Int(left)), Some(Number::Int(right))) => left == right,
            (Some(left), Some(right)) => left.as_f64() == right.as_f64(),
            _ => false,
        },
    }
}

fn compare(left: &ExprValue, right: &ExprValue) -> Result<Ordering, ExpressionError> {
    match (left, right) {
        (ExprValue::Str(left), ExprValue::Str(right)) => Ok(left.cmp(right)),
        (ExprValue::List(left), ExprValue::List(right)) => {
            for (left_item, right_item) in left.iter().zip(right) {
                if !values_equal(left_item, right_item) {
                    return compare(left_item, right_item);
                }
            }
            Ok(left.len().cmp(&right.len()))
        }
        _ => match (Number::from_value(left), Number::from_value(right)) {
            (Some(Number::Int(left)), Some(Number::Int(right))) => Ok(left.cmp(&right)),
            (Some(left), Some(right)) => left
                .as_f64()
                .partial_cmp(&right.as_f64())
                .ok_or_else(|| ExpressionError::Type("cannot order NaN".to_string())),
            _ => Err(ExpressionError::Type(format!(
                "cannot order {} and {}",
                left.type_name(),
                right.type_name()
            ))),
        },
    }
}

fn contains(container: &ExprValue, item: &ExprValue) -> Result<bool, ExpressionError> {
    match (container, item) {
        (ExprValue::List(items), needle) => Ok(items.iter().any(|candidate| values_equal(candidate, needle))),
        (ExprValue::Str(haystack), ExprValue::Str(needle)) => Ok(haystack.contains(needle.as_str())),
        (container, item) => Err(ExpressionError::Type(format!(
            "'in' requires a list or string container, found {} in {}",
            item.type_name(),
            container.type_name()
        ))),
    }
}

fn integer_index(value: &ExprValue, role: &str) -> Result<i64, ExpressionError> {
    match value {
        ExprValue::Int(index) => Ok(*index),
        ExprValue::Bool(flag) => Ok(i64::from(*flag)),
        other => Err(ExpressionError::Type(format!("{} must be an integer, found {}", role, other.type_name()))),
    }
}

fn index_value(target: ExprValue, index: ExprValue) -> Result<ExprValue, ExpressionError> {
    let index = integer_index(&index, "index")?;
    let resolve = |length: usize| -> Result<usize, ExpressionError> {
        let signed_length = length as i64;
        let position = if index < 0 { index + signed_length } else { index };
        if (0..signed_length).contains(&position) {
            Ok(position as usize)
        } else {
            Err(ExpressionError::IndexOutOfRange { index, length })
        }
    };

    match target {
        ExprValue::Str(text) => {
            let characters: Vec<char> = text.chars().collect();
            let position = resolve(characters.len())?;
            Ok(ExprValue::Str(characters[position].to_string()))
        }
        ExprValue::List(mut items) => {
            let position = resolve(items.len())?;
            Ok(items.swap_remove(position))
        }
        other => Err(ExpressionError::Type(format!("{} is not subscriptable", other.type_name()))),
    }
}

fn slice_value(target: ExprValue, start: Option<ExprValue>, end: Option<ExprValue>) -> Result<ExprValue, ExpressionError> {
    let start = start.as_ref().map(|bound| integer_index(bound, "slice bound")).transpose()?;
    let end = end.as_ref().map(|bound| integer_index(bound, "slice bound")).transpose()?;
    let bounds = |length: usize| -> (usize, usize) {
        let signed_length = length as i64;
        let clamp = |bound: i64| -> usize {
            let position = if bound < 0 { bound + signed_length } else { bound };
            position.clamp(0, signed_length) as usize
        };
        let lower = start.map(clamp).unwrap_or(0);
        let upper = end.map(clamp).unwrap_or(length);
        (lower, upper.max(lower))
    };

    match target {
        ExprValue::Str(text) => {
            let characters: Vec<char> = text.chars().collect();
            let (lower, upper) = bounds(characters.len());
            Ok(ExprValue::Str(characters[lower..upper].iter().collect()))
        }
        ExprValue::List(items) => {
            let (lower, upper) = bounds(items.len());
            Ok(ExprValue::List(items[lower..upper].to_vec()))
        }
        other => Err(ExpressionError::Type(format!("{} cannot be sliced", other.type_name()))),
    }
}

fn float_to_int(value: f64) -> Result<ExprValue, ExpressionError> {
    if !value.is_finite() {
        return Err(ExpressionError::InvalidInteger(value.to_string()));
    }
    if value < i64::MIN as f64 || value >= i64::MAX as f64 {
        return Err(ExpressionError::Overflow);
    }
    Ok(ExprValue::Int(value as i64))
}

#[cfg(test)]
mod tests {
    use super::super::syntax::parse;
    use super::*;

    fn run(source: &str) -> Result<ExprValue, ExpressionError> {
        let expression = parse(source)?;
        let lookup = |name: &str| match name {
            "well" => Some(ExprValue::Str("B12".to_string())),
            "site" => Some(ExprValue::Int(4)),
            "arm" => Some(ExprValue::Str("painting".to_string())),
            _ => None,
        };
        evaluate(&expression, &lookup)
    }

    #[test]
    fn well_number_formula() {
        assert_eq!(run("ord(well[0]) * 1000 + int(well[1:])"), Ok(ExprValue::Int(66012)));
    }

    #[test]
    fn floor_division_and_modulo_follow_divisor_sign() {
        assert_eq!(run("7 // 2"), Ok(ExprValue::Int(3)));
        assert_eq!(run("-7 // 2"), Ok(ExprValue::Int(-4)));
        assert_eq!(run("-7 % 3"), Ok(ExprValue::Int(2)));
        assert_eq!(run("7 % -3"), Ok(ExprValue::Int(-2)));
        assert_eq!(run("7 / 2"), Ok(ExprValue::Float(3.5)));
        assert_eq!(run("7.5 // 2"), Ok(ExprValue::Float(3.0)));
    }

    #[test]
    fn division_by_zero_is_reported() {
        assert_eq!(run("site // 0"), Err(ExpressionError::DivisionByZero));
        assert_eq!(run("site % 0"), Err(ExpressionError::DivisionByZero));
        assert_eq!(run("1.0 / 0"), Err(ExpressionError::DivisionByZero));
    }

    #[test]
    fn string_repetition_is_bounded() {
        assert_eq!(run("'ab' * 3"), Ok(ExprValue::Str("ababab".into())));
        assert_eq!(run("2 * 'ab'"), Ok(ExprValue::Str("abab".into())));
        assert_eq!(run("'ab' * -1"), Ok(ExprValue::Str(String::new())));
        assert_eq!(
            run("well * 9223372036854775807"),
            Err(ExpressionError::StringTooLong { limit: MAX_STRING_LENGTH })
        );
        assert_eq!(
            run("'x' * 1048577"),
            Err(ExpressionError::StringTooLong { limit: MAX_STRING_LENGTH })
        );
    }

    #[test]
    fn integer_overflow_is_reported() {
        assert_eq!(run("9223372036854775807 + 1"), Err(ExpressionError::Overflow));
    }

    #[test]
    fn indexing_and_slicing_handle_negative_bounds() {
        assert_eq!(run("well[-1]"), Ok(ExprValue::Str("2".into())));
        assert_eq!(run("well[-2:]"), Ok(ExprValue::Str("12".into())));
        assert_eq!(run("well[1:100]"), Ok(ExprValue::Str("12".into())));
        assert_eq!(run("well[2:1]"), Ok(ExprValue::Str(String::new())));
        assert_eq!(run("[1, 2, 3][1]"), Ok(ExprValue::Int(2)));
        assert_eq!(run("well[3]"), Err(ExpressionError::IndexOutOfRange { index: 3, length: 3 }));
    }

    #[test]
    fn membership_and_boolean_logic() {
        assert_eq!(run("arm == 'painting' and site in [0, 2, 4]"), Ok(ExprValue::Bool(true)));
        assert_eq!(run("arm != 'painting' or site not in [4]"), Ok(ExprValue::Bool(false)));
        assert_eq!(run("not 'paint' in arm"), Ok(ExprValue::Bool(false)));
        assert_eq!(run("site >= 4 and site < 5.5"), Ok(ExprValue::Bool(true)));
    }

    #[test]
    fn concatenation_and_builtins() {
        assert_eq!(run("well + '_' + str(site)"), Ok(ExprValue::Str("B12_4".into())));
        assert_eq!(run("len(well) + len([1, 2])"), Ok(ExprValue::Int(5)));
        assert_eq!(run("int(' 42 ')"), Ok(ExprValue::Int(42)));
        assert_eq!(run("int(3.9)"), Ok(ExprValue::Int(3)));
        assert_eq!(run("int(well)"), Err(ExpressionError::InvalidInteger("B12".into())));
    }

    #[test]
    fn type_errors_are_reported() {
        assert!(matches!(run("well - 1"), Err(ExpressionError::Type(_))));
        assert!(matches!(run("ord(well)"), Err(ExpressionError::Type(_))));
        assert!(matches!(run("site < 'a'"), Err(ExpressionError::Type(_))));
        assert!(matches!(run("site[0]"), Err(ExpressionError::Type(_))));
    }

    #[test]
    fn unknown_names_are_reported() {
        assert_eq!(run("tile + 1"), Err(ExpressionError::UnknownName("tile".into())));
    }

    #[test]
    fn short_circuit_skips_right_operand() {
        assert_eq!(run("site == 0 and tile"), Ok(ExprValue::Bool(false)));
        assert_eq!(run("site == 4 or tile"), Ok(ExprValue::Bool(true)));
    }
}
