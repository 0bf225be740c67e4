// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Runtime operator kernels
//!
//! Shared by the virtual machine and by constant folding during resolution.
//! Operands arrive already converted to the operation type.

use crate::analyzer::{CompareKind, TemporalOp};
use crate::ast::BinaryOperator;
use crate::evaluator::error::{EvaluationError, EvaluationResult};
use crate::evaluator::options::StringComparison;
use crate::model::{FromValue, NumericKind, Value};
use chrono::{NaiveDateTime, TimeDelta};
use rust_decimal::{Decimal, MathematicalOps};
use std::cmp::Ordering;

fn operand<T: FromValue>(value: &Value, kind: impl std::fmt::Display) -> EvaluationResult<T> {
    T::from_value(value).ok_or_else(|| {
        EvaluationError::vm(format!(
            "expected {kind} operand, found {}",
            value.type_info()
        ))
    })
}

fn operands<T: FromValue>(
    left: &Value,
    right: &Value,
    kind: impl std::fmt::Display + Copy,
) -> EvaluationResult<(T, T)> {
    Ok((operand(left, kind)?, operand(right, kind)?))
}

macro_rules! integral_arithmetic {
    ($ty:ty, $variant:ident, $op:expr, $left:expr, $right:expr, $checked:expr, $kind:expr) => {{
        let (a, b): ($ty, $ty) = operands($left, $right, $kind)?;
        let overflow = || EvaluationError::overflow(format!("{} {} {}", a, $op.symbol(), b));
        let result = match $op {
            BinaryOperator::Add if $checked => a.checked_add(b),
            BinaryOperator::Add => Some(a.wrapping_add(b)),
            BinaryOperator::Subtract if $checked => a.checked_sub(b),
            BinaryOperator::Subtract => Some(a.wrapping_sub(b)),
            BinaryOperator::Multiply if $checked => a.checked_mul(b),
            BinaryOperator::Multiply => Some(a.wrapping_mul(b)),
            BinaryOperator::Divide if b == 0 => return Err(EvaluationError::DivideByZero),
            // MIN / -1 overflows in either mode
            BinaryOperator::Divide => a.checked_div(b),
            BinaryOperator::Modulo if b == 0 => return Err(EvaluationError::DivideByZero),
            BinaryOperator::Modulo if $checked => a.checked_rem(b),
            BinaryOperator::Modulo => Some(a.wrapping_rem(b)),
            other => return Err(unsupported(other, $kind)),
        };
        result.map(Value::$variant).ok_or_else(overflow)
    }};
}

fn unsupported(op: BinaryOperator, kind: impl std::fmt::Display) -> EvaluationError {
    EvaluationError::vm(format!("operator {} is not defined for {kind}", op.symbol()))
}

/// Apply `+ - * / % ^` to two operands of the same numeric kind
pub fn arithmetic(
    op: BinaryOperator,
    kind: NumericKind,
    left: &Value,
    right: &Value,
    checked: bool,
) -> EvaluationResult<Value> {
    match kind {
        NumericKind::Int32 => integral_arithmetic!(i32, Int32, op, left, right, checked, kind),
        NumericKind::UInt32 => integral_arithmetic!(u32, UInt32, op, left, right, checked, kind),
        NumericKind::Int64 => integral_arithmetic!(i64, Int64, op, left, right, checked, kind),
        NumericKind::UInt64 => integral_arithmetic!(u64, UInt64, op, left, right, checked, kind),
        NumericKind::Single => {
            let (a, b): (f32, f32) = operands(left, right, kind)?;
            Ok(Value::Single(match op {
                BinaryOperator::Add => a + b,
                BinaryOperator::Subtract => a - b,
                BinaryOperator::Multiply => a * b,
                BinaryOperator::Divide => a / b,
                BinaryOperator::Modulo => a % b,
                BinaryOperator::Power => a.powf(b),
                other => return Err(unsupported(other, kind)),
            }))
        }
        NumericKind::Double => {
            let (a, b): (f64, f64) = operands(left, right, kind)?;
            Ok(Value::Double(match op {
                BinaryOperator::Add => a + b,
                BinaryOperator::Subtract => a - b,
                BinaryOperator::Multiply => a * b,
                BinaryOperator::Divide => a / b,
                BinaryOperator::Modulo => a % b,
                BinaryOperator::Power => a.powf(b),
                other => return Err(unsupported(other, kind)),
            }))
        }
        NumericKind::Decimal => {
            let (a, b): (Decimal, Decimal) = operands(left, right, kind)?;
            if matches!(op, BinaryOperator::Divide | BinaryOperator::Modulo) && b.is_zero() {
                return Err(EvaluationError::DivideByZero);
            }
            let result = match op {
                BinaryOperator::Add => a.checked_add(b),
                BinaryOperator::Subtract => a.checked_sub(b),
                BinaryOperator::Multiply => a.checked_mul(b),
                BinaryOperator::Divide => a.checked_div(b),
                BinaryOperator::Modulo => a.checked_rem(b),
                BinaryOperator::Power => a.checked_powd(b),
                other => return Err(unsupported(other, kind)),
            };
            result
                .map(Value::Decimal)
                .ok_or_else(|| EvaluationError::overflow(format!("{a} {} {b}", op.symbol())))
        }
    }
}

/// Arithmetic negation
pub fn negate(kind: NumericKind, value: &Value, checked: bool) -> EvaluationResult<Value> {
    let overflow = || EvaluationError::overflow(format!("-({value})"));
    match kind {
        NumericKind::Int32 => {
            let a: i32 = operand(value, kind)?;
            if checked {
                a.checked_neg().map(Value::Int32).ok_or_else(overflow)
            } else {
                Ok(Value::Int32(a.wrapping_neg()))
            }
        }
        NumericKind::Int64 => {
            let a: i64 = operand(value, kind)?;
            if checked {
                a.checked_neg().map(Value::Int64).ok_or_else(overflow)
            } else {
                Ok(Value::Int64(a.wrapping_neg()))
            }
        }
        NumericKind::Single => Ok(Value::Single(-operand::<f32>(value, kind)?)),
        NumericKind::Double => Ok(Value::Double(-operand::<f64>(value, kind)?)),
        NumericKind::Decimal => Ok(Value::Decimal(-operand::<Decimal>(value, kind)?)),
        NumericKind::UInt32 | NumericKind::UInt64 => Err(EvaluationError::vm(format!(
            "negation is not defined for {kind}"
        ))),
    }
}

/// Shift an integral value; the count is masked to the operand width
pub fn shift(
    op: BinaryOperator,
    kind: NumericKind,
    value: &Value,
    count: &Value,
) -> EvaluationResult<Value> {
    let count: i32 = operand(count, "Int32")?;
    let left = op == BinaryOperator::ShiftLeft;
    macro_rules! shift_as {
        ($ty:ty, $variant:ident, $mask:expr) => {{
            let a: $ty = operand(value, kind)?;
            let n = (count & $mask) as u32;
            Ok(Value::$variant(if left { a.wrapping_shl(n) } else { a.wrapping_shr(n) }))
        }};
    }
    match kind {
        NumericKind::Int32 => shift_as!(i32, Int32, 31),
        NumericKind::UInt32 => shift_as!(u32, UInt32, 31),
        NumericKind::Int64 => shift_as!(i64, Int64, 63),
        NumericKind::UInt64 => shift_as!(u64, UInt64, 63),
        other => Err(unsupported(op, other)),
    }
}

/// Bitwise AND, OR or XOR of two integral operands
pub fn bitwise(
    op: BinaryOperator,
    kind: NumericKind,
    left: &Value,
    right: &Value,
) -> EvaluationResult<Value> {
    macro_rules! bitwise_as {
        ($ty:ty, $variant:ident) => {{
            let (a, b): ($ty, $ty) = operands(left, right, kind)?;
            Ok(Value::$variant(match op {
                BinaryOperator::And => a & b,
                BinaryOperator::Or => a | b,
                BinaryOperator::Xor => a ^ b,
                other => return Err(unsupported(other, kind)),
            }))
        }};
    }
    match kind {
        NumericKind::Int32 => bitwise_as!(i32, Int32),
        NumericKind::UInt32 => bitwise_as!(u32, UInt32),
        NumericKind::Int64 => bitwise_as!(i64, Int64),
        NumericKind::UInt64 => bitwise_as!(u64, UInt64),
        other => Err(unsupported(op, other)),
    }
}

/// Bitwise complement
pub fn bitwise_not(kind: NumericKind, value: &Value) -> EvaluationResult<Value> {
    match kind {
        NumericKind::Int32 => Ok(Value::Int32(!operand::<i32>(value, kind)?)),
        NumericKind::UInt32 => Ok(Value::UInt32(!operand::<u32>(value, kind)?)),
        NumericKind::Int64 => Ok(Value::Int64(!operand::<i64>(value, kind)?)),
        NumericKind::UInt64 => Ok(Value::UInt64(!operand::<u64>(value, kind)?)),
        other => Err(EvaluationError::vm(format!("NOT is not defined for {other}"))),
    }
}

/// Date and time arithmetic
pub fn temporal(op: TemporalOp, left: &Value, right: &Value) -> EvaluationResult<Value> {
    let overflow = || EvaluationError::overflow(format!("{left} {op} {right}"));
    match op {
        TemporalOp::AddSpan | TemporalOp::SubtractSpan => {
            let date: NaiveDateTime = operand(left, "DateTime")?;
            let span: TimeDelta = operand(right, "TimeSpan")?;
            let result = if op == TemporalOp::AddSpan {
                date.checked_add_signed(span)
            } else {
                date.checked_sub_signed(span)
            };
            result.map(Value::DateTime).ok_or_else(overflow)
        }
        TemporalOp::Difference => {
            let (a, b): (NaiveDateTime, NaiveDateTime) = operands(left, right, "DateTime")?;
            Ok(Value::TimeSpan(a.signed_duration_since(b)))
        }
        TemporalOp::AddSpans | TemporalOp::SubtractSpans => {
            let (a, b): (TimeDelta, TimeDelta) = operands(left, right, "TimeSpan")?;
            let result = if op == TemporalOp::AddSpans {
                a.checked_add(&b)
            } else {
                a.checked_sub(&b)
            };
            result.map(Value::TimeSpan).ok_or_else(overflow)
        }
    }
}

/// Negate a time span
pub fn negate_span(value: &Value) -> EvaluationResult<Value> {
    let span: TimeDelta = operand(value, "TimeSpan")?;
    Ok(Value::TimeSpan(-span))
}

/// Concatenate the text of two values; null is empty
pub fn concat(left: &Value, right: &Value) -> Value {
    Value::string(format!("{left}{right}"))
}

fn ordering_matches(op: BinaryOperator, ordering: Option<Ordering>) -> EvaluationResult<bool> {
    Ok(match op {
        BinaryOperator::Equal => ordering == Some(Ordering::Equal),
        BinaryOperator::NotEqual => ordering != Some(Ordering::Equal),
        BinaryOperator::LessThan => ordering == Some(Ordering::Less),
        BinaryOperator::LessThanOrEqual => {
            matches!(ordering, Some(Ordering::Less | Ordering::Equal))
        }
        BinaryOperator::GreaterThan => ordering == Some(Ordering::Greater),
        BinaryOperator::GreaterThanOrEqual => {
            matches!(ordering, Some(Ordering::Greater | Ordering::Equal))
        }
        other => {
            return Err(EvaluationError::vm(format!(
                "{} is not a comparison",
                other.symbol()
            )));
        }
    })
}

fn compare_as<T: FromValue + PartialOrd>(
    op: BinaryOperator,
    left: &Value,
    right: &Value,
    kind: impl std::fmt::Display + Copy,
) -> EvaluationResult<bool> {
    let (a, b): (T, T) = operands(left, right, kind)?;
    ordering_matches(op, a.partial_cmp(&b))
}

/// Compare two operands converted for `kind`
///
/// Floating point comparisons involving NaN are false except `<>`.
pub fn compare(
    op: BinaryOperator,
    kind: CompareKind,
    left: &Value,
    right: &Value,
) -> EvaluationResult<bool> {
    match kind {
        CompareKind::Numeric(numeric) => match numeric {
            NumericKind::Int32 => compare_as::<i32>(op, left, right, numeric),
            NumericKind::UInt32 => compare_as::<u32>(op, left, right, numeric),
            NumericKind::Int64 => compare_as::<i64>(op, left, right, numeric),
            NumericKind::UInt64 => compare_as::<u64>(op, left, right, numeric),
            NumericKind::Single => compare_as::<f32>(op, left, right, numeric),
            NumericKind::Double => compare_as::<f64>(op, left, right, numeric),
            NumericKind::Decimal => compare_as::<Decimal>(op, left, right, numeric),
        },
        CompareKind::Boolean => compare_as::<bool>(op, left, right, kind),
        CompareKind::DateTime => compare_as::<NaiveDateTime>(op, left, right, kind),
        CompareKind::TimeSpan => compare_as::<TimeDelta>(op, left, right, kind),
        CompareKind::String(mode) => {
            // Null sorts before every string
            let ordering = match (left.as_str(), right.as_str()) {
                (Some(a), Some(b)) => match mode {
                    StringComparison::Ordinal => a.cmp(b),
                    StringComparison::OrdinalIgnoreCase => a.to_lowercase().cmp(&b.to_lowercase()),
                },
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
            };
            ordering_matches(op, Some(ordering))
        }
        CompareKind::Reference => match op {
            BinaryOperator::Equal => Ok(left == right),
            BinaryOperator::NotEqual => Ok(left != right),
            other => Err(unsupported(other, kind)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_integral_overflow_policy() {
        let max = Value::Int32(i32::MAX);
        let one = Value::Int32(1);
        assert_eq!(
            arithmetic(BinaryOperator::Add, NumericKind::Int32, &max, &one, false).unwrap(),
            Value::Int32(i32::MIN)
        );
        assert!(matches!(
            arithmetic(BinaryOperator::Add, NumericKind::Int32, &max, &one, true),
            Err(EvaluationError::Overflow { .. })
        ));
    }

    #[test]
    fn test_division_by_zero() {
        let zero = Value::Int64(0);
        assert_eq!(
            arithmetic(BinaryOperator::Divide, NumericKind::Int64, &Value::Int64(5), &zero, false),
            Err(EvaluationError::DivideByZero)
        );
        assert_eq!(
            arithmetic(
                BinaryOperator::Divide,
                NumericKind::Double,
                &Value::Double(1.0),
                &Value::Double(0.0),
                true
            )
            .unwrap(),
            Value::Double(f64::INFINITY)
        );
        assert!(matches!(
            arithmetic(
                BinaryOperator::Divide,
                NumericKind::Int32,
                &Value::Int32(i32::MIN),
                &Value::Int32(-1),
                false
            ),
            Err(EvaluationError::Overflow { .. })
        ));
    }

    #[test]
    fn test_decimal_and_power() {
        let a = Value::Decimal(Decimal::new(15, 1));
        let b = Value::Decimal(Decimal::new(2, 0));
        assert_eq!(
            arithmetic(BinaryOperator::Multiply, NumericKind::Decimal, &a, &b, false).unwrap(),
            Value::Decimal(Decimal::new(30, 1))
        );
        assert_eq!(
            arithmetic(
                BinaryOperator::Power,
                NumericKind::Double,
                &Value::Double(2.0),
                &Value::Double(10.0),
                false
            )
            .unwrap(),
            Value::Double(1024.0)
        );
    }

    #[test]
    fn test_shift_masks_count() {
        assert_eq!(
            shift(BinaryOperator::ShiftLeft, NumericKind::Int32, &Value::Int32(1), &Value::Int32(33))
                .unwrap(),
            Value::Int32(2)
        );
        assert_eq!(
            shift(BinaryOperator::ShiftRight, NumericKind::Int32, &Value::Int32(-8), &Value::Int32(1))
                .unwrap(),
            Value::Int32(-4)
        );
    }

    #[test]
    fn test_compare_kinds() {
        let nan = Value::Double(f64::NAN);
        assert!(!compare(BinaryOperator::Equal, CompareKind::Numeric(NumericKind::Double), &nan, &nan).unwrap());
        assert!(compare(BinaryOperator::NotEqual, CompareKind::Numeric(NumericKind::Double), &nan, &nan).unwrap());

        let ci = CompareKind::String(StringComparison::OrdinalIgnoreCase);
        assert!(compare(BinaryOperator::Equal, ci, &Value::string("ABC"), &Value::string("abc")).unwrap());
        let cs = CompareKind::String(StringComparison::Ordinal);
        assert!(!compare(BinaryOperator::Equal, cs, &Value::string("ABC"), &Value::string("abc")).unwrap());
        assert!(compare(BinaryOperator::LessThan, cs, &Value::Null, &Value::string("")).unwrap());

        assert!(compare(BinaryOperator::Equal, CompareKind::Reference, &Value::Null, &Value::Null).unwrap());
    }

    #[test]
    fn test_temporal() {
        let date = chrono::NaiveDate::from_ymd_opt(2024, 1, 31)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let day = TimeDelta::days(1);
        assert_eq!(
            temporal(TemporalOp::AddSpan, &Value::DateTime(date), &Value::TimeSpan(day)).unwrap(),
            Value::DateTime(date + day)
        );
        assert_eq!(
            temporal(
                TemporalOp::Difference,
                &Value::DateTime(date + day),
                &Value::DateTime(date)
            )
            .unwrap(),
            Value::TimeSpan(day)
        );
    }

    #[test]
    fn test_concat_null_is_empty() {
        assert_eq!(concat(&Value::string("a"), &Value::Null), Value::string("a"));
        assert_eq!(concat(&Value::string("n="), &Value::Int32(3)), Value::string("n=3"));
    }
}
