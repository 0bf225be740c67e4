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

//! Implicit and explicit conversions between expression types
//!
//! The static half of this module answers "may `from` flow into `to`" and
//! "what common type do two operands promote to". The runtime half performs
//! the conversions the compiler emitted.

use super::types::{NumericKind, ScalarKind, TypeInfo};
use super::value::Value;
use crate::evaluator::error::{EvaluationError, EvaluationResult};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};

/// Cost of boxing any value into `Object`
const OBJECT_CONVERSION_COST: u32 = 20;

/// Type coercion utility for expression values
pub struct TypeCoercion;

impl TypeCoercion {
    /// Cost of an implicit conversion, `None` if no implicit conversion exists
    ///
    /// Identity costs zero. Numeric widening costs the distance between the
    /// two types in the widening order, so `Int32 -> Int64` is cheaper than
    /// `Int32 -> Double`.
    pub fn implicit_cost(from: &TypeInfo, to: &TypeInfo) -> Option<u32> {
        if from == to {
            return Some(0);
        }
        match (from, to) {
            (TypeInfo::Void, _) | (_, TypeInfo::Void) => None,
            (TypeInfo::Null, to) if to.is_reference() => Some(1),
            (_, TypeInfo::Object) => Some(OBJECT_CONVERSION_COST),
            (from, to) if Self::is_implicit_numeric(from, to) => {
                let distance = numeric_rank(to)?.saturating_sub(numeric_rank(from)?);
                Some(distance.max(1))
            }
            _ => None,
        }
    }

    /// Check if an implicit conversion exists
    pub fn can_convert_implicitly(from: &TypeInfo, to: &TypeInfo) -> bool {
        Self::implicit_cost(from, to).is_some()
    }

    /// Check if an explicit cast from `from` to `to` is permitted
    pub fn can_convert_explicitly(from: &TypeInfo, to: &TypeInfo) -> bool {
        if Self::can_convert_implicitly(from, to) {
            return true;
        }
        if is_numeric_or_char(from) && is_numeric_or_char(to) {
            return true;
        }
        // Unboxing is checked when the value is known
        matches!(from, TypeInfo::Object) && !matches!(to, TypeInfo::Void | TypeInfo::Null)
    }

    /// Widening numeric conversions
    fn is_implicit_numeric(from: &TypeInfo, to: &TypeInfo) -> bool {
        use TypeInfo::*;
        match from {
            SByte => matches!(to, Int16 | Int32 | Int64 | Single | Double | Decimal),
            Byte => matches!(
                to,
                Int16 | UInt16 | Int32 | UInt32 | Int64 | UInt64 | Single | Double | Decimal
            ),
            Int16 => matches!(to, Int32 | Int64 | Single | Double | Decimal),
            UInt16 => matches!(
                to,
                Int32 | UInt32 | Int64 | UInt64 | Single | Double | Decimal
            ),
            Char => matches!(
                to,
                UInt16 | Int32 | UInt32 | Int64 | UInt64 | Single | Double | Decimal
            ),
            Int32 => matches!(to, Int64 | Single | Double | Decimal),
            UInt32 => matches!(to, Int64 | UInt64 | Single | Double | Decimal),
            Int64 | UInt64 => matches!(to, Single | Double | Decimal),
            Single => matches!(to, Double),
            _ => false,
        }
    }

    /// Common type two numeric operands are promoted to
    ///
    /// Returns `None` for the combinations that have no common type:
    /// `Decimal` with a floating point type, and `UInt64` with a signed
    /// integral type.
    pub fn binary_numeric_promotion(left: &TypeInfo, right: &TypeInfo) -> Option<NumericKind> {
        use TypeInfo::*;
        if !is_numeric_or_char(left) || !is_numeric_or_char(right) {
            return None;
        }
        let either = |t: &TypeInfo| left == t || right == t;
        let other = |t: &TypeInfo| if left == t { right } else { left };

        if either(&Decimal) {
            return match other(&Decimal) {
                Single | Double => None,
                _ => Some(NumericKind::Decimal),
            };
        }
        if either(&Double) {
            return Some(NumericKind::Double);
        }
        if either(&Single) {
            return Some(NumericKind::Single);
        }
        if either(&UInt64) {
            return if other(&UInt64).is_signed_integral() {
                None
            } else {
                Some(NumericKind::UInt64)
            };
        }
        if either(&Int64) {
            return Some(NumericKind::Int64);
        }
        if either(&UInt32) {
            return match other(&UInt32) {
                SByte | Int16 | Int32 => Some(NumericKind::Int64),
                _ => Some(NumericKind::UInt32),
            };
        }
        Some(NumericKind::Int32)
    }

    /// Type a single numeric operand is promoted to
    pub fn unary_numeric_promotion(operand: &TypeInfo) -> Option<NumericKind> {
        use TypeInfo::*;
        Some(match operand {
            SByte | Byte | Int16 | UInt16 | Char | Int32 => NumericKind::Int32,
            UInt32 => NumericKind::UInt32,
            Int64 => NumericKind::Int64,
            UInt64 => NumericKind::UInt64,
            Single => NumericKind::Single,
            Double => NumericKind::Double,
            Decimal => NumericKind::Decimal,
            _ => return None,
        })
    }

    /// Convert a value to a scalar kind
    ///
    /// With `checked` set, narrowing integral conversions report overflow
    /// instead of truncating. Conversions into or out of `Decimal` are
    /// always checked.
    pub fn convert(value: &Value, to: ScalarKind, checked: bool) -> EvaluationResult<Value> {
        if value.type_info().scalar_kind() == Some(to) {
            return Ok(value.clone());
        }
        match to {
            ScalarKind::Boolean | ScalarKind::DateTime | ScalarKind::TimeSpan => {
                Err(EvaluationError::invalid_cast(value.type_info(), to.type_info()))
            }
            ScalarKind::String => match value {
                Value::Null => Ok(Value::Null),
                other => Err(EvaluationError::invalid_cast(other.type_info(), "String")),
            },
            _ => convert_numeric(value, to, checked),
        }
    }

    /// Convert a value to a static type, allowing only implicit conversions
    ///
    /// Used when a dynamically typed value must take a declared type, such
    /// as unboxing an `Object` or assigning into a typed variable.
    pub fn convert_to_type(value: &Value, target: &TypeInfo) -> EvaluationResult<Value> {
        let source = value.type_info();
        if &source == target || matches!(target, TypeInfo::Object) {
            return Ok(value.clone());
        }
        if value.is_null() {
            return if target.is_reference() {
                Ok(Value::Null)
            } else {
                Err(EvaluationError::invalid_cast("Null", target))
            };
        }
        match target.scalar_kind() {
            Some(kind) if Self::can_convert_implicitly(&source, target) => {
                Self::convert(value, kind, false)
            }
            _ => Err(EvaluationError::invalid_cast(source, target)),
        }
    }
}

fn is_numeric_or_char(t: &TypeInfo) -> bool {
    t.is_numeric() || matches!(t, TypeInfo::Char)
}

/// Position in the widening order
fn numeric_rank(t: &TypeInfo) -> Option<u32> {
    Some(match t {
        TypeInfo::SByte | TypeInfo::Byte => 1,
        TypeInfo::Int16 | TypeInfo::UInt16 | TypeInfo::Char => 2,
        TypeInfo::Int32 => 3,
        TypeInfo::UInt32 => 4,
        TypeInfo::Int64 => 5,
        TypeInfo::UInt64 => 6,
        TypeInfo::Single => 7,
        TypeInfo::Double => 8,
        TypeInfo::Decimal => 9,
        _ => return None,
    })
}

enum Number {
    Integer(i128),
    Float(f64),
    Single(f32),
    Decimal(Decimal),
}

fn convert_numeric(value: &Value, to: ScalarKind, checked: bool) -> EvaluationResult<Value> {
    let number = match value {
        Value::Single(v) => Number::Single(*v),
        Value::Double(v) => Number::Float(*v),
        Value::Decimal(d) => Number::Decimal(*d),
        other => match other.as_i128() {
            Some(i) => Number::Integer(i),
            None => {
                return Err(EvaluationError::invalid_cast(
                    other.type_info(),
                    to.type_info(),
                ));
            }
        },
    };

    let overflow = || EvaluationError::overflow(format!("conversion to {}", to.type_info()));

    match to {
        ScalarKind::Single => Ok(Value::Single(match number {
            Number::Integer(i) => i as f32,
            Number::Float(f) => f as f32,
            Number::Single(f) => f,
            Number::Decimal(d) => d.to_f32().ok_or_else(overflow)?,
        })),
        ScalarKind::Double => Ok(Value::Double(match number {
            Number::Integer(i) => i as f64,
            Number::Float(f) => f,
            Number::Single(f) => f as f64,
            Number::Decimal(d) => d.to_f64().ok_or_else(overflow)?,
        })),
        ScalarKind::Decimal => Ok(Value::Decimal(match number {
            Number::Integer(i) => Decimal::from_i128(i).ok_or_else(overflow)?,
            Number::Float(f) => Decimal::from_f64(f).ok_or_else(overflow)?,
            Number::Single(f) => Decimal::from_f32(f).ok_or_else(overflow)?,
            Number::Decimal(d) => d,
        })),
        _ => {
            let (integer, checked) = match number {
                Number::Integer(i) => (i, checked),
                Number::Float(f) => (truncate_float(f, checked).ok_or_else(overflow)?, checked),
                Number::Single(f) => (
                    truncate_float(f as f64, checked).ok_or_else(overflow)?,
                    checked,
                ),
                Number::Decimal(d) => (d.trunc().to_i128().ok_or_else(overflow)?, true),
            };
            narrow_integer(integer, to, checked)
        }
    }
}

/// Truncate toward zero; checked conversions reject NaN, infinities and huge values
fn truncate_float(f: f64, checked: bool) -> Option<i128> {
    let t = f.trunc();
    if t.is_finite() && t.abs() < 1e38 {
        Some(t as i128)
    } else if checked {
        None
    } else {
        Some(t as i128)
    }
}

macro_rules! narrow {
    ($value:expr, $ty:ty, $variant:ident, $checked:expr, $to:expr) => {
        match <$ty>::try_from($value) {
            Ok(v) => Ok(Value::$variant(v)),
            Err(_) if $checked => Err(EvaluationError::overflow(format!(
                "conversion to {}",
                $to.type_info()
            ))),
            Err(_) => Ok(Value::$variant($value as $ty)),
        }
    };
}

fn narrow_integer(value: i128, to: ScalarKind, checked: bool) -> EvaluationResult<Value> {
    match to {
        ScalarKind::SByte => narrow!(value, i8, SByte, checked, to),
        ScalarKind::Byte => narrow!(value, u8, Byte, checked, to),
        ScalarKind::Int16 => narrow!(value, i16, Int16, checked, to),
        ScalarKind::UInt16 => narrow!(value, u16, UInt16, checked, to),
        ScalarKind::Int32 => narrow!(value, i32, Int32, checked, to),
        ScalarKind::UInt32 => narrow!(value, u32, UInt32, checked, to),
        ScalarKind::Int64 => narrow!(value, i64, Int64, checked, to),
        ScalarKind::UInt64 => narrow!(value, u64, UInt64, checked, to),
        ScalarKind::Char => {
            let unit = match u16::try_from(value) {
                Ok(unit) => unit,
                Err(_) if checked => {
                    return Err(EvaluationError::overflow("conversion to Char"));
                }
                Err(_) => value as u16,
            };
            char::from_u32(unit as u32)
                .map(Value::Char)
                .ok_or_else(|| EvaluationError::invalid_cast(format!("code unit {unit:#06x}"), "Char"))
        }
        other => Err(EvaluationError::invalid_cast("Int64", other.type_info())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_implicit_cost_ordering() {
        let to_long = TypeCoercion::implicit_cost(&TypeInfo::Int32, &TypeInfo::Int64).unwrap();
        let to_double = TypeCoercion::implicit_cost(&TypeInfo::Int32, &TypeInfo::Double).unwrap();
        assert!(to_long < to_double);
        assert_eq!(TypeCoercion::implicit_cost(&TypeInfo::Int32, &TypeInfo::Int32), Some(0));
        assert_eq!(TypeCoercion::implicit_cost(&TypeInfo::Int64, &TypeInfo::Int32), None);
        assert_eq!(TypeCoercion::implicit_cost(&TypeInfo::Double, &TypeInfo::Decimal), None);
        assert!(TypeCoercion::can_convert_implicitly(&TypeInfo::Null, &TypeInfo::String));
        assert!(!TypeCoercion::can_convert_implicitly(&TypeInfo::Null, &TypeInfo::Int32));
    }

    #[test]
    fn test_explicit_conversions() {
        assert!(TypeCoercion::can_convert_explicitly(&TypeInfo::Double, &TypeInfo::Byte));
        assert!(TypeCoercion::can_convert_explicitly(&TypeInfo::Int32, &TypeInfo::Char));
        assert!(TypeCoercion::can_convert_explicitly(&TypeInfo::Object, &TypeInfo::Int32));
        assert!(!TypeCoercion::can_convert_explicitly(&TypeInfo::String, &TypeInfo::Int32));
        assert!(!TypeCoercion::can_convert_explicitly(&TypeInfo::Boolean, &TypeInfo::Int32));
    }

    #[test]
    fn test_binary_promotion() {
        use NumericKind as K;
        let promote = TypeCoercion::binary_numeric_promotion;
        assert_eq!(promote(&TypeInfo::Int32, &TypeInfo::Int32), Some(K::Int32));
        assert_eq!(promote(&TypeInfo::Byte, &TypeInfo::Int16), Some(K::Int32));
        assert_eq!(promote(&TypeInfo::UInt32, &TypeInfo::Int32), Some(K::Int64));
        assert_eq!(promote(&TypeInfo::UInt32, &TypeInfo::UInt16), Some(K::UInt32));
        assert_eq!(promote(&TypeInfo::Int32, &TypeInfo::Double), Some(K::Double));
        assert_eq!(promote(&TypeInfo::Single, &TypeInfo::Int64), Some(K::Single));
        assert_eq!(promote(&TypeInfo::Decimal, &TypeInfo::Int64), Some(K::Decimal));
        assert_eq!(promote(&TypeInfo::Decimal, &TypeInfo::Double), None);
        assert_eq!(promote(&TypeInfo::UInt64, &TypeInfo::Int32), None);
        assert_eq!(promote(&TypeInfo::UInt64, &TypeInfo::Byte), Some(K::UInt64));
        assert_eq!(promote(&TypeInfo::String, &TypeInfo::Int32), None);
    }

    #[test]
    fn test_convert_widening() {
        assert_eq!(
            TypeCoercion::convert(&Value::Int32(5), ScalarKind::Double, false).unwrap(),
            Value::Double(5.0)
        );
        assert_eq!(
            TypeCoercion::convert(&Value::Int32(5), ScalarKind::Decimal, false).unwrap(),
            Value::Decimal(dec("5"))
        );
        assert_eq!(
            TypeCoercion::convert(&Value::Char('A'), ScalarKind::Int32, false).unwrap(),
            Value::Int32(65)
        );
    }

    #[test]
    fn test_convert_narrowing() {
        assert_eq!(
            TypeCoercion::convert(&Value::Int32(300), ScalarKind::Byte, false).unwrap(),
            Value::Byte(44)
        );
        assert!(matches!(
            TypeCoercion::convert(&Value::Int32(300), ScalarKind::Byte, true),
            Err(EvaluationError::Overflow { .. })
        ));
        assert_eq!(
            TypeCoercion::convert(&Value::Double(3.9), ScalarKind::Int32, false).unwrap(),
            Value::Int32(3)
        );
        assert_eq!(
            TypeCoercion::convert(&Value::Decimal(dec("-7.5")), ScalarKind::Int64, false)
                .unwrap(),
            Value::Int64(-7)
        );
        assert!(matches!(
            TypeCoercion::convert(&Value::Double(f64::NAN), ScalarKind::Int32, true),
            Err(EvaluationError::Overflow { .. })
        ));
    }

    #[test]
    fn test_convert_to_type() {
        assert_eq!(
            TypeCoercion::convert_to_type(&Value::Int16(3), &TypeInfo::Int64).unwrap(),
            Value::Int64(3)
        );
        assert_eq!(
            TypeCoercion::convert_to_type(&Value::Null, &TypeInfo::String).unwrap(),
            Value::Null
        );
        assert!(TypeCoercion::convert_to_type(&Value::Null, &TypeInfo::Int32).is_err());
        assert!(TypeCoercion::convert_to_type(&Value::Double(1.0), &TypeInfo::Int32).is_err());
    }
}
