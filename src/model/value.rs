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

//! Runtime values produced and consumed by compiled expressions

use super::types::TypeInfo;
use crate::registry::host::HostObject;
use chrono::{NaiveDateTime, TimeDelta};
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;

/// A dynamically tagged runtime value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The null reference
    Null,
    /// Boolean value
    Boolean(bool),
    /// Character value
    Char(char),
    /// 8-bit signed integer
    SByte(i8),
    /// 8-bit unsigned integer
    Byte(u8),
    /// 16-bit signed integer
    Int16(i16),
    /// 16-bit unsigned integer
    UInt16(u16),
    /// 32-bit signed integer
    Int32(i32),
    /// 32-bit unsigned integer
    UInt32(u32),
    /// 64-bit signed integer
    Int64(i64),
    /// 64-bit unsigned integer
    UInt64(u64),
    /// 32-bit float
    Single(f32),
    /// 64-bit float
    Double(f64),
    /// Decimal value
    Decimal(Decimal),
    /// String value
    String(Arc<str>),
    /// Date and time value
    DateTime(NaiveDateTime),
    /// Duration value
    TimeSpan(TimeDelta),
    /// Array of values sharing an element type
    Array(ArrayValue),
    /// Host object instance
    Object(HostObject),
}

/// Array value with its static element type
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayValue {
    element_type: TypeInfo,
    items: Arc<[Value]>,
}

impl ArrayValue {
    /// Create a new array
    pub fn new(element_type: TypeInfo, items: impl Into<Arc<[Value]>>) -> Self {
        Self {
            element_type,
            items: items.into(),
        }
    }

    /// Element type of the array
    pub fn element_type(&self) -> &TypeInfo {
        &self.element_type
    }

    /// Items of the array
    pub fn items(&self) -> &[Value] {
        &self.items
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the array is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Value {
    /// Create a string value
    pub fn string(s: impl AsRef<str>) -> Self {
        Value::String(Arc::from(s.as_ref()))
    }

    /// Create an array value
    pub fn array(element_type: TypeInfo, items: Vec<Value>) -> Self {
        Value::Array(ArrayValue::new(element_type, items))
    }

    /// Equality that treats floats by bit pattern
    ///
    /// Unlike `==`, `NaN` is identical to itself and `-0.0` differs from `0.0`.
    pub fn is_identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Double(x), Value::Double(y)) => x.to_bits() == y.to_bits(),
            (Value::Single(x), Value::Single(y)) => x.to_bits() == y.to_bits(),
            (Value::Array(x), Value::Array(y)) => {
                x.element_type() == y.element_type()
                    && x.len() == y.len()
                    && x.items().iter().zip(y.items()).all(|(a, b)| a.is_identical(b))
            }
            _ => self == other,
        }
    }

    /// Check if this value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get the dynamic type of this value
    pub fn type_info(&self) -> TypeInfo {
        match self {
            Value::Null => TypeInfo::Null,
            Value::Boolean(_) => TypeInfo::Boolean,
            Value::Char(_) => TypeInfo::Char,
            Value::SByte(_) => TypeInfo::SByte,
            Value::Byte(_) => TypeInfo::Byte,
            Value::Int16(_) => TypeInfo::Int16,
            Value::UInt16(_) => TypeInfo::UInt16,
            Value::Int32(_) => TypeInfo::Int32,
            Value::UInt32(_) => TypeInfo::UInt32,
            Value::Int64(_) => TypeInfo::Int64,
            Value::UInt64(_) => TypeInfo::UInt64,
            Value::Single(_) => TypeInfo::Single,
            Value::Double(_) => TypeInfo::Double,
            Value::Decimal(_) => TypeInfo::Decimal,
            Value::String(_) => TypeInfo::String,
            Value::DateTime(_) => TypeInfo::DateTime,
            Value::TimeSpan(_) => TypeInfo::TimeSpan,
            Value::Array(arr) => TypeInfo::Array(Box::new(arr.element_type.clone())),
            Value::Object(obj) => TypeInfo::Host(obj.host_type().clone()),
        }
    }

    /// Get the boolean payload
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Get the string payload
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_ref()),
            _ => None,
        }
    }

    /// Get the array payload
    pub fn as_array(&self) -> Option<&ArrayValue> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Get the host object payload
    pub fn as_object(&self) -> Option<&HostObject> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Widen any integral value (including char) to i128
    pub fn as_i128(&self) -> Option<i128> {
        Some(match self {
            Value::Char(c) => *c as i128,
            Value::SByte(v) => *v as i128,
            Value::Byte(v) => *v as i128,
            Value::Int16(v) => *v as i128,
            Value::UInt16(v) => *v as i128,
            Value::Int32(v) => *v as i128,
            Value::UInt32(v) => *v as i128,
            Value::Int64(v) => *v as i128,
            Value::UInt64(v) => *v as i128,
            _ => return None,
        })
    }

    /// Get any numeric value as f64
    pub fn as_f64(&self) -> Option<f64> {
        use rust_decimal::prelude::ToPrimitive;
        match self {
            Value::Single(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            Value::Decimal(d) => d.to_f64(),
            other => other.as_i128().map(|i| i as f64),
        }
    }
}

/// Convert a runtime value into a concrete Rust type
pub trait FromValue: Sized {
    /// Extract the payload when the value holds exactly this type
    fn from_value(value: &Value) -> Option<Self>;
}

macro_rules! value_conversions {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }

            impl FromValue for $ty {
                fn from_value(value: &Value) -> Option<Self> {
                    match value {
                        Value::$variant(v) => Some(v.clone()),
                        _ => None,
                    }
                }
            }
        )*
    };
}

value_conversions! {
    bool => Boolean,
    char => Char,
    i8 => SByte,
    u8 => Byte,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Single,
    f64 => Double,
    Decimal => Decimal,
    NaiveDateTime => DateTime,
    TimeDelta => TimeSpan,
    HostObject => Object,
    ArrayValue => Array,
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Boolean(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Value::Char(c) => write!(f, "{c}"),
            Value::SByte(v) => write!(f, "{v}"),
            Value::Byte(v) => write!(f, "{v}"),
            Value::Int16(v) => write!(f, "{v}"),
            Value::UInt16(v) => write!(f, "{v}"),
            Value::Int32(v) => write!(f, "{v}"),
            Value::UInt32(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::UInt64(v) => write!(f, "{v}"),
            Value::Single(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::String(s) => write!(f, "{s}"),
            Value::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            Value::TimeSpan(span) => write!(f, "{}", format_time_span(*span)),
            Value::Array(arr) => write!(f, "{}[{}]", arr.element_type, arr.len()),
            Value::Object(obj) => write!(f, "{}", obj.host_type().name()),
        }
    }
}

/// Format a duration as `[-][d.]hh:mm:ss[.fffffff]`
pub fn format_time_span(span: TimeDelta) -> String {
    let negative = span < TimeDelta::zero();
    let span = if negative { -span } else { span };
    let days = span.num_days();
    let hours = span.num_hours() % 24;
    let minutes = span.num_minutes() % 60;
    let seconds = span.num_seconds() % 60;
    let ticks = span.subsec_nanos() / 100;

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    if days > 0 {
        out.push_str(&format!("{days}."));
    }
    out.push_str(&format!("{hours:02}:{minutes:02}:{seconds:02}"));
    if ticks > 0 {
        out.push_str(&format!(".{ticks:07}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_type_info() {
        assert_eq!(Value::from(1i32).type_info(), TypeInfo::Int32);
        assert_eq!(Value::from(1u64).type_info(), TypeInfo::UInt64);
        assert_eq!(Value::from("abc").type_info(), TypeInfo::String);
        assert_eq!(
            Value::array(TypeInfo::Int32, vec![1.into()]).type_info(),
            TypeInfo::Array(Box::new(TypeInfo::Int32))
        );
    }

    #[test]
    fn test_from_value() {
        assert_eq!(i32::from_value(&Value::Int32(7)), Some(7));
        assert_eq!(i32::from_value(&Value::Int64(7)), None);
        assert_eq!(String::from_value(&Value::from("x")), Some("x".to_string()));
        assert_eq!(Value::from(None::<i32>), Value::Null);
    }

    #[test]
    fn test_is_identical() {
        assert!(Value::Double(f64::NAN).is_identical(&Value::Double(f64::NAN)));
        assert!(!Value::Double(-0.0).is_identical(&Value::Double(0.0)));
        assert!(Value::string("a").is_identical(&Value::from("a")));
        let nans = Value::array(TypeInfo::Single, vec![Value::Single(f32::NAN)]);
        assert!(nans.is_identical(&nans.clone()));
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Double(2.0).to_string(), "2");
        assert_eq!(Value::Boolean(true).to_string(), "True");
        assert_eq!(Value::Null.to_string(), "");
    }

    #[test]
    fn test_format_time_span() {
        let span = TimeDelta::days(1) + TimeDelta::hours(2) + TimeDelta::minutes(3);
        assert_eq!(format_time_span(span), "1.02:03:00");
        assert_eq!(format_time_span(-TimeDelta::minutes(90)), "-01:30:00");
        assert_eq!(format_time_span(TimeDelta::milliseconds(1500)), "00:00:01.5000000");
    }
}
