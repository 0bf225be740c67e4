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

//! Static type tags for expression values
//!
//! Every element of a compiled expression carries a [`TypeInfo`] that is fixed
//! once resolution completes. Primitive tags mirror the scalar kinds the
//! engine can evaluate; host types are referenced through [`HostTypeRef`].

use crate::registry::host::HostTypeRef;
use std::fmt;

/// Type information for expression values
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeInfo {
    /// No value (methods without a return value)
    Void,
    /// Type of the `null` literal
    Null,
    /// Boolean value
    Boolean,
    /// UTF-16 style character
    Char,
    /// 8-bit signed integer
    SByte,
    /// 8-bit unsigned integer
    Byte,
    /// 16-bit signed integer
    Int16,
    /// 16-bit unsigned integer
    UInt16,
    /// 32-bit signed integer
    Int32,
    /// 32-bit unsigned integer
    UInt32,
    /// 64-bit signed integer
    Int64,
    /// 64-bit unsigned integer
    UInt64,
    /// 32-bit float
    Single,
    /// 64-bit float
    Double,
    /// 128-bit decimal
    Decimal,
    /// String value
    String,
    /// Date and time without offset
    DateTime,
    /// Signed duration
    TimeSpan,
    /// Any value
    Object,
    /// Array with element type
    Array(Box<TypeInfo>),
    /// Host type registered through the import registry
    Host(HostTypeRef),
}

/// Scalar kinds a value can be converted to at runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    /// Boolean
    Boolean,
    /// Character
    Char,
    /// 8-bit signed integer
    SByte,
    /// 8-bit unsigned integer
    Byte,
    /// 16-bit signed integer
    Int16,
    /// 16-bit unsigned integer
    UInt16,
    /// 32-bit signed integer
    Int32,
    /// 32-bit unsigned integer
    UInt32,
    /// 64-bit signed integer
    Int64,
    /// 64-bit unsigned integer
    UInt64,
    /// 32-bit float
    Single,
    /// 64-bit float
    Double,
    /// Decimal
    Decimal,
    /// String
    String,
    /// Date and time
    DateTime,
    /// Duration
    TimeSpan,
}

/// Numeric kinds arithmetic is performed in after promotion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericKind {
    /// 32-bit signed integer
    Int32,
    /// 32-bit unsigned integer
    UInt32,
    /// 64-bit signed integer
    Int64,
    /// 64-bit unsigned integer
    UInt64,
    /// 32-bit float
    Single,
    /// 64-bit float
    Double,
    /// Decimal
    Decimal,
}

impl TypeInfo {
    /// Check if this type is an integral numeric type (char excluded)
    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            TypeInfo::SByte
                | TypeInfo::Byte
                | TypeInfo::Int16
                | TypeInfo::UInt16
                | TypeInfo::Int32
                | TypeInfo::UInt32
                | TypeInfo::Int64
                | TypeInfo::UInt64
        )
    }

    /// Check if this type is a floating point or decimal type
    pub fn is_real(&self) -> bool {
        matches!(self, TypeInfo::Single | TypeInfo::Double | TypeInfo::Decimal)
    }

    /// Check if this type is numeric
    pub fn is_numeric(&self) -> bool {
        self.is_integral() || self.is_real()
    }

    /// Check if this type is signed integral
    pub fn is_signed_integral(&self) -> bool {
        matches!(
            self,
            TypeInfo::SByte | TypeInfo::Int16 | TypeInfo::Int32 | TypeInfo::Int64
        )
    }

    /// Check if values of this type may be `null`
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            TypeInfo::Null
                | TypeInfo::String
                | TypeInfo::Object
                | TypeInfo::Array(_)
                | TypeInfo::Host(_)
        )
    }

    /// Element type of an array type
    pub fn element_type(&self) -> Option<&TypeInfo> {
        match self {
            TypeInfo::Array(elem) => Some(elem),
            _ => None,
        }
    }

    /// Scalar kind for primitive types
    pub fn scalar_kind(&self) -> Option<ScalarKind> {
        Some(match self {
            TypeInfo::Boolean => ScalarKind::Boolean,
            TypeInfo::Char => ScalarKind::Char,
            TypeInfo::SByte => ScalarKind::SByte,
            TypeInfo::Byte => ScalarKind::Byte,
            TypeInfo::Int16 => ScalarKind::Int16,
            TypeInfo::UInt16 => ScalarKind::UInt16,
            TypeInfo::Int32 => ScalarKind::Int32,
            TypeInfo::UInt32 => ScalarKind::UInt32,
            TypeInfo::Int64 => ScalarKind::Int64,
            TypeInfo::UInt64 => ScalarKind::UInt64,
            TypeInfo::Single => ScalarKind::Single,
            TypeInfo::Double => ScalarKind::Double,
            TypeInfo::Decimal => ScalarKind::Decimal,
            TypeInfo::String => ScalarKind::String,
            TypeInfo::DateTime => ScalarKind::DateTime,
            TypeInfo::TimeSpan => ScalarKind::TimeSpan,
            _ => return None,
        })
    }

    /// Get the name of this type for display
    pub fn type_name(&self) -> String {
        match self {
            TypeInfo::Void => "Void".to_string(),
            TypeInfo::Null => "Null".to_string(),
            TypeInfo::Boolean => "Boolean".to_string(),
            TypeInfo::Char => "Char".to_string(),
            TypeInfo::SByte => "SByte".to_string(),
            TypeInfo::Byte => "Byte".to_string(),
            TypeInfo::Int16 => "Int16".to_string(),
            TypeInfo::UInt16 => "UInt16".to_string(),
            TypeInfo::Int32 => "Int32".to_string(),
            TypeInfo::UInt32 => "UInt32".to_string(),
            TypeInfo::Int64 => "Int64".to_string(),
            TypeInfo::UInt64 => "UInt64".to_string(),
            TypeInfo::Single => "Single".to_string(),
            TypeInfo::Double => "Double".to_string(),
            TypeInfo::Decimal => "Decimal".to_string(),
            TypeInfo::String => "String".to_string(),
            TypeInfo::DateTime => "DateTime".to_string(),
            TypeInfo::TimeSpan => "TimeSpan".to_string(),
            TypeInfo::Object => "Object".to_string(),
            TypeInfo::Array(elem) => format!("{}[]", elem.type_name()),
            TypeInfo::Host(host) => host.name().to_string(),
        }
    }
}

impl ScalarKind {
    /// Static type corresponding to this kind
    pub fn type_info(self) -> TypeInfo {
        match self {
            ScalarKind::Boolean => TypeInfo::Boolean,
            ScalarKind::Char => TypeInfo::Char,
            ScalarKind::SByte => TypeInfo::SByte,
            ScalarKind::Byte => TypeInfo::Byte,
            ScalarKind::Int16 => TypeInfo::Int16,
            ScalarKind::UInt16 => TypeInfo::UInt16,
            ScalarKind::Int32 => TypeInfo::Int32,
            ScalarKind::UInt32 => TypeInfo::UInt32,
            ScalarKind::Int64 => TypeInfo::Int64,
            ScalarKind::UInt64 => TypeInfo::UInt64,
            ScalarKind::Single => TypeInfo::Single,
            ScalarKind::Double => TypeInfo::Double,
            ScalarKind::Decimal => TypeInfo::Decimal,
            ScalarKind::String => TypeInfo::String,
            ScalarKind::DateTime => TypeInfo::DateTime,
            ScalarKind::TimeSpan => TypeInfo::TimeSpan,
        }
    }
}

impl NumericKind {
    /// Static type corresponding to this kind
    pub fn type_info(self) -> TypeInfo {
        self.scalar_kind().type_info()
    }

    /// Scalar kind corresponding to this kind
    pub fn scalar_kind(self) -> ScalarKind {
        match self {
            NumericKind::Int32 => ScalarKind::Int32,
            NumericKind::UInt32 => ScalarKind::UInt32,
            NumericKind::Int64 => ScalarKind::Int64,
            NumericKind::UInt64 => ScalarKind::UInt64,
            NumericKind::Single => ScalarKind::Single,
            NumericKind::Double => ScalarKind::Double,
            NumericKind::Decimal => ScalarKind::Decimal,
        }
    }

    /// Check if this kind is integral
    pub fn is_integral(self) -> bool {
        matches!(
            self,
            NumericKind::Int32 | NumericKind::UInt32 | NumericKind::Int64 | NumericKind::UInt64
        )
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

impl fmt::Display for NumericKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_info())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_classification() {
        assert!(TypeInfo::Int32.is_integral());
        assert!(!TypeInfo::Char.is_integral());
        assert!(TypeInfo::Decimal.is_real());
        assert!(TypeInfo::UInt16.is_numeric());
        assert!(TypeInfo::Int64.is_signed_integral());
        assert!(!TypeInfo::UInt64.is_signed_integral());
        assert!(TypeInfo::String.is_reference());
        assert!(!TypeInfo::DateTime.is_reference());
    }

    #[test]
    fn test_type_names() {
        assert_eq!(TypeInfo::UInt64.to_string(), "UInt64");
        assert_eq!(
            TypeInfo::Array(Box::new(TypeInfo::Double)).to_string(),
            "Double[]"
        );
    }

    #[test]
    fn test_numeric_kind_round_trip() {
        for kind in [
            NumericKind::Int32,
            NumericKind::UInt32,
            NumericKind::Int64,
            NumericKind::UInt64,
            NumericKind::Single,
            NumericKind::Double,
            NumericKind::Decimal,
        ] {
            assert_eq!(kind.type_info().scalar_kind(), Some(kind.scalar_kind()));
        }
    }
}
