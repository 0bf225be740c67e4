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

//! Compile-time diagnostics
//!
//! Every failure raised while turning source text into an executable
//! expression is reported as a single [`CompileError`] carrying a reason code
//! and a human-readable message.

use std::fmt;
use thiserror::Error;

/// Reason code attached to every compile error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum CompileErrorReason {
    /// Malformed source text
    SyntaxError,
    /// Literal value not representable in any permitted type
    ConstantOverflow,
    /// Operand, operator or indexer type incompatibility
    TypeMismatch,
    /// Identifier or function does not resolve
    UndefinedName,
    /// A member without a return value was used as a value
    FunctionHasNoReturnValue,
    /// `cast` between types that have no explicit conversion
    InvalidExplicitCast,
    /// Overload or identifier ambiguity
    AmbiguousMatch,
    /// Resolved member is not accessible
    AccessDenied,
    /// Literal text (date, time span) could not be parsed
    InvalidFormat,
}

impl fmt::Display for CompileErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SyntaxError => "SyntaxError",
            Self::ConstantOverflow => "ConstantOverflow",
            Self::TypeMismatch => "TypeMismatch",
            Self::UndefinedName => "UndefinedName",
            Self::FunctionHasNoReturnValue => "FunctionHasNoReturnValue",
            Self::InvalidExplicitCast => "InvalidExplicitCast",
            Self::AmbiguousMatch => "AmbiguousMatch",
            Self::AccessDenied => "AccessDenied",
            Self::InvalidFormat => "InvalidFormat",
        };
        f.write_str(name)
    }
}

/// Structured compile failure
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{reason}: {message}{}", position.map(|p| format!(" (at position {p})")).unwrap_or_default())]
pub struct CompileError {
    /// Reason code
    pub reason: CompileErrorReason,
    /// Human-readable message
    pub message: String,
    /// Byte offset into the source text, when known
    pub position: Option<usize>,
}

impl CompileError {
    /// Create a compile error without position information
    pub fn new(reason: CompileErrorReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
            position: None,
        }
    }

    /// Attach a source position
    pub fn at(mut self, position: usize) -> Self {
        self.position.get_or_insert(position);
        self
    }

    /// Create a syntax error
    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(CompileErrorReason::SyntaxError, message)
    }

    /// Create a constant overflow error
    pub fn constant_overflow(message: impl Into<String>) -> Self {
        Self::new(CompileErrorReason::ConstantOverflow, message)
    }

    /// Create a type mismatch error
    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::new(CompileErrorReason::TypeMismatch, message)
    }

    /// Create an undefined name error
    pub fn undefined_name(message: impl Into<String>) -> Self {
        Self::new(CompileErrorReason::UndefinedName, message)
    }

    /// Create a missing return value error
    pub fn no_return_value(member: &str) -> Self {
        Self::new(
            CompileErrorReason::FunctionHasNoReturnValue,
            format!("Function '{member}' does not return a value"),
        )
    }

    /// Create an invalid explicit cast error
    pub fn invalid_cast(from: impl fmt::Display, to: impl fmt::Display) -> Self {
        Self::new(
            CompileErrorReason::InvalidExplicitCast,
            format!("Cannot explicitly convert from {from} to {to}"),
        )
    }

    /// Create an ambiguous match error
    pub fn ambiguous(message: impl Into<String>) -> Self {
        Self::new(CompileErrorReason::AmbiguousMatch, message)
    }

    /// Create an access denied error
    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::new(CompileErrorReason::AccessDenied, message)
    }

    /// Create an invalid format error
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::new(CompileErrorReason::InvalidFormat, message)
    }
}

/// Result type for compilation
pub type CompileResult<T> = Result<T, CompileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_reason_and_position() {
        let err = CompileError::undefined_name("Name 'x' is not defined").at(4);
        assert_eq!(
            err.to_string(),
            "UndefinedName: Name 'x' is not defined (at position 4)"
        );
    }

    #[test]
    fn test_first_position_wins() {
        let err = CompileError::syntax("bad").at(3).at(9);
        assert_eq!(err.position, Some(3));
        assert_eq!(err.reason, CompileErrorReason::SyntaxError);
    }
}
