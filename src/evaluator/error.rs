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

//! Runtime errors raised while evaluating compiled expressions

use thiserror::Error;

/// Result type for evaluation operations
pub type EvaluationResult<T> = Result<T, EvaluationError>;

/// Errors that can occur while evaluating an expression
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    /// Checked arithmetic or a conversion exceeded the target range
    #[error("Arithmetic operation resulted in an overflow: {operation}")]
    Overflow {
        /// Operation that overflowed
        operation: String,
    },

    /// Integral or decimal division by zero
    #[error("Attempted to divide by zero")]
    DivideByZero,

    /// A member was accessed through a null receiver
    #[error("Object reference not set to an instance of an object: {operation}")]
    NullReference {
        /// Operation that needed a non-null value
        operation: String,
    },

    /// Variable vanished between compilation and evaluation
    #[error("Variable '{name}' not found")]
    VariableNotFound {
        /// Variable name
        name: String,
    },

    /// Referenced expression result is not available
    #[error("Expression result '{name}' not found")]
    ResultNotFound {
        /// Expression name
        name: String,
    },

    /// Array or string index outside the valid range
    #[error("Index {index} was outside the bounds of a sequence of length {length}")]
    IndexOutOfRange {
        /// Requested index
        index: i64,
        /// Sequence length
        length: usize,
    },

    /// Runtime conversion of an object value failed
    #[error("Unable to cast value of type {from} to {to}")]
    InvalidCast {
        /// Dynamic source type
        from: String,
        /// Requested target type
        to: String,
    },

    /// Host member implementation reported a failure
    #[error("Member '{member}' failed: {message}")]
    Host {
        /// Member name
        member: String,
        /// Failure description
        message: String,
    },

    /// Malformed program or evaluation stack
    #[error("Invalid program: {message}")]
    Vm {
        /// Error message
        message: String,
    },
}

impl EvaluationError {
    /// Create an overflow error
    pub fn overflow(operation: impl Into<String>) -> Self {
        Self::Overflow {
            operation: operation.into(),
        }
    }

    /// Create a null reference error
    pub fn null_reference(operation: impl Into<String>) -> Self {
        Self::NullReference {
            operation: operation.into(),
        }
    }

    /// Create an invalid cast error
    pub fn invalid_cast(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidCast {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Create a host member failure
    pub fn host(member: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Host {
            member: member.into(),
            message: message.into(),
        }
    }

    /// Create a program error
    pub fn vm(message: impl Into<String>) -> Self {
        Self::Vm {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            EvaluationError::DivideByZero.to_string(),
            "Attempted to divide by zero"
        );
        assert_eq!(
            EvaluationError::IndexOutOfRange { index: 3, length: 2 }.to_string(),
            "Index 3 was outside the bounds of a sequence of length 2"
        );
        assert!(matches!(
            EvaluationError::overflow("Int32 addition"),
            EvaluationError::Overflow { .. }
        ));
    }
}
