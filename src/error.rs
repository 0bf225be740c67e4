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

//! Error type of the public engine surface

use crate::diagnostics::CompileError;
use crate::evaluator::error::EvaluationError;
use crate::registry::ImportError;
use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, CalcError>;

/// Errors returned by compute instances, variable stores and contexts
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalcError {
    /// A name argument was empty
    #[error("Name must not be empty")]
    NullKey,

    /// No variable or expression with the name exists
    #[error("The key '{key}' was not found")]
    KeyNotFound {
        /// Missing name
        key: String,
    },

    /// The name is already taken by a variable or expression
    #[error("An item with the key '{key}' has already been added")]
    DuplicateKey {
        /// Duplicate name
        key: String,
    },

    /// The operation is not valid in the current state
    #[error("Invalid operation: {message}")]
    InvalidOperation {
        /// Error message
        message: String,
    },

    /// Adding the dependency would close a cycle
    #[error("Circular dependency: {}", path.join(" -> "))]
    CyclicDependency {
        /// Names along the cycle, starting and ending with the same name
        path: Vec<String>,
    },

    /// A value does not have, or cannot convert to, the requested type
    #[error("Type mismatch for '{key}': expected {expected}, found {actual}")]
    TypeMismatch {
        /// Variable or expression name
        key: String,
        /// Expected type
        expected: String,
        /// Actual type
        actual: String,
    },

    /// Expression failed to compile
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// Expression failed to evaluate
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    /// Import registration failed
    #[error(transparent)]
    Import(#[from] ImportError),
}

impl CalcError {
    /// Create a key-not-found error
    pub fn key_not_found(key: impl Into<String>) -> Self {
        Self::KeyNotFound { key: key.into() }
    }

    /// Create a duplicate-key error
    pub fn duplicate_key(key: impl Into<String>) -> Self {
        Self::DuplicateKey { key: key.into() }
    }

    /// Create an invalid-operation error
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Create a type-mismatch error
    pub fn type_mismatch(
        key: impl Into<String>,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        Self::TypeMismatch {
            key: key.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// The compile error, if this is one
    pub fn as_compile_error(&self) -> Option<&CompileError> {
        match self {
            Self::Compile(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message() {
        let err = CalcError::CyclicDependency {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Circular dependency: a -> b -> a");
    }

    #[test]
    fn test_from_conversions() {
        let err: CalcError = EvaluationError::DivideByZero.into();
        assert!(matches!(err, CalcError::Evaluation(EvaluationError::DivideByZero)));
        assert!(err.as_compile_error().is_none());
    }
}
