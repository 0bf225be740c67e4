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

//! Typed expression element tree
//!
//! Every element carries its resolved static type. The tree is built once by
//! the [`ExpressionAnalyzer`](super::ExpressionAnalyzer) and is immutable
//! afterwards; the compiler walks it to emit bytecode.

use crate::ast::BinaryOperator;
use crate::evaluator::options::StringComparison;
use crate::model::{NumericKind, TypeInfo, Value};
use crate::registry::{ArgumentBinding, HostMember};
use std::fmt;
use std::sync::Arc;

/// A resolved, typed node of an expression
#[derive(Debug, Clone)]
pub struct Element {
    /// Node payload
    pub kind: ElementKind,
    /// Static result type, fixed at resolution
    pub result_type: TypeInfo,
    /// Byte offset of the originating syntax node
    pub position: usize,
}

/// Element variants, one per operator or reference kind
#[derive(Debug, Clone)]
pub enum ElementKind {
    /// Constant value
    Literal(Value),

    /// Variable from the variable store, by normalized key
    Variable {
        /// Lookup key
        key: String,
    },

    /// Result of another named expression, by normalized key
    ExpressionRef {
        /// Lookup key
        key: String,
    },

    /// The owner object of the evaluation
    Owner,

    /// Numeric arithmetic; operands are converted to `kind` when emitted
    Arithmetic {
        /// One of `+ - * / % ^`
        op: BinaryOperator,
        /// Operation type
        kind: NumericKind,
        /// Left operand
        left: Box<Element>,
        /// Right operand
        right: Box<Element>,
    },

    /// String concatenation of any two operands
    Concat {
        /// Left operand
        left: Box<Element>,
        /// Right operand
        right: Box<Element>,
    },

    /// Date and time arithmetic
    Temporal {
        /// Operation
        op: TemporalOp,
        /// Left operand
        left: Box<Element>,
        /// Right operand
        right: Box<Element>,
    },

    /// Integral shift; the count is converted to `Int32`
    Shift {
        /// `<<` or `>>`
        op: BinaryOperator,
        /// Promoted type of the shifted value
        kind: NumericKind,
        /// Shifted value
        left: Box<Element>,
        /// Shift count
        right: Box<Element>,
    },

    /// Comparison producing a boolean
    Compare {
        /// Comparison operator
        op: BinaryOperator,
        /// How the operands are compared
        kind: CompareKind,
        /// Left operand
        left: Box<Element>,
        /// Right operand
        right: Box<Element>,
    },

    /// Short-circuit AND or OR over a flattened chain of boolean operands
    Logical {
        /// `And` or `Or`
        op: BinaryOperator,
        /// Operands in evaluation order
        operands: Vec<Element>,
    },

    /// Boolean exclusive or
    LogicalXor {
        /// Left operand
        left: Box<Element>,
        /// Right operand
        right: Box<Element>,
    },

    /// Bitwise AND, OR or XOR over integral operands
    Bitwise {
        /// `And`, `Or` or `Xor`
        op: BinaryOperator,
        /// Common integral type
        kind: NumericKind,
        /// Left operand
        left: Box<Element>,
        /// Right operand
        right: Box<Element>,
    },

    /// Boolean negation
    Not(Box<Element>),

    /// Bitwise complement of an integral operand
    BitwiseNot {
        /// Promoted operand type
        kind: NumericKind,
        /// Operand
        operand: Box<Element>,
    },

    /// Arithmetic negation
    Negate {
        /// Promoted operand type
        kind: NumericKind,
        /// Operand
        operand: Box<Element>,
    },

    /// Negation of a time span
    NegateSpan(Box<Element>),

    /// `If(condition; then; else)`; branches convert to the result type
    Conditional {
        /// Boolean condition
        condition: Box<Element>,
        /// Value when true
        then_branch: Box<Element>,
        /// Value when false
        else_branch: Box<Element>,
    },

    /// `operand IN (items)`, stopping at the first match
    In {
        /// Tested value
        operand: Box<Element>,
        /// Candidates with the comparison used for each
        items: Vec<(Element, CompareKind)>,
    },

    /// Conversion to the element's result type
    Cast {
        /// Converted value
        operand: Box<Element>,
        /// Report overflow on narrowing numeric conversions
        checked: bool,
    },

    /// Field, property, method or indexer invocation on a host member
    Invoke {
        /// Resolved member
        member: Arc<HostMember>,
        /// Receiver for instance members
        receiver: Option<Box<Element>>,
        /// Arguments as written
        args: Vec<Element>,
        /// Argument conversions and param-array collection
        binding: ArgumentBinding,
    },

    /// Element access on an array value
    ArrayIndex {
        /// Array operand
        array: Box<Element>,
        /// Index, converted to `Int32`
        index: Box<Element>,
    },
}

/// Date and time arithmetic operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemporalOp {
    /// `DateTime + TimeSpan`
    AddSpan,
    /// `DateTime - TimeSpan`
    SubtractSpan,
    /// `DateTime - DateTime`
    Difference,
    /// `TimeSpan + TimeSpan`
    AddSpans,
    /// `TimeSpan - TimeSpan`
    SubtractSpans,
}

/// How two operands are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareKind {
    /// Numeric comparison after promotion to a common type
    Numeric(NumericKind),
    /// Boolean equality
    Boolean,
    /// String comparison
    String(StringComparison),
    /// Date-time comparison
    DateTime,
    /// Time-span comparison
    TimeSpan,
    /// Equality of references, nulls and objects
    Reference,
}

impl CompareKind {
    /// Type both operands convert to before comparing, if any
    pub fn operand_type(self) -> Option<TypeInfo> {
        match self {
            Self::Numeric(kind) => Some(kind.type_info()),
            Self::Boolean => Some(TypeInfo::Boolean),
            Self::String(_) => Some(TypeInfo::String),
            Self::DateTime => Some(TypeInfo::DateTime),
            Self::TimeSpan => Some(TypeInfo::TimeSpan),
            Self::Reference => None,
        }
    }

    /// Whether only `=` and `<>` apply
    pub fn equality_only(self) -> bool {
        matches!(self, Self::Boolean | Self::Reference)
    }
}

impl fmt::Display for TemporalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AddSpan => "ADD_SPAN",
            Self::SubtractSpan => "SUB_SPAN",
            Self::Difference => "DATE_DIFF",
            Self::AddSpans => "ADD_SPANS",
            Self::SubtractSpans => "SUB_SPANS",
        };
        f.write_str(name)
    }
}

impl fmt::Display for CompareKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(kind) => write!(f, "{kind}"),
            Self::Boolean => f.write_str("Boolean"),
            Self::String(StringComparison::Ordinal) => f.write_str("String"),
            Self::String(StringComparison::OrdinalIgnoreCase) => f.write_str("String/ci"),
            Self::DateTime => f.write_str("DateTime"),
            Self::TimeSpan => f.write_str("TimeSpan"),
            Self::Reference => f.write_str("Reference"),
        }
    }
}

impl Element {
    /// Create an element
    pub fn new(kind: ElementKind, result_type: TypeInfo, position: usize) -> Self {
        Self {
            kind,
            result_type,
            position,
        }
    }

    /// Constant element
    pub fn literal(value: Value, position: usize) -> Self {
        let result_type = value.type_info();
        Self::new(ElementKind::Literal(value), result_type, position)
    }

    /// Constant value, if this element is a literal
    pub fn as_literal(&self) -> Option<&Value> {
        match &self.kind {
            ElementKind::Literal(value) => Some(value),
            _ => None,
        }
    }

    /// Check if the element is a constant
    pub fn is_literal(&self) -> bool {
        matches!(self.kind, ElementKind::Literal(_))
    }
}
