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

//! Expression AST node definitions

use super::operator::{BinaryOperator, UnaryOperator};
use smallvec::SmallVec;

/// Argument list (most calls take few arguments)
pub type Arguments = SmallVec<[ExpressionNode; 4]>;

/// A parsed expression node with the byte offset where it starts
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionNode {
    /// Node payload
    pub kind: ExpressionKind,
    /// Byte offset into the source text
    pub position: usize,
}

/// AST representation of expressions
///
/// Large variants are boxed to keep the node small.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionKind {
    /// Literal value
    Literal(LiteralValue),

    /// Bare identifier (member, variable or expression name)
    Identifier(String),

    /// Member access (`base.name`)
    Member {
        /// Base expression
        base: Box<ExpressionNode>,
        /// Member name
        name: String,
    },

    /// Binary operation (boxed for size optimization)
    BinaryOp(Box<BinaryOpData>),

    /// Unary operation
    UnaryOp {
        /// The operator
        op: UnaryOperator,
        /// The operand
        operand: Box<ExpressionNode>,
    },

    /// Call without a receiver (`name(args)`)
    FunctionCall(Box<FunctionCallData>),

    /// Call on a receiver (`base.name(args)`)
    MethodCall(Box<MethodCallData>),

    /// Indexer access (`base[args]`)
    Index(Box<IndexData>),

    /// Explicit conversion (`cast(value; type)`)
    Cast {
        /// Expression to convert
        expression: Box<ExpressionNode>,
        /// Target type name, possibly dotted, with `[]` for arrays
        type_name: String,
    },

    /// Membership test (`value IN (a; b; c)`)
    In(Box<InData>),

    /// Conditional (`If(cond; then; else)`)
    Conditional(Box<ConditionalData>),
}

/// Binary operation data (separate struct to optimize enum size)
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryOpData {
    /// The operator
    pub op: BinaryOperator,
    /// Left operand
    pub left: ExpressionNode,
    /// Right operand
    pub right: ExpressionNode,
}

/// Function call data (separate struct to optimize enum size)
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCallData {
    /// Function name
    pub name: String,
    /// Function arguments
    pub args: Arguments,
}

/// Method call data (separate struct to optimize enum size)
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCallData {
    /// Receiver expression
    pub base: ExpressionNode,
    /// Method name
    pub method: String,
    /// Method arguments
    pub args: Arguments,
}

/// Indexer access data
#[derive(Debug, Clone, PartialEq)]
pub struct IndexData {
    /// Indexed expression
    pub base: ExpressionNode,
    /// Index arguments
    pub args: Arguments,
}

/// Membership test data
#[derive(Debug, Clone, PartialEq)]
pub struct InData {
    /// Value searched for
    pub operand: ExpressionNode,
    /// Candidate values
    pub items: Arguments,
}

/// Conditional expression data (separate struct to optimize enum size)
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalData {
    /// Condition
    pub condition: ExpressionNode,
    /// Then branch
    pub then_expr: ExpressionNode,
    /// Else branch
    pub else_expr: ExpressionNode,
}

/// Suffix of an integer literal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntegerSuffix {
    /// No suffix
    None,
    /// `u`
    Unsigned,
    /// `l`
    Long,
    /// `ul` or `lu`
    UnsignedLong,
}

/// Suffix of a real literal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RealSuffix {
    /// `f`
    Single,
    /// `d`
    Double,
    /// `m`
    Decimal,
}

/// Literal values, kept in lexical form until resolution picks their type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LiteralValue {
    /// Boolean literal
    Boolean(bool),
    /// Integer literal
    Integer {
        /// Digits without prefix or suffix
        digits: String,
        /// Whether the literal was written in hexadecimal
        hex: bool,
        /// Type suffix
        suffix: IntegerSuffix,
    },
    /// Real literal
    Real {
        /// Digits, decimal point and exponent, without suffix
        text: String,
        /// Type suffix
        suffix: Option<RealSuffix>,
    },
    /// String literal with escapes processed
    String(String),
    /// Character literal
    Char(char),
    /// Date-time literal (text between `#` delimiters)
    DateTime(String),
    /// Time-span literal (text between `##` and `#`)
    TimeSpan(String),
    /// `null`
    Null,
}

impl ExpressionNode {
    fn new(kind: ExpressionKind, position: usize) -> Self {
        Self { kind, position }
    }

    /// Create a literal expression
    pub fn literal(value: LiteralValue, position: usize) -> Self {
        Self::new(ExpressionKind::Literal(value), position)
    }

    /// Create an identifier expression
    pub fn identifier(name: impl Into<String>, position: usize) -> Self {
        Self::new(ExpressionKind::Identifier(name.into()), position)
    }

    /// Create a member access expression
    pub fn member(base: ExpressionNode, name: impl Into<String>, position: usize) -> Self {
        Self::new(
            ExpressionKind::Member {
                base: Box::new(base),
                name: name.into(),
            },
            position,
        )
    }

    /// Create a binary operation expression
    pub fn binary_op(
        op: BinaryOperator,
        left: ExpressionNode,
        right: ExpressionNode,
        position: usize,
    ) -> Self {
        Self::new(
            ExpressionKind::BinaryOp(Box::new(BinaryOpData { op, left, right })),
            position,
        )
    }

    /// Create a unary operation expression
    pub fn unary_op(op: UnaryOperator, operand: ExpressionNode, position: usize) -> Self {
        Self::new(
            ExpressionKind::UnaryOp {
                op,
                operand: Box::new(operand),
            },
            position,
        )
    }

    /// Create a function call expression
    pub fn function_call(name: impl Into<String>, args: Arguments, position: usize) -> Self {
        Self::new(
            ExpressionKind::FunctionCall(Box::new(FunctionCallData {
                name: name.into(),
                args,
            })),
            position,
        )
    }

    /// Create a method call expression
    pub fn method_call(
        base: ExpressionNode,
        method: impl Into<String>,
        args: Arguments,
        position: usize,
    ) -> Self {
        Self::new(
            ExpressionKind::MethodCall(Box::new(MethodCallData {
                base,
                method: method.into(),
                args,
            })),
            position,
        )
    }

    /// Create an indexer expression
    pub fn index(base: ExpressionNode, args: Arguments, position: usize) -> Self {
        Self::new(
            ExpressionKind::Index(Box::new(IndexData { base, args })),
            position,
        )
    }

    /// Create a cast expression
    pub fn cast(expression: ExpressionNode, type_name: impl Into<String>, position: usize) -> Self {
        Self::new(
            ExpressionKind::Cast {
                expression: Box::new(expression),
                type_name: type_name.into(),
            },
            position,
        )
    }

    /// Create a membership test
    pub fn in_list(operand: ExpressionNode, items: Arguments, position: usize) -> Self {
        Self::new(
            ExpressionKind::In(Box::new(InData { operand, items })),
            position,
        )
    }

    /// Create a conditional expression
    pub fn conditional(
        condition: ExpressionNode,
        then_expr: ExpressionNode,
        else_expr: ExpressionNode,
        position: usize,
    ) -> Self {
        Self::new(
            ExpressionKind::Conditional(Box::new(ConditionalData {
                condition,
                then_expr,
                else_expr,
            })),
            position,
        )
    }

    /// Check if this expression is a literal
    pub fn is_literal(&self) -> bool {
        matches!(self.kind, ExpressionKind::Literal(_))
    }

    /// Get the literal value if this is a literal expression
    pub fn as_literal(&self) -> Option<&LiteralValue> {
        match &self.kind {
            ExpressionKind::Literal(value) => Some(value),
            _ => None,
        }
    }

    /// Get the identifier name if this is an identifier expression
    pub fn as_identifier(&self) -> Option<&str> {
        match &self.kind {
            ExpressionKind::Identifier(name) => Some(name),
            _ => None,
        }
    }
}
