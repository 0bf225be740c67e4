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

//! Operator typing and overload selection
//!
//! Each operator decides from its operand types how it executes and what it
//! produces. Conversions of the operands are not applied here; the compiler
//! inserts them when emitting.

use super::element::{CompareKind, TemporalOp};
use crate::ast::{BinaryOperator, UnaryOperator};
use crate::diagnostics::{CompileError, CompileResult};
use crate::evaluator::options::ExpressionOptions;
use crate::model::{NumericKind, TypeCoercion, TypeInfo};
use crate::registry::{ArgumentBinding, HostMember};
use std::sync::Arc;

/// How a binary operator executes for given operand types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryTyping {
    /// Numeric arithmetic in a common type
    Arithmetic(NumericKind),
    /// String concatenation
    Concat,
    /// Date and time arithmetic
    Temporal(TemporalOp),
    /// Shift of a promoted integral value
    Shift(NumericKind),
    /// Comparison
    Compare(CompareKind),
    /// Short-circuit boolean AND/OR
    Logical,
    /// Boolean XOR
    LogicalXor,
    /// Integral AND/OR/XOR
    Bitwise(NumericKind),
}

impl BinaryTyping {
    /// Static result type of the operation
    pub fn result_type(self) -> TypeInfo {
        match self {
            Self::Arithmetic(kind) | Self::Shift(kind) | Self::Bitwise(kind) => kind.type_info(),
            Self::Concat => TypeInfo::String,
            Self::Temporal(TemporalOp::AddSpan | TemporalOp::SubtractSpan) => TypeInfo::DateTime,
            Self::Temporal(_) => TypeInfo::TimeSpan,
            Self::Compare(_) | Self::Logical | Self::LogicalXor => TypeInfo::Boolean,
        }
    }
}

/// How a unary operator executes for a given operand type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryTyping {
    /// Numeric negation in the promoted type
    Negate(NumericKind),
    /// Time-span negation
    NegateSpan,
    /// Unary plus: promotion only
    Promote(NumericKind),
    /// Unary plus on a time span
    Identity,
    /// Boolean NOT
    Not,
    /// Integral complement
    BitwiseNot(NumericKind),
}

/// Operator typing rules
pub struct TypeAnalyzer;

fn operator_mismatch(op: &str, left: &TypeInfo, right: &TypeInfo) -> CompileError {
    CompileError::type_mismatch(format!(
        "Operator '{op}' cannot be applied to operands of type {left} and {right}"
    ))
}

fn is_numeric_or_char(ty: &TypeInfo) -> bool {
    ty.is_numeric() || matches!(ty, TypeInfo::Char)
}

impl TypeAnalyzer {
    /// Decide how `left op right` executes
    pub fn binary(
        op: BinaryOperator,
        left: &TypeInfo,
        right: &TypeInfo,
        options: &ExpressionOptions,
    ) -> CompileResult<BinaryTyping> {
        let mismatch = || operator_mismatch(op.symbol(), left, right);
        if matches!(left, TypeInfo::Void) || matches!(right, TypeInfo::Void) {
            return Err(mismatch());
        }

        match op {
            BinaryOperator::Add => {
                if matches!(left, TypeInfo::String) || matches!(right, TypeInfo::String) {
                    return Ok(BinaryTyping::Concat);
                }
                match (left, right) {
                    (TypeInfo::DateTime, TypeInfo::TimeSpan) => {
                        Ok(BinaryTyping::Temporal(TemporalOp::AddSpan))
                    }
                    (TypeInfo::TimeSpan, TypeInfo::TimeSpan) => {
                        Ok(BinaryTyping::Temporal(TemporalOp::AddSpans))
                    }
                    _ => Self::numeric(left, right)
                        .map(BinaryTyping::Arithmetic)
                        .ok_or_else(mismatch),
                }
            }
            BinaryOperator::Subtract => match (left, right) {
                (TypeInfo::DateTime, TypeInfo::TimeSpan) => {
                    Ok(BinaryTyping::Temporal(TemporalOp::SubtractSpan))
                }
                (TypeInfo::DateTime, TypeInfo::DateTime) => {
                    Ok(BinaryTyping::Temporal(TemporalOp::Difference))
                }
                (TypeInfo::TimeSpan, TypeInfo::TimeSpan) => {
                    Ok(BinaryTyping::Temporal(TemporalOp::SubtractSpans))
                }
                _ => Self::numeric(left, right)
                    .map(BinaryTyping::Arithmetic)
                    .ok_or_else(mismatch),
            },
            BinaryOperator::Multiply | BinaryOperator::Divide | BinaryOperator::Modulo => {
                Self::numeric(left, right)
                    .map(BinaryTyping::Arithmetic)
                    .ok_or_else(mismatch)
            }
            BinaryOperator::Power => {
                // Decimal stays decimal, everything else is computed in double
                match Self::numeric(left, right) {
                    Some(NumericKind::Decimal) => {
                        Ok(BinaryTyping::Arithmetic(NumericKind::Decimal))
                    }
                    Some(_) => Ok(BinaryTyping::Arithmetic(NumericKind::Double)),
                    None => Err(mismatch()),
                }
            }
            BinaryOperator::ShiftLeft | BinaryOperator::ShiftRight => {
                let kind = TypeCoercion::unary_numeric_promotion(left)
                    .filter(|k| k.is_integral())
                    .ok_or_else(mismatch)?;
                if !TypeCoercion::can_convert_implicitly(right, &TypeInfo::Int32) {
                    return Err(mismatch());
                }
                Ok(BinaryTyping::Shift(kind))
            }
            BinaryOperator::And | BinaryOperator::Or | BinaryOperator::Xor => {
                if matches!((left, right), (TypeInfo::Boolean, TypeInfo::Boolean)) {
                    return Ok(if op == BinaryOperator::Xor {
                        BinaryTyping::LogicalXor
                    } else {
                        BinaryTyping::Logical
                    });
                }
                if left.is_integral() && right.is_integral() {
                    if let Some(kind) = Self::numeric(left, right).filter(|k| k.is_integral()) {
                        return Ok(BinaryTyping::Bitwise(kind));
                    }
                }
                Err(mismatch())
            }
            BinaryOperator::Equal
            | BinaryOperator::NotEqual
            | BinaryOperator::LessThan
            | BinaryOperator::LessThanOrEqual
            | BinaryOperator::GreaterThan
            | BinaryOperator::GreaterThanOrEqual => {
                Self::compare(op, left, right, options).map(BinaryTyping::Compare)
            }
        }
    }

    /// Common numeric type of two numeric or char operands
    fn numeric(left: &TypeInfo, right: &TypeInfo) -> Option<NumericKind> {
        if is_numeric_or_char(left) && is_numeric_or_char(right) {
            TypeCoercion::binary_numeric_promotion(left, right)
        } else {
            None
        }
    }

    /// Decide how two operands are compared by `op`
    pub fn compare(
        op: BinaryOperator,
        left: &TypeInfo,
        right: &TypeInfo,
        options: &ExpressionOptions,
    ) -> CompileResult<CompareKind> {
        let mismatch = || operator_mismatch(op.symbol(), left, right);
        let kind = match (left, right) {
            (l, r) if is_numeric_or_char(l) && is_numeric_or_char(r) => {
                CompareKind::Numeric(Self::numeric(l, r).ok_or_else(mismatch)?)
            }
            (TypeInfo::Boolean, TypeInfo::Boolean) => CompareKind::Boolean,
            (TypeInfo::String, TypeInfo::String)
            | (TypeInfo::String, TypeInfo::Null)
            | (TypeInfo::Null, TypeInfo::String) => CompareKind::String(options.string_comparison),
            (TypeInfo::DateTime, TypeInfo::DateTime) => CompareKind::DateTime,
            (TypeInfo::TimeSpan, TypeInfo::TimeSpan) => CompareKind::TimeSpan,
            (l, r) if l.is_reference() && r.is_reference() => CompareKind::Reference,
            (TypeInfo::Object, _) | (_, TypeInfo::Object) => CompareKind::Reference,
            _ => return Err(mismatch()),
        };
        if kind.equality_only() && !op.is_equality() {
            return Err(mismatch());
        }
        Ok(kind)
    }

    /// Decide how `op operand` executes
    pub fn unary(op: UnaryOperator, operand: &TypeInfo) -> CompileResult<UnaryTyping> {
        let mismatch = || {
            CompileError::type_mismatch(format!(
                "Operator '{}' cannot be applied to an operand of type {operand}",
                op.symbol()
            ))
        };
        match op {
            UnaryOperator::Negate => match operand {
                TypeInfo::TimeSpan => Ok(UnaryTyping::NegateSpan),
                // Negating an unsigned 32-bit value needs the signed 64-bit range
                TypeInfo::UInt32 => Ok(UnaryTyping::Negate(NumericKind::Int64)),
                TypeInfo::UInt64 => Err(mismatch()),
                other => TypeCoercion::unary_numeric_promotion(other)
                    .map(UnaryTyping::Negate)
                    .ok_or_else(mismatch),
            },
            UnaryOperator::Plus => match operand {
                TypeInfo::TimeSpan => Ok(UnaryTyping::Identity),
                other => TypeCoercion::unary_numeric_promotion(other)
                    .map(UnaryTyping::Promote)
                    .ok_or_else(mismatch),
            },
            UnaryOperator::Not => match operand {
                TypeInfo::Boolean => Ok(UnaryTyping::Not),
                other if other.is_integral() => TypeCoercion::unary_numeric_promotion(other)
                    .map(UnaryTyping::BitwiseNot)
                    .ok_or_else(mismatch),
                _ => Err(mismatch()),
            },
        }
    }

    /// Type both branches of a conditional can take
    pub fn common_type(a: &TypeInfo, b: &TypeInfo) -> CompileResult<TypeInfo> {
        if a == b {
            return Ok(a.clone());
        }
        match (a, b) {
            (TypeInfo::Null, other) | (other, TypeInfo::Null) if other.is_reference() => {
                return Ok(other.clone());
            }
            _ => {}
        }
        if TypeCoercion::can_convert_implicitly(a, b) && !matches!(b, TypeInfo::Object) {
            return Ok(b.clone());
        }
        if TypeCoercion::can_convert_implicitly(b, a) && !matches!(a, TypeInfo::Object) {
            return Ok(a.clone());
        }
        Err(CompileError::type_mismatch(format!(
            "Conditional branches of type {a} and {b} have no common type"
        )))
    }

    /// Validate an explicit conversion
    pub fn explicit_cast(from: &TypeInfo, to: &TypeInfo) -> CompileResult<()> {
        if TypeCoercion::can_convert_explicitly(from, to) {
            Ok(())
        } else {
            Err(CompileError::invalid_cast(from, to))
        }
    }

    /// Pick the best accessible overload for the argument types
    ///
    /// `target` describes where the name was looked up, for messages.
    pub fn select_overload(
        name: &str,
        target: &str,
        candidates: &[Arc<HostMember>],
        args: &[TypeInfo],
        is_accessible: impl Fn(&HostMember) -> bool,
    ) -> CompileResult<(Arc<HostMember>, ArgumentBinding)> {
        let compatible: Vec<(&Arc<HostMember>, ArgumentBinding)> = candidates
            .iter()
            .filter_map(|m| m.signature().bind(args).map(|b| (m, b)))
            .collect();
        if compatible.is_empty() {
            let arg_list = args.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
            return Err(CompileError::undefined_name(format!(
                "No overload of '{name}' accepts arguments ({arg_list}) {target}"
            )));
        }

        let accessible: Vec<_> = compatible
            .into_iter()
            .filter(|(m, _)| is_accessible(m))
            .collect();
        let Some(best_cost) = accessible.iter().map(|(_, b)| b.cost).min() else {
            return Err(CompileError::access_denied(format!(
                "Member '{name}' {target} is not accessible"
            )));
        };

        let mut best = accessible.into_iter().filter(|(_, b)| b.cost == best_cost);
        let Some((member, binding)) = best.next() else {
            return Err(CompileError::undefined_name(format!("'{name}' {target}")));
        };
        if best.next().is_some() {
            return Err(CompileError::ambiguous(format!(
                "Ambiguous match for '{name}' {target}"
            )));
        }
        if !member.signature().has_return_value() {
            return Err(CompileError::no_return_value(name));
        }
        Ok((Arc::clone(member), binding))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CompileErrorReason;
    use crate::model::Value;
    use crate::registry::{FunctionSignature, ParameterInfo};
    use rstest::rstest;

    fn options() -> ExpressionOptions {
        ExpressionOptions::default()
    }

    #[rstest]
    #[case(BinaryOperator::Add, TypeInfo::Int32, TypeInfo::Int32, TypeInfo::Int32)]
    #[case(BinaryOperator::Add, TypeInfo::Int32, TypeInfo::Int64, TypeInfo::Int64)]
    #[case(BinaryOperator::Add, TypeInfo::UInt32, TypeInfo::Int32, TypeInfo::Int64)]
    #[case(BinaryOperator::Multiply, TypeInfo::Int32, TypeInfo::Double, TypeInfo::Double)]
    #[case(BinaryOperator::Add, TypeInfo::String, TypeInfo::Int32, TypeInfo::String)]
    #[case(BinaryOperator::Power, TypeInfo::Int32, TypeInfo::Int32, TypeInfo::Double)]
    #[case(BinaryOperator::Power, TypeInfo::Decimal, TypeInfo::Int32, TypeInfo::Decimal)]
    #[case(BinaryOperator::Subtract, TypeInfo::DateTime, TypeInfo::DateTime, TypeInfo::TimeSpan)]
    #[case(BinaryOperator::Add, TypeInfo::DateTime, TypeInfo::TimeSpan, TypeInfo::DateTime)]
    #[case(BinaryOperator::ShiftLeft, TypeInfo::Byte, TypeInfo::Int32, TypeInfo::Int32)]
    #[case(BinaryOperator::And, TypeInfo::Boolean, TypeInfo::Boolean, TypeInfo::Boolean)]
    #[case(BinaryOperator::And, TypeInfo::Int32, TypeInfo::Int64, TypeInfo::Int64)]
    #[case(BinaryOperator::LessThan, TypeInfo::Int32, TypeInfo::Decimal, TypeInfo::Boolean)]
    fn test_binary_result_types(
        #[case] op: BinaryOperator,
        #[case] left: TypeInfo,
        #[case] right: TypeInfo,
        #[case] expected: TypeInfo,
    ) {
        let typing = TypeAnalyzer::binary(op, &left, &right, &options()).unwrap();
        assert_eq!(typing.result_type(), expected);
    }

    #[rstest]
    #[case(BinaryOperator::Add, TypeInfo::Boolean, TypeInfo::Int32)]
    #[case(BinaryOperator::Add, TypeInfo::Decimal, TypeInfo::Double)]
    #[case(BinaryOperator::Add, TypeInfo::UInt64, TypeInfo::Int32)]
    #[case(BinaryOperator::And, TypeInfo::Boolean, TypeInfo::Int32)]
    #[case(BinaryOperator::LessThan, TypeInfo::Boolean, TypeInfo::Boolean)]
    #[case(BinaryOperator::ShiftLeft, TypeInfo::Double, TypeInfo::Int32)]
    #[case(BinaryOperator::Equal, TypeInfo::String, TypeInfo::Int32)]
    fn test_binary_mismatches(
        #[case] op: BinaryOperator,
        #[case] left: TypeInfo,
        #[case] right: TypeInfo,
    ) {
        let err = TypeAnalyzer::binary(op, &left, &right, &options()).unwrap_err();
        assert_eq!(err.reason, CompileErrorReason::TypeMismatch);
    }

    #[test]
    fn test_unary_rules() {
        assert_eq!(
            TypeAnalyzer::unary(UnaryOperator::Negate, &TypeInfo::UInt32).unwrap(),
            UnaryTyping::Negate(NumericKind::Int64)
        );
        assert_eq!(
            TypeAnalyzer::unary(UnaryOperator::Not, &TypeInfo::Byte).unwrap(),
            UnaryTyping::BitwiseNot(NumericKind::Int32)
        );
        assert!(TypeAnalyzer::unary(UnaryOperator::Negate, &TypeInfo::UInt64).is_err());
        assert!(TypeAnalyzer::unary(UnaryOperator::Not, &TypeInfo::Double).is_err());
    }

    #[test]
    fn test_common_type() {
        assert_eq!(
            TypeAnalyzer::common_type(&TypeInfo::Int32, &TypeInfo::Double).unwrap(),
            TypeInfo::Double
        );
        assert_eq!(
            TypeAnalyzer::common_type(&TypeInfo::Null, &TypeInfo::String).unwrap(),
            TypeInfo::String
        );
        assert!(TypeAnalyzer::common_type(&TypeInfo::Boolean, &TypeInfo::String).is_err());
    }

    fn method(name: &str, params: &[TypeInfo], ret: TypeInfo) -> Arc<HostMember> {
        let parameters = params
            .iter()
            .enumerate()
            .map(|(i, t)| ParameterInfo::required(format!("p{i}"), t.clone()))
            .collect();
        Arc::new(HostMember::static_method(
            name,
            FunctionSignature::new(parameters, ret),
            |_| Ok(Value::Null),
        ))
    }

    #[test]
    fn test_overload_prefers_cheapest_conversion() {
        let candidates = vec![
            method("f", &[TypeInfo::Double], TypeInfo::Double),
            method("f", &[TypeInfo::Int64], TypeInfo::Int64),
        ];
        let (member, _) =
            TypeAnalyzer::select_overload("f", "", &candidates, &[TypeInfo::Int32], |_| true)
                .unwrap();
        assert_eq!(member.return_type(), &TypeInfo::Int64);
    }

    #[test]
    fn test_overload_failures() {
        let tie = vec![
            method("f", &[TypeInfo::Int64, TypeInfo::Int32], TypeInfo::Int32),
            method("f", &[TypeInfo::Int32, TypeInfo::Int64], TypeInfo::Int32),
        ];
        let args = [TypeInfo::Int32, TypeInfo::Int32];
        let reason = |r: CompileResult<_>| r.map(|_| ()).unwrap_err().reason;

        assert_eq!(
            reason(TypeAnalyzer::select_overload("f", "", &tie, &args, |_| true)),
            CompileErrorReason::AmbiguousMatch
        );
        assert_eq!(
            reason(TypeAnalyzer::select_overload("f", "", &tie, &args, |_| false)),
            CompileErrorReason::AccessDenied
        );
        assert_eq!(
            reason(TypeAnalyzer::select_overload("f", "", &tie, &[TypeInfo::String], |_| true)),
            CompileErrorReason::UndefinedName
        );

        let void = vec![method("g", &[], TypeInfo::Void)];
        assert_eq!(
            reason(TypeAnalyzer::select_overload("g", "", &void, &[], |_| true)),
            CompileErrorReason::FunctionHasNoReturnValue
        );
    }
}
