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

//! Resolution of a syntax tree into a typed element tree
//!
//! Resolution is a single bottom-up pass. Names resolving to variables or
//! other expressions are recorded as dependencies as a side effect. Operations
//! over constant operands are folded on the way up.

use super::element::{CompareKind, Element, ElementKind};
use super::literal::{literal_value, negative_integer_value};
use super::symbol_resolver::{Dependency, DependencyKind, LookupScope, MemberLookup, SymbolResolver};
use super::type_analyzer::{BinaryTyping, TypeAnalyzer, UnaryTyping};
use crate::ast::{
    Arguments, BinaryOpData, BinaryOperator, ConditionalData, ExpressionKind, ExpressionNode,
    InData, LiteralValue, UnaryOperator,
};
use crate::compiler::operations;
use crate::diagnostics::{CompileError, CompileErrorReason, CompileResult};
use crate::evaluator::error::{EvaluationError, EvaluationResult};
use crate::evaluator::options::ExpressionOptions;
use crate::model::{NumericKind, ScalarKind, TypeCoercion, TypeInfo, Value};

/// Typed tree and the names it reads
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    /// Root element
    pub root: Element,
    /// Referenced variables and expressions, in first-reference order
    pub dependencies: Vec<Dependency>,
}

/// What a member-chain prefix denotes
enum Target<'a> {
    Value(Element),
    Scope(LookupScope<'a>),
}

/// Builds an element tree from a syntax tree
pub struct ExpressionAnalyzer<'a> {
    resolver: SymbolResolver<'a>,
    dependencies: Vec<Dependency>,
}

fn convert_operand(value: &Value, kind: NumericKind) -> EvaluationResult<Value> {
    TypeCoercion::convert(value, kind.scalar_kind(), false)
}

impl<'a> ExpressionAnalyzer<'a> {
    /// Create an analyzer over a resolver
    pub fn new(resolver: SymbolResolver<'a>) -> Self {
        Self {
            resolver,
            dependencies: Vec::new(),
        }
    }

    /// Resolve a syntax tree, optionally converting the result to `result_type`
    pub fn analyze(
        mut self,
        node: &ExpressionNode,
        result_type: Option<&TypeInfo>,
    ) -> CompileResult<AnalysisResult> {
        let mut root = self.resolve(node)?;
        if let Some(target) = result_type {
            root = Self::coerce_result(root, target)?;
        }
        Ok(AnalysisResult {
            root,
            dependencies: self.dependencies,
        })
    }

    fn options(&self) -> &'a ExpressionOptions {
        self.resolver.options()
    }

    fn coerce_result(root: Element, target: &TypeInfo) -> CompileResult<Element> {
        if &root.result_type == target {
            return Ok(root);
        }
        if !TypeCoercion::can_convert_implicitly(&root.result_type, target) {
            return Err(CompileError::type_mismatch(format!(
                "Expression of type {} cannot be converted to result type {target}",
                root.result_type
            )));
        }
        let position = root.position;
        Ok(Element::new(
            ElementKind::Cast {
                operand: Box::new(root),
                checked: false,
            },
            target.clone(),
            position,
        ))
    }

    fn record(&mut self, key: &str, kind: DependencyKind) {
        if !self.dependencies.iter().any(|d| d.key == key) {
            log::trace!("Recording dependency on {kind:?} '{key}'");
            self.dependencies.push(Dependency {
                key: key.to_string(),
                kind,
            });
        }
    }

    fn resolve(&mut self, node: &ExpressionNode) -> CompileResult<Element> {
        let position = node.position;
        let element = match &node.kind {
            ExpressionKind::Literal(literal) => {
                literal_value(literal, self.options()).map(|v| Element::literal(v, position))
            }
            ExpressionKind::Identifier(name) => self.resolve_identifier(name, position),
            ExpressionKind::Member { base, name } => {
                let target = self.resolve_target(base)?;
                self.member_access(target, name, position)
            }
            ExpressionKind::BinaryOp(data) => self.resolve_binary(data, position),
            ExpressionKind::UnaryOp { op, operand } => self.resolve_unary(*op, operand, position),
            ExpressionKind::FunctionCall(data) => {
                let args = self.resolve_args(&data.args)?;
                self.call(Target::Scope(LookupScope::Global), &data.name, args, position)
            }
            ExpressionKind::MethodCall(data) => {
                let target = self.resolve_target(&data.base)?;
                let args = self.resolve_args(&data.args)?;
                self.call(target, &data.method, args, position)
            }
            ExpressionKind::Index(data) => self.resolve_index(&data.base, &data.args, position),
            ExpressionKind::Cast {
                expression,
                type_name,
            } => self.resolve_cast(expression, type_name, position),
            ExpressionKind::In(data) => self.resolve_in(data, position),
            ExpressionKind::Conditional(data) => self.resolve_conditional(data, position),
        };
        element.map_err(|e| e.at(position))
    }

    fn resolve_args(&mut self, args: &Arguments) -> CompileResult<Vec<Element>> {
        args.iter().map(|arg| self.resolve(arg)).collect()
    }

    /// Value a bare name denotes, if any
    fn lookup_value(&mut self, name: &str, position: usize) -> CompileResult<Option<Element>> {
        if let Some(lookup) = self.resolver.global_members(name, false) {
            return self
                .invoke(&lookup, name, &LookupScope::Global, None, Vec::new(), position)
                .map(Some);
        }
        if let Some((key, ty)) = self.resolver.variable(name) {
            self.record(&key, DependencyKind::Variable);
            return Ok(Some(Element::new(ElementKind::Variable { key }, ty, position)));
        }
        if let Some((key, ty)) = self.resolver.expression(name) {
            self.record(&key, DependencyKind::Expression);
            return Ok(Some(Element::new(
                ElementKind::ExpressionRef { key },
                ty,
                position,
            )));
        }
        Ok(None)
    }

    fn resolve_identifier(&mut self, name: &str, position: usize) -> CompileResult<Element> {
        self.lookup_value(name, position)?.ok_or_else(|| {
            CompileError::undefined_name(format!(
                "Name '{name}' is not defined {}",
                LookupScope::Global.describe()
            ))
        })
    }

    /// Resolve the prefix of a member access or method call
    fn resolve_target(&mut self, node: &ExpressionNode) -> CompileResult<Target<'a>> {
        let position = node.position;
        match &node.kind {
            ExpressionKind::Identifier(name) => {
                if let Some(element) = self.lookup_value(name, position)? {
                    return Ok(Target::Value(element));
                }
                self.resolver
                    .scope_named(&LookupScope::Global, name)
                    .map(Target::Scope)
                    .ok_or_else(|| {
                        CompileError::undefined_name(format!(
                            "Name '{name}' is not defined {}",
                            LookupScope::Global.describe()
                        ))
                        .at(position)
                    })
            }
            ExpressionKind::Member { base, name } => match self.resolve_target(base)? {
                Target::Scope(scope) => {
                    if self.resolver.scoped_members(&scope, name, false).is_some() {
                        return self
                            .member_access(Target::Scope(scope), name, position)
                            .map(Target::Value)
                            .map_err(|e| e.at(position));
                    }
                    self.resolver
                        .scope_named(&scope, name)
                        .map(Target::Scope)
                        .ok_or_else(|| {
                            CompileError::undefined_name(format!(
                                "Name '{name}' is not defined {}",
                                scope.describe()
                            ))
                            .at(position)
                        })
                }
                value => self
                    .member_access(value, name, position)
                    .map(Target::Value)
                    .map_err(|e| e.at(position)),
            },
            _ => self.resolve(node).map(Target::Value),
        }
    }

    fn split_target(target: Target<'a>) -> (LookupScope<'a>, Option<Element>) {
        match target {
            Target::Value(element) => (LookupScope::Instance(element.result_type.clone()), Some(element)),
            Target::Scope(scope) => (scope, None),
        }
    }

    fn member_access(
        &mut self,
        target: Target<'a>,
        name: &str,
        position: usize,
    ) -> CompileResult<Element> {
        let (scope, receiver) = Self::split_target(target);
        match self.resolver.scoped_members(&scope, name, false) {
            Some(lookup) => self.invoke(&lookup, name, &scope, receiver, Vec::new(), position),
            None => Err(CompileError::undefined_name(format!(
                "Member '{name}' is not defined {}",
                scope.describe()
            ))),
        }
    }

    fn call(
        &mut self,
        target: Target<'a>,
        name: &str,
        args: Vec<Element>,
        position: usize,
    ) -> CompileResult<Element> {
        let (scope, receiver) = Self::split_target(target);
        match self.resolver.scoped_members(&scope, name, true) {
            Some(lookup) => self.invoke(&lookup, name, &scope, receiver, args, position),
            None => Err(CompileError::undefined_name(format!(
                "Function '{name}' is not defined {}",
                scope.describe()
            ))),
        }
    }

    /// Select an overload and build the invocation
    fn invoke(
        &mut self,
        lookup: &MemberLookup,
        name: &str,
        scope: &LookupScope<'_>,
        receiver: Option<Element>,
        args: Vec<Element>,
        position: usize,
    ) -> CompileResult<Element> {
        let arg_types: Vec<TypeInfo> = args.iter().map(|a| a.result_type.clone()).collect();
        let (member, binding) = TypeAnalyzer::select_overload(
            name,
            &scope.describe(),
            &lookup.candidates,
            &arg_types,
            |m| lookup.is_accessible(m),
        )?;

        let receiver = if member.is_static() {
            None
        } else if let Some(receiver) = receiver {
            Some(Box::new(receiver))
        } else if lookup.from_owner {
            Some(Box::new(self.owner_element(position)?))
        } else {
            return Err(CompileError::type_mismatch(format!(
                "Instance member '{name}' needs a receiver"
            )));
        };

        let result_type = member.return_type().clone();
        Ok(Element::new(
            ElementKind::Invoke {
                member,
                receiver,
                args,
                binding,
            },
            result_type,
            position,
        ))
    }

    fn owner_element(&self, position: usize) -> CompileResult<Element> {
        let owner = self
            .resolver
            .owner_type()
            .ok_or_else(|| CompileError::undefined_name("No owner object is available"))?;
        Ok(Element::new(ElementKind::Owner, owner.type_info(), position))
    }

    fn resolve_index(
        &mut self,
        base: &ExpressionNode,
        args: &Arguments,
        position: usize,
    ) -> CompileResult<Element> {
        let base = self.resolve(base)?;
        let mut args = self.resolve_args(args)?;

        if let TypeInfo::Array(element_type) = &base.result_type {
            let element_type = (**element_type).clone();
            let index = match (args.pop(), args.is_empty()) {
                (Some(index), true) => index,
                _ => {
                    return Err(CompileError::type_mismatch(
                        "Array indexer takes exactly one argument",
                    ));
                }
            };
            if !TypeCoercion::can_convert_implicitly(&index.result_type, &TypeInfo::Int32) {
                return Err(CompileError::type_mismatch(format!(
                    "Array index must be Int32, found {}",
                    index.result_type
                ))
                .at(index.position));
            }
            return Ok(Element::new(
                ElementKind::ArrayIndex {
                    array: Box::new(base),
                    index: Box::new(index),
                },
                element_type,
                position,
            ));
        }

        let scope = LookupScope::Instance(base.result_type.clone());
        let Some(lookup) = self.resolver.indexers(&base.result_type) else {
            return Err(CompileError::type_mismatch(format!(
                "Type {} has no indexer",
                base.result_type
            )));
        };
        self.invoke(&lookup, "indexer", &scope, Some(base), args, position)
            .map_err(|e| match e.reason {
                CompileErrorReason::UndefinedName => CompileError::type_mismatch(e.message),
                _ => e,
            })
    }

    fn flatten_logical(element: Element, op: BinaryOperator) -> Vec<Element> {
        match element.kind {
            ElementKind::Logical {
                op: inner,
                operands,
            } if inner == op => operands,
            kind => vec![Element { kind, ..element }],
        }
    }

    fn resolve_binary(&mut self, data: &BinaryOpData, position: usize) -> CompileResult<Element> {
        let left = self.resolve(&data.left)?;
        let right = self.resolve(&data.right)?;
        let op = data.op;
        let typing = TypeAnalyzer::binary(op, &left.result_type, &right.result_type, self.options())?;
        let result_type = typing.result_type();
        let (left, right) = (Box::new(left), Box::new(right));

        let kind = match typing {
            BinaryTyping::Arithmetic(kind) => ElementKind::Arithmetic {
                op,
                kind,
                left,
                right,
            },
            BinaryTyping::Concat => ElementKind::Concat { left, right },
            BinaryTyping::Temporal(op) => ElementKind::Temporal { op, left, right },
            BinaryTyping::Shift(kind) => ElementKind::Shift {
                op,
                kind,
                left,
                right,
            },
            BinaryTyping::Compare(kind) => ElementKind::Compare {
                op,
                kind,
                left,
                right,
            },
            BinaryTyping::Logical => {
                let mut operands = Self::flatten_logical(*left, op);
                operands.extend(Self::flatten_logical(*right, op));
                ElementKind::Logical { op, operands }
            }
            BinaryTyping::LogicalXor => ElementKind::LogicalXor { left, right },
            BinaryTyping::Bitwise(kind) => ElementKind::Bitwise {
                op,
                kind,
                left,
                right,
            },
        };
        self.fold(Element::new(kind, result_type, position))
    }

    fn resolve_unary(
        &mut self,
        op: UnaryOperator,
        operand: &ExpressionNode,
        position: usize,
    ) -> CompileResult<Element> {
        if op == UnaryOperator::Negate {
            if let ExpressionKind::Literal(LiteralValue::Integer {
                digits,
                hex,
                suffix,
            }) = &operand.kind
            {
                if let Some(value) = negative_integer_value(digits, *hex, *suffix, self.options()) {
                    return value.map(|v| Element::literal(v, position));
                }
            }
        }

        let operand = Box::new(self.resolve(operand)?);
        let element = match TypeAnalyzer::unary(op, &operand.result_type)? {
            UnaryTyping::Negate(kind) => {
                Element::new(ElementKind::Negate { kind, operand }, kind.type_info(), position)
            }
            UnaryTyping::NegateSpan => {
                Element::new(ElementKind::NegateSpan(operand), TypeInfo::TimeSpan, position)
            }
            UnaryTyping::Promote(kind) if operand.result_type == kind.type_info() => {
                return Ok(*operand);
            }
            UnaryTyping::Promote(kind) => Element::new(
                ElementKind::Cast {
                    operand,
                    checked: false,
                },
                kind.type_info(),
                position,
            ),
            UnaryTyping::Identity => return Ok(*operand),
            UnaryTyping::Not => Element::new(ElementKind::Not(operand), TypeInfo::Boolean, position),
            UnaryTyping::BitwiseNot(kind) => Element::new(
                ElementKind::BitwiseNot { kind, operand },
                kind.type_info(),
                position,
            ),
        };
        self.fold(element)
    }

    fn resolve_cast(
        &mut self,
        expression: &ExpressionNode,
        type_name: &str,
        position: usize,
    ) -> CompileResult<Element> {
        let operand = self.resolve(expression)?;
        let target = self
            .resolver
            .type_named(type_name)
            .ok_or_else(|| CompileError::undefined_name(format!("Type '{type_name}' is not defined")))?;
        if operand.result_type == target {
            return Ok(operand);
        }
        TypeAnalyzer::explicit_cast(&operand.result_type, &target)?;
        let checked = self.options().checked;
        self.fold(Element::new(
            ElementKind::Cast {
                operand: Box::new(operand),
                checked,
            },
            target,
            position,
        ))
    }

    fn resolve_conditional(
        &mut self,
        data: &ConditionalData,
        position: usize,
    ) -> CompileResult<Element> {
        let condition = self.resolve(&data.condition)?;
        if condition.result_type != TypeInfo::Boolean {
            return Err(CompileError::type_mismatch(format!(
                "If condition must be Boolean, found {}",
                condition.result_type
            ))
            .at(condition.position));
        }
        let then_branch = self.resolve(&data.then_expr)?;
        let else_branch = self.resolve(&data.else_expr)?;
        let result_type = TypeAnalyzer::common_type(&then_branch.result_type, &else_branch.result_type)?;
        Ok(Element::new(
            ElementKind::Conditional {
                condition: Box::new(condition),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            },
            result_type,
            position,
        ))
    }

    fn resolve_in(&mut self, data: &InData, position: usize) -> CompileResult<Element> {
        let operand = self.resolve(&data.operand)?;
        let mut items: Vec<(Element, CompareKind)> = Vec::with_capacity(data.items.len());
        for item in &data.items {
            let item = self.resolve(item)?;
            let kind = TypeAnalyzer::compare(
                BinaryOperator::Equal,
                &operand.result_type,
                &item.result_type,
                self.options(),
            )
            .map_err(|e| e.at(item.position))?;
            items.push((item, kind));
        }
        Ok(Element::new(
            ElementKind::In {
                operand: Box::new(operand),
                items,
            },
            TypeInfo::Boolean,
            position,
        ))
    }

    /// Evaluate an operation whose operands are all constants
    fn fold_value(kind: &ElementKind, target: &TypeInfo, checked: bool) -> Option<EvaluationResult<Value>> {
        match kind {
            ElementKind::Arithmetic {
                op,
                kind,
                left,
                right,
            } => {
                let (l, r) = (left.as_literal()?, right.as_literal()?);
                Some(convert_operand(l, *kind).and_then(|l| {
                    convert_operand(r, *kind)
                        .and_then(|r| operations::arithmetic(*op, *kind, &l, &r, checked))
                }))
            }
            ElementKind::Negate { kind, operand } => {
                let v = operand.as_literal()?;
                Some(convert_operand(v, *kind).and_then(|v| operations::negate(*kind, &v, checked)))
            }
            ElementKind::Shift {
                op,
                kind,
                left,
                right,
            } => {
                let (l, r) = (left.as_literal()?, right.as_literal()?);
                Some(convert_operand(l, *kind).and_then(|l| {
                    TypeCoercion::convert(r, ScalarKind::Int32, false)
                        .and_then(|r| operations::shift(*op, *kind, &l, &r))
                }))
            }
            ElementKind::Cast { operand, checked } => {
                let v = operand.as_literal()?;
                if !(v.type_info().is_numeric() || matches!(v, Value::Char(_))) {
                    return None;
                }
                let scalar = target.scalar_kind()?;
                Some(TypeCoercion::convert(v, scalar, *checked))
            }
            _ => None,
        }
    }

    /// Replace an operation over constants by its value
    fn fold(&self, element: Element) -> CompileResult<Element> {
        let checked = self.options().checked;
        match Self::fold_value(&element.kind, &element.result_type, checked) {
            Some(Ok(value)) if value.type_info() == element.result_type => {
                Ok(Element::literal(value, element.position))
            }
            Some(Err(EvaluationError::Overflow { operation })) => {
                Err(CompileError::constant_overflow(format!(
                    "Constant expression overflows: {operation}"
                ))
                .at(element.position))
            }
            // Other failures, such as division by zero, surface at evaluation
            _ => Ok(element),
        }
    }
}
