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

//! Lowering of typed element trees into bytecode

use super::bytecode::{Bytecode, BytecodeBuilder, Instruction};
use crate::analyzer::{CompareKind, Element, ElementKind};
use crate::ast::BinaryOperator;
use crate::diagnostics::{CompileError, CompileResult};
use crate::model::{TypeInfo, Value};

/// Compiles element trees into bytecode programs
pub struct ExpressionCompiler {
    builder: BytecodeBuilder,
    checked: bool,
}

impl ExpressionCompiler {
    /// Compile a resolved element tree
    ///
    /// `checked` selects overflow-checked arithmetic for operators.
    pub fn compile(root: &Element, checked: bool, source: Option<&str>) -> CompileResult<Bytecode> {
        let mut compiler = Self {
            builder: BytecodeBuilder::new(),
            checked,
        };
        compiler.emit(root)?;
        compiler.builder.emit(Instruction::Return);
        let bytecode = compiler.builder.finalize(source)?;
        log::trace!(
            "Compiled {} instructions, max stack depth {}",
            bytecode.instructions.len(),
            bytecode.max_stack_depth
        );
        Ok(bytecode)
    }

    fn emit(&mut self, element: &Element) -> CompileResult<()> {
        match &element.kind {
            ElementKind::Literal(value) => {
                self.builder.push_constant(value.clone())?;
            }
            ElementKind::Variable { key } => {
                self.builder.load_variable(key)?;
            }
            ElementKind::ExpressionRef { key } => {
                self.builder.load_result(key)?;
            }
            ElementKind::Owner => {
                self.builder.emit(Instruction::LoadOwner);
            }
            ElementKind::Arithmetic {
                op,
                kind,
                left,
                right,
            } => {
                let operand_type = kind.type_info();
                self.emit_converted(left, &operand_type)?;
                self.emit_converted(right, &operand_type)?;
                self.builder.emit(Instruction::Arithmetic {
                    op: *op,
                    kind: *kind,
                    checked: self.checked,
                });
            }
            ElementKind::Concat { left, right } => {
                self.emit(left)?;
                self.emit(right)?;
                self.builder.emit(Instruction::Concat);
            }
            ElementKind::Temporal { op, left, right } => {
                self.emit(left)?;
                self.emit(right)?;
                self.builder.emit(Instruction::Temporal(*op));
            }
            ElementKind::Shift {
                op,
                kind,
                left,
                right,
            } => {
                self.emit_converted(left, &kind.type_info())?;
                self.emit_converted(right, &TypeInfo::Int32)?;
                self.builder.emit(Instruction::Shift { op: *op, kind: *kind });
            }
            ElementKind::Compare {
                op,
                kind,
                left,
                right,
            } => {
                self.emit_compare_operand(left, *kind)?;
                self.emit_compare_operand(right, *kind)?;
                self.builder.emit(Instruction::Compare { op: *op, kind: *kind });
            }
            ElementKind::Logical { op, operands } => self.emit_logical(*op, operands)?,
            ElementKind::LogicalXor { left, right } => {
                self.emit(left)?;
                self.emit(right)?;
                self.builder.emit(Instruction::LogicalXor);
            }
            ElementKind::Bitwise {
                op,
                kind,
                left,
                right,
            } => {
                let operand_type = kind.type_info();
                self.emit_converted(left, &operand_type)?;
                self.emit_converted(right, &operand_type)?;
                self.builder.emit(Instruction::Bitwise { op: *op, kind: *kind });
            }
            ElementKind::Not(operand) => {
                self.emit(operand)?;
                self.builder.emit(Instruction::LogicalNot);
            }
            ElementKind::BitwiseNot { kind, operand } => {
                self.emit_converted(operand, &kind.type_info())?;
                self.builder.emit(Instruction::BitwiseNot(*kind));
            }
            ElementKind::Negate { kind, operand } => {
                self.emit_converted(operand, &kind.type_info())?;
                self.builder.emit(Instruction::Negate {
                    kind: *kind,
                    checked: self.checked,
                });
            }
            ElementKind::NegateSpan(operand) => {
                self.emit(operand)?;
                self.builder.emit(Instruction::NegateSpan);
            }
            ElementKind::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                let else_label = self.builder.new_label();
                let end = self.builder.new_label();
                self.emit(condition)?;
                self.builder.jump_if_false_to(else_label);
                self.emit_converted(then_branch, &element.result_type)?;
                self.builder.jump_to(end).mark(else_label);
                self.emit_converted(else_branch, &element.result_type)?;
                self.builder.mark(end);
            }
            ElementKind::In { operand, items } => self.emit_in(operand, items)?,
            ElementKind::Cast { operand, checked } => {
                self.emit(operand)?;
                self.emit_cast(&operand.result_type, &element.result_type, *checked)?;
            }
            ElementKind::Invoke {
                member,
                receiver,
                args,
                binding,
            } => {
                if let Some(receiver) = receiver {
                    self.emit(receiver)?;
                }
                let argc = match &binding.param_array {
                    None => {
                        for (arg, ty) in args.iter().zip(&binding.argument_types) {
                            self.emit_converted(arg, ty)?;
                        }
                        args.len()
                    }
                    Some(param_array) => {
                        let (fixed, collected) = args.split_at(param_array.start.min(args.len()));
                        for (arg, ty) in fixed.iter().zip(&binding.argument_types) {
                            self.emit_converted(arg, ty)?;
                        }
                        for arg in collected {
                            self.emit_converted(arg, &param_array.element_type)?;
                        }
                        let element = self.builder.add_type(&param_array.element_type)?;
                        let count = u16::try_from(collected.len())
                            .map_err(|_| CompileError::syntax("Too many arguments"))?;
                        self.builder.emit(Instruction::MakeArray { element, count });
                        fixed.len() + 1
                    }
                };
                let member_index = self.builder.add_member(member)?;
                let argc = u8::try_from(argc).map_err(|_| {
                    CompileError::syntax(format!("Too many arguments for '{}'", member.name()))
                })?;
                self.builder.emit(Instruction::Invoke {
                    member: member_index,
                    argc,
                    instance: receiver.is_some(),
                });
            }
            ElementKind::ArrayIndex { array, index } => {
                self.emit(array)?;
                self.emit_converted(index, &TypeInfo::Int32)?;
                self.builder.emit(Instruction::ArrayIndex);
            }
        }
        Ok(())
    }

    fn emit_converted(&mut self, element: &Element, target: &TypeInfo) -> CompileResult<()> {
        self.emit(element)?;
        self.emit_cast(&element.result_type, target, false)
    }

    fn emit_compare_operand(&mut self, element: &Element, kind: CompareKind) -> CompileResult<()> {
        match kind.operand_type() {
            Some(target) => self.emit_converted(element, &target),
            None => self.emit(element),
        }
    }

    /// Emit the conversion of the top value from `from` to `to`
    fn emit_cast(&mut self, from: &TypeInfo, to: &TypeInfo, checked: bool) -> CompileResult<()> {
        if from == to || matches!(to, TypeInfo::Object) {
            return Ok(());
        }
        if matches!(from, TypeInfo::Null) && to.is_reference() {
            return Ok(());
        }
        let scalar_source = from.is_numeric() || matches!(from, TypeInfo::Char);
        match to.scalar_kind() {
            Some(kind) if scalar_source => {
                self.builder.emit(Instruction::Convert { to: kind, checked });
            }
            _ => {
                let index = self.builder.add_type(to)?;
                self.builder.emit(Instruction::Unbox(index));
            }
        }
        Ok(())
    }

    /// Short-circuit chain: the deciding operand's value is left on the stack
    fn emit_logical(&mut self, op: BinaryOperator, operands: &[Element]) -> CompileResult<()> {
        let end = self.builder.new_label();
        let last = operands.len().saturating_sub(1);
        for (i, operand) in operands.iter().enumerate() {
            self.emit(operand)?;
            if i < last {
                self.builder.emit(Instruction::Duplicate);
                if op == BinaryOperator::And {
                    self.builder.jump_if_false_to(end);
                } else {
                    self.builder.jump_if_true_to(end);
                }
                self.builder.emit(Instruction::Pop);
            }
        }
        self.builder.mark(end);
        Ok(())
    }

    /// Membership test; stops at the first matching item
    fn emit_in(&mut self, operand: &Element, items: &[(Element, CompareKind)]) -> CompileResult<()> {
        let found = self.builder.new_label();
        let end = self.builder.new_label();
        self.emit(operand)?;
        for (item, kind) in items {
            self.builder.emit(Instruction::Duplicate);
            if let Some(target) = kind.operand_type() {
                self.emit_cast(&operand.result_type, &target, false)?;
            }
            self.emit_compare_operand(item, *kind)?;
            self.builder.emit(Instruction::Compare {
                op: BinaryOperator::Equal,
                kind: *kind,
            });
            self.builder.jump_if_true_to(found);
        }
        self.builder.emit(Instruction::Pop);
        self.builder.push_constant(Value::Boolean(false))?;
        self.builder.jump_to(end).mark(found);
        self.builder.emit(Instruction::Pop);
        self.builder.push_constant(Value::Boolean(true))?;
        self.builder.mark(end);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{EmptyCatalog, ExpressionAnalyzer, SymbolResolver};
    use crate::evaluator::options::ExpressionOptions;
    use crate::parser::parse;
    use crate::registry::ImportRegistry;

    fn compile(text: &str) -> Bytecode {
        let options = ExpressionOptions::default();
        let imports = ImportRegistry::new(false);
        let resolver = SymbolResolver::new(&options, &imports, None, &EmptyCatalog);
        let node = parse(text).unwrap();
        let analysis = ExpressionAnalyzer::new(resolver).analyze(&node, None).unwrap();
        ExpressionCompiler::compile(&analysis.root, false, Some(text)).unwrap()
    }

    #[test]
    fn test_folded_expression_is_a_single_constant() {
        let bytecode = compile("1 + 2");
        assert_eq!(
            bytecode.instructions,
            vec![Instruction::PushConstant(0), Instruction::Return]
        );
        assert_eq!(bytecode.constants, vec![Value::Int32(3)]);
    }

    #[test]
    fn test_logical_chain_uses_conditional_jumps() {
        let bytecode = compile("true AND false AND true");
        assert_eq!(
            bytecode.instructions.iter().filter(|i| matches!(i, Instruction::JumpIfFalse(_))).count(),
            2
        );
        assert!(!bytecode.instructions.iter().any(|i| matches!(i, Instruction::LogicalXor)));
    }

    #[test]
    fn test_in_list_shape() {
        let bytecode = compile("2 IN (1; 2; 3)");
        let jumps = bytecode
            .instructions
            .iter()
            .filter(|i| matches!(i, Instruction::JumpIfTrue(_)))
            .count();
        assert_eq!(jumps, 3);
        assert_eq!(bytecode.instructions.last(), Some(&Instruction::Return));
    }
}
