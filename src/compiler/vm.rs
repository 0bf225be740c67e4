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

//! Stack machine executing compiled expressions

use super::bytecode::{Bytecode, Instruction};
use super::operations;
use crate::evaluator::error::{EvaluationError, EvaluationResult};
use crate::model::{ArrayValue, TypeCoercion, Value};

/// Supplies variable values and other expressions' results during execution
pub trait ValueSource {
    /// Current value of a variable by key
    fn variable(&self, key: &str) -> EvaluationResult<Value>;

    /// Current result of another expression by key
    fn result(&self, key: &str) -> EvaluationResult<Value>;
}

/// Source without variables or expressions
#[derive(Debug, Clone, Copy, Default)]
pub struct NoValues;

impl ValueSource for NoValues {
    fn variable(&self, key: &str) -> EvaluationResult<Value> {
        Err(EvaluationError::VariableNotFound {
            name: key.to_string(),
        })
    }

    fn result(&self, key: &str) -> EvaluationResult<Value> {
        Err(EvaluationError::ResultNotFound {
            name: key.to_string(),
        })
    }
}

/// Executes one program against an owner and a value source
pub struct VirtualMachine<'a> {
    program: &'a Bytecode,
    owner: Option<&'a Value>,
    source: &'a dyn ValueSource,
    stack: Vec<Value>,
}

impl<'a> VirtualMachine<'a> {
    /// Create a machine for a program
    pub fn new(program: &'a Bytecode, owner: Option<&'a Value>, source: &'a dyn ValueSource) -> Self {
        Self {
            program,
            owner,
            source,
            stack: Vec::with_capacity(program.max_stack_depth),
        }
    }

    fn pop(&mut self) -> EvaluationResult<Value> {
        self.stack
            .pop()
            .ok_or_else(|| EvaluationError::vm("stack underflow"))
    }

    fn pop_bool(&mut self) -> EvaluationResult<bool> {
        match self.pop()? {
            Value::Boolean(b) => Ok(b),
            other => Err(EvaluationError::invalid_cast(other.type_info(), "Boolean")),
        }
    }

    fn pop_many(&mut self, count: usize) -> EvaluationResult<Vec<Value>> {
        let start = self
            .stack
            .len()
            .checked_sub(count)
            .ok_or_else(|| EvaluationError::vm("stack underflow"))?;
        Ok(self.stack.split_off(start))
    }

    fn binary(
        &mut self,
        f: impl FnOnce(&Value, &Value) -> EvaluationResult<Value>,
    ) -> EvaluationResult<()> {
        let right = self.pop()?;
        let left = self.pop()?;
        self.stack.push(f(&left, &right)?);
        Ok(())
    }

    fn unary(&mut self, f: impl FnOnce(&Value) -> EvaluationResult<Value>) -> EvaluationResult<()> {
        let value = self.pop()?;
        self.stack.push(f(&value)?);
        Ok(())
    }

    fn pool<T>(items: &'a [T], index: u16, pool: &str) -> EvaluationResult<&'a T> {
        items
            .get(usize::from(index))
            .ok_or_else(|| EvaluationError::vm(format!("{pool} index {index} out of range")))
    }

    fn jump_target(pc: usize, offset: i32) -> EvaluationResult<usize> {
        let target = pc as i64 + i64::from(offset);
        usize::try_from(target).map_err(|_| EvaluationError::vm(format!("jump to {target}")))
    }

    /// Run the program to completion
    pub fn run(mut self) -> EvaluationResult<Value> {
        let program = self.program;
        let mut pc = 0usize;

        while let Some(&instruction) = program.instructions.get(pc) {
            let current = pc;
            pc += 1;

            match instruction {
                Instruction::PushConstant(index) => {
                    let value = Self::pool(&program.constants, index, "constant")?.clone();
                    self.stack.push(value);
                }
                Instruction::LoadVariable(index) => {
                    let key = Self::pool(&program.strings, index, "string")?;
                    self.stack.push(self.source.variable(key)?);
                }
                Instruction::LoadResult(index) => {
                    let key = Self::pool(&program.strings, index, "string")?;
                    self.stack.push(self.source.result(key)?);
                }
                Instruction::LoadOwner => {
                    let owner = self
                        .owner
                        .cloned()
                        .ok_or_else(|| EvaluationError::null_reference("owner access"))?;
                    self.stack.push(owner);
                }
                Instruction::Duplicate => {
                    let top = self
                        .stack
                        .last()
                        .cloned()
                        .ok_or_else(|| EvaluationError::vm("stack underflow"))?;
                    self.stack.push(top);
                }
                Instruction::Pop => {
                    self.pop()?;
                }
                Instruction::Convert { to, checked } => {
                    self.unary(|v| TypeCoercion::convert(v, to, checked))?;
                }
                Instruction::Unbox(index) => {
                    let ty = Self::pool(&program.types, index, "type")?;
                    self.unary(|v| TypeCoercion::convert_to_type(v, ty))?;
                }
                Instruction::Arithmetic { op, kind, checked } => {
                    self.binary(|l, r| operations::arithmetic(op, kind, l, r, checked))?;
                }
                Instruction::Concat => self.binary(|l, r| Ok(operations::concat(l, r)))?,
                Instruction::Temporal(op) => self.binary(|l, r| operations::temporal(op, l, r))?,
                Instruction::Shift { op, kind } => {
                    self.binary(|l, r| operations::shift(op, kind, l, r))?;
                }
                Instruction::Bitwise { op, kind } => {
                    self.binary(|l, r| operations::bitwise(op, kind, l, r))?;
                }
                Instruction::LogicalXor => {
                    let right = self.pop_bool()?;
                    let left = self.pop_bool()?;
                    self.stack.push(Value::Boolean(left ^ right));
                }
                Instruction::LogicalNot => {
                    let value = self.pop_bool()?;
                    self.stack.push(Value::Boolean(!value));
                }
                Instruction::BitwiseNot(kind) => self.unary(|v| operations::bitwise_not(kind, v))?,
                Instruction::Negate { kind, checked } => {
                    self.unary(|v| operations::negate(kind, v, checked))?;
                }
                Instruction::NegateSpan => self.unary(operations::negate_span)?,
                Instruction::Compare { op, kind } => {
                    self.binary(|l, r| operations::compare(op, kind, l, r).map(Value::Boolean))?;
                }
                Instruction::MakeArray { element, count } => {
                    let element_type = Self::pool(&program.types, element, "type")?.clone();
                    let items = self.pop_many(usize::from(count))?;
                    self.stack
                        .push(Value::Array(ArrayValue::new(element_type, items)));
                }
                Instruction::ArrayIndex => {
                    let index = self.pop()?;
                    let array = self.pop()?;
                    self.stack.push(index_array(&array, &index)?);
                }
                Instruction::Invoke {
                    member,
                    argc,
                    instance,
                } => {
                    let member = Self::pool(&program.members, member, "member")?;
                    let args = self.pop_many(usize::from(argc))?;
                    let receiver = if instance {
                        let receiver = self.pop()?;
                        if receiver.is_null() {
                            return Err(EvaluationError::null_reference(format!(
                                "call of '{}'",
                                member.name()
                            )));
                        }
                        Some(receiver)
                    } else {
                        None
                    };
                    self.stack.push(member.invoke(receiver.as_ref(), &args)?);
                }
                Instruction::Jump(offset) => pc = Self::jump_target(current, offset)?,
                Instruction::JumpIfFalse(offset) => {
                    if !self.pop_bool()? {
                        pc = Self::jump_target(current, offset)?;
                    }
                }
                Instruction::JumpIfTrue(offset) => {
                    if self.pop_bool()? {
                        pc = Self::jump_target(current, offset)?;
                    }
                }
                Instruction::Return => break,
            }
        }

        let result = self.pop()?;
        if !self.stack.is_empty() {
            return Err(EvaluationError::vm(format!(
                "{} values left on the stack",
                self.stack.len()
            )));
        }
        Ok(result)
    }
}

fn index_array(array: &Value, index: &Value) -> EvaluationResult<Value> {
    let items = match array {
        Value::Array(array) => array.items(),
        Value::Null => return Err(EvaluationError::null_reference("array index")),
        other => return Err(EvaluationError::invalid_cast(other.type_info(), "Array")),
    };
    let Value::Int32(index) = index else {
        return Err(EvaluationError::invalid_cast(index.type_info(), "Int32"));
    };
    usize::try_from(*index)
        .ok()
        .and_then(|i| items.get(i))
        .cloned()
        .ok_or(EvaluationError::IndexOutOfRange {
            index: i64::from(*index),
            length: items.len(),
        })
}

/// Execute a program
pub fn execute(
    program: &Bytecode,
    owner: Option<&Value>,
    source: &dyn ValueSource,
) -> EvaluationResult<Value> {
    VirtualMachine::new(program, owner, source).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::bytecode::BytecodeBuilder;
    use crate::model::{NumericKind, TypeInfo};
    use crate::ast::BinaryOperator;
    use std::collections::HashMap;

    struct Values(HashMap<&'static str, Value>);

    impl ValueSource for Values {
        fn variable(&self, key: &str) -> EvaluationResult<Value> {
            self.0
                .get(key)
                .cloned()
                .ok_or_else(|| EvaluationError::VariableNotFound { name: key.into() })
        }

        fn result(&self, key: &str) -> EvaluationResult<Value> {
            self.variable(key)
        }
    }

    #[test]
    fn test_arithmetic_on_variables() {
        let mut builder = BytecodeBuilder::new();
        builder.load_variable("a").unwrap();
        builder.push_constant(Value::Int32(5)).unwrap();
        builder.emit(Instruction::Arithmetic {
            op: BinaryOperator::Add,
            kind: NumericKind::Int32,
            checked: true,
        });
        builder.emit(Instruction::Return);
        let program = builder.finalize(None).unwrap();

        let values = Values(HashMap::from([("a", Value::Int32(10))]));
        assert_eq!(execute(&program, None, &values).unwrap(), Value::Int32(15));

        let values = Values(HashMap::from([("a", Value::Int32(i32::MAX))]));
        assert!(matches!(
            execute(&program, None, &values),
            Err(EvaluationError::Overflow { .. })
        ));
    }

    #[test]
    fn test_conditional_jump_skips_branch() {
        let mut builder = BytecodeBuilder::new();
        let else_label = builder.new_label();
        let end = builder.new_label();
        builder.push_constant(Value::Boolean(false)).unwrap();
        builder.jump_if_false_to(else_label);
        builder.load_variable("missing").unwrap();
        builder.jump_to(end).mark(else_label);
        builder.push_constant(Value::Int32(2)).unwrap();
        builder.mark(end).emit(Instruction::Return);
        let program = builder.finalize(None).unwrap();

        assert_eq!(execute(&program, None, &NoValues).unwrap(), Value::Int32(2));
    }

    #[test]
    fn test_array_index_bounds() {
        let array = Value::array(TypeInfo::Int32, vec![Value::Int32(7)]);
        assert_eq!(index_array(&array, &Value::Int32(0)).unwrap(), Value::Int32(7));
        assert_eq!(
            index_array(&array, &Value::Int32(1)),
            Err(EvaluationError::IndexOutOfRange {
                index: 1,
                length: 1
            })
        );
        assert!(matches!(
            index_array(&Value::Null, &Value::Int32(0)),
            Err(EvaluationError::NullReference { .. })
        ));
    }

    #[test]
    fn test_missing_owner_is_null_reference() {
        let mut builder = BytecodeBuilder::new();
        builder.emit(Instruction::LoadOwner).emit(Instruction::Return);
        let program = builder.finalize(None).unwrap();
        assert!(matches!(
            execute(&program, None, &NoValues),
            Err(EvaluationError::NullReference { .. })
        ));
    }

    #[test]
    fn test_unbalanced_stack_is_reported() {
        let mut builder = BytecodeBuilder::new();
        builder.push_constant(Value::Int32(1)).unwrap();
        builder.push_constant(Value::Int32(2)).unwrap();
        builder.emit(Instruction::Return);
        let program = builder.finalize(None).unwrap();
        assert!(matches!(
            execute(&program, None, &NoValues),
            Err(EvaluationError::Vm { .. })
        ));
    }
}
