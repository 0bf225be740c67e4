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

//! Bytecode instruction set for compiled expressions
//!
//! A compiled expression is a flat instruction sequence over an operand stack,
//! with pools for constants, variable names, host members and types.

use crate::analyzer::{CompareKind, TemporalOp};
use crate::ast::BinaryOperator;
use crate::diagnostics::{CompileError, CompileResult};
use crate::model::{NumericKind, ScalarKind, TypeInfo, Value};
use crate::registry::HostMember;
use std::fmt;
use std::sync::Arc;

/// Index into the constant pool
pub type ConstantIndex = u16;

/// Index into the string pool
pub type StringIndex = u16;

/// Index into the member pool
pub type MemberIndex = u16;

/// Index into the type pool
pub type TypeIndex = u16;

/// Bytecode instruction set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    // === Stack Operations ===
    /// Push a constant value onto the stack
    PushConstant(ConstantIndex),

    /// Push the value of a variable
    /// Operand: variable key in the string pool
    LoadVariable(StringIndex),

    /// Push the current result of another expression
    /// Operand: expression key in the string pool
    LoadResult(StringIndex),

    /// Push the owner object
    LoadOwner,

    /// Duplicate the top stack value
    Duplicate,

    /// Pop and discard the top stack value
    Pop,

    // === Conversions ===
    /// Convert the top value to a scalar kind
    Convert {
        /// Target kind
        to: ScalarKind,
        /// Report overflow instead of truncating
        checked: bool,
    },

    /// Take a dynamically typed value as a static type
    /// Operand: target type in the type pool
    Unbox(TypeIndex),

    // === Operators ===
    /// Arithmetic on two operands of the same kind
    /// Stack: [left, right] -> [result]
    Arithmetic {
        /// Operator
        op: BinaryOperator,
        /// Operand kind
        kind: NumericKind,
        /// Report overflow
        checked: bool,
    },

    /// String concatenation of two values
    Concat,

    /// Date and time arithmetic
    Temporal(TemporalOp),

    /// Shift of an integral value by an Int32 count
    Shift {
        /// Shift direction
        op: BinaryOperator,
        /// Operand kind
        kind: NumericKind,
    },

    /// Bitwise AND, OR or XOR
    Bitwise {
        /// Operator
        op: BinaryOperator,
        /// Operand kind
        kind: NumericKind,
    },

    /// Boolean exclusive or
    LogicalXor,

    /// Boolean negation
    LogicalNot,

    /// Bitwise complement
    BitwiseNot(NumericKind),

    /// Arithmetic negation
    Negate {
        /// Operand kind
        kind: NumericKind,
        /// Report overflow
        checked: bool,
    },

    /// Time span negation
    NegateSpan,

    /// Comparison producing a Boolean
    /// Stack: [left, right] -> [boolean]
    Compare {
        /// Comparison operator
        op: BinaryOperator,
        /// How operands are compared
        kind: CompareKind,
    },

    // === Arrays and Members ===
    /// Collect the top `count` values into an array
    MakeArray {
        /// Element type in the type pool
        element: TypeIndex,
        /// Number of elements
        count: u16,
    },

    /// Index into an array
    /// Stack: [array, index] -> [element]
    ArrayIndex,

    /// Invoke a host member
    /// Stack: [receiver?, arg1, ..., argN] -> [result]
    Invoke {
        /// Member in the member pool
        member: MemberIndex,
        /// Number of arguments
        argc: u8,
        /// Whether a receiver precedes the arguments
        instance: bool,
    },

    // === Control Flow ===
    /// Jump unconditionally
    /// Operand: offset relative to this instruction
    Jump(i32),

    /// Pop a Boolean and jump if it is false
    JumpIfFalse(i32),

    /// Pop a Boolean and jump if it is true
    JumpIfTrue(i32),

    /// Stop execution; the top value is the result
    Return,
}

impl Instruction {
    /// Get the stack effect of this instruction (positive = pushes, negative = pops)
    pub fn stack_effect(&self) -> i32 {
        match self {
            Self::PushConstant(_)
            | Self::LoadVariable(_)
            | Self::LoadResult(_)
            | Self::LoadOwner
            | Self::Duplicate => 1,

            Self::Pop => -1,

            // Binary operations (pop 2, push 1)
            Self::Arithmetic { .. }
            | Self::Concat
            | Self::Temporal(_)
            | Self::Shift { .. }
            | Self::Bitwise { .. }
            | Self::LogicalXor
            | Self::Compare { .. }
            | Self::ArrayIndex => -1,

            // Unary operations (pop 1, push 1)
            Self::Convert { .. }
            | Self::Unbox(_)
            | Self::LogicalNot
            | Self::BitwiseNot(_)
            | Self::Negate { .. }
            | Self::NegateSpan => 0,

            Self::MakeArray { count, .. } => 1 - i32::from(*count),
            Self::Invoke { argc, instance, .. } => 1 - i32::from(*argc) - i32::from(*instance),

            Self::Jump(_) | Self::Return => 0,
            Self::JumpIfFalse(_) | Self::JumpIfTrue(_) => -1,
        }
    }

    /// Check if this instruction transfers control
    pub fn is_jump(&self) -> bool {
        matches!(self, Self::Jump(_) | Self::JumpIfFalse(_) | Self::JumpIfTrue(_))
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let checked = |c: &bool| if *c { " checked" } else { "" };
        match self {
            Self::PushConstant(idx) => write!(f, "PUSH_CONST {idx}"),
            Self::LoadVariable(idx) => write!(f, "LOAD_VAR {idx}"),
            Self::LoadResult(idx) => write!(f, "LOAD_RESULT {idx}"),
            Self::LoadOwner => write!(f, "LOAD_OWNER"),
            Self::Duplicate => write!(f, "DUP"),
            Self::Pop => write!(f, "POP"),
            Self::Convert { to, checked: c } => write!(f, "CONVERT {to:?}{}", checked(c)),
            Self::Unbox(idx) => write!(f, "UNBOX {idx}"),
            Self::Arithmetic { op, kind, checked: c } => {
                write!(f, "ARITH {} {kind}{}", op.symbol(), checked(c))
            }
            Self::Concat => write!(f, "CONCAT"),
            Self::Temporal(op) => write!(f, "TEMPORAL {op}"),
            Self::Shift { op, kind } => write!(f, "SHIFT {} {kind}", op.symbol()),
            Self::Bitwise { op, kind } => write!(f, "BITWISE {} {kind}", op.symbol()),
            Self::LogicalXor => write!(f, "XOR"),
            Self::LogicalNot => write!(f, "NOT"),
            Self::BitwiseNot(kind) => write!(f, "BITWISE_NOT {kind}"),
            Self::Negate { kind, checked: c } => write!(f, "NEG {kind}{}", checked(c)),
            Self::NegateSpan => write!(f, "NEG_SPAN"),
            Self::Compare { op, kind } => write!(f, "CMP {} {kind}", op.symbol()),
            Self::MakeArray { element, count } => write!(f, "MAKE_ARRAY {element} {count}"),
            Self::ArrayIndex => write!(f, "INDEX"),
            Self::Invoke {
                member,
                argc,
                instance,
            } => {
                let kind = if *instance { "CALL_INSTANCE" } else { "CALL" };
                write!(f, "{kind} {member} {argc}")
            }
            Self::Jump(offset) => write!(f, "JUMP {offset}"),
            Self::JumpIfFalse(offset) => write!(f, "JMP_FALSE {offset}"),
            Self::JumpIfTrue(offset) => write!(f, "JMP_TRUE {offset}"),
            Self::Return => write!(f, "RETURN"),
        }
    }
}

fn pool_index(len: usize, pool: &str) -> CompileResult<u16> {
    u16::try_from(len).map_err(|_| {
        CompileError::syntax(format!("Expression exceeds the {pool} pool limit of {}", u16::MAX))
    })
}

/// Bytecode program containing instructions and pools
#[derive(Debug, Clone, Default)]
pub struct Bytecode {
    /// Instruction sequence
    pub instructions: Vec<Instruction>,

    /// Constant value pool
    pub constants: Vec<Value>,

    /// Variable and expression keys
    pub strings: Vec<String>,

    /// Host members invoked by the program
    pub members: Vec<Arc<HostMember>>,

    /// Types referenced by conversions and arrays
    pub types: Vec<TypeInfo>,

    /// Maximum stack depth required for execution
    pub max_stack_depth: usize,

    /// Original expression text
    pub source: Option<String>,
}

impl Bytecode {
    /// Create new empty bytecode
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a constant to the pool and return its index
    pub fn add_constant(&mut self, value: Value) -> CompileResult<ConstantIndex> {
        if let Some(index) = self.constants.iter().position(|v| v.is_identical(&value)) {
            return pool_index(index, "constant");
        }
        let index = pool_index(self.constants.len(), "constant")?;
        self.constants.push(value);
        Ok(index)
    }

    /// Add a string to the pool and return its index
    pub fn add_string(&mut self, string: &str) -> CompileResult<StringIndex> {
        if let Some(index) = self.strings.iter().position(|s| s == string) {
            return pool_index(index, "string");
        }
        let index = pool_index(self.strings.len(), "string")?;
        self.strings.push(string.to_string());
        Ok(index)
    }

    /// Add a member to the pool and return its index
    pub fn add_member(&mut self, member: &Arc<HostMember>) -> CompileResult<MemberIndex> {
        if let Some(index) = self.members.iter().position(|m| Arc::ptr_eq(m, member)) {
            return pool_index(index, "member");
        }
        let index = pool_index(self.members.len(), "member")?;
        self.members.push(Arc::clone(member));
        Ok(index)
    }

    /// Add a type to the pool and return its index
    pub fn add_type(&mut self, ty: &TypeInfo) -> CompileResult<TypeIndex> {
        if let Some(index) = self.types.iter().position(|t| t == ty) {
            return pool_index(index, "type");
        }
        let index = pool_index(self.types.len(), "type")?;
        self.types.push(ty.clone());
        Ok(index)
    }

    /// Add an instruction to the bytecode
    pub fn emit(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    /// Calculate the maximum stack depth required
    ///
    /// Branches are counted as if executed in sequence, which overestimates.
    pub fn calculate_max_stack_depth(&mut self) {
        let mut current_depth = 0i32;
        let mut max_depth = 0i32;

        for instruction in &self.instructions {
            current_depth += instruction.stack_effect();
            max_depth = max_depth.max(current_depth);
        }

        self.max_stack_depth = max_depth.max(0) as usize;
    }

    /// Pretty print the bytecode for debugging
    pub fn disassemble(&self) -> String {
        let mut output = String::new();
        output.push_str("=== BYTECODE DISASSEMBLY ===\n");

        if let Some(source) = &self.source {
            output.push_str(&format!("Source: {source}\n"));
        }
        output.push_str(&format!("Max Stack Depth: {}\n", self.max_stack_depth));

        output.push_str("\n--- CONSTANTS ---\n");
        for (i, constant) in self.constants.iter().enumerate() {
            output.push_str(&format!("{i:4}: {constant:?}\n"));
        }

        output.push_str("\n--- STRINGS ---\n");
        for (i, string) in self.strings.iter().enumerate() {
            output.push_str(&format!("{i:4}: \"{string}\"\n"));
        }

        output.push_str("\n--- MEMBERS ---\n");
        for (i, member) in self.members.iter().enumerate() {
            output.push_str(&format!("{i:4}: {member}\n"));
        }

        output.push_str("\n--- TYPES ---\n");
        for (i, ty) in self.types.iter().enumerate() {
            output.push_str(&format!("{i:4}: {ty}\n"));
        }

        output.push_str("\n--- INSTRUCTIONS ---\n");
        for (i, instruction) in self.instructions.iter().enumerate() {
            output.push_str(&format!("{i:4}: {instruction}\n"));
        }

        output
    }
}

/// Jump target created by [`BytecodeBuilder::new_label`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

/// Type of jump instruction for label resolution
#[derive(Debug, Clone, Copy)]
enum JumpType {
    Unconditional,
    IfFalse,
    IfTrue,
}

/// Bytecode builder utility for constructing bytecode programs
#[derive(Debug, Default)]
pub struct BytecodeBuilder {
    bytecode: Bytecode,
    label_targets: Vec<Option<usize>>,
    pending_jumps: Vec<(usize, Label, JumpType)>,
}

impl BytecodeBuilder {
    /// Create a new bytecode builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit an instruction
    pub fn emit(&mut self, instruction: Instruction) -> &mut Self {
        self.bytecode.emit(instruction);
        self
    }

    /// Add a constant and emit a PushConstant instruction
    pub fn push_constant(&mut self, value: Value) -> CompileResult<&mut Self> {
        let index = self.bytecode.add_constant(value)?;
        Ok(self.emit(Instruction::PushConstant(index)))
    }

    /// Add a key and emit a LoadVariable instruction
    pub fn load_variable(&mut self, key: &str) -> CompileResult<&mut Self> {
        let index = self.bytecode.add_string(key)?;
        Ok(self.emit(Instruction::LoadVariable(index)))
    }

    /// Add a key and emit a LoadResult instruction
    pub fn load_result(&mut self, key: &str) -> CompileResult<&mut Self> {
        let index = self.bytecode.add_string(key)?;
        Ok(self.emit(Instruction::LoadResult(index)))
    }

    /// Add a member to the pool and return its index
    pub fn add_member(&mut self, member: &Arc<HostMember>) -> CompileResult<MemberIndex> {
        self.bytecode.add_member(member)
    }

    /// Add a type to the pool and return its index
    pub fn add_type(&mut self, ty: &TypeInfo) -> CompileResult<TypeIndex> {
        self.bytecode.add_type(ty)
    }

    /// Create a label to be placed later
    pub fn new_label(&mut self) -> Label {
        self.label_targets.push(None);
        Label(self.label_targets.len() - 1)
    }

    /// Place a label at the current position
    pub fn mark(&mut self, label: Label) -> &mut Self {
        let position = self.bytecode.instructions.len();
        if let Some(target) = self.label_targets.get_mut(label.0) {
            *target = Some(position);
        }
        self
    }

    fn jump(&mut self, label: Label, jump_type: JumpType, placeholder: Instruction) -> &mut Self {
        let position = self.bytecode.instructions.len();
        self.pending_jumps.push((position, label, jump_type));
        self.emit(placeholder)
    }

    /// Emit a jump to a label (to be resolved later)
    pub fn jump_to(&mut self, label: Label) -> &mut Self {
        self.jump(label, JumpType::Unconditional, Instruction::Jump(0))
    }

    /// Emit a conditional jump taken when the popped value is false
    pub fn jump_if_false_to(&mut self, label: Label) -> &mut Self {
        self.jump(label, JumpType::IfFalse, Instruction::JumpIfFalse(0))
    }

    /// Emit a conditional jump taken when the popped value is true
    pub fn jump_if_true_to(&mut self, label: Label) -> &mut Self {
        self.jump(label, JumpType::IfTrue, Instruction::JumpIfTrue(0))
    }

    /// Finalize the bytecode by resolving jumps and calculating stack depth
    pub fn finalize(mut self, source: Option<&str>) -> CompileResult<Bytecode> {
        for (instruction_pos, label, jump_type) in self.pending_jumps {
            let target_pos = self
                .label_targets
                .get(label.0)
                .copied()
                .flatten()
                .ok_or_else(|| CompileError::syntax(format!("Undefined label: {}", label.0)))?;

            let offset = target_pos as i32 - instruction_pos as i32;
            self.bytecode.instructions[instruction_pos] = match jump_type {
                JumpType::Unconditional => Instruction::Jump(offset),
                JumpType::IfFalse => Instruction::JumpIfFalse(offset),
                JumpType::IfTrue => Instruction::JumpIfTrue(offset),
            };
        }

        self.bytecode.calculate_max_stack_depth();
        self.bytecode.source = source.map(str::to_string);
        Ok(self.bytecode)
    }
}
