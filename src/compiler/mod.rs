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

//! Evaluator compiler
//!
//! Lowers a resolved element tree to bytecode and executes it on a stack machine.
//! The arithmetic kernels in [`operations`] are shared with constant folding.

pub mod bytecode;
pub mod compiler;
pub mod operations;
pub mod vm;

pub use bytecode::{Bytecode, BytecodeBuilder, Instruction, Label};
pub use compiler::ExpressionCompiler;
pub use vm::{NoValues, ValueSource, VirtualMachine, execute};
