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

//! Embeddable formula engine
//!
//! `reckon` compiles textual formulas against typed variables, imported host
//! types and other named formulas, and keeps derived results consistent as
//! inputs change, the way a spreadsheet recalculates.
//!
//! * [`Expression`] compiles a single formula to bytecode and evaluates it
//!   against an [`ExpressionContext`].
//! * [`ComputeInstance`] registers variables and named expressions, tracks
//!   their dependencies and recalculates according to a
//!   [`RecalculationMode`].

pub mod analyzer;
pub mod ast;
pub mod compiler;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod model;
pub mod parser;
pub mod registry;

pub use diagnostics::{CompileError, CompileErrorReason};
pub use engine::{ComputeInstance, DependencyGraph, SharedComputeInstance};
pub use error::{CalcError, Result};
pub use evaluator::{
    EvaluationError, Expression, ExpressionContext, ExpressionOptions, RealLiteralType,
    RecalculationMode, StringComparison, VariableStore,
};
pub use model::{FromValue, TypeInfo, Value};
pub use parser::{ParseError, parse};
pub use registry::{HostMember, HostObject, HostType, HostTypeRef, ImportRegistry};
