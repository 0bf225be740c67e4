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

//! Standalone evaluation: options, context, variables and compiled expressions

mod context;
pub mod error;
mod expression;
pub mod options;
mod variables;

pub use context::ExpressionContext;
pub use error::{EvaluationError, EvaluationResult};
pub use expression::Expression;
pub use options::{
    DEFAULT_DATE_TIME_FORMAT, ExpressionOptions, RealLiteralType, RecalculationMode,
    StringComparison,
};
pub use variables::{Assignment, Variable, VariableStore, default_value};
