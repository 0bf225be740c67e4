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

//! Stored state of a registered expression

use crate::evaluator::Expression;
use crate::model::Value;

/// A compiled expression together with its last computed value
#[derive(Debug, Clone)]
pub struct ExpressionResult {
    name: String,
    expression: Expression,
    value: Value,
    dirty: bool,
    evaluation_count: u64,
}

impl ExpressionResult {
    pub(crate) fn new(name: &str, expression: Expression, value: Value) -> Self {
        Self {
            name: name.to_string(),
            expression,
            value,
            dirty: false,
            evaluation_count: 1,
        }
    }

    /// Name as registered
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    /// Last computed value, possibly stale
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Whether the value is known to be stale
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Number of evaluations since registration, including the first
    pub fn evaluation_count(&self) -> u64 {
        self.evaluation_count
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn store(&mut self, value: Value) {
        self.value = value;
        self.dirty = false;
        self.evaluation_count += 1;
    }
}
