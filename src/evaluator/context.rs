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

//! Evaluation context: options, imports, variables and the owner object

use super::options::ExpressionOptions;
use super::variables::VariableStore;
use crate::model::Value;
use crate::registry::{HostObject, HostTypeRef, ImportRegistry};

/// Everything a standalone expression compiles and evaluates against
#[derive(Debug, Clone)]
pub struct ExpressionContext {
    options: ExpressionOptions,
    imports: ImportRegistry,
    variables: VariableStore,
    owner: Option<Value>,
}

impl Default for ExpressionContext {
    fn default() -> Self {
        Self::new(ExpressionOptions::default())
    }
}

impl ExpressionContext {
    /// Create an empty context
    pub fn new(options: ExpressionOptions) -> Self {
        let case_sensitive = options.case_sensitive;
        Self {
            options,
            imports: ImportRegistry::new(case_sensitive),
            variables: VariableStore::new(case_sensitive),
            owner: None,
        }
    }

    /// Attach an owner object whose members resolve as bare names
    pub fn with_owner(mut self, owner: HostObject) -> Self {
        self.set_owner(Some(owner));
        self
    }

    /// Replace the owner object
    pub fn set_owner(&mut self, owner: Option<HostObject>) {
        self.owner = owner.map(Value::Object);
    }

    pub fn options(&self) -> &ExpressionOptions {
        &self.options
    }

    pub fn imports(&self) -> &ImportRegistry {
        &self.imports
    }

    pub fn imports_mut(&mut self) -> &mut ImportRegistry {
        &mut self.imports
    }

    pub fn variables(&self) -> &VariableStore {
        &self.variables
    }

    pub fn variables_mut(&mut self) -> &mut VariableStore {
        &mut self.variables
    }

    /// Owner object as a value
    pub fn owner(&self) -> Option<&Value> {
        self.owner.as_ref()
    }

    /// Static type of the owner object
    pub fn owner_type(&self) -> Option<HostTypeRef> {
        self.owner
            .as_ref()
            .and_then(Value::as_object)
            .map(|owner| owner.host_type().clone())
    }
}
