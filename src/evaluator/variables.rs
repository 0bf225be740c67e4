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

//! Named, typed variable storage with equality-gated change reporting

use crate::analyzer::NameCatalog;
use crate::compiler::ValueSource;
use crate::error::{CalcError, Result};
use crate::evaluator::error::{EvaluationError, EvaluationResult};
use crate::model::{FromValue, TypeCoercion, TypeInfo, Value};
use indexmap::IndexMap;

/// A stored variable
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    /// Name as first assigned
    pub name: String,
    /// Current value
    pub value: Value,
    /// Static type expressions see
    pub value_type: TypeInfo,
}

/// Outcome of an assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    /// The variable did not exist
    Inserted,
    /// The stored value was replaced by a different one
    Changed,
    /// The new value equals the stored one; dependents need no update
    Unchanged,
}

impl Assignment {
    /// Whether dependents must be notified
    pub fn is_change(self) -> bool {
        self == Assignment::Changed
    }
}

/// Variable values keyed by normalized name
#[derive(Debug, Clone, Default)]
pub struct VariableStore {
    case_sensitive: bool,
    variables: IndexMap<String, Variable>,
}

impl VariableStore {
    /// Create an empty store
    pub fn new(case_sensitive: bool) -> Self {
        Self {
            case_sensitive,
            variables: IndexMap::new(),
        }
    }

    /// Normalize a name into a key
    pub fn key(&self, name: &str) -> String {
        if self.case_sensitive {
            name.to_string()
        } else {
            name.to_lowercase()
        }
    }

    fn checked_key(&self, name: &str) -> Result<String> {
        if name.is_empty() {
            return Err(CalcError::NullKey);
        }
        Ok(self.key(name))
    }

    /// Declare a variable holding the default value of `value_type`
    pub fn define(&mut self, name: &str, value_type: TypeInfo) -> Result<()> {
        let key = self.checked_key(name)?;
        if self.variables.contains_key(&key) {
            return Err(CalcError::duplicate_key(name));
        }
        let value = default_value(&value_type);
        log::trace!("Defining variable '{name}' as {value_type}");
        self.variables.insert(
            key,
            Variable {
                name: name.to_string(),
                value,
                value_type,
            },
        );
        Ok(())
    }

    /// Assign a value, inserting the variable if it is unknown
    ///
    /// An existing variable keeps its type: the value is converted implicitly
    /// or the assignment fails. A new variable assigned `null` gets type `Object`.
    pub fn set(&mut self, name: &str, value: Value) -> Result<Assignment> {
        let key = self.checked_key(name)?;

        let Some(existing) = self.variables.get_mut(&key) else {
            let value_type = match value.type_info() {
                TypeInfo::Null => TypeInfo::Object,
                ty => ty,
            };
            self.variables.insert(
                key,
                Variable {
                    name: name.to_string(),
                    value,
                    value_type,
                },
            );
            return Ok(Assignment::Inserted);
        };

        let value = TypeCoercion::convert_to_type(&value, &existing.value_type).map_err(|_| {
            CalcError::type_mismatch(name, &existing.value_type, value.type_info())
        })?;
        if existing.value.is_identical(&value) {
            return Ok(Assignment::Unchanged);
        }
        existing.value = value;
        Ok(Assignment::Changed)
    }

    /// Current value of a variable
    pub fn get(&self, name: &str) -> Result<&Value> {
        self.variables
            .get(&self.key(name))
            .map(|v| &v.value)
            .ok_or_else(|| CalcError::key_not_found(name))
    }

    /// Current value of a variable as a concrete type
    pub fn get_as<T: FromValue>(&self, name: &str) -> Result<T> {
        let value = self.get(name)?;
        T::from_value(value).ok_or_else(|| {
            CalcError::type_mismatch(name, std::any::type_name::<T>(), value.type_info())
        })
    }

    /// Variable entry by name
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(&self.key(name))
    }

    /// Check if a variable exists
    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(&self.key(name))
    }

    /// Remove a variable
    pub fn remove(&mut self, name: &str) -> Option<Variable> {
        self.variables.shift_remove(&self.key(name))
    }

    /// Number of variables
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Remove every variable
    pub fn clear(&mut self) {
        self.variables.clear();
    }

    /// Variables in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.variables.values()
    }
}

/// Default value of a type: zero, false, the epoch, or null
pub fn default_value(ty: &TypeInfo) -> Value {
    match ty {
        TypeInfo::Boolean => Value::Boolean(false),
        TypeInfo::Char => Value::Char('\0'),
        TypeInfo::SByte => Value::SByte(0),
        TypeInfo::Byte => Value::Byte(0),
        TypeInfo::Int16 => Value::Int16(0),
        TypeInfo::UInt16 => Value::UInt16(0),
        TypeInfo::Int32 => Value::Int32(0),
        TypeInfo::UInt32 => Value::UInt32(0),
        TypeInfo::Int64 => Value::Int64(0),
        TypeInfo::UInt64 => Value::UInt64(0),
        TypeInfo::Single => Value::Single(0.0),
        TypeInfo::Double => Value::Double(0.0),
        TypeInfo::Decimal => Value::Decimal(rust_decimal::Decimal::ZERO),
        TypeInfo::DateTime => Value::DateTime(chrono::NaiveDateTime::default()),
        TypeInfo::TimeSpan => Value::TimeSpan(chrono::TimeDelta::zero()),
        _ => Value::Null,
    }
}

/// Keys handed to this catalog are already normalized
impl NameCatalog for VariableStore {
    fn variable_type(&self, key: &str) -> Option<TypeInfo> {
        self.variables.get(key).map(|v| v.value_type.clone())
    }

    fn expression_type(&self, _key: &str) -> Option<TypeInfo> {
        None
    }
}

impl ValueSource for VariableStore {
    fn variable(&self, key: &str) -> EvaluationResult<Value> {
        self.variables
            .get(key)
            .map(|v| v.value.clone())
            .ok_or_else(|| EvaluationError::VariableNotFound {
                name: key.to_string(),
            })
    }

    fn result(&self, key: &str) -> EvaluationResult<Value> {
        Err(EvaluationError::ResultNotFound {
            name: key.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_assignment_outcomes() {
        let mut store = VariableStore::new(false);
        assert_eq!(store.set("Rate", Value::Int32(1)).unwrap(), Assignment::Inserted);
        assert_eq!(store.set("rate", Value::Int32(1)).unwrap(), Assignment::Unchanged);
        assert_eq!(store.set("RATE", Value::Int32(2)).unwrap(), Assignment::Changed);
        assert_eq!(store.get("rate").unwrap(), &Value::Int32(2));
        assert_eq!(store.variable("rate").unwrap().name, "Rate");
    }

    #[test]
    fn test_nan_reassignment_is_unchanged() {
        let mut store = VariableStore::new(false);
        store.set("nan", Value::Double(f64::NAN)).unwrap();
        assert_eq!(store.set("nan", Value::Double(f64::NAN)).unwrap(), Assignment::Unchanged);
        assert_eq!(store.set("nan", Value::Double(1.0)).unwrap(), Assignment::Changed);
    }

    #[test]
    fn test_empty_name_is_null_key() {
        let mut store = VariableStore::new(false);
        assert_eq!(store.set("", Value::Int32(1)), Err(CalcError::NullKey));
        assert_eq!(store.define("", TypeInfo::Int32), Err(CalcError::NullKey));
    }

    #[test]
    fn test_retyping_converts_implicitly() {
        let mut store = VariableStore::new(false);
        store.define("total", TypeInfo::Double).unwrap();
        assert_eq!(store.get("total").unwrap(), &Value::Double(0.0));

        store.set("total", Value::Int32(3)).unwrap();
        assert_eq!(store.get("total").unwrap(), &Value::Double(3.0));

        let err = store.set("total", Value::string("x")).unwrap_err();
        assert!(matches!(err, CalcError::TypeMismatch { .. }));
    }

    #[test]
    fn test_null_gives_object_type() {
        let mut store = VariableStore::new(false);
        store.set("anything", Value::Null).unwrap();
        assert_eq!(store.variable("anything").unwrap().value_type, TypeInfo::Object);
        assert_eq!(store.set("anything", Value::Int32(4)).unwrap(), Assignment::Changed);
    }

    #[test]
    fn test_typed_access() {
        let mut store = VariableStore::new(true);
        store.set("n", Value::Int64(9)).unwrap();
        assert_eq!(store.get_as::<i64>("n").unwrap(), 9);
        assert!(matches!(store.get_as::<i32>("n"), Err(CalcError::TypeMismatch { .. })));
        assert!(matches!(store.get("N"), Err(CalcError::KeyNotFound { .. })));
    }

    #[test]
    fn test_duplicate_definition() {
        let mut store = VariableStore::new(false);
        store.define("x", TypeInfo::Int32).unwrap();
        assert!(matches!(
            store.define("X", TypeInfo::Int32),
            Err(CalcError::DuplicateKey { .. })
        ));
    }
}
