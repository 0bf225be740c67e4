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

//! Compute instance: named variables and expressions kept consistent under change

use super::graph::{DependencyGraph, NodeKind};
use super::result::ExpressionResult;
use crate::analyzer::{DependencyKind, NameCatalog};
use crate::compiler::ValueSource;
use crate::diagnostics::CompileErrorReason;
use crate::error::{CalcError, Result};
use crate::evaluator::{
    Assignment, EvaluationError, EvaluationResult, Expression, ExpressionContext, ExpressionOptions,
    RecalculationMode, Variable, VariableStore,
};
use crate::model::{FromValue, TypeInfo, Value};
use crate::registry::{HostObject, HostTypeRef};
use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use std::cell::Cell;

/// Names visible to an expression being added to an instance
struct InstanceCatalog<'a> {
    variables: &'a VariableStore,
    results: &'a IndexMap<String, ExpressionResult>,
    pending: &'a str,
    self_referenced: Cell<bool>,
}

impl NameCatalog for InstanceCatalog<'_> {
    fn variable_type(&self, key: &str) -> Option<TypeInfo> {
        self.variables.variable_type(key)
    }

    fn expression_type(&self, key: &str) -> Option<TypeInfo> {
        if key == self.pending {
            self.self_referenced.set(true);
            return None;
        }
        self.results
            .get(key)
            .map(|r| r.expression().result_type().clone())
    }
}

/// Values read by expressions of an instance
struct InstanceValues<'a> {
    variables: &'a VariableStore,
    results: &'a IndexMap<String, ExpressionResult>,
}

impl ValueSource for InstanceValues<'_> {
    fn variable(&self, key: &str) -> EvaluationResult<Value> {
        ValueSource::variable(self.variables, key)
    }

    fn result(&self, key: &str) -> EvaluationResult<Value> {
        self.results
            .get(key)
            .map(|r| r.value().clone())
            .ok_or_else(|| EvaluationError::ResultNotFound {
                name: key.to_string(),
            })
    }
}

/// Registry of variables and expressions with incremental recalculation
///
/// Every expression is evaluated once when it is added. Afterwards, changes
/// to a variable reach the expressions depending on it according to the
/// configured [`RecalculationMode`]:
///
/// * `Never`: nothing happens until [`ComputeInstance::recalculate`] is called.
/// * `Auto`: all transitive dependents are re-evaluated in dependency order.
/// * `Lazy`: dependents are marked dirty and refreshed when read.
///
/// ```ignore
/// let mut instance = ComputeInstance::default();
/// instance.set_value("a", 10)?;
/// instance.add_expression("b", "a + 5")?;
/// instance.set_value("a", 20)?;
/// assert_eq!(instance.get_result("b")?, &Value::Int32(25));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ComputeInstance {
    context: ExpressionContext,
    expressions: IndexMap<String, ExpressionResult>,
    graph: DependencyGraph,
}

impl ComputeInstance {
    /// Create an empty instance
    pub fn new(options: ExpressionOptions) -> Self {
        Self {
            context: ExpressionContext::new(options),
            expressions: IndexMap::new(),
            graph: DependencyGraph::new(),
        }
    }

    pub fn options(&self) -> &ExpressionOptions {
        self.context.options()
    }

    pub fn context(&self) -> &ExpressionContext {
        &self.context
    }

    pub fn variables(&self) -> &VariableStore {
        self.context.variables()
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    fn key(&self, name: &str) -> Result<String> {
        if name.is_empty() {
            return Err(CalcError::NullKey);
        }
        Ok(self.context.options().key(name))
    }

    /// Import a host type into the root namespace
    pub fn add_type(&mut self, host_type: HostTypeRef) -> Result<()> {
        Ok(self.context.imports_mut().add_type(host_type)?)
    }

    /// Import a host type under a dotted namespace
    pub fn add_type_in(&mut self, host_type: HostTypeRef, namespace: &str) -> Result<()> {
        Ok(self.context.imports_mut().add_type_in(host_type, namespace)?)
    }

    /// Import the static overloads named `method` of `host_type`
    pub fn add_method(&mut self, method: &str, host_type: &HostTypeRef, namespace: &str) -> Result<()> {
        Ok(self
            .context
            .imports_mut()
            .add_method(method, host_type, namespace)?)
    }

    /// Replace the owner object
    ///
    /// Fails while expressions are registered, since they were resolved
    /// against the previous owner type.
    pub fn set_owner(&mut self, owner: Option<HostObject>) -> Result<()> {
        if !self.expressions.is_empty() {
            return Err(CalcError::invalid_operation(
                "The owner cannot change while expressions are registered",
            ));
        }
        self.context.set_owner(owner);
        Ok(())
    }

    /// Declare a typed variable holding its type's default value
    pub fn define_variable(&mut self, name: &str, value_type: TypeInfo) -> Result<()> {
        let key = self.key(name)?;
        if self.expressions.contains_key(&key) {
            return Err(CalcError::duplicate_key(name));
        }
        self.context.variables_mut().define(name, value_type)?;
        self.graph.add_node(&key, name, NodeKind::Variable);
        Ok(())
    }

    /// Assign a variable, inserting it when unknown, and propagate the change
    pub fn set_value(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let key = self.key(name)?;
        if self.expressions.contains_key(&key) {
            return Err(CalcError::duplicate_key(name));
        }

        match self.context.variables_mut().set(name, value.into())? {
            Assignment::Inserted => {
                self.graph.add_node(&key, name, NodeKind::Variable);
                Ok(())
            }
            Assignment::Changed => self.propagate(&key),
            Assignment::Unchanged => Ok(()),
        }
    }

    fn propagate(&mut self, key: &str) -> Result<()> {
        let mode = self.context.options().recalculation_mode;
        if mode == RecalculationMode::Never {
            return Ok(());
        }

        let dependents = self.graph.dependents_in_order(&[key], false)?;
        log::debug!(
            "Variable '{key}' changed, {} dependents affected ({mode:?})",
            dependents.len()
        );
        for dependent in &dependents {
            if let Some(result) = self.expressions.get_mut(dependent) {
                result.mark_dirty();
            }
        }
        if mode == RecalculationMode::Auto {
            self.recalculate_keys(&dependents)?;
        }
        Ok(())
    }

    /// Current value of a variable
    pub fn get_value(&self, name: &str) -> Result<&Value> {
        self.context.variables().get(name)
    }

    /// Current value of a variable as a concrete type
    pub fn get_value_as<T: FromValue>(&self, name: &str) -> Result<T> {
        self.context.variables().get_as(name)
    }

    /// Remove a variable no expression depends on
    pub fn remove_variable(&mut self, name: &str) -> Result<Variable> {
        let key = self.key(name)?;
        if !self.context.variables().contains(&key) {
            return Err(CalcError::key_not_found(name));
        }
        self.ensure_no_dependents(&key, name)?;
        self.graph.remove_node(&key);
        self.context
            .variables_mut()
            .remove(&key)
            .ok_or_else(|| CalcError::key_not_found(name))
    }

    /// Compile, evaluate and register an expression
    pub fn add_expression(&mut self, name: &str, text: &str) -> Result<()> {
        self.add(name, text, None)
    }

    /// Like [`ComputeInstance::add_expression`], converting the result to `result_type`
    pub fn add_expression_as(&mut self, name: &str, text: &str, result_type: TypeInfo) -> Result<()> {
        self.add(name, text, Some(&result_type))
    }

    fn add(&mut self, name: &str, text: &str, result_type: Option<&TypeInfo>) -> Result<()> {
        let key = self.key(name)?;
        if self.expressions.contains_key(&key) || self.context.variables().contains(&key) {
            return Err(CalcError::duplicate_key(name));
        }

        let catalog = InstanceCatalog {
            variables: self.context.variables(),
            results: &self.expressions,
            pending: &key,
            self_referenced: Cell::new(false),
        };
        let expression = match Expression::compile_with(text, &self.context, &catalog, result_type) {
            Ok(expression) => expression,
            Err(err) if err.reason == CompileErrorReason::UndefinedName && catalog.self_referenced.get() => {
                log::warn!("Rejecting expression '{name}': it references itself");
                return Err(CalcError::CyclicDependency {
                    path: vec![name.to_string(), name.to_string()],
                });
            }
            Err(err) => return Err(err.into()),
        };

        let referenced: Vec<String> = expression
            .dependencies()
            .iter()
            .filter(|d| d.kind == DependencyKind::Expression)
            .map(|d| d.key.clone())
            .collect();
        self.refresh(&referenced)?;

        let value = self.evaluate(&expression)?;

        self.graph.add_node(&key, name, NodeKind::Expression);
        for dependency in expression.dependencies() {
            if let Err(err) = self.graph.add_edge(&key, &dependency.key) {
                self.graph.remove_node(&key);
                return Err(err);
            }
        }
        log::debug!("Registered expression '{name}' = {value}");
        self.expressions
            .insert(key, ExpressionResult::new(name, expression, value));
        Ok(())
    }

    /// Record an extra dependency of an expression on a variable or expression
    pub fn add_dependency(&mut self, expression: &str, depends_on: &str) -> Result<()> {
        let key = self.key(expression)?;
        if !self.expressions.contains_key(&key) {
            return Err(CalcError::key_not_found(expression));
        }
        let target = self.key(depends_on)?;
        if !self.expressions.contains_key(&target) && !self.context.variables().contains(&target) {
            return Err(CalcError::invalid_operation(format!(
                "'{depends_on}' is neither a registered expression nor a variable"
            )));
        }
        self.graph.add_edge(&key, &target)
    }

    /// Value of an expression, refreshing dirty entries unless recalculation is `Never`
    pub fn get_result(&mut self, name: &str) -> Result<&Value> {
        let key = self.key(name)?;
        if !self.expressions.contains_key(&key) {
            return Err(CalcError::key_not_found(name));
        }
        if self.context.options().recalculation_mode != RecalculationMode::Never {
            self.refresh(std::slice::from_ref(&key))?;
        }
        self.expressions
            .get(&key)
            .map(ExpressionResult::value)
            .ok_or_else(|| CalcError::key_not_found(name))
    }

    /// Value of an expression as a concrete type
    pub fn get_result_as<T: FromValue>(&mut self, name: &str) -> Result<T> {
        let value = self.get_result(name)?;
        T::from_value(value).ok_or_else(|| {
            CalcError::type_mismatch(name, std::any::type_name::<T>(), value.type_info())
        })
    }

    /// Re-evaluate the named expressions and everything depending on them
    pub fn recalculate(&mut self, names: &[&str]) -> Result<()> {
        let mut keys = Vec::with_capacity(names.len());
        for name in names {
            let key = self.key(name)?;
            if !self.expressions.contains_key(&key) {
                return Err(CalcError::key_not_found(*name));
            }
            keys.push(key);
        }
        let roots: Vec<&str> = keys.iter().map(String::as_str).collect();
        let order = self.graph.dependents_in_order(&roots, true)?;
        self.recalculate_keys(&order)
    }

    /// Re-evaluate every expression in dependency order
    pub fn recalculate_all(&mut self) -> Result<()> {
        let order = self.graph.evaluation_order();
        self.recalculate_keys(&order)
    }

    /// Remove an expression no other expression depends on
    pub fn remove_expression(&mut self, name: &str) -> Result<()> {
        let key = self.key(name)?;
        if !self.expressions.contains_key(&key) {
            return Err(CalcError::key_not_found(name));
        }
        self.ensure_no_dependents(&key, name)?;
        self.graph.remove_node(&key);
        self.expressions.shift_remove(&key);
        Ok(())
    }

    fn ensure_no_dependents(&self, key: &str, name: &str) -> Result<()> {
        let dependents = self.graph.dependents(key);
        if dependents.is_empty() {
            return Ok(());
        }
        let names: Vec<&str> = dependents.iter().map(|n| n.name()).collect();
        Err(CalcError::invalid_operation(format!(
            "'{name}' is still referenced by {}",
            names.join(", ")
        )))
    }

    pub fn contains_expression(&self, name: &str) -> bool {
        self.expressions.contains_key(&self.context.options().key(name))
    }

    pub fn contains_variable(&self, name: &str) -> bool {
        self.context.variables().contains(name)
    }

    /// Number of registered expressions
    pub fn expression_count(&self) -> usize {
        self.expressions.len()
    }

    /// Number of variables
    pub fn value_count(&self) -> usize {
        self.context.variables().len()
    }

    /// Drop every expression, variable and dependency; imports and the owner are kept
    pub fn clear(&mut self) {
        log::debug!("Clearing compute instance");
        self.expressions.clear();
        self.context.variables_mut().clear();
        self.graph.clear();
    }

    /// Compiled expression registered under `name`
    pub fn expression(&self, name: &str) -> Option<&Expression> {
        self.result_entry(name).map(ExpressionResult::expression)
    }

    /// Whether the stored value of an expression is stale
    pub fn is_dirty(&self, name: &str) -> Result<bool> {
        self.result_entry(name)
            .map(ExpressionResult::is_dirty)
            .ok_or_else(|| CalcError::key_not_found(name))
    }

    /// Number of times an expression has been evaluated
    pub fn evaluation_count(&self, name: &str) -> Result<u64> {
        self.result_entry(name)
            .map(ExpressionResult::evaluation_count)
            .ok_or_else(|| CalcError::key_not_found(name))
    }

    /// Names of the expressions directly depending on `name`
    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        let key = self.context.options().key(name);
        self.graph
            .dependents(&key)
            .into_iter()
            .map(|n| n.name().to_string())
            .collect()
    }

    /// Names `name` directly depends on
    pub fn precedents_of(&self, name: &str) -> Vec<String> {
        let key = self.context.options().key(name);
        self.graph
            .precedents(&key)
            .into_iter()
            .map(|n| n.name().to_string())
            .collect()
    }

    fn result_entry(&self, name: &str) -> Option<&ExpressionResult> {
        self.expressions.get(&self.context.options().key(name))
    }

    fn evaluate(&self, expression: &Expression) -> Result<Value> {
        let values = InstanceValues {
            variables: self.context.variables(),
            results: &self.expressions,
        };
        Ok(expression.evaluate_with(self.context.owner(), &values)?)
    }

    /// Bring dirty expressions among `keys` and their precedents up to date
    fn refresh(&mut self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let roots: Vec<&str> = keys.iter().map(String::as_str).collect();
        let stale: Vec<String> = self
            .graph
            .precedents_in_order(&roots)?
            .into_iter()
            .filter(|k| self.expressions.get(k).is_some_and(ExpressionResult::is_dirty))
            .collect();
        self.recalculate_keys(&stale)
    }

    /// Evaluate `keys` in order
    ///
    /// A failing expression and its transitive dependents are left dirty;
    /// everything else is still evaluated. The first failure is returned.
    fn recalculate_keys(&mut self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        log::debug!("Recalculating {} expressions", keys.len());
        let mut blocked: FxHashSet<String> = FxHashSet::default();
        let mut first_error = None;

        for key in keys {
            let Some(result) = self.expressions.get(key) else {
                continue;
            };
            let outcome = if blocked.contains(key) {
                None
            } else {
                Some(self.evaluate(result.expression()))
            };
            match outcome {
                Some(Ok(value)) => {
                    log::trace!("Recalculated '{key}' = {value}");
                    if let Some(result) = self.expressions.get_mut(key) {
                        result.store(value);
                    }
                }
                Some(Err(err)) => {
                    log::warn!("Recalculating '{key}' failed: {err}");
                    blocked.extend(self.graph.dependents_in_order(&[key.as_str()], false)?);
                    if let Some(result) = self.expressions.get_mut(key) {
                        result.mark_dirty();
                    }
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
                None => {
                    if let Some(result) = self.expressions.get_mut(key) {
                        result.mark_dirty();
                    }
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn instance(mode: RecalculationMode) -> ComputeInstance {
        let mut instance =
            ComputeInstance::new(ExpressionOptions::default().with_recalculation_mode(mode));
        instance.set_value("a", 10).unwrap();
        instance.add_expression("b", "a + 5").unwrap();
        instance.add_expression("c", "b + 1").unwrap();
        instance
    }

    #[test]
    fn test_auto_recalculates_chain() {
        let mut instance = instance(RecalculationMode::Auto);
        instance.set_value("a", 20).unwrap();
        assert!(!instance.is_dirty("c").unwrap());
        assert_eq!(instance.get_result("c").unwrap(), &Value::Int32(26));
        assert_eq!(instance.evaluation_count("b").unwrap(), 2);
    }

    #[test]
    fn test_lazy_marks_dirty_then_refreshes() {
        let mut instance = instance(RecalculationMode::Lazy);
        instance.set_value("a", 20).unwrap();
        assert!(instance.is_dirty("b").unwrap());
        assert!(instance.is_dirty("c").unwrap());

        assert_eq!(instance.get_result("c").unwrap(), &Value::Int32(26));
        assert!(!instance.is_dirty("b").unwrap());
        assert_eq!(instance.evaluation_count("c").unwrap(), 2);
    }

    #[test]
    fn test_never_keeps_stale_values() {
        let mut instance = instance(RecalculationMode::Never);
        instance.set_value("a", 20).unwrap();
        assert_eq!(instance.get_result("c").unwrap(), &Value::Int32(16));

        instance.recalculate(&["b"]).unwrap();
        assert_eq!(instance.get_result("c").unwrap(), &Value::Int32(26));
    }

    #[test]
    fn test_unchanged_value_does_not_propagate() {
        let mut instance = instance(RecalculationMode::Auto);
        instance.set_value("a", 10).unwrap();
        assert_eq!(instance.evaluation_count("c").unwrap(), 1);
    }

    #[test]
    fn test_self_reference_is_cycle() {
        let mut instance = instance(RecalculationMode::Auto);
        let err = instance.add_expression("x", "x + 1").unwrap_err();
        assert_eq!(
            err,
            CalcError::CyclicDependency {
                path: vec!["x".into(), "x".into()]
            }
        );
        assert!(!instance.contains_expression("x"));
        assert!(instance.graph().id("x").is_none());
    }

    #[test]
    fn test_add_dependency_cycle() {
        let mut instance = instance(RecalculationMode::Auto);
        let err = instance.add_dependency("b", "c").unwrap_err();
        assert!(matches!(err, CalcError::CyclicDependency { .. }));
        let err = instance.add_dependency("b", "missing").unwrap_err();
        assert!(matches!(err, CalcError::InvalidOperation { .. }));
    }

    #[test]
    fn test_remove_with_dependents_fails() {
        let mut instance = instance(RecalculationMode::Auto);
        assert!(matches!(
            instance.remove_expression("b"),
            Err(CalcError::InvalidOperation { .. })
        ));
        instance.remove_expression("c").unwrap();
        instance.remove_expression("b").unwrap();
        instance.remove_variable("a").unwrap();
        assert_eq!(instance.expression_count(), 0);
        assert_eq!(instance.value_count(), 0);
    }

    #[test]
    fn test_failed_evaluation_leaves_no_state() {
        let mut instance = instance(RecalculationMode::Auto);
        instance.set_value("zero", 0).unwrap();
        assert!(matches!(
            instance.add_expression("q", "a / zero"),
            Err(CalcError::Evaluation(EvaluationError::DivideByZero))
        ));
        assert!(!instance.contains_expression("q"));
        assert!(instance.dependents_of("zero").is_empty());
    }

    #[test]
    fn test_clear() {
        let mut instance = instance(RecalculationMode::Auto);
        instance.clear();
        assert_eq!(instance.expression_count(), 0);
        assert_eq!(instance.value_count(), 0);
        assert!(instance.graph().is_empty());
        instance.set_value("b", 1).unwrap();
    }

    #[test]
    fn test_graph_inspection() {
        let instance = instance(RecalculationMode::Auto);
        assert_eq!(instance.dependents_of("a"), vec!["b"]);
        assert_eq!(instance.precedents_of("c"), vec!["b"]);
        assert_eq!(instance.graph().to_string(), "a\nb -> a\nc -> b\n");
    }
}
