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

//! Compiled expressions

use super::context::ExpressionContext;
use super::error::EvaluationResult;
use crate::analyzer::{Dependency, Element, ExpressionAnalyzer, NameCatalog, SymbolResolver};
use crate::compiler::{Bytecode, ExpressionCompiler, ValueSource, execute};
use crate::diagnostics::CompileResult;
use crate::error::{CalcError, Result};
use crate::model::{FromValue, TypeInfo, Value};
use crate::parser::parse;

/// A compiled formula
///
/// Created once from source text and immutable afterwards. Evaluating the
/// same expression against the same inputs always yields the same value.
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    root: Element,
    program: Bytecode,
    dependencies: Vec<Dependency>,
}

impl Expression {
    /// Compile against a context's imports, owner and variables
    pub fn compile(text: &str, context: &ExpressionContext) -> CompileResult<Self> {
        Self::compile_with(text, context, context.variables(), None)
    }

    /// Compile and convert the result to `result_type`
    pub fn compile_as(
        text: &str,
        context: &ExpressionContext,
        result_type: &TypeInfo,
    ) -> CompileResult<Self> {
        Self::compile_with(text, context, context.variables(), Some(result_type))
    }

    /// Compile with names resolved through `catalog`
    pub fn compile_with(
        text: &str,
        context: &ExpressionContext,
        catalog: &dyn NameCatalog,
        result_type: Option<&TypeInfo>,
    ) -> CompileResult<Self> {
        log::debug!("Compiling expression: {text}");
        let node = parse(text)?;

        let options = context.options();
        let resolver = SymbolResolver::new(options, context.imports(), context.owner_type(), catalog);
        let analysis = ExpressionAnalyzer::new(resolver).analyze(&node, result_type)?;
        let program = ExpressionCompiler::compile(&analysis.root, options.checked, Some(text))?;

        log::debug!(
            "Compiled expression '{text}' to {} with {} dependencies",
            analysis.root.result_type,
            analysis.dependencies.len()
        );
        Ok(Self {
            source: text.to_string(),
            root: analysis.root,
            program,
            dependencies: analysis.dependencies,
        })
    }

    /// Evaluate against a context
    pub fn evaluate(&self, context: &ExpressionContext) -> EvaluationResult<Value> {
        self.evaluate_with(context.owner(), context.variables())
    }

    /// Evaluate and extract a concrete type
    pub fn evaluate_as<T: FromValue>(&self, context: &ExpressionContext) -> Result<T> {
        let value = self.evaluate(context)?;
        T::from_value(&value).ok_or_else(|| {
            CalcError::type_mismatch(&self.source, std::any::type_name::<T>(), value.type_info())
        })
    }

    /// Evaluate with an explicit owner and value source
    pub fn evaluate_with(
        &self,
        owner: Option<&Value>,
        source: &dyn ValueSource,
    ) -> EvaluationResult<Value> {
        execute(&self.program, owner, source)
    }

    /// Source text
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Static result type
    pub fn result_type(&self) -> &TypeInfo {
        &self.root.result_type
    }

    /// Root of the typed element tree
    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Variables and expressions read by this expression
    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    pub fn program(&self) -> &Bytecode {
        &self.program
    }

    /// Render the compiled program as text
    pub fn disassemble(&self) -> String {
        self.program.disassemble()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CompileErrorReason;
    use crate::evaluator::ExpressionOptions;
    use crate::evaluator::error::EvaluationError;
    use crate::registry::builtin::math;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn context() -> ExpressionContext {
        let mut context = ExpressionContext::default();
        context.imports_mut().add_type(math()).unwrap();
        let vars = context.variables_mut();
        vars.set("a", Value::Int32(10)).unwrap();
        vars.set("d", Value::Double(0.5)).unwrap();
        vars.set("name", Value::string("Ada")).unwrap();
        vars.set("flag", Value::Boolean(true)).unwrap();
        context
    }

    fn eval(text: &str) -> Value {
        let context = context();
        Expression::compile(text, &context)
            .unwrap()
            .evaluate(&context)
            .unwrap()
    }

    #[rstest]
    #[case("a + 5", Value::Int32(15))]
    #[case("a * d", Value::Double(5.0))]
    #[case("a / 4", Value::Int32(2))]
    #[case("a % 4", Value::Int32(2))]
    #[case("a ^ 2", Value::Double(100.0))]
    #[case("-a", Value::Int32(-10))]
    #[case("a << 2", Value::Int32(40))]
    #[case("a AND 6", Value::Int32(2))]
    #[case("NOT flag", Value::Boolean(false))]
    #[case("flag XOR true", Value::Boolean(false))]
    #[case("a > 5 AND flag", Value::Boolean(true))]
    #[case("a = 10.0", Value::Boolean(true))]
    #[case("a <> 10", Value::Boolean(false))]
    #[case("name + \"!\"", Value::string("Ada!"))]
    #[case("name + a", Value::string("Ada10"))]
    #[case("name.Length", Value::Int32(3))]
    #[case("name.ToUpper()", Value::string("ADA"))]
    #[case("name[0]", Value::Char('A'))]
    #[case("If(a > 5; \"big\"; \"small\")", Value::string("big"))]
    #[case("If(flag; a; d)", Value::Double(10.0))]
    #[case("a IN (1; 10; 100)", Value::Boolean(true))]
    #[case("a IN (1; 2)", Value::Boolean(false))]
    #[case("cast(d * 5; int)", Value::Int32(2))]
    #[case("Max(a; 3)", Value::Int32(10))]
    #[case("Math.Abs(-a)", Value::Int32(10))]
    #[case("string.Concat(name; \"-\"; name)", Value::string("Ada-Ada"))]
    fn test_evaluate(#[case] text: &str, #[case] expected: Value) {
        assert_eq!(eval(text), expected);
    }

    #[test]
    fn test_checked_overflow_at_evaluation() {
        let mut context = ExpressionContext::new(ExpressionOptions::default().with_checked(true));
        context.variables_mut().set("big", Value::Int32(i32::MAX)).unwrap();
        let expression = Expression::compile("big + 1", &context).unwrap();
        assert!(matches!(
            expression.evaluate(&context),
            Err(EvaluationError::Overflow { .. })
        ));

        let mut context = ExpressionContext::default();
        context.variables_mut().set("big", Value::Int32(i32::MAX)).unwrap();
        let expression = Expression::compile("big + 1", &context).unwrap();
        assert_eq!(expression.evaluate(&context).unwrap(), Value::Int32(i32::MIN));
    }

    #[test]
    fn test_division_by_zero_at_evaluation() {
        let context = context();
        let expression = Expression::compile("a / 0", &context).unwrap();
        assert_eq!(expression.evaluate(&context), Err(EvaluationError::DivideByZero));
    }

    #[test]
    fn test_result_type_conversion() {
        let context = context();
        let expression = Expression::compile_as("a + 1", &context, &TypeInfo::Double).unwrap();
        assert_eq!(expression.result_type(), &TypeInfo::Double);
        assert_eq!(expression.evaluate_as::<f64>(&context).unwrap(), 11.0);
    }

    #[test]
    fn test_dependencies_and_disassembly() {
        let context = context();
        let expression = Expression::compile("a + a * d", &context).unwrap();
        let keys: Vec<&str> = expression.dependencies().iter().map(|d| d.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "d"]);
        assert!(expression.disassemble().contains("LOAD_VAR"));
    }

    #[test]
    fn test_syntax_error_reason() {
        let err = Expression::compile("a +* 2", &context()).unwrap_err();
        assert_eq!(err.reason, CompileErrorReason::SyntaxError);
    }

    #[test]
    fn test_values_change_between_evaluations() {
        let mut context = context();
        let expression = Expression::compile("a * 2", &context).unwrap();
        assert_eq!(expression.evaluate(&context).unwrap(), Value::Int32(20));
        context.variables_mut().set("a", Value::Int32(4)).unwrap();
        assert_eq!(expression.evaluate(&context).unwrap(), Value::Int32(8));
    }
}
