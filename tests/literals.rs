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

//! Literal typing and overflow policy through the public API

use chrono::{NaiveDate, TimeDelta};
use pretty_assertions::assert_eq;
use reckon::{
    CalcError, CompileErrorReason, ComputeInstance, EvaluationError, ExpressionOptions,
    RealLiteralType, TypeInfo, Value,
};
use rstest::rstest;
use rust_decimal::Decimal;
use std::str::FromStr;

fn result(options: ExpressionOptions, text: &str) -> Value {
    let mut instance = ComputeInstance::new(options);
    instance.add_expression("x", text).unwrap();
    instance.get_result("x").unwrap().clone()
}

#[rstest]
#[case("42", Value::Int32(42))]
#[case("2147483648", Value::UInt32(2_147_483_648))]
#[case("4294967296", Value::Int64(4_294_967_296))]
#[case("9223372036854775808", Value::UInt64(9_223_372_036_854_775_808))]
#[case("42u", Value::UInt32(42))]
#[case("4294967296u", Value::UInt64(4_294_967_296))]
#[case("42L", Value::Int64(42))]
#[case("42UL", Value::UInt64(42))]
#[case("0xFF", Value::Int32(255))]
#[case("0xFFFFFFFF", Value::UInt32(u32::MAX))]
#[case("-2147483648", Value::Int32(i32::MIN))]
#[case("-9223372036854775808", Value::Int64(i64::MIN))]
#[case("1.5", Value::Double(1.5))]
#[case("1.5f", Value::Single(1.5))]
#[case("7d", Value::Double(7.0))]
#[case("'q'", Value::Char('q'))]
#[case("\"text\"", Value::string("text"))]
#[case("true", Value::Boolean(true))]
fn test_literal_types(#[case] text: &str, #[case] expected: Value) {
    let value = result(ExpressionOptions::default(), text);
    assert_eq!(value.type_info(), expected.type_info());
    assert_eq!(value, expected);
}

#[test]
fn test_decimal_literals() {
    let expected = Value::Decimal(Decimal::from_str("1.25").unwrap());
    assert_eq!(result(ExpressionOptions::default(), "1.25m"), expected);
    assert_eq!(
        result(
            ExpressionOptions::default().with_real_literal_type(RealLiteralType::Decimal),
            "1.25"
        ),
        expected
    );
}

#[test]
fn test_temporal_literals() {
    let date = NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    assert_eq!(result(ExpressionOptions::default(), "#2024-01-02#"), Value::DateTime(date));

    let span = TimeDelta::days(1) + TimeDelta::hours(2) + TimeDelta::minutes(3);
    assert_eq!(result(ExpressionOptions::default(), "##1.02:03#"), Value::TimeSpan(span));
}

#[test]
fn test_literal_overflow_is_compile_error() {
    let mut instance = ComputeInstance::default();
    let err = instance
        .add_expression("x", "18446744073709551616")
        .unwrap_err();
    assert_eq!(
        err.as_compile_error().map(|e| e.reason),
        Some(CompileErrorReason::ConstantOverflow)
    );
}

#[test]
fn test_checked_constant_overflow() {
    let mut instance = ComputeInstance::new(ExpressionOptions::default().with_checked(true));
    let err = instance.add_expression("x", "2147483647 + 1").unwrap_err();
    assert_eq!(
        err.as_compile_error().map(|e| e.reason),
        Some(CompileErrorReason::ConstantOverflow)
    );
    assert_eq!(instance.expression_count(), 0);
}

#[test]
fn test_checked_runtime_overflow() {
    let mut instance = ComputeInstance::new(ExpressionOptions::default().with_checked(true));
    instance.set_value("big", i32::MAX).unwrap();
    assert!(matches!(
        instance.add_expression("x", "big + 1"),
        Err(CalcError::Evaluation(EvaluationError::Overflow { .. }))
    ));

    instance.set_value("big", 1).unwrap();
    instance.add_expression("x", "big + 1").unwrap();
    assert!(matches!(
        instance.set_value("big", i32::MAX),
        Err(CalcError::Evaluation(EvaluationError::Overflow { .. }))
    ));
}

#[test]
fn test_unchecked_wraps() {
    assert_eq!(
        result(ExpressionOptions::default(), "2147483647 + 1"),
        Value::Int32(i32::MIN)
    );

    let mut instance = ComputeInstance::default();
    instance.set_value("big", i32::MAX).unwrap();
    instance.add_expression("x", "big + 1").unwrap();
    assert_eq!(instance.get_result("x").unwrap(), &Value::Int32(i32::MIN));
}

#[test]
fn test_result_type_conversion() {
    let mut instance = ComputeInstance::default();
    instance.add_expression_as("x", "1 + 2", TypeInfo::Double).unwrap();
    assert_eq!(instance.get_result("x").unwrap(), &Value::Double(3.0));

    let err = instance
        .add_expression_as("y", "\"a\"", TypeInfo::Int32)
        .unwrap_err();
    assert_eq!(
        err.as_compile_error().map(|e| e.reason),
        Some(CompileErrorReason::TypeMismatch)
    );
}
