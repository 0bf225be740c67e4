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

//! The `Math` host type: static numeric helpers importable into expressions

use crate::evaluator::error::{EvaluationError, EvaluationResult};
use crate::model::{TypeInfo, Value};
use crate::registry::host::{HostMember, HostType, HostTypeRef, argument, parameters};
use crate::registry::signature::FunctionSignature;
use rust_decimal::Decimal;

fn unary(ty: TypeInfo, ret: TypeInfo) -> FunctionSignature {
    FunctionSignature::new(parameters(&[("value", ty)]), ret)
}

fn binary(ty: TypeInfo) -> FunctionSignature {
    FunctionSignature::new(parameters(&[("a", ty.clone()), ("b", ty.clone())]), ty)
}

fn double_fn(name: &'static str, f: fn(f64) -> f64) -> HostMember {
    HostMember::static_method(
        name,
        unary(TypeInfo::Double, TypeInfo::Double),
        move |args| Ok(Value::Double(f(argument(args, 0, name)?))),
    )
}

fn decimal_fn(name: &'static str, f: fn(Decimal) -> Decimal) -> HostMember {
    HostMember::static_method(
        name,
        unary(TypeInfo::Decimal, TypeInfo::Decimal),
        move |args| Ok(Value::Decimal(f(argument(args, 0, name)?))),
    )
}

fn abs_overloads() -> [HostMember; 4] {
    [
        HostMember::static_method("Abs", unary(TypeInfo::Int32, TypeInfo::Int32), |args| {
            let v: i32 = argument(args, 0, "Abs")?;
            v.checked_abs()
                .map(Value::Int32)
                .ok_or_else(|| EvaluationError::overflow("Math.Abs(Int32)"))
        }),
        HostMember::static_method("Abs", unary(TypeInfo::Int64, TypeInfo::Int64), |args| {
            let v: i64 = argument(args, 0, "Abs")?;
            v.checked_abs()
                .map(Value::Int64)
                .ok_or_else(|| EvaluationError::overflow("Math.Abs(Int64)"))
        }),
        double_fn("Abs", f64::abs),
        decimal_fn("Abs", |d| d.abs()),
    ]
}

fn extremum_overloads(name: &'static str, take_max: bool) -> [HostMember; 4] {
    fn pick<T: PartialOrd>(a: T, b: T, take_max: bool) -> T {
        if (a >= b) == take_max { a } else { b }
    }
    [
        HostMember::static_method(name, binary(TypeInfo::Int32), move |args| {
            let (a, b): (i32, i32) = (argument(args, 0, name)?, argument(args, 1, name)?);
            Ok(Value::Int32(pick(a, b, take_max)))
        }),
        HostMember::static_method(name, binary(TypeInfo::Int64), move |args| {
            let (a, b): (i64, i64) = (argument(args, 0, name)?, argument(args, 1, name)?);
            Ok(Value::Int64(pick(a, b, take_max)))
        }),
        HostMember::static_method(name, binary(TypeInfo::Double), move |args| {
            let (a, b): (f64, f64) = (argument(args, 0, name)?, argument(args, 1, name)?);
            if a.is_nan() || b.is_nan() {
                return Ok(Value::Double(f64::NAN));
            }
            Ok(Value::Double(pick(a, b, take_max)))
        }),
        HostMember::static_method(name, binary(TypeInfo::Decimal), move |args| {
            let (a, b): (Decimal, Decimal) = (argument(args, 0, name)?, argument(args, 1, name)?);
            Ok(Value::Decimal(pick(a, b, take_max)))
        }),
    ]
}

fn sign_overloads() -> [HostMember; 4] {
    fn sign(name: &'static str, ty: TypeInfo, f: fn(&Value) -> Option<i32>) -> HostMember {
        HostMember::static_method(name, unary(ty, TypeInfo::Int32), move |args| {
            args.first()
                .and_then(f)
                .map(Value::Int32)
                .ok_or_else(|| EvaluationError::host(name, "value is not a number"))
        })
    }
    [
        sign("Sign", TypeInfo::Int32, |v| match v {
            Value::Int32(i) => Some(i.signum()),
            _ => None,
        }),
        sign("Sign", TypeInfo::Int64, |v| match v {
            Value::Int64(i) => Some(i.signum() as i32),
            _ => None,
        }),
        sign("Sign", TypeInfo::Double, |v| match v {
            Value::Double(d) if d.is_nan() => None,
            Value::Double(d) if *d == 0.0 => Some(0),
            Value::Double(d) => Some(if *d > 0.0 { 1 } else { -1 }),
            _ => None,
        }),
        sign("Sign", TypeInfo::Decimal, |v| match v {
            Value::Decimal(d) if d.is_zero() => Some(0),
            Value::Decimal(d) => Some(if d.is_sign_negative() { -1 } else { 1 }),
            _ => None,
        }),
    ]
}

fn round_digits(value: f64, digits: i32) -> EvaluationResult<f64> {
    if !(0..=15).contains(&digits) {
        return Err(EvaluationError::host("Round", "digits must be between 0 and 15"));
    }
    let scale = 10f64.powi(digits);
    Ok((value * scale).round_ties_even() / scale)
}

/// Build the `Math` host type
pub fn math_type() -> HostTypeRef {
    let mut builder = HostType::builder("Math")
        .member(HostMember::constant("PI", Value::Double(std::f64::consts::PI)))
        .member(HostMember::constant("E", Value::Double(std::f64::consts::E)));

    let members = abs_overloads()
        .into_iter()
        .chain(extremum_overloads("Max", true))
        .chain(extremum_overloads("Min", false))
        .chain(sign_overloads())
        .chain([
            double_fn("Round", f64::round_ties_even),
            decimal_fn("Round", |d| d.round()),
            HostMember::static_method(
                "Round",
                FunctionSignature::new(
                    parameters(&[("value", TypeInfo::Double), ("digits", TypeInfo::Int32)]),
                    TypeInfo::Double,
                ),
                |args| {
                    let value: f64 = argument(args, 0, "Round")?;
                    Ok(Value::Double(round_digits(value, argument(args, 1, "Round")?)?))
                },
            ),
            HostMember::static_method(
                "Round",
                FunctionSignature::new(
                    parameters(&[("value", TypeInfo::Decimal), ("digits", TypeInfo::Int32)]),
                    TypeInfo::Decimal,
                ),
                |args| {
                    let value: Decimal = argument(args, 0, "Round")?;
                    let digits: i32 = argument(args, 1, "Round")?;
                    let digits = u32::try_from(digits)
                        .ok()
                        .filter(|d| *d <= 28)
                        .ok_or_else(|| EvaluationError::host("Round", "digits must be between 0 and 28"))?;
                    Ok(Value::Decimal(value.round_dp(digits)))
                },
            ),
            double_fn("Floor", f64::floor),
            decimal_fn("Floor", |d| d.floor()),
            double_fn("Ceiling", f64::ceil),
            decimal_fn("Ceiling", |d| d.ceil()),
            double_fn("Truncate", f64::trunc),
            decimal_fn("Truncate", |d| d.trunc()),
            double_fn("Sqrt", f64::sqrt),
            double_fn("Sin", f64::sin),
            double_fn("Cos", f64::cos),
            double_fn("Tan", f64::tan),
            double_fn("Log", f64::ln),
            double_fn("Log10", f64::log10),
            double_fn("Exp", f64::exp),
            HostMember::static_method(
                "Log",
                FunctionSignature::new(
                    parameters(&[("value", TypeInfo::Double), ("base", TypeInfo::Double)]),
                    TypeInfo::Double,
                ),
                |args| {
                    let value: f64 = argument(args, 0, "Log")?;
                    let base: f64 = argument(args, 1, "Log")?;
                    Ok(Value::Double(value.log(base)))
                },
            ),
            HostMember::static_method("Pow", binary(TypeInfo::Double), |args| {
                let x: f64 = argument(args, 0, "Pow")?;
                let y: f64 = argument(args, 1, "Pow")?;
                Ok(Value::Double(x.powf(y)))
            }),
        ]);

    for member in members {
        builder = builder.member(member);
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: &[Value]) -> EvaluationResult<Value> {
        let math = math_type();
        let types: Vec<TypeInfo> = args.iter().map(Value::type_info).collect();
        let member = math
            .members_named(name, true)
            .find(|m| {
                m.signature()
                    .parameters
                    .iter()
                    .map(|p| p.param_type.clone())
                    .eq(types.iter().cloned())
            })
            .unwrap();
        member.invoke(None, args)
    }

    #[test]
    fn test_abs() {
        assert_eq!(call("Abs", &[Value::Int32(-3)]).unwrap(), Value::Int32(3));
        assert_eq!(call("Abs", &[Value::Double(-1.5)]).unwrap(), Value::Double(1.5));
        assert!(matches!(
            call("Abs", &[Value::Int32(i32::MIN)]),
            Err(EvaluationError::Overflow { .. })
        ));
    }

    #[test]
    fn test_extremum() {
        assert_eq!(
            call("Max", &[Value::Int64(3), Value::Int64(9)]).unwrap(),
            Value::Int64(9)
        );
        assert_eq!(
            call("Min", &[Value::Double(3.0), Value::Double(-9.0)]).unwrap(),
            Value::Double(-9.0)
        );
    }

    #[test]
    fn test_round_uses_bankers_rounding() {
        assert_eq!(call("Round", &[Value::Double(2.5)]).unwrap(), Value::Double(2.0));
        assert_eq!(call("Round", &[Value::Double(3.5)]).unwrap(), Value::Double(4.0));
        assert_eq!(
            call("Round", &[Value::Double(1.2345), Value::Int32(2)]).unwrap(),
            Value::Double(1.23)
        );
    }

    #[test]
    fn test_sign() {
        assert_eq!(call("Sign", &[Value::Double(-0.5)]).unwrap(), Value::Int32(-1));
        assert_eq!(call("Sign", &[Value::Int64(0)]).unwrap(), Value::Int32(0));
        assert!(call("Sign", &[Value::Double(f64::NAN)]).is_err());
    }

    #[test]
    fn test_constants() {
        let math = math_type();
        let pi = math.members_named("pi", false).next().unwrap();
        assert!(pi.is_static());
        assert_eq!(
            pi.invoke(None, &[]).unwrap(),
            Value::Double(std::f64::consts::PI)
        );
    }
}
