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

//! Members of the intrinsic `String` type

use crate::evaluator::error::{EvaluationError, EvaluationResult};
use crate::model::{TypeInfo, Value};
use crate::registry::host::{HostMember, HostType, HostTypeRef, argument, parameters};
use crate::registry::signature::{FunctionSignature, ParameterInfo};

fn text<'a>(receiver: &'a Value, member: &str) -> EvaluationResult<&'a str> {
    receiver
        .as_str()
        .ok_or_else(|| EvaluationError::host(member, "receiver is not a string"))
}

fn char_index(text: &str, index: i32, allow_end: bool) -> EvaluationResult<usize> {
    let length = text.chars().count();
    let limit = if allow_end { length } else { length.saturating_sub(1) };
    match usize::try_from(index) {
        Ok(i) if i <= limit && (allow_end || length > 0) => Ok(i),
        _ => Err(EvaluationError::IndexOutOfRange {
            index: index as i64,
            length,
        }),
    }
}

fn predicate(name: &'static str, f: fn(&str, &str) -> bool) -> HostMember {
    HostMember::method(
        name,
        FunctionSignature::new(parameters(&[("value", TypeInfo::String)]), TypeInfo::Boolean),
        move |recv, args| {
            let needle: String = argument(args, 0, name)?;
            Ok(Value::Boolean(f(text(recv, name)?, &needle)))
        },
    )
}

fn transform(name: &'static str, f: fn(&str) -> String) -> HostMember {
    HostMember::method(
        name,
        FunctionSignature::nullary(TypeInfo::String),
        move |recv, _| Ok(Value::from(f(text(recv, name)?))),
    )
}

fn substring(s: &str, start: i32, length: Option<i32>) -> EvaluationResult<Value> {
    let start = char_index(s, start, true)?;
    let available = s.chars().count() - start;
    let take = match length {
        None => available,
        Some(len) => match usize::try_from(len) {
            Ok(len) if len <= available => len,
            _ => {
                return Err(EvaluationError::IndexOutOfRange {
                    index: len as i64,
                    length: available,
                });
            }
        },
    };
    Ok(Value::from(s.chars().skip(start).take(take).collect::<String>()))
}

/// Build the member table of the intrinsic `String` type
pub fn string_type() -> HostTypeRef {
    HostType::builder("String")
        .member(HostMember::property("Length", TypeInfo::Int32, |recv| {
            Ok(Value::Int32(text(recv, "Length")?.chars().count() as i32))
        }))
        .member(transform("ToUpper", str::to_uppercase))
        .member(transform("ToLower", str::to_lowercase))
        .member(transform("Trim", |s| s.trim().to_string()))
        .member(HostMember::method(
            "Substring",
            FunctionSignature::new(parameters(&[("start", TypeInfo::Int32)]), TypeInfo::String),
            |recv, args| substring(text(recv, "Substring")?, argument(args, 0, "Substring")?, None),
        ))
        .member(HostMember::method(
            "Substring",
            FunctionSignature::new(
                parameters(&[("start", TypeInfo::Int32), ("length", TypeInfo::Int32)]),
                TypeInfo::String,
            ),
            |recv, args| {
                substring(
                    text(recv, "Substring")?,
                    argument(args, 0, "Substring")?,
                    Some(argument(args, 1, "Substring")?),
                )
            },
        ))
        .member(predicate("Contains", |s, v| s.contains(v)))
        .member(predicate("StartsWith", |s, v| s.starts_with(v)))
        .member(predicate("EndsWith", |s, v| s.ends_with(v)))
        .member(HostMember::method(
            "IndexOf",
            FunctionSignature::new(parameters(&[("value", TypeInfo::String)]), TypeInfo::Int32),
            |recv, args| {
                let s = text(recv, "IndexOf")?;
                let needle: String = argument(args, 0, "IndexOf")?;
                let index = s
                    .find(&needle)
                    .map_or(-1, |byte| s[..byte].chars().count() as i32);
                Ok(Value::Int32(index))
            },
        ))
        .member(HostMember::method(
            "Replace",
            FunctionSignature::new(
                parameters(&[("old", TypeInfo::String), ("new", TypeInfo::String)]),
                TypeInfo::String,
            ),
            |recv, args| {
                let old: String = argument(args, 0, "Replace")?;
                let new: String = argument(args, 1, "Replace")?;
                if old.is_empty() {
                    return Err(EvaluationError::host("Replace", "old value is empty"));
                }
                Ok(Value::from(text(recv, "Replace")?.replace(&old, &new)))
            },
        ))
        .member(HostMember::indexer(
            FunctionSignature::new(parameters(&[("index", TypeInfo::Int32)]), TypeInfo::Char),
            |recv, args| {
                let s = text(recv, "Chars")?;
                let index = char_index(s, argument(args, 0, "Chars")?, false)?;
                s.chars()
                    .nth(index)
                    .map(Value::Char)
                    .ok_or_else(|| EvaluationError::IndexOutOfRange {
                        index: index as i64,
                        length: s.chars().count(),
                    })
            },
        ))
        .member(HostMember::static_method(
            "Concat",
            FunctionSignature::variadic(
                vec![ParameterInfo::params("values", TypeInfo::String)],
                TypeInfo::String,
            ),
            |args| {
                let mut out = String::new();
                if let Some(values) = args.first().and_then(Value::as_array) {
                    for value in values.items() {
                        out.push_str(&value.to_string());
                    }
                }
                Ok(Value::from(out))
            },
        ))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, recv: &str, args: &[Value]) -> EvaluationResult<Value> {
        let ty = string_type();
        let member = ty
            .members_named(name, true)
            .find(|m| m.signature().parameters.len() == args.len())
            .unwrap();
        member.invoke(Some(&Value::from(recv)), args)
    }

    #[test]
    fn test_string_members() {
        assert_eq!(call("Length", "héllo", &[]).unwrap(), Value::Int32(5));
        assert_eq!(call("ToUpper", "abc", &[]).unwrap(), Value::from("ABC"));
        assert_eq!(
            call("Substring", "abcdef", &[Value::Int32(2)]).unwrap(),
            Value::from("cdef")
        );
        assert_eq!(
            call("Substring", "abcdef", &[Value::Int32(1), Value::Int32(3)]).unwrap(),
            Value::from("bcd")
        );
        assert_eq!(
            call("IndexOf", "abcabc", &[Value::from("ca")]).unwrap(),
            Value::Int32(2)
        );
        assert_eq!(
            call("Contains", "abc", &[Value::from("bc")]).unwrap(),
            Value::Boolean(true)
        );
    }

    #[test]
    fn test_substring_out_of_range() {
        assert!(matches!(
            call("Substring", "abc", &[Value::Int32(4)]),
            Err(EvaluationError::IndexOutOfRange { .. })
        ));
        assert!(matches!(
            call("Substring", "abc", &[Value::Int32(1), Value::Int32(5)]),
            Err(EvaluationError::IndexOutOfRange { .. })
        ));
    }

    #[test]
    fn test_indexer() {
        let ty = string_type();
        let indexer = ty.indexers().next().unwrap();
        assert_eq!(
            indexer
                .invoke(Some(&Value::from("xyz")), &[Value::Int32(1)])
                .unwrap(),
            Value::Char('y')
        );
        assert!(indexer
            .invoke(Some(&Value::from("")), &[Value::Int32(0)])
            .is_err());
    }
}
