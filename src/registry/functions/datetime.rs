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

//! Members of the intrinsic `DateTime`, `TimeSpan` and array types

use crate::evaluator::error::{EvaluationError, EvaluationResult};
use crate::model::{TypeInfo, Value};
use crate::registry::host::{HostMember, HostType, HostTypeRef, parameters};
use crate::registry::signature::FunctionSignature;
use chrono::{Datelike, NaiveDateTime, NaiveTime, TimeDelta, Timelike};

fn date_time(receiver: &Value, member: &str) -> EvaluationResult<NaiveDateTime> {
    match receiver {
        Value::DateTime(dt) => Ok(*dt),
        _ => Err(EvaluationError::host(member, "receiver is not a DateTime")),
    }
}

fn time_span(receiver: &Value, member: &str) -> EvaluationResult<TimeDelta> {
    match receiver {
        Value::TimeSpan(span) => Ok(*span),
        _ => Err(EvaluationError::host(member, "receiver is not a TimeSpan")),
    }
}

fn component(name: &'static str, f: fn(&NaiveDateTime) -> u32) -> HostMember {
    HostMember::property(name, TypeInfo::Int32, move |recv| {
        Ok(Value::Int32(f(&date_time(recv, name)?) as i32))
    })
}

/// `AddXxx(Double)` with the unit expressed in milliseconds
fn adder(name: &'static str, unit_millis: f64) -> HostMember {
    HostMember::method(
        name,
        FunctionSignature::new(parameters(&[("value", TypeInfo::Double)]), TypeInfo::DateTime),
        move |recv, args| {
            let amount = args
                .first()
                .and_then(Value::as_f64)
                .ok_or_else(|| EvaluationError::host(name, "invalid argument 0"))?;
            let millis = (amount * unit_millis).round();
            if !millis.is_finite() || millis.abs() > i64::MAX as f64 {
                return Err(EvaluationError::overflow(name));
            }
            TimeDelta::try_milliseconds(millis as i64)
                .and_then(|delta| date_time(recv, name).ok()?.checked_add_signed(delta))
                .map(Value::DateTime)
                .ok_or_else(|| EvaluationError::overflow(name))
        },
    )
}

/// Build the member table of the intrinsic `DateTime` type
pub fn date_time_type() -> HostTypeRef {
    HostType::builder("DateTime")
        .member(component("Year", |dt| dt.year() as u32))
        .member(component("Month", |dt| dt.month()))
        .member(component("Day", |dt| dt.day()))
        .member(component("Hour", |dt| dt.hour()))
        .member(component("Minute", |dt| dt.minute()))
        .member(component("Second", |dt| dt.second()))
        .member(component("DayOfYear", |dt| dt.ordinal()))
        .member(HostMember::property("Date", TypeInfo::DateTime, |recv| {
            Ok(Value::DateTime(date_time(recv, "Date")?.date().and_time(NaiveTime::MIN)))
        }))
        .member(adder("AddDays", 86_400_000.0))
        .member(adder("AddHours", 3_600_000.0))
        .member(adder("AddMinutes", 60_000.0))
        .member(adder("AddSeconds", 1_000.0))
        .build()
}

fn span_part(name: &'static str, f: fn(TimeDelta) -> i64) -> HostMember {
    HostMember::property(name, TypeInfo::Int32, move |recv| {
        Ok(Value::Int32(f(time_span(recv, name)?) as i32))
    })
}

fn span_total(name: &'static str, unit_seconds: f64) -> HostMember {
    HostMember::property(name, TypeInfo::Double, move |recv| {
        let span = time_span(recv, name)?;
        let seconds = span.num_seconds() as f64 + span.subsec_nanos() as f64 / 1e9;
        Ok(Value::Double(seconds / unit_seconds))
    })
}

/// Build the member table of the intrinsic `TimeSpan` type
pub fn time_span_type() -> HostTypeRef {
    HostType::builder("TimeSpan")
        .member(span_part("Days", |s| s.num_days()))
        .member(span_part("Hours", |s| s.num_hours() % 24))
        .member(span_part("Minutes", |s| s.num_minutes() % 60))
        .member(span_part("Seconds", |s| s.num_seconds() % 60))
        .member(span_total("TotalDays", 86_400.0))
        .member(span_total("TotalHours", 3_600.0))
        .member(span_total("TotalMinutes", 60.0))
        .member(span_total("TotalSeconds", 1.0))
        .build()
}

/// Build the member table shared by all array types
pub fn array_type() -> HostTypeRef {
    HostType::builder("Array")
        .member(HostMember::property("Length", TypeInfo::Int32, |recv| {
            recv.as_array()
                .map(|arr| Value::Int32(arr.len() as i32))
                .ok_or_else(|| EvaluationError::host("Length", "receiver is not an array"))
        }))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample() -> Value {
        Value::DateTime(
            NaiveDate::from_ymd_opt(2024, 3, 15)
                .unwrap()
                .and_hms_opt(13, 45, 30)
                .unwrap(),
        )
    }

    fn get(ty: &HostTypeRef, name: &str, recv: &Value, args: &[Value]) -> Value {
        ty.members_named(name, true)
            .next()
            .unwrap()
            .invoke(Some(recv), args)
            .unwrap()
    }

    #[test]
    fn test_date_time_components() {
        let ty = date_time_type();
        let dt = sample();
        assert_eq!(get(&ty, "Year", &dt, &[]), Value::Int32(2024));
        assert_eq!(get(&ty, "Hour", &dt, &[]), Value::Int32(13));
        assert_eq!(get(&ty, "DayOfYear", &dt, &[]), Value::Int32(75));
        assert_eq!(
            get(&ty, "Date", &dt, &[]),
            Value::DateTime(
                NaiveDate::from_ymd_opt(2024, 3, 15)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap()
            )
        );
    }

    #[test]
    fn test_add_days() {
        let ty = date_time_type();
        let shifted = get(&ty, "AddDays", &sample(), &[Value::Double(1.5)]);
        assert_eq!(
            shifted,
            Value::DateTime(
                NaiveDate::from_ymd_opt(2024, 3, 17)
                    .unwrap()
                    .and_hms_opt(1, 45, 30)
                    .unwrap()
            )
        );
    }

    #[test]
    fn test_time_span_members() {
        let ty = time_span_type();
        let span = Value::TimeSpan(TimeDelta::hours(26) + TimeDelta::minutes(30));
        assert_eq!(get(&ty, "Days", &span, &[]), Value::Int32(1));
        assert_eq!(get(&ty, "Hours", &span, &[]), Value::Int32(2));
        assert_eq!(get(&ty, "TotalHours", &span, &[]), Value::Double(26.5));
    }

    #[test]
    fn test_array_length() {
        let ty = array_type();
        let arr = Value::array(TypeInfo::Int32, vec![Value::Int32(1), Value::Int32(2)]);
        assert_eq!(get(&ty, "Length", &arr, &[]), Value::Int32(2));
    }
}
