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

//! Literal typing
//!
//! Integer literals take the narrowest type their suffix allows:
//!
//! | suffix | candidates |
//! |---|---|
//! | none | `Int32`, `UInt32`, `Int64`, `UInt64` |
//! | `u` | `UInt32`, `UInt64` |
//! | `l` | `Int64`, `UInt64` |
//! | `ul` | `UInt64` |
//!
//! Real literals follow their suffix, or the configured default type.

use crate::ast::{IntegerSuffix, LiteralValue, RealSuffix};
use crate::diagnostics::{CompileError, CompileResult};
use crate::evaluator::options::{ExpressionOptions, RealLiteralType};
use crate::model::Value;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use rust_decimal::Decimal;
use std::str::FromStr;

const DATE_ONLY_FORMAT: &str = "%Y-%m-%d";

/// Typed value of a literal
pub fn literal_value(literal: &LiteralValue, options: &ExpressionOptions) -> CompileResult<Value> {
    match literal {
        LiteralValue::Boolean(b) => Ok(Value::Boolean(*b)),
        LiteralValue::Integer { digits, hex, suffix } => {
            integer_value(digits, *hex, *suffix, options)
        }
        LiteralValue::Real { text, suffix } => real_value(text, *suffix, options),
        LiteralValue::String(s) => Ok(Value::string(s)),
        LiteralValue::Char(c) => Ok(Value::Char(*c)),
        LiteralValue::DateTime(text) => date_time_value(text, &options.date_time_format),
        LiteralValue::TimeSpan(text) => time_span_value(text),
        LiteralValue::Null => Ok(Value::Null),
    }
}

fn parse_magnitude(digits: &str, hex: bool) -> CompileResult<u128> {
    let radix = if hex { 16 } else { 10 };
    u128::from_str_radix(digits, radix).map_err(|_| {
        CompileError::constant_overflow(format!("Integer literal '{digits}' is too large"))
    })
}

fn too_large(digits: &str, suffix: IntegerSuffix) -> CompileError {
    let description = match suffix {
        IntegerSuffix::None => "any integral type",
        IntegerSuffix::Unsigned => "UInt32 or UInt64",
        IntegerSuffix::Long => "Int64 or UInt64",
        IntegerSuffix::UnsignedLong => "UInt64",
    };
    CompileError::constant_overflow(format!(
        "Integer literal '{digits}' does not fit {description}"
    ))
}

/// Type an integer literal by its suffix
pub fn integer_value(
    digits: &str,
    hex: bool,
    suffix: IntegerSuffix,
    options: &ExpressionOptions,
) -> CompileResult<Value> {
    let magnitude = parse_magnitude(digits, hex)?;
    if options.integers_as_doubles && suffix == IntegerSuffix::None {
        return Ok(Value::Double(magnitude as f64));
    }

    let value = match suffix {
        IntegerSuffix::None => i32::try_from(magnitude)
            .map(Value::Int32)
            .or_else(|_| u32::try_from(magnitude).map(Value::UInt32))
            .or_else(|_| i64::try_from(magnitude).map(Value::Int64))
            .or_else(|_| u64::try_from(magnitude).map(Value::UInt64)),
        IntegerSuffix::Unsigned => u32::try_from(magnitude)
            .map(Value::UInt32)
            .or_else(|_| u64::try_from(magnitude).map(Value::UInt64)),
        IntegerSuffix::Long => i64::try_from(magnitude)
            .map(Value::Int64)
            .or_else(|_| u64::try_from(magnitude).map(Value::UInt64)),
        IntegerSuffix::UnsignedLong => u64::try_from(magnitude).map(Value::UInt64),
    };
    value.map_err(|_| too_large(digits, suffix))
}

/// Type a negated signed integer literal
///
/// Folding the sign into the literal lets `-2147483648` be `Int32::MIN` and
/// `-9223372036854775808` be `Int64::MIN`. Returns `None` for unsigned
/// suffixes, which negate through ordinary promotion.
pub fn negative_integer_value(
    digits: &str,
    hex: bool,
    suffix: IntegerSuffix,
    options: &ExpressionOptions,
) -> Option<CompileResult<Value>> {
    let magnitude = match parse_magnitude(digits, hex) {
        Ok(m) => m,
        Err(e) => return Some(Err(e)),
    };
    if magnitude > u128::from(u64::MAX) {
        return Some(Err(too_large(digits, suffix)));
    }
    let negative = -(magnitude as i128);

    let value = match suffix {
        IntegerSuffix::None if options.integers_as_doubles => Ok(Value::Double(negative as f64)),
        IntegerSuffix::None => i32::try_from(negative)
            .map(Value::Int32)
            .or_else(|_| i64::try_from(negative).map(Value::Int64)),
        IntegerSuffix::Long => i64::try_from(negative).map(Value::Int64),
        IntegerSuffix::Unsigned | IntegerSuffix::UnsignedLong => return None,
    };
    Some(value.map_err(|_| {
        CompileError::constant_overflow(format!("Integer literal '-{digits}' is too small"))
    }))
}

/// Type a real literal by its suffix or the configured default
pub fn real_value(
    text: &str,
    suffix: Option<RealSuffix>,
    options: &ExpressionOptions,
) -> CompileResult<Value> {
    let target = match suffix {
        Some(RealSuffix::Single) => RealLiteralType::Single,
        Some(RealSuffix::Double) => RealLiteralType::Double,
        Some(RealSuffix::Decimal) => RealLiteralType::Decimal,
        None => options.real_literal_type,
    };
    let overflow = || CompileError::constant_overflow(format!("Real literal '{text}' is out of range"));
    let format = || CompileError::invalid_format(format!("Invalid real literal '{text}'"));

    match target {
        RealLiteralType::Single => {
            let v: f32 = text.parse().map_err(|_| format())?;
            if v.is_infinite() { Err(overflow()) } else { Ok(Value::Single(v)) }
        }
        RealLiteralType::Double => {
            let v: f64 = text.parse().map_err(|_| format())?;
            if v.is_infinite() { Err(overflow()) } else { Ok(Value::Double(v)) }
        }
        RealLiteralType::Decimal => {
            let parsed = if text.contains(['e', 'E']) {
                Decimal::from_scientific(text)
            } else {
                Decimal::from_str(text)
            };
            parsed.map(Value::Decimal).map_err(|_| overflow())
        }
    }
}

/// Parse a date-time literal with the configured format, falling back to a bare date
pub fn date_time_value(text: &str, format: &str) -> CompileResult<Value> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, format)
        .or_else(|_| {
            NaiveDate::parse_from_str(text, DATE_ONLY_FORMAT).map(|d| d.and_time(NaiveTime::MIN))
        })
        .map(Value::DateTime)
        .map_err(|_| {
            CompileError::invalid_format(format!(
                "Date-time literal '{text}' does not match format '{format}'"
            ))
        })
}

fn bounded(part: &str, max: i64) -> Option<i64> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse::<i64>().ok().filter(|v| *v < max)
}

/// Parse a time-span literal of the form `[-][d.]hh:mm[:ss[.fffffff]]`
pub fn time_span_value(text: &str) -> CompileResult<Value> {
    parse_time_span(text.trim()).map(Value::TimeSpan).ok_or_else(|| {
        CompileError::invalid_format(format!(
            "Time-span literal '{text}' is not of the form [-][d.]hh:mm[:ss[.fffffff]]"
        ))
    })
}

fn parse_time_span(text: &str) -> Option<TimeDelta> {
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };

    let colon = body.find(':')?;
    let (days, clock) = match body.find('.') {
        Some(dot) if dot < colon => (bounded(&body[..dot], i64::MAX)?, &body[dot + 1..]),
        _ => (0, body),
    };

    let mut parts = clock.split(':');
    let hours = bounded(parts.next()?, 24)?;
    let minutes = bounded(parts.next()?, 60)?;
    let (seconds, ticks) = match parts.next() {
        Some(sec) => match sec.split_once('.') {
            Some((whole, fraction)) => {
                if fraction.is_empty() || fraction.len() > 7 {
                    return None;
                }
                let scale = 10_i64.pow(7 - fraction.len() as u32);
                (bounded(whole, 60)?, bounded(fraction, i64::MAX)? * scale)
            }
            None => (bounded(sec, 60)?, 0),
        },
        None => (0, 0),
    };
    if parts.next().is_some() {
        return None;
    }

    let span = TimeDelta::try_days(days)?
        .checked_add(&TimeDelta::hours(hours))?
        .checked_add(&TimeDelta::minutes(minutes))?
        .checked_add(&TimeDelta::seconds(seconds))?
        .checked_add(&TimeDelta::nanoseconds(ticks * 100))?;
    Some(if negative { -span } else { span })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CompileErrorReason;
    use rstest::rstest;

    fn options() -> ExpressionOptions {
        ExpressionOptions::default()
    }

    #[rstest]
    #[case("2147483647", IntegerSuffix::None, Value::Int32(i32::MAX))]
    #[case("2147483648", IntegerSuffix::None, Value::UInt32(2_147_483_648))]
    #[case("4294967296", IntegerSuffix::None, Value::Int64(4_294_967_296))]
    #[case("9223372036854775808", IntegerSuffix::None, Value::UInt64(9_223_372_036_854_775_808))]
    #[case("1", IntegerSuffix::Unsigned, Value::UInt32(1))]
    #[case("4294967296", IntegerSuffix::Unsigned, Value::UInt64(4_294_967_296))]
    #[case("1", IntegerSuffix::Long, Value::Int64(1))]
    #[case("9223372036854775808", IntegerSuffix::Long, Value::UInt64(9_223_372_036_854_775_808))]
    #[case("1", IntegerSuffix::UnsignedLong, Value::UInt64(1))]
    fn test_integer_suffix_rules(
        #[case] digits: &str,
        #[case] suffix: IntegerSuffix,
        #[case] expected: Value,
    ) {
        assert_eq!(integer_value(digits, false, suffix, &options()).unwrap(), expected);
    }

    #[test]
    fn test_integer_overflow() {
        let err = integer_value("18446744073709551616", false, IntegerSuffix::None, &options())
            .unwrap_err();
        assert_eq!(err.reason, CompileErrorReason::ConstantOverflow);
    }

    #[test]
    fn test_negative_folding() {
        let opts = options();
        assert_eq!(
            negative_integer_value("2147483648", false, IntegerSuffix::None, &opts)
                .unwrap()
                .unwrap(),
            Value::Int32(i32::MIN)
        );
        assert_eq!(
            negative_integer_value("9223372036854775808", false, IntegerSuffix::None, &opts)
                .unwrap()
                .unwrap(),
            Value::Int64(i64::MIN)
        );
        assert!(negative_integer_value("1", false, IntegerSuffix::Unsigned, &opts).is_none());
    }

    #[test]
    fn test_real_defaults_and_suffixes() {
        let opts = options();
        assert_eq!(real_value("1.5", None, &opts).unwrap(), Value::Double(1.5));
        assert_eq!(
            real_value("1.5", Some(RealSuffix::Single), &opts).unwrap(),
            Value::Single(1.5)
        );
        assert_eq!(
            real_value("1.25", Some(RealSuffix::Decimal), &opts).unwrap(),
            Value::Decimal(Decimal::new(125, 2))
        );
        let spreadsheet = ExpressionOptions::spreadsheet();
        assert_eq!(
            real_value("2.5", None, &spreadsheet).unwrap(),
            Value::Decimal(Decimal::new(25, 1))
        );
        assert_eq!(
            integer_value("3", false, IntegerSuffix::None, &spreadsheet).unwrap(),
            Value::Double(3.0)
        );
    }

    #[test]
    fn test_time_span_forms() {
        assert_eq!(
            time_span_value("01:30").unwrap(),
            Value::TimeSpan(TimeDelta::minutes(90))
        );
        assert_eq!(
            time_span_value("-2.00:00:01.5").unwrap(),
            Value::TimeSpan(-(TimeDelta::days(2) + TimeDelta::milliseconds(1500)))
        );
        for bad in ["", "25:00", "1:2:3:4", "ab:cd", "00:00:00.12345678"] {
            assert_eq!(
                time_span_value(bad).unwrap_err().reason,
                CompileErrorReason::InvalidFormat,
                "{bad}"
            );
        }
    }

    #[test]
    fn test_date_time_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();
        assert_eq!(
            date_time_value("2024-03-01 08:30:00", "%Y-%m-%d %H:%M:%S").unwrap(),
            Value::DateTime(expected)
        );
        assert!(matches!(
            date_time_value("2024-03-01", "%Y-%m-%d %H:%M:%S").unwrap(),
            Value::DateTime(_)
        ));
        assert_eq!(
            date_time_value("March first", "%Y-%m-%d").unwrap_err().reason,
            CompileErrorReason::InvalidFormat
        );
    }
}
