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

//! Process-wide tables of built-in types
//!
//! Built once on first use and read-only afterwards.

use super::functions;
use super::host::HostTypeRef;
use crate::model::TypeInfo;
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

static BUILTIN_TYPES: Lazy<FxHashMap<&'static str, TypeInfo>> = Lazy::new(|| {
    let table: [(&[&'static str], TypeInfo); 17] = [
        (&["bool", "boolean"], TypeInfo::Boolean),
        (&["char"], TypeInfo::Char),
        (&["sbyte"], TypeInfo::SByte),
        (&["byte"], TypeInfo::Byte),
        (&["short", "int16"], TypeInfo::Int16),
        (&["ushort", "uint16"], TypeInfo::UInt16),
        (&["int", "int32"], TypeInfo::Int32),
        (&["uint", "uint32"], TypeInfo::UInt32),
        (&["long", "int64"], TypeInfo::Int64),
        (&["ulong", "uint64"], TypeInfo::UInt64),
        (&["float", "single"], TypeInfo::Single),
        (&["double"], TypeInfo::Double),
        (&["decimal"], TypeInfo::Decimal),
        (&["string"], TypeInfo::String),
        (&["datetime"], TypeInfo::DateTime),
        (&["timespan"], TypeInfo::TimeSpan),
        (&["object"], TypeInfo::Object),
    ];

    let mut types = FxHashMap::default();
    for (names, ty) in table {
        for name in names {
            types.insert(*name, ty.clone());
        }
    }
    types
});

static STRING_MEMBERS: Lazy<HostTypeRef> = Lazy::new(functions::string_type);
static DATE_TIME_MEMBERS: Lazy<HostTypeRef> = Lazy::new(functions::date_time_type);
static TIME_SPAN_MEMBERS: Lazy<HostTypeRef> = Lazy::new(functions::time_span_type);
static ARRAY_MEMBERS: Lazy<HostTypeRef> = Lazy::new(functions::array_type);
static MATH: Lazy<HostTypeRef> = Lazy::new(functions::math_type);

/// Look up a built-in type by keyword or framework name, ignoring case
pub fn builtin_type(name: &str) -> Option<TypeInfo> {
    BUILTIN_TYPES.get(name.to_ascii_lowercase().as_str()).cloned()
}

/// Member table for values of the given static type
pub fn member_table(ty: &TypeInfo) -> Option<HostTypeRef> {
    match ty {
        TypeInfo::Host(host) => Some(host.clone()),
        TypeInfo::String => Some(STRING_MEMBERS.clone()),
        TypeInfo::DateTime => Some(DATE_TIME_MEMBERS.clone()),
        TypeInfo::TimeSpan => Some(TIME_SPAN_MEMBERS.clone()),
        TypeInfo::Array(_) => Some(ARRAY_MEMBERS.clone()),
        _ => None,
    }
}

/// The shared `Math` host type
pub fn math() -> HostTypeRef {
    MATH.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_type_aliases() {
        assert_eq!(builtin_type("int"), Some(TypeInfo::Int32));
        assert_eq!(builtin_type("Int32"), Some(TypeInfo::Int32));
        assert_eq!(builtin_type("ULONG"), Some(TypeInfo::UInt64));
        assert_eq!(builtin_type("widget"), None);
    }

    #[test]
    fn test_member_tables_are_shared() {
        let a = member_table(&TypeInfo::String).unwrap();
        let b = member_table(&TypeInfo::String).unwrap();
        assert_eq!(a, b);
        assert!(member_table(&TypeInfo::Int32).is_none());
        assert_eq!(math(), math());
    }
}
