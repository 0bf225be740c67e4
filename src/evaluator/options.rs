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

//! Construction-time options for expression compilation and recalculation

use crate::registry::Accessibility;
use serde::{Deserialize, Serialize};

/// Default chrono format for date-time literals
pub const DEFAULT_DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// When dependents of a changed value are recalculated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RecalculationMode {
    /// Dependents keep their values until recalculated explicitly
    Never,
    /// Dependents are recalculated immediately, in dependency order
    #[default]
    Auto,
    /// Dependents are marked dirty and recalculated when read
    Lazy,
}

/// How strings are compared by comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StringComparison {
    /// Code point order
    #[default]
    Ordinal,
    /// Code point order after lower-casing both sides
    OrdinalIgnoreCase,
}

/// Type given to real literals without a suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RealLiteralType {
    /// 32-bit float
    Single,
    /// 64-bit float
    #[default]
    Double,
    /// 128-bit decimal
    Decimal,
}

/// Expression engine options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpressionOptions {
    /// Recalculation policy of a compute instance
    pub recalculation_mode: RecalculationMode,
    /// Match identifiers and keys case-sensitively
    pub case_sensitive: bool,
    /// String comparison used by `=`, `<>`, `<`, ...
    pub string_comparison: StringComparison,
    /// Report overflow in arithmetic and narrowing casts
    pub checked: bool,
    /// Type of unsuffixed real literals
    pub real_literal_type: RealLiteralType,
    /// chrono format for date-time literals
    pub date_time_format: String,
    /// Treat unsuffixed integer literals as doubles
    pub integers_as_doubles: bool,
    /// Least accessibility an owner member needs to be referenced
    pub owner_member_access: Accessibility,
}

impl Default for ExpressionOptions {
    fn default() -> Self {
        Self {
            recalculation_mode: RecalculationMode::Auto,
            case_sensitive: false,
            string_comparison: StringComparison::Ordinal,
            checked: false,
            real_literal_type: RealLiteralType::Double,
            date_time_format: DEFAULT_DATE_TIME_FORMAT.to_string(),
            integers_as_doubles: false,
            owner_member_access: Accessibility::Public,
        }
    }
}

impl ExpressionOptions {
    /// Create options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Checked arithmetic with case-sensitive names
    pub fn strict() -> Self {
        Self {
            checked: true,
            case_sensitive: true,
            ..Self::default()
        }
    }

    /// Spreadsheet-like numbers: integers as doubles, decimal reals
    pub fn spreadsheet() -> Self {
        Self {
            case_sensitive: false,
            integers_as_doubles: true,
            real_literal_type: RealLiteralType::Decimal,
            ..Self::default()
        }
    }

    /// Set the recalculation mode
    pub fn with_recalculation_mode(mut self, mode: RecalculationMode) -> Self {
        self.recalculation_mode = mode;
        self
    }

    /// Set case sensitivity of names
    pub fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// Set the string comparison mode
    pub fn with_string_comparison(mut self, comparison: StringComparison) -> Self {
        self.string_comparison = comparison;
        self
    }

    /// Enable or disable checked arithmetic
    pub fn with_checked(mut self, checked: bool) -> Self {
        self.checked = checked;
        self
    }

    /// Set the type of unsuffixed real literals
    pub fn with_real_literal_type(mut self, real_type: RealLiteralType) -> Self {
        self.real_literal_type = real_type;
        self
    }

    /// Set the date-time literal format
    pub fn with_date_time_format(mut self, format: impl Into<String>) -> Self {
        self.date_time_format = format.into();
        self
    }

    /// Treat unsuffixed integer literals as doubles
    pub fn with_integers_as_doubles(mut self, enabled: bool) -> Self {
        self.integers_as_doubles = enabled;
        self
    }

    /// Set the least accessibility of reachable owner members
    pub fn with_owner_member_access(mut self, access: Accessibility) -> Self {
        self.owner_member_access = access;
        self
    }

    /// Normalize a name into a lookup key
    pub fn key(&self, name: &str) -> String {
        if self.case_sensitive {
            name.to_string()
        } else {
            name.to_lowercase()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ExpressionOptions::default();
        assert_eq!(options.recalculation_mode, RecalculationMode::Auto);
        assert!(!options.case_sensitive);
        assert!(!options.checked);
        assert_eq!(options.real_literal_type, RealLiteralType::Double);
        assert_eq!(options.date_time_format, DEFAULT_DATE_TIME_FORMAT);
    }

    #[test]
    fn test_key_normalization() {
        assert_eq!(ExpressionOptions::default().key("Total"), "total");
        assert_eq!(ExpressionOptions::strict().key("Total"), "Total");
    }

    #[test]
    fn test_serde_partial_document() {
        let options: ExpressionOptions =
            serde_json::from_str(r#"{"recalculation_mode":"Lazy","checked":true}"#).unwrap();
        assert_eq!(options.recalculation_mode, RecalculationMode::Lazy);
        assert!(options.checked);
        assert_eq!(options.string_comparison, StringComparison::Ordinal);

        let json = serde_json::to_string(&options).unwrap();
        let back: ExpressionOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back, options);
    }
}
