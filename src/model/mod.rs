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

//! Data model for expression values
//!
//! This module provides the static type tags attached to compiled elements,
//! the dynamically tagged runtime [`Value`], and the conversion rules that
//! connect the two.

pub mod type_coercion;
pub mod types;
pub mod value;

pub use type_coercion::TypeCoercion;
pub use types::{NumericKind, ScalarKind, TypeInfo};
pub use value::{ArrayValue, FromValue, Value, format_time_span};
