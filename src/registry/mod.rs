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

//! Host type registry for expressions
//!
//! This module describes everything an expression can reach besides
//! variables and other expressions: host types and their members, member
//! signatures with overload scoring, imported namespaces, and the built-in
//! type tables.

pub mod builtin;
pub mod functions;
pub mod host;
pub mod imports;
pub mod signature;

pub use host::{
    Accessibility, HostMember, HostObject, HostType, HostTypeBuilder, HostTypeRef, MemberKind,
};
pub use imports::{ImportError, ImportRegistry, Namespace};
pub use signature::{ArgumentBinding, FunctionSignature, ParamArrayBinding, ParameterInfo};
