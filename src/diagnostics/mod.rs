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

//! Diagnostic types for expression compilation
//!
//! Compile failures are reported with a reason code from a closed taxonomy
//! so callers can react to the kind of failure without parsing messages.

pub mod diagnostic;

pub use diagnostic::{CompileError, CompileErrorReason, CompileResult};
