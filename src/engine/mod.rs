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

//! Incremental recalculation engine
//!
//! A [`ComputeInstance`] owns variables and named expressions; the
//! [`DependencyGraph`] records which names each expression reads so that
//! changes reach exactly the affected results.

mod compute;
mod graph;
mod result;
mod shared;

pub use compute::ComputeInstance;
pub use graph::{DependencyGraph, DependencyNode, NodeId, NodeKind};
pub use result::ExpressionResult;
pub use shared::SharedComputeInstance;
