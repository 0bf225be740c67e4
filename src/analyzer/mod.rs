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

//! Semantic analysis: name resolution, typing and constant folding

pub mod element;
pub mod expression_analyzer;
pub mod literal;
pub mod symbol_resolver;
pub mod type_analyzer;

pub use element::{CompareKind, Element, ElementKind, TemporalOp};
pub use expression_analyzer::{AnalysisResult, ExpressionAnalyzer};
pub use symbol_resolver::{
    Dependency, DependencyKind, EmptyCatalog, LookupScope, MemberLookup, NameCatalog,
    SymbolResolver,
};
pub use type_analyzer::{BinaryTyping, TypeAnalyzer, UnaryTyping};
