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

//! Name lookup for identifiers and member chains
//!
//! A bare identifier is looked up, in order, as a member of the owner type,
//! a static member imported into the root namespace, a variable, and a
//! registered expression. Only in the middle of a member chain may a name
//! also denote a namespace or a type.

use crate::evaluator::options::ExpressionOptions;
use crate::model::TypeInfo;
use crate::registry::builtin::{builtin_type, member_table};
use crate::registry::host::names_equal;
use crate::registry::{
    Accessibility, HostMember, HostTypeRef, ImportRegistry, MemberKind, Namespace,
};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Source of variable and expression types consulted during resolution
pub trait NameCatalog {
    /// Static type of the variable stored under `key`
    fn variable_type(&self, key: &str) -> Option<TypeInfo>;

    /// Result type of the expression registered under `key`
    fn expression_type(&self, key: &str) -> Option<TypeInfo>;
}

/// Catalog without variables or expressions
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyCatalog;

impl NameCatalog for EmptyCatalog {
    fn variable_type(&self, _key: &str) -> Option<TypeInfo> {
        None
    }

    fn expression_type(&self, _key: &str) -> Option<TypeInfo> {
        None
    }
}

/// What a referenced name is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DependencyKind {
    /// A variable of the variable store
    Variable,
    /// Another registered expression
    Expression,
}

/// A name an expression reads, recorded during resolution
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Dependency {
    /// Normalized key of the referenced name
    pub key: String,
    /// Variable or expression
    pub kind: DependencyKind,
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)
    }
}

/// Where a member lookup happens
#[derive(Debug, Clone)]
pub enum LookupScope<'a> {
    /// Bare name with no target
    Global,
    /// Inside an imported namespace
    Namespace(&'a Namespace),
    /// Static members of a type
    Type(HostTypeRef),
    /// Instance members of a value of the given type
    Instance(TypeInfo),
}

impl LookupScope<'_> {
    /// Describe the scope for error messages
    pub fn describe(&self) -> String {
        match self {
            Self::Global => "with no target type".to_string(),
            Self::Namespace(ns) => format!("in namespace '{}'", ns.name()),
            Self::Type(ty) => format!("on type {}", ty.name()),
            Self::Instance(ty) => format!("on type {ty}"),
        }
    }
}

/// Member candidates found for a name, with their accessibility rule
pub struct MemberLookup {
    /// Candidate members
    pub candidates: Vec<Arc<HostMember>>,
    /// Least accessibility a candidate needs
    pub required_access: Accessibility,
    /// Candidates are owner members, instance ones bind to the owner
    pub from_owner: bool,
}

impl MemberLookup {
    fn new(candidates: Vec<Arc<HostMember>>, required_access: Accessibility, from_owner: bool) -> Self {
        Self {
            candidates,
            required_access,
            from_owner,
        }
    }

    /// Check if a candidate may be referenced
    pub fn is_accessible(&self, member: &HostMember) -> bool {
        member.access() >= self.required_access
    }
}

/// Resolves names against the owner, imports and catalog
pub struct SymbolResolver<'a> {
    options: &'a ExpressionOptions,
    imports: &'a ImportRegistry,
    owner_type: Option<HostTypeRef>,
    catalog: &'a dyn NameCatalog,
}

fn is_callable(kind: MemberKind) -> bool {
    kind == MemberKind::Method
}

fn is_value(kind: MemberKind) -> bool {
    matches!(kind, MemberKind::Field | MemberKind::Property)
}

impl<'a> SymbolResolver<'a> {
    /// Create a resolver
    pub fn new(
        options: &'a ExpressionOptions,
        imports: &'a ImportRegistry,
        owner_type: Option<HostTypeRef>,
        catalog: &'a dyn NameCatalog,
    ) -> Self {
        Self {
            options,
            imports,
            owner_type,
            catalog,
        }
    }

    /// Resolution options
    pub fn options(&self) -> &'a ExpressionOptions {
        self.options
    }

    /// Normalized key of a variable or expression name
    pub fn key(&self, name: &str) -> String {
        self.options.key(name)
    }

    fn filter(
        members: impl Iterator<Item = Arc<HostMember>>,
        callable: bool,
    ) -> Vec<Arc<HostMember>> {
        members
            .filter(|m| if callable { is_callable(m.kind()) } else { is_value(m.kind()) })
            .collect()
    }

    /// Members a bare name refers to: owner members first, then root imports
    pub fn global_members(&self, name: &str, callable: bool) -> Option<MemberLookup> {
        let case_sensitive = self.options.case_sensitive;
        if let Some(owner) = &self.owner_type {
            let candidates = Self::filter(owner.members_named(name, case_sensitive).cloned(), callable);
            if !candidates.is_empty() {
                return Some(MemberLookup::new(
                    candidates,
                    self.options.owner_member_access,
                    true,
                ));
            }
        }

        let candidates = Self::filter(
            self.imports.root().members_named(name, case_sensitive).cloned(),
            callable,
        );
        (!candidates.is_empty())
            .then(|| MemberLookup::new(candidates, Accessibility::Public, false))
    }

    /// Members named `name` within a scope
    pub fn scoped_members(
        &self,
        scope: &LookupScope<'_>,
        name: &str,
        callable: bool,
    ) -> Option<MemberLookup> {
        let case_sensitive = self.options.case_sensitive;
        let candidates = match scope {
            LookupScope::Global => return self.global_members(name, callable),
            LookupScope::Namespace(ns) => {
                Self::filter(ns.members_named(name, case_sensitive).cloned(), callable)
            }
            LookupScope::Type(ty) => Self::filter(
                ty.members_named(name, case_sensitive)
                    .filter(|m| m.is_static())
                    .cloned(),
                callable,
            ),
            LookupScope::Instance(ty) => {
                let table = member_table(ty)?;
                Self::filter(
                    table
                        .members_named(name, case_sensitive)
                        .filter(|m| !m.is_static())
                        .cloned(),
                    callable,
                )
            }
        };
        (!candidates.is_empty())
            .then(|| MemberLookup::new(candidates, Accessibility::Public, false))
    }

    /// Indexers available on values of a type
    pub fn indexers(&self, ty: &TypeInfo) -> Option<MemberLookup> {
        let table = member_table(ty)?;
        let candidates: Vec<_> = table.indexers().cloned().collect();
        (!candidates.is_empty())
            .then(|| MemberLookup::new(candidates, Accessibility::Public, false))
    }

    /// Variable type by name
    pub fn variable(&self, name: &str) -> Option<(String, TypeInfo)> {
        let key = self.key(name);
        self.catalog.variable_type(&key).map(|ty| (key, ty))
    }

    /// Expression result type by name
    pub fn expression(&self, name: &str) -> Option<(String, TypeInfo)> {
        let key = self.key(name);
        self.catalog.expression_type(&key).map(|ty| (key, ty))
    }

    /// Owner type, if the context has an owner object
    pub fn owner_type(&self) -> Option<&HostTypeRef> {
        self.owner_type.as_ref()
    }

    /// Namespace or type a name denotes within a scope
    pub fn scope_named(&self, scope: &LookupScope<'a>, name: &str) -> Option<LookupScope<'a>> {
        let ns: &'a Namespace = match scope {
            LookupScope::Global => self.imports.root(),
            LookupScope::Namespace(ns) => *ns,
            _ => return None,
        };
        let key = self.imports.key(name);
        if let Some(nested) = ns.namespace(&key) {
            return Some(LookupScope::Namespace(nested));
        }
        if let Some(ty) = ns.type_named(&key) {
            return Some(LookupScope::Type(ty.clone()));
        }
        if matches!(scope, LookupScope::Global) {
            // Built-in type keywords give access to static members, e.g. `string.Concat`
            if let Some(table) = builtin_type(name).as_ref().and_then(member_table) {
                return Some(LookupScope::Type(table));
            }
        }
        None
    }

    /// Resolve a type name used by `cast`
    pub fn type_named(&self, name: &str) -> Option<TypeInfo> {
        if let Some(element) = name.strip_suffix("[]") {
            return self
                .type_named(element)
                .map(|elem| TypeInfo::Array(Box::new(elem)));
        }
        if let Some(ty) = builtin_type(name) {
            return Some(ty);
        }
        if let Some(ty) = self.imports.find_type(name) {
            return Some(ty.type_info());
        }
        self.owner_type
            .as_ref()
            .filter(|owner| names_equal(owner.name(), name, self.options.case_sensitive))
            .map(HostTypeRef::type_info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Value;
    use crate::registry::{FunctionSignature, HostType};
    use std::collections::HashMap;

    struct MapCatalog(HashMap<String, TypeInfo>);

    impl NameCatalog for MapCatalog {
        fn variable_type(&self, key: &str) -> Option<TypeInfo> {
            self.0.get(key).cloned()
        }

        fn expression_type(&self, _key: &str) -> Option<TypeInfo> {
            None
        }
    }

    fn constants_type() -> HostTypeRef {
        HostType::builder("Constants")
            .member(HostMember::constant("Answer", Value::Int32(42)))
            .member(HostMember::static_method(
                "Twice",
                FunctionSignature::new(
                    vec![crate::registry::ParameterInfo::required("x", TypeInfo::Int32)],
                    TypeInfo::Int32,
                ),
                |args| Ok(args[0].clone()),
            ))
            .build()
    }

    #[test]
    fn test_global_lookup_separates_values_and_methods() {
        let options = ExpressionOptions::default();
        let mut imports = ImportRegistry::new(false);
        imports.add_type(constants_type()).unwrap();
        let catalog = EmptyCatalog;
        let resolver = SymbolResolver::new(&options, &imports, None, &catalog);

        assert!(resolver.global_members("answer", false).is_some());
        assert!(resolver.global_members("answer", true).is_none());
        assert!(resolver.global_members("twice", true).is_some());
    }

    #[test]
    fn test_variable_keys_follow_case_sensitivity() {
        let options = ExpressionOptions::default();
        let imports = ImportRegistry::new(false);
        let catalog = MapCatalog(HashMap::from([("total".to_string(), TypeInfo::Double)]));
        let resolver = SymbolResolver::new(&options, &imports, None, &catalog);
        assert_eq!(
            resolver.variable("Total"),
            Some(("total".to_string(), TypeInfo::Double))
        );
    }

    #[test]
    fn test_scope_and_type_names() {
        let options = ExpressionOptions::default();
        let mut imports = ImportRegistry::new(false);
        imports.add_type_in(constants_type(), "lib.consts").unwrap();
        let catalog = EmptyCatalog;
        let resolver = SymbolResolver::new(&options, &imports, None, &catalog);

        let Some(LookupScope::Namespace(lib)) = resolver.scope_named(&LookupScope::Global, "lib") else {
            panic!("expected namespace");
        };
        let consts = resolver
            .scope_named(&LookupScope::Namespace(lib), "consts")
            .unwrap();
        assert!(resolver.scoped_members(&consts, "Answer", false).is_some());

        assert!(matches!(
            resolver.scope_named(&LookupScope::Global, "string"),
            Some(LookupScope::Type(_))
        ));
        assert_eq!(
            resolver.type_named("int[]"),
            Some(TypeInfo::Array(Box::new(TypeInfo::Int32)))
        );
        assert!(resolver.type_named("lib.consts.Constants").is_some());
    }
}
