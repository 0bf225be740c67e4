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

//! Import registry: namespaces, imported host types and functions
//!
//! Expressions see the root namespace directly. Importing a type without a
//! namespace exposes its static members as bare identifiers; importing it
//! under a dotted alias such as `util.math` exposes them as `util.math.Abs`.

use super::host::{Accessibility, HostMember, HostTypeRef, MemberKind, names_equal};
use indexmap::IndexMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while registering imports
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ImportError {
    /// The imported type is not public
    #[error("Type '{type_name}' is not accessible")]
    TypeNotAccessible {
        /// Type name
        type_name: String,
    },

    /// The imported member is not public
    #[error("Member '{member}' of type '{type_name}' is not accessible")]
    MemberNotAccessible {
        /// Type name
        type_name: String,
        /// Member name
        member: String,
    },

    /// No static method with the given name exists
    #[error("Type '{type_name}' has no static method '{member}'")]
    MemberNotFound {
        /// Type name
        type_name: String,
        /// Member name
        member: String,
    },

    /// Namespace alias is malformed
    #[error("Invalid namespace '{namespace}'")]
    InvalidNamespace {
        /// Offending namespace text
        namespace: String,
    },
}

/// A named scope of imported types, members and nested namespaces
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    name: String,
    namespaces: IndexMap<String, Namespace>,
    types: IndexMap<String, HostTypeRef>,
    members: Vec<Arc<HostMember>>,
}

impl Namespace {
    fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Namespace name (empty for the root)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Nested namespace by normalized key
    pub fn namespace(&self, key: &str) -> Option<&Namespace> {
        self.namespaces.get(key)
    }

    /// Imported type by normalized key
    pub fn type_named(&self, key: &str) -> Option<&HostTypeRef> {
        self.types.get(key)
    }

    /// Static members reachable as bare names in this namespace
    pub fn members_named<'a>(
        &'a self,
        name: &'a str,
        case_sensitive: bool,
    ) -> impl Iterator<Item = &'a Arc<HostMember>> + 'a {
        self.members
            .iter()
            .filter(move |m| names_equal(m.name(), name, case_sensitive))
    }

    fn push_member(&mut self, member: &Arc<HostMember>) {
        if !self.members.iter().any(|m| Arc::ptr_eq(m, member)) {
            self.members.push(Arc::clone(member));
        }
    }
}

/// Registry of everything expressions may reference besides variables
#[derive(Debug, Clone)]
pub struct ImportRegistry {
    case_sensitive: bool,
    root: Namespace,
}

impl ImportRegistry {
    /// Create an empty registry
    pub fn new(case_sensitive: bool) -> Self {
        Self {
            case_sensitive,
            root: Namespace::default(),
        }
    }

    /// Whether names are matched case-sensitively
    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// Root namespace
    pub fn root(&self) -> &Namespace {
        &self.root
    }

    /// Normalize a name into a lookup key
    pub fn key(&self, name: &str) -> String {
        if self.case_sensitive {
            name.to_string()
        } else {
            name.to_lowercase()
        }
    }

    /// Import a type into the root namespace
    ///
    /// Its static members become bare identifiers and its name becomes
    /// available as a cast target.
    pub fn add_type(&mut self, host_type: HostTypeRef) -> Result<(), ImportError> {
        Self::check_type(&host_type)?;
        log::debug!("Importing type {} into root namespace", host_type.name());

        let key = self.key(host_type.name());
        for member in host_type.members().iter().filter(|m| m.is_static()) {
            self.root.push_member(member);
        }
        self.root.types.insert(key, host_type);
        Ok(())
    }

    /// Import a type under a dotted namespace alias
    pub fn add_type_in(&mut self, host_type: HostTypeRef, namespace: &str) -> Result<(), ImportError> {
        Self::check_type(&host_type)?;
        log::debug!("Importing type {} as namespace {}", host_type.name(), namespace);

        let type_key = self.key(host_type.name());
        let ns = self.namespace_mut(namespace)?;
        for member in host_type.members().iter().filter(|m| m.is_static()) {
            ns.push_member(member);
        }
        ns.types.insert(type_key, host_type);
        Ok(())
    }

    /// Import the static method overloads named `method` from `host_type`
    ///
    /// An empty namespace imports into the root.
    pub fn add_method(
        &mut self,
        method: &str,
        host_type: &HostTypeRef,
        namespace: &str,
    ) -> Result<(), ImportError> {
        Self::check_type(host_type)?;

        let candidates: Vec<Arc<HostMember>> = host_type
            .members_named(method, self.case_sensitive)
            .filter(|m| m.is_static() && m.kind() == MemberKind::Method)
            .cloned()
            .collect();
        if candidates.is_empty() {
            return Err(ImportError::MemberNotFound {
                type_name: host_type.name().to_string(),
                member: method.to_string(),
            });
        }
        if candidates.iter().all(|m| m.access() != Accessibility::Public) {
            return Err(ImportError::MemberNotAccessible {
                type_name: host_type.name().to_string(),
                member: method.to_string(),
            });
        }

        log::debug!(
            "Importing {}.{} into namespace '{}'",
            host_type.name(),
            method,
            namespace
        );
        let ns = self.namespace_mut(namespace)?;
        for member in candidates.iter().filter(|m| m.access() == Accessibility::Public) {
            ns.push_member(member);
        }
        Ok(())
    }

    /// Find an imported type by possibly dotted name
    pub fn find_type(&self, dotted: &str) -> Option<HostTypeRef> {
        let mut segments: Vec<String> = dotted.split('.').map(|s| self.key(s.trim())).collect();
        let type_key = segments.pop()?;
        let mut ns = &self.root;
        for segment in &segments {
            ns = ns.namespace(segment)?;
        }
        ns.type_named(&type_key).cloned()
    }

    fn check_type(host_type: &HostTypeRef) -> Result<(), ImportError> {
        if host_type.access() == Accessibility::Public {
            Ok(())
        } else {
            Err(ImportError::TypeNotAccessible {
                type_name: host_type.name().to_string(),
            })
        }
    }

    fn namespace_mut(&mut self, dotted: &str) -> Result<&mut Namespace, ImportError> {
        let dotted = dotted.trim();
        if dotted.is_empty() {
            return Ok(&mut self.root);
        }

        let segments: Vec<&str> = dotted.split('.').map(str::trim).collect();
        let valid = |s: &&str| {
            s.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_')
                && s.chars().all(|c| c.is_alphanumeric() || c == '_')
        };
        if !segments.iter().all(valid) {
            return Err(ImportError::InvalidNamespace {
                namespace: dotted.to_string(),
            });
        }

        let case_sensitive = self.case_sensitive;
        let mut ns = &mut self.root;
        for segment in segments {
            let key = if case_sensitive {
                segment.to_string()
            } else {
                segment.to_lowercase()
            };
            ns = ns
                .namespaces
                .entry(key)
                .or_insert_with(|| Namespace::named(segment));
        }
        Ok(ns)
    }
}

impl Default for ImportRegistry {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{TypeInfo, Value};
    use crate::registry::host::{HostType, parameters};
    use crate::registry::signature::FunctionSignature;

    fn geometry() -> HostTypeRef {
        HostType::builder("Geometry")
            .member(HostMember::constant("Tau", Value::Double(std::f64::consts::TAU)))
            .member(HostMember::static_method(
                "Square",
                FunctionSignature::new(parameters(&[("x", TypeInfo::Double)]), TypeInfo::Double),
                |args| Ok(Value::Double(args[0].as_f64().unwrap_or_default().powi(2))),
            ))
            .member(
                HostMember::static_method(
                    "Secret",
                    FunctionSignature::nullary(TypeInfo::Int32),
                    |_| Ok(Value::Int32(42)),
                )
                .with_access(Accessibility::Private),
            )
            .build()
    }

    #[test]
    fn test_add_type_root() {
        let mut imports = ImportRegistry::new(false);
        imports.add_type(geometry()).unwrap();
        assert_eq!(imports.root().members_named("tau", false).count(), 1);
        assert!(imports.find_type("geometry").is_some());
    }

    #[test]
    fn test_add_type_in_namespace() {
        let mut imports = ImportRegistry::new(true);
        imports.add_type_in(geometry(), "util.geo").unwrap();
        let ns = imports
            .root()
            .namespace("util")
            .and_then(|ns| ns.namespace("geo"))
            .unwrap();
        assert_eq!(ns.members_named("Square", true).count(), 1);
        assert_eq!(ns.members_named("square", true).count(), 0);
        assert!(imports.find_type("util.geo.Geometry").is_some());
    }

    #[test]
    fn test_add_method_validation() {
        let mut imports = ImportRegistry::new(false);
        let ty = geometry();
        imports.add_method("square", &ty, "").unwrap();
        assert_eq!(imports.root().members_named("Square", false).count(), 1);

        assert!(matches!(
            imports.add_method("Secret", &ty, ""),
            Err(ImportError::MemberNotAccessible { .. })
        ));
        assert!(matches!(
            imports.add_method("Missing", &ty, ""),
            Err(ImportError::MemberNotFound { .. })
        ));
        assert!(matches!(
            imports.add_method("Square", &ty, "bad..ns"),
            Err(ImportError::InvalidNamespace { .. })
        ));
    }

    #[test]
    fn test_private_type_rejected() {
        let hidden = HostType::builder("Hidden")
            .access(Accessibility::Internal)
            .build();
        let mut imports = ImportRegistry::default();
        assert!(matches!(
            imports.add_type(hidden),
            Err(ImportError::TypeNotAccessible { .. })
        ));
    }
}
