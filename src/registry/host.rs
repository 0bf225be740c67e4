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

//! Host type descriptors
//!
//! Expressions reach application data through host types: named descriptors
//! listing fields, properties, methods and indexers, each backed by a Rust
//! closure. Descriptors are immutable once built and shared through
//! [`HostTypeRef`].

use super::signature::{FunctionSignature, ParameterInfo};
use crate::evaluator::error::{EvaluationError, EvaluationResult};
use crate::model::{FromValue, TypeInfo, Value};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Callable backing a host member: `(receiver, arguments) -> value`
pub type MemberFn = Arc<dyn Fn(Option<&Value>, &[Value]) -> EvaluationResult<Value> + Send + Sync>;

/// Visibility of a host type or member
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum Accessibility {
    /// Only reachable from the declaring type
    Private,
    /// Reachable from the hosting application
    Internal,
    /// Reachable from every expression
    #[default]
    Public,
}

/// Kind of a host member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    /// Data field
    Field,
    /// Computed property
    Property,
    /// Callable method
    Method,
    /// `receiver[args]` accessor
    Indexer,
}

/// A field, property, method or indexer of a host type
#[derive(Clone)]
pub struct HostMember {
    name: String,
    kind: MemberKind,
    is_static: bool,
    access: Accessibility,
    signature: FunctionSignature,
    invoke: MemberFn,
}

impl HostMember {
    fn new(
        name: impl Into<String>,
        kind: MemberKind,
        is_static: bool,
        signature: FunctionSignature,
        invoke: MemberFn,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            is_static,
            access: Accessibility::Public,
            signature,
            invoke,
        }
    }

    /// Instance method
    pub fn method<F>(name: impl Into<String>, signature: FunctionSignature, f: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> EvaluationResult<Value> + Send + Sync + 'static,
    {
        let name = name.into();
        let member = name.clone();
        let invoke: MemberFn = Arc::new(move |receiver, args| match receiver {
            Some(Value::Null) | None => Err(EvaluationError::null_reference(format!(
                "calling {member}"
            ))),
            Some(value) => f(value, args),
        });
        Self::new(name, MemberKind::Method, false, signature, invoke)
    }

    /// Static method
    pub fn static_method<F>(name: impl Into<String>, signature: FunctionSignature, f: F) -> Self
    where
        F: Fn(&[Value]) -> EvaluationResult<Value> + Send + Sync + 'static,
    {
        let invoke: MemberFn = Arc::new(move |_, args| f(args));
        Self::new(name, MemberKind::Method, true, signature, invoke)
    }

    /// Instance property
    pub fn property<F>(name: impl Into<String>, value_type: TypeInfo, f: F) -> Self
    where
        F: Fn(&Value) -> EvaluationResult<Value> + Send + Sync + 'static,
    {
        let name = name.into();
        let member = name.clone();
        let invoke: MemberFn = Arc::new(move |receiver, _| match receiver {
            Some(Value::Null) | None => Err(EvaluationError::null_reference(format!(
                "reading {member}"
            ))),
            Some(value) => f(value),
        });
        Self::new(
            name,
            MemberKind::Property,
            false,
            FunctionSignature::nullary(value_type),
            invoke,
        )
    }

    /// Static property
    pub fn static_property<F>(name: impl Into<String>, value_type: TypeInfo, f: F) -> Self
    where
        F: Fn() -> EvaluationResult<Value> + Send + Sync + 'static,
    {
        let invoke: MemberFn = Arc::new(move |_, _| f());
        Self::new(
            name,
            MemberKind::Property,
            true,
            FunctionSignature::nullary(value_type),
            invoke,
        )
    }

    /// Instance field
    pub fn field<F>(name: impl Into<String>, value_type: TypeInfo, f: F) -> Self
    where
        F: Fn(&Value) -> EvaluationResult<Value> + Send + Sync + 'static,
    {
        Self {
            kind: MemberKind::Field,
            ..Self::property(name, value_type, f)
        }
    }

    /// Static field holding a constant value
    pub fn constant(name: impl Into<String>, value: Value) -> Self {
        let value_type = value.type_info();
        let invoke: MemberFn = Arc::new(move |_, _| Ok(value.clone()));
        Self::new(
            name,
            MemberKind::Field,
            true,
            FunctionSignature::nullary(value_type),
            invoke,
        )
    }

    /// Instance indexer
    pub fn indexer<F>(signature: FunctionSignature, f: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> EvaluationResult<Value> + Send + Sync + 'static,
    {
        Self {
            kind: MemberKind::Indexer,
            ..Self::method("Item", signature, f)
        }
    }

    /// Set the accessibility of this member
    pub fn with_access(mut self, access: Accessibility) -> Self {
        self.access = access;
        self
    }

    /// Member name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Member kind
    pub fn kind(&self) -> MemberKind {
        self.kind
    }

    /// Whether the member is reached without a receiver
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// Member accessibility
    pub fn access(&self) -> Accessibility {
        self.access
    }

    /// Member signature
    pub fn signature(&self) -> &FunctionSignature {
        &self.signature
    }

    /// Value type of the member
    pub fn return_type(&self) -> &TypeInfo {
        &self.signature.return_type
    }

    /// Invoke the member
    pub fn invoke(&self, receiver: Option<&Value>, args: &[Value]) -> EvaluationResult<Value> {
        (self.invoke)(receiver, args)
    }
}

impl fmt::Debug for HostMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostMember")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("is_static", &self.is_static)
            .field("access", &self.access)
            .field("signature", &self.signature)
            .finish()
    }
}

impl fmt::Display for HostMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_static {
            write!(f, "static ")?;
        }
        write!(f, "{}{}", self.name, self.signature)
    }
}

/// Descriptor of a host type
#[derive(Debug)]
pub struct HostType {
    name: String,
    access: Accessibility,
    members: Vec<Arc<HostMember>>,
}

impl HostType {
    /// Start building a host type
    pub fn builder(name: impl Into<String>) -> HostTypeBuilder {
        HostTypeBuilder {
            name: name.into(),
            access: Accessibility::Public,
            members: Vec::new(),
        }
    }
}

/// Builder for [`HostType`]
#[derive(Debug)]
pub struct HostTypeBuilder {
    name: String,
    access: Accessibility,
    members: Vec<Arc<HostMember>>,
}

impl HostTypeBuilder {
    /// Add a member
    pub fn member(mut self, member: HostMember) -> Self {
        self.members.push(Arc::new(member));
        self
    }

    /// Set the accessibility of the type
    pub fn access(mut self, access: Accessibility) -> Self {
        self.access = access;
        self
    }

    /// Finish the type
    pub fn build(self) -> HostTypeRef {
        HostTypeRef(Arc::new(HostType {
            name: self.name,
            access: self.access,
            members: self.members,
        }))
    }
}

/// Shared handle to a host type, compared by identity
#[derive(Clone)]
pub struct HostTypeRef(Arc<HostType>);

impl HostTypeRef {
    /// Type name
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Type accessibility
    pub fn access(&self) -> Accessibility {
        self.0.access
    }

    /// All members in declaration order
    pub fn members(&self) -> &[Arc<HostMember>] {
        &self.0.members
    }

    /// Members with the given name
    pub fn members_named<'a>(
        &'a self,
        name: &'a str,
        case_sensitive: bool,
    ) -> impl Iterator<Item = &'a Arc<HostMember>> + 'a {
        self.0
            .members
            .iter()
            .filter(move |m| names_equal(m.name(), name, case_sensitive))
    }

    /// Indexer members
    pub fn indexers(&self) -> impl Iterator<Item = &Arc<HostMember>> {
        self.0
            .members
            .iter()
            .filter(|m| m.kind() == MemberKind::Indexer)
    }

    /// Static type of instances of this type
    pub fn type_info(&self) -> TypeInfo {
        TypeInfo::Host(self.clone())
    }
}

impl PartialEq for HostTypeRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for HostTypeRef {}

impl Hash for HostTypeRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl fmt::Debug for HostTypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostTypeRef({})", self.0.name)
    }
}

/// Compare two names under the configured case sensitivity
pub fn names_equal(a: &str, b: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        a == b
    } else {
        a.eq_ignore_ascii_case(b) || a.to_lowercase() == b.to_lowercase()
    }
}

/// Instance of a host type carrying arbitrary application data
#[derive(Clone)]
pub struct HostObject {
    host_type: HostTypeRef,
    data: Arc<dyn Any + Send + Sync>,
}

impl HostObject {
    /// Wrap application data as an instance of `host_type`
    pub fn new<T: Any + Send + Sync>(host_type: HostTypeRef, data: T) -> Self {
        Self {
            host_type,
            data: Arc::new(data),
        }
    }

    /// Type of this instance
    pub fn host_type(&self) -> &HostTypeRef {
        &self.host_type
    }

    /// Borrow the wrapped data
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.data.downcast_ref::<T>()
    }
}

impl PartialEq for HostObject {
    fn eq(&self, other: &Self) -> bool {
        self.host_type == other.host_type && Arc::ptr_eq(&self.data, &other.data)
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostObject({})", self.host_type.name())
    }
}

/// Borrow the application data behind a member receiver
pub fn receiver_data<'a, T: Any>(receiver: &'a Value, member: &str) -> EvaluationResult<&'a T> {
    receiver
        .as_object()
        .and_then(HostObject::downcast_ref::<T>)
        .ok_or_else(|| {
            EvaluationError::host(
                member,
                format!("receiver of type {} has unexpected data", receiver.type_info()),
            )
        })
}

/// Extract a typed argument
pub fn argument<T: FromValue>(args: &[Value], index: usize, member: &str) -> EvaluationResult<T> {
    args.get(index)
        .and_then(T::from_value)
        .ok_or_else(|| EvaluationError::host(member, format!("invalid argument {index}")))
}

/// Shorthand for a list of required parameters
pub fn parameters(types: &[(&str, TypeInfo)]) -> Vec<ParameterInfo> {
    types
        .iter()
        .map(|(name, ty)| ParameterInfo::required(*name, ty.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        start: i32,
    }

    fn counter_type() -> HostTypeRef {
        HostType::builder("Counter")
            .member(HostMember::property("Start", TypeInfo::Int32, |recv| {
                Ok(Value::Int32(receiver_data::<Counter>(recv, "Start")?.start))
            }))
            .member(HostMember::method(
                "Plus",
                FunctionSignature::new(parameters(&[("n", TypeInfo::Int32)]), TypeInfo::Int32),
                |recv, args| {
                    let n: i32 = argument(args, 0, "Plus")?;
                    Ok(Value::Int32(receiver_data::<Counter>(recv, "Plus")?.start + n))
                },
            ))
            .member(HostMember::constant("Limit", Value::Int32(10)).with_access(Accessibility::Private))
            .build()
    }

    #[test]
    fn test_member_invocation() {
        let ty = counter_type();
        let obj = Value::Object(HostObject::new(ty.clone(), Counter { start: 5 }));

        let start = ty.members_named("start", false).next().unwrap();
        assert_eq!(start.invoke(Some(&obj), &[]).unwrap(), Value::Int32(5));

        let plus = ty.members_named("Plus", true).next().unwrap();
        assert_eq!(
            plus.invoke(Some(&obj), &[Value::Int32(2)]).unwrap(),
            Value::Int32(7)
        );
        assert!(ty.members_named("plus", true).next().is_none());
    }

    #[test]
    fn test_null_receiver() {
        let ty = counter_type();
        let start = ty.members_named("Start", true).next().unwrap();
        assert!(matches!(
            start.invoke(Some(&Value::Null), &[]),
            Err(EvaluationError::NullReference { .. })
        ));
    }

    #[test]
    fn test_identity_and_access() {
        let a = counter_type();
        let b = counter_type();
        assert_eq!(a, a.clone());
        assert_ne!(a, b);

        let limit = a.members_named("Limit", true).next().unwrap();
        assert!(limit.is_static());
        assert_eq!(limit.access(), Accessibility::Private);
        assert!(Accessibility::Private < Accessibility::Public);
    }
}
