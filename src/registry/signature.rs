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

//! Member signatures and overload scoring

use crate::model::{TypeCoercion, TypeInfo};
use std::fmt;

/// Extra cost charged when a call binds through a param array
///
/// Keeps a fixed-arity overload preferred over a variadic one whenever both
/// accept the same arguments.
pub const PARAM_ARRAY_PENALTY: u32 = 10_000;

/// Signature of a host method, property or indexer
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionSignature {
    /// Parameter types
    pub parameters: Vec<ParameterInfo>,
    /// Return type (`Void` for methods without a return value)
    pub return_type: TypeInfo,
    /// Whether the last parameter is a param array
    pub variadic: bool,
}

/// Parameter information for members
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParameterInfo {
    /// Parameter name
    pub name: String,
    /// Parameter type
    pub param_type: TypeInfo,
}

/// How a list of argument types binds to a signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentBinding {
    /// Total conversion cost
    pub cost: u32,
    /// Type each supplied argument converts to, in argument order
    pub argument_types: Vec<TypeInfo>,
    /// Param array collection, present when the call uses the expanded form
    pub param_array: Option<ParamArrayBinding>,
}

/// Trailing arguments collected into a param array
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamArrayBinding {
    /// Index of the first collected argument
    pub start: usize,
    /// Element type of the array
    pub element_type: TypeInfo,
}

impl FunctionSignature {
    /// Create a fixed-arity signature
    pub fn new(parameters: Vec<ParameterInfo>, return_type: TypeInfo) -> Self {
        Self {
            parameters,
            return_type,
            variadic: false,
        }
    }

    /// Create a signature whose last parameter is a param array
    ///
    /// The last parameter must have an array type; otherwise the signature
    /// behaves as a fixed-arity one.
    pub fn variadic(parameters: Vec<ParameterInfo>, return_type: TypeInfo) -> Self {
        Self {
            parameters,
            return_type,
            variadic: true,
        }
    }

    /// Signature without parameters
    pub fn nullary(return_type: TypeInfo) -> Self {
        Self::new(Vec::new(), return_type)
    }

    /// Check if the member produces a value
    pub fn has_return_value(&self) -> bool {
        self.return_type != TypeInfo::Void
    }

    fn param_array_element(&self) -> Option<&TypeInfo> {
        if !self.variadic {
            return None;
        }
        self.parameters.last().and_then(|p| p.param_type.element_type())
    }

    /// Bind argument types, returning the cheapest applicable form
    pub fn bind(&self, args: &[TypeInfo]) -> Option<ArgumentBinding> {
        let normal = self.bind_normal(args);
        let expanded = self
            .param_array_element()
            .and_then(|element| self.bind_expanded(args, element));

        match (normal, expanded) {
            (Some(n), Some(e)) => Some(if e.cost < n.cost { e } else { n }),
            (n, e) => n.or(e),
        }
    }

    fn bind_normal(&self, args: &[TypeInfo]) -> Option<ArgumentBinding> {
        if args.len() != self.parameters.len() {
            return None;
        }
        let mut cost = 0;
        for (arg, param) in args.iter().zip(&self.parameters) {
            cost += TypeCoercion::implicit_cost(arg, &param.param_type)?;
        }
        Some(ArgumentBinding {
            cost,
            argument_types: self.parameters.iter().map(|p| p.param_type.clone()).collect(),
            param_array: None,
        })
    }

    fn bind_expanded(&self, args: &[TypeInfo], element: &TypeInfo) -> Option<ArgumentBinding> {
        let fixed = self.parameters.len() - 1;
        if args.len() < fixed {
            return None;
        }

        let mut cost = PARAM_ARRAY_PENALTY;
        let mut argument_types = Vec::with_capacity(args.len());
        for (arg, param) in args[..fixed].iter().zip(&self.parameters) {
            cost += TypeCoercion::implicit_cost(arg, &param.param_type)?;
            argument_types.push(param.param_type.clone());
        }
        for arg in &args[fixed..] {
            cost += TypeCoercion::implicit_cost(arg, element)?;
            argument_types.push(element.clone());
        }

        Some(ArgumentBinding {
            cost,
            argument_types,
            param_array: Some(ParamArrayBinding {
                start: fixed,
                element_type: element.clone(),
            }),
        })
    }
}

impl ParameterInfo {
    /// Create a required parameter
    pub fn required(name: impl Into<String>, param_type: TypeInfo) -> Self {
        Self {
            name: name.into(),
            param_type,
        }
    }

    /// Create a param array parameter with the given element type
    pub fn params(name: impl Into<String>, element_type: TypeInfo) -> Self {
        Self {
            name: name.into(),
            param_type: TypeInfo::Array(Box::new(element_type)),
        }
    }
}

impl fmt::Display for FunctionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        let last = self.parameters.len().saturating_sub(1);
        for (i, param) in self.parameters.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if self.variadic && i == last {
                write!(f, "params ")?;
            }
            write!(f, "{}: {}", param.name, param.param_type)?;
        }
        write!(f, ") -> {}", self.return_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(params: &[TypeInfo]) -> FunctionSignature {
        FunctionSignature::new(
            params
                .iter()
                .enumerate()
                .map(|(i, t)| ParameterInfo::required(format!("p{i}"), t.clone()))
                .collect(),
            TypeInfo::Double,
        )
    }

    #[test]
    fn test_exact_match_costs_nothing() {
        let binding = sig(&[TypeInfo::Int32, TypeInfo::Double])
            .bind(&[TypeInfo::Int32, TypeInfo::Double])
            .unwrap();
        assert_eq!(binding.cost, 0);
        assert!(binding.param_array.is_none());
    }

    #[test]
    fn test_widening_is_scored() {
        let long = sig(&[TypeInfo::Int64]).bind(&[TypeInfo::Int32]).unwrap();
        let double = sig(&[TypeInfo::Double]).bind(&[TypeInfo::Int32]).unwrap();
        assert!(long.cost < double.cost);
        assert!(sig(&[TypeInfo::Int32]).bind(&[TypeInfo::Int64]).is_none());
        assert!(sig(&[TypeInfo::Int32]).bind(&[]).is_none());
    }

    #[test]
    fn test_param_array_binding() {
        let concat = FunctionSignature::variadic(
            vec![
                ParameterInfo::required("sep", TypeInfo::String),
                ParameterInfo::params("values", TypeInfo::Int32),
            ],
            TypeInfo::String,
        );

        let binding = concat
            .bind(&[TypeInfo::String, TypeInfo::Int32, TypeInfo::Int16])
            .unwrap();
        assert_eq!(
            binding.param_array,
            Some(ParamArrayBinding {
                start: 1,
                element_type: TypeInfo::Int32
            })
        );
        assert_eq!(binding.argument_types.len(), 3);

        let empty = concat.bind(&[TypeInfo::String]).unwrap();
        assert_eq!(empty.param_array.map(|p| p.start), Some(1));

        let array_arg = concat
            .bind(&[
                TypeInfo::String,
                TypeInfo::Array(Box::new(TypeInfo::Int32)),
            ])
            .unwrap();
        assert!(array_arg.param_array.is_none());
    }

    #[test]
    fn test_fixed_overload_beats_variadic() {
        let fixed = sig(&[TypeInfo::Double, TypeInfo::Double])
            .bind(&[TypeInfo::Int32, TypeInfo::Int32])
            .unwrap();
        let variadic = FunctionSignature::variadic(
            vec![ParameterInfo::params("values", TypeInfo::Int32)],
            TypeInfo::Int32,
        )
        .bind(&[TypeInfo::Int32, TypeInfo::Int32])
        .unwrap();
        assert!(fixed.cost < variadic.cost);
    }
}
