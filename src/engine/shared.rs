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

//! Thread-safe handle to a compute instance

use super::compute::ComputeInstance;
use crate::error::Result;
use crate::evaluator::ExpressionOptions;
use crate::model::{FromValue, Value};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;

/// Cloneable handle serializing writers to one [`ComputeInstance`]
///
/// Reads that never refresh results take the shared lock; everything that
/// may evaluate or mutate takes the exclusive lock.
#[derive(Debug, Clone, Default)]
pub struct SharedComputeInstance(Arc<RwLock<ComputeInstance>>);

impl SharedComputeInstance {
    pub fn new(options: ExpressionOptions) -> Self {
        Self::from(ComputeInstance::new(options))
    }

    /// Shared access for inspection
    pub fn read(&self) -> RwLockReadGuard<'_, ComputeInstance> {
        self.0.read()
    }

    /// Exclusive access for arbitrary operations
    pub fn write(&self) -> RwLockWriteGuard<'_, ComputeInstance> {
        self.0.write()
    }

    pub fn set_value(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.0.write().set_value(name, value)
    }

    pub fn get_value(&self, name: &str) -> Result<Value> {
        self.0.read().get_value(name).cloned()
    }

    pub fn add_expression(&self, name: &str, text: &str) -> Result<()> {
        self.0.write().add_expression(name, text)
    }

    pub fn get_result(&self, name: &str) -> Result<Value> {
        self.0.write().get_result(name).cloned()
    }

    pub fn get_result_as<T: FromValue>(&self, name: &str) -> Result<T> {
        self.0.write().get_result_as(name)
    }

    pub fn recalculate_all(&self) -> Result<()> {
        self.0.write().recalculate_all()
    }
}

impl From<ComputeInstance> for SharedComputeInstance {
    fn from(instance: ComputeInstance) -> Self {
        Self(Arc::new(RwLock::new(instance)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_concurrent_writers() {
        let shared = SharedComputeInstance::default();
        shared.set_value("a", 0).unwrap();
        shared.add_expression("b", "a * 2").unwrap();

        let handles: Vec<_> = (1..=4)
            .map(|i| {
                let shared = shared.clone();
                thread::spawn(move || shared.set_value("a", i).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let a: i32 = shared.read().get_value_as("a").unwrap();
        assert_eq!(shared.get_result_as::<i32>("b").unwrap(), a * 2);
    }
}
