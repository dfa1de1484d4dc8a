// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The arena owning every record the engine creates.
//!
//! Records refer to each other through small `u32` handles rather than
//! references, which lets module graphs contain cycles without any shared
//! ownership. Records are never freed individually: the whole graph is
//! reclaimed when the [`Agent`](crate::ecmascript::execution::Agent) is
//! dropped.

use crate::ecmascript::{
    builtins::{
        error::ErrorHeapData, module_namespace::ModuleNamespaceHeapData,
        promise::PromiseHeapData,
    },
    execution::RealmRecord,
    scripts_and_modules::module::ModuleHeapData,
};

#[derive(Debug, Default)]
pub struct Heap {
    pub(crate) errors: Vec<ErrorHeapData>,
    pub(crate) modules: Vec<ModuleHeapData>,
    pub(crate) module_namespaces: Vec<ModuleNamespaceHeapData>,
    pub(crate) promises: Vec<PromiseHeapData>,
    pub(crate) realms: Vec<RealmRecord>,
}

pub trait CreateHeapData<T, F> {
    /// Allocates the given data in the heap and returns a handle to it.
    fn create(&mut self, data: T) -> F;
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Converts a vector length into the next handle index.
#[inline]
pub(crate) fn next_index<T>(vec: &[T]) -> u32 {
    u32::try_from(vec.len()).expect("Heap arena overflowed u32 handles")
}
