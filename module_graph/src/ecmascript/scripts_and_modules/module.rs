// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ## [16.2 Modules](https://tc39.es/ecma262/#sec-modules)

use core::ops::{Index, IndexMut};

use crate::{
    ecmascript::{
        execution::{Agent, JsError, Realm},
        types::HostDefined,
    },
    heap::{CreateHeapData, Heap, next_index},
};

use module_semantics::{
    ModuleRequestRecord,
    abstract_module_records::AbstractModuleRecord,
    cyclic_module_records::{CyclicModuleRecord, CyclicModuleRecordStatus},
    source_text_module_records::SourceTextModuleRecord,
    synthetic_module_records::SyntheticModuleRecord,
};

pub mod module_semantics;

/// A handle to a Module Record in the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Module(u32);

#[derive(Debug)]
pub enum ModuleHeapData {
    SourceText(Box<SourceTextModuleRecord>),
    Synthetic(Box<SyntheticModuleRecord>),
}

impl ModuleHeapData {
    pub(crate) fn abstract_fields(&self) -> &AbstractModuleRecord {
        match self {
            ModuleHeapData::SourceText(record) => &record.abstract_fields,
            ModuleHeapData::Synthetic(record) => &record.abstract_fields,
        }
    }

    pub(crate) fn abstract_fields_mut(&mut self) -> &mut AbstractModuleRecord {
        match self {
            ModuleHeapData::SourceText(record) => &mut record.abstract_fields,
            ModuleHeapData::Synthetic(record) => &mut record.abstract_fields,
        }
    }

    /// The Cyclic Module Record fields, if this is a Cyclic Module Record.
    pub(crate) fn cyclic(&self) -> Option<&CyclicModuleRecord> {
        match self {
            ModuleHeapData::SourceText(record) => Some(&record.cyclic_fields),
            ModuleHeapData::Synthetic(_) => None,
        }
    }

    pub(crate) fn cyclic_mut(&mut self) -> Option<&mut CyclicModuleRecord> {
        match self {
            ModuleHeapData::SourceText(record) => Some(&mut record.cyclic_fields),
            ModuleHeapData::Synthetic(_) => None,
        }
    }
}

impl Module {
    pub(crate) fn get_index(self) -> usize {
        self.0 as usize
    }

    /// ### \[\[Realm]]
    ///
    /// The Realm within which this module was created.
    pub fn realm(self, agent: &Agent) -> Realm {
        agent[self].abstract_fields().realm
    }

    /// ### \[\[HostDefined]]
    ///
    /// Field reserved for use by host environments that need to associate
    /// additional information with a module.
    pub fn host_defined(self, agent: &Agent) -> Option<HostDefined> {
        agent[self].abstract_fields().host_defined.clone()
    }

    /// Returns true if this is a Cyclic Module Record.
    pub fn is_cyclic(self, agent: &Agent) -> bool {
        agent[self].cyclic().is_some()
    }

    /// The lifecycle status of a Cyclic Module Record. Synthetic modules have
    /// no status.
    pub fn status(self, agent: &Agent) -> Option<CyclicModuleRecordStatus> {
        agent[self].cyclic().map(|cyclic| cyclic.status)
    }

    /// ### \[\[EvaluationError]]
    pub fn evaluation_error(self, agent: &Agent) -> Option<JsError> {
        agent[self]
            .cyclic()
            .and_then(|cyclic| cyclic.evaluation_error)
    }

    /// ### \[\[HasTLA]]
    pub fn has_tla(self, agent: &Agent) -> bool {
        agent[self].cyclic().is_some_and(|cyclic| cyclic.has_tla)
    }

    /// ### \[\[RequestedModules]]
    ///
    /// Synthetic modules request nothing.
    pub fn requested_modules(self, agent: &Agent) -> &[ModuleRequestRecord] {
        agent[self]
            .cyclic()
            .map(|cyclic| &*cyclic.requested_modules)
            .unwrap_or_default()
    }

    pub(crate) fn cyclic(self, agent: &Agent) -> &CyclicModuleRecord {
        agent[self]
            .cyclic()
            .expect("Module is not a Cyclic Module Record")
    }

    pub(crate) fn cyclic_mut(self, agent: &mut Agent) -> &mut CyclicModuleRecord {
        agent[self]
            .cyclic_mut()
            .expect("Module is not a Cyclic Module Record")
    }
}

impl CreateHeapData<ModuleHeapData, Module> for Heap {
    fn create(&mut self, data: ModuleHeapData) -> Module {
        let index = next_index(&self.modules);
        self.modules.push(data);
        Module(index)
    }
}

impl Index<Module> for Agent {
    type Output = ModuleHeapData;

    fn index(&self, index: Module) -> &Self::Output {
        self.heap
            .modules
            .get(index.get_index())
            .expect("Module out of bounds")
    }
}

impl IndexMut<Module> for Agent {
    fn index_mut(&mut self, index: Module) -> &mut Self::Output {
        self.heap
            .modules
            .get_mut(index.get_index())
            .expect("Module out of bounds")
    }
}
