// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ## [10.4.6 Module Namespace Exotic Objects](https://tc39.es/ecma262/#sec-module-namespace-exotic-objects)
//!
//! A module namespace exotic object is an exotic object that exposes the
//! bindings exported from an ECMAScript Module. There is a one-to-one
//! correspondence between the String-keyed own properties of a module
//! namespace exotic object and the binding names exported by the Module.
//!
//! A deferred namespace, created by `import defer`, evaluates its module the
//! first time one of its exports is read.

use core::ops::Index;
use std::rc::Rc;

use crate::{
    ecmascript::{
        execution::{Agent, JsResult},
        scripts_and_modules::module::{
            Module,
            module_semantics::{
                ImportPhase,
                abstract_module_records::{
                    ModuleAbstractMethods, ResolvedBinding, get_resolved_binding_value,
                },
                cyclic_module_evaluation::ensure_deferred_namespace_evaluation,
            },
        },
        types::Value,
    },
    heap::{CreateHeapData, Heap, next_index},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleNamespace(u32);

#[derive(Debug)]
pub struct ModuleNamespaceHeapData {
    /// ### \[\[Module]]
    ///
    /// The Module Record whose exports this namespace exposes.
    pub(crate) module: Module,
    /// ### \[\[Exports]]
    ///
    /// A List whose elements are the String values of the exported names
    /// exposed as own properties of this object. The list is ordered as if
    /// an Array of those String values had been sorted using
    /// %Array.prototype.sort% using undefined as comparefn.
    pub(crate) exports: Box<[Rc<str>]>,
    /// ### \[\[Deferred]]
    pub(crate) deferred: bool,
}

impl ModuleNamespace {
    pub(crate) fn get_index(self) -> usize {
        self.0 as usize
    }

    /// ### \[\[Module]]
    pub fn module(self, agent: &Agent) -> Module {
        agent[self].module
    }

    /// The exported names, sorted by code units.
    ///
    /// Listing the keys of a deferred namespace does not evaluate its module.
    pub fn keys(self, agent: &Agent) -> &[Rc<str>] {
        &agent[self].exports
    }

    /// ### [10.4.6.7 \[\[HasProperty\]\] ( P )](https://tc39.es/ecma262/#sec-module-namespace-exotic-objects-hasproperty-p)
    pub fn has(self, agent: &Agent, name: &str) -> bool {
        // 2. Let exports be O.[[Exports]].
        // 3. If exports contains P, return true.
        // 4. Return false.
        self.export_index(agent, name).is_some()
    }

    /// Returns true if this namespace was created by an `import defer`.
    pub fn is_deferred(self, agent: &Agent) -> bool {
        agent[self].deferred
    }

    fn export_index(self, agent: &Agent, name: &str) -> Option<usize> {
        agent[self]
            .exports
            .binary_search_by(|export| compare_code_units(export, name))
            .ok()
    }

    /// ### [10.4.6.8 \[\[Get\]\] ( P, Receiver )](https://tc39.es/ecma262/#sec-module-namespace-exotic-objects-get-p-receiver)
    ///
    /// Reading an export of a deferred namespace evaluates its module first.
    /// `then` is never looked up on a deferred namespace, so that awaiting it
    /// does not evaluate the module.
    pub fn get(self, agent: &mut Agent, name: &str) -> JsResult<Value> {
        let module = agent[self].module;
        let deferred = agent[self].deferred;
        // 1. If IsSymbolLikeNamespaceKey(P, O), return ! OrdinaryGet(O, P,
        //    Receiver).
        if deferred && name == "then" {
            return Ok(Value::Undefined);
        }
        // 2. Let exports be ? GetModuleExportsList(O).
        if deferred {
            ensure_deferred_namespace_evaluation(agent, module)?;
        }
        // 3. If exports does not contain P, return undefined.
        if !self.has(agent, name) {
            return Ok(Value::Undefined);
        }
        // 4. Let m be O.[[Module]].
        // 5. Let binding be m.ResolveExport(P).
        // 6. Assert: binding is a ResolvedBinding Record.
        let Some(ResolvedBinding::Resolved {
            module: target_module,
            binding_name,
        }) = module.resolve_export(agent, name, &mut vec![])
        else {
            return Ok(Value::Undefined);
        };
        // 7. Let targetModule be binding.[[Module]].
        // 8. Assert: targetModule is not undefined.
        // 9. If binding.[[BindingName]] is namespace, then
        //     a. Return GetModuleNamespace(targetModule, evaluation).
        // 10. Let targetEnv be targetModule.[[Environment]].
        // 11. If targetEnv is empty, throw a ReferenceError exception.
        // 12. Return ? targetEnv.GetBindingValue(binding.[[BindingName]], true).
        get_resolved_binding_value(agent, target_module, binding_name.as_deref())
    }
}

/// Orders strings by their UTF-16 code units, as %Array.prototype.sort%
/// does.
fn compare_code_units(a: &str, b: &str) -> core::cmp::Ordering {
    a.encode_utf16().cmp(b.encode_utf16())
}

/// ### [10.4.6.12 ModuleNamespaceCreate ( module, exports, phase )](https://tc39.es/ecma262/#sec-modulenamespacecreate)
///
/// The abstract operation ModuleNamespaceCreate takes arguments module (a
/// Module Record), exports (a List of Strings) and phase (defer or
/// evaluation) and returns a module namespace exotic object. It is used to
/// specify the creation of new module namespace exotic objects.
pub(crate) fn module_namespace_create(
    agent: &mut Agent,
    module: Module,
    exports: Vec<Rc<str>>,
    phase: ImportPhase,
) -> ModuleNamespace {
    // 1. Assert: module.[[Namespace]] is empty.
    // 6. Let sortedExports be a List whose elements are the elements of
    //    exports, sorted according to lexicographic code unit order.
    let mut exports = exports;
    exports.sort_by(|a, b| compare_code_units(a, b));
    exports.dedup();
    // 2. Let internalSlotsList be the internal slots listed in Table 33.
    // 3. Let M be MakeBasicObject(internalSlotsList).
    // 4. Set M's essential internal methods to the definitions specified in
    //    10.4.6.
    // 5. Set M.[[Module]] to module.
    // 7. Set M.[[Exports]] to sortedExports.
    // 8. Create own properties of M corresponding to the definitions in
    //    28.3.
    let deferred = phase == ImportPhase::Defer;
    let namespace = agent.heap.create(ModuleNamespaceHeapData {
        module,
        exports: exports.into_boxed_slice(),
        deferred,
    });
    // 9. If phase is defer, set module.[[DeferredNamespace]] to M, else set
    //    module.[[Namespace]] to M.
    let fields = agent[module].abstract_fields_mut();
    if deferred {
        fields.deferred_namespace = Some(namespace);
    } else {
        fields.namespace = Some(namespace);
    }
    // 10. Return M.
    namespace
}

impl CreateHeapData<ModuleNamespaceHeapData, ModuleNamespace> for Heap {
    fn create(&mut self, data: ModuleNamespaceHeapData) -> ModuleNamespace {
        let index = next_index(&self.module_namespaces);
        self.module_namespaces.push(data);
        ModuleNamespace(index)
    }
}

impl Index<ModuleNamespace> for Agent {
    type Output = ModuleNamespaceHeapData;

    fn index(&self, index: ModuleNamespace) -> &Self::Output {
        self.heap
            .module_namespaces
            .get(index.get_index())
            .expect("ModuleNamespace out of bounds")
    }
}
