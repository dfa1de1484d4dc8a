// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ## [16.2.1.5 Abstract Module Records](https://tc39.es/ecma262/#sec-abstract-module-records)

use std::rc::Rc;

use ahash::AHashMap;

use crate::ecmascript::{
    builtins::{module_namespace::ModuleNamespace, promise::Promise},
    execution::{Agent, JsResult, Realm},
    scripts_and_modules::module::{Module, ModuleHeapData},
    types::{HostDefined, Value},
};

use super::{
    ImportPhase, cyclic_module_evaluation, cyclic_module_records, get_module_namespace,
    graph_loading, source_text_module_records, synthetic_module_records,
};

#[derive(Debug)]
pub(crate) struct AbstractModuleRecord {
    /// ### \[\[Realm]]
    ///
    /// The Realm within which this module was created.
    pub(crate) realm: Realm,
    /// ### \[\[Environment]]
    ///
    /// The bindings of this module that the engine resolves itself: imported
    /// namespaces and re-exported bindings. This is None until the module is
    /// linked. Bindings declared by the module body live in the body.
    pub(crate) environment: Option<ModuleEnvironment>,
    /// ### \[\[Namespace]]
    ///
    /// The Module Namespace Object (28.3) if one has been created for this
    /// module.
    pub(crate) namespace: Option<ModuleNamespace>,
    /// ### \[\[DeferredNamespace]]
    ///
    /// The deferred Module Namespace Object if one has been created for this
    /// module by an `import defer`.
    pub(crate) deferred_namespace: Option<ModuleNamespace>,
    /// ### \[\[HostDefined]]
    ///
    /// Field reserved for use by host environments that need to associate
    /// additional information with a module.
    pub(crate) host_defined: Option<HostDefined>,
}

impl AbstractModuleRecord {
    pub(crate) fn new(realm: Realm, host_defined: Option<HostDefined>) -> Self {
        Self {
            realm,
            environment: None,
            namespace: None,
            deferred_namespace: None,
            host_defined,
        }
    }
}

/// The import bindings of a linked module.
#[derive(Debug, Default)]
pub(crate) struct ModuleEnvironment {
    pub(crate) bindings: AHashMap<Rc<str>, ImportBinding>,
}

#[derive(Debug, Clone)]
pub(crate) enum ImportBinding {
    /// `import * as ns` or `import defer * as ns`: an immutable binding to a
    /// namespace object.
    Namespace(ModuleNamespace),
    /// `import { x }`: an indirect binding to the resolved export.
    Indirect { module: Module, binding_name: Rc<str> },
}

/// ### [ResolvedBinding Record](https://tc39.es/ecma262/#resolvedbinding-record)
///
/// The result of ResolveExport. `None` stands for "not found", which includes
/// circular import requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedBinding {
    Resolved {
        /// ### \[\[Module]]
        module: Module,
        /// ### \[\[BindingName]]
        ///
        /// `None` when the binding is the namespace of `module`.
        binding_name: Option<Rc<str>>,
    },
    Ambiguous,
}

/// ### [Table 41: Abstract Methods of Module Records](https://tc39.es/ecma262/#table-abstract-methods-of-module-records)
pub trait ModuleAbstractMethods {
    /// ### LoadRequestedModules(\[hostDefined])
    ///
    /// Prepares the module for linking by recursively loading all its
    /// dependencies, and returns a promise.
    fn load_requested_modules(self, agent: &mut Agent, host_defined: Option<HostDefined>) -> Promise;

    /// ### GetExportedNames(\[exportStarSet])
    ///
    /// Return a list of all names that are either directly or indirectly
    /// exported from this module.
    ///
    /// LoadRequestedModules must have completed successfully prior to
    /// invoking this method.
    fn get_exported_names(self, agent: &Agent, export_star_set: &mut Vec<Module>) -> Vec<Rc<str>>;

    /// ### ResolveExport(exportName \[, resolveSet])
    ///
    /// Return the binding of a name exported by this module. Bindings are
    /// represented by a ResolvedBinding Record, of the form { \[\[Module]]:
    /// Module Record, \[\[BindingName]]: String | namespace }. If the export
    /// is a Module Namespace Object without a direct binding in any module,
    /// \[\[BindingName]] will be set to namespace. Return None if the name
    /// cannot be resolved, or ambiguous if multiple bindings were found.
    ///
    /// Each time this operation is called with a specific exportName,
    /// resolveSet pair as arguments it must return the same result.
    ///
    /// LoadRequestedModules must have completed successfully prior to
    /// invoking this method.
    fn resolve_export(
        self,
        agent: &Agent,
        export_name: &str,
        resolve_set: &mut Vec<(Module, Rc<str>)>,
    ) -> Option<ResolvedBinding>;

    /// ### Link()
    ///
    /// Prepare the module for evaluation by transitively resolving all module
    /// dependencies and creating a Module Environment Record.
    ///
    /// LoadRequestedModules must have completed successfully prior to
    /// invoking this method.
    fn link(self, agent: &mut Agent) -> JsResult<()>;

    /// ### Evaluate()
    ///
    /// Returns a promise for the evaluation of this module and its
    /// dependencies, resolving on successful evaluation or if it has already
    /// been evaluated successfully, and rejecting for an evaluation error or
    /// if it has already been evaluated unsuccessfully. If the promise is
    /// rejected, hosts are expected to handle the promise rejection and
    /// rethrow the evaluation error.
    ///
    /// Link must have completed successfully prior to invoking this method.
    fn evaluate(self, agent: &mut Agent) -> Promise;
}

impl ModuleAbstractMethods for Module {
    fn load_requested_modules(self, agent: &mut Agent, host_defined: Option<HostDefined>) -> Promise {
        if self.is_cyclic(agent) {
            graph_loading::load_requested_modules(agent, self, host_defined)
        } else {
            synthetic_module_records::load_requested_modules(agent, self)
        }
    }

    fn get_exported_names(self, agent: &Agent, export_star_set: &mut Vec<Module>) -> Vec<Rc<str>> {
        match &agent[self] {
            ModuleHeapData::SourceText(_) => {
                source_text_module_records::get_exported_names(agent, self, export_star_set)
            }
            ModuleHeapData::Synthetic(record) => record.export_names.to_vec(),
        }
    }

    fn resolve_export(
        self,
        agent: &Agent,
        export_name: &str,
        resolve_set: &mut Vec<(Module, Rc<str>)>,
    ) -> Option<ResolvedBinding> {
        match &agent[self] {
            ModuleHeapData::SourceText(_) => {
                source_text_module_records::resolve_export(agent, self, export_name, resolve_set)
            }
            ModuleHeapData::Synthetic(_) => {
                synthetic_module_records::resolve_export(agent, self, export_name)
            }
        }
    }

    fn link(self, agent: &mut Agent) -> JsResult<()> {
        if self.is_cyclic(agent) {
            cyclic_module_records::link(agent, self)
        } else {
            // Synthetic modules are always linked.
            Ok(())
        }
    }

    fn evaluate(self, agent: &mut Agent) -> Promise {
        if self.is_cyclic(agent) {
            cyclic_module_evaluation::evaluate(agent, self)
        } else {
            synthetic_module_records::evaluate(agent, self)
        }
    }
}

/// Reads the current value of a binding of a module.
///
/// Import bindings are followed to the module that owns the binding; every
/// other binding is read from the module itself.
pub(crate) fn get_binding_value(agent: &mut Agent, module: Module, name: &str) -> JsResult<Value> {
    let mut module = module;
    let mut name: Rc<str> = name.into();
    loop {
        let binding = agent[module]
            .abstract_fields()
            .environment
            .as_ref()
            .and_then(|environment| environment.bindings.get(&name).cloned());
        match binding {
            Some(ImportBinding::Namespace(namespace)) => return Ok(Value::Namespace(namespace)),
            Some(ImportBinding::Indirect {
                module: target,
                binding_name,
            }) => {
                module = target;
                name = binding_name;
            }
            None => {
                if let Some(body) = source_text_module_records::module_body(agent, module) {
                    return body.get_binding_value(agent, module, &name);
                }
                return Ok(synthetic_module_records::get_binding_value(
                    agent, module, &name,
                ));
            }
        }
    }
}

/// Reads the value a ResolvedBinding Record refers to.
pub(crate) fn get_resolved_binding_value(
    agent: &mut Agent,
    module: Module,
    binding_name: Option<&str>,
) -> JsResult<Value> {
    match binding_name {
        Some(name) => get_binding_value(agent, module, name),
        None => Ok(Value::Namespace(get_module_namespace(
            agent,
            module,
            ImportPhase::Evaluation,
        ))),
    }
}
