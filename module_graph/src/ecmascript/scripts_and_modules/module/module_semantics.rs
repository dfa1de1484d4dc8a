// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ## [16.2.1 Module Semantics](https://tc39.es/ecma262/#sec-module-semantics)

use std::rc::Rc;

use crate::ecmascript::{
    builtins::module_namespace::{ModuleNamespace, module_namespace_create},
    execution::{Agent, ExceptionType, JsResult},
};

use super::Module;
use abstract_module_records::{ModuleAbstractMethods, ResolvedBinding};
use cyclic_module_records::CyclicModuleRecordStatus;
use graph_loading::{GraphLoadingState, continue_module_loading};

pub mod abstract_module_records;
pub mod cyclic_module_evaluation;
pub mod cyclic_module_records;
pub mod graph_loading;
pub mod source_text_module_records;
pub mod synthetic_module_records;
#[cfg(test)]
mod tests;

/// ### \[\[Phase]]
///
/// The phase of an import: `import defer` only needs the module loaded and
/// linked, while a regular import needs it evaluated as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImportPhase {
    Defer,
    Evaluation,
}

/// ### [16.2.1.3.1 ImportAttribute Records](https://tc39.es/ecma262/#importattribute-record)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImportAttribute {
    /// ### \[\[Key]]
    pub key: Rc<str>,
    /// ### \[\[Value]]
    pub value: Rc<str>,
}

/// ### [16.2.1.3 ModuleRequest Records](https://tc39.es/ecma262/#modulerequest-record)
///
/// A ModuleRequest Record represents the request to import a module with
/// given import attributes.
#[derive(Debug, Clone)]
pub struct ModuleRequestRecord {
    /// ### \[\[Specifier]]
    ///
    /// The module specifier.
    specifier: Rc<str>,
    /// ### \[\[Attributes]]
    ///
    /// The import attributes. Parsed requests have them sorted by key.
    attributes: Box<[ImportAttribute]>,
    /// ### \[\[Phase]]
    phase: ImportPhase,
}

impl ModuleRequestRecord {
    pub fn new(specifier: &str) -> Self {
        Self {
            specifier: specifier.into(),
            attributes: Default::default(),
            phase: ImportPhase::Evaluation,
        }
    }

    pub fn with_attributes(mut self, attributes: impl Into<Box<[ImportAttribute]>>) -> Self {
        self.attributes = attributes.into();
        self
    }

    pub fn with_phase(mut self, phase: ImportPhase) -> Self {
        self.phase = phase;
        self
    }

    pub fn specifier(&self) -> &str {
        &self.specifier
    }

    pub fn attributes(&self) -> &[ImportAttribute] {
        &self.attributes
    }

    pub fn phase(&self) -> ImportPhase {
        self.phase
    }

    pub(crate) fn set_phase(&mut self, phase: ImportPhase) {
        self.phase = phase;
    }

    /// Returns the value of the given import attribute, if present.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attribute| &*attribute.key == key)
            .map(|attribute| &*attribute.value)
    }

    /// ### [16.2.1.3.2 ModuleRequestsEqual ( left, right )](https://tc39.es/ecma262/#sec-ModuleRequestsEqual)
    ///
    /// Import attributes are compared regardless of their order. The phase
    /// does not take part in the comparison: a deferred and an evaluation
    /// import of the same module request the same Module Record.
    pub fn is_same_request(&self, other: &ModuleRequestRecord) -> bool {
        // 1. If left.[[Specifier]] is not right.[[Specifier]], return false.
        if self.specifier != other.specifier {
            return false;
        }
        // 2. Let leftAttrs be left.[[Attributes]].
        // 3. Let rightAttrs be right.[[Attributes]].
        // 4. Let leftAttrsCount be the number of elements in leftAttrs.
        // 5. Let rightAttrsCount be the number of elements in rightAttrs.
        // 6. If leftAttrsCount ≠ rightAttrsCount, return false.
        if self.attributes.len() != other.attributes.len() {
            return false;
        }
        // 7. For each ImportAttribute Record l of leftAttrs, do
        //     a. If rightAttrs does not contain an ImportAttribute Record r
        //        such that l.[[Key]] is r.[[Key]] and l.[[Value]] is
        //        r.[[Value]], return false.
        // 8. Return true.
        self.attributes
            .iter()
            .all(|l| other.attributes.iter().any(|r| l == r))
    }
}

/// ### [LoadedModuleRequest Records](https://tc39.es/ecma262/#table-loadedmodulerequest-fields)
#[derive(Debug, Clone)]
pub(crate) struct LoadedModuleRecord {
    pub(crate) request: ModuleRequestRecord,
    pub(crate) module: Module,
}

/// ### [16.2.1.9 GetImportedModule ( referrer, request )](https://tc39.es/ecma262/#sec-GetImportedModule)
///
/// The abstract operation GetImportedModule takes arguments referrer (a
/// Cyclic Module Record) and request (a ModuleRequest Record) and returns a
/// Module Record.
///
/// Returns `None` if the request has not been loaded.
pub fn get_imported_module(
    agent: &Agent,
    referrer: Module,
    request: &ModuleRequestRecord,
) -> Option<Module> {
    // 1. Let records be a List consisting of each LoadedModuleRequest Record
    //    r of referrer.[[LoadedModules]] such that ModuleRequestsEqual(r,
    //    request) is true.
    // 2. Assert: records has exactly one element, since LoadRequestedModules
    //    has completed successfully on referrer prior to invoking this
    //    abstract operation.
    // 3. Let record be the sole element of records.
    // 4. Return record.[[Module]].
    agent[referrer].cyclic().and_then(|cyclic| {
        cyclic
            .loaded_modules
            .iter()
            .find(|record| record.request.is_same_request(request))
            .map(|record| record.module)
    })
}

/// GetImportedModule for a module that has finished loading.
pub(crate) fn imported_module(
    agent: &Agent,
    referrer: Module,
    request: &ModuleRequestRecord,
) -> Module {
    get_imported_module(agent, referrer, request)
        .expect("Requested module should have been loaded")
}

/// ### [16.2.1.11 FinishLoadingImportedModule ( referrer, moduleRequest, payload, result )](https://tc39.es/ecma262/#sec-FinishLoadingImportedModule)
///
/// The abstract operation FinishLoadingImportedModule takes arguments
/// referrer (a Cyclic Module Record), moduleRequest (a ModuleRequest
/// Record), payload (a GraphLoadingState Record), and result (either a normal
/// completion containing a Module Record or a throw completion) and returns
/// unused.
///
/// A host that calls this more than once for the same request, for a
/// request it was never asked to load, or with a different module than an
/// earlier successful load of an equal request, fails the loading operation
/// with a TypeError.
pub fn finish_loading_imported_module(
    agent: &mut Agent,
    referrer: Module,
    module_request: &ModuleRequestRecord,
    result: JsResult<Module>,
    payload: GraphLoadingState,
) {
    if !payload.take_outstanding_request(referrer, module_request) {
        tracing::warn!(
            specifier = module_request.specifier(),
            "host completed a module request that was not outstanding"
        );
        let error = agent.throw_exception(
            ExceptionType::TypeError,
            format!(
                "Module request '{}' was not awaiting completion",
                module_request.specifier()
            ),
        );
        continue_module_loading(agent, &payload, Err(error));
        return;
    }
    let mut result = result;
    // 1. If result is a normal completion, then
    if let Ok(module) = result {
        // a. If referrer.[[LoadedModules]] contains a LoadedModuleRequest
        //    Record record such that ModuleRequestsEqual(record,
        //    moduleRequest) is true, then
        if let Some(loaded) = get_imported_module(agent, referrer, module_request) {
            // i. Assert: record.[[Module]] and result.[[Value]] are the same
            //    Module Record.
            if loaded != module {
                let error = agent.throw_exception(
                    ExceptionType::TypeError,
                    format!(
                        "Module request '{}' resolved to two different modules",
                        module_request.specifier()
                    ),
                );
                result = Err(error);
            }
        } else {
            // b. Else,
            // i. Append the LoadedModuleRequest Record {
            //      [[Specifier]]: moduleRequest.[[Specifier]],
            //      [[Attributes]]: moduleRequest.[[Attributes]],
            //      [[Module]]: result.[[Value]]
            //    } to referrer.[[LoadedModules]].
            referrer.cyclic_mut(agent).loaded_modules.push(LoadedModuleRecord {
                request: module_request.clone(),
                module,
            });
        }
    }
    // 2. If payload is a GraphLoadingState Record, then
    // a. Perform ContinueModuleLoading(payload, result).
    continue_module_loading(agent, &payload, result);
    // 4. Return unused.
}

/// ### [16.2.1.13 GetModuleNamespace ( module, phase )](https://tc39.es/ecma262/#sec-getmodulenamespace)
///
/// The abstract operation GetModuleNamespace takes arguments module (an
/// instance of a concrete subclass of Module Record) and phase (defer or
/// evaluation) and returns a Module Namespace Object. It retrieves the
/// Module Namespace Object representing module's exports, lazily creating it
/// the first time it was requested, and storing it in module.\[\[Namespace]]
/// or module.\[\[DeferredNamespace]] for future retrieval.
pub fn get_module_namespace(agent: &mut Agent, module: Module, phase: ImportPhase) -> ModuleNamespace {
    // 1. Assert: If module is a Cyclic Module Record, then module.[[Status]]
    //    is not new or unlinked.
    debug_assert!(!matches!(
        module.status(agent),
        Some(CyclicModuleRecordStatus::New | CyclicModuleRecordStatus::Unlinked)
    ));
    // 2. If phase is defer, let namespace be module.[[DeferredNamespace]],
    //    else let namespace be module.[[Namespace]].
    let fields = agent[module].abstract_fields();
    let namespace = match phase {
        ImportPhase::Defer => fields.deferred_namespace,
        ImportPhase::Evaluation => fields.namespace,
    };
    if let Some(namespace) = namespace {
        // 4. Return namespace.
        return namespace;
    }
    // 3. If namespace is empty, then
    // a. Let exportedNames be module.GetExportedNames().
    let exported_names = module.get_exported_names(agent, &mut vec![]);
    // b. Let unambiguousNames be a new empty List.
    let mut unambiguous_names = Vec::with_capacity(exported_names.len());
    // c. For each element name of exportedNames, do
    for name in exported_names {
        // i. Let resolution be module.ResolveExport(name).
        let resolution = module.resolve_export(agent, &name, &mut vec![]);
        // ii. If resolution is a ResolvedBinding Record, append name to
        //     unambiguousNames.
        if matches!(resolution, Some(ResolvedBinding::Resolved { .. })) {
            unambiguous_names.push(name);
        }
    }
    // d. Set namespace to ModuleNamespaceCreate(module, unambiguousNames, phase).
    module_namespace_create(agent, module, unambiguous_names, phase)
}

#[cfg(test)]
mod test {
    use super::*;

    fn attribute(key: &str, value: &str) -> ImportAttribute {
        ImportAttribute {
            key: key.into(),
            value: value.into(),
        }
    }

    #[test]
    fn requests_ignore_attribute_order_and_phase() {
        let left = ModuleRequestRecord::new("./data.json")
            .with_attributes(vec![attribute("type", "json"), attribute("mode", "strict")]);
        let right = ModuleRequestRecord::new("./data.json")
            .with_attributes(vec![attribute("mode", "strict"), attribute("type", "json")])
            .with_phase(ImportPhase::Defer);
        assert!(left.is_same_request(&right));
        assert_eq!(right.attribute("type"), Some("json"));
    }

    #[test]
    fn requests_differ_by_specifier_or_attributes() {
        let plain = ModuleRequestRecord::new("./data.json");
        let json = ModuleRequestRecord::new("./data.json")
            .with_attributes(vec![attribute("type", "json")]);
        let other = ModuleRequestRecord::new("./other.json");
        assert!(!plain.is_same_request(&json));
        assert!(!plain.is_same_request(&other));
        let css = ModuleRequestRecord::new("./data.json")
            .with_attributes(vec![attribute("type", "css")]);
        assert!(!json.is_same_request(&css));
    }
}
