// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ## [16.2.1.8 Synthetic Module Records](https://tc39.es/ecma262/#sec-synthetic-module-records)
//!
//! A Synthetic Module Record is used to represent information about a module
//! that is defined by specifications. Its exported names are statically
//! defined at creation, while their corresponding values can change over
//! time using SetSyntheticExport. It has no imports or dependencies.
//!
//! > NOTE: A Synthetic Module Record could be used for defining a variety of
//! > module types: for example, JSON modules or CSS modules.

use core::fmt;
use std::rc::Rc;

use ahash::AHashMap;

use crate::{
    ecmascript::{
        builtins::promise::Promise,
        execution::{Agent, ExceptionType, JsResult, Realm},
        scripts_and_modules::module::{Module, ModuleHeapData},
        types::{HostDefined, Value},
    },
    heap::CreateHeapData,
};

use super::abstract_module_records::{AbstractModuleRecord, ResolvedBinding};

/// ### \[\[EvaluationSteps]]
///
/// The initialization logic to perform upon evaluation of the module, taking
/// the Synthetic Module Record as its sole argument. These will usually set
/// up the exported values, by using SetSyntheticExport. They must not modify
/// \[\[ExportNames]]. They may return an abrupt completion.
pub type SyntheticEvaluationSteps = Box<dyn FnOnce(&mut Agent, Module) -> JsResult<()>>;

pub struct SyntheticModuleRecord {
    pub(crate) abstract_fields: AbstractModuleRecord,
    /// ### \[\[ExportNames]]
    ///
    /// The names of the exports of the module. This list does not contain
    /// duplicates.
    pub(crate) export_names: Box<[Rc<str>]>,
    /// ### \[\[EvaluationSteps]]
    ///
    /// Taken when the module is evaluated for the first time.
    evaluation_steps: Option<SyntheticEvaluationSteps>,
    /// The values of the exported bindings. Unset exports read as undefined.
    bindings: AHashMap<Rc<str>, Value>,
    /// The completion of \[\[EvaluationSteps]].
    evaluation_result: Option<JsResult<()>>,
}

impl fmt::Debug for SyntheticModuleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyntheticModuleRecord")
            .field("abstract_fields", &self.abstract_fields)
            .field("export_names", &self.export_names)
            .field("bindings", &self.bindings)
            .field("evaluation_result", &self.evaluation_result)
            .finish_non_exhaustive()
    }
}

fn synthetic_record(agent: &Agent, module: Module) -> Option<&SyntheticModuleRecord> {
    match &agent[module] {
        ModuleHeapData::Synthetic(record) => Some(record.as_ref()),
        ModuleHeapData::SourceText(_) => None,
    }
}

fn synthetic_record_mut(agent: &mut Agent, module: Module) -> Option<&mut SyntheticModuleRecord> {
    match &mut agent[module] {
        ModuleHeapData::Synthetic(record) => Some(record.as_mut()),
        ModuleHeapData::SourceText(_) => None,
    }
}

/// ### [16.2.1.8.1 CreateSyntheticModule ( exportNames, evaluationSteps, realm, hostDefined )](https://tc39.es/ecma262/#sec-create-synthetic-module)
///
/// Duplicate export names are dropped.
pub fn create_synthetic_module(
    agent: &mut Agent,
    export_names: &[&str],
    evaluation_steps: SyntheticEvaluationSteps,
    realm: Realm,
    host_defined: Option<HostDefined>,
) -> Module {
    let mut names: Vec<Rc<str>> = Vec::with_capacity(export_names.len());
    for name in export_names {
        if !names.iter().any(|existing| &**existing == *name) {
            names.push((*name).into());
        }
    }
    // 1. Return Synthetic Module Record {
    //      [[Realm]]: realm,
    //      [[Environment]]: empty,
    //      [[Namespace]]: empty,
    //      [[HostDefined]]: hostDefined,
    //      [[ExportNames]]: exportNames,
    //      [[EvaluationSteps]]: evaluationSteps
    //    }.
    let record = SyntheticModuleRecord {
        abstract_fields: AbstractModuleRecord::new(realm, host_defined),
        export_names: names.into_boxed_slice(),
        evaluation_steps: Some(evaluation_steps),
        bindings: AHashMap::default(),
        evaluation_result: None,
    };
    agent
        .heap
        .create(ModuleHeapData::Synthetic(Box::new(record)))
}

/// ### [16.2.1.8.2 CreateDefaultExportSyntheticModule ( defaultExport, realm, hostDefined )](https://tc39.es/ecma262/#sec-create-default-export-synthetic-module)
///
/// Creates a Synthetic Module Record whose default export is defaultExport.
pub fn create_default_export_synthetic_module(
    agent: &mut Agent,
    default_export: Value,
    realm: Realm,
    host_defined: Option<HostDefined>,
) -> Module {
    // 1. Let closure be a new Abstract Closure with parameters (module) that
    //    captures defaultExport and performs the following steps when called:
    //     a. Perform SetSyntheticModuleExport(module, "default", defaultExport).
    //     b. Return NormalCompletion(unused).
    let closure: SyntheticEvaluationSteps = Box::new(move |agent, module| {
        set_synthetic_export(agent, module, "default", default_export)
    });
    // 2. Return CreateSyntheticModule(« "default" », closure, realm, hostDefined).
    create_synthetic_module(agent, &["default"], closure, realm, host_defined)
}

/// ### [16.2.1.8.3 SetSyntheticModuleExport ( module, exportName, exportValue )](https://tc39.es/ecma262/#sec-setsyntheticmoduleexport)
///
/// Setting a name that the module does not export throws a ReferenceError.
pub fn set_synthetic_export(
    agent: &mut Agent,
    module: Module,
    export_name: &str,
    export_value: Value,
) -> JsResult<()> {
    let exported = synthetic_record(agent, module)
        .and_then(|record| {
            record
                .export_names
                .iter()
                .find(|name| &***name == export_name)
        })
        .cloned();
    // 1. Assert: module.[[ExportNames]] contains exportName.
    let Some(name) = exported else {
        return Err(agent.throw_exception(
            ExceptionType::ReferenceError,
            format!("Synthetic module does not export '{export_name}'"),
        ));
    };
    // 2. Let envRec be module.[[Environment]].
    // 3. Assert: envRec is not empty.
    // 4. Perform envRec.SetMutableBinding(exportName, exportValue, true).
    if let Some(record) = synthetic_record_mut(agent, module) {
        record.bindings.insert(name, export_value);
    }
    // 5. Return unused.
    Ok(())
}

/// ### [16.2.1.8.4.1 LoadRequestedModules ( )](https://tc39.es/ecma262/#sec-smr-LoadRequestedModules)
///
/// The LoadRequestedModules concrete method of a Synthetic Module Record
/// module takes no arguments and returns a Promise.
pub(crate) fn load_requested_modules(agent: &mut Agent, _module: Module) -> Promise {
    // 1. Return ! PromiseResolve(%Promise%, undefined).
    Promise::new_resolved(agent)
}

/// ### [16.2.1.8.4.3 ResolveExport ( exportName )](https://tc39.es/ecma262/#sec-smr-resolveexport)
pub(crate) fn resolve_export(agent: &Agent, module: Module, export_name: &str) -> Option<ResolvedBinding> {
    let record = synthetic_record(agent, module)?;
    // 1. If module.[[ExportNames]] does not contain exportName, return null.
    let name = record
        .export_names
        .iter()
        .find(|name| &***name == export_name)?;
    // 2. Return ResolvedBinding Record { [[Module]]: module, [[BindingName]]:
    //    exportName }.
    Some(ResolvedBinding::Resolved {
        module,
        binding_name: Some(name.clone()),
    })
}

/// Reads an exported binding of a Synthetic Module Record.
pub(crate) fn get_binding_value(agent: &Agent, module: Module, name: &str) -> Value {
    synthetic_record(agent, module)
        .and_then(|record| record.bindings.get(name).cloned())
        .unwrap_or_default()
}

/// Runs \[\[EvaluationSteps]] the first time it is called and returns their
/// completion, on every call.
pub(crate) fn evaluate_module_sync(agent: &mut Agent, module: Module) -> JsResult<()> {
    let Some(record) = synthetic_record_mut(agent, module) else {
        return Ok(());
    };
    if let Some(result) = record.evaluation_result {
        return result;
    }
    // Evaluation steps that observe their own module find them taken.
    let Some(evaluation_steps) = record.evaluation_steps.take() else {
        return Ok(());
    };
    // 1. Let moduleContext be a new ECMAScript code execution context.
    // 2-7. Push moduleContext onto the execution context stack.
    // 8. Let steps be module.[[EvaluationSteps]].
    // 9. Let result be Completion(steps(module)).
    let result = evaluation_steps(agent, module);
    tracing::trace!(module = ?module, ok = result.is_ok(), "evaluated synthetic module");
    // 10. Suspend moduleContext and remove it from the execution context
    //     stack.
    if let Some(record) = synthetic_record_mut(agent, module) {
        record.evaluation_result = Some(result);
    }
    result
}

/// ### [16.2.1.8.4.5 Evaluate ( )](https://tc39.es/ecma262/#sec-smr-Evaluate)
///
/// The Evaluate concrete method of a Synthetic Module Record module takes no
/// arguments and returns a Promise.
pub(crate) fn evaluate(agent: &mut Agent, module: Module) -> Promise {
    // 11. Resume the context that is now on the top of the execution context
    //     stack as the running execution context.
    // 12. Let pc be ! NewPromiseCapability(%Promise%).
    // 13. IfAbruptRejectPromise(result, pc).
    // 14. Perform ! Call(pc.[[Resolve]], undefined, « undefined »).
    // 15. Return pc.[[Promise]].
    match evaluate_module_sync(agent, module) {
        Ok(()) => Promise::new_resolved(agent),
        Err(error) => Promise::new_rejected(agent, error),
    }
}

#[cfg(test)]
mod test {
    use std::cell::Cell;

    use super::*;
    use crate::ecmascript::{
        execution::{DefaultHostHooks, Options},
        scripts_and_modules::module::module_semantics::{
            ImportPhase, abstract_module_records::ModuleAbstractMethods, get_module_namespace,
        },
    };

    #[test]
    fn evaluation_steps_run_once() {
        let mut agent = Agent::new(Options::default(), &DefaultHostHooks);
        let realm = agent.create_realm(None);
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let module = create_synthetic_module(
            &mut agent,
            &["a", "b", "a"],
            Box::new(move |agent, module| {
                counter.set(counter.get() + 1);
                set_synthetic_export(agent, module, "a", Value::from(1.0))
            }),
            realm,
            None,
        );
        assert_eq!(module.get_exported_names(&agent, &mut vec![]).len(), 2);
        assert!(module.link(&mut agent).is_ok());
        let first = module.evaluate(&mut agent);
        let second = module.evaluate(&mut agent);
        assert_eq!(first.result(&agent), Some(Ok(())));
        assert_eq!(second.result(&agent), Some(Ok(())));
        assert_eq!(runs.get(), 1);
        assert_eq!(get_binding_value(&agent, module, "a"), Value::from(1.0));
        assert_eq!(get_binding_value(&agent, module, "b"), Value::Undefined);
    }

    #[test]
    fn failed_evaluation_is_remembered() {
        let mut agent = Agent::new(Options::default(), &DefaultHostHooks);
        let realm = agent.create_realm(None);
        let module = create_synthetic_module(
            &mut agent,
            &[],
            Box::new(|agent, _| Err(agent.throw_exception(ExceptionType::Error, "broken"))),
            realm,
            None,
        );
        let first = module.evaluate(&mut agent).result(&agent);
        let second = module.evaluate(&mut agent).result(&agent);
        assert!(matches!(first, Some(Err(_))));
        assert_eq!(first, second);
    }

    #[test]
    fn default_export_module() {
        let mut agent = Agent::new(Options::default(), &DefaultHostHooks);
        let realm = agent.create_realm(None);
        let module =
            create_default_export_synthetic_module(&mut agent, Value::from("json"), realm, None);
        assert_eq!(
            module.resolve_export(&agent, "default", &mut vec![]),
            Some(ResolvedBinding::Resolved {
                module,
                binding_name: Some("default".into()),
            })
        );
        assert_eq!(module.resolve_export(&agent, "other", &mut vec![]), None);
        let namespace = get_module_namespace(&mut agent, module, ImportPhase::Evaluation);
        module.evaluate(&mut agent);
        assert_eq!(namespace.get(&mut agent, "default"), Ok(Value::from("json")));
    }

    #[test]
    fn setting_unknown_export_throws() {
        let mut agent = Agent::new(Options::default(), &DefaultHostHooks);
        let realm = agent.create_realm(None);
        let module = create_synthetic_module(&mut agent, &["a"], Box::new(|_, _| Ok(())), realm, None);
        let error = set_synthetic_export(&mut agent, module, "b", Value::Null).unwrap_err();
        assert_eq!(error.kind(&agent), ExceptionType::ReferenceError);
    }
}
