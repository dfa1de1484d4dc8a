// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ### [16.2.1.6.1.1 LoadRequestedModules ( \[ hostDefined \] )](https://tc39.es/ecma262/#sec-LoadRequestedModules)
//!
//! Loading walks the dependency graph of a module and asks the host for
//! every request that has not been loaded yet. The host answers through
//! [`finish_loading_imported_module`], synchronously or from a later job,
//! and the walk resumes from the loaded module.
//!
//! [`finish_loading_imported_module`]: super::finish_loading_imported_module

use std::{cell::RefCell, rc::Rc};

use ahash::AHashSet;

use crate::ecmascript::{
    builtins::promise::{Promise, PromiseCapability},
    execution::{Agent, JsResult},
    scripts_and_modules::module::Module,
    types::HostDefined,
};

use super::{ModuleRequestRecord, cyclic_module_records::CyclicModuleRecordStatus, get_imported_module};

/// ### [GraphLoadingState Record](https://tc39.es/ecma262/#graphloadingstate-record)
///
/// The state of one LoadRequestedModules operation. It is handed to the host
/// as the opaque payload of HostLoadImportedModule and must be passed back
/// to FinishLoadingImportedModule.
#[derive(Debug, Clone)]
pub struct GraphLoadingState(Rc<RefCell<GraphLoadingStateRecord>>);

#[derive(Debug)]
struct GraphLoadingStateRecord {
    /// ### \[\[PromiseCapability]]
    ///
    /// The promise to resolve when the loading process finishes.
    promise_capability: PromiseCapability,
    /// ### \[\[IsLoading]]
    ///
    /// It is true if the loading process has not finished yet, neither
    /// successfully nor with an error.
    is_loading: bool,
    /// ### \[\[PendingModulesCount]]
    ///
    /// It tracks the number of pending HostLoadImportedModule calls.
    pending_modules_count: u32,
    /// ### \[\[Visited]]
    ///
    /// A list of the Cyclic Module Records that have been already loaded by
    /// the current loading process, to avoid infinite loops with circular
    /// dependencies.
    visited: Vec<Module>,
    visited_set: AHashSet<Module>,
    /// ### \[\[HostDefined]]
    ///
    /// It contains host-defined data to pass from the LoadRequestedModules
    /// caller to HostLoadImportedModule.
    host_defined: Option<HostDefined>,
    /// HostLoadImportedModule calls that have not been answered yet.
    outstanding_requests: Vec<(Module, ModuleRequestRecord)>,
}

impl GraphLoadingState {
    fn new(promise_capability: PromiseCapability, host_defined: Option<HostDefined>) -> Self {
        Self(Rc::new(RefCell::new(GraphLoadingStateRecord {
            promise_capability,
            is_loading: true,
            pending_modules_count: 1,
            visited: vec![],
            visited_set: AHashSet::new(),
            host_defined,
            outstanding_requests: vec![],
        })))
    }

    /// The promise settled when this loading operation finishes.
    pub fn promise(&self) -> Promise {
        self.0.borrow().promise_capability.promise()
    }

    pub fn is_loading(&self) -> bool {
        self.0.borrow().is_loading
    }

    pub fn host_defined(&self) -> Option<HostDefined> {
        self.0.borrow().host_defined.clone()
    }

    /// Number of HostLoadImportedModule calls the host has not answered.
    pub fn outstanding_request_count(&self) -> usize {
        self.0.borrow().outstanding_requests.len()
    }

    pub(super) fn take_outstanding_request(
        &self,
        referrer: Module,
        request: &ModuleRequestRecord,
    ) -> bool {
        let mut state = self.0.borrow_mut();
        let Some(index) = state
            .outstanding_requests
            .iter()
            .position(|(module, r)| *module == referrer && r.is_same_request(request))
        else {
            return false;
        };
        state.outstanding_requests.swap_remove(index);
        true
    }

    /// Marks the module visited if it is a new Cyclic Module Record that has
    /// not been visited yet, and returns true in that case.
    fn visit(&self, agent: &Agent, module: Module) -> bool {
        let mut state = self.0.borrow_mut();
        if !matches!(module.status(agent), Some(CyclicModuleRecordStatus::New))
            || state.visited_set.contains(&module)
        {
            return false;
        }
        let requested_modules_count = module.requested_modules(agent).len() as u32;
        state.visited_set.insert(module);
        state.visited.push(module);
        state.pending_modules_count += requested_modules_count;
        true
    }
}

/// ### [16.2.1.6.1.1 LoadRequestedModules ( \[ hostDefined \] )](https://tc39.es/ecma262/#sec-LoadRequestedModules)
///
/// The LoadRequestedModules concrete method of a Cyclic Module Record
/// module takes optional argument hostDefined (anything) and returns a
/// Promise. It populates the \[\[LoadedModules]] of all the Module Records
/// in the dependency graph of module (most of the work is done by the
/// auxiliary function InnerModuleLoading). It takes an optional
/// hostDefined parameter that is passed to the HostLoadImportedModule
/// hook.
#[tracing::instrument(level = "debug", skip_all, fields(module = ?module))]
pub fn load_requested_modules(
    agent: &mut Agent,
    module: Module,
    host_defined: Option<HostDefined>,
) -> Promise {
    // 1. If hostDefined is not present, let hostDefined be empty.
    // 2. Let pc be ! NewPromiseCapability(%Promise%).
    let promise_capability = PromiseCapability::new(agent);
    // 3. Let state be the GraphLoadingState Record {
    //      [[IsLoading]]: true,
    //      [[PendingModulesCount]]: 1,
    //      [[Visited]]: « »,
    //      [[PromiseCapability]]: pc,
    //      [[HostDefined]]: hostDefined
    //    }.
    let state = GraphLoadingState::new(promise_capability, host_defined);
    // 4. Perform InnerModuleLoading(state, module).
    inner_module_loading(agent, &state, module);
    // 5. Return pc.[[Promise]].
    promise_capability.promise()
}

/// ### [16.2.1.6.1.1.1 InnerModuleLoading ( state, module )](https://tc39.es/ecma262/#sec-InnerModuleLoading)
///
/// The abstract operation InnerModuleLoading takes arguments state (a
/// GraphLoadingState Record) and module (a Module Record) and returns
/// unused. It is used by LoadRequestedModules to recursively perform the
/// actual loading process for module's dependency graph.
///
/// Dependencies that are already loaded are descended into through an
/// explicit stack of `(module, next request)` frames.
pub(super) fn inner_module_loading(agent: &mut Agent, state: &GraphLoadingState, module: Module) {
    // 1. Assert: state.[[IsLoading]] is true.
    debug_assert!(state.is_loading());
    let mut stack: Vec<(Module, usize)> = Vec::with_capacity(8);
    // 2. If module is a Cyclic Module Record, module.[[Status]] is new, and
    //    state.[[Visited]] does not contain module, then
    //     a. Append module to state.[[Visited]].
    //     b. Let requestedModulesCount be the number of elements in
    //        module.[[RequestedModules]].
    //     c. Set state.[[PendingModulesCount]] to
    //        state.[[PendingModulesCount]] + requestedModulesCount.
    if state.visit(agent, module) {
        stack.push((module, 0));
    } else {
        finish_inner_module_loading(agent, state);
        return;
    }
    while let Some((module, index)) = stack.last_mut() {
        let module = *module;
        // d. For each ModuleRequest Record request of
        //    module.[[RequestedModules]], do
        let Some(request) = module.requested_modules(agent).get(*index).cloned() else {
            stack.pop();
            finish_inner_module_loading(agent, state);
            if !state.is_loading() {
                return;
            }
            continue;
        };
        *index += 1;
        // i. If AllImportAttributesSupported(request.[[Attributes]]) is false, then
        //     1. Let error be ThrowCompletion(a newly created SyntaxError object).
        //     2. Perform ContinueModuleLoading(state, error).
        // ii. Else if module.[[LoadedModules]] contains a LoadedModuleRequest
        //     Record record such that ModuleRequestsEqual(record, request) is
        //     true, then
        if let Some(loaded) = get_imported_module(agent, module, &request) {
            // 1. Perform InnerModuleLoading(state, record.[[Module]]).
            if state.visit(agent, loaded) {
                stack.push((loaded, 0));
                continue;
            }
            finish_inner_module_loading(agent, state);
        } else {
            // iii. Else,
            // 1. Perform HostLoadImportedModule(module, request,
            //    state.[[HostDefined]], state).
            // 2. NOTE: HostLoadImportedModule will call
            //    FinishLoadingImportedModule, which re-enters the graph
            //    loading process through ContinueModuleLoading.
            state
                .0
                .borrow_mut()
                .outstanding_requests
                .push((module, request.clone()));
            let host_defined = state.host_defined();
            tracing::trace!(referrer = ?module, specifier = request.specifier(), "loading module");
            let host_hooks = agent.host_hooks;
            host_hooks.host_load_imported_module(agent, module, &request, host_defined, state.clone());
        }
        // iv. If state.[[IsLoading]] is false, return unused.
        if !state.is_loading() {
            return;
        }
    }
    // 6. Return unused.
}

/// Steps 3 to 5 of InnerModuleLoading: one module's descent has finished.
fn finish_inner_module_loading(agent: &mut Agent, state: &GraphLoadingState) {
    let (visited, promise_capability) = {
        let mut record = state.0.borrow_mut();
        // 3. Assert: state.[[PendingModulesCount]] ≥ 1.
        debug_assert!(record.pending_modules_count >= 1);
        // 4. Set state.[[PendingModulesCount]] to
        //    state.[[PendingModulesCount]] - 1.
        record.pending_modules_count -= 1;
        // 5. If state.[[PendingModulesCount]] = 0, then
        if record.pending_modules_count != 0 {
            return;
        }
        // a. Set state.[[IsLoading]] to false.
        record.is_loading = false;
        (core::mem::take(&mut record.visited), record.promise_capability)
    };
    // b. For each Cyclic Module Record loaded of state.[[Visited]], do
    for loaded in visited.iter() {
        // i. If loaded.[[Status]] is new, set loaded.[[Status]] to unlinked.
        let cyclic = loaded.cyclic_mut(agent);
        if cyclic.status == CyclicModuleRecordStatus::New {
            cyclic.status = CyclicModuleRecordStatus::Unlinked;
        }
    }
    tracing::debug!(modules = visited.len(), "module graph loaded");
    // c. Perform ! Call(state.[[PromiseCapability]].[[Resolve]], undefined,
    //    « undefined »).
    promise_capability.resolve(agent);
}

/// ### [16.2.1.6.1.1.2 ContinueModuleLoading ( state, moduleCompletion )](https://tc39.es/ecma262/#sec-ContinueModuleLoading)
///
/// The abstract operation ContinueModuleLoading takes arguments state (a
/// GraphLoadingState Record) and moduleCompletion (either a normal
/// completion containing a Module Record or a throw completion) and returns
/// unused. It is used to re-enter the loading process after a call to
/// HostLoadImportedModule.
pub(super) fn continue_module_loading(
    agent: &mut Agent,
    state: &GraphLoadingState,
    module_completion: JsResult<Module>,
) {
    // 1. If state.[[IsLoading]] is false, return unused.
    if !state.is_loading() {
        return;
    }
    match module_completion {
        // 2. If moduleCompletion is a normal completion, then
        Ok(module) => {
            // a. Perform InnerModuleLoading(state, moduleCompletion.[[Value]]).
            inner_module_loading(agent, state, module);
        }
        // 3. Else,
        Err(error) => {
            tracing::debug!(error = error.message(agent), "module graph loading failed");
            // a. Set state.[[IsLoading]] to false.
            let promise_capability = {
                let mut record = state.0.borrow_mut();
                record.is_loading = false;
                record.promise_capability
            };
            // b. Perform ! Call(state.[[PromiseCapability]].[[Reject]],
            //    undefined, « moduleCompletion.[[Value]] »).
            promise_capability.reject(agent, error);
        }
    }
    // 4. Return unused.
}
