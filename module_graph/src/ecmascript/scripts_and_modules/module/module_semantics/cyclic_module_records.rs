// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ## [16.2.1.6 Cyclic Module Records](https://tc39.es/ecma262/#sec-cyclic-module-records)

use core::fmt::Debug;

use crate::ecmascript::{
    builtins::promise::PromiseCapability,
    execution::{Agent, ExceptionType, JsError, JsResult},
    scripts_and_modules::module::Module,
    types::Value,
};

use super::{LoadedModuleRecord, ModuleRequestRecord, imported_module, source_text_module_records};

/// ### \[\[Status]]
///
/// Initially new. Transitions to unlinked, linking, linked, then either
/// evaluating, possibly evaluating-async, evaluated or, for a module only
/// reached through `import defer`, async-subgraphs-searching, possibly
/// async-subgraphs-searching-async, async-subgraphs-evaluated. A module in an
/// async-subgraphs status has not run its own body yet and moves on to
/// evaluating once it is evaluated for real.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum CyclicModuleRecordStatus {
    #[default]
    New,
    Unlinked,
    Linking,
    Linked,
    Evaluating,
    EvaluatingAsync,
    Evaluated,
    AsyncSubgraphsSearching,
    AsyncSubgraphsSearchingAsync,
    AsyncSubgraphsEvaluated,
}

impl CyclicModuleRecordStatus {
    /// Returns true if the module has not run its own body and is not
    /// running it.
    pub fn is_deferred_only(self) -> bool {
        matches!(
            self,
            Self::Linked
                | Self::AsyncSubgraphsSearching
                | Self::AsyncSubgraphsSearchingAsync
                | Self::AsyncSubgraphsEvaluated
        )
    }
}

/// ### \[\[AsyncEvaluation]]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum AsyncEvaluation {
    /// The module is synchronous and has no asynchronous dependency.
    #[default]
    None,
    /// The module, or one of its dependencies, is executing asynchronously.
    Pending,
    /// The asynchronous execution has finished.
    Settled,
}

#[derive(Debug)]
pub(crate) struct CyclicModuleRecord {
    /// ### \[\[Status]]
    pub(crate) status: CyclicModuleRecordStatus,
    /// ### \[\[EvaluationError]]
    ///
    /// a throw completion or empty
    ///
    /// A throw completion representing the exception that occurred during
    /// evaluation. undefined if no exception occurred or if `[[Status]]` is
    /// not evaluated.
    pub(crate) evaluation_error: Option<JsError>,
    /// ### \[\[DFSIndex]]
    ///
    /// Auxiliary field used during Link and Evaluate only. If `[[Status]]` is
    /// either linking or evaluating, this non-negative number records the
    /// point at which the module was first visited during the depth-first
    /// traversal of the dependency graph.
    pub(crate) dfs_index: u32,
    /// ### \[\[DFSAncestorIndex]]
    ///
    /// Auxiliary field used during Link and Evaluate only. If `[[Status]]` is
    /// either linking or evaluating, this is either the module's own
    /// `[[DFSIndex]]` or that of an "earlier" module in the same strongly
    /// connected component.
    pub(crate) dfs_ancestor_index: u32,
    /// ### \[\[RequestedModules]]
    ///
    /// a List of ModuleRequest Records
    ///
    /// A List of the ModuleRequest Records associated with the imports in this
    /// module. The List is in source text occurrence order of the imports.
    pub(crate) requested_modules: Box<[ModuleRequestRecord]>,
    /// ### \[\[LoadedModules]]
    ///
    /// a List of LoadedModuleRequest Records
    ///
    /// A map from the specifier strings used by the module represented by this
    /// record to request the importation of a module with the relative import
    /// attributes to the resolved Module Record. The list does not contain two
    /// different Records r1 and r2 such that ModuleRequestsEqual(r1, r2) is true.
    pub(crate) loaded_modules: Vec<LoadedModuleRecord>,
    /// ### \[\[CycleRoot]]
    ///
    /// The first visited module of the cycle, the root DFS ancestor of the
    /// strongly connected component. For a module not in a cycle, this would
    /// be the module itself. Once Evaluate has completed, a module's
    /// `[[DFSAncestorIndex]]` is the `[[DFSIndex]]` of its `[[CycleRoot]]`.
    pub(crate) cycle_root: Option<Module>,
    /// ### \[\[HasTLA]]
    ///
    /// Whether this module is individually asynchronous (for example, if it's
    /// a Source Text Module Record containing a top-level await). Having an
    /// asynchronous dependency does not mean this field is true. This field
    /// must not change after the module is parsed.
    pub(crate) has_tla: bool,
    /// ### \[\[AsyncEvaluation]]
    pub(crate) async_evaluation: AsyncEvaluation,
    /// ### \[\[TopLevelCapability]]
    ///
    /// a PromiseCapability Record or empty
    ///
    /// If this module is the `[[CycleRoot]]` of some cycle, and Evaluate() was
    /// called on some module in that cycle, this field contains the
    /// PromiseCapability Record for that entire evaluation. It is used to
    /// settle the Promise object that is returned from the Evaluate() abstract
    /// method. This field will be empty for any dependencies of that module,
    /// unless a top-level Evaluate() has been initiated for some of those
    /// dependencies.
    pub(crate) top_level_capability: Option<PromiseCapability>,
    /// ### \[\[AsyncParentModules]]
    ///
    /// a List of Cyclic Module Records
    ///
    /// If this module or a dependency has `[[HasTLA]]` true, and execution is
    /// in progress, this tracks the parent importers of this module for the
    /// top-level execution job. These parent modules will not start executing
    /// before this module has successfully completed execution.
    pub(crate) async_parent_modules: Vec<Module>,
    /// ### \[\[PendingAsyncDependencies]]
    ///
    /// If this module has any asynchronous dependencies, this tracks the
    /// number of asynchronous dependency modules remaining to execute for this
    /// module. A module with asynchronous dependencies will be executed when
    /// this field reaches 0 and there are no execution errors.
    pub(crate) pending_async_dependencies: u32,
}

impl CyclicModuleRecord {
    pub(crate) fn new(has_tla: bool, requested_modules: Box<[ModuleRequestRecord]>) -> Self {
        Self {
            status: CyclicModuleRecordStatus::New,
            evaluation_error: None,
            dfs_index: 0,
            dfs_ancestor_index: 0,
            requested_modules,
            loaded_modules: vec![],
            cycle_root: None,
            has_tla,
            async_evaluation: AsyncEvaluation::None,
            top_level_capability: None,
            async_parent_modules: vec![],
            pending_async_dependencies: 0,
        }
    }

    /// Set \[\[DFSIndex]] and \[\[DFSAncestorIndex]] to index.
    pub(super) fn set_dfs_index(&mut self, index: u32) {
        self.dfs_index = index;
        self.dfs_ancestor_index = index;
    }
}

/// ### [Additional Abstract Methods of Cyclic Module Records](https://tc39.es/ecma262/#table-cyclic-module-methods)
///
/// The part of a Cyclic Module Record that belongs to the body evaluator:
/// the module's own declarations and top-level code. The graph algorithms
/// call these at most once per module, in dependency order.
pub trait CyclicModuleBody: Debug {
    /// ### InitializeEnvironment()
    ///
    /// Initialize the Environment Record of the module, including resolving
    /// all imported bindings, and create the module's execution context.
    ///
    /// Import bindings are already resolved by the engine when this is
    /// called; the body only sets up its own declarations.
    fn initialize_environment(&self, agent: &mut Agent, module: Module) -> JsResult<()>;

    /// ### ExecuteModule(\[promiseCapability])
    ///
    /// Evaluate the module's code within its execution context. If this module
    /// has true in \[\[HasTLA]], then a PromiseCapability Record is passed as
    /// an argument, and the method is expected to resolve or reject the given
    /// capability. In this case, the method must not throw an exception, but
    /// instead reject the PromiseCapability Record if necessary.
    fn execute_module(
        &self,
        agent: &mut Agent,
        module: Module,
        promise_capability: Option<PromiseCapability>,
    ) -> JsResult<()>;

    /// Read the current value of a binding declared by the module.
    ///
    /// Reading a binding that has not been initialized yet throws a
    /// ReferenceError.
    fn get_binding_value(&self, agent: &mut Agent, module: Module, name: &str) -> JsResult<Value>;
}

impl Module {
    pub(super) fn set_status(self, agent: &mut Agent, status: CyclicModuleRecordStatus) {
        let cyclic = self.cyclic_mut(agent);
        tracing::trace!(module = ?self, from = ?cyclic.status, to = ?status, "module status");
        cyclic.status = status;
    }

    /// ### \[\[CycleRoot]]
    ///
    /// The module itself if it has not been part of an evaluation yet.
    pub fn cycle_root(self, agent: &Agent) -> Module {
        agent[self]
            .cyclic()
            .and_then(|cyclic| cyclic.cycle_root)
            .unwrap_or(self)
    }
}

/// Calls InitializeEnvironment() on a Cyclic Module Record.
fn initialize_environment(agent: &mut Agent, module: Module) -> JsResult<()> {
    source_text_module_records::initialize_environment(agent, module)
}

/// Calls ExecuteModule(\[promiseCapability]) on a Cyclic Module Record.
pub(super) fn execute_module(
    agent: &mut Agent,
    module: Module,
    promise_capability: Option<PromiseCapability>,
) -> JsResult<()> {
    let Some(body) = source_text_module_records::module_body(agent, module) else {
        return Ok(());
    };
    tracing::trace!(module = ?module, is_async = promise_capability.is_some(), "executing module");
    body.execute_module(agent, module, promise_capability)
}

/// ### [16.2.1.6.1.2 Link ( )](https://tc39.es/ecma262/#sec-moduledeclarationlinking)
///
/// The Link concrete method of a Cyclic Module Record module takes no
/// arguments and returns either a normal completion containing unused or a
/// throw completion. On success, Link transitions this module's \[\[Status]]
/// from unlinked to linked. On failure, an exception is thrown and this
/// module's \[\[Status]] remains unlinked. (Most of the work is done by the
/// auxiliary function InnerModuleLinking.)
#[tracing::instrument(level = "debug", skip_all, fields(module = ?module))]
pub fn link(agent: &mut Agent, module: Module) -> JsResult<()> {
    // 1. Assert: module.[[Status]] is one of unlinked, linked,
    //    evaluating-async, or evaluated.
    // Linking a module that is not loaded, or is already linking, throws.
    match module.status(agent) {
        Some(CyclicModuleRecordStatus::New) => {
            return Err(agent.throw_exception(
                ExceptionType::TypeError,
                "Cannot link a module that is not loaded",
            ));
        }
        Some(CyclicModuleRecordStatus::Linking) => {
            return Err(agent.throw_exception(
                ExceptionType::TypeError,
                "Cannot link a module that is already being linked",
            ));
        }
        _ => {}
    }
    // 2. Let stack be a new empty List.
    let mut stack = Vec::with_capacity(8);
    // 3. Let result be Completion(InnerModuleLinking(module, stack, 0)).
    let result = inner_module_linking(agent, module, &mut stack, 0);
    // 4. If result is an abrupt completion, then
    if let Err(error) = result {
        tracing::debug!(error = error.message(agent), "module linking failed");
        // a. For each Cyclic Module Record m of stack, do
        for m in stack {
            // i. Assert: m.[[Status]] is linking.
            debug_assert_eq!(m.status(agent), Some(CyclicModuleRecordStatus::Linking));
            // ii. Set m.[[Status]] to unlinked.
            m.set_status(agent, CyclicModuleRecordStatus::Unlinked);
        }
        // b. Assert: module.[[Status]] is unlinked.
        // c. Return ? result.
        return Err(error);
    }
    // 5. Assert: module.[[Status]] is one of linked, evaluating-async, or
    //    evaluated.
    // 6. Assert: stack is empty.
    debug_assert!(stack.is_empty());
    // 7. Return unused.
    Ok(())
}

/// ### [16.2.1.6.1.2.1 InnerModuleLinking ( module, stack, index )](https://tc39.es/ecma262/#sec-InnerModuleLinking)
///
/// The abstract operation InnerModuleLinking takes arguments module (a Module
/// Record), stack (a List of Cyclic Module Records), and index (a non-negative
/// integer) and returns either a normal completion containing a non-negative
/// integer or a throw completion. It is used by Link to perform the actual
/// linking process for module, as well as recursively on all other modules in
/// the dependency graph. The stack and index parameters, as well as a module's
/// \[\[DFSIndex]] and \[\[DFSAncestorIndex]] fields, keep track of the
/// depth-first search (DFS) traversal. In particular, \[\[DFSAncestorIndex]]
/// is used to discover strongly connected components (SCCs), such that all
/// modules in an SCC transition to linked together.
///
/// The recursion is driven by an explicit list of `(module, next request)`
/// frames so that the depth of the graph is not limited by the native stack.
pub(super) fn inner_module_linking(
    agent: &mut Agent,
    module: Module,
    stack: &mut Vec<Module>,
    index: u32,
) -> JsResult<u32> {
    let mut index = index;
    let mut frames: Vec<(Module, usize)> = Vec::with_capacity(8);
    if !enter_module_linking(agent, module, stack, &mut index) {
        return Ok(index);
    }
    frames.push((module, 0));
    while let Some((module, next_request)) = frames.last_mut() {
        let module = *module;
        // 9. For each ModuleRequest Record request of
        //    module.[[RequestedModules]], do
        if let Some(request) = module.requested_modules(agent).get(*next_request).cloned() {
            *next_request += 1;
            // a. Let requiredModule be GetImportedModule(module, request).
            let required_module = imported_module(agent, module, &request);
            // b. Set index to ? InnerModuleLinking(requiredModule, stack, index).
            if enter_module_linking(agent, required_module, stack, &mut index) {
                frames.push((required_module, 0));
                continue;
            }
            after_module_linking(agent, module, required_module, stack);
            continue;
        }
        frames.pop();
        // 10. Perform ? module.InitializeEnvironment().
        initialize_environment(agent, module)?;
        // 11. Assert: module occurs exactly once in stack.
        debug_assert_eq!(stack.iter().filter(|m| **m == module).count(), 1);
        // 12. Assert: module.[[DFSAncestorIndex]] ≤ module.[[DFSIndex]].
        let cyclic = module.cyclic(agent);
        debug_assert!(cyclic.dfs_ancestor_index <= cyclic.dfs_index);
        // 13. If module.[[DFSAncestorIndex]] = module.[[DFSIndex]], then
        if cyclic.dfs_ancestor_index == cyclic.dfs_index {
            // a. Let done be false.
            // b. Repeat, while done is false,
            let mut linked = 0usize;
            // i. Let requiredModule be the last element of stack.
            // ii. Remove the last element of stack.
            while let Some(required_module) = stack.pop() {
                // iii. Assert: requiredModule is a Cyclic Module Record.
                // iv. Set requiredModule.[[Status]] to linked.
                required_module.set_status(agent, CyclicModuleRecordStatus::Linked);
                linked += 1;
                // v. If requiredModule and module are the same Module
                //    Record, set done to true.
                if required_module == module {
                    break;
                }
            }
            tracing::trace!(root = ?module, modules = linked, "linked strongly connected component");
        }
        if let Some((parent, _)) = frames.last() {
            after_module_linking(agent, *parent, module, stack);
        }
    }
    // 14. Return index.
    Ok(index)
}

/// Steps 1 to 8 of InnerModuleLinking. Returns true if the module was pushed
/// onto the stack and its requests must be visited.
fn enter_module_linking(
    agent: &mut Agent,
    module: Module,
    stack: &mut Vec<Module>,
    index: &mut u32,
) -> bool {
    // 1. If module is not a Cyclic Module Record, then
    //     a. Perform ? module.Link().
    //     b. Return index.
    let Some(status) = module.status(agent) else {
        return false;
    };
    // 2. If module.[[Status]] is one of linking, linked, evaluating-async, or
    //    evaluated, then
    //     a. Return index.
    if status != CyclicModuleRecordStatus::Unlinked {
        debug_assert_ne!(status, CyclicModuleRecordStatus::New);
        return false;
    }
    // 3. Assert: module.[[Status]] is unlinked.
    // 4. Set module.[[Status]] to linking.
    module.set_status(agent, CyclicModuleRecordStatus::Linking);
    // 5. Set module.[[DFSIndex]] to index.
    // 6. Set module.[[DFSAncestorIndex]] to index.
    module.cyclic_mut(agent).set_dfs_index(*index);
    // 7. Set index to index + 1.
    *index += 1;
    // 8. Append module to stack.
    stack.push(module);
    true
}

/// Step 9.c of InnerModuleLinking.
fn after_module_linking(agent: &mut Agent, module: Module, required_module: Module, stack: &[Module]) {
    // c. If requiredModule is a Cyclic Module Record, then
    let Some(required) = agent[required_module].cyclic() else {
        return;
    };
    // i. Assert: requiredModule.[[Status]] is one of linking, linked,
    //    evaluating-async, or evaluated.
    // ii. Assert: requiredModule.[[Status]] is linking if and only if stack
    //     contains requiredModule.
    debug_assert_eq!(
        required.status == CyclicModuleRecordStatus::Linking,
        stack.contains(&required_module)
    );
    // iii. If requiredModule.[[Status]] is linking, then
    if required.status == CyclicModuleRecordStatus::Linking {
        // 1. Set module.[[DFSAncestorIndex]] to
        //    min(module.[[DFSAncestorIndex]], requiredModule.[[DFSAncestorIndex]]).
        let required_ancestor_index = required.dfs_ancestor_index;
        let cyclic = module.cyclic_mut(agent);
        cyclic.dfs_ancestor_index = cyclic.dfs_ancestor_index.min(required_ancestor_index);
    }
}
