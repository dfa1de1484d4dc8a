// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ### [16.2.1.6.1.3 Evaluate ( )](https://tc39.es/ecma262/#sec-moduleevaluation)
//!
//! Evaluation is two interleaved depth-first traversals sharing one stack:
//! the regular evaluation of a module graph, and the traversal of the graph
//! behind an `import defer`. The latter only evaluates the asynchronous parts
//! of a deferred subgraph, so that its synchronous modules can be evaluated
//! later, on first access, without waiting on anything.

use ahash::AHashSet;

use crate::ecmascript::{
    builtins::promise::{Promise, PromiseCapability, PromiseReactionHandler, perform_promise_then},
    execution::{Agent, ExceptionType, JsError, JsResult},
    scripts_and_modules::module::Module,
};

use super::{
    ImportPhase,
    cyclic_module_records::{AsyncEvaluation, CyclicModuleRecordStatus, execute_module},
    imported_module, synthetic_module_records,
};

/// The two traversals of the evaluation algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Traversal {
    /// InnerModuleEvaluation
    Evaluation,
    /// InnerAsyncSubgraphsEvaluation
    AsyncSubgraphs,
}

#[derive(Debug)]
struct EvaluationFrame {
    module: Module,
    traversal: Traversal,
    next_request: usize,
}

/// ### [16.2.1.6.1.3 Evaluate ( )](https://tc39.es/ecma262/#sec-moduleevaluation)
///
/// The Evaluate concrete method of a Cyclic Module Record module takes no
/// arguments and returns a Promise. Evaluate transitions this module's
/// \[\[Status]] from linked to either evaluating-async or evaluated. The
/// first time it is called on a module in a given strongly connected
/// component, Evaluate creates and returns a Promise which resolves when the
/// module has finished evaluating. This Promise is stored in the
/// \[\[TopLevelCapability]] field of the \[\[CycleRoot]] for the component.
/// Future invocations of Evaluate on any module in the component return the
/// same Promise. (Most of the work is done by the auxiliary function
/// InnerModuleEvaluation.)
///
/// A module graph without asynchronous modules settles the returned promise
/// before this function returns.
#[tracing::instrument(level = "debug", skip_all, fields(module = ?module))]
pub fn evaluate(agent: &mut Agent, module: Module) -> Promise {
    let mut module = module;
    // 1. Assert: This call to Evaluate is not happening at the same time as
    //    another call to Evaluate within the surrounding agent.
    // 2. Assert: module.[[Status]] is one of linked, evaluating-async, or
    //    evaluated.
    // 3. If module.[[Status]] is either evaluating-async or evaluated, set
    //    module to module.[[CycleRoot]].
    if matches!(
        module.status(agent),
        Some(CyclicModuleRecordStatus::EvaluatingAsync | CyclicModuleRecordStatus::Evaluated)
    ) {
        module = module.cycle_root(agent);
    }
    // 4. If module.[[TopLevelCapability]] is not empty, then
    if let Some(capability) = module.cyclic(agent).top_level_capability {
        // a. Return module.[[TopLevelCapability]].[[Promise]].
        return capability.promise();
    }
    // 5. Let stack be a new empty List.
    let mut stack = Vec::with_capacity(8);
    // 6. Let capability be ! NewPromiseCapability(%Promise%).
    let capability = PromiseCapability::new(agent);
    // 7. Set module.[[TopLevelCapability]] to capability.
    module.cyclic_mut(agent).top_level_capability = Some(capability);
    // 8. Let result be Completion(InnerModuleEvaluation(module, stack, 0)).
    let result = inner_module_evaluation(agent, module, &mut stack, 0);
    match result {
        // 9. If result is an abrupt completion, then
        Err(error) => {
            // a. For each Cyclic Module Record m of stack, do
            fail_modules(agent, &stack, error);
            // b. Assert: module.[[Status]] is evaluated.
            // c. Assert: module.[[EvaluationError]] and result are the same
            //    Completion Record.
            tracing::debug!(error = error.message(agent), "module evaluation failed");
            // d. Perform ! Call(capability.[[Reject]], undefined, « result.[[Value]] »).
            capability.reject(agent, error);
        }
        // 10. Else,
        Ok(_) => {
            // a. Assert: module.[[Status]] is either evaluating-async or
            //    evaluated.
            // b. Assert: module.[[AsyncEvaluation]] is false.
            // c. If module.[[AsyncEvaluation]] is false, then
            if module.status(agent) == Some(CyclicModuleRecordStatus::Evaluated) {
                // i. Assert: module.[[Status]] is evaluated.
                // ii. Perform ! Call(capability.[[Resolve]], undefined, « undefined »).
                capability.resolve(agent);
            }
            // d. Assert: stack is empty.
            debug_assert!(stack.is_empty());
        }
    }
    // 11. Return capability.[[Promise]].
    capability.promise()
}

/// Marks every module left on the stack of a failed evaluation as evaluated
/// with the error.
fn fail_modules(agent: &mut Agent, stack: &[Module], error: JsError) {
    for &m in stack {
        // i. Assert: m.[[Status]] is evaluating.
        // ii. Set m.[[Status]] to evaluated.
        m.set_status(agent, CyclicModuleRecordStatus::Evaluated);
        // iii. Set m.[[EvaluationError]] to result.
        let cyclic = m.cyclic_mut(agent);
        cyclic.evaluation_error = Some(error);
        if cyclic.async_evaluation == AsyncEvaluation::Pending {
            cyclic.async_evaluation = AsyncEvaluation::Settled;
        }
    }
}

/// ### [16.2.1.6.1.3.1 InnerModuleEvaluation ( module, stack, index )](https://tc39.es/ecma262/#sec-innermoduleevaluation)
///
/// The abstract operation InnerModuleEvaluation takes arguments module (a
/// Module Record), stack (a List of Cyclic Module Records), and index (a
/// non-negative integer) and returns either a normal completion containing a
/// non-negative integer or a throw completion. It is used by Evaluate to
/// perform the actual evaluation process for module, as well as recursively on
/// all other modules in the dependency graph. The stack and index parameters,
/// as well as module's \[\[DFSIndex]] and \[\[DFSAncestorIndex]] fields, are
/// used the same way as in InnerModuleLinking.
///
/// > NOTE 1: A module is evaluating while it is being traversed by
/// > InnerModuleEvaluation. A module is evaluated on execution completion or
/// > evaluating-async during execution if its \[\[HasTLA]] field is true or if
/// > it has asynchronous dependencies.
///
/// > NOTE 2: Any modules depending on a module of an asynchronous cycle when
/// > that cycle is not evaluating will instead depend on the execution of the
/// > root of the cycle via \[\[CycleRoot]]. This ensures that the cycle state
/// > can be treated as a single strongly connected component through its root
/// > module state.
///
/// Requests with the defer phase continue in InnerAsyncSubgraphsEvaluation.
/// Both traversals are driven by the same list of frames instead of native
/// recursion.
pub(super) fn inner_module_evaluation(
    agent: &mut Agent,
    module: Module,
    stack: &mut Vec<Module>,
    index: u32,
) -> JsResult<u32> {
    let mut index = index;
    let Some(traversal) = enter_module(agent, module, Traversal::Evaluation, stack, &mut index)?
    else {
        return Ok(index);
    };
    let mut frames = Vec::with_capacity(8);
    frames.push(EvaluationFrame {
        module,
        traversal,
        next_request: 0,
    });
    while let Some(frame) = frames.last_mut() {
        let module = frame.module;
        let traversal = frame.traversal;
        // 11. For each ModuleRequest Record request of
        //     module.[[RequestedModules]], do
        let request = module.requested_modules(agent).get(frame.next_request).cloned();
        if let Some(request) = request {
            frame.next_request += 1;
            // a. Let requiredModule be GetImportedModule(module, request).
            let required_module = imported_module(agent, module, &request);
            // b. If request.[[Phase]] is defer, then
            //     i. Set index to ? InnerAsyncSubgraphsEvaluation(requiredModule, stack, index).
            // c. Else,
            //     i. Set index to ? InnerModuleEvaluation(requiredModule, stack, index).
            let required_traversal = match (traversal, request.phase()) {
                (Traversal::Evaluation, ImportPhase::Evaluation) => Traversal::Evaluation,
                _ => Traversal::AsyncSubgraphs,
            };
            if let Some(required_traversal) =
                enter_module(agent, required_module, required_traversal, stack, &mut index)?
            {
                frames.push(EvaluationFrame {
                    module: required_module,
                    traversal: required_traversal,
                    next_request: 0,
                });
                continue;
            }
            // d. If requiredModule is a Cyclic Module Record, then
            if required_module.is_cyclic(agent) {
                // i. Perform ? AfterCyclicModuleRecordEvaluation(module,
                //    requiredModule, stack).
                after_cyclic_module_evaluation(agent, module, required_module)?;
            }
            continue;
        }
        frames.pop();
        match traversal {
            Traversal::Evaluation => finish_module_evaluation(agent, module, stack)?,
            Traversal::AsyncSubgraphs => finish_async_subgraphs_evaluation(agent, module, stack),
        }
        if let Some(parent) = frames.last() {
            after_cyclic_module_evaluation(agent, parent.module, module)?;
        }
    }
    // 17. Return index.
    Ok(index)
}

/// The first steps of InnerModuleEvaluation and InnerAsyncSubgraphsEvaluation.
///
/// Returns the traversal the module was entered with if it was pushed onto
/// the stack, or None if the traversal returns immediately.
fn enter_module(
    agent: &mut Agent,
    module: Module,
    traversal: Traversal,
    stack: &mut Vec<Module>,
    index: &mut u32,
) -> JsResult<Option<Traversal>> {
    // 1. If module is not a Cyclic Module Record, then
    if !module.is_cyclic(agent) {
        // a. Perform ? EvaluateModuleSync(module).
        synthetic_module_records::evaluate_module_sync(agent, module)?;
        // b. Return index.
        return Ok(None);
    }
    let cyclic = module.cyclic(agent);
    let status = cyclic.status;
    let evaluation_error = cyclic.evaluation_error;
    // InnerAsyncSubgraphsEvaluation 1. If module.[[HasTLA]] is true, then
    //     a. Return ? InnerModuleEvaluation(module, stack, index).
    let traversal = if cyclic.has_tla {
        Traversal::Evaluation
    } else {
        traversal
    };
    match traversal {
        Traversal::Evaluation => {
            match status {
                // 2. If module.[[Status]] is either evaluating-async or
                //    evaluated, then
                CyclicModuleRecordStatus::EvaluatingAsync | CyclicModuleRecordStatus::Evaluated => {
                    // b. Otherwise, return ? module.[[EvaluationError]].
                    if let Some(error) = evaluation_error {
                        return Err(error);
                    }
                    // a. If module.[[EvaluationError]] is empty, return index.
                    // An evaluated module no longer takes part in a cycle
                    // unless that cycle is still being evaluated.
                    if status == CyclicModuleRecordStatus::Evaluated
                        && !stack.contains(&module.cycle_root(agent))
                    {
                        module.cyclic_mut(agent).cycle_root = Some(module);
                    }
                    return Ok(None);
                }
                // 3. If module.[[Status]] is evaluating, return index.
                CyclicModuleRecordStatus::Evaluating => return Ok(None),
                _ => {}
            }
            // 4. Assert: module.[[Status]] is linked or one of the
            //    async-subgraphs statuses.
            debug_assert!(status.is_deferred_only(), "{status:?}");
            // 5. Set module.[[Status]] to evaluating.
            module.set_status(agent, CyclicModuleRecordStatus::Evaluating);
        }
        Traversal::AsyncSubgraphs => {
            match status {
                CyclicModuleRecordStatus::AsyncSubgraphsSearchingAsync
                | CyclicModuleRecordStatus::AsyncSubgraphsEvaluated
                | CyclicModuleRecordStatus::EvaluatingAsync
                | CyclicModuleRecordStatus::Evaluated => {
                    if let Some(error) = evaluation_error {
                        return Err(error);
                    }
                    return Ok(None);
                }
                CyclicModuleRecordStatus::AsyncSubgraphsSearching
                | CyclicModuleRecordStatus::Evaluating => return Ok(None),
                _ => {}
            }
            debug_assert_eq!(status, CyclicModuleRecordStatus::Linked);
            module.set_status(agent, CyclicModuleRecordStatus::AsyncSubgraphsSearching);
        }
    }
    let cyclic = module.cyclic_mut(agent);
    // 6. Set module.[[DFSIndex]] to index.
    // 7. Set module.[[DFSAncestorIndex]] to index.
    cyclic.set_dfs_index(*index);
    // 8. Set module.[[PendingAsyncDependencies]] to 0.
    // A module that is still searching its async subgraphs keeps the
    // dependencies it counted and the parents waiting on it.
    if !matches!(
        status,
        CyclicModuleRecordStatus::AsyncSubgraphsSearching
            | CyclicModuleRecordStatus::AsyncSubgraphsSearchingAsync
    ) {
        cyclic.pending_async_dependencies = 0;
        cyclic.async_parent_modules.clear();
    }
    cyclic.async_evaluation = AsyncEvaluation::None;
    // 9. Set index to index + 1.
    *index += 1;
    // 10. Append module to stack.
    stack.push(module);
    Ok(Some(traversal))
}

/// Steps 12 to 16 of InnerModuleEvaluation.
fn finish_module_evaluation(agent: &mut Agent, module: Module, stack: &mut Vec<Module>) -> JsResult<()> {
    let cyclic = module.cyclic(agent);
    let pending_async_dependencies = cyclic.pending_async_dependencies;
    // 12. If module.[[PendingAsyncDependencies]] > 0 or module.[[HasTLA]] is
    //     true, then
    if pending_async_dependencies > 0 || cyclic.has_tla {
        // a. Assert: module.[[AsyncEvaluation]] is false.
        // b. Set module.[[AsyncEvaluation]] to true.
        module.cyclic_mut(agent).async_evaluation = AsyncEvaluation::Pending;
        // c. If module.[[PendingAsyncDependencies]] = 0, perform
        //    ExecuteAsyncModule(module).
        if pending_async_dependencies == 0 {
            execute_async_module(agent, module);
        }
    } else {
        // 13. Else,
        // a. Perform ? module.ExecuteModule().
        execute_module(agent, module, None)?;
    }
    // 14. Assert: module occurs exactly once in stack.
    // 15. Assert: module.[[DFSAncestorIndex]] ≤ module.[[DFSIndex]].
    let cyclic = module.cyclic(agent);
    // 16. If module.[[DFSAncestorIndex]] = module.[[DFSIndex]], then
    if cyclic.dfs_ancestor_index != cyclic.dfs_index || !stack.contains(&module) {
        return Ok(());
    }
    // a. Let done be false.
    // b. Repeat, while done is false,
    let mut members = 0usize;
    // i. Let requiredModule be the last element of stack.
    // ii. Remove the last element of stack.
    while let Some(required_module) = stack.pop() {
        // iii. Assert: requiredModule is a Cyclic Module Record.
        // iv. If requiredModule.[[AsyncEvaluation]] is false, set
        //     requiredModule.[[Status]] to evaluated.
        // v. Otherwise, set requiredModule.[[Status]] to evaluating-async.
        complete_component_member(agent, required_module, module);
        members += 1;
        // vi. If requiredModule and module are the same Module Record, set
        //     done to true.
        // A module that was entered again by a regular import while it was
        // being searched is on the stack twice.
        if required_module == module && !stack.contains(&module) {
            break;
        }
    }
    tracing::trace!(root = ?module, modules = members, "evaluated strongly connected component");
    // Modules that finished evaluating through a forced evaluation may still
    // sit on top of the stack.
    while let Some(&top) = stack.last() {
        if !matches!(
            top.status(agent),
            Some(CyclicModuleRecordStatus::EvaluatingAsync | CyclicModuleRecordStatus::Evaluated)
        ) {
            break;
        }
        stack.pop();
    }
    Ok(())
}

/// ### InnerAsyncSubgraphsEvaluation ( module, stack, index )
///
/// Visits the graph behind an `import defer` without executing any of its
/// synchronous modules. Modules with top-level await, and everything they
/// import, are evaluated with InnerModuleEvaluation so that they are done by
/// the time the deferred module is accessed. The synchronous modules on the
/// way end up async-subgraphs-evaluated, or async-subgraphs-searching-async
/// while they wait for an asynchronous dependency.
///
/// These are the steps after the module's requests have been visited.
fn finish_async_subgraphs_evaluation(agent: &mut Agent, module: Module, stack: &mut Vec<Module>) {
    let cyclic = module.cyclic_mut(agent);
    // If module.[[PendingAsyncDependencies]] > 0, set
    // module.[[AsyncEvaluation]] to true.
    if cyclic.pending_async_dependencies > 0 {
        cyclic.async_evaluation = AsyncEvaluation::Pending;
    }
    // If module.[[DFSAncestorIndex]] = module.[[DFSIndex]], then
    if cyclic.dfs_ancestor_index != cyclic.dfs_index || !stack.contains(&module) {
        return;
    }
    let mut members = 0usize;
    while let Some(required_module) = stack.pop() {
        complete_component_member(agent, required_module, module);
        members += 1;
        if required_module == module {
            break;
        }
    }
    tracing::trace!(root = ?module, modules = members, "searched deferred strongly connected component");
}

/// Moves a module popped off the stack at the end of its strongly connected
/// component to its next status, and sets its \[\[CycleRoot]].
fn complete_component_member(agent: &mut Agent, required_module: Module, root: Module) {
    let cyclic = required_module.cyclic(agent);
    let is_async = cyclic.async_evaluation == AsyncEvaluation::Pending;
    let status = match (cyclic.status, is_async) {
        (CyclicModuleRecordStatus::Evaluating, false) => Some(CyclicModuleRecordStatus::Evaluated),
        (CyclicModuleRecordStatus::Evaluating, true) => Some(CyclicModuleRecordStatus::EvaluatingAsync),
        (CyclicModuleRecordStatus::AsyncSubgraphsSearching, false) => {
            Some(CyclicModuleRecordStatus::AsyncSubgraphsEvaluated)
        }
        (CyclicModuleRecordStatus::AsyncSubgraphsSearching, true) => {
            Some(CyclicModuleRecordStatus::AsyncSubgraphsSearchingAsync)
        }
        // Already completed by a forced evaluation.
        _ => None,
    };
    if let Some(status) = status {
        required_module.set_status(agent, status);
    }
    // Set requiredModule.[[CycleRoot]] to module.
    required_module.cyclic_mut(agent).cycle_root = Some(root);
}

/// ### AfterCyclicModuleRecordEvaluation ( module, requiredModule, stack )
///
/// Shared by both traversals once a required Cyclic Module Record has been
/// visited: propagates the DFS ancestor index within a strongly connected
/// component and registers module as waiting on an asynchronous dependency.
fn after_cyclic_module_evaluation(agent: &mut Agent, module: Module, required_module: Module) -> JsResult<()> {
    let module_status = module.cyclic(agent).status;
    let required = required_module.cyclic(agent);
    let required_status = required.status;
    let mut required_module = required_module;
    // 1. If requiredModule.[[Status]] is evaluating, or both modules are
    //    async-subgraphs-searching, then
    if required_status == CyclicModuleRecordStatus::Evaluating
        || (required_status == CyclicModuleRecordStatus::AsyncSubgraphsSearching
            && module_status == CyclicModuleRecordStatus::AsyncSubgraphsSearching)
    {
        // a. Set module.[[DFSAncestorIndex]] to
        //    min(module.[[DFSAncestorIndex]], requiredModule.[[DFSAncestorIndex]]).
        let required_ancestor_index = required.dfs_ancestor_index;
        let cyclic = module.cyclic_mut(agent);
        cyclic.dfs_ancestor_index = cyclic.dfs_ancestor_index.min(required_ancestor_index);
    } else if required_status != CyclicModuleRecordStatus::AsyncSubgraphsSearching {
        // 2. Else if requiredModule.[[Status]] is not async-subgraphs-searching,
        //    then
        // a. Set requiredModule to requiredModule.[[CycleRoot]].
        required_module = required_module.cycle_root(agent);
        // b. If requiredModule.[[EvaluationError]] is not empty, return ?
        //    requiredModule.[[EvaluationError]].
        if let Some(error) = required_module.evaluation_error(agent) {
            return Err(error);
        }
    }
    // 3. If requiredModule.[[AsyncEvaluation]] is true and module is not
    //    evaluated, then
    // A module entered again by a later traversal is only counted once.
    let required = required_module.cyclic(agent);
    if required.async_evaluation == AsyncEvaluation::Pending
        && !matches!(
            module_status,
            CyclicModuleRecordStatus::Evaluated | CyclicModuleRecordStatus::AsyncSubgraphsEvaluated
        )
        && !required.async_parent_modules.contains(&module)
    {
        // a. Set module.[[PendingAsyncDependencies]] to
        //    module.[[PendingAsyncDependencies]] + 1.
        module.cyclic_mut(agent).pending_async_dependencies += 1;
        // b. Append module to requiredModule.[[AsyncParentModules]].
        required_module.cyclic_mut(agent).async_parent_modules.push(module);
    }
    Ok(())
}

/// ### [16.2.1.6.1.3.2 ExecuteAsyncModule ( module )](https://tc39.es/ecma262/#sec-execute-async-module)
///
/// The abstract operation ExecuteAsyncModule takes argument module (a Cyclic
/// Module Record) and returns unused.
fn execute_async_module(agent: &mut Agent, module: Module) {
    // 1. Assert: module.[[Status]] is either evaluating or evaluating-async.
    debug_assert!(matches!(
        module.status(agent),
        Some(CyclicModuleRecordStatus::Evaluating | CyclicModuleRecordStatus::EvaluatingAsync)
    ));
    // 2. Assert: module.[[HasTLA]] is true.
    debug_assert!(module.has_tla(agent));
    module.cyclic_mut(agent).async_evaluation = AsyncEvaluation::Pending;
    // 3. Let capability be ! NewPromiseCapability(%Promise%).
    let capability = PromiseCapability::new(agent);
    // 4. Let fulfilledClosure be a new Abstract Closure with no parameters
    //    that captures module and performs the following steps when called:
    //     a. Perform AsyncModuleExecutionFulfilled(module).
    //     b. Return undefined.
    // 5. Let onFulfilled be CreateBuiltinFunction(fulfilledClosure, 0, "", « »).
    // 6. Let rejectedClosure be a new Abstract Closure with parameters (error)
    //    that captures module and performs the following steps when called:
    //     a. Perform AsyncModuleExecutionRejected(module, error).
    //     b. Return undefined.
    // 7. Let onRejected be CreateBuiltinFunction(rejectedClosure, 0, "", « »).
    // 8. Perform PerformPromiseThen(capability.[[Promise]], onFulfilled, onRejected).
    perform_promise_then(
        agent,
        capability.promise(),
        PromiseReactionHandler::AsyncModule(module),
    );
    // 9. Perform ! module.ExecuteModule(capability).
    if let Err(error) = execute_module(agent, module, Some(capability)) {
        capability.reject(agent, error);
    }
    // 10. Return unused.
}

/// ### [16.2.1.6.1.3.3 GatherAvailableAncestors ( module, execList )](https://tc39.es/ecma262/#sec-gather-available-ancestors)
///
/// The abstract operation GatherAvailableAncestors takes arguments module (a
/// Cyclic Module Record) and execList (a List of Cyclic Module Records) and
/// returns unused.
///
/// Ancestors are appended in the order their pending count reaches zero.
fn gather_available_ancestors(agent: &mut Agent, module: Module, exec_list: &mut Vec<Module>) {
    let mut frames = vec![(module, 0usize)];
    while let Some(frame) = frames.last_mut() {
        let (current, next_parent) = *frame;
        frame.1 += 1;
        // 1. For each Cyclic Module Record m of module.[[AsyncParentModules]], do
        let Some(m) = current
            .cyclic(agent)
            .async_parent_modules
            .get(next_parent)
            .copied()
        else {
            frames.pop();
            continue;
        };
        // a. If execList does not contain m and
        //    m.[[CycleRoot]].[[EvaluationError]] is empty, then
        if exec_list.contains(&m)
            || m.cycle_root(agent).evaluation_error(agent).is_some()
            || m.status(agent) == Some(CyclicModuleRecordStatus::Evaluated)
        {
            continue;
        }
        let cyclic = m.cyclic_mut(agent);
        // i. Assert: m.[[Status]] is evaluating-async.
        // ii. Assert: m.[[EvaluationError]] is empty.
        // iii. Assert: m.[[AsyncEvaluation]] is true.
        // iv. Assert: m.[[PendingAsyncDependencies]] > 0.
        debug_assert!(cyclic.pending_async_dependencies > 0);
        // v. Set m.[[PendingAsyncDependencies]] to
        //    m.[[PendingAsyncDependencies]] - 1.
        cyclic.pending_async_dependencies = cyclic.pending_async_dependencies.saturating_sub(1);
        // vi. If m.[[PendingAsyncDependencies]] = 0, then
        if cyclic.pending_async_dependencies == 0 {
            let has_tla = cyclic.has_tla;
            // 1. Append m to execList.
            exec_list.push(m);
            // 2. If m.[[HasTLA]] is false, perform
            //    GatherAvailableAncestors(m, execList).
            if !has_tla {
                frames.push((m, 0));
            }
        }
    }
    // 2. Return unused.
}

/// ### [16.2.1.6.1.3.4 AsyncModuleExecutionFulfilled ( module )](https://tc39.es/ecma262/#sec-async-module-execution-fulfilled)
///
/// The abstract operation AsyncModuleExecutionFulfilled takes argument module
/// (a Cyclic Module Record) and returns unused.
pub(crate) fn async_module_execution_fulfilled(agent: &mut Agent, module: Module) {
    // 1. If module.[[Status]] is evaluated, then
    if module.status(agent) == Some(CyclicModuleRecordStatus::Evaluated) {
        // a. Assert: module.[[EvaluationError]] is not empty.
        debug_assert!(module.evaluation_error(agent).is_some());
        // b. Return unused.
        return;
    }
    // 2. Assert: module.[[Status]] is evaluating-async.
    // 3. Assert: module.[[AsyncEvaluation]] is true.
    // 4. Assert: module.[[EvaluationError]] is empty.
    // 5. Set module.[[AsyncEvaluation]] to false.
    module.cyclic_mut(agent).async_evaluation = AsyncEvaluation::Settled;
    // 6. Set module.[[Status]] to evaluated.
    module.set_status(agent, CyclicModuleRecordStatus::Evaluated);
    tracing::debug!(module = ?module, "async module fulfilled");
    // 7. If module.[[TopLevelCapability]] is not empty, then
    if let Some(capability) = module.cyclic(agent).top_level_capability {
        // a. Assert: module.[[CycleRoot]] and module are the same Module Record.
        // b. Perform ! Call(module.[[TopLevelCapability]].[[Resolve]], undefined, « undefined »).
        capability.resolve(agent);
    }
    // 8. Let execList be a new empty List.
    let mut exec_list = Vec::new();
    // 9. Perform GatherAvailableAncestors(module, execList).
    gather_available_ancestors(agent, module, &mut exec_list);
    // 10. Let sortedExecList be a List whose elements are the elements of
    //     execList, in the order in which they had their [[AsyncEvaluation]]
    //     fields set to true in InnerModuleEvaluation.
    // 11. Assert: All elements of sortedExecList have their
    //     [[AsyncEvaluation]] field set to true, [[PendingAsyncDependencies]]
    //     field set to 0, and [[EvaluationError]] field set to empty.
    // 12. For each Cyclic Module Record m of sortedExecList, do
    for m in exec_list {
        let status = m.status(agent);
        // a. If m.[[Status]] is evaluated, then
        if status == Some(CyclicModuleRecordStatus::Evaluated) {
            // i. Assert: m.[[EvaluationError]] is not empty.
            continue;
        }
        // b. Else if m.[[HasTLA]] is true, then
        if m.has_tla(agent) {
            // i. Perform ExecuteAsyncModule(m).
            execute_async_module(agent, m);
            continue;
        }
        // c. Else,
        if status == Some(CyclicModuleRecordStatus::AsyncSubgraphsSearchingAsync) {
            // A deferred module only waited for its asynchronous
            // dependencies; its own body runs when it is accessed.
            m.set_status(agent, CyclicModuleRecordStatus::AsyncSubgraphsEvaluated);
        } else {
            // i. Let result be m.ExecuteModule().
            // ii. If result is an abrupt completion, then
            if let Err(error) = execute_module(agent, m, None) {
                // 1. Perform AsyncModuleExecutionRejected(m, result.[[Value]]).
                async_module_execution_rejected(agent, m, error);
                continue;
            }
            // iii. Else,
            // 1. Set m.[[AsyncEvaluation]] to false.
            // 2. Set m.[[Status]] to evaluated.
            m.set_status(agent, CyclicModuleRecordStatus::Evaluated);
        }
        m.cyclic_mut(agent).async_evaluation = AsyncEvaluation::Settled;
        // 3. If m.[[TopLevelCapability]] is not empty, then
        if let Some(capability) = m.cyclic(agent).top_level_capability {
            // a. Assert: m.[[CycleRoot]] and m are the same Module Record.
            // b. Perform ! Call(m.[[TopLevelCapability]].[[Resolve]], undefined, « undefined »).
            capability.resolve(agent);
        }
    }
    // 13. Return unused.
}

/// ### [16.2.1.6.1.3.5 AsyncModuleExecutionRejected ( module, error )](https://tc39.es/ecma262/#sec-async-module-execution-rejected)
///
/// The abstract operation AsyncModuleExecutionRejected takes arguments module
/// (a Cyclic Module Record) and error (an ECMAScript language value) and
/// returns unused.
///
/// The error is propagated to every transitive async parent, each of which
/// ends up evaluated with the same error.
pub(crate) fn async_module_execution_rejected(agent: &mut Agent, module: Module, error: JsError) {
    if !reject_module(agent, module, error) {
        return;
    }
    tracing::debug!(module = ?module, error = error.message(agent), "async module rejected");
    let mut frames = vec![(module, 0usize)];
    while let Some(frame) = frames.last_mut() {
        let (current, next_parent) = *frame;
        frame.1 += 1;
        // 7. For each Cyclic Module Record m of module.[[AsyncParentModules]], do
        if let Some(m) = current
            .cyclic(agent)
            .async_parent_modules
            .get(next_parent)
            .copied()
        {
            // a. Perform AsyncModuleExecutionRejected(m, error).
            if reject_module(agent, m, error) {
                frames.push((m, 0));
            }
            continue;
        }
        frames.pop();
        // 8. If module.[[TopLevelCapability]] is not empty, then
        if let Some(capability) = current.cyclic(agent).top_level_capability {
            // a. Assert: module.[[CycleRoot]] and module are the same Module Record.
            // b. Perform ! Call(module.[[TopLevelCapability]].[[Reject]], undefined, « error »).
            capability.reject(agent, error);
        }
    }
    // 9. Return unused.
}

/// Steps 1 to 6 of AsyncModuleExecutionRejected. Returns false if the module
/// was already evaluated.
fn reject_module(agent: &mut Agent, module: Module, error: JsError) -> bool {
    // 1. If module.[[Status]] is evaluated, then
    if module.status(agent) == Some(CyclicModuleRecordStatus::Evaluated) {
        // a. Assert: module.[[EvaluationError]] is not empty.
        // b. Return unused.
        return false;
    }
    // 2. Assert: module.[[Status]] is evaluating-async.
    // 3. Assert: module.[[AsyncEvaluation]] is true.
    // 4. Assert: module.[[EvaluationError]] is empty.
    let cyclic = module.cyclic_mut(agent);
    debug_assert!(cyclic.evaluation_error.is_none());
    // 5. Set module.[[EvaluationError]] to ThrowCompletion(error).
    cyclic.evaluation_error = Some(error);
    cyclic.async_evaluation = AsyncEvaluation::Settled;
    // 6. Set module.[[Status]] to evaluated.
    module.set_status(agent, CyclicModuleRecordStatus::Evaluated);
    true
}

/// Evaluates the module behind a deferred namespace object before one of its
/// exports is read.
///
/// A module that already failed throws its evaluation error again. A module
/// that is being evaluated further up in the current evaluation, or that
/// cannot be evaluated synchronously because it waits on an asynchronous
/// module, is left alone: its bindings are read as they are, and reading one
/// that is not initialized yet throws a ReferenceError.
pub(crate) fn ensure_deferred_namespace_evaluation(agent: &mut Agent, module: Module) -> JsResult<()> {
    let Some(status) = module.status(agent) else {
        return synthetic_module_records::evaluate_module_sync(agent, module);
    };
    match status {
        CyclicModuleRecordStatus::Evaluated => match module.evaluation_error(agent) {
            Some(error) => Err(error),
            None => Ok(()),
        },
        CyclicModuleRecordStatus::Evaluating | CyclicModuleRecordStatus::EvaluatingAsync => Ok(()),
        CyclicModuleRecordStatus::New
        | CyclicModuleRecordStatus::Unlinked
        | CyclicModuleRecordStatus::Linking => Err(agent.throw_exception(
            ExceptionType::TypeError,
            "Cannot access the exports of a module that is not linked",
        )),
        CyclicModuleRecordStatus::Linked
        | CyclicModuleRecordStatus::AsyncSubgraphsSearching
        | CyclicModuleRecordStatus::AsyncSubgraphsSearchingAsync
        | CyclicModuleRecordStatus::AsyncSubgraphsEvaluated => {
            if !ready_for_sync_execution(agent, module) {
                tracing::debug!(module = ?module, "deferred module waits on an async module");
                return Ok(());
            }
            tracing::debug!(module = ?module, "forcing evaluation of deferred module");
            let mut stack = Vec::with_capacity(8);
            if let Err(error) = inner_module_evaluation(agent, module, &mut stack, 0) {
                fail_modules(agent, &stack, error);
                return Err(error);
            }
            if module.status(agent) != Some(CyclicModuleRecordStatus::Evaluated) {
                return Err(agent.throw_exception(
                    ExceptionType::TypeError,
                    "Deferred module could not be evaluated synchronously",
                ));
            }
            Ok(())
        }
    }
}

/// ### ReadyForSyncExecution ( module )
///
/// Returns false if evaluating the module now would have to wait for an
/// asynchronous module: a module with top-level await that has not been
/// evaluated yet, or a module that is still waiting on one.
fn ready_for_sync_execution(agent: &Agent, module: Module) -> bool {
    let mut seen = AHashSet::new();
    let mut worklist = vec![module];
    while let Some(m) = worklist.pop() {
        if !seen.insert(m) {
            continue;
        }
        let Some(cyclic) = agent[m].cyclic() else {
            continue;
        };
        match cyclic.status {
            CyclicModuleRecordStatus::Evaluated => continue,
            CyclicModuleRecordStatus::EvaluatingAsync
            | CyclicModuleRecordStatus::AsyncSubgraphsSearchingAsync => return false,
            // Being evaluated further up: its bindings are read as they are.
            CyclicModuleRecordStatus::Evaluating => {
                if cyclic.async_evaluation == AsyncEvaluation::Pending {
                    return false;
                }
                continue;
            }
            _ => {}
        }
        if cyclic.has_tla {
            return false;
        }
        worklist.extend(cyclic.loaded_modules.iter().map(|record| record.module));
    }
    true
}
