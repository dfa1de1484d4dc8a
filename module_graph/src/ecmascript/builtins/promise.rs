// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ## [27.2 Promise Objects](https://tc39.es/ecma262/#sec-promise-objects)
//!
//! The module graph only ever needs promises that settle with `undefined` or
//! with a thrown error, and reactions that are either the async module
//! continuations or host callbacks. Reactions never run synchronously: they
//! are handed to the host as [`Job`]s.

use core::{fmt, ops::Index, ops::IndexMut};

use crate::{
    ecmascript::{
        execution::{
            Agent, JsError, JsResult,
            agent::{InnerJob, Job},
        },
        scripts_and_modules::module::{
            Module,
            module_semantics::cyclic_module_evaluation::{
                async_module_execution_fulfilled, async_module_execution_rejected,
            },
        },
    },
    heap::{CreateHeapData, Heap, next_index},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Promise(u32);

impl Promise {
    pub(crate) fn get_index(self) -> usize {
        self.0 as usize
    }

    /// Creates a promise that is already fulfilled with `undefined`.
    pub fn new_resolved(agent: &mut Agent) -> Self {
        agent.heap.create(PromiseHeapData {
            promise_state: PromiseState::Fulfilled,
        })
    }

    /// Creates a promise that is already rejected with the given error.
    pub fn new_rejected(agent: &mut Agent, error: JsError) -> Self {
        agent.heap.create(PromiseHeapData {
            promise_state: PromiseState::Rejected(error),
        })
    }

    pub fn state(self, agent: &Agent) -> &PromiseState {
        &agent[self].promise_state
    }

    pub fn is_pending(self, agent: &Agent) -> bool {
        matches!(self.state(agent), PromiseState::Pending { .. })
    }

    /// The settled result, or `None` while the promise is pending.
    pub fn result(self, agent: &Agent) -> Option<JsResult<()>> {
        match self.state(agent) {
            PromiseState::Pending { .. } => None,
            PromiseState::Fulfilled => Some(Ok(())),
            PromiseState::Rejected(error) => Some(Err(*error)),
        }
    }

    /// Registers a host callback to run once this promise settles.
    ///
    /// The callback always runs from a job, even if the promise is already
    /// settled.
    pub fn then(
        self,
        agent: &mut Agent,
        on_settled: impl FnOnce(&mut Agent, JsResult<()>) -> JsResult<()> + 'static,
    ) {
        perform_promise_then(
            agent,
            self,
            PromiseReactionHandler::Host(Box::new(on_settled)),
        );
    }
}

#[derive(Debug)]
pub enum PromiseState {
    Pending {
        reactions: Vec<PromiseReactionHandler>,
    },
    Fulfilled,
    Rejected(JsError),
}

impl PromiseState {
    fn pending() -> Self {
        Self::Pending { reactions: vec![] }
    }
}

#[derive(Debug)]
pub struct PromiseHeapData {
    pub(crate) promise_state: PromiseState,
}

/// What to do when a promise settles.
pub enum PromiseReactionHandler {
    /// Continue the evaluation of an async module: the fulfilled and
    /// rejected closures created by ExecuteAsyncModule.
    AsyncModule(Module),
    /// A continuation registered by the host.
    Host(Box<dyn FnOnce(&mut Agent, JsResult<()>) -> JsResult<()>>),
}

impl fmt::Debug for PromiseReactionHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AsyncModule(module) => f.debug_tuple("AsyncModule").field(module).finish(),
            Self::Host(_) => f.write_str("Host"),
        }
    }
}

/// ### [27.2.1.1 PromiseCapability Records](https://tc39.es/ecma262/#sec-promisecapability-records)
///
/// A promise capability encapsulates a promise, adding methods that are
/// capable of resolving or rejecting that promise.
///
/// NOTE: We only ever deal with built-in promises, so the resolve and reject
/// functions are not stored: the capability settles its promise directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromiseCapability {
    pub(crate) promise: Promise,
}

impl PromiseCapability {
    /// ### [27.2.1.5 NewPromiseCapability ( C )](https://tc39.es/ecma262/#sec-newpromisecapability)
    pub fn new(agent: &mut Agent) -> Self {
        let promise = agent.heap.create(PromiseHeapData {
            promise_state: PromiseState::pending(),
        });
        Self { promise }
    }

    pub fn promise(&self) -> Promise {
        self.promise
    }

    fn take_reactions(
        &self,
        agent: &mut Agent,
        settled: PromiseState,
    ) -> Option<Vec<PromiseReactionHandler>> {
        let promise_state = &mut agent[self.promise].promise_state;
        // Settling an already settled promise does nothing.
        let PromiseState::Pending { reactions } = promise_state else {
            return None;
        };
        let reactions = core::mem::take(reactions);
        *promise_state = settled;
        Some(reactions)
    }

    /// ### [27.2.1.4 FulfillPromise ( promise, value )](https://tc39.es/ecma262/#sec-fulfillpromise)
    pub fn resolve(&self, agent: &mut Agent) {
        if let Some(reactions) = self.take_reactions(agent, PromiseState::Fulfilled) {
            trigger_promise_reactions(agent, reactions, Ok(()));
        }
    }

    /// ### [27.2.1.7 RejectPromise ( promise, reason )](https://tc39.es/ecma262/#sec-rejectpromise)
    pub fn reject(&self, agent: &mut Agent, reason: JsError) {
        if let Some(reactions) = self.take_reactions(agent, PromiseState::Rejected(reason)) {
            trigger_promise_reactions(agent, reactions, Err(reason));
        }
    }

    /// Settles the promise with the given completion.
    pub fn settle(&self, agent: &mut Agent, completion: JsResult<()>) {
        match completion {
            Ok(()) => self.resolve(agent),
            Err(error) => self.reject(agent, error),
        }
    }
}

/// ### [27.2.1.8 TriggerPromiseReactions ( reactions, argument )](https://tc39.es/ecma262/#sec-triggerpromisereactions)
fn trigger_promise_reactions(
    agent: &mut Agent,
    reactions: Vec<PromiseReactionHandler>,
    argument: JsResult<()>,
) {
    // 1. For each element reaction of reactions, do
    for handler in reactions {
        // a. Let job be NewPromiseReactionJob(reaction, argument).
        // b. Perform HostEnqueuePromiseJob(job.[[Job]], job.[[Realm]]).
        agent.enqueue_job(new_promise_reaction_job(handler, argument));
    }
}

/// ### [27.2.5.4.1 PerformPromiseThen ( promise, onFulfilled, onRejected \[ , resultCapability \] )](https://tc39.es/ecma262/#sec-performpromisethen)
pub(crate) fn perform_promise_then(
    agent: &mut Agent,
    promise: Promise,
    handler: PromiseReactionHandler,
) {
    match &mut agent[promise].promise_state {
        // 9. If promise.[[PromiseState]] is pending, then
        PromiseState::Pending { reactions } => {
            // a. Append fulfillReaction to promise.[[PromiseFulfillReactions]].
            // b. Append rejectReaction to promise.[[PromiseRejectReactions]].
            reactions.push(handler);
        }
        // 10. Else if promise.[[PromiseState]] is fulfilled, then
        PromiseState::Fulfilled => {
            // b. Let fulfillJob be NewPromiseReactionJob(fulfillReaction, value).
            // c. Perform HostEnqueuePromiseJob(fulfillJob.[[Job]], fulfillJob.[[Realm]]).
            agent.enqueue_job(new_promise_reaction_job(handler, Ok(())));
        }
        // 11. Else,
        PromiseState::Rejected(error) => {
            // b. Let reason be promise.[[PromiseResult]].
            let error = *error;
            // e. Let rejectJob be NewPromiseReactionJob(rejectReaction, reason).
            // f. Perform HostEnqueuePromiseJob(rejectJob.[[Job]], rejectJob.[[Realm]]).
            agent.enqueue_job(new_promise_reaction_job(handler, Err(error)));
        }
    }
}

#[derive(Debug)]
pub(crate) struct PromiseReactionJob {
    handler: PromiseReactionHandler,
    argument: JsResult<()>,
}

impl PromiseReactionJob {
    pub(crate) fn run(self, agent: &mut Agent) -> JsResult<()> {
        match self.handler {
            PromiseReactionHandler::AsyncModule(module) => {
                match self.argument {
                    Ok(()) => async_module_execution_fulfilled(agent, module),
                    Err(error) => async_module_execution_rejected(agent, module, error),
                }
                Ok(())
            }
            PromiseReactionHandler::Host(callback) => callback(agent, self.argument),
        }
    }
}

/// ### [27.2.2.1 NewPromiseReactionJob ( reaction, argument )](https://tc39.es/ecma262/#sec-newpromisereactionjob)
fn new_promise_reaction_job(handler: PromiseReactionHandler, argument: JsResult<()>) -> Job {
    Job {
        inner: InnerJob::PromiseReaction(PromiseReactionJob { handler, argument }),
    }
}

impl CreateHeapData<PromiseHeapData, Promise> for Heap {
    fn create(&mut self, data: PromiseHeapData) -> Promise {
        let index = next_index(&self.promises);
        self.promises.push(data);
        Promise(index)
    }
}

impl Index<Promise> for Agent {
    type Output = PromiseHeapData;

    fn index(&self, index: Promise) -> &Self::Output {
        self.heap
            .promises
            .get(index.get_index())
            .expect("Promise out of bounds")
    }
}

impl IndexMut<Promise> for Agent {
    fn index_mut(&mut self, index: Promise) -> &mut Self::Output {
        self.heap
            .promises
            .get_mut(index.get_index())
            .expect("Promise out of bounds")
    }
}

#[cfg(test)]
mod test {
    use std::{cell::RefCell, collections::VecDeque, rc::Rc};

    use super::*;
    use crate::ecmascript::{
        execution::{ExceptionType, Options, agent::HostHooks},
        scripts_and_modules::module::module_semantics::{
            ModuleRequestRecord, graph_loading::GraphLoadingState,
        },
        types::HostDefined,
    };

    #[derive(Debug, Default)]
    struct QueueHostHooks {
        jobs: RefCell<VecDeque<Job>>,
    }

    impl HostHooks for QueueHostHooks {
        fn host_load_imported_module(
            &self,
            _: &mut Agent,
            _: Module,
            _: &ModuleRequestRecord,
            _: Option<HostDefined>,
            _: GraphLoadingState,
        ) {
            unreachable!();
        }

        fn enqueue_promise_job(&self, job: Job) {
            self.jobs.borrow_mut().push_back(job);
        }
    }

    fn setup() -> (&'static QueueHostHooks, Agent) {
        let host_hooks: &'static QueueHostHooks = Box::leak(Box::default());
        (host_hooks, Agent::new(Options::default(), host_hooks))
    }

    fn run_jobs(host_hooks: &QueueHostHooks, agent: &mut Agent) {
        loop {
            let job = host_hooks.jobs.borrow_mut().pop_front();
            let Some(job) = job else { break };
            job.run(agent).unwrap();
        }
    }

    #[test]
    fn reactions_run_as_jobs() {
        let (host_hooks, mut agent) = setup();
        let capability = PromiseCapability::new(&mut agent);
        let log = Rc::new(RefCell::new(vec![]));
        let inner = log.clone();
        capability.promise().then(&mut agent, move |_, result| {
            inner.borrow_mut().push(result.is_ok());
            Ok(())
        });
        capability.resolve(&mut agent);
        assert!(log.borrow().is_empty());
        run_jobs(host_hooks, &mut agent);
        assert_eq!(*log.borrow(), vec![true]);
    }

    #[test]
    fn settling_twice_keeps_first_result() {
        let (_, mut agent) = setup();
        let capability = PromiseCapability::new(&mut agent);
        let error = agent.throw_exception(ExceptionType::Error, "first");
        capability.reject(&mut agent, error);
        capability.resolve(&mut agent);
        assert_eq!(capability.promise().result(&agent), Some(Err(error)));
    }

    #[test]
    fn then_on_settled_promise_is_still_async() {
        let (host_hooks, mut agent) = setup();
        let promise = Promise::new_resolved(&mut agent);
        let ran = Rc::new(RefCell::new(false));
        let inner = ran.clone();
        promise.then(&mut agent, move |_, _| {
            *inner.borrow_mut() = true;
            Ok(())
        });
        assert!(!*ran.borrow());
        run_jobs(host_hooks, &mut agent);
        assert!(*ran.borrow());
    }
}
