// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ## [9.7 Agents](https://tc39.es/ecma262/#sec-agents)

use core::fmt;

use crate::{
    ecmascript::{
        builtins::{
            error::{Error, ErrorHeapData},
            promise::PromiseReactionJob,
        },
        scripts_and_modules::module::{
            Module,
            module_semantics::{ModuleRequestRecord, graph_loading::GraphLoadingState},
        },
        types::HostDefined,
    },
    heap::{CreateHeapData, Heap},
};

use super::realm::{Realm, RealmRecord};

#[derive(Debug, Clone, Copy, Default)]
pub struct Options {
    /// Treat every `import defer` as a regular import. Deferred requests are
    /// then indistinguishable from evaluation-phase requests.
    pub disable_import_defer: bool,
}

pub type JsResult<T> = core::result::Result<T, JsError>;

/// A thrown exception.
///
/// Two `JsError`s compare equal only when they are the same thrown value;
/// a stored error that is thrown again keeps its identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JsError(Error);

impl JsError {
    pub(crate) fn new(error: Error) -> Self {
        Self(error)
    }

    pub fn value(self) -> Error {
        self.0
    }

    pub fn kind(self, agent: &Agent) -> ExceptionType {
        self.0.kind(agent)
    }

    pub fn message(self, agent: &Agent) -> &str {
        self.0.message(agent)
    }

    pub fn to_string(self, agent: &Agent) -> String {
        format!("{}: {}", self.kind(agent), self.message(agent))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionType {
    Error,
    ReferenceError,
    SyntaxError,
    TypeError,
}

impl fmt::Display for ExceptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExceptionType::Error => "Error",
            ExceptionType::ReferenceError => "ReferenceError",
            ExceptionType::SyntaxError => "SyntaxError",
            ExceptionType::TypeError => "TypeError",
        })
    }
}

/// ### [9.5 Jobs and Host Operations to Enqueue Jobs](https://tc39.es/ecma262/#sec-jobs)
///
/// A unit of deferred work handed to the host through
/// [`HostHooks::enqueue_promise_job`]. The host runs jobs in the order they
/// were enqueued.
pub struct Job {
    pub(crate) inner: InnerJob,
}

pub(crate) enum InnerJob {
    PromiseReaction(PromiseReactionJob),
}

impl Job {
    pub fn run(self, agent: &mut Agent) -> JsResult<()> {
        match self.inner {
            InnerJob::PromiseReaction(job) => job.run(agent),
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            InnerJob::PromiseReaction(job) => f.debug_tuple("Job").field(job).finish(),
        }
    }
}

pub trait HostHooks: fmt::Debug {
    /// ### [16.2.1.10 HostLoadImportedModule ( referrer, moduleRequest, hostDefined, payload )](https://tc39.es/ecma262/#sec-HostLoadImportedModule)
    ///
    /// The host-defined abstract operation HostLoadImportedModule takes
    /// arguments referrer (a Cyclic Module Record), moduleRequest (a
    /// ModuleRequest Record), hostDefined (anything), and payload (a
    /// GraphLoadingState Record) and returns unused.
    ///
    /// An implementation of HostLoadImportedModule must conform to the
    /// following requirements:
    ///
    /// * The host environment must perform
    ///   `FinishLoadingImportedModule(referrer, moduleRequest, payload, result)`,
    ///   where result is either a normal completion containing the loaded
    ///   Module Record or a throw completion, either synchronously or
    ///   asynchronously. It must be performed exactly once per call.
    /// * If this operation is called multiple times with two
    ///   (referrer, moduleRequest) pairs such that referrer is the same and
    ///   the requests are equal, and it performs
    ///   `FinishLoadingImportedModule(referrer, moduleRequest, payload, result)`
    ///   where result is a normal completion, then it must perform it with the
    ///   same result each time.
    /// * The operation must treat payload as an opaque value to be passed
    ///   through to FinishLoadingImportedModule.
    ///
    /// The actual process performed is host-defined, but typically consists of
    /// performing whatever I/O operations are necessary to load the
    /// appropriate Module Record. Multiple different (referrer, specifier)
    /// pairs may map to the same Module Record instance. The actual mapping
    /// semantics is host-defined but typically a normalization process is
    /// applied to specifier as part of the mapping process. A typical
    /// normalization process would include actions such as expansion of
    /// relative and abbreviated path specifiers.
    fn host_load_imported_module(
        &self,
        agent: &mut Agent,
        referrer: Module,
        module_request: &ModuleRequestRecord,
        host_defined: Option<HostDefined>,
        payload: GraphLoadingState,
    );

    /// ### [9.5.5 HostEnqueuePromiseJob ( job, realm )](https://tc39.es/ecma262/#sec-hostenqueuepromisejob)
    fn enqueue_promise_job(&self, job: Job);
}

/// ### [9.7 Agents](https://tc39.es/ecma262/#sec-agents)
pub struct Agent {
    pub(crate) heap: Heap,
    pub(crate) options: Options,
    pub(crate) host_hooks: &'static dyn HostHooks,
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("options", &self.options)
            .field("host_hooks", &self.host_hooks)
            .finish_non_exhaustive()
    }
}

impl Agent {
    pub fn new(options: Options, host_hooks: &'static dyn HostHooks) -> Self {
        Self {
            heap: Heap::new(),
            options,
            host_hooks,
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Creates a new realm for modules to be created in.
    pub fn create_realm(&mut self, host_defined: Option<HostDefined>) -> Realm {
        self.heap.create(RealmRecord { host_defined })
    }

    /// Creates a new error of the given kind and returns it as a thrown
    /// exception.
    pub fn throw_exception(&mut self, kind: ExceptionType, message: impl Into<String>) -> JsError {
        let error = self.heap.create(ErrorHeapData {
            kind,
            message: message.into(),
        });
        JsError::new(error)
    }

    pub(crate) fn enqueue_job(&self, job: Job) {
        self.host_hooks.enqueue_promise_job(job);
    }
}
