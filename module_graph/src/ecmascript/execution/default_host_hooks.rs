// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use super::{
    ExceptionType,
    agent::{HostHooks, Job},
};
use crate::ecmascript::{
    execution::Agent,
    scripts_and_modules::module::{
        Module,
        module_semantics::{
            ModuleRequestRecord, finish_loading_imported_module, graph_loading::GraphLoadingState,
        },
    },
    types::HostDefined,
};

/// Host hooks for embeddings without a module loader or a job queue.
///
/// Every module request fails to load and promise jobs are dropped, so only
/// fully synchronous graphs assembled without loading can be evaluated.
#[derive(Debug)]
pub struct DefaultHostHooks;

impl HostHooks for DefaultHostHooks {
    fn host_load_imported_module(
        &self,
        agent: &mut Agent,
        referrer: Module,
        module_request: &ModuleRequestRecord,
        _host_defined: Option<HostDefined>,
        payload: GraphLoadingState,
    ) {
        let error = agent.throw_exception(
            ExceptionType::TypeError,
            format!("Cannot load module '{}'", module_request.specifier()),
        );
        finish_loading_imported_module(agent, referrer, module_request, Err(error), payload);
    }

    fn enqueue_promise_job(&self, _job: Job) {}
}
