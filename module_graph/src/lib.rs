// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # module_graph
//!
//! Loading, linking and evaluation of ECMAScript module graphs: cyclic
//! module records, top-level await and deferred imports.
//!
//! The host drives the engine through an [`Agent`] configured with its own
//! [`HostHooks`]. A typical session looks like this:
//!
//! 1. Parse every module with [`parse_module`] (or create synthetic ones).
//! 2. Call [`load_requested_modules`] on the root and answer each
//!    [`HostHooks::host_load_imported_module`] call with
//!    [`finish_loading_imported_module`].
//! 3. Call [`link`] and then [`evaluate`] on the root.
//! 4. Run the promise jobs the engine hands to
//!    [`HostHooks::enqueue_promise_job`] until the queue is empty.
//!
//! [`Agent`]: ecmascript::execution::Agent
//! [`HostHooks`]: ecmascript::execution::agent::HostHooks
//! [`HostHooks::host_load_imported_module`]: ecmascript::execution::agent::HostHooks::host_load_imported_module
//! [`HostHooks::enqueue_promise_job`]: ecmascript::execution::agent::HostHooks::enqueue_promise_job
//! [`parse_module`]: ecmascript::scripts_and_modules::module::module_semantics::source_text_module_records::parse_module
//! [`load_requested_modules`]: ecmascript::scripts_and_modules::module::module_semantics::graph_loading::load_requested_modules
//! [`finish_loading_imported_module`]: ecmascript::scripts_and_modules::module::module_semantics::finish_loading_imported_module
//! [`link`]: ecmascript::scripts_and_modules::module::module_semantics::cyclic_module_records::link
//! [`evaluate`]: ecmascript::scripts_and_modules::module::module_semantics::cyclic_module_evaluation::evaluate

pub mod ecmascript;
pub mod heap;
