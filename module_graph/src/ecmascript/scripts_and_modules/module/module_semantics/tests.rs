// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Module graphs driven end to end: loading, linking and evaluation with a
//! host that answers loads from a registry and module bodies that follow a
//! script of steps.

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    fmt,
    rc::Rc,
};

use ahash::AHashMap;

use super::{
    ImportPhase, ModuleRequestRecord,
    abstract_module_records::{ModuleAbstractMethods, get_binding_value},
    cyclic_module_records::{CyclicModuleBody, CyclicModuleRecordStatus},
    finish_loading_imported_module, get_module_namespace,
    graph_loading::GraphLoadingState,
    source_text_module_records::parse_module,
    synthetic_module_records::{create_synthetic_module, set_synthetic_export},
};
use crate::ecmascript::{
    builtins::{
        module_namespace::ModuleNamespace,
        promise::{Promise, PromiseCapability},
    },
    execution::{
        Agent, ExceptionType, JsError, JsResult, Options, Realm,
        agent::{HostHooks, Job},
    },
    scripts_and_modules::module::Module,
    types::{HostDefined, Value},
};

/// A host that resolves specifiers through a registry of already parsed
/// modules.
#[derive(Default)]
struct TestHost {
    registry: RefCell<AHashMap<String, Module>>,
    jobs: RefCell<VecDeque<Job>>,
    /// Every HostLoadImportedModule call, as the requested specifier.
    loads: RefCell<Vec<String>>,
    /// Keep loads pending until `answer_pending_loads` is called.
    answer_later: Cell<bool>,
    pending_loads: RefCell<Vec<(Module, ModuleRequestRecord, GraphLoadingState)>>,
}

impl fmt::Debug for TestHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestHost")
            .field("registry", &self.registry)
            .field("loads", &self.loads)
            .finish_non_exhaustive()
    }
}

impl TestHost {
    fn lookup(&self, agent: &mut Agent, specifier: &str) -> JsResult<Module> {
        let module = self.registry.borrow().get(specifier).copied();
        module.ok_or_else(|| {
            agent.throw_exception(
                ExceptionType::Error,
                format!("Module {specifier} not found."),
            )
        })
    }
}

impl HostHooks for TestHost {
    fn host_load_imported_module(
        &self,
        agent: &mut Agent,
        referrer: Module,
        module_request: &ModuleRequestRecord,
        _host_defined: Option<HostDefined>,
        payload: GraphLoadingState,
    ) {
        self.loads
            .borrow_mut()
            .push(module_request.specifier().to_string());
        if self.answer_later.get() {
            self.pending_loads
                .borrow_mut()
                .push((referrer, module_request.clone(), payload));
            return;
        }
        let result = self.lookup(agent, module_request.specifier());
        finish_loading_imported_module(agent, referrer, module_request, result, payload);
    }

    fn enqueue_promise_job(&self, job: Job) {
        self.jobs.borrow_mut().push_back(job);
    }
}

/// What the module bodies of a test print and share.
#[derive(Debug, Default)]
struct World {
    log: RefCell<Vec<String>>,
    /// A namespace object one module leaves behind for another.
    exposed: Cell<Option<ModuleNamespace>>,
}

impl World {
    fn print(&self, message: impl Into<String>) {
        self.log.borrow_mut().push(message.into());
    }
}

#[derive(Debug, Clone)]
enum Step {
    Print(&'static str),
    /// A hoisted function declaration, initialized with the environment.
    Function(&'static str),
    /// Initializes a lexical declaration, which is in its TDZ until then.
    Init(&'static str, Value),
    /// Reads an export through a namespace binding.
    Read(&'static str, &'static str),
    /// Reads an export through a namespace binding and prints whether the
    /// binding was initialized.
    Probe(&'static str, &'static str),
    /// Prints the value of a binding.
    PrintBinding(&'static str),
    /// Leaves a namespace binding in the shared world.
    Expose(&'static str),
    /// Reads an export of the namespace left in the shared world.
    ReadExposed(&'static str),
    Throw(&'static str),
    /// `await 0`: the remaining steps run in a later job.
    Await,
}

#[derive(Debug)]
struct Script {
    steps: Vec<Step>,
    bindings: RefCell<AHashMap<Rc<str>, Option<Value>>>,
    world: Rc<World>,
}

#[derive(Debug)]
struct ScriptedBody(Rc<Script>);

impl Script {
    fn run(
        script: Rc<Script>,
        agent: &mut Agent,
        module: Module,
        from: usize,
        capability: Option<PromiseCapability>,
    ) -> JsResult<()> {
        for (index, step) in script.steps.iter().enumerate().skip(from) {
            if let Step::Await = step {
                let capability =
                    capability.expect("only modules with top-level await can suspend");
                let resumed = script.clone();
                Promise::new_resolved(agent).then(agent, move |agent, _| {
                    if let Err(error) = Script::run(resumed, agent, module, index + 1, Some(capability))
                    {
                        capability.reject(agent, error);
                    }
                    Ok(())
                });
                return Ok(());
            }
            script.step(agent, module, step)?;
        }
        if let Some(capability) = capability {
            capability.resolve(agent);
        }
        Ok(())
    }

    fn step(&self, agent: &mut Agent, module: Module, step: &Step) -> JsResult<()> {
        match step {
            Step::Print(message) => self.world.print(*message),
            Step::Function(_) | Step::Await => {}
            Step::Init(name, value) => {
                self.bindings
                    .borrow_mut()
                    .insert((*name).into(), Some(value.clone()));
            }
            Step::Read(local, export) => {
                namespace_binding(agent, module, local)?.get(agent, export)?;
            }
            Step::Probe(local, export) => {
                let namespace = namespace_binding(agent, module, local)?;
                match namespace.get(agent, export) {
                    Ok(_) => self.world.print(format!("{local}.{export} ok")),
                    Err(error) if error.kind(agent) == ExceptionType::ReferenceError => {
                        self.world.print(format!("{local}.{export} tdz"))
                    }
                    Err(error) => return Err(error),
                }
            }
            Step::PrintBinding(name) => {
                let value = get_binding_value(agent, module, name)?;
                self.world.print(format!("{name} = {value:?}"));
            }
            Step::Expose(local) => {
                let namespace = namespace_binding(agent, module, local)?;
                self.world.exposed.set(Some(namespace));
            }
            Step::ReadExposed(export) => {
                let namespace = self
                    .world
                    .exposed
                    .get()
                    .expect("a namespace should have been exposed");
                namespace.get(agent, export)?;
            }
            Step::Throw(message) => {
                return Err(agent.throw_exception(ExceptionType::Error, *message));
            }
        }
        Ok(())
    }
}

fn namespace_binding(agent: &mut Agent, module: Module, local: &str) -> JsResult<ModuleNamespace> {
    match get_binding_value(agent, module, local)? {
        Value::Namespace(namespace) => Ok(namespace),
        other => panic!("{local} is not a namespace: {other:?}"),
    }
}

impl CyclicModuleBody for ScriptedBody {
    fn initialize_environment(&self, _: &mut Agent, _: Module) -> JsResult<()> {
        let mut bindings = self.0.bindings.borrow_mut();
        for step in &self.0.steps {
            match step {
                Step::Function(name) => {
                    let function: HostDefined = Rc::new(*name);
                    bindings.insert((*name).into(), Some(Value::Host(function)));
                }
                Step::Init(name, _) => {
                    bindings.insert((*name).into(), None);
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn execute_module(
        &self,
        agent: &mut Agent,
        module: Module,
        promise_capability: Option<PromiseCapability>,
    ) -> JsResult<()> {
        Script::run(self.0.clone(), agent, module, 0, promise_capability)
    }

    fn get_binding_value(&self, agent: &mut Agent, _: Module, name: &str) -> JsResult<Value> {
        let binding = self.0.bindings.borrow().get(name).cloned();
        match binding {
            Some(Some(value)) => Ok(value),
            Some(None) => Err(agent.throw_exception(
                ExceptionType::ReferenceError,
                format!("Cannot access '{name}' before initialization"),
            )),
            None => Err(agent.throw_exception(
                ExceptionType::ReferenceError,
                format!("{name} is not defined"),
            )),
        }
    }
}

struct Graph {
    host: &'static TestHost,
    agent: Agent,
    realm: Realm,
    world: Rc<World>,
}

impl Graph {
    fn new() -> Self {
        Self::with_options(Options::default())
    }

    fn with_options(options: Options) -> Self {
        let host: &'static TestHost = Box::leak(Box::default());
        let mut agent = Agent::new(options, host);
        let realm = agent.create_realm(None);
        Self {
            host,
            agent,
            realm,
            world: Rc::default(),
        }
    }

    fn add(&mut self, specifier: &str, source_text: &str, steps: &[Step]) -> Module {
        let script = Script {
            steps: steps.to_vec(),
            bindings: RefCell::default(),
            world: self.world.clone(),
        };
        let module = parse_module(
            &mut self.agent,
            source_text,
            self.realm,
            None,
            Rc::new(ScriptedBody(Rc::new(script))),
        )
        .unwrap();
        self.register(specifier, module);
        module
    }

    fn register(&mut self, specifier: &str, module: Module) {
        self.host
            .registry
            .borrow_mut()
            .insert(specifier.to_string(), module);
    }

    fn module(&self, specifier: &str) -> Module {
        let module = self.host.registry.borrow().get(specifier).copied();
        module.unwrap_or_else(|| panic!("{specifier} is not registered"))
    }

    fn run_jobs(&mut self) {
        loop {
            let job = self.host.jobs.borrow_mut().pop_front();
            let Some(job) = job else { break };
            job.run(&mut self.agent).unwrap();
        }
    }

    fn answer_pending_loads(&mut self) {
        loop {
            let pending = self.host.pending_loads.borrow_mut().pop();
            let Some((referrer, request, state)) = pending else {
                break;
            };
            let result = self.host.lookup(&mut self.agent, request.specifier());
            finish_loading_imported_module(&mut self.agent, referrer, &request, result, state);
        }
    }

    fn load(&mut self, specifier: &str) -> JsResult<()> {
        let root = self.module(specifier);
        let promise = root.load_requested_modules(&mut self.agent, None);
        self.run_jobs();
        promise
            .result(&self.agent)
            .expect("loading should have settled")
    }

    /// Loads, links and evaluates a module and runs all jobs.
    fn run(&mut self, specifier: &str) -> JsResult<()> {
        self.load(specifier)?;
        let root = self.module(specifier);
        root.link(&mut self.agent)?;
        let promise = root.evaluate(&mut self.agent);
        self.run_jobs();
        promise
            .result(&self.agent)
            .expect("evaluation should have settled")
    }

    fn status(&self, specifier: &str) -> Option<CyclicModuleRecordStatus> {
        self.module(specifier).status(&self.agent)
    }

    fn log(&self) -> Vec<String> {
        self.world.log.borrow().clone()
    }

    fn message(&self, error: JsError) -> String {
        error.to_string(&self.agent)
    }
}

/// Evaluates the graph rooted at `a` and returns what its modules printed.
fn scenario(modules: &[(&str, &str, &[Step])]) -> Vec<String> {
    let mut graph = Graph::new();
    for (specifier, source_text, steps) in modules {
        graph.add(specifier, source_text, steps);
    }
    if let Err(error) = graph.run("a") {
        panic!("evaluation failed: {}", graph.message(error));
    }
    graph.log()
}

use Step::*;

#[cfg(feature = "proposal-import-defer")]
mod deferred {
    use super::*;

    const E_TLA_IMPORTS_C: (&str, &str, &[Step]) = (
        "e",
        r#"import "c"; await 0;"#,
        &[Print("e - start"), Await, Print("e - finish")],
    );

    const E_TLA_DEFERS_C: (&str, &str, &[Step]) = (
        "e",
        r#"import defer * as ns from "c"; await 0;"#,
        &[Print("e - start"), Await, Print("e - finish")],
    );

    const E_TLA_DEFERS_A: (&str, &str, &[Step]) = (
        "e",
        r#"import defer * as ns from "a"; await 0;"#,
        &[Print("e - start"), Await, Print("e - finish")],
    );

    #[test]
    fn async_dependency_of_deferred_module_is_evaluated_first() {
        let log = scenario(&[
            ("a", r#"import defer * as ns from "c";"#, &[Print("a")]),
            ("c", r#"import "e";"#, &[Print("c")]),
            E_TLA_IMPORTS_C,
        ]);
        assert_eq!(log, ["c", "e - start", "e - finish", "a"]);
    }

    #[test]
    fn sync_dependencies_of_async_cycle_are_evaluated() {
        let log = scenario(&[
            (
                "a",
                r#"import "b"; import defer * as ns from "c";"#,
                &[Print("a")],
            ),
            ("b", "", &[Print("b")]),
            ("c", r#"import "d"; import "e";"#, &[Print("c")]),
            ("d", "", &[Print("d")]),
            E_TLA_IMPORTS_C,
        ]);
        assert_eq!(log, ["b", "d", "c", "e - start", "e - finish", "a"]);
    }

    #[test]
    fn deferred_module_stays_unevaluated() {
        let log = scenario(&[
            ("a", r#"import defer * as ns from "c";"#, &[Print("a")]),
            ("c", r#"import "e";"#, &[Print("c")]),
            E_TLA_DEFERS_C,
        ]);
        assert_eq!(log, ["e - start", "e - finish", "a"]);
    }

    #[test]
    fn reading_deferred_export_evaluates_module() {
        let mut graph = Graph::new();
        graph.add(
            "a",
            r#"import defer * as ns from "c";"#,
            &[Print("a"), Read("ns", "c")],
        );
        graph.add(
            "c",
            r#"import "e"; export const c = 1;"#,
            &[Print("c"), Init("c", Value::from(1.0))],
        );
        let (specifier, source_text, steps) = E_TLA_DEFERS_C;
        graph.add(specifier, source_text, steps);
        graph.run("a").unwrap();
        assert_eq!(graph.log(), ["e - start", "e - finish", "a", "c"]);
        assert_eq!(graph.status("c"), Some(CyclicModuleRecordStatus::Evaluated));
    }

    #[test]
    fn sync_dependencies_of_deferred_module_wait_for_access() {
        let log = scenario(&[
            (
                "a",
                r#"import "b"; import defer * as ns from "c";"#,
                &[Print("a")],
            ),
            ("b", "", &[Print("b")]),
            ("c", r#"import "d"; import "e";"#, &[Print("c")]),
            ("d", "", &[Print("d")]),
            E_TLA_DEFERS_C,
        ]);
        assert_eq!(log, ["b", "e - start", "e - finish", "a"]);
    }

    #[test]
    fn forcing_evaluates_sync_dependencies_in_order() {
        let log = scenario(&[
            (
                "a",
                r#"import "b"; import defer * as ns from "c";"#,
                &[Print("a"), Read("ns", "c")],
            ),
            ("b", "", &[Print("b")]),
            (
                "c",
                r#"import "d"; import "e"; export const c = 1;"#,
                &[Print("c"), Init("c", Value::from(1.0))],
            ),
            ("d", "", &[Print("d")]),
            E_TLA_DEFERS_C,
        ]);
        assert_eq!(log, ["b", "e - start", "e - finish", "a", "d", "c"]);
    }

    #[test]
    fn async_module_deferring_the_root() {
        let log = scenario(&[
            ("a", r#"import defer * as ns from "c";"#, &[Print("a")]),
            ("c", r#"import "e";"#, &[Print("c")]),
            E_TLA_DEFERS_A,
        ]);
        assert_eq!(log, ["e - start", "e - finish", "a"]);
    }

    #[test]
    fn forcing_inside_cycle_through_the_root() {
        let log = scenario(&[
            (
                "a",
                r#"import defer * as ns from "c";"#,
                &[Print("a"), Read("ns", "c")],
            ),
            (
                "c",
                r#"import "e"; export const c = 1;"#,
                &[Print("c"), Init("c", Value::from(1.0))],
            ),
            E_TLA_DEFERS_A,
        ]);
        assert_eq!(log, ["e - start", "e - finish", "a", "c"]);
    }

    #[test]
    fn cycle_through_the_root_with_sync_dependencies() {
        let log = scenario(&[
            (
                "a",
                r#"import "b"; import defer * as ns from "c";"#,
                &[Print("a")],
            ),
            ("b", "", &[Print("b")]),
            ("c", r#"import "d"; import "e";"#, &[Print("c")]),
            ("d", "", &[Print("d")]),
            E_TLA_DEFERS_A,
        ]);
        assert_eq!(log, ["b", "e - start", "e - finish", "a"]);
    }

    #[test]
    fn forcing_in_cycle_through_the_root_with_sync_dependencies() {
        let log = scenario(&[
            (
                "a",
                r#"import "b"; import defer * as ns from "c";"#,
                &[Print("a"), Read("ns", "c")],
            ),
            ("b", "", &[Print("b")]),
            (
                "c",
                r#"import "d"; import "e"; export const c = 1;"#,
                &[Print("c"), Init("c", Value::from(1.0))],
            ),
            ("d", "", &[Print("d")]),
            E_TLA_DEFERS_A,
        ]);
        assert_eq!(log, ["b", "e - start", "e - finish", "a", "d", "c"]);
    }

    #[test]
    fn evaluation_import_upgrades_deferred_import() {
        let log = scenario(&[
            (
                "a",
                r#"import defer * as ns from "b"; import "c"; import "b";"#,
                &[Print("a")],
            ),
            ("b", "", &[Print("b")]),
            ("c", "", &[Print("c")]),
        ]);
        assert_eq!(log, ["b", "c", "a"]);
    }

    #[test]
    fn upgraded_import_with_shared_async_dependency() {
        let log = scenario(&[
            (
                "a",
                r#"import defer * as ns from "b"; import "c"; import "b";"#,
                &[Print("a")],
            ),
            ("b", r#"import "d";"#, &[Print("b")]),
            ("c", r#"import "d";"#, &[Print("c")]),
            (
                "d",
                "await 0;",
                &[Print("d - start"), Await, Print("d - finish")],
            ),
        ]);
        assert_eq!(log, ["d - start", "d - finish", "b", "c", "a"]);
    }

    #[test]
    fn searching_async_module_entered_again_keeps_its_parents() {
        let mut graph = Graph::new();
        graph.add("a", r#"import "x"; import "y";"#, &[Print("a")]);
        graph.add("x", r#"import defer * as ns from "b";"#, &[Print("x")]);
        graph.add("y", r#"import "b";"#, &[Print("y")]);
        let b = graph.add("b", r#"import "d";"#, &[Print("b")]);
        let d = graph.add(
            "d",
            "await 0;",
            &[Print("d - start"), Await, Print("d - finish")],
        );
        graph.run("a").unwrap();
        assert_eq!(graph.log(), ["d - start", "d - finish", "b", "x", "y", "a"]);
        for specifier in ["a", "x", "y", "b", "d"] {
            assert_eq!(
                graph.status(specifier),
                Some(CyclicModuleRecordStatus::Evaluated),
                "{specifier}"
            );
        }
        // b registered with d once, even though it was entered twice.
        assert_eq!(d.cyclic(&graph.agent).async_parent_modules, [b]);
    }

    fn chain(a: &[Step], d: &[Step], b_exports: bool, e_exports: bool) -> Vec<String> {
        let mut graph = Graph::new();
        graph.add("a", r#"import defer * as ns from "b";"#, a);
        if b_exports {
            graph.add(
                "b",
                r#"import "c"; export const b = 1;"#,
                &[Print("b"), Init("b", Value::from(1.0))],
            );
        } else {
            graph.add("b", r#"import "c";"#, &[Print("b")]);
        }
        graph.add(
            "c",
            r#"import "d"; await 0;"#,
            &[Print("c - start"), Await, Print("c - finish")],
        );
        graph.add("d", r#"import defer * as ns from "e";"#, d);
        if e_exports {
            graph.add(
                "e",
                r#"import "f"; export const e = 1;"#,
                &[Print("e"), Init("e", Value::from(1.0))],
            );
        } else {
            graph.add("e", r#"import "f";"#, &[Print("e")]);
        }
        graph.add(
            "f",
            r#"import "a"; await 0;"#,
            &[Print("f - start"), Await, Print("f - finish")],
        );
        graph.run("a").unwrap();
        graph.log()
    }

    #[test]
    fn nested_deferred_imports_with_async_cycle() {
        let log = chain(&[Print("a")], &[Print("d")], false, false);
        assert_eq!(
            log,
            ["f - start", "f - finish", "d", "c - start", "c - finish", "a"]
        );
    }

    #[test]
    fn forcing_outer_deferred_module() {
        let log = chain(&[Print("a"), Read("ns", "b")], &[Print("d")], true, false);
        assert_eq!(
            log,
            ["f - start", "f - finish", "d", "c - start", "c - finish", "a", "b"]
        );
    }

    #[test]
    fn forcing_inner_deferred_module() {
        let log = chain(&[Print("a")], &[Print("d"), Read("ns", "e")], false, true);
        assert_eq!(
            log,
            ["f - start", "f - finish", "d", "e", "c - start", "c - finish", "a"]
        );
    }

    #[test]
    fn forcing_both_deferred_modules() {
        let log = chain(
            &[Print("a"), Read("ns", "b")],
            &[Print("d"), Read("ns", "e")],
            true,
            true,
        );
        assert_eq!(
            log,
            ["f - start", "f - finish", "d", "e", "c - start", "c - finish", "a", "b"]
        );
    }

    #[test]
    fn forcing_inner_deferred_module_from_the_root() {
        let log = chain(
            &[Print("a"), ReadExposed("e"), Read("ns", "b")],
            &[Print("d"), Expose("ns")],
            true,
            true,
        );
        assert_eq!(
            log,
            ["f - start", "f - finish", "d", "c - start", "c - finish", "a", "e", "b"]
        );
    }

    #[test]
    fn forcing_module_whose_async_dependency_finished() {
        let log = scenario(&[
            (
                "a",
                r#"import defer * as ns from "b";"#,
                &[Print("a - start"), Read("ns", "b"), Print("a - finish")],
            ),
            (
                "b",
                r#"import "c"; export let b;"#,
                &[Print("b"), Init("b", Value::Undefined)],
            ),
            (
                "c",
                r#"import "a"; await 0;"#,
                &[Print("c - start"), Await, Print("c - finish")],
            ),
        ]);
        assert_eq!(log, ["c - start", "c - finish", "a - start", "b", "a - finish"]);
    }

    #[test]
    fn synchronous_defer_cycle_exposes_unfinished_namespace() {
        let log = scenario(&[
            (
                "a",
                r#"import defer * as ns from "b"; export let a_start; export let a_finish;"#,
                &[
                    Init("a_start", Value::Undefined),
                    Print("a - start"),
                    Probe("ns", "b_start"),
                    Probe("ns", "b_finish"),
                    Print("a - finish"),
                    Init("a_finish", Value::Undefined),
                ],
            ),
            (
                "b",
                r#"import defer * as ns from "a"; export let b_start; export let b_finish;"#,
                &[
                    Init("b_start", Value::Undefined),
                    Print("b - start"),
                    Probe("ns", "a_start"),
                    Probe("ns", "a_finish"),
                    Print("b - finish"),
                    Init("b_finish", Value::Undefined),
                ],
            ),
        ]);
        assert_eq!(
            log,
            [
                "a - start",
                "b - start",
                "ns.a_start ok",
                "ns.a_finish tdz",
                "b - finish",
                "ns.b_start ok",
                "ns.b_finish ok",
                "a - finish",
            ]
        );
    }

    #[test]
    fn deferred_namespace_waiting_on_async_cycle_is_read_as_is() {
        let log = scenario(&[
            ("a", r#"import "b";"#, &[Print("a")]),
            (
                "b",
                r#"import defer * as ns from "c"; export { ns };"#,
                &[Print("b")],
            ),
            (
                "c",
                r#"import "d"; export function c_fn() {} export let c_tdz = 1;"#,
                &[Function("c_fn"), Print("c"), Init("c_tdz", Value::from(1.0))],
            ),
            (
                "d",
                r#"import { ns } from "b"; await 0;"#,
                &[
                    Probe("ns", "c_fn"),
                    Probe("ns", "c_tdz"),
                    Print("d - start"),
                    Await,
                    Print("d - finish"),
                ],
            ),
        ]);
        assert_eq!(
            log,
            ["ns.c_fn ok", "ns.c_tdz tdz", "d - start", "d - finish", "b", "a"]
        );
    }

    #[test]
    fn then_and_keys_do_not_evaluate_deferred_module() {
        let mut graph = Graph::new();
        graph.add("a", r#"import defer * as ns from "b";"#, &[Print("a")]);
        let b = graph.add(
            "b",
            r#"export const x = 1; export const then = 2;"#,
            &[Print("b"), Init("x", Value::from(1.0)), Init("then", Value::from(2.0))],
        );
        graph.run("a").unwrap();
        assert_eq!(graph.log(), ["a"]);

        let namespace = get_module_namespace(&mut graph.agent, b, ImportPhase::Defer);
        assert!(namespace.is_deferred(&graph.agent));
        let keys: Vec<&str> = namespace
            .keys(&graph.agent)
            .iter()
            .map(|key| &**key)
            .collect();
        assert_eq!(keys, ["then", "x"]);
        assert!(namespace.has(&graph.agent, "x"));
        assert_eq!(
            namespace.get(&mut graph.agent, "then").unwrap(),
            Value::Undefined
        );
        assert_eq!(graph.log(), ["a"]);

        assert_eq!(
            namespace.get(&mut graph.agent, "x").unwrap(),
            Value::from(1.0)
        );
        assert_eq!(graph.log(), ["a", "b"]);
        assert_eq!(
            get_module_namespace(&mut graph.agent, b, ImportPhase::Defer),
            namespace
        );
        let eager = get_module_namespace(&mut graph.agent, b, ImportPhase::Evaluation);
        assert_ne!(eager, namespace);
        assert_eq!(eager.get(&mut graph.agent, "then").unwrap(), Value::from(2.0));
    }

    #[test]
    fn forced_evaluation_error_is_thrown_to_the_reader() {
        let mut graph = Graph::new();
        graph.add(
            "a",
            r#"import defer * as ns from "b";"#,
            &[Print("a"), Read("ns", "x")],
        );
        graph.add(
            "b",
            "export const x = 1;",
            &[Throw("b failed"), Init("x", Value::from(1.0))],
        );
        let error = graph.run("a").unwrap_err();
        assert_eq!(graph.message(error), "Error: b failed");
        let b = graph.module("b");
        assert_eq!(b.evaluation_error(&graph.agent), Some(error));
        assert_eq!(graph.module("a").evaluation_error(&graph.agent), Some(error));

        let namespace = get_module_namespace(&mut graph.agent, b, ImportPhase::Defer);
        assert_eq!(namespace.get(&mut graph.agent, "x"), Err(error));
    }

    #[test]
    fn deferred_namespace_of_unlinked_module_throws() {
        let mut graph = Graph::new();
        graph.add(
            "a",
            r#"import { missing } from "b"; export const x = 1;"#,
            &[Init("x", Value::from(1.0))],
        );
        let b = graph.add(
            "b",
            r#"import defer * as ns from "a"; export { ns };"#,
            &[],
        );
        graph.load("a").unwrap();
        assert!(graph.module("a").link(&mut graph.agent).is_err());

        let Value::Namespace(namespace) = get_binding_value(&mut graph.agent, b, "ns").unwrap()
        else {
            panic!("ns should be a namespace");
        };
        let error = namespace.get(&mut graph.agent, "x").unwrap_err();
        assert_eq!(error.kind(&graph.agent), ExceptionType::TypeError);
    }
}

#[test]
fn disabled_import_defer_evaluates_eagerly() {
    let mut graph = Graph::with_options(Options {
        disable_import_defer: true,
    });
    graph.add("a", r#"import defer * as ns from "b";"#, &[Print("a")]);
    graph.add("b", "", &[Print("b")]);
    graph.run("a").unwrap();
    assert_eq!(graph.log(), ["b", "a"]);
    assert_eq!(
        graph.module("a").requested_modules(&graph.agent)[0].phase(),
        ImportPhase::Evaluation
    );
}

#[test]
fn modules_are_loaded_once() {
    let mut graph = Graph::new();
    graph.add("a", r#"import "b"; import "c";"#, &[Print("a")]);
    graph.add("b", r#"import "c";"#, &[Print("b")]);
    graph.add("c", r#"import "a";"#, &[Print("c")]);
    graph.load("a").unwrap();
    // One call per referrer and request; c is only descended into once.
    assert_eq!(*graph.host.loads.borrow(), ["b", "c", "a", "c"]);
    for specifier in ["a", "b", "c"] {
        assert_eq!(
            graph.status(specifier),
            Some(CyclicModuleRecordStatus::Unlinked)
        );
    }

    // Everything is loaded already.
    graph.load("a").unwrap();
    assert_eq!(graph.host.loads.borrow().len(), 4);

    graph.run("a").unwrap();
    assert_eq!(graph.log(), ["c", "b", "a"]);
}

#[test]
fn loads_can_be_answered_later() {
    let mut graph = Graph::new();
    graph.host.answer_later.set(true);
    let a = graph.add("a", r#"import "b"; import "c";"#, &[Print("a")]);
    graph.add("b", r#"import "c";"#, &[Print("b")]);
    graph.add("c", "", &[Print("c")]);
    let promise = a.load_requested_modules(&mut graph.agent, None);
    assert!(promise.is_pending(&graph.agent));
    while !graph.host.pending_loads.borrow().is_empty() {
        graph.answer_pending_loads();
        graph.run_jobs();
    }
    assert_eq!(promise.result(&graph.agent), Some(Ok(())));
    a.link(&mut graph.agent).unwrap();
    let evaluation = a.evaluate(&mut graph.agent);
    assert_eq!(evaluation.result(&graph.agent), Some(Ok(())));
    assert_eq!(graph.log(), ["c", "b", "a"]);
}

#[test]
fn failed_load_rejects_and_abandons_the_graph() {
    let mut graph = Graph::new();
    graph.add("a", r#"import "b"; import "missing";"#, &[]);
    graph.add("b", "", &[]);
    let error = graph.load("a").unwrap_err();
    assert_eq!(graph.message(error), "Error: Module missing not found.");
    assert_eq!(graph.status("a"), Some(CyclicModuleRecordStatus::New));
    assert_eq!(graph.status("b"), Some(CyclicModuleRecordStatus::New));
}

#[test]
fn linking_an_unloaded_module_throws() {
    let mut graph = Graph::new();
    let a = graph.add("a", r#"import "missing";"#, &[]);
    graph.load("a").unwrap_err();
    let error = a.link(&mut graph.agent).unwrap_err();
    assert_eq!(error.kind(&graph.agent), ExceptionType::TypeError);
    assert_eq!(
        graph.message(error),
        "TypeError: Cannot link a module that is not loaded"
    );
    assert_eq!(graph.status("a"), Some(CyclicModuleRecordStatus::New));

    // Never loaded at all.
    let b = graph.add("b", "", &[]);
    assert!(b.link(&mut graph.agent).is_err());
    assert_eq!(graph.status("b"), Some(CyclicModuleRecordStatus::New));
}

#[test]
fn duplicate_completion_fails_loading() {
    let mut graph = Graph::new();
    graph.host.answer_later.set(true);
    let a = graph.add("a", r#"import "b"; import "c";"#, &[]);
    graph.add("b", "", &[]);
    graph.add("c", "", &[]);
    let promise = a.load_requested_modules(&mut graph.agent, None);
    let (referrer, request, state) = graph.host.pending_loads.borrow_mut().remove(0);
    let b = graph.module("b");
    finish_loading_imported_module(&mut graph.agent, referrer, &request, Ok(b), state.clone());
    assert!(promise.is_pending(&graph.agent));
    finish_loading_imported_module(&mut graph.agent, referrer, &request, Ok(b), state);
    let Some(Err(error)) = promise.result(&graph.agent) else {
        panic!("loading should have failed");
    };
    assert_eq!(error.kind(&graph.agent), ExceptionType::TypeError);
}

#[test]
fn unknown_completion_fails_loading() {
    let mut graph = Graph::new();
    graph.host.answer_later.set(true);
    let a = graph.add("a", r#"import "b";"#, &[]);
    let b = graph.add("b", "", &[]);
    let promise = a.load_requested_modules(&mut graph.agent, None);
    let (_, _, state) = graph.host.pending_loads.borrow_mut().remove(0);
    let never_requested = ModuleRequestRecord::new("c");
    finish_loading_imported_module(&mut graph.agent, a, &never_requested, Ok(b), state);
    let Some(Err(error)) = promise.result(&graph.agent) else {
        panic!("loading should have failed");
    };
    assert_eq!(error.kind(&graph.agent), ExceptionType::TypeError);
}

#[test]
fn link_failure_resets_the_cycle() {
    let mut graph = Graph::new();
    let a = graph.add("a", r#"import { missing } from "b";"#, &[]);
    graph.add("b", r#"import "a"; export const present = 1;"#, &[]);
    graph.load("a").unwrap();
    let error = a.link(&mut graph.agent).unwrap_err();
    assert_eq!(error.kind(&graph.agent), ExceptionType::SyntaxError);
    assert_eq!(
        graph.message(error),
        "SyntaxError: The requested module 'b' does not provide an export named 'missing'"
    );
    assert_eq!(graph.status("a"), Some(CyclicModuleRecordStatus::Unlinked));
    assert_eq!(graph.status("b"), Some(CyclicModuleRecordStatus::Unlinked));
}

#[test]
fn ambiguous_star_export_fails_to_link() {
    let mut graph = Graph::new();
    let a = graph.add("a", r#"import { shared } from "b";"#, &[]);
    graph.add("b", r#"export * from "c"; export * from "d";"#, &[]);
    graph.add("c", "export const shared = 1;", &[]);
    graph.add("d", "export const shared = 2;", &[]);
    graph.load("a").unwrap();
    let error = a.link(&mut graph.agent).unwrap_err();
    assert_eq!(
        graph.message(error),
        "SyntaxError: The requested module 'b' contains conflicting star exports for name 'shared'"
    );
}

#[test]
fn evaluation_errors_are_sticky() {
    let mut graph = Graph::new();
    graph.add("a", r#"import "b";"#, &[Print("a")]);
    graph.add("b", "", &[Print("b"), Throw("b failed")]);
    graph.add("c", r#"import "b";"#, &[Print("c")]);
    let error = graph.run("a").unwrap_err();
    assert_eq!(graph.log(), ["b"]);
    let a = graph.module("a");
    assert_eq!(a.status(&graph.agent), Some(CyclicModuleRecordStatus::Evaluated));
    assert_eq!(a.evaluation_error(&graph.agent), Some(error));

    // Evaluating again hands out the same settled promise.
    let again = a.evaluate(&mut graph.agent);
    assert_eq!(again.result(&graph.agent), Some(Err(error)));

    // Another graph importing the failed module fails with the same error.
    assert_eq!(graph.run("c"), Err(error));
    assert_eq!(graph.log(), ["b"]);
}

#[test]
fn sync_graph_settles_before_evaluate_returns() {
    let mut graph = Graph::new();
    let a = graph.add("a", r#"import "b";"#, &[Print("a")]);
    graph.add("b", "", &[Print("b")]);
    graph.load("a").unwrap();
    a.link(&mut graph.agent).unwrap();
    let promise = a.evaluate(&mut graph.agent);
    assert_eq!(promise.result(&graph.agent), Some(Ok(())));
    assert_eq!(graph.log(), ["b", "a"]);
    assert_eq!(a.evaluate(&mut graph.agent), promise);
}

#[test]
fn async_rejection_reaches_importers() {
    let mut graph = Graph::new();
    let a = graph.add("a", r#"import "b";"#, &[Print("a")]);
    graph.add(
        "b",
        "await 0;",
        &[Print("b - start"), Await, Throw("b failed")],
    );
    graph.load("a").unwrap();
    a.link(&mut graph.agent).unwrap();
    let promise = a.evaluate(&mut graph.agent);
    assert!(promise.is_pending(&graph.agent));
    assert_eq!(
        graph.status("a"),
        Some(CyclicModuleRecordStatus::EvaluatingAsync)
    );
    graph.run_jobs();
    let Some(Err(error)) = promise.result(&graph.agent) else {
        panic!("evaluation should have failed");
    };
    assert_eq!(graph.message(error), "Error: b failed");
    assert_eq!(graph.log(), ["b - start"]);
    assert_eq!(graph.status("a"), Some(CyclicModuleRecordStatus::Evaluated));
    assert_eq!(a.evaluation_error(&graph.agent), Some(error));
}

#[test]
fn synthetic_modules_take_part_in_the_graph() {
    let mut graph = Graph::new();
    let realm = graph.realm;
    let answer = create_synthetic_module(
        &mut graph.agent,
        &["answer"],
        Box::new(|agent, module| set_synthetic_export(agent, module, "answer", Value::from(42.0))),
        realm,
        None,
    );
    graph.register("answer", answer);
    graph.add(
        "a",
        r#"import { answer } from "answer";"#,
        &[PrintBinding("answer")],
    );
    graph.run("a").unwrap();
    assert_eq!(graph.log(), ["answer = 42"]);
    assert_eq!(answer.status(&graph.agent), None);
}

#[test]
fn namespace_excludes_ambiguous_and_default_star_exports() {
    let mut graph = Graph::new();
    let a = graph.add(
        "a",
        r#"export * from "b"; export * from "c"; export const z = 1; export { z as Zed };"#,
        &[Init("z", Value::from(1.0))],
    );
    graph.add(
        "b",
        "export const x = 1; export const shared = 1; export default 3;",
        &[],
    );
    graph.add("c", "export const shared = 2; export const y = 1;", &[]);
    graph.run("a").unwrap();

    let namespace = get_module_namespace(&mut graph.agent, a, ImportPhase::Evaluation);
    assert!(!namespace.is_deferred(&graph.agent));
    let keys: Vec<&str> = namespace
        .keys(&graph.agent)
        .iter()
        .map(|key| &**key)
        .collect();
    assert_eq!(keys, ["Zed", "x", "y", "z"]);
    assert!(!namespace.has(&graph.agent, "shared"));
    assert_eq!(
        namespace.get(&mut graph.agent, "shared").unwrap(),
        Value::Undefined
    );
    assert_eq!(
        namespace.get(&mut graph.agent, "Zed").unwrap(),
        Value::from(1.0)
    );
    let error = namespace.get(&mut graph.agent, "x").unwrap_err();
    assert_eq!(error.kind(&graph.agent), ExceptionType::ReferenceError);
}
