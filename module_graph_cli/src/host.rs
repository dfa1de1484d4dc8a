// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::{
    cell::RefCell,
    collections::VecDeque,
    fmt::Debug,
    path::{Path, PathBuf},
    rc::Rc,
};

use ahash::AHashMap;
use module_graph::ecmascript::{
    builtins::{Promise, PromiseCapability},
    execution::{
        Agent, ExceptionType, JsResult, Realm,
        agent::{HostHooks, Job},
    },
    scripts_and_modules::module::{
        Module,
        module_semantics::{
            ModuleRequestRecord, cyclic_module_records::CyclicModuleBody,
            finish_loading_imported_module, graph_loading::GraphLoadingState,
            source_text_module_records::parse_module,
            synthetic_module_records::create_default_export_synthetic_module,
        },
    },
    types::{HostDefined, Value},
};
use oxc_diagnostics::OxcDiagnostic;

/// A module file that failed to parse.
pub struct ParseFailure {
    pub path: PathBuf,
    pub source_text: String,
    pub errors: Vec<OxcDiagnostic>,
}

/// Loads modules from the file system. Specifiers are paths relative to the
/// importing module.
#[derive(Default)]
pub struct CliHostHooks {
    promise_job_queue: RefCell<VecDeque<Job>>,
    /// Loaded modules by path and `type` attribute. The same file imported
    /// with a different type is a different module.
    modules: RefCell<AHashMap<(PathBuf, Option<String>), Module>>,
    parse_failures: RefCell<Vec<ParseFailure>>,
}

// RefCell doesn't implement Debug
impl Debug for CliHostHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CliHostHooks").finish()
    }
}

impl CliHostHooks {
    pub fn pop_promise_job(&self) -> Option<Job> {
        self.promise_job_queue.borrow_mut().pop_front()
    }

    pub fn take_parse_failure(&self) -> Option<ParseFailure> {
        self.parse_failures.borrow_mut().pop()
    }

    /// Every module loaded so far with its `type` attribute, ordered by path.
    pub fn modules(&self) -> Vec<(PathBuf, Option<String>, Module)> {
        let mut modules: Vec<_> = self
            .modules
            .borrow()
            .iter()
            .map(|((path, module_type), module)| (path.clone(), module_type.clone(), *module))
            .collect();
        modules.sort_by(|(a, a_type, _), (b, b_type, _)| a.cmp(b).then_with(|| a_type.cmp(b_type)));
        modules
    }

    /// Reads and parses a module file, or returns the module already loaded
    /// from the same path with the same type.
    ///
    /// A `text` module exports the file's contents as its default export.
    /// Other types are rejected.
    pub fn load_file(
        &self,
        agent: &mut Agent,
        realm: Realm,
        path: &Path,
        attributes_type: Option<&str>,
    ) -> JsResult<Module> {
        let path = path.canonicalize().map_err(|err| {
            agent.throw_exception(
                ExceptionType::Error,
                format!("Cannot find module '{}': {err}", path.display()),
            )
        })?;
        if let Some(other) = attributes_type.filter(|module_type| *module_type != "text") {
            return Err(agent.throw_exception(
                ExceptionType::TypeError,
                format!("Unsupported module type '{other}'"),
            ));
        }
        let key = (path, attributes_type.map(str::to_string));
        if let Some(module) = self.modules.borrow().get(&key) {
            return Ok(*module);
        }
        let path = &key.0;
        let source_text = std::fs::read_to_string(path).map_err(|err| {
            agent.throw_exception(
                ExceptionType::Error,
                format!("Cannot read module '{}': {err}", path.display()),
            )
        })?;
        let host_defined: HostDefined = Rc::new(path.clone());
        let module = match attributes_type {
            Some(_) => create_default_export_synthetic_module(
                agent,
                Value::from(source_text.as_str()),
                realm,
                Some(host_defined),
            ),
            None => {
                let body = Rc::new(TraceBody {
                    name: display_name(path),
                });
                match parse_module(agent, &source_text, realm, Some(host_defined), body) {
                    Ok(module) => module,
                    Err(errors) => {
                        let error = agent.throw_exception(
                            ExceptionType::SyntaxError,
                            format!("Cannot parse module '{}'", path.display()),
                        );
                        self.parse_failures.borrow_mut().push(ParseFailure {
                            path: path.clone(),
                            source_text,
                            errors,
                        });
                        return Err(error);
                    }
                }
            }
        };
        tracing::debug!(path = %path.display(), module_type = ?attributes_type, "loaded module");
        self.modules.borrow_mut().insert(key, module);
        Ok(module)
    }
}

impl HostHooks for CliHostHooks {
    fn host_load_imported_module(
        &self,
        agent: &mut Agent,
        referrer: Module,
        module_request: &ModuleRequestRecord,
        _host_defined: Option<HostDefined>,
        payload: GraphLoadingState,
    ) {
        let referrer_path = referrer
            .host_defined(agent)
            .and_then(|host_defined| host_defined.downcast_ref::<PathBuf>().cloned());
        let base = referrer_path
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let path = base.join(module_request.specifier());
        let realm = referrer.realm(agent);
        let result = self.load_file(agent, realm, &path, module_request.attribute("type"));
        finish_loading_imported_module(agent, referrer, module_request, result, payload);
    }

    fn enqueue_promise_job(&self, job: Job) {
        self.promise_job_queue.borrow_mut().push_back(job);
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Prints a line when a module is executed instead of running its code.
///
/// Modules with top-level await finish in a later job.
#[derive(Debug)]
struct TraceBody {
    name: String,
}

impl CyclicModuleBody for TraceBody {
    fn initialize_environment(&self, _agent: &mut Agent, _module: Module) -> JsResult<()> {
        Ok(())
    }

    fn execute_module(
        &self,
        agent: &mut Agent,
        _module: Module,
        promise_capability: Option<PromiseCapability>,
    ) -> JsResult<()> {
        let Some(capability) = promise_capability else {
            println!("{}", self.name);
            return Ok(());
        };
        println!("{} - start", self.name);
        let name = self.name.clone();
        Promise::new_resolved(agent).then(agent, move |agent, _| {
            println!("{name} - finish");
            capability.resolve(agent);
            Ok(())
        });
        Ok(())
    }

    fn get_binding_value(&self, _agent: &mut Agent, _module: Module, _name: &str) -> JsResult<Value> {
        Ok(Value::Undefined)
    }
}

#[cfg(test)]
mod tests {
    use module_graph::ecmascript::execution::Options;

    use super::*;

    fn write_module(name: &str, source_text: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("module_graph_cli_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, source_text).unwrap();
        path
    }

    #[test]
    fn modules_are_keyed_by_path_and_type() {
        let host_hooks: &CliHostHooks = Box::leak(Box::default());
        let mut agent = Agent::new(Options::default(), host_hooks);
        let realm = agent.create_realm(None);
        let path = write_module("keyed.mjs", "export const x = 1;");

        let text = host_hooks
            .load_file(&mut agent, realm, &path, Some("text"))
            .unwrap();
        let source = host_hooks.load_file(&mut agent, realm, &path, None).unwrap();
        assert_ne!(text, source);
        assert_eq!(text.status(&agent), None);
        assert!(source.status(&agent).is_some());

        assert_eq!(
            host_hooks.load_file(&mut agent, realm, &path, Some("text")),
            Ok(text)
        );
        assert_eq!(host_hooks.load_file(&mut agent, realm, &path, None), Ok(source));
        assert_eq!(host_hooks.modules().len(), 2);
    }

    #[test]
    fn json_modules_are_rejected() {
        let host_hooks: &CliHostHooks = Box::leak(Box::default());
        let mut agent = Agent::new(Options::default(), host_hooks);
        let realm = agent.create_realm(None);
        let path = write_module("data.json", r#"{ "answer": 42 }"#);

        let error = host_hooks
            .load_file(&mut agent, realm, &path, Some("json"))
            .unwrap_err();
        assert_eq!(error.kind(&agent), ExceptionType::TypeError);
        assert_eq!(
            error.to_string(&agent),
            "TypeError: Unsupported module type 'json'"
        );
        assert!(host_hooks.modules().is_empty());
    }
}
