// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
mod helper;
mod host;

use std::path::PathBuf;

use clap::{Parser as ClapParser, Subcommand};
use helper::{exit_with_parse_errors, init_tracing};
use host::CliHostHooks;
use module_graph::ecmascript::{
    builtins::Promise,
    execution::{Agent, JsError, Options},
    scripts_and_modules::module::{
        Module,
        module_semantics::{ImportPhase, abstract_module_records::ModuleAbstractMethods},
    },
};
use thiserror::Error;

/// Loads, links and evaluates ECMAScript module graphs
#[derive(Debug, ClapParser)]
#[command(name = "module_graph")]
#[command(about = "Loads, links and evaluates ECMAScript module graphs", long_about = None)]
struct Cli {
    /// Treat `import defer` as a regular import
    #[arg(long, global = true)]
    disable_import_defer: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Parses a module and prints its requests and entries
    Requests {
        /// The path of the module to parse
        path: PathBuf,
    },

    /// Evaluates a module graph, printing each module as it executes
    Eval {
        #[arg(short, long)]
        verbose: bool,

        /// The entry module of the graph
        entry: PathBuf,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error("Uncaught exception: {0}")]
    Uncaught(String),
    #[error("{0} did not settle")]
    Unsettled(&'static str),
}

impl CliError {
    fn uncaught(agent: &Agent, error: JsError) -> Self {
        CliError::Uncaught(error.to_string(agent))
    }
}

fn main() {
    let args = Cli::parse();
    let verbose = matches!(args.command, Command::Eval { verbose: true, .. });
    init_tracing(verbose);

    let host_hooks: &CliHostHooks = &*Box::leak(Box::default());
    let mut agent = Agent::new(
        Options {
            disable_import_defer: args.disable_import_defer,
        },
        host_hooks,
    );
    let result = match args.command {
        Command::Requests { path } => print_requests(&mut agent, host_hooks, path),
        Command::Eval { verbose, entry } => eval(&mut agent, host_hooks, entry, verbose),
    };
    if let Some(failure) = host_hooks.take_parse_failure() {
        exit_with_parse_errors(failure.errors, &failure.path, failure.source_text);
    }
    if let Err(error) = result {
        eprintln!("{error}");
        std::process::exit(1);
    }
}

fn load_entry(agent: &mut Agent, host_hooks: &CliHostHooks, path: PathBuf) -> Result<Module, CliError> {
    let realm = agent.create_realm(None);
    host_hooks
        .load_file(agent, realm, &path, None)
        .map_err(|error| CliError::uncaught(agent, error))
}

fn print_requests(agent: &mut Agent, host_hooks: &CliHostHooks, path: PathBuf) -> Result<(), CliError> {
    let module = load_entry(agent, host_hooks, path)?;
    println!("requests:");
    for request in module.requested_modules(agent) {
        let phase = match request.phase() {
            ImportPhase::Defer => "defer",
            ImportPhase::Evaluation => "evaluation",
        };
        print!("  {:?} ({phase})", request.specifier());
        for attribute in request.attributes() {
            print!(" {}: {:?}", attribute.key, attribute.value);
        }
        println!();
    }
    println!("imports:");
    for entry in module.import_entries(agent) {
        let import_name = entry.import_name.as_deref().unwrap_or("*");
        println!(
            "  {import_name} as {} from {:?}",
            entry.local_name,
            entry.module_request.specifier()
        );
    }
    println!("exports:");
    for entry in module.local_export_entries(agent) {
        println!("  {} (local {})", entry.export_name, entry.local_name);
    }
    for entry in module.indirect_export_entries(agent) {
        let import_name = entry.import_name.as_deref().unwrap_or("*");
        println!(
            "  {} ({import_name} from {:?})",
            entry.export_name,
            entry.module_request.specifier()
        );
    }
    for request in module.star_export_entries(agent) {
        println!("  * from {:?}", request.specifier());
    }
    println!("top-level await: {}", module.has_tla(agent));
    Ok(())
}

fn run_jobs(agent: &mut Agent, host_hooks: &CliHostHooks) -> Result<(), CliError> {
    while let Some(job) = host_hooks.pop_promise_job() {
        job.run(agent)
            .map_err(|error| CliError::uncaught(agent, error))?;
    }
    Ok(())
}

/// Runs all jobs and returns the result the promise settled with.
fn settle(
    agent: &mut Agent,
    host_hooks: &CliHostHooks,
    promise: Promise,
    operation: &'static str,
) -> Result<(), CliError> {
    run_jobs(agent, host_hooks)?;
    match promise.result(agent) {
        Some(Ok(())) => Ok(()),
        Some(Err(error)) => Err(CliError::uncaught(agent, error)),
        None => Err(CliError::Unsettled(operation)),
    }
}

fn eval(agent: &mut Agent, host_hooks: &CliHostHooks, entry: PathBuf, verbose: bool) -> Result<(), CliError> {
    let module = load_entry(agent, host_hooks, entry)?;

    let promise = module.load_requested_modules(agent, None);
    settle(agent, host_hooks, promise, "Loading")?;

    module
        .link(agent)
        .map_err(|error| CliError::uncaught(agent, error))?;

    let promise = module.evaluate(agent);
    let result = settle(agent, host_hooks, promise, "Evaluation");

    if verbose {
        for (path, module_type, module) in host_hooks.modules() {
            match (module.status(agent), module_type) {
                (Some(status), _) => println!("{}: {status:?}", path.display()),
                (None, Some(module_type)) => println!("{} ({module_type}): synthetic", path.display()),
                (None, None) => println!("{}: synthetic", path.display()),
            }
        }
    }
    result
}
