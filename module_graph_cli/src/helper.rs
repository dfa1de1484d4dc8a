// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use oxc_diagnostics::OxcDiagnostic;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Installs the tracing subscriber.
///
/// `RUST_LOG` takes precedence; without it only warnings are shown, or
/// debug output of the engine with `--verbose`.
pub fn init_tracing(verbose: bool) {
    let default_directive = if verbose {
        "module_graph=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Exit the program with parse errors.
pub fn exit_with_parse_errors(errors: Vec<OxcDiagnostic>, source_path: &Path, source: String) -> ! {
    assert!(!errors.is_empty());

    // This seems to be needed for color and Unicode output.
    let _ = miette::set_hook(Box::new(|_| {
        Box::new(oxc_diagnostics::GraphicalReportHandler::new())
    }));

    eprintln!("Parse errors:");

    let named_source = miette::NamedSource::new(source_path.display().to_string(), source);

    for error in errors {
        let report = error.with_source_code(named_source.clone());
        eprint!("{:?}", report);
    }
    eprintln!();

    std::process::exit(1);
}
