// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ## [16.2.1.7 Source Text Module Records](https://tc39.es/ecma262/#sec-source-text-module-records)

use std::rc::Rc;

use ahash::AHashSet;
use oxc_allocator::Allocator;
use oxc_ast::ast;
use oxc_diagnostics::OxcDiagnostic;
use oxc_ecmascript::BoundNames;
use oxc_parser::{Parser, ParserReturn};
use oxc_span::SourceType;

use crate::{
    ecmascript::{
        execution::{Agent, ExceptionType, JsError, JsResult, Realm},
        scripts_and_modules::module::{Module, ModuleHeapData},
        types::HostDefined,
    },
    heap::CreateHeapData,
};

use super::{
    ImportAttribute, ImportPhase, ModuleRequestRecord,
    abstract_module_records::{
        AbstractModuleRecord, ImportBinding, ModuleAbstractMethods, ModuleEnvironment,
        ResolvedBinding,
    },
    cyclic_module_records::{CyclicModuleBody, CyclicModuleRecord, CyclicModuleRecordStatus},
    get_module_namespace, imported_module,
};

/// ### [16.2.1.7 Source Text Module Records](https://tc39.es/ecma262/#sec-source-text-module-records)
///
/// A Source Text Module Record is used to represent information about a
/// module that was defined from ECMAScript source text (11) that was parsed
/// using the goal symbol Module. Its fields contain digested information
/// about the names that are imported by the module and its concrete methods
/// use this digest to link and evaluate the module.
#[derive(Debug)]
pub struct SourceTextModuleRecord {
    pub(crate) abstract_fields: AbstractModuleRecord,
    pub(crate) cyclic_fields: CyclicModuleRecord,
    /// ### \[\[ECMAScriptCode]]
    ///
    /// The evaluator of the module's own declarations and statements.
    pub(crate) body: Rc<dyn CyclicModuleBody>,
    /// ### \[\[ImportEntries]]
    ///
    /// A List of ImportEntry records derived from the code of this module.
    pub(crate) import_entries: Box<[ImportEntryRecord]>,
    /// ### \[\[LocalExportEntries]]
    ///
    /// A List of ExportEntry records derived from the code of this module
    /// that correspond to declarations that occur within the module.
    pub(crate) local_export_entries: Box<[LocalExportEntryRecord]>,
    /// ### \[\[IndirectExportEntries]]
    ///
    /// A List of ExportEntry records derived from the code of this module
    /// that correspond to reexported imports that occur within the module or
    /// exports from `export * as namespace` declarations.
    pub(crate) indirect_export_entries: Box<[IndirectExportEntryRecord]>,
    /// ### \[\[StarExportEntries]]
    ///
    /// A List of ExportEntry records derived from the code of this module
    /// that correspond to `export *` declarations that occur within the
    /// module, not including `export * as namespace` declarations.
    pub(crate) star_export_entries: Box<[ModuleRequestRecord]>,
}

/// ### [ImportEntry Records](https://tc39.es/ecma262/#importentry-record)
#[derive(Debug, Clone)]
pub struct ImportEntryRecord {
    /// ### \[\[ModuleRequest]]
    ///
    /// ModuleRequest Record representing the ModuleSpecifier and import
    /// attributes of the ImportDeclaration.
    pub module_request: ModuleRequestRecord,
    /// ### \[\[ImportName]]
    ///
    /// The name under which the desired binding is exported by the module
    /// identified by \[\[ModuleRequest]]. `None` indicates that the import
    /// request is for the target module's namespace object.
    pub import_name: Option<Rc<str>>,
    /// ### \[\[LocalName]]
    ///
    /// The name that is used to locally access the imported value from
    /// within the importing module.
    pub local_name: Rc<str>,
}

/// ### [ExportEntry Records](https://tc39.es/ecma262/#exportentry-record)
///
/// An export of a binding declared in the module itself.
#[derive(Debug, Clone)]
pub struct LocalExportEntryRecord {
    /// ### \[\[ExportName]]
    pub export_name: Rc<str>,
    /// ### \[\[LocalName]]
    ///
    /// The name that is used to locally access the exported value from
    /// within the importing module.
    pub local_name: Rc<str>,
}

/// ### [ExportEntry Records](https://tc39.es/ecma262/#exportentry-record)
///
/// A re-export of a binding of another module.
#[derive(Debug, Clone)]
pub struct IndirectExportEntryRecord {
    /// ### \[\[ExportName]]
    pub export_name: Rc<str>,
    /// ### \[\[ModuleRequest]]
    pub module_request: ModuleRequestRecord,
    /// ### \[\[ImportName]]
    ///
    /// `None` for `export * as ns from "mod"` declarations.
    pub import_name: Option<Rc<str>>,
}

const DEFAULT: &str = "default";
/// The local name of `export default` expressions.
const DEFAULT_BINDING: &str = "*default*";

fn source_text_record(agent: &Agent, module: Module) -> Option<&SourceTextModuleRecord> {
    match &agent[module] {
        ModuleHeapData::SourceText(record) => Some(record.as_ref()),
        ModuleHeapData::Synthetic(_) => None,
    }
}

/// The body evaluator of a Source Text Module Record.
pub(crate) fn module_body(agent: &Agent, module: Module) -> Option<Rc<dyn CyclicModuleBody>> {
    source_text_record(agent, module).map(|record| record.body.clone())
}

impl Module {
    /// ### \[\[ImportEntries]]
    pub fn import_entries(self, agent: &Agent) -> &[ImportEntryRecord] {
        source_text_record(agent, self)
            .map(|record| &*record.import_entries)
            .unwrap_or_default()
    }

    /// ### \[\[LocalExportEntries]]
    pub fn local_export_entries(self, agent: &Agent) -> &[LocalExportEntryRecord] {
        source_text_record(agent, self)
            .map(|record| &*record.local_export_entries)
            .unwrap_or_default()
    }

    /// ### \[\[IndirectExportEntries]]
    pub fn indirect_export_entries(self, agent: &Agent) -> &[IndirectExportEntryRecord] {
        source_text_record(agent, self)
            .map(|record| &*record.indirect_export_entries)
            .unwrap_or_default()
    }

    /// ### \[\[StarExportEntries]]
    pub fn star_export_entries(self, agent: &Agent) -> &[ModuleRequestRecord] {
        source_text_record(agent, self)
            .map(|record| &*record.star_export_entries)
            .unwrap_or_default()
    }
}

/// ### [16.2.1.7.2.1 GetExportedNames ( \[ exportStarSet \] )](https://tc39.es/ecma262/#sec-getexportednames)
///
/// The GetExportedNames concrete method of a Source Text Module Record
/// module takes optional argument exportStarSet (a List of Source Text
/// Module Records) and returns a List of Strings.
///
/// > NOTE: GetExportedNames does not filter out or throw an exception for
/// > names that have ambiguous star export bindings.
pub(crate) fn get_exported_names(
    agent: &Agent,
    module: Module,
    export_star_set: &mut Vec<Module>,
) -> Vec<Rc<str>> {
    // 1. Assert: module.[[Status]] is not new.
    debug_assert_ne!(module.status(agent), Some(CyclicModuleRecordStatus::New));
    let Some(record) = source_text_record(agent, module) else {
        return vec![];
    };
    // 2. If exportStarSet is not present, set exportStarSet to a new empty
    //    List.
    // 3. If exportStarSet contains module, then
    if export_star_set.contains(&module) {
        // a. Assert: We've reached the starting point of an export *
        //    circularity.
        // b. Return a new empty List.
        return vec![];
    }
    // 4. Append module to exportStarSet.
    export_star_set.push(module);
    // 5. Let exportedNames be a new empty List.
    let mut exported_names: Vec<Rc<str>> = vec![];
    // 6. For each ExportEntry Record e of module.[[LocalExportEntries]], do
    //     c. Append e.[[ExportName]] to exportedNames.
    exported_names.extend(
        record
            .local_export_entries
            .iter()
            .map(|e| e.export_name.clone()),
    );
    // 7. For each ExportEntry Record e of module.[[IndirectExportEntries]], do
    //     c. Append e.[[ExportName]] to exportedNames.
    exported_names.extend(
        record
            .indirect_export_entries
            .iter()
            .map(|e| e.export_name.clone()),
    );
    // 8. For each ExportEntry Record e of module.[[StarExportEntries]], do
    for e in record.star_export_entries.iter() {
        // a. Assert: e.[[ModuleRequest]] is not null.
        // b. Let requestedModule be GetImportedModule(module, e.[[ModuleRequest]]).
        let requested_module = imported_module(agent, module, e);
        // c. Let starNames be requestedModule.GetExportedNames(exportStarSet).
        let star_names = requested_module.get_exported_names(agent, export_star_set);
        // d. For each element n of starNames, do
        for n in star_names {
            // i. If n is not "default", then
            //     1. If exportedNames does not contain n, then
            if &*n != DEFAULT && !exported_names.contains(&n) {
                // a. Append n to exportedNames.
                exported_names.push(n);
            }
        }
    }
    // 9. Return exportedNames.
    exported_names
}

/// ### [16.2.1.7.2.2 ResolveExport ( exportName \[ , resolveSet \] )](https://tc39.es/ecma262/#sec-resolveexport)
///
/// The ResolveExport concrete method of a Source Text Module Record module
/// takes argument exportName (a String) and optional argument resolveSet (a
/// List of Records with fields \[\[Module]] (a Module Record) and
/// \[\[ExportName]] (a String)) and returns a ResolvedBinding Record, null,
/// or ambiguous.
///
/// ResolveExport attempts to resolve an imported binding to the actual
/// defining module and local binding name. The defining module may be the
/// module represented by the Module Record this method was invoked on or
/// some other module that is imported by that module. The parameter
/// resolveSet is used to detect unresolved circular import/export paths. If
/// a pair consisting of specific Module Record and exportName is reached
/// that is already in resolveSet, an import circularity has been
/// encountered. Before recursively calling ResolveExport, a pair consisting
/// of module and exportName is added to resolveSet.
pub(crate) fn resolve_export(
    agent: &Agent,
    module: Module,
    export_name: &str,
    resolve_set: &mut Vec<(Module, Rc<str>)>,
) -> Option<ResolvedBinding> {
    // 1. Assert: module.[[Status]] is not new.
    debug_assert_ne!(module.status(agent), Some(CyclicModuleRecordStatus::New));
    let record = source_text_record(agent, module)?;
    // 2. If resolveSet is not present, set resolveSet to a new empty List.
    // 3. For each Record { [[Module]], [[ExportName]] } r of resolveSet, do
    //     a. If module and r.[[Module]] are the same Module Record and
    //        exportName is r.[[ExportName]], then
    if resolve_set
        .iter()
        .any(|(m, name)| *m == module && &**name == export_name)
    {
        // i. Assert: This is a circular import request.
        // ii. Return null.
        return None;
    }
    // 4. Append the Record { [[Module]]: module, [[ExportName]]: exportName }
    //    to resolveSet.
    resolve_set.push((module, export_name.into()));
    // 5. For each ExportEntry Record e of module.[[LocalExportEntries]], do
    //     a. If exportName is e.[[ExportName]], then
    if let Some(e) = record
        .local_export_entries
        .iter()
        .find(|e| &*e.export_name == export_name)
    {
        // i. Assert: module provides the direct binding for this export.
        // ii. Return ResolvedBinding Record { [[Module]]: module,
        //     [[BindingName]]: e.[[LocalName]] }.
        return Some(ResolvedBinding::Resolved {
            module,
            binding_name: Some(e.local_name.clone()),
        });
    }
    // 6. For each ExportEntry Record e of module.[[IndirectExportEntries]], do
    //     a. If exportName is e.[[ExportName]], then
    if let Some(e) = record
        .indirect_export_entries
        .iter()
        .find(|e| &*e.export_name == export_name)
    {
        // i. Assert: e.[[ModuleRequest]] is not null.
        // ii. Let importedModule be GetImportedModule(module,
        //     e.[[ModuleRequest]]).
        let imported_module = imported_module(agent, module, &e.module_request);
        return match &e.import_name {
            // iii. If e.[[ImportName]] is all, then
            //     1. Assert: module does not provide the direct binding for
            //        this export.
            //     2. Return ResolvedBinding Record { [[Module]]:
            //        importedModule, [[BindingName]]: namespace }.
            None => Some(ResolvedBinding::Resolved {
                module: imported_module,
                binding_name: None,
            }),
            // iv. Else,
            //     1. Assert: module imports a specific binding for this
            //        export.
            //     2. Return importedModule.ResolveExport(e.[[ImportName]],
            //        resolveSet).
            Some(import_name) => imported_module.resolve_export(agent, import_name, resolve_set),
        };
    }
    // 7. If exportName is "default", then
    if export_name == DEFAULT {
        // a. Assert: A default export was not explicitly defined by this
        //    module.
        // b. Return null.
        // c. NOTE: A default export cannot be provided by an export * from
        //    "mod" declaration.
        return None;
    }
    // 8. Let starResolution be null.
    let mut star_resolution: Option<ResolvedBinding> = None;
    // 9. For each ExportEntry Record e of module.[[StarExportEntries]], do
    for e in record.star_export_entries.iter() {
        // a. Assert: e.[[ModuleRequest]] is not null.
        // b. Let importedModule be GetImportedModule(module, e.[[ModuleRequest]]).
        let imported_module = imported_module(agent, module, e);
        // c. Let resolution be importedModule.ResolveExport(exportName,
        //    resolveSet).
        let resolution = imported_module.resolve_export(agent, export_name, resolve_set);
        match resolution {
            // d. If resolution is ambiguous, return ambiguous.
            Some(ResolvedBinding::Ambiguous) => return Some(ResolvedBinding::Ambiguous),
            // e. If resolution is not null, then
            Some(ResolvedBinding::Resolved {
                module: resolved_module,
                binding_name,
            }) => {
                // iii. Else,
                if let Some(ResolvedBinding::Resolved {
                    module: star_module,
                    binding_name: star_binding_name,
                }) = &star_resolution
                {
                    // 1. Assert: There is more than one * import that
                    //    includes the requested name.
                    // 2. If resolution.[[Module]] and
                    //    starResolution.[[Module]] are not the same Module
                    //    Record, return ambiguous.
                    // 3. If resolution.[[BindingName]] is not
                    //    starResolution.[[BindingName]], return ambiguous.
                    if *star_module != resolved_module || *star_binding_name != binding_name {
                        return Some(ResolvedBinding::Ambiguous);
                    }
                } else {
                    // i. Assert: resolution is a ResolvedBinding Record.
                    // ii. If starResolution is null, then
                    //     1. Set starResolution to resolution.
                    star_resolution = Some(ResolvedBinding::Resolved {
                        module: resolved_module,
                        binding_name,
                    });
                }
            }
            None => {}
        }
    }
    // 10. Return starResolution.
    star_resolution
}

/// ### [16.2.1.7.3.1 InitializeEnvironment ( )](https://tc39.es/ecma262/#sec-source-text-module-record-initialize-environment)
///
/// The InitializeEnvironment concrete method of a Source Text Module Record
/// module takes no arguments and returns either a normal completion
/// containing unused or a throw completion.
///
/// The import bindings are resolved here; the module's own declarations are
/// left to its body.
pub(crate) fn initialize_environment(agent: &mut Agent, module: Module) -> JsResult<()> {
    let Some(record) = source_text_record(agent, module) else {
        return Ok(());
    };
    let body = record.body.clone();
    let import_entries = record.import_entries.to_vec();
    // 1. For each ExportEntry Record e of module.[[IndirectExportEntries]], do
    let mut unresolved = None;
    for e in record.indirect_export_entries.iter() {
        // a. Assert: e.[[ExportName]] is not null.
        // b. Let resolution be module.ResolveExport(e.[[ExportName]]).
        let resolution = resolve_export(agent, module, &e.export_name, &mut vec![]);
        // c. If resolution is either null or ambiguous, throw a SyntaxError
        //    exception.
        if !matches!(resolution, Some(ResolvedBinding::Resolved { .. })) {
            unresolved = Some((e.clone(), resolution.is_some()));
            break;
        }
        // d. Assert: resolution is a ResolvedBinding Record.
    }
    if let Some((e, ambiguous)) = unresolved {
        return Err(unresolvable_import(
            agent,
            &e.module_request,
            &e.export_name,
            ambiguous,
        ));
    }
    // 2. Assert: All named exports from module are resolvable.
    // 5. Let env be NewModuleEnvironment(realm.[[GlobalEnv]]).
    let mut env = ModuleEnvironment::default();
    // 7. For each ImportEntry Record in of module.[[ImportEntries]], do
    for r#in in import_entries {
        // a. Let importedModule be GetImportedModule(module,
        //    in.[[ModuleRequest]]).
        let imported_module = imported_module(agent, module, &r#in.module_request);
        // b. If in.[[ImportName]] is namespace-object, then
        let Some(import_name) = &r#in.import_name else {
            // i. Let namespace be GetModuleNamespace(importedModule,
            //    in.[[ModuleRequest]].[[Phase]]).
            let namespace =
                get_module_namespace(agent, imported_module, r#in.module_request.phase());
            // ii. Perform ! env.CreateImmutableBinding(in.[[LocalName]], true).
            // iii. Perform ! env.InitializeBinding(in.[[LocalName]], namespace).
            env.bindings
                .insert(r#in.local_name, ImportBinding::Namespace(namespace));
            continue;
        };
        // c. Else,
        // i. Let resolution be importedModule.ResolveExport(in.[[ImportName]]).
        let resolution = imported_module.resolve_export(agent, import_name, &mut vec![]);
        let ambiguous = matches!(resolution, Some(ResolvedBinding::Ambiguous));
        // ii. If resolution is either null or ambiguous, throw a SyntaxError
        //     exception.
        let Some(ResolvedBinding::Resolved {
            module: resolved_module,
            binding_name,
        }) = resolution
        else {
            return Err(unresolvable_import(
                agent,
                &r#in.module_request,
                import_name,
                ambiguous,
            ));
        };
        let binding = match binding_name {
            // iii. If resolution.[[BindingName]] is namespace, then
            //     1. Let namespace be GetModuleNamespace(resolution.[[Module]],
            //        evaluation).
            //     2. Perform ! env.CreateImmutableBinding(in.[[LocalName]], true).
            //     3. Perform ! env.InitializeBinding(in.[[LocalName]], namespace).
            None => ImportBinding::Namespace(get_module_namespace(
                agent,
                resolved_module,
                ImportPhase::Evaluation,
            )),
            // iv. Else,
            //     1. Perform CreateImportBinding(env, in.[[LocalName]],
            //        resolution.[[Module]], resolution.[[BindingName]]).
            Some(binding_name) => ImportBinding::Indirect {
                module: resolved_module,
                binding_name,
            },
        };
        env.bindings.insert(r#in.local_name, binding);
    }
    // 6. Set module.[[Environment]] to env.
    agent[module].abstract_fields_mut().environment = Some(env);
    // 18. Let code be module.[[ECMAScriptCode]].
    // 19-24. Instantiate the module's own declarations.
    body.initialize_environment(agent, module)
    // 26. Return unused.
}

fn unresolvable_import(
    agent: &mut Agent,
    module_request: &ModuleRequestRecord,
    name: &str,
    ambiguous: bool,
) -> JsError {
    let message = if ambiguous {
        format!(
            "The requested module '{}' contains conflicting star exports for name '{name}'",
            module_request.specifier()
        )
    } else {
        format!(
            "The requested module '{}' does not provide an export named '{name}'",
            module_request.specifier()
        )
    };
    agent.throw_exception(ExceptionType::SyntaxError, message)
}

/// ### [16.2.1.7.1 ParseModule ( sourceText, realm, hostDefined )](https://tc39.es/ecma262/#sec-parsemodule)
///
/// Parses the source text as a module and digests its imports and exports.
/// The module's declarations and statements are evaluated by `body`.
pub fn parse_module(
    agent: &mut Agent,
    source_text: &str,
    realm: Realm,
    host_defined: Option<HostDefined>,
    body: Rc<dyn CyclicModuleBody>,
) -> Result<Module, Vec<OxcDiagnostic>> {
    // 1. Let body be ParseText(sourceText, Module).
    let allocator = Allocator::default();
    let source_type = SourceType::default().with_module(true);
    let ParserReturn {
        program, errors, ..
    } = Parser::new(&allocator, source_text, source_type).parse();
    // 2. If body is a List of errors, return body.
    if !errors.is_empty() {
        return Err(errors);
    }
    let defer_enabled =
        cfg!(feature = "proposal-import-defer") && !agent.options().disable_import_defer;

    // 3. Let requestedModules be the ModuleRequests of body.
    let mut requested_modules: Vec<ModuleRequestRecord> = vec![];
    // 4. Let importEntries be the ImportEntries of body.
    let mut import_entries: Vec<ImportEntryRecord> = vec![];
    // 6. Let indirectExportEntries be a new empty List.
    let mut indirect_export_entries = vec![];
    // 7. Let localExportEntries be a new empty List.
    let mut local_export_entries: Vec<LocalExportEntryRecord> = vec![];
    // 8. Let starExportEntries be a new empty List.
    let mut star_export_entries = vec![];

    for statement in program.body.iter() {
        let Some(declaration) = statement.as_module_declaration() else {
            continue;
        };
        match declaration {
            ast::ModuleDeclaration::ImportDeclaration(decl) => {
                let phase = if defer_enabled && matches!(decl.phase, Some(ast::ImportPhase::Defer)) {
                    ImportPhase::Defer
                } else {
                    ImportPhase::Evaluation
                };
                let module_request = module_request(&decl.source, decl.with_clause.as_deref())
                    .with_phase(phase);
                add_requested_module(&mut requested_modules, &module_request);
                let Some(specifiers) = &decl.specifiers else {
                    continue;
                };
                for specifier in specifiers.iter() {
                    let (import_name, local_name) = match specifier {
                        ast::ImportDeclarationSpecifier::ImportSpecifier(specifier) => (
                            Some(specifier.imported.name().as_str().into()),
                            specifier.local.name.as_str(),
                        ),
                        ast::ImportDeclarationSpecifier::ImportDefaultSpecifier(specifier) => {
                            (Some(DEFAULT.into()), specifier.local.name.as_str())
                        }
                        ast::ImportDeclarationSpecifier::ImportNamespaceSpecifier(specifier) => {
                            (None, specifier.local.name.as_str())
                        }
                    };
                    import_entries.push(ImportEntryRecord {
                        module_request: module_request.clone(),
                        import_name,
                        local_name: local_name.into(),
                    });
                }
            }
            ast::ModuleDeclaration::ExportAllDeclaration(decl) => {
                let module_request = module_request(&decl.source, decl.with_clause.as_deref());
                add_requested_module(&mut requested_modules, &module_request);
                if let Some(exported) = &decl.exported {
                    // export * as ns from "mod";
                    indirect_export_entries.push(IndirectExportEntryRecord {
                        export_name: exported.name().as_str().into(),
                        module_request,
                        import_name: None,
                    });
                } else {
                    // export * from "mod";
                    star_export_entries.push(module_request);
                }
            }
            ast::ModuleDeclaration::ExportNamedDeclaration(decl) => {
                if let Some(source) = &decl.source {
                    // export { a, b as c } from "mod";
                    let module_request = module_request(source, decl.with_clause.as_deref());
                    add_requested_module(&mut requested_modules, &module_request);
                    for specifier in decl.specifiers.iter() {
                        indirect_export_entries.push(IndirectExportEntryRecord {
                            export_name: specifier.exported.name().as_str().into(),
                            module_request: module_request.clone(),
                            import_name: Some(specifier.local.name().as_str().into()),
                        });
                    }
                } else if let Some(declaration) = &decl.declaration {
                    // export const a = 1;
                    declaration.bound_names(&mut |name| {
                        let name: Rc<str> = name.name.as_str().into();
                        local_export_entries.push(LocalExportEntryRecord {
                            export_name: name.clone(),
                            local_name: name,
                        });
                    });
                } else {
                    // export { a, b as c };
                    for specifier in decl.specifiers.iter() {
                        local_export_entries.push(LocalExportEntryRecord {
                            export_name: specifier.exported.name().as_str().into(),
                            local_name: specifier.local.name().as_str().into(),
                        });
                    }
                }
            }
            ast::ModuleDeclaration::ExportDefaultDeclaration(decl) => {
                let local_name = match &decl.declaration {
                    ast::ExportDefaultDeclarationKind::FunctionDeclaration(function) => function
                        .id
                        .as_ref()
                        .map_or(DEFAULT_BINDING, |id| id.name.as_str()),
                    ast::ExportDefaultDeclarationKind::ClassDeclaration(class) => class
                        .id
                        .as_ref()
                        .map_or(DEFAULT_BINDING, |id| id.name.as_str()),
                    _ => DEFAULT_BINDING,
                };
                local_export_entries.push(LocalExportEntryRecord {
                    export_name: DEFAULT.into(),
                    local_name: local_name.into(),
                });
            }
            ast::ModuleDeclaration::TSExportAssignment(_)
            | ast::ModuleDeclaration::TSNamespaceExportDeclaration(_) => {}
        }
    }

    // 5. Let importedBoundNames be ImportedLocalNames(importEntries).
    let imported_bound_names = import_entries
        .iter()
        .map(|entry| entry.local_name.clone())
        .collect::<AHashSet<_>>();
    // 10. For each ExportEntry Record ee of exportEntries, do
    //     a. If ee.[[ModuleRequest]] is null, then
    //         i. If importedBoundNames does not contain ee.[[LocalName]], then
    //             1. Append ee to localExportEntries.
    //         ii. Else,
    let local_export_entries = local_export_entries
        .into_iter()
        .filter(|ee| {
            if !imported_bound_names.contains(&ee.local_name) {
                return true;
            }
            // 1. Let ie be the element of importEntries whose [[LocalName]]
            //    is ee.[[LocalName]].
            let Some(ie) = import_entries
                .iter()
                .find(|ie| ie.local_name == ee.local_name)
            else {
                return true;
            };
            // 2. If ie.[[ImportName]] is namespace-object, then
            //     a. NOTE: This is a re-export of an imported module namespace
            //        object.
            //     b. Append ee to localExportEntries.
            let Some(import_name) = &ie.import_name else {
                return true;
            };
            // 3. Else,
            //     a. NOTE: This is a re-export of a single name.
            //     b. Append the ExportEntry Record { [[ModuleRequest]]:
            //        ie.[[ModuleRequest]], [[ImportName]]: ie.[[ImportName]],
            //        [[LocalName]]: null, [[ExportName]]: ee.[[ExportName]] }
            //        to indirectExportEntries.
            indirect_export_entries.push(IndirectExportEntryRecord {
                export_name: ee.export_name.clone(),
                module_request: ie.module_request.clone(),
                import_name: Some(import_name.clone()),
            });
            false
        })
        .collect::<Vec<_>>();

    // 11. Let async be body Contains await.
    let has_tla = program.body.iter().any(statement_contains_await);

    tracing::trace!(
        requests = requested_modules.len(),
        has_tla,
        "parsed module"
    );

    // 12. Return Source Text Module Record { ... }.
    let record = SourceTextModuleRecord {
        abstract_fields: AbstractModuleRecord::new(realm, host_defined),
        cyclic_fields: CyclicModuleRecord::new(has_tla, requested_modules.into_boxed_slice()),
        body,
        import_entries: import_entries.into_boxed_slice(),
        local_export_entries: local_export_entries.into_boxed_slice(),
        indirect_export_entries: indirect_export_entries.into_boxed_slice(),
        star_export_entries: star_export_entries.into_boxed_slice(),
    };
    Ok(agent
        .heap
        .create(ModuleHeapData::SourceText(Box::new(record))))
}

/// ### [16.2.1.4 Static Semantics: ModuleRequests](https://tc39.es/ecma262/#sec-static-semantics-modulerequests)
///
/// Builds the ModuleRequest Record of a FromClause and its WithClause. The
/// attributes are sorted by key.
fn module_request(
    source: &ast::StringLiteral,
    with_clause: Option<&ast::WithClause>,
) -> ModuleRequestRecord {
    let mut attributes = with_clause
        .map(|with_clause| {
            with_clause
                .with_entries
                .iter()
                .map(|entry| ImportAttribute {
                    key: match &entry.key {
                        ast::ImportAttributeKey::Identifier(key) => key.name.as_str().into(),
                        ast::ImportAttributeKey::StringLiteral(key) => key.value.as_str().into(),
                    },
                    value: entry.value.value.as_str().into(),
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    attributes.sort_by(|a, b| a.key.cmp(&b.key));
    ModuleRequestRecord::new(source.value.as_str()).with_attributes(attributes)
}

/// Appends the request unless an equal request is already present. An
/// evaluation phase request upgrades an earlier deferred one.
fn add_requested_module(requested_modules: &mut Vec<ModuleRequestRecord>, request: &ModuleRequestRecord) {
    match requested_modules
        .iter_mut()
        .find(|existing| existing.is_same_request(request))
    {
        Some(existing) => {
            if request.phase() == ImportPhase::Evaluation {
                existing.set_phase(ImportPhase::Evaluation);
            }
        }
        None => requested_modules.push(request.clone()),
    }
}

/// ### [8.5.1 Static Semantics: Contains](https://tc39.es/ecma262/#sec-static-semantics-contains)
///
/// Returns true if the statement contains an `await` outside of any
/// function or class body.
fn statement_contains_await(statement: &ast::Statement) -> bool {
    use ast::Statement;
    if let Some(declaration) = statement.as_module_declaration() {
        return match declaration {
            ast::ModuleDeclaration::ExportNamedDeclaration(decl) => match &decl.declaration {
                Some(ast::Declaration::VariableDeclaration(decl)) => {
                    variable_declaration_contains_await(decl)
                }
                Some(ast::Declaration::ClassDeclaration(class)) => class_contains_await(class),
                _ => false,
            },
            ast::ModuleDeclaration::ExportDefaultDeclaration(decl) => match &decl.declaration {
                ast::ExportDefaultDeclarationKind::ClassDeclaration(class) => {
                    class_contains_await(class)
                }
                declaration => declaration.as_expression().is_some_and(expression_contains_await),
            },
            _ => false,
        };
    }
    match statement {
        Statement::ExpressionStatement(statement) => expression_contains_await(&statement.expression),
        Statement::VariableDeclaration(decl) => variable_declaration_contains_await(decl),
        Statement::ClassDeclaration(class) => class_contains_await(class),
        Statement::BlockStatement(block) => block.body.iter().any(statement_contains_await),
        Statement::IfStatement(statement) => {
            expression_contains_await(&statement.test)
                || statement_contains_await(&statement.consequent)
                || statement
                    .alternate
                    .as_ref()
                    .is_some_and(statement_contains_await)
        }
        Statement::ForOfStatement(statement) => {
            statement.r#await
                || expression_contains_await(&statement.right)
                || statement_contains_await(&statement.body)
        }
        Statement::ForInStatement(statement) => {
            expression_contains_await(&statement.right) || statement_contains_await(&statement.body)
        }
        Statement::ForStatement(statement) => {
            statement.init.as_ref().is_some_and(|init| match init {
                ast::ForStatementInit::VariableDeclaration(decl) => {
                    variable_declaration_contains_await(decl)
                }
                init => init.as_expression().is_some_and(expression_contains_await),
            }) || statement.test.as_ref().is_some_and(expression_contains_await)
                || statement.update.as_ref().is_some_and(expression_contains_await)
                || statement_contains_await(&statement.body)
        }
        Statement::WhileStatement(statement) => {
            expression_contains_await(&statement.test) || statement_contains_await(&statement.body)
        }
        Statement::DoWhileStatement(statement) => {
            expression_contains_await(&statement.test) || statement_contains_await(&statement.body)
        }
        Statement::ThrowStatement(statement) => expression_contains_await(&statement.argument),
        Statement::TryStatement(statement) => {
            statement.block.body.iter().any(statement_contains_await)
                || statement
                    .handler
                    .as_ref()
                    .is_some_and(|handler| handler.body.body.iter().any(statement_contains_await))
                || statement
                    .finalizer
                    .as_ref()
                    .is_some_and(|finalizer| finalizer.body.iter().any(statement_contains_await))
        }
        Statement::LabeledStatement(statement) => statement_contains_await(&statement.body),
        Statement::SwitchStatement(statement) => {
            expression_contains_await(&statement.discriminant)
                || statement.cases.iter().any(|case| {
                    case.test.as_ref().is_some_and(expression_contains_await)
                        || case.consequent.iter().any(statement_contains_await)
                })
        }
        _ => false,
    }
}

fn variable_declaration_contains_await(decl: &ast::VariableDeclaration) -> bool {
    // await using x = ...;
    matches!(decl.kind, ast::VariableDeclarationKind::AwaitUsing)
        || decl
            .declarations
            .iter()
            .any(|declarator| declarator.init.as_ref().is_some_and(expression_contains_await))
}

fn expression_contains_await(expression: &ast::Expression) -> bool {
    use ast::Expression;
    match expression {
        Expression::AwaitExpression(_) => true,
        Expression::ParenthesizedExpression(e) => expression_contains_await(&e.expression),
        Expression::SequenceExpression(e) => e.expressions.iter().any(expression_contains_await),
        Expression::AssignmentExpression(e) => {
            assignment_target_contains_await(&e.left) || expression_contains_await(&e.right)
        }
        Expression::UpdateExpression(e) => simple_target_contains_await(&e.argument),
        Expression::BinaryExpression(e) => {
            expression_contains_await(&e.left) || expression_contains_await(&e.right)
        }
        Expression::LogicalExpression(e) => {
            expression_contains_await(&e.left) || expression_contains_await(&e.right)
        }
        Expression::ConditionalExpression(e) => {
            expression_contains_await(&e.test)
                || expression_contains_await(&e.consequent)
                || expression_contains_await(&e.alternate)
        }
        Expression::UnaryExpression(e) => expression_contains_await(&e.argument),
        Expression::CallExpression(e) => {
            expression_contains_await(&e.callee) || arguments_contain_await(&e.arguments)
        }
        Expression::NewExpression(e) => {
            expression_contains_await(&e.callee) || arguments_contain_await(&e.arguments)
        }
        Expression::StaticMemberExpression(e) => expression_contains_await(&e.object),
        Expression::ComputedMemberExpression(e) => {
            expression_contains_await(&e.object) || expression_contains_await(&e.expression)
        }
        Expression::PrivateFieldExpression(e) => expression_contains_await(&e.object),
        Expression::PrivateInExpression(e) => expression_contains_await(&e.right),
        Expression::ChainExpression(e) => match &e.expression {
            ast::ChainElement::CallExpression(e) => {
                expression_contains_await(&e.callee) || arguments_contain_await(&e.arguments)
            }
            ast::ChainElement::StaticMemberExpression(e) => expression_contains_await(&e.object),
            ast::ChainElement::ComputedMemberExpression(e) => {
                expression_contains_await(&e.object) || expression_contains_await(&e.expression)
            }
            ast::ChainElement::PrivateFieldExpression(e) => expression_contains_await(&e.object),
            _ => false,
        },
        Expression::ClassExpression(class) => class_contains_await(class),
        Expression::ArrayExpression(e) => e.elements.iter().any(|element| match element {
            ast::ArrayExpressionElement::SpreadElement(spread) => {
                expression_contains_await(&spread.argument)
            }
            element => element.as_expression().is_some_and(expression_contains_await),
        }),
        Expression::ObjectExpression(e) => e.properties.iter().any(|property| match property {
            ast::ObjectPropertyKind::ObjectProperty(property) => {
                (property.computed && property_key_contains_await(&property.key))
                    || expression_contains_await(&property.value)
            }
            ast::ObjectPropertyKind::SpreadProperty(spread) => {
                expression_contains_await(&spread.argument)
            }
        }),
        Expression::TemplateLiteral(e) => e.expressions.iter().any(expression_contains_await),
        Expression::TaggedTemplateExpression(e) => {
            expression_contains_await(&e.tag)
                || e.quasi.expressions.iter().any(expression_contains_await)
        }
        Expression::ImportExpression(e) => {
            expression_contains_await(&e.source)
                || e.options.as_ref().is_some_and(expression_contains_await)
        }
        _ => false,
    }
}

fn property_key_contains_await(key: &ast::PropertyKey) -> bool {
    key.as_expression().is_some_and(expression_contains_await)
}

/// Only the heritage, decorators and computed keys of a class are evaluated
/// in the surrounding scope. Method bodies, field initializers and static
/// blocks are not.
fn class_contains_await(class: &ast::Class) -> bool {
    class
        .decorators
        .iter()
        .any(|decorator| expression_contains_await(&decorator.expression))
        || class.super_class.as_ref().is_some_and(expression_contains_await)
        || class.body.body.iter().any(|element| {
            let (computed, key, decorators) = match element {
                ast::ClassElement::MethodDefinition(e) => (e.computed, &e.key, &e.decorators),
                ast::ClassElement::PropertyDefinition(e) => (e.computed, &e.key, &e.decorators),
                ast::ClassElement::AccessorProperty(e) => (e.computed, &e.key, &e.decorators),
                _ => return false,
            };
            (computed && property_key_contains_await(key))
                || decorators
                    .iter()
                    .any(|decorator| expression_contains_await(&decorator.expression))
        })
}

fn assignment_target_contains_await(target: &ast::AssignmentTarget) -> bool {
    use ast::AssignmentTarget;
    match target {
        AssignmentTarget::ArrayAssignmentTarget(pattern) => {
            pattern
                .elements
                .iter()
                .flatten()
                .any(assignment_target_maybe_default_contains_await)
                || pattern
                    .rest
                    .as_ref()
                    .is_some_and(|rest| assignment_target_contains_await(&rest.target))
        }
        AssignmentTarget::ObjectAssignmentTarget(pattern) => {
            pattern.properties.iter().any(|property| match property {
                ast::AssignmentTargetProperty::AssignmentTargetPropertyIdentifier(property) => {
                    property.init.as_ref().is_some_and(expression_contains_await)
                }
                ast::AssignmentTargetProperty::AssignmentTargetPropertyProperty(property) => {
                    (property.computed && property_key_contains_await(&property.name))
                        || assignment_target_maybe_default_contains_await(&property.binding)
                }
            }) || pattern
                .rest
                .as_ref()
                .is_some_and(|rest| assignment_target_contains_await(&rest.target))
        }
        target => target
            .as_simple_assignment_target()
            .is_some_and(simple_target_contains_await),
    }
}

fn assignment_target_maybe_default_contains_await(target: &ast::AssignmentTargetMaybeDefault) -> bool {
    match target {
        ast::AssignmentTargetMaybeDefault::AssignmentTargetWithDefault(target) => {
            assignment_target_contains_await(&target.binding)
                || expression_contains_await(&target.init)
        }
        target => target
            .as_assignment_target()
            .is_some_and(assignment_target_contains_await),
    }
}

fn simple_target_contains_await(target: &ast::SimpleAssignmentTarget) -> bool {
    use ast::SimpleAssignmentTarget;
    match target {
        SimpleAssignmentTarget::StaticMemberExpression(e) => expression_contains_await(&e.object),
        SimpleAssignmentTarget::ComputedMemberExpression(e) => {
            expression_contains_await(&e.object) || expression_contains_await(&e.expression)
        }
        SimpleAssignmentTarget::PrivateFieldExpression(e) => expression_contains_await(&e.object),
        _ => false,
    }
}

fn arguments_contain_await(arguments: &[ast::Argument]) -> bool {
    arguments.iter().any(|argument| match argument {
        ast::Argument::SpreadElement(spread) => expression_contains_await(&spread.argument),
        argument => argument.as_expression().is_some_and(expression_contains_await),
    })
}
