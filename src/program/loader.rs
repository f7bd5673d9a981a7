//! Program loader - file loading, import resolution, and orchestration.
//!
//! Given an entry path and a host, the loader reads the standard library,
//! the main file, and the transitive import closure (depth-first over each
//! file's imports in syntactic order, so discovery order is deterministic),
//! binds every file, merges the per-file exports into the global scope,
//! runs the checker, and finally invokes the validation and emit callbacks
//! registered by external modules.
//!
//! Each file is loaded at most once, keyed by real path. A cancellation
//! from the host aborts loading; already-emitted diagnostics are preserved.

use crate::binder::{bind_external_module, bind_script, merge_exports_into};
use crate::checker;
use crate::diagnostics::{codes, Diagnostic, DiagnosticTarget};
use crate::parser::{parse, NodeIndex, NodeKind};
use crate::program::host::{CompilerHost, HostError};
use crate::program::{CompilerOptions, LoadedFile, Program};
use crate::source_file::{FileId, SourceFile};
use rustc_hash::FxHashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

/// Compile an entry path with the given host and options, producing the
/// program object handed to emitters.
pub fn compile(
    host: Arc<dyn CompilerHost>,
    main_path: &Path,
    options: CompilerOptions,
) -> Program {
    let program = Program::new(host.clone(), options);
    let mut loader = Loader {
        host,
        program,
        seen: FxHashSet::default(),
        seen_modules: FxHashSet::default(),
        aborted: false,
    };
    loader.run(main_path);
    loader.program
}

struct Loader {
    host: Arc<dyn CompilerHost>,
    program: Program,
    /// Real paths of loaded CADL files.
    seen: FxHashSet<PathBuf>,
    /// Real paths of loaded external modules.
    seen_modules: FxHashSet<PathBuf>,
    /// Set on cancellation or a fatal diagnostic; stops further loading.
    aborted: bool,
}

impl Loader {
    fn run(&mut self, main_path: &Path) {
        let main_path = self.host.resolve_absolute_path(main_path);
        debug!(main = %main_path.display(), "loading program");

        if !self.check_compiler_version(&main_path) {
            return;
        }

        if !self.program.options.no_std_lib {
            for dir in self.host.get_lib_dirs() {
                self.load_directory(&dir, DiagnosticTarget::None);
                if self.aborted {
                    return;
                }
            }
        }

        self.load_main(&main_path);
        if self.aborted {
            return;
        }

        let emitters = self.program.options.emitters.clone();
        for spec in emitters {
            self.load_emitter(&spec, &main_path);
            if self.aborted {
                return;
            }
        }

        // Merge each script's exports into the global scope, in load order.
        for index in 0..self.program.bindings.len() {
            let exports = self.program.bindings[index].exports;
            merge_exports_into(
                self.program.global_table,
                exports,
                &mut self.program.symbols,
                &mut self.program.tables,
            );
        }

        checker::check(&mut self.program);

        let validators = self.program.validators.clone();
        for validator in validators {
            validator(&mut self.program);
        }
        if !self.program.options.no_emit {
            let emit_callbacks = self.program.emit_callbacks.clone();
            for emit in emit_callbacks {
                emit(&mut self.program);
            }
        }
    }

    // =========================================================================
    // Entry points
    // =========================================================================

    fn load_main(&mut self, path: &Path) {
        match self.host.stat(path) {
            Ok(stat) if stat.is_directory => self.load_directory(path, DiagnosticTarget::None),
            Ok(_) => self.load_by_extension(path, DiagnosticTarget::None),
            Err(error) => self.report_host_error(error, DiagnosticTarget::None),
        }
    }

    /// Load a directory through its package descriptor: the `cadlMain`
    /// field names the CADL entry point, falling back to `main`, falling
    /// back to `main.cadl`.
    fn load_directory(&mut self, dir: &Path, target: DiagnosticTarget) {
        let entry = self
            .read_package_entry(dir)
            .unwrap_or_else(|| "main.cadl".to_string());
        let path = dir.join(entry);
        self.load_by_extension(&path, target);
    }

    fn load_by_extension(&mut self, path: &Path, target: DiagnosticTarget) {
        match path.extension().and_then(|e| e.to_str()) {
            Some("cadl") => self.load_cadl_file(path, target),
            Some("js") | Some("mjs") => self.load_external_module(path, target),
            _ => {
                let message = format!(
                    "Import of '{}' is invalid: unknown file extension.",
                    path.display()
                );
                self.program
                    .report(Diagnostic::error(codes::INVALID_IMPORT, message, target));
            }
        }
    }

    // =========================================================================
    // CADL files
    // =========================================================================

    fn load_cadl_file(&mut self, path: &Path, target: DiagnosticTarget) {
        let real = match self.host.realpath(path) {
            Ok(real) => real,
            Err(HostError::Cancelled) => {
                self.aborted = true;
                return;
            }
            Err(_) => path.to_path_buf(),
        };
        if !self.seen.insert(real.clone()) {
            return;
        }

        let text = match self.host.read_file(&real) {
            Ok(source) => source.text,
            Err(error) => {
                self.report_host_error(error, target);
                return;
            }
        };

        trace!(path = %real.display(), "parsing");
        let source = SourceFile::new(real.display().to_string(), text);
        let mut result = parse(&source, &mut self.program.interner);
        let file_id = FileId(self.program.file_count() as u32);
        let bindings = bind_script(
            file_id,
            result.root,
            &mut result.arena,
            &mut self.program.symbols,
            &mut self.program.tables,
        );
        self.program.add_file(
            real.clone(),
            LoadedFile {
                source,
                root: result.root,
                arena: result.arena,
                printable: result.printable,
            },
            bindings,
        );
        self.program
            .report_parse_diagnostics(file_id, result.diagnostics);

        // Recurse into this file's imports, in syntactic order.
        let imports = self.collect_imports(file_id);
        let base_dir = real
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        for (node, specifier) in imports {
            if self.aborted {
                return;
            }
            let span = self.program.file(file_id).arena.get(node).span();
            let target = DiagnosticTarget::Span {
                file: file_id,
                span,
            };
            self.resolve_import(&specifier, &base_dir, target);
        }
    }

    fn collect_imports(&self, file: FileId) -> Vec<(NodeIndex, String)> {
        let arena = &self.program.file(file).arena;
        let root = self.program.file(file).root;
        let statements = match &arena.get(root).kind {
            NodeKind::Script { statements } => statements,
            _ => return Vec::new(),
        };
        let mut imports = Vec::new();
        for &statement in statements {
            if let NodeKind::Import { path } = &arena.get(statement).kind {
                if let NodeKind::StringLiteral { value } = &arena.get(*path).kind {
                    if !value.is_empty() {
                        imports.push((statement, value.clone()));
                    }
                }
            }
        }
        imports
    }

    // =========================================================================
    // Import resolution
    // =========================================================================

    /// Resolve one import specifier. Relative and absolute paths resolve
    /// directly; anything else goes through the node-style package lookup.
    fn resolve_import(&mut self, specifier: &str, base_dir: &Path, target: DiagnosticTarget) {
        let is_relative = specifier.starts_with("./") || specifier.starts_with("../");
        if is_relative || Path::new(specifier).is_absolute() {
            let path = if is_relative {
                base_dir.join(specifier)
            } else {
                PathBuf::from(specifier)
            };
            match self.host.stat(&path) {
                Ok(stat) if stat.is_directory => self.load_directory(&path, target),
                Ok(_) => self.load_by_extension(&path, target),
                Err(HostError::Cancelled) => self.aborted = true,
                Err(_) => {
                    // Let the file loader produce the not-found diagnostic
                    // with the right extension handling.
                    self.load_by_extension(&path, target);
                }
            }
            return;
        }

        match self.resolve_package(specifier, base_dir) {
            Some(resolved) => match self.host.stat(&resolved) {
                Ok(stat) if stat.is_directory => self.load_directory(&resolved, target),
                Ok(_) => self.load_by_extension(&resolved, target),
                Err(_) => {
                    let message = format!("Couldn't resolve library '{}'.", specifier);
                    self.program.report(Diagnostic::error(
                        codes::LIBRARY_NOT_FOUND,
                        message,
                        target,
                    ));
                }
            },
            None => {
                let message = format!("Couldn't find library '{}'.", specifier);
                self.program
                    .report(Diagnostic::error(codes::LIBRARY_NOT_FOUND, message, target));
            }
        }
    }

    /// Node-style lookup: walk up from the importing directory probing
    /// `node_modules/<package>`, honoring `@scope/name` specifiers and
    /// optional subpaths.
    fn resolve_package(&self, specifier: &str, from_dir: &Path) -> Option<PathBuf> {
        let (package, subpath) = split_package_specifier(specifier);
        let mut dir = Some(from_dir.to_path_buf());
        while let Some(current) = dir {
            let candidate = current.join("node_modules").join(package);
            if let Ok(stat) = self.host.stat(&candidate) {
                if stat.is_directory {
                    return match subpath {
                        Some(sub) => Some(candidate.join(sub)),
                        None => Some(candidate),
                    };
                }
            }
            dir = current.parent().map(Path::to_path_buf);
        }
        None
    }

    /// Read `cadlMain` (falling back to `main`) from a directory's package
    /// descriptor.
    fn read_package_entry(&self, dir: &Path) -> Option<String> {
        let descriptor_path = dir.join("package.json");
        let text = self.host.read_file(&descriptor_path).ok()?;
        let descriptor: serde_json::Value = serde_json::from_str(&text.text).ok()?;
        descriptor
            .get("cadlMain")
            .or_else(|| descriptor.get("main"))
            .and_then(|value| value.as_str())
            .map(str::to_string)
    }

    // =========================================================================
    // External modules and emitters
    // =========================================================================

    fn load_external_module(&mut self, path: &Path, target: DiagnosticTarget) {
        let real = match self.host.realpath(path) {
            Ok(real) => real,
            Err(_) => path.to_path_buf(),
        };
        if !self.seen_modules.insert(real.clone()) {
            return;
        }
        match self.host.get_external_module_exports(&real) {
            Ok(exports) => {
                let external = bind_external_module(
                    &real.display().to_string(),
                    &exports,
                    self.program.global_table,
                    &mut self.program.symbols,
                    &mut self.program.tables,
                    &mut self.program.interner,
                );
                for validator in external.validators {
                    self.program.on_validate(validator);
                }
                for emit in external.emitters {
                    self.program.on_emit(emit);
                }
            }
            Err(HostError::Unsupported(message)) => {
                self.program.report(Diagnostic::error(
                    codes::DYNAMIC_IMPORT_IN_EVAL,
                    message,
                    target,
                ));
            }
            Err(error) => self.report_host_error(error, target),
        }
    }

    /// Load an emitter named `<package>[:<name>]`, resolved against the
    /// main file's directory.
    fn load_emitter(&mut self, spec: &str, main_path: &Path) {
        let (package, _name) = match spec.split_once(':') {
            Some((package, name)) => (package, Some(name)),
            None => (spec, None),
        };
        let base_dir = main_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let Some(resolved) = self.resolve_package(package, &base_dir) else {
            let message = format!("Couldn't find emitter '{}'.", package);
            self.program.report(Diagnostic::error(
                codes::LIBRARY_NOT_FOUND,
                message,
                DiagnosticTarget::None,
            ));
            return;
        };
        let module_path = match self.host.stat(&resolved) {
            Ok(stat) if stat.is_directory => {
                let entry = self
                    .read_package_entry(&resolved)
                    .unwrap_or_else(|| "index.js".to_string());
                resolved.join(entry)
            }
            _ => resolved,
        };

        let emit_count_before = self.program.emit_callbacks.len();
        self.load_external_module(&module_path, DiagnosticTarget::None);
        if self.program.emit_callbacks.len() == emit_count_before {
            let message = format!("Emitter '{}' does not define $onEmit.", spec);
            self.program.report(Diagnostic::error(
                codes::INVALID_EMITTER,
                message,
                DiagnosticTarget::None,
            ));
        }
    }

    // =========================================================================
    // Compiler version check
    // =========================================================================

    /// If a locally-installed compiler resolves under the main file's
    /// directory and is not the currently executing one (by real path),
    /// loading aborts with a fatal diagnostic naming the local launcher.
    fn check_compiler_version(&mut self, main_path: &Path) -> bool {
        let Some(current) = self.program.options.compiler_path.clone() else {
            return true;
        };
        let Some(main_dir) = main_path.parent() else {
            return true;
        };
        let Some(local) = self.resolve_package("@cadl-lang/compiler", main_dir) else {
            return true;
        };
        let local_real = match self.host.realpath(&local) {
            Ok(real) => real,
            Err(_) => return true,
        };
        let current_real = self.host.realpath(&current).unwrap_or(current);
        if local_real != current_real {
            let launcher = main_dir.join("node_modules").join(".bin").join("cadl");
            let message = format!(
                "Running cadlc from '{}', but the project expects its own compiler at '{}'. \
                 Run the local launcher '{}' instead.",
                current_real.display(),
                local_real.display(),
                launcher.display()
            );
            self.program.report(Diagnostic::error(
                codes::COMPILER_VERSION_MISMATCH,
                message,
                DiagnosticTarget::None,
            ));
            self.aborted = true;
            return false;
        }
        true
    }

    // =========================================================================
    // Host errors
    // =========================================================================

    fn report_host_error(&mut self, error: HostError, target: DiagnosticTarget) {
        match error {
            HostError::Cancelled => self.aborted = true,
            HostError::NotFound(path) => {
                let message = format!("File {} not found.", path.display());
                self.program
                    .report(Diagnostic::error(codes::FILE_NOT_FOUND, message, target));
            }
            HostError::Io { path, message } => {
                let full = format!("Error reading {}: {}.", path.display(), message);
                self.program
                    .report(Diagnostic::error(codes::IO_ERROR, full, target));
            }
            HostError::Unsupported(message) => {
                self.program.report(Diagnostic::error(
                    codes::DYNAMIC_IMPORT_IN_EVAL,
                    message,
                    target,
                ));
            }
        }
    }
}

fn split_package_specifier(specifier: &str) -> (&str, Option<&str>) {
    let segments_in_package = if specifier.starts_with('@') { 2 } else { 1 };
    let mut index = 0;
    for _ in 0..segments_in_package {
        match specifier[index..].find('/') {
            Some(offset) => index += offset + 1,
            None => return (specifier, None),
        }
    }
    (&specifier[..index - 1], Some(&specifier[index..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_package_specifier() {
        assert_eq!(split_package_specifier("pkg"), ("pkg", None));
        assert_eq!(split_package_specifier("pkg/sub"), ("pkg", Some("sub")));
        assert_eq!(split_package_specifier("@scope/pkg"), ("@scope/pkg", None));
        assert_eq!(
            split_package_specifier("@scope/pkg/lib/main.cadl"),
            ("@scope/pkg", Some("lib/main.cadl"))
        );
    }
}
