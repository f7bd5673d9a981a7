//! The program object: loaded files, symbols, types, diagnostics, state.
//!
//! A [`Program`] is what emitters receive: the source-file map, the type
//! graph rooted at the global namespace, the state registry, the
//! diagnostic sink, and callback registration. All diagnostics funnel to
//! the single program-level sink; `#suppress` is consulted only here, and
//! errors are never suppressible.

pub mod host;
pub mod loader;

pub use loader::compile;

use crate::binder::{FileBindings, NodeRef, SymbolArena, SymbolId, SymbolTableArena, SymbolTableId};
use crate::checker::types::{LiteralKey, TypeArena, TypeId};
use crate::diagnostics::{codes, Diagnostic, DiagnosticBag, DiagnosticTarget, ParseDiagnostic};
use crate::interner::{Atom, Interner};
use crate::parser::{NodeArena, NodeIndex, NodeKind};
use crate::program::host::{CompilerHost, ProgramCallback};
use crate::source_file::{FileId, SourceFile};
use crate::span::Span;
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// =============================================================================
// Options
// =============================================================================

/// Diagnostic severity floor for CLI output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DiagnosticLevel {
    #[default]
    Warning,
    Error,
}

/// Compiler options, surfaced to emitters through the program object.
#[derive(Clone, Debug, Default)]
pub struct CompilerOptions {
    /// Emitters to load, each `<package>[:<name>]`.
    pub emitters: Vec<String>,
    pub output_dir: Option<PathBuf>,
    pub no_emit: bool,
    pub no_std_lib: bool,
    pub diagnostic_level: DiagnosticLevel,
    /// Miscellaneous `key=value` options passed through to libraries.
    pub misc_options: FxHashMap<String, String>,
    /// Install root of the currently executing compiler, for the
    /// local-compiler mismatch check. `None` disables the check.
    pub compiler_path: Option<PathBuf>,
}

// =============================================================================
// State registry
// =============================================================================

/// An opaque, process-unique key a library uses to address its state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StateKey(u64);

static NEXT_STATE_KEY: AtomicU64 = AtomicU64::new(1);

/// Mint a fresh state key. Keys are process-unique tokens; libraries hold
/// on to them for the lifetime of the process.
pub fn next_state_key() -> StateKey {
    StateKey(NEXT_STATE_KEY.fetch_add(1, Ordering::Relaxed))
}

/// A value stashed in the state registry. The registry is an untyped
/// side-channel by contract; no value checking is performed.
#[derive(Clone, Debug, PartialEq)]
pub enum StateValue {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Type(TypeId),
}

/// Keyed maps and sets exposed to external modules to stash per-type
/// metadata. First-time reads materialize an empty container.
#[derive(Debug, Default)]
pub struct StateRegistry {
    maps: FxHashMap<StateKey, FxHashMap<TypeId, StateValue>>,
    sets: FxHashMap<StateKey, FxHashSet<TypeId>>,
}

impl StateRegistry {
    pub fn state_map(&mut self, key: StateKey) -> &mut FxHashMap<TypeId, StateValue> {
        self.maps.entry(key).or_default()
    }

    pub fn state_set(&mut self, key: StateKey) -> &mut FxHashSet<TypeId> {
        self.sets.entry(key).or_default()
    }
}

// =============================================================================
// Decorator context
// =============================================================================

/// What a decorator implementation sees when invoked: the program (for the
/// state registry and diagnostics) and the source location of the
/// application.
pub struct DecoratorContext<'a> {
    pub program: &'a mut Program,
    pub file: FileId,
    pub target_span: Span,
}

// =============================================================================
// Loaded files
// =============================================================================

/// One parsed and bound source file.
#[derive(Debug)]
pub struct LoadedFile {
    pub source: SourceFile,
    pub root: NodeIndex,
    pub arena: NodeArena,
    /// Whether the tree is clean enough to re-print.
    pub printable: bool,
}

// =============================================================================
// Program
// =============================================================================

/// The result of compilation, handed to validation and emit callbacks.
pub struct Program {
    pub host: Arc<dyn CompilerHost>,
    pub options: CompilerOptions,

    files: Vec<LoadedFile>,
    path_to_file: FxHashMap<PathBuf, FileId>,
    pub bindings: Vec<FileBindings>,

    pub interner: Interner,
    pub symbols: SymbolArena,
    pub tables: SymbolTableArena,
    /// The merged global scope.
    pub global_table: SymbolTableId,

    pub types: TypeArena,
    pub global_namespace: TypeId,
    /// Shared placeholder type produced after errors.
    pub error_type: TypeId,

    // Checker caches, program-lifetime so emitters observe a stable graph.
    pub(crate) decl_types: FxHashMap<NodeRef, TypeId>,
    pub(crate) instantiations: FxHashMap<(NodeRef, Vec<TypeId>), TypeId>,
    pub(crate) literal_types: FxHashMap<LiteralKey, TypeId>,
    pub(crate) namespace_types: FxHashMap<SymbolTableId, TypeId>,
    pub(crate) intrinsics: FxHashMap<SymbolId, TypeId>,

    diagnostics: DiagnosticBag,
    state: StateRegistry,

    pub(crate) validators: Vec<ProgramCallback>,
    pub(crate) emit_callbacks: Vec<ProgramCallback>,
}

impl Program {
    pub fn new(host: Arc<dyn CompilerHost>, options: CompilerOptions) -> Program {
        let mut interner = Interner::new();
        interner.intern_common();
        let mut tables = SymbolTableArena::new();
        let global_table = tables.alloc();
        Program {
            host,
            options,
            files: Vec::new(),
            path_to_file: FxHashMap::default(),
            bindings: Vec::new(),
            interner,
            symbols: SymbolArena::new(),
            tables,
            global_table,
            types: TypeArena::new(),
            global_namespace: TypeId::NONE,
            error_type: TypeId::NONE,
            decl_types: FxHashMap::default(),
            instantiations: FxHashMap::default(),
            literal_types: FxHashMap::default(),
            namespace_types: FxHashMap::default(),
            intrinsics: FxHashMap::default(),
            diagnostics: DiagnosticBag::new(),
            state: StateRegistry::default(),
            validators: Vec::new(),
            emit_callbacks: Vec::new(),
        }
    }

    // =========================================================================
    // Files
    // =========================================================================

    /// Register a parsed and bound file. Each file is loaded at most once;
    /// passing the same absolute path twice is a programmer error.
    pub fn add_file(
        &mut self,
        path: PathBuf,
        file: LoadedFile,
        bindings: FileBindings,
    ) -> FileId {
        debug_assert!(
            !self.path_to_file.contains_key(&path),
            "file loaded twice: {}",
            path.display()
        );
        let id = FileId(self.files.len() as u32);
        self.path_to_file.insert(path, id);
        self.files.push(file);
        self.bindings.push(bindings);
        id
    }

    pub fn file(&self, id: FileId) -> &LoadedFile {
        &self.files[id.0 as usize]
    }

    pub fn files(&self) -> &[LoadedFile] {
        &self.files
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn file_by_path(&self, path: &PathBuf) -> Option<FileId> {
        self.path_to_file.get(path).copied()
    }

    pub fn file_ids(&self) -> impl Iterator<Item = FileId> {
        (0..self.files.len() as u32).map(FileId)
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    /// Accept a diagnostic into the program sink, consulting `#suppress`
    /// directives on the target node and its ancestors. Errors are never
    /// suppressed; an attempt emits a meta-diagnostic and the original
    /// error still fires.
    pub fn report(&mut self, mut diagnostic: Diagnostic) {
        if let DiagnosticTarget::Node { file, node, span } = &mut diagnostic.target {
            // Resolve the node's span once, so rendering never needs the
            // arena again.
            let arena = &self.files[file.0 as usize].arena;
            *span = arena.get(*node).span();
        }

        if let DiagnosticTarget::Node { file, node, .. } = diagnostic.target {
            if let Some(directive_span) = self.find_suppression(file, node, diagnostic.code) {
                if diagnostic.is_error() {
                    self.diagnostics.push(Diagnostic::warning(
                        codes::SUPPRESS_ERROR,
                        "Errors cannot be suppressed.",
                        DiagnosticTarget::Span {
                            file,
                            span: directive_span,
                        },
                    ));
                } else {
                    return;
                }
            }
        }
        self.diagnostics.push(diagnostic);
    }

    /// Convert a phase-local diagnostic and push it through the sink.
    pub fn report_parse_diagnostics(&mut self, file: FileId, diagnostics: Vec<ParseDiagnostic>) {
        for diagnostic in diagnostics {
            self.report(diagnostic.into_diagnostic(file));
        }
    }

    /// Find a `#suppress <code>` directive attached to the node or any
    /// ancestor. Returns the directive's span when found.
    fn find_suppression(&self, file: FileId, node: NodeIndex, code: &str) -> Option<Span> {
        let arena = &self.files[file.0 as usize].arena;
        let mut current = node;
        while current.is_some() {
            let n = arena.get(current);
            for &directive in &n.directives {
                if let NodeKind::Directive { name, arguments } = &arena.get(directive).kind {
                    let is_suppress = arena
                        .identifier_atom(*name)
                        .map(|atom| self.interner.resolve(atom) == "suppress")
                        .unwrap_or(false);
                    if !is_suppress {
                        continue;
                    }
                    let matches = arguments.first().is_some_and(|&arg| {
                        match &arena.get(arg).kind {
                            NodeKind::Identifier { atom } => self.interner.resolve(*atom) == code,
                            NodeKind::StringLiteral { value } => value == code,
                            _ => false,
                        }
                    });
                    if matches {
                        return Some(arena.get(directive).span());
                    }
                }
            }
            current = n.parent;
        }
        None
    }

    pub fn diagnostics(&self) -> &DiagnosticBag {
        &self.diagnostics
    }

    /// True once any error-severity diagnostic has been accepted.
    pub fn has_error(&self) -> bool {
        self.diagnostics.has_errors()
    }

    // =========================================================================
    // State registry
    // =========================================================================

    pub fn state_map(&mut self, key: StateKey) -> &mut FxHashMap<TypeId, StateValue> {
        self.state.state_map(key)
    }

    pub fn state_set(&mut self, key: StateKey) -> &mut FxHashSet<TypeId> {
        self.state.state_set(key)
    }

    // =========================================================================
    // Callbacks
    // =========================================================================

    pub fn on_validate(&mut self, callback: ProgramCallback) {
        self.validators.push(callback);
    }

    pub fn on_emit(&mut self, callback: ProgramCallback) {
        self.emit_callbacks.push(callback);
    }

    // =========================================================================
    // Type graph access
    // =========================================================================

    /// Look up a member of the global namespace by source name. Mostly a
    /// convenience for tests and emitters.
    pub fn global_member(&self, name: &str) -> Option<TypeId> {
        if self.global_namespace.is_none() {
            return None;
        }
        let atom = self.interner.lookup(name)?;
        self.types
            .get(self.global_namespace)
            .as_namespace()?
            .member(atom)
    }

    /// Resolve a dotted path (`Pets.Pet`) through namespace members.
    pub fn member_by_path(&self, path: &str) -> Option<TypeId> {
        if self.global_namespace.is_none() {
            return None;
        }
        let mut current = self.global_namespace;
        for segment in path.split('.') {
            let atom = self.interner.lookup(segment)?;
            current = self.types.get(current).as_namespace()?.member(atom)?;
        }
        Some(current)
    }

    /// Resolve an atom back to text; convenience used throughout checking.
    pub fn name_text(&self, atom: Atom) -> &str {
        self.interner.resolve(atom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_registry_materializes() {
        let mut registry = StateRegistry::default();
        let key = next_state_key();
        assert!(registry.state_map(key).is_empty());
        registry
            .state_map(key)
            .insert(TypeId(1), StateValue::Bool(true));
        assert_eq!(
            registry.state_map(key).get(&TypeId(1)),
            Some(&StateValue::Bool(true))
        );

        let set_key = next_state_key();
        assert_ne!(key, set_key);
        registry.state_set(set_key).insert(TypeId(2));
        assert!(registry.state_set(set_key).contains(&TypeId(2)));
    }

    #[test]
    fn test_state_keys_unique() {
        let a = next_state_key();
        let b = next_state_key();
        assert_ne!(a, b);
    }
}
