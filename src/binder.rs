//! Binder - symbol creation and scope construction.
//!
//! One pass over the syntax tree per file: establishes parent links,
//! computes lexical scope, and populates symbol tables. Scripts and block
//! namespaces own `exports` tables; every scoped kind owns a `locals`
//! table. Namespaces with a name already bound to another namespace in the
//! enclosing table share that symbol's `exports` table object, so merging
//! is live.
//!
//! Symbol tables never replace an entry: the first symbol bound to a name
//! is authoritative and every collider is retained in a per-entry duplicate
//! set, reported by the program once after checking.

use crate::interner::{Atom, Interner};
use crate::parser::{NodeArena, NodeIndex, NodeKind};
use crate::program::host::{DecoratorFn, ExportValue, ModuleExports, ProgramCallback};
use crate::source_file::FileId;
use rustc_hash::FxHashMap;

// =============================================================================
// Identifiers
// =============================================================================

/// A node address that is unique across the whole program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub file: FileId,
    pub node: NodeIndex,
}

impl NodeRef {
    pub const NONE: NodeRef = NodeRef {
        file: FileId::NONE,
        node: NodeIndex::NONE,
    };

    pub fn new(file: FileId, node: NodeIndex) -> NodeRef {
        NodeRef { file, node }
    }

    #[inline]
    pub fn is_none(&self) -> bool {
        self.node.is_none()
    }

    #[inline]
    pub fn is_some(&self) -> bool {
        self.node.is_some()
    }
}

/// Unique identifier for a symbol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SymbolId(pub u32);

impl SymbolId {
    pub const NONE: SymbolId = SymbolId(u32::MAX);

    #[inline]
    pub fn is_none(&self) -> bool {
        self.0 == u32::MAX
    }

    #[inline]
    pub fn is_some(&self) -> bool {
        self.0 != u32::MAX
    }
}

/// Unique identifier for a symbol table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SymbolTableId(pub u32);

impl SymbolTableId {
    pub const NONE: SymbolTableId = SymbolTableId(u32::MAX);

    #[inline]
    pub fn is_none(&self) -> bool {
        self.0 == u32::MAX
    }
}

// =============================================================================
// Symbols
// =============================================================================

/// The kind-specific payload of a symbol.
pub enum SymbolKind {
    /// A type declaration (model, interface, union, enum, alias, operation).
    TypeDecl,
    /// A namespace, declared in CADL or synthesized for an external module's
    /// dotted namespace path.
    Namespace,
    /// A template parameter declared in an enclosing declaration's locals.
    TemplateParameter,
    /// A decorator function from an external module. The name carries the
    /// `@` prefix; `path` is the module it came from.
    Decorator {
        path: String,
        implementation: DecoratorFn,
    },
    /// A `using`-imported alias of another symbol. `duplicate` marks a
    /// re-import of the same name by a later `using`.
    Using { target: SymbolId, duplicate: bool },
}

impl std::fmt::Debug for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SymbolKind::TypeDecl => write!(f, "TypeDecl"),
            SymbolKind::Namespace => write!(f, "Namespace"),
            SymbolKind::TemplateParameter => write!(f, "TemplateParameter"),
            SymbolKind::Decorator { path, .. } => write!(f, "Decorator({})", path),
            SymbolKind::Using { target, duplicate } => {
                write!(f, "Using({:?}, duplicate: {})", target, duplicate)
            }
        }
    }
}

/// A named entity created during binding.
#[derive(Debug)]
pub struct Symbol {
    pub id: SymbolId,
    pub name: Atom,
    pub kind: SymbolKind,
    /// The declaration node, `NodeRef::NONE` for synthetic symbols.
    pub node: NodeRef,
    /// The symbol of the enclosing namespace or script scope.
    pub parent: SymbolId,
    /// Exported members, for namespaces.
    pub exports: Option<SymbolTableId>,
}

impl Symbol {
    pub fn is_namespace(&self) -> bool {
        matches!(self.kind, SymbolKind::Namespace)
    }
}

/// Arena allocator for symbols.
#[derive(Debug, Default)]
pub struct SymbolArena {
    symbols: Vec<Symbol>,
}

impl SymbolArena {
    pub fn new() -> SymbolArena {
        SymbolArena::default()
    }

    pub fn alloc(
        &mut self,
        name: Atom,
        kind: SymbolKind,
        node: NodeRef,
        parent: SymbolId,
        exports: Option<SymbolTableId>,
    ) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(Symbol {
            id,
            name,
            kind,
            node,
            parent,
            exports,
        });
        id
    }

    #[inline]
    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    #[inline]
    pub fn get_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

// =============================================================================
// Symbol tables
// =============================================================================

/// Outcome of inserting a name into a table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The name was taken; the collider was recorded in the duplicate set
    /// of the authoritative (first) symbol.
    Duplicate(SymbolId),
}

/// An insertion-ordered name-to-symbol map that records but never
/// overwrites duplicates.
#[derive(Debug, Default)]
pub struct SymbolTable {
    order: Vec<SymbolId>,
    by_name: FxHashMap<Atom, SymbolId>,
    duplicates: FxHashMap<SymbolId, Vec<SymbolId>>,
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        SymbolTable::default()
    }

    pub fn get(&self, name: Atom) -> Option<SymbolId> {
        self.by_name.get(&name).copied()
    }

    /// Insert a symbol under a name. The first entry wins; colliders are
    /// retained for later diagnostic emission.
    pub fn insert(&mut self, name: Atom, symbol: SymbolId) -> InsertOutcome {
        if name.is_none() {
            // Synthetic missing names never enter a table.
            return InsertOutcome::Inserted;
        }
        if let Some(&first) = self.by_name.get(&name) {
            if first == symbol {
                return InsertOutcome::Inserted;
            }
            self.duplicates.entry(first).or_default().push(symbol);
            return InsertOutcome::Duplicate(first);
        }
        self.by_name.insert(name, symbol);
        self.order.push(symbol);
        InsertOutcome::Inserted
    }

    /// Authoritative entries in insertion order.
    pub fn entries(&self) -> &[SymbolId] {
        &self.order
    }

    /// The duplicate set: authoritative symbol to retained colliders.
    pub fn duplicates(&self) -> &FxHashMap<SymbolId, Vec<SymbolId>> {
        &self.duplicates
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Arena for symbol tables, so merged namespaces can share one table by id.
#[derive(Debug, Default)]
pub struct SymbolTableArena {
    tables: Vec<SymbolTable>,
}

impl SymbolTableArena {
    pub fn new() -> SymbolTableArena {
        SymbolTableArena::default()
    }

    pub fn alloc(&mut self) -> SymbolTableId {
        let id = SymbolTableId(self.tables.len() as u32);
        self.tables.push(SymbolTable::new());
        id
    }

    #[inline]
    pub fn get(&self, id: SymbolTableId) -> &SymbolTable {
        &self.tables[id.0 as usize]
    }

    #[inline]
    pub fn get_mut(&mut self, id: SymbolTableId) -> &mut SymbolTable {
        &mut self.tables[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SymbolTableId, &SymbolTable)> {
        self.tables
            .iter()
            .enumerate()
            .map(|(i, t)| (SymbolTableId(i as u32), t))
    }
}

// =============================================================================
// File bindings
// =============================================================================

/// Everything the binder produced for one file.
#[derive(Debug)]
pub struct FileBindings {
    /// The script's exports table.
    pub exports: SymbolTableId,
    /// Locals tables of scoped nodes, keyed by node index.
    pub locals: FxHashMap<u32, SymbolTableId>,
    /// Declaration node to symbol.
    pub node_symbols: FxHashMap<u32, SymbolId>,
    /// `using` statements in source order.
    pub usings: Vec<NodeIndex>,
}

// =============================================================================
// Binder
// =============================================================================

struct ScopeFrame {
    container: SymbolId,
    exports: Option<SymbolTableId>,
    locals: Option<SymbolTableId>,
}

/// Walks one file's tree, assigning parents and declaring symbols.
pub struct Binder<'a> {
    file: FileId,
    arena: &'a mut NodeArena,
    symbols: &'a mut SymbolArena,
    tables: &'a mut SymbolTableArena,
    scopes: Vec<ScopeFrame>,
    bindings: FileBindings,
}

/// Bind a parsed script, producing its [`FileBindings`].
pub fn bind_script(
    file: FileId,
    root: NodeIndex,
    arena: &mut NodeArena,
    symbols: &mut SymbolArena,
    tables: &mut SymbolTableArena,
) -> FileBindings {
    let exports = tables.alloc();
    let locals = tables.alloc();
    let mut binder = Binder {
        file,
        arena,
        symbols,
        tables,
        scopes: vec![ScopeFrame {
            container: SymbolId::NONE,
            exports: Some(exports),
            locals: Some(locals),
        }],
        bindings: FileBindings {
            exports,
            locals: FxHashMap::default(),
            node_symbols: FxHashMap::default(),
            usings: Vec::new(),
        },
    };
    binder.bindings.locals.insert(root.0, locals);
    binder.bind_children(root);
    binder.bindings
}

impl<'a> Binder<'a> {
    fn current_exports(&self) -> SymbolTableId {
        self.scopes
            .iter()
            .rev()
            .find_map(|frame| frame.exports)
            .expect("script frame always has exports")
    }

    fn current_container(&self) -> SymbolId {
        self.scopes
            .last()
            .map(|frame| frame.container)
            .unwrap_or(SymbolId::NONE)
    }

    /// The innermost locals table, for template parameter declarations.
    fn current_locals(&self) -> Option<SymbolTableId> {
        self.scopes.iter().rev().find_map(|frame| frame.locals)
    }

    fn bind_children(&mut self, index: NodeIndex) {
        let mut children = Vec::new();
        self.arena.visit_children(index, &mut |child| children.push(child));
        for child in children {
            self.bind_node(child, index);
        }
    }

    fn bind_node(&mut self, index: NodeIndex, parent: NodeIndex) {
        self.arena.get_mut(index).parent = parent;

        match &self.arena.get(index).kind {
            NodeKind::Namespace { name, .. } => {
                let name_atom = self.arena.identifier_atom(*name).unwrap_or(Atom::NONE);
                self.bind_namespace(index, name_atom);
            }
            NodeKind::Model { name, .. }
            | NodeKind::Interface { name, .. }
            | NodeKind::Union { name, .. }
            | NodeKind::Enum { name, .. }
            | NodeKind::Alias { name, .. } => {
                let name_atom = self.arena.identifier_atom(*name).unwrap_or(Atom::NONE);
                let scoped = self.arena.get(index).kind.is_scoped();
                self.declare(index, name_atom);
                if scoped {
                    let locals = self.tables.alloc();
                    self.bindings.locals.insert(index.0, locals);
                    self.scopes.push(ScopeFrame {
                        container: self.current_container(),
                        exports: None,
                        locals: Some(locals),
                    });
                    self.bind_children(index);
                    self.scopes.pop();
                } else {
                    self.bind_children(index);
                }
            }
            NodeKind::Operation { name, .. } => {
                // Operations declare into the enclosing table unless they
                // are interface members.
                let parent_is_interface = parent.is_some()
                    && matches!(self.arena.get(parent).kind, NodeKind::Interface { .. });
                if !parent_is_interface {
                    let name_atom = self.arena.identifier_atom(*name).unwrap_or(Atom::NONE);
                    self.declare(index, name_atom);
                }
                self.bind_children(index);
            }
            NodeKind::TemplateParameter { name } => {
                let name_atom = self.arena.identifier_atom(*name).unwrap_or(Atom::NONE);
                let symbol = self.symbols.alloc(
                    name_atom,
                    SymbolKind::TemplateParameter,
                    NodeRef::new(self.file, index),
                    self.current_container(),
                    None,
                );
                self.bindings.node_symbols.insert(index.0, symbol);
                if let Some(locals) = self.current_locals() {
                    self.tables.get_mut(locals).insert(name_atom, symbol);
                }
                self.bind_children(index);
            }
            NodeKind::Using { .. } => {
                self.bindings.usings.push(index);
                self.bind_children(index);
            }
            _ => self.bind_children(index),
        }
    }

    /// Bind a namespace node, merging into an existing namespace symbol of
    /// the same name in the enclosing table when there is one.
    fn bind_namespace(&mut self, index: NodeIndex, name: Atom) {
        let enclosing = self.current_exports();
        let existing = self
            .tables
            .get(enclosing)
            .get(name)
            .filter(|&id| self.symbols.get(id).is_namespace());

        let (symbol, exports) = match existing {
            Some(id) => {
                // Same fully-qualified name: the new node's symbol aliases
                // the existing one and shares its exports table object.
                let exports = self.symbols.get(id).exports.expect("namespace has exports");
                (id, exports)
            }
            None => {
                let exports = self.tables.alloc();
                let symbol = self.symbols.alloc(
                    name,
                    SymbolKind::Namespace,
                    NodeRef::new(self.file, index),
                    self.current_container(),
                    Some(exports),
                );
                self.tables.get_mut(enclosing).insert(name, symbol);
                (symbol, exports)
            }
        };
        self.bindings.node_symbols.insert(index.0, symbol);

        // Locals are per-declaration and never merged.
        let locals = self.tables.alloc();
        self.bindings.locals.insert(index.0, locals);
        self.scopes.push(ScopeFrame {
            container: symbol,
            exports: Some(exports),
            locals: Some(locals),
        });
        self.bind_children(index);
        self.scopes.pop();
    }

    fn declare(&mut self, index: NodeIndex, name: Atom) {
        let symbol = self.symbols.alloc(
            name,
            SymbolKind::TypeDecl,
            NodeRef::new(self.file, index),
            self.current_container(),
            None,
        );
        self.bindings.node_symbols.insert(index.0, symbol);
        let table = self.current_exports();
        self.tables.get_mut(table).insert(name, symbol);
    }
}

// =============================================================================
// Cross-file merging
// =============================================================================

/// Merge one script's exports into the global table. Namespaces with equal
/// fully-qualified names end up sharing a single exports table; any other
/// collision is recorded in the target table's duplicate set.
pub fn merge_exports_into(
    target: SymbolTableId,
    source: SymbolTableId,
    symbols: &mut SymbolArena,
    tables: &mut SymbolTableArena,
) {
    if target == source {
        return;
    }
    let entries: Vec<SymbolId> = tables.get(source).entries().to_vec();
    for symbol in entries {
        merge_symbol_into(target, symbol, symbols, tables);
    }
}

fn merge_symbol_into(
    target: SymbolTableId,
    symbol: SymbolId,
    symbols: &mut SymbolArena,
    tables: &mut SymbolTableArena,
) {
    let name = symbols.get(symbol).name;
    if name.is_none() {
        return;
    }
    let existing = tables.get(target).get(name);
    match existing {
        Some(first) if first != symbol => {
            let both_namespaces =
                symbols.get(first).is_namespace() && symbols.get(symbol).is_namespace();
            if both_namespaces {
                let first_exports = symbols.get(first).exports.expect("namespace has exports");
                let incoming_exports =
                    symbols.get(symbol).exports.expect("namespace has exports");
                merge_exports_into(first_exports, incoming_exports, symbols, tables);
                // Live merge: re-point the incoming symbol at the shared table.
                symbols.get_mut(symbol).exports = Some(first_exports);
            } else {
                tables.get_mut(target).insert(name, symbol);
            }
        }
        Some(_) => {}
        None => {
            tables.get_mut(target).insert(name, symbol);
        }
    }
}

// =============================================================================
// External module binding
// =============================================================================

/// Callbacks lifted out of an external module's exports.
#[derive(Default)]
pub struct ExternalBindings {
    pub validators: Vec<ProgramCallback>,
    pub emitters: Vec<ProgramCallback>,
}

/// Bind an external module's exports into the global namespace tables.
///
/// Exports whose name begins with `$` are decorator functions, bound as
/// `@<rest>` into the namespace named by the module's `namespace` export
/// plus any per-function namespace attribute; missing segments are
/// synthesized. `$onValidate` and `$onEmit` are lifted out as program-level
/// callbacks instead.
pub fn bind_external_module(
    module_path: &str,
    exports: &ModuleExports,
    global: SymbolTableId,
    symbols: &mut SymbolArena,
    tables: &mut SymbolTableArena,
    interner: &mut Interner,
) -> ExternalBindings {
    let mut bindings = ExternalBindings::default();

    let base_namespace: Option<&str> = exports.entries.iter().find_map(|(name, value)| {
        match (name.as_str(), value) {
            ("namespace", ExportValue::Str(path)) => Some(path.as_str()),
            _ => None,
        }
    });

    for (name, value) in &exports.entries {
        match (name.as_str(), value) {
            ("$onValidate", ExportValue::Callback(callback)) => {
                bindings.validators.push(callback.clone());
            }
            ("$onEmit", ExportValue::Callback(callback)) => {
                bindings.emitters.push(callback.clone());
            }
            (name, ExportValue::Decorator {
                implementation,
                namespace,
            }) if name.starts_with('$') => {
                let decorator_name = interner.intern(&format!("@{}", &name[1..]));
                let path = join_namespace_paths(base_namespace, namespace.as_deref());
                let table = ensure_namespace_path(&path, global, symbols, tables, interner);
                let symbol = symbols.alloc(
                    decorator_name,
                    SymbolKind::Decorator {
                        path: module_path.to_string(),
                        implementation: implementation.clone(),
                    },
                    NodeRef::NONE,
                    SymbolId::NONE,
                    None,
                );
                tables.get_mut(table).insert(decorator_name, symbol);
            }
            _ => {}
        }
    }
    bindings
}

fn join_namespace_paths(base: Option<&str>, extra: Option<&str>) -> String {
    match (base, extra) {
        (Some(base), Some(extra)) => format!("{}.{}", base, extra),
        (Some(base), None) => base.to_string(),
        (None, Some(extra)) => extra.to_string(),
        (None, None) => String::new(),
    }
}

/// Walk a dotted namespace path from the global table, synthesizing any
/// missing segment, and return the exports table of the last segment.
pub fn ensure_namespace_path(
    path: &str,
    global: SymbolTableId,
    symbols: &mut SymbolArena,
    tables: &mut SymbolTableArena,
    interner: &mut Interner,
) -> SymbolTableId {
    let mut current = global;
    let mut parent = SymbolId::NONE;
    if path.is_empty() {
        return current;
    }
    for segment in path.split('.') {
        let atom = interner.intern(segment);
        let existing = tables
            .get(current)
            .get(atom)
            .filter(|&id| symbols.get(id).is_namespace());
        let symbol = match existing {
            Some(id) => id,
            None => {
                let exports = tables.alloc();
                let symbol = symbols.alloc(
                    atom,
                    SymbolKind::Namespace,
                    NodeRef::NONE,
                    parent,
                    Some(exports),
                );
                tables.get_mut(current).insert(atom, symbol);
                symbol
            }
        };
        current = symbols.get(symbol).exports.expect("namespace has exports");
        parent = symbol;
    }
    current
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::source_file::SourceFile;

    struct Bound {
        arena: NodeArena,
        root: NodeIndex,
        symbols: SymbolArena,
        tables: SymbolTableArena,
        bindings: FileBindings,
        interner: Interner,
    }

    fn bind_text(text: &str) -> Bound {
        let source = SourceFile::new("test.cadl", text);
        let mut interner = Interner::new();
        let mut result = parse(&source, &mut interner);
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
        let mut symbols = SymbolArena::new();
        let mut tables = SymbolTableArena::new();
        let bindings = bind_script(
            FileId(0),
            result.root,
            &mut result.arena,
            &mut symbols,
            &mut tables,
        );
        Bound {
            root: result.root,
            arena: result.arena,
            symbols,
            tables,
            bindings,
            interner,
        }
    }

    fn lookup(bound: &Bound, table: SymbolTableId, name: &str) -> Option<SymbolId> {
        let atom = bound.interner.lookup(name)?;
        bound.tables.get(table).get(atom)
    }

    #[test]
    fn test_script_exports_declarations() {
        let bound = bind_text("model A {} interface I {} enum E {} op read(): A;");
        let exports = bound.bindings.exports;
        assert!(lookup(&bound, exports, "A").is_some());
        assert!(lookup(&bound, exports, "I").is_some());
        assert!(lookup(&bound, exports, "E").is_some());
        assert!(lookup(&bound, exports, "read").is_some());
    }

    #[test]
    fn test_parent_links_set() {
        let bound = bind_text("model A { x: string }");
        let statements = match &bound.arena.get(bound.root).kind {
            NodeKind::Script { statements } => statements.clone(),
            _ => unreachable!(),
        };
        let model = statements[0];
        assert_eq!(bound.arena.get(model).parent, bound.root);
        match &bound.arena.get(model).kind {
            NodeKind::Model { members, .. } => {
                assert_eq!(bound.arena.get(members[0]).parent, model);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_namespace_merging_within_file() {
        let bound = bind_text("namespace N { model A {} } namespace N { model B {} }");
        let exports = bound.bindings.exports;
        let n = lookup(&bound, exports, "N").unwrap();
        let n_exports = bound.symbols.get(n).exports.unwrap();
        assert!(lookup(&bound, n_exports, "A").is_some());
        assert!(lookup(&bound, n_exports, "B").is_some());
        // The table has one N entry, no duplicates.
        assert!(bound.tables.get(exports).duplicates().is_empty());
    }

    #[test]
    fn test_duplicates_recorded_not_overwritten() {
        let bound = bind_text("model A {} model A {}");
        let exports = bound.bindings.exports;
        let first = lookup(&bound, exports, "A").unwrap();
        let duplicates = bound.tables.get(exports).duplicates();
        assert_eq!(duplicates.get(&first).map(Vec::len), Some(1));
        // Insertion order preserved, first entry authoritative.
        assert_eq!(bound.tables.get(exports).entries(), &[first]);
    }

    #[test]
    fn test_template_parameters_in_locals() {
        let bound = bind_text("model Box<T, U> { v: T }");
        let statements = match &bound.arena.get(bound.root).kind {
            NodeKind::Script { statements } => statements.clone(),
            _ => unreachable!(),
        };
        let locals = bound.bindings.locals[&statements[0].0];
        assert!(lookup(&bound, locals, "T").is_some());
        assert!(lookup(&bound, locals, "U").is_some());
        // Template parameters do not leak into the script exports.
        assert!(lookup(&bound, bound.bindings.exports, "T").is_none());
    }

    #[test]
    fn test_interface_operations_not_declared() {
        let bound = bind_text("interface I { op foo(): string; }");
        assert!(lookup(&bound, bound.bindings.exports, "foo").is_none());
    }

    #[test]
    fn test_usings_collected_in_order() {
        let bound = bind_text("using A;\nusing B;\nmodel M {}");
        assert_eq!(bound.bindings.usings.len(), 2);
    }

    #[test]
    fn test_cross_file_namespace_merge() {
        let mut a = bind_text("namespace N { model A {} }");
        let source_b = SourceFile::new("b.cadl", "namespace N { model B {} }");
        let mut parse_b = parse(&source_b, &mut a.interner);
        let bindings_b = bind_script(
            FileId(1),
            parse_b.root,
            &mut parse_b.arena,
            &mut a.symbols,
            &mut a.tables,
        );

        let global = a.tables.alloc();
        merge_exports_into(global, a.bindings.exports, &mut a.symbols, &mut a.tables);
        merge_exports_into(global, bindings_b.exports, &mut a.symbols, &mut a.tables);

        let n = lookup(&a, global, "N").unwrap();
        let n_exports = a.symbols.get(n).exports.unwrap();
        assert!(lookup(&a, n_exports, "A").is_some());
        assert!(lookup(&a, n_exports, "B").is_some());
    }

    #[test]
    fn test_cross_file_duplicate_model() {
        let mut a = bind_text("model A {}");
        let source_b = SourceFile::new("b.cadl", "model A {}");
        let mut parse_b = parse(&source_b, &mut a.interner);
        let bindings_b = bind_script(
            FileId(1),
            parse_b.root,
            &mut parse_b.arena,
            &mut a.symbols,
            &mut a.tables,
        );

        let global = a.tables.alloc();
        merge_exports_into(global, a.bindings.exports, &mut a.symbols, &mut a.tables);
        merge_exports_into(global, bindings_b.exports, &mut a.symbols, &mut a.tables);

        let first = lookup(&a, global, "A").unwrap();
        assert_eq!(
            a.tables.get(global).duplicates().get(&first).map(Vec::len),
            Some(1)
        );
        let _ = bindings_b;
    }

    #[test]
    fn test_external_module_binding() {
        use crate::program::host::{ExportValue, ModuleExports};
        use std::sync::Arc;

        let mut symbols = SymbolArena::new();
        let mut tables = SymbolTableArena::new();
        let mut interner = Interner::new();
        let global = tables.alloc();

        let exports = ModuleExports {
            entries: vec![
                ("namespace".to_string(), ExportValue::Str("My.Lib".to_string())),
                (
                    "$blue".to_string(),
                    ExportValue::Decorator {
                        implementation: Arc::new(|_, _, _| Ok(())),
                        namespace: None,
                    },
                ),
                (
                    "$onValidate".to_string(),
                    ExportValue::Callback(Arc::new(|_| {})),
                ),
            ],
        };
        let external = bind_external_module(
            "/lib/decorators.js",
            &exports,
            global,
            &mut symbols,
            &mut tables,
            &mut interner,
        );
        assert_eq!(external.validators.len(), 1);
        assert!(external.emitters.is_empty());

        // `My` and `Lib` namespaces were synthesized; `@blue` lives in Lib.
        let my = tables.get(global).get(interner.lookup("My").unwrap()).unwrap();
        let my_exports = symbols.get(my).exports.unwrap();
        let lib = tables
            .get(my_exports)
            .get(interner.lookup("Lib").unwrap())
            .unwrap();
        let lib_exports = symbols.get(lib).exports.unwrap();
        let blue = tables
            .get(lib_exports)
            .get(interner.lookup("@blue").unwrap())
            .unwrap();
        assert!(matches!(
            symbols.get(blue).kind,
            SymbolKind::Decorator { .. }
        ));
        // $onValidate is lifted, not bound as a decorator.
        assert!(interner.lookup("@onValidate").is_none());
    }
}
