//! Name resolution for the checker.
//!
//! A reference `A.B.C` is resolved against, in order: the nearest enclosing
//! declaration's locals, each enclosing lexical scope's declarations, the
//! file's `using` set (collapsed to one set per file), the merged global
//! scope, and the built-in `Cadl` namespace, which is implicitly `using`d
//! everywhere. Local declarations always shadow `using` imports; colliding
//! `using` names produce one ambiguous-reference diagnostic at each use
//! site, not at the `using` site.

use crate::binder::{SymbolId, SymbolKind};
use crate::checker::Checker;
use crate::diagnostics::{codes, Diagnostic, DiagnosticTarget};
use crate::interner::Atom;
use crate::parser::{NodeIndex, NodeKind};
use crate::source_file::FileId;
use rustc_hash::{FxHashMap, FxHashSet};

/// Outcome of a scope lookup; no diagnostics are emitted at this level.
pub(crate) enum Lookup {
    Found(SymbolId),
    /// The name came in through two different `using`s.
    Ambiguous,
    NotFound,
}

impl<'a> Checker<'a> {
    // =========================================================================
    // Using resolution
    // =========================================================================

    /// Resolve a file's `using` statements into its flat name set.
    ///
    /// Each imported name becomes a `Using` symbol; a second namespace
    /// supplying the same name marks the symbol `duplicate`, which turns
    /// every later use of that name into an ambiguous reference.
    pub(crate) fn build_using_env(&mut self, file: FileId) {
        let using_nodes = self.program.bindings[file.0 as usize].usings.clone();
        if using_nodes.is_empty() {
            self.using_envs.insert(file.0, FxHashMap::default());
            return;
        }

        let mut env: FxHashMap<Atom, SymbolId> = FxHashMap::default();
        let mut used: FxHashSet<SymbolId> = FxHashSet::default();

        for using_node in using_nodes {
            let reference = match &self.program.file(file).arena.get(using_node).kind {
                NodeKind::Using { reference } => *reference,
                _ => continue,
            };
            let Some(target) = self.resolve_reference_target(file, reference) else {
                continue;
            };
            if !self.program.symbols.get(target).is_namespace() {
                self.program.report(Diagnostic::error(
                    codes::UNRESOLVED_REFERENCE,
                    "Using must refer to a namespace.",
                    node_target(self.program, file, using_node),
                ));
                continue;
            }
            if !used.insert(target) {
                let name = self.program.symbols.get(target).name;
                let message = format!(
                    "Namespace '{}' is already in use in this file.",
                    self.program.name_text(name)
                );
                self.program.report(Diagnostic::error(
                    codes::DUPLICATE_USING,
                    message,
                    node_target(self.program, file, using_node),
                ));
                continue;
            }

            let exports = self
                .program
                .symbols
                .get(target)
                .exports
                .expect("namespace has exports");
            let members: Vec<SymbolId> = self.program.tables.get(exports).entries().to_vec();
            for member in members {
                let name = self.program.symbols.get(member).name;
                match env.get(&name) {
                    None => {
                        let using = self.program.symbols.alloc(
                            name,
                            SymbolKind::Using {
                                target: member,
                                duplicate: false,
                            },
                            crate::binder::NodeRef::NONE,
                            SymbolId::NONE,
                            None,
                        );
                        env.insert(name, using);
                    }
                    Some(&existing) => {
                        let same_target = match &self.program.symbols.get(existing).kind {
                            SymbolKind::Using { target, .. } => *target == member,
                            _ => false,
                        };
                        if !same_target {
                            if let SymbolKind::Using { duplicate, .. } =
                                &mut self.program.symbols.get_mut(existing).kind
                            {
                                *duplicate = true;
                            }
                        }
                    }
                }
            }
        }
        self.using_envs.insert(file.0, env);
    }

    // =========================================================================
    // Reference resolution
    // =========================================================================

    /// Resolve a reference expression (identifier, member chain, or the
    /// target of a type reference) to a symbol, emitting diagnostics on
    /// failure. `None` means a diagnostic was already produced (or the
    /// node was synthesized during parser recovery).
    pub(crate) fn resolve_reference_target(
        &mut self,
        file: FileId,
        node: NodeIndex,
    ) -> Option<SymbolId> {
        let kind = self.program.file(file).arena.get(node).kind.clone();
        match kind {
            NodeKind::Identifier { atom } => self.resolve_identifier(file, node, atom),
            NodeKind::MemberExpression { base, member } => {
                let base_symbol = self.resolve_reference_target(file, base)?;
                let member_atom = self.program.file(file).arena.identifier_atom(member)?;
                if member_atom.is_none() {
                    return None;
                }
                let symbol = self.program.symbols.get(base_symbol);
                if !symbol.is_namespace() {
                    let message = format!(
                        "'{}' is not a namespace.",
                        self.program.name_text(symbol.name)
                    );
                    self.program.report(Diagnostic::error(
                        codes::UNRESOLVED_REFERENCE,
                        message,
                        node_target(self.program, file, base),
                    ));
                    return None;
                }
                let exports = symbol.exports.expect("namespace has exports");
                match self.program.tables.get(exports).get(member_atom) {
                    Some(found) => Some(found),
                    None => {
                        let message = format!(
                            "Namespace '{}' has no member '{}'.",
                            self.program.name_text(self.program.symbols.get(base_symbol).name),
                            self.program.name_text(member_atom)
                        );
                        self.program.report(Diagnostic::error(
                            codes::UNRESOLVED_REFERENCE,
                            message,
                            node_target(self.program, file, member),
                        ));
                        None
                    }
                }
            }
            NodeKind::TypeReference { target, .. } => self.resolve_reference_target(file, target),
            _ => None,
        }
    }

    fn resolve_identifier(
        &mut self,
        file: FileId,
        node: NodeIndex,
        atom: Atom,
    ) -> Option<SymbolId> {
        if atom.is_none() {
            // Synthetic missing identifier; the parser already reported it.
            return None;
        }
        match self.lookup_identifier(file, node, atom) {
            Lookup::Found(symbol) => Some(symbol),
            Lookup::Ambiguous => {
                let message = format!(
                    "'{}' is an ambiguous name between multiple 'using' namespaces.",
                    self.program.name_text(atom)
                );
                self.program.report(Diagnostic::error(
                    codes::AMBIGUOUS_REFERENCE,
                    message,
                    node_target(self.program, file, node),
                ));
                None
            }
            Lookup::NotFound => {
                let message = format!("Unknown identifier '{}'.", self.program.name_text(atom));
                self.program.report(Diagnostic::error(
                    codes::UNRESOLVED_REFERENCE,
                    message,
                    node_target(self.program, file, node),
                ));
                None
            }
        }
    }

    /// Scope walk without diagnostics: locals and exports of each enclosing
    /// scope, then the file's `using` set, then the global scope, then the
    /// implicit `Cadl` namespace.
    pub(crate) fn lookup_identifier(&self, file: FileId, scope: NodeIndex, atom: Atom) -> Lookup {
        let arena = &self.program.file(file).arena;
        let bindings = &self.program.bindings[file.0 as usize];

        let mut current = scope;
        while current.is_some() {
            if let Some(&locals) = bindings.locals.get(&current.0) {
                if let Some(symbol) = self.program.tables.get(locals).get(atom) {
                    return Lookup::Found(symbol);
                }
            }
            let node = arena.get(current);
            match &node.kind {
                NodeKind::Namespace { .. } => {
                    if let Some(&symbol) = bindings.node_symbols.get(&current.0) {
                        if let Some(exports) = self.program.symbols.get(symbol).exports {
                            if let Some(found) = self.program.tables.get(exports).get(atom) {
                                return Lookup::Found(found);
                            }
                        }
                    }
                }
                NodeKind::Script { .. } => {
                    if let Some(found) = self.program.tables.get(bindings.exports).get(atom) {
                        return Lookup::Found(found);
                    }
                }
                _ => {}
            }
            current = node.parent;
        }

        if let Some(env) = self.using_envs.get(&file.0) {
            if let Some(&using) = env.get(&atom) {
                if let SymbolKind::Using { target, duplicate } =
                    &self.program.symbols.get(using).kind
                {
                    if *duplicate {
                        return Lookup::Ambiguous;
                    }
                    return Lookup::Found(*target);
                }
            }
        }

        if let Some(found) = self.program.tables.get(self.program.global_table).get(atom) {
            return Lookup::Found(found);
        }
        if let Some(found) = self.program.tables.get(self.cadl_table).get(atom) {
            return Lookup::Found(found);
        }
        Lookup::NotFound
    }

    // =========================================================================
    // Decorator resolution
    // =========================================================================

    /// Resolve a decorator annotation's target to its `@`-prefixed symbol.
    pub(crate) fn resolve_decorator(
        &mut self,
        file: FileId,
        target: NodeIndex,
    ) -> Option<SymbolId> {
        let kind = self.program.file(file).arena.get(target).kind.clone();
        match kind {
            NodeKind::Identifier { atom } => {
                if atom.is_none() {
                    return None;
                }
                let name = format!("@{}", self.program.name_text(atom));
                let at_atom = self.program.interner.intern(&name);
                match self.lookup_identifier(file, target, at_atom) {
                    Lookup::Found(symbol) => Some(symbol),
                    Lookup::Ambiguous => {
                        let message = format!("'{}' is an ambiguous name.", name);
                        self.program.report(Diagnostic::error(
                            codes::AMBIGUOUS_REFERENCE,
                            message,
                            node_target(self.program, file, target),
                        ));
                        None
                    }
                    Lookup::NotFound => {
                        let message = format!("Unknown decorator '{}'.", name);
                        self.program.report(Diagnostic::error(
                            codes::UNRESOLVED_REFERENCE,
                            message,
                            node_target(self.program, file, target),
                        ));
                        None
                    }
                }
            }
            NodeKind::MemberExpression { base, member } => {
                let base_symbol = self.resolve_reference_target(file, base)?;
                let member_atom = self.program.file(file).arena.identifier_atom(member)?;
                let symbol = self.program.symbols.get(base_symbol);
                if !symbol.is_namespace() {
                    return None;
                }
                let exports = symbol.exports.expect("namespace has exports");
                let name = format!("@{}", self.program.name_text(member_atom));
                let at_atom = self.program.interner.intern(&name);
                match self.program.tables.get(exports).get(at_atom) {
                    Some(found) => Some(found),
                    None => {
                        let message = format!("Unknown decorator '{}'.", name);
                        self.program.report(Diagnostic::error(
                            codes::UNRESOLVED_REFERENCE,
                            message,
                            node_target(self.program, file, member),
                        ));
                        None
                    }
                }
            }
            _ => None,
        }
    }
}

/// Diagnostic target for a node; the program resolves the span at report
/// time.
pub(crate) fn node_target(
    program: &crate::program::Program,
    file: FileId,
    node: NodeIndex,
) -> DiagnosticTarget {
    let span = program.file(file).arena.get(node).span();
    DiagnosticTarget::Node { file, node, span }
}
