//! Checker - type construction and semantic analysis.
//!
//! Responsibilities: name resolution, type construction, template
//! instantiation, type-level namespace merging, `using` resolution,
//! composition (`extends`, `is`, spread, mixes, intersection, union),
//! decorator invocation, and literal-type interning.
//!
//! Declarations are processed in source order within a file, files in
//! import-discovery order, libraries before user code. Types are created
//! lazily on first demand and memoized; a declaration's type handle is
//! assigned before its body is populated so cyclic property types can
//! refer back to it. Uninstantiated template bodies are never realized
//! and never fire decorators.

pub mod types;

mod resolve;

use crate::binder::{NodeRef, SymbolId, SymbolKind};
use crate::checker::resolve::node_target;
use crate::checker::types::{
    intrinsic_is_numeric, ArrayType, DecoratorApp, DecoratorArgValue, EnumMemberType, EnumType,
    EnumValue, InterfaceType, IntrinsicType, LiteralKey, ModelPropertyType, ModelType,
    NamespaceType, OperationType, TemplateParameterType, TupleType, Type, TypeId, UnionType,
    UnionVariantType, INTRINSIC_NAMES,
};
use crate::diagnostics::{codes, Diagnostic, Severity};
use crate::interner::Atom;
use crate::parser::{NodeIndex, NodeKind};
use crate::program::{DecoratorContext, Program};
use crate::source_file::FileId;
use crate::span::Span;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

/// Instantiation depth past which the checker assumes divergence.
const MAX_INSTANTIATION_DEPTH: u32 = 64;

/// Run the checker over every loaded file, populating the program's type
/// graph.
pub fn check(program: &mut Program) {
    let mut checker = Checker {
        program,
        cadl_table: crate::binder::SymbolTableId::NONE,
        pending_decls: Vec::new(),
        substitutions: Vec::new(),
        using_envs: FxHashMap::default(),
        instantiation_depth: 0,
    };
    checker.check_program();
}

/// Checker state for one program.
pub struct Checker<'a> {
    pub(crate) program: &'a mut Program,
    /// Exports table of the built-in `Cadl` namespace.
    pub(crate) cadl_table: crate::binder::SymbolTableId,
    /// Declarations currently being built, for base-cycle detection.
    pending_decls: Vec<NodeRef>,
    /// Active template substitution frames, innermost last.
    substitutions: Vec<FxHashMap<SymbolId, TypeId>>,
    /// Per-file `using` name sets, keyed by file index.
    pub(crate) using_envs: FxHashMap<u32, FxHashMap<Atom, SymbolId>>,
    instantiation_depth: u32,
}

impl<'a> Checker<'a> {
    // =========================================================================
    // Entry
    // =========================================================================

    fn check_program(&mut self) {
        debug!(files = self.program.file_count(), "checking program");
        self.program.error_type = self.program.types.alloc(Type::Error);
        self.seed_intrinsics();

        // The global namespace type roots the graph; namespaces with equal
        // fully-qualified names share one type via their shared table.
        let global_ns = self.program.types.alloc(Type::Namespace(NamespaceType {
            name: Atom::NONE,
            node: NodeRef::NONE,
            namespace: TypeId::NONE,
            members: Vec::new(),
            decorators: Vec::new(),
        }));
        self.program.global_namespace = global_ns;
        self.program
            .namespace_types
            .insert(self.program.global_table, global_ns);

        for file in self.program.file_ids().collect::<Vec<_>>() {
            self.build_using_env(file);
        }

        for file in self.program.file_ids().collect::<Vec<_>>() {
            self.check_source_file(file);
        }

        self.report_duplicate_symbols();
    }

    /// Seed the built-in `Cadl` namespace with the intrinsic types.
    fn seed_intrinsics(&mut self) {
        let cadl_table = crate::binder::ensure_namespace_path(
            "Cadl",
            self.program.global_table,
            &mut self.program.symbols,
            &mut self.program.tables,
            &mut self.program.interner,
        );
        self.cadl_table = cadl_table;
        for &name in INTRINSIC_NAMES {
            let atom = self.program.interner.intern(name);
            if self.program.tables.get(cadl_table).get(atom).is_some() {
                continue;
            }
            let symbol = self.program.symbols.alloc(
                atom,
                SymbolKind::TypeDecl,
                NodeRef::NONE,
                SymbolId::NONE,
                None,
            );
            self.program.tables.get_mut(cadl_table).insert(atom, symbol);
            let ty = self
                .program
                .types
                .alloc(Type::Intrinsic(IntrinsicType { name }));
            self.program.intrinsics.insert(symbol, ty);
        }
    }

    fn check_source_file(&mut self, file: FileId) {
        trace!(file = self.program.file(file).source.path(), "checking file");
        let statements = match &self.program.file(file).arena.get(self.program.file(file).root).kind
        {
            NodeKind::Script { statements } => statements.clone(),
            _ => return,
        };
        for statement in statements {
            self.check_statement(file, statement);
        }
    }

    fn check_statement(&mut self, file: FileId, statement: NodeIndex) {
        match &self.program.file(file).arena.get(statement).kind {
            NodeKind::Namespace { .. } => self.check_namespace(file, statement),
            NodeKind::Model { .. }
            | NodeKind::Interface { .. }
            | NodeKind::Union { .. }
            | NodeKind::Enum { .. }
            | NodeKind::Operation { .. }
            | NodeKind::Alias { .. } => {
                let _ = self.type_of_declaration(NodeRef::new(file, statement));
            }
            _ => {}
        }
    }

    fn check_namespace(&mut self, file: FileId, node: NodeIndex) {
        let Some(&symbol) = self.program.bindings[file.0 as usize]
            .node_symbols
            .get(&node.0)
        else {
            return;
        };
        let ns_type = self.namespace_type_for_symbol(symbol);
        let (decorators, statements) = match &self.program.file(file).arena.get(node).kind {
            NodeKind::Namespace {
                decorators,
                statements,
                ..
            } => (decorators.clone(), statements.clone()),
            _ => return,
        };
        let span = self.program.file(file).arena.get(node).span();
        self.apply_decorator_nodes(file, ns_type, &decorators, span);
        for statement in statements {
            self.check_statement(file, statement);
        }
    }

    // =========================================================================
    // Namespace types
    // =========================================================================

    /// The merged namespace type for a namespace symbol, created on first
    /// demand. Keyed by the shared exports table, so every declaration of
    /// one fully-qualified name maps to the same type.
    fn namespace_type_for_symbol(&mut self, symbol: SymbolId) -> TypeId {
        let table = self
            .program
            .symbols
            .get(symbol)
            .exports
            .expect("namespace has exports");
        if let Some(&existing) = self.program.namespace_types.get(&table) {
            return existing;
        }
        let (name, node, parent) = {
            let s = self.program.symbols.get(symbol);
            (s.name, s.node, s.parent)
        };
        let parent_type = if parent.is_none() {
            self.program.global_namespace
        } else {
            self.namespace_type_for_symbol(parent)
        };
        let id = self.program.types.alloc(Type::Namespace(NamespaceType {
            name,
            node,
            namespace: parent_type,
            members: Vec::new(),
            decorators: Vec::new(),
        }));
        self.program.namespace_types.insert(table, id);
        self.add_namespace_member(parent_type, name, id);
        id
    }

    /// Namespace type of the scope enclosing a declaration.
    fn namespace_of_decl(&mut self, decl: NodeRef) -> TypeId {
        let mut current = self.program.file(decl.file).arena.get(decl.node).parent;
        while current.is_some() {
            match &self.program.file(decl.file).arena.get(current).kind {
                NodeKind::Namespace { .. } => {
                    if let Some(&symbol) = self.program.bindings[decl.file.0 as usize]
                        .node_symbols
                        .get(&current.0)
                    {
                        return self.namespace_type_for_symbol(symbol);
                    }
                    return self.program.global_namespace;
                }
                _ => current = self.program.file(decl.file).arena.get(current).parent,
            }
        }
        self.program.global_namespace
    }

    fn add_namespace_member(&mut self, namespace: TypeId, name: Atom, member: TypeId) {
        if name.is_none() || namespace.is_none() {
            return;
        }
        if let Some(ns) = self.program.types.get_mut(namespace).as_namespace_mut() {
            if ns.member(name).is_none() {
                ns.members.push((name, member));
            }
        }
    }

    // =========================================================================
    // Declarations
    // =========================================================================

    /// The realized type of a declaration, `None` when the declaration is
    /// an uninstantiated template.
    pub(crate) fn type_of_declaration(&mut self, decl: NodeRef) -> Option<TypeId> {
        if let Some(&existing) = self.program.decl_types.get(&decl) {
            return Some(existing);
        }
        if !self.template_params_of(decl).is_empty() {
            return None;
        }
        let id = match self.program.file(decl.file).arena.get(decl.node).kind {
            NodeKind::Model { .. } => self.build_model(decl, Vec::new(), false),
            NodeKind::Interface { .. } => self.build_interface(decl, Vec::new(), false),
            NodeKind::Union { .. } => self.build_union(decl, Vec::new(), false),
            NodeKind::Enum { .. } => self.build_enum(decl),
            NodeKind::Operation { .. } => self.build_operation_statement(decl),
            NodeKind::Alias { .. } => self.build_alias(decl),
            _ => return None,
        };
        Some(id)
    }

    fn template_params_of(&self, decl: NodeRef) -> Vec<NodeIndex> {
        match &self.program.file(decl.file).arena.get(decl.node).kind {
            NodeKind::Model {
                template_parameters, ..
            }
            | NodeKind::Interface {
                template_parameters, ..
            }
            | NodeKind::Union {
                template_parameters, ..
            }
            | NodeKind::Alias {
                template_parameters, ..
            } => template_parameters.clone(),
            _ => Vec::new(),
        }
    }

    fn decl_span(&self, decl: NodeRef) -> Span {
        self.program.file(decl.file).arena.get(decl.node).span()
    }

    /// Atom of a property/member name node (identifier or string literal).
    fn name_atom(&mut self, file: FileId, node: NodeIndex) -> Atom {
        if node.is_none() {
            return Atom::NONE;
        }
        match &self.program.file(file).arena.get(node).kind {
            NodeKind::Identifier { atom } => *atom,
            NodeKind::StringLiteral { value } => {
                let value = value.clone();
                self.program.interner.intern(&value)
            }
            _ => Atom::NONE,
        }
    }

    // =========================================================================
    // Models
    // =========================================================================

    fn build_model(&mut self, decl: NodeRef, template_args: Vec<TypeId>, instantiated: bool) -> TypeId {
        let file = decl.file;
        let (decorators, name_node, extends_node, is_node, member_nodes) =
            match &self.program.file(file).arena.get(decl.node).kind {
                NodeKind::Model {
                    decorators,
                    name,
                    extends,
                    is,
                    members,
                    ..
                } => (
                    decorators.clone(),
                    *name,
                    *extends,
                    *is,
                    members.clone(),
                ),
                _ => return self.program.error_type,
            };
        let name = self
            .program
            .file(file)
            .arena
            .identifier_atom(name_node)
            .unwrap_or(Atom::NONE);
        let namespace = self.namespace_of_decl(decl);

        // Handle first, body later: cyclic property types refer back to it.
        let id = self.program.types.alloc(Type::Model(ModelType {
            name,
            node: decl,
            namespace,
            properties: Vec::new(),
            base_model: TypeId::NONE,
            template_arguments: template_args.clone(),
            decorators: Vec::new(),
        }));
        if instantiated {
            self.program.instantiations.insert((decl, template_args), id);
        } else {
            self.program.decl_types.insert(decl, id);
        }
        self.pending_decls.push(decl);

        let mut properties: Vec<(Atom, TypeId)> = Vec::new();
        let mut base_model = TypeId::NONE;
        let mut base_decorators: Vec<DecoratorApp> = Vec::new();

        if extends_node.is_some() {
            if let Some(base) = self.resolve_heritage(file, extends_node) {
                if self.program.types.get(base).as_model().is_some() {
                    base_model = base;
                } else {
                    self.program.report(Diagnostic::error(
                        codes::EXTEND_MODEL,
                        "Models must extend other models.",
                        node_target(self.program, file, extends_node),
                    ));
                }
            }
        } else if is_node.is_some() {
            if let Some(base) = self.resolve_heritage(file, is_node) {
                match self.program.types.get(base).as_model().cloned() {
                    Some(source) => {
                        // `is` clones the base's decorators and properties
                        // onto the new identity; the base's own base link
                        // is preserved.
                        base_model = source.base_model;
                        base_decorators = source.decorators.clone();
                        for (property_name, property) in source.properties {
                            let copy = self.clone_property(property);
                            properties.push((property_name, copy));
                        }
                    }
                    None => {
                        self.program.report(Diagnostic::error(
                            codes::IS_MODEL,
                            "Model 'is' must specify another model.",
                            node_target(self.program, file, is_node),
                        ));
                    }
                }
            }
        }

        let own_start = properties.len();
        self.build_member_list(file, &member_nodes, &mut properties);

        // A name introduced here may not shadow one inherited via extends.
        if base_model.is_some() {
            for index in own_start..properties.len() {
                let (property_name, property) = properties[index];
                if self.base_chain_has_property(base_model, property_name) {
                    let node = self
                        .program
                        .types
                        .get(property)
                        .as_property()
                        .map(|p| p.node)
                        .unwrap_or(NodeRef::NONE);
                    let message = format!(
                        "Model has an inherited property named '{}'.",
                        self.program.name_text(property_name)
                    );
                    let target = if node.is_some() {
                        node_target(self.program, node.file, node.node)
                    } else {
                        node_target(self.program, file, decl.node)
                    };
                    self.program.report(Diagnostic::error(
                        codes::DUPLICATE_PROPERTY,
                        message,
                        target,
                    ));
                }
            }
        }

        if let Some(model) = self.program.types.get_mut(id).as_model_mut() {
            model.properties = properties;
            model.base_model = base_model;
        }
        self.pending_decls.pop();

        // The declaration is fully realized: decorators fire now, the
        // base's clones first for `is`, then this declaration's own.
        let span = self.decl_span(decl);
        if self.apply_decorator_apps(file, id, base_decorators, span) {
            self.apply_decorator_nodes(file, id, &decorators, span);
        }

        if !instantiated {
            self.add_namespace_member(namespace, name, id);
        }
        id
    }

    /// Copy a property for spread/`is`/intersection composition. The copy
    /// carries a `source_property` back-link so per-property decoration of
    /// the original source is preserved.
    fn clone_property(&mut self, property: TypeId) -> TypeId {
        let source = match self.program.types.get(property).as_property() {
            Some(p) => p.clone(),
            None => return self.program.error_type,
        };
        self.program.types.alloc(Type::ModelProperty(ModelPropertyType {
            source_property: property,
            decorators: Vec::new(),
            ..source
        }))
    }

    /// Build a model body or parameter list: properties and spreads, with
    /// duplicate detection across both.
    fn build_member_list(
        &mut self,
        file: FileId,
        members: &[NodeIndex],
        properties: &mut Vec<(Atom, TypeId)>,
    ) {
        for &member in members {
            match self.program.file(file).arena.get(member).kind.clone() {
                NodeKind::ModelProperty {
                    decorators,
                    name,
                    value,
                    optional,
                    default,
                } => {
                    let name_atom = self.name_atom(file, name);
                    let ty = self.check_type_expression(file, value);
                    let default_ty = if default.is_some() {
                        if !optional {
                            self.program.report(Diagnostic::error(
                                codes::DEFAULT_ON_REQUIRED,
                                "Cannot use a default value on a required property.",
                                node_target(self.program, file, default),
                            ));
                        }
                        let default_ty = self.check_type_expression(file, default);
                        self.check_default(file, default, default_ty, ty);
                        default_ty
                    } else {
                        TypeId::NONE
                    };

                    if !name_atom.is_none()
                        && properties.iter().any(|(existing, _)| *existing == name_atom)
                    {
                        let message = format!(
                            "Model already has a property named '{}'.",
                            self.program.name_text(name_atom)
                        );
                        self.program.report(Diagnostic::error(
                            codes::DUPLICATE_PROPERTY,
                            message,
                            node_target(self.program, file, member),
                        ));
                        continue;
                    }

                    let property = self.program.types.alloc(Type::ModelProperty(
                        ModelPropertyType {
                            name: name_atom,
                            node: NodeRef::new(file, member),
                            ty,
                            optional,
                            default: default_ty,
                            source_property: TypeId::NONE,
                            decorators: Vec::new(),
                        },
                    ));
                    properties.push((name_atom, property));
                    let span = self.program.file(file).arena.get(member).span();
                    self.apply_decorator_nodes(file, property, &decorators, span);
                }
                NodeKind::ModelSpread { target } => {
                    let source = self.check_type_expression(file, target);
                    if matches!(self.program.types.get(source), Type::Error) {
                        continue;
                    }
                    match self.program.types.get(source).as_model().cloned() {
                        Some(model) => {
                            for (property_name, property) in model.properties {
                                if properties
                                    .iter()
                                    .any(|(existing, _)| *existing == property_name)
                                {
                                    let message = format!(
                                        "Model already has a property named '{}'.",
                                        self.program.name_text(property_name)
                                    );
                                    self.program.report(Diagnostic::error(
                                        codes::DUPLICATE_PROPERTY,
                                        message,
                                        node_target(self.program, file, member),
                                    ));
                                    continue;
                                }
                                let copy = self.clone_property(property);
                                properties.push((property_name, copy));
                            }
                        }
                        None => {
                            self.program.report(Diagnostic::error(
                                codes::SPREAD_MODEL,
                                "Cannot spread properties of non-model type.",
                                node_target(self.program, file, member),
                            ));
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn base_chain_has_property(&self, base: TypeId, name: Atom) -> bool {
        let mut current = base;
        let mut guard = 0;
        while current.is_some() && guard < 128 {
            match self.program.types.get(current).as_model() {
                Some(model) => {
                    if model.property(name).is_some() {
                        return true;
                    }
                    current = model.base_model;
                }
                None => break,
            }
            guard += 1;
        }
        false
    }

    /// Resolve an `extends`/`is` reference, detecting base cycles before
    /// realizing the target: re-entering a declaration that is still being
    /// built truncates the chain at the cycle point.
    fn resolve_heritage(&mut self, file: FileId, reference: NodeIndex) -> Option<TypeId> {
        let symbol = self.resolve_reference_target(file, reference)?;
        let symbol_data = self.program.symbols.get(symbol);
        if matches!(symbol_data.kind, SymbolKind::TypeDecl) {
            let decl = symbol_data.node;
            if decl.is_some() && self.pending_decls.contains(&decl) {
                let message = format!(
                    "Model type '{}' recursively references itself as a base type.",
                    self.program.name_text(self.program.symbols.get(symbol).name)
                );
                self.program.report(Diagnostic::error(
                    codes::RECURSIVE_BASE,
                    message,
                    node_target(self.program, file, reference),
                ));
                return None;
            }
        }
        let ty = self.check_type_expression(file, reference);
        if matches!(self.program.types.get(ty), Type::Error) {
            None
        } else {
            Some(ty)
        }
    }

    // =========================================================================
    // Defaults
    // =========================================================================

    /// A property default must match its declared type. Only intrinsic and
    /// literal-typed declarations are checkable; everything else passes.
    fn check_default(
        &mut self,
        file: FileId,
        default_node: NodeIndex,
        default_ty: TypeId,
        declared: TypeId,
    ) {
        let expected = match self.program.types.get(declared) {
            Type::Intrinsic(intrinsic) if intrinsic_is_numeric(intrinsic.name) => Some("number"),
            Type::Intrinsic(IntrinsicType { name: "string" }) => Some("string"),
            Type::Intrinsic(IntrinsicType { name: "boolean" }) => Some("boolean"),
            Type::StringLiteral(_) | Type::NumberLiteral(_) | Type::BooleanLiteral(_) => {
                if default_ty != declared {
                    self.program.report(Diagnostic::error(
                        codes::DEFAULT_TYPE_MISMATCH,
                        "Default value does not match the property type.",
                        node_target(self.program, file, default_node),
                    ));
                }
                return;
            }
            _ => None,
        };
        let Some(expected) = expected else { return };
        let ok = match self.program.types.get(default_ty) {
            Type::NumberLiteral(_) => expected == "number",
            Type::StringLiteral(_) => expected == "string",
            Type::BooleanLiteral(_) => expected == "boolean",
            Type::Error => true,
            _ => false,
        };
        if !ok {
            self.program.report(Diagnostic::templated(
                codes::DEFAULT_TYPE_MISMATCH,
                Severity::Error,
                "Default must be a {kind}.",
                &[("kind", expected)],
                node_target(self.program, file, default_node),
            ));
        }
    }

    // =========================================================================
    // Interfaces and operations
    // =========================================================================

    fn build_interface(&mut self, decl: NodeRef, template_args: Vec<TypeId>, instantiated: bool) -> TypeId {
        let file = decl.file;
        let (decorators, name_node, mixes_nodes, operation_nodes) =
            match &self.program.file(file).arena.get(decl.node).kind {
                NodeKind::Interface {
                    decorators,
                    name,
                    mixes,
                    operations,
                    ..
                } => (decorators.clone(), *name, mixes.clone(), operations.clone()),
                _ => return self.program.error_type,
            };
        let name = self
            .program
            .file(file)
            .arena
            .identifier_atom(name_node)
            .unwrap_or(Atom::NONE);
        let namespace = self.namespace_of_decl(decl);

        let id = self.program.types.alloc(Type::Interface(InterfaceType {
            name,
            node: decl,
            namespace,
            operations: Vec::new(),
            mixes: Vec::new(),
            decorators: Vec::new(),
        }));
        if instantiated {
            self.program.instantiations.insert((decl, template_args), id);
        } else {
            self.program.decl_types.insert(decl, id);
        }

        let mut operations: Vec<(Atom, TypeId)> = Vec::new();
        let mut mixes: Vec<TypeId> = Vec::new();

        for mix_node in mixes_nodes {
            let mixed = self.check_type_expression(file, mix_node);
            if matches!(self.program.types.get(mixed), Type::Error) {
                continue;
            }
            match self.program.types.get(mixed).as_interface().cloned() {
                Some(interface) => {
                    mixes.push(mixed);
                    for (operation_name, operation) in interface.operations {
                        if operations.iter().any(|(existing, _)| *existing == operation_name) {
                            let message = format!(
                                "Interface already has a member named '{}'.",
                                self.program.name_text(operation_name)
                            );
                            self.program.report(Diagnostic::error(
                                codes::DUPLICATE_SYMBOL,
                                message,
                                node_target(self.program, file, mix_node),
                            ));
                            continue;
                        }
                        operations.push((operation_name, operation));
                    }
                }
                None => {
                    self.program.report(Diagnostic::error(
                        codes::MIXES_INTERFACE,
                        "Interfaces can only mix other interfaces.",
                        node_target(self.program, file, mix_node),
                    ));
                }
            }
        }

        for operation_node in operation_nodes {
            let (operation_name, operation) = self.build_operation(file, operation_node, id);
            if !operation_name.is_none()
                && operations.iter().any(|(existing, _)| *existing == operation_name)
            {
                let message = format!(
                    "Interface already has a member named '{}'.",
                    self.program.name_text(operation_name)
                );
                self.program.report(Diagnostic::error(
                    codes::DUPLICATE_SYMBOL,
                    message,
                    node_target(self.program, file, operation_node),
                ));
                continue;
            }
            operations.push((operation_name, operation));
        }

        if let Type::Interface(interface) = self.program.types.get_mut(id) {
            interface.operations = operations;
            interface.mixes = mixes;
        }

        let span = self.decl_span(decl);
        self.apply_decorator_nodes(file, id, &decorators, span);
        if !instantiated {
            self.add_namespace_member(namespace, name, id);
        }
        id
    }

    /// Build one operation. `container` is the owning interface or
    /// namespace type. The parameters form an anonymous model.
    fn build_operation(
        &mut self,
        file: FileId,
        node: NodeIndex,
        container: TypeId,
    ) -> (Atom, TypeId) {
        let (decorators, name_node, parameter_nodes, return_type_node) =
            match &self.program.file(file).arena.get(node).kind {
                NodeKind::Operation {
                    decorators,
                    name,
                    parameters,
                    return_type,
                } => (
                    decorators.clone(),
                    *name,
                    parameters.clone(),
                    *return_type,
                ),
                _ => return (Atom::NONE, self.program.error_type),
            };
        let name = self
            .program
            .file(file)
            .arena
            .identifier_atom(name_node)
            .unwrap_or(Atom::NONE);

        let parameters = self.program.types.alloc(Type::Model(ModelType {
            name: Atom::NONE,
            node: NodeRef::new(file, node),
            namespace: self.program.global_namespace,
            properties: Vec::new(),
            base_model: TypeId::NONE,
            template_arguments: Vec::new(),
            decorators: Vec::new(),
        }));
        let mut properties = Vec::new();
        self.build_member_list(file, &parameter_nodes, &mut properties);
        if let Some(model) = self.program.types.get_mut(parameters).as_model_mut() {
            model.properties = properties;
        }

        let return_type = self.check_type_expression(file, return_type_node);
        let id = self.program.types.alloc(Type::Operation(OperationType {
            name,
            node: NodeRef::new(file, node),
            container,
            parameters,
            return_type,
            decorators: Vec::new(),
        }));
        let span = self.program.file(file).arena.get(node).span();
        self.apply_decorator_nodes(file, id, &decorators, span);
        (name, id)
    }

    fn build_operation_statement(&mut self, decl: NodeRef) -> TypeId {
        let namespace = self.namespace_of_decl(decl);
        let (name, id) = self.build_operation(decl.file, decl.node, namespace);
        self.program.decl_types.insert(decl, id);
        self.add_namespace_member(namespace, name, id);
        id
    }

    // =========================================================================
    // Unions and enums
    // =========================================================================

    fn build_union(&mut self, decl: NodeRef, template_args: Vec<TypeId>, instantiated: bool) -> TypeId {
        let file = decl.file;
        let (decorators, name_node, variant_nodes) =
            match &self.program.file(file).arena.get(decl.node).kind {
                NodeKind::Union {
                    decorators,
                    name,
                    variants,
                    ..
                } => (decorators.clone(), *name, variants.clone()),
                _ => return self.program.error_type,
            };
        let name = self
            .program
            .file(file)
            .arena
            .identifier_atom(name_node)
            .unwrap_or(Atom::NONE);
        let namespace = self.namespace_of_decl(decl);

        let id = self.program.types.alloc(Type::Union(UnionType {
            name,
            node: decl,
            namespace,
            options: Vec::new(),
            variants: Vec::new(),
            decorators: Vec::new(),
        }));
        if instantiated {
            self.program.instantiations.insert((decl, template_args), id);
        } else {
            self.program.decl_types.insert(decl, id);
        }

        let mut options = Vec::new();
        let mut variants: Vec<(Atom, TypeId)> = Vec::new();
        for variant_node in variant_nodes {
            let (variant_decorators, name_idx, value_idx) =
                match &self.program.file(file).arena.get(variant_node).kind {
                    NodeKind::UnionVariant {
                        decorators,
                        name,
                        value,
                    } => (decorators.clone(), *name, *value),
                    _ => continue,
                };
            let variant_name = self.name_atom(file, name_idx);
            let ty = self.check_type_expression(file, value_idx);
            if !variant_name.is_none()
                && variants.iter().any(|(existing, _)| *existing == variant_name)
            {
                let message = format!(
                    "Union already has a variant named '{}'.",
                    self.program.name_text(variant_name)
                );
                self.program.report(Diagnostic::error(
                    codes::DUPLICATE_SYMBOL,
                    message,
                    node_target(self.program, file, variant_node),
                ));
                continue;
            }
            let variant = self.program.types.alloc(Type::UnionVariant(UnionVariantType {
                name: variant_name,
                node: NodeRef::new(file, variant_node),
                union: id,
                ty,
                decorators: Vec::new(),
            }));
            let span = self.program.file(file).arena.get(variant_node).span();
            self.apply_decorator_nodes(file, variant, &variant_decorators, span);
            options.push(ty);
            variants.push((variant_name, variant));
        }

        if let Type::Union(union) = self.program.types.get_mut(id) {
            union.options = options;
            union.variants = variants;
        }

        let span = self.decl_span(decl);
        self.apply_decorator_nodes(file, id, &decorators, span);
        if !instantiated {
            self.add_namespace_member(namespace, name, id);
        }
        id
    }

    fn build_enum(&mut self, decl: NodeRef) -> TypeId {
        let file = decl.file;
        let (decorators, name_node, member_nodes) =
            match &self.program.file(file).arena.get(decl.node).kind {
                NodeKind::Enum {
                    decorators,
                    name,
                    members,
                } => (decorators.clone(), *name, members.clone()),
                _ => return self.program.error_type,
            };
        let name = self
            .program
            .file(file)
            .arena
            .identifier_atom(name_node)
            .unwrap_or(Atom::NONE);
        let namespace = self.namespace_of_decl(decl);

        let id = self.program.types.alloc(Type::Enum(EnumType {
            name,
            node: decl,
            namespace,
            members: Vec::new(),
            decorators: Vec::new(),
        }));
        self.program.decl_types.insert(decl, id);

        let mut members: Vec<(Atom, TypeId)> = Vec::new();
        for member_node in member_nodes {
            let (member_decorators, name_idx, value_idx) =
                match &self.program.file(file).arena.get(member_node).kind {
                    NodeKind::EnumMember {
                        decorators,
                        name,
                        value,
                    } => (decorators.clone(), *name, *value),
                    _ => continue,
                };
            let member_name = self.name_atom(file, name_idx);
            let value = if value_idx.is_some() {
                match self.program.file(file).arena.get(value_idx).kind.clone() {
                    NodeKind::StringLiteral { value } => Some(EnumValue::Str(value)),
                    NodeKind::NumericLiteral { text } => match text.parse::<f64>() {
                        Ok(number) => Some(EnumValue::Num(number)),
                        Err(_) => None,
                    },
                    _ => {
                        self.program.report(Diagnostic::error(
                            codes::ENUM_MEMBER_VALUE,
                            "Enum member value must be a string or numeric literal.",
                            node_target(self.program, file, value_idx),
                        ));
                        None
                    }
                }
            } else {
                None
            };
            if !member_name.is_none()
                && members.iter().any(|(existing, _)| *existing == member_name)
            {
                let message = format!(
                    "Enum already has a member named '{}'.",
                    self.program.name_text(member_name)
                );
                self.program.report(Diagnostic::error(
                    codes::DUPLICATE_SYMBOL,
                    message,
                    node_target(self.program, file, member_node),
                ));
                continue;
            }
            let member = self.program.types.alloc(Type::EnumMember(EnumMemberType {
                name: member_name,
                node: NodeRef::new(file, member_node),
                enum_type: id,
                value,
                decorators: Vec::new(),
            }));
            let span = self.program.file(file).arena.get(member_node).span();
            self.apply_decorator_nodes(file, member, &member_decorators, span);
            members.push((member_name, member));
        }

        if let Type::Enum(enum_type) = self.program.types.get_mut(id) {
            enum_type.members = members;
        }

        let span = self.decl_span(decl);
        self.apply_decorator_nodes(file, id, &decorators, span);
        self.add_namespace_member(namespace, name, id);
        id
    }

    // =========================================================================
    // Aliases
    // =========================================================================

    /// An alias resolves to the aliased type; it introduces no new type
    /// identity.
    fn build_alias(&mut self, decl: NodeRef) -> TypeId {
        let file = decl.file;
        let (name_node, value_node) = match &self.program.file(file).arena.get(decl.node).kind {
            NodeKind::Alias { name, value, .. } => (*name, *value),
            _ => return self.program.error_type,
        };
        if self.pending_decls.contains(&decl) {
            let name = self
                .program
                .file(file)
                .arena
                .identifier_atom(name_node)
                .unwrap_or(Atom::NONE);
            let message = format!(
                "Alias '{}' circularly references itself.",
                self.program.name_text(name)
            );
            self.program.report(Diagnostic::error(
                codes::CIRCULAR_ALIAS,
                message,
                node_target(self.program, file, decl.node),
            ));
            return self.program.error_type;
        }
        self.pending_decls.push(decl);
        let value = self.check_type_expression(file, value_node);
        self.pending_decls.pop();
        self.program.decl_types.insert(decl, value);

        let name = self
            .program
            .file(file)
            .arena
            .identifier_atom(name_node)
            .unwrap_or(Atom::NONE);
        let namespace = self.namespace_of_decl(decl);
        self.add_namespace_member(namespace, name, value);
        value
    }

    // =========================================================================
    // Template instantiation
    // =========================================================================

    /// Instantiate a templated declaration with concrete arguments.
    /// Memoized on the declaration and the argument identities; recursive
    /// instantiation with identical arguments reuses the in-progress
    /// placeholder, which terminates cycles.
    fn instantiate(&mut self, decl: NodeRef, args: Vec<TypeId>) -> TypeId {
        if let Some(&existing) = self.program.instantiations.get(&(decl, args.clone())) {
            return existing;
        }
        if self.instantiation_depth >= MAX_INSTANTIATION_DEPTH {
            self.program.report(Diagnostic::error(
                codes::CIRCULAR_TEMPLATE,
                "Circular template instantiation does not converge.",
                node_target(self.program, decl.file, decl.node),
            ));
            return self.program.error_type;
        }
        self.instantiation_depth += 1;

        let params = self.template_params_of(decl);
        let mut frame = FxHashMap::default();
        for (index, &param) in params.iter().enumerate() {
            if let Some(&symbol) = self.program.bindings[decl.file.0 as usize]
                .node_symbols
                .get(&param.0)
            {
                let arg = args.get(index).copied().unwrap_or(self.program.error_type);
                frame.insert(symbol, arg);
            }
        }
        self.substitutions.push(frame);

        let id = match self.program.file(decl.file).arena.get(decl.node).kind {
            NodeKind::Model { .. } => self.build_model(decl, args, true),
            NodeKind::Interface { .. } => self.build_interface(decl, args, true),
            NodeKind::Union { .. } => self.build_union(decl, args, true),
            NodeKind::Alias { value, .. } => {
                let value_ty = self.check_type_expression(decl.file, value);
                self.program.instantiations.insert((decl, args), value_ty);
                value_ty
            }
            _ => self.program.error_type,
        };

        self.substitutions.pop();
        self.instantiation_depth -= 1;
        id
    }

    fn template_param_type(&mut self, symbol: SymbolId) -> TypeId {
        let (name, node) = {
            let s = self.program.symbols.get(symbol);
            (s.name, s.node)
        };
        if let Some(&existing) = self.program.decl_types.get(&node) {
            return existing;
        }
        let id = self
            .program
            .types
            .alloc(Type::TemplateParameter(TemplateParameterType { name, node }));
        self.program.decl_types.insert(node, id);
        id
    }

    // =========================================================================
    // Type expressions
    // =========================================================================

    pub(crate) fn check_type_expression(&mut self, file: FileId, node: NodeIndex) -> TypeId {
        if node.is_none() {
            return self.program.error_type;
        }
        match self.program.file(file).arena.get(node).kind.clone() {
            NodeKind::TypeReference { .. } => self.check_type_reference(file, node),
            NodeKind::Identifier { .. } | NodeKind::MemberExpression { .. } => {
                self.check_bare_reference(file, node, &[])
            }
            NodeKind::UnionExpression { options } => {
                // Options are deduplicated by type identity.
                let mut seen = FxHashSet::default();
                let mut checked = Vec::new();
                for option in options {
                    let ty = self.check_type_expression(file, option);
                    if seen.insert(ty) {
                        checked.push(ty);
                    }
                }
                self.program.types.alloc(Type::Union(UnionType {
                    name: Atom::NONE,
                    node: NodeRef::new(file, node),
                    namespace: self.program.global_namespace,
                    options: checked,
                    variants: Vec::new(),
                    decorators: Vec::new(),
                }))
            }
            NodeKind::IntersectionExpression { options } => {
                self.check_intersection(file, node, &options)
            }
            NodeKind::ArrayExpression { element } => {
                let element_ty = self.check_type_expression(file, element);
                self.program.types.alloc(Type::Array(ArrayType {
                    node: NodeRef::new(file, node),
                    element: element_ty,
                }))
            }
            NodeKind::TupleExpression { values } => {
                let value_types = values
                    .iter()
                    .map(|&value| self.check_type_expression(file, value))
                    .collect();
                self.program.types.alloc(Type::Tuple(TupleType {
                    node: NodeRef::new(file, node),
                    values: value_types,
                }))
            }
            NodeKind::ModelExpression { members } => {
                let id = self.program.types.alloc(Type::Model(ModelType {
                    name: Atom::NONE,
                    node: NodeRef::new(file, node),
                    namespace: self.program.global_namespace,
                    properties: Vec::new(),
                    base_model: TypeId::NONE,
                    template_arguments: Vec::new(),
                    decorators: Vec::new(),
                }));
                let mut properties = Vec::new();
                self.build_member_list(file, &members, &mut properties);
                if let Some(model) = self.program.types.get_mut(id).as_model_mut() {
                    model.properties = properties;
                }
                id
            }
            NodeKind::StringLiteral { value } => self.literal_string(&value),
            NodeKind::NumericLiteral { text } => {
                let value = text.parse::<f64>().unwrap_or(0.0);
                self.literal_number(value, &text)
            }
            NodeKind::BooleanLiteral { value } => self.literal_boolean(value),
            _ => self.program.error_type,
        }
    }

    fn check_type_reference(&mut self, file: FileId, node: NodeIndex) -> TypeId {
        let (target, argument_nodes) = match &self.program.file(file).arena.get(node).kind {
            NodeKind::TypeReference { target, arguments } => (*target, arguments.clone()),
            _ => return self.program.error_type,
        };
        self.check_bare_reference(file, target, &argument_nodes)
    }

    fn check_bare_reference(
        &mut self,
        file: FileId,
        target: NodeIndex,
        argument_nodes: &[NodeIndex],
    ) -> TypeId {
        let Some(mut symbol) = self.resolve_reference_target(file, target) else {
            return self.program.error_type;
        };
        if let SymbolKind::Using { target: inner, .. } = self.program.symbols.get(symbol).kind {
            symbol = inner;
        }

        match &self.program.symbols.get(symbol).kind {
            SymbolKind::TemplateParameter => {
                if !argument_nodes.is_empty() {
                    self.program.report(Diagnostic::error(
                        codes::INVALID_TEMPLATE_ARGS,
                        "A template parameter cannot take template arguments.",
                        node_target(self.program, file, target),
                    ));
                }
                for frame in self.substitutions.iter().rev() {
                    if let Some(&substituted) = frame.get(&symbol) {
                        return substituted;
                    }
                }
                return self.template_param_type(symbol);
            }
            SymbolKind::Namespace => {
                let message = format!(
                    "Namespace '{}' cannot be used as a type.",
                    self.program.name_text(self.program.symbols.get(symbol).name)
                );
                self.program.report(Diagnostic::error(
                    codes::UNRESOLVED_REFERENCE,
                    message,
                    node_target(self.program, file, target),
                ));
                return self.program.error_type;
            }
            SymbolKind::Decorator { .. } => {
                self.program.report(Diagnostic::error(
                    codes::UNRESOLVED_REFERENCE,
                    "A decorator cannot be used as a type.",
                    node_target(self.program, file, target),
                ));
                return self.program.error_type;
            }
            SymbolKind::Using { .. } | SymbolKind::TypeDecl => {}
        }

        if let Some(&intrinsic) = self.program.intrinsics.get(&symbol) {
            if !argument_nodes.is_empty() {
                let message = format!(
                    "'{}' is not a template.",
                    self.program.name_text(self.program.symbols.get(symbol).name)
                );
                self.program.report(Diagnostic::error(
                    codes::INVALID_TEMPLATE_ARGS,
                    message,
                    node_target(self.program, file, target),
                ));
            }
            return intrinsic;
        }

        let decl = self.program.symbols.get(symbol).node;
        if decl.is_none() {
            return self.program.error_type;
        }
        let params = self.template_params_of(decl);

        if params.is_empty() {
            if !argument_nodes.is_empty() {
                let message = format!(
                    "'{}' is not a template.",
                    self.program.name_text(self.program.symbols.get(symbol).name)
                );
                self.program.report(Diagnostic::error(
                    codes::INVALID_TEMPLATE_ARGS,
                    message,
                    node_target(self.program, file, target),
                ));
            }
            return self
                .type_of_declaration(decl)
                .unwrap_or(self.program.error_type);
        }

        if argument_nodes.is_empty() {
            let message = format!(
                "'{}' is a template and requires template arguments.",
                self.program.name_text(self.program.symbols.get(symbol).name)
            );
            self.program.report(Diagnostic::error(
                codes::INVALID_TEMPLATE_ARGS,
                message,
                node_target(self.program, file, target),
            ));
            return self.program.error_type;
        }

        let mut args: Vec<TypeId> = argument_nodes
            .iter()
            .map(|&argument| self.check_type_expression(file, argument))
            .collect();
        if args.len() != params.len() {
            let message = format!(
                "Expected {} template arguments, but got {}.",
                params.len(),
                args.len()
            );
            self.program.report(Diagnostic::error(
                codes::INVALID_TEMPLATE_ARGS,
                message,
                node_target(self.program, file, target),
            ));
            args.resize(params.len(), self.program.error_type);
        }
        self.instantiate(decl, args)
    }

    /// `A & B`: a new anonymous model whose properties are the union of
    /// both sides; collisions are diagnostics.
    fn check_intersection(
        &mut self,
        file: FileId,
        node: NodeIndex,
        options: &[NodeIndex],
    ) -> TypeId {
        let id = self.program.types.alloc(Type::Model(ModelType {
            name: Atom::NONE,
            node: NodeRef::new(file, node),
            namespace: self.program.global_namespace,
            properties: Vec::new(),
            base_model: TypeId::NONE,
            template_arguments: Vec::new(),
            decorators: Vec::new(),
        }));
        let mut properties: Vec<(Atom, TypeId)> = Vec::new();
        for &option in options {
            let ty = self.check_type_expression(file, option);
            if matches!(self.program.types.get(ty), Type::Error) {
                continue;
            }
            match self.program.types.get(ty).as_model().cloned() {
                Some(model) => {
                    for (property_name, property) in model.properties {
                        if properties.iter().any(|(existing, _)| *existing == property_name) {
                            let message = format!(
                                "Intersection already has a property named '{}'.",
                                self.program.name_text(property_name)
                            );
                            self.program.report(Diagnostic::error(
                                codes::DUPLICATE_PROPERTY,
                                message,
                                node_target(self.program, file, option),
                            ));
                            continue;
                        }
                        let copy = self.clone_property(property);
                        properties.push((property_name, copy));
                    }
                }
                None => {
                    self.program.report(Diagnostic::error(
                        codes::INTERSECT_NON_MODEL,
                        "Cannot intersect non-model types.",
                        node_target(self.program, file, option),
                    ));
                }
            }
        }
        if let Some(model) = self.program.types.get_mut(id).as_model_mut() {
            model.properties = properties;
        }
        id
    }

    // =========================================================================
    // Literal interning
    // =========================================================================

    fn literal_string(&mut self, value: &str) -> TypeId {
        let key = LiteralKey::Str(value.to_string());
        if let Some(&existing) = self.program.literal_types.get(&key) {
            return existing;
        }
        let id = self
            .program
            .types
            .alloc(Type::StringLiteral(crate::checker::types::StringLiteralType {
                value: value.to_string(),
            }));
        self.program.literal_types.insert(key, id);
        id
    }

    fn literal_number(&mut self, value: f64, text: &str) -> TypeId {
        let key = LiteralKey::num(value);
        if let Some(&existing) = self.program.literal_types.get(&key) {
            return existing;
        }
        let id = self
            .program
            .types
            .alloc(Type::NumberLiteral(crate::checker::types::NumberLiteralType {
                value,
                text: text.to_string(),
            }));
        self.program.literal_types.insert(key, id);
        id
    }

    fn literal_boolean(&mut self, value: bool) -> TypeId {
        let key = LiteralKey::Bool(value);
        if let Some(&existing) = self.program.literal_types.get(&key) {
            return existing;
        }
        let id = self
            .program
            .types
            .alloc(Type::BooleanLiteral(crate::checker::types::BooleanLiteralType {
                value,
            }));
        self.program.literal_types.insert(key, id);
        id
    }

    // =========================================================================
    // Decorator application
    // =========================================================================

    /// Apply decorator annotations to a realized type, in source order.
    /// Returns false when a decorator failure aborted the declaration.
    fn apply_decorator_nodes(
        &mut self,
        file: FileId,
        target: TypeId,
        nodes: &[NodeIndex],
        target_span: Span,
    ) -> bool {
        for &node in nodes {
            let (decorator_target, argument_nodes) =
                match &self.program.file(file).arena.get(node).kind {
                    NodeKind::Decorator { target, arguments } => (*target, arguments.clone()),
                    _ => continue,
                };
            let Some(symbol) = self.resolve_decorator(file, decorator_target) else {
                continue;
            };

            let mut args = Vec::with_capacity(argument_nodes.len());
            for &argument in &argument_nodes {
                let value = match self.program.file(file).arena.get(argument).kind.clone() {
                    NodeKind::StringLiteral { value } => DecoratorArgValue::Str(value),
                    NodeKind::NumericLiteral { text } => {
                        DecoratorArgValue::Num(text.parse().unwrap_or(0.0))
                    }
                    NodeKind::BooleanLiteral { value } => DecoratorArgValue::Bool(value),
                    _ => DecoratorArgValue::Type(self.check_type_expression(file, argument)),
                };
                args.push(value);
            }

            let app = DecoratorApp {
                decorator: symbol,
                args,
                node: NodeRef::new(file, node),
            };
            if !self.invoke_decorator(file, target, app, target_span) {
                return false;
            }
        }
        true
    }

    /// Re-apply already-evaluated decorator applications (the `is` clone
    /// path) to a new target identity.
    fn apply_decorator_apps(
        &mut self,
        file: FileId,
        target: TypeId,
        apps: Vec<DecoratorApp>,
        target_span: Span,
    ) -> bool {
        for app in apps {
            if !self.invoke_decorator(file, target, app, target_span) {
                return false;
            }
        }
        true
    }

    fn invoke_decorator(
        &mut self,
        file: FileId,
        target: TypeId,
        app: DecoratorApp,
        target_span: Span,
    ) -> bool {
        let implementation = match &self.program.symbols.get(app.decorator).kind {
            SymbolKind::Decorator { implementation, .. } => implementation.clone(),
            _ => return true,
        };
        let decorator_name = self
            .program
            .name_text(self.program.symbols.get(app.decorator).name)
            .to_string();
        let args = app.args.clone();
        self.push_decorator_app(target, app);

        let mut context = DecoratorContext {
            program: &mut *self.program,
            file,
            target_span,
        };
        if let Err(message) = implementation(&mut context, target, &args) {
            // A failing decorator aborts this declaration's checking; other
            // declarations are still checked.
            let full = format!("Decorator '{}' failed: {}", decorator_name, message);
            self.program.report(Diagnostic::error(
                codes::DECORATOR_FAIL,
                full,
                crate::diagnostics::DiagnosticTarget::Span {
                    file,
                    span: target_span,
                },
            ));
            return false;
        }
        true
    }

    fn push_decorator_app(&mut self, target: TypeId, app: DecoratorApp) {
        let decorators = match self.program.types.get_mut(target) {
            Type::Namespace(t) => &mut t.decorators,
            Type::Model(t) => &mut t.decorators,
            Type::ModelProperty(t) => &mut t.decorators,
            Type::Interface(t) => &mut t.decorators,
            Type::Operation(t) => &mut t.decorators,
            Type::Enum(t) => &mut t.decorators,
            Type::EnumMember(t) => &mut t.decorators,
            Type::Union(t) => &mut t.decorators,
            Type::UnionVariant(t) => &mut t.decorators,
            _ => return,
        };
        decorators.push(app);
    }

    // =========================================================================
    // Duplicate reporting
    // =========================================================================

    /// Emit the deferred duplicate-symbol diagnostics recorded by every
    /// symbol table, one per collider.
    fn report_duplicate_symbols(&mut self) {
        let mut colliders: Vec<SymbolId> = Vec::new();
        for (_, table) in self.program.tables.iter() {
            for duplicates in table.duplicates().values() {
                colliders.extend(duplicates.iter().copied());
            }
        }
        for symbol in colliders {
            let (name, node) = {
                let s = self.program.symbols.get(symbol);
                (s.name, s.node)
            };
            let message = format!("Duplicate name: '{}'.", self.program.name_text(name));
            let target = if node.is_some() {
                node_target(self.program, node.file, node.node)
            } else {
                crate::diagnostics::DiagnosticTarget::None
            };
            self.program
                .report(Diagnostic::error(codes::DUPLICATE_SYMBOL, message, target));
        }
    }
}
