//! Type representation for the checker.
//!
//! Types live in a [`TypeArena`] and reference each other through [`TypeId`]
//! handles. The type graph admits cycles (a model may reference itself
//! transitively), so the checker allocates a type's handle before populating
//! its body; a half-built type is observable only while its declaration is
//! still being checked.
//!
//! Literal types are interned: two occurrences of the same string, number,
//! or boolean payload share one `TypeId`.

use crate::binder::{NodeRef, SymbolId};
use crate::interner::Atom;

// =============================================================================
// TypeId and arena
// =============================================================================

/// Handle to a type in the arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TypeId(pub u32);

impl TypeId {
    pub const NONE: TypeId = TypeId(u32::MAX);

    #[inline]
    pub fn is_none(&self) -> bool {
        self.0 == u32::MAX
    }

    #[inline]
    pub fn is_some(&self) -> bool {
        self.0 != u32::MAX
    }
}

/// Arena storage for the program's type graph.
#[derive(Debug, Default)]
pub struct TypeArena {
    types: Vec<Type>,
}

impl TypeArena {
    pub fn new() -> TypeArena {
        TypeArena::default()
    }

    pub fn alloc(&mut self, ty: Type) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty);
        id
    }

    #[inline]
    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id.0 as usize]
    }

    #[inline]
    pub fn get_mut(&mut self, id: TypeId) -> &mut Type {
        &mut self.types[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

// =============================================================================
// Decorator application
// =============================================================================

/// An evaluated decorator argument.
///
/// Identifiers resolve to their type, literals pass their constant value,
/// type references pass the instantiated type.
#[derive(Clone, Debug, PartialEq)]
pub enum DecoratorArgValue {
    Str(String),
    Num(f64),
    Bool(bool),
    Type(TypeId),
}

/// One decorator applied to a type, with its evaluated arguments.
#[derive(Clone, Debug)]
pub struct DecoratorApp {
    /// The decorator symbol (carries the callable handle).
    pub decorator: SymbolId,
    pub args: Vec<DecoratorArgValue>,
    /// The `@...` node this application came from.
    pub node: NodeRef,
}

// =============================================================================
// Type variants
// =============================================================================

/// A type constructed by the checker.
#[derive(Clone, Debug)]
pub enum Type {
    Namespace(NamespaceType),
    Model(ModelType),
    ModelProperty(ModelPropertyType),
    Interface(InterfaceType),
    Operation(OperationType),
    Enum(EnumType),
    EnumMember(EnumMemberType),
    Union(UnionType),
    UnionVariant(UnionVariantType),
    Tuple(TupleType),
    Array(ArrayType),
    Intrinsic(IntrinsicType),
    StringLiteral(StringLiteralType),
    NumberLiteral(NumberLiteralType),
    BooleanLiteral(BooleanLiteralType),
    TemplateParameter(TemplateParameterType),
    /// Placeholder produced after an error so checking can continue.
    Error,
}

impl Type {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Type::Namespace(_) => "Namespace",
            Type::Model(_) => "Model",
            Type::ModelProperty(_) => "ModelProperty",
            Type::Interface(_) => "Interface",
            Type::Operation(_) => "Operation",
            Type::Enum(_) => "Enum",
            Type::EnumMember(_) => "EnumMember",
            Type::Union(_) => "Union",
            Type::UnionVariant(_) => "UnionVariant",
            Type::Tuple(_) => "Tuple",
            Type::Array(_) => "Array",
            Type::Intrinsic(_) => "Intrinsic",
            Type::StringLiteral(_) => "String",
            Type::NumberLiteral(_) => "Number",
            Type::BooleanLiteral(_) => "Boolean",
            Type::TemplateParameter(_) => "TemplateParameter",
            Type::Error => "Error",
        }
    }

    pub fn as_model(&self) -> Option<&ModelType> {
        match self {
            Type::Model(model) => Some(model),
            _ => None,
        }
    }

    pub fn as_model_mut(&mut self) -> Option<&mut ModelType> {
        match self {
            Type::Model(model) => Some(model),
            _ => None,
        }
    }

    pub fn as_property(&self) -> Option<&ModelPropertyType> {
        match self {
            Type::ModelProperty(property) => Some(property),
            _ => None,
        }
    }

    pub fn as_namespace(&self) -> Option<&NamespaceType> {
        match self {
            Type::Namespace(namespace) => Some(namespace),
            _ => None,
        }
    }

    pub fn as_namespace_mut(&mut self) -> Option<&mut NamespaceType> {
        match self {
            Type::Namespace(namespace) => Some(namespace),
            _ => None,
        }
    }

    pub fn as_interface(&self) -> Option<&InterfaceType> {
        match self {
            Type::Interface(interface) => Some(interface),
            _ => None,
        }
    }

    pub fn as_intrinsic(&self) -> Option<&IntrinsicType> {
        match self {
            Type::Intrinsic(intrinsic) => Some(intrinsic),
            _ => None,
        }
    }
}

/// A namespace type: the merged view of every declaration sharing one
/// fully-qualified name.
#[derive(Clone, Debug)]
pub struct NamespaceType {
    pub name: Atom,
    /// First declaration site; `NodeRef::NONE` for synthetic namespaces.
    pub node: NodeRef,
    /// Enclosing namespace type.
    pub namespace: TypeId,
    /// Members in checking order.
    pub members: Vec<(Atom, TypeId)>,
    pub decorators: Vec<DecoratorApp>,
}

impl NamespaceType {
    pub fn member(&self, name: Atom) -> Option<TypeId> {
        self.members
            .iter()
            .find(|(member, _)| *member == name)
            .map(|(_, id)| *id)
    }
}

/// A model: a record with ordered, named properties.
#[derive(Clone, Debug)]
pub struct ModelType {
    /// `Atom::NONE` for anonymous models (expressions, operation params).
    pub name: Atom,
    pub node: NodeRef,
    pub namespace: TypeId,
    /// Properties in declaration order.
    pub properties: Vec<(Atom, TypeId)>,
    pub base_model: TypeId,
    /// Arguments this model was instantiated with, empty otherwise.
    pub template_arguments: Vec<TypeId>,
    pub decorators: Vec<DecoratorApp>,
}

impl ModelType {
    pub fn property(&self, name: Atom) -> Option<TypeId> {
        self.properties
            .iter()
            .find(|(property, _)| *property == name)
            .map(|(_, id)| *id)
    }
}

/// A property of a model.
#[derive(Clone, Debug)]
pub struct ModelPropertyType {
    pub name: Atom,
    pub node: NodeRef,
    /// The declared type.
    pub ty: TypeId,
    pub optional: bool,
    /// Type of the default value, `TypeId::NONE` when absent.
    pub default: TypeId,
    /// The property this one was copied from by spread or `is`, preserving
    /// per-property decoration of the original source.
    pub source_property: TypeId,
    pub decorators: Vec<DecoratorApp>,
}

/// An interface: a bag of operations, possibly mixing in other interfaces.
#[derive(Clone, Debug)]
pub struct InterfaceType {
    pub name: Atom,
    pub node: NodeRef,
    pub namespace: TypeId,
    /// Operations in order: mixed-in interfaces first, then own members.
    pub operations: Vec<(Atom, TypeId)>,
    pub mixes: Vec<TypeId>,
    pub decorators: Vec<DecoratorApp>,
}

/// An operation with a parameters model and a return type.
#[derive(Clone, Debug)]
pub struct OperationType {
    pub name: Atom,
    pub node: NodeRef,
    /// Owning interface or namespace.
    pub container: TypeId,
    /// Anonymous model holding the parameters.
    pub parameters: TypeId,
    pub return_type: TypeId,
    pub decorators: Vec<DecoratorApp>,
}

#[derive(Clone, Debug)]
pub struct EnumType {
    pub name: Atom,
    pub node: NodeRef,
    pub namespace: TypeId,
    pub members: Vec<(Atom, TypeId)>,
    pub decorators: Vec<DecoratorApp>,
}

/// The literal value of an enum member.
#[derive(Clone, Debug, PartialEq)]
pub enum EnumValue {
    Str(String),
    Num(f64),
}

#[derive(Clone, Debug)]
pub struct EnumMemberType {
    pub name: Atom,
    pub node: NodeRef,
    pub enum_type: TypeId,
    pub value: Option<EnumValue>,
    pub decorators: Vec<DecoratorApp>,
}

/// A union: named variants for `union` statements, bare options for `A | B`
/// expressions (deduplicated by type identity).
#[derive(Clone, Debug)]
pub struct UnionType {
    /// `Atom::NONE` for expression unions.
    pub name: Atom,
    pub node: NodeRef,
    pub namespace: TypeId,
    pub options: Vec<TypeId>,
    /// Named variants, empty for expression unions.
    pub variants: Vec<(Atom, TypeId)>,
    pub decorators: Vec<DecoratorApp>,
}

#[derive(Clone, Debug)]
pub struct UnionVariantType {
    pub name: Atom,
    pub node: NodeRef,
    pub union: TypeId,
    pub ty: TypeId,
    pub decorators: Vec<DecoratorApp>,
}

#[derive(Clone, Debug)]
pub struct TupleType {
    pub node: NodeRef,
    pub values: Vec<TypeId>,
}

#[derive(Clone, Debug)]
pub struct ArrayType {
    pub node: NodeRef,
    pub element: TypeId,
}

/// A built-in type mapping to a primitive of downstream schemas.
#[derive(Clone, Debug)]
pub struct IntrinsicType {
    pub name: &'static str,
}

#[derive(Clone, Debug)]
pub struct StringLiteralType {
    pub value: String,
}

#[derive(Clone, Debug)]
pub struct NumberLiteralType {
    pub value: f64,
    /// The literal as written.
    pub text: String,
}

#[derive(Clone, Debug)]
pub struct BooleanLiteralType {
    pub value: bool,
}

#[derive(Clone, Debug)]
pub struct TemplateParameterType {
    pub name: Atom,
    pub node: NodeRef,
}

// =============================================================================
// Literal interning
// =============================================================================

/// Pool key for literal types: kind plus payload. Numbers are keyed by
/// their bit pattern so `1.0` and `1.00` written the same way compare equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LiteralKey {
    Str(String),
    Num(u64),
    Bool(bool),
}

impl LiteralKey {
    pub fn num(value: f64) -> LiteralKey {
        LiteralKey::Num(value.to_bits())
    }
}

// =============================================================================
// Intrinsics
// =============================================================================

/// Built-in types seeded into the `Cadl` namespace, which is implicitly
/// `using`d everywhere.
pub const INTRINSIC_NAMES: &[&str] = &[
    "string",
    "boolean",
    "bytes",
    "int8",
    "int16",
    "int32",
    "int64",
    "safeint",
    "float32",
    "float64",
    "plainDate",
    "plainTime",
    "zonedDateTime",
    "duration",
    "null",
];

/// Whether an intrinsic name denotes a numeric type.
pub fn intrinsic_is_numeric(name: &str) -> bool {
    matches!(
        name,
        "int8" | "int16" | "int32" | "int64" | "safeint" | "float32" | "float64"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_handles() {
        let mut arena = TypeArena::new();
        let a = arena.alloc(Type::Intrinsic(IntrinsicType { name: "string" }));
        let b = arena.alloc(Type::BooleanLiteral(BooleanLiteralType { value: true }));
        assert_ne!(a, b);
        assert_eq!(arena.get(a).kind_name(), "Intrinsic");
        assert_eq!(arena.get(b).kind_name(), "Boolean");
    }

    #[test]
    fn test_literal_key_by_bits() {
        assert_eq!(LiteralKey::num(1.5), LiteralKey::num(1.5));
        assert_ne!(LiteralKey::num(1.5), LiteralKey::num(2.5));
        assert_ne!(
            LiteralKey::Str("1".to_string()),
            LiteralKey::Bool(true)
        );
    }

    #[test]
    fn test_numeric_intrinsics() {
        assert!(intrinsic_is_numeric("int32"));
        assert!(intrinsic_is_numeric("float64"));
        assert!(!intrinsic_is_numeric("string"));
        assert!(!intrinsic_is_numeric("plainDate"));
    }
}
