//! String interner for identifier deduplication.
//!
//! Identifiers are interned into `Atom`s so that name comparison during
//! binding and checking is an integer compare instead of a string compare.
//! The empty string is always `Atom::NONE`.

use rustc_hash::FxHashMap;
use serde::Serialize;

/// An interned string handle. Copyable, comparable in O(1).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Atom(pub u32);

impl Atom {
    /// The atom of the empty string.
    pub const NONE: Atom = Atom(0);

    #[inline]
    pub fn none() -> Atom {
        Atom::NONE
    }

    #[inline]
    pub fn is_none(&self) -> bool {
        self.0 == 0
    }
}

impl Default for Atom {
    fn default() -> Self {
        Atom::NONE
    }
}

/// Interner mapping strings to atoms and back.
#[derive(Debug, Clone)]
pub struct Interner {
    strings: Vec<Box<str>>,
    index: FxHashMap<Box<str>, Atom>,
}

impl Interner {
    pub fn new() -> Self {
        // Slot 0 is reserved for the empty string so Atom::NONE resolves to "".
        Interner {
            strings: vec![Box::from("")],
            index: FxHashMap::default(),
        }
    }

    /// Intern a string, returning its atom. Interning the empty string
    /// returns `Atom::NONE`.
    pub fn intern(&mut self, text: &str) -> Atom {
        if text.is_empty() {
            return Atom::NONE;
        }
        if let Some(&atom) = self.index.get(text) {
            return atom;
        }
        let atom = Atom(self.strings.len() as u32);
        let boxed: Box<str> = Box::from(text);
        self.strings.push(boxed.clone());
        self.index.insert(boxed, atom);
        atom
    }

    /// Resolve an atom back to its string.
    pub fn resolve(&self, atom: Atom) -> &str {
        &self.strings[atom.0 as usize]
    }

    /// Look up an atom without interning.
    pub fn lookup(&self, text: &str) -> Option<Atom> {
        if text.is_empty() {
            return Some(Atom::NONE);
        }
        self.index.get(text).copied()
    }

    /// Pre-intern the language keywords and common intrinsic names so hot
    /// paths never allocate for them.
    pub fn intern_common(&mut self) {
        for word in [
            "import",
            "model",
            "namespace",
            "using",
            "op",
            "interface",
            "union",
            "enum",
            "alias",
            "extends",
            "is",
            "true",
            "false",
            "mixes",
            "suppress",
            "Cadl",
            "string",
            "int32",
            "int64",
            "boolean",
            "bytes",
        ] {
            self.intern(word);
        }
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        // Slot 0 is always present.
        self.strings.len() <= 1
    }
}

impl Default for Interner {
    fn default() -> Self {
        Interner::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_basic() {
        let mut interner = Interner::new();
        let a1 = interner.intern("hello");
        let a2 = interner.intern("hello");
        let a3 = interner.intern("world");

        assert_eq!(a1, a2, "Same string should return same atom");
        assert_ne!(a1, a3, "Different strings should return different atoms");
        assert_eq!(interner.resolve(a1), "hello");
        assert_eq!(interner.resolve(a3), "world");
    }

    #[test]
    fn test_empty_string() {
        let mut interner = Interner::new();
        let empty = interner.intern("");
        assert_eq!(empty, Atom::NONE);
        assert!(empty.is_none());
        assert_eq!(interner.resolve(empty), "");
    }

    #[test]
    fn test_intern_common() {
        let mut interner = Interner::new();
        interner.intern_common();

        let model = interner.intern("model");
        let using = interner.intern("using");
        assert_ne!(model, using);
        assert_eq!(interner.resolve(model), "model");
        assert_eq!(interner.resolve(using), "using");
    }

    #[test]
    fn test_lookup_without_intern() {
        let mut interner = Interner::new();
        assert_eq!(interner.lookup("nope"), None);
        let atom = interner.intern("yep");
        assert_eq!(interner.lookup("yep"), Some(atom));
    }

    #[test]
    fn test_atom_copy() {
        let mut interner = Interner::new();
        let a1 = interner.intern("test");
        let a2 = a1;
        assert_eq!(a1, a2);
    }
}
