//! cadlc - compiler front-end for the CADL interface description language.
//!
//! CADL programs define APIs: models, enums, unions, interfaces,
//! operations, and namespaces, decorated with metadata that downstream
//! emitters consume. This crate implements the core pipeline:
//!
//! ```text
//! bytes -> scanner -> tokens -> parser -> syntax tree -> binder
//!       -> program loader (imports) -> checker -> type graph
//!       -> decorator callbacks -> program object
//! ```
//!
//! The core performs no I/O of its own; it is driven by a
//! [`program::host::CompilerHost`] supplying file bytes and the reflected
//! exports of external decorator modules. The finished
//! [`program::Program`] carries the source-file map, the type graph rooted
//! at the global namespace, the diagnostics, and the state registry that
//! decorators write into.

pub mod binder;
pub mod char_codes;
pub mod checker;
pub mod cli;
pub mod diagnostics;
pub mod interner;
pub mod parser;
pub mod program;
pub mod scanner;
pub mod source_file;
pub mod span;

pub use diagnostics::{Diagnostic, DiagnosticBag, Severity};
pub use program::{compile, CompilerOptions, Program};
pub use source_file::{FileId, SourceFile};
pub use span::Span;
