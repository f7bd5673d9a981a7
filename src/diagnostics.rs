//! Diagnostic infrastructure
//!
//! Collecting and formatting compilation errors and warnings. Diagnostics
//! carry a stable string code, a severity, a message (optionally produced
//! from a template with named arguments), and a target: a syntax node, a
//! raw span, or nothing.
//!
//! Phase-local diagnostics (scanner, parser) use [`ParseDiagnostic`], which
//! has no file identity yet; the program converts them into [`Diagnostic`]s
//! once the file is registered. All diagnostics funnel into the program's
//! single [`DiagnosticBag`]; suppression is consulted only there.

use crate::parser::NodeIndex;
use crate::source_file::{FileId, SourceFile};
use crate::span::Span;
use serde::Serialize;
use serde_json::json;
use std::fmt;

// =============================================================================
// Severity
// =============================================================================

/// The severity level of a diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    pub fn name(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Severity::Error)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// Diagnostic codes
// =============================================================================

/// Stable diagnostic codes, grouped by the phase that emits them.
pub mod codes {
    // Parse-level
    pub const MISSING_TOKEN: &str = "missing-token";
    pub const UNKNOWN_DIRECTIVE: &str = "unknown-directive";
    pub const RESERVED_IDENTIFIER: &str = "reserved-identifier-used";
    pub const UNTERMINATED_LITERAL: &str = "unterminated-literal";
    pub const UNTERMINATED_COMMENT: &str = "unterminated-comment";
    pub const INVALID_ESCAPE: &str = "invalid-escape";
    pub const TRAILING_DELIMITER: &str = "trailing-delimiter-disallowed";
    pub const INVALID_DECORATOR_LOCATION: &str = "invalid-decorator-location";
    pub const INVALID_DIRECTIVE_LOCATION: &str = "invalid-directive-location";
    pub const BLOCKLESS_NAMESPACE_FIRST: &str = "blockless-namespace-first";
    pub const MULTIPLE_BLOCKLESS: &str = "multiple-blockless-namespace";
    pub const IMPORTS_FIRST: &str = "imports-first";

    // Load-level
    pub const FILE_NOT_FOUND: &str = "file-not-found";
    pub const IO_ERROR: &str = "io-error";
    pub const LIBRARY_NOT_FOUND: &str = "library-not-found";
    pub const INVALID_IMPORT: &str = "invalid-import";
    pub const COMPILER_VERSION_MISMATCH: &str = "compiler-version-mismatch";
    pub const DYNAMIC_IMPORT_IN_EVAL: &str = "dynamic-import-in-eval";
    pub const INVALID_EMITTER: &str = "invalid-emitter";

    // Bind-level
    pub const DUPLICATE_SYMBOL: &str = "duplicate-symbol";
    pub const DUPLICATE_USING: &str = "duplicate-using";

    // Check-level
    pub const UNRESOLVED_REFERENCE: &str = "unresolved-reference";
    pub const AMBIGUOUS_REFERENCE: &str = "ambiguous-reference";
    pub const RECURSIVE_BASE: &str = "recursive-base";
    pub const DEFAULT_TYPE_MISMATCH: &str = "default-type-mismatch";
    pub const DEFAULT_ON_REQUIRED: &str = "default-on-required";
    pub const DUPLICATE_PROPERTY: &str = "duplicate-property";
    pub const INVALID_DECORATOR_TARGET: &str = "invalid-decorator-target";
    pub const INVALID_DECORATOR_ARGUMENT: &str = "invalid-decorator-argument-type";
    pub const CIRCULAR_TEMPLATE: &str = "circular-template-instantiation";
    pub const CIRCULAR_ALIAS: &str = "circular-alias";
    pub const INVALID_TEMPLATE_ARGS: &str = "invalid-template-args";
    pub const ENUM_MEMBER_VALUE: &str = "enum-member-value";
    pub const DECORATOR_FAIL: &str = "decorator-fail";
    pub const SPREAD_MODEL: &str = "spread-model";
    pub const EXTEND_MODEL: &str = "extend-model";
    pub const IS_MODEL: &str = "is-model";
    pub const INTERSECT_NON_MODEL: &str = "intersect-non-model";
    pub const MIXES_INTERFACE: &str = "mixes-interface";

    // Meta
    pub const SUPPRESS_ERROR: &str = "suppress-error";
}

// =============================================================================
// Targets
// =============================================================================

/// What a diagnostic points at.
#[derive(Clone, Debug)]
pub enum DiagnosticTarget {
    /// A syntax node; `span` is resolved from the node when the diagnostic
    /// enters the program sink so rendering never needs the arena.
    Node {
        file: FileId,
        node: NodeIndex,
        span: Span,
    },
    /// A raw span inside a file.
    Span { file: FileId, span: Span },
    /// No source location (e.g. load failures before any file exists).
    None,
}

impl DiagnosticTarget {
    pub fn file(&self) -> Option<FileId> {
        match self {
            DiagnosticTarget::Node { file, .. } | DiagnosticTarget::Span { file, .. } => {
                Some(*file)
            }
            DiagnosticTarget::None => None,
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            DiagnosticTarget::Node { span, .. } | DiagnosticTarget::Span { span, .. } => {
                Some(*span)
            }
            DiagnosticTarget::None => None,
        }
    }
}

// =============================================================================
// Diagnostic
// =============================================================================

/// A diagnostic record with code, severity, message, and target.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub code: &'static str,
    pub severity: Severity,
    pub message: String,
    pub target: DiagnosticTarget,
    /// Named arguments the message was formatted with, retained for LSP
    /// consumers.
    pub format_args: Vec<(String, String)>,
}

impl Diagnostic {
    pub fn new(
        code: &'static str,
        severity: Severity,
        message: impl Into<String>,
        target: DiagnosticTarget,
    ) -> Self {
        Diagnostic {
            code,
            severity,
            message: message.into(),
            target,
            format_args: Vec::new(),
        }
    }

    pub fn error(code: &'static str, message: impl Into<String>, target: DiagnosticTarget) -> Self {
        Self::new(code, Severity::Error, message, target)
    }

    pub fn warning(
        code: &'static str,
        message: impl Into<String>,
        target: DiagnosticTarget,
    ) -> Self {
        Self::new(code, Severity::Warning, message, target)
    }

    /// Build a diagnostic from a `{name}`-templated message.
    pub fn templated(
        code: &'static str,
        severity: Severity,
        template: &str,
        args: &[(&str, &str)],
        target: DiagnosticTarget,
    ) -> Self {
        let mut diag = Self::new(code, severity, format_message(template, args), target);
        diag.format_args = args
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        diag
    }

    pub fn is_error(&self) -> bool {
        self.severity.is_error()
    }

    /// Format the diagnostic for terminal display:
    /// `main.cadl(3,7): error CADL duplicate-symbol: ...`
    pub fn format(&self, source: Option<&SourceFile>) -> String {
        match (&self.target, source) {
            (DiagnosticTarget::None, _) | (_, None) => {
                format!("{} CADL {}: {}", self.severity, self.code, self.message)
            }
            (target, Some(source)) => {
                let span = target.span().unwrap_or_default();
                let pos = source.line_col(span.start);
                format!(
                    "{}({},{}): {} CADL {}: {}",
                    source.path(),
                    pos.line + 1,
                    pos.col + 1,
                    self.severity,
                    self.code,
                    self.message
                )
            }
        }
    }

    /// The JSON shape consumed by language-server front-ends.
    pub fn to_json(&self, path_of: impl Fn(FileId) -> String) -> serde_json::Value {
        let target = match &self.target {
            DiagnosticTarget::None => json!("no-target"),
            t => {
                let span = t.span().unwrap_or_default();
                json!({
                    "file": path_of(t.file().unwrap_or(FileId::NONE)),
                    "pos": span.start,
                    "end": span.end,
                })
            }
        };
        let args: serde_json::Map<String, serde_json::Value> = self
            .format_args
            .iter()
            .map(|(k, v)| (k.clone(), json!(v)))
            .collect();
        json!({
            "code": self.code,
            "severity": self.severity.name(),
            "message": self.message,
            "target": target,
            "format_args": args,
        })
    }
}

// =============================================================================
// Phase-local diagnostics
// =============================================================================

/// A diagnostic produced by the scanner or parser before the file has an
/// identity in the program. Converted to a [`Diagnostic`] at load time.
#[derive(Clone, Debug)]
pub struct ParseDiagnostic {
    pub code: &'static str,
    pub severity: Severity,
    pub span: Span,
    pub message: String,
}

impl ParseDiagnostic {
    pub fn error(code: &'static str, span: Span, message: impl Into<String>) -> Self {
        ParseDiagnostic {
            code,
            severity: Severity::Error,
            span,
            message: message.into(),
        }
    }

    pub fn warning(code: &'static str, span: Span, message: impl Into<String>) -> Self {
        ParseDiagnostic {
            code,
            severity: Severity::Warning,
            span,
            message: message.into(),
        }
    }

    pub fn into_diagnostic(self, file: FileId) -> Diagnostic {
        Diagnostic::new(
            self.code,
            self.severity,
            self.message,
            DiagnosticTarget::Span {
                file,
                span: self.span,
            },
        )
    }
}

// =============================================================================
// DiagnosticBag
// =============================================================================

/// A push-only collection of diagnostics that preserves emission order.
#[derive(Clone, Debug, Default)]
pub struct DiagnosticBag {
    diagnostics: Vec<Diagnostic>,
    error_count: usize,
    warning_count: usize,
}

impl DiagnosticBag {
    pub fn new() -> Self {
        DiagnosticBag::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Error => self.error_count += 1,
            Severity::Warning => self.warning_count += 1,
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn warning_count(&self) -> usize {
        self.warning_count
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Diagnostics with a given code, mostly used by tests.
    pub fn by_code<'a>(&'a self, code: &'a str) -> impl Iterator<Item = &'a Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.code == code)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }
}

impl<'a> IntoIterator for &'a DiagnosticBag {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.diagnostics.iter()
    }
}

// =============================================================================
// Message templating
// =============================================================================

/// Replace `{name}` placeholders with the provided named arguments.
pub fn format_message(template: &str, args: &[(&str, &str)]) -> String {
    let mut result = template.to_string();
    for (name, value) in args {
        result = result.replace(&format!("{{{}}}", name), value);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_message() {
        let msg = format_message(
            "Model type '{name}' recursively references itself as a base type.",
            &[("name", "A")],
        );
        assert_eq!(
            msg,
            "Model type 'A' recursively references itself as a base type."
        );
    }

    #[test]
    fn test_bag_counts() {
        let mut bag = DiagnosticBag::new();
        assert!(!bag.has_errors());
        bag.push(Diagnostic::error(
            codes::UNRESOLVED_REFERENCE,
            "Unknown identifier foo",
            DiagnosticTarget::None,
        ));
        bag.push(Diagnostic::warning(
            codes::TRAILING_DELIMITER,
            "Trailing comma",
            DiagnosticTarget::None,
        ));
        assert!(bag.has_errors());
        assert_eq!(bag.error_count(), 1);
        assert_eq!(bag.warning_count(), 1);
        assert_eq!(bag.by_code(codes::UNRESOLVED_REFERENCE).count(), 1);
    }

    #[test]
    fn test_diagnostic_format_with_source() {
        let source = SourceFile::new("test.cadl", "model A {}");
        let diag = Diagnostic::error(
            codes::DUPLICATE_SYMBOL,
            "Duplicate name: A",
            DiagnosticTarget::Span {
                file: FileId(0),
                span: Span::new(6, 7),
            },
        );
        let formatted = diag.format(Some(&source));
        assert!(formatted.contains("test.cadl(1,7)"));
        assert!(formatted.contains("error CADL duplicate-symbol"));
    }

    #[test]
    fn test_json_shape() {
        let diag = Diagnostic::templated(
            codes::DEFAULT_TYPE_MISMATCH,
            Severity::Error,
            "Default must be a {kind}",
            &[("kind", "number")],
            DiagnosticTarget::Span {
                file: FileId(0),
                span: Span::new(1, 4),
            },
        );
        let value = diag.to_json(|_| "main.cadl".to_string());
        assert_eq!(value["code"], "default-type-mismatch");
        assert_eq!(value["severity"], "error");
        assert_eq!(value["target"]["file"], "main.cadl");
        assert_eq!(value["target"]["pos"], 1);
        assert_eq!(value["format_args"]["kind"], "number");
    }

    #[test]
    fn test_no_target_json() {
        let diag = Diagnostic::error(
            codes::FILE_NOT_FOUND,
            "File not found: x.cadl",
            DiagnosticTarget::None,
        );
        let value = diag.to_json(|_| unreachable!("no file to resolve"));
        assert_eq!(value["target"], "no-target");
    }
}
