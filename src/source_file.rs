//! SourceFile - Owns source text and provides span decoding
//!
//! The SourceFile struct owns the text of one loaded CADL file and keeps a
//! precomputed line-starts table so diagnostics can be rendered as
//! line/column pairs. Positions are byte offsets; spans are half-open
//! `[pos, end)` ranges.

use crate::span::Span;
use std::sync::Arc;

/// Identifier for a loaded source file within a program.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize)]
pub struct FileId(pub u32);

impl FileId {
    pub const NONE: FileId = FileId(u32::MAX);

    #[inline]
    pub fn is_none(&self) -> bool {
        self.0 == u32::MAX
    }
}

/// A line/column position, both zero-indexed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineCol {
    pub line: u32,
    pub col: u32,
}

/// A source file that owns its text content.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Stable path of the file (as resolved by the host).
    path: String,
    /// The full source text.
    text: Arc<str>,
    /// Byte offset of the start of each line.
    line_starts: Vec<u32>,
}

impl SourceFile {
    /// Create a new SourceFile from a path and source text.
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        let text: String = text.into();
        let line_starts = compute_line_starts(&text);
        SourceFile {
            path: path.into(),
            text: Arc::from(text.into_boxed_str()),
            line_starts,
        }
    }

    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Shared handle to the text, for handing to the scanner without cloning.
    #[inline]
    pub fn text_arc(&self) -> Arc<str> {
        Arc::clone(&self.text)
    }

    #[inline]
    pub fn len(&self) -> u32 {
        self.text.len() as u32
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Get a slice of the source text, clamped to bounds.
    #[inline]
    pub fn slice(&self, span: Span) -> &str {
        span.slice_safe(&self.text)
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Convert a byte offset to a zero-indexed line/column pair.
    pub fn line_col(&self, offset: u32) -> LineCol {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        LineCol {
            line: line as u32,
            col: offset - self.line_starts[line],
        }
    }

    /// Byte offset of the start of the given zero-indexed line.
    pub fn line_start(&self, line: u32) -> Option<u32> {
        self.line_starts.get(line as usize).copied()
    }
}

/// Line endings are `\n`, `\r\n`, or a lone `\r`.
fn compute_line_starts(text: &str) -> Vec<u32> {
    let mut starts = vec![0u32];
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\n' => {
                starts.push((i + 1) as u32);
                i += 1;
            }
            b'\r' => {
                if bytes.get(i + 1) == Some(&b'\n') {
                    i += 2;
                } else {
                    i += 1;
                }
                starts.push(i as u32);
            }
            _ => i += 1,
        }
    }
    starts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basics() {
        let source = SourceFile::new("main.cadl", "model A {}");
        assert_eq!(source.path(), "main.cadl");
        assert_eq!(source.text(), "model A {}");
        assert_eq!(source.len(), 10);
    }

    #[test]
    fn test_line_starts_mixed_endings() {
        let source = SourceFile::new("f.cadl", "a\nb\r\nc\rd");
        assert_eq!(source.line_count(), 4);
        assert_eq!(source.line_col(0), LineCol { line: 0, col: 0 });
        assert_eq!(source.line_col(2), LineCol { line: 1, col: 0 });
        assert_eq!(source.line_col(5), LineCol { line: 2, col: 0 });
        assert_eq!(source.line_col(7), LineCol { line: 3, col: 0 });
    }

    #[test]
    fn test_line_col_mid_line() {
        let source = SourceFile::new("f.cadl", "model A {}\nmodel B {}");
        let pos = source.text().find('B').unwrap() as u32;
        assert_eq!(source.line_col(pos), LineCol { line: 1, col: 6 });
    }

    #[test]
    fn test_slice() {
        let source = SourceFile::new("f.cadl", "hello world");
        assert_eq!(source.slice(Span::new(6, 11)), "world");
        assert_eq!(source.slice(Span::new(6, 100)), "world");
    }
}
