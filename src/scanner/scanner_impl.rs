//! Scanner implementation - the lexical analyzer for CADL.
//!
//! Tokenizes CADL source text. Positions are byte offsets into the UTF-8
//! source; for ASCII (the vast majority of CADL input) byte position equals
//! character position.
//!
//! Malformed strings and unterminated comments are reported as diagnostics
//! but always yield a token, so the parser never stalls on bad input.

use crate::char_codes::CharacterCodes;
use crate::diagnostics::{codes, ParseDiagnostic};
use crate::scanner::{text_to_keyword, TokenKind};
use crate::span::Span;
use std::sync::Arc;

// =============================================================================
// Token flags
// =============================================================================

/// Flags describing properties of the current token.
pub mod token_flags {
    pub const NONE: u32 = 0;
    pub const PRECEDING_LINE_BREAK: u32 = 1 << 0;
    pub const UNTERMINATED: u32 = 1 << 1;
    pub const HAS_INVALID_ESCAPE: u32 = 1 << 2;
}

// =============================================================================
// Scanner
// =============================================================================

/// A snapshot of scanner state for look-ahead.
#[derive(Clone)]
pub struct ScannerSnapshot {
    pos: usize,
    full_start_pos: usize,
    token_start: usize,
    token: TokenKind,
    token_value: String,
    token_flags: u32,
    diagnostics_len: usize,
}

/// The scanner state holding the current position and token information.
pub struct Scanner {
    /// Source text, shared with the source file so no copy is made.
    source: Arc<str>,
    /// Current byte position.
    pos: usize,
    /// End byte position.
    end: usize,
    /// Start of the current token including leading trivia.
    full_start_pos: usize,
    /// Start of the current token excluding trivia.
    token_start: usize,
    /// Current token kind.
    token: TokenKind,
    /// Cooked value of the current token (identifier text, decoded string).
    token_value: String,
    /// Token flags.
    token_flags: u32,
    /// Whether trivia is skipped rather than returned as tokens.
    skip_trivia: bool,
    /// Whether newline counts as trivia. The parser clears this while
    /// parsing `#` directives, which are newline-terminated.
    newline_is_trivia: bool,
    /// Diagnostics produced while scanning (malformed strings, unterminated
    /// comments). Drained by the parser.
    diagnostics: Vec<ParseDiagnostic>,
}

impl Scanner {
    /// Create a new scanner over the given text.
    pub fn new(source: Arc<str>, skip_trivia: bool) -> Scanner {
        let end = source.len();
        Scanner {
            source,
            pos: 0,
            end,
            full_start_pos: 0,
            token_start: 0,
            token: TokenKind::Unknown,
            token_value: String::new(),
            token_flags: 0,
            skip_trivia,
            newline_is_trivia: true,
            diagnostics: Vec::new(),
        }
    }

    /// Get the current token kind.
    #[inline]
    pub fn token(&self) -> TokenKind {
        self.token
    }

    /// Get the start position of the current token (excluding trivia).
    #[inline]
    pub fn token_start(&self) -> u32 {
        self.token_start as u32
    }

    /// Get the end position of the current token.
    #[inline]
    pub fn token_end(&self) -> u32 {
        self.pos as u32
    }

    /// Get the span of the current token.
    #[inline]
    pub fn token_span(&self) -> Span {
        Span::new(self.token_start as u32, self.pos as u32)
    }

    /// Get the current token's cooked value.
    #[inline]
    pub fn token_value(&self) -> &str {
        &self.token_value
    }

    /// Get the current token's raw source text.
    pub fn token_text(&self) -> &str {
        &self.source[self.token_start..self.pos]
    }

    /// Check if a line break precedes the current token.
    pub fn has_preceding_line_break(&self) -> bool {
        (self.token_flags & token_flags::PRECEDING_LINE_BREAK) != 0
    }

    /// Check if the current token is unterminated.
    pub fn is_unterminated(&self) -> bool {
        (self.token_flags & token_flags::UNTERMINATED) != 0
    }

    /// Control whether newline is treated as trivia. While disabled, `scan`
    /// returns `TokenKind::NewLine` tokens even in skip-trivia mode.
    pub fn set_newline_is_trivia(&mut self, value: bool) {
        self.newline_is_trivia = value;
    }

    /// Take the diagnostics accumulated so far.
    pub fn take_diagnostics(&mut self) -> Vec<ParseDiagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Capture the current state for look-ahead.
    pub fn snapshot(&self) -> ScannerSnapshot {
        ScannerSnapshot {
            pos: self.pos,
            full_start_pos: self.full_start_pos,
            token_start: self.token_start,
            token: self.token,
            token_value: self.token_value.clone(),
            token_flags: self.token_flags,
            diagnostics_len: self.diagnostics.len(),
        }
    }

    /// Rewind to a previously captured state, dropping any diagnostics
    /// produced since.
    pub fn restore(&mut self, snapshot: ScannerSnapshot) {
        self.pos = snapshot.pos;
        self.full_start_pos = snapshot.full_start_pos;
        self.token_start = snapshot.token_start;
        self.token = snapshot.token;
        self.token_value = snapshot.token_value;
        self.token_flags = snapshot.token_flags;
        self.diagnostics.truncate(snapshot.diagnostics_len);
    }

    fn error(&mut self, code: &'static str, span: Span, message: impl Into<String>) {
        self.diagnostics.push(ParseDiagnostic::error(code, span, message));
    }

    // =========================================================================
    // Character helpers (byte-indexed)
    // =========================================================================

    /// Char code at the index; ASCII fast path, UTF-8 decode otherwise.
    /// Returns 0 past the end.
    #[inline(always)]
    fn char_code_unchecked(&self, index: usize) -> u32 {
        let bytes = self.source.as_bytes();
        if index < bytes.len() {
            let b = bytes[index];
            if b < 128 {
                b as u32
            } else {
                self.source[index..]
                    .chars()
                    .next()
                    .map(|c| c as u32)
                    .unwrap_or(0)
            }
        } else {
            0
        }
    }

    #[inline]
    fn char_code_at(&self, index: usize) -> Option<u32> {
        if index < self.end {
            Some(self.char_code_unchecked(index))
        } else {
            None
        }
    }

    /// Byte length of the character at the index (1 for ASCII, up to 4).
    #[inline(always)]
    fn char_len_at(&self, index: usize) -> usize {
        let bytes = self.source.as_bytes();
        if index >= bytes.len() {
            return 0;
        }
        let b = bytes[index];
        if b < 128 {
            1
        } else if b < 0xE0 {
            2
        } else if b < 0xF0 {
            3
        } else {
            4
        }
    }

    // =========================================================================
    // Scanning
    // =========================================================================

    /// Scan the next token.
    pub fn scan(&mut self) -> TokenKind {
        self.full_start_pos = self.pos;
        self.token_flags = 0;
        self.token_value.clear();

        loop {
            self.token_start = self.pos;

            if self.pos >= self.end {
                self.token = TokenKind::EndOfFile;
                return self.token;
            }

            let ch = self.char_code_unchecked(self.pos);

            match ch {
                CharacterCodes::LINE_FEED | CharacterCodes::CARRIAGE_RETURN => {
                    self.token_flags |= token_flags::PRECEDING_LINE_BREAK;
                    if ch == CharacterCodes::CARRIAGE_RETURN
                        && self.char_code_at(self.pos + 1) == Some(CharacterCodes::LINE_FEED)
                    {
                        self.pos += 2;
                    } else {
                        self.pos += 1;
                    }
                    if self.skip_trivia && self.newline_is_trivia {
                        continue;
                    }
                    self.token = TokenKind::NewLine;
                    return self.token;
                }

                CharacterCodes::TAB
                | CharacterCodes::VERTICAL_TAB
                | CharacterCodes::FORM_FEED
                | CharacterCodes::SPACE
                | CharacterCodes::NON_BREAKING_SPACE
                | CharacterCodes::BYTE_ORDER_MARK => {
                    while self.pos < self.end
                        && is_white_space_single_line(self.char_code_unchecked(self.pos))
                    {
                        self.pos += self.char_len_at(self.pos);
                    }
                    if self.skip_trivia {
                        continue;
                    }
                    self.token = TokenKind::Whitespace;
                    return self.token;
                }

                CharacterCodes::OPEN_BRACE => return self.punct(TokenKind::OpenBrace, 1),
                CharacterCodes::CLOSE_BRACE => return self.punct(TokenKind::CloseBrace, 1),
                CharacterCodes::OPEN_PAREN => return self.punct(TokenKind::OpenParen, 1),
                CharacterCodes::CLOSE_PAREN => return self.punct(TokenKind::CloseParen, 1),
                CharacterCodes::OPEN_BRACKET => return self.punct(TokenKind::OpenBracket, 1),
                CharacterCodes::CLOSE_BRACKET => return self.punct(TokenKind::CloseBracket, 1),
                CharacterCodes::SEMICOLON => return self.punct(TokenKind::Semicolon, 1),
                CharacterCodes::COMMA => return self.punct(TokenKind::Comma, 1),
                CharacterCodes::LESS_THAN => return self.punct(TokenKind::LessThan, 1),
                CharacterCodes::GREATER_THAN => return self.punct(TokenKind::GreaterThan, 1),
                CharacterCodes::EQUALS => return self.punct(TokenKind::Equals, 1),
                CharacterCodes::AMPERSAND => return self.punct(TokenKind::Ampersand, 1),
                CharacterCodes::BAR => return self.punct(TokenKind::Bar, 1),
                CharacterCodes::QUESTION => return self.punct(TokenKind::Question, 1),
                CharacterCodes::COLON => return self.punct(TokenKind::Colon, 1),
                CharacterCodes::AT => return self.punct(TokenKind::At, 1),

                CharacterCodes::HASH => {
                    // Shebang only at the very start of the file.
                    if self.pos == 0
                        && self.char_code_at(1) == Some(CharacterCodes::EXCLAMATION)
                    {
                        while self.pos < self.end {
                            let c = self.char_code_unchecked(self.pos);
                            if c == CharacterCodes::LINE_FEED
                                || c == CharacterCodes::CARRIAGE_RETURN
                            {
                                break;
                            }
                            self.pos += self.char_len_at(self.pos);
                        }
                        if self.skip_trivia {
                            continue;
                        }
                        self.token = TokenKind::Shebang;
                        return self.token;
                    }
                    return self.punct(TokenKind::Hash, 1);
                }

                CharacterCodes::DOT => {
                    if self.char_code_at(self.pos + 1) == Some(CharacterCodes::DOT)
                        && self.char_code_at(self.pos + 2) == Some(CharacterCodes::DOT)
                    {
                        return self.punct(TokenKind::Ellipsis, 3);
                    }
                    return self.punct(TokenKind::Dot, 1);
                }

                CharacterCodes::SLASH => {
                    if self.char_code_at(self.pos + 1) == Some(CharacterCodes::SLASH) {
                        self.pos += 2;
                        while self.pos < self.end {
                            let c = self.char_code_unchecked(self.pos);
                            if c == CharacterCodes::LINE_FEED
                                || c == CharacterCodes::CARRIAGE_RETURN
                            {
                                break;
                            }
                            self.pos += self.char_len_at(self.pos);
                        }
                        if self.skip_trivia {
                            continue;
                        }
                        self.token = TokenKind::SingleLineComment;
                        return self.token;
                    }
                    if self.char_code_at(self.pos + 1) == Some(CharacterCodes::ASTERISK) {
                        let start = self.pos;
                        self.pos += 2;
                        let mut closed = false;
                        while self.pos < self.end {
                            let c = self.char_code_unchecked(self.pos);
                            if c == CharacterCodes::ASTERISK
                                && self.char_code_at(self.pos + 1)
                                    == Some(CharacterCodes::SLASH)
                            {
                                self.pos += 2;
                                closed = true;
                                break;
                            }
                            if c == CharacterCodes::LINE_FEED
                                || c == CharacterCodes::CARRIAGE_RETURN
                            {
                                self.token_flags |= token_flags::PRECEDING_LINE_BREAK;
                            }
                            self.pos += self.char_len_at(self.pos);
                        }
                        if !closed {
                            self.token_flags |= token_flags::UNTERMINATED;
                            self.error(
                                codes::UNTERMINATED_COMMENT,
                                Span::new(start as u32, self.pos as u32),
                                "Unterminated multi-line comment.",
                            );
                        }
                        if self.skip_trivia {
                            continue;
                        }
                        self.token = TokenKind::MultiLineComment;
                        return self.token;
                    }
                    // `/` is not an operator in CADL.
                    return self.punct(TokenKind::Unknown, 1);
                }

                CharacterCodes::DOUBLE_QUOTE => {
                    self.scan_string();
                    return self.token;
                }

                CharacterCodes::PLUS | CharacterCodes::MINUS => {
                    if self
                        .char_code_at(self.pos + 1)
                        .is_some_and(is_digit)
                    {
                        self.scan_number();
                        return self.token;
                    }
                    return self.punct(TokenKind::Unknown, 1);
                }

                _ if is_digit(ch) => {
                    self.scan_number();
                    return self.token;
                }

                _ if is_identifier_start(ch) => {
                    self.scan_identifier();
                    return self.token;
                }

                _ => {
                    // Unknown character. Consume it so scanning always makes
                    // progress; the parser reports the unexpected token.
                    return self.punct(TokenKind::Unknown, self.char_len_at(self.pos));
                }
            }
        }
    }

    #[inline]
    fn punct(&mut self, kind: TokenKind, len: usize) -> TokenKind {
        self.pos += len;
        self.token = kind;
        self.token
    }

    /// Scan an identifier or keyword. The cooked value is the identifier
    /// text; keywords are recognized by table lookup.
    fn scan_identifier(&mut self) {
        let start = self.pos;
        while self.pos < self.end && is_identifier_part(self.char_code_unchecked(self.pos)) {
            self.pos += self.char_len_at(self.pos);
        }
        let text = &self.source[start..self.pos];
        self.token = text_to_keyword(text).unwrap_or(TokenKind::Identifier);
        if self.token == TokenKind::Identifier {
            self.token_value.push_str(text);
        }
    }

    /// Scan a numeric literal: decimal digits with optional sign, fraction,
    /// and exponent. The value is kept textually and parsed at use.
    fn scan_number(&mut self) {
        let start = self.pos;
        let first = self.char_code_unchecked(self.pos);
        if first == CharacterCodes::PLUS || first == CharacterCodes::MINUS {
            self.pos += 1;
        }
        self.scan_digits();
        if self.char_code_at(self.pos) == Some(CharacterCodes::DOT)
            && self.char_code_at(self.pos + 1).is_some_and(is_digit)
        {
            self.pos += 1;
            self.scan_digits();
        }
        let exp = self.char_code_at(self.pos);
        if exp == Some(CharacterCodes::LOWER_E) || exp == Some(CharacterCodes::UPPER_E) {
            let after = self.char_code_at(self.pos + 1);
            let sign = after == Some(CharacterCodes::PLUS) || after == Some(CharacterCodes::MINUS);
            let digit_pos = self.pos + if sign { 2 } else { 1 };
            if self.char_code_at(digit_pos).is_some_and(is_digit) {
                self.pos = digit_pos;
                self.scan_digits();
            }
        }
        let text = &self.source[start..self.pos];
        self.token_value.push_str(text);
        self.token = TokenKind::NumericLiteral;
    }

    fn scan_digits(&mut self) {
        while self.pos < self.end && is_digit(self.char_code_unchecked(self.pos)) {
            self.pos += 1;
        }
    }

    /// Scan a double-quoted string literal, decoding escape sequences into
    /// the token value. Reports unterminated strings and invalid escapes
    /// but always produces a `StringLiteral` token.
    fn scan_string(&mut self) {
        let start = self.pos;
        self.pos += 1; // opening quote
        loop {
            if self.pos >= self.end {
                self.token_flags |= token_flags::UNTERMINATED;
                self.error(
                    codes::UNTERMINATED_LITERAL,
                    Span::new(start as u32, self.pos as u32),
                    "Unterminated string literal.",
                );
                break;
            }
            let ch = self.char_code_unchecked(self.pos);
            match ch {
                CharacterCodes::DOUBLE_QUOTE => {
                    self.pos += 1;
                    break;
                }
                CharacterCodes::LINE_FEED | CharacterCodes::CARRIAGE_RETURN => {
                    self.token_flags |= token_flags::UNTERMINATED;
                    self.error(
                        codes::UNTERMINATED_LITERAL,
                        Span::new(start as u32, self.pos as u32),
                        "Unterminated string literal.",
                    );
                    break;
                }
                CharacterCodes::BACKSLASH => {
                    let escape_start = self.pos;
                    self.pos += 1;
                    match self.char_code_at(self.pos) {
                        Some(CharacterCodes::BACKSLASH) => {
                            self.token_value.push('\\');
                            self.pos += 1;
                        }
                        Some(CharacterCodes::DOUBLE_QUOTE) => {
                            self.token_value.push('"');
                            self.pos += 1;
                        }
                        Some(CharacterCodes::LOWER_N) => {
                            self.token_value.push('\n');
                            self.pos += 1;
                        }
                        Some(CharacterCodes::LOWER_R) => {
                            self.token_value.push('\r');
                            self.pos += 1;
                        }
                        Some(CharacterCodes::LOWER_T) => {
                            self.token_value.push('\t');
                            self.pos += 1;
                        }
                        Some(CharacterCodes::DOLLAR) => {
                            // `\${` keeps a literal dollar-brace.
                            self.token_value.push('$');
                            self.pos += 1;
                        }
                        Some(other) => {
                            self.token_flags |= token_flags::HAS_INVALID_ESCAPE;
                            self.error(
                                codes::INVALID_ESCAPE,
                                Span::new(escape_start as u32, (self.pos + 1) as u32),
                                "Invalid escape sequence.",
                            );
                            if let Some(c) = char::from_u32(other) {
                                self.token_value.push(c);
                            }
                            self.pos += self.char_len_at(self.pos);
                        }
                        None => {
                            // EOF right after backslash; loop handles it.
                        }
                    }
                }
                _ => {
                    let len = self.char_len_at(self.pos);
                    self.token_value.push_str(&self.source[self.pos..self.pos + len]);
                    self.pos += len;
                }
            }
        }
        self.token = TokenKind::StringLiteral;
    }
}

// =============================================================================
// Character classification
// =============================================================================

#[inline]
fn is_digit(ch: u32) -> bool {
    (CharacterCodes::_0..=CharacterCodes::_9).contains(&ch)
}

#[inline]
fn is_white_space_single_line(ch: u32) -> bool {
    matches!(
        ch,
        CharacterCodes::SPACE
            | CharacterCodes::TAB
            | CharacterCodes::VERTICAL_TAB
            | CharacterCodes::FORM_FEED
            | CharacterCodes::NON_BREAKING_SPACE
            | CharacterCodes::BYTE_ORDER_MARK
    )
}

#[inline]
fn is_identifier_start(ch: u32) -> bool {
    (CharacterCodes::LOWER_A..=CharacterCodes::LOWER_Z).contains(&ch)
        || (CharacterCodes::UPPER_A..=CharacterCodes::UPPER_Z).contains(&ch)
        || ch == CharacterCodes::UNDERSCORE
        || ch == CharacterCodes::DOLLAR
        || (ch > 127 && char::from_u32(ch).is_some_and(char::is_alphabetic))
}

#[inline]
fn is_identifier_part(ch: u32) -> bool {
    is_identifier_start(ch) || is_digit(ch)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_all(text: &str) -> Vec<(TokenKind, String)> {
        let mut scanner = Scanner::new(Arc::from(text), true);
        let mut tokens = Vec::new();
        loop {
            let kind = scanner.scan();
            if kind == TokenKind::EndOfFile {
                break;
            }
            tokens.push((kind, scanner.token_text().to_string()));
        }
        tokens
    }

    #[test]
    fn test_scan_model_declaration() {
        let tokens = scan_all("model Pet { name: string; }");
        let kinds: Vec<TokenKind> = tokens.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::ModelKeyword,
                TokenKind::Identifier,
                TokenKind::OpenBrace,
                TokenKind::Identifier,
                TokenKind::Colon,
                TokenKind::Identifier,
                TokenKind::Semicolon,
                TokenKind::CloseBrace,
            ]
        );
    }

    #[test]
    fn test_scan_punctuation() {
        let tokens = scan_all("... . < > | & @ # ? = [ ] ( )");
        let kinds: Vec<TokenKind> = tokens.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Ellipsis,
                TokenKind::Dot,
                TokenKind::LessThan,
                TokenKind::GreaterThan,
                TokenKind::Bar,
                TokenKind::Ampersand,
                TokenKind::At,
                TokenKind::Hash,
                TokenKind::Question,
                TokenKind::Equals,
                TokenKind::OpenBracket,
                TokenKind::CloseBracket,
                TokenKind::OpenParen,
                TokenKind::CloseParen,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        let mut scanner = Scanner::new(Arc::from(r#""a\n\t\"b\\c\${d""#), true);
        assert_eq!(scanner.scan(), TokenKind::StringLiteral);
        assert_eq!(scanner.token_value(), "a\n\t\"b\\c${d");
        assert!(scanner.take_diagnostics().is_empty());
    }

    #[test]
    fn test_unterminated_string() {
        let mut scanner = Scanner::new(Arc::from("\"abc\nmodel"), true);
        assert_eq!(scanner.scan(), TokenKind::StringLiteral);
        assert!(scanner.is_unterminated());
        let diags = scanner.take_diagnostics();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, codes::UNTERMINATED_LITERAL);
        // The scanner still yields the next token.
        assert_eq!(scanner.scan(), TokenKind::ModelKeyword);
    }

    #[test]
    fn test_unterminated_comment() {
        let mut scanner = Scanner::new(Arc::from("/* never closed"), true);
        assert_eq!(scanner.scan(), TokenKind::EndOfFile);
        let diags = scanner.take_diagnostics();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, codes::UNTERMINATED_COMMENT);
    }

    #[test]
    fn test_numbers() {
        let tokens = scan_all("42 -7 3.25 1e10 2.5e-3");
        assert!(tokens.iter().all(|(k, _)| *k == TokenKind::NumericLiteral));
        let texts: Vec<&str> = tokens.iter().map(|(_, t)| t.as_str()).collect();
        assert_eq!(texts, vec!["42", "-7", "3.25", "1e10", "2.5e-3"]);
    }

    #[test]
    fn test_comments_are_trivia() {
        let tokens = scan_all("model // trailing\n/* block */ A");
        let kinds: Vec<TokenKind> = tokens.iter().map(|(k, _)| *k).collect();
        assert_eq!(kinds, vec![TokenKind::ModelKeyword, TokenKind::Identifier]);
    }

    #[test]
    fn test_shebang_only_on_first_line() {
        let tokens = scan_all("#!/usr/bin/env cadl\nmodel A {}");
        assert_eq!(tokens[0].0, TokenKind::ModelKeyword);

        let tokens = scan_all("model\n#!x");
        // Not at offset 0: `#` is a hash token, `!` is unknown.
        assert_eq!(tokens[1].0, TokenKind::Hash);
    }

    #[test]
    fn test_newline_mode() {
        let mut scanner = Scanner::new(Arc::from("#suppress foo\nmodel"), true);
        assert_eq!(scanner.scan(), TokenKind::Hash);
        scanner.set_newline_is_trivia(false);
        assert_eq!(scanner.scan(), TokenKind::Identifier);
        assert_eq!(scanner.token_value(), "suppress");
        assert_eq!(scanner.scan(), TokenKind::Identifier);
        assert_eq!(scanner.scan(), TokenKind::NewLine);
        scanner.set_newline_is_trivia(true);
        assert_eq!(scanner.scan(), TokenKind::ModelKeyword);
    }

    #[test]
    fn test_preceding_line_break_flag() {
        let mut scanner = Scanner::new(Arc::from("a\nb"), true);
        scanner.scan();
        assert!(!scanner.has_preceding_line_break());
        scanner.scan();
        assert!(scanner.has_preceding_line_break());
    }
}
