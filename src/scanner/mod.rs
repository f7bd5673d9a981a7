//! Scanner types and utilities for CADL lexical analysis.
//!
//! This module contains the token kind enum, keyword tables, and
//! classification helpers; the tokenization logic lives in
//! [`scanner_impl`].

pub mod scanner_impl;

pub use scanner_impl::{token_flags, Scanner, ScannerSnapshot};

use serde::Serialize;

// =============================================================================
// TokenKind
// =============================================================================

/// Token kinds produced by the scanner.
///
/// Trivia kinds are only returned when the scanner is constructed with
/// `skip_trivia == false`, except for `NewLine`, which is also returned
/// while the parser has newline-sensitive scanning enabled (directive
/// parsing).
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Hash, Serialize)]
pub enum TokenKind {
    Unknown = 0,
    EndOfFile = 1,
    // Trivia
    SingleLineComment = 2,
    MultiLineComment = 3,
    NewLine = 4,
    Whitespace = 5,
    Shebang = 6,
    // Literals
    NumericLiteral = 7,
    StringLiteral = 8,
    // Punctuation
    OpenBrace = 9,
    CloseBrace = 10,
    OpenParen = 11,
    CloseParen = 12,
    OpenBracket = 13,
    CloseBracket = 14,
    Dot = 15,
    Ellipsis = 16,
    Semicolon = 17,
    Comma = 18,
    LessThan = 19,
    GreaterThan = 20,
    Equals = 21,
    Ampersand = 22,
    Bar = 23,
    Question = 24,
    Colon = 25,
    At = 26,
    Hash = 27,
    // Identifiers
    Identifier = 28,
    // Keywords
    ImportKeyword = 29,
    ModelKeyword = 30,
    NamespaceKeyword = 31,
    UsingKeyword = 32,
    OpKeyword = 33,
    InterfaceKeyword = 34,
    UnionKeyword = 35,
    EnumKeyword = 36,
    AliasKeyword = 37,
    ExtendsKeyword = 38,
    IsKeyword = 39,
    TrueKeyword = 40,
    FalseKeyword = 41,
}

impl TokenKind {
    pub const FIRST_KEYWORD: TokenKind = TokenKind::ImportKeyword;
    pub const LAST_KEYWORD: TokenKind = TokenKind::FalseKeyword;
    pub const FIRST_PUNCTUATION: TokenKind = TokenKind::OpenBrace;
    pub const LAST_PUNCTUATION: TokenKind = TokenKind::Hash;
    pub const FIRST_TRIVIA: TokenKind = TokenKind::SingleLineComment;
    pub const LAST_TRIVIA: TokenKind = TokenKind::Shebang;
}

// =============================================================================
// Token classification
// =============================================================================

/// Check if a token is trivia (whitespace, newline, comments, shebang).
pub fn token_is_trivia(token: TokenKind) -> bool {
    let t = token as u8;
    t >= TokenKind::FIRST_TRIVIA as u8 && t <= TokenKind::LAST_TRIVIA as u8
}

/// Check if a token is a keyword.
pub fn token_is_keyword(token: TokenKind) -> bool {
    let t = token as u8;
    t >= TokenKind::FIRST_KEYWORD as u8 && t <= TokenKind::LAST_KEYWORD as u8
}

/// Check if a token is an identifier or keyword.
pub fn token_is_identifier_or_keyword(token: TokenKind) -> bool {
    token as u8 >= TokenKind::Identifier as u8
}

/// Check if a token is punctuation.
pub fn token_is_punctuation(token: TokenKind) -> bool {
    let t = token as u8;
    t >= TokenKind::FIRST_PUNCTUATION as u8 && t <= TokenKind::LAST_PUNCTUATION as u8
}

/// Check if a token is a literal (string, number, or boolean keyword).
pub fn token_is_literal(token: TokenKind) -> bool {
    matches!(
        token,
        TokenKind::StringLiteral
            | TokenKind::NumericLiteral
            | TokenKind::TrueKeyword
            | TokenKind::FalseKeyword
    )
}

// =============================================================================
// Keyword and punctuation text mapping
// =============================================================================

/// Get the source text of a keyword token.
pub fn keyword_to_text(token: TokenKind) -> Option<&'static str> {
    match token {
        TokenKind::ImportKeyword => Some("import"),
        TokenKind::ModelKeyword => Some("model"),
        TokenKind::NamespaceKeyword => Some("namespace"),
        TokenKind::UsingKeyword => Some("using"),
        TokenKind::OpKeyword => Some("op"),
        TokenKind::InterfaceKeyword => Some("interface"),
        TokenKind::UnionKeyword => Some("union"),
        TokenKind::EnumKeyword => Some("enum"),
        TokenKind::AliasKeyword => Some("alias"),
        TokenKind::ExtendsKeyword => Some("extends"),
        TokenKind::IsKeyword => Some("is"),
        TokenKind::TrueKeyword => Some("true"),
        TokenKind::FalseKeyword => Some("false"),
        _ => None,
    }
}

/// Get the source text of a punctuation token.
pub fn punctuation_to_text(token: TokenKind) -> Option<&'static str> {
    match token {
        TokenKind::OpenBrace => Some("{"),
        TokenKind::CloseBrace => Some("}"),
        TokenKind::OpenParen => Some("("),
        TokenKind::CloseParen => Some(")"),
        TokenKind::OpenBracket => Some("["),
        TokenKind::CloseBracket => Some("]"),
        TokenKind::Dot => Some("."),
        TokenKind::Ellipsis => Some("..."),
        TokenKind::Semicolon => Some(";"),
        TokenKind::Comma => Some(","),
        TokenKind::LessThan => Some("<"),
        TokenKind::GreaterThan => Some(">"),
        TokenKind::Equals => Some("="),
        TokenKind::Ampersand => Some("&"),
        TokenKind::Bar => Some("|"),
        TokenKind::Question => Some("?"),
        TokenKind::Colon => Some(":"),
        TokenKind::At => Some("@"),
        TokenKind::Hash => Some("#"),
        _ => None,
    }
}

/// Human-readable token description for diagnostics.
pub fn token_display(token: TokenKind) -> &'static str {
    if let Some(text) = keyword_to_text(token) {
        return text;
    }
    if let Some(text) = punctuation_to_text(token) {
        return text;
    }
    match token {
        TokenKind::Identifier => "identifier",
        TokenKind::StringLiteral => "string",
        TokenKind::NumericLiteral => "number",
        TokenKind::EndOfFile => "end of file",
        TokenKind::NewLine => "newline",
        _ => "token",
    }
}

/// Convert a word to its keyword token, if it is a keyword.
///
/// Contextual words like `mixes` are plain identifiers; the parser
/// recognizes them by text.
pub fn text_to_keyword(text: &str) -> Option<TokenKind> {
    match text {
        "import" => Some(TokenKind::ImportKeyword),
        "model" => Some(TokenKind::ModelKeyword),
        "namespace" => Some(TokenKind::NamespaceKeyword),
        "using" => Some(TokenKind::UsingKeyword),
        "op" => Some(TokenKind::OpKeyword),
        "interface" => Some(TokenKind::InterfaceKeyword),
        "union" => Some(TokenKind::UnionKeyword),
        "enum" => Some(TokenKind::EnumKeyword),
        "alias" => Some(TokenKind::AliasKeyword),
        "extends" => Some(TokenKind::ExtendsKeyword),
        "is" => Some(TokenKind::IsKeyword),
        "true" => Some(TokenKind::TrueKeyword),
        "false" => Some(TokenKind::FalseKeyword),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_ranges() {
        assert!(token_is_keyword(TokenKind::ModelKeyword));
        assert!(token_is_keyword(TokenKind::FalseKeyword));
        assert!(!token_is_keyword(TokenKind::Identifier));
        assert!(token_is_identifier_or_keyword(TokenKind::Identifier));
        assert!(token_is_identifier_or_keyword(TokenKind::OpKeyword));
        assert!(token_is_trivia(TokenKind::NewLine));
        assert!(!token_is_trivia(TokenKind::Identifier));
        assert!(token_is_punctuation(TokenKind::Ellipsis));
        assert!(!token_is_punctuation(TokenKind::StringLiteral));
    }

    #[test]
    fn test_keyword_round_trip() {
        for text in [
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
        ] {
            let kind = text_to_keyword(text).unwrap();
            assert_eq!(keyword_to_text(kind), Some(text));
        }
        assert_eq!(text_to_keyword("mixes"), None);
        assert_eq!(text_to_keyword("models"), None);
    }
}
