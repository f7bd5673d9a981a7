//! Character code constants used by the scanner.

#![allow(dead_code)]

/// Character codes used throughout the scanner.
pub struct CharacterCodes;

impl CharacterCodes {
    // Line terminators
    pub const LINE_FEED: u32 = 0x0A; // \n
    pub const CARRIAGE_RETURN: u32 = 0x0D; // \r

    // Whitespace
    pub const SPACE: u32 = 0x0020;
    pub const TAB: u32 = 0x09;
    pub const VERTICAL_TAB: u32 = 0x0B;
    pub const FORM_FEED: u32 = 0x0C;
    pub const NON_BREAKING_SPACE: u32 = 0x00A0;
    pub const BYTE_ORDER_MARK: u32 = 0xFEFF;

    // Digits
    pub const _0: u32 = 0x30;
    pub const _9: u32 = 0x39;

    // Letters
    pub const UPPER_A: u32 = 0x41;
    pub const UPPER_E: u32 = 0x45;
    pub const UPPER_Z: u32 = 0x5A;
    pub const LOWER_A: u32 = 0x61;
    pub const LOWER_E: u32 = 0x65;
    pub const LOWER_N: u32 = 0x6E;
    pub const LOWER_R: u32 = 0x72;
    pub const LOWER_T: u32 = 0x74;
    pub const LOWER_Z: u32 = 0x7A;

    // Punctuation and operators
    pub const EXCLAMATION: u32 = 0x21; // !
    pub const DOUBLE_QUOTE: u32 = 0x22; // "
    pub const HASH: u32 = 0x23; // #
    pub const DOLLAR: u32 = 0x24; // $
    pub const AMPERSAND: u32 = 0x26; // &
    pub const OPEN_PAREN: u32 = 0x28; // (
    pub const CLOSE_PAREN: u32 = 0x29; // )
    pub const ASTERISK: u32 = 0x2A; // *
    pub const PLUS: u32 = 0x2B; // +
    pub const COMMA: u32 = 0x2C; // ,
    pub const MINUS: u32 = 0x2D; // -
    pub const DOT: u32 = 0x2E; // .
    pub const SLASH: u32 = 0x2F; // /
    pub const COLON: u32 = 0x3A; // :
    pub const SEMICOLON: u32 = 0x3B; // ;
    pub const LESS_THAN: u32 = 0x3C; // <
    pub const EQUALS: u32 = 0x3D; // =
    pub const GREATER_THAN: u32 = 0x3E; // >
    pub const QUESTION: u32 = 0x3F; // ?
    pub const AT: u32 = 0x40; // @
    pub const OPEN_BRACKET: u32 = 0x5B; // [
    pub const BACKSLASH: u32 = 0x5C; // \
    pub const CLOSE_BRACKET: u32 = 0x5D; // ]
    pub const UNDERSCORE: u32 = 0x5F; // _
    pub const OPEN_BRACE: u32 = 0x7B; // {
    pub const BAR: u32 = 0x7C; // |
    pub const CLOSE_BRACE: u32 = 0x7D; // }
}
