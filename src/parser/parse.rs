//! Recursive-descent parser for CADL.
//!
//! The parser always produces a complete script node, even for malformed
//! input: nodes that could not be fully parsed carry `HAS_PARSE_ERROR` and
//! missing identifiers are synthesized so later phases do not re-report the
//! same location. Every comma/semicolon-delimited construct goes through one
//! shared list driver which is guaranteed to terminate.
//!
//! Error placement follows two rules: no two errors are reported at the same
//! real position, and a missing-punctuation squiggle lands at the end of the
//! previous token rather than on the current one.

use crate::diagnostics::{codes, ParseDiagnostic};
use crate::interner::{Atom, Interner};
use crate::parser::{node_flags, Node, NodeArena, NodeIndex, NodeKind};
use crate::scanner::{
    token_display, token_is_keyword, Scanner, TokenKind,
};
use crate::source_file::SourceFile;
use crate::span::Span;

// =============================================================================
// Parse result
// =============================================================================

/// The outcome of parsing one file.
pub struct ParseResult {
    /// The script node.
    pub root: NodeIndex,
    /// Arena holding every node of the tree.
    pub arena: NodeArena,
    /// Whether the tree is syntactically clean enough to re-print.
    pub printable: bool,
    /// Scanner and parser diagnostics, in emission order.
    pub diagnostics: Vec<ParseDiagnostic>,
}

/// Parse a source file into a syntax tree.
pub fn parse(source: &SourceFile, interner: &mut Interner) -> ParseResult {
    Parser::new(source, interner).parse_script()
}

// =============================================================================
// List driver configuration
// =============================================================================

/// Parameters for the shared delimited-list driver.
struct ListKind {
    open: TokenKind,
    close: TokenKind,
    /// Primary delimiter.
    delimiter: TokenKind,
    /// A second delimiter accepted in place of the primary one.
    tolerated: Option<TokenKind>,
    /// Whether using the tolerated delimiter produces a warning.
    tolerated_warns: bool,
    /// Whether a trailing delimiter before the close token is valid.
    allow_trailing: bool,
    /// Whether decorators/directives may annotate list items.
    allow_annotations: bool,
}

/// Model and model-expression bodies: `;` or `,` separated, trailing ok.
const MODEL_BODY: ListKind = ListKind {
    open: TokenKind::OpenBrace,
    close: TokenKind::CloseBrace,
    delimiter: TokenKind::Semicolon,
    tolerated: Some(TokenKind::Comma),
    tolerated_warns: false,
    allow_trailing: true,
    allow_annotations: true,
};

/// Interface bodies hold operations, `;` separated.
const INTERFACE_BODY: ListKind = ListKind {
    open: TokenKind::OpenBrace,
    close: TokenKind::CloseBrace,
    delimiter: TokenKind::Semicolon,
    tolerated: Some(TokenKind::Comma),
    tolerated_warns: true,
    allow_trailing: true,
    allow_annotations: true,
};

/// Union variants: comma separated, `;` tolerated with a warning.
const UNION_BODY: ListKind = ListKind {
    open: TokenKind::OpenBrace,
    close: TokenKind::CloseBrace,
    delimiter: TokenKind::Comma,
    tolerated: Some(TokenKind::Semicolon),
    tolerated_warns: true,
    allow_trailing: true,
    allow_annotations: true,
};

/// Enum members: comma separated, `;` tolerated with a warning.
const ENUM_BODY: ListKind = ListKind {
    open: TokenKind::OpenBrace,
    close: TokenKind::CloseBrace,
    delimiter: TokenKind::Comma,
    tolerated: Some(TokenKind::Semicolon),
    tolerated_warns: true,
    allow_trailing: true,
    allow_annotations: true,
};

/// Operation parameters: `(a: A, b: B)`.
const OPERATION_PARAMS: ListKind = ListKind {
    open: TokenKind::OpenParen,
    close: TokenKind::CloseParen,
    delimiter: TokenKind::Comma,
    tolerated: None,
    tolerated_warns: false,
    allow_trailing: false,
    allow_annotations: true,
};

/// Template parameter and argument lists: `<A, B>`.
const TEMPLATE_LIST: ListKind = ListKind {
    open: TokenKind::LessThan,
    close: TokenKind::GreaterThan,
    delimiter: TokenKind::Comma,
    tolerated: None,
    tolerated_warns: false,
    allow_trailing: false,
    allow_annotations: false,
};

/// Tuple members: `[A, B]`.
const TUPLE_LIST: ListKind = ListKind {
    open: TokenKind::OpenBracket,
    close: TokenKind::CloseBracket,
    delimiter: TokenKind::Comma,
    tolerated: None,
    tolerated_warns: false,
    allow_trailing: false,
    allow_annotations: false,
};

/// Decorator arguments: `@dec(a, b)`.
const DECORATOR_ARGS: ListKind = ListKind {
    open: TokenKind::OpenParen,
    close: TokenKind::CloseParen,
    delimiter: TokenKind::Comma,
    tolerated: None,
    tolerated_warns: false,
    allow_trailing: false,
    allow_annotations: false,
};

// =============================================================================
// Parser
// =============================================================================

/// Recursive-descent parser over a [`Scanner`].
pub struct Parser<'a> {
    scanner: Scanner,
    interner: &'a mut Interner,
    arena: NodeArena,
    token: TokenKind,
    previous_token_end: u32,
    diagnostics: Vec<ParseDiagnostic>,
    /// Position of the last reported error, for cascade suppression.
    last_error_pos: u32,
    printable: bool,
    /// Depth of enclosing block namespaces; imports are file-level only.
    namespace_depth: u32,
}

impl<'a> Parser<'a> {
    pub fn new(source: &SourceFile, interner: &'a mut Interner) -> Parser<'a> {
        let mut scanner = Scanner::new(source.text_arc(), true);
        let token = scanner.scan();
        Parser {
            scanner,
            interner,
            arena: NodeArena::new(),
            token,
            previous_token_end: 0,
            diagnostics: Vec::new(),
            last_error_pos: u32::MAX,
            printable: true,
            namespace_depth: 0,
        }
    }

    // =========================================================================
    // Token utilities
    // =========================================================================

    #[inline]
    fn token_pos(&self) -> u32 {
        self.scanner.token_start()
    }

    #[inline]
    fn token_span(&self) -> Span {
        self.scanner.token_span()
    }

    fn next_token(&mut self) -> TokenKind {
        self.previous_token_end = self.scanner.token_end();
        self.token = self.scanner.scan();
        self.token
    }

    #[inline]
    fn is_token(&self, kind: TokenKind) -> bool {
        self.token == kind
    }

    fn parse_optional(&mut self, kind: TokenKind) -> bool {
        if self.is_token(kind) {
            self.next_token();
            true
        } else {
            false
        }
    }

    /// Parse an expected token; on a miss, report a missing-token error at
    /// the end of the previous token.
    fn parse_expected(&mut self, kind: TokenKind) -> bool {
        if self.is_token(kind) {
            self.next_token();
            true
        } else {
            self.printable = false;
            self.error_at(
                codes::MISSING_TOKEN,
                Span::at(self.previous_token_end),
                format!("'{}' expected.", token_display(kind)),
            );
            false
        }
    }

    /// Look ahead without consuming: runs `f`, then rewinds all parser and
    /// scanner state. `f` must not allocate nodes.
    fn lookahead<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        let snapshot = self.scanner.snapshot();
        let token = self.token;
        let previous_token_end = self.previous_token_end;
        let diagnostics_len = self.diagnostics.len();
        let last_error_pos = self.last_error_pos;
        let printable = self.printable;

        let result = f(self);

        self.scanner.restore(snapshot);
        self.token = token;
        self.previous_token_end = previous_token_end;
        self.diagnostics.truncate(diagnostics_len);
        self.last_error_pos = last_error_pos;
        self.printable = printable;
        result
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    /// Report an error, suppressing a second error at the same real position.
    fn error_at(&mut self, code: &'static str, span: Span, message: impl Into<String>) {
        if span.start == self.last_error_pos {
            return;
        }
        self.last_error_pos = span.start;
        self.diagnostics.push(ParseDiagnostic::error(code, span, message));
    }

    fn warning_at(&mut self, code: &'static str, span: Span, message: impl Into<String>) {
        self.diagnostics.push(ParseDiagnostic::warning(code, span, message));
    }

    // =========================================================================
    // Node construction
    // =========================================================================

    fn finish_node(&mut self, kind: NodeKind, pos: u32) -> NodeIndex {
        self.arena.alloc(Node::new(kind, pos, self.previous_token_end))
    }

    fn finish_node_with_flags(&mut self, kind: NodeKind, pos: u32, flags: u16) -> NodeIndex {
        let mut node = Node::new(kind, pos, self.previous_token_end);
        node.flags = flags;
        self.arena.alloc(node)
    }

    /// Synthesize a missing identifier at the end of the previous token.
    fn create_missing_identifier(&mut self) -> NodeIndex {
        self.printable = false;
        let pos = self.previous_token_end;
        let mut node = Node::new(NodeKind::Identifier { atom: Atom::NONE }, pos, pos);
        node.flags = node_flags::SYNTHETIC | node_flags::HAS_PARSE_ERROR;
        self.arena.alloc(node)
    }

    // =========================================================================
    // Script
    // =========================================================================

    pub fn parse_script(mut self) -> ParseResult {
        let mut statements: Vec<NodeIndex> = Vec::new();
        // The innermost node of the file's blockless namespace, if any; the
        // rest of the file becomes its body.
        let mut blockless_body: Option<NodeIndex> = None;
        let mut seen_blockless = false;
        let mut seen_non_import = false;

        while !self.is_token(TokenKind::EndOfFile) {
            let statement = self.parse_statement();
            let (is_import, is_blockless) = match &self.arena.get(statement).kind {
                NodeKind::Import { .. } => (true, false),
                NodeKind::Namespace { blockless, .. } => (false, *blockless),
                _ => (false, false),
            };

            if is_import && seen_non_import {
                let span = self.arena.get(statement).span();
                self.error_at(
                    codes::IMPORTS_FIRST,
                    span,
                    "Imports must come before any other statement.",
                );
            }
            if !is_import {
                if is_blockless {
                    if seen_blockless {
                        let span = self.arena.get(statement).span();
                        self.error_at(
                            codes::MULTIPLE_BLOCKLESS,
                            span,
                            "Cannot use multiple blockless namespaces.",
                        );
                    } else if seen_non_import {
                        let span = self.arena.get(statement).span();
                        self.error_at(
                            codes::BLOCKLESS_NAMESPACE_FIRST,
                            span,
                            "Blockless namespace can only be declared before any other statement.",
                        );
                    }
                }
                seen_non_import = true;
            }

            match blockless_body {
                Some(body) if body != statement => {
                    if let NodeKind::Namespace { statements, .. } =
                        &mut self.arena.get_mut(body).kind
                    {
                        statements.push(statement);
                    }
                }
                _ => statements.push(statement),
            }

            if is_blockless && !seen_blockless {
                seen_blockless = true;
                blockless_body = Some(self.innermost_namespace(statement));
            }
        }

        let end = self.scanner.token_end();
        let root = self.arena.alloc(Node::new(NodeKind::Script { statements }, 0, end));
        mark_descendant_errors(&mut self.arena, root);

        let mut diagnostics = self.scanner.take_diagnostics();
        diagnostics.extend(self.diagnostics);
        ParseResult {
            root,
            arena: self.arena,
            printable: self.printable,
            diagnostics,
        }
    }

    /// Walk a dotted-namespace chain down to its innermost node.
    fn innermost_namespace(&self, mut index: NodeIndex) -> NodeIndex {
        loop {
            match &self.arena.get(index).kind {
                NodeKind::Namespace { statements, .. } if statements.len() == 1 => {
                    let only = statements[0];
                    if matches!(self.arena.get(only).kind, NodeKind::Namespace { .. }) {
                        index = only;
                        continue;
                    }
                    return index;
                }
                _ => return index,
            }
        }
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn parse_statement(&mut self) -> NodeIndex {
        let (directives, decorators) = self.parse_annotations();
        let statement = match self.token {
            TokenKind::ImportKeyword => {
                self.forbid_decorators(&decorators, "import");
                self.parse_import()
            }
            TokenKind::NamespaceKeyword => self.parse_namespace(decorators),
            TokenKind::UsingKeyword => {
                self.forbid_decorators(&decorators, "using");
                self.parse_using()
            }
            TokenKind::ModelKeyword => self.parse_model(decorators),
            TokenKind::InterfaceKeyword => self.parse_interface(decorators),
            TokenKind::UnionKeyword => self.parse_union(decorators),
            TokenKind::EnumKeyword => self.parse_enum(decorators),
            TokenKind::AliasKeyword => {
                self.forbid_decorators(&decorators, "alias");
                self.parse_alias()
            }
            TokenKind::OpKeyword => self.parse_operation(decorators),
            TokenKind::Semicolon => {
                self.forbid_decorators(&decorators, "empty");
                let pos = self.token_pos();
                self.next_token();
                self.finish_node(NodeKind::Empty, pos)
            }
            _ => {
                self.forbid_decorators(&decorators, "invalid");
                self.parse_invalid_statement()
            }
        };
        if !directives.is_empty() {
            self.arena.get_mut(statement).directives = directives;
        }
        statement
    }

    /// Report decorators attached to a statement kind that forbids them.
    fn forbid_decorators(&mut self, decorators: &[NodeIndex], kind: &str) {
        for &decorator in decorators {
            let span = self.arena.get(decorator).span();
            self.error_at(
                codes::INVALID_DECORATOR_LOCATION,
                span,
                format!("Cannot decorate {} statement.", kind),
            );
        }
    }

    /// Collect leading `#` directives and `@` decorators in source order.
    fn parse_annotations(&mut self) -> (Vec<NodeIndex>, Vec<NodeIndex>) {
        let mut directives = Vec::new();
        let mut decorators = Vec::new();
        loop {
            match self.token {
                TokenKind::Hash => directives.push(self.parse_directive()),
                TokenKind::At => decorators.push(self.parse_decorator()),
                _ => break,
            }
        }
        (directives, decorators)
    }

    /// Parse a `#name arg...` directive. Directives are newline-terminated,
    /// so newline is not trivia while one is being parsed.
    fn parse_directive(&mut self) -> NodeIndex {
        let pos = self.token_pos();
        self.scanner.set_newline_is_trivia(false);
        self.next_token(); // past '#'
        let name = self.parse_identifier();
        let mut arguments = Vec::new();
        loop {
            match self.token {
                TokenKind::Identifier => arguments.push(self.parse_identifier()),
                TokenKind::StringLiteral => arguments.push(self.parse_string_literal()),
                _ => break,
            }
        }
        if self.is_token(TokenKind::NewLine) {
            self.scanner.set_newline_is_trivia(true);
            self.next_token();
        } else {
            self.scanner.set_newline_is_trivia(true);
        }

        if let Some(atom) = self.arena.identifier_atom(name) {
            let text = self.interner.resolve(atom);
            if !text.is_empty() && text != "suppress" {
                let span = self.arena.get(name).span();
                let message = format!("Unknown directive '#{}'.", text);
                self.error_at(codes::UNKNOWN_DIRECTIVE, span, message);
            }
        }
        self.finish_node(NodeKind::Directive { name, arguments }, pos)
    }

    /// Parse an `@target(args)` decorator annotation.
    fn parse_decorator(&mut self) -> NodeIndex {
        let pos = self.token_pos();
        self.next_token(); // past '@'
        let target = self.parse_member_expression_chain();
        let arguments = if self.is_token(TokenKind::OpenParen) {
            self.parse_delimited_list(&DECORATOR_ARGS, |p, _, _| p.parse_expression())
        } else {
            Vec::new()
        };
        self.finish_node(NodeKind::Decorator { target, arguments }, pos)
    }

    fn parse_import(&mut self) -> NodeIndex {
        let pos = self.token_pos();
        self.next_token();
        if self.namespace_depth > 0 {
            self.error_at(
                codes::IMPORTS_FIRST,
                Span::at(pos),
                "Imports must be at the top of the file.",
            );
        }
        let path = if self.is_token(TokenKind::StringLiteral) {
            self.parse_string_literal()
        } else {
            self.printable = false;
            self.error_at(
                codes::MISSING_TOKEN,
                Span::at(self.previous_token_end),
                "Import path string expected.",
            );
            self.finish_node_with_flags(
                NodeKind::StringLiteral {
                    value: String::new(),
                },
                self.previous_token_end,
                node_flags::SYNTHETIC | node_flags::HAS_PARSE_ERROR,
            )
        };
        self.parse_expected(TokenKind::Semicolon);
        self.finish_node(NodeKind::Import { path }, pos)
    }

    fn parse_using(&mut self) -> NodeIndex {
        let pos = self.token_pos();
        self.next_token();
        let reference = self.parse_member_expression_chain();
        self.parse_expected(TokenKind::Semicolon);
        self.finish_node(NodeKind::Using { reference }, pos)
    }

    /// Parse `namespace A.B.C { ... }` or the blockless `namespace A.B;`.
    /// A dotted name is desugared into nested namespace nodes sharing the
    /// same pos/end so merging and scope walking see a normal chain.
    fn parse_namespace(&mut self, decorators: Vec<NodeIndex>) -> NodeIndex {
        let pos = self.token_pos();
        self.next_token();
        let mut segments = vec![self.parse_identifier()];
        while self.parse_optional(TokenKind::Dot) {
            segments.push(self.parse_identifier());
        }

        let blockless = self.is_token(TokenKind::Semicolon);
        let statements = if blockless {
            self.next_token();
            if self.namespace_depth > 0 {
                self.error_at(
                    codes::BLOCKLESS_NAMESPACE_FIRST,
                    Span::at(pos),
                    "Blockless namespace can only be used at the file level.",
                );
            }
            Vec::new()
        } else {
            let mut statements = Vec::new();
            if self.parse_expected(TokenKind::OpenBrace) {
                self.namespace_depth += 1;
                while !self.is_token(TokenKind::CloseBrace)
                    && !self.is_token(TokenKind::EndOfFile)
                {
                    statements.push(self.parse_statement());
                }
                self.namespace_depth -= 1;
                self.parse_expected(TokenKind::CloseBrace);
            }
            statements
        };

        // Innermost namespace owns the body and the decorators.
        let last = segments
            .pop()
            .unwrap_or_else(|| self.create_missing_identifier());
        let end = self.previous_token_end;
        let mut node = Node::new(
            NodeKind::Namespace {
                decorators,
                name: last,
                statements,
                blockless,
            },
            pos,
            end,
        );
        let mut current = self.arena.alloc(node);
        while let Some(name) = segments.pop() {
            node = Node::new(
                NodeKind::Namespace {
                    decorators: Vec::new(),
                    name,
                    statements: vec![current],
                    blockless,
                },
                pos,
                end,
            );
            current = self.arena.alloc(node);
        }
        current
    }

    fn parse_model(&mut self, decorators: Vec<NodeIndex>) -> NodeIndex {
        let pos = self.token_pos();
        self.next_token();
        let name = self.parse_identifier();
        let template_parameters = self.parse_template_parameters();

        let mut extends = NodeIndex::NONE;
        let mut is = NodeIndex::NONE;
        if self.parse_optional(TokenKind::ExtendsKeyword) {
            extends = self.parse_reference();
        } else if self.parse_optional(TokenKind::IsKeyword) {
            is = self.parse_reference();
        }

        let members = if self.parse_optional(TokenKind::Semicolon) {
            Vec::new()
        } else {
            self.parse_delimited_list(&MODEL_BODY, Self::parse_model_member)
        };

        self.finish_node(
            NodeKind::Model {
                decorators,
                name,
                template_parameters,
                extends,
                is,
                members,
            },
            pos,
        )
    }

    /// A model body item: a spread (`...M`) or a property.
    fn parse_model_member(
        &mut self,
        directives: Vec<NodeIndex>,
        decorators: Vec<NodeIndex>,
    ) -> NodeIndex {
        if self.is_token(TokenKind::Ellipsis) {
            let pos = self.token_pos();
            self.next_token();
            self.forbid_decorators(&decorators, "spread");
            let target = self.parse_reference();
            let node = self.finish_node(NodeKind::ModelSpread { target }, pos);
            self.arena.get_mut(node).directives = directives;
            return node;
        }

        let pos = self.token_pos();
        let name = self.parse_property_name();
        let optional = self.parse_optional(TokenKind::Question);
        self.parse_expected(TokenKind::Colon);
        let value = self.parse_expression();
        let default = if self.parse_optional(TokenKind::Equals) {
            self.parse_expression()
        } else {
            NodeIndex::NONE
        };
        let node = self.finish_node(
            NodeKind::ModelProperty {
                decorators,
                name,
                value,
                optional,
                default,
            },
            pos,
        );
        self.arena.get_mut(node).directives = directives;
        node
    }

    /// Property names are identifiers or string literals.
    fn parse_property_name(&mut self) -> NodeIndex {
        if self.is_token(TokenKind::StringLiteral) {
            self.parse_string_literal()
        } else {
            self.parse_identifier()
        }
    }

    fn parse_interface(&mut self, decorators: Vec<NodeIndex>) -> NodeIndex {
        let pos = self.token_pos();
        self.next_token();
        let name = self.parse_identifier();
        let template_parameters = self.parse_template_parameters();

        // `mixes` is contextual: a plain identifier, not a keyword.
        let mut mixes = Vec::new();
        if self.is_token(TokenKind::Identifier) && self.scanner.token_value() == "mixes" {
            self.next_token();
            loop {
                mixes.push(self.parse_reference());
                if !self.parse_optional(TokenKind::Comma) {
                    break;
                }
            }
        }

        let operations = self.parse_delimited_list(&INTERFACE_BODY, Self::parse_interface_member);
        self.finish_node(
            NodeKind::Interface {
                decorators,
                name,
                template_parameters,
                mixes,
                operations,
            },
            pos,
        )
    }

    /// An interface body item: an operation, with the `op` keyword optional.
    fn parse_interface_member(
        &mut self,
        directives: Vec<NodeIndex>,
        decorators: Vec<NodeIndex>,
    ) -> NodeIndex {
        let pos = self.token_pos();
        self.parse_optional(TokenKind::OpKeyword);
        let name = self.parse_identifier();
        let parameters = self.parse_delimited_list(&OPERATION_PARAMS, Self::parse_model_member);
        self.parse_expected(TokenKind::Colon);
        let return_type = self.parse_expression();
        let node = self.finish_node(
            NodeKind::Operation {
                decorators,
                name,
                parameters,
                return_type,
            },
            pos,
        );
        self.arena.get_mut(node).directives = directives;
        node
    }

    fn parse_operation(&mut self, decorators: Vec<NodeIndex>) -> NodeIndex {
        let pos = self.token_pos();
        self.next_token();
        let name = self.parse_identifier();
        let parameters = self.parse_delimited_list(&OPERATION_PARAMS, Self::parse_model_member);
        self.parse_expected(TokenKind::Colon);
        let return_type = self.parse_expression();
        self.parse_expected(TokenKind::Semicolon);
        self.finish_node(
            NodeKind::Operation {
                decorators,
                name,
                parameters,
                return_type,
            },
            pos,
        )
    }

    fn parse_union(&mut self, decorators: Vec<NodeIndex>) -> NodeIndex {
        let pos = self.token_pos();
        self.next_token();
        let name = self.parse_identifier();
        let template_parameters = self.parse_template_parameters();
        let variants = self.parse_delimited_list(&UNION_BODY, Self::parse_union_variant);
        self.finish_node(
            NodeKind::Union {
                decorators,
                name,
                template_parameters,
                variants,
            },
            pos,
        )
    }

    fn parse_union_variant(
        &mut self,
        directives: Vec<NodeIndex>,
        decorators: Vec<NodeIndex>,
    ) -> NodeIndex {
        let pos = self.token_pos();
        // `name: T` when a name is present; a bare type otherwise. Both can
        // start with an identifier, so look ahead for the colon.
        let named = match self.token {
            TokenKind::StringLiteral | TokenKind::Identifier => self.lookahead(|p| {
                p.next_token();
                p.is_token(TokenKind::Colon)
            }),
            _ => false,
        };
        let name = if named {
            let name = self.parse_property_name();
            self.next_token(); // colon
            name
        } else {
            NodeIndex::NONE
        };
        let value = self.parse_expression();
        let node = self.finish_node(
            NodeKind::UnionVariant {
                decorators,
                name,
                value,
            },
            pos,
        );
        self.arena.get_mut(node).directives = directives;
        node
    }

    fn parse_enum(&mut self, decorators: Vec<NodeIndex>) -> NodeIndex {
        let pos = self.token_pos();
        self.next_token();
        let name = self.parse_identifier();
        let members = self.parse_delimited_list(&ENUM_BODY, Self::parse_enum_member);
        self.finish_node(
            NodeKind::Enum {
                decorators,
                name,
                members,
            },
            pos,
        )
    }

    fn parse_enum_member(
        &mut self,
        directives: Vec<NodeIndex>,
        decorators: Vec<NodeIndex>,
    ) -> NodeIndex {
        let pos = self.token_pos();
        let name = self.parse_property_name();
        let value = if self.parse_optional(TokenKind::Colon) {
            self.parse_expression()
        } else {
            NodeIndex::NONE
        };
        let node = self.finish_node(
            NodeKind::EnumMember {
                decorators,
                name,
                value,
            },
            pos,
        );
        self.arena.get_mut(node).directives = directives;
        node
    }

    fn parse_alias(&mut self) -> NodeIndex {
        let pos = self.token_pos();
        self.next_token();
        let name = self.parse_identifier();
        let template_parameters = self.parse_template_parameters();
        self.parse_expected(TokenKind::Equals);
        let value = self.parse_expression();
        self.parse_expected(TokenKind::Semicolon);
        self.finish_node(
            NodeKind::Alias {
                name,
                template_parameters,
                value,
            },
            pos,
        )
    }

    fn parse_template_parameters(&mut self) -> Vec<NodeIndex> {
        if !self.is_token(TokenKind::LessThan) {
            return Vec::new();
        }
        self.parse_delimited_list(&TEMPLATE_LIST, |p, _, _| {
            let pos = p.token_pos();
            let name = p.parse_identifier();
            p.finish_node(NodeKind::TemplateParameter { name }, pos)
        })
    }

    /// A statement that could not be parsed. Always consumes at least one
    /// token, then skips up to a likely statement boundary, so parsing
    /// always makes progress.
    fn parse_invalid_statement(&mut self) -> NodeIndex {
        let pos = self.token_pos();
        self.printable = false;
        self.error_at(codes::MISSING_TOKEN, self.token_span(), "Statement expected.");
        if !self.is_token(TokenKind::EndOfFile) {
            self.next_token();
        }
        loop {
            match self.token {
                TokenKind::Semicolon => {
                    self.next_token();
                    break;
                }
                TokenKind::CloseBrace
                | TokenKind::EndOfFile
                | TokenKind::ImportKeyword
                | TokenKind::NamespaceKeyword
                | TokenKind::UsingKeyword
                | TokenKind::ModelKeyword
                | TokenKind::InterfaceKeyword
                | TokenKind::UnionKeyword
                | TokenKind::EnumKeyword
                | TokenKind::AliasKeyword
                | TokenKind::OpKeyword
                | TokenKind::At
                | TokenKind::Hash => break,
                _ => {
                    self.next_token();
                }
            }
        }
        self.finish_node_with_flags(NodeKind::Invalid, pos, node_flags::HAS_PARSE_ERROR)
    }

    // =========================================================================
    // Shared list driver
    // =========================================================================

    /// Parse a delimited list. One routine drives every bracketed list in
    /// the grammar; it is guaranteed to terminate: an iteration that
    /// consumes neither a delimiter, the close token, nor any other token
    /// logs a single error at the stall position and exits.
    fn parse_delimited_list(
        &mut self,
        kind: &ListKind,
        parse_item: fn(&mut Self, Vec<NodeIndex>, Vec<NodeIndex>) -> NodeIndex,
    ) -> Vec<NodeIndex> {
        if !self.parse_expected(kind.open) {
            return Vec::new();
        }
        let mut items = Vec::new();
        loop {
            if self.is_token(kind.close) || self.is_token(TokenKind::EndOfFile) {
                break;
            }
            let iteration_start = self.token_pos();

            let (directives, mut decorators) = self.parse_annotations();
            if !kind.allow_annotations {
                self.forbid_decorators(&decorators, "list item");
                for &directive in &directives {
                    let span = self.arena.get(directive).span();
                    self.error_at(
                        codes::INVALID_DIRECTIVE_LOCATION,
                        span,
                        "Directives are not valid here.",
                    );
                }
                decorators.clear();
            }
            if self.is_token(kind.close) || self.is_token(TokenKind::EndOfFile) {
                // Annotations with nothing to attach to.
                for &decorator in &decorators {
                    let span = self.arena.get(decorator).span();
                    self.error_at(
                        codes::INVALID_DECORATOR_LOCATION,
                        span,
                        "Decorator is not followed by a declaration.",
                    );
                }
                break;
            }

            items.push(parse_item(self, directives, decorators));

            let delimited = if self.is_token(kind.delimiter) {
                self.next_token();
                true
            } else if kind.tolerated.is_some_and(|t| self.is_token(t)) {
                if kind.tolerated_warns {
                    let span = self.token_span();
                    let message = format!(
                        "'{}' expected, but found '{}'.",
                        token_display(kind.delimiter),
                        token_display(self.token)
                    );
                    self.warning_at(codes::MISSING_TOKEN, span, message);
                }
                self.next_token();
                true
            } else {
                false
            };

            if delimited {
                if self.is_token(kind.close) {
                    if !kind.allow_trailing {
                        let span = Span::at(self.previous_token_end);
                        self.warning_at(
                            codes::TRAILING_DELIMITER,
                            span,
                            "Trailing delimiter is not allowed here.",
                        );
                    }
                    break;
                }
                continue;
            }
            if self.is_token(kind.close) || self.is_token(TokenKind::EndOfFile) {
                break;
            }
            if self.token_pos() == iteration_start {
                // Stalled: nothing was consumed this iteration.
                self.error_at(
                    codes::MISSING_TOKEN,
                    self.token_span(),
                    format!("Unexpected token '{}'.", token_display(self.token)),
                );
                self.next_token();
                break;
            }
            // The item consumed input but no delimiter follows.
            self.printable = false;
            self.error_at(
                codes::MISSING_TOKEN,
                Span::at(self.previous_token_end),
                format!("'{}' expected.", token_display(kind.delimiter)),
            );
        }
        self.parse_expected(kind.close);
        items
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    /// Precedence, low to high: union `|`, intersection `&`, array `[]`
    /// suffix, primary.
    fn parse_expression(&mut self) -> NodeIndex {
        self.parse_union_expression()
    }

    fn parse_union_expression(&mut self) -> NodeIndex {
        let pos = self.token_pos();
        let first = self.parse_intersection_expression();
        if !self.is_token(TokenKind::Bar) {
            return first;
        }
        let mut options = vec![first];
        while self.parse_optional(TokenKind::Bar) {
            options.push(self.parse_intersection_expression());
        }
        self.finish_node(NodeKind::UnionExpression { options }, pos)
    }

    fn parse_intersection_expression(&mut self) -> NodeIndex {
        let pos = self.token_pos();
        let first = self.parse_array_expression_or_higher();
        if !self.is_token(TokenKind::Ampersand) {
            return first;
        }
        let mut options = vec![first];
        while self.parse_optional(TokenKind::Ampersand) {
            options.push(self.parse_array_expression_or_higher());
        }
        self.finish_node(NodeKind::IntersectionExpression { options }, pos)
    }

    fn parse_array_expression_or_higher(&mut self) -> NodeIndex {
        let pos = self.token_pos();
        let mut expr = self.parse_primary_expression();
        while self.is_token(TokenKind::OpenBracket) {
            self.next_token();
            self.parse_expected(TokenKind::CloseBracket);
            expr = self.finish_node(NodeKind::ArrayExpression { element: expr }, pos);
        }
        expr
    }

    fn parse_primary_expression(&mut self) -> NodeIndex {
        match self.token {
            TokenKind::StringLiteral => self.parse_string_literal(),
            TokenKind::NumericLiteral => {
                let pos = self.token_pos();
                let text = self.scanner.token_value().to_string();
                self.next_token();
                self.finish_node(NodeKind::NumericLiteral { text }, pos)
            }
            TokenKind::TrueKeyword | TokenKind::FalseKeyword => {
                let pos = self.token_pos();
                let value = self.is_token(TokenKind::TrueKeyword);
                self.next_token();
                self.finish_node(NodeKind::BooleanLiteral { value }, pos)
            }
            TokenKind::OpenBrace => {
                let pos = self.token_pos();
                let members = self.parse_delimited_list(&MODEL_BODY, Self::parse_model_member);
                self.finish_node(NodeKind::ModelExpression { members }, pos)
            }
            TokenKind::OpenBracket => {
                let pos = self.token_pos();
                let values = self.parse_delimited_list(&TUPLE_LIST, |p, _, _| p.parse_expression());
                self.finish_node(NodeKind::TupleExpression { values }, pos)
            }
            TokenKind::OpenParen => {
                self.next_token();
                let expr = self.parse_expression();
                self.parse_expected(TokenKind::CloseParen);
                expr
            }
            _ => self.parse_reference(),
        }
    }

    /// A reference expression: `A.B.C<Args>`, the arguments optional.
    fn parse_reference(&mut self) -> NodeIndex {
        let pos = self.token_pos();
        let target = self.parse_member_expression_chain();
        let arguments = if self.is_token(TokenKind::LessThan) {
            self.parse_delimited_list(&TEMPLATE_LIST, |p, _, _| p.parse_expression())
        } else {
            Vec::new()
        };
        self.finish_node(NodeKind::TypeReference { target, arguments }, pos)
    }

    /// `ident(.ident)*` without template arguments; used for decorator
    /// targets and `using` references as well as reference expressions.
    fn parse_member_expression_chain(&mut self) -> NodeIndex {
        let pos = self.token_pos();
        let mut base = self.parse_identifier();
        while self.parse_optional(TokenKind::Dot) {
            let member = self.parse_identifier();
            base = self.finish_node(NodeKind::MemberExpression { base, member }, pos);
        }
        base
    }

    fn parse_identifier(&mut self) -> NodeIndex {
        if self.is_token(TokenKind::Identifier) {
            let pos = self.token_pos();
            let atom = self.interner.intern(self.scanner.token_value());
            self.next_token();
            return self.finish_node(NodeKind::Identifier { atom }, pos);
        }
        if token_is_keyword(self.token) {
            // Keywords are reserved; recover by using the keyword text.
            let pos = self.token_pos();
            let span = self.token_span();
            self.error_at(
                codes::RESERVED_IDENTIFIER,
                span,
                format!("Keyword '{}' cannot be used as an identifier.", token_display(self.token)),
            );
            self.printable = false;
            let atom = self.interner.intern(self.scanner.token_text());
            self.next_token();
            return self.finish_node_with_flags(
                NodeKind::Identifier { atom },
                pos,
                node_flags::HAS_PARSE_ERROR,
            );
        }
        self.error_at(
            codes::MISSING_TOKEN,
            Span::at(self.previous_token_end),
            "Identifier expected.",
        );
        self.create_missing_identifier()
    }

    fn parse_string_literal(&mut self) -> NodeIndex {
        let pos = self.token_pos();
        let value = self.scanner.token_value().to_string();
        self.next_token();
        self.finish_node(NodeKind::StringLiteral { value }, pos)
    }
}

// =============================================================================
// Error flag propagation
// =============================================================================

/// Post-order pass computing `DESCENDANT_HAS_ERROR` for the whole tree.
fn mark_descendant_errors(arena: &mut NodeArena, index: NodeIndex) -> bool {
    let mut children = Vec::new();
    arena.visit_children(index, &mut |child| children.push(child));
    let mut any = false;
    for child in children {
        if mark_descendant_errors(arena, child) {
            any = true;
        }
    }
    let node = arena.get_mut(index);
    if any {
        node.flags |= node_flags::DESCENDANT_HAS_ERROR;
    }
    node.flags |= node_flags::DESCENDANT_EXAMINED;
    any || node.has_parse_error()
}

// =============================================================================
// Tests
// =============================================================================
