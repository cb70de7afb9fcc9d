//! Core parser infrastructure: token cursor, error reporting, entry points.

use stateq_lexer::token::{Token, TokenKind};
use stateq_lexer::Lexer;
use stateq_types::{
    CasExpr, CompileErrors, ErrorCode, Fragment, QuestionError, SourceText, Span, MAX_ERRORS,
};

/// Nesting limit for expressions; generated code nests deeper than author
/// code, so this is generous.
pub(crate) const MAX_EXPR_DEPTH: u32 = 256;

/// The CAS parser.
///
/// Consumes a token stream produced by the lexer and builds CAS trees.
/// Collects errors and attempts recovery at statement boundaries.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    text: SourceText,
    errors: CompileErrors,
    pub(crate) expr_depth: u32,
}

/// Result of parsing: the value when parsing succeeded, plus diagnostics.
#[derive(Debug)]
pub struct ParseResult<T> {
    pub value: Option<T>,
    pub errors: CompileErrors,
}

impl<T> ParseResult<T> {
    /// `Ok` only when a value was produced and no error was reported.
    pub fn into_result(self) -> Result<T, CompileErrors> {
        match self.value {
            Some(value) if !self.errors.has_errors() => Ok(value),
            _ => Err(self.errors),
        }
    }
}

/// Lex and parse a statement list.
pub fn parse_fragment(source: &str) -> ParseResult<Fragment> {
    let lexed = Lexer::new(source).lex();
    let mut parser = Parser::new(lexed.tokens, source);
    parser.errors = lexed.errors;
    let fragment = parser.parse_fragment();
    ParseResult {
        value: Some(fragment),
        errors: parser.errors,
    }
}

/// Lex and parse a single expression. Flags, terminators and further
/// statements are rejected.
pub fn parse_expression(source: &str) -> ParseResult<CasExpr> {
    let lexed = Lexer::new(source).lex();
    let mut parser = Parser::new(lexed.tokens, source);
    parser.errors = lexed.errors;
    let value = parser.parse_single_expression();
    ParseResult {
        value,
        errors: parser.errors,
    }
}

impl Parser {
    pub fn new(tokens: Vec<Token>, source: &str) -> Self {
        Self {
            tokens,
            pos: 0,
            text: SourceText::new(source),
            errors: CompileErrors::empty(),
            expr_depth: 0,
        }
    }

    // ── Token Cursor ──────────────────────────────────────────────────────────

    /// Returns the kind of the current token.
    pub(crate) fn peek_kind(&self) -> &TokenKind {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    /// Advance the cursor by one and return the consumed token's span.
    pub(crate) fn advance(&mut self) -> Span {
        let span = self.current_span();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        span
    }

    /// Returns the previously consumed token's span.
    pub(crate) fn previous_span(&self) -> Span {
        if self.pos > 0 {
            self.tokens[self.pos - 1].span
        } else {
            Span::point(1, 1)
        }
    }

    pub(crate) fn current_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.span)
            .unwrap_or_else(|| Span::point(1, 1))
    }

    pub(crate) fn at_end(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    pub(crate) fn check(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    /// If the current token matches, advance and return `true`.
    pub(crate) fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Look ahead by `n` tokens from the current position.
    pub(crate) fn look_ahead(&self, n: usize) -> &TokenKind {
        self.tokens
            .get(self.pos + n)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    /// Step over a line break that is followed by a continuation keyword
    /// (`then`, `else`, `do`, ...).
    pub(crate) fn skip_continuation_newline(&mut self) {
        if self.check(&TokenKind::Newline) && self.look_ahead(1).continues_statement() {
            self.advance();
        }
    }

    // ── Expect Helpers ────────────────────────────────────────────────────────

    /// Expect a specific token kind. Emits an error on mismatch.
    pub(crate) fn expect(&mut self, expected: &TokenKind) -> Option<Span> {
        if self.check(expected) {
            Some(self.advance())
        } else {
            self.error_at_current(
                ErrorCode::UNEXPECTED_TOKEN,
                format!("expected '{}', got '{}'", expected, self.peek_kind()),
            );
            None
        }
    }

    /// Expect an identifier token. Returns the name.
    pub(crate) fn expect_identifier(&mut self) -> Option<String> {
        match self.peek_kind().clone() {
            TokenKind::Identifier(name) => {
                self.advance();
                Some(name)
            }
            _ => {
                self.error_at_current(
                    ErrorCode::UNEXPECTED_TOKEN,
                    format!("expected identifier, got '{}'", self.peek_kind()),
                );
                None
            }
        }
    }

    // ── Error Reporting ───────────────────────────────────────────────────────

    pub(crate) fn error_at_current(&mut self, code: ErrorCode, message: impl Into<String>) {
        let span = self.current_span();
        self.error_at(code, message, span);
    }

    pub(crate) fn error_at(&mut self, code: ErrorCode, message: impl Into<String>, span: Span) {
        let source_line = self.text.line(span.start_line).unwrap_or("").to_string();
        self.errors
            .push_error(QuestionError::new(code, message).with_span(span, source_line));
    }

    /// Returns `true` if we've hit the error limit and should stop.
    pub(crate) fn too_many_errors(&self) -> bool {
        self.errors.total_errors >= MAX_ERRORS
    }

    // ── Synchronization ───────────────────────────────────────────────────────

    /// Skip to just past the next statement terminator.
    pub(crate) fn synchronize(&mut self) {
        while !self.at_end() {
            if matches!(
                self.peek_kind(),
                TokenKind::Semicolon | TokenKind::Dollar | TokenKind::Newline
            ) {
                self.advance();
                return;
            }
            self.advance();
        }
    }

    // ── Public API ────────────────────────────────────────────────────────────

    pub fn errors(&self) -> &CompileErrors {
        &self.errors
    }
}
