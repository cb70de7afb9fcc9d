//! Core lexer: converts CAS source text to a token stream.
//!
//! - `/* ... */` comments are skipped (they do not nest)
//! - Line breaks become [`TokenKind::Newline`] only at bracket depth 0 and
//!   only after a token that can end an operand, so expressions may wrap
//!   after an operator or inside brackets
//! - Error recovery: collects up to 20 errors instead of stopping at the first

use stateq_types::{CompileErrors, ErrorCode, QuestionError, SourceText, Span, MAX_ERRORS};

use crate::token::{Token, TokenKind};

pub struct Lexer<'src> {
    source: &'src [u8],
    text: SourceText,
    pos: usize,
    /// Current line number (1-based).
    line: u32,
    /// Current column number (1-based).
    col: u32,
    /// Open `(`, `[` and `{` not yet closed.
    depth: u32,
    errors: CompileErrors,
}

/// Result of lexing: tokens + any errors collected.
pub struct LexResult {
    /// The token stream (always ends with [`TokenKind::Eof`]).
    pub tokens: Vec<Token>,
    pub errors: CompileErrors,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            source: source.as_bytes(),
            text: SourceText::new(source),
            pos: 0,
            line: 1,
            col: 1,
            depth: 0,
            errors: CompileErrors::empty(),
        }
    }

    /// Lex the whole input.
    pub fn lex(mut self) -> LexResult {
        let mut tokens: Vec<Token> = Vec::new();

        loop {
            if self.errors.total_errors >= MAX_ERRORS {
                break;
            }
            let Some(token) = self.scan() else {
                continue;
            };
            if token.kind == TokenKind::Newline {
                let keep = tokens
                    .last()
                    .is_some_and(|prev| prev.kind.ends_operand());
                if !keep {
                    continue;
                }
            }
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }

        if tokens.last().is_none_or(|t| t.kind != TokenKind::Eof) {
            tokens.push(Token::new(TokenKind::Eof, self.current_span()));
        }

        LexResult {
            tokens,
            errors: self.errors,
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Character-level helpers
    // ─────────────────────────────────────────────────────────────

    fn peek(&self) -> Option<u8> {
        self.source.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.source.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let ch = self.source.get(self.pos).copied()?;
        self.pos += 1;
        if ch == b'\n' {
            self.line += 1;
            self.col = 1;
        } else if ch & 0xC0 != 0x80 {
            // Continuation bytes of a UTF-8 sequence do not move the column.
            self.col += 1;
        }
        Some(ch)
    }

    fn current_span(&self) -> Span {
        Span::point(self.line, self.col)
    }

    fn span_from(&self, start_line: u32, start_col: u32) -> Span {
        Span::new(
            start_line,
            start_col,
            self.line,
            self.col.saturating_sub(1).max(1),
        )
    }

    fn lexeme(&self, start: usize) -> String {
        String::from_utf8_lossy(&self.source[start..self.pos]).into_owned()
    }

    fn emit_error(&mut self, code: ErrorCode, message: impl Into<String>, span: Span) {
        let line = self.text.line(span.start_line).unwrap_or("").to_string();
        self.errors
            .push_error(QuestionError::new(code, message).with_span(span, line));
    }

    // ─────────────────────────────────────────────────────────────
    // Whitespace & comments
    // ─────────────────────────────────────────────────────────────

    /// Skip spaces, tabs and carriage returns (newlines are tokens).
    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == b' ' || ch == b'\t' || ch == b'\r' {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Skip a `/* ... */` comment. Returns `true` if one was consumed.
    fn skip_comment(&mut self) -> bool {
        if self.peek() != Some(b'/') || self.peek_at(1) != Some(b'*') {
            return false;
        }
        let start_line = self.line;
        let start_col = self.col;
        self.advance();
        self.advance();
        loop {
            match self.peek() {
                None => {
                    let span = self.span_from(start_line, start_col);
                    self.emit_error(ErrorCode::UNTERMINATED_COMMENT, "Unterminated comment", span);
                    return true;
                }
                Some(b'*') if self.peek_at(1) == Some(b'/') => {
                    self.advance();
                    self.advance();
                    return true;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Scanning
    // ─────────────────────────────────────────────────────────────

    /// Scan one token. `None` means something was skipped (an error was
    /// recorded or a line break inside brackets).
    fn scan(&mut self) -> Option<Token> {
        self.skip_whitespace();
        if self.skip_comment() {
            return None;
        }

        let start = self.pos;
        let start_line = self.line;
        let start_col = self.col;
        let Some(ch) = self.advance() else {
            return Some(Token::new(TokenKind::Eof, self.current_span()));
        };

        let kind = match ch {
            b'\n' => {
                if self.depth > 0 {
                    return None;
                }
                TokenKind::Newline
            }
            b'"' => return Some(self.scan_string(start_line, start_col)),
            b'0'..=b'9' => self.scan_number(start),
            b'.' if matches!(self.peek(), Some(b'0'..=b'9')) => self.scan_number(start),
            b'a'..=b'z' | b'A'..=b'Z' | b'_' | b'%' => self.scan_identifier(start),

            b'+' => TokenKind::Plus,
            b'-' => TokenKind::Minus,
            b'*' => {
                if self.peek() == Some(b'*') {
                    self.advance();
                    TokenKind::Caret
                } else {
                    TokenKind::Star
                }
            }
            b'/' => TokenKind::Slash,
            b'^' => TokenKind::Caret,
            b'.' => TokenKind::Dot,
            b'=' => TokenKind::Eq,
            b'#' => TokenKind::Hash,
            b'<' => {
                if self.peek() == Some(b'=') {
                    self.advance();
                    TokenKind::LessEq
                } else {
                    TokenKind::Less
                }
            }
            b'>' => {
                if self.peek() == Some(b'=') {
                    self.advance();
                    TokenKind::GreaterEq
                } else {
                    TokenKind::Greater
                }
            }
            b':' => {
                if self.peek() == Some(b'=') {
                    self.advance();
                    TokenKind::ColonEq
                } else {
                    TokenKind::Colon
                }
            }
            b'!' => TokenKind::Bang,
            b'\'' => TokenKind::Quote,
            b'(' => {
                self.depth += 1;
                TokenKind::LParen
            }
            b'[' => {
                self.depth += 1;
                TokenKind::LBracket
            }
            b'{' => {
                self.depth += 1;
                TokenKind::LBrace
            }
            b')' => {
                self.depth = self.depth.saturating_sub(1);
                TokenKind::RParen
            }
            b']' => {
                self.depth = self.depth.saturating_sub(1);
                TokenKind::RBracket
            }
            b'}' => {
                self.depth = self.depth.saturating_sub(1);
                TokenKind::RBrace
            }
            b',' => TokenKind::Comma,
            b';' => TokenKind::Semicolon,
            b'$' => TokenKind::Dollar,
            _ => {
                // Swallow the rest of a multi-byte character.
                while self.peek().is_some_and(|b| b & 0xC0 == 0x80) {
                    self.advance();
                }
                let span = self.span_from(start_line, start_col);
                let text = self.lexeme(start);
                self.emit_error(
                    ErrorCode::INVALID_CHARACTER,
                    format!("Unexpected character '{text}'"),
                    span,
                );
                return None;
            }
        };

        Some(Token::new(kind, self.span_from(start_line, start_col)))
    }

    // ─────────────────────────────────────────────────────────────
    // Number literals
    // ─────────────────────────────────────────────────────────────

    /// Digits, an optional fraction and an optional exponent. The first
    /// character (digit or `.`) is already consumed.
    fn scan_number(&mut self, start: usize) -> TokenKind {
        while let Some(b'0'..=b'9') = self.peek() {
            self.advance();
        }
        if self.source[start] != b'.'
            && self.peek() == Some(b'.')
            && matches!(self.peek_at(1), Some(b'0'..=b'9'))
        {
            self.advance();
            while let Some(b'0'..=b'9') = self.peek() {
                self.advance();
            }
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            let digits_at = match self.peek_at(1) {
                Some(b'+' | b'-') => 2,
                _ => 1,
            };
            if matches!(self.peek_at(digits_at), Some(b'0'..=b'9')) {
                for _ in 0..digits_at {
                    self.advance();
                }
                while let Some(b'0'..=b'9') = self.peek() {
                    self.advance();
                }
            }
        }
        TokenKind::Number(self.lexeme(start))
    }

    // ─────────────────────────────────────────────────────────────
    // Identifiers & keywords
    // ─────────────────────────────────────────────────────────────

    fn scan_identifier(&mut self, start: usize) -> TokenKind {
        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == b'_' || ch == b'%' {
                self.advance();
            } else {
                break;
            }
        }
        let text = self.lexeme(start);
        TokenKind::from_keyword(&text).unwrap_or(TokenKind::Identifier(text))
    }

    // ─────────────────────────────────────────────────────────────
    // String literals
    // ─────────────────────────────────────────────────────────────

    /// Scan a string literal after the opening `"`. Strings may span
    /// lines. `\"` and `\\` are escapes; any other backslash is kept
    /// verbatim so LaTeX survives.
    fn scan_string(&mut self, start_line: u32, start_col: u32) -> Token {
        let mut buf: Vec<u8> = Vec::new();
        loop {
            match self.peek() {
                None => {
                    let span = self.span_from(start_line, start_col);
                    self.emit_error(
                        ErrorCode::UNTERMINATED_STRING,
                        "Unterminated string literal",
                        span,
                    );
                    break;
                }
                Some(b'"') => {
                    self.advance();
                    break;
                }
                Some(b'\\') => {
                    self.advance();
                    match self.peek() {
                        Some(b'"') => {
                            self.advance();
                            buf.push(b'"');
                        }
                        Some(b'\\') => {
                            self.advance();
                            buf.push(b'\\');
                        }
                        _ => buf.push(b'\\'),
                    }
                }
                Some(ch) => {
                    self.advance();
                    buf.push(ch);
                }
            }
        }
        let text = String::from_utf8_lossy(&buf).into_owned();
        Token::new(TokenKind::Str(text), self.span_from(start_line, start_col))
    }
}
