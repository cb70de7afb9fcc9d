//! Token types for the CAS dialect.
//!
//! Defines [`TokenKind`] covering every lexeme the dialect uses and
//! [`Token`], which pairs a kind with a source [`Span`].

use stateq_types::Span;
use std::fmt;

/// Reserved words. They cannot be used as variable names.
pub const ALL_KEYWORDS: &[&str] = &[
    "if", "then", "elseif", "else", "for", "in", "do", "thru", "step", "and", "or", "not",
    "true", "false",
];

// ─────────────────────────────────────────────────────────────────────
// Token
// ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn is_keyword(&self) -> bool {
        self.kind.is_keyword()
    }
}

// ─────────────────────────────────────────────────────────────────────
// TokenKind
// ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // ── Literals ──────────────────────────────────────────────
    /// Numeric literal with its source text: `42`, `0.05`, `1.5e-3`
    Number(String),
    /// String literal, escapes resolved.
    Str(String),
    True,
    False,

    /// `x`, `%pi`, `%_score`
    Identifier(String),

    // ── Keywords ─────────────────────────────────────────────
    If,
    Then,
    Elseif,
    Else,
    For,
    In,
    Do,
    Thru,
    Step,
    And,
    Or,
    Not,

    // ── Operators ────────────────────────────────────────────
    Plus,
    Minus,
    Star,
    Slash,
    /// `^` or `**`
    Caret,
    Dot,
    Eq,
    /// `#`
    Hash,
    Less,
    Greater,
    LessEq,
    GreaterEq,
    Colon,
    /// `:=`
    ColonEq,
    Bang,
    /// `'`
    Quote,

    // ── Punctuation ──────────────────────────────────────────
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Semicolon,
    /// `$`, a statement terminator that suppresses display.
    Dollar,

    /// Line break outside any bracket, after a complete operand.
    Newline,
    Eof,
}

impl TokenKind {
    pub fn from_keyword(s: &str) -> Option<TokenKind> {
        match s {
            "if" => Some(TokenKind::If),
            "then" => Some(TokenKind::Then),
            "elseif" => Some(TokenKind::Elseif),
            "else" => Some(TokenKind::Else),
            "for" => Some(TokenKind::For),
            "in" => Some(TokenKind::In),
            "do" => Some(TokenKind::Do),
            "thru" => Some(TokenKind::Thru),
            "step" => Some(TokenKind::Step),
            "and" => Some(TokenKind::And),
            "or" => Some(TokenKind::Or),
            "not" => Some(TokenKind::Not),
            "true" => Some(TokenKind::True),
            "false" => Some(TokenKind::False),
            _ => None,
        }
    }

    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            TokenKind::If
                | TokenKind::Then
                | TokenKind::Elseif
                | TokenKind::Else
                | TokenKind::For
                | TokenKind::In
                | TokenKind::Do
                | TokenKind::Thru
                | TokenKind::Step
                | TokenKind::And
                | TokenKind::Or
                | TokenKind::Not
                | TokenKind::True
                | TokenKind::False
        )
    }

    /// Can this token end an operand? A following line break then ends
    /// the statement.
    pub fn ends_operand(&self) -> bool {
        matches!(
            self,
            TokenKind::Number(_)
                | TokenKind::Str(_)
                | TokenKind::True
                | TokenKind::False
                | TokenKind::Identifier(_)
                | TokenKind::RParen
                | TokenKind::RBracket
                | TokenKind::RBrace
                | TokenKind::Bang
        )
    }

    /// Keywords that continue a construct started on an earlier line.
    pub fn continues_statement(&self) -> bool {
        matches!(
            self,
            TokenKind::Then
                | TokenKind::Elseif
                | TokenKind::Else
                | TokenKind::Do
                | TokenKind::In
                | TokenKind::Thru
                | TokenKind::Step
        )
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            TokenKind::Semicolon | TokenKind::Dollar | TokenKind::Newline | TokenKind::Eof
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Number(n) => f.write_str(n),
            TokenKind::Str(s) => write!(f, "\"{s}\""),
            TokenKind::True => f.write_str("true"),
            TokenKind::False => f.write_str("false"),
            TokenKind::Identifier(s) => f.write_str(s),
            TokenKind::If => f.write_str("if"),
            TokenKind::Then => f.write_str("then"),
            TokenKind::Elseif => f.write_str("elseif"),
            TokenKind::Else => f.write_str("else"),
            TokenKind::For => f.write_str("for"),
            TokenKind::In => f.write_str("in"),
            TokenKind::Do => f.write_str("do"),
            TokenKind::Thru => f.write_str("thru"),
            TokenKind::Step => f.write_str("step"),
            TokenKind::And => f.write_str("and"),
            TokenKind::Or => f.write_str("or"),
            TokenKind::Not => f.write_str("not"),
            TokenKind::Plus => f.write_str("+"),
            TokenKind::Minus => f.write_str("-"),
            TokenKind::Star => f.write_str("*"),
            TokenKind::Slash => f.write_str("/"),
            TokenKind::Caret => f.write_str("^"),
            TokenKind::Dot => f.write_str("."),
            TokenKind::Eq => f.write_str("="),
            TokenKind::Hash => f.write_str("#"),
            TokenKind::Less => f.write_str("<"),
            TokenKind::Greater => f.write_str(">"),
            TokenKind::LessEq => f.write_str("<="),
            TokenKind::GreaterEq => f.write_str(">="),
            TokenKind::Colon => f.write_str(":"),
            TokenKind::ColonEq => f.write_str(":="),
            TokenKind::Bang => f.write_str("!"),
            TokenKind::Quote => f.write_str("'"),
            TokenKind::LParen => f.write_str("("),
            TokenKind::RParen => f.write_str(")"),
            TokenKind::LBracket => f.write_str("["),
            TokenKind::RBracket => f.write_str("]"),
            TokenKind::LBrace => f.write_str("{"),
            TokenKind::RBrace => f.write_str("}"),
            TokenKind::Comma => f.write_str(","),
            TokenKind::Semicolon => f.write_str(";"),
            TokenKind::Dollar => f.write_str("$"),
            TokenKind::Newline => f.write_str("newline"),
            TokenKind::Eof => f.write_str("end of input"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────
