//! Tokenizer for the CAS expression dialect.

pub mod lexer;
pub mod token;

pub use lexer::{LexResult, Lexer};
pub use token::{Token, TokenKind, ALL_KEYWORDS};

/// `[A-Za-z_%][A-Za-z0-9_%]*` and not a reserved word.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_' || first == '%')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '%')
        && !ALL_KEYWORDS.contains(&name)
}
