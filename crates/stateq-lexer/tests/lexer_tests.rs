//! Lexer tests for the CAS dialect.
//!
//! Covers: keywords, operators, literals, comments, line-break handling,
//! error recovery, and the 100-iteration determinism test.

use stateq_lexer::{Lexer, TokenKind};
use stateq_types::ErrorCode;

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

/// Lex source text and return just the token kinds (excluding final Eof).
fn kinds(source: &str) -> Vec<TokenKind> {
    Lexer::new(source)
        .lex()
        .tokens
        .into_iter()
        .filter(|t| t.kind != TokenKind::Eof)
        .map(|t| t.kind)
        .collect()
}

fn ident(s: &str) -> TokenKind {
    TokenKind::Identifier(s.to_string())
}

fn num(s: &str) -> TokenKind {
    TokenKind::Number(s.to_string())
}

fn error_codes(source: &str) -> Vec<ErrorCode> {
    Lexer::new(source)
        .lex()
        .errors
        .errors
        .iter()
        .map(|e| e.code)
        .collect()
}

// ─────────────────────────────────────────────────────────────────────
// Keywords & identifiers
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_control_keywords() {
    let k = kinds("if a then b elseif c then d else e");
    assert_eq!(
        k,
        vec![
            TokenKind::If,
            ident("a"),
            TokenKind::Then,
            ident("b"),
            TokenKind::Elseif,
            ident("c"),
            TokenKind::Then,
            ident("d"),
            TokenKind::Else,
            ident("e"),
        ]
    );
}

#[test]
fn test_loop_keywords() {
    let k = kinds("for i: 1 step 2 thru n do s");
    assert_eq!(
        k,
        vec![
            TokenKind::For,
            ident("i"),
            TokenKind::Colon,
            num("1"),
            TokenKind::Step,
            num("2"),
            TokenKind::Thru,
            ident("n"),
            TokenKind::Do,
            ident("s"),
        ]
    );
}

#[test]
fn test_percent_identifiers() {
    assert_eq!(kinds("%pi"), vec![ident("%pi")]);
    assert_eq!(kinds("%_prt_s1_p1"), vec![ident("%_prt_s1_p1")]);
    assert_eq!(kinds("ans1"), vec![ident("ans1")]);
}

#[test]
fn test_keyword_prefix_is_identifier() {
    assert_eq!(kinds("iffy"), vec![ident("iffy")]);
    assert_eq!(kinds("format"), vec![ident("format")]);
}

// ─────────────────────────────────────────────────────────────────────
// Operators
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_two_char_operators() {
    assert_eq!(
        kinds(":= <= >= **"),
        vec![
            TokenKind::ColonEq,
            TokenKind::LessEq,
            TokenKind::GreaterEq,
            TokenKind::Caret
        ]
    );
}

#[test]
fn test_single_char_operators() {
    assert_eq!(
        kinds("+ - * / ^ . = # < > : ! '"),
        vec![
            TokenKind::Plus,
            TokenKind::Minus,
            TokenKind::Star,
            TokenKind::Slash,
            TokenKind::Caret,
            TokenKind::Dot,
            TokenKind::Eq,
            TokenKind::Hash,
            TokenKind::Less,
            TokenKind::Greater,
            TokenKind::Colon,
            TokenKind::Bang,
            TokenKind::Quote,
        ]
    );
}

// ─────────────────────────────────────────────────────────────────────
// Literals
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_number_text_is_preserved() {
    assert_eq!(kinds("0.050"), vec![num("0.050")]);
    assert_eq!(kinds("1.5e-3"), vec![num("1.5e-3")]);
    assert_eq!(kinds(".5"), vec![num(".5")]);
}

#[test]
fn test_number_followed_by_dot_operator() {
    assert_eq!(kinds("2.x"), vec![num("2"), TokenKind::Dot, ident("x")]);
}

#[test]
fn test_exponent_needs_digits() {
    assert_eq!(kinds("2e"), vec![num("2"), ident("e")]);
}

#[test]
fn test_string_escapes() {
    assert_eq!(
        kinds(r#""say \"hi\" \\ \frac""#),
        vec![TokenKind::Str(r#"say "hi" \ \frac"#.to_string())]
    );
}

#[test]
fn test_multiline_string() {
    assert_eq!(kinds("\"a\nb\""), vec![TokenKind::Str("a\nb".into())]);
}

// ─────────────────────────────────────────────────────────────────────
// Comments & line breaks
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_comment_skipped() {
    assert_eq!(kinds("a /* note */ + b"), vec![ident("a"), TokenKind::Plus, ident("b")]);
}

#[test]
fn test_newline_separates_statements() {
    assert_eq!(
        kinds("a: 1\nb: 2"),
        vec![
            ident("a"),
            TokenKind::Colon,
            num("1"),
            TokenKind::Newline,
            ident("b"),
            TokenKind::Colon,
            num("2"),
        ]
    );
}

#[test]
fn test_newline_after_operator_is_continuation() {
    assert_eq!(kinds("a +\nb"), vec![ident("a"), TokenKind::Plus, ident("b")]);
}

#[test]
fn test_newline_inside_brackets_is_ignored() {
    assert_eq!(
        kinds("f(a,\nb)\n"),
        vec![
            ident("f"),
            TokenKind::LParen,
            ident("a"),
            TokenKind::Comma,
            ident("b"),
            TokenKind::RParen,
            TokenKind::Newline,
        ]
    );
}

#[test]
fn test_blank_lines_collapse() {
    assert_eq!(
        kinds("a\n\n\nb"),
        vec![ident("a"), TokenKind::Newline, ident("b")]
    );
}

#[test]
fn test_terminators() {
    assert_eq!(
        kinds("a; b$"),
        vec![ident("a"), TokenKind::Semicolon, ident("b"), TokenKind::Dollar]
    );
}

// ─────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_unterminated_string() {
    assert_eq!(error_codes("\"open"), vec![ErrorCode::UNTERMINATED_STRING]);
}

#[test]
fn test_unterminated_comment() {
    assert_eq!(error_codes("a /* open"), vec![ErrorCode::UNTERMINATED_COMMENT]);
}

#[test]
fn test_invalid_character_recovers() {
    let result = Lexer::new("a @ b").lex();
    assert_eq!(result.errors.total_errors, 1);
    assert_eq!(result.errors.errors[0].code, ErrorCode::INVALID_CHARACTER);
    let k: Vec<_> = result.tokens.into_iter().map(|t| t.kind).collect();
    assert_eq!(k, vec![ident("a"), ident("b"), TokenKind::Eof]);
}

#[test]
fn test_error_has_span_and_line() {
    let result = Lexer::new("x\ny ~").lex();
    let err = &result.errors.errors[0];
    let span = err.span.expect("span");
    assert_eq!(span.start_line, 2);
    assert_eq!(span.start_col, 3);
    assert_eq!(err.source_line.as_deref(), Some("y ~"));
}

#[test]
fn test_error_cap() {
    let source = "@".repeat(50);
    let result = Lexer::new(&source).lex();
    assert_eq!(result.errors.errors.len(), stateq_types::MAX_ERRORS);
}

#[test]
fn test_empty_input_is_just_eof() {
    let result = Lexer::new("").lex();
    assert_eq!(result.tokens.len(), 1);
    assert_eq!(result.tokens[0].kind, TokenKind::Eof);
}

// ─────────────────────────────────────────────────────────────────────
// Determinism
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_determinism_100_iterations() {
    let source = "%_r: block([a: 1], for i in [1,2,3] do a: a*i, a)\nstring(%_r), simp=false";
    let first = kinds(source);
    for _ in 0..100 {
        assert_eq!(kinds(source), first);
    }
}

#[test]
fn test_identifier_shape() {
    assert!(stateq_lexer::is_identifier("ans1"));
    assert!(stateq_lexer::is_identifier("%_tmp"));
    assert!(!stateq_lexer::is_identifier("1ans"));
    assert!(!stateq_lexer::is_identifier(""));
    assert!(!stateq_lexer::is_identifier("then"));
    assert!(!stateq_lexer::is_identifier("a-b"));
}
