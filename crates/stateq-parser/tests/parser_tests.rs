//! Parser tests for the CAS dialect.
//!
//! Covers: precedence and associativity, control forms, statements and
//! evaluation flags, print/reparse stability, error recovery, and
//! determinism.

use stateq_parser::{parse_expression, parse_fragment};
use stateq_types::{BinOp, CasExpr, CasKind, ErrorCode, Fragment, LoopSource, PrefixOp};

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

fn expr_ok(source: &str) -> CasExpr {
    let result = parse_expression(source);
    if result.errors.has_errors() {
        for e in &result.errors.errors {
            eprintln!("  ERROR: {} ({})", e.message, e.code);
        }
        panic!("unexpected parse errors for {source:?}");
    }
    result.value.expect("no expression returned")
}

fn fragment_ok(source: &str) -> Fragment {
    parse_fragment(source)
        .into_result()
        .unwrap_or_else(|e| panic!("unexpected parse errors for {source:?}: {:?}", e.errors))
}

fn first_error_code(source: &str) -> Option<ErrorCode> {
    parse_fragment(source).errors.errors.first().map(|e| e.code)
}

/// Parse, print, and check the printed form.
fn canonical(source: &str) -> String {
    expr_ok(source).to_string()
}

// ─────────────────────────────────────────────────────────────────────
// Precedence
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_mul_binds_tighter_than_add() {
    let e = expr_ok("a + b * c");
    let CasKind::Binary { op, right, .. } = &e.kind else {
        panic!("expected binary");
    };
    assert_eq!(*op, BinOp::Add);
    assert!(matches!(right.kind, CasKind::Binary { op: BinOp::Mul, .. }));
}

#[test]
fn test_power_is_right_associative() {
    assert_eq!(canonical("x^y^z"), "x^y^z");
    let e = expr_ok("x^y^z");
    let CasKind::Binary { left, .. } = &e.kind else {
        panic!("expected binary");
    };
    assert_eq!(left.as_ident(), Some("x"));
}

#[test]
fn test_double_star_is_power() {
    assert_eq!(canonical("x**2"), "x^2");
}

#[test]
fn test_unary_minus_below_power() {
    let e = expr_ok("-x^2");
    assert!(matches!(
        e.kind,
        CasKind::Prefix {
            op: PrefixOp::Neg,
            ..
        }
    ));
    assert_eq!(canonical("(-x)^2"), "(-x)^2");
}

#[test]
fn test_subtraction_is_left_associative() {
    assert_eq!(canonical("a - (b - c)"), "a-(b-c)");
    assert_eq!(canonical("(a - b) - c"), "a-b-c");
}

#[test]
fn test_assignment_is_right_associative() {
    let e = expr_ok("a: b: 3");
    let CasKind::Binary { op, right, .. } = &e.kind else {
        panic!("expected binary");
    };
    assert_eq!(*op, BinOp::Assign);
    assert!(matches!(right.kind, CasKind::Binary { op: BinOp::Assign, .. }));
}

#[test]
fn test_not_and_or() {
    assert_eq!(canonical("not a = b and c or d"), "not a=b and c or d");
    let e = expr_ok("not a and b");
    assert!(matches!(e.kind, CasKind::Binary { op: BinOp::And, .. }));
}

#[test]
fn test_function_definition() {
    let e = expr_ok("f(x) := x^2");
    let CasKind::Binary { op, left, .. } = &e.kind else {
        panic!("expected binary");
    };
    assert_eq!(*op, BinOp::Define);
    assert!(left.call_args("f").is_some());
}

#[test]
fn test_postfix_forms() {
    assert_eq!(canonical("l[1, 2]"), "l[1, 2]");
    assert_eq!(canonical("n!"), "n!");
    assert_eq!(canonical("'diff(y, x)"), "'diff(y, x)");
}

// ─────────────────────────────────────────────────────────────────────
// Collections & control forms
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_collections() {
    assert!(matches!(expr_ok("[]").kind, CasKind::List(ref v) if v.is_empty()));
    assert!(matches!(expr_ok("{1, 2}").kind, CasKind::Set(ref v) if v.len() == 2));
    assert!(matches!(expr_ok("(a: 1, a + 1)").kind, CasKind::Group(ref v) if v.len() == 2));
    assert_eq!(expr_ok("(a)").as_ident(), Some("a"));
}

#[test]
fn test_if_elseif_else() {
    let e = expr_ok("if x > 0 then 1 elseif x < 0 then -1 else 0");
    let CasKind::If {
        branches,
        otherwise,
    } = &e.kind
    else {
        panic!("expected if");
    };
    assert_eq!(branches.len(), 2);
    assert!(otherwise.is_some());
}

#[test]
fn test_if_body_extends_right() {
    let e = expr_ok("if a then b else c + 1");
    let CasKind::If { otherwise, .. } = &e.kind else {
        panic!("expected if");
    };
    assert!(matches!(
        otherwise.as_deref().map(|o| &o.kind),
        Some(CasKind::Binary { op: BinOp::Add, .. })
    ));
}

#[test]
fn test_for_in() {
    let e = expr_ok("for x in [1, 2] do s: s + x");
    let CasKind::For { var, source, .. } = &e.kind else {
        panic!("expected for");
    };
    assert_eq!(var, "x");
    assert!(matches!(source, LoopSource::In(_)));
}

#[test]
fn test_for_range_with_step() {
    let e = expr_ok("for i: 1 step 2 thru 9 do s: s + i");
    let CasKind::For { source, .. } = &e.kind else {
        panic!("expected for");
    };
    let LoopSource::Range { step, .. } = source else {
        panic!("expected range");
    };
    assert!(step.is_some());
}

#[test]
fn test_if_continues_across_lines() {
    let f = fragment_ok("r: if a\nthen 1\nelse 2\ns: 3");
    assert_eq!(f.statements.len(), 2);
}

// ─────────────────────────────────────────────────────────────────────
// Statements & flags
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_statement_separators() {
    let f = fragment_ok("a: 1; b: 2$ c: 3\nd: 4");
    assert_eq!(f.statements.len(), 4);
}

#[test]
fn test_eval_flags() {
    let f = fragment_ok("expand((x+1)^2), simp=false");
    let s = &f.statements[0];
    let flag = s.flag("simp").expect("simp flag");
    assert_eq!(flag.value.as_ref().and_then(|v| match v.kind {
        CasKind::Bool(b) => Some(b),
        _ => None,
    }), Some(false));
    assert_eq!(s.to_string(), "expand((x+1)^2), simp=false");
}

#[test]
fn test_bare_flag() {
    let f = fragment_ok("x + x, simp");
    assert!(f.statements[0].flag("simp").unwrap().value.is_none());
}

#[test]
fn test_empty_fragment() {
    assert!(fragment_ok("").is_empty());
    assert!(fragment_ok(" ;;\n /* nothing */ ").is_empty());
}

// ─────────────────────────────────────────────────────────────────────
// Print / reparse
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_printed_form_reparses_to_same_tree() {
    let sources = [
        "a: b + c * d",
        "f(x) := block([t: x], t^2)",
        "if a and not b then sconcat(\"x\", \"y\") else \"\"",
        "-(a + b) * c",
        "x^(-1)",
        "for i: 1 thru n do (s: s + i, t: t * i)",
        "[1, -2.5, \"q\\\"uote\", true, {a}]",
        "a # b",
        "errcatch(block([simp: false], ATAlgEquiv(ans1, x^2)))",
    ];
    for source in sources {
        let first = expr_ok(source);
        let printed = first.to_string();
        let second = expr_ok(&printed);
        assert_eq!(first, second, "{source} printed as {printed}");
    }
}

// ─────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_chained_comparison_rejected() {
    assert_eq!(first_error_code("a < b < c"), Some(ErrorCode::CHAINED_COMPARISON));
}

#[test]
fn test_unclosed_call() {
    assert_eq!(first_error_code("f(a, b"), Some(ErrorCode::UNCLOSED_DELIMITER));
}

#[test]
fn test_missing_operand() {
    assert_eq!(first_error_code("a +"), Some(ErrorCode::EMPTY_EXPRESSION));
}

#[test]
fn test_unexpected_token() {
    assert_eq!(first_error_code("a b"), Some(ErrorCode::UNEXPECTED_TOKEN));
}

#[test]
fn test_recovery_continues_after_bad_statement() {
    let result = parse_fragment("a: ; b: 2; c: )");
    assert_eq!(result.errors.total_errors, 2);
    let fragment = result.value.unwrap();
    assert_eq!(fragment.statements.len(), 1);
}

#[test]
fn test_single_expression_rejects_flags_and_extra_statements() {
    let flagged = parse_expression("x, simp");
    assert_eq!(flagged.errors.errors[0].code, ErrorCode::MISPLACED_EVAL_FLAG);
    let two = parse_expression("a; b");
    assert_eq!(two.errors.errors[0].code, ErrorCode::UNEXPECTED_TOKEN);
    let empty = parse_expression("  ");
    assert_eq!(empty.errors.errors[0].code, ErrorCode::EMPTY_EXPRESSION);
}

#[test]
fn test_lexer_errors_are_reported() {
    let result = parse_expression("\"open");
    assert_eq!(result.errors.errors[0].code, ErrorCode::UNTERMINATED_STRING);
}

// ─────────────────────────────────────────────────────────────────────
// Determinism
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_determinism_100_iterations() {
    let source = "q: rand(5) + 1;\nf(x) := if x > q then \"big\" else \"small\"\nans: f(3), simp";
    let first = fragment_ok(source).to_string();
    for _ in 0..100 {
        assert_eq!(fragment_ok(source).to_string(), first);
    }
}
