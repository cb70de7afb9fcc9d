//! Expression parsing with full operator precedence.
//!
//! Precedence (lowest → highest):
//! 10. `:` `:=` (right-associative)
//! 9. `or`
//! 8. `and`
//! 7. `not`
//! 6. `=` `#` `<` `>` `<=` `>=` (no chaining)
//! 5. `+` `-`
//! 4. `*` `/` `.`
//! 3. unary `-`
//! 2. `^` (right-associative)
//! 1. `'`, postfix `!`, call, index
//!
//! `if` and `for` are primaries whose bodies extend as far right as
//! possible.

use stateq_lexer::token::TokenKind;
use stateq_types::{BinOp, CasExpr, CasKind, ErrorCode, LoopSource, PostfixOp, PrefixOp, Span};

use crate::parser::{Parser, MAX_EXPR_DEPTH};

impl Parser {
    // ══════════════════════════════════════════════════════════════════════════
    // Entry Point
    // ══════════════════════════════════════════════════════════════════════════

    pub(crate) fn parse_expression(&mut self) -> Option<CasExpr> {
        self.expr_depth += 1;
        if self.expr_depth > MAX_EXPR_DEPTH {
            self.error_at_current(
                ErrorCode::STRUCTURAL_LIMIT_EXCEEDED,
                format!("maximum expression nesting depth is {MAX_EXPR_DEPTH}"),
            );
            self.expr_depth -= 1;
            return None;
        }
        let result = self.parse_assignment();
        self.expr_depth -= 1;
        result
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Precedence Chain
    // ══════════════════════════════════════════════════════════════════════════

    /// `Assign = OrExpr [ (":" | ":=") Assign ]`
    fn parse_assignment(&mut self) -> Option<CasExpr> {
        let left = self.parse_or()?;
        let op = match self.peek_kind() {
            TokenKind::Colon => BinOp::Assign,
            TokenKind::ColonEq => BinOp::Define,
            _ => return Some(left),
        };
        self.advance();
        let right = self.parse_assignment()?;
        Some(binary(op, left, right))
    }

    /// `OrExpr = AndExpr { "or" AndExpr }`
    fn parse_or(&mut self) -> Option<CasExpr> {
        let mut left = self.parse_and()?;
        while self.eat(&TokenKind::Or) {
            let right = self.parse_and()?;
            left = binary(BinOp::Or, left, right);
        }
        Some(left)
    }

    /// `AndExpr = NotExpr { "and" NotExpr }`
    fn parse_and(&mut self) -> Option<CasExpr> {
        let mut left = self.parse_not()?;
        while self.eat(&TokenKind::And) {
            let right = self.parse_not()?;
            left = binary(BinOp::And, left, right);
        }
        Some(left)
    }

    /// `NotExpr = "not" NotExpr | CompExpr`
    fn parse_not(&mut self) -> Option<CasExpr> {
        if self.check(&TokenKind::Not) {
            let start = self.advance();
            let operand = self.parse_not()?;
            return Some(prefix(PrefixOp::Not, operand, start));
        }
        self.parse_comparison()
    }

    /// `CompExpr = AddExpr [ CompOp AddExpr ]`
    ///
    /// Relational operators do not chain: `a < b < c` is an error.
    fn parse_comparison(&mut self) -> Option<CasExpr> {
        let left = self.parse_additive()?;
        let Some(op) = self.match_comparison_op() else {
            return Some(left);
        };
        self.advance();
        let right = self.parse_additive()?;
        if self.match_comparison_op().is_some() {
            self.error_at_current(
                ErrorCode::CHAINED_COMPARISON,
                "comparison operators cannot be chained",
            );
            return None;
        }
        Some(binary(op, left, right))
    }

    fn match_comparison_op(&self) -> Option<BinOp> {
        match self.peek_kind() {
            TokenKind::Eq => Some(BinOp::Eq),
            TokenKind::Hash => Some(BinOp::NotEq),
            TokenKind::Less => Some(BinOp::Less),
            TokenKind::Greater => Some(BinOp::Greater),
            TokenKind::LessEq => Some(BinOp::LessEq),
            TokenKind::GreaterEq => Some(BinOp::GreaterEq),
            _ => None,
        }
    }

    /// `AddExpr = MulExpr { ("+" | "-") MulExpr }`
    pub(crate) fn parse_additive(&mut self) -> Option<CasExpr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right);
        }
        Some(left)
    }

    /// `MulExpr = UnaryExpr { ("*" | "/" | ".") UnaryExpr }`
    fn parse_multiplicative(&mut self) -> Option<CasExpr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Dot => BinOp::Dot,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }
        Some(left)
    }

    /// `UnaryExpr = ("-" | "+") UnaryExpr | PowerExpr`
    fn parse_unary(&mut self) -> Option<CasExpr> {
        match self.peek_kind() {
            TokenKind::Minus => {
                let start = self.advance();
                let operand = self.parse_unary()?;
                Some(prefix(PrefixOp::Neg, operand, start))
            }
            TokenKind::Plus => {
                self.advance();
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    /// `PowerExpr = QuoteExpr [ "^" UnaryExpr ]`
    fn parse_power(&mut self) -> Option<CasExpr> {
        let base = self.parse_quote()?;
        if self.eat(&TokenKind::Caret) {
            let exponent = self.parse_unary()?;
            return Some(binary(BinOp::Pow, base, exponent));
        }
        Some(base)
    }

    /// `QuoteExpr = "'" QuoteExpr | PostfixExpr`
    fn parse_quote(&mut self) -> Option<CasExpr> {
        if self.check(&TokenKind::Quote) {
            let start = self.advance();
            let operand = self.parse_quote()?;
            return Some(prefix(PrefixOp::Quote, operand, start));
        }
        self.parse_postfix()
    }

    /// `PostfixExpr = Primary { "(" Args ")" | "[" Args "]" | "!" }`
    fn parse_postfix(&mut self) -> Option<CasExpr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek_kind() {
                TokenKind::LParen => {
                    let CasKind::Ident(name) = &expr.kind else {
                        break;
                    };
                    let name = name.clone();
                    self.advance();
                    let args = self.parse_comma_list(&TokenKind::RParen)?;
                    let span = expr.span.merge(self.previous_span());
                    expr = CasExpr::new(CasKind::Call { name, args }, span);
                }
                TokenKind::LBracket => {
                    self.advance();
                    let indices = self.parse_comma_list(&TokenKind::RBracket)?;
                    if indices.is_empty() {
                        self.error_at(
                            ErrorCode::EMPTY_EXPRESSION,
                            "index needs at least one expression",
                            self.previous_span(),
                        );
                        return None;
                    }
                    let span = expr.span.merge(self.previous_span());
                    expr = CasExpr::new(
                        CasKind::Index {
                            target: Box::new(expr),
                            indices,
                        },
                        span,
                    );
                }
                TokenKind::Bang => {
                    let end = self.advance();
                    let span = expr.span.merge(end);
                    expr = CasExpr::new(
                        CasKind::Postfix {
                            op: PostfixOp::Factorial,
                            operand: Box::new(expr),
                        },
                        span,
                    );
                }
                _ => break,
            }
        }
        Some(expr)
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Primary Expressions
    // ══════════════════════════════════════════════════════════════════════════

    fn parse_primary(&mut self) -> Option<CasExpr> {
        let span = self.current_span();
        match self.peek_kind().clone() {
            TokenKind::Number(text) => {
                self.advance();
                Some(CasExpr::new(CasKind::Number(text), span))
            }
            TokenKind::Str(s) => {
                self.advance();
                Some(CasExpr::new(CasKind::Str(s), span))
            }
            TokenKind::True => {
                self.advance();
                Some(CasExpr::new(CasKind::Bool(true), span))
            }
            TokenKind::False => {
                self.advance();
                Some(CasExpr::new(CasKind::Bool(false), span))
            }
            TokenKind::Identifier(name) => {
                self.advance();
                Some(CasExpr::new(CasKind::Ident(name), span))
            }
            TokenKind::LParen => {
                self.advance();
                let mut items = self.parse_comma_list(&TokenKind::RParen)?;
                let span = span.merge(self.previous_span());
                match items.len() {
                    0 => {
                        self.error_at(ErrorCode::EMPTY_EXPRESSION, "empty parentheses", span);
                        None
                    }
                    1 => items.pop(),
                    _ => Some(CasExpr::new(CasKind::Group(items), span)),
                }
            }
            TokenKind::LBracket => {
                self.advance();
                let items = self.parse_comma_list(&TokenKind::RBracket)?;
                Some(CasExpr::new(
                    CasKind::List(items),
                    span.merge(self.previous_span()),
                ))
            }
            TokenKind::LBrace => {
                self.advance();
                let items = self.parse_comma_list(&TokenKind::RBrace)?;
                Some(CasExpr::new(
                    CasKind::Set(items),
                    span.merge(self.previous_span()),
                ))
            }
            TokenKind::If => self.parse_if(),
            TokenKind::For => self.parse_for(),
            TokenKind::Eof | TokenKind::Newline | TokenKind::Semicolon | TokenKind::Dollar => {
                self.error_at_current(ErrorCode::EMPTY_EXPRESSION, "expected an expression");
                None
            }
            other => {
                self.error_at_current(
                    ErrorCode::UNEXPECTED_TOKEN,
                    format!("expected expression, got '{other}'"),
                );
                None
            }
        }
    }

    /// Comma-separated expressions up to and including `close`. The
    /// opening bracket is already consumed.
    fn parse_comma_list(&mut self, close: &TokenKind) -> Option<Vec<CasExpr>> {
        let mut items = Vec::new();
        if self.eat(close) {
            return Some(items);
        }
        loop {
            items.push(self.parse_expression()?);
            if self.eat(&TokenKind::Comma) {
                continue;
            }
            if self.check(close) {
                self.advance();
                return Some(items);
            }
            if self.at_end() {
                self.error_at_current(
                    ErrorCode::UNCLOSED_DELIMITER,
                    format!("expected '{close}' before end of input"),
                );
            } else {
                self.error_at_current(
                    ErrorCode::UNEXPECTED_TOKEN,
                    format!("expected ',' or '{close}', got '{}'", self.peek_kind()),
                );
            }
            return None;
        }
    }

    /// `if C then A { elseif C then A } [ else A ]`
    fn parse_if(&mut self) -> Option<CasExpr> {
        let start = self.advance();
        let mut branches = Vec::new();
        loop {
            let condition = self.parse_expression()?;
            self.skip_continuation_newline();
            self.expect(&TokenKind::Then)?;
            let body = self.parse_expression()?;
            branches.push((condition, body));
            self.skip_continuation_newline();
            if !self.eat(&TokenKind::Elseif) {
                break;
            }
        }
        let otherwise = if self.eat(&TokenKind::Else) {
            Some(Box::new(self.parse_expression()?))
        } else {
            None
        };
        Some(CasExpr::new(
            CasKind::If {
                branches,
                otherwise,
            },
            start.merge(self.previous_span()),
        ))
    }

    /// `for v in L do A` or `for v: A [step S] thru B do A`
    fn parse_for(&mut self) -> Option<CasExpr> {
        let start = self.advance();
        let var = self.expect_identifier()?;
        let source = if self.eat(&TokenKind::In) {
            LoopSource::In(Box::new(self.parse_or()?))
        } else {
            self.expect(&TokenKind::Colon)?;
            let from = Box::new(self.parse_or()?);
            self.skip_continuation_newline();
            let step = if self.eat(&TokenKind::Step) {
                Some(Box::new(self.parse_or()?))
            } else {
                None
            };
            self.skip_continuation_newline();
            self.expect(&TokenKind::Thru)?;
            let thru = Box::new(self.parse_or()?);
            LoopSource::Range { from, step, thru }
        };
        self.skip_continuation_newline();
        self.expect(&TokenKind::Do)?;
        let body = self.parse_expression()?;
        Some(CasExpr::new(
            CasKind::For {
                var,
                source,
                body: Box::new(body),
            },
            start.merge(self.previous_span()),
        ))
    }
}

fn binary(op: BinOp, left: CasExpr, right: CasExpr) -> CasExpr {
    let span = left.span.merge(right.span);
    CasExpr::new(
        CasKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        span,
    )
}

fn prefix(op: PrefixOp, operand: CasExpr, start: Span) -> CasExpr {
    let span = start.merge(operand.span);
    CasExpr::new(
        CasKind::Prefix {
            op,
            operand: Box::new(operand),
        },
        span,
    )
}
