//! Statement-level parsing: statement lists and evaluation flags.

use stateq_lexer::token::TokenKind;
use stateq_types::{CasExpr, ErrorCode, EvalFlag, Fragment, Statement};

use crate::parser::Parser;

impl Parser {
    /// `Fragment = { Statement Terminator }`
    pub(crate) fn parse_fragment(&mut self) -> Fragment {
        let mut statements = Vec::new();
        loop {
            while self.peek_kind().is_terminator() && !self.at_end() {
                self.advance();
            }
            if self.at_end() || self.too_many_errors() {
                break;
            }
            match self.parse_statement() {
                Some(statement) => {
                    if self.peek_kind().is_terminator() {
                        statements.push(statement);
                    } else {
                        self.error_at_current(
                            ErrorCode::UNEXPECTED_TOKEN,
                            format!("expected ';' or end of statement, got '{}'", self.peek_kind()),
                        );
                        self.synchronize();
                    }
                }
                None => self.synchronize(),
            }
        }
        Fragment::new(statements)
    }

    /// `Statement = Expression { "," Flag }`
    fn parse_statement(&mut self) -> Option<Statement> {
        let expr = self.parse_expression()?;
        let mut statement = Statement::new(expr);
        while self.eat(&TokenKind::Comma) {
            let flag = self.parse_flag()?;
            statement.span = statement.span.merge(flag.span);
            statement.flags.push(flag);
        }
        Some(statement)
    }

    /// `Flag = Identifier [ "=" AddExpr ]`
    fn parse_flag(&mut self) -> Option<EvalFlag> {
        let start = self.current_span();
        let name = self.expect_identifier()?;
        let value = if self.eat(&TokenKind::Eq) {
            Some(self.parse_additive()?)
        } else {
            None
        };
        Some(EvalFlag {
            name,
            value,
            span: start.merge(self.previous_span()),
        })
    }

    /// Exactly one expression and nothing else.
    pub(crate) fn parse_single_expression(&mut self) -> Option<CasExpr> {
        while self.check(&TokenKind::Newline) {
            self.advance();
        }
        if self.at_end() {
            if !self.errors().has_errors() {
                self.error_at_current(ErrorCode::EMPTY_EXPRESSION, "expected an expression");
            }
            return None;
        }
        let expr = self.parse_expression()?;
        while self.check(&TokenKind::Newline) {
            self.advance();
        }
        match self.peek_kind() {
            TokenKind::Eof => Some(expr),
            TokenKind::Comma => {
                self.error_at_current(
                    ErrorCode::MISPLACED_EVAL_FLAG,
                    "evaluation flags are only allowed on statements",
                );
                None
            }
            other => {
                let message = format!("expected end of expression, got '{other}'");
                self.error_at_current(ErrorCode::UNEXPECTED_TOKEN, message);
                None
            }
        }
    }
}
