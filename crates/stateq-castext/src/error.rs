//! CASText error types.

use stateq_types::{ErrorCode, Position, QuestionError, SourceText};
use thiserror::Error;

/// Errors found while lowering or compiling a template.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CasTextError {
    #[error("unknown block '{name}'")]
    UnknownBlock { name: String, position: Position },

    #[error("block '{block}' requires parameter '{param}'")]
    MissingParam {
        block: String,
        param: String,
        position: Position,
    },

    #[error("block '{block}': {message}")]
    InvalidParam {
        block: String,
        message: String,
        position: Position,
    },

    #[error("'else' must be the last branch of an 'if' block")]
    MisplacedElse { position: Position },

    #[error("'index' used outside an 'indexing' block")]
    IndexOutsideIndexing { position: Position },

    #[error("unknown index style '{style}'")]
    InvalidIndexStyle { style: String, position: Position },

    #[error("'reveal' refers to unknown input '{input}'")]
    UnknownRevealInput { input: String, position: Position },

    #[error("unsupported evaluation flag '{flag}'")]
    InvalidEvalFlag { flag: String, position: Position },

    #[error("an injection must hold exactly one expression, found {count}")]
    StatementCount { count: usize, position: Position },

    #[error("{message} in '{source_text}'")]
    Expression {
        code: ErrorCode,
        message: String,
        source_text: String,
        position: Position,
    },

    #[error("castext(\"...\") found but no template parser is configured")]
    TemplateParserUnavailable,

    #[error("inline template failed: {0}")]
    InlineTemplate(String),

    #[error("inline templates nested deeper than {0} levels")]
    InlineDepth(usize),
}

impl CasTextError {
    pub fn code(&self) -> ErrorCode {
        match self {
            CasTextError::UnknownBlock { .. } => ErrorCode::UNKNOWN_BLOCK,
            CasTextError::MissingParam { .. } => ErrorCode::MISSING_BLOCK_PARAM,
            CasTextError::InvalidParam { .. } => ErrorCode::INVALID_BLOCK_PARAM,
            CasTextError::MisplacedElse { .. } => ErrorCode::MISPLACED_ELSE,
            CasTextError::IndexOutsideIndexing { .. } => ErrorCode::INDEX_OUTSIDE_INDEXING,
            CasTextError::InvalidIndexStyle { .. } => ErrorCode::INVALID_INDEX_STYLE,
            CasTextError::UnknownRevealInput { .. } => ErrorCode::UNKNOWN_REVEAL_INPUT,
            CasTextError::InvalidEvalFlag { .. } => ErrorCode::INVALID_EVAL_FLAG,
            CasTextError::StatementCount { count: 0, .. } => ErrorCode::EMPTY_EXPRESSION,
            CasTextError::StatementCount { .. } => ErrorCode::MULTIPLE_STATEMENTS,
            CasTextError::Expression { code, .. } => *code,
            CasTextError::TemplateParserUnavailable => ErrorCode::TEMPLATE_PARSER_UNAVAILABLE,
            CasTextError::InlineTemplate(_) | CasTextError::InlineDepth(_) => {
                ErrorCode::INLINE_TEMPLATE_FAILED
            }
        }
    }

    pub fn position(&self) -> Option<Position> {
        match self {
            CasTextError::UnknownBlock { position, .. }
            | CasTextError::MissingParam { position, .. }
            | CasTextError::InvalidParam { position, .. }
            | CasTextError::MisplacedElse { position }
            | CasTextError::IndexOutsideIndexing { position }
            | CasTextError::InvalidIndexStyle { position, .. }
            | CasTextError::UnknownRevealInput { position, .. }
            | CasTextError::InvalidEvalFlag { position, .. }
            | CasTextError::StatementCount { position, .. }
            | CasTextError::Expression { position, .. } => Some(*position),
            _ => None,
        }
    }

    /// Diagnostic with a span into the template source.
    pub fn to_question_error(&self, source: &SourceText) -> QuestionError {
        let error = QuestionError::new(self.code(), self.to_string());
        match self.position() {
            Some(position) => {
                let span = source.span_of(position);
                let line = source.line(span.start_line).unwrap_or("").to_string();
                error.with_span(span, line)
            }
            None => error,
        }
    }
}

/// Errors raised while postprocessing an evaluated template.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PostprocessError {
    #[error("no processor handles marker '{0}'")]
    UnknownMarker(String),

    #[error("malformed '{tag}' marker: {message}")]
    MalformedMarker { tag: String, message: String },

    #[error("'index' marker outside an 'indexing' marker")]
    IndexOutsideIndexing,

    #[error("cannot read CAS output: {0}")]
    UnreadableValue(String),
}
