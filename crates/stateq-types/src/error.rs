use crate::Span;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Maximum number of errors stored before further ones are only counted.
pub const MAX_ERRORS: usize = 20;

/// Error severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// Error category, determined by error code range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Syntax,
    CasText,
    AnswerTest,
    Graph,
    Scope,
    Structure,
}

/// Numeric error code (E100–E699).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ErrorCode(pub u16);

impl ErrorCode {
    // ── Syntax errors (E100–E199) ──
    pub const UNEXPECTED_TOKEN: Self = Self(100);
    pub const UNTERMINATED_STRING: Self = Self(101);
    pub const UNCLOSED_DELIMITER: Self = Self(102);
    pub const INVALID_CHARACTER: Self = Self(103);
    pub const UNTERMINATED_COMMENT: Self = Self(104);
    pub const INVALID_NUMBER: Self = Self(105);
    pub const CHAINED_COMPARISON: Self = Self(106);
    pub const MISPLACED_EVAL_FLAG: Self = Self(107);
    pub const EMPTY_EXPRESSION: Self = Self(108);

    // ── CASText errors (E200–E299) ──
    pub const UNKNOWN_BLOCK: Self = Self(200);
    pub const MISSING_BLOCK_PARAM: Self = Self(201);
    pub const INVALID_BLOCK_PARAM: Self = Self(202);
    pub const MISPLACED_ELSE: Self = Self(203);
    pub const INDEX_OUTSIDE_INDEXING: Self = Self(204);
    pub const INVALID_INDEX_STYLE: Self = Self(205);
    pub const UNKNOWN_REVEAL_INPUT: Self = Self(206);
    pub const INVALID_EVAL_FLAG: Self = Self(207);
    pub const MULTIPLE_STATEMENTS: Self = Self(208);
    pub const TEMPLATE_PARSER_UNAVAILABLE: Self = Self(209);
    pub const INLINE_TEMPLATE_FAILED: Self = Self(210);

    // ── Answer-test errors (E300–E399) ──
    pub const UNKNOWN_ANSWER_TEST: Self = Self(300);
    pub const INVALID_TEST_OPTIONS: Self = Self(301);
    pub const MISSING_TEACHER_ANSWER: Self = Self(302);
    pub const DIRECT_INPUT_REQUIRED: Self = Self(303);

    // ── Graph errors (E400–E499) ──
    pub const MISSING_ROOT: Self = Self(400);
    pub const CYCLIC_GRAPH: Self = Self(401);
    pub const UNKNOWN_EXIT_TARGET: Self = Self(402);
    pub const UNKNOWN_SCENE_TARGET: Self = Self(403);
    pub const ORPHAN_NODE: Self = Self(404);
    pub const TRANSITION_ON_PLAIN_EXIT: Self = Self(405);

    // ── Scope errors (E500–E599) ──
    pub const PREMATURE_STATE_REFERENCE: Self = Self(500);
    pub const CROSS_LAYER_OVERWRITE: Self = Self(501);
    pub const INPUT_OVERWRITE: Self = Self(502);
    pub const FORBIDDEN_INPUT_NAME: Self = Self(503);

    // ── Structure errors (E600–E699) ──
    pub const DUPLICATE_NAME: Self = Self(600);
    pub const EMPTY_NAME: Self = Self(601);
    pub const INVALID_NAME: Self = Self(602);
    pub const UNKNOWN_ENTRY_SCENE: Self = Self(603);
    pub const DUPLICATE_STORAGE_NUMBER: Self = Self(604);
    pub const STRUCTURAL_LIMIT_EXCEEDED: Self = Self(605);
    pub const UNKNOWN_VBOX_INPUT: Self = Self(606);
    pub const INVALID_DOCUMENT: Self = Self(607);

    /// Get the category for this error code.
    pub fn category(self) -> ErrorCategory {
        match self.0 {
            100..=199 => ErrorCategory::Syntax,
            200..=299 => ErrorCategory::CasText,
            300..=399 => ErrorCategory::AnswerTest,
            400..=499 => ErrorCategory::Graph,
            500..=599 => ErrorCategory::Scope,
            600..=699 => ErrorCategory::Structure,
            _ => ErrorCategory::Structure,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax => write!(f, "syntax"),
            Self::CasText => write!(f, "castext"),
            Self::AnswerTest => write!(f, "answertest"),
            Self::Graph => write!(f, "graph"),
            Self::Scope => write!(f, "scope"),
            Self::Structure => write!(f, "structure"),
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Locator
// ══════════════════════════════════════════════════════════════════════════════

/// One step of a [`Locator`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    Scene(usize),
    Prt(usize),
    Node(usize),
    Input(usize),
    StateVariable(usize),
    ValidationBox(usize),
    /// `true` or `false` branch of a PRT node.
    Branch(bool),
    /// A named field of the enclosing element (`sans`, `feedback`, ...).
    Field(String),
}

/// Stable hierarchical position of an error inside a question definition.
///
/// Built from indices, never from display names, so that authoring tools can
/// map errors back after renames. Renders as `scene:0/prt:1/node:2/sans`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Locator {
    segments: Vec<Segment>,
}

impl Locator {
    /// The question itself.
    pub fn root() -> Self {
        Self::default()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    fn with(&self, segment: Segment) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment);
        Self { segments }
    }

    pub fn scene(&self, index: usize) -> Self {
        self.with(Segment::Scene(index))
    }

    pub fn prt(&self, index: usize) -> Self {
        self.with(Segment::Prt(index))
    }

    pub fn node(&self, index: usize) -> Self {
        self.with(Segment::Node(index))
    }

    pub fn input(&self, index: usize) -> Self {
        self.with(Segment::Input(index))
    }

    pub fn state_variable(&self, index: usize) -> Self {
        self.with(Segment::StateVariable(index))
    }

    pub fn validation_box(&self, index: usize) -> Self {
        self.with(Segment::ValidationBox(index))
    }

    pub fn branch(&self, outcome: bool) -> Self {
        self.with(Segment::Branch(outcome))
    }

    pub fn field(&self, name: impl Into<String>) -> Self {
        self.with(Segment::Field(name.into()))
    }

    /// Returns `true` if `self` is `other` or lies below it.
    pub fn starts_with(&self, other: &Locator) -> bool {
        self.segments.starts_with(&other.segments)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "question");
        }
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            match segment {
                Segment::Scene(n) => write!(f, "scene:{n}")?,
                Segment::Prt(n) => write!(f, "prt:{n}")?,
                Segment::Node(n) => write!(f, "node:{n}")?,
                Segment::Input(n) => write!(f, "input:{n}")?,
                Segment::StateVariable(n) => write!(f, "statevar:{n}")?,
                Segment::ValidationBox(n) => write!(f, "vbox:{n}")?,
                Segment::Branch(true) => write!(f, "true")?,
                Segment::Branch(false) => write!(f, "false")?,
                Segment::Field(name) => write!(f, "{name}")?,
            }
        }
        Ok(())
    }
}

/// A locator string that does not name a position in a question.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocatorParseError {
    #[error("invalid locator index '{0}'")]
    InvalidIndex(String),
    #[error("unknown locator segment '{0}'")]
    UnknownSegment(String),
}

impl FromStr for Locator {
    type Err = LocatorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s == "question" {
            return Ok(Self::root());
        }
        let mut segments = Vec::new();
        for part in s.split('/') {
            let segment = match part.split_once(':') {
                Some((kind, index)) => {
                    let n: usize = index
                        .parse()
                        .map_err(|_| LocatorParseError::InvalidIndex(index.to_string()))?;
                    match kind {
                        "scene" => Segment::Scene(n),
                        "prt" => Segment::Prt(n),
                        "node" => Segment::Node(n),
                        "input" => Segment::Input(n),
                        "statevar" => Segment::StateVariable(n),
                        "vbox" => Segment::ValidationBox(n),
                        other => return Err(LocatorParseError::UnknownSegment(other.to_string())),
                    }
                }
                None => match part {
                    "true" => Segment::Branch(true),
                    "false" => Segment::Branch(false),
                    field => Segment::Field(field.to_string()),
                },
            };
            segments.push(segment);
        }
        Ok(Self { segments })
    }
}

impl Serialize for Locator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Locator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// QuestionError
// ══════════════════════════════════════════════════════════════════════════════

/// A structured compiler diagnostic.
///
/// Authoring tools render these; they must not parse free-form strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionError {
    /// Where in the question definition the error was found.
    pub path: Locator,
    pub code: ErrorCode,
    pub severity: Severity,
    /// Derived from `code`.
    pub category: ErrorCategory,
    pub message: String,
    /// Position inside the offending fragment, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
    /// The fragment line the span points into.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_line: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl QuestionError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            path: Locator::root(),
            code,
            severity: Severity::Error,
            category: code.category(),
            message: message.into(),
            span: None,
            source_line: None,
            suggestion: None,
        }
    }

    /// Same as [`QuestionError::new`] but reported as a warning.
    pub fn warning(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::new(code, message)
        }
    }

    /// Point the error at a location inside a fragment.
    pub fn with_span(mut self, span: Span, source_line: impl Into<String>) -> Self {
        self.span = Some(span);
        self.source_line = Some(source_line.into());
        self
    }

    /// Re-home the error below `path`.
    ///
    /// Errors produced by stage-local code carry a relative locator; the
    /// caller prefixes it with the position of the fragment it handed down.
    pub fn at(mut self, path: &Locator) -> Self {
        let mut segments = path.segments.clone();
        segments.extend(self.path.segments);
        self.path = Locator { segments };
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl fmt::Display for QuestionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)?;
        if let Some(span) = self.span {
            write!(f, "@{span}")?;
        }
        write!(f, ": {} [{}] {}", self.code, self.category, self.message)
    }
}

impl std::error::Error for QuestionError {}

/// The structured output for compilation diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompileErrors {
    pub errors: Vec<QuestionError>,
    pub warnings: Vec<QuestionError>,
    pub total_errors: usize,
    pub total_warnings: usize,
}

impl CompileErrors {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn has_errors(&self) -> bool {
        self.total_errors > 0
    }

    /// Add an error, respecting the MAX_ERRORS limit.
    pub fn push_error(&mut self, error: QuestionError) {
        if self.errors.len() < MAX_ERRORS {
            self.errors.push(error);
        }
        self.total_errors += 1;
    }

    pub fn push_warning(&mut self, warning: QuestionError) {
        self.warnings.push(warning);
        self.total_warnings += 1;
    }

    /// Route by severity.
    pub fn push(&mut self, diagnostic: QuestionError) {
        match diagnostic.severity {
            Severity::Error => self.push_error(diagnostic),
            Severity::Warning => self.push_warning(diagnostic),
        }
    }

    /// Move everything from `other` into `self`, re-homed below `path`.
    pub fn absorb(&mut self, other: CompileErrors, path: &Locator) {
        let dropped = other.total_errors - other.errors.len();
        for error in other.errors {
            self.push_error(error.at(path));
        }
        self.total_errors += dropped;
        for warning in other.warnings {
            self.push_warning(warning.at(path));
        }
    }

    /// Has any error been reported at or below `path`?
    pub fn has_errors_under(&self, path: &Locator) -> bool {
        self.errors.iter().any(|e| e.path.starts_with(path))
    }
}
