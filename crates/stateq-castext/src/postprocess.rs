//! Rendering of evaluated non-flat templates.
//!
//! A non-flat template evaluates to a `["%root", ...]` list of strings and
//! marker lists. [`postprocess`] renders the markers this crate owns and
//! hands any other tag to a [`Processor`].

use stateq_parser::parse_expression;
use stateq_types::CasValue;
use tracing::warn;

use crate::error::PostprocessError;
use crate::indexing::IndexStyle;

/// Renders markers this crate does not know about.
pub trait Processor {
    /// Render `["tag", args...]`, or return `None` if the tag is not ours.
    ///
    /// Implementations that need to render nested values call
    /// [`postprocess`] with `self`.
    fn process(
        &self,
        tag: &str,
        args: &[CasValue],
        ctx: &mut PostprocessContext,
    ) -> Option<Result<String, PostprocessError>>;
}

/// Handles nothing; every foreign marker is an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProcessor;

impl Processor for NoProcessor {
    fn process(
        &self,
        _tag: &str,
        _args: &[CasValue],
        _ctx: &mut PostprocessContext,
    ) -> Option<Result<String, PostprocessError>> {
        None
    }
}

#[derive(Debug, Clone)]
struct IndexScope {
    style: IndexStyle,
    next: i64,
}

/// Per-page rendering state. Reuse one context for every template on a
/// page so that element ids stay unique.
#[derive(Debug, Clone, Default)]
pub struct PostprocessContext {
    /// Active language; `None` renders every `lang` block.
    pub language: Option<String>,
    index_ids: u32,
    reveal_ids: u32,
    scopes: Vec<IndexScope>,
}

impl PostprocessContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_language(language: impl Into<String>) -> Self {
        Self {
            language: Some(language.into()),
            ..Self::default()
        }
    }

    /// Next page-unique id for a reveal or index element.
    fn next_id(&mut self, reveal: bool) -> u32 {
        let counter = if reveal {
            &mut self.reveal_ids
        } else {
            &mut self.index_ids
        };
        *counter += 1;
        *counter
    }
}

/// Render an evaluated template to its final text.
pub fn postprocess(
    value: &CasValue,
    processor: &dyn Processor,
    ctx: &mut PostprocessContext,
) -> Result<String, PostprocessError> {
    match value {
        CasValue::Str(text) => Ok(text.clone()),
        CasValue::List(items) => {
            let Some((tag, args)) = items.split_first() else {
                return Ok(String::new());
            };
            match tag.as_str() {
                Some("%root") => concat(args, processor, ctx),
                Some(tag) => marker(tag, args, processor, ctx),
                None => Err(PostprocessError::MalformedMarker {
                    tag: tag.to_string(),
                    message: "marker tag must be a string".into(),
                }),
            }
        }
        other => Ok(other.to_string()),
    }
}

/// Read a CAS result printed in CAS syntax.
pub fn parse_value(text: &str) -> Result<CasValue, PostprocessError> {
    let parsed = parse_expression(text);
    match (parsed.value, parsed.errors.errors.first()) {
        (Some(expr), None) => Ok(CasValue::from_expr(&expr)),
        (_, Some(error)) => Err(PostprocessError::UnreadableValue(error.message.clone())),
        (None, None) => Err(PostprocessError::UnreadableValue("empty output".into())),
    }
}

fn concat(
    items: &[CasValue],
    processor: &dyn Processor,
    ctx: &mut PostprocessContext,
) -> Result<String, PostprocessError> {
    let mut out = String::new();
    for item in items {
        out.push_str(&postprocess(item, processor, ctx)?);
    }
    Ok(out)
}

fn marker(
    tag: &str,
    args: &[CasValue],
    processor: &dyn Processor,
    ctx: &mut PostprocessContext,
) -> Result<String, PostprocessError> {
    let malformed = |message: &str| PostprocessError::MalformedMarker {
        tag: tag.to_string(),
        message: message.to_string(),
    };
    match tag {
        "indexing" => {
            let [style, start, body] = args else {
                return Err(malformed("expected style, start and body"));
            };
            let pattern = style.as_str().ok_or_else(|| malformed("style must be a string"))?;
            let style = IndexStyle::parse(pattern).ok_or_else(|| malformed("unknown style"))?;
            let start = start
                .as_int()
                .ok_or_else(|| malformed("start must be an integer"))?;
            ctx.scopes.push(IndexScope { style, next: start });
            let body = postprocess(body, processor, ctx);
            ctx.scopes.pop();
            Ok(format!(
                "<span class=\"stateq-indexing\" data-style=\"{}\" data-start=\"{start}\">{}</span>",
                escape_attr(pattern),
                body?
            ))
        }
        "index" => {
            let scope = ctx
                .scopes
                .last_mut()
                .ok_or(PostprocessError::IndexOutsideIndexing)?;
            let label = scope.style.format(scope.next);
            scope.next += 1;
            let id = ctx.next_id(false);
            Ok(format!(
                "<span class=\"stateq-index\" id=\"stateq-index-{id}\">{label}</span>"
            ))
        }
        "reveal" => {
            let [input, value, body] = args else {
                return Err(malformed("expected input, value and body"));
            };
            let input = input.as_str().ok_or_else(|| malformed("input must be a string"))?;
            let id = ctx.next_id(true);
            let body = postprocess(body, processor, ctx)?;
            Ok(format!(
                "<div class=\"stateq-reveal\" id=\"stateq-reveal-{id}\" data-input=\"{}\" data-value=\"{}\" style=\"display:none;\">{body}</div>",
                escape_attr(input),
                escape_attr(&value.to_string())
            ))
        }
        "lang" => {
            let [codes, body] = args else {
                return Err(malformed("expected codes and body"));
            };
            let codes = codes.as_str().ok_or_else(|| malformed("codes must be a string"))?;
            let shown = match &ctx.language {
                None => true,
                Some(active) => codes.split(',').any(|code| code.trim() == active),
            };
            if shown {
                postprocess(body, processor, ctx)
            } else {
                Ok(String::new())
            }
        }
        _ => match processor.process(tag, args, ctx) {
            Some(result) => result,
            None => {
                warn!(tag, "unhandled castext marker");
                Err(PostprocessError::UnknownMarker(tag.to_string()))
            }
        },
    }
}

fn escape_attr(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
