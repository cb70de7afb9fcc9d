//! Block AST for CASText templates.
//!
//! This is the tree an external template tokenizer hands to the CASText
//! compiler. Expressions inside blocks are still raw text here; the
//! compiler parses them while lowering. Every node records its byte range
//! in the template source so that math-mode classification, which works on
//! the raw source, can be mapped back onto nodes.

use serde::{Deserialize, Serialize};

use crate::Position;

/// A template: its source text plus the tokenized block tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CasText {
    pub source: String,
    pub root: BlockNode,
}

impl CasText {
    pub fn new(source: impl Into<String>, root: BlockNode) -> Self {
        Self {
            source: source.into(),
            root,
        }
    }

    /// Template consisting of plain text only.
    pub fn plain(text: impl Into<String>) -> Self {
        let text = text.into();
        let end = text.len();
        let children = if text.is_empty() {
            Vec::new()
        } else {
            vec![BlockNode::new(
                BlockKind::Raw { text: text.clone() },
                Position::new(0, end),
            )]
        };
        Self {
            source: text,
            root: BlockNode::new(BlockKind::Root { children }, Position::new(0, end)),
        }
    }

    pub fn empty() -> Self {
        Self::plain("")
    }

    pub fn is_empty(&self) -> bool {
        match &self.root.kind {
            BlockKind::Root { children } => children.is_empty(),
            _ => false,
        }
    }
}

impl Default for CasText {
    fn default() -> Self {
        Self::empty()
    }
}

/// One node of the block tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockNode {
    pub kind: BlockKind,
    pub position: Position,
    /// Set by math-mode detection; tokenizers leave it `false`.
    #[serde(default)]
    pub math_mode: bool,
}

impl BlockNode {
    pub fn new(kind: BlockKind, position: Position) -> Self {
        Self {
            kind,
            position,
            math_mode: false,
        }
    }

    /// Direct children, in source order.
    pub fn children(&self) -> Vec<&BlockNode> {
        match &self.kind {
            BlockKind::Root { children }
            | BlockKind::Foreach { children, .. }
            | BlockKind::Named { children, .. } => children.iter().collect(),
            BlockKind::If { branches } => branches.iter().flat_map(|b| b.children.iter()).collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BlockKind {
    Root {
        children: Vec<BlockNode>,
    },
    Raw {
        text: String,
    },
    /// `{@expr@}` (latex) or `{#expr#}` (value).
    Inject {
        mode: InjectMode,
        expression: String,
    },
    /// `[[define a="..." b="..."/]]`
    Define {
        bindings: Vec<Binding>,
    },
    /// `[[if test=".."]]..[[elif test=".."]]..[[else]]..[[/if]]`
    If {
        branches: Vec<IfBranch>,
    },
    /// `[[foreach x="[1,2]" y="..."]]..[[/foreach]]`
    Foreach {
        iterators: Vec<Binding>,
        children: Vec<BlockNode>,
    },
    Comment {
        text: String,
    },
    /// `[[escape value="..."/]]`
    Escape {
        value: String,
    },
    /// Any other `[[name ...]]` block.
    Named {
        name: String,
        #[serde(default)]
        params: Vec<Binding>,
        #[serde(default)]
        children: Vec<BlockNode>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InjectMode {
    Latex,
    Value,
}

/// `name="value"` attribute pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub name: String,
    pub value: String,
}

impl Binding {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One arm of an `if` block; `condition` is `None` for `else`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfBranch {
    pub condition: Option<String>,
    pub children: Vec<BlockNode>,
    pub position: Position,
}
