//! # YAML node tree
//!
//! An in-memory YAML document model that keeps what the partitioner needs and
//! the stock value types of the ecosystem throw away: anchor/alias identity,
//! key order, and scalar quoting. Parsing is built on `yaml-rust2`'s event
//! stream; serialization is a deterministic block-style emitter of our own,
//! since no available emitter re-emits anchors or takes an indent setting.
//!
//! ## Shape
//!
//! - [`Node`] is a kind ([`NodeKind`]) plus an optional anchor id and tag.
//! - Mapping children are interleaved key/value pairs, so a mapping with N
//!   entries has 2N children. Sequence children are the items themselves.
//! - Aliases are first-class nodes referring to an anchor id; they are never
//!   resolved into copies of their target.
//!
//! ## Anchor identity
//!
//! The parser assigns numeric anchor ids. Original label spellings are not
//! available at the event level, so the emitter regenerates labels (`id001`,
//! `id002`, … in first-emission order). Anchor/alias topology survives
//! exactly; label names do not.
//!
//! ## Comments
//!
//! The event stream drops comments, so they are recovered from the raw text
//! by a quote- and block-scalar-aware line scan and re-attached to nodes via
//! the parser's source markers: whole-line comments become a node's
//! [`Node::head_comments`], a trailing comment becomes the
//! [`Node::line_comment`] of the first node on its line, and comments after
//! the last node land in [`Document::foot_comments`]. Blank lines are not
//! preserved.

mod comments;
mod emit;
mod parse;

pub use emit::Emitter;
pub use parse::parse;

use std::collections::HashMap;

/// Default output indentation.
pub const DEFAULT_INDENT: usize = 2;
/// Smallest accepted indentation.
pub const MIN_INDENT: usize = 2;
/// Largest accepted indentation.
pub const MAX_INDENT: usize = 9;

/// Anchor identifier assigned by the parser. Always non-zero.
pub type AnchorId = usize;

/// A single node of a YAML document.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub anchor: Option<AnchorId>,
    pub tag: Option<String>,
    /// Whole-line comments rendered above this node, `#` included.
    pub head_comments: Vec<String>,
    /// Trailing comment on the node's first rendered line, `#` included.
    pub line_comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// A scalar value. `quoted` records whether the input spelled it with
    /// quotes or a block style; quoted scalars are re-emitted quoted so that
    /// `"42"` never silently turns into the number `42`.
    Scalar { value: String, quoted: bool },
    /// A sequence; children are the items.
    Sequence(Vec<Node>),
    /// A mapping; children are interleaved key/value pairs.
    Mapping(Vec<Node>),
    /// A reference to the node carrying the same anchor id.
    Alias(AnchorId),
}

impl Node {
    pub fn plain(value: impl Into<String>) -> Self {
        Node {
            kind: NodeKind::Scalar {
                value: value.into(),
                quoted: false,
            },
            anchor: None,
            tag: None,
            head_comments: Vec::new(),
            line_comment: None,
        }
    }

    pub fn as_scalar(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Scalar { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Children of a container node, `None` for scalars and aliases.
    pub fn children(&self) -> Option<&[Node]> {
        match &self.kind {
            NodeKind::Sequence(c) | NodeKind::Mapping(c) => Some(c),
            _ => None,
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<Node>> {
        match &mut self.kind {
            NodeKind::Sequence(c) | NodeKind::Mapping(c) => Some(c),
            _ => None,
        }
    }

    /// Children per logical item: 1 for sequences, 2 for mappings (key and
    /// value), `None` for non-containers.
    pub fn step(&self) -> Option<usize> {
        match self.kind {
            NodeKind::Sequence(_) => Some(1),
            NodeKind::Mapping(_) => Some(2),
            _ => None,
        }
    }

    /// Logical item count of a container node.
    pub fn item_count(&self) -> Option<usize> {
        let step = self.step()?;
        Some(self.children().unwrap_or_default().len() / step)
    }
}

/// Shape summary of an anchored node, recorded while parsing. Lets a walker
/// reason about an alias target without holding a reference into the tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnchorTarget {
    /// 1 for sequences, 2 for mappings, `None` for scalars.
    pub step: Option<usize>,
    /// Logical item count at parse time (0 for scalars).
    pub items: usize,
}

/// Anchor id to target shape, for every anchor in the document.
pub type AnchorIndex = HashMap<AnchorId, AnchorTarget>;

/// A parsed document: the root node (absent for empty input), the anchor
/// index, and any comments trailing the last node.
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub root: Option<Node>,
    pub anchors: AnchorIndex,
    pub foot_comments: Vec<String>,
}
