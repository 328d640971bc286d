//! Event-stream loader building the node tree.

use yaml_rust2::parser::{Event, MarkedEventReceiver, Parser, Tag};
use yaml_rust2::scanner::{Marker, ScanError, TScalarStyle};

use super::comments::{self, CommentMap};
use super::{AnchorIndex, AnchorTarget, Document, Node, NodeKind};

/// Parses the first document of `input` into a [`Document`].
///
/// Anchors and aliases are kept as-is; aliases referring to unknown anchors
/// are a parse error. Comments are recovered from the raw text and attached
/// to the first node at or below them; whatever trails the last node becomes
/// the document's foot comments. Empty input yields a document without a
/// root.
pub fn parse(input: &str) -> Result<Document, ScanError> {
    let mut loader = TreeLoader {
        comments: comments::scan(input),
        ..TreeLoader::default()
    };
    let mut parser = Parser::new_from_str(input);
    parser.load(&mut loader, false)?;

    Ok(Document {
        root: loader.root,
        anchors: loader.anchors,
        foot_comments: loader.comments.heads.into_iter().map(|(_, text)| text).collect(),
    })
}

#[derive(Default)]
struct TreeLoader {
    /// Containers currently being built, innermost last.
    stack: Vec<Node>,
    root: Option<Node>,
    anchors: AnchorIndex,
    comments: CommentMap,
}

impl TreeLoader {
    fn attach(&mut self, node: Node) {
        self.index_anchor(&node);
        match self.stack.last_mut() {
            Some(parent) => match &mut parent.kind {
                NodeKind::Sequence(children) | NodeKind::Mapping(children) => {
                    children.push(node);
                }
                _ => unreachable!("only containers are kept on the loader stack"),
            },
            None => {
                if self.root.is_none() {
                    self.root = Some(node);
                }
            }
        }
    }

    fn index_anchor(&mut self, node: &Node) {
        if let Some(aid) = node.anchor {
            let target = AnchorTarget {
                step: node.step(),
                items: node.item_count().unwrap_or(0),
            };
            self.anchors.insert(aid, target);
        }
    }

    /// Comments belonging to a node starting at `mark`: every whole-line
    /// comment above it not yet claimed, plus the trailing comment of its
    /// first line. The first node on a line claims that line's comment.
    fn comments_for(&mut self, mark: Marker) -> (Vec<String>, Option<String>) {
        let mut heads = Vec::new();
        while self
            .comments
            .heads
            .front()
            .is_some_and(|(line, _)| *line < mark.line())
        {
            if let Some((_, text)) = self.comments.heads.pop_front() {
                heads.push(text);
            }
        }
        (heads, self.comments.trailing.remove(&mark.line()))
    }
}

fn anchor_of(aid: usize) -> Option<usize> {
    (aid != 0).then_some(aid)
}

fn format_tag(tag: &Tag) -> String {
    match tag.handle.as_str() {
        "" => format!("!{}", tag.suffix),
        // Core-schema tags may arrive with the resolved handle spelled out.
        "tag:yaml.org,2002:" => format!("!!{}", tag.suffix),
        handle => format!("{}{}", handle, tag.suffix),
    }
}

impl MarkedEventReceiver for TreeLoader {
    fn on_event(&mut self, ev: Event, mark: Marker) {
        match ev {
            Event::Scalar(value, style, aid, tag) => {
                let (head_comments, line_comment) = self.comments_for(mark);
                let node = Node {
                    kind: NodeKind::Scalar {
                        value,
                        quoted: style != TScalarStyle::Plain,
                    },
                    anchor: anchor_of(aid),
                    tag: tag.as_ref().map(format_tag),
                    head_comments,
                    line_comment,
                };
                self.attach(node);
            }
            Event::SequenceStart(aid, tag) => {
                let (head_comments, line_comment) = self.comments_for(mark);
                self.stack.push(Node {
                    kind: NodeKind::Sequence(Vec::new()),
                    anchor: anchor_of(aid),
                    tag: tag.as_ref().map(format_tag),
                    head_comments,
                    line_comment,
                });
            }
            Event::MappingStart(aid, tag) => {
                let (head_comments, line_comment) = self.comments_for(mark);
                self.stack.push(Node {
                    kind: NodeKind::Mapping(Vec::new()),
                    anchor: anchor_of(aid),
                    tag: tag.as_ref().map(format_tag),
                    head_comments,
                    line_comment,
                });
            }
            Event::SequenceEnd | Event::MappingEnd => {
                if let Some(node) = self.stack.pop() {
                    self.attach(node);
                }
            }
            Event::Alias(aid) => {
                let (head_comments, line_comment) = self.comments_for(mark);
                self.attach(Node {
                    kind: NodeKind::Alias(aid),
                    anchor: None,
                    tag: None,
                    head_comments,
                    line_comment,
                });
            }
            _ => {}
        }
    }
}
