//! Deterministic block-style YAML serializer.
//!
//! Output is canonical: the same tree always yields the same bytes, which is
//! what lets independent shard walkers agree on hash keys derived from
//! serialized subtrees. Anchor labels are regenerated in first-emission order
//! (`id001`, `id002`, …).

use std::collections::HashMap;
use std::io::{self, Write};

use super::{AnchorId, Node, NodeKind, MAX_INDENT, MIN_INDENT};

/// Serializes [`Node`] trees with a configurable indent, clamped to
/// [`MIN_INDENT`]..=[`MAX_INDENT`].
pub struct Emitter {
    indent: usize,
}

impl Emitter {
    pub fn new(indent: usize) -> Self {
        Self {
            indent: indent.clamp(MIN_INDENT, MAX_INDENT),
        }
    }

    /// Serializes `node` as a document, with a trailing newline.
    pub fn emit_to_string(&self, node: &Node) -> String {
        let mut state = State {
            out: String::new(),
            indent: self.indent,
            labels: HashMap::new(),
        };
        state.write_root(node);
        state.out
    }

    pub fn emit<W: Write>(&self, node: &Node, writer: &mut W) -> io::Result<()> {
        writer.write_all(self.emit_to_string(node).as_bytes())
    }
}

struct State {
    out: String,
    indent: usize,
    labels: HashMap<AnchorId, String>,
}

enum Form {
    Inline(String),
    Block {
        header: &'static str,
        lines: Vec<String>,
    },
}

impl State {
    fn write_root(&mut self, node: &Node) {
        self.write_comments(&node.head_comments, 0);
        let start = self.out.len();
        self.write_root_value(node);
        self.inject_line_comment(start, node.line_comment.as_deref());
    }

    fn write_root_value(&mut self, node: &Node) {
        let prefix = self.prefix(node);
        match &node.kind {
            NodeKind::Scalar { value, quoted } => match scalar_form(value, *quoted) {
                Form::Inline(s) => {
                    self.push_joined(&prefix, &s);
                    self.out.push('\n');
                }
                Form::Block { header, lines } => {
                    self.push_joined(&prefix, header);
                    self.out.push('\n');
                    self.write_block_lines(&lines, 1);
                }
            },
            NodeKind::Alias(aid) => {
                let alias = self.alias_text(*aid);
                self.out.push_str(&alias);
                self.out.push('\n');
            }
            NodeKind::Sequence(children) if children.is_empty() => {
                self.push_joined(&prefix, "[]");
                self.out.push('\n');
            }
            NodeKind::Mapping(children) if children.is_empty() => {
                self.push_joined(&prefix, "{}");
                self.out.push('\n');
            }
            NodeKind::Sequence(children) => {
                if !prefix.is_empty() {
                    self.out.push_str(&prefix);
                    self.out.push('\n');
                }
                self.write_sequence(children, 0, false);
            }
            NodeKind::Mapping(children) => {
                if !prefix.is_empty() {
                    self.out.push_str(&prefix);
                    self.out.push('\n');
                }
                self.write_mapping(children, 0, false);
            }
        }
    }

    fn write_sequence(&mut self, children: &[Node], level: usize, mut inline_first: bool) {
        for child in children {
            if inline_first {
                inline_first = false;
            } else {
                self.write_comments(&child.head_comments, level);
                self.pad(level);
            }
            let entry_start = self.out.len();
            self.out.push('-');
            self.write_after_marker(child, level);
            self.inject_line_comment(entry_start, child.line_comment.as_deref());
        }
    }

    fn write_mapping(&mut self, children: &[Node], level: usize, mut inline_first: bool) {
        for pair in children.chunks_exact(2) {
            let (key, value) = (&pair[0], &pair[1]);
            if inline_first {
                inline_first = false;
            } else {
                self.write_comments(&key.head_comments, level);
                if renders_inline(value) {
                    self.write_comments(&value.head_comments, level);
                }
                self.pad(level);
            }
            let entry_start = self.out.len();
            self.write_key(key, level);
            self.out.push(':');
            self.write_after_colon(value, level);

            let mut line_comment = key.line_comment.as_deref();
            if line_comment.is_none() && renders_inline(value) {
                line_comment = value.line_comment.as_deref();
            }
            self.inject_line_comment(entry_start, line_comment);
        }
    }

    /// Writes a mapping key; falls back to the explicit `? key` form for
    /// non-scalar and multi-line keys. Leaves the cursor where `:` goes.
    fn write_key(&mut self, key: &Node, level: usize) {
        if let NodeKind::Scalar { value, quoted } = &key.kind {
            if let Form::Inline(s) = scalar_form(value, *quoted) {
                let prefix = self.prefix(key);
                self.push_joined(&prefix, &s);
                return;
            }
        }
        self.out.push('?');
        self.write_after_marker(key, level);
        self.pad(level);
    }

    /// Continues a line after a `-` or `?` indicator at `level`.
    /// Continuation lines are placed at `level + 1`.
    fn write_after_marker(&mut self, node: &Node, level: usize) {
        let prefix = self.prefix(node);
        match &node.kind {
            NodeKind::Scalar { value, quoted } => match scalar_form(value, *quoted) {
                Form::Inline(s) => {
                    self.out.push(' ');
                    self.push_joined(&prefix, &s);
                    self.out.push('\n');
                }
                Form::Block { header, lines } => {
                    self.out.push(' ');
                    self.push_joined(&prefix, header);
                    self.out.push('\n');
                    self.write_block_lines(&lines, level + 1);
                }
            },
            NodeKind::Alias(aid) => {
                let alias = self.alias_text(*aid);
                self.out.push(' ');
                self.out.push_str(&alias);
                self.out.push('\n');
            }
            NodeKind::Sequence(children) if children.is_empty() => {
                self.out.push(' ');
                self.push_joined(&prefix, "[]");
                self.out.push('\n');
            }
            NodeKind::Mapping(children) if children.is_empty() => {
                self.out.push(' ');
                self.push_joined(&prefix, "{}");
                self.out.push('\n');
            }
            NodeKind::Sequence(children) => {
                if prefix.is_empty() {
                    // Compact form: first item continues on the marker line.
                    self.push_spaces(self.indent - 1);
                    self.write_sequence(children, level + 1, true);
                } else {
                    self.out.push(' ');
                    self.out.push_str(&prefix);
                    self.out.push('\n');
                    self.write_sequence(children, level + 1, false);
                }
            }
            NodeKind::Mapping(children) => {
                if prefix.is_empty() {
                    self.push_spaces(self.indent - 1);
                    self.write_mapping(children, level + 1, true);
                } else {
                    self.out.push(' ');
                    self.out.push_str(&prefix);
                    self.out.push('\n');
                    self.write_mapping(children, level + 1, false);
                }
            }
        }
    }

    /// Continues a line after the `:` of a mapping entry at `level`.
    fn write_after_colon(&mut self, node: &Node, level: usize) {
        let prefix = self.prefix(node);
        match &node.kind {
            NodeKind::Scalar { value, quoted } => match scalar_form(value, *quoted) {
                Form::Inline(s) => {
                    self.out.push(' ');
                    self.push_joined(&prefix, &s);
                    self.out.push('\n');
                }
                Form::Block { header, lines } => {
                    self.out.push(' ');
                    self.push_joined(&prefix, header);
                    self.out.push('\n');
                    self.write_block_lines(&lines, level + 1);
                }
            },
            NodeKind::Alias(aid) => {
                let alias = self.alias_text(*aid);
                self.out.push(' ');
                self.out.push_str(&alias);
                self.out.push('\n');
            }
            NodeKind::Sequence(children) if children.is_empty() => {
                self.out.push(' ');
                self.push_joined(&prefix, "[]");
                self.out.push('\n');
            }
            NodeKind::Mapping(children) if children.is_empty() => {
                self.out.push(' ');
                self.push_joined(&prefix, "{}");
                self.out.push('\n');
            }
            NodeKind::Sequence(children) => {
                if !prefix.is_empty() {
                    self.out.push(' ');
                    self.out.push_str(&prefix);
                }
                self.out.push('\n');
                self.write_comments(&node.head_comments, level + 1);
                let body_start = self.out.len();
                self.write_sequence(children, level + 1, false);
                self.inject_line_comment(body_start, node.line_comment.as_deref());
            }
            NodeKind::Mapping(children) => {
                if !prefix.is_empty() {
                    self.out.push(' ');
                    self.out.push_str(&prefix);
                }
                self.out.push('\n');
                self.write_comments(&node.head_comments, level + 1);
                let body_start = self.out.len();
                self.write_mapping(children, level + 1, false);
                self.inject_line_comment(body_start, node.line_comment.as_deref());
            }
        }
    }

    fn write_comments(&mut self, comments: &[String], level: usize) {
        for comment in comments {
            self.pad(level);
            self.out.push_str(comment);
            self.out.push('\n');
        }
    }

    /// Appends a trailing comment to the first content line rendered since
    /// `start`, skipping any head-comment lines written in between.
    fn inject_line_comment(&mut self, start: usize, comment: Option<&str>) {
        let Some(comment) = comment else {
            return;
        };
        let mut line_start = start;
        loop {
            let Some(pos) = self.out[line_start..].find('\n') else {
                return;
            };
            let line_end = line_start + pos;
            if !self.out[line_start..line_end].trim_start().starts_with('#') {
                self.out.insert_str(line_end, &format!(" {comment}"));
                return;
            }
            line_start = line_end + 1;
        }
    }

    fn write_block_lines(&mut self, lines: &[String], level: usize) {
        for line in lines {
            if line.is_empty() {
                self.out.push('\n');
            } else {
                self.pad(level);
                self.out.push_str(line);
                self.out.push('\n');
            }
        }
    }

    fn pad(&mut self, level: usize) {
        self.push_spaces(level * self.indent);
    }

    fn push_spaces(&mut self, count: usize) {
        for _ in 0..count {
            self.out.push(' ');
        }
    }

    fn push_joined(&mut self, prefix: &str, rest: &str) {
        if !prefix.is_empty() {
            self.out.push_str(prefix);
            self.out.push(' ');
        }
        self.out.push_str(rest);
    }

    /// `&label [tag]` properties preceding a node, or empty.
    fn prefix(&mut self, node: &Node) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(aid) = node.anchor {
            parts.push(format!("&{}", self.label(aid)));
        }
        if let Some(tag) = &node.tag {
            parts.push(tag.clone());
        }
        parts.join(" ")
    }

    fn alias_text(&mut self, aid: AnchorId) -> String {
        format!("*{}", self.label(aid))
    }

    fn label(&mut self, aid: AnchorId) -> String {
        if let Some(existing) = self.labels.get(&aid) {
            return existing.clone();
        }
        let label = format!("id{:03}", self.labels.len() + 1);
        self.labels.insert(aid, label.clone());
        label
    }
}

/// Whether a node renders on the line that introduces it (scalars, aliases,
/// empty containers) rather than as an indented block.
fn renders_inline(node: &Node) -> bool {
    match &node.kind {
        NodeKind::Scalar { .. } | NodeKind::Alias(_) => true,
        NodeKind::Sequence(children) | NodeKind::Mapping(children) => children.is_empty(),
    }
}

fn scalar_form(value: &str, quoted: bool) -> Form {
    if value.is_empty() {
        // A plain empty scalar is YAML's null; only a quoted one is the
        // empty string.
        let repr = if quoted { "\"\"" } else { "null" };
        return Form::Inline(repr.to_string());
    }
    if value.contains('\n') {
        if let Some(block) = block_form(value) {
            return block;
        }
        return Form::Inline(double_quote(value));
    }
    if quoted || needs_quote(value) {
        Form::Inline(double_quote(value))
    } else {
        Form::Inline(value.to_string())
    }
}

/// Literal block representation, if the value fits one. Values with unusual
/// trailing newlines, indented lines, or control characters fall back to
/// double quoting.
fn block_form(value: &str) -> Option<Form> {
    let (header, body) = match value.strip_suffix('\n') {
        Some(body) if body.ends_with('\n') => return None,
        Some(body) => ("|", body),
        None => ("|-", value),
    };

    let lines: Vec<String> = body.split('\n').map(str::to_string).collect();
    let representable = lines
        .iter()
        .all(|l| !l.starts_with(' ') && l.chars().all(|c| !c.is_control()));
    if !representable {
        return None;
    }

    Some(Form::Block { header, lines })
}

/// Whether a single-line value is unsafe as a plain scalar in block context.
fn needs_quote(value: &str) -> bool {
    let Some(first) = value.chars().next() else {
        return true; // empty
    };
    if value.starts_with(' ') || value.ends_with(' ') {
        return true;
    }
    if value.chars().any(|c| c.is_control()) {
        return true;
    }
    if matches!(
        first,
        '&' | '*' | '!' | '|' | '>' | '%' | '@' | '`' | '"' | '\'' | '#' | ',' | '[' | ']' | '{'
            | '}'
    ) {
        return true;
    }
    // `-`, `?` and `:` only act as indicators when followed by a space or
    // standing alone.
    if matches!(first, '-' | '?' | ':') && (value.len() == 1 || value[1..].starts_with(' ')) {
        return true;
    }
    value.contains(": ") || value.ends_with(':') || value.contains(" #")
}

fn double_quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c.is_control() => {
                out.push_str(&format!("\\u{:04X}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::super::parse;
    use super::*;

    fn roundtrip(input: &str) -> String {
        let doc = parse(input).unwrap();
        Emitter::new(2).emit_to_string(&doc.root.unwrap())
    }

    #[test]
    fn emits_nested_block_structure() {
        let out = roundtrip("groups:\n  - name: one\n    rules:\n      - a\n      - b\n");
        assert_eq!(
            out,
            "groups:\n  - name: one\n    rules:\n      - a\n      - b\n"
        );
    }

    #[test]
    fn indent_is_configurable() {
        let doc = parse("groups:\n  - name: one\n").unwrap();
        let out = Emitter::new(4).emit_to_string(&doc.root.unwrap());
        assert_eq!(out, "groups:\n    -   name: one\n");
    }

    #[test]
    fn indent_is_clamped() {
        let doc = parse("a: 1\nsub:\n  b: 2\n").unwrap();
        let narrow = Emitter::new(0).emit_to_string(doc.root.as_ref().unwrap());
        let wide = Emitter::new(99).emit_to_string(doc.root.as_ref().unwrap());
        assert!(narrow.contains("\n  b: 2\n"));
        assert!(wide.contains(&format!("\n{}b: 2\n", " ".repeat(9))));
    }

    #[test]
    fn quoted_scalars_stay_quoted() {
        let out = roundtrip("version: \"42\"\ncount: 42\n");
        assert_eq!(out, "version: \"42\"\ncount: 42\n");
    }

    #[test]
    fn unsafe_plain_scalars_are_quoted() {
        let doc = parse("a: 'x: y'\n").unwrap();
        let out = Emitter::new(2).emit_to_string(&doc.root.unwrap());
        assert_eq!(out, "a: \"x: y\"\n");
    }

    #[test]
    fn multiline_scalars_use_literal_blocks() {
        let out = roundtrip("expr: |-\n  rate(x[5m])\n  > 0\n");
        assert_eq!(out, "expr: |-\n  rate(x[5m])\n  > 0\n");

        let out = roundtrip("expr: |\n  line\n");
        assert_eq!(out, "expr: |\n  line\n");
    }

    #[test]
    fn empty_containers_are_flow() {
        let out = roundtrip("a: []\nb: {}\n");
        assert_eq!(out, "a: []\nb: {}\n");
    }

    #[test]
    fn anchors_and_aliases_roundtrip() {
        let out = roundtrip("defaults: &d\n  a: 1\nother: *d\n");
        assert_eq!(out, "defaults: &id001\n  a: 1\nother: *id001\n");
    }

    #[test]
    fn anchored_sequence_items() {
        let out = roundtrip("rules:\n  - &r1\n    name: one\n  - *r1\n");
        assert_eq!(out, "rules:\n  - &id001\n    name: one\n  - *id001\n");
    }

    #[test]
    fn anchored_scalar_inline() {
        let out = roundtrip("a: &x hello\nb: *x\n");
        assert_eq!(out, "a: &id001 hello\nb: *id001\n");
    }

    #[test]
    fn emission_is_idempotent() {
        let input = "groups:\n  - name: &n one\n    rules:\n      - expr: \"up == 0\"\n      - *n\n";
        let first = roundtrip(input);
        let second = roundtrip(&first);
        assert_eq!(first, second);
    }

    #[test]
    fn root_sequence() {
        let out = roundtrip("- a\n- b: c\n");
        assert_eq!(out, "- a\n- b: c\n");
    }

    #[test]
    fn root_scalar() {
        assert_eq!(roundtrip("just a string\n"), "just a string\n");
    }

    #[test]
    fn null_and_empty_string_stay_distinct() {
        let out = roundtrip("a:\nb: \"\"\n");
        assert_eq!(out, "a: null\nb: \"\"\n");
    }

    #[test]
    fn comments_roundtrip() {
        let input = "# header\ngroups:\n  # first group\n  - name: one  # inline\n";
        assert_eq!(
            roundtrip(input),
            "# header\ngroups:\n  # first group\n  - name: one # inline\n"
        );
    }

    #[test]
    fn comments_between_entries_roundtrip() {
        let input = "a: 1\n# about b\nb: 2  # trailing\nrules:\n  - x\n  # mid\n  - y\n";
        assert_eq!(
            roundtrip(input),
            "a: 1\n# about b\nb: 2 # trailing\nrules:\n  - x\n  # mid\n  - y\n"
        );
    }

    #[test]
    fn comment_emission_is_idempotent() {
        let input = "# top\na: 1 # t\nrules:\n  # lead\n  - x # item\n";
        let first = roundtrip(input);
        let second = roundtrip(&first);
        assert_eq!(first, second);
    }
}
