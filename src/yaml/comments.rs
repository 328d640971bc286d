//! Comment extraction from raw document text.
//!
//! The event-level parser drops comments, so they are recovered with a line
//! scan of the raw input and re-associated with nodes by source position
//! (the parser's markers). The scan tracks quoted strings and block
//! scalars, where a `#` is content rather than a comment.

use std::collections::{HashMap, VecDeque};

/// Comments found in a document, addressed by source line (1-based, the
/// same numbering as the parser's markers).
#[derive(Debug, Default)]
pub(crate) struct CommentMap {
    /// Whole-line comments, in document order.
    pub(crate) heads: VecDeque<(usize, String)>,
    /// Trailing comments keyed by the line they end.
    pub(crate) trailing: HashMap<usize, String>,
}

pub(crate) fn scan(input: &str) -> CommentMap {
    let mut map = CommentMap::default();
    // An unclosed `'` or `"` carried across lines.
    let mut quote: Option<char> = None;
    // Inside a block scalar whose content is indented deeper than this.
    let mut block_indent: Option<usize> = None;

    for (idx, line) in input.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = line.trim_start_matches(' ');
        let indent = line.len() - trimmed.len();

        if let Some(threshold) = block_indent {
            if trimmed.is_empty() || indent > threshold {
                continue;
            }
            block_indent = None;
        }

        let mut comment_at = None;
        let mut prev_is_space = true;
        let mut escaped = false;

        for (i, c) in line.char_indices() {
            match quote {
                Some('"') => {
                    if escaped {
                        escaped = false;
                    } else if c == '\\' {
                        escaped = true;
                    } else if c == '"' {
                        quote = None;
                        prev_is_space = false;
                    }
                }
                Some(_) => {
                    if c == '\'' {
                        quote = None;
                        prev_is_space = false;
                    }
                }
                None => {
                    match c {
                        '"' | '\'' => quote = Some(c),
                        '#' if prev_is_space => {
                            comment_at = Some(i);
                            break;
                        }
                        _ => {}
                    }
                    prev_is_space = c == ' ' || c == '\t';
                }
            }
        }

        let content = match comment_at {
            Some(at) => {
                let text = line[at..].to_string();
                if line[..at].trim().is_empty() {
                    map.heads.push_back((line_no, text));
                    continue;
                }
                map.trailing.insert(line_no, text);
                &line[..at]
            }
            None => line,
        };

        // A `|`/`>` header (a comment may follow it) opens a block scalar;
        // its more-indented lines are content, never comments.
        if quote.is_none() {
            let last_token = content.trim_end().rsplit([' ', '\t']).next().unwrap_or("");
            if is_block_header(last_token) {
                block_indent = Some(indent);
            }
        }
    }

    map
}

fn is_block_header(token: &str) -> bool {
    let mut chars = token.chars();
    matches!(chars.next(), Some('|' | '>')) && chars.all(|c| matches!(c, '+' | '-' | '0'..='9'))
}
