//! Dotted split-point paths.

use std::fmt;

use super::ConfigError;

/// The path element matching every position of a sequence. Mapping keys are
/// matched literally, so a mapping only matches a `*` element if a key is
/// spelled `*`.
pub const WILDCARD: &str = "*";

/// Where a walk position stands relative to the split path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// Strict prefix of the split path; keep descending.
    Above,
    /// Exactly the split point.
    At,
    /// Diverged from the split path, or descended past its length.
    Outside,
}

/// A parsed, immutable split-point path such as `groups.*.rules`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitPath {
    dotted: String,
    elements: Vec<String>,
}

impl SplitPath {
    /// Parses a dotted path. Elements are whitespace-trimmed; an empty input
    /// or any empty element is invalid.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let elements: Vec<String> = raw.split('.').map(|e| e.trim().to_string()).collect();

        if elements.iter().any(String::is_empty) {
            return Err(ConfigError::InvalidSplitPath(raw.to_string()));
        }

        let dotted = elements.join(".");
        Ok(Self { dotted, elements })
    }

    /// The normalized dotted form.
    pub fn dotted(&self) -> &str {
        &self.dotted
    }

    /// Number of path elements; always at least 1.
    pub fn depth(&self) -> usize {
        self.elements.len()
    }

    /// Classifies a walk position against this path.
    pub fn locate(&self, path: &[String]) -> Position {
        if path.len() > self.elements.len() {
            return Position::Outside;
        }
        for (elem, expected) in path.iter().zip(&self.elements) {
            if elem != expected {
                return Position::Outside;
            }
        }
        if path.len() == self.elements.len() {
            Position::At
        } else {
            Position::Above
        }
    }
}

impl fmt::Display for SplitPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dotted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path_of(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_dotted_path() {
        let sp = SplitPath::parse("groups.*.rules").unwrap();
        assert_eq!(sp.depth(), 3);
        assert_eq!(sp.dotted(), "groups.*.rules");
        assert_eq!(sp.to_string(), "groups.*.rules");
    }

    #[test]
    fn trims_whitespace_in_elements() {
        let sp = SplitPath::parse(" groups . * . rules ").unwrap();
        assert_eq!(sp.dotted(), "groups.*.rules");
    }

    #[test]
    fn single_element() {
        let sp = SplitPath::parse("modules").unwrap();
        assert_eq!(sp.depth(), 1);
        assert_eq!(sp.locate(&path_of(&["modules"])), Position::At);
    }

    #[test]
    fn rejects_invalid_input() {
        for raw in ["", " ", ".", "a..b", "a.", ".a", "..", "a. .b"] {
            assert!(
                matches!(
                    SplitPath::parse(raw),
                    Err(ConfigError::InvalidSplitPath(_))
                ),
                "{raw:?} should be invalid"
            );
        }
    }

    #[test]
    fn locate_positions() {
        let sp = SplitPath::parse("groups.*.rules").unwrap();

        assert_eq!(sp.locate(&[]), Position::Above);
        assert_eq!(sp.locate(&path_of(&["groups"])), Position::Above);
        assert_eq!(sp.locate(&path_of(&["groups", "*"])), Position::Above);
        assert_eq!(sp.locate(&path_of(&["groups", "*", "rules"])), Position::At);
        assert_eq!(
            sp.locate(&path_of(&["groups", "*", "name"])),
            Position::Outside
        );
        assert_eq!(sp.locate(&path_of(&["other"])), Position::Outside);
        assert_eq!(
            sp.locate(&path_of(&["groups", "*", "rules", "*"])),
            Position::Outside
        );
    }

    #[test]
    fn wildcard_is_literal_for_mappings() {
        // A mapping key spelled `*` matches a wildcard element literally.
        let sp = SplitPath::parse("*").unwrap();
        assert_eq!(sp.locate(&path_of(&["*"])), Position::At);
        assert_eq!(sp.locate(&path_of(&["key"])), Position::Outside);
    }
}
