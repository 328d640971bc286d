//! Single-shard document walker.
//!
//! A [`ShardBuilder`] parses one input document, descends to the split point,
//! keeps only the children assigned to its shard, and serializes the pruned
//! tree. One builder owns all of its state; a file's shards run as
//! independent builders over the same input bytes.
//!
//! ## Anchor bookkeeping
//!
//! Children of the split-point container may define anchors or be aliases.
//! An alias never gets hashed: it inherits the decision made for its anchor,
//! otherwise an anchor and its aliases could land on different shards and
//! the output would not be valid YAML. Decisions are tracked per anchor id
//! in a three-state map (absent / dropped / kept), with a fourth state for
//! containers that were themselves partitioned at the split point and can be
//! referenced by an alias standing at another split-point position.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::Arc;

use super::{CancelToken, Config, PartitionError, Position, WILDCARD};
use crate::yaml::{parse, AnchorId, AnchorIndex, Emitter, Node, NodeKind, DEFAULT_INDENT};

/// Decision recorded for an anchor encountered during the walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AnchorMark {
    /// Hashed at the split point and not assigned to this shard.
    Dropped,
    /// Hashed at the split point and assigned to this shard; the step of the
    /// container it lives in (1 for sequences, 2 for mappings).
    Kept { step: usize },
    /// The anchored node was itself a split-point container and has been
    /// partitioned; aliases standing at a split point charge its counts.
    Partitioned { before: usize, after: usize },
}

impl AnchorMark {
    /// Items an alias of this anchor contributes to `items_before`.
    fn charge(self) -> usize {
        match self {
            AnchorMark::Dropped => 0,
            AnchorMark::Kept { step } => step,
            AnchorMark::Partitioned { before, .. } => before,
        }
    }
}

/// Builds one shard's pruned tree from one parsed document.
pub struct ShardBuilder {
    name: String,
    cfg: Arc<Config>,
    visited: HashSet<String>,
    anchors: HashMap<AnchorId, AnchorMark>,
    anchor_index: AnchorIndex,
    items_before: usize,
    items_after: usize,
}

impl ShardBuilder {
    pub fn new(name: impl Into<String>, cfg: Arc<Config>) -> Self {
        Self {
            name: name.into(),
            cfg,
            visited: HashSet::new(),
            anchors: HashMap::new(),
            anchor_index: AnchorIndex::new(),
            items_before: 0,
            items_after: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Items found at the split point before pruning.
    pub fn items_before(&self) -> usize {
        self.items_before
    }

    /// Items kept for this shard.
    pub fn items_after(&self) -> usize {
        self.items_after
    }

    fn reset(&mut self) {
        self.visited.clear();
        self.anchors.clear();
        self.anchor_index.clear();
        self.items_before = 0;
        self.items_after = 0;
    }

    /// Parses `input`, prunes the split-point container down to this shard's
    /// children, and writes the resulting document to `output`.
    pub fn run<W: Write>(
        &mut self,
        token: &CancelToken,
        input: &[u8],
        output: &mut W,
    ) -> Result<(), PartitionError> {
        self.reset();

        let text = std::str::from_utf8(input).map_err(|err| PartitionError::Unmarshal {
            shard: self.name.clone(),
            reason: err.to_string(),
        })?;
        let doc = parse(text).map_err(|err| PartitionError::Unmarshal {
            shard: self.name.clone(),
            reason: err.to_string(),
        })?;

        let Some(mut root) = doc.root else {
            return Err(PartitionError::SplitPathNotFound(
                self.cfg.split_path().dotted().to_string(),
            ));
        };
        self.anchor_index = doc.anchors;
        let foot_comments = doc.foot_comments;

        let mut curr_path = Vec::new();
        self.descend(token, &mut root, &mut curr_path)?;

        if !self.visited.contains(self.cfg.split_path().dotted()) {
            return Err(PartitionError::SplitPathNotFound(
                self.cfg.split_path().dotted().to_string(),
            ));
        }

        let mut rendered = Emitter::new(self.cfg.indent()).emit_to_string(&root);
        for comment in &foot_comments {
            rendered.push_str(comment);
            rendered.push('\n');
        }

        output
            .write_all(rendered.as_bytes())
            .map_err(|source| PartitionError::Io {
                context: format!("failed to write output for {}", self.name),
                source,
            })
    }

    fn descend(
        &mut self,
        token: &CancelToken,
        node: &mut Node,
        curr_path: &mut Vec<String>,
    ) -> Result<(), PartitionError> {
        token.check()?;

        let result = self.descend_inner(token, node, curr_path);
        self.visited.insert(curr_path.join("."));
        result
    }

    fn descend_inner(
        &mut self,
        token: &CancelToken,
        node: &mut Node,
        curr_path: &mut Vec<String>,
    ) -> Result<(), PartitionError> {
        let position = self.cfg.split_path().locate(curr_path);

        if position == Position::Outside {
            return Ok(());
        }

        if position == Position::At {
            if node.step().is_some() {
                return self.partition(node);
            }
            if let NodeKind::Alias(aid) = node.kind {
                return self.alias_at_split_point(aid);
            }
            return Err(PartitionError::NotShardable(
                self.cfg.split_path().dotted().to_string(),
            ));
        }

        // Above the split point: descend. Sequence positions contribute the
        // wildcard path element, mapping values contribute their key.
        match &mut node.kind {
            NodeKind::Sequence(children) => {
                for child in children.iter_mut() {
                    curr_path.push(WILDCARD.to_string());
                    let result = self.descend(token, child, curr_path);
                    curr_path.pop();
                    result?;
                }
            }
            NodeKind::Mapping(children) => {
                for pair in children.chunks_exact_mut(2) {
                    let key = pair[0].as_scalar().unwrap_or_default().to_string();
                    curr_path.push(key);
                    let result = self.descend(token, &mut pair[1], curr_path);
                    curr_path.pop();
                    result?;
                }
            }
            // Scalars and aliases above the split point pass through as-is.
            _ => {}
        }

        Ok(())
    }

    /// Prunes the children of the split-point container down to the ones
    /// assigned to this shard.
    fn partition(&mut self, node: &mut Node) -> Result<(), PartitionError> {
        let Some(step) = node.step() else {
            return Err(PartitionError::NotShardable(
                self.cfg.split_path().dotted().to_string(),
            ));
        };
        let node_anchor = node.anchor;

        let Some(children) = node.children_mut() else {
            return Err(PartitionError::NotShardable(
                self.cfg.split_path().dotted().to_string(),
            ));
        };

        let total = children.len() / step;
        self.items_before += total;

        let mut survivors = Vec::new();
        let mut iter = std::mem::take(children).into_iter();
        while let Some(first) = iter.next() {
            let (key, value) = if step == 2 {
                match iter.next() {
                    Some(value) => (Some(first), value),
                    None => break,
                }
            } else {
                (None, first)
            };

            if self.keep_child(&value, step) {
                if let Some(key) = key {
                    survivors.push(key);
                }
                survivors.push(value);
            }
        }

        let after = survivors.len() / step;
        *children = survivors;
        self.items_after += after;

        // An anchor on the split-point container itself: aliases to it may
        // stand at other split-point positions and charge these counts.
        if let Some(aid) = node_anchor {
            self.anchors
                .insert(aid, AnchorMark::Partitioned { before: total, after });
        }

        Ok(())
    }

    /// Decides whether one split-point child belongs to this shard.
    fn keep_child(&mut self, value: &Node, step: usize) -> bool {
        // Aliases inherit their anchor's decision; they are never rehashed.
        if let NodeKind::Alias(aid) = value.kind {
            return self
                .anchors
                .get(&aid)
                .is_some_and(|mark| mark.charge() > 0);
        }

        // Pre-mark an anchor definition so aliases seen while its own
        // decision is pending resolve to "not assigned".
        if let Some(aid) = value.anchor {
            self.anchors.insert(aid, AnchorMark::Dropped);
        }

        let bytes = Emitter::new(DEFAULT_INDENT).emit_to_string(value);
        let selected = self
            .cfg
            .hashing()
            .get_n(bytes.as_bytes(), self.cfg.replicas());

        let keep = selected.contains(&self.name);
        if keep {
            if let Some(aid) = value.anchor {
                self.anchors.insert(aid, AnchorMark::Kept { step });
            }
        }
        keep
    }

    /// The split path resolved to an alias: the target was (or will be)
    /// pruned wherever it is defined, so only the counts are charged here.
    fn alias_at_split_point(&mut self, aid: AnchorId) -> Result<(), PartitionError> {
        let mark = self.anchors.get(&aid).copied();

        // Unprocessed anchors contribute nothing to the pre-count.
        self.items_before += mark.map_or(0, AnchorMark::charge);

        if let Some(AnchorMark::Partitioned { after, .. }) = mark {
            self.items_after += after;
            return Ok(());
        }

        // The anchor was defined away from any split point; its node is
        // untouched by pruning.
        let target = self.anchor_index.get(&aid).copied().unwrap_or_default();
        if target.step.is_none() {
            return Err(PartitionError::NotShardable(
                self.cfg.split_path().dotted().to_string(),
            ));
        }
        self.items_after += target.items;
        Ok(())
    }
}
