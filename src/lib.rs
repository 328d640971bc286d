//! # yshard
//!
//! Partitions YAML documents across a fixed set of named shards using
//! rendezvous (highest-random-weight) consistent hashing.
//!
//! ## Overview
//!
//! Given a *split point* — a dotted path like `groups.*.rules` naming a
//! sequence or mapping inside the document — yshard distributes that
//! container's children over N shards and writes one derived document per
//! shard. Each derived document keeps the input's outer structure, key
//! order, and anchor/alias relationships; only the split-point children it
//! was not assigned are gone.
//!
//! ## Architecture
//!
//! - [`hrw`] - rendezvous hashing: stable key→shard selection with minimal
//!   reassignment on membership change
//! - [`yaml`] - round-trip node tree: parse, prune, re-serialize with
//!   anchors and aliases intact
//! - [`partition`] - the core: split-point walk, per-shard pruning, per-file
//!   shard fan-out
//! - [`job`] - batch driver over many input files, with staged output
//! - [`fsutil`] - glob discovery and output-tree plumbing
//! - [`cli`] - command-line surface
//!
//! ## Data Flow
//!
//! ```text
//! input bytes ──▶ node tree ──▶ ShardBuilder (one per shard, in parallel)
//!                                    │ prune at split point
//!                                    ▼
//!                  <workDir>/<shard>/<relative path>  ──▶  <dst>/...
//! ```
//!
//! ## Guarantees
//!
//! - Identical shard lists select identical shards for identical items, on
//!   any platform (xxHash64 + a fixed xorshift mixer).
//! - An item lands on exactly RF shards; the union of all shards is the
//!   whole input.
//! - A YAML alias is kept exactly where its anchor is kept.
//! - A shard with nothing assigned produces no output file.

pub mod cli;
pub mod fsutil;
pub mod hrw;
pub mod job;
pub mod partition;
pub mod yaml;

pub use hrw::{xxh64_hasher, ConsistentHashing, HrwError, Rendezvous};
pub use job::Job;
pub use partition::{
    CancelToken, Config, ConfigError, FilePartitioner, PartitionError, ShardBuilder, SplitPath,
};
