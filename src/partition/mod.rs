//! # YAML partitioning
//!
//! Splits a parsed YAML document across a set of named shards. The walk
//! descends to a declared *split point* (a dotted path naming a sequence or
//! mapping), hashes each child of that container with the configured
//! consistent hashing, and keeps only the children assigned to the shard
//! being built. Everything outside the split point survives untouched, and
//! anchor/alias relationships stay consistent after pruning.
//!
//! ## Key types
//!
//! - [`Config`] - immutable partitioning settings shared by all shards
//! - [`SplitPath`] - the parsed dotted split-point path
//! - [`ShardBuilder`] - produces one shard's output tree from one document
//! - [`FilePartitioner`] - fans out all shards of one input file
//! - [`CancelToken`] - cooperative cancellation with an optional deadline

mod cancel;
mod file;
mod shard;
mod split_path;

pub use cancel::CancelToken;
pub use file::FilePartitioner;
pub use shard::ShardBuilder;
pub use split_path::{Position, SplitPath, WILDCARD};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::hrw::ConsistentHashing;
use crate::yaml::{DEFAULT_INDENT, MAX_INDENT, MIN_INDENT};

/// Configuration mistakes caught before any file is touched.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("consistent hashing is not set")]
    HashingNotSet,

    #[error("split point path is not set")]
    SplitPointNotSet,

    #[error("invalid split point path: {0:?}")]
    InvalidSplitPath(String),

    #[error("number of shards must be >= 2, got {0}")]
    TooFewShards(usize),

    #[error("shard id {id} is out of range for {shards} shards")]
    ShardIdOutOfRange { id: usize, shards: usize },

    #[error("replication factor {replicas} is too big for {shards} shards")]
    ReplicationTooBig { replicas: usize, shards: usize },

    #[error("work directory path {0:?} is an existing file")]
    WorkDirIsFile(PathBuf),

    #[error("failed to create work directory {path:?}: {source}")]
    WorkDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures while partitioning a document or file.
#[derive(Debug, Error)]
pub enum PartitionError {
    #[error("failed to unmarshal yaml for {shard}: {reason}")]
    Unmarshal { shard: String, reason: String },

    #[error("split point path {0:?} not found")]
    SplitPathNotFound(String),

    #[error("invalid split point path: node at {0:?} is not shardable")]
    NotShardable(String),

    #[error("items consistency error: expected {expected}, got {actual}")]
    ItemsConsistency { expected: usize, actual: usize },

    #[error("invalid common prefix for {file:?}: {prefix:?}")]
    InvalidCommonPrefix { file: PathBuf, prefix: PathBuf },

    #[error("partitioning canceled")]
    Canceled,

    #[error("failed to partition {file:?}: {source}")]
    File {
        file: PathBuf,
        #[source]
        source: Box<PartitionError>,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

/// Immutable settings shared by every shard and file of one partitioning run.
pub struct Config {
    hashing: Arc<dyn ConsistentHashing>,
    split_path: SplitPath,
    work_dir: PathBuf,
    this_shard_id: Option<usize>,
    replicas: usize,
    indent: usize,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("hashing_nodes_count", &self.hashing.nodes_count())
            .field("split_path", &self.split_path)
            .field("work_dir", &self.work_dir)
            .field("this_shard_id", &self.this_shard_id)
            .field("replicas", &self.replicas)
            .field("indent", &self.indent)
            .finish()
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn nodes_count(&self) -> usize {
        self.hashing.nodes_count()
    }

    pub fn node_names(&self) -> Vec<String> {
        self.hashing.node_names()
    }

    pub fn hashing(&self) -> &dyn ConsistentHashing {
        self.hashing.as_ref()
    }

    pub fn split_path(&self) -> &SplitPath {
        &self.split_path
    }

    /// The scratch directory shard outputs are written under.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// When set, only the shard with this index is produced.
    pub fn this_shard_id(&self) -> Option<usize> {
        self.this_shard_id
    }

    pub fn replicas(&self) -> usize {
        self.replicas
    }

    pub fn indent(&self) -> usize {
        self.indent
    }
}

/// Builder for [`Config`]; all validation happens in [`ConfigBuilder::build`].
#[derive(Default)]
pub struct ConfigBuilder {
    hashing: Option<Arc<dyn ConsistentHashing>>,
    split_at: Option<String>,
    work_dir: Option<PathBuf>,
    this_shard_id: Option<usize>,
    replicas: Option<usize>,
    indent: Option<usize>,
}

impl ConfigBuilder {
    /// Sets the consistent hashing implementation. Required.
    pub fn hashing(mut self, hashing: Arc<dyn ConsistentHashing>) -> Self {
        self.hashing = Some(hashing);
        self
    }

    /// Sets the dotted split-point path, e.g. `groups.*.rules`. Required.
    /// The node it names must be a sequence or a mapping.
    pub fn split_at(mut self, path: &str) -> Self {
        self.split_at = Some(path.to_string());
        self
    }

    /// Sets the scratch directory outputs are staged under.
    /// Defaults to the system temp directory.
    pub fn work_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(path.into());
        self
    }

    /// Restricts output to a single shard index. Defaults to all shards.
    pub fn this_shard(mut self, id: Option<usize>) -> Self {
        self.this_shard_id = id;
        self
    }

    /// Sets how many shards receive each item. Defaults to 1; values below 1
    /// are treated as 1.
    pub fn replicas(mut self, count: usize) -> Self {
        self.replicas = Some(count);
        self
    }

    /// Sets the output YAML indent, clamped to [2, 9]. Defaults to 2.
    pub fn indent(mut self, indent: usize) -> Self {
        self.indent = Some(indent);
        self
    }

    pub fn build(self) -> Result<Config, ConfigError> {
        let hashing = self.hashing.ok_or(ConfigError::HashingNotSet)?;
        let split_at = self.split_at.ok_or(ConfigError::SplitPointNotSet)?;
        let split_path = SplitPath::parse(&split_at)?;

        let shards = hashing.nodes_count();
        if shards < 2 {
            return Err(ConfigError::TooFewShards(shards));
        }

        if let Some(id) = self.this_shard_id {
            if id >= shards {
                return Err(ConfigError::ShardIdOutOfRange { id, shards });
            }
        }

        let replicas = self.replicas.unwrap_or(1).max(1);
        if replicas > shards / 2 {
            return Err(ConfigError::ReplicationTooBig { replicas, shards });
        }

        let work_dir = match self.work_dir {
            Some(dir) => validate_work_dir(dir)?,
            None => std::env::temp_dir(),
        };

        Ok(Config {
            hashing,
            split_path,
            work_dir,
            this_shard_id: self.this_shard_id,
            replicas,
            indent: self.indent.unwrap_or(DEFAULT_INDENT).clamp(MIN_INDENT, MAX_INDENT),
        })
    }
}

fn validate_work_dir(path: PathBuf) -> Result<PathBuf, ConfigError> {
    match std::fs::metadata(&path) {
        Ok(meta) if meta.is_dir() => Ok(path),
        Ok(_) => Err(ConfigError::WorkDirIsFile(path)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            std::fs::create_dir_all(&path)
                .map_err(|source| ConfigError::WorkDir {
                    path: path.clone(),
                    source,
                })
                .map(|()| path)
        }
        Err(source) => Err(ConfigError::WorkDir { path, source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hrw::{xxh64_hasher, Rendezvous};

    fn hashing(count: usize) -> Arc<dyn ConsistentHashing> {
        let names: Vec<String> = (0..count).map(|i| format!("instance.{i}")).collect();
        Arc::new(Rendezvous::new(xxh64_hasher, names).unwrap())
    }

    #[test]
    fn build_with_defaults() {
        let cfg = Config::builder()
            .hashing(hashing(5))
            .split_at("groups.*.rules")
            .build()
            .unwrap();

        assert_eq!(cfg.nodes_count(), 5);
        assert_eq!(cfg.replicas(), 1);
        assert_eq!(cfg.indent(), 2);
        assert_eq!(cfg.this_shard_id(), None);
        assert_eq!(cfg.split_path().dotted(), "groups.*.rules");
    }

    #[test]
    fn requires_hashing_and_split_path() {
        assert!(matches!(
            Config::builder().split_at("a").build(),
            Err(ConfigError::HashingNotSet)
        ));
        assert!(matches!(
            Config::builder().hashing(hashing(3)).build(),
            Err(ConfigError::SplitPointNotSet)
        ));
    }

    #[test]
    fn rejects_bad_cardinalities() {
        assert!(matches!(
            Config::builder().hashing(hashing(1)).split_at("a").build(),
            Err(ConfigError::TooFewShards(1))
        ));
        assert!(matches!(
            Config::builder()
                .hashing(hashing(4))
                .split_at("a")
                .replicas(3)
                .build(),
            Err(ConfigError::ReplicationTooBig {
                replicas: 3,
                shards: 4
            })
        ));
        assert!(matches!(
            Config::builder()
                .hashing(hashing(3))
                .split_at("a")
                .this_shard(Some(3))
                .build(),
            Err(ConfigError::ShardIdOutOfRange { id: 3, shards: 3 })
        ));
    }

    #[test]
    fn replicas_below_one_are_clamped() {
        let cfg = Config::builder()
            .hashing(hashing(5))
            .split_at("a")
            .replicas(0)
            .build()
            .unwrap();
        assert_eq!(cfg.replicas(), 1);
    }

    #[test]
    fn indent_is_clamped() {
        let cfg = Config::builder()
            .hashing(hashing(5))
            .split_at("a")
            .indent(42)
            .build()
            .unwrap();
        assert_eq!(cfg.indent(), 9);
    }

    #[test]
    fn work_dir_must_not_be_a_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("occupied");
        std::fs::write(&file, "x").unwrap();

        let err = Config::builder()
            .hashing(hashing(2))
            .split_at("a")
            .work_dir(&file)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::WorkDirIsFile(_)));
    }

    #[test]
    fn missing_work_dir_is_created() {
        let dir = tempfile::TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");

        let cfg = Config::builder()
            .hashing(hashing(2))
            .split_at("a")
            .work_dir(&nested)
            .build()
            .unwrap();
        assert!(cfg.work_dir().is_dir());
    }
}
