//! Command-line interface.
//!
//! Every flag can also be supplied through a `YP_*` environment variable;
//! an explicit flag wins over the environment.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;

use crate::fsutil;
use crate::hrw::{xxh64_hasher, Rendezvous};
use crate::job::Job;
use crate::partition::{CancelToken, Config};

#[derive(Parser)]
#[command(name = "yshard", version)]
#[command(about = "Partitions input YAML file(s) across shards using rendezvous consistent hashing")]
#[command(after_help = "\
Example:
  # Partition the input file into 5 shards; each rule under
  # \"groups.*.rules\" is written to 2 shards, and only the output of
  # shard 3 is produced, under /tmp/node.3/recording-rules.yml
  yshard --src=\"./recording-rules.yml\" \\
    --split-at=\"groups.*.rules\" \\
    --shards-number=5 \\
    --replication=2 \\
    --shard-id=3 \\
    --dst=\"/tmp\" \\
    --shard-basename=\"node\"")]
pub struct Cli {
    /// Split point path in YAML, e.g. 'groups.*.rules'. This must name a
    /// sequence or a mapping.
    #[arg(long = "split-at", env = "YP_SPLIT_POINT")]
    pub split_at: String,

    /// Glob of input YAML files to partition.
    #[arg(long, env = "YP_SRC_PATH", default_value = "./**/*.{yml,yaml}")]
    pub src: String,

    /// Output directory where partitioned YAML files are stored.
    #[arg(long, env = "YP_DST_PATH", default_value = "/tmp")]
    pub dst: PathBuf,

    /// Basename used to generate the list of shard names.
    #[arg(long = "shard-basename", env = "YP_SHARD_BASENAME", default_value = "instance")]
    pub shard_basename: String,

    /// How many shards to create (at least 2).
    #[arg(long = "shards-number", env = "YP_SHARDS_NUMBER")]
    pub shards_number: usize,

    /// Index of the only shard to produce; all shards when negative.
    #[arg(long = "shard-id", env = "YP_SHARD_ID", default_value_t = -1, allow_hyphen_values = true)]
    pub shard_id: i64,

    /// Replication factor: how many shards get the same YAML item.
    #[arg(long, env = "YP_REPLICATION_FACTOR", default_value_t = 1)]
    pub replication: usize,

    /// Indentation of the output YAML, clamped to 2..=9.
    #[arg(long, env = "YP_YAML_INDENT", default_value_t = 2)]
    pub indent: usize,

    /// Print the partitioning report of each input YAML file.
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

/// Parses arguments, assembles the job and runs it. Argument errors print
/// usage; runtime errors do not.
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let input_files = fsutil::list(&cli.src)?;
    if input_files.is_empty() {
        bail!("no file(s) found for pattern {:?}", cli.src);
    }

    let shard_names: Vec<String> = (0..cli.shards_number)
        .map(|i| format!("{}.{i}", cli.shard_basename))
        .collect();
    let hashing = Rendezvous::new(xxh64_hasher, &shard_names)?;

    let this_shard = usize::try_from(cli.shard_id).ok();

    let work_dir = tempfile::Builder::new()
        .prefix("yp.")
        .tempdir()
        .context("failed to create temp dir")?
        .into_path();

    let cfg = Config::builder()
        .hashing(Arc::new(hashing))
        .split_at(&cli.split_at)
        .replicas(cli.replication)
        .indent(cli.indent)
        .this_shard(this_shard)
        .work_dir(work_dir)
        .build()?;

    let mut job = Job::new(Arc::new(cfg), &input_files)?;

    job.run(&CancelToken::new(), &cli.dst, cli.verbose)
}
