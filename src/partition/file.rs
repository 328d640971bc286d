//! Per-file shard fan-out.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{BufWriter, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rayon::prelude::*;

use super::{CancelToken, Config, PartitionError, ShardBuilder};

/// Hard deadline for partitioning a single file.
const FILE_TIMEOUT: Duration = Duration::from_secs(10);

/// Partitions one input file into one output file per shard.
///
/// The shard-relative output path is the input path with `common_path`
/// stripped; each shard writes to `<work_dir>/<shard>/<relative>`. Shards
/// run concurrently over the same input bytes, and any shard failure aborts
/// the file and removes its partial outputs.
pub struct FilePartitioner {
    cfg: Arc<Config>,
    input_file: PathBuf,
    output_rel: PathBuf,
    shard_items: HashMap<String, usize>,
    total_items_before: Mutex<Option<usize>>,
    report: String,
}

impl std::fmt::Debug for FilePartitioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilePartitioner")
            .field("cfg", &self.cfg)
            .field("input_file", &self.input_file)
            .field("output_rel", &self.output_rel)
            .field("shard_items", &self.shard_items)
            .field("total_items_before", &self.total_items_before)
            .field("report", &self.report)
            .finish()
    }
}

struct ShardRun {
    name: String,
    items_after: usize,
}

impl FilePartitioner {
    /// Binds `cfg` to one input file. A blank `common_path` defaults to the
    /// file's directory.
    pub fn new(
        cfg: Arc<Config>,
        input_file: impl Into<PathBuf>,
        common_path: &Path,
    ) -> Result<Self, PartitionError> {
        let input_file = input_file.into();

        let common = if common_path.as_os_str().is_empty() {
            input_file
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default()
        } else {
            common_path.to_path_buf()
        };

        let invalid_prefix = || PartitionError::InvalidCommonPrefix {
            file: input_file.clone(),
            prefix: common.clone(),
        };

        let output_rel = input_file
            .strip_prefix(&common)
            .map_err(|_| invalid_prefix())?
            .to_path_buf();
        if output_rel.as_os_str().is_empty() {
            return Err(invalid_prefix());
        }

        Ok(Self {
            cfg,
            input_file,
            output_rel,
            shard_items: HashMap::new(),
            total_items_before: Mutex::new(None),
            report: String::new(),
        })
    }

    /// The human-readable report of the last run.
    pub fn report(&self) -> &str {
        &self.report
    }

    /// Items each shard received in the last run.
    pub fn shard_items_count(&self) -> &HashMap<String, usize> {
        &self.shard_items
    }

    fn reset(&mut self) {
        self.shard_items.clear();
        *self.total_items_before.lock() = None;
        self.report.clear();
    }

    /// Partitions the input file into all selected shards, under the file
    /// deadline.
    pub fn run(&mut self, token: &CancelToken) -> Result<(), PartitionError> {
        self.reset();
        let token = token.with_timeout(FILE_TIMEOUT);

        let start = Instant::now();

        let input = match fs::read(&self.input_file) {
            Ok(bytes) => bytes,
            Err(source) => {
                self.fail();
                return Err(PartitionError::Io {
                    context: format!("failed to read input file {:?}", self.input_file),
                    source,
                });
            }
        };

        match self.run_shards(&token, &input) {
            Ok(shards) => {
                self.finish(&input, start.elapsed(), &shards);
                Ok(())
            }
            Err(err) => {
                self.fail();
                Err(PartitionError::File {
                    file: self.input_file.clone(),
                    source: Box::new(err),
                })
            }
        }
    }

    /// Runs all selected shards concurrently; results come back in
    /// shard-index order.
    fn run_shards(
        &self,
        token: &CancelToken,
        input: &[u8],
    ) -> Result<Vec<ShardRun>, PartitionError> {
        self.selected_shards()
            .par_iter()
            .map(|name| {
                token.check()?;

                let output_file = self.shard_output_path(name);
                let file = create_output_file(&output_file)?;

                let mut builder = ShardBuilder::new(name.clone(), Arc::clone(&self.cfg));
                let mut writer = BufWriter::new(file);

                let written = builder
                    .run(token, input, &mut writer)
                    .and_then(|()| {
                        writer.flush().map_err(|source| PartitionError::Io {
                            context: format!("failed to write {output_file:?}"),
                            source,
                        })
                    })
                    .and_then(|()| self.record_items_before(builder.items_before()));

                if let Err(err) = written {
                    let _ = fs::remove_file(&output_file);
                    return Err(err);
                }

                Ok(ShardRun {
                    name: name.clone(),
                    items_after: builder.items_after(),
                })
            })
            .collect()
    }

    /// Shard names this partitioner produces, honoring `this_shard_id`.
    fn selected_shards(&self) -> Vec<String> {
        self.cfg
            .node_names()
            .into_iter()
            .enumerate()
            .filter(|(i, _)| self.cfg.this_shard_id().map_or(true, |id| id == *i))
            .map(|(_, name)| name)
            .collect()
    }

    fn shard_output_path(&self, shard_name: &str) -> PathBuf {
        self.cfg
            .work_dir()
            .join(shard_name)
            .join(&self.output_rel)
    }

    /// Every shard must count the same number of split-point items; a
    /// mismatch indicates a walker bug, not bad input.
    fn record_items_before(&self, count: usize) -> Result<(), PartitionError> {
        let mut total = self.total_items_before.lock();
        match *total {
            None => {
                *total = Some(count);
                Ok(())
            }
            Some(expected) if expected == count => Ok(()),
            Some(expected) => Err(PartitionError::ItemsConsistency {
                expected,
                actual: count,
            }),
        }
    }

    fn finish(&mut self, input: &[u8], elapsed: Duration, shards: &[ShardRun]) {
        let mut report = String::new();

        let _ = writeln!(
            report,
            "Partitioning {:?} of size {} bytes finished in {} ms",
            self.output_rel,
            input.len(),
            elapsed.as_millis()
        );
        let _ = writeln!(
            report,
            "Found {} items at path {:?}, partitioned them into {} shards with RF={}",
            self.total_items_before.lock().unwrap_or(0),
            self.cfg.split_path().dotted(),
            self.cfg.nodes_count(),
            self.cfg.replicas()
        );

        for shard in shards {
            self.shard_items.insert(shard.name.clone(), shard.items_after);

            if shard.items_after == 0 {
                // Empty shards produce no file rather than an empty file.
                let _ = fs::remove_file(self.shard_output_path(&shard.name));
                let _ = writeln!(
                    report,
                    "Shard {:?} got 0 items in resulting yaml (output file is not created)",
                    shard.name
                );
            } else {
                let _ = writeln!(
                    report,
                    "Shard {:?} got {} items in resulting yaml",
                    shard.name, shard.items_after
                );
            }
        }

        self.report = report;
    }

    /// Removes all partial outputs of this file and records a failure
    /// report; the error itself travels back to the caller.
    fn fail(&mut self) {
        for name in self.selected_shards() {
            let _ = fs::remove_file(self.shard_output_path(&name));
        }
        self.report = format!("Partitioning {:?} failed. See errors report.\n", self.output_rel);
    }
}

fn create_output_file(path: &Path) -> Result<File, PartitionError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|source| PartitionError::Io {
            context: format!("failed to make directory {dir:?}"),
            source,
        })?;
    }

    File::create(path).map_err(|source| PartitionError::Io {
        context: format!("failed to create {path:?}"),
        source,
    })
}
