//! Batch driver: one partitioner per input file, run concurrently, with
//! aggregated totals and a final move of the staged tree into place.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use rayon::prelude::*;

use crate::fsutil;
use crate::partition::{CancelToken, Config, FilePartitioner};

/// Drives a batch of [`FilePartitioner`]s sharing one [`Config`].
///
/// Files are partitioned concurrently and independently: one file's failure
/// does not stop the others, but any failure makes the whole job fail after
/// all files have been attempted. Outputs are staged under the config's work
/// directory and moved into the destination only at the end.
pub struct Job {
    cfg: Arc<Config>,
    partitioners: Vec<FilePartitioner>,
}

impl Job {
    /// Creates one partitioner per input file. The shard-relative layout is
    /// rooted at the longest common directory of all inputs.
    pub fn new(cfg: Arc<Config>, input_files: &[PathBuf]) -> Result<Self> {
        let common_path = fsutil::longest_common_path(input_files);

        let partitioners = input_files
            .iter()
            .map(|file| {
                FilePartitioner::new(Arc::clone(&cfg), file, &common_path)
                    .with_context(|| format!("failed to init partitioner for {file:?}"))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { cfg, partitioners })
    }

    pub fn files_count(&self) -> usize {
        self.partitioners.len()
    }

    /// Runs the whole batch and moves the staged tree into `dst_dir`.
    /// Progress and totals go to stderr; per-file reports only with
    /// `verbose`.
    pub fn run(&mut self, token: &CancelToken, dst_dir: &Path, verbose: bool) -> Result<()> {
        fs::create_dir_all(dst_dir)
            .with_context(|| format!("failed to make directory {dst_dir:?}"))?;

        let start = Instant::now();

        let mut errors: Vec<String> = self
            .partitioners
            .par_iter_mut()
            .filter_map(|partitioner| {
                partitioner
                    .run(token)
                    .err()
                    .map(|err| format!("[!] {err}"))
            })
            .collect();

        eprintln!(
            "Partitioning of {} yaml files finished in {} ms",
            self.partitioners.len(),
            start.elapsed().as_millis()
        );

        if token.is_canceled() {
            let _ = fs::remove_dir_all(self.cfg.work_dir());
            bail!("partitioning canceled");
        }

        if let Err(err) = fsutil::move_dir_all(self.cfg.work_dir(), dst_dir) {
            errors.push(format!("[!] {err:#}"));
        }

        let mut totals: HashMap<String, usize> = HashMap::new();
        for partitioner in &self.partitioners {
            for (name, count) in partitioner.shard_items_count() {
                *totals.entry(name.clone()).or_default() += count;
            }
        }

        // Shard-index order, not completion order.
        for (i, name) in self.cfg.node_names().iter().enumerate() {
            if let Some(id) = self.cfg.this_shard_id() {
                if id != i {
                    continue;
                }
            }
            eprintln!(
                "Shard {:?} got {} items in total",
                name,
                totals.get(name).copied().unwrap_or(0)
            );
        }

        if verbose {
            for partitioner in &self.partitioners {
                eprintln!("===> {}", partitioner.report());
            }
        }

        if !errors.is_empty() {
            bail!(
                "partitioning finished with {} error(s):\n{}",
                errors.len(),
                errors.join("\n")
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hrw::{xxh64_hasher, ConsistentHashing, Rendezvous};
    use tempfile::TempDir;

    fn config(work_dir: &Path) -> Arc<Config> {
        let names: Vec<String> = (0..5).map(|i| format!("instance.{i}")).collect();
        let hashing: Arc<dyn ConsistentHashing> =
            Arc::new(Rendezvous::new(xxh64_hasher, names).unwrap());
        Arc::new(
            Config::builder()
                .hashing(hashing)
                .split_at("groups.*.rules")
                .replicas(2)
                .work_dir(work_dir)
                .build()
                .unwrap(),
        )
    }

    fn write_fixture(path: &Path, rules: usize, salt: &str) {
        let mut doc = String::from("groups:\n  - name: one\n    rules:\n");
        for r in 0..rules {
            doc.push_str(&format!(
                "      - record: job_{salt}_{r}\n        expr: count({salt}_{r})\n"
            ));
        }
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, doc).unwrap();
    }

    #[test]
    fn runs_batch_and_moves_outputs() {
        let src = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();

        write_fixture(&src.path().join("one/a.yml"), 20, "a");
        write_fixture(&src.path().join("two/b.yml"), 30, "b");

        let files = vec![src.path().join("one/a.yml"), src.path().join("two/b.yml")];
        let mut job = Job::new(config(work.path()), &files).unwrap();
        assert_eq!(job.files_count(), 2);

        job.run(&CancelToken::new(), dst.path(), false).unwrap();

        // Work dir contents have been moved under dst.
        assert!(!work.path().exists());

        let expected = [13, 18, 24, 27, 18];

        let mut total = 0;
        for (i, want) in expected.into_iter().enumerate() {
            let shard_dir = dst.path().join(format!("instance.{i}"));
            let mut got = 0;
            for rel in ["one/a.yml", "two/b.yml"] {
                let out = shard_dir.join(rel);
                if out.is_file() {
                    let text = fs::read_to_string(&out).unwrap();
                    got += text.matches("- record:").count();
                }
            }
            assert_eq!(got, want, "instance.{i}");
            total += got;
        }
        // Every rule of both files landed on exactly two shards.
        assert_eq!(total, 2 * (20 + 30));
    }

    #[test]
    fn one_bad_file_does_not_stop_the_rest() {
        let src = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();

        write_fixture(&src.path().join("good.yml"), 10, "ok");
        fs::write(src.path().join("bad.yml"), "a: [unclosed\n").unwrap();

        let files = vec![src.path().join("bad.yml"), src.path().join("good.yml")];
        let mut job = Job::new(config(work.path()), &files).unwrap();

        let err = job
            .run(&CancelToken::new(), dst.path(), false)
            .unwrap_err();
        assert!(err.to_string().contains("1 error(s)"));

        // The good file still made it into the destination.
        let produced = (0..5)
            .filter(|i| dst.path().join(format!("instance.{i}")).join("good.yml").is_file())
            .count();
        assert!(produced >= 2, "good file outputs missing: {produced}");

        // No partial outputs of the bad file anywhere.
        for i in 0..5 {
            assert!(!dst.path().join(format!("instance.{i}")).join("bad.yml").exists());
        }
    }

    #[test]
    fn canceled_job_leaves_no_destination_outputs() {
        let src = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();

        write_fixture(&src.path().join("a.yml"), 10, "a");

        let token = CancelToken::new();
        token.cancel();

        let files = vec![src.path().join("a.yml")];
        let mut job = Job::new(config(work.path()), &files).unwrap();
        assert!(job.run(&token, dst.path(), false).is_err());

        assert!(!work.path().exists());
        for i in 0..5 {
            assert!(!dst.path().join(format!("instance.{i}")).exists());
        }
    }
}
