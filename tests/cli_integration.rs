//! CLI integration tests for yshard
//!
//! These drive the real binary over real file trees: glob discovery, shard
//! fan-out, output layout under the destination, and the exit-code policy.

use std::fs;
use std::path::Path;

use predicates::prelude::*;
use tempfile::TempDir;

/// Get a command instance for the yshard binary
fn yshard_cmd() -> assert_cmd::Command {
    assert_cmd::Command::new(assert_cmd::cargo::cargo_bin!("yshard"))
}

fn write_rules_file(path: &Path, salt: &str, rules: usize) {
    let mut doc = String::from("groups:\n  - name: one\n    rules:\n");
    for r in 0..rules {
        doc.push_str(&format!(
            "      - record: job_{salt}_{r}\n        expr: count({salt}_{r})\n"
        ));
    }
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, doc).unwrap();
}

/// Source tree with two rule files in different subdirectories.
fn setup_src() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_rules_file(&dir.path().join("one/a.yml"), "a", 20);
    write_rules_file(&dir.path().join("two/b.yaml"), "b", 30);
    dir
}

// =============================================================================
// End-to-end partitioning
// =============================================================================

#[test]
fn test_partitions_tree_into_shard_directories() {
    let src = setup_src();
    let dst = TempDir::new().unwrap();

    yshard_cmd()
        .arg(format!("--src={}/**/*.{{yml,yaml}}", src.path().display()))
        .arg("--split-at=groups.*.rules")
        .arg("--shards-number=5")
        .arg("--replication=2")
        .arg(format!("--dst={}", dst.path().display()))
        .assert()
        .success()
        .stderr(predicate::str::contains(
            "Partitioning of 2 yaml files finished",
        ))
        .stderr(predicate::str::contains("got"));

    // Every produced output keeps the source-relative layout.
    let mut produced = 0;
    let mut kept_items = 0;
    for i in 0..5 {
        let shard_dir = dst.path().join(format!("instance.{i}"));
        for rel in ["one/a.yml", "two/b.yaml"] {
            let out = shard_dir.join(rel);
            if out.is_file() {
                produced += 1;
                kept_items += fs::read_to_string(&out).unwrap().matches("- record:").count();
            }
        }
    }
    assert!(produced > 0, "no shard outputs were written");
    // 50 rules, each on exactly 2 of the 5 shards.
    assert_eq!(kept_items, 100);
}

#[test]
fn test_shard_id_limits_output_to_one_shard() {
    let src = setup_src();
    let dst = TempDir::new().unwrap();

    yshard_cmd()
        .arg(format!("--src={}/**/*.yml", src.path().display()))
        .arg("--split-at=groups.*.rules")
        .arg("--shards-number=5")
        .arg("--shard-id=3")
        .arg(format!("--dst={}", dst.path().display()))
        .assert()
        .success()
        .stderr(predicate::str::contains("Shard \"instance.3\""))
        .stderr(predicate::str::contains("instance.0").not());

    for i in 0..5 {
        let shard_dir = dst.path().join(format!("instance.{i}"));
        if i != 3 {
            assert!(!shard_dir.exists(), "instance.{i} must not be produced");
        }
    }
}

#[test]
fn test_verbose_prints_per_file_reports() {
    let src = setup_src();
    let dst = TempDir::new().unwrap();

    yshard_cmd()
        .arg(format!("--src={}/**/*.{{yml,yaml}}", src.path().display()))
        .arg("--split-at=groups.*.rules")
        .arg("--shards-number=5")
        .arg("-v")
        .arg(format!("--dst={}", dst.path().display()))
        .assert()
        .success()
        .stderr(predicate::str::contains("===> Partitioning"))
        .stderr(predicate::str::contains("Found 20 items at path"))
        .stderr(predicate::str::contains("Found 30 items at path"));
}

#[test]
fn test_env_vars_configure_the_run() {
    let src = setup_src();
    let dst = TempDir::new().unwrap();

    yshard_cmd()
        .env("YP_SRC_PATH", format!("{}/**/*.{{yml,yaml}}", src.path().display()))
        .env("YP_SPLIT_POINT", "groups.*.rules")
        .env("YP_SHARDS_NUMBER", "4")
        .env("YP_DST_PATH", dst.path().to_str().unwrap())
        .assert()
        .success()
        .stderr(predicate::str::contains("Partitioning of 2 yaml files"));
}

// =============================================================================
// Failure modes
// =============================================================================

#[test]
fn test_no_matching_files_fails() {
    let empty = TempDir::new().unwrap();

    yshard_cmd()
        .arg(format!("--src={}/**/*.yml", empty.path().display()))
        .arg("--split-at=groups.*.rules")
        .arg("--shards-number=5")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no file(s) found for pattern"));
}

#[test]
fn test_too_few_shards_fails() {
    let src = setup_src();

    yshard_cmd()
        .arg(format!("--src={}/**/*.yml", src.path().display()))
        .arg("--split-at=groups.*.rules")
        .arg("--shards-number=1")
        .assert()
        .failure()
        .stderr(predicate::str::contains("number of shards must be >= 2"));
}

#[test]
fn test_replication_factor_above_half_fails() {
    let src = setup_src();

    yshard_cmd()
        .arg(format!("--src={}/**/*.yml", src.path().display()))
        .arg("--split-at=groups.*.rules")
        .arg("--shards-number=4")
        .arg("--replication=3")
        .assert()
        .failure()
        .stderr(predicate::str::contains("replication factor"));
}

#[test]
fn test_shard_id_out_of_range_fails() {
    let src = setup_src();

    yshard_cmd()
        .arg(format!("--src={}/**/*.yml", src.path().display()))
        .arg("--split-at=groups.*.rules")
        .arg("--shards-number=3")
        .arg("--shard-id=3")
        .assert()
        .failure()
        .stderr(predicate::str::contains("out of range"));
}

#[test]
fn test_invalid_split_path_fails() {
    let src = setup_src();

    yshard_cmd()
        .arg(format!("--src={}/**/*.yml", src.path().display()))
        .arg("--split-at=groups..rules")
        .arg("--shards-number=5")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid split point path"));
}

#[test]
fn test_missing_split_path_in_documents_fails() {
    let src = setup_src();
    let dst = TempDir::new().unwrap();

    yshard_cmd()
        .arg(format!("--src={}/**/*.yml", src.path().display()))
        .arg("--split-at=groups.*.missing")
        .arg("--shards-number=5")
        .arg(format!("--dst={}", dst.path().display()))
        .assert()
        .failure()
        .stderr(predicate::str::contains("error(s)"))
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_shards_number_is_required() {
    let src = setup_src();

    yshard_cmd()
        .env_remove("YP_SHARDS_NUMBER")
        .arg(format!("--src={}/**/*.yml", src.path().display()))
        .arg("--split-at=groups.*.rules")
        .assert()
        .failure();
}

#[test]
fn test_split_at_is_required() {
    let src = setup_src();

    yshard_cmd()
        .env_remove("YP_SPLIT_POINT")
        .arg(format!("--src={}/**/*.yml", src.path().display()))
        .arg("--shards-number=5")
        .assert()
        .failure();
}

#[test]
fn test_comments_survive_end_to_end() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();

    let doc = "\
# maintained by ops
groups:
  - name: one
    rules:
      - record: solo_rule
        expr: count(up)
";
    fs::write(src.path().join("a.yml"), doc).unwrap();

    yshard_cmd()
        .arg(format!("--src={}/*.yml", src.path().display()))
        .arg("--split-at=groups.*.rules")
        .arg("--shards-number=5")
        .arg(format!("--dst={}", dst.path().display()))
        .assert()
        .success();

    let produced: Vec<_> = (0..5)
        .map(|i| dst.path().join(format!("instance.{i}")).join("a.yml"))
        .filter(|p| p.is_file())
        .collect();
    assert_eq!(produced.len(), 1, "exactly one shard owns the single rule");

    let text = fs::read_to_string(&produced[0]).unwrap();
    assert!(text.starts_with("# maintained by ops\n"), "comment lost: {text}");
}
