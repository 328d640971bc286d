//! File-system helpers: glob discovery, common-path computation, and moving
//! staged output trees into place.

use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use globset::Glob;
use walkdir::WalkDir;

/// Lists all files matching `pattern`, as absolute paths in sorted order.
///
/// The pattern syntax is globset's: `*` for one path component, `**` for any
/// number of components, `{a,b}` alternation, e.g. `./conf/**/*.{yml,yaml}`.
pub fn list(pattern: &str) -> Result<Vec<PathBuf>> {
    // A leading `./` is dropped from both the pattern and the walked paths
    // so the two always compare in the same form.
    let normalized = pattern.strip_prefix("./").unwrap_or(pattern);
    let matcher = Glob::new(normalized)
        .with_context(|| format!("failed to compile glob pattern {pattern:?}"))?
        .compile_matcher();

    let base = static_prefix(normalized);

    let mut matches = Vec::new();
    for entry in WalkDir::new(&base).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            // Unreadable subtrees are skipped, like a shell glob would.
            Err(_) => continue,
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let candidate = path.strip_prefix("./").unwrap_or(path);
        if matcher.is_match(candidate) {
            let absolute = fs::canonicalize(path)
                .with_context(|| format!("failed to get absolute path for {path:?}"))?;
            matches.push(absolute);
        }
    }

    matches.sort();
    matches.dedup();
    Ok(matches)
}

/// The longest literal directory prefix of a glob pattern; the walk starts
/// there.
fn static_prefix(pattern: &str) -> PathBuf {
    let parent = Path::new(pattern).parent().unwrap_or(Path::new(""));

    let mut base = PathBuf::new();
    for comp in parent.components() {
        if let Component::Normal(part) = comp {
            if part
                .to_string_lossy()
                .contains(['*', '?', '[', '{'])
            {
                break;
            }
        }
        base.push(comp);
    }

    if base.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        base
    }
}

/// Longest common directory of a list of file paths. A single file yields
/// its parent directory; an empty list yields an empty path.
pub fn longest_common_path(paths: &[PathBuf]) -> PathBuf {
    let Some((first, rest)) = paths.split_first() else {
        return PathBuf::new();
    };
    if rest.is_empty() {
        return first.parent().map(Path::to_path_buf).unwrap_or_default();
    }

    let mut common: Vec<Component> = first.components().collect();
    for path in rest {
        let matched = common
            .iter()
            .zip(path.components())
            .take_while(|(a, b)| **a == *b)
            .count();
        common.truncate(matched);
    }

    common.iter().collect()
}

/// Moves the contents of `src_dir` into `dst_dir` (copy, then remove the
/// source). Copying keeps the layout usable across file systems.
pub fn move_dir_all(src_dir: &Path, dst_dir: &Path) -> Result<()> {
    copy_dir_all(src_dir, dst_dir)?;
    fs::remove_dir_all(src_dir).with_context(|| format!("failed to remove {src_dir:?}"))
}

/// Recursively copies the contents of `src_dir` (not the directory itself)
/// into `dst_dir`. Symlinks are copied as links, not followed.
pub fn copy_dir_all(src_dir: &Path, dst_dir: &Path) -> Result<()> {
    let entries = fs::read_dir(src_dir)
        .with_context(|| format!("failed to read directory {src_dir:?}"))?;

    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read directory {src_dir:?}"))?;
        let src_path = entry.path();
        let dst_path = dst_dir.join(entry.file_name());

        let file_type = entry
            .file_type()
            .with_context(|| format!("failed to get file info {src_path:?}"))?;

        if file_type.is_dir() {
            fs::create_dir_all(&dst_path)
                .with_context(|| format!("failed to make directory {dst_path:?}"))?;
            copy_dir_all(&src_path, &dst_path)?;
        } else if file_type.is_symlink() {
            copy_symlink(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path)
                .with_context(|| format!("failed to copy {src_path:?} to {dst_path:?}"))?;
        }
    }

    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    let target =
        fs::read_link(src).with_context(|| format!("failed to read symlink {src:?}"))?;
    std::os::unix::fs::symlink(target, dst)
        .with_context(|| format!("failed to create symlink {dst:?}"))
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    // Windows symlinks need elevated rights; fall back to copying content.
    fs::copy(src, dst)
        .map(|_| ())
        .with_context(|| format!("failed to copy {src:?} to {dst:?}"))
}
