//! Parallel, deterministic `.rs` file discovery with directory pruning.
//!
//! Performance optimizations:
//! - Early directory pruning via `WalkDir::filter_entry` (O(1) subtree skip)
//! - Parallel file processing via Rayon's `par_bridge`
//!
//! The expansion output (`.macro-expanded.rs`) lives next to crate sources and
//! is never treated as a source file.

use anyhow::{Context, Result};
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Directories to exclude by default.
pub const EXCLUDED_DIRS: &[&str] = &["target", ".git", "node_modules", ".cargo", ".macrostat"];

/// File written by `cargo expand` for each crate.
pub const EXPANDED_FILE_NAME: &str = ".macro-expanded.rs";

#[inline]
fn is_excluded_dir(entry: &walkdir::DirEntry, excludes: &HashSet<&str>) -> bool {
    entry.file_type().is_dir()
        && entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| excludes.contains(name))
}

#[inline]
fn is_source_file(path: &Path) -> bool {
    path.is_file()
        && path.extension().is_some_and(|ext| ext == "rs")
        && path
            .file_name()
            .is_some_and(|name| name != EXPANDED_FILE_NAME)
}

/// Gathers all `.rs` files under `root`, skipping the default excluded
/// directories. Results are sorted.
pub fn gather_rs_files(root: &Path) -> Result<Vec<PathBuf>> {
    gather_rs_files_with_excludes(root, &[])
}

/// Gathers all `.rs` files with extra directory names to prune.
pub fn gather_rs_files_with_excludes(root: &Path, excludes: &[&str]) -> Result<Vec<PathBuf>> {
    let all_excludes: HashSet<&str> = EXCLUDED_DIRS
        .iter()
        .copied()
        .chain(excludes.iter().copied())
        .collect();

    let mut files = WalkDir::new(root)
        .into_iter()
        // prunes whole subtrees before iteration
        .filter_entry(|e| !is_excluded_dir(e, &all_excludes))
        .par_bridge()
        .filter_map(|entry| match entry {
            Ok(e) => {
                let path = e.path();
                if is_source_file(path) {
                    Some(Ok(path.to_path_buf()))
                } else {
                    None
                }
            }
            Err(e) => Some(Err(e.into())),
        })
        .collect::<Result<Vec<_>>>()
        .context(format!("Failed to gather .rs files from {}", root.display()))?;

    // par_bridge does not preserve order
    files.sort();
    Ok(files)
}

/// Gathers the source files of one crate: `src/`, `benches/`, `examples/` and
/// `tests/` below the crate root, plus `build.rs`.
pub fn gather_crate_files(crate_root: &Path, excludes: &[&str]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for dir in ["src", "benches", "examples", "tests"] {
        let path = crate_root.join(dir);
        if path.is_dir() {
            files.extend(gather_rs_files_with_excludes(&path, excludes)?);
        }
    }
    // build scripts live at the crate root
    let build_rs = crate_root.join("build.rs");
    if build_rs.is_file() {
        files.push(build_rs);
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn create_temp_dir(name: &str) -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir()
            .join("macrostat_scan_test")
            .join(format!("{}_{}_{}", name, std::process::id(), id));
        if dir.exists() {
            fs::remove_dir_all(&dir).ok();
        }
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "fn x() {}").unwrap();
    }

    #[test]
    fn test_gather_skips_excluded_and_expanded() {
        let dir = create_temp_dir("gather");
        touch(&dir.join("src/lib.rs"));
        touch(&dir.join("src/a/mod.rs"));
        touch(&dir.join("target/debug/build/out.rs"));
        touch(&dir.join(".macrostat/cache.rs"));
        touch(&dir.join(EXPANDED_FILE_NAME));
        fs::write(dir.join("README.md"), "# readme").unwrap();

        let files = gather_rs_files(&dir).unwrap();
        assert_eq!(files, vec![dir.join("src/a/mod.rs"), dir.join("src/lib.rs")]);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_gather_with_custom_excludes() {
        let dir = create_temp_dir("custom");
        touch(&dir.join("src/lib.rs"));
        touch(&dir.join("src/generated/big.rs"));

        let files = gather_rs_files_with_excludes(&dir, &["generated"]).unwrap();
        assert_eq!(files, vec![dir.join("src/lib.rs")]);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_root_named_like_excluded_dir_is_still_scanned() {
        let dir = create_temp_dir("rootname").join("target");
        touch(&dir.join("lib.rs"));

        let files = gather_rs_files(&dir).unwrap();
        assert_eq!(files.len(), 1);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_gather_crate_files_ignores_nested_crates() {
        let dir = create_temp_dir("crate_files");
        touch(&dir.join("src/main.rs"));
        touch(&dir.join("tests/it.rs"));
        touch(&dir.join("build.rs"));
        touch(&dir.join("member/src/lib.rs"));

        let files = gather_crate_files(&dir, &[]).unwrap();
        assert_eq!(files.len(), 3);
        assert!(!files.iter().any(|f| f.starts_with(dir.join("member"))));

        fs::remove_dir_all(&dir).ok();
    }
}
