//! Crate discovery and per-crate analysis for single crates and workspaces.
//!
//! Supports:
//! - Workspace detection via `[workspace]` in Cargo.toml
//! - Crate discovery via `cargo metadata` or a fallback directory scan
//! - Per-crate line counts and macro analysis, run by the builder for each
//!   crate

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use walkdir::WalkDir;

use crate::cache;
use crate::count::count_files_lines;
use crate::error::{MacrostatError, MacrostatResult};
use crate::macros::{analyze_files, MacroSummary};
use crate::scan::{gather_crate_files, EXCLUDED_DIRS};

/// How deep the fallback scan looks for member manifests.
const MAX_MEMBER_DEPTH: usize = 3;

/// Minimal subset of `cargo metadata` output we need.
#[derive(Debug, Deserialize)]
struct CargoMetadata {
    packages: Vec<CargoPackage>,
}

#[derive(Debug, Deserialize)]
struct CargoPackage {
    name: String,
    manifest_path: String,
}

#[derive(Debug, Default, Deserialize)]
struct Manifest {
    package: Option<ManifestPackage>,
    workspace: Option<toml::Value>,
}

#[derive(Debug, Deserialize)]
struct ManifestPackage {
    name: Option<String>,
}

/// A crate found under the analysis root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrateInfo {
    pub name: String,
    pub root: PathBuf,
}

/// Per-crate analysis options.
#[derive(Debug, Clone, Default)]
pub struct AnalyzeOptions {
    pub use_cache: bool,
    /// Extra directory names to prune while scanning
    pub excluded_dirs: Vec<String>,
}

impl AnalyzeOptions {
    fn excludes(&self) -> Vec<&str> {
        self.excluded_dirs.iter().map(String::as_str).collect()
    }
}

fn read_manifest(manifest: &Path) -> Option<Manifest> {
    let text = match fs::read_to_string(manifest) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(path = %manifest.display(), error = %e, "failed to read manifest");
            return None;
        }
    };
    match toml::from_str(&text) {
        Ok(manifest) => Some(manifest),
        Err(e) => {
            tracing::warn!(path = %manifest.display(), error = %e, "invalid manifest");
            None
        }
    }
}

/// Try `cargo metadata` for member discovery; respects workspace config.
fn try_cargo_metadata(path: &Path) -> Option<CargoMetadata> {
    let output = std::process::Command::new("cargo")
        .args(["metadata", "--no-deps", "--format-version", "1"])
        .current_dir(path)
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    serde_json::from_slice(&output.stdout).ok()
}

/// Detect if a root is a Cargo workspace.
pub fn is_workspace_root(root: &Path) -> bool {
    let cargo_toml = root.join("Cargo.toml");
    if !cargo_toml.exists() {
        return false;
    }
    read_manifest(&cargo_toml).is_some_and(|m| m.workspace.is_some())
}

/// Whether `dir` holds a package (not only a virtual workspace manifest).
fn is_package_dir(dir: &Path) -> bool {
    let manifest = dir.join("Cargo.toml");
    manifest.is_file() && read_manifest(&manifest).is_some_and(|m| m.package.is_some())
}

/// Read the crate name from `[package] name`, falling back to the directory
/// name.
pub fn crate_name(crate_root: &Path) -> String {
    read_manifest(&crate_root.join("Cargo.toml"))
        .and_then(|m| m.package)
        .and_then(|p| p.name)
        .unwrap_or_else(|| {
            crate_root
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "unknown".to_string())
        })
}

/// Find the crate or workspace root from a given path.
///
/// Search strategy:
/// 1. The path itself if it has a Cargo.toml or a src/ directory
/// 2. The nearest ancestor with a Cargo.toml
/// 3. Otherwise the path itself
pub fn find_crate_root(path: &Path) -> Option<PathBuf> {
    let canonical = path.canonicalize().ok()?;

    if canonical.join("Cargo.toml").exists() || canonical.join("src").exists() {
        return Some(canonical);
    }

    let mut current = canonical.as_path();
    while let Some(parent) = current.parent() {
        if parent.join("Cargo.toml").exists() {
            return Some(parent.to_path_buf());
        }
        current = parent;
    }

    Some(canonical)
}

/// Fallback discovery: the root package plus packages up to
/// `MAX_MEMBER_DEPTH` directories below it.
fn scan_for_crates(root: &Path) -> Vec<CrateInfo> {
    let excludes: HashSet<&str> = EXCLUDED_DIRS.iter().copied().collect();

    WalkDir::new(root)
        .max_depth(MAX_MEMBER_DEPTH)
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !e
                    .file_name()
                    .to_str()
                    .is_some_and(|name| excludes.contains(name))
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir() && is_package_dir(e.path()))
        .map(|e| CrateInfo {
            name: crate_name(e.path()),
            root: e.path().to_path_buf(),
        })
        .collect()
}

/// Find all crates under `root`.
///
/// Prefers `cargo metadata`, falls back to a directory scan. A root without
/// any manifest is treated as a single anonymous crate.
pub fn find_all_crates(root: &Path) -> MacrostatResult<Vec<CrateInfo>> {
    if !root.is_dir() {
        return Err(MacrostatError::workspace(root, "not a directory"));
    }

    if root.join("Cargo.toml").exists() {
        if let Some(meta) = try_cargo_metadata(root) {
            let mut crates: Vec<CrateInfo> = meta
                .packages
                .into_iter()
                .filter_map(|pkg| {
                    let manifest = PathBuf::from(&pkg.manifest_path);
                    manifest.parent().map(|dir| CrateInfo {
                        name: pkg.name,
                        root: dir.to_path_buf(),
                    })
                })
                .filter(|info| info.root.starts_with(root))
                .collect();
            if !crates.is_empty() {
                crates.sort_by(|a, b| a.root.cmp(&b.root));
                return Ok(crates);
            }
        }
    }

    let mut crates = scan_for_crates(root);
    if crates.is_empty() && root.join("src").is_dir() {
        crates.push(CrateInfo {
            name: crate_name(root),
            root: root.to_path_buf(),
        });
    }
    crates.sort_by(|a, b| a.root.cmp(&b.root));
    Ok(crates)
}

/// Lines of code in a crate's own sources.
pub fn count_crate(crate_root: &Path, options: &AnalyzeOptions) -> Result<usize> {
    let files = gather_crate_files(crate_root, &options.excludes())
        .with_context(|| format!("Failed to gather files for {}", crate_root.display()))?;
    Ok(count_files_lines(&files))
}

/// Macro analysis of a crate's own sources, incremental when caching is on.
pub fn analyze_crate_macros(crate_root: &Path, options: &AnalyzeOptions) -> Result<MacroSummary> {
    let files = gather_crate_files(crate_root, &options.excludes())
        .with_context(|| format!("Failed to gather files for {}", crate_root.display()))?;

    let summary = if options.use_cache {
        let cached = cache::load_cache(crate_root);
        cache::incremental_analyze(crate_root, &files, cached)
    } else {
        analyze_files(&files)
    };
    Ok(summary)
}
