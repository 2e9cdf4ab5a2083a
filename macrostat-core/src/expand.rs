//! Macro expansion through `cargo expand`.
//!
//! For each crate the expanded source is written to
//! `<crate>/.macro-expanded.rs` and its lines of code are counted, which gives
//! the size of the code after macros have run next to `source_lines`.
//!
//! Crates are expanded on a dedicated Rayon pool so the number of concurrent
//! `cargo` processes stays bounded by `workers`.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use serde::Deserialize;

use crate::config::{DEFAULT_EXPAND_WORKERS, DEFAULT_TOOLCHAIN};
use crate::count::count_code_lines;
use crate::error::{IoResultExt, MacrostatError, MacrostatResult};
use crate::results::ExpansionOutcome;
use crate::scan::EXPANDED_FILE_NAME;

/// Options for running `cargo expand`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandOptions {
    /// Cargo executable
    pub cargo: String,
    pub toolchain: String,
    pub no_default_features: bool,
    /// Maximum concurrent expansions
    pub workers: usize,
}

impl Default for ExpandOptions {
    fn default() -> Self {
        Self {
            cargo: "cargo".to_string(),
            toolchain: DEFAULT_TOOLCHAIN.to_string(),
            no_default_features: true,
            workers: DEFAULT_EXPAND_WORKERS,
        }
    }
}

/// The parts of Cargo.toml that influence the expand invocation.
#[derive(Debug, Default, Deserialize)]
struct CargoToml {
    lib: Option<toml::Value>,
}

fn has_lib_target(manifest: &Path) -> bool {
    fs::read_to_string(manifest)
        .ok()
        .and_then(|text| toml::from_str::<CargoToml>(&text).ok())
        .is_some_and(|cargo| cargo.lib.is_some())
}

/// Arguments passed to cargo for one crate.
pub fn expand_args(manifest: &Path, options: &ExpandOptions, lib: bool) -> Vec<String> {
    let mut args = vec![
        format!("+{}", options.toolchain),
        "expand".to_string(),
    ];
    if options.no_default_features {
        args.push("--no-default-features".to_string());
    }
    args.push("--manifest-path".to_string());
    args.push(manifest.display().to_string());
    if lib {
        args.push("--lib".to_string());
    }
    args
}

/// Path of the expansion output for a crate.
pub fn expanded_path(crate_root: &Path) -> PathBuf {
    crate_root.join(EXPANDED_FILE_NAME)
}

/// Expand one crate and write the output next to its manifest.
///
/// Returns the lines of code of the expanded source.
pub fn expand_crate(crate_root: &Path, options: &ExpandOptions) -> MacrostatResult<usize> {
    let manifest = crate_root.join("Cargo.toml");
    if !manifest.is_file() {
        return Err(MacrostatError::expand(crate_root, "no Cargo.toml"));
    }

    let args = expand_args(&manifest, options, has_lib_target(&manifest));
    tracing::debug!(crate_root = %crate_root.display(), args = ?args, "running cargo expand");

    let output = Command::new(&options.cargo)
        .env("RUSTUP_TOOLCHAIN", &options.toolchain)
        .args(&args)
        .current_dir(crate_root)
        .output()
        .map_err(|e| MacrostatError::expand(crate_root, format!("failed to run {}: {}", options.cargo, e)))?;

    if !output.status.success() {
        return Err(MacrostatError::expand(
            crate_root,
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }

    let expanded = String::from_utf8_lossy(&output.stdout);
    let out_path = expanded_path(crate_root);
    fs::write(&out_path, expanded.as_bytes()).with_path(&out_path)?;

    Ok(count_code_lines(&expanded))
}

/// Expand many crates with at most `options.workers` running at once.
///
/// Failures do not stop the batch; each crate gets its own outcome, in input
/// order.
pub fn expand_crates(
    crate_roots: &[PathBuf],
    options: &ExpandOptions,
) -> MacrostatResult<Vec<(PathBuf, ExpansionOutcome)>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.workers.max(1))
        .thread_name(|i| format!("macrostat-expand-{}", i))
        .build()
        .map_err(|e| MacrostatError::Internal {
            message: format!("failed to build expansion pool: {}", e),
        })?;

    let done = AtomicUsize::new(0);
    let total = crate_roots.len();

    let outcomes = pool.install(|| {
        crate_roots
            .par_iter()
            .map(|root| {
                let outcome = match expand_crate(root, options) {
                    Ok(lines) => ExpansionOutcome::Expanded { lines },
                    Err(e) => {
                        tracing::warn!(crate_root = %root.display(), error = %e, "expansion failed");
                        ExpansionOutcome::Failed {
                            error: e.to_string(),
                        }
                    }
                };
                let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::info!(crate_root = %root.display(), progress = n, total, "crate expanded");
                (root.clone(), outcome)
            })
            .collect()
    });

    Ok(outcomes)
}
