//! Incremental analysis cache using SHA-256 for change detection.
//!
//! Performance characteristics:
//! - Parallel file hashing and parsing via Rayon
//! - Read-once pattern: file content read once, then hashed and parsed
//! - O(changed_files) parsing work, O(1) cache lookups
//!
//! Stored at `<crate>/.macrostat/cache.json`, keyed by the file path relative
//! to the crate root.
//!
//! # Cache Versioning
//!
//! The cache is discarded when its format version or the macrostat major
//! version differs from the running one.

use crate::error::MacrostatError;
use crate::macros::{analyze_source_strict, FileMacros, MacroSummary};
use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Maximum cache file size (50MB)
const MAX_CACHE_SIZE_BYTES: usize = 50_000_000;

/// Current cache format version. Increment when cache format changes.
const CACHE_VERSION: u32 = 1;

const MACROSTAT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Directory holding cache, results and state files.
pub const DATA_DIR: &str = ".macrostat";

/// Cached analysis of one file.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CachedFile {
    pub hash: String,
    pub macros: FileMacros,
}

/// Cache metadata for version checking.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct CacheMetadata {
    pub cache_version: u32,
    /// macrostat version that created this cache
    pub macrostat_version: String,
    #[serde(default)]
    pub created_at: u64,
}

impl CacheMetadata {
    /// Create metadata for current environment.
    pub fn current() -> Self {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Self {
            cache_version: CACHE_VERSION,
            macrostat_version: MACROSTAT_VERSION.to_string(),
            created_at,
        }
    }

    /// Check if this cache is compatible with current version.
    pub fn is_compatible(&self) -> bool {
        if self.cache_version != CACHE_VERSION {
            return false;
        }

        let current_major = MACROSTAT_VERSION.split('.').next().unwrap_or("0");
        let cached_major = self.macrostat_version.split('.').next().unwrap_or("0");

        current_major == cached_major
    }
}

/// The full cache model.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct MacrostatCache {
    #[serde(default)]
    pub metadata: CacheMetadata,
    /// Relative file path to its cached analysis
    pub files: HashMap<String, CachedFile>,
}

#[inline]
fn hash_bytes(bytes: &[u8]) -> String {
    let mut sha = Sha256::new();
    sha.update(bytes);
    format!("{:x}", sha.finalize())
}

/// Compute the SHA-256 hash of a file's content.
pub fn file_hash(path: &Path) -> Result<String> {
    let bytes =
        fs::read(path).with_context(|| format!("Failed to read {} for hashing", path.display()))?;
    Ok(hash_bytes(&bytes))
}

fn cache_path(crate_root: &Path) -> PathBuf {
    crate_root.join(DATA_DIR).join("cache.json")
}

/// Load the cache for a crate.
///
/// Returns `None` if the file is missing, corrupted or incompatible.
pub fn load_cache(crate_root: &Path) -> Option<MacrostatCache> {
    let path = cache_path(crate_root);
    if !path.exists() {
        return None;
    }

    let text = fs::read_to_string(&path).ok()?;
    let cache: MacrostatCache = match serde_json::from_str(&text) {
        Ok(cache) => cache,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "corrupted cache ignored");
            return None;
        }
    };

    if !cache.metadata.is_compatible() {
        tracing::info!(
            cached_version = cache.metadata.cache_version,
            cached_macrostat = %cache.metadata.macrostat_version,
            current_version = CACHE_VERSION,
            current_macrostat = MACROSTAT_VERSION,
            "cache version mismatch, rebuilding"
        );
        let _ = fs::remove_file(&path);
        return None;
    }

    Some(cache)
}

/// Write `content` to `path` atomically (temp file + rename).
///
/// The temp name combines PID and a nanosecond timestamp so concurrent
/// writers never share a temp file.
pub fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| MacrostatError::invalid_argument(format!("{} has no parent", path.display())))?;
    if !dir.exists() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "data".to_string());
    let temp_path = dir.join(format!("{}.{}.{}.tmp", file_name, std::process::id(), nanos));

    fs::write(&temp_path, content)
        .with_context(|| format!("Failed to write temp file: {}", temp_path.display()))?;

    fs::rename(&temp_path, path).with_context(|| {
        let _ = fs::remove_file(&temp_path);
        format!("Failed to rename temp file to: {}", path.display())
    })?;

    Ok(())
}

/// Save the cache for a crate.
///
/// A cache above the size limit is dropped instead of written.
pub fn save_cache(crate_root: &Path, cache: &MacrostatCache) -> Result<()> {
    let path = cache_path(crate_root);
    let json = serde_json::to_string(cache)?;

    if json.len() > MAX_CACHE_SIZE_BYTES {
        tracing::warn!(
            limit_mb = MAX_CACHE_SIZE_BYTES / 1_000_000,
            "cache exceeds size limit, clearing"
        );
        let _ = fs::remove_file(&path);
        return Ok(());
    }

    write_atomic(&path, &json)
}

/// Key for a file inside a crate's cache: path relative to the crate root,
/// forward slashes.
fn cache_key(crate_root: &Path, file: &Path) -> String {
    file.strip_prefix(crate_root)
        .unwrap_or(file)
        .to_string_lossy()
        .replace('\\', "/")
}

enum FileProcessResult {
    Ok(String, CachedFile),
    Failed(PathBuf, MacrostatError),
}

/// Read, hash, and analyze one file unless the cache already has its hash.
fn process_file(crate_root: &Path, file: &Path, old_cache: Option<&MacrostatCache>) -> FileProcessResult {
    let key = cache_key(crate_root, file);

    let content = match fs::read_to_string(file) {
        Ok(c) => c,
        Err(e) => return FileProcessResult::Failed(file.to_path_buf(), MacrostatError::io(file, e)),
    };

    let hash = hash_bytes(content.as_bytes());

    if let Some(cached) = old_cache.and_then(|old| old.files.get(&key)) {
        if cached.hash == hash {
            return FileProcessResult::Ok(key, cached.clone());
        }
    }

    match analyze_source_strict(file, &content) {
        Ok(macros) => FileProcessResult::Ok(key, CachedFile { hash, macros }),
        Err(e) => FileProcessResult::Failed(file.to_path_buf(), e),
    }
}

/// Incremental macro analysis of a crate's files.
///
/// Fault tolerance:
/// - unchanged hash → cached result reused
/// - changed or new file → re-parsed with `syn`
/// - unreadable/unparsable file → reported in `parse_failures`, others continue
/// - cache write failure → logged, analysis still returned
pub fn incremental_analyze(
    crate_root: &Path,
    files: &[PathBuf],
    old_cache: Option<MacrostatCache>,
) -> MacroSummary {
    let results: Vec<FileProcessResult> = files
        .par_iter()
        .map(|file| process_file(crate_root, file, old_cache.as_ref()))
        .collect();

    let mut new_cache = MacrostatCache {
        metadata: CacheMetadata::current(),
        files: HashMap::with_capacity(results.len()),
    };
    let mut outcomes = Vec::with_capacity(results.len());

    for result in results {
        match result {
            FileProcessResult::Ok(key, cached) => {
                outcomes.push((crate_root.join(&key), Ok(cached.macros.clone())));
                new_cache.files.insert(key, cached);
            }
            FileProcessResult::Failed(path, e) => outcomes.push((path, Err(e))),
        }
    }

    if let Err(e) = save_cache(crate_root, &new_cache) {
        tracing::warn!(error = %e, "cache save failed");
    }

    MacroSummary::collect(outcomes)
}
