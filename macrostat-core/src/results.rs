//! Per-crate analysis results, persisted at `<root>/.macrostat/results.json`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::analyzis::MacroAnalyzis;
use crate::cache::{write_atomic, DATA_DIR};
use crate::error::{IoResultExt, MacrostatError, MacrostatResult};
use crate::macros::MacroDef;
use crate::workspace::CrateInfo;

/// Outcome of running `cargo expand` on a crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExpansionOutcome {
    Expanded { lines: usize },
    Failed { error: String },
}

impl ExpansionOutcome {
    pub fn lines(&self) -> Option<usize> {
        match self {
            Self::Expanded { lines } => Some(*lines),
            Self::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Everything known about one crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrateAnalyzis {
    pub name: String,
    /// Crate directory relative to the analysis root ("." for the root crate)
    pub path: String,
    /// Lines of code in the crate's own sources
    #[serde(default)]
    pub source_lines: Option<usize>,
    #[serde(default)]
    pub expansion: Option<ExpansionOutcome>,
    #[serde(default)]
    pub macros: Option<MacroAnalyzis>,
    #[serde(default)]
    pub definitions: Vec<MacroDef>,
    #[serde(default)]
    pub parse_failures: Vec<String>,
}

impl CrateAnalyzis {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            source_lines: None,
            expansion: None,
            macros: None,
            definitions: Vec::new(),
            parse_failures: Vec::new(),
        }
    }

    /// Expanded lines per source line, when both are known.
    pub fn expansion_ratio(&self) -> Option<f64> {
        let source = self.source_lines.filter(|n| *n > 0)?;
        let expanded = self.expansion.as_ref()?.lines()?;
        Some(expanded as f64 / source as f64)
    }
}

/// Results of a run over one root (single crate or workspace).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzisResults {
    /// Crates keyed by their path relative to the root
    pub crates: BTreeMap<String, CrateAnalyzis>,
}

/// Key used for a crate in [`AnalyzisResults::crates`].
pub fn crate_key(root: &Path, crate_root: &Path) -> String {
    let rel = crate_root
        .strip_prefix(root)
        .unwrap_or(crate_root)
        .to_string_lossy()
        .replace('\\', "/");
    if rel.is_empty() {
        ".".to_string()
    } else {
        rel
    }
}

fn results_path(root: &Path) -> PathBuf {
    root.join(DATA_DIR).join("results.json")
}

impl AnalyzisResults {
    /// Fresh results with one empty row per discovered crate.
    pub fn from_crates(root: &Path, crates: &[CrateInfo]) -> Self {
        let mut results = Self::default();
        results.add_missing(root, crates);
        results
    }

    /// Add rows for crates not yet present; existing rows are kept.
    pub fn add_missing(&mut self, root: &Path, crates: &[CrateInfo]) {
        for info in crates {
            let key = crate_key(root, &info.root);
            self.crates
                .entry(key.clone())
                .or_insert_with(|| CrateAnalyzis::new(info.name.clone(), key));
        }
    }

    /// Apply `f` to the row for `key`, if present.
    pub fn update_crate(&mut self, key: &str, f: impl FnOnce(&mut CrateAnalyzis)) -> bool {
        match self.crates.get_mut(key) {
            Some(row) => {
                f(row);
                true
            }
            None => false,
        }
    }

    /// Merge of every crate's macro analysis.
    pub fn total(&self) -> MacroAnalyzis {
        MacroAnalyzis::merged(self.crates.values().filter_map(|c| c.macros.as_ref()))
    }

    pub fn total_source_lines(&self) -> usize {
        self.crates.values().filter_map(|c| c.source_lines).sum()
    }

    /// Sum of expanded lines over successfully expanded crates.
    pub fn total_expanded_lines(&self) -> usize {
        self.crates
            .values()
            .filter_map(|c| c.expansion.as_ref().and_then(ExpansionOutcome::lines))
            .sum()
    }

    pub fn failed_expansions(&self) -> usize {
        self.crates
            .values()
            .filter(|c| c.expansion.as_ref().is_some_and(ExpansionOutcome::is_failed))
            .count()
    }

    /// Check every crate record's invariants.
    pub fn check(&self) -> MacrostatResult<()> {
        for (key, row) in &self.crates {
            if let Some(macros) = &row.macros {
                macros.check().map_err(|e| {
                    MacrostatError::invariant(format!("crate {}: {}", key, e))
                })?;
            }
        }
        Ok(())
    }

    /// Load results saved under `root`, `None` if there are none.
    pub fn load(root: &Path) -> MacrostatResult<Option<Self>> {
        let path = results_path(root);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path).with_path(&path)?;
        let results = serde_json::from_str(&text).map_err(|e| {
            MacrostatError::results(format!("invalid {}: {}", path.display(), e))
        })?;
        Ok(Some(results))
    }

    /// Save results under `root` atomically.
    pub fn save(&self, root: &Path) -> MacrostatResult<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| MacrostatError::results(e.to_string()))?;
        write_atomic(&results_path(root), &json).map_err(|e| MacrostatError::results(format!("{:#}", e)))
    }
}
