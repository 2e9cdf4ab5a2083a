//! Per-file and multi-file macro analysis.
//!
//! Each file is parsed once; the definition extractor and the usage extractor
//! walk the same AST. File results are folded into a [`MacroSummary`] whose
//! `analyzis` is the [`MacroAnalyzis`] record for the whole file set.
//!
//! Performance characteristics:
//! - One `syn::parse_file` per file
//! - Files are analyzed in parallel, merged sequentially in O(files)

use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::macro_extractor::{extract_macros_from_ast, MacroDef, MacroKind};
use super::macro_usage::{extract_macro_usages_from_ast, MacroUsageResult};
use crate::analyzis::MacroAnalyzis;
use crate::error::{IoResultExt, MacrostatError, MacrostatResult};

/// Files larger than this are skipped rather than parsed.
const MAX_FILE_SIZE: usize = 10_000_000;

/// Macro definitions and the resulting record for one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMacros {
    pub definitions: Vec<MacroDef>,
    pub analyzis: MacroAnalyzis,
}

/// Build the record from the two extraction passes.
pub fn build_analyzis(definitions: &[MacroDef], usage: &MacroUsageResult) -> MacroAnalyzis {
    let count = |kind: MacroKind| definitions.iter().filter(|d| d.kind == kind).count();

    MacroAnalyzis {
        attribute_macro_definition_count: count(MacroKind::Attribute),
        declarative_macro_definition_count: count(MacroKind::Declarative),
        procedural_macro_definition_count: count(MacroKind::Procedural),
        derive_macro_definition_count: count(MacroKind::Derive),
        derive_macro_usage: usage.derive_usage.clone(),
        attribute_macro_invocation_count: usage.attribute_invocations(),
        attribute_macro_usage: usage.attribute_usage.clone(),
        macro_invocation_count: usage.total_invocations(),
    }
}

/// Analyze one file's content, failing on syntax errors.
pub fn analyze_source_strict(path: &Path, content: &str) -> MacrostatResult<FileMacros> {
    if content.len() > MAX_FILE_SIZE {
        return Err(MacrostatError::parse(
            path,
            format!("file exceeds {} bytes", MAX_FILE_SIZE),
        ));
    }

    let ast = syn::parse_file(content).map_err(|e| MacrostatError::from_syn(path, &e))?;
    let definitions = extract_macros_from_ast(path, &ast);
    let usage = extract_macro_usages_from_ast(&ast);
    let analyzis = build_analyzis(&definitions, &usage);

    Ok(FileMacros {
        definitions,
        analyzis,
    })
}

/// Analyze one file's content; a syntax error yields the empty record.
pub fn analyze_source(path: &Path, content: &str) -> MacroAnalyzis {
    match analyze_source_strict(path, content) {
        Ok(file) => file.analyzis,
        Err(e) => {
            tracing::warn!(file = %path.display(), error = %e, "AST parse failed");
            MacroAnalyzis::default()
        }
    }
}

/// Read and analyze one file.
pub fn analyze_file(path: &Path) -> MacrostatResult<FileMacros> {
    let content = fs::read_to_string(path).with_path(path)?;
    analyze_source_strict(path, &content)
}

/// Aggregated macro analysis over a set of files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroSummary {
    pub analyzis: MacroAnalyzis,
    /// Definitions sorted by file, then name
    pub definitions: Vec<MacroDef>,
    /// Files that could not be read or parsed
    pub parse_failures: Vec<String>,
    /// Files analyzed successfully
    pub files_analyzed: usize,
}

impl MacroSummary {
    /// Fold per-file outcomes into one summary.
    pub fn collect(
        outcomes: impl IntoIterator<Item = (PathBuf, MacrostatResult<FileMacros>)>,
    ) -> Self {
        let mut summary = MacroSummary::default();

        for (path, outcome) in outcomes {
            match outcome {
                Ok(file) => {
                    summary.analyzis.merge(&file.analyzis);
                    summary.definitions.extend(file.definitions);
                    summary.files_analyzed += 1;
                }
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "skipping file");
                    summary.parse_failures.push(path.display().to_string());
                }
            }
        }

        summary
            .definitions
            .sort_by(|a, b| a.file.cmp(&b.file).then_with(|| a.name.cmp(&b.name)));
        summary.parse_failures.sort();
        summary
    }

    /// Definitions of one kind.
    pub fn definitions_of(&self, kind: MacroKind) -> impl Iterator<Item = &MacroDef> {
        self.definitions.iter().filter(move |d| d.kind == kind)
    }
}

/// Analyze files in parallel without caching.
///
/// Fault tolerance: unreadable or unparsable files are recorded in
/// `parse_failures` and the rest of the set is still analyzed.
pub fn analyze_files(files: &[PathBuf]) -> MacroSummary {
    let outcomes: Vec<(PathBuf, MacrostatResult<FileMacros>)> = files
        .par_iter()
        .map(|file| (file.clone(), analyze_file(file)))
        .collect();

    MacroSummary::collect(outcomes)
}
