//! macrostat-core: macro usage statistics for Rust crates and workspaces
//!
//! This library scans Rust sources with `syn` and reports how macros are
//! defined and used, summarized in a [`MacroAnalyzis`] record per crate.
//!
//! # Features
//!
//! - **Definitions**: `macro_rules!`, `macro` 2.0, `#[proc_macro]`,
//!   `#[proc_macro_derive]` and `#[proc_macro_attribute]` functions
//! - **Invocations**: bang macros, `#[derive]` paths and attribute macros
//! - **Line counts**: code lines before and after `cargo expand`
//! - **Incremental caching**: only re-parse changed files
//! - **Workspace support**: every member crate analyzed in parallel
//! - **Resumable runs**: results and phase state saved under `.macrostat/`
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use macrostat_core::prelude::*;
//!
//! let results = Macrostat::new("/path/to/crate").run()?;
//! let total = results.total();
//! println!("{} macro invocations", total.macro_invocation_count);
//! ```
//!
//! # Module Organization
//!
//! - [`analyzis`]: the [`MacroAnalyzis`] record and its usage maps
//! - [`macros`]: definition and invocation extraction
//! - [`count`]: lines-of-code counting
//! - [`scan`]: source file discovery
//! - [`workspace`]: crate discovery and per-crate analysis
//! - [`expand`]: `cargo expand` runner
//! - [`cache`]: incremental per-file cache with SHA-256 change detection
//! - [`results`], [`state`]: persisted results and run state
//! - [`builder`]: fluent builder API for a whole run
//! - [`error`]: typed error handling
//!
//! # Cargo Features
//!
//! - `expand` (default): the `cargo expand` phase
//! - `typescript`: `ts_rs::TS` derives for the records

pub mod analyzis;
pub mod builder;
pub mod cache;
pub mod config;
pub mod count;
pub mod error;
pub mod logging;
pub mod macros;
pub mod prelude;
pub mod report;
pub mod results;
pub mod scan;
pub mod state;
pub mod workspace;

#[cfg(feature = "expand")]
pub mod expand;

// ============================================================================
// Explicit Re-exports (avoiding glob imports for clear API surface)
// ============================================================================

// Records
pub use analyzis::{AttributeMacroUsage, DeriveMacroUsage, MacroAnalyzis};

// Error types
pub use error::{IoResultExt, MacrostatError, MacrostatResult};

// Builder API
pub use builder::Macrostat;

// Cache types
pub use cache::{
    file_hash, incremental_analyze, load_cache, save_cache, CacheMetadata, CachedFile,
    MacrostatCache,
};

// Configuration
pub use config::{load_config, ExpandConfig, MacrostatConfig, OutputConfig};

// Line counting
pub use count::{count_code_lines, count_file_lines, count_files_lines};

// Logging
pub use logging::init_structured_logging;

// Macro extraction
pub use macros::{
    analyze_file, analyze_files, analyze_source, analyze_source_strict, extract_macro_usages,
    extract_macros, FileMacros, MacroDef, MacroKind, MacroSummary, MacroUsageResult,
};

// Reporting
pub use report::{print_json, print_plain, render_json, render_plain};

// Results and run state
pub use results::{AnalyzisResults, CrateAnalyzis, ExpansionOutcome};
pub use state::{Phase, RunState};

// File scanning
pub use scan::{gather_crate_files, gather_rs_files, gather_rs_files_with_excludes};

// Workspace analysis
pub use workspace::{
    analyze_crate_macros, count_crate, find_all_crates, find_crate_root, is_workspace_root,
    AnalyzeOptions, CrateInfo,
};

#[cfg(feature = "expand")]
pub use expand::{expand_crate, expand_crates, ExpandOptions};
