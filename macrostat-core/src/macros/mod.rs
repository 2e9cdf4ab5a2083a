//! Macro definition and invocation analysis.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐     ┌─────────────────────┐
//! │ macro_extractor.rs  │     │   macro_usage.rs    │
//! │  ─────────────────  │     │  ─────────────────  │
//! │  macro_rules!,      │     │  foo!(), #[derive], │
//! │  #[proc_macro*] fns │     │  attribute macros   │
//! └──────────┬──────────┘     └──────────┬──────────┘
//!            │                           │
//!            └───────────┬───────────────┘
//!                        ▼
//!            ┌─────────────────────┐
//!            │ macro_analyzer.rs   │
//!            │  ─────────────────  │
//!            │  MacroAnalyzis per  │
//!            │  file, merged       │
//!            └─────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use macrostat_core::macros::analyze_source;
//!
//! let analyzis = analyze_source(&path, &content);
//! println!("{} invocations", analyzis.macro_invocation_count);
//! ```

pub mod macro_analyzer;
pub mod macro_extractor;
pub mod macro_usage;

pub use macro_analyzer::{
    analyze_file, analyze_files, analyze_source, analyze_source_strict, build_analyzis,
    FileMacros, MacroSummary,
};
pub use macro_extractor::{extract_macros, extract_macros_strict, MacroDef, MacroKind};
pub use macro_usage::{
    extract_macro_usages, extract_macro_usages_strict, is_builtin_attribute, path_to_string,
    MacroUsageResult,
};
