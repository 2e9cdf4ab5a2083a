//! Prelude module for convenient imports.
//!
//! ```rust,ignore
//! use macrostat_core::prelude::*;
//! ```

// Records
pub use crate::analyzis::{AttributeMacroUsage, DeriveMacroUsage, MacroAnalyzis};
pub use crate::error::{MacrostatError, MacrostatResult};

// Builder API
pub use crate::builder::Macrostat;

// Results
pub use crate::results::{AnalyzisResults, CrateAnalyzis, ExpansionOutcome};

// Per-file analysis
pub use crate::macros::{analyze_files, analyze_source, MacroDef, MacroKind, MacroSummary};

// Workspace analysis
pub use crate::workspace::{find_all_crates, CrateInfo};

// Configuration
pub use crate::config::{load_config, MacrostatConfig};
