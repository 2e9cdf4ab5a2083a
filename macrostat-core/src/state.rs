//! Run state: which pipeline phases have completed for a root.
//!
//! Stored at `<root>/.macrostat/state.json`. A phase with a timestamp is
//! skipped on the next run unless the run is started fresh.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::cache::{write_atomic, DATA_DIR};
use crate::error::{IoResultExt, MacrostatError, MacrostatResult};

/// Pipeline phases tracked in [`RunState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Counted,
    Expanded,
    Analyzed,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Counted => write!(f, "counted"),
            Self::Expanded => write!(f, "expanded"),
            Self::Analyzed => write!(f, "analyzed"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    #[serde(default)]
    pub counted_at: Option<DateTime<Local>>,
    #[serde(default)]
    pub expanded_at: Option<DateTime<Local>>,
    #[serde(default)]
    pub analyzed_at: Option<DateTime<Local>>,
}

fn state_path(root: &Path) -> PathBuf {
    root.join(DATA_DIR).join("state.json")
}

impl RunState {
    fn slot(&mut self, phase: Phase) -> &mut Option<DateTime<Local>> {
        match phase {
            Phase::Counted => &mut self.counted_at,
            Phase::Expanded => &mut self.expanded_at,
            Phase::Analyzed => &mut self.analyzed_at,
        }
    }

    /// When `phase` completed, if it has.
    pub fn completed_at(&self, phase: Phase) -> Option<DateTime<Local>> {
        match phase {
            Phase::Counted => self.counted_at,
            Phase::Expanded => self.expanded_at,
            Phase::Analyzed => self.analyzed_at,
        }
    }

    pub fn is_done(&self, phase: Phase) -> bool {
        self.completed_at(phase).is_some()
    }

    pub fn mark_done(&mut self, phase: Phase) {
        *self.slot(phase) = Some(Local::now());
    }

    /// Load state saved under `root`; missing state is the default.
    pub fn load(root: &Path) -> MacrostatResult<Self> {
        let path = state_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(&path).with_path(&path)?;
        serde_json::from_str(&text)
            .map_err(|e| MacrostatError::results(format!("invalid {}: {}", path.display(), e)))
    }

    pub fn save(&self, root: &Path) -> MacrostatResult<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| MacrostatError::results(e.to_string()))?;
        write_atomic(&state_path(root), &json).map_err(|e| MacrostatError::results(format!("{:#}", e)))
    }
}
