//! Configuration loading from macrostat.toml.
//!
//! ```toml
//! exclude = ["generated"]
//!
//! [expand]
//! enabled = true
//! toolchain = "nightly"
//! workers = 10
//! no_default_features = true
//!
//! [output]
//! format = "json"
//! ```

use serde::Deserialize;
use std::{fs, path::Path};

use crate::error::{MacrostatError, MacrostatResult};

pub const CONFIG_FILE_NAME: &str = "macrostat.toml";

/// Default number of crates expanded concurrently.
pub const DEFAULT_EXPAND_WORKERS: usize = 10;

pub const DEFAULT_TOOLCHAIN: &str = "nightly";

/// Main configuration structure for macrostat.toml.
#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MacrostatConfig {
    /// Directory names to skip while scanning.
    pub exclude: Option<Vec<String>>,
    pub expand: Option<ExpandConfig>,
    pub output: Option<OutputConfig>,
}

/// `cargo expand` settings.
#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ExpandConfig {
    pub enabled: Option<bool>,
    /// Toolchain passed as `+<toolchain>` and `RUSTUP_TOOLCHAIN`.
    pub toolchain: Option<String>,
    pub workers: Option<usize>,
    pub no_default_features: Option<bool>,
}

/// Output format configuration.
#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// "plain" or "json".
    pub format: Option<String>,
}

impl MacrostatConfig {
    pub fn excluded_dirs(&self) -> Vec<String> {
        self.exclude.clone().unwrap_or_default()
    }

    pub fn expand_enabled(&self) -> bool {
        self.expand.as_ref().and_then(|e| e.enabled).unwrap_or(false)
    }

    pub fn toolchain(&self) -> String {
        self.expand
            .as_ref()
            .and_then(|e| e.toolchain.clone())
            .unwrap_or_else(|| DEFAULT_TOOLCHAIN.to_string())
    }

    pub fn workers(&self) -> usize {
        self.expand
            .as_ref()
            .and_then(|e| e.workers)
            .filter(|w| *w > 0)
            .unwrap_or(DEFAULT_EXPAND_WORKERS)
    }

    pub fn no_default_features(&self) -> bool {
        self.expand
            .as_ref()
            .and_then(|e| e.no_default_features)
            .unwrap_or(true)
    }

    pub fn json_output(&self) -> bool {
        self.output
            .as_ref()
            .and_then(|o| o.format.as_deref())
            .is_some_and(|f| f.eq_ignore_ascii_case("json"))
    }
}

/// Loads configuration from macrostat.toml if it exists.
///
/// Unreadable or malformed files are [`MacrostatError::Config`].
pub fn load_config(root: &Path) -> MacrostatResult<Option<MacrostatConfig>> {
    let path = root.join(CONFIG_FILE_NAME);
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(&path)
        .map_err(|e| MacrostatError::config(&path, format!("Failed to read: {}", e)))?;
    let cfg = toml::from_str(&content)
        .map_err(|e| MacrostatError::config(&path, format!("Invalid {}: {}", CONFIG_FILE_NAME, e)))?;
    Ok(Some(cfg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_sections() {
        let cfg: MacrostatConfig = toml::from_str("").unwrap();
        assert!(!cfg.expand_enabled());
        assert_eq!(cfg.toolchain(), "nightly");
        assert_eq!(cfg.workers(), DEFAULT_EXPAND_WORKERS);
        assert!(cfg.no_default_features());
        assert!(!cfg.json_output());
        assert!(cfg.excluded_dirs().is_empty());
    }

    #[test]
    fn test_full_config() {
        let cfg: MacrostatConfig = toml::from_str(
            r#"
exclude = ["generated", "fixtures"]

[expand]
enabled = true
toolchain = "nightly-2024-06-01"
workers = 4
no_default_features = false

[output]
format = "JSON"
"#,
        )
        .unwrap();

        assert_eq!(cfg.excluded_dirs(), vec!["generated", "fixtures"]);
        assert!(cfg.expand_enabled());
        assert_eq!(cfg.toolchain(), "nightly-2024-06-01");
        assert_eq!(cfg.workers(), 4);
        assert!(!cfg.no_default_features());
        assert!(cfg.json_output());
    }

    #[test]
    fn test_zero_workers_falls_back_to_default() {
        let cfg: MacrostatConfig = toml::from_str("[expand]\nworkers = 0").unwrap();
        assert_eq!(cfg.workers(), DEFAULT_EXPAND_WORKERS);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        assert!(toml::from_str::<MacrostatConfig>("ignore = [\"x\"]").is_err());
    }

    #[test]
    fn test_load_config_missing_file() {
        let dir = std::env::temp_dir().join(format!("macrostat_config_none_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        assert!(load_config(&dir).unwrap().is_none());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_config_invalid_file() {
        let dir = std::env::temp_dir().join(format!("macrostat_config_bad_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(CONFIG_FILE_NAME), "exclude = 3").unwrap();
        match load_config(&dir) {
            Err(MacrostatError::Config { path, message }) => {
                assert_eq!(path, dir.join(CONFIG_FILE_NAME));
                assert!(message.contains(CONFIG_FILE_NAME));
            }
            other => panic!("Expected Config error, got {:?}", other),
        }
        fs::remove_dir_all(&dir).ok();
    }
}
