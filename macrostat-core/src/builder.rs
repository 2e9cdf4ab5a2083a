//! Builder pattern API for macro statistics runs.
//!
//! ```rust,ignore
//! use macrostat_core::prelude::*;
//!
//! let results = Macrostat::new("/path/to/workspace")
//!     .with_cache(true)
//!     .with_expansion(true)
//!     .workers(4)
//!     .run()?;
//!
//! println!("{:?}", results.total());
//! ```
//!
//! A run goes through the phases discover → count → expand → analyze. Results
//! and run state are saved after every phase, so an interrupted run picks up
//! where it stopped. Completed phases are only repeated for crates that have
//! no data yet, unless the run is [`fresh`](Macrostat::fresh).

use std::path::PathBuf;

use anyhow::{Context, Result};
use rayon::prelude::*;

use crate::config::{DEFAULT_EXPAND_WORKERS, DEFAULT_TOOLCHAIN};
use crate::results::{crate_key, AnalyzisResults, CrateAnalyzis};
use crate::state::{Phase, RunState};
use crate::workspace::{analyze_crate_macros, count_crate, find_all_crates, AnalyzeOptions, CrateInfo};

/// Builder for configuring a run.
#[derive(Debug, Clone)]
pub struct Macrostat {
    /// Crate or workspace root
    root: PathBuf,

    /// Whether to use the incremental per-file cache
    use_cache: bool,

    /// Whether to run `cargo expand` on each crate
    expand: bool,

    /// Maximum concurrent expansions
    workers: usize,

    toolchain: String,

    no_default_features: bool,

    /// Cargo executable used for expansion
    cargo: String,

    /// Extra excluded directory names
    excluded_dirs: Vec<String>,

    /// Ignore saved results and state
    fresh: bool,
}

impl Macrostat {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            use_cache: true,
            expand: false,
            workers: DEFAULT_EXPAND_WORKERS,
            toolchain: DEFAULT_TOOLCHAIN.to_string(),
            no_default_features: true,
            cargo: "cargo".to_string(),
            excluded_dirs: Vec::new(),
            fresh: false,
        }
    }

    /// Enable or disable incremental caching.
    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.use_cache = enabled;
        self
    }

    /// Enable the `cargo expand` phase.
    pub fn with_expansion(mut self, enabled: bool) -> Self {
        self.expand = enabled;
        self
    }

    /// Number of crates expanded concurrently (at least one).
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn toolchain(mut self, toolchain: impl Into<String>) -> Self {
        self.toolchain = toolchain.into();
        self
    }

    pub fn no_default_features(mut self, enabled: bool) -> Self {
        self.no_default_features = enabled;
        self
    }

    /// Cargo executable used for expansion.
    pub fn cargo(mut self, cargo: impl Into<String>) -> Self {
        self.cargo = cargo.into();
        self
    }

    /// Add directories to exclude from scanning.
    pub fn exclude_dirs(mut self, dirs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.excluded_dirs.extend(dirs.into_iter().map(Into::into));
        self
    }

    /// Start over, ignoring saved results and state.
    pub fn fresh(mut self, enabled: bool) -> Self {
        self.fresh = enabled;
        self
    }

    fn analyze_options(&self) -> AnalyzeOptions {
        AnalyzeOptions {
            use_cache: self.use_cache,
            excluded_dirs: self.excluded_dirs.clone(),
        }
    }

    /// Load saved results and state unless the run is fresh.
    ///
    /// Unreadable files are logged and treated as absent.
    fn load_previous(&self) -> (AnalyzisResults, RunState) {
        if self.fresh {
            return (AnalyzisResults::default(), RunState::default());
        }

        let results = match AnalyzisResults::load(&self.root) {
            Ok(results) => results.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "discarding saved results");
                AnalyzisResults::default()
            }
        };
        let state = match RunState::load(&self.root) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(error = %e, "discarding saved run state");
                RunState::default()
            }
        };
        (results, state)
    }

    fn save(&self, results: &AnalyzisResults, state: &RunState) -> Result<()> {
        results
            .save(&self.root)
            .context("Failed to save results")?;
        state.save(&self.root).context("Failed to save run state")
    }

    /// Crates the phase must (re)visit: all of them the first time, only rows
    /// still lacking data once the phase has completed.
    fn pending<'a>(
        &self,
        crates: &'a [(String, CrateInfo)],
        results: &AnalyzisResults,
        state: &RunState,
        phase: Phase,
        has_data: impl Fn(&CrateAnalyzis) -> bool,
    ) -> Vec<&'a (String, CrateInfo)> {
        let done = state.is_done(phase);
        crates
            .iter()
            .filter(|(key, _)| !done || !results.crates.get(key).is_some_and(&has_data))
            .collect()
    }

    /// Run `work` on the crates in parallel. A crate that fails is logged and
    /// left out; the others come back in input order.
    fn for_each_crate<'a, T: Send>(
        pending: &[&'a (String, CrateInfo)],
        phase: Phase,
        work: impl Fn(&CrateInfo) -> Result<T> + Sync,
    ) -> Vec<(&'a String, T)> {
        pending
            .par_iter()
            .filter_map(|entry| {
                let (key, info) = *entry;
                match work(info) {
                    Ok(value) => Some((key, value)),
                    Err(e) => {
                        tracing::warn!(
                            crate_root = %info.root.display(),
                            phase = ?phase,
                            error = %e,
                            "crate failed"
                        );
                        None
                    }
                }
            })
            .collect()
    }

    /// Run every phase and return the results.
    pub fn run(&self) -> Result<AnalyzisResults> {
        if !self.root.is_dir() {
            anyhow::bail!("{} is not a directory", self.root.display());
        }

        // 1. Discover
        let crates: Vec<(String, CrateInfo)> = find_all_crates(&self.root)
            .context("Failed to discover crates")?
            .into_iter()
            .map(|info| (crate_key(&self.root, &info.root), info))
            .collect();
        if crates.is_empty() {
            anyhow::bail!("no crates found under {}", self.root.display());
        }
        tracing::info!(root = %self.root.display(), crates = crates.len(), "crates discovered");

        let (mut results, mut state) = self.load_previous();
        let infos: Vec<CrateInfo> = crates.iter().map(|(_, info)| info.clone()).collect();
        results.add_missing(&self.root, &infos);

        let options = self.analyze_options();

        // 2. Count
        let pending = self.pending(&crates, &results, &state, Phase::Counted, |c| {
            c.source_lines.is_some()
        });
        for (key, lines) in Self::for_each_crate(&pending, Phase::Counted, |info| {
            count_crate(&info.root, &options)
        }) {
            results.update_crate(key, |row| row.source_lines = Some(lines));
        }
        state.mark_done(Phase::Counted);
        self.save(&results, &state)?;

        // 3. Expand
        if self.expand {
            self.expand_phase(&crates, &mut results, &mut state)?;
        }

        // 4. Analyze
        let pending = self.pending(&crates, &results, &state, Phase::Analyzed, |c| {
            c.macros.is_some()
        });
        for (key, summary) in Self::for_each_crate(&pending, Phase::Analyzed, |info| {
            let summary = analyze_crate_macros(&info.root, &options)?;
            tracing::info!(
                crate_name = %info.name,
                files = summary.files_analyzed,
                failures = summary.parse_failures.len(),
                "crate analyzed"
            );
            Ok(summary)
        }) {
            results.update_crate(key, |row| {
                row.macros = Some(summary.analyzis);
                row.definitions = summary.definitions;
                row.parse_failures = summary.parse_failures;
            });
        }
        state.mark_done(Phase::Analyzed);
        self.save(&results, &state)?;

        Ok(results)
    }

    #[cfg(feature = "expand")]
    fn expand_phase(
        &self,
        crates: &[(String, CrateInfo)],
        results: &mut AnalyzisResults,
        state: &mut RunState,
    ) -> Result<()> {
        use crate::expand::{expand_crates, ExpandOptions};

        let pending = self.pending(crates, results, state, Phase::Expanded, |c| c.expansion.is_some());
        let roots: Vec<PathBuf> = pending.iter().map(|(_, info)| info.root.clone()).collect();

        let options = ExpandOptions {
            cargo: self.cargo.clone(),
            toolchain: self.toolchain.clone(),
            no_default_features: self.no_default_features,
            workers: self.workers,
        };
        let outcomes = expand_crates(&roots, &options).context("Failed to expand crates")?;

        for ((key, _), (_, outcome)) in pending.into_iter().zip(outcomes) {
            results.update_crate(key, |row| row.expansion = Some(outcome));
        }

        state.mark_done(Phase::Expanded);
        self.save(results, state)
    }

    #[cfg(not(feature = "expand"))]
    fn expand_phase(
        &self,
        _crates: &[(String, CrateInfo)],
        _results: &mut AnalyzisResults,
        _state: &mut RunState,
    ) -> Result<()> {
        tracing::warn!("expansion requested but macrostat was built without the `expand` feature");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn create_test_crate(name: &str) -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir()
            .join("macrostat_builder_test")
            .join(format!("{}_{}_{}", name, std::process::id(), id));

        if dir.exists() {
            fs::remove_dir_all(&dir).ok();
        }
        fs::create_dir_all(dir.join("src")).expect("Failed to create test directory");

        fs::write(dir.join("Cargo.toml"), "[package]\nname = \"demo\"\nversion = \"0.1.0\"")
            .expect("Failed to write Cargo.toml");
        fs::write(
            dir.join("src/main.rs"),
            "#[derive(Debug, Clone)]\nstruct Point;\n\nfn main() {\n    println!(\"{:?}\", Point);\n}\n",
        )
        .expect("Failed to write main.rs");

        dir
    }

    fn root_row(results: &AnalyzisResults) -> &CrateAnalyzis {
        &results.crates["."]
    }

    fn rewrite_main(dir: &Path) {
        fs::write(
            dir.join("src/main.rs"),
            "fn main() {\n    let v = vec![1];\n    assert!(!v.is_empty());\n    dbg!(v);\n}\n",
        )
        .unwrap();
    }

    #[test]
    fn test_run_basic() {
        let dir = create_test_crate("basic");

        let results = Macrostat::new(&dir).with_cache(false).run().unwrap();
        let row = root_row(&results);

        assert_eq!(row.name, "demo");
        assert_eq!(row.source_lines, Some(5));
        assert!(row.expansion.is_none());
        let macros = row.macros.as_ref().unwrap();
        assert_eq!(macros.derive_macro_invocation_count(), 2);
        assert_eq!(macros.macro_invocation_count, 3);
        assert!(results.check().is_ok());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_run_persists_results_and_state() {
        let dir = create_test_crate("persist");

        let results = Macrostat::new(&dir).with_cache(false).run().unwrap();

        let saved = AnalyzisResults::load(&dir).unwrap().unwrap();
        assert_eq!(saved, results);
        let state = RunState::load(&dir).unwrap();
        assert!(state.is_done(Phase::Counted));
        assert!(state.is_done(Phase::Analyzed));
        assert!(!state.is_done(Phase::Expanded));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_completed_phases_are_not_repeated() {
        let dir = create_test_crate("resume");
        Macrostat::new(&dir).with_cache(false).run().unwrap();

        rewrite_main(&dir);

        // saved rows are reused as-is
        let resumed = Macrostat::new(&dir).with_cache(false).run().unwrap();
        let macros = root_row(&resumed).macros.as_ref().unwrap();
        assert_eq!(macros.derive_macro_usage.get("Debug"), 1);

        let fresh = Macrostat::new(&dir).with_cache(false).fresh(true).run().unwrap();
        let macros = root_row(&fresh).macros.as_ref().unwrap();
        assert_eq!(macros.macro_invocation_count, 3);
        assert!(macros.derive_macro_usage.is_empty());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_exclude_dirs() {
        let dir = create_test_crate("exclude");
        fs::create_dir_all(dir.join("src/generated")).unwrap();
        fs::write(dir.join("src/generated/big.rs"), "#[derive(Debug)]\nstruct G;\n").unwrap();

        let all = Macrostat::new(&dir).with_cache(false).fresh(true).run().unwrap();
        assert_eq!(root_row(&all).macros.as_ref().unwrap().derive_macro_usage.get("Debug"), 2);

        let pruned = Macrostat::new(&dir)
            .with_cache(false)
            .fresh(true)
            .exclude_dirs(["generated"])
            .run()
            .unwrap();
        assert_eq!(root_row(&pruned).macros.as_ref().unwrap().derive_macro_usage.get("Debug"), 1);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_run_analyzes_every_workspace_member() {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let ws = std::env::temp_dir()
            .join("macrostat_builder_test")
            .join(format!("ws_{}_{}", std::process::id(), id));
        if ws.exists() {
            fs::remove_dir_all(&ws).ok();
        }
        for member in ["core", "cli", "extra"] {
            fs::create_dir_all(ws.join(member).join("src")).unwrap();
            fs::write(
                ws.join(member).join("Cargo.toml"),
                format!("[package]\nname = \"{}\"\nversion = \"0.1.0\"", member),
            )
            .unwrap();
        }
        fs::write(
            ws.join("Cargo.toml"),
            "[workspace]\nmembers = [\"core\", \"cli\", \"extra\"]",
        )
        .unwrap();
        fs::write(ws.join("core/src/lib.rs"), "#[macro_export]\nmacro_rules! m { () => {} }\n").unwrap();
        fs::write(ws.join("cli/src/main.rs"), "fn main() { core::m!(); }\n").unwrap();
        fs::write(ws.join("extra/src/lib.rs"), "#[derive(Clone)]\npub struct E;\n").unwrap();

        let results = Macrostat::new(&ws).with_cache(false).run().unwrap();

        let keys: Vec<&str> = results.crates.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["cli", "core", "extra"]);
        let cli = results.crates["cli"].macros.as_ref().unwrap();
        assert_eq!(cli.macro_invocation_count, 1);
        let core = results.crates["core"].macros.as_ref().unwrap();
        assert_eq!(core.declarative_macro_definition_count, 1);
        assert_eq!(results.crates["extra"].source_lines, Some(2));
        assert!(results.check().is_ok());

        fs::remove_dir_all(&ws).ok();
    }

    #[test]
    fn test_run_rejects_missing_root() {
        let missing = std::env::temp_dir().join("macrostat_builder_test_missing_root_xyz");
        assert!(Macrostat::new(missing).run().is_err());
    }

    #[cfg(feature = "expand")]
    #[test]
    fn test_failed_expansion_is_recorded() {
        let dir = create_test_crate("expand_fail");

        let results = Macrostat::new(&dir)
            .with_cache(false)
            .with_expansion(true)
            .cargo("macrostat-no-such-cargo-binary")
            .workers(1)
            .run()
            .unwrap();

        assert_eq!(results.failed_expansions(), 1);
        assert!(root_row(&results).macros.is_some());
        assert!(RunState::load(&dir).unwrap().is_done(Phase::Expanded));

        fs::remove_dir_all(&dir).ok();
    }
}
