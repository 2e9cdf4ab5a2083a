//! macrostat CLI - macro usage statistics for Rust crates and workspaces.
//!
//! Features:
//! - Automatic crate and workspace root detection
//! - Definition and invocation counts per crate, summed over the workspace
//! - Optional `cargo expand` pass with a bounded worker pool
//! - Incremental caching and resumable runs
//! - Plain-text or JSON output, to stdout or a file

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};

use macrostat_core::{
    find_crate_root, init_structured_logging, is_workspace_root, load_config, render_json,
    render_plain, AnalyzisResults, MacroAnalyzis, Macrostat, MacrostatConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Macro usage statistics for Rust crates and workspaces")]
pub struct Cli {
    /// Path to the crate or workspace
    #[arg(default_value = ".")]
    path: String,

    /// Output results in JSON format
    #[arg(long)]
    json: bool,

    /// With --json, output every crate instead of the summed record
    #[arg(long)]
    full: bool,

    /// Analyze the whole enclosing workspace, not only the crate at PATH
    #[arg(long)]
    workspace: bool,

    /// Run `cargo expand` on each crate and count the expanded lines
    #[arg(long)]
    expand: bool,

    /// Maximum number of concurrent `cargo expand` runs
    #[arg(long, value_name = "N")]
    workers: Option<usize>,

    /// Toolchain used for `cargo expand`
    #[arg(long, value_name = "TOOLCHAIN")]
    toolchain: Option<String>,

    /// Extra directory names to skip
    #[arg(long, num_args = 1..)]
    exclude: Vec<String>,

    /// Disable the incremental cache
    #[arg(long)]
    no_cache: bool,

    /// Ignore saved results and run every phase again
    #[arg(long)]
    fresh: bool,

    /// Write the report to FILE instead of stdout
    #[arg(long, value_name = "FILE")]
    output: Option<String>,
}

/// Run settings after merging macrostat.toml under the CLI flags.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Settings {
    json: bool,
    expand: bool,
    workers: usize,
    toolchain: String,
    no_default_features: bool,
    exclude: Vec<String>,
}

impl Settings {
    /// Flags win over the config file; excludes from both are combined.
    fn resolve(cli: &Cli, config: &MacrostatConfig) -> Self {
        let mut exclude = config.excluded_dirs();
        exclude.extend(cli.exclude.iter().cloned());

        Self {
            json: cli.json || config.json_output(),
            expand: cli.expand || config.expand_enabled(),
            workers: cli.workers.filter(|w| *w > 0).unwrap_or_else(|| config.workers()),
            toolchain: cli.toolchain.clone().unwrap_or_else(|| config.toolchain()),
            no_default_features: config.no_default_features(),
            exclude,
        }
    }
}

/// Nearest ancestor of `start` (itself included) that is a workspace root.
fn find_workspace_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| is_workspace_root(dir))
        .map(Path::to_path_buf)
}

/// Security: Validates output file paths to prevent path traversal attacks.
///
/// Rejects:
/// - Absolute paths (must be relative to current directory)
/// - Paths containing `..` (parent directory traversal)
/// - Paths with null bytes
fn validate_output_path(path: &str) -> Result<PathBuf> {
    if path.contains('\0') {
        return Err(anyhow!("Output path contains null bytes"));
    }

    let p = PathBuf::from(path);

    if p.is_absolute() {
        return Err(anyhow!(
            "Output path must be relative, not absolute: {}",
            path
        ));
    }

    if p
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        return Err(anyhow!(
            "Path traversal (..) not allowed in output paths: {}",
            path
        ));
    }

    // backslash separators are not components on unix
    let normalized = path.replace('\\', "/");
    if normalized.contains("/../") || normalized.starts_with("../") || normalized.ends_with("/..") {
        return Err(anyhow!("Path traversal attempt detected: {}", path));
    }

    Ok(p)
}

fn render(results: &AnalyzisResults, json: bool, full: bool) -> Result<String> {
    if !json {
        return Ok(render_plain(results));
    }
    let rendered = if full {
        render_json(results)
    } else {
        render_json::<MacroAnalyzis>(&results.total())
    };
    rendered
        .map(|s| s + "\n")
        .context("JSON serialization failed")
}

/// Exit code for invalid arguments and internal errors.
const EXIT_USAGE: i32 = 2;

/// Report an invalid argument and exit with [`EXIT_USAGE`].
fn invalid_argument(message: impl std::fmt::Display) -> ! {
    eprintln!("[ERROR] {}", message);
    std::process::exit(EXIT_USAGE);
}

fn panic_report(info: &dyn std::fmt::Display) -> String {
    format!(
        "[PANIC] macrostat internal error: {}\n[PANIC] The process will exit with code {}.",
        info, EXIT_USAGE
    )
}

fn main() -> Result<()> {
    // exit here, otherwise the runtime unwinds and exits with 101
    std::panic::set_hook(Box::new(|info| {
        eprintln!("{}", panic_report(info));
        std::process::exit(EXIT_USAGE);
    }));

    // JSON to stderr, respects RUST_LOG
    init_structured_logging();

    let cli = Cli::parse();

    let output = match cli.output.as_deref().map(validate_output_path).transpose() {
        Ok(output) => output,
        Err(e) => invalid_argument(format!("Invalid output path: {}", e)),
    };

    let input_path = Path::new(&cli.path);
    let crate_root = find_crate_root(input_path)
        .with_context(|| format!("Failed to find crate root from: {}", cli.path))?;
    let root = if cli.workspace {
        find_workspace_root(&crate_root).unwrap_or(crate_root)
    } else {
        crate_root
    };

    let config = match load_config(&root) {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => invalid_argument(format!("{:#}", e)),
    };
    let settings = Settings::resolve(&cli, &config);

    let results = Macrostat::new(&root)
        .with_cache(!cli.no_cache)
        .with_expansion(settings.expand)
        .workers(settings.workers)
        .toolchain(settings.toolchain.clone())
        .no_default_features(settings.no_default_features)
        .exclude_dirs(settings.exclude.iter().cloned())
        .fresh(cli.fresh)
        .run()
        .with_context(|| format!("Analysis of {} failed", root.display()))?;

    let report = render(&results, settings.json, cli.full)?;
    match output {
        Some(path) => {
            fs::write(&path, report)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Report written to {}", path.display());
        }
        None => print!("{}", report),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    #[test]
    fn test_panic_report_names_exit_code() {
        let report = panic_report(&"index out of bounds");
        assert!(report.contains("index out of bounds"));
        assert!(report.ends_with(&format!("exit with code {}.", EXIT_USAGE)));
        assert_eq!(EXIT_USAGE, 2);
    }

    fn create_file(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::File::create(path)
            .unwrap()
            .write_all(content.as_bytes())
            .unwrap();
    }

    fn create_temp_dir(name: &str) -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let temp_dir = std::env::temp_dir()
            .join("macrostat_cli_test")
            .join(format!("{}_{}_{}", name, std::process::id(), id));
        if temp_dir.exists() {
            fs::remove_dir_all(&temp_dir).ok();
        }
        fs::create_dir_all(&temp_dir).unwrap();
        temp_dir
    }

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("macrostat").chain(args.iter().copied())).unwrap()
    }

    // --- validate_output_path TESTS ---

    #[test]
    fn test_validate_output_path_relative() {
        assert_eq!(
            validate_output_path("reports/macros.json").unwrap(),
            PathBuf::from("reports/macros.json")
        );
    }

    #[test]
    fn test_validate_output_path_rejects_absolute() {
        assert!(validate_output_path("/tmp/out.json").is_err());
    }

    #[test]
    fn test_validate_output_path_rejects_traversal() {
        assert!(validate_output_path("../out.json").is_err());
        assert!(validate_output_path("a/../../out.json").is_err());
        assert!(validate_output_path("a\\..\\out.json").is_err());
    }

    #[test]
    fn test_validate_output_path_rejects_nul() {
        assert!(validate_output_path("out\0.json").is_err());
    }

    // --- argument parsing TESTS ---

    #[test]
    fn test_cli_defaults() {
        let cli = parse(&[]);
        assert_eq!(cli.path, ".");
        assert!(!cli.json && !cli.expand && !cli.fresh && !cli.no_cache);
        assert!(cli.workers.is_none());
        assert!(cli.exclude.is_empty());
    }

    #[test]
    fn test_cli_all_flags() {
        let cli = parse(&[
            "crates/app",
            "--json",
            "--full",
            "--workspace",
            "--expand",
            "--workers",
            "4",
            "--toolchain",
            "nightly-2024-06-01",
            "--exclude",
            "generated",
            "fixtures",
            "--no-cache",
            "--fresh",
            "--output",
            "out.json",
        ]);
        assert_eq!(cli.path, "crates/app");
        assert!(cli.json && cli.full && cli.workspace && cli.expand);
        assert_eq!(cli.workers, Some(4));
        assert_eq!(cli.exclude, vec!["generated", "fixtures"]);
        assert_eq!(cli.output.as_deref(), Some("out.json"));
    }

    #[test]
    fn test_cli_rejects_bad_workers() {
        assert!(Cli::try_parse_from(["macrostat", "--workers", "many"]).is_err());
    }

    // --- Settings TESTS ---

    #[test]
    fn test_settings_flags_override_config() {
        let config = MacrostatConfig {
            exclude: Some(vec!["generated".to_string()]),
            expand: Some(macrostat_core::ExpandConfig {
                enabled: Some(false),
                toolchain: Some("nightly-2024-01-01".to_string()),
                workers: Some(8),
                no_default_features: Some(false),
            }),
            output: None,
        };
        let cli = parse(&["--expand", "--workers", "2", "--exclude", "fixtures"]);

        let settings = Settings::resolve(&cli, &config);
        assert!(settings.expand);
        assert_eq!(settings.workers, 2);
        assert_eq!(settings.toolchain, "nightly-2024-01-01");
        assert!(!settings.no_default_features);
        assert_eq!(settings.exclude, vec!["generated", "fixtures"]);
        assert!(!settings.json);
    }

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::resolve(&parse(&["--workers", "0"]), &MacrostatConfig::default());
        assert!(!settings.expand);
        assert_eq!(settings.workers, macrostat_core::config::DEFAULT_EXPAND_WORKERS);
        assert_eq!(settings.toolchain, "nightly");
        assert!(settings.no_default_features);
    }

    // --- workspace root TESTS ---

    #[test]
    fn test_find_workspace_root_from_member() {
        let ws = create_temp_dir("ws_member");
        create_file(&ws.join("Cargo.toml"), "[workspace]\nmembers = [\"core\"]");
        create_file(&ws.join("core/Cargo.toml"), "[package]\nname = \"core\"");

        assert_eq!(find_workspace_root(&ws.join("core")), Some(ws.clone()));

        fs::remove_dir_all(&ws).ok();
    }

    #[test]
    fn test_find_workspace_root_none_for_single_crate() {
        let dir = create_temp_dir("single");
        create_file(&dir.join("Cargo.toml"), "[package]\nname = \"solo\"");

        assert!(find_workspace_root(&dir).is_none());

        fs::remove_dir_all(&dir).ok();
    }

    // --- rendering TESTS ---

    #[test]
    fn test_render_json_totals_and_full() {
        let dir = create_temp_dir("render");
        create_file(&dir.join("Cargo.toml"), "[package]\nname = \"demo\"");
        create_file(&dir.join("src/main.rs"), "fn main() { println!(\"hi\"); }");

        let results = Macrostat::new(&dir).with_cache(false).run().unwrap();

        let totals: serde_json::Value =
            serde_json::from_str(&render(&results, true, false).unwrap()).unwrap();
        assert_eq!(totals["macro_invocation_count"], 1);

        let full: serde_json::Value =
            serde_json::from_str(&render(&results, true, true).unwrap()).unwrap();
        assert_eq!(full["crates"]["."]["name"], "demo");

        assert!(render(&results, false, false).unwrap().contains("demo"));

        fs::remove_dir_all(&dir).ok();
    }
}
