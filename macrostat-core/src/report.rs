//! Output formatting - plaintext and JSON.

use std::fmt::Write as _;

use serde::Serialize;

use crate::analyzis::MacroAnalyzis;
use crate::results::{AnalyzisResults, ExpansionOutcome};

/// How many derive/attribute paths the plain report lists.
const TOP_USAGES: usize = 10;

fn opt(n: Option<usize>) -> String {
    n.map_or_else(|| "-".to_string(), |n| n.to_string())
}

fn push_usages(out: &mut String, title: &str, usages: Vec<(&str, usize)>) {
    if usages.is_empty() {
        return;
    }
    let _ = writeln!(out, "\n{}:", title);
    for (path, count) in usages.into_iter().take(TOP_USAGES) {
        let _ = writeln!(out, "  {:>6}  {}", count, path);
    }
}

/// Render the plain-text report: one row per crate, then totals.
pub fn render_plain(results: &AnalyzisResults) -> String {
    let mut out = String::new();

    if results.crates.is_empty() {
        out.push_str("No crates analyzed.\n");
        return out;
    }

    let _ = writeln!(
        out,
        "{:<30} {:>8} {:>9} {:>6} {:>6} {:>7}",
        "CRATE", "LINES", "EXPANDED", "DEFS", "DERIVE", "INVOKED"
    );
    for row in results.crates.values() {
        let expanded = match &row.expansion {
            Some(ExpansionOutcome::Expanded { lines }) => lines.to_string(),
            Some(ExpansionOutcome::Failed { .. }) => "failed".to_string(),
            None => "-".to_string(),
        };
        let (defs, derives, invoked) = match &row.macros {
            Some(m) => (
                m.definition_count().to_string(),
                m.derive_macro_invocation_count().to_string(),
                m.macro_invocation_count.to_string(),
            ),
            None => ("-".to_string(), "-".to_string(), "-".to_string()),
        };
        let _ = writeln!(
            out,
            "{:<30} {:>8} {:>9} {:>6} {:>6} {:>7}",
            row.name,
            opt(row.source_lines),
            expanded,
            defs,
            derives,
            invoked
        );
    }

    let total = results.total();
    let _ = writeln!(out, "\nTOTAL ({} crates)", results.crates.len());
    let _ = writeln!(out, "  source lines:           {}", results.total_source_lines());
    if results.total_expanded_lines() > 0 || results.failed_expansions() > 0 {
        let _ = writeln!(
            out,
            "  expanded lines:         {} ({} failed)",
            results.total_expanded_lines(),
            results.failed_expansions()
        );
    }
    let _ = writeln!(out, "  declarative macros:     {}", total.declarative_macro_definition_count);
    let _ = writeln!(out, "  procedural macros:      {}", total.procedural_macro_definition_count);
    let _ = writeln!(out, "  derive macros:          {}", total.derive_macro_definition_count);
    let _ = writeln!(out, "  attribute macros:       {}", total.attribute_macro_definition_count);
    let _ = writeln!(out, "  invocations:            {}", total.macro_invocation_count);
    let _ = writeln!(out, "    bang:                 {}", total.bang_invocation_count());
    let _ = writeln!(out, "    derive:               {}", total.derive_macro_invocation_count());
    let _ = writeln!(out, "    attribute:            {}", total.attribute_macro_invocation_count);

    push_usages(&mut out, "MOST USED DERIVES", total.derive_macro_usage.most_used());
    push_usages(&mut out, "MOST USED ATTRIBUTES", total.attribute_macro_usage.most_used());

    let failures: usize = results.crates.values().map(|c| c.parse_failures.len()).sum();
    if failures > 0 {
        let _ = writeln!(out, "\n{} file(s) could not be parsed", failures);
    }
    out
}

/// Prints the plain-text report.
pub fn print_plain(results: &AnalyzisResults) {
    print!("{}", render_plain(results));
}

/// Pretty JSON for any report value.
pub fn render_json<T: Serialize>(value: &T) -> serde_json::Result<String> {
    serde_json::to_string_pretty(value)
}

/// Prints the summed [`MacroAnalyzis`] as JSON, or the full results when
/// `full` is set.
pub fn print_json(results: &AnalyzisResults, full: bool) {
    let rendered = if full {
        render_json(results)
    } else {
        render_json::<MacroAnalyzis>(&results.total())
    };
    match rendered {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("[ERROR] JSON serialization failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::CrateAnalyzis;

    fn sample() -> AnalyzisResults {
        let mut macros = MacroAnalyzis::default();
        macros.declarative_macro_definition_count = 2;
        macros.derive_macro_usage.add("Debug", 3);
        macros.derive_macro_usage.add("serde::Serialize", 1);
        macros.attribute_macro_usage.add("tokio::main", 1);
        macros.attribute_macro_invocation_count = 1;
        macros.macro_invocation_count = 9;

        let mut row = CrateAnalyzis::new("app", ".");
        row.source_lines = Some(120);
        row.expansion = Some(ExpansionOutcome::Expanded { lines: 400 });
        row.macros = Some(macros);

        let mut results = AnalyzisResults::default();
        results.crates.insert(".".to_string(), row);
        results
    }

    #[test]
    fn test_render_plain_empty() {
        assert_eq!(render_plain(&AnalyzisResults::default()), "No crates analyzed.\n");
    }

    #[test]
    fn test_render_plain_rows_and_totals() {
        let text = render_plain(&sample());

        assert!(text.contains("app"));
        assert!(text.contains("400"));
        assert!(text.contains("TOTAL (1 crates)"));
        assert!(text
            .lines()
            .any(|l| l.trim_start().starts_with("bang:") && l.ends_with(" 4")));
        assert!(text.contains("MOST USED DERIVES"));
        assert!(text.contains("tokio::main"));

        let debug = text.find("Debug").unwrap();
        let serialize = text.find("serde::Serialize").unwrap();
        assert!(debug < serialize);
    }

    #[test]
    fn test_render_plain_unanalyzed_crate() {
        let mut results = AnalyzisResults::default();
        results
            .crates
            .insert("core".to_string(), CrateAnalyzis::new("core", "core"));
        let text = render_plain(&results);
        assert!(text.contains("core"));
        assert!(!text.contains("MOST USED"));
    }

    #[test]
    fn test_render_json_totals_field_order() {
        let json = render_json(&sample().total()).unwrap();
        let first = json.find("attribute_macro_definition_count").unwrap();
        let last = json.find("macro_invocation_count\"").unwrap();
        assert!(first < last);
        assert!(json.contains("\"Debug\": 3"));
    }
}
