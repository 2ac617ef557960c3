//! Output formatting and on-disk artifacts.
//!
//! - Per-tag key listing and JSON dump of every diagnostic
//! - Markdown and JSON comparison reports
//! - Pretty: colored terminal summary of a comparison

use anyhow::Context;
use colored::*;
use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::analyze::{AnalysisSummary, Diagnostic, KeyMode, WARNINGS_JSON, WARNINGS_TEXT};
use crate::compare::ComparisonResult;

// =============================================================================
// Per-tag artifacts
// =============================================================================

/// Write the sorted key listing and the JSON dump for one tag.
///
/// `diagnostics` must already be sorted by key and deduplicated.
pub fn write_warning_artifacts(
    results_dir: &Path,
    diagnostics: &[Diagnostic],
) -> anyhow::Result<(PathBuf, PathBuf)> {
    fs::create_dir_all(results_dir)
        .with_context(|| format!("creating {}", results_dir.display()))?;

    let text_path = results_dir.join(WARNINGS_TEXT);
    let mut listing = String::new();
    for d in diagnostics {
        listing.push_str(&d.key);
        listing.push('\n');
    }
    fs::write(&text_path, listing).with_context(|| format!("writing {}", text_path.display()))?;

    let json_path = results_dir.join(WARNINGS_JSON);
    let json = serde_json::to_string_pretty(diagnostics)?;
    fs::write(&json_path, json).with_context(|| format!("writing {}", json_path.display()))?;

    Ok((text_path, json_path))
}

// =============================================================================
// Comparison reports
// =============================================================================

/// Base name shared by the Markdown and JSON comparison files.
pub fn comparison_stem(baseline_tag: &str, latest_tag: &str) -> String {
    format!(
        "comparison_{}_vs_{}",
        baseline_tag.replace('/', "_"),
        latest_tag.replace('/', "_")
    )
}

/// Render the Markdown comparison report.
pub fn render_markdown(
    result: &ComparisonResult,
    baseline: &AnalysisSummary,
    latest: &AnalysisSummary,
    key_mode: KeyMode,
) -> String {
    let b = &result.baseline_tag;
    let l = &result.latest_tag;
    let mut out = String::new();

    let _ = writeln!(out, "# Checker comparison: {} → {}\n", b, l);
    let _ = writeln!(out, "* Baseline warnings ({}): {}", b, result.baseline_count);
    let _ = writeln!(out, "* Latest warnings ({}): {}", l, result.latest_count);
    let _ = writeln!(out, "* Fixed warnings: {}", result.fixed.len());
    let _ = writeln!(out, "* Persistent warnings: {}", result.persistent.len());
    let _ = writeln!(out, "* New warnings / regressions: {}", result.regressions.len());
    let _ = writeln!(out, "* Diagnostic key mode: {}", key_mode);
    for summary in [baseline, latest] {
        if let Some(units) = summary.units_analyzed {
            let _ = writeln!(out, "* Units analyzed ({}): {}", summary.tag, units);
        }
    }
    out.push('\n');

    write_section(
        &mut out,
        &format!("Fixed warnings (present in {} only)", b),
        &result.fixed,
    );
    write_section(
        &mut out,
        &format!("Warnings persisting into {}", l),
        &result.persistent,
    );
    write_section(
        &mut out,
        &format!("Regressions (new in {})", l),
        &result.regressions,
    );

    out.push_str("## Artifacts\n\n");
    for summary in [baseline, latest] {
        let _ = writeln!(
            out,
            "- {} warnings (text): {}",
            summary.tag,
            summary.warnings_text.display()
        );
        let _ = writeln!(
            out,
            "- {} warnings (JSON): {}",
            summary.tag,
            summary.warnings_json.display()
        );
        let _ = writeln!(
            out,
            "- {} unit logs: {}",
            summary.tag,
            summary.log_dir.display()
        );
    }

    out
}

fn write_section(out: &mut String, title: &str, items: &[String]) {
    let _ = writeln!(out, "## {} ({})\n", title, items.len());
    if items.is_empty() {
        out.push_str("_None_\n\n");
        return;
    }
    for item in items {
        let _ = writeln!(out, "- `{}`", item);
    }
    out.push('\n');
}

/// JSON comparison report.
#[derive(Serialize)]
pub struct JsonComparison<'a> {
    pub version: &'static str,
    pub key_mode: KeyMode,
    #[serde(flatten)]
    pub result: &'a ComparisonResult,
}

/// Write `comparison_<baseline>_vs_<latest>.{md,json}` into `results_root`.
///
/// Returns the Markdown path.
pub fn write_comparison(
    results_root: &Path,
    result: &ComparisonResult,
    baseline: &AnalysisSummary,
    latest: &AnalysisSummary,
    key_mode: KeyMode,
) -> anyhow::Result<PathBuf> {
    let stem = comparison_stem(&result.baseline_tag, &result.latest_tag);

    let md_path = results_root.join(format!("{}.md", stem));
    fs::write(&md_path, render_markdown(result, baseline, latest, key_mode))
        .with_context(|| format!("writing {}", md_path.display()))?;

    let json_path = results_root.join(format!("{}.json", stem));
    let json = serde_json::to_string_pretty(&JsonComparison {
        version: env!("CARGO_PKG_VERSION"),
        key_mode,
        result,
    })?;
    fs::write(&json_path, json).with_context(|| format!("writing {}", json_path.display()))?;

    Ok(md_path)
}

// =============================================================================
// Pretty Format
// =============================================================================

/// Print a human-readable comparison summary to stdout.
pub fn write_pretty(result: &ComparisonResult, report_path: &Path) {
    println!();
    print!("  ");
    print!("{}", "squire-eval".cyan().bold());
    println!(" v{}", env!("CARGO_PKG_VERSION"));
    println!();

    print!("  {}", "Baseline: ".dimmed());
    println!("{} ({} warnings)", result.baseline_tag, result.baseline_count);
    print!("  {}", "Latest:   ".dimmed());
    println!("{} ({} warnings)", result.latest_tag, result.latest_count);
    println!();

    println!(
        "    {} {}",
        label("Fixed").green(),
        result.fixed.len().to_string().green().bold()
    );
    println!(
        "    {} {}",
        label("Persistent").yellow(),
        result.persistent.len().to_string().yellow()
    );
    if result.regressions.is_empty() {
        println!("    {} {}", label("Regressions").dimmed(), "0".dimmed());
    } else {
        println!(
            "    {} {}",
            label("Regressions").red(),
            result.regressions.len().to_string().red().bold()
        );
        println!();
        for key in &result.regressions {
            println!("      {} {}", "+".red(), key);
        }
    }
    println!();

    print!("  {}", "Report: ".dimmed());
    println!("{}", report_path.display());
    println!();
}

fn label(name: &str) -> String {
    format!("{:<12}", name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::Severity;
    use crate::compare::compare;

    fn summary(tag: &str, keys: &[&str]) -> AnalysisSummary {
        AnalysisSummary {
            tag: tag.to_string(),
            warnings: keys.iter().map(|k| k.to_string()).collect(),
            warnings_text: PathBuf::from(format!("/out/{}/npd_warnings.txt", tag)),
            warnings_json: PathBuf::from(format!("/out/{}/npd_warnings.json", tag)),
            log_dir: PathBuf::from(format!("/out/{}/logs", tag)),
            units_analyzed: None,
        }
    }

    fn diagnostic(key: &str) -> Diagnostic {
        Diagnostic {
            file: "a.c".to_string(),
            line: 1,
            column: 1,
            severity: Severity::Warning,
            message: "Possible NULL dereference".to_string(),
            key: key.to_string(),
            raw: format!("a.c:1:1: warning: {}", key),
        }
    }

    #[test]
    fn test_markdown_sections() {
        let baseline = summary("v5.9", &["A", "B"]);
        let latest = summary("v5.17", &["B"]);
        let result = compare(&baseline, &latest);
        let md = render_markdown(&result, &baseline, &latest, KeyMode::Strict);

        assert!(md.starts_with("# Checker comparison: v5.9 → v5.17\n"));
        assert!(md.contains("* Fixed warnings: 1\n"));
        assert!(md.contains("## Fixed warnings (present in v5.9 only) (1)\n\n- `A`\n"));
        assert!(md.contains("## Warnings persisting into v5.17 (1)\n\n- `B`\n"));
        assert!(md.contains("## Regressions (new in v5.17) (0)\n\n_None_\n"));
        assert!(md.contains("- v5.9 warnings (text): /out/v5.9/npd_warnings.txt\n"));
        assert!(md.contains("* Diagnostic key mode: strict\n"));
    }

    #[test]
    fn test_warning_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let (text, json) =
            write_warning_artifacts(dir.path(), &[diagnostic("a.c:1:x"), diagnostic("b.c:2:y")])
                .unwrap();
        assert_eq!(fs::read_to_string(text).unwrap(), "a.c:1:x\nb.c:2:y\n");
        let parsed: Vec<Diagnostic> =
            serde_json::from_str(&fs::read_to_string(json).unwrap()).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].key, "b.c:2:y");
    }

    #[test]
    fn test_empty_warning_listing_is_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let (text, json) = write_warning_artifacts(dir.path(), &[]).unwrap();
        assert_eq!(fs::read_to_string(text).unwrap(), "");
        assert_eq!(fs::read_to_string(json).unwrap(), "[]");
    }

    #[test]
    fn test_write_comparison_files() {
        let dir = tempfile::tempdir().unwrap();
        let baseline = summary("v1", &["A"]);
        let latest = summary("release/v2", &["B"]);
        let result = compare(&baseline, &latest);
        let md = write_comparison(dir.path(), &result, &baseline, &latest, KeyMode::Location)
            .unwrap();
        assert_eq!(md, dir.path().join("comparison_v1_vs_release_v2.md"));

        let json: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(dir.path().join("comparison_v1_vs_release_v2.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(json["key_mode"], "location");
        assert_eq!(json["fixed"][0], "A");
        assert_eq!(json["regressions"][0], "B");
    }
}
