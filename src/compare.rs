//! Set comparison of two tags' diagnostic keys.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::analyze::AnalysisSummary;

/// Classification of keys between a baseline and a later revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub baseline_tag: String,
    pub latest_tag: String,
    pub baseline_count: usize,
    pub latest_count: usize,
    /// Only in the baseline.
    pub fixed: Vec<String>,
    /// In both.
    pub persistent: Vec<String>,
    /// Only in the latest revision.
    pub regressions: Vec<String>,
}

/// Compare two summaries. All lists come out sorted.
pub fn compare(baseline: &AnalysisSummary, latest: &AnalysisSummary) -> ComparisonResult {
    // BTreeSet iteration is already ordered.
    let fixed = baseline
        .warnings
        .difference(&latest.warnings)
        .cloned()
        .collect();
    let persistent = baseline
        .warnings
        .intersection(&latest.warnings)
        .cloned()
        .collect();
    let regressions = latest
        .warnings
        .difference(&baseline.warnings)
        .cloned()
        .collect();

    ComparisonResult {
        baseline_tag: baseline.tag.clone(),
        latest_tag: latest.tag.clone(),
        baseline_count: baseline.warnings.len(),
        latest_count: latest.warnings.len(),
        fixed,
        persistent,
        regressions,
    }
}

/// Compare two tags by name, or `None` (logged) if either was not analyzed.
pub fn compare_tags<'a>(
    summaries: &'a HashMap<String, AnalysisSummary>,
    baseline_tag: &str,
    latest_tag: &str,
) -> Option<(ComparisonResult, &'a AnalysisSummary, &'a AnalysisSummary)> {
    match (summaries.get(baseline_tag), summaries.get(latest_tag)) {
        (Some(baseline), Some(latest)) => Some((compare(baseline, latest), baseline, latest)),
        _ => {
            tracing::warn!(
                baseline = %baseline_tag,
                latest = %latest_tag,
                "insufficient data to produce comparison"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn summary(tag: &str, keys: &[&str]) -> AnalysisSummary {
        AnalysisSummary {
            tag: tag.to_string(),
            warnings: keys.iter().map(|k| k.to_string()).collect(),
            warnings_text: PathBuf::from(format!("{}/npd_warnings.txt", tag)),
            warnings_json: PathBuf::from(format!("{}/npd_warnings.json", tag)),
            log_dir: PathBuf::from(format!("{}/logs", tag)),
            units_analyzed: Some(3),
        }
    }

    #[test]
    fn test_set_classification() {
        let baseline = summary("v5.9", &["C", "A", "B"]);
        let latest = summary("v5.17", &["D", "B", "C"]);
        let result = compare(&baseline, &latest);
        assert_eq!(result.fixed, vec!["A"]);
        assert_eq!(result.persistent, vec!["B", "C"]);
        assert_eq!(result.regressions, vec!["D"]);
        assert_eq!(result.baseline_count, 3);
        assert_eq!(result.latest_count, 3);
    }

    #[test]
    fn test_identical_sets() {
        let a = summary("a", &["x", "y"]);
        let b = summary("b", &["y", "x"]);
        let result = compare(&a, &b);
        assert!(result.fixed.is_empty());
        assert!(result.regressions.is_empty());
        assert_eq!(result.persistent, vec!["x", "y"]);
    }

    #[test]
    fn test_compare_tags_missing_summary() {
        let mut summaries = HashMap::new();
        summaries.insert("v1".to_string(), summary("v1", &["A"]));
        assert!(compare_tags(&summaries, "v1", "v2").is_none());

        summaries.insert("v2".to_string(), summary("v2", &[]));
        let (result, baseline, latest) = compare_tags(&summaries, "v1", "v2").unwrap();
        assert_eq!(result.fixed, vec!["A"]);
        assert_eq!(baseline.tag, "v1");
        assert_eq!(latest.tag, "v2");
    }
}
