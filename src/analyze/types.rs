//! Core types for analyzer results.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Key listing written per tag, one key per line.
pub const WARNINGS_TEXT: &str = "npd_warnings.txt";
/// Full diagnostic dump written per tag.
pub const WARNINGS_JSON: &str = "npd_warnings.json";
/// Per-unit raw analyzer output.
pub const LOG_DIR: &str = "logs";

/// Severity levels the analyzer reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "warning" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            _ => Err(format!("unknown severity: {}", s)),
        }
    }
}

/// Which parts of a diagnostic make up its identity.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum KeyMode {
    /// `file:line:message`. Exact message text must match across revisions.
    #[default]
    Strict,
    /// `file:line`. Tolerates message drift such as renamed variables.
    Location,
}

impl KeyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyMode::Strict => "strict",
            KeyMode::Location => "location",
        }
    }

    pub fn key(&self, file: &str, line: usize, message: &str) -> String {
        match self {
            KeyMode::Strict => format!("{}:{}:{}", file, line, message),
            KeyMode::Location => format!("{}:{}", file, line),
        }
    }
}

impl std::fmt::Display for KeyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single reported issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Repository-relative when the file lies inside the repository.
    pub file: String,
    pub line: usize,
    pub column: usize,
    pub severity: Severity,
    pub message: String,
    /// Identity used for deduplication and cross-revision comparison.
    pub key: String,
    /// The analyzer line this was parsed from.
    pub raw: String,
}

/// Everything one tag's analysis produced.
#[derive(Debug, Clone)]
pub struct AnalysisSummary {
    pub tag: String,
    pub warnings: BTreeSet<String>,
    pub warnings_text: PathBuf,
    pub warnings_json: PathBuf,
    pub log_dir: PathBuf,
    /// Units actually replayed; `None` when rebuilt from disk.
    pub units_analyzed: Option<usize>,
}

impl AnalysisSummary {
    /// Rebuild a summary from the artifacts a previous run left in `results_dir`.
    pub fn load(tag: &str, results_dir: &Path) -> anyhow::Result<Self> {
        let warnings_text = results_dir.join(WARNINGS_TEXT);
        let content = fs::read_to_string(&warnings_text)
            .with_context(|| format!("reading {}", warnings_text.display()))?;
        let warnings = content
            .lines()
            .filter(|l| !l.is_empty())
            .map(|l| l.to_string())
            .collect();
        Ok(Self {
            tag: tag.to_string(),
            warnings,
            warnings_text,
            warnings_json: results_dir.join(WARNINGS_JSON),
            log_dir: results_dir.join(LOG_DIR),
            units_analyzed: None,
        })
    }
}

/// Directory name for a tag's results (`/` is not allowed in one path component).
pub fn tag_dir_name(tag: &str) -> String {
    tag.replace('/', "_")
}
