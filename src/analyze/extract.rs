//! Parsing analyzer output into diagnostics.
//!
//! Only lines carrying the checker's marker are considered. Candidates are
//! matched against `path:line:col: severity: message`; anything else is
//! dropped without complaint.

use regex::Regex;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use super::{Diagnostic, KeyMode, Severity};

/// Marker the NPD checker puts at the start of every message.
pub const DEFAULT_MARKER: &str = "Possible NULL dereference";

lazy_static::lazy_static! {
    static ref DEFAULT_PATTERN: DiagnosticPattern = DiagnosticPattern::compile(DEFAULT_MARKER);
}

/// Marker substring plus the line shape built around it.
#[derive(Debug, Clone)]
pub struct DiagnosticPattern {
    marker: String,
    regex: Regex,
}

impl DiagnosticPattern {
    pub fn new(marker: &str) -> Self {
        if marker == DEFAULT_MARKER {
            return DEFAULT_PATTERN.clone();
        }
        Self::compile(marker)
    }

    fn compile(marker: &str) -> Self {
        let regex = Regex::new(&format!(
            r"^(?P<path>[^:\n]+):(?P<line>\d+):(?P<col>\d+):\s+(?P<severity>warning|error):\s+(?P<message>{}.*)$",
            regex::escape(marker)
        ))
        .expect("escaped marker always forms a valid pattern");
        Self {
            marker: marker.to_string(),
            regex,
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }
}

impl Default for DiagnosticPattern {
    fn default() -> Self {
        DEFAULT_PATTERN.clone()
    }
}

/// Stateless diagnostic parser for one repository.
#[derive(Debug, Clone)]
pub struct Extractor {
    pattern: DiagnosticPattern,
    key_mode: KeyMode,
    repo_root: PathBuf,
}

impl Extractor {
    /// `repo_root` should be absolute; it is normalized lexically.
    pub fn new<P: AsRef<Path>>(repo_root: P, pattern: DiagnosticPattern, key_mode: KeyMode) -> Self {
        Self {
            pattern,
            key_mode,
            repo_root: normalize(repo_root.as_ref()),
        }
    }

    pub fn key_mode(&self) -> KeyMode {
        self.key_mode
    }

    /// Parse `raw_text` produced by an invocation that ran in `directory`.
    ///
    /// Output order follows input order; a key seen twice keeps its first
    /// occurrence.
    pub fn extract(&self, raw_text: &str, directory: &Path) -> Vec<Diagnostic> {
        let directory = normalize(directory);
        let mut seen = HashSet::new();
        let mut diagnostics = Vec::new();

        for line in raw_text.lines() {
            if !line.contains(self.pattern.marker()) {
                continue;
            }
            let trimmed = line.trim();
            let Some(caps) = self.pattern.regex.captures(trimmed) else {
                continue;
            };
            let (Ok(line_no), Ok(column), Ok(severity)) = (
                caps["line"].parse::<usize>(),
                caps["col"].parse::<usize>(),
                caps["severity"].parse::<Severity>(),
            ) else {
                continue;
            };

            let file = self.relative_path(Path::new(&caps["path"]), &directory);
            let message = caps["message"].trim().to_string();
            let key = self.key_mode.key(&file, line_no, &message);
            if !seen.insert(key.clone()) {
                continue;
            }

            diagnostics.push(Diagnostic {
                file,
                line: line_no,
                column,
                severity,
                message,
                key,
                raw: trimmed.to_string(),
            });
        }

        diagnostics
    }

    /// Repository-relative form of `path`, else its absolute form.
    fn relative_path(&self, path: &Path, directory: &Path) -> String {
        let absolute = if path.is_absolute() {
            normalize(path)
        } else {
            normalize(&directory.join(path))
        };
        let shown = absolute
            .strip_prefix(&self.repo_root)
            .map(Path::to_path_buf)
            .unwrap_or(absolute);
        shown.to_string_lossy().replace('\\', "/")
    }
}

/// Resolve `.` and `..` components without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}
