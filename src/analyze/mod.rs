//! Analyzer replay and diagnostic extraction.

mod driver;
mod extract;
mod types;

pub use driver::{sanitize_for_filename, Analyzer};
pub use extract::{normalize, DiagnosticPattern, Extractor, DEFAULT_MARKER};
pub use types::{
    tag_dir_name, AnalysisSummary, Diagnostic, KeyMode, Severity, LOG_DIR, WARNINGS_JSON,
    WARNINGS_TEXT,
};
