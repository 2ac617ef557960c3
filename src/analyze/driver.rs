//! Replays a compile database through the analyzer, one unit at a time.

use anyhow::Context;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::command::ExternalCommand;
use crate::compdb::{self, AnalysisFlags, CompileUnitEntry};
use crate::report;

use super::extract::{normalize, Extractor};
use super::types::LOG_DIR;
use super::{AnalysisSummary, Diagnostic};

/// Progress is logged every this many analyzed units.
const PROGRESS_INTERVAL: usize = 50;

/// Sequential analyzer driver for one repository.
pub struct Analyzer {
    repo_root: PathBuf,
    flags: AnalysisFlags,
    extractor: Extractor,
    unit_limit: Option<usize>,
}

impl Analyzer {
    /// `repo_root` should be absolute.
    pub fn new<P: AsRef<Path>>(repo_root: P, flags: AnalysisFlags, extractor: Extractor) -> Self {
        Self {
            repo_root: normalize(repo_root.as_ref()),
            flags,
            extractor,
            unit_limit: None,
        }
    }

    /// Stop after this many units have been analyzed.
    pub fn unit_limit(mut self, limit: Option<usize>) -> Self {
        self.unit_limit = limit;
        self
    }

    /// Analyze every usable unit of `compile_database` and persist the
    /// results for `tag` under `results_dir`.
    ///
    /// A unit whose analyzer run fails is not an error: it simply
    /// contributes whatever diagnostics it printed.
    pub fn analyze(
        &self,
        compile_database: &Path,
        tag: &str,
        results_dir: &Path,
    ) -> anyhow::Result<AnalysisSummary> {
        tracing::info!(%tag, database = %compile_database.display(), "starting analysis");
        let records = compdb::load(compile_database)?;
        tracing::info!(%tag, units = records.len(), "compilation units in database");

        let log_dir = results_dir.join(LOG_DIR);
        fs::create_dir_all(&log_dir)
            .with_context(|| format!("creating {}", log_dir.display()))?;

        let mut processed = 0usize;
        let mut collected: BTreeMap<String, Diagnostic> = BTreeMap::new();

        for (index, record) in records.iter().enumerate() {
            if self.unit_limit.is_some_and(|limit| processed >= limit) {
                break;
            }
            let Some(unit) = record.resolve(&self.repo_root) else {
                continue;
            };

            let (output, parsed) = self.analyze_unit(&unit);
            if !parsed.is_empty() {
                let log_path = log_dir.join(self.log_name(index, &unit));
                fs::write(&log_path, &output)
                    .with_context(|| format!("writing {}", log_path.display()))?;
            }

            let known = collected.len();
            for diagnostic in parsed {
                collected.entry(diagnostic.key.clone()).or_insert(diagnostic);
            }

            processed += 1;
            if processed % PROGRESS_INTERVAL == 0 || collected.len() > known {
                tracing::info!(
                    %tag,
                    processed,
                    warnings = collected.len(),
                    "analysis progress"
                );
            }
        }

        let diagnostics: Vec<Diagnostic> = collected.into_values().collect();
        let (warnings_text, warnings_json) =
            report::write_warning_artifacts(results_dir, &diagnostics)?;

        tracing::info!(
            %tag,
            processed,
            warnings = diagnostics.len(),
            "analysis complete"
        );

        Ok(AnalysisSummary {
            tag: tag.to_string(),
            warnings: diagnostics.into_iter().map(|d| d.key).collect(),
            warnings_text,
            warnings_json,
            log_dir,
            units_analyzed: Some(processed),
        })
    }

    /// Run one unit; returns its combined output and parsed diagnostics.
    fn analyze_unit(&self, unit: &CompileUnitEntry) -> (String, Vec<Diagnostic>) {
        let tokens = compdb::analysis_invocation(unit, &self.flags);
        let Some(command) = ExternalCommand::from_tokens(&tokens) else {
            return (String::new(), Vec::new());
        };

        let result = command
            .cwd(&unit.directory)
            .capture(true)
            .check(false)
            .run();
        let output = match result {
            Ok(out) => {
                if !out.success() {
                    tracing::debug!(
                        file = %unit.file.display(),
                        exit_code = ?out.exit_code,
                        "analyzer exited non-zero"
                    );
                }
                out.combined()
            }
            Err(e) => {
                tracing::warn!(file = %unit.file.display(), error = %e, "analyzer could not run");
                return (String::new(), Vec::new());
            }
        };

        let parsed = self.extractor.extract(&output, &unit.directory);
        (output, parsed)
    }

    fn log_name(&self, index: usize, unit: &CompileUnitEntry) -> String {
        let absolute = normalize(&unit.absolute_file());
        let relative = absolute
            .strip_prefix(&self.repo_root)
            .map(Path::to_path_buf)
            .unwrap_or(absolute);
        format!(
            "{:05}_{}.log",
            index,
            sanitize_for_filename(&relative.to_string_lossy())
        )
    }
}

/// Filesystem-safe token for a path-like fragment.
pub fn sanitize_for_filename(fragment: &str) -> String {
    fragment
        .replace(['/', '\\'], "__")
        .replace([':', ' '], "_")
}
