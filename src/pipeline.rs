//! Workflow orchestration.
//!
//! Kernel mode: build checker, then per tag checkout → capture → analyze,
//! restore the repository, and compare the first and last tag.

use anyhow::Context;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::analyze::{
    tag_dir_name, AnalysisSummary, Analyzer, Diagnostic, DiagnosticPattern, Extractor,
};
use crate::capture::{self, BuildParams, CaptureTool};
use crate::checker::{self, CheckerBuild};
use crate::command::ExternalCommand;
use crate::compare;
use crate::compdb::AnalysisFlags;
use crate::config::{Mode, Settings};
use crate::error::EvalError;
use crate::report;
use crate::repo::{self, CheckoutLease};

/// Compiler used for smoke runs when no analyzer compiler is configured.
const SMOKE_COMPILER: &str = "clang";
/// Fixture variants analyzed in smoke mode, each holding a `file.c`.
const SMOKE_VARIANTS: &[&str] = &["pre", "post"];

/// Run whichever workflow `settings.mode` selects.
pub fn run(settings: &Settings) -> anyhow::Result<()> {
    settings.validate()?;
    match settings.mode {
        Mode::Compare => {
            run_compare(settings)?;
        }
        Mode::Smoke => {
            let artifact = build_checker(settings)?;
            run_smoke(settings, &artifact)?;
        }
        Mode::Kernel => {
            let artifact = build_checker(settings)?;
            run_kernel(settings, &artifact)?;
        }
    }
    Ok(())
}

/// Compile (or reuse) the checker shared object.
pub fn build_checker(settings: &Settings) -> anyhow::Result<PathBuf> {
    CheckerBuild::new(
        settings.checker_compiler.clone(),
        &settings.checker_source,
        &settings.checker_library,
    )
    .build(settings.force_rebuild)
}

/// Diagnostics found in one smoke fixture.
#[derive(Debug, Clone)]
pub struct SmokeOutcome {
    pub fixture: PathBuf,
    pub diagnostics: Vec<Diagnostic>,
}

/// Analyze the local `pre`/`post` fixtures to check the checker is wired up.
pub fn run_smoke(settings: &Settings, artifact: &Path) -> anyhow::Result<Vec<SmokeOutcome>> {
    tracing::info!("running analyzer on local fixtures");
    let root = &settings.fixtures_dir;
    if !root.is_dir() {
        return Err(EvalError::MissingInput(root.clone()).into());
    }
    let root = root
        .canonicalize()
        .with_context(|| format!("resolving {}", root.display()))?;
    let extractor = Extractor::new(
        &root,
        DiagnosticPattern::new(&settings.diagnostic_marker),
        settings.key_mode,
    );
    let compiler = settings
        .analyzer_compiler
        .clone()
        .unwrap_or_else(|| SMOKE_COMPILER.to_string());

    let mut outcomes = Vec::new();
    for variant in SMOKE_VARIANTS {
        let fixture = root.join(variant).join("file.c");
        if !fixture.exists() {
            return Err(EvalError::MissingInput(fixture).into());
        }
        tracing::info!(fixture = %fixture.display(), "analyzing fixture");

        let output = ExternalCommand::new(compiler.clone())
            .arg("--analyze")
            .args(checker::load_flags(artifact, &settings.checker_name))
            .arg("-Wno-everything")
            .arg(fixture.to_string_lossy())
            .cwd(&root)
            .capture(true)
            .run()?;

        let diagnostics = extractor.extract(&output.combined(), &root);
        tracing::info!(
            fixture = %variant,
            warnings = diagnostics.len(),
            "fixture analyzed"
        );
        for d in &diagnostics {
            tracing::info!(fixture = %variant, key = %d.key, "diagnostic");
        }
        outcomes.push(SmokeOutcome {
            fixture,
            diagnostics,
        });
    }

    Ok(outcomes)
}

/// Full multi-tag workflow. Returns the per-tag summaries.
///
/// The repository is restored to the state it was found in before this
/// returns, whether or not analysis succeeded.
pub fn run_kernel(
    settings: &Settings,
    artifact: &Path,
) -> anyhow::Result<HashMap<String, AnalysisSummary>> {
    let repo = repo::ensure_repository(&settings.repository)?;
    if settings.fetch_tags {
        repo::fetch_tags(&repo);
    }

    let results_root = results_root(settings)?;
    let tool = match &settings.capture_tool {
        Some(path) => CaptureTool::from_path(path),
        None => CaptureTool::locate()?,
    };
    tracing::info!(tool = %tool.kind, program = %tool.program.display(), "using capture tool");

    let analyzer = Analyzer::new(
        &repo,
        AnalysisFlags {
            load_flags: checker::load_flags(artifact, &settings.checker_name),
            compiler_override: settings.analyzer_compiler.clone(),
        },
        Extractor::new(
            &repo,
            DiagnosticPattern::new(&settings.diagnostic_marker),
            settings.key_mode,
        ),
    )
    .unit_limit(settings.analysis_limit);

    let lease = CheckoutLease::acquire(&repo)?;
    let outcome = analyze_tags(&lease, settings, &analyzer, &tool, &results_root);
    let restored = lease.release();
    if let (Err(_), Err(restore_err)) = (&outcome, &restored) {
        tracing::error!(error = %restore_err, "repository restoration failed");
    }
    let summaries = outcome?;
    restored?;

    if let [baseline, .., latest] = settings.tags.as_slice() {
        write_comparison(settings, &summaries, baseline, latest, &results_root)?;
    }

    Ok(summaries)
}

fn analyze_tags(
    lease: &CheckoutLease,
    settings: &Settings,
    analyzer: &Analyzer,
    tool: &CaptureTool,
    results_root: &Path,
) -> anyhow::Result<HashMap<String, AnalysisSummary>> {
    let params = BuildParams {
        make: settings.make_program.clone(),
        arch: settings.arch.clone(),
        defconfig: settings.defconfig.clone(),
        target: settings.make_target.clone(),
        jobs: settings.jobs,
    };

    let mut summaries = HashMap::new();
    for tag in &settings.tags {
        tracing::info!(%tag, "===== analyzing revision =====");
        lease.checkout(tag)?;

        let tag_dir = results_root.join(tag_dir_name(tag));
        fs::create_dir_all(&tag_dir)
            .with_context(|| format!("creating {}", tag_dir.display()))?;

        let database = capture::prepare_compile_database(
            lease.repo(),
            tag,
            &tag_dir,
            &params,
            tool,
            settings.reuse_cdb,
        )?;
        let summary = analyzer.analyze(&database, tag, &tag_dir)?;

        if !settings.keep_cdb && database.exists() {
            fs::remove_file(&database)
                .with_context(|| format!("removing {}", database.display()))?;
        }
        summaries.insert(tag.clone(), summary);
    }
    Ok(summaries)
}

/// Compare summaries a previous kernel run left under the output directory.
pub fn run_compare(settings: &Settings) -> anyhow::Result<Option<PathBuf>> {
    let results_root = results_root(settings)?;
    let mut summaries = HashMap::new();
    for tag in &settings.tags {
        match AnalysisSummary::load(tag, &results_root.join(tag_dir_name(tag))) {
            Ok(summary) => {
                summaries.insert(tag.clone(), summary);
            }
            Err(e) => tracing::warn!(%tag, error = %e, "no stored results for tag"),
        }
    }

    match settings.tags.as_slice() {
        [baseline, .., latest] => {
            write_comparison(settings, &summaries, baseline, latest, &results_root)
        }
        _ => {
            tracing::warn!("comparison needs at least two tags");
            Ok(None)
        }
    }
}

fn write_comparison(
    settings: &Settings,
    summaries: &HashMap<String, AnalysisSummary>,
    baseline: &str,
    latest: &str,
    results_root: &Path,
) -> anyhow::Result<Option<PathBuf>> {
    let Some((result, baseline, latest)) = compare::compare_tags(summaries, baseline, latest)
    else {
        return Ok(None);
    };
    let path = report::write_comparison(results_root, &result, baseline, latest, settings.key_mode)?;
    tracing::info!(
        report = %path.display(),
        fixed = result.fixed.len(),
        persistent = result.persistent.len(),
        regressions = result.regressions.len(),
        "comparison written"
    );
    report::write_pretty(&result, &path);
    Ok(Some(path))
}

fn results_root(settings: &Settings) -> anyhow::Result<PathBuf> {
    let dir = &settings.output_dir;
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    dir.canonicalize()
        .with_context(|| format!("resolving {}", dir.display()))
}
