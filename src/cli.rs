//! Command-line interface for squire-eval.

use clap::Parser;
use std::path::{Path, PathBuf};

use crate::analyze::KeyMode;
use crate::config::{self, EvalConfig, Mode, Settings, DEFAULT_CONFIG_NAMES};
use crate::pipeline;

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_ERROR: i32 = 1;

/// Differential evaluation of a Clang NULL-dereference checker.
///
/// Builds the checker plugin, analyzes every translation unit of each tag
/// of a C repository with it, and reports which warnings were fixed,
/// persisted, or newly introduced between the first and last tag.
#[derive(Parser, Debug, Default)]
#[command(name = "squire-eval")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Workflow to run
    #[arg(long, value_enum)]
    pub mode: Option<Mode>,

    /// Tags to analyze, baseline first
    #[arg(long, num_args = 1..)]
    pub tags: Option<Vec<String>>,

    /// Target architecture passed as ARCH to make
    #[arg(long)]
    pub arch: Option<String>,

    /// Configuration target run before capture
    #[arg(long)]
    pub defconfig: Option<String>,

    /// Build target captured for the compile database
    #[arg(long)]
    pub make_target: Option<String>,

    /// Parallel build jobs
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Analyze at most this many translation units per tag
    #[arg(long)]
    pub analysis_limit: Option<usize>,

    /// Reuse a compile database stored by a previous run
    #[arg(long)]
    pub reuse_cdb: bool,

    /// Leave compile_commands.json in the repository between a tag's analysis
    /// and the final restore (the restore's clean removes it; the copy under
    /// the tag's results directory is always kept)
    #[arg(long)]
    pub keep_cdb: bool,

    /// Rebuild the checker even if it is up to date
    #[arg(long)]
    pub force_rebuild: bool,

    /// Directory receiving per-tag results and comparison reports
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Repository to analyze
    #[arg(long)]
    pub repository: Option<PathBuf>,

    /// Compiler replacing each unit's compiler during analysis
    #[arg(long)]
    pub analyzer_compiler: Option<String>,

    /// How diagnostics are identified across tags
    #[arg(long, value_enum)]
    pub key_mode: Option<KeyMode>,

    /// Path to config YAML file (default: auto-discover)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log debug detail
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Log warnings and errors only
    #[arg(short, long)]
    pub quiet: bool,
}

impl Cli {
    /// Default log filter for the chosen verbosity.
    pub fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        }
    }

    /// Layer defaults, the config file and these flags into run settings.
    pub fn resolve_settings(&self, cwd: &Path) -> anyhow::Result<Settings> {
        let mut settings = Settings::default();

        let config_path = match &self.config {
            Some(path) => Some(path.clone()),
            None => config::discover_config(cwd),
        };
        if let Some(path) = config_path {
            tracing::debug!(config = %path.display(), "loading config");
            let file = EvalConfig::parse_file(&path).map_err(|e| {
                anyhow::anyhow!("error parsing config {}: {}", path.display(), e)
            })?;
            file.apply(&mut settings);
        } else {
            tracing::debug!(
                searched = %DEFAULT_CONFIG_NAMES.join(", "),
                "no config file, using defaults"
            );
        }

        self.apply(&mut settings);
        settings.validate()?;
        Ok(settings)
    }

    fn apply(&self, settings: &mut Settings) {
        if let Some(mode) = self.mode {
            settings.mode = mode;
        }
        if let Some(tags) = &self.tags {
            settings.tags = tags.clone();
        }
        if let Some(arch) = &self.arch {
            settings.arch = arch.clone();
        }
        if let Some(defconfig) = &self.defconfig {
            settings.defconfig = defconfig.clone();
        }
        if let Some(target) = &self.make_target {
            settings.make_target = target.clone();
        }
        if let Some(jobs) = self.jobs {
            settings.jobs = jobs;
        }
        if self.analysis_limit.is_some() {
            settings.analysis_limit = self.analysis_limit;
        }
        if let Some(dir) = &self.output_dir {
            settings.output_dir = dir.clone();
        }
        if let Some(repo) = &self.repository {
            settings.repository = repo.clone();
        }
        if self.analyzer_compiler.is_some() {
            settings.analyzer_compiler = self.analyzer_compiler.clone();
        }
        if let Some(key_mode) = self.key_mode {
            settings.key_mode = key_mode;
        }
        // Flags only switch behavior on; the config file can also enable them.
        settings.reuse_cdb |= self.reuse_cdb;
        settings.keep_cdb |= self.keep_cdb;
        settings.force_rebuild |= self.force_rebuild;
    }
}

/// Resolve settings and run the selected workflow.
pub fn run(cli: &Cli) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;
    let settings = cli.resolve_settings(&cwd)?;
    tracing::info!(
        mode = ?settings.mode,
        tags = %settings.tags.join(", "),
        repository = %settings.repository.display(),
        "starting evaluation"
    );
    pipeline::run(&settings)
}
