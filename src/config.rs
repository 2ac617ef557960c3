//! Configuration file schema and resolved run settings.
//!
//! Settings come from three layers: built-in defaults, an optional YAML file,
//! and command-line flags (highest precedence).

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::analyze::{KeyMode, DEFAULT_MARKER};
use crate::checker::DEFAULT_CHECKER_NAME;

/// Config file names searched for in the current directory.
pub const DEFAULT_CONFIG_NAMES: &[&str] = &["squire-eval.yaml", ".squire-eval.yaml"];

/// What a run does.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Analyze every tag, then compare the first and last.
    #[default]
    Kernel,
    /// Analyze the local pre/post fixtures only.
    Smoke,
    /// Compare results a previous kernel run left on disk.
    Compare,
}

/// On-disk configuration. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EvalConfig {
    #[serde(default)]
    pub mode: Option<Mode>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub arch: Option<String>,
    #[serde(default)]
    pub defconfig: Option<String>,
    #[serde(default)]
    pub make_target: Option<String>,
    #[serde(default)]
    pub jobs: Option<usize>,
    #[serde(default)]
    pub analysis_limit: Option<usize>,
    #[serde(default)]
    pub reuse_cdb: Option<bool>,
    #[serde(default)]
    pub keep_cdb: Option<bool>,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    #[serde(default)]
    pub force_rebuild: Option<bool>,
    #[serde(default)]
    pub checker_source: Option<PathBuf>,
    #[serde(default)]
    pub checker_library: Option<PathBuf>,
    #[serde(default)]
    pub checker_name: Option<String>,
    #[serde(default)]
    pub checker_compiler: Option<String>,
    #[serde(default)]
    pub analyzer_compiler: Option<String>,
    #[serde(default)]
    pub make_program: Option<String>,
    #[serde(default)]
    pub capture_tool: Option<PathBuf>,
    #[serde(default)]
    pub repository: Option<PathBuf>,
    #[serde(default)]
    pub fixtures_dir: Option<PathBuf>,
    #[serde(default)]
    pub diagnostic_marker: Option<String>,
    #[serde(default)]
    pub key_mode: Option<KeyMode>,
    #[serde(default)]
    pub fetch_tags: Option<bool>,
}

impl EvalConfig {
    /// Parse a config from a YAML file.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: EvalConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Layer this file's values over `settings`.
    pub fn apply(self, settings: &mut Settings) {
        let config = self;
        macro_rules! overlay {
            ($($field:ident),* $(,)?) => {
                $(if let Some(v) = config.$field { settings.$field = v; })*
            };
        }
        overlay!(
            mode,
            tags,
            arch,
            defconfig,
            make_target,
            jobs,
            reuse_cdb,
            keep_cdb,
            output_dir,
            force_rebuild,
            checker_source,
            checker_library,
            checker_name,
            checker_compiler,
            make_program,
            repository,
            fixtures_dir,
            diagnostic_marker,
            key_mode,
            fetch_tags,
        );
        if config.analysis_limit.is_some() {
            settings.analysis_limit = config.analysis_limit;
        }
        if config.analyzer_compiler.is_some() {
            settings.analyzer_compiler = config.analyzer_compiler;
        }
        if config.capture_tool.is_some() {
            settings.capture_tool = config.capture_tool;
        }
    }
}

/// Find a config file in `dir`.
pub fn discover_config(dir: &Path) -> Option<PathBuf> {
    DEFAULT_CONFIG_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.exists())
}

/// Fully resolved run settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub mode: Mode,
    /// In order, baseline first.
    pub tags: Vec<String>,
    pub arch: String,
    pub defconfig: String,
    pub make_target: String,
    pub jobs: usize,
    /// Cap on analyzed units per tag.
    pub analysis_limit: Option<usize>,
    pub reuse_cdb: bool,
    /// Skip deleting the repository's database after each tag. It still goes
    /// away with the restore's clean; the tag directory keeps the durable copy.
    pub keep_cdb: bool,
    pub output_dir: PathBuf,
    pub force_rebuild: bool,
    pub checker_source: PathBuf,
    pub checker_library: PathBuf,
    pub checker_name: String,
    pub checker_compiler: String,
    /// Replaces each unit's compiler when set.
    pub analyzer_compiler: Option<String>,
    pub make_program: String,
    /// Skips the PATH lookup when set.
    pub capture_tool: Option<PathBuf>,
    pub repository: PathBuf,
    pub fixtures_dir: PathBuf,
    pub diagnostic_marker: String,
    pub key_mode: KeyMode,
    pub fetch_tags: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: Mode::Kernel,
            tags: vec!["v5.9".to_string(), "v5.17".to_string()],
            arch: "x86_64".to_string(),
            defconfig: "defconfig".to_string(),
            make_target: "vmlinux".to_string(),
            jobs: default_jobs(),
            analysis_limit: None,
            reuse_cdb: false,
            keep_cdb: false,
            output_dir: PathBuf::from("analysis_results"),
            force_rebuild: false,
            checker_source: PathBuf::from("GeneratedNPDChecker.cpp"),
            checker_library: PathBuf::from("libNPDChecker.so"),
            checker_name: DEFAULT_CHECKER_NAME.to_string(),
            checker_compiler: "clang++".to_string(),
            analyzer_compiler: None,
            make_program: "make".to_string(),
            capture_tool: None,
            repository: PathBuf::from("linux"),
            fixtures_dir: PathBuf::from("test"),
            diagnostic_marker: DEFAULT_MARKER.to_string(),
            key_mode: KeyMode::Strict,
            fetch_tags: true,
        }
    }
}

impl Settings {
    /// Check invariants the pipeline relies on.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.mode != Mode::Smoke && self.tags.is_empty() {
            anyhow::bail!("at least one tag is required");
        }
        if self.jobs == 0 {
            anyhow::bail!("jobs must be at least 1");
        }
        if self.diagnostic_marker.trim().is_empty() {
            anyhow::bail!("diagnostic_marker must not be empty");
        }
        Ok(())
    }
}

fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
