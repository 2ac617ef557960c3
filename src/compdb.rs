//! Compile database entries and their analysis-invocation rewrite.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File name capture tools write and the analyzer reads.
pub const COMPILE_DATABASE: &str = "compile_commands.json";

/// Source extensions worth replaying through the analyzer.
const SOURCE_EXTENSIONS: &[&str] = &["c", "cc", "cpp"];

/// How an entry spells its compiler invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCommand {
    /// Pre-split `arguments` array.
    Arguments(Vec<String>),
    /// Single shell-quoted `command` string.
    CommandLine(String),
}

impl RecordedCommand {
    /// Canonical token list. `None` when a command line cannot be split
    /// (unbalanced quotes).
    pub fn tokens(&self) -> Option<Vec<String>> {
        match self {
            RecordedCommand::Arguments(args) => Some(args.clone()),
            RecordedCommand::CommandLine(line) => shlex::split(line),
        }
    }
}

/// One record of `compile_commands.json` exactly as written by the capture tool.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DatabaseRecord {
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub directory: Option<String>,
    #[serde(default)]
    pub arguments: Option<Vec<String>>,
    #[serde(default)]
    pub command: Option<String>,
}

impl DatabaseRecord {
    /// The invocation, preferring a non-empty `arguments` array.
    pub fn recorded_command(&self) -> Option<RecordedCommand> {
        match (&self.arguments, &self.command) {
            (Some(args), _) if !args.is_empty() => Some(RecordedCommand::Arguments(args.clone())),
            (_, Some(line)) => Some(RecordedCommand::CommandLine(line.clone())),
            _ => None,
        }
    }

    /// Resolve into a [`CompileUnitEntry`], or `None` if the record has no
    /// file, is not a C/C++ source, or has no usable command.
    pub fn resolve(&self, default_directory: &Path) -> Option<CompileUnitEntry> {
        let file = self.file.as_deref().filter(|f| !f.is_empty())?;
        if !is_source_file(file) {
            return None;
        }
        let arguments = self.recorded_command()?.tokens()?;
        if arguments.is_empty() {
            return None;
        }
        Some(CompileUnitEntry {
            file: PathBuf::from(file),
            directory: self
                .directory
                .as_ref()
                .map(PathBuf::from)
                .unwrap_or_else(|| default_directory.to_path_buf()),
            arguments,
        })
    }
}

fn is_source_file(file: &str) -> bool {
    Path::new(file)
        .extension()
        .and_then(|e| e.to_str())
        .map(|ext| SOURCE_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

/// Read every record of a compile database, in file order.
pub fn load(path: &Path) -> anyhow::Result<Vec<DatabaseRecord>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

/// One compilation recipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileUnitEntry {
    pub file: PathBuf,
    /// Working directory relative paths in `file` and `arguments` resolve against.
    pub directory: PathBuf,
    /// Original compiler invocation, compiler first.
    pub arguments: Vec<String>,
}

impl CompileUnitEntry {
    pub fn compiler(&self) -> &str {
        &self.arguments[0]
    }

    /// `file` as an absolute path.
    pub fn absolute_file(&self) -> PathBuf {
        if self.file.is_absolute() {
            self.file.clone()
        } else {
            self.directory.join(&self.file)
        }
    }
}

/// Settings that turn a compile recipe into an analyzer run.
#[derive(Debug, Clone)]
pub struct AnalysisFlags {
    /// Inserted right after `--analyze`.
    pub load_flags: Vec<String>,
    /// Replaces the recorded compiler when set.
    pub compiler_override: Option<String>,
}

/// Rewrite `entry` into an analysis invocation token list.
///
/// The compile-mode flag `-c` and every output redirection (`-o <path>`,
/// `-o<path>`) are dropped; `--analyze`, the checker load flags and
/// `-fno-color-diagnostics` are injected before the remaining arguments.
pub fn analysis_invocation(entry: &CompileUnitEntry, flags: &AnalysisFlags) -> Vec<String> {
    let compiler = flags
        .compiler_override
        .clone()
        .unwrap_or_else(|| entry.compiler().to_string());

    let mut invocation = vec![compiler, "--analyze".to_string()];
    invocation.extend(flags.load_flags.iter().cloned());
    invocation.push("-fno-color-diagnostics".to_string());

    let mut skip_next = false;
    for arg in &entry.arguments[1..] {
        if skip_next {
            skip_next = false;
            continue;
        }
        if arg == "-c" {
            continue;
        }
        if arg == "-o" {
            skip_next = true;
            continue;
        }
        if arg.starts_with("-o") {
            continue;
        }
        invocation.push(arg.clone());
    }

    invocation
}
