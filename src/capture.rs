//! Compile-database capture.
//!
//! Runs a full build of the checked-out revision under a build-interception
//! tool so every compiler invocation lands in `compile_commands.json`.

use anyhow::Context;
use std::env;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use crate::command::ExternalCommand;
use crate::compdb::COMPILE_DATABASE;
use crate::error::EvalError;

/// Supported interception tools, in order of preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureToolKind {
    InterceptBuild,
    Bear,
}

impl CaptureToolKind {
    pub const ALL: [CaptureToolKind; 2] = [CaptureToolKind::InterceptBuild, CaptureToolKind::Bear];

    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureToolKind::InterceptBuild => "intercept-build",
            CaptureToolKind::Bear => "bear",
        }
    }
}

impl std::fmt::Display for CaptureToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A located capture tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureTool {
    pub kind: CaptureToolKind,
    pub program: PathBuf,
}

impl CaptureTool {
    /// Find a tool on `PATH`, preferring `intercept-build`.
    pub fn locate() -> anyhow::Result<Self> {
        let path = env::var_os("PATH").unwrap_or_default();
        Self::locate_in(&path)
    }

    /// Find a tool in an explicit `PATH`-style search list.
    pub fn locate_in(search_path: &OsStr) -> anyhow::Result<Self> {
        for kind in CaptureToolKind::ALL {
            for dir in env::split_paths(search_path) {
                let candidate = dir.join(kind.as_str());
                if is_executable(&candidate) {
                    return Ok(Self {
                        kind,
                        program: candidate,
                    });
                }
            }
        }
        Err(EvalError::ToolNotFound.into())
    }

    /// Use a tool given by path; its kind follows from the file name.
    pub fn from_path<P: AsRef<Path>>(program: P) -> Self {
        let program = program.as_ref().to_path_buf();
        let is_bear = program
            .file_name()
            .map(|n| n.to_string_lossy().starts_with("bear"))
            .unwrap_or(false);
        Self {
            kind: if is_bear {
                CaptureToolKind::Bear
            } else {
                CaptureToolKind::InterceptBuild
            },
            program,
        }
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Parameters of the target build.
#[derive(Debug, Clone)]
pub struct BuildParams {
    pub make: String,
    pub arch: String,
    pub defconfig: String,
    pub target: String,
    pub jobs: usize,
}

impl BuildParams {
    fn make_command(&self) -> ExternalCommand {
        ExternalCommand::new(self.make.clone()).env("ARCH", self.arch.clone())
    }
}

/// Clean the tree and generate the default configuration.
pub fn configure_kernel(repo: &Path, params: &BuildParams) -> anyhow::Result<()> {
    params.make_command().arg("mrproper").cwd(repo).run()?;
    params
        .make_command()
        .arg(format!("-j{}", params.jobs))
        .arg(params.defconfig.clone())
        .cwd(repo)
        .run()?;
    Ok(())
}

/// Build `params.target` under `tool` and return the captured database path.
///
/// The repository must already be configured for the same architecture.
pub fn capture_compile_database(
    repo: &Path,
    params: &BuildParams,
    tool: &CaptureTool,
) -> anyhow::Result<PathBuf> {
    let database = repo.join(COMPILE_DATABASE);
    if database.exists() {
        fs::remove_file(&database)
            .with_context(|| format!("removing stale {}", database.display()))?;
    }

    let mut cmd = ExternalCommand::new(tool.program.to_string_lossy())
        .arg("--cdb")
        .arg(database.to_string_lossy());
    if tool.kind == CaptureToolKind::Bear {
        cmd = cmd.arg("--");
    }
    cmd.arg(params.make.clone())
        .arg(format!("-j{}", params.jobs))
        .arg(format!("ARCH={}", params.arch))
        .arg(params.target.clone())
        .env("ARCH", params.arch.clone())
        .cwd(repo)
        .run()?;

    if !database.exists() {
        return Err(EvalError::CaptureFailed(database).into());
    }
    Ok(database)
}

/// Put a compile database for `tag` into the repository.
///
/// With `reuse` and a copy stored in `tag_dir`, that copy is restored and no
/// build runs. Otherwise the tree is configured, captured, and the fresh
/// database is stored in `tag_dir` for later reuse.
pub fn prepare_compile_database(
    repo: &Path,
    tag: &str,
    tag_dir: &Path,
    params: &BuildParams,
    tool: &CaptureTool,
    reuse: bool,
) -> anyhow::Result<PathBuf> {
    let stored = tag_dir.join(COMPILE_DATABASE);
    let in_repo = repo.join(COMPILE_DATABASE);

    if reuse && stored.exists() {
        tracing::info!(%tag, "reusing previously captured compile database");
        fs::copy(&stored, &in_repo)
            .with_context(|| format!("restoring {}", stored.display()))?;
        return Ok(in_repo);
    }

    tracing::info!(%tag, defconfig = %params.defconfig, "configuring tree");
    configure_kernel(repo, params)?;
    tracing::info!(%tag, tool = %tool.kind, "capturing compile commands");
    let captured = capture_compile_database(repo, params, tool)?;
    fs::create_dir_all(tag_dir).with_context(|| format!("creating {}", tag_dir.display()))?;
    fs::copy(&captured, &stored).with_context(|| format!("storing {}", stored.display()))?;
    Ok(captured)
}
