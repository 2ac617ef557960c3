//! Repository state management.
//!
//! The analyzed checkout is a shared, mutable resource: every tag is checked
//! out in place. A [`CheckoutLease`] records the state found on acquisition
//! and puts it back when released or dropped, whatever happened in between.

use anyhow::Context;
use std::path::{Path, PathBuf};

use crate::command::{CommandOutput, ExternalCommand};
use crate::error::EvalError;

/// Name `git rev-parse --abbrev-ref HEAD` prints for a detached HEAD.
const DETACHED_HEAD: &str = "HEAD";

/// Run `git <args>` inside `repo`.
pub fn git<I, S>(repo: &Path, args: I, capture: bool) -> anyhow::Result<CommandOutput>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    ExternalCommand::new("git")
        .args(args)
        .cwd(repo)
        .capture(capture)
        .run()
}

fn git_stdout(repo: &Path, args: &[&str]) -> anyhow::Result<String> {
    Ok(git(repo, args.iter().copied(), true)?.stdout.trim().to_string())
}

/// Top level of the work tree containing `dir`, canonicalized.
fn work_tree_root(dir: &Path) -> Option<PathBuf> {
    let out = ExternalCommand::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .cwd(dir)
        .capture(true)
        .check(false)
        .run()
        .ok()?;
    if !out.success() {
        return None;
    }
    PathBuf::from(out.stdout.trim()).canonicalize().ok()
}

/// Check whether `dir` is the top level of its own git work tree.
///
/// A directory nested inside some other work tree (an uninitialised
/// submodule, a plain subdirectory) does not count.
pub fn is_git_repo(dir: &Path) -> bool {
    match (work_tree_root(dir), dir.canonicalize()) {
        (Some(root), Ok(dir)) => root == dir,
        _ => false,
    }
}

/// Missing, or an empty directory as left behind for an uninitialised submodule.
fn needs_bootstrap(repo: &Path) -> bool {
    if !repo.exists() {
        return true;
    }
    repo.is_dir()
        && std::fs::read_dir(repo)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false)
}

/// Make sure `repo` exists and is the top level of a git work tree.
///
/// A missing or empty directory is treated as an uninitialised submodule of
/// the enclosing project and initialised from its parent directory.
pub fn ensure_repository(repo: &Path) -> anyhow::Result<PathBuf> {
    if needs_bootstrap(repo) {
        let name = repo
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                EvalError::RepositoryUnavailable(format!("invalid path {}", repo.display()))
            })?;
        let parent = match repo.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        tracing::info!(submodule = %name, "initializing repository submodule");
        ExternalCommand::new("git")
            .args(["submodule", "update", "--init", "--recursive"])
            .arg(name)
            .cwd(&parent)
            .run()
            .map_err(|e| {
                EvalError::RepositoryUnavailable(format!(
                    "could not initialize {}: {}",
                    repo.display(),
                    e
                ))
            })?;
    }

    if needs_bootstrap(repo) {
        return Err(EvalError::RepositoryUnavailable(format!(
            "{} is missing or empty after initialization attempt",
            repo.display()
        ))
        .into());
    }
    if !is_git_repo(repo) {
        return Err(EvalError::RepositoryUnavailable(format!(
            "{} is not the top level of a git work tree",
            repo.display()
        ))
        .into());
    }

    repo.canonicalize()
        .with_context(|| format!("resolving repository path {}", repo.display()))
}

/// Refresh tags from the configured remotes. Failure only warns.
pub fn fetch_tags(repo: &Path) {
    let result = ExternalCommand::new("git")
        .args(["fetch", "--tags"])
        .cwd(repo)
        .check(false)
        .run();
    match result {
        Ok(out) if out.success() => {}
        Ok(out) => tracing::warn!(exit_code = ?out.exit_code, "git fetch --tags failed; using local tags"),
        Err(e) => tracing::warn!(error = %e, "git fetch --tags failed; using local tags"),
    }
}

/// Where a repository's HEAD pointed at some moment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoState {
    pub commit: String,
    /// `None` for a detached HEAD.
    pub branch: Option<String>,
}

impl RepoState {
    pub fn capture(repo: &Path) -> anyhow::Result<Self> {
        let commit = git_stdout(repo, &["rev-parse", "HEAD"])?;
        let branch = git_stdout(repo, &["rev-parse", "--abbrev-ref", "HEAD"])?;
        Ok(Self {
            commit,
            branch: (branch != DETACHED_HEAD && !branch.is_empty()).then_some(branch),
        })
    }
}

/// Exclusive use of a checkout, restored on release.
///
/// Call [`CheckoutLease::release`] to observe restoration errors; if the lease
/// is dropped without it (early return, `?`, panic) restoration still runs
/// and failures are logged.
pub struct CheckoutLease {
    repo: PathBuf,
    original: RepoState,
    released: bool,
}

impl CheckoutLease {
    /// Record the current state of `repo`.
    pub fn acquire<P: AsRef<Path>>(repo: P) -> anyhow::Result<Self> {
        let repo = repo.as_ref().to_path_buf();
        let original = RepoState::capture(&repo)?;
        tracing::info!(
            commit = %original.commit,
            branch = original.branch.as_deref().unwrap_or("(detached)"),
            "recorded original repository state"
        );
        Ok(Self {
            repo,
            original,
            released: false,
        })
    }

    pub fn repo(&self) -> &Path {
        &self.repo
    }

    pub fn original(&self) -> &RepoState {
        &self.original
    }

    /// Hard-clean, then check out and hard-reset to `tag`.
    pub fn checkout(&self, tag: &str) -> anyhow::Result<()> {
        git(&self.repo, ["clean", "-fdx"], false)?;
        git(&self.repo, ["checkout", "--force", tag], false)?;
        git(&self.repo, ["reset", "--hard", tag], false)?;
        Ok(())
    }

    /// Restore the original state and consume the lease.
    pub fn release(mut self) -> anyhow::Result<()> {
        self.released = true;
        self.restore()
    }

    fn restore(&self) -> anyhow::Result<()> {
        tracing::info!(repo = %self.repo.display(), "restoring repository to original state");
        git(&self.repo, ["clean", "-fdx"], false)?;
        git(
            &self.repo,
            ["checkout", "--force", self.original.commit.as_str()],
            false,
        )?;
        if let Some(branch) = &self.original.branch {
            git(&self.repo, ["checkout", "--force", branch.as_str()], false)?;
            git(
                &self.repo,
                ["reset", "--hard", self.original.commit.as_str()],
                false,
            )?;
        }
        git(&self.repo, ["clean", "-fdx"], false)?;
        Ok(())
    }
}

impl Drop for CheckoutLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.restore() {
            tracing::error!(error = %e, "failed to restore repository state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::process::Command as StdCommand;

    fn run_git(repo_dir: &Path, args: &[&str]) -> String {
        let output = StdCommand::new("git")
            .args(args)
            .current_dir(repo_dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    /// Repository on branch `trunk` with tags `v1` and `v2`, HEAD one commit past `v2`.
    fn make_git_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path();
        run_git(p, &["init", "-q"]);
        run_git(p, &["config", "user.name", "test-user"]);
        run_git(p, &["config", "user.email", "test@example.com"]);
        fs::write(p.join("a.c"), "int a;\n").unwrap();
        run_git(p, &["add", "."]);
        run_git(p, &["commit", "-q", "-m", "one"]);
        run_git(p, &["checkout", "-q", "-B", "trunk"]);
        run_git(p, &["tag", "v1"]);
        fs::write(p.join("a.c"), "int a = 2;\n").unwrap();
        run_git(p, &["commit", "-q", "-am", "two"]);
        run_git(p, &["tag", "v2"]);
        fs::write(p.join("b.c"), "int b;\n").unwrap();
        run_git(p, &["add", "."]);
        run_git(p, &["commit", "-q", "-m", "three"]);
        dir
    }

    fn head(repo: &Path) -> String {
        run_git(repo, &["rev-parse", "HEAD"])
    }

    fn is_clean(repo: &Path) -> bool {
        run_git(repo, &["status", "--porcelain", "--ignored"]).is_empty()
    }

    #[test]
    fn test_capture_branch_state() {
        let repo = make_git_repo();
        let state = RepoState::capture(repo.path()).unwrap();
        assert_eq!(state.commit, head(repo.path()));
        assert_eq!(state.branch.as_deref(), Some("trunk"));
    }

    #[test]
    fn test_capture_detached_state() {
        let repo = make_git_repo();
        run_git(repo.path(), &["checkout", "-q", "--detach", "v2"]);
        let state = RepoState::capture(repo.path()).unwrap();
        assert_eq!(state.branch, None);
    }

    #[test]
    fn test_release_restores_branch_and_cleans() {
        let repo = make_git_repo();
        let before = head(repo.path());

        let lease = CheckoutLease::acquire(repo.path()).unwrap();
        lease.checkout("v1").unwrap();
        assert_eq!(head(repo.path()), run_git(repo.path(), &["rev-parse", "v1"]));
        assert!(!repo.path().join("b.c").exists());
        fs::write(repo.path().join("compile_commands.json"), "[]").unwrap();
        fs::write(repo.path().join("a.c"), "modified\n").unwrap();
        lease.release().unwrap();

        assert_eq!(head(repo.path()), before);
        assert_eq!(
            run_git(repo.path(), &["rev-parse", "--abbrev-ref", "HEAD"]),
            "trunk"
        );
        assert!(is_clean(repo.path()));
    }

    #[test]
    fn test_drop_restores_after_failed_checkout() {
        let repo = make_git_repo();
        let before = head(repo.path());

        let result = (|| -> anyhow::Result<()> {
            let lease = CheckoutLease::acquire(repo.path())?;
            lease.checkout("v1")?;
            fs::write(repo.path().join("junk.o"), "obj").unwrap();
            lease.checkout("no-such-tag")?;
            lease.release()
        })();

        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EvalError>(),
            Some(EvalError::CommandFailure { .. })
        ));
        assert_eq!(head(repo.path()), before);
        assert!(is_clean(repo.path()));
    }

    #[test]
    fn test_detached_head_is_restored_detached() {
        let repo = make_git_repo();
        run_git(repo.path(), &["checkout", "-q", "--detach", "v2"]);
        let before = head(repo.path());

        let lease = CheckoutLease::acquire(repo.path()).unwrap();
        lease.checkout("v1").unwrap();
        lease.release().unwrap();

        assert_eq!(head(repo.path()), before);
        assert_eq!(
            run_git(repo.path(), &["rev-parse", "--abbrev-ref", "HEAD"]),
            "HEAD"
        );
    }

    #[test]
    fn test_ensure_repository_rejects_plain_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = ensure_repository(dir.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EvalError>(),
            Some(EvalError::RepositoryUnavailable(_))
        ));
    }

    #[test]
    fn test_ensure_repository_rejects_empty_nested_directory() {
        let outer = make_git_repo();
        fs::write(outer.path().join("a.c"), "uncommitted edit\n").unwrap();
        let nested = outer.path().join("linux");
        fs::create_dir(&nested).unwrap();
        let before = head(outer.path());

        let err = ensure_repository(&nested).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EvalError>(),
            Some(EvalError::RepositoryUnavailable(_))
        ));
        assert_eq!(head(outer.path()), before);
        assert_eq!(
            fs::read_to_string(outer.path().join("a.c")).unwrap(),
            "uncommitted edit\n"
        );
    }

    #[test]
    fn test_ensure_repository_rejects_subdirectory_of_work_tree() {
        let outer = make_git_repo();
        let nested = outer.path().join("src");
        fs::create_dir(&nested).unwrap();
        fs::write(nested.join("main.c"), "int main;\n").unwrap();

        assert!(!is_git_repo(&nested));
        assert!(is_git_repo(outer.path()));
        let err = ensure_repository(&nested).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EvalError>(),
            Some(EvalError::RepositoryUnavailable(_))
        ));
    }

    #[test]
    fn test_ensure_repository_accepts_work_tree() {
        let repo = make_git_repo();
        let resolved = ensure_repository(repo.path()).unwrap();
        assert_eq!(resolved, repo.path().canonicalize().unwrap());
    }
}
