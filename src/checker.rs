//! Building and loading the analyzer extension.
//!
//! The extension source is produced elsewhere and treated as opaque; this
//! module only turns it into a shared object and knows the flags that load
//! it into an `--analyze` invocation.

use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};

use crate::command::ExternalCommand;
use crate::error::EvalError;

/// Default dotted name the extension registers its checker under.
pub const DEFAULT_CHECKER_NAME: &str = "squire.NPDChecker";

/// How to compile the extension source.
#[derive(Debug, Clone)]
pub struct CheckerBuild {
    /// C++ compiler used to produce the shared object.
    pub compiler: String,
    pub source: PathBuf,
    pub output: PathBuf,
}

impl CheckerBuild {
    pub fn new<S: Into<String>, P: AsRef<Path>, Q: AsRef<Path>>(
        compiler: S,
        source: P,
        output: Q,
    ) -> Self {
        Self {
            compiler: compiler.into(),
            source: source.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
        }
    }

    /// Whether the artifact must be (re)compiled.
    ///
    /// True when forced, when the artifact is missing, or when it is older
    /// than the source.
    pub fn needs_rebuild(&self, force: bool) -> anyhow::Result<bool> {
        if force || !self.output.exists() {
            return Ok(true);
        }
        let source_mtime = fs::metadata(&self.source)
            .and_then(|m| m.modified())
            .with_context(|| format!("reading mtime of {}", self.source.display()))?;
        let output_mtime = fs::metadata(&self.output)
            .and_then(|m| m.modified())
            .with_context(|| format!("reading mtime of {}", self.output.display()))?;
        Ok(output_mtime < source_mtime)
    }

    /// Compile the extension if needed and return the artifact's absolute path.
    pub fn build(&self, force: bool) -> anyhow::Result<PathBuf> {
        if !self.source.exists() {
            return Err(EvalError::MissingInput(self.source.clone()).into());
        }

        if self.needs_rebuild(force)? {
            tracing::info!(source = %self.source.display(), "compiling checker");
            self.compile_command().run()?;
        } else {
            tracing::info!(artifact = %self.output.display(), "reusing existing checker");
        }

        self.output
            .canonicalize()
            .with_context(|| format!("resolving checker artifact {}", self.output.display()))
    }

    fn compile_command(&self) -> ExternalCommand {
        ExternalCommand::new(self.compiler.clone())
            .args(["-fPIC", "-shared", "-std=c++17", "-I", "/usr/include"])
            .arg(self.source.to_string_lossy())
            .arg("-o")
            .arg(self.output.to_string_lossy())
    }
}

/// Flags that load `artifact` and enable only `checker_name`, placed right
/// after `--analyze`.
pub fn load_flags(artifact: &Path, checker_name: &str) -> Vec<String> {
    vec![
        "-Xclang".to_string(),
        "-load".to_string(),
        "-Xclang".to_string(),
        artifact.to_string_lossy().into_owned(),
        "-Xclang".to_string(),
        format!("-analyzer-checker={}", checker_name),
    ]
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    /// A stand-in compiler that writes its `-o` target and counts invocations.
    fn fake_compiler(dir: &Path) -> PathBuf {
        let path = dir.join("fake-cxx");
        let script = format!(
            r#"#!/bin/sh
echo run >> "{}"
out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "-o" ]; then out="$2"; shift; fi
  shift
done
echo artifact > "$out"
"#,
            dir.join("invocations").display()
        );
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn invocations(dir: &Path) -> usize {
        fs::read_to_string(dir.join("invocations"))
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }

    #[test]
    fn test_missing_source_is_missing_input() {
        let temp = TempDir::new().unwrap();
        let build = CheckerBuild::new(
            "clang++",
            temp.path().join("absent.cpp"),
            temp.path().join("lib.so"),
        );
        let err = build.build(false).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EvalError>(),
            Some(EvalError::MissingInput(_))
        ));
    }

    #[test]
    fn test_build_is_idempotent_without_force() {
        let temp = TempDir::new().unwrap();
        let compiler = fake_compiler(temp.path());
        let source = temp.path().join("Checker.cpp");
        fs::write(&source, "// checker").unwrap();
        let build = CheckerBuild::new(
            compiler.to_string_lossy(),
            &source,
            temp.path().join("libChecker.so"),
        );

        let artifact = build.build(false).unwrap();
        let first_mtime = fs::metadata(&artifact).unwrap().modified().unwrap();
        assert_eq!(invocations(temp.path()), 1);

        let again = build.build(false).unwrap();
        assert_eq!(again, artifact);
        assert_eq!(invocations(temp.path()), 1);
        assert_eq!(
            fs::metadata(&artifact).unwrap().modified().unwrap(),
            first_mtime
        );
    }

    #[test]
    fn test_force_always_rebuilds() {
        let temp = TempDir::new().unwrap();
        let compiler = fake_compiler(temp.path());
        let source = temp.path().join("Checker.cpp");
        fs::write(&source, "// checker").unwrap();
        let build = CheckerBuild::new(
            compiler.to_string_lossy(),
            &source,
            temp.path().join("libChecker.so"),
        );

        build.build(false).unwrap();
        build.build(true).unwrap();
        assert_eq!(invocations(temp.path()), 2);
    }

    #[test]
    fn test_stale_artifact_is_rebuilt() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("Checker.cpp");
        let output = temp.path().join("libChecker.so");
        fs::write(&output, "old").unwrap();
        fs::write(&source, "// newer").unwrap();

        let past = SystemTime::now() - Duration::from_secs(3600);
        let file = fs::File::options().write(true).open(&output).unwrap();
        file.set_modified(past).unwrap();

        let build = CheckerBuild::new("clang++", &source, &output);
        assert!(build.needs_rebuild(false).unwrap());
    }

    #[test]
    fn test_failed_compile_propagates() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("Checker.cpp");
        fs::write(&source, "// checker").unwrap();
        let build = CheckerBuild::new("false", &source, temp.path().join("lib.so"));
        let err = build.build(false).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EvalError>(),
            Some(EvalError::CommandFailure { .. })
        ));
    }

    #[test]
    fn test_load_flags() {
        let flags = load_flags(Path::new("/tmp/libNPD.so"), DEFAULT_CHECKER_NAME);
        assert_eq!(
            flags,
            vec![
                "-Xclang",
                "-load",
                "-Xclang",
                "/tmp/libNPD.so",
                "-Xclang",
                "-analyzer-checker=squire.NPDChecker"
            ]
        );
    }
}
