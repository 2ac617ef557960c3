//! Exit status and error output of the `squire-eval` binary.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Smoke-mode workspace: checker source, `pre`/`post` fixtures and a config
/// pointing at the given checker compiler and analyzer.
fn workspace(checker_compiler: &Path, analyzer: Option<&Path>, with_source: bool) -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    if with_source {
        fs::write(root.join("Checker.cpp"), "// checker\n").unwrap();
    }
    for variant in ["pre", "post"] {
        fs::create_dir_all(root.join("fixtures").join(variant)).unwrap();
        fs::write(root.join("fixtures").join(variant).join("file.c"), "int x;\n").unwrap();
    }

    let mut config = format!(
        "mode: smoke\n\
         checker_source: '{}'\n\
         checker_library: '{}'\n\
         checker_compiler: '{}'\n\
         fixtures_dir: '{}'\n",
        root.join("Checker.cpp").display(),
        root.join("libChecker.so").display(),
        checker_compiler.display(),
        root.join("fixtures").display(),
    );
    if let Some(analyzer) = analyzer {
        config.push_str(&format!("analyzer_compiler: '{}'\n", analyzer.display()));
    }
    fs::write(root.join("squire-eval.yaml"), config).unwrap();
    dir
}

fn run_binary(dir: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_squire-eval"))
        .current_dir(dir)
        .env("RUST_LOG", "off")
        .env("NO_COLOR", "1")
        .env("CLICOLOR", "0")
        .env_remove("CLICOLOR_FORCE")
        .output()
        .unwrap()
}

fn last_line(text: &str) -> &str {
    text.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("")
}

#[test]
fn test_failed_build_mirrors_child_exit_code() {
    let bin = TempDir::new().unwrap();
    let cxx = write_script(
        bin.path(),
        "failing-cxx",
        "echo 'cxx stdout text'\necho 'cxx stderr text' >&2\nexit 3\n",
    );
    let dir = workspace(&cxx, None, true);

    let output = run_binary(dir.path());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert_eq!(output.status.code(), Some(3));
    assert!(stdout.contains("cxx stdout text") || stderr.contains("cxx stdout text"));
    assert!(stderr.contains("cxx stderr text"));
    let last = last_line(&stderr);
    assert!(last.starts_with("error:"), "unexpected last line: {}", last);
    assert!(last.contains("exit code 3"));
}

#[test]
fn test_captured_output_precedes_error_line() {
    let bin = TempDir::new().unwrap();
    let cxx = write_script(bin.path(), "cxx", "for last; do :; done\n: > \"$last\"\n");
    let analyzer = write_script(
        bin.path(),
        "failing-analyzer",
        "echo 'analyzer stdout text'\necho 'analyzer stderr text' >&2\nexit 4\n",
    );
    let dir = workspace(&cxx, Some(&analyzer), true);

    let output = run_binary(dir.path());
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert_eq!(output.status.code(), Some(4));
    let out_at = stderr.find("analyzer stdout text").unwrap();
    let err_at = stderr.find("analyzer stderr text").unwrap();
    let error_at = stderr.rfind("error:").unwrap();
    assert!(out_at < err_at && err_at < error_at);
    assert!(last_line(&stderr).starts_with("error:"));
    assert!(!String::from_utf8_lossy(&output.stdout).contains("analyzer stdout text"));
}

#[test]
fn test_other_failures_are_unhandled_with_exit_one() {
    let bin = TempDir::new().unwrap();
    let cxx = write_script(bin.path(), "cxx", "exit 0\n");
    let dir = workspace(&cxx, None, false);

    let output = run_binary(dir.path());
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr.contains("Unhandled error:"));
    assert!(stderr.contains("Checker.cpp"));
}
