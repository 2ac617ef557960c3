//! Error taxonomy for the evaluation pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Failures that callers (and the binary) need to tell apart.
///
/// Everything else travels as a plain `anyhow::Error`.
#[derive(Error, Debug)]
pub enum EvalError {
    /// An external process exited non-zero while failure-on-error was requested.
    #[error("command failed with exit code {}: {command}", describe_exit(.exit_code))]
    CommandFailure {
        command: String,
        /// `None` when the process was terminated by a signal.
        exit_code: Option<i32>,
        stdout: Option<String>,
        stderr: Option<String>,
    },
    #[error("required input not found: {}", .0.display())]
    MissingInput(PathBuf),
    #[error(
        "neither 'intercept-build' nor 'bear' was found in PATH; \
         install clang-tools or bear to capture compile_commands.json"
    )]
    ToolNotFound,
    #[error("failed to create {}; check build tool output", .0.display())]
    CaptureFailed(PathBuf),
    #[error("repository unavailable: {0}")]
    RepositoryUnavailable(String),
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl EvalError {
    /// Process exit code the binary should mirror for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            EvalError::CommandFailure {
                exit_code: Some(code),
                ..
            } if *code != 0 => *code,
            _ => 1,
        }
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => c.to_string(),
        None => "none (terminated by signal)".to_string(),
    }
}
