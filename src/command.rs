//! Synchronous execution of external programs.
//!
//! Every command line is echoed (`$ git checkout v5.9`) before it runs so a
//! run's transcript doubles as an audit log.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::EvalError;

/// Result of one finished process.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Empty unless output was captured.
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Stdout followed by stderr.
    pub fn combined(&self) -> String {
        let mut text = String::with_capacity(self.stdout.len() + self.stderr.len());
        text.push_str(&self.stdout);
        text.push_str(&self.stderr);
        text
    }
}

/// An external program invocation, configured builder-style.
#[derive(Debug, Clone)]
pub struct ExternalCommand {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    env: Vec<(String, String)>,
    capture: bool,
    check: bool,
}

impl ExternalCommand {
    /// New command that inherits stdio and fails on non-zero exit.
    pub fn new<S: Into<String>>(program: S) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            capture: false,
            check: true,
        }
    }

    /// Build a command from a token list whose first element is the program.
    pub fn from_tokens(tokens: &[String]) -> Option<Self> {
        let (program, rest) = tokens.split_first()?;
        Some(Self::new(program.clone()).args(rest.iter().cloned()))
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Add or override one variable on top of the inherited environment.
    pub fn env<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Capture stdout/stderr instead of inheriting the caller's streams.
    pub fn capture(mut self, capture: bool) -> Self {
        self.capture = capture;
        self
    }

    /// Whether a non-zero exit is turned into [`EvalError::CommandFailure`].
    pub fn check(mut self, check: bool) -> Self {
        self.check = check;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Space-joined command line as echoed before execution.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run to completion.
    pub fn run(&self) -> anyhow::Result<CommandOutput> {
        let line = self.command_line();
        println!("$ {}", line);
        if let Some(dir) = &self.cwd {
            tracing::debug!(cwd = %dir.display(), "command working directory");
        }
        for (key, value) in &self.env {
            tracing::debug!(%key, %value, "command environment override");
        }

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        let output = if self.capture {
            let out = cmd
                .stdin(Stdio::null())
                .output()
                .map_err(|source| self.spawn_error(source))?;
            CommandOutput {
                exit_code: out.status.code(),
                stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
            }
        } else {
            let status = cmd.status().map_err(|source| self.spawn_error(source))?;
            CommandOutput {
                exit_code: status.code(),
                ..Default::default()
            }
        };

        if self.check && !output.success() {
            return Err(EvalError::CommandFailure {
                command: line,
                exit_code: output.exit_code,
                stdout: self.capture.then(|| output.stdout.clone()),
                stderr: self.capture.then(|| output.stderr.clone()),
            }
            .into());
        }

        Ok(output)
    }

    fn spawn_error(&self, source: std::io::Error) -> EvalError {
        EvalError::Spawn {
            program: self.program.clone(),
            source,
        }
    }
}
