//! squire-eval CLI entry point.

use clap::Parser;
use colored::*;
use squire_eval::cli::{self, Cli, EXIT_ERROR, EXIT_SUCCESS};
use squire_eval::error::EvalError;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level())),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let exit_code = match cli::run(&cli) {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => report_failure(&e),
    };

    std::process::exit(exit_code);
}

/// Print a failed run's output and pick the process exit code.
fn report_failure(err: &anyhow::Error) -> i32 {
    let Some(failure) = err.downcast_ref::<EvalError>() else {
        eprintln!("Unhandled error: {:#}", err);
        return EXIT_ERROR;
    };
    let EvalError::CommandFailure { stdout, stderr, .. } = failure else {
        eprintln!("Unhandled error: {:#}", err);
        return EXIT_ERROR;
    };

    // Captured streams go to stderr, ahead of the error line.
    if let Some(out) = stdout.as_deref().filter(|s| !s.is_empty()) {
        eprint!("{}", out);
    }
    if let Some(out) = stderr.as_deref().filter(|s| !s.is_empty()) {
        eprint!("{}", out);
    }
    eprintln!("{} {}", "error:".red().bold(), failure);
    failure.exit_code()
}
