//! squire-eval - differential evaluation of a Clang static-analysis checker.
//!
//! Builds a NULL-dereference checker plugin, runs `clang --analyze` with it
//! over every translation unit of two or more tags of a C repository, and
//! classifies the warnings of the first and last tag as fixed, persistent,
//! or regressions.
//!
//! # Architecture
//!
//! - `checker`: Builds the checker shared object and its load flags
//! - `repo`: Git helpers and the checkout lease that restores the tree
//! - `capture`: Compile-database capture via intercept-build or bear
//! - `compdb`: `compile_commands.json` schema and analysis invocations
//! - `analyze`: Diagnostic extraction and the per-tag analysis driver
//! - `compare`: Set comparison between tags
//! - `report`: Warning listings, comparison reports, terminal summary
//! - `pipeline`: Kernel, smoke and compare workflows
//! - `config`: YAML config schema and resolved settings

pub mod analyze;
pub mod capture;
pub mod checker;
pub mod cli;
pub mod command;
pub mod compare;
pub mod compdb;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod repo;

pub use analyze::{AnalysisSummary, Analyzer, Diagnostic, Extractor, KeyMode};
pub use compare::{compare, ComparisonResult};
pub use config::{EvalConfig, Mode, Settings};
pub use error::EvalError;
pub use repo::CheckoutLease;
