//! Storyreel CLI library
//!
//! Command-line front-end for the story export pipeline: argument parsing,
//! layered configuration, logging setup and progress reporting.

#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

mod commands;
mod config;
mod error;
pub mod handlers;
mod logging;
mod output;

pub use commands::{
    CatalogArgs, Cli, ColorArg, Commands, ExportArgs, FormatArg, ListArgs, SettingsArgs,
    VerifyArgs,
};
pub use config::{CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult};
pub use logging::init_logging;
pub use output::ProgressReporter;
