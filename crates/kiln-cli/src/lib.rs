//! Kiln CLI - the `kiln` binary.
//!
//! Thin command layer over [`kiln_bundler`]:
//!
//! - [`cli`] - argument definitions (clap derive)
//! - [`config`] - layered configuration loading (figment)
//! - [`commands`] - `build`, `dev` and `check`
//! - [`dev`] - file watching for rebuilds
//! - [`error`] - CLI error type and miette conversion
//! - [`logger`] - tracing subscriber setup
//! - [`ui`] - status lines and build summaries

pub mod cli;
pub mod commands;
pub mod config;
pub mod dev;
pub mod error;
pub mod logger;
pub mod ui;

pub use error::{CliError, Result, ResultExt};
