//! Command-line interface definition.
//!
//! - `kiln build` - run one build through the state machine
//! - `kiln dev` - build, then rebuild on every change
//! - `kiln check` - validate configuration and output targets

mod commands;

use clap::Parser;

pub use commands::{BuildArgs, CheckArgs, Command, DevArgs, ProjectArgs};

/// Kiln - multi-target build orchestration for frontend apps
#[derive(Parser, Debug)]
#[command(
    name = "kiln",
    version,
    about = "Multi-target build orchestration for frontend apps",
    long_about = "Kiln resolves, pre-bundles, transforms and emits a frontend app into one or\n\
                  more output targets, sharing a dependency pre-bundle cache between builds."
)]
pub struct Cli {
    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}
