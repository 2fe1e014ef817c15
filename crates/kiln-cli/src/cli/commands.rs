use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build the requested targets once
    ///
    /// Exits non-zero unless every requested target was emitted.
    Build(BuildArgs),

    /// Build, then rebuild whenever a watched file changes
    ///
    /// Every rebuild runs the full Configuring to Emitting sequence against
    /// the shared dependency cache. Stop with Ctrl+C.
    Dev(DevArgs),

    /// Validate configuration and output targets without building
    Check(CheckArgs),
}

/// Where the project lives and which slice of it to build.
#[derive(Args, Debug, Clone, Default)]
pub struct ProjectArgs {
    /// Target to emit (repeatable); all declared targets when omitted
    #[arg(short = 't', long = "target", value_name = "NAME")]
    pub targets: Vec<String>,

    /// Configuration profile to apply (`[profiles.<name>]`)
    #[arg(short, long, value_name = "NAME")]
    pub profile: Option<String>,

    /// Config file (defaults to kiln.toml, then package.json#kiln)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Project directory (defaults to the current directory)
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct BuildArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Emit source maps for targets that don't configure them
    #[arg(long)]
    pub sourcemap: bool,

    /// Re-bundle dependencies even when the cache is valid
    #[arg(long)]
    pub force: bool,

    /// Worker threads for per-module work
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<usize>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct DevArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Debounce window for file changes, in milliseconds
    #[arg(long, value_name = "MS")]
    pub debounce: Option<u64>,

    /// Worker threads for per-module work
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<usize>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct CheckArgs {
    #[command(flatten)]
    pub project: ProjectArgs,
}
