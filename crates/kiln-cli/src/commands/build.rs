//! `kiln build`.

use std::sync::Arc;

use kiln_bundler::{BuildRequest, PrebundleCache};

use super::utils::{build_driver, run_build};
use crate::cli::BuildArgs;
use crate::config::{CliOverrides, load_project};
use crate::error::Result;
use crate::ui;

/// Load the project, run one build and print the per-target summary.
///
/// Fails with the build's phase and cause when the driver ends in `Failed`;
/// in that case no target directory has been modified.
pub async fn execute(args: BuildArgs) -> Result<()> {
    let overrides = CliOverrides {
        sourcemap: args.sourcemap,
        force: args.force,
        jobs: args.jobs,
        debounce_ms: None,
    };
    let project = load_project(&args.project, &overrides)?;
    ui::debug(&format!("Using {}", project.config_path.display()));

    let driver = Arc::new(build_driver(&project, Arc::new(PrebundleCache::new())));
    let request = BuildRequest::build().with_targets(args.project.targets.iter().cloned());

    ui::info("Building...");
    let report = run_build(driver, request).await?;

    ui::print_build_summary(&report);
    ui::success(&format!(
        "Built {} target(s) in {}",
        report.targets.len(),
        ui::format_duration(report.total_duration())
    ));
    Ok(())
}
