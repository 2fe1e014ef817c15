//! Helpers shared by the build and dev commands.

use std::path::PathBuf;
use std::sync::Arc;

use kiln_bundler::{
    BuildDriver, BuildMode, BuildReport, BuildRequest, PrebundleCache, ResolvedConfig,
    resolve_targets,
};
use tokio::signal;

use crate::config::Project;
use crate::error::{CliError, Result};
use crate::ui;

/// Driver for `project`, sharing `cache` across every run.
pub(crate) fn build_driver(project: &Project, cache: Arc<PrebundleCache>) -> BuildDriver {
    BuildDriver::new(project.config.build.clone())
        .with_base_dir(project.base_dir.clone())
        .with_site(project.site.clone())
        .with_cache(cache)
        .with_parallel_jobs(project.config.settings.parallel_jobs)
}

/// Run one build on the blocking pool.
///
/// Ctrl+C trips the driver's cancellation token; the build then stops at the
/// next phase boundary and no output directory is left half-written.
pub(crate) async fn run_build(driver: Arc<BuildDriver>, request: BuildRequest) -> Result<BuildReport> {
    let token = driver.cancellation_token();
    let mut handle = tokio::task::spawn_blocking(move || driver.run(&request));

    let joined = tokio::select! {
        joined = &mut handle => joined,
        _ = signal::ctrl_c() => {
            ui::warning("Interrupted, cancelling build...");
            token.cancel();
            handle.await
        }
    };

    let report = joined.map_err(|e| CliError::Custom(format!("build task failed: {e}")))??;
    Ok(report)
}

/// Directories the watcher must skip: every target's output plus the
/// dependency cache.
pub(crate) fn output_dirs(project: &Project) -> Result<Vec<PathBuf>> {
    let config =
        ResolvedConfig::from_options(&project.config.build, &project.base_dir, None, BuildMode::Dev);
    let mut dirs: Vec<PathBuf> = resolve_targets(&config, &BuildRequest::dev())?
        .into_iter()
        .map(|target| target.out_dir)
        .collect();
    dirs.push(config.cache_dir);
    Ok(dirs)
}
