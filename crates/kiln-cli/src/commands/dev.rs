//! `kiln dev`: build, then rebuild on change.
//!
//! Every rebuild goes through the full state machine with the same driver,
//! so the pre-bundle cache is shared and a failed rebuild leaves the previous
//! output in place.

use std::sync::Arc;
use std::time::Duration;

use kiln_bundler::{BuildDriver, BuildRequest, PrebundleCache};
use tokio::signal;

use super::utils::{build_driver, output_dirs, run_build};
use crate::cli::DevArgs;
use crate::config::{CliOverrides, load_project, resolve_path};
use crate::dev::{FileChange, FileWatcher, next_batch};
use crate::error::{CliError, Result, cli_error_to_miette};
use crate::ui;

pub async fn execute(args: DevArgs) -> Result<()> {
    let overrides = CliOverrides {
        jobs: args.jobs,
        debounce_ms: args.debounce,
        ..Default::default()
    };
    let project = load_project(&args.project, &overrides)?;
    let dev = project.dev();
    let root = project.root();

    let driver = Arc::new(build_driver(&project, Arc::new(PrebundleCache::new())));
    let request = BuildRequest::dev().with_targets(args.project.targets.iter().cloned());
    let ignored = output_dirs(&project)?;

    if let Some(port) = dev.port.or(project.site.as_ref().and_then(|s| s.webserver_port)) {
        ui::info(&format!("Host application: http://{}:{}", dev.host, port));
    }

    ui::info("Performing initial build...");
    if !rebuild(&driver, &request).await {
        return Ok(());
    }

    let mut roots = vec![root.clone()];
    roots.extend(dev.watch_paths.iter().map(|p| resolve_path(p, &root)));
    let (watcher, mut changes) = FileWatcher::new(roots, dev.ignore.clone(), ignored)?;
    for watched in watcher.roots() {
        ui::info(&format!("Watching {}", watched.display()));
    }
    ui::info("Press Ctrl+C to stop");

    let quiet = Duration::from_millis(dev.debounce_ms);
    loop {
        tokio::select! {
            batch = next_batch(&mut changes, quiet) => {
                let Some(batch) = batch else {
                    ui::warning("File watcher stopped");
                    break;
                };
                describe(&batch);
                if !rebuild(&driver, &request).await {
                    break;
                }
            }
            _ = signal::ctrl_c() => {
                ui::info("Stopping watch mode");
                break;
            }
        }
    }

    Ok(())
}

/// Run one build and report it. Returns `false` once the build was cancelled.
async fn rebuild(driver: &Arc<BuildDriver>, request: &BuildRequest) -> bool {
    match run_build(driver.clone(), request.clone()).await {
        Ok(report) => {
            ui::success(&format!(
                "Built {} target(s) in {}",
                report.targets.len(),
                ui::format_duration(report.total_duration())
            ));
            true
        }
        Err(CliError::Build(failure)) if matches!(failure.error, kiln_bundler::Error::Cancelled) => {
            false
        }
        Err(err) => {
            ui::error("Build failed, previous output kept. Waiting for changes...");
            eprintln!("{:?}", cli_error_to_miette(err));
            true
        }
    }
}

fn describe(batch: &[FileChange]) {
    match batch {
        [single] => ui::info(&format!("Changed: {}", single.path().display())),
        many => ui::info(&format!("{} files changed", many.len())),
    }
}
