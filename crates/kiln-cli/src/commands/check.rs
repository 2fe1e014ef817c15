//! `kiln check`: everything the Configuring phase does, without building.

use kiln_bundler::{
    BuildMode, BuildRequest, PluginPipeline, ResolvedConfig, StageRegistry, resolve_targets,
};
use kiln_config::validate_fs;

use crate::cli::CheckArgs;
use crate::config::{CliOverrides, load_project};
use crate::error::Result;
use crate::ui;

pub async fn execute(args: CheckArgs) -> Result<()> {
    let project = load_project(&args.project, &CliOverrides::default())?;
    let build = &project.config.build;

    validate_fs(build, project.root())?;

    let mut config =
        ResolvedConfig::from_options(build, &project.base_dir, project.site.clone(), BuildMode::Build);
    let stages = StageRegistry::with_builtins().instantiate(&build.plugins)?;
    let pipeline = PluginPipeline::configure(stages, &mut config)?;

    let request = BuildRequest::build().with_targets(args.project.targets.iter().cloned());
    let targets = resolve_targets(&config, &request)?;

    ui::success(&format!("Configuration is valid ({})", project.config_path.display()));
    if !pipeline.is_empty() {
        ui::info(&format!("Plugin stages: {}", pipeline.stage_names().join(", ")));
    }
    for target in &targets {
        ui::info(&format!(
            "{} → {} ({}, source maps {}, {})",
            target.name,
            target.out_dir.display(),
            target.platform_level,
            if target.source_maps { "on" } else { "off" },
            if target.empty_before_write { "cleared before write" } else { "additive" },
        ));
    }
    Ok(())
}
