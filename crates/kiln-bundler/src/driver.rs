//! The build state machine.
//!
//! [`BuildDriver::run`] walks `Configuring -> Resolving -> PreBundling ->
//! Transforming -> Emitting` once per invocation. Each phase is a barrier:
//! work inside a phase runs on the rayon pool, but the next phase only starts
//! once every item of the current one has succeeded. The first error ends the
//! build in `Failed(phase)`; no output directory is touched before Emitting
//! has rendered and staged every requested target.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use kiln_config::{BuildOptions, SiteConfig, validate_schema};
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::cancel::CancellationToken;
use crate::config::{BuildRequest, ResolvedConfig};
use crate::emit::{self, ManifestEntry, ModuleOutput, RenderedTarget};
use crate::graph::{GraphBuilder, ModuleGraph};
use crate::phase::{BuildPhase, BuildState};
use crate::plugins::{ModuleSource, PluginPipeline, StageRegistry};
use crate::prebundle::{
    DepRequest, PrebundleCache, PrebundleOutcome, PrebundleRequest, Prebundled, flatten_package,
};
use crate::resolve::Resolved;
use crate::target::{OutputTarget, resolve_targets};
use crate::{Error, Result};

/// A failed build: the phase it failed in and the first fatal error.
#[derive(Debug, thiserror::Error)]
#[error("build failed during {phase}: {error}")]
pub struct BuildFailure {
    pub phase: BuildPhase,
    #[source]
    pub error: Error,
}

impl miette::Diagnostic for BuildFailure {
    fn code(&self) -> Option<Box<dyn std::fmt::Display + '_>> {
        miette::Diagnostic::code(&self.error)
    }

    fn severity(&self) -> Option<miette::Severity> {
        Some(miette::Severity::Error)
    }

    fn help(&self) -> Option<Box<dyn std::fmt::Display + '_>> {
        miette::Diagnostic::help(&self.error)
    }
}

/// One target written by a successful build.
#[derive(Debug, Clone, Serialize)]
pub struct EmittedTarget {
    pub name: String,
    pub out_dir: PathBuf,
    /// Paths relative to `out_dir`, in write order
    pub files: Vec<String>,
    pub manifest: BTreeMap<String, ManifestEntry>,
}

/// Summary of a successful build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub state: BuildState,
    pub phases: Vec<(BuildPhase, Duration)>,
    /// First-party modules in the graph
    pub modules: usize,
    pub prebundle: PrebundleOutcome,
    pub targets: Vec<EmittedTarget>,
}

impl BuildReport {
    pub fn total_duration(&self) -> Duration {
        self.phases.iter().map(|(_, d)| *d).sum()
    }

    pub fn target(&self, name: &str) -> Option<&EmittedTarget> {
        self.targets.iter().find(|t| t.name == name)
    }
}

/// Owns the inputs of a build and runs it through the state machine.
///
/// A driver can run any number of builds; dev mode calls [`BuildDriver::run`]
/// again for every rebuild. Share one [`PrebundleCache`] across drivers to
/// coalesce dependency pre-bundling.
pub struct BuildDriver {
    options: BuildOptions,
    base_dir: PathBuf,
    site: Option<SiteConfig>,
    registry: StageRegistry,
    cache: Arc<PrebundleCache>,
    cancel: CancellationToken,
    parallel_jobs: Option<usize>,
    state: Mutex<BuildState>,
}

impl BuildDriver {
    /// Driver anchored at the current directory with the built-in stages.
    pub fn new(options: BuildOptions) -> Self {
        Self {
            options,
            base_dir: std::env::current_dir().unwrap_or_default(),
            site: None,
            registry: StageRegistry::with_builtins(),
            cache: Arc::new(PrebundleCache::new()),
            cancel: CancellationToken::new(),
            parallel_jobs: None,
            state: Mutex::new(BuildState::Idle),
        }
    }

    /// Directory `build.root` is relative to (usually the config file's).
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    pub fn with_site(mut self, site: Option<SiteConfig>) -> Self {
        self.site = site;
        self
    }

    pub fn with_registry(mut self, registry: StageRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_cache(mut self, cache: Arc<PrebundleCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Cap the worker threads used inside a phase.
    pub fn with_parallel_jobs(mut self, jobs: Option<usize>) -> Self {
        self.parallel_jobs = jobs.filter(|n| *n > 0);
        self
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn cache(&self) -> &Arc<PrebundleCache> {
        &self.cache
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// State of the most recent (or current) build.
    pub fn state(&self) -> BuildState {
        *self.state.lock()
    }

    /// Run one build.
    pub fn run(&self, request: &BuildRequest) -> std::result::Result<BuildReport, BuildFailure> {
        *self.state.lock() = BuildState::Idle;

        match self.parallel_jobs {
            Some(jobs) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(jobs)
                    .thread_name(|i| format!("kiln-worker-{i}"))
                    .build()
                    .map_err(|e| {
                        self.fail(
                            BuildPhase::Configuring,
                            Error::InvalidConfig(format!("cannot start {jobs} worker threads: {e}")),
                        )
                    })?;
                pool.install(|| self.run_phases(request))
            }
            None => self.run_phases(request),
        }
    }

    fn run_phases(&self, request: &BuildRequest) -> std::result::Result<BuildReport, BuildFailure> {
        let mut timings = Vec::with_capacity(BuildPhase::ALL.len());
        info!(mode = ?request.mode, targets = ?request.targets, "build started");

        let (config, pipeline, targets) = self.phase(BuildPhase::Configuring, &mut timings, || {
            self.configure(request)
        })?;

        let graph = self.phase(BuildPhase::Resolving, &mut timings, || {
            GraphBuilder::new(&config, &pipeline)
                .with_cancellation(&self.cancel)
                .build()
        })?;

        let (prebundled, packages) = self.phase(BuildPhase::PreBundling, &mut timings, || {
            self.prebundle(&config, &graph)
        })?;

        let modules = self.phase(BuildPhase::Transforming, &mut timings, || {
            transform_all(&config, &pipeline, &graph)
        })?;

        let emitted = self.phase(BuildPhase::Emitting, &mut timings, || {
            self.emit(&targets, &graph, &modules, &packages)
        })?;

        self.transition(BuildState::Succeeded);
        let report = BuildReport {
            state: BuildState::Succeeded,
            phases: timings,
            modules: graph.len(),
            prebundle: prebundled.outcome,
            targets: emitted,
        };
        info!(
            modules = report.modules,
            targets = report.targets.len(),
            elapsed_ms = report.total_duration().as_millis() as u64,
            "build succeeded"
        );
        Ok(report)
    }

    /// Enter `phase`, run `work`, record its duration.
    fn phase<T>(
        &self,
        phase: BuildPhase,
        timings: &mut Vec<(BuildPhase, Duration)>,
        work: impl FnOnce() -> Result<T>,
    ) -> std::result::Result<T, BuildFailure> {
        self.transition(BuildState::Running(phase));
        self.cancel.check().map_err(|e| self.fail(phase, e))?;

        debug!(%phase, "entering phase");
        let started = Instant::now();
        let result = work();
        timings.push((phase, started.elapsed()));

        result.map_err(|e| self.fail(phase, e))
    }

    fn fail(&self, phase: BuildPhase, error: Error) -> BuildFailure {
        self.transition(BuildState::Failed(phase));
        tracing::error!(%phase, %error, "build failed");
        BuildFailure { phase, error }
    }

    fn transition(&self, to: BuildState) {
        let mut state = self.state.lock();
        if !state.can_transition(to) {
            debug!(from = %*state, to = %to, "unexpected state transition");
        }
        *state = to;
    }

    fn configure(
        &self,
        request: &BuildRequest,
    ) -> Result<(Arc<ResolvedConfig>, PluginPipeline, Vec<OutputTarget>)> {
        validate_schema(&self.options)?;

        let mut config =
            ResolvedConfig::from_options(&self.options, &self.base_dir, self.site.clone(), request.mode);
        let stages = self.registry.instantiate(&self.options.plugins)?;
        let pipeline = PluginPipeline::configure(stages, &mut config)?;
        debug!(stages = ?pipeline.stage_names(), "plugin pipeline configured");

        let targets = resolve_targets(&config, request)?;
        Ok((Arc::new(config), pipeline, targets))
    }

    /// Pre-bundle every discovered package plus `optimize_deps.include`, and
    /// collect the code each imported package contributes to the output.
    fn prebundle(
        &self,
        config: &ResolvedConfig,
        graph: &ModuleGraph,
    ) -> Result<(Prebundled, BTreeMap<String, String>)> {
        let excluded = |id: &str, name: &str| {
            config
                .optimize_deps
                .exclude
                .iter()
                .any(|e| e == id || e == name)
        };

        let mut deps = BTreeMap::new();
        for (id, dep) in graph.packages() {
            if !excluded(id, &dep.name) {
                deps.insert(
                    id.clone(),
                    DepRequest {
                        name: dep.name.clone(),
                        entry: dep.path.clone(),
                    },
                );
            }
        }

        let resolver = config.resolver();
        let importer = config.root.join("package.json");
        for id in &config.optimize_deps.include {
            if deps.contains_key(id) {
                continue;
            }
            match resolver.resolve(id, &importer)? {
                Resolved::Package { id, name, path } => {
                    if !excluded(&id, &name) {
                        deps.insert(id, DepRequest { name, entry: path });
                    }
                }
                other => {
                    return Err(Error::resolution(
                        id.as_str(),
                        &importer,
                        format!("`optimize_deps.include` entry is not a package ({other:?})"),
                    ));
                }
            }
        }

        let request = PrebundleRequest {
            root: config.root.clone(),
            cache_dir: config.cache_dir.clone(),
            deps,
            options: config.optimize_deps.clone(),
        };
        let prebundled = self.cache.prebundle(&request)?;
        info!(outcome = ?prebundled.outcome, deps = request.deps.len(), "dependencies pre-bundled");

        let mut packages = BTreeMap::new();
        for (id, dep) in graph.packages() {
            let code = match (&prebundled.entry, excluded(id, &dep.name)) {
                (Some(entry), false) => entry.read_artifact(id)?,
                _ => flatten_package(id, &dep.name, &dep.path)?,
            };
            packages.insert(id.clone(), code);
        }

        Ok((prebundled, packages))
    }

    fn emit(
        &self,
        targets: &[OutputTarget],
        graph: &ModuleGraph,
        modules: &[ModuleOutput],
        packages: &BTreeMap<String, String>,
    ) -> Result<Vec<EmittedTarget>> {
        let rendered: Vec<RenderedTarget> = targets
            .par_iter()
            .map(|target| emit::render_target(target, graph, modules, packages))
            .collect::<Vec<Result<_>>>()
            .into_iter()
            .collect::<Result<_>>()?;

        let mut staged = Vec::with_capacity(rendered.len());
        for target in &rendered {
            staged.push(emit::stage(
                &target.target.name,
                &target.target.out_dir,
                target.target.empty_before_write,
                &target.files,
            )?);
        }

        for stage in staged {
            self.cancel.check()?;
            debug!(out_dir = %stage.out_dir().display(), "committing target");
            stage.commit()?;
        }

        Ok(rendered
            .into_iter()
            .map(|r| {
                info!(name = %r.target.name, files = r.files.len(), out_dir = %r.target.out_dir.display(), "target emitted");
                EmittedTarget {
                    name: r.target.name,
                    out_dir: r.target.out_dir,
                    files: r.files.into_iter().map(|f| f.path).collect(),
                    manifest: r.manifest,
                }
            })
            .collect())
    }
}

/// Run every module through the pipeline. Output is indexed like the graph.
fn transform_all(
    config: &ResolvedConfig,
    pipeline: &PluginPipeline,
    graph: &ModuleGraph,
) -> Result<Vec<ModuleOutput>> {
    graph
        .modules()
        .par_iter()
        .map(|node| {
            let source = ModuleSource::new(node.path.clone(), node.loader, node.source.clone());
            let transformed = pipeline.transform(source, config)?;
            debug!(module = %node.id, "transformed");
            Ok(ModuleOutput {
                id: node.id.clone(),
                loader: node.loader,
                original: node.source.clone(),
                code: transformed.code,
            })
        })
        .collect::<Vec<Result<_>>>()
        .into_iter()
        .collect()
}

impl std::fmt::Debug for BuildDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildDriver")
            .field("base_dir", &self.base_dir)
            .field("registry", &self.registry.len())
            .field("parallel_jobs", &self.parallel_jobs)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_config::{PluginOptions, TargetOptions};
    use std::fs;
    use tempfile::TempDir;

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/main.ts"), "import { n } from './util'\nconsole.log(n)\n").unwrap();
        fs::write(dir.path().join("src/util.ts"), "export const n = 1\n").unwrap();
        dir
    }

    fn options() -> BuildOptions {
        BuildOptions::default()
            .with_entry("src/main.ts")
            .with_target(TargetOptions::new("standalone", "dist"))
    }

    #[test]
    fn successful_build_walks_every_phase() {
        let dir = project();
        let driver = BuildDriver::new(options()).with_base_dir(dir.path());

        let report = driver.run(&BuildRequest::build()).unwrap();
        let phases: Vec<BuildPhase> = report.phases.iter().map(|(p, _)| *p).collect();
        assert_eq!(phases, BuildPhase::ALL);
        assert_eq!(report.state, BuildState::Succeeded);
        assert_eq!(driver.state(), BuildState::Succeeded);
        assert_eq!(report.modules, 2);
        assert_eq!(report.prebundle, PrebundleOutcome::Skipped);

        let target = report.target("standalone").unwrap();
        assert!(target.files.iter().any(|f| f == "manifest.json"));
        assert!(dir.path().join("dist/manifest.json").is_file());
    }

    #[test]
    fn unknown_plugin_fails_while_configuring() {
        let dir = project();
        let driver = BuildDriver::new(options().with_plugin(PluginOptions::named("nope")))
            .with_base_dir(dir.path());

        let failure = driver.run(&BuildRequest::build()).unwrap_err();
        assert_eq!(failure.phase, BuildPhase::Configuring);
        assert!(matches!(failure.error, Error::InvalidConfig(_)));
        assert_eq!(driver.state(), BuildState::Failed(BuildPhase::Configuring));
        assert!(failure.to_string().starts_with("build failed during configuring:"));
        assert!(!dir.path().join("dist").exists());
    }

    #[test]
    fn bounded_worker_pool_builds_the_same_output() {
        let dir = project();
        let driver = BuildDriver::new(options())
            .with_base_dir(dir.path())
            .with_parallel_jobs(Some(1));
        let first = driver.run(&BuildRequest::build()).unwrap();
        let second = BuildDriver::new(options())
            .with_base_dir(dir.path())
            .run(&BuildRequest::build())
            .unwrap();
        assert_eq!(first.targets[0].files, second.targets[0].files);
    }
}
