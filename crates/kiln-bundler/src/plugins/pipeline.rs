use std::path::Path;
use std::sync::Arc;

use kiln_config::Loader;

use super::builtin::DefineStage;
use super::{Capabilities, ModuleSource, PluginStage};
use crate::config::ResolvedConfig;
use crate::resolve::Resolved;
use crate::{Error, Result};

/// Ordered stage list with per-hook dispatch tables.
#[derive(Clone)]
pub struct PluginPipeline {
    stages: Vec<Arc<dyn PluginStage>>,
    resolvers: Vec<usize>,
    transformers: Vec<usize>,
}

impl PluginPipeline {
    pub fn new(stages: Vec<Arc<dyn PluginStage>>) -> Self {
        let with = |cap: Capabilities| {
            stages
                .iter()
                .enumerate()
                .filter(|(_, stage)| stage.capabilities().contains(cap))
                .map(|(idx, _)| idx)
                .collect::<Vec<_>>()
        };
        let resolvers = with(Capabilities::RESOLVE_ID);
        let transformers = with(Capabilities::TRANSFORM);

        Self {
            stages,
            resolvers,
            transformers,
        }
    }

    /// Run every `configure_build` hook in order, folding each contribution
    /// into `config` before the next stage sees it.
    ///
    /// Stages contributed by a hook are inserted right after the contributing
    /// stage and get their own `configure_build` turn. A contributed stage
    /// whose name is already present is dropped. A `define` stage is appended
    /// when the folded config has defines and none is listed.
    pub fn configure(
        initial: Vec<Arc<dyn PluginStage>>,
        config: &mut ResolvedConfig,
    ) -> Result<Self> {
        let mut stages = initial;
        let mut idx = 0;

        while idx < stages.len() {
            let stage = stages[idx].clone();
            idx += 1;

            if !stage.capabilities().contains(Capabilities::CONFIGURE_BUILD) {
                continue;
            }

            let mut contribution = stage.configure_build(config).map_err(|err| {
                Error::InvalidConfig(format!(
                    "plugin stage `{}` failed to configure the build: {}",
                    stage.name(),
                    err
                ))
            })?;

            let extra = std::mem::take(&mut contribution.stages);
            tracing::debug!(stage = stage.name(), ?contribution, "configure_build");
            config.apply(contribution);

            let mut insert_at = idx;
            for added in extra {
                if stages.iter().any(|s| s.name() == added.name()) {
                    tracing::debug!(stage = added.name(), by = stage.name(), "stage already listed");
                    continue;
                }
                stages.insert(insert_at, added);
                insert_at += 1;
            }
        }

        if !config.define.is_empty() && !stages.iter().any(|s| s.name() == DefineStage::NAME) {
            stages.push(Arc::new(DefineStage));
        }

        Ok(Self::new(stages))
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Ask `resolve_id` stages in order; the first definite answer wins.
    pub fn resolve_id(
        &self,
        specifier: &str,
        importer: &Path,
        config: &ResolvedConfig,
    ) -> Result<Option<Resolved>> {
        for &idx in &self.resolvers {
            let stage = &self.stages[idx];
            match stage.resolve_id(specifier, importer, config) {
                Ok(Some(resolved)) => {
                    tracing::trace!(stage = stage.name(), specifier, "resolved by stage");
                    return Ok(Some(resolved));
                }
                Ok(None) => {}
                Err(err) => {
                    return Err(Error::resolution(
                        specifier,
                        importer,
                        format!("stage `{}`: {}", stage.name(), err),
                    ));
                }
            }
        }
        Ok(None)
    }

    /// Run the module through every `transform` stage, each seeing the
    /// previous stage's output.
    pub fn transform(&self, mut module: ModuleSource, config: &ResolvedConfig) -> Result<ModuleSource> {
        if module.loader == Loader::Json {
            module.code = format!("export default {};\n", module.code.trim());
        }

        for &idx in &self.transformers {
            let stage = &self.stages[idx];
            match stage.transform(&module, config) {
                Ok(Some(code)) => module.code = code,
                Ok(None) => {}
                Err(err) => {
                    return Err(Error::Transform {
                        stage: stage.name().to_string(),
                        module: module.path.clone(),
                        message: err.message,
                    });
                }
            }
        }

        Ok(module)
    }
}

impl std::fmt::Debug for PluginPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginPipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}
