use std::sync::Arc;

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use super::{ComponentStage, JsxStage, stage_options};
use crate::config::ResolvedConfig;
use crate::plugins::{Capabilities, ConfigContribution, PluginStage, StageError, TargetPatch};

/// Define injected with the host application's web server port.
pub const BACKEND_PORT_DEFINE: &str = "__KILN_BACKEND_PORT__";
/// Define injected with the host application's realtime server port.
pub const SOCKETIO_PORT_DEFINE: &str = "__KILN_SOCKETIO_PORT__";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FrameworkOptions {
    /// Register the single-file component stage
    pub component: bool,
    /// Register the JSX stage
    pub jsx: bool,
    /// Config forwarded to the JSX stage
    pub jsx_options: Value,
    /// Dependencies always pre-bundled
    pub include: Vec<String>,
    /// Manual chunks added to every target that doesn't define them
    pub manual_chunks: IndexMap<String, Vec<String>>,
}

impl Default for FrameworkOptions {
    fn default() -> Self {
        Self {
            component: true,
            jsx: true,
            jsx_options: Value::Null,
            include: Vec::new(),
            manual_chunks: IndexMap::new(),
        }
    }
}

/// Framework integration meta-plugin.
///
/// Contributes configuration only: registers the component and JSX stages
/// right after itself and wires the site config's ports into `define`.
#[derive(Debug, Clone, Default)]
pub struct FrameworkStage {
    options: FrameworkOptions,
}

impl FrameworkStage {
    pub const NAME: &'static str = "framework";

    pub fn new(options: FrameworkOptions) -> Self {
        Self { options }
    }

    pub fn from_config(config: &Value) -> Result<Self, StageError> {
        stage_options(Self::NAME, config).map(Self::new)
    }
}

impl PluginStage for FrameworkStage {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::CONFIGURE_BUILD
    }

    fn configure_build(&self, config: &ResolvedConfig) -> Result<ConfigContribution, StageError> {
        let mut contribution = ConfigContribution {
            optimize_include: self.options.include.clone(),
            ..Default::default()
        };

        if self.options.component {
            contribution.stages.push(Arc::new(ComponentStage));
        }
        if self.options.jsx {
            contribution
                .stages
                .push(Arc::new(JsxStage::from_config(&self.options.jsx_options)?));
        }

        if let Some(site) = &config.site {
            if let Some(port) = site.webserver_port {
                contribution
                    .define
                    .insert(BACKEND_PORT_DEFINE.to_string(), port.to_string());
            }
            if let Some(port) = site.socketio_port {
                contribution
                    .define
                    .insert(SOCKETIO_PORT_DEFINE.to_string(), port.to_string());
            }
        }

        if !self.options.manual_chunks.is_empty() {
            contribution.target = Some(TargetPatch {
                manual_chunks: self.options.manual_chunks.clone(),
                ..Default::default()
            });
        }

        Ok(contribution)
    }
}
