use oxc_ast::ast::{ImportDeclaration, ImportDeclarationSpecifier, JSXElement, JSXFragment};
use oxc_ast_visit::{Visit, walk};
use serde::Deserialize;
use serde_json::Value;

use super::stage_options;
use crate::config::ResolvedConfig;
use crate::plugins::{Capabilities, ModuleSource, PluginStage, StageError};
use crate::syntax::with_program;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JsxOptions {
    /// Module the factory and fragment are imported from
    pub import_source: String,
    pub factory: String,
    pub fragment: String,
}

impl Default for JsxOptions {
    fn default() -> Self {
        Self {
            import_source: "vue".to_string(),
            factory: "h".to_string(),
            fragment: "Fragment".to_string(),
        }
    }
}

/// JSX-like transformer.
///
/// Marks JSX modules with the factory pragma and makes sure the factory is
/// imported, so the downstream JSX compiler emits calls against it.
#[derive(Debug, Clone, Default)]
pub struct JsxStage {
    options: JsxOptions,
}

impl JsxStage {
    pub const NAME: &'static str = "jsx";

    pub fn new(options: JsxOptions) -> Self {
        Self { options }
    }

    pub fn from_config(config: &Value) -> Result<Self, StageError> {
        stage_options(Self::NAME, config).map(Self::new)
    }
}

/// Whether a module renders elements and already imports the factory.
struct JsxUsage<'o> {
    options: &'o JsxOptions,
    has_elements: bool,
    imports_factory: bool,
}

impl<'a> Visit<'a> for JsxUsage<'_> {
    fn visit_import_declaration(&mut self, decl: &ImportDeclaration<'a>) {
        if decl.source.value.as_str() != self.options.import_source {
            return;
        }
        let Some(specifiers) = &decl.specifiers else {
            return;
        };
        self.imports_factory |= specifiers.iter().any(|spec| {
            matches!(spec, ImportDeclarationSpecifier::ImportSpecifier(named)
                if named.local.name.as_str() == self.options.factory)
        });
    }

    fn visit_jsx_element(&mut self, element: &JSXElement<'a>) {
        self.has_elements = true;
        walk::walk_jsx_element(self, element);
    }

    fn visit_jsx_fragment(&mut self, fragment: &JSXFragment<'a>) {
        self.has_elements = true;
        walk::walk_jsx_fragment(self, fragment);
    }
}

impl PluginStage for JsxStage {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::TRANSFORM
    }

    fn transform(
        &self,
        module: &ModuleSource,
        _config: &ResolvedConfig,
    ) -> Result<Option<String>, StageError> {
        if !module.loader.allows_jsx() {
            return Ok(None);
        }
        let (has_elements, imports_factory) = with_program(&module.code, module.loader, |program| {
            let mut usage = JsxUsage {
                options: &self.options,
                has_elements: false,
                imports_factory: false,
            };
            usage.visit_program(program);
            (usage.has_elements, usage.imports_factory)
        })
        .map_err(|err| StageError::new(err.to_string()))?;
        if !has_elements {
            return Ok(None);
        }

        let JsxOptions {
            import_source,
            factory,
            fragment,
        } = &self.options;

        let mut code = format!("/** @jsx {factory} */\n/** @jsxFrag {fragment} */\n");
        if !imports_factory {
            code.push_str(&format!(
                "import {{ {factory}, {fragment} }} from \"{import_source}\";\n"
            ));
        }
        code.push_str(&module.code);
        Ok(Some(code))
    }
}
