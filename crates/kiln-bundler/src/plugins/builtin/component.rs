use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::ResolvedConfig;
use crate::plugins::{Capabilities, ModuleSource, PluginStage, StageError};
use kiln_config::Loader;

static SCRIPT_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<script(\s[^>]*)?>(.*?)</script>")
        .unwrap_or_else(|e| panic!("BUG: invalid script block regex: {}", e))
});
static STYLE_OPEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<style(\s[^>]*)?>")
        .unwrap_or_else(|e| panic!("BUG: invalid style tag regex: {}", e))
});

/// Single-file component transformer.
///
/// Keeps the script body as the module code and exposes the template and
/// style scoping as named exports for the runtime compiler.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComponentStage;

impl ComponentStage {
    pub const NAME: &'static str = "component";
}

impl PluginStage for ComponentStage {
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
        if module.loader != Loader::Vue {
            return Ok(None);
        }

        let parsed = parse_component(&module.code)?;
        let mut code = String::new();
        if parsed.scripts.is_empty() {
            code.push_str("export default {};\n");
        } else {
            for script in &parsed.scripts {
                code.push_str(script.trim_matches('\n'));
                code.push('\n');
            }
        }

        let template = parsed.template.unwrap_or_default();
        code.push_str(&format!(
            "export const __template = {};\n",
            js_string_literal(template.trim())
        ));
        code.push_str(&format!("export const __scoped = {};\n", parsed.scoped));

        Ok(Some(code))
    }
}

/// Bodies of every `<script>` block, for import discovery.
pub(crate) fn script_sources(source: &str) -> Vec<&str> {
    SCRIPT_BLOCK
        .captures_iter(source)
        .filter_map(|caps| caps.get(2).map(|m| m.as_str()))
        .collect()
}

#[derive(Debug, Default)]
struct ParsedComponent<'a> {
    scripts: Vec<&'a str>,
    template: Option<&'a str>,
    scoped: bool,
}

fn parse_component(source: &str) -> Result<ParsedComponent<'_>, StageError> {
    let scripts = script_sources(source);

    let template = template_block(source)?;

    if scripts.is_empty() && template.is_none() {
        return Err(StageError::new(
            "component has neither a <script> nor a <template> block",
        ));
    }

    let scoped = STYLE_OPEN.captures_iter(source).any(|caps| {
        caps.get(1)
            .is_some_and(|attrs| attrs.as_str().split_whitespace().any(|a| a == "scoped"))
    });

    Ok(ParsedComponent {
        scripts,
        template,
        scoped,
    })
}

/// Content of the outermost `<template>` block. Nested templates stay inside it.
fn template_block(source: &str) -> Result<Option<&str>, StageError> {
    let Some(open) = source.find("<template") else {
        return Ok(None);
    };
    let body_start = source[open..]
        .find('>')
        .map(|idx| open + idx + 1)
        .ok_or_else(|| StageError::new("unterminated <template> tag"))?;
    let close = source
        .rfind("</template>")
        .filter(|&idx| idx >= body_start)
        .ok_or_else(|| StageError::new("<template> block is never closed"))?;
    Ok(Some(&source[body_start..close]))
}

/// JSON string escaping plus the two line terminators JSON allows but
/// pre-2019 JavaScript string literals do not.
fn js_string_literal(value: &str) -> String {
    serde_json::Value::String(value.to_string())
        .to_string()
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildMode;
    use kiln_config::BuildOptions;
    use std::path::Path;

    fn run(source: &str) -> Result<Option<String>, StageError> {
        let config = ResolvedConfig::from_options(
            &BuildOptions::default(),
            Path::new("/app"),
            None,
            BuildMode::Build,
        );
        let module = ModuleSource::new("/app/src/Report.vue", Loader::Vue, source);
        ComponentStage.transform(&module, &config)
    }

    #[test]
    fn emits_script_template_and_scope() {
        let out = run(r#"<template>
  <div class="report">{{ title }}</div>
</template>

<script setup>
import { ref } from 'vue'
const title = ref("Sales")
</script>

<style scoped>
.report { color: red; }
</style>
"#)
        .unwrap()
        .unwrap();

        assert!(out.starts_with("import { ref } from 'vue'"));
        assert!(out.contains(r#"export const __template = "<div class=\"report\">{{ title }}</div>";"#));
        assert!(out.contains("export const __scoped = true;"));
    }

    #[test]
    fn nested_templates_stay_in_the_outer_block() {
        let out = run("<template><ul><template v-for=\"r in rows\"><li/></template></ul></template>")
            .unwrap()
            .unwrap();
        assert!(out.contains("export default {};"));
        assert!(out.contains(r#"<ul><template v-for=\"r in rows\"><li/></template></ul>"#));
        assert!(out.contains("export const __scoped = false;"));
    }

    #[test]
    fn component_without_blocks_fails() {
        let err = run("<style>.a{}</style>").unwrap_err();
        assert!(err.message.contains("neither"));
    }

    #[test]
    fn non_component_modules_pass_through() {
        let config = ResolvedConfig::from_options(
            &BuildOptions::default(),
            Path::new("/app"),
            None,
            BuildMode::Build,
        );
        let module = ModuleSource::new("/app/src/main.ts", Loader::Ts, "export {}");
        assert_eq!(ComponentStage.transform(&module, &config).unwrap(), None);
    }
}
