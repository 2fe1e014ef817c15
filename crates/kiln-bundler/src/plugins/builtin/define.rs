use oxc_ast::ast::{
    Expression, IdentifierReference, MetaProperty, ObjectProperty, StaticMemberExpression,
};
use oxc_ast_visit::{Visit, walk};
use indexmap::IndexMap;

use crate::config::ResolvedConfig;
use crate::plugins::{Capabilities, ModuleSource, PluginStage, StageError};
use crate::syntax::with_program;

/// Compile-time constant replacement from the folded `define` table.
///
/// Only identifier references and member chains are rewritten; strings,
/// templates, comments and property names are left alone. For a chain like
/// `a.b.c` the longest defined prefix is replaced.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefineStage;

impl DefineStage {
    pub const NAME: &'static str = "define";
}

impl PluginStage for DefineStage {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::TRANSFORM
    }

    fn transform(
        &self,
        module: &ModuleSource,
        config: &ResolvedConfig,
    ) -> Result<Option<String>, StageError> {
        if config.define.is_empty() {
            return Ok(None);
        }

        let mut edits = with_program(&module.code, module.loader, |program| {
            let mut finder = DefinedRefs {
                define: &config.define,
                edits: Vec::new(),
            };
            finder.visit_program(program);
            finder.edits
        })
        .map_err(|err| StageError::new(err.to_string()))?;

        if edits.is_empty() {
            return Ok(None);
        }
        edits.sort_by_key(|edit| edit.start);

        let mut out = String::with_capacity(module.code.len());
        let mut last = 0;
        for edit in edits {
            out.push_str(&module.code[last..edit.start]);
            out.push_str(&edit.replacement);
            last = edit.end;
        }
        out.push_str(&module.code[last..]);
        Ok(Some(out))
    }
}

struct Edit {
    start: usize,
    end: usize,
    replacement: String,
}

/// Collects non-overlapping replacements; a matched node is not descended into.
struct DefinedRefs<'d> {
    define: &'d IndexMap<String, String>,
    edits: Vec<Edit>,
}

impl DefinedRefs<'_> {
    fn replace(&mut self, start: u32, end: u32, replacement: String) {
        self.edits.push(Edit {
            start: start as usize,
            end: end as usize,
            replacement,
        });
    }
}

impl<'a> Visit<'a> for DefinedRefs<'_> {
    fn visit_static_member_expression(&mut self, expr: &StaticMemberExpression<'a>) {
        let value = dotted_name(&expr.object)
            .map(|object| format!("{object}.{}", expr.property.name))
            .and_then(|chain| self.define.get(&chain).cloned());
        match value {
            Some(value) => self.replace(expr.span.start, expr.span.end, value),
            None => walk::walk_static_member_expression(self, expr),
        }
    }

    fn visit_meta_property(&mut self, meta: &MetaProperty<'a>) {
        let chain = format!("{}.{}", meta.meta.name, meta.property.name);
        if let Some(value) = self.define.get(&chain).cloned() {
            self.replace(meta.span.start, meta.span.end, value);
        }
    }

    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        if let Some(value) = self.define.get(ident.name.as_str()).cloned() {
            self.replace(ident.span.start, ident.span.end, value);
        }
    }

    // `{ DEBUG }` must keep its key when the value is replaced.
    fn visit_object_property(&mut self, prop: &ObjectProperty<'a>) {
        if prop.shorthand {
            if let Expression::Identifier(ident) = &prop.value {
                if let Some(value) = self.define.get(ident.name.as_str()) {
                    let replacement = format!("{}: {}", ident.name, value);
                    self.replace(prop.span.start, prop.span.end, replacement);
                    return;
                }
            }
        }
        walk::walk_object_property(self, prop);
    }
}

/// `a.b.c` for a chain of plain property accesses on an identifier or
/// `import.meta`.
fn dotted_name(expr: &Expression<'_>) -> Option<String> {
    match expr {
        Expression::Identifier(ident) => Some(ident.name.to_string()),
        Expression::MetaProperty(meta) => Some(format!("{}.{}", meta.meta.name, meta.property.name)),
        Expression::StaticMemberExpression(member) => {
            dotted_name(&member.object).map(|object| format!("{object}.{}", member.property.name))
        }
        _ => None,
    }
}
