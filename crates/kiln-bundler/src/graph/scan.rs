//! Import discovery over the parsed module.

use oxc_ast::ast::{
    ExportAllDeclaration, ExportNamedDeclaration, Expression, ImportDeclaration, ImportExpression,
};
use oxc_ast_visit::{Visit, walk};

use kiln_config::Loader;

use crate::plugins::builtin::script_sources;
use crate::syntax::{SyntaxError, with_program};

/// How a dependency is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImportKind {
    /// `import x from 'mod'`
    Static,
    /// `import 'polyfill'`
    SideEffect,
    /// `export { x } from 'mod'`
    ReExport,
    /// `import('mod')` with a literal argument
    Dynamic,
}

/// One import found in a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRecord {
    pub specifier: String,
    pub kind: ImportKind,
    /// Byte offset of the `import`/`export` keyword in the scanned text
    pub offset: usize,
}

/// Imports of a module in source order, one record per specifier.
///
/// TypeScript `import type` / `export type` declarations are skipped since
/// they vanish at runtime. For components only `<script>` blocks are scanned.
pub fn scan_imports(code: &str, loader: Loader) -> Result<Vec<ImportRecord>, SyntaxError> {
    match loader {
        Loader::Json => Ok(Vec::new()),
        Loader::Vue => {
            let mut records = Vec::new();
            for script in script_sources(code) {
                for record in scan_script(script, loader)? {
                    if !records.iter().any(|r: &ImportRecord| r.specifier == record.specifier) {
                        records.push(record);
                    }
                }
            }
            Ok(records)
        }
        _ => scan_script(code, loader),
    }
}

fn scan_script(code: &str, loader: Loader) -> Result<Vec<ImportRecord>, SyntaxError> {
    let mut found = with_program(code, loader, |program| {
        let mut collector = ImportCollector::default();
        collector.visit_program(program);
        collector.found
    })?;

    found.sort_by_key(|r| r.offset);
    let mut records: Vec<ImportRecord> = Vec::with_capacity(found.len());
    for item in found {
        if !records.iter().any(|r| r.specifier == item.specifier) {
            records.push(item);
        }
    }
    Ok(records)
}

#[derive(Default)]
struct ImportCollector {
    found: Vec<ImportRecord>,
}

impl ImportCollector {
    fn push(&mut self, specifier: &str, kind: ImportKind, offset: u32) {
        self.found.push(ImportRecord {
            specifier: specifier.to_string(),
            kind,
            offset: offset as usize,
        });
    }
}

impl<'a> Visit<'a> for ImportCollector {
    fn visit_import_declaration(&mut self, decl: &ImportDeclaration<'a>) {
        if decl.import_kind.is_type() {
            return;
        }
        let kind = match &decl.specifiers {
            None => ImportKind::SideEffect,
            Some(_) => ImportKind::Static,
        };
        self.push(decl.source.value.as_str(), kind, decl.span.start);
    }

    fn visit_export_named_declaration(&mut self, decl: &ExportNamedDeclaration<'a>) {
        if let Some(source) = &decl.source {
            if !decl.export_kind.is_type() {
                self.push(source.value.as_str(), ImportKind::ReExport, decl.span.start);
            }
            return;
        }
        walk::walk_export_named_declaration(self, decl);
    }

    fn visit_export_all_declaration(&mut self, decl: &ExportAllDeclaration<'a>) {
        if !decl.export_kind.is_type() {
            self.push(decl.source.value.as_str(), ImportKind::ReExport, decl.span.start);
        }
    }

    fn visit_import_expression(&mut self, expr: &ImportExpression<'a>) {
        match &expr.source {
            Expression::StringLiteral(lit) => {
                self.push(lit.value.as_str(), ImportKind::Dynamic, expr.span.start);
            }
            // A template without substitutions is still a literal path.
            Expression::TemplateLiteral(tpl) if tpl.expressions.is_empty() => {
                if let Some(quasi) = tpl.quasis.first() {
                    self.push(quasi.value.raw.as_str(), ImportKind::Dynamic, expr.span.start);
                }
            }
            _ => {}
        }
        walk::walk_import_expression(self, expr);
    }
}
