//! Syntax-level platform checks.
//!
//! Emitted code is never downleveled. A module needing syntax above its
//! target's ceiling fails the build with the first offending feature.

use oxc_ast::ast::{
    ArrowFunctionExpression, AssignmentExpression, AssignmentOperator, AwaitExpression,
    BigIntLiteral, BinaryExpression, BinaryOperator, CatchClause, ChainExpression, Class,
    ForOfStatement, Function, LogicalExpression, LogicalOperator, NumericLiteral,
    ObjectAssignmentTarget, ObjectExpression, ObjectPattern, ObjectPropertyKind,
    PrivateIdentifier, StaticBlock, TemplateLiteral, VariableDeclaration,
    VariableDeclarationKind,
};
use oxc_ast_visit::{Visit, walk};
use oxc_semantic::ScopeFlags;
use oxc_span::Span;

use kiln_config::{Loader, PlatformLevel};

use crate::syntax::{SyntaxError, line_of, with_program};
use crate::{Error, Result};

/// A syntax feature found in a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Feature {
    pub name: &'static str,
    pub level: PlatformLevel,
    /// Byte offset in the checked source
    pub offset: usize,
}

/// Every feature occurrence that can be told apart from plain ES5, ordered
/// by position.
pub fn detect_features(source: &str, loader: Loader) -> std::result::Result<Vec<Feature>, SyntaxError> {
    let mut found = with_program(source, loader, |program| {
        let mut detector = FeatureDetector {
            source,
            found: Vec::new(),
        };
        detector.visit_program(program);
        detector.found
    })?;
    found.sort_by_key(|f| (f.offset, f.level));
    Ok(found)
}

/// Fail when `source` uses anything above `ceiling`.
///
/// `module` is the display id used in the error; the line of the first
/// offending feature is appended to it.
pub fn check_module(
    source: &str,
    loader: Loader,
    module: &str,
    target: &str,
    ceiling: PlatformLevel,
) -> Result<()> {
    let features = detect_features(source, loader).map_err(|error| Error::Syntax {
        module: module.to_string(),
        error,
    })?;
    let Some(violation) = features.into_iter().find(|f| f.level > ceiling) else {
        return Ok(());
    };

    Err(Error::PlatformCompatibility {
        target: target.to_string(),
        module: format!("{module}:{}", line_of(source, violation.offset)),
        feature: violation.name.to_string(),
        required: violation.level,
        ceiling,
    })
}

struct FeatureDetector<'s> {
    source: &'s str,
    found: Vec<Feature>,
}

impl FeatureDetector<'_> {
    fn record(&mut self, name: &'static str, level: PlatformLevel, span: Span) {
        self.found.push(Feature {
            name,
            level,
            offset: span.start as usize,
        });
    }

    fn has_separator(&self, span: Span) -> bool {
        self.source
            .get(span.start as usize..span.end as usize)
            .is_some_and(|raw| raw.contains('_'))
    }
}

impl<'a> Visit<'a> for FeatureDetector<'_> {
    fn visit_arrow_function_expression(&mut self, it: &ArrowFunctionExpression<'a>) {
        self.record("arrow functions", PlatformLevel::ES2015, it.span);
        if it.r#async {
            self.record("async functions", PlatformLevel::ES2017, it.span);
        }
        walk::walk_arrow_function_expression(self, it);
    }

    fn visit_function(&mut self, it: &Function<'a>, flags: ScopeFlags) {
        match (it.r#async, it.generator) {
            (true, true) => self.record("async generators", PlatformLevel::ES2018, it.span),
            (true, false) => self.record("async functions", PlatformLevel::ES2017, it.span),
            (false, true) => self.record("generators", PlatformLevel::ES2015, it.span),
            (false, false) => {}
        }
        walk::walk_function(self, it, flags);
    }

    fn visit_await_expression(&mut self, it: &AwaitExpression<'a>) {
        self.record("async functions", PlatformLevel::ES2017, it.span);
        walk::walk_await_expression(self, it);
    }

    fn visit_for_of_statement(&mut self, it: &ForOfStatement<'a>) {
        if it.r#await {
            self.record("async iteration", PlatformLevel::ES2018, it.span);
        }
        walk::walk_for_of_statement(self, it);
    }

    fn visit_variable_declaration(&mut self, it: &VariableDeclaration<'a>) {
        if matches!(
            it.kind,
            VariableDeclarationKind::Let | VariableDeclarationKind::Const
        ) {
            self.record("block-scoped declarations", PlatformLevel::ES2015, it.span);
        }
        walk::walk_variable_declaration(self, it);
    }

    fn visit_class(&mut self, it: &Class<'a>) {
        self.record("classes", PlatformLevel::ES2015, it.span);
        walk::walk_class(self, it);
    }

    fn visit_template_literal(&mut self, it: &TemplateLiteral<'a>) {
        self.record("template literals", PlatformLevel::ES2015, it.span);
        walk::walk_template_literal(self, it);
    }

    fn visit_binary_expression(&mut self, it: &BinaryExpression<'a>) {
        if it.operator == BinaryOperator::Exponential {
            self.record("exponentiation operator", PlatformLevel::ES2016, it.span);
        }
        walk::walk_binary_expression(self, it);
    }

    fn visit_assignment_expression(&mut self, it: &AssignmentExpression<'a>) {
        match it.operator {
            AssignmentOperator::Exponential => {
                self.record("exponentiation operator", PlatformLevel::ES2016, it.span)
            }
            AssignmentOperator::LogicalAnd
            | AssignmentOperator::LogicalOr
            | AssignmentOperator::LogicalNullish => {
                self.record("logical assignment", PlatformLevel::ES2021, it.span)
            }
            _ => {}
        }
        walk::walk_assignment_expression(self, it);
    }

    fn visit_object_expression(&mut self, it: &ObjectExpression<'a>) {
        for property in &it.properties {
            if let ObjectPropertyKind::SpreadProperty(spread) = property {
                self.record("object rest/spread", PlatformLevel::ES2018, spread.span);
            }
        }
        walk::walk_object_expression(self, it);
    }

    fn visit_object_pattern(&mut self, it: &ObjectPattern<'a>) {
        if let Some(rest) = &it.rest {
            self.record("object rest/spread", PlatformLevel::ES2018, rest.span);
        }
        walk::walk_object_pattern(self, it);
    }

    fn visit_object_assignment_target(&mut self, it: &ObjectAssignmentTarget<'a>) {
        if let Some(rest) = &it.rest {
            self.record("object rest/spread", PlatformLevel::ES2018, rest.span);
        }
        walk::walk_object_assignment_target(self, it);
    }

    fn visit_catch_clause(&mut self, it: &CatchClause<'a>) {
        if it.param.is_none() {
            self.record("optional catch binding", PlatformLevel::ES2019, it.span);
        }
        walk::walk_catch_clause(self, it);
    }

    fn visit_chain_expression(&mut self, it: &ChainExpression<'a>) {
        self.record("optional chaining", PlatformLevel::ES2020, it.span);
        walk::walk_chain_expression(self, it);
    }

    fn visit_logical_expression(&mut self, it: &LogicalExpression<'a>) {
        if it.operator == LogicalOperator::Coalesce {
            self.record("nullish coalescing", PlatformLevel::ES2020, it.span);
        }
        walk::walk_logical_expression(self, it);
    }

    fn visit_big_int_literal(&mut self, it: &BigIntLiteral<'a>) {
        self.record("BigInt literals", PlatformLevel::ES2020, it.span);
        if self.has_separator(it.span) {
            self.record("numeric separators", PlatformLevel::ES2021, it.span);
        }
    }

    fn visit_numeric_literal(&mut self, it: &NumericLiteral<'a>) {
        if self.has_separator(it.span) {
            self.record("numeric separators", PlatformLevel::ES2021, it.span);
        }
    }

    fn visit_private_identifier(&mut self, it: &PrivateIdentifier<'a>) {
        self.record("private class members", PlatformLevel::ES2022, it.span);
    }

    fn visit_static_block(&mut self, it: &StaticBlock<'a>) {
        self.record("class static blocks", PlatformLevel::ES2022, it.span);
        walk::walk_static_block(self, it);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(src: &str) -> Vec<&'static str> {
        detect_features(src, Loader::Js)
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect()
    }

    #[test]
    fn detects_feature_levels() {
        assert_eq!(names("const f = (a) => a ** 2;"), vec![
            "block-scoped declarations",
            "arrow functions",
            "exponentiation operator"
        ]);
        assert_eq!(names("x = c ?? a?.b"), vec!["nullish coalescing", "optional chaining"]);
        assert_eq!(names("x ??= 1; y ||= 2"), vec!["logical assignment", "logical assignment"]);
        assert_eq!(names("try { f() } catch { }"), vec!["optional catch binding"]);
        assert_eq!(names("var big = 10n, n = 1_000"), vec!["BigInt literals", "numeric separators"]);
        assert_eq!(names("function* ids() { yield 1 }"), vec!["generators"]);
        assert_eq!(names("async function load() { await get() }"), vec!["async functions", "async functions"]);
    }

    #[test]
    fn object_spread_differs_from_array_spread() {
        assert_eq!(names("f(...args); var a = [...b]"), Vec::<&str>::new());
        assert_eq!(names("var o = { ...defaults, a: 1 }"), vec!["object rest/spread"]);
        assert_eq!(names("var { a, ...rest } = o"), vec!["object rest/spread"]);
    }

    #[test]
    fn ternaries_and_literals_are_not_features() {
        assert!(names("var x = ok ?.5 : 1").is_empty());
        assert!(names("var s = 'a?.b ?? c => d'; // x?.y\n/* a ** b */").is_empty());
        assert!(names("var re = /a??/;").is_empty());
    }

    #[test]
    fn hashbang_is_not_a_private_member() {
        assert!(names("#!/usr/bin/env node\nvar a = 1;").is_empty());
    }

    #[test]
    fn private_members_and_static_blocks() {
        let found = detect_features("class A { #secret = 1; static { init() } }", Loader::Js).unwrap();
        let levels: Vec<_> = found.iter().map(|f| f.level).collect();
        assert!(levels.contains(&PlatformLevel::ES2022));
    }

    #[test]
    fn violation_names_module_line_and_levels() {
        let src = "var a = 1;\nvar b = a?.c;\n";
        let err = check_module(src, Loader::Ts, "src/api.ts", "embedded", PlatformLevel::ES2015)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "src/api.ts:2 uses optional chaining (es2020) but target `embedded` is limited to es2015"
        );
        assert!(check_module(src, Loader::Ts, "src/api.ts", "standalone", PlatformLevel::ES2020).is_ok());
    }

    #[test]
    fn division_after_postfix_increment_does_not_hide_later_code() {
        let src = "var i = 0;\nvar n = i++ / 2, y = a?.b;\n";
        let err = check_module(src, Loader::Js, "src/a.js", "embedded", PlatformLevel::ES2015)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "src/a.js:2 uses optional chaining (es2020) but target `embedded` is limited to es2015"
        );
    }

    #[test]
    fn regex_literals_are_not_features() {
        assert!(names("var r = /a=>b/g, s = /`/;").is_empty());
        assert_eq!(names("var q = x / y / z; var t = `a`;"), vec!["template literals"]);
    }

    #[test]
    fn type_annotations_are_parsed_with_the_module_loader() {
        let src = "export function f(a: number): number { return a ** 2 }";
        let found = detect_features(src, Loader::Ts).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].level, PlatformLevel::ES2016);

        let err = check_module(src, Loader::Js, "src/f.js", "embedded", PlatformLevel::ES2015)
            .unwrap_err();
        assert!(matches!(err, Error::Syntax { .. }));
    }
}
