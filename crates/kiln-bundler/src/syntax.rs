//! Parsing module code with oxc.

use kiln_config::Loader;
use oxc_allocator::Allocator;
use oxc_ast::ast::Program;
use oxc_parser::{Parser, ParserReturn};
use oxc_span::SourceType;

/// First error reported while parsing a module.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("syntax error at line {line}: {message}")]
pub struct SyntaxError {
    pub line: usize,
    pub message: String,
}

/// Parser dialect for a loader.
///
/// Component scripts are parsed as TypeScript since `lang="ts"` blocks are
/// common and plain script is a subset of it.
pub fn source_type(loader: Loader) -> SourceType {
    match loader {
        Loader::Ts | Loader::Vue => SourceType::ts(),
        Loader::Tsx => SourceType::tsx(),
        Loader::Jsx => SourceType::jsx(),
        Loader::Js | Loader::Json => SourceType::mjs(),
    }
}

/// Parse `code` as a module and hand the program to `f`.
///
/// The arena lives only for the duration of the call, so `f` must copy out
/// whatever it needs.
pub fn with_program<R>(
    code: &str,
    loader: Loader,
    f: impl for<'a> FnOnce(&Program<'a>) -> R,
) -> Result<R, SyntaxError> {
    let allocator = Allocator::default();
    let ParserReturn {
        program, errors, ..
    } = Parser::new(&allocator, code, source_type(loader)).parse();

    if let Some(error) = errors.first() {
        let offset = error
            .labels
            .as_ref()
            .and_then(|labels| labels.first())
            .map(|label| label.offset())
            .unwrap_or(0);
        return Err(SyntaxError {
            line: line_of(code, offset),
            message: error.message.to_string(),
        });
    }

    Ok(f(&program))
}

/// 1-based line of a byte offset.
pub fn line_of(code: &str, offset: usize) -> usize {
    let end = offset.min(code.len());
    code.as_bytes()[..end].iter().filter(|&&b| b == b'\n').count() + 1
}
