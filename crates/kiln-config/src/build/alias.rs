use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One import alias, matched in declaration order.
///
/// `find` matches a specifier that equals it or that continues with `/`
/// after it. `@` therefore matches `@/widgets/table` but not `@vue/shared`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasOptions {
    pub find: String,

    /// Absolute path, path relative to `build.root`, or a bare package specifier
    pub replacement: PathBuf,
}

impl AliasOptions {
    pub fn new(find: impl Into<String>, replacement: impl Into<PathBuf>) -> Self {
        Self {
            find: find.into(),
            replacement: replacement.into(),
        }
    }
}
