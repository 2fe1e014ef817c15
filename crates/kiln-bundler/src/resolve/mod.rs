//! Import specifier resolution.
//!
//! Aliases are tried first, in declaration order. The first matching rule
//! decides the outcome: a rule whose target is missing on disk is a
//! resolution error, never a fallback to the next rule or to node-style
//! lookup.

pub mod node;
pub mod package;

use std::path::{Path, PathBuf};

use kiln_config::AliasOptions;
use path_clean::PathClean;

use crate::{Error, Result};
use node::{find_package_dir, is_third_party, probe_file};
use package::{PackageJson, split_bare_specifier};

/// Where an alias rewrites to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AliasTarget {
    /// Absolute filesystem location
    Path(PathBuf),
    /// Bare package specifier, resolved through `node_modules`
    Package(String),
}

/// One `(pattern, replacement)` rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasRule {
    pub find: String,
    pub target: AliasTarget,
}

impl AliasRule {
    pub fn new(find: impl Into<String>, target: AliasTarget) -> Self {
        Self {
            find: find.into(),
            target,
        }
    }

    /// Build a rule from configuration.
    ///
    /// The replacement is classified by its shape, never by whether the
    /// target exists:
    /// - absolute, or starting with `.` or `/`: a path
    /// - scoped (`@scope/pkg`, optionally with a subpath): a package
    /// - otherwise a package if its first segment is declared in
    ///   `<root>/package.json`, and a path under `root` if not
    pub fn from_options(options: &AliasOptions, root: &Path) -> Self {
        let replacement = &options.replacement;
        let raw = replacement.to_string_lossy().replace('\\', "/");

        let target = if replacement.is_absolute() {
            AliasTarget::Path(replacement.clean())
        } else if raw.starts_with('.') || raw.starts_with('/') || !names_package(&raw, root) {
            AliasTarget::Path(root.join(replacement).clean())
        } else {
            AliasTarget::Package(raw)
        };

        Self::new(options.find.clone(), target)
    }

    /// Remainder of `specifier` after the pattern, if the rule applies.
    ///
    /// `@` matches `@` and `@/widgets/table`, never `@vue/shared`.
    pub fn matches<'a>(&self, specifier: &'a str) -> Option<&'a str> {
        let rest = specifier.strip_prefix(self.find.as_str())?;
        if rest.is_empty() {
            Some(rest)
        } else {
            rest.strip_prefix('/')
        }
    }
}

fn names_package(replacement: &str, root: &Path) -> bool {
    if let Some(scoped) = replacement.strip_prefix('@') {
        // `@/src` is a path shorthand, not a scope
        let mut parts = scoped.split('/');
        return matches!((parts.next(), parts.next()), (Some(scope), Some(name)) if !scope.is_empty() && !name.is_empty());
    }
    let (name, _) = split_bare_specifier(replacement);
    PackageJson::read(root).is_some_and(|pkg| pkg.declares(name))
}

/// Outcome of resolving one import.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resolved {
    /// First-party source file
    Module(PathBuf),
    /// Third-party file inside `node_modules`
    Package {
        /// Import id, `name` or `name/subpath`
        id: String,
        name: String,
        path: PathBuf,
    },
    /// Left as a runtime import
    External(String),
}

impl Resolved {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Resolved::Module(path) | Resolved::Package { path, .. } => Some(path),
            Resolved::External(_) => None,
        }
    }
}

/// Resolves import specifiers against an ordered alias list, then node-style.
#[derive(Debug, Clone)]
pub struct AliasResolver {
    root: PathBuf,
    rules: Vec<AliasRule>,
    external: Vec<String>,
}

impl AliasResolver {
    pub fn new(root: impl Into<PathBuf>, rules: Vec<AliasRule>, external: Vec<String>) -> Self {
        Self {
            root: root.into(),
            rules,
            external,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn rules(&self) -> &[AliasRule] {
        &self.rules
    }

    /// Resolve `specifier` as imported from the module at `importer`.
    pub fn resolve(&self, specifier: &str, importer: &Path) -> Result<Resolved> {
        if self.is_external(specifier) {
            return Ok(Resolved::External(specifier.to_string()));
        }

        let matched = self
            .rules
            .iter()
            .find_map(|rule| rule.matches(specifier).map(|rest| (rule, rest)));
        if let Some((rule, rest)) = matched {
            return self.resolve_alias(rule, rest, specifier, importer);
        }

        self.resolve_plain(specifier, importer)
    }

    fn resolve_alias(
        &self,
        rule: &AliasRule,
        rest: &str,
        specifier: &str,
        importer: &Path,
    ) -> Result<Resolved> {
        match &rule.target {
            AliasTarget::Path(base) => {
                let candidate = if rest.is_empty() {
                    base.clone()
                } else {
                    base.join(rest).clean()
                };
                tracing::trace!(specifier, find = %rule.find, candidate = %candidate.display(), "alias matched");
                probe_file(&candidate)
                    .map(|path| self.classify(path))
                    .ok_or_else(|| {
                        Error::resolution(
                            specifier,
                            importer,
                            format!(
                                "alias `{}` points at {}, which does not exist",
                                rule.find,
                                candidate.display()
                            ),
                        )
                    })
            }
            AliasTarget::Package(package) => {
                let rewritten = if rest.is_empty() {
                    package.clone()
                } else {
                    format!("{package}/{rest}")
                };
                if self.is_external(&rewritten) {
                    return Ok(Resolved::External(rewritten));
                }
                self.resolve_bare(&rewritten, importer).map_err(|err| match err {
                    Error::Resolution { reason, .. } => Error::resolution(
                        specifier,
                        importer,
                        format!("alias `{}` -> `{}`: {}", rule.find, rewritten, reason),
                    ),
                    other => other,
                })
            }
        }
    }

    fn resolve_plain(&self, specifier: &str, importer: &Path) -> Result<Resolved> {
        let path = Path::new(specifier);

        if is_relative(specifier) {
            let base = importer.parent().unwrap_or(&self.root);
            let candidate = base.join(path).clean();
            return probe_file(&candidate)
                .map(|found| self.classify(found))
                .ok_or_else(|| {
                    Error::resolution(
                        specifier,
                        importer,
                        format!("{} does not exist", candidate.display()),
                    )
                });
        }

        if path.is_absolute() {
            return probe_file(path)
                .map(|found| self.classify(found))
                .ok_or_else(|| Error::resolution(specifier, importer, "file does not exist"));
        }

        self.resolve_bare(specifier, importer)
    }

    fn resolve_bare(&self, specifier: &str, importer: &Path) -> Result<Resolved> {
        let (name, subpath) = split_bare_specifier(specifier);
        let start = importer.parent().unwrap_or(&self.root);

        let dir = find_package_dir(start, name)
            .or_else(|| find_package_dir(&self.root, name))
            .ok_or_else(|| {
                Error::resolution(
                    specifier,
                    importer,
                    format!("package `{name}` is not installed"),
                )
            })?;

        let manifest = PackageJson::read(&dir).unwrap_or_default();
        let path = match subpath {
            None => manifest.entry(&dir),
            Some(sub) => manifest
                .subpath_export(sub)
                .and_then(|target| probe_file(&dir.join(target).clean()))
                .or_else(|| probe_file(&dir.join(sub))),
        };

        let path = path.ok_or_else(|| {
            Error::resolution(
                specifier,
                importer,
                format!("package `{name}` has no usable entry in {}", dir.display()),
            )
        })?;

        Ok(Resolved::Package {
            id: specifier.to_string(),
            name: name.to_string(),
            path,
        })
    }

    fn classify(&self, path: PathBuf) -> Resolved {
        if !is_third_party(&path) {
            return Resolved::Module(path);
        }
        let id = package_id_from_path(&path);
        let (name, _) = split_bare_specifier(&id);
        Resolved::Package {
            name: name.to_string(),
            id,
            path,
        }
    }

    /// Exact match or `pkg/...` prefix against `build.external`.
    pub fn is_external(&self, specifier: &str) -> bool {
        self.external.iter().any(|ext| {
            specifier == ext
                || specifier
                    .strip_prefix(ext.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }
}

fn is_relative(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
}

/// `.../node_modules/vendor/chart.js` gives `vendor/chart`.
fn package_id_from_path(path: &Path) -> String {
    let parts: Vec<String> = path
        .with_extension("")
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    let start = parts
        .iter()
        .rposition(|p| p == "node_modules")
        .map(|idx| idx + 1)
        .unwrap_or(0);
    parts[start..].join("/")
}
