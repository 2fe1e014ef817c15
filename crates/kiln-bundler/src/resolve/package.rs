//! `package.json` reading and entry selection.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use path_clean::PathClean;
use serde::Deserialize;
use serde_json::Value;

use super::node::probe_file;

/// The subset of `package.json` the resolver and fingerprinting read.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageJson {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub main: Option<String>,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub browser: Option<Value>,
    #[serde(default)]
    pub exports: Option<Value>,
    #[serde(default)]
    pub dependencies: IndexMap<String, String>,
    #[serde(default, rename = "devDependencies")]
    pub dev_dependencies: IndexMap<String, String>,
    #[serde(default, rename = "peerDependencies")]
    pub peer_dependencies: IndexMap<String, String>,
}

impl PackageJson {
    pub fn read(dir: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(dir.join("package.json")).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Whether `name` appears in any dependency table.
    pub fn declares(&self, name: &str) -> bool {
        self.dependencies.contains_key(name)
            || self.dev_dependencies.contains_key(name)
            || self.peer_dependencies.contains_key(name)
    }

    /// Entry file of the package rooted at `dir`.
    ///
    /// Priority: `exports["."]` > `module` > `browser` (string form) > `main` > `index.js`.
    pub fn entry(&self, dir: &Path) -> Option<PathBuf> {
        let candidates = [
            self.exports.as_ref().and_then(root_export),
            self.module.clone(),
            self.browser.as_ref().and_then(|b| b.as_str().map(str::to_string)),
            self.main.clone(),
        ];

        candidates
            .into_iter()
            .flatten()
            .find_map(|rel| probe_file(&dir.join(rel).clean()))
            .or_else(|| probe_file(&dir.join("index.js")))
    }

    /// Target of a subpath export such as `./chart`, when `exports` maps it.
    pub fn subpath_export(&self, subpath: &str) -> Option<String> {
        let exports = self.exports.as_ref()?.as_object()?;
        let key = format!("./{subpath}");
        exports.get(&key).and_then(condition_target)
    }
}

fn root_export(exports: &Value) -> Option<String> {
    match exports {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => match map.get(".") {
            Some(root) => condition_target(root),
            // Conditions directly at the top level: `{ "import": "...", "default": "..." }`
            None if !map.keys().any(|k| k.starts_with('.')) => condition_target(exports),
            None => None,
        },
        _ => None,
    }
}

fn condition_target(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => ["import", "browser", "default"]
            .iter()
            .find_map(|cond| map.get(*cond).and_then(condition_target)),
        _ => None,
    }
}

/// Split a bare specifier into package name and optional subpath.
///
/// `@scope/pkg/sub/file` gives (`@scope/pkg`, `Some("sub/file")`).
pub fn split_bare_specifier(specifier: &str) -> (&str, Option<&str>) {
    let boundary = if specifier.starts_with('@') {
        specifier
            .match_indices('/')
            .nth(1)
            .map(|(idx, _)| idx)
    } else {
        specifier.find('/')
    };

    match boundary {
        Some(idx) => (&specifier[..idx], Some(&specifier[idx + 1..])),
        None => (specifier, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn package(value: Value) -> PackageJson {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn splits_scoped_and_plain_specifiers() {
        assert_eq!(split_bare_specifier("vue"), ("vue", None));
        assert_eq!(split_bare_specifier("vendor/chart"), ("vendor", Some("chart")));
        assert_eq!(split_bare_specifier("@vue/shared"), ("@vue/shared", None));
        assert_eq!(
            split_bare_specifier("@scope/pkg/sub/file"),
            ("@scope/pkg", Some("sub/file"))
        );
    }

    #[test]
    fn exports_take_priority_over_main() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("dist")).unwrap();
        fs::write(dir.path().join("dist/index.mjs"), "export {}").unwrap();
        fs::write(dir.path().join("main.js"), "module.exports = {}").unwrap();

        let pkg = package(json!({
            "main": "main.js",
            "exports": { ".": { "require": "./main.js", "import": "./dist/index.mjs" } }
        }));
        assert_eq!(pkg.entry(dir.path()).unwrap(), dir.path().join("dist/index.mjs"));
    }

    #[test]
    fn module_field_beats_main_and_index_is_last_resort() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("esm.js"), "export {}").unwrap();
        fs::write(dir.path().join("index.js"), "export {}").unwrap();

        let pkg = package(json!({ "main": "missing.js", "module": "esm.js" }));
        assert_eq!(pkg.entry(dir.path()).unwrap(), dir.path().join("esm.js"));

        let bare = package(json!({ "main": "missing.js" }));
        assert_eq!(bare.entry(dir.path()).unwrap(), dir.path().join("index.js"));
    }

    #[test]
    fn subpath_exports_use_conditions() {
        let pkg = package(json!({
            "exports": { "./chart": { "default": "./lib/chart.js" } }
        }));
        assert_eq!(pkg.subpath_export("chart").as_deref(), Some("./lib/chart.js"));
        assert_eq!(pkg.subpath_export("table"), None);
    }
}
