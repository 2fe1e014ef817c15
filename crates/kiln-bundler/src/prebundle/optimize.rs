//! Producing one optimized artifact per third-party import.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use kiln_config::Loader;
use path_clean::PathClean;
use rustc_hash::FxHashSet;

use super::PrebundleError;
use crate::graph::scan_imports;
use crate::resolve::node::probe_file;

/// Flatten `entry` and its relative-import closure into one source.
///
/// Files are concatenated in discovery order, each behind a
/// `// <path relative to the package root>` marker. Imports of other packages
/// are left in place. A relative import that escapes the package or does not
/// exist fails the dependency.
pub fn flatten_package(id: &str, name: &str, entry: &Path) -> Result<String, PrebundleError> {
    let root = package_root(entry, name);
    let mut seen = FxHashSet::default();
    let mut queue = VecDeque::from([entry.to_path_buf()]);
    let mut out = String::new();

    while let Some(file) = queue.pop_front() {
        if !seen.insert(file.clone()) {
            continue;
        }
        let code = fs::read_to_string(&file).map_err(|source| PrebundleError::Io {
            action: "read",
            path: file.clone(),
            source,
        })?;

        let loader = file
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Loader::for_extension)
            .unwrap_or(Loader::Js);

        let records = scan_imports(&code, loader).map_err(|err| PrebundleError::Dependency {
            name: id.to_string(),
            reason: format!("{}: {err}", file.display()),
        })?;
        for record in records {
            if !record.specifier.starts_with("./") && !record.specifier.starts_with("../") {
                continue;
            }
            let base = file.parent().unwrap_or(&root);
            let candidate = base.join(&record.specifier).clean();
            if !candidate.starts_with(&root) {
                return Err(PrebundleError::Dependency {
                    name: id.to_string(),
                    reason: format!("`{}` escapes the package directory", record.specifier),
                });
            }
            let target = probe_file(&candidate).ok_or_else(|| PrebundleError::Dependency {
                name: id.to_string(),
                reason: format!(
                    "`{}` imported from {} does not exist",
                    record.specifier,
                    file.display()
                ),
            })?;
            queue.push_back(target);
        }

        let rel = file.strip_prefix(&root).unwrap_or(&file);
        out.push_str(&format!("// {}\n", rel.to_string_lossy().replace('\\', "/")));
        if loader == Loader::Json {
            out.push_str(&format!("export default {};\n", code.trim()));
        } else {
            out.push_str(&code);
            if !code.ends_with('\n') {
                out.push('\n');
            }
        }
    }

    Ok(out)
}

/// `node_modules/<name>` above `entry`, or the entry's directory.
pub fn package_root(entry: &Path, name: &str) -> PathBuf {
    entry
        .ancestors()
        .find(|dir| dir.ends_with(name) && dir.join("package.json").is_file())
        .or_else(|| {
            entry
                .ancestors()
                .find(|dir| dir.parent().is_some_and(|p| p.ends_with("node_modules")))
        })
        .map(Path::to_path_buf)
        .unwrap_or_else(|| entry.parent().unwrap_or(entry).to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn concatenates_relative_closure_in_discovery_order() {
        let dir = TempDir::new().unwrap();
        let pkg = dir.path().join("node_modules/showdown");
        write(&pkg, "package.json", r#"{ "name": "showdown" }"#);
        write(&pkg, "dist/index.js", "import './a.js'\nimport { x } from './b'\nimport vue from 'vue'\n");
        write(&pkg, "dist/a.js", "import './b.js'\nexport const a = 1;");
        write(&pkg, "dist/b.js", "export const x = 2;\n");

        let out = flatten_package("showdown", "showdown", &pkg.join("dist/index.js")).unwrap();
        let markers: Vec<&str> = out.lines().filter(|l| l.starts_with("// ")).collect();
        assert_eq!(markers, vec!["// dist/index.js", "// dist/a.js", "// dist/b.js"]);
        assert!(out.contains("import vue from 'vue'"));
    }

    #[test]
    fn missing_relative_import_fails_the_dependency() {
        let dir = TempDir::new().unwrap();
        let pkg = dir.path().join("node_modules/broken");
        write(&pkg, "package.json", "{}");
        write(&pkg, "index.js", "import './gone'\n");
        let err = flatten_package("broken", "broken", &pkg.join("index.js")).unwrap_err();
        assert!(matches!(err, PrebundleError::Dependency { ref name, .. } if name == "broken"));
    }

    #[test]
    fn finds_scoped_package_root() {
        let dir = TempDir::new().unwrap();
        let pkg = dir.path().join("node_modules/@vue/shared");
        write(&pkg, "package.json", "{}");
        write(&pkg, "dist/shared.esm.js", "");
        assert_eq!(package_root(&pkg.join("dist/shared.esm.js"), "@vue/shared"), pkg);
    }
}
