//! Node-style filesystem probing.

use std::path::{Path, PathBuf};

/// Extensions tried, in order, when a specifier omits one.
pub const EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "vue", "json"];

/// Probe `path` as a file: exact match, then each extension appended,
/// then `index.<ext>` inside a directory.
pub fn probe_file(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }

    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        for ext in EXTENSIONS {
            let candidate = path.with_file_name(format!("{name}.{ext}"));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }

    if path.is_dir() {
        for ext in EXTENSIONS {
            let candidate = path.join(format!("index.{ext}"));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }

    None
}

/// Find `node_modules/<package>` walking up from `start`.
pub fn find_package_dir(start: &Path, package: &str) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join("node_modules").join(package))
        .find(|candidate| candidate.is_dir())
}

/// Whether `path` lives inside a `node_modules` directory.
pub fn is_third_party(path: &Path) -> bool {
    path.components()
        .any(|c| c.as_os_str() == std::ffi::OsStr::new("node_modules"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn probes_extensions_in_order() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("table.js"), "").unwrap();
        fs::write(dir.path().join("table.ts"), "").unwrap();
        assert_eq!(
            probe_file(&dir.path().join("table")).unwrap(),
            dir.path().join("table.ts")
        );
    }

    #[test]
    fn probes_directory_index() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("widgets")).unwrap();
        fs::write(dir.path().join("widgets/index.vue"), "").unwrap();
        assert_eq!(
            probe_file(&dir.path().join("widgets")).unwrap(),
            dir.path().join("widgets/index.vue")
        );
        assert!(probe_file(&dir.path().join("missing")).is_none());
    }

    #[test]
    fn finds_packages_in_ancestor_node_modules() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("node_modules/showdown")).unwrap();
        fs::create_dir_all(dir.path().join("src/pages")).unwrap();
        let found = find_package_dir(&dir.path().join("src/pages"), "showdown").unwrap();
        assert_eq!(found, dir.path().join("node_modules/showdown"));
        assert!(is_third_party(&found));
        assert!(!is_third_party(&dir.path().join("src/pages")));
    }
}
