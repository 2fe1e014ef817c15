//! Dependency-set fingerprint (BLAKE3).
//!
//! The fingerprint covers everything that changes what the pre-bundler
//! would produce for the declared dependencies:
//! 1. Cache format and kiln version
//! 2. Sorted `dependencies` with declared range and installed version
//! 3. Lockfile contents (first lockfile found)
//! 4. Sorted `optimize_deps.include` / `exclude`

use std::fs;
use std::path::Path;

use blake3::Hasher;
use kiln_config::OptimizeDepsOptions;

use super::PrebundleError;
use crate::resolve::node::find_package_dir;
use crate::resolve::package::PackageJson;

/// Current cache format version. Increment when the artifact layout changes.
pub const CACHE_FORMAT_VERSION: u32 = 1;

pub const KILN_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Lockfiles consulted, in order.
pub const LOCKFILES: &[&str] = &["package-lock.json", "yarn.lock", "pnpm-lock.yaml", "bun.lockb"];

/// Hex length of the fingerprint used as a directory name.
const FINGERPRINT_LEN: usize = 16;

pub fn compute(root: &Path, options: &OptimizeDepsOptions) -> Result<String, PrebundleError> {
    let mut hasher = Hasher::new();

    hasher.update(&CACHE_FORMAT_VERSION.to_le_bytes());
    hasher.update(KILN_VERSION.as_bytes());

    hash_dependencies(&mut hasher, root)?;
    hash_lockfile(&mut hasher, root)?;

    for list in [&options.include, &options.exclude] {
        let mut sorted: Vec<&str> = list.iter().map(String::as_str).collect();
        sorted.sort_unstable();
        sorted.dedup();
        for name in sorted {
            hasher.update(name.as_bytes());
            hasher.update(b"\0");
        }
        hasher.update(b"\x01");
    }

    let hex = hasher.finalize().to_hex();
    Ok(hex.as_str()[..FINGERPRINT_LEN].to_string())
}

fn hash_dependencies(hasher: &mut Hasher, root: &Path) -> Result<(), PrebundleError> {
    let manifest_path = root.join("package.json");
    let manifest: PackageJson = match fs::read_to_string(&manifest_path) {
        Ok(content) => serde_json::from_str(&content).map_err(|e| PrebundleError::Metadata {
            path: manifest_path.clone(),
            message: e.to_string(),
        })?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(source) => {
            return Err(PrebundleError::Io {
                action: "read",
                path: manifest_path,
                source,
            });
        }
    };

    let mut deps: Vec<(&String, &String)> = manifest.dependencies.iter().collect();
    deps.sort();

    for (name, range) in deps {
        let installed = installed_version(root, name).unwrap_or_default();
        hasher.update(name.as_bytes());
        hasher.update(b"\0");
        hasher.update(range.as_bytes());
        hasher.update(b"\0");
        hasher.update(installed.as_bytes());
        hasher.update(b"\n");
    }
    Ok(())
}

fn hash_lockfile(hasher: &mut Hasher, root: &Path) -> Result<(), PrebundleError> {
    let Some(path) = LOCKFILES
        .iter()
        .map(|name| root.join(name))
        .find(|path| path.is_file())
    else {
        return Ok(());
    };

    let content = fs::read(&path).map_err(|source| PrebundleError::Io {
        action: "read",
        path: path.clone(),
        source,
    })?;
    hasher.update(blake3::hash(&content).as_bytes());
    Ok(())
}

/// Version from `node_modules/<name>/package.json`, if installed.
pub fn installed_version(root: &Path, name: &str) -> Option<String> {
    let dir = find_package_dir(root, name)?;
    PackageJson::read(&dir)?.version
}
