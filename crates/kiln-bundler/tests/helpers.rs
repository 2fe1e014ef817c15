//! Shared fixtures for kiln-bundler integration tests.
//!
//! Projects are built on the fly inside a `TempDir`: a small app with an `@`
//! alias, a single-file component and two third-party packages.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use kiln_bundler::{BuildDriver, PrebundleCache};
use kiln_config::{BuildOptions, PluginOptions, TargetOptions};
use tempfile::TempDir;
use walkdir::WalkDir;

/// Write `contents` to `root/rel`, creating parent directories.
pub fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

pub fn app_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    write(
        root,
        "src/main.ts",
        "import { createTable } from '@/widgets/table'\n\
         import App from './App.vue'\n\
         import showdown from 'showdown'\n\
         import { chart } from 'vendor/chart'\n\
         console.log(createTable(App), showdown, chart)\n",
    );
    write(
        root,
        "src/widgets/table.ts",
        "export function createTable(component) {\n  return { component }\n}\n",
    );
    write(
        root,
        "src/App.vue",
        "<template><div class=\"app\">hello</div></template>\n\
         <script>\nexport default { name: 'App' }\n</script>\n",
    );

    write(
        root,
        "package.json",
        r#"{ "name": "app", "dependencies": { "showdown": "^2.1.0", "vendor": "^1.0.0" } }"#,
    );
    write(root, "package-lock.json", r#"{ "lockfileVersion": 3 }"#);

    write(
        root,
        "node_modules/showdown/package.json",
        r#"{ "name": "showdown", "version": "2.1.0", "main": "dist/showdown.js" }"#,
    );
    write(
        root,
        "node_modules/showdown/dist/showdown.js",
        "import { escape } from './helpers.js'\nexport default { escape }\n",
    );
    write(
        root,
        "node_modules/showdown/dist/helpers.js",
        "export function escape(s) { return s }\n",
    );

    write(
        root,
        "node_modules/vendor/package.json",
        r#"{ "name": "vendor", "version": "1.0.0", "main": "index.js" }"#,
    );
    write(root, "node_modules/vendor/index.js", "export const version = 1\n");
    write(root, "node_modules/vendor/chart.js", "export const chart = 'bar'\n");

    dir
}

/// Options for [`app_project`] with one `standalone` target in `dist`.
pub fn app_options() -> BuildOptions {
    BuildOptions::default()
        .with_entry("src/main.ts")
        .with_alias("@", "src")
        .with_plugin(PluginOptions::named("framework"))
        .with_target(TargetOptions::new("standalone", "dist"))
}

/// Options with a second `embedded` target in `public/app`.
pub fn two_target_options() -> BuildOptions {
    app_options().with_target(TargetOptions::new("embedded", "public/app"))
}

pub fn driver(root: &Path, options: BuildOptions) -> BuildDriver {
    BuildDriver::new(options).with_base_dir(root)
}

pub fn shared_driver(root: &Path, options: BuildOptions, cache: &Arc<PrebundleCache>) -> BuildDriver {
    driver(root, options).with_cache(cache.clone())
}

/// Every file under `dir`, keyed by forward-slash relative path.
pub fn snapshot(dir: &Path) -> BTreeMap<String, Vec<u8>> {
    if !dir.exists() {
        return BTreeMap::new();
    }
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            let rel = entry
                .path()
                .strip_prefix(dir)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/");
            (rel, fs::read(entry.path()).unwrap())
        })
        .collect()
}

pub fn read_manifest(out_dir: &Path) -> serde_json::Value {
    let raw = fs::read_to_string(out_dir.join("manifest.json")).unwrap();
    serde_json::from_str(&raw).unwrap()
}
