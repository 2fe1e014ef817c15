//! Rendering and writing output targets.

mod sourcemap;
pub mod writer;

use std::collections::BTreeMap;
use std::path::Path;

use kiln_config::Loader;
use serde::Serialize;

use crate::chunk::{Chunk, plan_chunks};
use crate::graph::ModuleGraph;
use crate::target::{OutputTarget, check_module};
use crate::{Error, Result};

pub use self::sourcemap::ChunkMap;
pub use writer::{StagedTarget, stage};

pub const MANIFEST_FILE: &str = "manifest.json";
const ASSETS_DIR: &str = "assets";

/// A first-party module after the Transforming phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleOutput {
    pub id: String,
    pub loader: Loader,
    /// Source as read from disk, embedded in source maps
    pub original: String,
    pub code: String,
}

/// One file of a rendered target, relative to its output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFile {
    pub path: String,
    pub contents: String,
}

/// `manifest.json` record of one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map: Option<String>,
    /// `base` joined with `file`
    pub url: String,
    pub modules: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<String>,
    pub entry: bool,
}

/// Everything a target will contain, held in memory until staging.
#[derive(Debug, Clone)]
pub struct RenderedTarget {
    pub target: OutputTarget,
    pub files: Vec<RenderedFile>,
    pub manifest: BTreeMap<String, ManifestEntry>,
}

/// Check and render one target.
///
/// `modules` is indexed like `graph.modules()`; `packages` holds the code of
/// every third-party import id. Nothing is written.
pub fn render_target(
    target: &OutputTarget,
    graph: &ModuleGraph,
    modules: &[ModuleOutput],
    packages: &BTreeMap<String, String>,
) -> Result<RenderedTarget> {
    for module in modules {
        check_module(&module.code, module.loader, &module.id, &target.name, target.platform_level)?;
    }
    for (id, code) in packages {
        check_module(
            code,
            Loader::Js,
            &package_source_name(id),
            &target.name,
            target.platform_level,
        )?;
    }

    let mut files = Vec::new();
    let mut manifest = BTreeMap::new();

    for chunk in plan_chunks(graph, &target.chunk_manifest) {
        let (code, map) = render_chunk(&chunk, target.source_maps, modules, packages)?;

        let hash = blake3::hash(code.as_bytes()).to_hex();
        let file = format!("{}/{}-{}.js", ASSETS_DIR, chunk.name, &hash.as_str()[..8]);
        let basename = file_name(&file);

        let map_file = match map {
            Some(map) => {
                let map_path = format!("{file}.map");
                let json = map.finish(&basename)?;
                files.push(RenderedFile {
                    path: file.clone(),
                    contents: format!("{code}//# sourceMappingURL={basename}.map\n"),
                });
                files.push(RenderedFile {
                    path: map_path.clone(),
                    contents: json,
                });
                Some(map_path)
            }
            None => {
                files.push(RenderedFile {
                    path: file.clone(),
                    contents: code,
                });
                None
            }
        };

        manifest.insert(
            chunk.name.clone(),
            ManifestEntry {
                url: format!("{}{}", target.base, file),
                file,
                map: map_file,
                modules: chunk
                    .modules
                    .iter()
                    .filter_map(|&idx| modules.get(idx).map(|m| m.id.clone()))
                    .collect(),
                packages: chunk.packages.iter().cloned().collect(),
                entry: chunk.entry.is_some(),
            },
        );
    }

    let manifest_json = serde_json::to_string_pretty(&manifest)
        .map_err(|e| Error::WriteFailure(format!("Failed to serialize manifest: {}", e)))?;
    files.push(RenderedFile {
        path: MANIFEST_FILE.to_string(),
        contents: format!("{manifest_json}\n"),
    });

    if target.source_maps {
        ensure_maps_complete(&files)?;
    }

    Ok(RenderedTarget {
        target: target.clone(),
        files,
        manifest,
    })
}

fn render_chunk(
    chunk: &Chunk,
    source_maps: bool,
    modules: &[ModuleOutput],
    packages: &BTreeMap<String, String>,
) -> Result<(String, Option<ChunkMap>)> {
    let mut code = String::new();
    let mut map = source_maps.then(|| ChunkMap::new(&chunk.name));

    let mut push = |code: &mut String, name: &str, original: &str, body: &str| {
        code.push_str(&format!("// {name}\n"));
        if let Some(map) = map.as_mut() {
            map.skip_lines(1);
            map.add_module(name, original, body);
        }
        code.push_str(body);
        if !body.is_empty() && !body.ends_with('\n') {
            code.push('\n');
        }
    };

    for &idx in &chunk.modules {
        let module = modules.get(idx).ok_or_else(|| {
            Error::InvalidConfig(format!("chunk `{}` references unknown module #{idx}", chunk.name))
        })?;
        push(&mut code, &module.id, &module.original, &module.code);
    }
    for id in &chunk.packages {
        let body = packages.get(id).ok_or_else(|| {
            Error::InvalidConfig(format!("chunk `{}` references unbundled package `{id}`", chunk.name))
        })?;
        push(&mut code, &package_source_name(id), body, body);
    }

    Ok((code, map))
}

/// Every emitted script must ship with its map.
fn ensure_maps_complete(files: &[RenderedFile]) -> Result<()> {
    for file in files.iter().filter(|f| f.path.ends_with(".js")) {
        let map = format!("{}.map", file.path);
        if !files.iter().any(|f| f.path == map) {
            return Err(Error::SourceMap {
                file: file.path.clone(),
                message: "no source map was produced for this chunk".to_string(),
            });
        }
    }
    Ok(())
}

fn package_source_name(id: &str) -> String {
    format!("node_modules/{id}")
}

fn file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Dependency, ImportEdge, ImportKind, ModuleNode, PackageDep};
    use crate::target::ChunkManifest;
    use kiln_config::{Loader, PlatformLevel};
    use std::collections::BTreeSet;
    use std::path::PathBuf;

    fn graph() -> ModuleGraph {
        let main = ModuleNode {
            id: "src/main.ts".into(),
            path: PathBuf::from("/app/src/main.ts"),
            loader: Loader::Ts,
            source: String::new(),
            imports: vec![ImportEdge {
                specifier: "showdown".into(),
                kind: ImportKind::Static,
                target: Dependency::Package("showdown".into()),
            }],
            is_entry: true,
        };
        ModuleGraph::from_parts(
            vec![main],
            BTreeMap::from([(
                "showdown".to_string(),
                PackageDep {
                    name: "showdown".into(),
                    path: PathBuf::from("/app/node_modules/showdown/index.js"),
                },
            )]),
            BTreeSet::new(),
        )
    }

    fn target(source_maps: bool, level: PlatformLevel) -> OutputTarget {
        OutputTarget {
            name: "standalone".into(),
            out_dir: PathBuf::from("/app/dist"),
            empty_before_write: true,
            platform_level: level,
            source_maps,
            base: "/assets/app/".into(),
            chunk_manifest: ChunkManifest::default(),
        }
    }

    fn modules() -> Vec<ModuleOutput> {
        vec![ModuleOutput {
            id: "src/main.ts".into(),
            loader: Loader::Ts,
            original: "import s from 'showdown'\nconst x = 1\n".into(),
            code: "import s from 'showdown'\nconst x = 1\n".into(),
        }]
    }

    fn packages() -> BTreeMap<String, String> {
        BTreeMap::from([("showdown".to_string(), "// index.js\nexport default 1;\n".to_string())])
    }

    #[test]
    fn renders_hashed_chunks_maps_and_manifest() {
        let rendered = render_target(&target(true, PlatformLevel::ES2020), &graph(), &modules(), &packages()).unwrap();
        let paths: Vec<&str> = rendered.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths.len(), 5);
        assert_eq!(paths[4], MANIFEST_FILE);

        let main = &rendered.manifest["main"];
        assert!(main.entry);
        assert!(main.file.starts_with("assets/main-") && main.file.ends_with(".js"));
        assert_eq!(main.url, format!("/assets/app/{}", main.file));
        assert_eq!(main.map.as_deref(), Some(format!("{}.map", main.file).as_str()));
        assert_eq!(main.modules, vec!["src/main.ts"]);

        let vendor = &rendered.manifest["vendor"];
        assert_eq!(vendor.packages, vec!["showdown"]);
        let vendor_code = &rendered.files.iter().find(|f| f.path == vendor.file).unwrap().contents;
        assert!(vendor_code.starts_with("// node_modules/showdown\n"));
        assert!(vendor_code.ends_with(".js.map\n"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let a = render_target(&target(false, PlatformLevel::ES2020), &graph(), &modules(), &packages()).unwrap();
        let b = render_target(&target(false, PlatformLevel::ES2020), &graph(), &modules(), &packages()).unwrap();
        assert_eq!(a.files, b.files);
        assert!(a.files.iter().all(|f| !f.path.ends_with(".map")));
    }

    #[test]
    fn platform_violation_in_a_package_fails() {
        let mut packages = packages();
        packages.insert("showdown".into(), "export const a = b?.c;\n".into());
        let err = render_target(&target(false, PlatformLevel::ES2015), &graph(), &modules(), &packages).unwrap_err();
        match err {
            Error::PlatformCompatibility { module, required, .. } => {
                assert_eq!(module, "node_modules/showdown:1");
                assert_eq!(required, PlatformLevel::ES2020);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn missing_map_is_detected() {
        let files = vec![RenderedFile {
            path: "assets/main-00000000.js".into(),
            contents: String::new(),
        }];
        assert!(matches!(ensure_maps_complete(&files), Err(Error::SourceMap { .. })));
    }
}
