//! Chunk assignment for one target.
//!
//! Manual groups from the target's [`ChunkManifest`] are applied first and
//! take their members out of automatic chunking entirely. The rest follows
//! a fixed scheme:
//! - each entry gets a chunk named after its file stem
//! - a first-party module reached from exactly one entry joins that entry's chunk
//! - a first-party module reached from several entries goes to `common`
//! - third-party imports go to `vendor`

use std::collections::BTreeSet;
use std::path::Path;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;

use crate::graph::ModuleGraph;
use crate::target::ChunkManifest;

pub const COMMON_CHUNK: &str = "common";
pub const VENDOR_CHUNK: &str = "vendor";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chunk {
    pub name: String,
    /// Entry module index when this is an entry chunk
    pub entry: Option<usize>,
    /// Module indices in discovery order
    pub modules: Vec<usize>,
    /// Package import ids, sorted
    pub packages: BTreeSet<String>,
}

impl Chunk {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty() && self.packages.is_empty()
    }
}

/// Chunks in emission order: entries, manual groups, `common`, `vendor`.
pub fn plan_chunks(graph: &ModuleGraph, manifest: &ChunkManifest) -> Vec<Chunk> {
    let mut chunks: IndexMap<String, Chunk> = IndexMap::new();

    let mut reserved: Vec<&str> = manifest.groups().map(|(name, _)| name).collect();
    reserved.extend([COMMON_CHUNK, VENDOR_CHUNK]);

    let mut entry_chunks = Vec::with_capacity(graph.entries().len());
    for &entry in graph.entries() {
        let Some(module) = graph.module(entry) else {
            continue;
        };
        let name = unique_name(&entry_stem(&module.path), &chunks, &reserved);
        let mut chunk = Chunk::new(&name);
        chunk.entry = Some(entry);
        chunks.insert(name.clone(), chunk);
        entry_chunks.push((entry, name));
    }
    for (name, _) in manifest.groups() {
        chunks.entry(name.to_string()).or_insert_with(|| Chunk::new(name));
    }
    for name in [COMMON_CHUNK, VENDOR_CHUNK] {
        chunks.entry(name.to_string()).or_insert_with(|| Chunk::new(name));
    }

    // Which entry chunks reach each module and package.
    let mut module_owners: FxHashMap<usize, Vec<&str>> = FxHashMap::default();
    let mut packages = BTreeSet::new();
    for (entry, name) in &entry_chunks {
        let reach = graph.reachable_from(*entry);
        packages.extend(graph.packages_of(&reach));
        for idx in reach {
            let owners = module_owners.entry(idx).or_default();
            if !owners.contains(&name.as_str()) {
                owners.push(name.as_str());
            }
        }
    }

    for (idx, module) in graph.modules().iter().enumerate() {
        let target = if module.is_entry {
            entry_chunks
                .iter()
                .find(|(entry, _)| *entry == idx)
                .map(|(_, name)| name.as_str())
        } else if let Some(manual) = manifest.chunk_for_module(&module.id) {
            Some(manual)
        } else {
            match module_owners.get(&idx).map(Vec::as_slice) {
                Some([only]) => Some(*only),
                Some([_, _, ..]) => Some(COMMON_CHUNK),
                _ => None,
            }
        };

        if let Some(chunk) = target.and_then(|name| chunks.get_mut(name)) {
            chunk.modules.push(idx);
        }
    }

    for id in packages {
        let name = graph
            .packages()
            .get(&id)
            .map(|dep| dep.name.as_str())
            .unwrap_or(id.as_str());
        let target = manifest.chunk_for_package(&id, name).unwrap_or(VENDOR_CHUNK);
        if let Some(chunk) = chunks.get_mut(target) {
            chunk.packages.insert(id);
        }
    }

    chunks.into_values().filter(|c| !c.is_empty()).collect()
}

fn entry_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "index".to_string())
}

fn unique_name(base: &str, taken: &IndexMap<String, Chunk>, reserved: &[&str]) -> String {
    let free = |name: &str| !taken.contains_key(name) && !reserved.contains(&name);
    if free(base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{base}-{n}"))
        .find(|name| free(name))
        .unwrap_or_else(|| base.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Dependency, ImportEdge, ImportKind, ModuleNode, PackageDep};
    use kiln_config::Loader;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn node(id: &str, imports: Vec<Dependency>, entry: bool) -> ModuleNode {
        ModuleNode {
            id: id.to_string(),
            path: PathBuf::from("/app").join(id),
            loader: Loader::Ts,
            source: String::new(),
            imports: imports
                .into_iter()
                .map(|target| ImportEdge {
                    specifier: String::new(),
                    kind: ImportKind::Static,
                    target,
                })
                .collect(),
            is_entry: entry,
        }
    }

    fn package(name: &str) -> PackageDep {
        PackageDep {
            name: name.to_string(),
            path: PathBuf::from("/app/node_modules").join(name),
        }
    }

    /// main -> table -> shared, admin -> shared; both import vendor packages.
    fn graph() -> ModuleGraph {
        ModuleGraph::from_parts(
            vec![
                node(
                    "src/main.ts",
                    vec![
                        Dependency::Module(2),
                        Dependency::Package("vendor/chart".into()),
                        Dependency::Package("showdown".into()),
                    ],
                    true,
                ),
                node("src/admin/main.ts", vec![Dependency::Module(3), Dependency::Package("vendor/map".into())], true),
                node("src/widgets/table.ts", vec![Dependency::Module(3)], false),
                node("src/shared.ts", vec![], false),
            ],
            BTreeMap::from([
                ("showdown".to_string(), package("showdown")),
                ("vendor/chart".to_string(), package("vendor")),
                ("vendor/map".to_string(), package("vendor")),
            ]),
            BTreeSet::new(),
        )
    }

    fn find<'a>(chunks: &'a [Chunk], name: &str) -> &'a Chunk {
        chunks.iter().find(|c| c.name == name).unwrap()
    }

    #[test]
    fn automatic_chunking() {
        let chunks = plan_chunks(&graph(), &ChunkManifest::default());
        let names: Vec<&str> = chunks.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["main", "main-2", "common", "vendor"]);
        assert_eq!(find(&chunks, "main").modules, vec![0, 2]);
        assert_eq!(find(&chunks, "main-2").modules, vec![1]);
        assert_eq!(find(&chunks, "common").modules, vec![3]);
        assert_eq!(
            find(&chunks, "vendor").packages.iter().collect::<Vec<_>>(),
            vec!["showdown", "vendor/chart", "vendor/map"]
        );
    }

    #[test]
    fn manual_chunk_removes_member_from_vendor() {
        let manifest = ChunkManifest::new(IndexMap::from([(
            "charts".to_string(),
            vec!["vendor/chart".to_string()],
        )]));
        let chunks = plan_chunks(&graph(), &manifest);
        assert!(find(&chunks, "charts").packages.contains("vendor/chart"));
        assert!(!find(&chunks, "vendor").packages.contains("vendor/chart"));
        assert!(find(&chunks, "vendor").packages.contains("vendor/map"));
    }

    #[test]
    fn manual_first_party_groups() {
        let manifest = ChunkManifest::new(IndexMap::from([(
            "widgets".to_string(),
            vec!["src/widgets/table".to_string(), "src/shared.ts".to_string()],
        )]));
        let chunks = plan_chunks(&graph(), &manifest);
        assert_eq!(find(&chunks, "widgets").modules, vec![2, 3]);
        assert!(chunks.iter().all(|c| c.name != "common"));
    }

    #[test]
    fn empty_manual_groups_are_dropped() {
        let manifest = ChunkManifest::new(IndexMap::from([(
            "frappe-ui".to_string(),
            vec!["frappe-ui".to_string()],
        )]));
        let chunks = plan_chunks(&graph(), &manifest);
        assert!(chunks.iter().all(|c| c.name != "frappe-ui"));
    }
}
