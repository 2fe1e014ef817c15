//! The first-party module graph discovered from the entry points.
//!
//! Discovery stops at package boundaries: an import that resolves into
//! `node_modules` becomes a [`Dependency::Package`] edge and the package is
//! handed to the pre-bundler instead of being walked.

mod builder;
pub mod scan;

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};

use kiln_config::Loader;
use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;
use rustc_hash::{FxHashMap, FxHashSet};

pub use builder::GraphBuilder;
pub use scan::{ImportKind, ImportRecord, scan_imports};

/// What an import edge points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dependency {
    /// Index into [`ModuleGraph::modules`]
    Module(usize),
    /// Package import id (`name` or `name/subpath`)
    Package(String),
    External(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportEdge {
    pub specifier: String,
    pub kind: ImportKind,
    pub target: Dependency,
}

/// A discovered first-party module.
#[derive(Debug, Clone)]
pub struct ModuleNode {
    /// Root-relative path with forward slashes
    pub id: String,
    pub path: PathBuf,
    pub loader: Loader,
    pub source: String,
    pub imports: Vec<ImportEdge>,
    pub is_entry: bool,
}

/// A third-party import reached from first-party code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDep {
    pub name: String,
    /// Resolved entry file of the import
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct ModuleGraph {
    modules: Vec<ModuleNode>,
    index: FxHashMap<PathBuf, usize>,
    entries: Vec<usize>,
    packages: BTreeMap<String, PackageDep>,
    externals: BTreeSet<String>,
}

impl ModuleGraph {
    pub(crate) fn from_parts(
        modules: Vec<ModuleNode>,
        packages: BTreeMap<String, PackageDep>,
        externals: BTreeSet<String>,
    ) -> Self {
        let index = modules
            .iter()
            .enumerate()
            .map(|(idx, m)| (m.path.clone(), idx))
            .collect();
        let entries = modules
            .iter()
            .enumerate()
            .filter(|(_, m)| m.is_entry)
            .map(|(idx, _)| idx)
            .collect();
        Self {
            modules,
            index,
            entries,
            packages,
            externals,
        }
    }

    pub fn modules(&self) -> &[ModuleNode] {
        &self.modules
    }

    pub fn module(&self, idx: usize) -> Option<&ModuleNode> {
        self.modules.get(idx)
    }

    pub fn index_of(&self, path: &Path) -> Option<usize> {
        self.index.get(path).copied()
    }

    /// Entry module indices in declaration order.
    pub fn entries(&self) -> &[usize] {
        &self.entries
    }

    /// Third-party imports by id, sorted.
    pub fn packages(&self) -> &BTreeMap<String, PackageDep> {
        &self.packages
    }

    pub fn externals(&self) -> &BTreeSet<String> {
        &self.externals
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Modules reachable from `start` (itself included), breadth-first.
    pub fn reachable_from(&self, start: usize) -> Vec<usize> {
        let mut seen = FxHashSet::default();
        let mut order = Vec::new();
        let mut queue = VecDeque::from([start]);

        while let Some(idx) = queue.pop_front() {
            if idx >= self.modules.len() || !seen.insert(idx) {
                continue;
            }
            order.push(idx);
            for edge in &self.modules[idx].imports {
                if let Dependency::Module(next) = edge.target {
                    queue.push_back(next);
                }
            }
        }
        order
    }

    /// Package ids imported by the given modules.
    pub fn packages_of(&self, modules: &[usize]) -> BTreeSet<String> {
        modules
            .iter()
            .filter_map(|&idx| self.modules.get(idx))
            .flat_map(|m| &m.imports)
            .filter_map(|edge| match &edge.target {
                Dependency::Package(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Import cycles among first-party modules, ignoring dynamic imports.
    ///
    /// Each cycle lists module ids ordered by discovery; cycles are ordered by
    /// their first member.
    pub fn cycles(&self) -> Vec<Vec<String>> {
        let mut graph = DiGraph::<usize, ()>::with_capacity(self.modules.len(), 0);
        let nodes: Vec<_> = (0..self.modules.len()).map(|idx| graph.add_node(idx)).collect();
        let mut self_loops = FxHashSet::default();

        for (from, module) in self.modules.iter().enumerate() {
            for edge in &module.imports {
                if edge.kind == ImportKind::Dynamic {
                    continue;
                }
                if let Dependency::Module(to) = edge.target {
                    if to == from {
                        self_loops.insert(from);
                    }
                    graph.add_edge(nodes[from], nodes[to], ());
                }
            }
        }

        let mut cycles: Vec<Vec<usize>> = tarjan_scc(&graph)
            .into_iter()
            .map(|scc| {
                let mut members: Vec<usize> = scc.into_iter().map(|n| graph[n]).collect();
                members.sort_unstable();
                members
            })
            .filter(|members| members.len() > 1 || self_loops.contains(&members[0]))
            .collect();
        cycles.sort();

        cycles
            .into_iter()
            .map(|members| {
                members
                    .into_iter()
                    .map(|idx| self.modules[idx].id.clone())
                    .collect()
            })
            .collect()
    }
}
