use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use kiln_config::Loader;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use super::scan::{ImportRecord, scan_imports};
use super::{Dependency, ImportEdge, ModuleGraph, ModuleNode, PackageDep};
use crate::cancel::CancellationToken;
use crate::config::ResolvedConfig;
use crate::plugins::PluginPipeline;
use crate::resolve::node::probe_file;
use crate::resolve::{AliasResolver, Resolved};
use crate::{Error, Result};

/// Walks the module graph from every entry point.
///
/// Each breadth-first level is loaded and resolved in parallel. Index
/// assignment happens sequentially afterwards in frontier order, so the
/// resulting graph does not depend on thread scheduling.
pub struct GraphBuilder<'a> {
    config: &'a ResolvedConfig,
    pipeline: &'a PluginPipeline,
    resolver: AliasResolver,
    cancel: Option<&'a CancellationToken>,
}

struct Loaded {
    loader: Loader,
    source: String,
    imports: Vec<(ImportRecord, Resolved)>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(config: &'a ResolvedConfig, pipeline: &'a PluginPipeline) -> Self {
        Self {
            resolver: config.resolver(),
            config,
            pipeline,
            cancel: None,
        }
    }

    pub fn with_cancellation(mut self, token: &'a CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn build(&self) -> Result<ModuleGraph> {
        let mut paths: Vec<PathBuf> = Vec::new();
        let mut index: FxHashMap<PathBuf, usize> = FxHashMap::default();
        let mut slots: Vec<Option<ModuleNode>> = Vec::new();
        let mut packages = BTreeMap::new();
        let mut externals = BTreeSet::new();

        let mut intern = |path: PathBuf,
                          paths: &mut Vec<PathBuf>,
                          slots: &mut Vec<Option<ModuleNode>>|
         -> (usize, bool) {
            if let Some(&idx) = index.get(&path) {
                return (idx, false);
            }
            let idx = paths.len();
            index.insert(path.clone(), idx);
            paths.push(path);
            slots.push(None);
            (idx, true)
        };

        let mut frontier = Vec::new();
        for entry in self.entry_paths()? {
            let (idx, new) = intern(entry, &mut paths, &mut slots);
            if new {
                frontier.push(idx);
            }
        }
        let entry_count = paths.len();

        while !frontier.is_empty() {
            if let Some(token) = self.cancel {
                token.check()?;
            }

            let batch: Vec<PathBuf> = frontier.iter().map(|&idx| paths[idx].clone()).collect();
            let loaded: Vec<Result<Loaded>> = batch.par_iter().map(|path| self.load(path)).collect();

            let mut next = Vec::new();
            for ((idx, path), result) in frontier.iter().zip(batch).zip(loaded) {
                let loaded = result?;
                let mut imports = Vec::with_capacity(loaded.imports.len());

                for (record, resolved) in loaded.imports {
                    let target = match resolved {
                        Resolved::Module(target) => {
                            let (target_idx, new) = intern(target, &mut paths, &mut slots);
                            if new {
                                next.push(target_idx);
                            }
                            Dependency::Module(target_idx)
                        }
                        Resolved::Package { id, name, path } => {
                            packages
                                .entry(id.clone())
                                .or_insert(PackageDep { name, path });
                            Dependency::Package(id)
                        }
                        Resolved::External(specifier) => {
                            externals.insert(specifier.clone());
                            Dependency::External(specifier)
                        }
                    };
                    imports.push(ImportEdge {
                        specifier: record.specifier,
                        kind: record.kind,
                        target,
                    });
                }

                debug!(module = %self.config.display_path(&path), imports = imports.len(), "module discovered");
                slots[*idx] = Some(ModuleNode {
                    id: self.config.display_path(&path),
                    path,
                    loader: loaded.loader,
                    source: loaded.source,
                    imports,
                    is_entry: *idx < entry_count,
                });
            }
            frontier = next;
        }

        let graph = ModuleGraph::from_parts(slots.into_iter().flatten().collect(), packages, externals);
        self.check_cycles(&graph)?;
        Ok(graph)
    }

    fn entry_paths(&self) -> Result<Vec<PathBuf>> {
        self.config
            .entries
            .iter()
            .map(|entry| {
                probe_file(entry).ok_or_else(|| {
                    Error::resolution(
                        self.config.display_path(entry),
                        &self.config.root,
                        "entry point does not exist",
                    )
                })
            })
            .collect()
    }

    fn load(&self, path: &Path) -> Result<Loaded> {
        let loader = self.config.loader_for(path).ok_or_else(|| {
            Error::resolution(
                self.config.display_path(path),
                &self.config.root,
                "no loader handles this file type",
            )
        })?;
        let source = fs::read_to_string(path).map_err(|e| Error::io("read", path, e))?;

        let imports = scan_imports(&source, loader)
            .map_err(|error| Error::Syntax {
                module: self.config.display_path(path),
                error,
            })?
            .into_iter()
            .map(|record| {
                let resolved = self.resolve(&record.specifier, path)?;
                if let Resolved::Module(target) = &resolved {
                    if self.config.loader_for(target).is_none() {
                        return Err(Error::resolution(
                            &record.specifier,
                            path,
                            format!("no loader handles {}", target.display()),
                        ));
                    }
                }
                Ok((record, resolved))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Loaded {
            loader,
            source,
            imports,
        })
    }

    /// `resolve_id` stages first, then aliases and node-style lookup.
    fn resolve(&self, specifier: &str, importer: &Path) -> Result<Resolved> {
        if let Some(resolved) = self.pipeline.resolve_id(specifier, importer, self.config)? {
            return Ok(resolved);
        }
        self.resolver.resolve(specifier, importer)
    }

    fn check_cycles(&self, graph: &ModuleGraph) -> Result<()> {
        for mut cycle in graph.cycles() {
            if let Some(first) = cycle.first().cloned() {
                cycle.push(first);
            }
            if self.config.strict_cycles {
                return Err(Error::CircularDependency { cycle });
            }
            warn!(cycle = %cycle.join(" -> "), "circular import");
        }
        Ok(())
    }
}
