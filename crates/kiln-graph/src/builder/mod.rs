//! Breadth-first dependency graph construction.
//!
//! The builder walks the graph one level at a time. All modules of a level
//! are compiled concurrently on a bounded pool, then committed to the graph
//! sequentially in the order they were discovered, so the resulting module
//! order does not depend on task scheduling.

mod compile;

use std::sync::Arc;

use futures::{StreamExt, TryStreamExt, stream};
use rustc_hash::FxHashSet;

use crate::Result;
use crate::cancel::CancellationToken;
use crate::error::GraphError;
use crate::graph::ModuleGraph;
use crate::module::Module;
use crate::module_id::ModuleId;
use crate::package_json::PackageScopes;
use crate::pipeline::{AssetPipeline, BuildMode};
use crate::resolver::ModuleResolver;
use crate::runtime::Runtime;

/// A named entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    pub name: String,
    pub specifier: String,
}

impl EntryPoint {
    pub fn new(name: impl Into<String>, specifier: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            specifier: specifier.into(),
        }
    }
}

/// Options for [`GraphBuilder`].
#[derive(Debug, Clone, Copy)]
pub struct BuilderOptions {
    pub mode: BuildMode,
    /// Maximum number of modules compiled at once.
    pub concurrency: usize,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        Self {
            mode: BuildMode::default(),
            concurrency: num_cpus::get(),
        }
    }
}

/// What [`GraphBuilder::rebuild_module`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildOutcome {
    /// The module's source or edges differ from the previous compile.
    pub changed: bool,
    /// Newly discovered modules, in discovery order.
    pub added: Vec<ModuleId>,
    /// Modules pruned because no entry reaches them any more.
    pub removed: Vec<ModuleId>,
}

/// Builds a [`ModuleGraph`] from entry points.
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    runtime: Arc<dyn Runtime>,
    resolver: Arc<ModuleResolver>,
    pipeline: Arc<AssetPipeline>,
    options: BuilderOptions,
    scopes: Arc<PackageScopes>,
}

impl GraphBuilder {
    pub fn new(
        runtime: Arc<dyn Runtime>,
        resolver: Arc<ModuleResolver>,
        pipeline: Arc<AssetPipeline>,
    ) -> Self {
        Self {
            runtime,
            resolver,
            pipeline,
            options: BuilderOptions::default(),
            scopes: Arc::new(PackageScopes::new()),
        }
    }

    pub fn options(mut self, options: BuilderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn mode(mut self, mode: BuildMode) -> Self {
        self.options.mode = mode;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.options.concurrency = concurrency;
        self
    }

    pub fn build_mode(&self) -> BuildMode {
        self.options.mode
    }

    pub fn runtime(&self) -> &Arc<dyn Runtime> {
        &self.runtime
    }

    /// Forget cached package.json lookups (after a package.json changed).
    pub fn invalidate_package_scopes(&self) {
        self.scopes.clear();
    }

    /// Build the graph reachable from `entries`.
    ///
    /// Any resolution, read, parse or transform failure aborts the whole
    /// build. Cancellation is checked between levels.
    pub async fn build(
        &self,
        entries: &[EntryPoint],
        cancel: &CancellationToken,
    ) -> Result<ModuleGraph> {
        if entries.is_empty() {
            return Err(GraphError::NoEntries);
        }

        let graph = ModuleGraph::new();
        let mut claimed = FxHashSet::default();
        let mut entry_ids = FxHashSet::default();
        let mut level = Vec::new();

        for entry in entries {
            let id = self
                .resolver
                .resolve(&entry.specifier, None, self.runtime.as_ref())
                .await?;
            graph.add_entry(entry.name.clone(), id.clone())?;
            entry_ids.insert(id.clone());
            if claimed.insert(id.clone()) {
                level.push(id);
            }
        }

        self.discover(&graph, level, &mut claimed, &entry_ids, cancel)
            .await?;
        graph.validate()?;

        tracing::info!(
            modules = graph.len(),
            entries = entries.len(),
            "module graph built"
        );
        Ok(graph)
    }

    /// Recompile one module in place and pick up its new dependencies.
    ///
    /// Edges are recomputed for `id` only. Modules no entry can reach any
    /// more are pruned. On error the graph may be partially patched; callers
    /// that need all-or-nothing semantics patch a [`ModuleGraph::snapshot`].
    pub async fn rebuild_module(
        &self,
        graph: &ModuleGraph,
        id: &ModuleId,
        cancel: &CancellationToken,
    ) -> Result<RebuildOutcome> {
        let previous = graph
            .module(id)
            .ok_or_else(|| GraphError::UnknownModule(id.clone()))?;
        if cancel.is_cancelled() {
            return Err(GraphError::Cancelled);
        }

        let module = self.compile(id, previous.is_entry).await?;
        if module.same_shape(&previous) {
            tracing::debug!(module = %id, "module unchanged");
            return Ok(RebuildOutcome::default());
        }

        let mut claimed: FxHashSet<ModuleId> = graph.module_ids().into_iter().collect();
        let entry_ids: FxHashSet<ModuleId> = graph.entry_ids().into_iter().collect();
        let next = unclaimed_targets(&module, &mut claimed);

        graph.replace_module(module);
        let added = self
            .discover(graph, next, &mut claimed, &entry_ids, cancel)
            .await?;
        let removed = graph.prune_unreachable();
        graph.validate()?;

        tracing::debug!(
            module = %id,
            added = added.len(),
            removed = removed.len(),
            "module rebuilt"
        );
        Ok(RebuildOutcome {
            changed: true,
            added,
            removed,
        })
    }

    /// Compile `level` and every module it leads to, one level at a time.
    async fn discover(
        &self,
        graph: &ModuleGraph,
        mut level: Vec<ModuleId>,
        claimed: &mut FxHashSet<ModuleId>,
        entries: &FxHashSet<ModuleId>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ModuleId>> {
        let limit = self.options.concurrency.max(1);
        let mut added = Vec::new();
        let mut depth = 0usize;

        while !level.is_empty() {
            if cancel.is_cancelled() {
                tracing::debug!(depth, "graph build cancelled");
                return Err(GraphError::Cancelled);
            }
            tracing::debug!(depth, modules = level.len(), "compiling level");

            let compiled: Vec<Module> = stream::iter(
                level
                    .iter()
                    .map(|id| self.compile(id, entries.contains(id))),
            )
            .buffered(limit)
            .try_collect()
            .await?;

            let mut next = Vec::new();
            for module in compiled {
                next.extend(unclaimed_targets(&module, claimed));
                added.push(module.id.clone());
                graph.add_module(module);
            }

            level = next;
            depth += 1;
        }

        Ok(added)
    }
}

/// Claim every edge target of `module` not seen before. Targets seen before
/// (including cycles back to an ancestor) only keep their edge.
fn unclaimed_targets(module: &Module, claimed: &mut FxHashSet<ModuleId>) -> Vec<ModuleId> {
    module
        .dependencies
        .iter()
        .filter_map(|edge| edge.target.as_ref())
        .filter(|target| claimed.insert((*target).clone()))
        .cloned()
        .collect()
}
