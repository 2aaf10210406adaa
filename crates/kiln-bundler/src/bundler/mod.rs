//! Build orchestration.
//!
//! A [`Bundler`] owns the graph builder, the artifact cache and the state of
//! the last committed build. [`Bundler::build`] runs the whole pipeline;
//! [`Bundler::rebuild`] patches the previous graph for changed files and
//! returns the hot update alongside the new output.
//!
//! Starting a build or rebuild cancels the one in flight. A cancelled build
//! never commits: nothing is written and the previous state stays current.
//! Cache entries it already produced stay valid, since they are keyed by
//! content.

mod emit;
mod hmr;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use kiln_config::{ConfigValidator, KilnConfig, Mode, SchemaValidator};
use kiln_graph::{
    AssetPipeline, BuildMode, CancellationSource, CancellationToken, EntryPoint, GraphBuilder,
    ModuleGraph, ModuleId, ModuleResolver, ResolverConfig, Runtime, ShakeResult,
};
use kiln_runtime::HmrPayload;
use parking_lot::Mutex;
use path_clean::PathClean;
use rustc_hash::FxHashSet;

use crate::cache::CacheStore;
use crate::error::{Error, Result};
use crate::output::{BuildOutput, OutputWriter};

/// Result of [`Bundler::rebuild`].
#[derive(Debug, Clone)]
pub struct Rebuild {
    pub output: Arc<BuildOutput>,
    /// Modules to hot-swap, relative to the previous build.
    pub payload: HmrPayload,
    /// Whether a `package.json` change forced a full graph build.
    pub full: bool,
}

/// The last committed build.
#[derive(Debug)]
struct BuildState {
    graph: ModuleGraph,
    shake: ShakeResult,
    output: Arc<BuildOutput>,
}

#[derive(Debug)]
pub struct Bundler {
    config: KilnConfig,
    runtime: Arc<dyn Runtime>,
    root: PathBuf,
    resolver: Arc<ModuleResolver>,
    builder: GraphBuilder,
    cache: Arc<CacheStore>,
    cancel: CancellationSource,
    state: Mutex<Option<Arc<BuildState>>>,
    /// Serializes output writes and state swaps.
    commit_lock: tokio::sync::Mutex<()>,
    hmr_generation: AtomicU64,
}

impl Bundler {
    /// Validate `config` and set up a bundler rooted at the runtime's working
    /// directory. Opens the persistent cache when `cache.dir` is set.
    pub fn new(config: KilnConfig, runtime: Arc<dyn Runtime>) -> Result<Self> {
        SchemaValidator.validate(&config)?;
        let root = runtime.get_cwd()?;

        let resolver = Arc::new(ModuleResolver::new(
            ResolverConfig::default()
                .extensions(&config.resolve.extensions)
                .roots(config.resolve.roots.iter().cloned()),
            root.clone(),
        ));

        let cache = match &config.cache.dir {
            Some(dir) => CacheStore::open(&root.join(dir))?,
            None => CacheStore::in_memory(),
        }
        .max_idle_generations(config.cache.max_idle_generations);

        let builder = Self::graph_builder(
            &config,
            &runtime,
            &resolver,
            Arc::new(AssetPipeline::with_defaults()),
        );

        Ok(Self {
            config,
            runtime,
            root,
            resolver,
            builder,
            cache: Arc::new(cache),
            cancel: CancellationSource::new(),
            state: Mutex::new(None),
            commit_lock: tokio::sync::Mutex::new(()),
            hmr_generation: AtomicU64::new(0),
        })
    }

    /// Replace the asset pipeline (to register extra loaders).
    pub fn with_pipeline(mut self, pipeline: AssetPipeline) -> Self {
        self.builder = Self::graph_builder(
            &self.config,
            &self.runtime,
            &self.resolver,
            Arc::new(pipeline),
        );
        self
    }

    /// Share an artifact cache between bundlers.
    pub fn with_cache(mut self, cache: Arc<CacheStore>) -> Self {
        self.cache = cache;
        self
    }

    fn graph_builder(
        config: &KilnConfig,
        runtime: &Arc<dyn Runtime>,
        resolver: &Arc<ModuleResolver>,
        pipeline: Arc<AssetPipeline>,
    ) -> GraphBuilder {
        let mode = match config.mode {
            Mode::Production => BuildMode::Production,
            Mode::Development => BuildMode::Development,
        };
        GraphBuilder::new(Arc::clone(runtime), Arc::clone(resolver), pipeline)
            .mode(mode)
            .concurrency(workers(config))
    }

    pub fn config(&self) -> &KilnConfig {
        &self.config
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// Cancel the build in flight, if any.
    pub fn cancel(&self) {
        self.cancel.cancel_all();
    }

    pub fn last_output(&self) -> Option<Arc<BuildOutput>> {
        self.state.lock().as_ref().map(|state| Arc::clone(&state.output))
    }

    /// A snapshot of the last committed module graph.
    pub fn graph(&self) -> Option<ModuleGraph> {
        self.state.lock().as_ref().map(|state| state.graph.snapshot())
    }

    /// Full build: resolve, build the graph, shake, partition, hash, render
    /// through the cache, then write the artifacts and the manifest.
    pub async fn build(&self) -> Result<Arc<BuildOutput>> {
        let token = self.cancel.next_token();
        let generation = self.cache.begin_generation()?;
        tracing::debug!(generation, "build started");

        let graph = self.builder.build(&self.entries(), &token).await?;
        let (shake, output) = self.emit(&graph, &token).await?;
        let state = self.commit(graph, shake, output, &token).await?;

        tracing::info!(
            hash = %state.output.build_hash.short(12),
            modules = state.output.stats.modules,
            chunks = state.output.stats.chunks,
            rendered = state.output.stats.rendered,
            "build finished"
        );
        Ok(Arc::clone(&state.output))
    }

    /// Watch-mode rebuild after `changed` files were modified.
    ///
    /// Each changed module is recompiled into a snapshot of the previous
    /// graph; a changed `package.json` rebuilds the whole graph instead.
    /// Paths the graph does not know are ignored.
    pub async fn rebuild(&self, changed: &[PathBuf]) -> Result<Rebuild> {
        let previous = self.state.lock().clone().ok_or(Error::NoPreviousBuild)?;
        let token = self.cancel.next_token();
        let generation = self.cache.begin_generation()?;

        let changed: Vec<PathBuf> = changed
            .iter()
            .map(|path| {
                if path.is_absolute() {
                    path.clean()
                } else {
                    self.root.join(path).clean()
                }
            })
            .collect();
        let full = changed.iter().any(|path| is_package_json(path));
        tracing::debug!(generation, changed = changed.len(), full, "rebuild started");

        let graph = if full {
            self.builder.invalidate_package_scopes();
            self.builder.build(&self.entries(), &token).await?
        } else {
            let graph = previous.graph.snapshot();
            for id in affected_modules(&graph, &changed) {
                // Pruned by an earlier rebuild in this batch.
                if !graph.contains(&id) {
                    continue;
                }
                let outcome = self.builder.rebuild_module(&graph, &id, &token).await?;
                tracing::debug!(
                    module = %id,
                    changed = outcome.changed,
                    added = outcome.added.len(),
                    removed = outcome.removed.len(),
                    "module recompiled"
                );
            }
            graph
        };

        let (shake, output) = self.emit(&graph, &token).await?;
        let state = self.commit(graph, shake, output, &token).await?;

        let hmr_generation = self.hmr_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let payload = hmr::diff(&previous, &state, &self.root, hmr_generation);
        tracing::info!(
            hash = %state.output.build_hash.short(12),
            updated = payload.modules.len(),
            removed = payload.removed.len(),
            "rebuild finished"
        );

        Ok(Rebuild {
            output: Arc::clone(&state.output),
            payload,
            full,
        })
    }

    fn entries(&self) -> Vec<EntryPoint> {
        self.config
            .entries
            .iter()
            .map(|(name, specifier)| EntryPoint::new(name, specifier))
            .collect()
    }

    fn workers(&self) -> usize {
        workers(&self.config)
    }

    /// Write the output and make it the current state, unless cancelled.
    ///
    /// Commits run one at a time. A build superseded while its output was
    /// being written leaves the state alone; the newer build's commit waits
    /// for the lock and then overwrites the files.
    async fn commit(
        &self,
        graph: ModuleGraph,
        shake: ShakeResult,
        output: BuildOutput,
        token: &CancellationToken,
    ) -> Result<Arc<BuildState>> {
        let _commit = self.commit_lock.lock().await;
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let writer = OutputWriter::new(Arc::clone(&self.runtime), &self.config.output.dir)?;
        writer
            .write(&output, &self.config.output.manifest, self.config.output.clean)
            .await?;

        if token.is_cancelled() {
            tracing::debug!("build superseded while writing, keeping the current state");
            return Err(Error::Cancelled);
        }

        let live: FxHashSet<_> = output.live_hashes().collect();
        let state = Arc::new(BuildState {
            graph,
            shake,
            output: Arc::new(output),
        });
        *self.state.lock() = Some(Arc::clone(&state));

        if let Err(err) = self.cache.collect_garbage(&live) {
            tracing::warn!(error = %err, "cache garbage collection failed");
        }
        Ok(state)
    }
}

fn workers(config: &KilnConfig) -> usize {
    config.workers.unwrap_or_else(num_cpus::get).max(1)
}

fn is_package_json(path: &Path) -> bool {
    path.file_name().is_some_and(|name| name == "package.json")
}

/// Graph modules backed by one of `paths`, any query included, in graph
/// order.
fn affected_modules(graph: &ModuleGraph, paths: &[PathBuf]) -> Vec<ModuleId> {
    graph
        .module_ids()
        .into_iter()
        .filter(|id| paths.iter().any(|path| id.as_path() == path))
        .collect()
}
