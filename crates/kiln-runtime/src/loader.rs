//! Dynamic import as an async task.
//!
//! `import("./page")` in bundled code becomes [`DynamicImporter::import`]:
//! the chunks holding the module are fetched (each at most once, with
//! concurrent importers joining the same fetch), their modules defined, and
//! the module evaluated. The caller awaits the export table; unrelated tasks
//! keep running meanwhile.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::try_join_all;
use rustc_hash::{FxBuildHasher, FxHashMap};
use tokio::sync::OnceCell;

use crate::error::{LoadError, TransportError};
use crate::exports::ExportTable;
use crate::hmr::ModuleSource;
use crate::registry::{ModuleCompiler, ModuleDefinition, Registry};

/// The modules of one fetched chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedChunk {
    pub id: String,
    pub modules: Vec<ModuleSource>,
}

/// Fetches chunk contents (script tags, HTTP, file reads).
#[async_trait]
pub trait ChunkFetcher: Send + Sync + fmt::Debug {
    async fn fetch(&self, chunk: &str) -> Result<FetchedChunk, TransportError>;
}

/// Module → chunks needed to load it, in load order. Emitted by the bundler
/// into the runtime chunk.
#[derive(Debug, Clone, Default)]
pub struct ChunkMap {
    modules: FxHashMap<String, Vec<String>>,
}

impl ChunkMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<I, S>(&mut self, module: impl Into<String>, chunks: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.modules
            .insert(module.into(), chunks.into_iter().map(Into::into).collect());
    }

    pub fn chunks_for(&self, module: &str) -> Option<&[String]> {
        self.modules.get(module).map(Vec::as_slice)
    }
}

/// Loads lazily imported modules into a [`Registry`].
#[derive(Debug)]
pub struct DynamicImporter {
    registry: Arc<Registry>,
    fetcher: Arc<dyn ChunkFetcher>,
    compiler: Arc<dyn ModuleCompiler>,
    chunks: ChunkMap,
    loaded: DashMap<String, Arc<OnceCell<()>>, FxBuildHasher>,
}

impl DynamicImporter {
    pub fn new(
        registry: Arc<Registry>,
        fetcher: Arc<dyn ChunkFetcher>,
        compiler: Arc<dyn ModuleCompiler>,
        chunks: ChunkMap,
    ) -> Self {
        Self {
            registry,
            fetcher,
            compiler,
            chunks,
            loaded: DashMap::default(),
        }
    }

    /// Record chunks that are already present (shipped with the page).
    pub fn mark_loaded(&self, chunk: impl Into<String>) {
        self.loaded
            .insert(chunk.into(), Arc::new(OnceCell::new_with(Some(()))));
    }

    pub fn is_loaded(&self, chunk: &str) -> bool {
        self.loaded
            .get(chunk)
            .is_some_and(|cell| cell.initialized())
    }

    /// Load and evaluate `module`, yielding its exports.
    pub async fn import(&self, module: &str) -> Result<ExportTable, LoadError> {
        if !self.registry.is_defined(module) {
            let chunks = self
                .chunks
                .chunks_for(module)
                .ok_or_else(|| LoadError::UnknownModule(module.to_string()))?;
            try_join_all(chunks.iter().map(|chunk| self.load_chunk(chunk))).await?;
        }
        Ok(self.registry.require(module)?)
    }

    async fn load_chunk(&self, chunk: &str) -> Result<(), LoadError> {
        let cell = self
            .loaded
            .entry(chunk.to_string())
            .or_default()
            .clone();

        cell.get_or_try_init(|| async {
            tracing::debug!(chunk, "fetching chunk");
            let fetched = self.fetcher.fetch(chunk).await?;
            for module in fetched.modules {
                let factory = self.compiler.compile(&module.id, &module.source)?;
                self.registry.define(
                    ModuleDefinition::new(module.id, factory).dependencies(module.dependencies),
                );
            }
            Ok::<(), LoadError>(())
        })
        .await?;
        Ok(())
    }
}
