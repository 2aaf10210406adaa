//! Chunks and the chunk graph.

use std::fmt;

use indexmap::{IndexMap, IndexSet};
use kiln_graph::{ContentHash, DependencyKind, ModuleId, ShakeResult};
use rustc_hash::{FxBuildHasher, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::error::PartitionInvariantError;

pub(crate) type FxIndexMap<K, V> = IndexMap<K, V, FxBuildHasher>;
pub(crate) type FxIndexSet<T> = IndexSet<T, FxBuildHasher>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    /// Module registry and loader bootstrap. Every other chunk depends on it.
    Runtime,
    /// Modules shared by several entries.
    Vendor,
    Entry,
    /// Loaded on demand by a dynamic import.
    Async,
}

impl ChunkKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Runtime => "runtime",
            Self::Vendor => "vendor",
            Self::Entry => "entry",
            Self::Async => "async",
        }
    }
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An edge between chunks. `Static` dependencies load before the chunk runs;
/// `Dynamic` ones are fetched when a call site inside the chunk executes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkDependency {
    pub target: String,
    pub kind: DependencyKind,
}

#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub name: String,
    pub kind: ChunkKind,
    /// Members in first-discovery order.
    pub modules: FxIndexSet<ModuleId>,
    /// Set by the hasher.
    pub hash: Option<ContentHash>,
    pub dependencies: FxIndexSet<ChunkDependency>,
}

impl Chunk {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: ChunkKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            modules: FxIndexSet::default(),
            hash: None,
            dependencies: FxIndexSet::default(),
        }
    }

    pub fn contains(&self, module: &ModuleId) -> bool {
        self.modules.contains(module)
    }

    pub fn static_dependencies(&self) -> impl Iterator<Item = &str> {
        self.dependencies
            .iter()
            .filter(|dep| dep.kind == DependencyKind::Static)
            .map(|dep| dep.target.as_str())
    }

    pub fn async_dependencies(&self) -> impl Iterator<Item = &str> {
        self.dependencies
            .iter()
            .filter(|dep| dep.kind == DependencyKind::Dynamic)
            .map(|dep| dep.target.as_str())
    }

    pub fn depends_on(&self, chunk: &str) -> bool {
        self.dependencies.iter().any(|dep| dep.target == chunk)
    }

    pub(crate) fn add_dependency(&mut self, target: impl Into<String>, kind: DependencyKind) {
        self.dependencies.insert(ChunkDependency {
            target: target.into(),
            kind,
        });
    }
}

/// Chunks of one build in creation order: runtime, vendor, entries, async.
#[derive(Debug, Clone, Default)]
pub struct ChunkGraph {
    chunks: FxIndexMap<String, Chunk>,
    runtime: String,
    /// Dynamic import target → the async chunk created for it.
    async_targets: FxIndexMap<ModuleId, String>,
}

impl ChunkGraph {
    pub(crate) fn new(runtime: impl Into<String>) -> Self {
        Self {
            chunks: FxIndexMap::default(),
            runtime: runtime.into(),
            async_targets: FxIndexMap::default(),
        }
    }

    pub fn chunk(&self, id: &str) -> Option<&Chunk> {
        self.chunks.get(id)
    }

    pub(crate) fn chunk_mut(&mut self, id: &str) -> Option<&mut Chunk> {
        self.chunks.get_mut(id)
    }

    pub(crate) fn chunks_mut(&mut self) -> impl Iterator<Item = &mut Chunk> {
        self.chunks.values_mut()
    }

    pub(crate) fn insert(&mut self, chunk: Chunk) {
        self.chunks.insert(chunk.id.clone(), chunk);
    }

    pub(crate) fn set_async_target(&mut self, target: ModuleId, chunk: String) {
        self.async_targets.insert(target, chunk);
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.chunks.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.chunks.contains_key(id)
    }

    pub fn runtime_id(&self) -> &str {
        &self.runtime
    }

    pub fn runtime(&self) -> Option<&Chunk> {
        self.chunks.get(&self.runtime)
    }

    /// Chunks containing `module`.
    pub fn chunks_of<'a>(&'a self, module: &'a ModuleId) -> impl Iterator<Item = &'a Chunk> + 'a {
        self.chunks.values().filter(move |chunk| chunk.contains(module))
    }

    /// The async chunk created for a dynamic import target.
    pub fn async_chunk_for(&self, target: &ModuleId) -> Option<&Chunk> {
        self.async_targets
            .get(target)
            .and_then(|id| self.chunks.get(id))
    }

    /// Dynamic import targets and their chunks, in creation order.
    pub fn async_targets(&self) -> impl Iterator<Item = (&ModuleId, &str)> {
        self.async_targets
            .iter()
            .map(|(target, chunk)| (target, chunk.as_str()))
    }

    /// Chunks that must be present before `id` runs, dependencies first,
    /// followed by `id` itself.
    pub fn load_order(&self, id: &str) -> Vec<String> {
        fn visit(graph: &ChunkGraph, id: &str, seen: &mut FxIndexSet<String>) {
            if seen.contains(id) {
                return;
            }
            if let Some(chunk) = graph.chunks.get(id) {
                for dep in chunk.static_dependencies() {
                    visit(graph, dep, seen);
                }
            }
            seen.insert(id.to_string());
        }

        let mut seen = FxIndexSet::default();
        visit(self, id, &mut seen);
        seen.into_iter().collect()
    }

    /// Check the structural invariants:
    ///
    /// - the runtime chunk exists and depends on nothing;
    /// - every dependency names an existing chunk;
    /// - every other chunk reaches the runtime chunk;
    /// - every included module belongs to at least one chunk.
    pub fn validate(&self, shake: &ShakeResult) -> Result<(), PartitionInvariantError> {
        let runtime = self
            .runtime()
            .ok_or_else(|| PartitionInvariantError::MissingRuntime(self.runtime.clone()))?;
        if !runtime.dependencies.is_empty() {
            return Err(PartitionInvariantError::RuntimeHasDependencies(
                runtime.id.clone(),
            ));
        }

        for chunk in self.chunks.values() {
            for dep in &chunk.dependencies {
                if !self.chunks.contains_key(&dep.target) {
                    return Err(PartitionInvariantError::UnknownDependency {
                        chunk: chunk.id.clone(),
                        dependency: dep.target.clone(),
                    });
                }
            }
            if chunk.id != self.runtime && !self.reaches_runtime(&chunk.id) {
                return Err(PartitionInvariantError::Detached(chunk.id.clone()));
            }
        }

        let assigned: FxHashSet<&ModuleId> = self
            .chunks
            .values()
            .flat_map(|chunk| chunk.modules.iter())
            .collect();
        if let Some(missing) = shake.included().find(|id| !assigned.contains(id)) {
            return Err(PartitionInvariantError::Unassigned(missing.clone()));
        }
        Ok(())
    }

    fn reaches_runtime(&self, from: &str) -> bool {
        let mut stack = vec![from];
        let mut seen = FxHashSet::default();
        while let Some(id) = stack.pop() {
            if id == self.runtime {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            if let Some(chunk) = self.chunks.get(id) {
                stack.extend(chunk.dependencies.iter().map(|dep| dep.target.as_str()));
            }
        }
        false
    }
}
