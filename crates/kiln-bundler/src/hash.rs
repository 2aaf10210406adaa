//! Deterministic chunk and build hashes.
//!
//! A chunk hash covers everything the renderer reads for that chunk, and
//! nothing else: no timestamps, no build counters, no absolute paths. Module
//! identities enter the hash as keys relative to the project root, so the
//! same project hashes identically wherever it is checked out.

use std::path::{Path, PathBuf};

use kiln_graph::{ContentHash, DependencyKind, ModuleGraph, ShakeResult};

use crate::chunk::{Chunk, ChunkGraph, ChunkKind};

/// Bump when the rendered chunk format changes.
pub const HASH_FORMAT_VERSION: u32 = 2;

#[derive(Debug, Clone)]
pub struct ContentHasher {
    root: PathBuf,
}

impl ContentHasher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Hash of one non-runtime chunk: format version, kind, id, dependencies,
    /// then per member (in order) its key, content hash, live exports and
    /// resolved edges.
    pub fn chunk_hash(&self, chunk: &Chunk, graph: &ModuleGraph, shake: &ShakeResult) -> ContentHash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&HASH_FORMAT_VERSION.to_le_bytes());
        field(&mut hasher, chunk.kind.as_str());
        field(&mut hasher, &chunk.id);

        hasher.update(&(chunk.dependencies.len() as u64).to_le_bytes());
        for dep in &chunk.dependencies {
            field(&mut hasher, &dep.target);
            field(
                &mut hasher,
                match dep.kind {
                    DependencyKind::Static => "static",
                    DependencyKind::Dynamic => "dynamic",
                },
            );
        }

        hasher.update(&(chunk.modules.len() as u64).to_le_bytes());
        for id in &chunk.modules {
            field(&mut hasher, &id.relative_key(&self.root));
            let Some(module) = graph.module(id) else {
                field(&mut hasher, "<missing>");
                continue;
            };
            hasher.update(module.content_hash.as_bytes());

            let live = shake
                .live_exports(id)
                .map(|live| live.resolve(&module))
                .unwrap_or_default();
            hasher.update(&(live.len() as u64).to_le_bytes());
            for name in &live {
                field(&mut hasher, name);
            }

            hasher.update(&(module.dependencies.len() as u64).to_le_bytes());
            for edge in module.dependencies.iter() {
                field(&mut hasher, &edge.specifier);
                match &edge.target {
                    Some(target) if shake.is_included(target) => {
                        field(&mut hasher, &target.relative_key(&self.root));
                    }
                    _ => field(&mut hasher, ""),
                }
            }
        }

        hasher.finalize().into()
    }

    /// Hash every non-runtime chunk in place.
    pub fn hash_chunks(&self, chunks: &mut ChunkGraph, graph: &ModuleGraph, shake: &ShakeResult) {
        for chunk in chunks.chunks_mut() {
            if chunk.kind != ChunkKind::Runtime {
                chunk.hash = Some(self.chunk_hash(chunk, graph, shake));
            }
        }
    }

    /// The `[hash]` of a build: every non-runtime chunk id and hash, in
    /// creation order. The runtime chunk is left out because it embeds
    /// filenames that may contain this hash.
    pub fn build_hash(&self, chunks: &ChunkGraph) -> ContentHash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&HASH_FORMAT_VERSION.to_le_bytes());
        for chunk in chunks.chunks().filter(|chunk| chunk.kind != ChunkKind::Runtime) {
            field(&mut hasher, &chunk.id);
            if let Some(hash) = &chunk.hash {
                hasher.update(hash.as_bytes());
            }
        }
        hasher.finalize().into()
    }
}

/// Length-prefixed so adjacent fields cannot run together.
fn field(hasher: &mut blake3::Hasher, value: &str) {
    hasher.update(&(value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}
