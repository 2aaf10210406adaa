//! Chunk artifact rendering.
//!
//! Every non-runtime chunk renders to a single call that hands a JSON
//! [`ChunkPayload`] to the module registry. The runtime chunk holds the
//! registry bootstrap followed by the [`RuntimeManifest`] it needs to map
//! modules to chunk files.

use std::path::Path;

use indexmap::IndexMap;
use kiln_graph::pipeline::script::{SCRIPT_EXTENSIONS, strip_unused_exports};
use kiln_graph::{ModuleGraph, ModuleId, ShakeResult};
use kiln_runtime::{ChunkMap, FetchedChunk, ModuleSource};
use serde::{Deserialize, Serialize};

use crate::chunk::{Chunk, ChunkGraph, ChunkKind};
use crate::error::BuildError;

const CHUNK_PREFIX: &str = "(globalThis.__kiln_chunks__ = globalThis.__kiln_chunks__ || []).push(";
const CHUNK_SUFFIX: &str = ");\n";

const BOOTSTRAP: &str = include_str!("bootstrap.js");
const BOOTSTRAP_CALL: &str = "\n__kiln_bootstrap__(";

/// One module inside a rendered chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedModule {
    /// Key relative to the project root.
    pub id: String,
    pub source: String,
    /// Keys of included static dependencies, in import order.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Specifier → key, for every resolved and included import.
    #[serde(default)]
    pub imports: IndexMap<String, String>,
    /// Export names some importer uses.
    #[serde(default)]
    pub exports: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub id: String,
    pub kind: ChunkKind,
    pub modules: Vec<RenderedModule>,
}

impl From<ChunkPayload> for FetchedChunk {
    fn from(payload: ChunkPayload) -> Self {
        FetchedChunk {
            id: payload.id,
            modules: payload
                .modules
                .into_iter()
                .map(|module| ModuleSource {
                    id: module.id,
                    source: module.source,
                    dependencies: module.dependencies,
                })
                .collect(),
        }
    }
}

/// Collect the payload of a non-runtime chunk.
///
/// Export declarations nobody imports are dropped from side-effect-free
/// script modules.
pub fn chunk_payload(
    chunk: &Chunk,
    graph: &ModuleGraph,
    shake: &ShakeResult,
    root: &Path,
) -> Result<ChunkPayload, BuildError> {
    let mut modules = Vec::with_capacity(chunk.modules.len());
    for id in &chunk.modules {
        let module = graph.module(id).ok_or_else(|| BuildError::Render {
            chunk: chunk.id.clone(),
            message: format!("module '{id}' is not in the graph"),
        })?;

        let mut dependencies = Vec::new();
        let mut imports = IndexMap::new();
        for edge in module.dependencies.iter() {
            let Some(target) = edge.target.as_ref().filter(|target| shake.is_included(target))
            else {
                continue;
            };
            let key = target.relative_key(root);
            if edge.is_static() && !dependencies.contains(&key) {
                dependencies.push(key.clone());
            }
            imports.insert(edge.specifier.clone(), key);
        }

        let live = shake.live_exports(id);
        let exports = live.map(|live| live.resolve(&module)).unwrap_or_default();
        let source = match live {
            Some(live) if module.side_effect_free && !live.is_all() && is_script(id) => {
                strip_unused_exports(&module.source, id.extension(), |name| live.contains(name))
                    .map_err(|err| BuildError::Render {
                        chunk: chunk.id.clone(),
                        message: format!("{id}: {err}"),
                    })?
            }
            _ => module.source.to_string(),
        };

        modules.push(RenderedModule {
            id: id.relative_key(root),
            source,
            dependencies,
            imports,
            exports,
        });
    }

    Ok(ChunkPayload {
        id: chunk.id.clone(),
        kind: chunk.kind,
        modules,
    })
}

fn is_script(id: &ModuleId) -> bool {
    id.extension()
        .is_some_and(|ext| SCRIPT_EXTENSIONS.contains(&ext))
}

/// Render a non-runtime chunk to its artifact text.
pub fn render_chunk(
    chunk: &Chunk,
    graph: &ModuleGraph,
    shake: &ShakeResult,
    root: &Path,
) -> Result<String, BuildError> {
    let payload = chunk_payload(chunk, graph, shake, root)?;
    let json = serde_json::to_string(&payload).map_err(|err| BuildError::Render {
        chunk: chunk.id.clone(),
        message: err.to_string(),
    })?;
    Ok(format!("{CHUNK_PREFIX}{json}{CHUNK_SUFFIX}"))
}

/// Read back the payload of a rendered non-runtime chunk.
pub fn parse_chunk(artifact: &str) -> Option<ChunkPayload> {
    let json = artifact
        .strip_prefix(CHUNK_PREFIX)?
        .strip_suffix(CHUNK_SUFFIX)?;
    serde_json::from_str(json).ok()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeChunkInfo {
    pub filename: String,
    pub hash: String,
    pub kind: ChunkKind,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeEntry {
    pub chunk: String,
    pub module: String,
}

/// What the runtime chunk knows about the rest of the build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeManifest {
    /// Every non-runtime chunk, in creation order.
    pub chunks: IndexMap<String, RuntimeChunkInfo>,
    /// Dynamic import target → chunks to load for it, in load order.
    pub modules: IndexMap<String, Vec<String>>,
    pub entries: IndexMap<String, RuntimeEntry>,
}

impl RuntimeManifest {
    /// Collect the manifest. `filenames` maps chunk ids to their rendered
    /// filenames; chunks without a hash or filename are skipped.
    pub fn collect(
        chunks: &ChunkGraph,
        graph: &ModuleGraph,
        filenames: &IndexMap<String, String>,
        root: &Path,
    ) -> Self {
        let runtime = chunks.runtime_id();
        let mut manifest = Self::default();

        for chunk in chunks.chunks().filter(|chunk| chunk.id != runtime) {
            let (Some(filename), Some(hash)) = (filenames.get(&chunk.id), &chunk.hash) else {
                continue;
            };
            manifest.chunks.insert(
                chunk.id.clone(),
                RuntimeChunkInfo {
                    filename: filename.clone(),
                    hash: hash.to_hex(),
                    kind: chunk.kind,
                    dependencies: chunk
                        .static_dependencies()
                        .filter(|dep| *dep != runtime)
                        .map(str::to_string)
                        .collect(),
                },
            );
        }

        for (target, chunk) in chunks.async_targets() {
            let order = chunks
                .load_order(chunk)
                .into_iter()
                .filter(|id| id != runtime)
                .collect();
            manifest.modules.insert(target.relative_key(root), order);
        }

        for (name, module) in graph.entries() {
            let chunk = chunks
                .chunks()
                .find(|chunk| chunk.kind == ChunkKind::Entry && chunk.name == name);
            if let Some(chunk) = chunk {
                manifest.entries.insert(
                    name,
                    RuntimeEntry {
                        chunk: chunk.id.clone(),
                        module: module.relative_key(root),
                    },
                );
            }
        }

        manifest
    }

    /// The dynamic-import chunk map for [`kiln_runtime::DynamicImporter`].
    pub fn chunk_map(&self) -> ChunkMap {
        let mut map = ChunkMap::new();
        for (module, chunks) in &self.modules {
            map.insert(module.clone(), chunks.iter().cloned());
        }
        map
    }
}

/// Render the runtime chunk: the bootstrap followed by its manifest.
pub fn render_runtime(manifest: &RuntimeManifest) -> serde_json::Result<String> {
    let json = serde_json::to_string(manifest)?;
    Ok(format!("{BOOTSTRAP}{BOOTSTRAP_CALL}{json});\n"))
}

/// Read back the manifest of a rendered runtime chunk.
pub fn parse_runtime_manifest(artifact: &str) -> Option<RuntimeManifest> {
    let start = artifact.rfind(BOOTSTRAP_CALL)? + BOOTSTRAP_CALL.len();
    let json = artifact[start..].strip_suffix(");\n")?;
    serde_json::from_str(json).ok()
}
