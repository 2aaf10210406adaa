//! From a module graph to rendered artifacts.

use std::sync::atomic::{AtomicUsize, Ordering};

use futures::{StreamExt, TryStreamExt, stream};
use indexmap::IndexMap;
use kiln_graph::{CancellationToken, ContentHash, ModuleGraph, ShakeResult, TreeShaker};

use super::Bundler;
use crate::cache::CacheEntry;
use crate::chunk::{Chunk, ChunkGraph, ChunkKind};
use crate::error::{BuildError, Error, Result};
use crate::hash::ContentHasher;
use crate::output::{
    Artifact, BuildManifest, BuildOutput, BuildStats, FilenameTemplate, RuntimeManifest,
    TemplateContext, render_chunk, render_runtime,
};
use crate::partition::{PartitionOptions, Partitioner};

impl Bundler {
    /// Shake, partition, hash, name and render `graph`. Nothing is written.
    pub(super) async fn emit(
        &self,
        graph: &ModuleGraph,
        token: &CancellationToken,
    ) -> Result<(ShakeResult, BuildOutput)> {
        let optimization = &self.config.optimization;
        let shake = TreeShaker::new()
            .enabled(optimization.tree_shaking)
            .shake(graph);
        tracing::debug!(
            included = shake.included_count(),
            excluded = shake.excluded().len(),
            "tree shaken"
        );

        let mut chunks =
            Partitioner::new(PartitionOptions::from(optimization)).partition(graph, &shake)?;
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let hasher = ContentHasher::new(&self.root);
        hasher.hash_chunks(&mut chunks, graph, &shake);
        let build_hash = hasher.build_hash(&chunks);

        let entry_template = FilenameTemplate::parse(&self.config.output.filename)?;
        let chunk_template = FilenameTemplate::parse(self.config.output.chunk_filename())?;
        let template_for = |kind: ChunkKind| match kind {
            ChunkKind::Async => &chunk_template,
            _ => &entry_template,
        };

        let mut filenames: IndexMap<String, String> = IndexMap::new();
        for chunk in chunks.chunks().filter(|chunk| chunk.kind != ChunkKind::Runtime) {
            let hash = chunk.hash.unwrap_or(build_hash);
            filenames.insert(
                chunk.id.clone(),
                filename(template_for(chunk.kind), chunk, &build_hash, &hash),
            );
        }

        // The runtime chunk embeds every other filename, so it is named last.
        let runtime_manifest = RuntimeManifest::collect(&chunks, graph, &filenames, &self.root);
        let runtime_text = render_runtime(&runtime_manifest)?;
        let runtime_hash = ContentHash::of(runtime_text.as_bytes());
        let runtime_id = chunks.runtime_id().to_string();
        if let Some(runtime) = chunks.chunk_mut(&runtime_id) {
            runtime.hash = Some(runtime_hash);
            let name = filename(&entry_template, runtime, &build_hash, &runtime_hash);
            filenames.insert(runtime_id.clone(), name);
        }

        check_conflicts(&chunks, &filenames)?;
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let rendered = AtomicUsize::new(0);
        let jobs = chunks.chunks().filter_map(|chunk| {
            let filename = filenames.get(&chunk.id)?.clone();
            let hash = chunk.hash?;
            Some((chunk, filename, hash))
        });
        let artifacts: Vec<Artifact> = stream::iter(jobs)
            .map(|(chunk, filename, hash)| {
                let shake = &shake;
                let runtime_text = &runtime_text;
                let rendered = &rendered;
                async move {
                    if token.is_cancelled() {
                        return Err(BuildError::Cancelled);
                    }
                    let content = self
                        .cache
                        .get_or_build(hash, || async move {
                            rendered.fetch_add(1, Ordering::Relaxed);
                            let modules = chunk
                                .modules
                                .iter()
                                .map(|id| id.relative_key(&self.root))
                                .collect();
                            let text = match chunk.kind {
                                ChunkKind::Runtime => runtime_text.clone(),
                                _ => render_chunk(chunk, graph, shake, &self.root)?,
                            };
                            Ok::<_, BuildError>(CacheEntry::new(modules, text))
                        })
                        .await?;
                    Ok(Artifact {
                        chunk: chunk.id.clone(),
                        kind: chunk.kind,
                        filename,
                        hash,
                        content,
                    })
                }
            })
            .buffered(self.workers())
            .try_collect()
            .await?;

        let manifest = BuildManifest::collect(&chunks, &build_hash, &filenames, &self.root);
        let stats = BuildStats {
            modules: graph.len(),
            included: shake.included_count(),
            chunks: chunks.len(),
            rendered: rendered.into_inner(),
        };
        tracing::debug!(
            chunks = stats.chunks,
            rendered = stats.rendered,
            "chunks emitted"
        );

        Ok((
            shake,
            BuildOutput {
                chunks,
                artifacts,
                manifest,
                build_hash,
                stats,
            },
        ))
    }
}

/// `[name]` renders the chunk id: the chunk name, made unique within the
/// build.
fn filename(
    template: &FilenameTemplate,
    chunk: &Chunk,
    build_hash: &ContentHash,
    content_hash: &ContentHash,
) -> String {
    template.render(&TemplateContext {
        name: &chunk.id,
        id: &chunk.id,
        build_hash,
        content_hash,
    })
}

fn check_conflicts(chunks: &ChunkGraph, filenames: &IndexMap<String, String>) -> Result<()> {
    let mut seen: IndexMap<&str, &str> = IndexMap::new();
    for chunk in chunks.chunks() {
        let Some(filename) = filenames.get(&chunk.id) else {
            continue;
        };
        if let Some(first) = seen.insert(filename, &chunk.id) {
            return Err(Error::FilenameConflict {
                filename: filename.clone(),
                first: first.to_string(),
                second: chunk.id.clone(),
            });
        }
    }
    Ok(())
}
