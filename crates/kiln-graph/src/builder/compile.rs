//! Compiling a single module: read, transform, resolve.

use super::GraphBuilder;
use crate::Result;
use crate::error::GraphError;
use crate::module::{DependencyEdge, Module};
use crate::module_id::ModuleId;
use crate::pipeline::LoadContext;

impl GraphBuilder {
    pub(super) async fn compile(&self, id: &ModuleId, is_entry: bool) -> Result<Module> {
        let bytes = self
            .runtime
            .read_file(id.as_path())
            .await
            .map_err(|source| GraphError::Read {
                path: id.as_path().to_path_buf(),
                source,
            })?;

        let ctx = LoadContext {
            module: id,
            mode: self.options.mode,
        };
        let extension = id.extension().unwrap_or_default();
        let loaded = self
            .pipeline
            .transform(&bytes, extension, &ctx)
            .await
            .map_err(|err| GraphError::from_transform(id.clone(), err))?;

        let mut edges = Vec::with_capacity(loaded.dependencies.len());
        for decl in loaded.dependencies {
            let target = self
                .resolver
                .resolve(&decl.specifier, Some(id), self.runtime.as_ref())
                .await?;
            edges.push(DependencyEdge {
                source: id.clone(),
                specifier: decl.specifier,
                target: Some(target),
                kind: decl.kind,
                bindings: decl.bindings,
                chunk_name: decl.chunk_name,
            });
        }

        let side_effect_free = match loaded.side_effect_free {
            Some(flag) => flag,
            None => {
                self.scopes
                    .side_effect_free(self.runtime.as_ref(), id)
                    .await
            }
        };

        tracing::trace!(module = %id, edges = edges.len(), "compiled");
        Ok(Module::builder(id.clone(), loaded.source)
            .dependencies(edges)
            .exports(loaded.exports)
            .side_effect_free(side_effect_free)
            .entry(is_entry)
            .build())
    }
}
