//! Hot module replacement.
//!
//! ```text
//! Idle -> Checking -> Downloading -> Applying -> Idle
//!                                        \-> Failed (full reload)
//! ```
//!
//! An update batch is applied atomically. Accept boundaries are found for
//! every changed module and the new module code is evaluated into fresh
//! export tables before anything live is touched; if any step fails, no
//! module is replaced and the runtime asks for a full reload.

mod plan;
mod transport;
mod wire;

pub use transport::{InMemoryTransport, UpdateTransport};
pub use wire::{HmrPayload, HmrUpdate, ManifestEntry, ModuleSource, ModuleUpdate, UpdateManifest};

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexSet;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{EvalError, HmrError};
use crate::exports::ExportTable;
use crate::registry::{
    AcceptEvent, HotContext, ModuleCompiler, ModuleDefinition, ModuleFactory, Registry, Staged,
};

/// State of the update state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HmrStatus {
    Idle,
    Checking,
    Downloading,
    Applying,
    /// Terminal: the page or process must be reloaded.
    Failed,
}

impl fmt::Display for HmrStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Checking => "checking",
            Self::Downloading => "downloading",
            Self::Applying => "applying",
            Self::Failed => "failed",
        })
    }
}

/// Result of a successfully applied batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub generation: u64,
    /// Modules from the payload, in payload order.
    pub updated: Vec<String>,
    /// Modules evaluated again, including cascades requested by handlers.
    pub reevaluated: Vec<String>,
    /// `(boundary, dependency)` pairs whose handlers ran.
    pub accepted: Vec<(String, String)>,
    pub removed: Vec<String>,
}

/// The single hot-update driver of a running bundle.
#[derive(Debug)]
pub struct HmrRuntime {
    registry: Arc<Registry>,
    transport: Arc<dyn UpdateTransport>,
    compiler: Arc<dyn ModuleCompiler>,
    status: HmrStatus,
    generation: u64,
    hashes: FxHashMap<String, String>,
    reload_reason: Option<String>,
}

impl HmrRuntime {
    pub fn new(
        registry: Arc<Registry>,
        transport: Arc<dyn UpdateTransport>,
        compiler: Arc<dyn ModuleCompiler>,
    ) -> Self {
        Self {
            registry,
            transport,
            compiler,
            status: HmrStatus::Idle,
            generation: 0,
            hashes: FxHashMap::default(),
            reload_reason: None,
        }
    }

    /// Start from the generation the bundle was built as.
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    /// Hashes of the modules the bundle shipped with, so unchanged modules
    /// are skipped by [`HmrRuntime::check`].
    pub fn with_hashes<I>(mut self, hashes: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.hashes.extend(hashes);
        self
    }

    pub fn status(&self) -> HmrStatus {
        self.status
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Why a full reload is required, once the runtime has failed.
    pub fn reload_reason(&self) -> Option<&str> {
        self.reload_reason.as_deref()
    }

    pub fn needs_reload(&self) -> bool {
        self.status == HmrStatus::Failed
    }

    /// Ask the transport what changed since the last applied generation.
    /// Returns `None` (back to idle) when nothing relevant changed; otherwise
    /// the runtime stays in `Checking` until [`HmrRuntime::download`].
    pub async fn check(&mut self) -> Result<Option<UpdateManifest>, HmrError> {
        self.ensure(&[HmrStatus::Idle])?;
        self.status = HmrStatus::Checking;

        let manifest = match self.transport.manifest(self.generation).await {
            Ok(manifest) => manifest,
            Err(err) => {
                self.status = HmrStatus::Idle;
                return Err(err.into());
            }
        };

        let pending = UpdateManifest {
            generation: manifest.generation,
            modules: manifest
                .modules
                .into_iter()
                .filter(|entry| self.hashes.get(&entry.id) != Some(&entry.hash))
                .collect(),
            removed: manifest.removed,
        };

        if manifest.generation <= self.generation || pending.is_empty() {
            self.generation = self.generation.max(manifest.generation);
            self.status = HmrStatus::Idle;
            tracing::debug!(generation = self.generation, "no pending hot update");
            return Ok(None);
        }

        tracing::debug!(
            generation = pending.generation,
            modules = pending.modules.len(),
            "hot update available"
        );
        Ok(Some(pending))
    }

    /// Fetch the sources for a manifest returned by [`HmrRuntime::check`].
    pub async fn download(&mut self, manifest: &UpdateManifest) -> Result<HmrPayload, HmrError> {
        self.ensure(&[HmrStatus::Checking])?;
        self.status = HmrStatus::Downloading;

        match self.transport.payload(manifest).await {
            Ok(payload) => Ok(payload),
            Err(err) => {
                self.status = HmrStatus::Idle;
                Err(err.into())
            }
        }
    }

    /// Check, download and apply in one go.
    pub async fn update(&mut self) -> Result<Option<ApplyOutcome>, HmrError> {
        let Some(manifest) = self.check().await? else {
            return Ok(None);
        };
        let payload = self.download(&manifest).await?;
        self.apply(&payload).map(Some)
    }

    /// Dry run: the accept boundaries `payload` would use.
    pub fn plan(&self, payload: &HmrPayload) -> Result<Vec<HmrUpdate>, HmrError> {
        plan::plan(&self.registry, payload).map(|plan| plan.updates)
    }

    /// Apply one update batch. Allowed from `Idle` (pushed payloads) and
    /// `Downloading`.
    pub fn apply(&mut self, payload: &HmrPayload) -> Result<ApplyOutcome, HmrError> {
        self.ensure(&[HmrStatus::Idle, HmrStatus::Downloading])?;
        self.status = HmrStatus::Applying;

        if payload.generation <= self.generation {
            tracing::debug!(
                generation = payload.generation,
                current = self.generation,
                "ignoring stale hot update"
            );
            self.status = HmrStatus::Idle;
            return Ok(ApplyOutcome {
                generation: self.generation,
                ..ApplyOutcome::default()
            });
        }

        match self.apply_batch(payload) {
            Ok(outcome) => {
                for update in &payload.modules {
                    if !update.hash.is_empty() {
                        self.hashes.insert(update.id.clone(), update.hash.clone());
                    }
                }
                for id in &payload.removed {
                    self.hashes.remove(id);
                }
                self.generation = payload.generation;
                self.status = HmrStatus::Idle;
                tracing::info!(
                    generation = self.generation,
                    updated = outcome.updated.len(),
                    reevaluated = outcome.reevaluated.len(),
                    "hot update applied"
                );
                Ok(outcome)
            }
            Err(err) => {
                tracing::warn!(error = %err, "hot update failed, full reload required");
                self.status = HmrStatus::Failed;
                self.reload_reason = Some(err.to_string());
                Err(err)
            }
        }
    }

    fn ensure(&self, allowed: &[HmrStatus]) -> Result<(), HmrError> {
        if self.status == HmrStatus::Failed {
            return Err(HmrError::ReloadRequired {
                reason: self.reload_reason.clone().unwrap_or_default(),
            });
        }
        if !allowed.contains(&self.status) {
            return Err(HmrError::Busy {
                status: self.status,
            });
        }
        Ok(())
    }

    fn apply_batch(&self, payload: &HmrPayload) -> Result<ApplyOutcome, HmrError> {
        let registry = self.registry.as_ref();

        // Compile and plan before anything live changes.
        let mut definitions: FxHashMap<&str, ModuleDefinition> = FxHashMap::default();
        for update in &payload.modules {
            let factory = self
                .compiler
                .compile(&update.id, &update.source)
                .map_err(|source| HmrError::Evaluation {
                    module: update.id.clone(),
                    source,
                })?;
            definitions.insert(
                update.id.as_str(),
                ModuleDefinition::new(update.id.clone(), factory)
                    .dependencies(update.dependencies.iter().cloned()),
            );
        }
        let plan = plan::plan(registry, payload)?;

        // Modules nobody instantiated yet only need their definition.
        for update in &payload.modules {
            if !registry.is_instantiated(&update.id) {
                if let Some(definition) = definitions.remove(update.id.as_str()) {
                    registry.define(definition);
                }
            }
        }

        // Importers re-evaluated later in the batch see the staged tables.
        let mut staged = Staged::default();
        let mut fresh = Vec::with_capacity(plan.reevaluate.len());
        for id in &plan.reevaluate {
            let factory = match definitions.get(id.as_str()) {
                Some(definition) => Arc::clone(&definition.factory),
                None => registry
                    .definition(id)
                    .map(|definition| definition.factory)
                    .ok_or_else(|| HmrError::Evaluation {
                        module: id.clone(),
                        source: EvalError::NotDefined(id.clone()),
                    })?,
            };
            let (exports, hot) =
                registry
                    .evaluate_detached(id, factory.as_ref(), &staged)
                    .map_err(|source| HmrError::Evaluation {
                        module: id.clone(),
                        source,
                    })?;
            staged.insert(id.clone(), exports.clone());
            fresh.push((id.clone(), exports, hot));
        }

        // Commit.
        for (id, exports, hot) in fresh {
            dispose(registry, &id);
            registry.commit(&id, definitions.remove(id.as_str()), &exports, hot);
        }
        let mut removed = Vec::new();
        for id in &payload.removed {
            dispose(registry, id);
            if registry.remove(id).is_some() {
                removed.push(id.clone());
            }
        }

        let mut reevaluated = plan.reevaluate;
        let accepted = fire_accept_handlers(registry, plan.accepts, &mut reevaluated)?;

        Ok(ApplyOutcome {
            generation: payload.generation,
            updated: payload.modules.iter().map(|m| m.id.clone()).collect(),
            reevaluated: reevaluated.into_iter().collect(),
            accepted,
            removed,
        })
    }
}

fn dispose(registry: &Registry, id: &str) {
    let (Some(hot), Some(exports)) = (registry.hot(id), registry.exports(id)) else {
        return;
    };
    for handler in hot.dispose_handlers() {
        (**handler)(&exports);
    }
}

/// Run accept handlers once per `(boundary, dependency)`, re-evaluating
/// modules the handlers invalidate (each at most once per batch).
fn fire_accept_handlers(
    registry: &Registry,
    accepts: IndexSet<(String, String)>,
    reevaluated: &mut IndexSet<String>,
) -> Result<Vec<(String, String)>, HmrError> {
    let mut queue: VecDeque<(String, String)> = accepts.into_iter().collect();
    let mut fired: IndexSet<(String, String)> = IndexSet::new();

    while let Some((boundary, dependency)) = queue.pop_front() {
        if !fired.insert((boundary.clone(), dependency.clone())) {
            continue;
        }
        let hot = registry.hot(&boundary).unwrap_or_default();
        let handler = if boundary == dependency {
            hot.self_handler()
        } else {
            hot.accept_handler(&dependency)
        };
        let Some(handler) = handler else {
            continue;
        };

        let exports = registry.exports(&dependency).unwrap_or_default();
        let mut event = AcceptEvent::new(&boundary, &dependency, &exports);
        (*handler)(&mut event);

        for target in event.into_invalidated() {
            if !reevaluated.insert(target.clone()) {
                continue;
            }
            let hot = reevaluate_in_place(registry, &target)?;
            if hot.is_self_accepting() {
                queue.push_back((target.clone(), target.clone()));
            }
            for (importer, dependencies) in registry.instance_dependencies() {
                if dependencies.contains(&target)
                    && registry
                        .hot(&importer)
                        .is_some_and(|hot| hot.accepts(&target))
                {
                    queue.push_back((importer, target.clone()));
                }
            }
        }
    }

    Ok(fired.into_iter().collect())
}

fn reevaluate_in_place(registry: &Registry, id: &str) -> Result<HotContext, HmrError> {
    let factory: Arc<dyn ModuleFactory> = registry
        .definition(id)
        .map(|definition| definition.factory)
        .ok_or_else(|| HmrError::Evaluation {
            module: id.to_string(),
            source: EvalError::NotDefined(id.to_string()),
        })?;
    let (exports, hot): (ExportTable, HotContext) = registry
        .evaluate_detached(id, factory.as_ref(), &Staged::default())
        .map_err(|source| HmrError::Evaluation {
            module: id.to_string(),
            source,
        })?;
    dispose(registry, id);
    registry.commit(id, None, &exports, hot.clone());
    Ok(hot)
}
