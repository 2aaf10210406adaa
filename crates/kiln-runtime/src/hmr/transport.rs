//! Where updates come from.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;

use super::wire::{HmrPayload, ModuleUpdate, UpdateManifest};
use crate::error::TransportError;

/// Delivers hot updates. The network side lives outside this crate.
#[async_trait]
pub trait UpdateTransport: Send + Sync + fmt::Debug {
    /// Everything that changed after generation `since`. An empty manifest
    /// means no update is pending.
    async fn manifest(&self, since: u64) -> Result<UpdateManifest, TransportError>;

    /// Sources for the modules listed in `manifest`.
    async fn payload(&self, manifest: &UpdateManifest) -> Result<HmrPayload, TransportError>;
}

/// Transport backed by payloads published in-process (dev servers embedding
/// the runtime, tests).
#[derive(Debug, Clone, Default)]
pub struct InMemoryTransport {
    published: Arc<Mutex<Vec<HmrPayload>>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, payload: HmrPayload) {
        self.published.lock().push(payload);
    }

    /// Merge published payloads with `since < generation <= until`; later
    /// generations win.
    fn merged(&self, since: u64, until: u64) -> HmrPayload {
        let published = self.published.lock();
        let mut modules: IndexMap<String, ModuleUpdate> = IndexMap::new();
        let mut removed: IndexSet<String> = IndexSet::new();
        let mut generation = since;

        for payload in published
            .iter()
            .filter(|payload| payload.generation > since && payload.generation <= until)
        {
            generation = generation.max(payload.generation);
            for update in &payload.modules {
                removed.shift_remove(&update.id);
                modules.insert(update.id.clone(), update.clone());
            }
            for id in &payload.removed {
                modules.shift_remove(id);
                removed.insert(id.clone());
            }
        }

        HmrPayload {
            generation,
            modules: modules.into_values().collect(),
            removed: removed.into_iter().collect(),
        }
    }
}

#[async_trait]
impl UpdateTransport for InMemoryTransport {
    async fn manifest(&self, since: u64) -> Result<UpdateManifest, TransportError> {
        Ok(self.merged(since, u64::MAX).manifest())
    }

    async fn payload(&self, manifest: &UpdateManifest) -> Result<HmrPayload, TransportError> {
        let merged = self.merged(0, manifest.generation);
        if merged.generation < manifest.generation {
            return Err(TransportError::NoUpdate(manifest.generation));
        }
        let wanted: IndexSet<&str> = manifest.modules.iter().map(|m| m.id.as_str()).collect();
        Ok(HmrPayload {
            generation: manifest.generation,
            modules: merged
                .modules
                .into_iter()
                .filter(|update| wanted.contains(update.id.as_str()))
                .collect(),
            removed: manifest.removed.clone(),
        })
    }
}
