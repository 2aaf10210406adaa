//! Read-only queries on ModuleGraph.

use std::sync::Arc;

use super::inner::ModuleGraph;
use crate::Result;
use crate::error::GraphError;
use crate::module::{DependencyEdge, Module};
use crate::module_id::ModuleId;

impl ModuleGraph {
    pub fn module(&self, id: &ModuleId) -> Option<Arc<Module>> {
        self.inner.read().modules.get(id).cloned()
    }

    pub fn contains(&self, id: &ModuleId) -> bool {
        self.inner.read().modules.contains_key(id)
    }

    /// All modules in discovery order.
    pub fn modules(&self) -> Vec<Arc<Module>> {
        self.inner.read().modules.values().cloned().collect()
    }

    pub fn module_ids(&self) -> Vec<ModuleId> {
        self.inner.read().modules.keys().cloned().collect()
    }

    /// Position of a module in discovery order.
    pub fn discovery_index(&self, id: &ModuleId) -> Option<usize> {
        self.inner.read().modules.get_index_of(id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().modules.is_empty()
    }

    /// Named entries in declaration order.
    pub fn entries(&self) -> Vec<(String, ModuleId)> {
        self.inner
            .read()
            .entries
            .iter()
            .map(|(name, id)| (name.clone(), id.clone()))
            .collect()
    }

    pub fn entry_ids(&self) -> Vec<ModuleId> {
        self.inner.read().entries.values().cloned().collect()
    }

    pub fn is_entry(&self, id: &ModuleId) -> bool {
        self.inner.read().entries.values().any(|entry| entry == id)
    }

    /// Outgoing edges of a module.
    pub fn dependencies(&self, id: &ModuleId) -> Vec<DependencyEdge> {
        self.inner
            .read()
            .modules
            .get(id)
            .map(|module| module.dependencies.as_ref().clone())
            .unwrap_or_default()
    }

    /// Modules that statically import `id`, in the order the edges were added.
    pub fn dependents(&self, id: &ModuleId) -> Vec<ModuleId> {
        self.inner
            .read()
            .dependents
            .get(id)
            .map(|importers| importers.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Check that every entry and every resolved edge target is in the graph.
    pub fn validate(&self) -> Result<()> {
        let inner = self.inner.read();
        for id in inner.entries.values() {
            if !inner.modules.contains_key(id) {
                return Err(GraphError::UnknownModule(id.clone()));
            }
        }
        for module in inner.modules.values() {
            for edge in module.dependencies.iter() {
                if let Some(target) = &edge.target {
                    if !inner.modules.contains_key(target) {
                        return Err(GraphError::DanglingEdge {
                            from: module.id.clone(),
                            to: target.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}
