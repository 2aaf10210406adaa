use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;
use rustc_hash::FxBuildHasher;

use crate::module::Module;
use crate::module_id::ModuleId;

pub(super) type FxIndexMap<K, V> = IndexMap<K, V, FxBuildHasher>;
pub(super) type FxIndexSet<T> = IndexSet<T, FxBuildHasher>;

/// Dependency graph of one build.
///
/// Modules are kept in discovery order. Edges live on the modules themselves
/// and point at targets by identity, so cycles need no special handling; a
/// reverse index of static importers is maintained alongside.
///
/// Cloning the handle shares the graph. Use [`ModuleGraph::snapshot`] for an
/// independent copy.
#[derive(Debug, Clone, Default)]
pub struct ModuleGraph {
    pub(super) inner: Arc<RwLock<GraphInner>>,
}

#[derive(Debug, Clone, Default)]
pub(super) struct GraphInner {
    pub modules: FxIndexMap<ModuleId, Arc<Module>>,
    /// Target → modules that import it statically.
    pub dependents: FxIndexMap<ModuleId, FxIndexSet<ModuleId>>,
    /// Entry name → entry module, in declaration order.
    pub entries: FxIndexMap<String, ModuleId>,
}

impl GraphInner {
    pub fn link(&mut self, module: &Module) {
        for edge in module.static_dependencies() {
            if let Some(target) = &edge.target {
                self.dependents
                    .entry(target.clone())
                    .or_default()
                    .insert(module.id.clone());
            }
        }
    }

    pub fn unlink(&mut self, module: &Module) {
        for edge in module.static_dependencies() {
            if let Some(target) = &edge.target {
                if let Some(importers) = self.dependents.get_mut(target) {
                    importers.shift_remove(&module.id);
                    if importers.is_empty() {
                        self.dependents.shift_remove(target);
                    }
                }
            }
        }
    }
}
