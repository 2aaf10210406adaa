//! Reachability over ModuleGraph.

use std::collections::VecDeque;

use rustc_hash::FxHashSet;

use super::inner::{FxIndexSet, GraphInner, ModuleGraph};
use crate::module_id::ModuleId;

fn reachable_from_entries(inner: &GraphInner) -> FxIndexSet<ModuleId> {
    let mut visited = FxIndexSet::default();
    let mut queue: VecDeque<ModuleId> = inner.entries.values().cloned().collect();

    while let Some(id) = queue.pop_front() {
        if !visited.insert(id.clone()) {
            continue;
        }
        let Some(module) = inner.modules.get(&id) else {
            continue;
        };
        for edge in module.dependencies.iter() {
            if let Some(target) = &edge.target {
                if !visited.contains(target) {
                    queue.push_back(target.clone());
                }
            }
        }
    }
    visited
}

impl ModuleGraph {
    /// Modules reachable from any entry over static and dynamic edges, in
    /// breadth-first order.
    pub fn reachable(&self) -> Vec<ModuleId> {
        reachable_from_entries(&self.inner.read())
            .into_iter()
            .collect()
    }

    /// Remove modules no entry can reach. Returns them in discovery order.
    pub fn prune_unreachable(&self) -> Vec<ModuleId> {
        let mut inner = self.inner.write();
        let reachable: FxHashSet<ModuleId> = reachable_from_entries(&inner).into_iter().collect();

        let unreachable: Vec<ModuleId> = inner
            .modules
            .keys()
            .filter(|id| !reachable.contains(*id))
            .cloned()
            .collect();

        for id in &unreachable {
            if let Some(module) = inner.modules.shift_remove(id) {
                inner.unlink(&module);
            }
        }
        unreachable
    }
}
