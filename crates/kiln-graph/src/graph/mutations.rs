//! Mutation methods for ModuleGraph.

use std::sync::Arc;

use super::inner::ModuleGraph;
use crate::Result;
use crate::error::GraphError;
use crate::module::Module;
use crate::module_id::ModuleId;

impl ModuleGraph {
    /// Register a named entry. Entry names are unique.
    pub fn add_entry(&self, name: impl Into<String>, id: ModuleId) -> Result<()> {
        let name = name.into();
        let mut inner = self.inner.write();
        if inner.entries.contains_key(&name) {
            return Err(GraphError::DuplicateEntry(name));
        }
        inner.entries.insert(name, id);
        Ok(())
    }

    /// Add a module, or replace the module with the same id.
    ///
    /// A replaced module keeps its position in discovery order.
    pub fn add_module(&self, module: Module) -> Option<Arc<Module>> {
        self.replace_module(module)
    }

    /// Swap in a recompiled module, recomputing the reverse index for its
    /// edges only. Returns the previous module.
    pub fn replace_module(&self, module: Module) -> Option<Arc<Module>> {
        let mut inner = self.inner.write();
        let previous = inner.modules.get(&module.id).cloned();
        if let Some(previous) = &previous {
            inner.unlink(previous);
        }
        inner.link(&module);
        inner.modules.insert(module.id.clone(), Arc::new(module));
        previous
    }

    /// Remove a module and its outgoing edges from the reverse index.
    pub fn remove_module(&self, id: &ModuleId) -> Option<Arc<Module>> {
        let mut inner = self.inner.write();
        let removed = inner.modules.shift_remove(id)?;
        inner.unlink(&removed);
        Some(removed)
    }
}
