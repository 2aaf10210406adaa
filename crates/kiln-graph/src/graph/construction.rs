//! Construction methods for ModuleGraph.

use std::sync::Arc;

use parking_lot::RwLock;

use super::inner::ModuleGraph;
use crate::Result;
use crate::module::Module;
use crate::module_id::ModuleId;

impl ModuleGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from entries and modules.
    pub fn from_modules<E, M>(entries: E, modules: M) -> Result<Self>
    where
        E: IntoIterator<Item = (String, ModuleId)>,
        M: IntoIterator<Item = Module>,
    {
        let graph = Self::new();
        for (name, id) in entries {
            graph.add_entry(name, id)?;
        }
        for module in modules {
            graph.add_module(module);
        }
        graph.validate()?;
        Ok(graph)
    }

    /// Deep copy: later mutations of either graph are not visible in the
    /// other. Modules themselves are shared.
    pub fn snapshot(&self) -> Self {
        let inner = self.inner.read().clone();
        Self {
            inner: Arc::new(RwLock::new(inner)),
        }
    }
}
