//! What a module sees while it is evaluated.

use std::fmt;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use serde_json::Value;

use super::{Registry, Staged};
use crate::error::EvalError;
use crate::exports::ExportTable;

/// Called on a boundary after one of its accepted dependencies was replaced.
pub type AcceptHandler = Arc<dyn Fn(&mut AcceptEvent<'_>) + Send + Sync>;

/// Called with the outgoing exports before a module is replaced or removed.
pub type DisposeHandler = Arc<dyn Fn(&ExportTable) + Send + Sync>;

/// Passed to a module factory.
pub struct ModuleContext<'a> {
    registry: &'a Registry,
    id: &'a str,
    exports: ExportTable,
    staged: Option<&'a Staged>,
    hot: HotContext,
}

impl<'a> ModuleContext<'a> {
    pub(crate) fn new(
        registry: &'a Registry,
        id: &'a str,
        exports: ExportTable,
        staged: Option<&'a Staged>,
    ) -> Self {
        Self {
            registry,
            id,
            exports,
            staged,
            hot: HotContext::default(),
        }
    }

    pub fn id(&self) -> &str {
        self.id
    }

    pub fn registry(&self) -> &Registry {
        self.registry
    }

    /// This module's export table.
    pub fn exports(&self) -> &ExportTable {
        &self.exports
    }

    pub fn export(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.exports.set(name, value);
    }

    /// Exports of a dependency. Keep the handle and read bindings when they
    /// are used rather than copying them out.
    pub fn require(&self, id: &str) -> Result<ExportTable, EvalError> {
        if let Some(table) = self.staged.and_then(|staged| staged.get(id)) {
            return Ok(table.clone());
        }
        self.registry.require(id)
    }

    /// Hot-update registrations for this module.
    pub fn hot(&mut self) -> &mut HotContext {
        &mut self.hot
    }

    pub(crate) fn into_hot(self) -> HotContext {
        self.hot
    }
}

impl fmt::Debug for ModuleContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleContext")
            .field("id", &self.id)
            .field("exports", &self.exports)
            .finish_non_exhaustive()
    }
}

/// Accept, decline and dispose registrations of one module instance.
#[derive(Clone, Default)]
pub struct HotContext {
    self_accepting: bool,
    self_handler: Option<AcceptHandler>,
    accepted: IndexMap<String, Option<AcceptHandler>>,
    declined: IndexSet<String>,
    dispose: Vec<DisposeHandler>,
}

impl HotContext {
    /// This module can be replaced without involving its importers.
    pub fn accept_self(&mut self) -> &mut Self {
        self.self_accepting = true;
        self
    }

    /// Like [`HotContext::accept_self`], with a callback run after the
    /// replacement.
    pub fn accept_self_with<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&mut AcceptEvent<'_>) + Send + Sync + 'static,
    {
        self.self_accepting = true;
        self.self_handler = Some(Arc::new(handler));
        self
    }

    /// This module handles updates of `dependency`.
    pub fn accept(&mut self, dependency: impl Into<String>) -> &mut Self {
        self.accepted.entry(dependency.into()).or_insert(None);
        self
    }

    pub fn accept_with<F>(&mut self, dependency: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(&mut AcceptEvent<'_>) + Send + Sync + 'static,
    {
        self.accepted
            .insert(dependency.into(), Some(Arc::new(handler)));
        self
    }

    /// Any update of `dependency` must fall back to a full reload.
    pub fn decline(&mut self, dependency: impl Into<String>) -> &mut Self {
        self.declined.insert(dependency.into());
        self
    }

    pub fn on_dispose<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&ExportTable) + Send + Sync + 'static,
    {
        self.dispose.push(Arc::new(handler));
        self
    }

    pub fn is_self_accepting(&self) -> bool {
        self.self_accepting
    }

    pub fn accepts(&self, dependency: &str) -> bool {
        self.accepted.contains_key(dependency)
    }

    pub fn declines(&self, dependency: &str) -> bool {
        self.declined.contains(dependency)
    }

    pub(crate) fn accept_handler(&self, dependency: &str) -> Option<AcceptHandler> {
        self.accepted.get(dependency).cloned().flatten()
    }

    pub(crate) fn self_handler(&self) -> Option<AcceptHandler> {
        self.self_handler.clone()
    }

    pub(crate) fn dispose_handlers(&self) -> &[DisposeHandler] {
        &self.dispose
    }
}

impl fmt::Debug for HotContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HotContext")
            .field("self_accepting", &self.self_accepting)
            .field("accepted", &self.accepted.keys().collect::<Vec<_>>())
            .field("declined", &self.declined)
            .field("dispose", &self.dispose.len())
            .finish()
    }
}

/// Argument of an accept handler.
#[derive(Debug)]
pub struct AcceptEvent<'a> {
    /// The module whose handler runs.
    pub boundary: &'a str,
    /// The replaced module (equal to `boundary` for self-acceptance).
    pub dependency: &'a str,
    /// Live exports of the replaced module, already updated.
    pub exports: &'a ExportTable,
    invalidated: Vec<String>,
}

impl<'a> AcceptEvent<'a> {
    pub(crate) fn new(boundary: &'a str, dependency: &'a str, exports: &'a ExportTable) -> Self {
        Self {
            boundary,
            dependency,
            exports,
            invalidated: Vec::new(),
        }
    }

    /// Ask for `module` to be re-evaluated as part of the same update.
    pub fn invalidate(&mut self, module: impl Into<String>) {
        self.invalidated.push(module.into());
    }

    pub(crate) fn into_invalidated(self) -> Vec<String> {
        self.invalidated
    }
}
