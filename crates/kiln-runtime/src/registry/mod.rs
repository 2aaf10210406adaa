//! Module definitions and instances.
//!
//! A [`Registry`] is created by the runtime chunk and passed, through a
//! [`ModuleContext`], to every module it evaluates. Nothing about it is
//! global: two registries in one process are fully independent.

mod context;

pub use context::{AcceptEvent, AcceptHandler, DisposeHandler, HotContext, ModuleContext};

use std::fmt;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;
use rustc_hash::{FxBuildHasher, FxHashMap};

use crate::error::EvalError;
use crate::exports::ExportTable;

/// Tables evaluated during a hot update but not yet committed.
pub(crate) type Staged = FxHashMap<String, ExportTable>;

/// Code of one module, evaluated against a [`ModuleContext`].
pub trait ModuleFactory: Send + Sync + fmt::Debug {
    fn evaluate(&self, ctx: &mut ModuleContext<'_>) -> Result<(), EvalError>;
}

/// [`ModuleFactory`] backed by a closure.
pub struct FnFactory<F>(F);

impl<F> FnFactory<F> {
    pub fn new(f: F) -> Self
    where
        F: Fn(&mut ModuleContext<'_>) -> Result<(), EvalError> + Send + Sync + 'static,
    {
        Self(f)
    }

    /// Boxed as a shareable factory.
    pub fn shared(f: F) -> Arc<dyn ModuleFactory>
    where
        F: Fn(&mut ModuleContext<'_>) -> Result<(), EvalError> + Send + Sync + 'static,
    {
        Arc::new(Self(f))
    }
}

impl<F> fmt::Debug for FnFactory<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnFactory")
    }
}

impl<F> ModuleFactory for FnFactory<F>
where
    F: Fn(&mut ModuleContext<'_>) -> Result<(), EvalError> + Send + Sync,
{
    fn evaluate(&self, ctx: &mut ModuleContext<'_>) -> Result<(), EvalError> {
        (self.0)(ctx)
    }
}

/// Turns shipped module source into a factory.
pub trait ModuleCompiler: Send + Sync + fmt::Debug {
    fn compile(&self, id: &str, source: &str) -> Result<Arc<dyn ModuleFactory>, EvalError>;
}

/// A module known to the registry, instantiated or not.
#[derive(Debug, Clone)]
pub struct ModuleDefinition {
    pub id: String,
    /// Static dependencies, used to find importers during hot updates.
    pub dependencies: Vec<String>,
    pub factory: Arc<dyn ModuleFactory>,
}

impl ModuleDefinition {
    pub fn new(id: impl Into<String>, factory: Arc<dyn ModuleFactory>) -> Self {
        Self {
            id: id.into(),
            dependencies: Vec::new(),
            factory,
        }
    }

    pub fn dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug)]
struct Instance {
    exports: ExportTable,
    /// `false` while the factory is still running.
    evaluated: bool,
    hot: HotContext,
}

#[derive(Debug, Default)]
struct State {
    definitions: FxHashMap<String, ModuleDefinition>,
    /// Instances in instantiation order.
    instances: IndexMap<String, Instance, FxBuildHasher>,
    entries: IndexSet<String, FxBuildHasher>,
}

/// Module registry of one running bundle.
///
/// The lock is never held while a factory runs, so factories may require
/// other modules (including ones that are mid-evaluation) freely.
#[derive(Debug, Default)]
pub struct Registry {
    state: RwLock<State>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module. Returns the definition it replaces.
    pub fn define(&self, definition: ModuleDefinition) -> Option<ModuleDefinition> {
        self.state
            .write()
            .definitions
            .insert(definition.id.clone(), definition)
    }

    pub fn is_defined(&self, id: &str) -> bool {
        self.state.read().definitions.contains_key(id)
    }

    pub fn definition(&self, id: &str) -> Option<ModuleDefinition> {
        self.state.read().definitions.get(id).cloned()
    }

    /// Mark a module as an entry: hot updates never propagate past it.
    pub fn mark_entry(&self, id: impl Into<String>) {
        self.state.write().entries.insert(id.into());
    }

    pub fn is_entry(&self, id: &str) -> bool {
        self.state.read().entries.contains(id)
    }

    pub fn is_instantiated(&self, id: &str) -> bool {
        self.state.read().instances.contains_key(id)
    }

    /// Whether the module's factory has finished running.
    pub fn is_evaluated(&self, id: &str) -> bool {
        self.state
            .read()
            .instances
            .get(id)
            .is_some_and(|instance| instance.evaluated)
    }

    /// Export table of an instantiated module.
    pub fn exports(&self, id: &str) -> Option<ExportTable> {
        self.state
            .read()
            .instances
            .get(id)
            .map(|instance| instance.exports.clone())
    }

    /// Instantiated modules in instantiation order.
    pub fn instantiated(&self) -> Vec<String> {
        self.state.read().instances.keys().cloned().collect()
    }

    /// Exports of `id`, evaluating it first if needed.
    ///
    /// A module that is still being evaluated (a cycle) yields its partially
    /// filled table; the importer sees the remaining bindings once it reads
    /// them. A factory error un-instantiates the module.
    pub fn require(&self, id: &str) -> Result<ExportTable, EvalError> {
        let (definition, exports) = {
            let mut state = self.state.write();
            if let Some(instance) = state.instances.get(id) {
                return Ok(instance.exports.clone());
            }
            let definition = state
                .definitions
                .get(id)
                .cloned()
                .ok_or_else(|| EvalError::NotDefined(id.to_string()))?;
            let exports = ExportTable::new();
            state.instances.insert(
                id.to_string(),
                Instance {
                    exports: exports.clone(),
                    evaluated: false,
                    hot: HotContext::default(),
                },
            );
            (definition, exports)
        };

        tracing::trace!(module = id, "evaluating");
        match self.run(id, definition.factory.as_ref(), exports.clone(), None) {
            Ok(hot) => {
                if let Some(instance) = self.state.write().instances.get_mut(id) {
                    instance.evaluated = true;
                    instance.hot = hot;
                }
                Ok(exports)
            }
            Err(err) => {
                self.state.write().instances.shift_remove(id);
                Err(err)
            }
        }
    }

    fn run(
        &self,
        id: &str,
        factory: &dyn ModuleFactory,
        exports: ExportTable,
        staged: Option<&Staged>,
    ) -> Result<HotContext, EvalError> {
        let mut ctx = ModuleContext::new(self, id, exports, staged);
        factory.evaluate(&mut ctx)?;
        Ok(ctx.into_hot())
    }

    /// Evaluate `factory` as module `id` into a fresh table without touching
    /// the live instance. Requires of modules in `staged` see their staged
    /// tables instead of the live ones.
    pub(crate) fn evaluate_detached(
        &self,
        id: &str,
        factory: &dyn ModuleFactory,
        staged: &Staged,
    ) -> Result<(ExportTable, HotContext), EvalError> {
        let exports = ExportTable::new();
        let hot = self.run(id, factory, exports.clone(), Some(staged))?;
        Ok((exports, hot))
    }

    /// Install a detached evaluation as the live instance of `id`. An
    /// existing instance keeps its table handle; only the bindings change,
    /// and handles to the staged table follow the live one.
    pub(crate) fn commit(
        &self,
        id: &str,
        definition: Option<ModuleDefinition>,
        exports: &ExportTable,
        hot: HotContext,
    ) {
        let mut state = self.state.write();
        if let Some(definition) = definition {
            state.definitions.insert(id.to_string(), definition);
        }
        match state.instances.get_mut(id) {
            Some(instance) => {
                exports.commit_into(&instance.exports);
                instance.evaluated = true;
                instance.hot = hot;
            }
            None => {
                state.instances.insert(
                    id.to_string(),
                    Instance {
                        exports: exports.clone(),
                        evaluated: true,
                        hot,
                    },
                );
            }
        }
    }

    /// Drop a module's instance and definition.
    pub(crate) fn remove(&self, id: &str) -> Option<ExportTable> {
        let mut state = self.state.write();
        state.definitions.remove(id);
        state.entries.shift_remove(id);
        state
            .instances
            .shift_remove(id)
            .map(|instance| instance.exports)
    }

    /// Hot registrations made by the live instance of `id`.
    pub(crate) fn hot(&self, id: &str) -> Option<HotContext> {
        self.state
            .read()
            .instances
            .get(id)
            .map(|instance| instance.hot.clone())
    }

    /// Static dependencies of every instantiated module, in instantiation
    /// order.
    pub(crate) fn instance_dependencies(&self) -> Vec<(String, Vec<String>)> {
        let state = self.state.read();
        state
            .instances
            .keys()
            .map(|id| {
                let dependencies = state
                    .definitions
                    .get(id)
                    .map(|definition| definition.dependencies.clone())
                    .unwrap_or_default();
                (id.clone(), dependencies)
            })
            .collect()
    }
}
