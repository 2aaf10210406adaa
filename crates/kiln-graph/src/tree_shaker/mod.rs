//! Dead-code elimination at module and export granularity.
//!
//! Demand flows from the entries through the graph:
//!
//! - every export of an entry module is live;
//! - a static edge from an included module demands its imported bindings
//!   (`All` demands every export), a dynamic edge demands everything;
//! - a named re-export forwards the demand to the binding it re-exports in
//!   the target module, and star re-exports forward names the module does not
//!   declare itself (never `default`).
//!
//! A reached module is included when it is an entry, when it may have side
//! effects, or when at least one of its exports is live. Only included
//! modules propagate demand through their own imports, so a side-effect-free
//! module nobody uses drops out together with everything only it imported.

pub mod guards;

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use indexmap::IndexMap;
use rustc_hash::{FxBuildHasher, FxHashMap, FxHashSet};

use crate::graph::ModuleGraph;
use crate::module::{DependencyKind, ExportKind, ImportedBindings, Module};
use crate::module_id::ModuleId;

/// Live exports of one module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveExports {
    all: bool,
    names: BTreeSet<String>,
}

impl LiveExports {
    /// Every export is live.
    pub fn all() -> Self {
        Self {
            all: true,
            names: BTreeSet::new(),
        }
    }

    pub fn is_all(&self) -> bool {
        self.all
    }

    pub fn is_empty(&self) -> bool {
        !self.all && self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.all || self.names.contains(name)
    }

    /// Sorted live names for `module`. `All` expands to the declared export
    /// names, plus `*` when the module has star re-exports.
    pub fn resolve(&self, module: &Module) -> Vec<String> {
        if !self.all {
            return self.names.iter().cloned().collect();
        }
        let mut names: BTreeSet<String> = module.export_names().map(str::to_string).collect();
        if module.star_exports().next().is_some() {
            names.insert("*".to_string());
        }
        names.into_iter().collect()
    }

    fn insert(&mut self, name: &str) -> bool {
        if self.contains(name) {
            return false;
        }
        self.names.insert(name.to_string())
    }

    fn set_all(&mut self) -> bool {
        if self.all {
            return false;
        }
        self.all = true;
        self.names.clear();
        true
    }
}

/// Outcome of [`TreeShaker::shake`].
#[derive(Debug, Clone, Default)]
pub struct ShakeResult {
    /// Live exports of every included module, in discovery order.
    live: IndexMap<ModuleId, LiveExports, FxBuildHasher>,
    excluded: Vec<ModuleId>,
}

impl ShakeResult {
    pub fn is_included(&self, id: &ModuleId) -> bool {
        self.live.contains_key(id)
    }

    pub fn live_exports(&self, id: &ModuleId) -> Option<&LiveExports> {
        self.live.get(id)
    }

    /// Included modules in discovery order.
    pub fn included(&self) -> impl Iterator<Item = &ModuleId> {
        self.live.keys()
    }

    pub fn included_count(&self) -> usize {
        self.live.len()
    }

    /// Modules in the graph that no chunk will contain, in discovery order.
    pub fn excluded(&self) -> &[ModuleId] {
        &self.excluded
    }
}

#[derive(Debug)]
enum Demand {
    All,
    Name(String),
}

#[derive(Debug)]
enum Work {
    Reach(ModuleId),
    Demand(ModuleId, Demand),
}

/// Export-level tree shaker.
#[derive(Debug, Clone)]
pub struct TreeShaker {
    enabled: bool,
}

impl Default for TreeShaker {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl TreeShaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// With shaking disabled every reachable module is included with all of
    /// its exports live.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn shake(&self, graph: &ModuleGraph) -> ShakeResult {
        let modules = graph.modules();
        let index: FxHashMap<&ModuleId, &Arc<Module>> =
            modules.iter().map(|module| (&module.id, module)).collect();

        let included = if self.enabled {
            Shake::new(&index).run(graph.entry_ids())
        } else {
            graph
                .reachable()
                .into_iter()
                .map(|id| (id, LiveExports::all()))
                .collect()
        };

        let mut live = IndexMap::with_capacity_and_hasher(included.len(), FxBuildHasher);
        let mut excluded = Vec::new();
        for module in &modules {
            match included.get(&module.id) {
                Some(exports) => {
                    live.insert(module.id.clone(), exports.clone());
                }
                None => excluded.push(module.id.clone()),
            }
        }

        tracing::debug!(
            included = live.len(),
            excluded = excluded.len(),
            "tree shaking complete"
        );
        ShakeResult { live, excluded }
    }
}

/// Whether `module` can provide an export called `name`: it declares it, it
/// may forward it through a star re-export, or it declares no exports at all
/// (CommonJS and other opaque modules).
fn provides(module: &Module, name: &str) -> bool {
    module.exports.is_empty()
        || module.find_export(name).is_some()
        || (name != "default" && module.star_exports().next().is_some())
}

struct Shake<'a> {
    index: &'a FxHashMap<&'a ModuleId, &'a Arc<Module>>,
    reached: FxHashSet<ModuleId>,
    included: FxHashSet<ModuleId>,
    live: FxHashMap<ModuleId, LiveExports>,
    queue: VecDeque<Work>,
}

impl<'a> Shake<'a> {
    fn new(index: &'a FxHashMap<&'a ModuleId, &'a Arc<Module>>) -> Self {
        Self {
            index,
            reached: FxHashSet::default(),
            included: FxHashSet::default(),
            live: FxHashMap::default(),
            queue: VecDeque::new(),
        }
    }

    fn run(mut self, entries: Vec<ModuleId>) -> FxHashMap<ModuleId, LiveExports> {
        for entry in entries {
            self.queue.push_back(Work::Demand(entry, Demand::All));
        }

        while let Some(work) = self.queue.pop_front() {
            match work {
                Work::Reach(id) => {
                    if self.reached.insert(id.clone()) {
                        self.maybe_include(&id);
                    }
                }
                Work::Demand(id, demand) => {
                    self.reached.insert(id.clone());
                    self.apply_demand(&id, demand);
                    self.maybe_include(&id);
                }
            }
        }

        let Self { included, mut live, .. } = self;
        included
            .into_iter()
            .map(|id| {
                let exports = live.remove(&id).unwrap_or_default();
                (id, exports)
            })
            .collect()
    }

    fn apply_demand(&mut self, id: &ModuleId, demand: Demand) {
        let index = self.index;
        let Some(module) = index.get(id).copied() else {
            return;
        };
        if let Demand::Name(name) = &demand {
            if !provides(module, name) {
                return;
            }
        }
        let live = self.live.entry(id.clone()).or_default();

        match demand {
            Demand::All => {
                if !live.set_all() {
                    return;
                }
                for export in module.exports.iter() {
                    match &export.kind {
                        ExportKind::Local => {}
                        ExportKind::ReExport { specifier, imported } => {
                            let demand = if imported == "*" {
                                Demand::All
                            } else {
                                Demand::Name(imported.clone())
                            };
                            self.forward(module, specifier, demand);
                        }
                        ExportKind::Star { specifier } => {
                            self.forward(module, specifier, Demand::All);
                        }
                    }
                }
            }
            Demand::Name(name) => {
                if !live.insert(&name) {
                    return;
                }
                match module.find_export(&name).map(|export| &export.kind) {
                    Some(ExportKind::ReExport { specifier, imported }) => {
                        let demand = if imported == "*" {
                            Demand::All
                        } else {
                            Demand::Name(imported.clone())
                        };
                        self.forward(module, specifier, demand);
                    }
                    Some(_) => {}
                    None if name != "default" => {
                        for specifier in module.star_exports() {
                            self.forward(module, specifier, Demand::Name(name.clone()));
                        }
                    }
                    None => {}
                }
            }
        }
    }

    fn forward(&mut self, module: &Module, specifier: &str, demand: Demand) {
        if let Some(target) = module.target_of(specifier) {
            self.queue.push_back(Work::Demand(target.clone(), demand));
        }
    }

    fn maybe_include(&mut self, id: &ModuleId) {
        if self.included.contains(id) || !self.reached.contains(id) {
            return;
        }
        let index = self.index;
        let Some(module) = index.get(id).copied() else {
            return;
        };

        let live = self.live.get(id).is_some_and(|live| !live.is_empty());
        if module.side_effect_free && !module.is_entry && !live {
            return;
        }

        self.included.insert(id.clone());
        for edge in module.dependencies.iter() {
            let Some(target) = &edge.target else {
                continue;
            };
            self.queue.push_back(Work::Reach(target.clone()));
            match (edge.kind, &edge.bindings) {
                (DependencyKind::Dynamic, _) | (_, ImportedBindings::All) => {
                    self.queue.push_back(Work::Demand(target.clone(), Demand::All));
                }
                (DependencyKind::Static, ImportedBindings::Named(names)) => {
                    for name in names {
                        self.queue
                            .push_back(Work::Demand(target.clone(), Demand::Name(name.clone())));
                    }
                }
            }
        }
    }
}
