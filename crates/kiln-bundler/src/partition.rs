//! Chunk graph partitioning.
//!
//! Chunks are created in a fixed order, so ids and member order only depend
//! on the graph:
//!
//! 1. the runtime chunk;
//! 2. the vendor chunk, holding every module reached by the static traversal
//!    of two or more entries (and, with `split_node_modules`, every module
//!    under `node_modules`);
//! 3. one chunk per entry, in declaration order, holding the rest of its
//!    static traversal;
//! 4. async chunks, one per dynamic import target, discovered from a
//!    worklist seeded with the vendor and entry chunks.
//!
//! An async chunk holds the static traversal of its target, minus vendor
//! modules and minus whatever the call-site chunk already has loaded. When a
//! second call site with less loaded reuses the chunk, the missing modules
//! are added to it.

use std::collections::VecDeque;
use std::sync::Arc;

use kiln_config::OptimizationConfig;
use kiln_graph::{DependencyKind, Module, ModuleGraph, ModuleId, ShakeResult};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::chunk::{Chunk, ChunkGraph, ChunkKind, FxIndexSet};
use crate::error::PartitionInvariantError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionOptions {
    pub runtime_chunk: String,
    pub vendor_chunk: String,
    pub split_node_modules: bool,
}

impl Default for PartitionOptions {
    fn default() -> Self {
        Self {
            runtime_chunk: "runtime".to_string(),
            vendor_chunk: "vendor".to_string(),
            split_node_modules: false,
        }
    }
}

impl From<&OptimizationConfig> for PartitionOptions {
    fn from(config: &OptimizationConfig) -> Self {
        Self {
            runtime_chunk: config.runtime_chunk.clone(),
            vendor_chunk: config.vendor_chunk.clone(),
            split_node_modules: config.split_node_modules,
        }
    }
}

/// Splits a tree-shaken module graph into chunks.
#[derive(Debug, Clone, Default)]
pub struct Partitioner {
    options: PartitionOptions,
}

impl Partitioner {
    pub fn new(options: PartitionOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &PartitionOptions {
        &self.options
    }

    pub fn partition(
        &self,
        graph: &ModuleGraph,
        shake: &ShakeResult,
    ) -> Result<ChunkGraph, PartitionInvariantError> {
        let modules: FxHashMap<ModuleId, Arc<Module>> = graph
            .modules()
            .into_iter()
            .map(|module| (module.id.clone(), module))
            .collect();
        let reach = Reach {
            modules: &modules,
            shake,
        };

        let mut ids = IdAllocator::default();
        let runtime_id = ids.claim(&self.options.runtime_chunk);
        let mut chunks = ChunkGraph::new(runtime_id.clone());
        chunks.insert(Chunk::new(
            runtime_id.clone(),
            self.options.runtime_chunk.clone(),
            ChunkKind::Runtime,
        ));

        let traversals: Vec<(String, FxIndexSet<ModuleId>)> = graph
            .entries()
            .into_iter()
            .map(|(name, entry)| (name, reach.from([entry], |_| false)))
            .collect();

        let mut visits: FxHashMap<&ModuleId, usize> = FxHashMap::default();
        let mut discovered: FxIndexSet<&ModuleId> = FxIndexSet::default();
        for (_, visited) in &traversals {
            for id in visited {
                *visits.entry(id).or_default() += 1;
                discovered.insert(id);
            }
        }
        let vendor_members: FxIndexSet<ModuleId> = discovered
            .into_iter()
            .filter(|id| {
                visits.get(id).copied().unwrap_or_default() >= 2
                    || (self.options.split_node_modules && id.is_in_node_modules())
            })
            .cloned()
            .collect();

        let vendor_id = if vendor_members.is_empty() {
            None
        } else {
            let id = ids.claim(&self.options.vendor_chunk);
            let mut chunk = Chunk::new(id.clone(), self.options.vendor_chunk.clone(), ChunkKind::Vendor);
            chunk.modules = vendor_members.clone();
            chunk.add_dependency(runtime_id.clone(), DependencyKind::Static);
            chunks.insert(chunk);
            Some(id)
        };

        let mut pending: VecDeque<String> = vendor_id.iter().cloned().collect();
        for (name, visited) in traversals {
            let id = ids.claim(&name);
            let mut chunk = Chunk::new(id.clone(), name, ChunkKind::Entry);
            chunk.add_dependency(runtime_id.clone(), DependencyKind::Static);
            let mut uses_vendor = false;
            for module in visited {
                if vendor_members.contains(&module) {
                    uses_vendor = true;
                } else {
                    chunk.modules.insert(module);
                }
            }
            if let (true, Some(vendor)) = (uses_vendor, &vendor_id) {
                chunk.add_dependency(vendor.clone(), DependencyKind::Static);
            }
            chunks.insert(chunk);
            pending.push_back(id);
        }

        let vendor = vendor_id.as_deref().map(|id| (id, &vendor_members));
        while let Some(site) = pending.pop_front() {
            let available = available_in(&chunks, &site);
            let members: Vec<ModuleId> = match chunks.chunk(&site) {
                Some(chunk) => chunk.modules.iter().cloned().collect(),
                None => continue,
            };

            for member in members {
                let Some(module) = modules.get(&member) else {
                    continue;
                };
                for edge in module.dynamic_dependencies() {
                    let Some(target) = &edge.target else {
                        continue;
                    };
                    if !shake.is_included(target) || available.contains(target) {
                        continue;
                    }

                    let required = reach.from([target.clone()], |id| {
                        available.contains(id) || vendor_members.contains(id)
                    });
                    let existing = chunks.async_chunk_for(target).map(|chunk| chunk.id.clone());
                    let async_id = match existing {
                        Some(id) => {
                            let mut grew = false;
                            if let Some(chunk) = chunks.chunk_mut(&id) {
                                for module in required {
                                    grew |= chunk.modules.insert(module);
                                }
                                link_vendor(chunk, &modules, vendor);
                            }
                            if grew {
                                tracing::trace!(chunk = %id, from = %site, "async chunk extended");
                                pending.push_back(id.clone());
                            }
                            id
                        }
                        None => {
                            let name = edge
                                .chunk_name
                                .clone()
                                .or_else(|| target.file_stem().map(str::to_string))
                                .unwrap_or_else(|| "chunk".to_string());
                            let id = ids.claim(&name);
                            let mut chunk = Chunk::new(id.clone(), name, ChunkKind::Async);
                            chunk.modules = required;
                            chunk.add_dependency(runtime_id.clone(), DependencyKind::Static);
                            link_vendor(&mut chunk, &modules, vendor);
                            chunks.insert(chunk);
                            chunks.set_async_target(target.clone(), id.clone());
                            pending.push_back(id.clone());
                            id
                        }
                    };

                    if let Some(chunk) = chunks.chunk_mut(&site) {
                        chunk.add_dependency(async_id, DependencyKind::Dynamic);
                    }
                }
            }
        }

        chunks.validate(shake)?;
        tracing::debug!(
            chunks = chunks.len(),
            vendor = vendor_members.len(),
            "chunk graph partitioned"
        );
        Ok(chunks)
    }
}

/// Modules loaded whenever `chunk` runs: its own and those of the chunks it
/// statically depends on.
fn available_in(chunks: &ChunkGraph, chunk: &str) -> FxHashSet<ModuleId> {
    chunks
        .load_order(chunk)
        .iter()
        .filter_map(|id| chunks.chunk(id))
        .flat_map(|chunk| chunk.modules.iter().cloned())
        .collect()
}

/// Add a static dependency on the vendor chunk when a member imports from it.
fn link_vendor(
    chunk: &mut Chunk,
    modules: &FxHashMap<ModuleId, Arc<Module>>,
    vendor: Option<(&str, &FxIndexSet<ModuleId>)>,
) {
    let Some((vendor_id, members)) = vendor else {
        return;
    };
    let uses_vendor = chunk.modules.iter().any(|id| {
        modules.get(id).is_some_and(|module| {
            module
                .static_dependencies()
                .filter_map(|edge| edge.target.as_ref())
                .any(|target| members.contains(target))
        })
    });
    if uses_vendor {
        chunk.add_dependency(vendor_id, DependencyKind::Static);
    }
}

struct Reach<'a> {
    modules: &'a FxHashMap<ModuleId, Arc<Module>>,
    shake: &'a ShakeResult,
}

impl Reach<'_> {
    /// Breadth-first traversal over static edges between included modules.
    fn from(
        &self,
        roots: impl IntoIterator<Item = ModuleId>,
        skip: impl Fn(&ModuleId) -> bool,
    ) -> FxIndexSet<ModuleId> {
        let mut visited = FxIndexSet::default();
        let mut queue = VecDeque::new();
        for root in roots {
            if self.shake.is_included(&root) && !skip(&root) && visited.insert(root.clone()) {
                queue.push_back(root);
            }
        }

        while let Some(id) = queue.pop_front() {
            let Some(module) = self.modules.get(&id) else {
                continue;
            };
            for edge in module.static_dependencies() {
                let Some(target) = &edge.target else {
                    continue;
                };
                if self.shake.is_included(target) && !skip(target) && visited.insert(target.clone())
                {
                    queue.push_back(target.clone());
                }
            }
        }
        visited
    }
}

#[derive(Debug, Default)]
struct IdAllocator {
    taken: FxHashSet<String>,
}

impl IdAllocator {
    /// `name`, or `name-N` when taken.
    fn claim(&mut self, name: &str) -> String {
        let base = if name.is_empty() { "chunk" } else { name };
        if self.taken.insert(base.to_string()) {
            return base.to_string();
        }
        let mut n = 1usize;
        loop {
            let candidate = format!("{base}-{n}");
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_graph::{DependencyEdge, Export, ImportedBindings, TreeShaker};

    fn id(path: &str) -> ModuleId {
        ModuleId::new(format!("/p/{path}")).unwrap()
    }

    fn edge(from: &str, to: &str, kind: DependencyKind) -> DependencyEdge {
        DependencyEdge {
            source: id(from),
            specifier: format!("./{to}"),
            target: Some(id(to)),
            kind,
            bindings: ImportedBindings::All,
            chunk_name: None,
        }
    }

    fn module(path: &str, edges: Vec<DependencyEdge>) -> Module {
        Module::builder(id(path), format!("// {path}"))
            .dependencies(edges)
            .export(Export::local("value"))
            .build()
    }

    fn partition_with(
        options: PartitionOptions,
        entries: &[(&str, &str)],
        modules: Vec<Module>,
    ) -> ChunkGraph {
        let graph = ModuleGraph::from_modules(
            entries.iter().map(|(name, path)| (name.to_string(), id(path))),
            modules,
        )
        .unwrap();
        let shake = TreeShaker::new().shake(&graph);
        Partitioner::new(options).partition(&graph, &shake).unwrap()
    }

    fn partition(entries: &[(&str, &str)], modules: Vec<Module>) -> ChunkGraph {
        partition_with(PartitionOptions::default(), entries, modules)
    }

    fn members(chunks: &ChunkGraph, chunk: &str) -> Vec<String> {
        chunks
            .chunk(chunk)
            .unwrap()
            .modules
            .iter()
            .map(|id| id.relative_key(std::path::Path::new("/p")))
            .collect()
    }

    use DependencyKind::{Dynamic, Static};

    fn two_entries() -> Vec<Module> {
        vec![
            module(
                "a.js",
                vec![edge("a.js", "shared.js", Static), edge("a.js", "extra.js", Dynamic)],
            ),
            module("b.js", vec![edge("b.js", "shared.js", Static)]),
            module("shared.js", vec![]),
            module("extra.js", vec![]),
        ]
    }

    #[test]
    fn shared_module_moves_to_vendor() {
        let chunks = partition(&[("app", "a.js"), ("print", "b.js")], two_entries());

        assert_eq!(
            chunks.ids().collect::<Vec<_>>(),
            ["runtime", "vendor", "app", "print", "extra"]
        );
        assert_eq!(members(&chunks, "vendor"), ["shared.js"]);
        assert_eq!(members(&chunks, "app"), ["a.js"]);
        assert_eq!(members(&chunks, "print"), ["b.js"]);
        assert_eq!(members(&chunks, "extra"), ["extra.js"]);

        let app = chunks.chunk("app").unwrap();
        assert_eq!(app.static_dependencies().collect::<Vec<_>>(), ["runtime", "vendor"]);
        assert_eq!(app.async_dependencies().collect::<Vec<_>>(), ["extra"]);
        assert!(!chunks.chunk("print").unwrap().depends_on("extra"));
        assert!(chunks.runtime().unwrap().dependencies.is_empty());
        assert_eq!(chunks.async_chunk_for(&id("extra.js")).unwrap().kind, ChunkKind::Async);
    }

    #[test]
    fn statically_available_target_gets_no_async_chunk() {
        let chunks = partition(
            &[("app", "a.js")],
            vec![
                module(
                    "a.js",
                    vec![edge("a.js", "x.js", Static), edge("a.js", "x.js", Dynamic)],
                ),
                module("x.js", vec![]),
            ],
        );
        assert_eq!(chunks.ids().collect::<Vec<_>>(), ["runtime", "app"]);
        assert_eq!(members(&chunks, "app"), ["a.js", "x.js"]);
    }

    #[test]
    fn one_async_chunk_per_target() {
        let chunks = partition(
            &[("app", "a.js"), ("print", "b.js")],
            vec![
                module("a.js", vec![edge("a.js", "page.js", Dynamic)]),
                module("b.js", vec![edge("b.js", "page.js", Dynamic)]),
                module("page.js", vec![]),
            ],
        );
        assert_eq!(chunks.ids().collect::<Vec<_>>(), ["runtime", "app", "print", "page"]);
        assert!(chunks.chunk("app").unwrap().depends_on("page"));
        assert!(chunks.chunk("print").unwrap().depends_on("page"));
    }

    #[test]
    fn reused_async_chunk_gains_what_the_new_call_site_lacks() {
        let chunks = partition(
            &[("app", "a.js"), ("print", "b.js")],
            vec![
                module(
                    "a.js",
                    vec![edge("a.js", "util.js", Static), edge("a.js", "page.js", Dynamic)],
                ),
                module("b.js", vec![edge("b.js", "page.js", Dynamic)]),
                module("page.js", vec![edge("page.js", "util.js", Static)]),
                module("util.js", vec![]),
            ],
        );
        assert_eq!(members(&chunks, "app"), ["a.js", "util.js"]);
        assert_eq!(members(&chunks, "page"), ["page.js", "util.js"]);
    }

    #[test]
    fn async_chunks_link_to_vendor_instead_of_copying_it() {
        let chunks = partition(
            &[("app", "a.js"), ("print", "b.js")],
            vec![
                module(
                    "a.js",
                    vec![edge("a.js", "shared.js", Static), edge("a.js", "page.js", Dynamic)],
                ),
                module("b.js", vec![edge("b.js", "shared.js", Static)]),
                module("page.js", vec![edge("page.js", "shared.js", Static)]),
                module("shared.js", vec![]),
            ],
        );
        assert_eq!(members(&chunks, "page"), ["page.js"]);
        let page = chunks.chunk("page").unwrap();
        assert_eq!(page.static_dependencies().collect::<Vec<_>>(), ["runtime", "vendor"]);
        assert_eq!(chunks.load_order("page"), ["runtime", "vendor", "page"]);
    }

    #[test]
    fn nested_dynamic_imports() {
        let chunks = partition(
            &[("app", "a.js")],
            vec![
                module("a.js", vec![edge("a.js", "one.js", Dynamic)]),
                module("one.js", vec![edge("one.js", "two.js", Dynamic)]),
                module("two.js", vec![edge("two.js", "one.js", Dynamic)]),
            ],
        );
        assert_eq!(chunks.ids().collect::<Vec<_>>(), ["runtime", "app", "one", "two"]);
        assert!(chunks.chunk("one").unwrap().depends_on("two"));
        assert!(chunks.chunk("two").unwrap().depends_on("one"));
    }

    #[test]
    fn chunk_names_come_from_hints_and_ids_stay_unique() {
        let mut hinted = edge("a.js", "settings/index.js", Dynamic);
        hinted.chunk_name = Some("settings".to_string());
        let chunks = partition(
            &[("app", "a.js")],
            vec![
                module("a.js", vec![hinted, edge("a.js", "lazy/app.js", Dynamic)]),
                module("settings/index.js", vec![]),
                module("lazy/app.js", vec![]),
            ],
        );
        assert_eq!(
            chunks.ids().collect::<Vec<_>>(),
            ["runtime", "app", "settings", "app-1"]
        );
        let lazy = chunks.chunk("app-1").unwrap();
        assert_eq!(lazy.name, "app");
        assert_eq!(lazy.kind, ChunkKind::Async);
    }

    #[test]
    fn node_modules_split_into_vendor() {
        let modules = vec![
            module("a.js", vec![edge("a.js", "node_modules/lib/index.js", Static)]),
            module("node_modules/lib/index.js", vec![]),
        ];
        let plain = partition(&[("app", "a.js")], modules.clone());
        assert_eq!(plain.ids().collect::<Vec<_>>(), ["runtime", "app"]);

        let split = partition_with(
            PartitionOptions {
                split_node_modules: true,
                ..Default::default()
            },
            &[("app", "a.js")],
            modules,
        );
        assert_eq!(members(&split, "vendor"), ["node_modules/lib/index.js"]);
        assert_eq!(members(&split, "app"), ["a.js"]);
    }

    #[test]
    fn excluded_modules_are_not_assigned() {
        let unused = Module::builder(id("unused.js"), "export const x = 1;")
            .export(Export::local("x"))
            .side_effect_free(true)
            .build();
        let mut import = edge("a.js", "unused.js", Static);
        import.bindings = ImportedBindings::side_effect_only();
        let chunks = partition(&[("app", "a.js")], vec![module("a.js", vec![import]), unused]);

        assert_eq!(members(&chunks, "app"), ["a.js"]);
        assert_eq!(chunks.chunks_of(&id("unused.js")).count(), 0);
    }

    #[test]
    fn partitioning_is_deterministic() {
        let first = partition(&[("app", "a.js"), ("print", "b.js")], two_entries());
        let second = partition(&[("app", "a.js"), ("print", "b.js")], two_entries());
        for (a, b) in first.chunks().zip(second.chunks()) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.modules, b.modules);
            assert_eq!(a.dependencies, b.dependencies);
        }
    }

    #[test]
    fn validate_reports_broken_invariants() {
        let graph = ModuleGraph::from_modules(
            [("app".to_string(), id("a.js"))],
            [module("a.js", vec![])],
        )
        .unwrap();
        let shake = TreeShaker::new().shake(&graph);

        let mut chunks = ChunkGraph::new("runtime");
        chunks.insert(Chunk::new("runtime", "runtime", ChunkKind::Runtime));
        assert_eq!(
            chunks.validate(&shake),
            Err(PartitionInvariantError::Unassigned(id("a.js")))
        );

        let mut app = Chunk::new("app", "app", ChunkKind::Entry);
        app.modules.insert(id("a.js"));
        chunks.insert(app);
        assert_eq!(
            chunks.validate(&shake),
            Err(PartitionInvariantError::Detached("app".into()))
        );

        if let Some(runtime) = chunks.chunk_mut("runtime") {
            runtime.add_dependency("app", Static);
        }
        assert_eq!(
            chunks.validate(&shake),
            Err(PartitionInvariantError::RuntimeHasDependencies("runtime".into()))
        );
    }
}
