//! Finding accept boundaries for a batch of changed modules.

use std::collections::VecDeque;

use indexmap::IndexSet;
use rustc_hash::FxHashMap;

use super::wire::{HmrPayload, HmrUpdate};
use crate::error::HmrError;
use crate::registry::Registry;

/// Everything an update batch will do, computed before any mutation.
#[derive(Debug, Default)]
pub(crate) struct Plan {
    pub updates: Vec<HmrUpdate>,
    /// Modules to re-evaluate, changed modules before their importers.
    pub reevaluate: IndexSet<String>,
    /// `(boundary, dependency)` pairs whose accept handlers fire.
    pub accepts: IndexSet<(String, String)>,
}

pub(crate) fn plan(registry: &Registry, payload: &HmrPayload) -> Result<Plan, HmrError> {
    let dependents = dependents(registry, payload);
    let mut plan = Plan::default();

    for update in &payload.modules {
        let mut boundaries = Vec::new();
        if registry.is_instantiated(&update.id) {
            walk(registry, &dependents, &update.id, &mut plan, &mut boundaries)?;
        }
        plan.updates.push(HmrUpdate {
            module: update.id.clone(),
            source: update.source.clone(),
            boundaries,
        });
    }

    Ok(plan)
}

/// Instantiated importers of each module, using the new dependency lists of
/// the modules in the batch.
fn dependents(registry: &Registry, payload: &HmrPayload) -> FxHashMap<String, Vec<String>> {
    let overrides: FxHashMap<&str, &Vec<String>> = payload
        .modules
        .iter()
        .map(|update| (update.id.as_str(), &update.dependencies))
        .collect();

    let mut dependents: FxHashMap<String, Vec<String>> = FxHashMap::default();
    for (importer, dependencies) in registry.instance_dependencies() {
        let dependencies = overrides
            .get(importer.as_str())
            .map_or(&dependencies, |deps| *deps);
        for dependency in dependencies {
            dependents
                .entry(dependency.clone())
                .or_default()
                .push(importer.clone());
        }
    }
    dependents
}

/// Bubble one change up through importers until every path ends at a
/// boundary.
fn walk(
    registry: &Registry,
    dependents: &FxHashMap<String, Vec<String>>,
    changed: &str,
    plan: &mut Plan,
    boundaries: &mut Vec<String>,
) -> Result<(), HmrError> {
    let mut queue = VecDeque::from([changed.to_string()]);
    let mut seen: IndexSet<String> = IndexSet::from([changed.to_string()]);

    while let Some(module) = queue.pop_front() {
        plan.reevaluate.insert(module.clone());
        let hot = registry.hot(&module).unwrap_or_default();
        if hot.is_self_accepting() {
            boundaries.push(module.clone());
            plan.accepts.insert((module.clone(), module));
            continue;
        }

        let importers = dependents.get(&module).map(Vec::as_slice).unwrap_or_default();
        if registry.is_entry(&module) || importers.is_empty() {
            return Err(HmrError::NoAcceptBoundary {
                module: changed.to_string(),
            });
        }

        for importer in importers {
            let importer_hot = registry.hot(importer).unwrap_or_default();
            if importer_hot.declines(&module) {
                return Err(HmrError::Declined {
                    module: module.clone(),
                    by: importer.clone(),
                });
            }
            if importer_hot.accepts(&module) {
                if !boundaries.contains(importer) {
                    boundaries.push(importer.clone());
                }
                plan.accepts.insert((importer.clone(), module.clone()));
            } else if seen.insert(importer.clone()) {
                queue.push_back(importer.clone());
            }
        }
    }

    Ok(())
}
