//! Hot update payloads.

use std::path::Path;

use kiln_graph::{Module, ShakeResult};
use kiln_runtime::{HmrPayload, ModuleUpdate};

use super::BuildState;

/// Modules that differ between two committed builds.
///
/// A module is sent when it is new to the output, or when its source or its
/// static dependencies changed. Modules that left the output are listed as
/// removed.
pub(super) fn diff(
    previous: &BuildState,
    next: &BuildState,
    root: &Path,
    generation: u64,
) -> HmrPayload {
    let mut payload = HmrPayload {
        generation,
        ..HmrPayload::default()
    };

    for module in next.graph.modules() {
        if !next.shake.is_included(&module.id) {
            continue;
        }
        let dependencies = static_keys(&module, &next.shake, root);
        let unchanged = previous
            .graph
            .module(&module.id)
            .filter(|old| previous.shake.is_included(&old.id))
            .is_some_and(|old| {
                old.content_hash == module.content_hash
                    && static_keys(&old, &previous.shake, root) == dependencies
            });
        if unchanged {
            continue;
        }

        payload.modules.push(ModuleUpdate {
            id: module.id.relative_key(root),
            source: module.source.to_string(),
            dependencies,
            hash: module.content_hash.to_hex(),
        });
    }

    for module in previous.graph.modules() {
        if previous.shake.is_included(&module.id) && !next.shake.is_included(&module.id) {
            payload.removed.push(module.id.relative_key(root));
        }
    }

    tracing::debug!(
        generation,
        modules = payload.modules.len(),
        removed = payload.removed.len(),
        "hot update computed"
    );
    payload
}

/// Keys of the included static dependencies, in import order.
fn static_keys(module: &Module, shake: &ShakeResult, root: &Path) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for target in module
        .static_dependencies()
        .filter_map(|edge| edge.target.as_ref())
        .filter(|target| shake.is_included(target))
    {
        let key = target.relative_key(root);
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}
