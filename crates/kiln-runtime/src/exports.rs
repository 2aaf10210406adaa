//! Shared export tables.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use rustc_hash::FxBuildHasher;
use serde_json::Value;

type Bindings = IndexMap<String, Value, FxBuildHasher>;

#[derive(Debug)]
enum Slot {
    Bindings(Bindings),
    /// A staged table that was committed into another one.
    Forward(ExportTable),
}

impl Default for Slot {
    fn default() -> Self {
        Self::Bindings(Bindings::default())
    }
}

/// The exports of one module instance.
///
/// Cloning yields another handle to the same table. A module that imports
/// from a table reads through the handle whenever it needs a value, so it
/// observes bindings assigned later (cyclic imports) and bindings swapped in
/// by a hot update.
#[derive(Clone, Default)]
pub struct ExportTable {
    slot: Arc<RwLock<Slot>>,
}

impl ExportTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<R>(&self, f: impl FnOnce(&Bindings) -> R) -> R {
        match &*self.slot.read() {
            Slot::Bindings(bindings) => f(bindings),
            Slot::Forward(target) => target.read(f),
        }
    }

    /// Current value of a binding.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.read(|bindings| bindings.get(name).cloned())
    }

    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) {
        let mut slot = self.slot.write();
        match &mut *slot {
            Slot::Bindings(bindings) => {
                bindings.insert(name.into(), value.into());
            }
            Slot::Forward(target) => target.set(name, value),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read(|bindings| bindings.contains_key(name))
    }

    /// Binding names in assignment order.
    pub fn names(&self) -> Vec<String> {
        self.read(|bindings| bindings.keys().cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.read(Bindings::len)
    }

    pub fn is_empty(&self) -> bool {
        self.read(Bindings::is_empty)
    }

    /// Replace every binding with those of `other`, keeping this handle.
    pub fn replace_with(&self, other: &ExportTable) {
        if self.same_table(other) {
            return;
        }
        let fresh = other.read(Bindings::clone);
        *self.slot.write() = Slot::Bindings(fresh);
    }

    /// Copy this staged table into `live` and route every handle of it to
    /// `live` from now on.
    pub(crate) fn commit_into(&self, live: &ExportTable) {
        if self.same_table(live) {
            return;
        }
        live.replace_with(self);
        *self.slot.write() = Slot::Forward(live.clone());
    }

    /// Whether both handles resolve to the same table.
    pub fn same_table(&self, other: &ExportTable) -> bool {
        Arc::ptr_eq(&self.resolved().slot, &other.resolved().slot)
    }

    fn resolved(&self) -> ExportTable {
        match &*self.slot.read() {
            Slot::Bindings(_) => self.clone(),
            Slot::Forward(target) => target.resolved(),
        }
    }
}

impl fmt::Debug for ExportTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.read(|bindings| f.debug_map().entries(bindings.iter()).finish())
    }
}
