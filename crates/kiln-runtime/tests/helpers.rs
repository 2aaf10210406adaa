//! Shared test utilities for kiln-runtime tests.
//!
//! Module "source" in these tests is a small JSON description of what the
//! module does, compiled by [`JsonCompiler`] into a factory.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use kiln_runtime::{
    EvalError, FnFactory, HmrPayload, ModuleCompiler, ModuleDefinition, ModuleFactory,
    ModuleSource, ModuleUpdate, Registry,
};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Script {
    requires: Vec<String>,
    exports: BTreeMap<String, Value>,
    /// Export `value` of this dependency, copied at evaluation time.
    mirror: Option<String>,
    accept_self: bool,
    accepts: Vec<String>,
    declines: Vec<String>,
    /// Dependency → modules its accept handler invalidates.
    invalidate: BTreeMap<String, Vec<String>>,
    throws: Option<String>,
}

/// Compiles JSON module descriptions and records what the modules do.
#[derive(Debug, Clone, Default)]
pub struct JsonCompiler {
    log: Arc<Mutex<Vec<String>>>,
}

impl JsonCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events so far: `eval:x`, `accept:b<-c`, `dispose:x`.
    pub fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub fn clear(&self) {
        self.log.lock().clear();
    }

    pub fn factory(&self, source: &str) -> Arc<dyn ModuleFactory> {
        self.compile("test", source).unwrap()
    }
}

impl ModuleCompiler for JsonCompiler {
    fn compile(&self, id: &str, source: &str) -> Result<Arc<dyn ModuleFactory>, EvalError> {
        let script: Script = serde_json::from_str(source).map_err(|err| EvalError::Compile {
            module: id.to_string(),
            message: err.to_string(),
        })?;
        let script = Arc::new(script);
        let log = Arc::clone(&self.log);

        Ok(FnFactory::shared(move |ctx| {
            log.lock().push(format!("eval:{}", ctx.id()));
            if let Some(message) = &script.throws {
                return Err(EvalError::thrown(ctx.id(), message.clone()));
            }

            let mut tables = BTreeMap::new();
            for dependency in &script.requires {
                tables.insert(dependency.clone(), ctx.require(dependency)?);
            }
            for (name, value) in &script.exports {
                ctx.export(name.clone(), value.clone());
            }
            if let Some(dependency) = &script.mirror {
                let value = tables
                    .get(dependency)
                    .and_then(|table| table.get("value"))
                    .unwrap_or(Value::Null);
                ctx.export("mirror", value);
            }

            let id = ctx.id().to_string();
            if script.accept_self {
                let log = Arc::clone(&log);
                ctx.hot().accept_self_with(move |event| {
                    log.lock().push(format!("accept:{}<-{}", event.boundary, event.dependency));
                });
            }
            for dependency in &script.accepts {
                let log = Arc::clone(&log);
                let invalidate = script.invalidate.get(dependency).cloned().unwrap_or_default();
                ctx.hot().accept_with(dependency.clone(), move |event| {
                    log.lock().push(format!("accept:{}<-{}", event.boundary, event.dependency));
                    for module in &invalidate {
                        event.invalidate(module.clone());
                    }
                });
            }
            for dependency in &script.declines {
                ctx.hot().decline(dependency.clone());
            }
            let dispose_log = Arc::clone(&log);
            ctx.hot().on_dispose(move |_| {
                dispose_log.lock().push(format!("dispose:{id}"));
            });
            Ok(())
        }))
    }
}

/// Define `(id, source)` modules with their `requires` as dependencies.
pub fn define_all(registry: &Registry, compiler: &JsonCompiler, modules: &[(&str, &str)]) {
    for (id, source) in modules {
        registry.define(
            ModuleDefinition::new(*id, compiler.compile(id, source).unwrap())
                .dependencies(requires(source)),
        );
    }
}

fn requires(source: &str) -> Vec<String> {
    serde_json::from_str::<Script>(source)
        .map(|script| script.requires)
        .unwrap_or_default()
}

/// A module as shipped inside a chunk.
pub fn module_source(id: &str, source: &str) -> ModuleSource {
    ModuleSource {
        id: id.to_string(),
        source: source.to_string(),
        dependencies: requires(source),
    }
}

pub fn update(id: &str, source: &str) -> ModuleUpdate {
    ModuleUpdate {
        id: id.to_string(),
        source: source.to_string(),
        dependencies: requires(source),
        hash: format!("hash-of-{id}-{}", source.len()),
    }
}

pub fn payload(generation: u64, updates: Vec<ModuleUpdate>) -> HmrPayload {
    HmrPayload {
        generation,
        modules: updates,
        removed: Vec::new(),
    }
}
