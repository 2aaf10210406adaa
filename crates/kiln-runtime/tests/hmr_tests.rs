//! Hot update tests against a registry of JSON-described modules.

mod helpers;

use std::sync::Arc;

use helpers::{JsonCompiler, define_all, payload, update};
use kiln_runtime::{
    EvalError, HmrError, HmrPayload, HmrRuntime, HmrStatus, InMemoryTransport, Registry,
};
use serde_json::Value;

const A: &str = r#"{"requires": ["b"]}"#;
const B_ACCEPTS_C: &str = r#"{"requires": ["c"], "accepts": ["c"], "mirror": "c"}"#;
const B_PLAIN: &str = r#"{"requires": ["c"], "mirror": "c"}"#;
const C_V1: &str = r#"{"exports": {"value": 1}}"#;
const C_V2: &str = r#"{"exports": {"value": 2}}"#;

struct App {
    registry: Arc<Registry>,
    compiler: JsonCompiler,
    transport: InMemoryTransport,
    runtime: HmrRuntime,
}

/// a -> b -> c, with `a` as the entry, already evaluated.
fn app(b_source: &str) -> App {
    app_with(b_source, C_V1)
}

fn app_with(b_source: &str, c_source: &str) -> App {
    let registry = Arc::new(Registry::new());
    let compiler = JsonCompiler::new();
    define_all(&registry, &compiler, &[("a", A), ("b", b_source), ("c", c_source)]);
    registry.mark_entry("a");
    registry.require("a").unwrap();
    compiler.clear();

    let transport = InMemoryTransport::new();
    let runtime = HmrRuntime::new(
        Arc::clone(&registry),
        Arc::new(transport.clone()),
        Arc::new(compiler.clone()),
    );
    App {
        registry,
        compiler,
        transport,
        runtime,
    }
}

fn value_of(registry: &Registry, id: &str, name: &str) -> Option<Value> {
    registry.exports(id).and_then(|table| table.get(name))
}

#[test]
fn accept_handler_on_importer_receives_update() {
    let mut app = app(B_ACCEPTS_C);

    let outcome = app
        .runtime
        .apply(&payload(1, vec![update("c", C_V2)]))
        .unwrap();

    assert_eq!(app.runtime.status(), HmrStatus::Idle);
    assert_eq!(app.runtime.generation(), 1);
    assert_eq!(outcome.updated, vec!["c"]);
    assert_eq!(outcome.reevaluated, vec!["c"]);
    assert_eq!(outcome.accepted, vec![("b".to_string(), "c".to_string())]);
    assert_eq!(app.compiler.log(), vec!["eval:c", "dispose:c", "accept:b<-c"]);
    assert_eq!(value_of(&app.registry, "c", "value"), Some(Value::from(2)));
}

#[test]
fn missing_accept_boundary_forces_reload() {
    let mut app = app(B_PLAIN);

    let err = app
        .runtime
        .apply(&payload(1, vec![update("c", C_V2)]))
        .unwrap_err();

    assert_eq!(
        err,
        HmrError::NoAcceptBoundary {
            module: "c".to_string()
        }
    );
    assert!(err.requires_reload());
    assert_eq!(app.runtime.status(), HmrStatus::Failed);
    assert!(app.runtime.needs_reload());
    assert!(app.runtime.reload_reason().is_some());
    // Nothing was evaluated or replaced.
    assert!(app.compiler.log().is_empty());
    assert_eq!(value_of(&app.registry, "c", "value"), Some(Value::from(1)));

    let again = app
        .runtime
        .apply(&payload(2, vec![update("c", C_V2)]))
        .unwrap_err();
    assert!(matches!(again, HmrError::ReloadRequired { .. }));
}

#[test]
fn self_accepting_module_is_its_own_boundary() {
    let mut app = app_with(B_PLAIN, r#"{"exports": {"value": 1}, "acceptSelf": true}"#);
    let c = r#"{"exports": {"value": 3}, "acceptSelf": true}"#;

    let outcome = app.runtime.apply(&payload(1, vec![update("c", c)])).unwrap();

    assert_eq!(outcome.accepted, vec![("c".to_string(), "c".to_string())]);
    assert_eq!(app.compiler.log(), vec!["eval:c", "dispose:c", "accept:c<-c"]);
    assert_eq!(value_of(&app.registry, "c", "value"), Some(Value::from(3)));
}

#[test]
fn update_bubbles_through_importers_to_boundary() {
    let registry = Arc::new(Registry::new());
    let compiler = JsonCompiler::new();
    define_all(
        &registry,
        &compiler,
        &[
            ("a", r#"{"requires": ["b"], "accepts": ["b"]}"#),
            ("b", B_PLAIN),
            ("c", C_V1),
        ],
    );
    registry.mark_entry("a");
    registry.require("a").unwrap();
    compiler.clear();
    let mut runtime = HmrRuntime::new(
        Arc::clone(&registry),
        Arc::new(InMemoryTransport::new()),
        Arc::new(compiler.clone()),
    );

    let outcome = runtime.apply(&payload(1, vec![update("c", C_V2)])).unwrap();

    // b is re-evaluated after c and picks up the new value.
    assert_eq!(outcome.reevaluated, vec!["c", "b"]);
    assert_eq!(outcome.accepted, vec![("a".to_string(), "b".to_string())]);
    assert_eq!(value_of(&registry, "b", "mirror"), Some(Value::from(2)));
    assert_eq!(
        compiler.log(),
        vec!["eval:c", "eval:b", "dispose:c", "dispose:b", "accept:a<-b"]
    );
}

#[test]
fn declined_dependency_forces_reload() {
    let mut app = app(r#"{"requires": ["c"], "declines": ["c"]}"#);

    let err = app
        .runtime
        .apply(&payload(1, vec![update("c", C_V2)]))
        .unwrap_err();

    assert_eq!(
        err,
        HmrError::Declined {
            module: "c".to_string(),
            by: "b".to_string()
        }
    );
    assert_eq!(app.runtime.status(), HmrStatus::Failed);
}

#[test]
fn failed_evaluation_replaces_nothing() {
    let mut app = app(B_ACCEPTS_C);
    let before = app.registry.exports("c").unwrap();

    let err = app
        .runtime
        .apply(&payload(1, vec![update("c", r#"{"throws": "bad syntax"}"#)]))
        .unwrap_err();

    assert_eq!(
        err,
        HmrError::Evaluation {
            module: "c".to_string(),
            source: EvalError::thrown("c", "bad syntax"),
        }
    );
    assert_eq!(app.runtime.status(), HmrStatus::Failed);
    assert_eq!(before.get("value"), Some(Value::from(1)));
    // The failing code ran, but no dispose or accept handler did.
    assert_eq!(app.compiler.log(), vec!["eval:c"]);
}

#[test]
fn uncompilable_update_is_an_evaluation_error() {
    let mut app = app(B_ACCEPTS_C);

    let err = app
        .runtime
        .apply(&payload(1, vec![update("c", "not json")]))
        .unwrap_err();

    assert!(matches!(
        err,
        HmrError::Evaluation {
            source: EvalError::Compile { .. },
            ..
        }
    ));
}

#[test]
fn export_table_handles_stay_live_across_updates() {
    let mut app = app(B_ACCEPTS_C);
    let held = app.registry.exports("c").unwrap();

    app.runtime
        .apply(&payload(1, vec![update("c", C_V2)]))
        .unwrap();

    let current = app.registry.exports("c").unwrap();
    assert!(held.same_table(&current));
    assert_eq!(held.get("value"), Some(Value::from(2)));
    // b was not re-evaluated, so its copy is stale while its handle is not.
    assert_eq!(value_of(&app.registry, "b", "mirror"), Some(Value::from(1)));
}

#[test]
fn accept_handler_can_invalidate_further_modules() {
    let b = r#"{"requires": ["c"], "accepts": ["c"], "invalidate": {"c": ["d"]}, "mirror": "c"}"#;
    let registry = Arc::new(Registry::new());
    let compiler = JsonCompiler::new();
    define_all(
        &registry,
        &compiler,
        &[
            ("a", r#"{"requires": ["b", "d"], "accepts": ["d"]}"#),
            ("b", b),
            ("c", C_V1),
            ("d", r#"{"exports": {"value": "d"}}"#),
        ],
    );
    registry.mark_entry("a");
    registry.require("a").unwrap();
    compiler.clear();
    let mut runtime = HmrRuntime::new(
        Arc::clone(&registry),
        Arc::new(InMemoryTransport::new()),
        Arc::new(compiler.clone()),
    );

    let outcome = runtime.apply(&payload(1, vec![update("c", C_V2)])).unwrap();

    assert_eq!(outcome.reevaluated, vec!["c", "d"]);
    assert_eq!(
        outcome.accepted,
        vec![
            ("b".to_string(), "c".to_string()),
            ("a".to_string(), "d".to_string()),
        ]
    );
    assert_eq!(
        compiler.log(),
        vec![
            "eval:c",
            "dispose:c",
            "accept:b<-c",
            "eval:d",
            "dispose:d",
            "accept:a<-d",
        ]
    );
}

#[test]
fn modules_not_yet_instantiated_are_only_redefined() {
    let mut app = app(B_PLAIN);
    app.registry
        .define(kiln_runtime::ModuleDefinition::new("lazy", app.compiler.factory(C_V1)));

    let outcome = app
        .runtime
        .apply(&payload(1, vec![update("lazy", C_V2)]))
        .unwrap();

    assert!(outcome.reevaluated.is_empty());
    assert!(!app.registry.is_instantiated("lazy"));
    let table = app.registry.require("lazy").unwrap();
    assert_eq!(table.get("value"), Some(Value::from(2)));
}

#[test]
fn removed_modules_are_disposed() {
    let mut app = app(B_ACCEPTS_C);

    let outcome = app
        .runtime
        .apply(&HmrPayload {
            generation: 1,
            modules: Vec::new(),
            removed: vec!["c".to_string()],
        })
        .unwrap();

    assert_eq!(outcome.removed, vec!["c"]);
    assert!(!app.registry.is_defined("c"));
    assert!(app.compiler.log().contains(&"dispose:c".to_string()));
}

#[test]
fn stale_payload_is_ignored() {
    let mut app = app(B_ACCEPTS_C);
    app.runtime = HmrRuntime::new(
        Arc::clone(&app.registry),
        Arc::new(app.transport.clone()),
        Arc::new(app.compiler.clone()),
    )
    .with_generation(5);

    let outcome = app
        .runtime
        .apply(&payload(3, vec![update("c", C_V2)]))
        .unwrap();

    assert_eq!(outcome.generation, 5);
    assert!(outcome.updated.is_empty());
    assert_eq!(app.runtime.status(), HmrStatus::Idle);
    assert_eq!(value_of(&app.registry, "c", "value"), Some(Value::from(1)));
}

#[test]
fn plan_is_a_dry_run() {
    let app = app(B_ACCEPTS_C);

    let updates = app.runtime.plan(&payload(1, vec![update("c", C_V2)])).unwrap();

    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].module, "c");
    assert_eq!(updates[0].boundaries, vec!["b"]);
    assert!(app.compiler.log().is_empty());
    assert_eq!(app.runtime.status(), HmrStatus::Idle);
}

#[tokio::test]
async fn check_skips_modules_with_known_hashes() {
    let app = app(B_ACCEPTS_C);
    let unchanged = update("b", B_ACCEPTS_C);
    let mut runtime = HmrRuntime::new(
        Arc::clone(&app.registry),
        Arc::new(app.transport.clone()),
        Arc::new(app.compiler.clone()),
    )
    .with_hashes([("b".to_string(), unchanged.hash.clone())]);
    app.transport
        .publish(payload(1, vec![unchanged, update("c", C_V2)]));

    let manifest = runtime.check().await.unwrap().unwrap();
    assert_eq!(runtime.status(), HmrStatus::Checking);
    assert_eq!(manifest.generation, 1);
    assert_eq!(manifest.modules.len(), 1);
    assert_eq!(manifest.modules[0].id, "c");

    let downloaded = runtime.download(&manifest).await.unwrap();
    assert_eq!(runtime.status(), HmrStatus::Downloading);
    assert_eq!(downloaded.modules.len(), 1);

    let outcome = runtime.apply(&downloaded).unwrap();
    assert_eq!(outcome.updated, vec!["c"]);
    assert_eq!(runtime.status(), HmrStatus::Idle);
}

#[tokio::test]
async fn update_applies_pending_generation_once() {
    let mut app = app(B_ACCEPTS_C);
    app.transport.publish(payload(1, vec![update("c", C_V2)]));

    let first = app.runtime.update().await.unwrap();
    assert_eq!(first.map(|outcome| outcome.generation), Some(1));

    let second = app.runtime.update().await.unwrap();
    assert!(second.is_none());
    assert_eq!(app.runtime.status(), HmrStatus::Idle);
}

#[tokio::test]
async fn applying_while_checking_is_busy() {
    let mut app = app(B_ACCEPTS_C);
    app.transport.publish(payload(1, vec![update("c", C_V2)]));
    assert!(app.runtime.check().await.unwrap().is_some());

    let err = app
        .runtime
        .apply(&payload(1, vec![update("c", C_V2)]))
        .unwrap_err();

    assert_eq!(
        err,
        HmrError::Busy {
            status: HmrStatus::Checking
        }
    );
    assert!(!err.requires_reload());
    assert_eq!(app.runtime.status(), HmrStatus::Checking);
}
