//! Tests for schema validation.

use kiln_config::{ConfigError, ConfigValidator, KilnConfig, SchemaValidator};

fn app() -> KilnConfig {
    KilnConfig::default().entry("app", "./src/a.js")
}

#[test]
fn default_with_an_entry_is_valid() {
    assert!(SchemaValidator.validate(&app()).is_ok());
}

#[test]
fn no_entries() {
    let err = SchemaValidator.validate(&KilnConfig::default()).unwrap_err();
    assert!(matches!(err, ConfigError::NoEntries));
    assert!(err.hint().is_some());
}

#[test]
fn empty_specifier() {
    let config = KilnConfig::default().entry("app", "  ");
    match SchemaValidator.validate(&config).unwrap_err() {
        ConfigError::InvalidValue { field, .. } => assert_eq!(field, "entries.app"),
        other => panic!("expected InvalidValue, got {other:?}"),
    }
}

#[test]
fn unbalanced_template() {
    let mut config = app();
    config.output.chunk_filename = Some("[name.js".to_string());
    match SchemaValidator.validate(&config).unwrap_err() {
        ConfigError::InvalidValue { field, hint } => {
            assert_eq!(field, "output.chunk_filename");
            assert!(hint.unwrap().contains("[name.js"));
        }
        other => panic!("expected InvalidValue, got {other:?}"),
    }
}

#[test]
fn entry_cannot_take_a_generated_chunk_id() {
    let config = app().entry("runtime", "./src/r.js");
    let err = SchemaValidator.validate(&config).unwrap_err();
    assert!(matches!(err, ConfigError::SchemaValidation { .. }));
    assert!(err.to_string().contains("runtime"));
}

#[test]
fn runtime_and_vendor_must_differ() {
    let mut config = app();
    config.optimization.vendor_chunk = "runtime".to_string();
    assert!(matches!(
        SchemaValidator.validate(&config),
        Err(ConfigError::SchemaValidation { .. })
    ));
}

#[test]
fn zero_workers() {
    let mut config = app();
    config.workers = Some(0);
    let err = SchemaValidator.validate(&config).unwrap_err();
    assert!(err.to_string().contains("workers"));
}
