//! Loading and validating configs from files on disk.

use std::fs;

use ctxvault_config::{BackendKind, BackendSpec, ConfigError, DatabaseConfig};
use tempfile::TempDir;

#[test]
fn test_load_document_config_from_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ctxvault.toml");
    fs::write(
        &path,
        r#"
        kind = "json"

        [document]
        path = "/data/context-db.json"
        max_entries = 250
        flush_debounce_ms = 20
        "#,
    )
    .unwrap();

    let config = DatabaseConfig::load(&path).unwrap();
    assert_eq!(config.kind, BackendKind::Document);

    match config.validate().unwrap() {
        BackendSpec::Document(doc) => {
            assert_eq!(doc.max_entries, 250);
            assert_eq!(doc.flush_debounce_ms, 20);
        }
        other => panic!("expected document spec, got {other:?}"),
    }
}

#[test]
fn test_missing_payload_names_section() {
    let config = DatabaseConfig::from_toml(r#"kind = "relational""#).unwrap();
    let err = config.validate().unwrap_err();
    assert!(matches!(
        err,
        ConfigError::MissingPayload {
            kind: BackendKind::Relational,
            payload: "relational"
        }
    ));
}

#[test]
fn test_unknown_kind_is_parse_error() {
    let err = DatabaseConfig::from_toml(r#"kind = "mongo""#).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_missing_file_is_read_error() {
    let dir = TempDir::new().unwrap();
    let err = DatabaseConfig::load(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::ReadFile { .. }));
}

#[test]
fn test_serialized_preset_reloads() {
    let dir = TempDir::new().unwrap();
    let team = DatabaseConfig::team(dir.path());
    let text = toml::to_string(&team).unwrap();
    let reloaded = DatabaseConfig::from_toml(&text).unwrap();
    assert_eq!(reloaded, team);
    assert_eq!(reloaded.validate().unwrap().storage_paths().len(), 2);
}
