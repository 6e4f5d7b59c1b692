//! Integration tests for `quarry.toml` handling.

mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;

use common::{database, session};
use quarry::QuarryConfig;
use quarry::query::diagnostics::{EventId, MemorySink, WarningBehavior};
use quarry::query::error::ErrorCode;
use quarry::query::types::{ClientEvaluationBehavior, IncludeStrategy};
use quarry::query::{Expression, Query};
use quarry::sqlite::{JournalMode, SqliteConfig, SynchronousMode};

fn reversed_customer() -> Query {
    Query::from("Order", "o").filter(
        Expression::member("o", "Customer")
            .call("string", "reverse", vec![])
            .equal("ada"),
    )
}

#[test]
fn test_config_from_file_drives_a_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("quarry.toml");
    std::fs::write(
        &path,
        r#"
        [query]
        client_evaluation = "throw"
        include_strategy = "pre_joined"
        "#,
    )
    .unwrap();

    let config = QuarryConfig::from_file(&path).unwrap();
    assert_eq!(config.query.include_strategy, IncludeStrategy::PreJoined);

    let executor = database();
    let err = session(&executor).with_config(&config).query(reversed_customer()).unwrap_err();
    assert_eq!(err.code, ErrorCode::ClientEvaluationDisallowed);
    assert_eq!(executor.count(), 0);
}

#[test]
fn test_warning_configured_to_throw() {
    let config = QuarryConfig::from_toml(
        r#"
        [query]
        client_evaluation = "warn"

        [warnings]
        throw = ["client_evaluation"]
        "#,
    )
    .unwrap();
    assert_eq!(
        config.warnings.build().behavior_for(EventId::ClientEvaluation),
        WarningBehavior::Throw
    );

    let executor = database();
    let err = session(&executor).with_config(&config).query(reversed_customer()).unwrap_err();
    assert_eq!(err.code, ErrorCode::WarningAsError);
    assert_eq!(executor.count(), 0);
}

#[test]
fn test_ignored_warning_still_evaluates() {
    let config = QuarryConfig::from_toml("[warnings]\nignore = [\"client_evaluation\"]").unwrap();
    assert_eq!(config.query.client_evaluation, ClientEvaluationBehavior::Warn);

    let executor = database();
    let sink = Arc::new(MemorySink::new());
    let items = session(&executor)
        .with_config(&config)
        .with_sink(sink.clone())
        .to_list(reversed_customer())
        .unwrap();

    assert_eq!(items.len(), 1);
    assert!(sink.events().is_empty());
}

#[test]
fn test_unknown_keys_are_rejected() {
    let err = QuarryConfig::from_toml("[query]\nretries = 3").unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidConfiguration);
}

#[test]
fn test_sqlite_url_options() {
    let config = SqliteConfig::from_url("sqlite://./shop.db?journal_mode=delete&synchronous=full").unwrap();
    assert_eq!(config.path_str(), "./shop.db");
    assert_eq!(config.journal_mode, JournalMode::Delete);
    assert_eq!(config.synchronous, SynchronousMode::Full);
}
