//! Table-driven tests for configuration loading and validation.

mod common;

use std::time::Duration;

use common::LocalHarness;
use docflow::config::load_config_from_str;
use docflow::load_config;
use docflow::workflow::WorkflowConfig;

struct ConfigTestCase {
    name: &'static str,
    config_json: &'static str,
    should_succeed: bool,
    /// Substring of the error message when loading fails.
    expected_error: Option<&'static str>,
}

const CONFIG_TESTS: &[ConfigTestCase] = &[
    ConfigTestCase {
        name: "valid_minimal",
        config_json: r#"{
            "version": "1.0",
            "storage_root": "/srv/docflow",
            "upload": { "bucket": "uploads" }
        }"#,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "valid_full",
        config_json: r#"{
            "version": "1.0",
            "storage_root": "/srv/docflow",
            "upload": { "bucket": "uploads", "prefix": "incoming/" },
            "derived_bucket": "chunks",
            "artifact_bucket": "results",
            "database_path": ":memory:",
            "workflow": {
                "stage_timeout_secs": 60,
                "chunk_concurrency": 8,
                "retry": { "max_attempts": 3, "initial_backoff_ms": 100, "max_backoff_ms": 1000 }
            }
        }"#,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "invalid_version",
        config_json: r#"{
            "version": "2.0",
            "storage_root": "/srv/docflow",
            "upload": { "bucket": "uploads" }
        }"#,
        should_succeed: false,
        expected_error: Some("Unsupported config version"),
    },
    ConfigTestCase {
        name: "missing_upload",
        config_json: r#"{
            "version": "1.0",
            "storage_root": "/srv/docflow"
        }"#,
        should_succeed: false,
        expected_error: Some("upload"),
    },
    ConfigTestCase {
        name: "unknown_workflow_field",
        config_json: r#"{
            "version": "1.0",
            "storage_root": "/srv/docflow",
            "upload": { "bucket": "uploads" },
            "workflow": { "workers": 4 }
        }"#,
        should_succeed: false,
        expected_error: Some("workers"),
    },
    ConfigTestCase {
        name: "zero_timeout",
        config_json: r#"{
            "version": "1.0",
            "storage_root": "/srv/docflow",
            "upload": { "bucket": "uploads" },
            "workflow": { "stage_timeout_secs": 0 }
        }"#,
        should_succeed: false,
        expected_error: Some("stage_timeout_secs"),
    },
    ConfigTestCase {
        name: "upload_bucket_is_artifact_bucket",
        config_json: r#"{
            "version": "1.0",
            "storage_root": "/srv/docflow",
            "upload": { "bucket": "artifacts" }
        }"#,
        should_succeed: false,
        expected_error: Some("must differ"),
    },
    ConfigTestCase {
        name: "nested_bucket_name",
        config_json: r#"{
            "version": "1.0",
            "storage_root": "/srv/docflow",
            "upload": { "bucket": "a/b" }
        }"#,
        should_succeed: false,
        expected_error: Some("single path segment"),
    },
];

#[test]
fn test_config_loading_table() {
    for case in CONFIG_TESTS {
        let result = load_config_from_str(case.config_json);
        match (case.should_succeed, result) {
            (true, Ok(_)) => {}
            (true, Err(e)) => panic!("{}: expected success, got {}", case.name, e),
            (false, Ok(_)) => panic!("{}: expected failure", case.name),
            (false, Err(e)) => {
                if let Some(expected) = case.expected_error {
                    assert!(
                        e.to_string().contains(expected),
                        "{}: '{}' does not mention '{}'",
                        case.name,
                        e,
                        expected
                    );
                }
            }
        }
    }
}

#[test]
fn test_workflow_settings_from_file() {
    let harness = LocalHarness::new();
    let config = load_config(harness.write_config()).unwrap();

    let workflow = WorkflowConfig::from_config(&config);
    assert_eq!(workflow.stage_timeout, Duration::from_secs(30));
    assert_eq!(workflow.chunk_concurrency, 2);
    assert_eq!(workflow.retry.max_attempts, 1);
    let expected = harness.database_path().to_string_lossy().into_owned();
    assert_eq!(config.database_path.as_deref(), Some(expected.as_str()));
}

#[test]
fn test_in_memory_database_selection() {
    let config = load_config_from_str(
        r#"{
            "version": "1.0",
            "storage_root": "/srv/docflow",
            "upload": { "bucket": "uploads" },
            "database_path": ":memory:"
        }"#,
    )
    .unwrap();

    let store = docflow::app::open_status_store(&config).unwrap();
    assert!(store.get_status("anything").unwrap().is_none());
}
