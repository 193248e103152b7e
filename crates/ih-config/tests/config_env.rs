// SPDX-License-Identifier: MIT OR Apache-2.0
//! Process-environment overrides and JSON schema conformance.

use ih_config::{HealthConfig, apply_env_overrides, load_config, parse_toml};
use serial_test::serial;

fn clear_ih_env() {
    for key in [
        "IH_TEST_TIMEOUT",
        "IH_PARALLEL_TESTS",
        "IH_MOCK_MODE",
        "IH_MAX_CONCURRENCY",
        "IH_LOG_LEVEL",
        "IH_RESULTS_PATH",
        "COHERE_API_KEY",
    ] {
        // SAFETY: tests touching the environment are serialized.
        unsafe { std::env::remove_var(key) };
    }
}

#[test]
#[serial]
fn env_overrides_take_precedence_over_file() {
    clear_ih_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("health.toml");
    std::fs::write(&path, "test_timeout = 10\nmock_mode = false\n").unwrap();

    unsafe {
        std::env::set_var("IH_TEST_TIMEOUT", "7");
        std::env::set_var("IH_MOCK_MODE", "true");
        std::env::set_var("COHERE_API_KEY", "co-123");
    }
    let cfg = load_config(Some(&path)).unwrap();
    clear_ih_env();

    assert_eq!(cfg.test_timeout, 7);
    assert!(cfg.mock_mode);
    assert_eq!(cfg.api_keys.get("cohere").map(String::as_str), Some("co-123"));
}

#[test]
#[serial]
fn malformed_env_value_is_reported() {
    clear_ih_env();
    unsafe { std::env::set_var("IH_MAX_CONCURRENCY", "many") };
    let mut cfg = HealthConfig::default();
    let result = apply_env_overrides(&mut cfg);
    clear_ih_env();
    assert!(result.is_err());
}

#[test]
#[serial]
fn no_env_leaves_defaults() {
    clear_ih_env();
    let cfg = load_config(None).unwrap();
    assert_eq!(cfg.test_timeout, 30);
    assert_eq!(cfg.max_concurrency, 4);
}

#[test]
fn parsed_config_validates_against_generated_schema() {
    let schema = serde_json::to_value(schemars::schema_for!(HealthConfig)).unwrap();
    let validator = jsonschema::validator_for(&schema).unwrap();

    let cfg = parse_toml(
        r#"
        test_timeout = 15
        [integrations.FakeChat]
        timeout = 2
        [integrations.FakeChat.params]
        model = "fake"
    "#,
    )
    .unwrap();
    let instance = serde_json::to_value(&cfg).unwrap();
    assert!(validator.is_valid(&instance));

    let wrong = serde_json::json!({"test_timeout": "slow"});
    assert!(!validator.is_valid(&wrong));
}
