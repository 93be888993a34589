//! Integration tests for configuration management
//!
//! These tests verify that the Config struct can be properly loaded from
//! disk, validated, and processed with path expansion.

use std::fs;
use tempfile::TempDir;
use triptych_engine::conductor::EvictionPolicy;
use triptych_engine::config::{Config, EvictionKind};

fn full_config(data_dir: &std::path::Path) -> String {
    format!(
        r#"
[core]
log_level = "debug"
data_dir = "{}"

[llm]
default_provider = "ollama"

[llm.openai]
base_url = "https://api.deepseek.com/v1"
model = "deepseek-chat"
temperature = 0.2

[llm.ollama]
base_url = "http://localhost:11434"
model = "llama3.1:8b"

[orchestration]
max_iterations = 4
step_limit = 12
call_timeout_secs = 30
refine_request = true
prompts_dir = "{}"

[sessions]
eviction = "ttl"
max_runs = 8
ttl_secs = 600
"#,
        data_dir.display(),
        data_dir.join("prompts").display()
    )
}

#[test]
fn test_load_full_config_from_path() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("data");
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, full_config(&data_dir)).unwrap();

    let config = Config::load_from_path(&config_path).unwrap();

    assert_eq!(config.core.log_level, "debug");
    assert_eq!(config.llm.default_provider, "ollama");
    assert_eq!(config.llm.openai.temperature, 0.2);
    assert_eq!(config.orchestration.max_iterations, 4);
    assert_eq!(config.orchestration.step_limit, 12);
    assert_eq!(config.orchestration.call_timeout().as_secs(), 30);
    assert!(config.orchestration.refine_request);
    assert_eq!(config.sessions.eviction, EvictionKind::Ttl);
    assert!(matches!(
        config.sessions.eviction_policy(),
        EvictionPolicy::Ttl { .. }
    ));

    // The data directory is created on load
    assert!(data_dir.exists());
    assert_eq!(config.database_path(), data_dir.join("triptych.db"));
    assert_eq!(config.logs_dir(), data_dir.join("logs"));
}

#[test]
fn test_missing_config_file_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let result = Config::load_from_path(&temp_dir.path().join("absent.toml"));
    assert!(result.is_err());
}

#[test]
fn test_invalid_toml_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "[core\nlog_level = ").unwrap();

    let err = Config::load_from_path(&config_path).unwrap_err();
    assert!(err.to_string().contains("parse"));
}

#[test]
fn test_invalid_values_are_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("data");

    let cases = [
        ("log_level = \"debug\"", "log_level = \"loud\""),
        ("max_iterations = 4", "max_iterations = 0"),
        ("eviction = \"ttl\"", "eviction = \"fifo\""),
        ("ttl_secs = 600", "ttl_secs = 0"),
        ("call_timeout_secs = 30", "call_timeout_secs = 0"),
    ];

    for (from, to) in cases {
        let body = full_config(&data_dir).replace(from, to);
        assert!(
            Config::from_toml_str(&body).is_err(),
            "expected '{}' to be rejected",
            to
        );
    }
}

#[test]
fn test_empty_file_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let body = format!(
        "[core]\ndata_dir = \"{}\"\n",
        temp_dir.path().join("data").display()
    );

    let config = Config::from_toml_str(&body).unwrap();

    assert_eq!(config.llm.default_provider, "openai");
    assert_eq!(config.llm.openai.base_url, "https://api.deepseek.com/v1");
    assert_eq!(config.orchestration.max_iterations, 3);
    assert_eq!(
        config.sessions.eviction_policy(),
        EvictionPolicy::Lru { max_runs: 64 }
    );
}
