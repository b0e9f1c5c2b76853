// ABOUTME: Tests for configuration loading and validation
// ABOUTME: Verifies TOML parsing, env var overrides, secret handling, and required field validation

use convoy::config::Config;
use serial_test::serial;
use std::io::Write;
use std::time::Duration;

/// Helper to clear all config-related env vars
fn clear_config_env_vars() {
    for var in [
        "CONVOY_CONFIG_PATH",
        "CONVOY_DOMAIN",
        "CONVOY_LOG_LEVEL",
        "CONVOY_LOG_JSON",
        "CONVOY_MIN_LOGON_INTERVAL_MS",
        "CONVOY_SCENARIO",
        "CONVOY_CONVERSATION_ID",
        "CONVOY_FILES_PATH",
        "CONVOY_STEP_TIMEOUT_SECS",
        "CONVOY_A_SECRET",
        "CONVOY_B_SECRET",
    ] {
        std::env::remove_var(var);
    }
}

const CONFIG: &str = r#"
[service]
kind = "loopback"
domain = "sandbox.example.com"

[logging]
level = "debug"

[reconnect]
min_logon_interval_ms = 2000

[scenario]
name = "direct-reply"
files_path = "./upload"

[[actors]]
name = "A"
email = "alice@example.com"
password = "hunter2"

[[actors]]
name = "B"
client_id = "bot-client"
client_secret = "s3cret"
"#;

fn write_config(dir: &tempfile::TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("convoy.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    path
}

#[test]
#[serial]
fn test_config_loads_from_env_path() {
    clear_config_env_vars();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, CONFIG);
    std::env::set_var("CONVOY_CONFIG_PATH", &path);

    let config = Config::load().unwrap();
    assert_eq!(config.service.domain, "sandbox.example.com");
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.reconnect.min_logon_interval(), Duration::from_millis(2000));
    assert_eq!(config.scenario.name, "direct-reply");
    assert_eq!(config.scenario.files_path, "./upload");
    assert_eq!(config.actors.len(), 2);
    assert_eq!(config.actor("B").unwrap().identity(), "bot-client");

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_explicit_path_wins() {
    clear_config_env_vars();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, CONFIG);
    std::env::set_var("CONVOY_CONFIG_PATH", "/nonexistent/convoy.toml");

    let config = Config::load_from(Some(path.as_path())).unwrap();
    assert_eq!(config.service.domain, "sandbox.example.com");

    let err = Config::load_from(Some(dir.path().join("missing.toml").as_path())).unwrap_err();
    assert!(err.to_string().contains("config file not found"));

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_env_overrides() {
    clear_config_env_vars();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, CONFIG);
    std::env::set_var("CONVOY_DOMAIN", "override.example.com");
    std::env::set_var("CONVOY_SCENARIO", "reactions");
    std::env::set_var("CONVOY_CONVERSATION_ID", "conv-42");
    std::env::set_var("CONVOY_MIN_LOGON_INTERVAL_MS", "750");
    std::env::set_var("CONVOY_STEP_TIMEOUT_SECS", "30");
    std::env::set_var("CONVOY_LOG_JSON", "true");

    let config = Config::load_from(Some(path.as_path())).unwrap();
    assert_eq!(config.service.domain, "override.example.com");
    assert_eq!(config.scenario.name, "reactions");
    assert_eq!(config.scenario.conversation_id.as_deref(), Some("conv-42"));
    assert_eq!(config.reconnect.min_logon_interval_ms, 750);
    assert_eq!(config.scenario.step_timeout(), Some(Duration::from_secs(30)));
    assert!(config.logging.json);

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_secret_from_env_is_consumed() {
    clear_config_env_vars();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, &CONFIG.replace("hunter2", ""));

    // Empty secret in the file and no override fails validation
    let err = Config::load_from(Some(path.as_path())).unwrap_err();
    assert!(err.to_string().contains("CONVOY_A_SECRET"));

    std::env::set_var("CONVOY_A_SECRET", "from-env");
    let config = Config::load_from(Some(path.as_path())).unwrap();
    assert_eq!(config.actor("A").unwrap().credentials.secret(), "from-env");
    assert!(std::env::var("CONVOY_A_SECRET").is_err());

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_invalid_numbers_are_rejected() {
    clear_config_env_vars();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, CONFIG);

    std::env::set_var("CONVOY_MIN_LOGON_INTERVAL_MS", "soon");
    let err = Config::load_from(Some(path.as_path())).unwrap_err();
    assert!(err.to_string().contains("CONVOY_MIN_LOGON_INTERVAL_MS"));

    std::env::set_var("CONVOY_MIN_LOGON_INTERVAL_MS", "0");
    let err = Config::load_from(Some(path.as_path())).unwrap_err();
    assert!(err.to_string().contains("greater than zero"));

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_missing_domain_fails() {
    clear_config_env_vars();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        &CONFIG.replace("domain = \"sandbox.example.com\"", "domain = \"\""),
    );

    let err = Config::load_from(Some(path.as_path())).unwrap_err();
    assert!(err.to_string().contains("service.domain"));

    clear_config_env_vars();
}
