use receipt_pipeline::config::AppConfig;
use serial_test::serial;
use std::env;
use std::fs;

const ARGS: [&str; 1] = ["receipt-pipeline"];

// Clear variables that clap or the env source would pick up
fn clear_env_vars() {
    unsafe {
        for key in [
            "RCPT_SERVER__PORT",
            "RCPT_PIPELINE__CONCURRENT_LIMIT",
            "RCPT_PIPELINE__BATCH_SIZE",
            "RCPT_STORAGE__PROVIDER",
            "CONFIG_FILE",
            "PORT",
            "DATABASE_URL",
        ] {
            env::remove_var(key);
        }
    }
}

#[test]
#[serial]
fn test_default_config() {
    clear_env_vars();

    let config = AppConfig::load_from_args(ARGS).expect("defaults should load");
    assert_eq!(config.server.port, 3001);
    assert_eq!(config.pipeline.concurrent_limit, 2);
    assert_eq!(config.pipeline.batch_size, 5);
    assert_eq!(config.extraction.max_retries, 3);
    assert_eq!(config.storage.provider, "sqlite");
}

#[test]
#[serial]
fn test_env_override() {
    clear_env_vars();
    unsafe {
        env::set_var("RCPT_SERVER__PORT", "9090");
        env::set_var("RCPT_PIPELINE__BATCH_SIZE", "8");
    }

    let config = AppConfig::load_from_args(ARGS).expect("Failed to load config");
    assert_eq!(config.server.port, 9090);
    assert_eq!(config.pipeline.batch_size, 8);

    clear_env_vars();
}

#[test]
#[serial]
fn test_cli_beats_env() {
    clear_env_vars();
    unsafe {
        env::set_var("RCPT_PIPELINE__CONCURRENT_LIMIT", "4");
    }

    let config = AppConfig::load_from_args(["receipt-pipeline", "--concurrency", "6", "--port", "4000"])
        .expect("Failed to load config");
    assert_eq!(config.pipeline.concurrent_limit, 6);
    assert_eq!(config.server.port, 4000);

    clear_env_vars();
}

#[test]
#[serial]
fn test_invalid_values_rejected() {
    clear_env_vars();
    unsafe {
        env::set_var("RCPT_PIPELINE__BATCH_SIZE", "0");
    }
    assert!(AppConfig::load_from_args(ARGS).is_err());

    clear_env_vars();
    unsafe {
        env::set_var("RCPT_STORAGE__PROVIDER", "postgres");
    }
    assert!(AppConfig::load_from_args(ARGS).is_err());

    clear_env_vars();
}

#[test]
#[serial]
fn test_file_load() {
    clear_env_vars();

    let dir = tempfile::tempdir().expect("temp dir");
    let file_path = dir.path().join("pipeline.yaml");
    fs::write(
        &file_path,
        r#"
server:
  port: 7070
pipeline:
  batch_size: 3
storage:
  provider: memory
"#,
    )
    .expect("Failed to write temp config");

    unsafe {
        env::set_var("CONFIG_FILE", &file_path);
    }

    let config = AppConfig::load_from_args(ARGS).expect("Failed to load config from file");
    assert_eq!(config.server.port, 7070);
    assert_eq!(config.pipeline.batch_size, 3);
    assert_eq!(config.storage.provider, "memory");

    clear_env_vars();
}

#[test]
#[serial]
fn test_missing_explicit_file_is_an_error() {
    clear_env_vars();
    let result = AppConfig::load_from_args(["receipt-pipeline", "--config", "/nonexistent/pipeline.yaml"]);
    assert!(result.is_err());
}

#[test]
#[serial]
fn test_cwd_config_fallback() {
    clear_env_vars();

    let cwd_path = "config.yaml";
    fs::write(
        cwd_path,
        r#"
server:
  port: 6060
"#,
    )
    .expect("Failed to write ./config.yaml");

    let config = AppConfig::load_from_args(ARGS);

    fs::remove_file(cwd_path).unwrap();
    assert_eq!(config.expect("Failed to load config").server.port, 6060);
}
