// tests/config_tests.rs
//! TOML config parsing and environment overrides

use std::env;
use std::path::PathBuf;

use pwdecrypt::config::{
    default_profile_dir, Backend, Config, DEFAULT_PASSWORD_PROMPT, DEFAULT_RETRY_PROMPT,
};
use pwdecrypt::consts::PROFILE_DIR_ENV;
use pwdecrypt::SdrError;
use serial_test::serial;

#[test]
fn test_empty_config_uses_defaults() {
    let config = Config::from_toml_str("").unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.profile.backend, Backend::Soft);
    assert_eq!(config.profile.dir, default_profile_dir());
    assert_eq!(config.prompt.password, DEFAULT_PASSWORD_PROMPT);
    assert_eq!(config.prompt.retry, DEFAULT_RETRY_PROMPT);
}

#[test]
fn test_full_config_parses() {
    let config = Config::from_toml_str(
        r#"
        [profile]
        dir = "/srv/profile"
        backend = "nss"

        [prompt]
        password = "Master password: "
        retry = "Wrong, again: "
        "#,
    )
    .unwrap();

    assert_eq!(config.profile.dir, PathBuf::from("/srv/profile"));
    assert_eq!(config.profile.backend, Backend::Nss);
    assert_eq!(config.prompt.password, "Master password: ");
    assert_eq!(config.prompt.retry, "Wrong, again: ");
}

#[test]
fn test_partial_sections_keep_other_defaults() {
    let config = Config::from_toml_str("[prompt]\nretry = \"again: \"\n").unwrap();
    assert_eq!(config.prompt.password, DEFAULT_PASSWORD_PROMPT);
    assert_eq!(config.prompt.retry, "again: ");
    assert_eq!(config.profile.backend, Backend::Soft);
}

#[test]
fn test_unknown_backend_is_config_error() {
    let err = Config::from_toml_str("[profile]\nbackend = \"pkcs11\"\n").unwrap_err();
    assert!(matches!(err, SdrError::Config(_)));
}

#[test]
fn test_from_file_reads_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pwdecrypt.toml");
    std::fs::write(&path, "[profile]\ndir = \"/tmp/p\"\n").unwrap();

    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.profile.dir, PathBuf::from("/tmp/p"));
}

#[test]
fn test_from_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::from_file(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, SdrError::Io(_)));
}

#[test]
#[serial]
fn test_env_overrides_profile_dir() {
    env::set_var(PROFILE_DIR_ENV, "/from/env");
    let mut config = Config::from_toml_str("[profile]\ndir = \"/from/file\"\n").unwrap();
    config.apply_env_overrides();
    env::remove_var(PROFILE_DIR_ENV);

    assert_eq!(config.profile.dir, PathBuf::from("/from/env"));
}

#[test]
#[serial]
fn test_no_env_keeps_file_value() {
    env::remove_var(PROFILE_DIR_ENV);
    let mut config = Config::from_toml_str("[profile]\ndir = \"/from/file\"\n").unwrap();
    config.apply_env_overrides();

    assert_eq!(config.profile.dir, PathBuf::from("/from/file"));
}
