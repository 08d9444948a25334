//! Configuration and root folder resolution
//!
//! Tests that touch VCWEB_ROOT_FOLDER are marked #[serial] so they do not
//! race on the process environment.

use std::env;
use std::path::PathBuf;

use serial_test::serial;
use tempfile::TempDir;
use vcweb_common::config::{
    CompiledDefaults, LoggingConfig, RootFolderInitializer, RootFolderResolver, TomlConfig,
    DEFAULT_PORT, ROOT_FOLDER_ENV,
};

fn resolver_without_file() -> RootFolderResolver {
    RootFolderResolver::new().with_config_file(None)
}

#[test]
fn test_compiled_defaults_for_current_platform() {
    let defaults = CompiledDefaults::for_current_platform();

    assert!(!defaults.root_folder.as_os_str().is_empty());
    assert!(defaults.root_folder.ends_with("vcweb"));
    assert_eq!(defaults.log_level, "info");
    assert_eq!(defaults.port, DEFAULT_PORT);
}

#[test]
#[serial]
fn test_resolver_with_no_overrides_uses_default() {
    env::remove_var(ROOT_FOLDER_ENV);

    let root_folder = resolver_without_file().resolve();
    assert_eq!(root_folder, CompiledDefaults::for_current_platform().root_folder);
}

#[test]
#[serial]
fn test_resolver_env_var() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/vcweb-test-env-folder");

    let root_folder = resolver_without_file().resolve();
    assert_eq!(root_folder, PathBuf::from("/tmp/vcweb-test-env-folder"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_cli_arg_beats_env_var() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/vcweb-priority-2");

    let resolver =
        resolver_without_file().with_cli_arg(Some(PathBuf::from("/tmp/vcweb-priority-1")));
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/vcweb-priority-1"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_env_var_beats_config_file() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("config.toml");
    std::fs::write(&config_path, "root_folder = \"/srv/from-file\"\n").unwrap();
    let resolver = RootFolderResolver::new().with_config_file(Some(config_path));

    env::remove_var(ROOT_FOLDER_ENV);
    assert_eq!(resolver.resolve(), PathBuf::from("/srv/from-file"));

    env::set_var(ROOT_FOLDER_ENV, "/srv/from-env");
    assert_eq!(resolver.resolve(), PathBuf::from("/srv/from-env"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_invalid_config_file_does_not_error() {
    env::remove_var(ROOT_FOLDER_ENV);

    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("config.toml");
    std::fs::write(&config_path, "root_folder = [not toml").unwrap();

    let resolver = RootFolderResolver::new().with_config_file(Some(config_path));
    assert_eq!(resolver.load_config(), TomlConfig::default());
    assert_eq!(
        resolver.resolve(),
        CompiledDefaults::for_current_platform().root_folder
    );
}

#[test]
#[serial]
fn test_missing_config_file_does_not_error() {
    env::remove_var(ROOT_FOLDER_ENV);

    let resolver = RootFolderResolver::new()
        .with_config_file(Some(PathBuf::from("/nonexistent/vcweb/config.toml")));
    assert_eq!(resolver.load_config(), TomlConfig::default());
}

#[test]
fn test_initializer_database_path() {
    let root = PathBuf::from("/tmp/vcweb-test-root");
    let initializer = RootFolderInitializer::new(root.clone());

    assert_eq!(initializer.database_path(), root.join("vcweb.db"));
}

#[test]
fn test_initializer_database_exists() {
    let initializer = RootFolderInitializer::new(PathBuf::from("/tmp/vcweb-test-nonexistent"));
    assert!(!initializer.database_exists());
}

#[test]
fn test_initializer_creates_nested_directories() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("level1").join("level2");

    let initializer = RootFolderInitializer::new(root.clone());
    initializer.ensure_directory_exists().unwrap();
    assert!(root.is_dir());

    // Second call is a no-op
    initializer.ensure_directory_exists().unwrap();
    assert!(root.is_dir());
}

#[test]
fn test_toml_roundtrip() {
    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/srv/vcweb")),
        port: Some(8080),
        logging: LoggingConfig {
            level: "debug".to_string(),
        },
        venues: Some(vec!["home".to_string(), "lab".to_string()]),
    };

    let toml_str = toml::to_string(&config).unwrap();
    let parsed: TomlConfig = toml::from_str(&toml_str).unwrap();
    assert_eq!(parsed, config);
}

#[test]
fn test_missing_fields_take_defaults() {
    let config: TomlConfig = toml::from_str("root_folder = \"/srv/vcweb\"\n").unwrap();

    assert_eq!(config.port, None);
    assert_eq!(config.logging.level, "info");
    let venues: Vec<String> = config.venue_names().iter().map(|v| v.to_string()).collect();
    assert_eq!(venues, ["home", "work", "school"]);
}

#[test]
fn test_invalid_venue_names_skipped() {
    let config: TomlConfig =
        toml::from_str("venues = [\"home\", \"Bad Name\", \"cafe_2\"]\n").unwrap();

    let venues: Vec<String> = config.venue_names().iter().map(|v| v.to_string()).collect();
    assert_eq!(venues, ["home", "cafe_2"]);
}
