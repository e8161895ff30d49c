//! Configuration loading and precedence tests

use pretty_assertions::assert_eq;
use rstest::rstest;
use serial_test::serial;
use stackcrawl_config::{ConfigError, ConfigLoader, GrowthStrategy, RuntimeConfig};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn create_config_file(dir: &Path, content: &str) -> PathBuf {
    let config_path = dir.join("stackcrawl.toml");
    fs::write(&config_path, content).unwrap();
    config_path
}

fn create_global_file(dir: &Path, content: &str) -> PathBuf {
    let global_dir = dir.join("home");
    fs::create_dir_all(&global_dir).unwrap();
    let path = global_dir.join("config.toml");
    fs::write(&path, content).unwrap();
    path
}

// ============================================================================
// Config Loading Tests
// ============================================================================

#[test]
#[serial]
fn test_load_when_no_config_exists() {
    let temp_dir = TempDir::new().unwrap();

    let mut loader =
        ConfigLoader::new().with_global_config_path(temp_dir.path().join("missing.toml"));
    let config = loader.load_from_directory(temp_dir.path()).unwrap();

    assert!(!config.is_project());
    assert_eq!(config.runtime, RuntimeConfig::default());
}

#[test]
#[serial]
fn test_load_from_nested_subdirectory_finds_ancestor() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(temp_dir.path(), "[stack_trace]\ninitial_capacity = 4\n");

    let nested = temp_dir.path().join("a").join("b").join("c");
    fs::create_dir_all(&nested).unwrap();

    let mut loader =
        ConfigLoader::new().with_global_config_path(temp_dir.path().join("missing.toml"));
    let config = loader.load_from_directory(&nested).unwrap();

    assert_eq!(config.runtime.initial_capacity(), 4);
    assert_eq!(config.config_root(), Some(temp_dir.path()));
}

#[test]
#[serial]
fn test_load_from_specific_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = create_config_file(temp_dir.path(), "[stack_trace]\ngrowth = \"exact\"\n");

    let mut loader =
        ConfigLoader::new().with_global_config_path(temp_dir.path().join("missing.toml"));
    let config = loader.load_from_file(&path).unwrap();

    assert_eq!(config.runtime.growth(), GrowthStrategy::Exact);
}

#[test]
fn test_load_missing_specific_file() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("stackcrawl.toml");

    let result = RuntimeConfig::load_from_file(&missing);

    assert!(matches!(result, Err(ConfigError::NotFound(path)) if path == missing));
}

// ============================================================================
// Precedence Tests
// ============================================================================

#[test]
#[serial]
fn test_project_overrides_global() {
    let temp_dir = TempDir::new().unwrap();
    let global = create_global_file(
        temp_dir.path(),
        "[gc]\nserver = true\ncollect_after_allocations = 100\n",
    );
    create_config_file(temp_dir.path(), "[gc]\ncollect_after_allocations = 7\n");

    let mut loader = ConfigLoader::new().with_global_config_path(global);
    let config = loader.load_from_directory(temp_dir.path()).unwrap();

    // server comes from global, cadence from project
    assert!(config.runtime.server_gc());
    assert_eq!(config.runtime.collect_after_allocations(), 7);
}

#[test]
#[serial]
fn test_env_overrides_project() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(temp_dir.path(), "[gc]\nserver = false\n");

    env::set_var("STACKCRAWL_SERVER_GC", "yes");
    let mut loader =
        ConfigLoader::new().with_global_config_path(temp_dir.path().join("missing.toml"));
    let result = loader.load_from_directory(temp_dir.path());
    env::remove_var("STACKCRAWL_SERVER_GC");

    assert!(result.unwrap().runtime.server_gc());
}

#[rstest]
#[case("STACKCRAWL_STACK_TRACE_CAPACITY", "32")]
#[case("STACKCRAWL_MAX_FRAMES", "128")]
#[case("STACKCRAWL_PROCESSOR_COUNT", "12")]
#[serial]
fn test_env_counts_are_applied(#[case] var: &str, #[case] value: &str) {
    env::set_var(var, value);
    let result = ConfigLoader::new().load_from_env();
    env::remove_var(var);

    let runtime = result.unwrap().runtime;
    let expected: usize = value.parse().unwrap();
    let actual = match var {
        "STACKCRAWL_STACK_TRACE_CAPACITY" => Some(runtime.initial_capacity()),
        "STACKCRAWL_MAX_FRAMES" => runtime.max_frames(),
        _ => runtime.processor_count(),
    };
    assert_eq!(actual, Some(expected));
}

#[test]
#[serial]
fn test_env_growth_rejects_unknown_strategy() {
    env::set_var("STACKCRAWL_STACK_TRACE_GROWTH", "fibonacci");
    let result = ConfigLoader::new().load_from_env();
    env::remove_var("STACKCRAWL_STACK_TRACE_GROWTH");

    assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
}

#[test]
#[serial]
fn test_env_overrides_are_validated() {
    env::set_var("STACKCRAWL_PROCESSOR_COUNT", "0");
    let result = ConfigLoader::new().load_from_env();
    env::remove_var("STACKCRAWL_PROCESSOR_COUNT");

    assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
}

// ============================================================================
// Invalid Config Tests
// ============================================================================

#[test]
#[serial]
fn test_invalid_toml_syntax() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(temp_dir.path(), "[gc\nserver = ");

    let mut loader =
        ConfigLoader::new().with_global_config_path(temp_dir.path().join("missing.toml"));
    let result = loader.load_from_directory(temp_dir.path());

    assert!(matches!(result, Err(ConfigError::TomlParseError { .. })));
}

#[test]
fn test_invalid_growth_value_in_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = create_config_file(temp_dir.path(), "[stack_trace]\ngrowth = \"sideways\"\n");

    let result = RuntimeConfig::load_from_file(&path);

    assert!(matches!(result, Err(ConfigError::TomlParseError { .. })));
}

#[test]
fn test_round_trip_serialization_keeps_sections() {
    let temp_dir = TempDir::new().unwrap();
    let path = create_config_file(
        temp_dir.path(),
        "[threading]\nprocessor_count = 2\n\n[stack_trace]\nmax_frames = 10\n",
    );
    let config = RuntimeConfig::load_from_file(&path).unwrap();

    let text = toml::to_string(&config).unwrap();

    assert!(text.contains("[threading]"));
    assert!(text.contains("max_frames = 10"));
    assert!(!text.contains("[gc]"));
}
