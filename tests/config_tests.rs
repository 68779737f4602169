//! Config loading, TOML layering, and env var override tests.

use std::fs;

use cube_rules::EngineConfig;
use tempfile::TempDir;

#[test]
fn defaults_round_trip_through_default_file_lookup() {
    // `load()` points at `cube_rules.toml`/`cube_rules.local.toml` in the
    // process cwd; when neither exists it still succeeds with defaults,
    // the same way the teacher engine's `Config::load()` degrades gracefully
    // with no file present.
    let config = EngineConfig::load().expect("defaults must always load");
    assert_eq!(config.evaluation.max_recursion_depth, 64);
}

#[test]
fn from_file_loads_overrides_from_a_toml_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cube_rules.toml");
    fs::write(
        &path,
        r#"
[evaluation]
max_recursion_depth = 128

[optimizer]
enable_stet_rewrite = false
enable_linearity_check = true

[logging]
level = "debug"
"#,
    )
    .unwrap();

    let config = EngineConfig::from_file(path.to_str().unwrap()).unwrap();
    assert_eq!(config.evaluation.max_recursion_depth, 128);
    assert!(!config.optimizer.enable_stet_rewrite);
    assert!(config.optimizer.enable_linearity_check);
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn from_file_falls_back_to_defaults_for_missing_sections() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cube_rules.toml");
    fs::write(&path, "[logging]\nlevel = \"warn\"\n").unwrap();

    let config = EngineConfig::from_file(path.to_str().unwrap()).unwrap();
    assert_eq!(config.logging.level, "warn");
    // Untouched sections keep their compiled-in defaults.
    assert_eq!(config.evaluation.max_recursion_depth, 64);
    assert!(config.optimizer.enable_stet_rewrite);
}

#[test]
fn from_file_on_a_nonexistent_path_still_yields_defaults() {
    // Unlike a handler that requires storage paths to exist, `EngineConfig`
    // has no required fields, so a missing file just means "nothing to
    // merge" rather than an error (figment's `Toml::file` is optional).
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("does-not-exist.toml");
    let config = EngineConfig::from_file(missing.to_str().unwrap()).unwrap();
    assert_eq!(config.evaluation.max_recursion_depth, 64);
}
