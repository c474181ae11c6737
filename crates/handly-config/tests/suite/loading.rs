use std::io::Write;
use std::time::Duration;

use handly_config::{ConfigError, HandlyConfig, LoggingConfig};
use handly_core::{CacheLimits, DEFAULT_INIT_POLL_INTERVAL};
use pretty_assertions::assert_eq;
use tempfile::NamedTempFile;

#[test]
fn empty_config_uses_defaults() {
    let config = HandlyConfig::load_from_str("").expect("config should parse");
    assert_eq!(config, HandlyConfig::default());
    assert_eq!(config.logging, LoggingConfig::default());
    assert_eq!(config.logging.level, "info");
    assert!(config.logging.stderr);

    let options = config.manager_options();
    assert_eq!(options.init_poll_interval, DEFAULT_INIT_POLL_INTERVAL);
    assert_eq!(options.cache_limits.source_construct, None);
    assert_eq!(
        options.cache_limits.load_factor,
        CacheLimits::DEFAULT_LOAD_FACTOR
    );
}

#[test]
fn sections_feed_manager_options() {
    let text = r#"
[cache]
memory_ratio = 1.0
source_file = 40
source_construct = 4000
load_factor = 0.5

[working_copy]
init_poll_interval_ms = 25

[logging]
level = "handly.cache=trace,info"
json = true
"#;

    let config = HandlyConfig::load_from_str(text).expect("config should parse");
    assert!(config.logging.json);

    let options = config.manager_options();
    assert_eq!(options.init_poll_interval, Duration::from_millis(25));
    assert_eq!(
        options.cache_limits,
        CacheLimits {
            project: Some(CacheLimits::DEFAULT_PROJECT),
            root_folder: Some(CacheLimits::DEFAULT_ROOT_FOLDER),
            package: Some(CacheLimits::DEFAULT_PACKAGE),
            source_file: Some(40),
            source_construct: Some(4000),
            load_factor: 0.5,
        }
    );
}

#[test]
fn loads_from_path() {
    let mut file = NamedTempFile::new().expect("tempfile");
    writeln!(file, "[cache]\nproject = 3").expect("write config");

    let config = HandlyConfig::load_from_path(file.path()).expect("config should load");
    assert_eq!(config.cache.project, Some(3));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("handly.toml");

    let err = HandlyConfig::load_from_path(&path).unwrap_err();
    match err {
        ConfigError::Io { path: reported, .. } => {
            assert_eq!(reported, path.display().to_string())
        }
        other => panic!("expected an io error, got {other:?}"),
    }
}

#[test]
fn type_errors_are_reported() {
    let err = HandlyConfig::load_from_str("[cache]\nsource_file = \"many\"\n").unwrap_err();
    assert!(matches!(err, ConfigError::Toml(_)), "{err:?}");
}
