use handly_config::{ConfigWarning, HandlyConfig};
use pretty_assertions::assert_eq;

#[test]
fn reports_unknown_keys_with_full_paths() {
    let text = r#"
typo = 1

[cache]
sourcefile = 10

[working_copy]
init_poll_interval_ms = 5
"#;

    let (config, diagnostics) =
        HandlyConfig::load_from_str_with_diagnostics(text).expect("config should parse");

    assert_eq!(diagnostics.unknown_keys, vec!["cache.sourcefile", "typo"]);
    assert!(diagnostics.warnings.is_empty());
    assert_eq!(config.working_copy.init_poll_interval_ms, 5);
}

#[test]
fn clean_config_has_no_diagnostics() {
    let (_config, diagnostics) =
        HandlyConfig::load_from_str_with_diagnostics("[cache]\nsource_file = 10\n")
            .expect("config should parse");
    assert!(diagnostics.is_empty());
}

#[test]
fn warns_about_out_of_range_values() {
    let text = r#"
[cache]
memory_ratio = -1.0
package = 0
load_factor = 2.0

[working_copy]
init_poll_interval_ms = 0
"#;

    let (_config, diagnostics) =
        HandlyConfig::load_from_str_with_diagnostics(text).expect("config should parse");

    let paths: Vec<_> = diagnostics
        .warnings
        .iter()
        .map(|warning| match warning {
            ConfigWarning::InvalidValue { toml_path, .. } => toml_path.as_str(),
            other => panic!("unexpected warning {other:?}"),
        })
        .collect();
    assert_eq!(
        paths,
        vec![
            "cache.memory_ratio",
            "cache.package",
            "cache.load_factor",
            "working_copy.init_poll_interval_ms",
        ]
    );
}

#[test]
fn validates_logging_level_directives() {
    let text = r#"
[logging]
level = "warn,handly=foo"
"#;

    let (_config, diagnostics) =
        HandlyConfig::load_from_str_with_diagnostics(text).expect("config should parse");

    assert_eq!(
        diagnostics.warnings,
        vec![ConfigWarning::LoggingLevelInvalid {
            value: "warn,handly=foo".to_string(),
            normalized: "warn,handly=foo".to_string(),
        }]
    );
}
