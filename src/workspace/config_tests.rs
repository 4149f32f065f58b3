use super::*;

#[test]
fn default_config_validates_and_keeps_discovery_off() {
    let config = default_config();
    validate_config(&config).expect("default config is valid");
    assert!(!config.discovery.enabled);
    assert!(config.export.versioning);
    assert_eq!(config.discovery.max_retries, 3);
}

#[test]
fn unknown_provider_is_a_config_error() {
    let mut config = default_config();
    config.discovery.provider = "oracle".to_string();
    let err = validate_config(&config).expect_err("unknown provider");
    let message = err.to_string();
    assert!(message.contains("unknown discovery.provider"), "{message}");
    assert!(message.contains("command"), "{message}");
}

#[test]
fn out_of_range_confidence_is_rejected() {
    let mut config = default_config();
    config.discovery.min_confidence = 1.5;
    assert!(validate_config(&config).is_err());
}

#[test]
fn unknown_fields_fail_to_parse() {
    let raw = r#"{"schema_version": 1, "discovery": {"enabled": true, "mode": "auto"}}"#;
    assert!(serde_json::from_str::<PipelineConfig>(raw).is_err());
}

#[test]
fn partial_config_fills_defaults() {
    let raw = r#"{"schema_version": 1, "discovery": {"enabled": true, "provider": "replay"}}"#;
    let config: PipelineConfig = serde_json::from_str(raw).expect("parse partial config");
    assert!(config.discovery.enabled);
    assert_eq!(config.discovery.provider, "replay");
    assert_eq!(config.evidence.max_file_size, 1024 * 1024);
    validate_config(&config).expect("partial config is valid");
}

#[test]
fn missing_config_loads_defaults_and_roundtrips() {
    let root = tempfile::tempdir().expect("tempdir");
    let loaded = load_config(root.path()).expect("load defaults");
    assert_eq!(loaded.schema_version, CONFIG_SCHEMA_VERSION);

    let mut config = default_config();
    config.discovery.enabled = true;
    write_config(root.path(), &config).expect("write config");
    let reloaded = load_config(root.path()).expect("reload config");
    assert!(reloaded.discovery.enabled);
}

#[test]
fn cli_command_takes_precedence_over_config() {
    let config = DiscoveryConfig {
        command: Some("from-config".to_string()),
        ..DiscoveryConfig::default()
    };
    assert_eq!(
        resolve_provider_command(Some("from-cli"), &config).as_deref(),
        Some("from-cli")
    );
    assert_eq!(
        resolve_provider_command(None, &config).as_deref(),
        Some("from-config")
    );
}
