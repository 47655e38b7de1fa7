use admission::config::{AdmissionConfig, LogFormat};
use admission::error::AdmissionError;
use admission::rate_limit::{EndpointCategory, PolicyEntry, PolicyTable, Tier};
use std::path::PathBuf;

fn sample_config_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config/admission.yaml")
}

#[test]
fn test_sample_config_loads_and_validates() {
    let config = AdmissionConfig::from_file(sample_config_path()).unwrap();
    config.validate().unwrap();

    assert_eq!(config.server.port, 8080);
    assert_eq!(config.server.log_format, LogFormat::Compact);
    assert_eq!(
        config.upstream.as_ref().map(|u| u.url.as_str()),
        Some("http://localhost:3000")
    );
    assert_eq!(config.rate_limiting.ipv6_prefix_len, 64);
    assert!(config.metrics.enabled);
}

#[test]
fn test_sample_policies_match_builtin_table() {
    let config = AdmissionConfig::from_file(sample_config_path()).unwrap();
    assert_eq!(config.rate_limiting.policies, PolicyTable::default());
}

#[test]
fn test_builtin_table_values() {
    let table = PolicyTable::default();

    assert_eq!(
        table.entry(Tier::Anonymous, EndpointCategory::Generate),
        PolicyEntry::new(5, 3600)
    );
    assert!(table
        .entry(Tier::Anonymous, EndpointCategory::Export)
        .is_forbidden());
    assert_eq!(
        table.entry(Tier::Free, EndpointCategory::Export),
        PolicyEntry::new(10, 3600)
    );
    assert_eq!(
        table.entry(Tier::Pro, EndpointCategory::Status),
        PolicyEntry::new(300, 60)
    );
    assert_eq!(
        table.entry(Tier::Enterprise, EndpointCategory::Default),
        PolicyEntry::new(1000, 60)
    );
}

#[test]
fn test_missing_file_is_config_error() {
    let err = AdmissionConfig::from_file("does/not/exist.yaml").unwrap_err();
    assert!(matches!(err, AdmissionError::Config(_)));
    assert_eq!(err.code(), "CONFIG_ERROR");
}
