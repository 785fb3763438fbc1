use fleetprobe::app::{AppMode, Application};
use fleetprobe_core::AppConfig;

const SAMPLE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/config/fleetprobe.toml");

#[test]
fn test_sample_config_matches_defaults() {
    let config = AppConfig::load(Some(SAMPLE)).unwrap();
    let defaults = AppConfig::default();

    assert_eq!(config.controller, defaults.controller);
    assert_eq!(config.agent, defaults.agent);
    assert_eq!(config.tracker, defaults.tracker);
    assert_eq!(config.observability.log_format, "json");
    assert!(config.observability.metrics_bind_address.is_none());
}

#[test]
fn test_sample_config_starts_controller_only() {
    let config = AppConfig::load(Some(SAMPLE)).unwrap();
    assert!(Application::new(config.clone(), AppMode::Controller).is_ok());
    // 未注入任务信息时不能以 agent 模式启动
    assert!(Application::new(config, AppMode::Agent).is_err());
}

#[test]
fn test_missing_config_file_is_an_error() {
    assert!(AppConfig::load(Some("config/does-not-exist.toml")).is_err());
}
