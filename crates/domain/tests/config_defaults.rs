use sa_domain::config::Config;

#[test]
fn default_db_path_is_under_data_dir() {
    let config = Config::default();
    assert_eq!(config.paths.db_path.to_string_lossy(), "./data/memory.sqlite3");
}

#[test]
fn explicit_timeouts_parse_from_toml() {
    let toml_str = r#"
[timeouts]
llm_secs = 90
embed_secs = 20
http_secs = 45
max_retries = 1
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.timeouts.llm_secs, 90);
    assert_eq!(config.timeouts.max_retries, 1);
}

#[test]
fn partial_toml_fills_remaining_fields_with_defaults() {
    let toml_str = r#"
[circuits.llm]
failure_threshold = 1
success_threshold = 1
timeout_secs = 5.0
half_open_max_calls = 1
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.circuits.llm.failure_threshold, 1);
    assert_eq!(config.circuits.research.failure_threshold, 5);
    assert!(config.validate().is_empty());
}
