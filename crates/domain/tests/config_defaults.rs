use sp_domain::config::{Config, StoreBackend};

#[test]
fn default_host_is_localhost() {
    let config = Config::default();
    assert_eq!(config.server.host, "127.0.0.1");
}

#[test]
fn default_cors_allows_only_localhost() {
    let config = Config::default();
    assert!(config.server.cors.allowed_origins.contains(&"http://localhost:*".to_string()));
    assert!(config.server.cors.allowed_origins.contains(&"http://127.0.0.1:*".to_string()));
}

#[test]
fn full_file_parses() {
    let toml_str = r#"
[server]
host = "0.0.0.0"
port = 8001

[server.cors]
allowed_origins = ["https://dash.example.com"]

[streaming]
metrics_sample_interval = 5
default_platforms = ["kick"]

[store]
backend = "jsonl"
path = "./data"

[observability]
service_name = "streampilot-staging"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.cors.allowed_origins, vec!["https://dash.example.com"]);
    assert_eq!(config.streaming.metrics_sample_interval, 5);
    assert_eq!(config.streaming.default_platforms, vec!["kick"]);
    assert_eq!(config.streaming.default_user_id, "demo-user");
    assert_eq!(config.store.backend, StoreBackend::Jsonl);
    assert_eq!(config.observability.service_name, "streampilot-staging");
}

#[test]
fn empty_file_is_default() {
    let config: Config = toml::from_str("").unwrap();
    assert_eq!(config.server.port, 8001);
    assert_eq!(config.streaming.metrics_sample_interval, 10);
    assert_eq!(config.store.backend, StoreBackend::Memory);
}
