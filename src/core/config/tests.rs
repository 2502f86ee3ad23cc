use super::data::{Config, McpServerConfig, DEFAULT_MODEL};
use super::env::{parse_bool, EnvConfig};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn test_load_nonexistent_config() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nonexistent_config.toml");

    let config = Config::load_from_path(&config_path).expect("Failed to load config");

    assert_eq!(config, Config::default());
    assert_eq!(config.model(), DEFAULT_MODEL);
    assert_eq!(config.keep_alive_minutes(), 5);
    assert_eq!(config.tool_timeout(), Duration::from_secs(30));
}

#[test]
fn test_config_persistence_lifecycle() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nested").join("config.toml");

    let mut server = McpServerConfig::new("files", "mcp-files");
    server.args = vec!["--root".to_string(), "/tmp".to_string()];
    server.allowed_tools = Some(vec!["read_file".to_string()]);

    let config = Config {
        default_model: Some("qwen2.5:7b".to_string()),
        tool_timeout_secs: Some(5),
        mcp_servers: vec![server],
        ..Default::default()
    };
    config
        .save_to_path(&config_path)
        .expect("Failed to save config");

    let loaded = Config::load_from_path(&config_path).expect("Failed to load config");
    assert_eq!(loaded, config);
    assert_eq!(loaded.model(), "qwen2.5:7b");

    let server = loaded.get_mcp_server("FILES").expect("server by id");
    assert!(server.is_enabled());
    assert!(server.allows_tool("read_file"));
    assert!(!server.allows_tool("write_file"));

    let mut modified = loaded;
    modified.default_model = None;
    modified.save_to_path(&config_path).expect("resave");
    let reloaded = Config::load_from_path(&config_path).expect("reload");
    assert_eq!(reloaded.model(), DEFAULT_MODEL);
}

#[test]
fn test_invalid_toml_reports_path() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");
    std::fs::write(&config_path, "default_model = [").unwrap();

    let err = Config::load_from_path(&config_path).expect_err("parse should fail");
    assert!(err.to_string().starts_with("Failed to parse config at"));
}

#[test]
fn test_mcp_server_toml_shape() {
    let config: Config = toml::from_str(
        r#"
        [[mcp_servers]]
        id = "git"
        command = "uvx"
        args = ["mcp-server-git"]
        enabled = false
        "#,
    )
    .expect("parse");

    assert_eq!(config.mcp_servers.len(), 1);
    assert_eq!(config.mcp_servers[0].label(), "git");
    assert_eq!(config.enabled_mcp_servers().count(), 0);
}

#[test]
fn test_initial_tools_filters_to_available() {
    let available = vec!["date_time".to_string(), "shell".to_string()];

    let config = Config::default();
    assert_eq!(config.initial_tools(&available), available);

    let config = Config {
        default_tools: Some(vec!["shell".to_string(), "missing".to_string()]),
        ..Default::default()
    };
    assert_eq!(config.initial_tools(&available), vec!["shell".to_string()]);
}

#[test]
fn test_env_defaults() {
    let env = EnvConfig::from_lookup(lookup_from(&[("HEARTH_DATA_DIR", "/tmp/hearth")]));
    assert_eq!(env.ollama_url, "http://127.0.0.1:11434");
    assert!(env.verify_ssl);
    assert_eq!(env.database_path(), PathBuf::from("/tmp/hearth/store.db"));
}

#[test]
fn test_env_url_takes_precedence_over_host() {
    let env = EnvConfig::from_lookup(lookup_from(&[
        ("OLLAMA_HOST", "gpu-box:11434"),
        ("OLLAMA_URL", "https://proxy.example.com/ollama/"),
        ("HEARTH_VERIFY_SSL", "false"),
    ]));
    assert_eq!(env.ollama_url, "https://proxy.example.com/ollama");
    assert!(!env.verify_ssl);

    let env = EnvConfig::from_lookup(lookup_from(&[
        ("OLLAMA_HOST", "gpu-box:11434"),
        ("OLLAMA_URL", ""),
    ]));
    assert_eq!(env.ollama_url, "http://gpu-box:11434");
}

#[test]
fn test_parse_bool_variants() {
    assert_eq!(parse_bool("Yes"), Some(true));
    assert_eq!(parse_bool("0"), Some(false));
    assert_eq!(parse_bool("maybe"), None);
}
