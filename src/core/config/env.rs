//! Settings taken from the process environment.
//!
//! - `OLLAMA_URL`: full base URL of the model server. When unset or empty it
//!   is derived from `OLLAMA_HOST` (default `127.0.0.1:11434`).
//! - `HEARTH_VERIFY_SSL`: set to `false` to accept invalid TLS certificates.
//! - `HEARTH_DATA_DIR`: where the session database and diagnostics live.

use std::path::PathBuf;

use crate::core::config::io::project_dirs;
use crate::utils::url::normalize_host;

pub const DEFAULT_OLLAMA_HOST: &str = "127.0.0.1:11434";

#[derive(Debug, Clone, PartialEq)]
pub struct EnvConfig {
    pub ollama_url: String,
    pub verify_ssl: bool,
    pub data_dir: PathBuf,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup so tests need not touch the
    /// real process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let ollama_url = match non_empty("OLLAMA_URL") {
            Some(url) => url.trim().trim_end_matches('/').to_string(),
            None => normalize_host(
                &non_empty("OLLAMA_HOST").unwrap_or_else(|| DEFAULT_OLLAMA_HOST.to_string()),
            ),
        };

        let verify_ssl = non_empty("HEARTH_VERIFY_SSL")
            .and_then(|value| parse_bool(&value))
            .unwrap_or(true);

        let data_dir = non_empty("HEARTH_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);

        Self {
            ollama_url,
            verify_ssl,
            data_dir,
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("store.db")
    }

    pub fn diagnostics_log_path(&self) -> PathBuf {
        self.data_dir.join("hearth.log")
    }
}

fn default_data_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".hearth"))
}

pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
