use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "llama3.2";
pub const DEFAULT_KEEP_ALIVE_MINUTES: u32 = 5;
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_TOOL_ROUNDS: u32 = 8;

/// An MCP server launched as a child process and spoken to over stdio.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct McpServerConfig {
    pub id: String,
    pub display_name: Option<String>,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub env: Option<HashMap<String, String>>,
    pub enabled: Option<bool>,
    /// When set, only these tools are exposed to the model.
    pub allowed_tools: Option<Vec<String>>,
    pub protocol_version: Option<String>,
}

impl McpServerConfig {
    pub fn new(id: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            command: command.into(),
            args: Vec::new(),
            env: None,
            enabled: None,
            allowed_tools: None,
            protocol_version: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.id)
    }

    pub fn allows_tool(&self, name: &str) -> bool {
        match &self.allowed_tools {
            Some(allowed) => allowed.iter().any(|tool| tool == name),
            None => true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    /// Model used for new sessions (e.g., "llama3.2", "qwen2.5:7b")
    pub default_model: Option<String>,
    /// System prompt applied to new sessions
    pub system_prompt: Option<String>,
    /// Minutes the server keeps a model loaded after each request
    pub keep_alive: Option<u32>,
    /// Upper bound on a single tool call
    pub tool_timeout_secs: Option<u64>,
    /// Model/tool round trips allowed within one user turn
    pub max_tool_rounds: Option<u32>,
    /// Tools enabled on new sessions; all discovered tools when unset
    pub default_tools: Option<Vec<String>>,
    #[serde(default)]
    pub mcp_servers: Vec<McpServerConfig>,
}

impl Config {
    pub fn model(&self) -> &str {
        self.default_model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    pub fn keep_alive_minutes(&self) -> u32 {
        self.keep_alive.unwrap_or(DEFAULT_KEEP_ALIVE_MINUTES)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(
            self.tool_timeout_secs
                .unwrap_or(DEFAULT_TOOL_TIMEOUT_SECS)
                .max(1),
        )
    }

    pub fn max_tool_rounds(&self) -> u32 {
        self.max_tool_rounds.unwrap_or(DEFAULT_MAX_TOOL_ROUNDS)
    }

    /// Tools to enable on a new session, given everything discovered.
    pub fn initial_tools(&self, available: &[String]) -> Vec<String> {
        match &self.default_tools {
            Some(names) => names
                .iter()
                .filter(|name| available.contains(name))
                .cloned()
                .collect(),
            None => available.to_vec(),
        }
    }

    pub fn get_mcp_server(&self, id: &str) -> Option<&McpServerConfig> {
        self.mcp_servers
            .iter()
            .find(|server| server.id.eq_ignore_ascii_case(id))
    }

    pub fn enabled_mcp_servers(&self) -> impl Iterator<Item = &McpServerConfig> {
        self.mcp_servers.iter().filter(|server| server.is_enabled())
    }
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
