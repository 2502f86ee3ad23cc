//! Handlers for each configuration key.

use std::fmt::Display;
use std::str::FromStr;

use super::error::SettingError;
use super::SettingHandler;
use crate::core::config::data::{
    DEFAULT_KEEP_ALIVE_MINUTES, DEFAULT_MAX_TOOL_ROUNDS, DEFAULT_MODEL, DEFAULT_TOOL_TIMEOUT_SECS,
};
use crate::core::config::env::parse_bool;
use crate::core::config::Config;

fn success_set(key: &str, value: &str) -> String {
    format!("✅ Set {key} to: {value}")
}

/// Truncate a string to `max_chars` characters, appending "..." if truncated.
fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    let mut chars = s.chars();
    let truncated: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{truncated}...")
    } else {
        truncated
    }
}

/// A free-text setting stored as `Option<String>`.
pub struct TextSetting {
    key: &'static str,
    example: &'static str,
    field: fn(&mut Config) -> &mut Option<String>,
    current: fn(&Config) -> Option<&String>,
    default: Option<&'static str>,
}

pub fn default_model_handler() -> TextSetting {
    TextSetting {
        key: "default-model",
        example: "hearth set default-model qwen2.5:7b",
        field: |config| &mut config.default_model,
        current: |config| config.default_model.as_ref(),
        default: Some(DEFAULT_MODEL),
    }
}

pub fn system_prompt_handler() -> TextSetting {
    TextSetting {
        key: "system-prompt",
        example: "hearth set system-prompt \"You are a concise assistant.\"",
        field: |config| &mut config.system_prompt,
        current: |config| config.system_prompt.as_ref(),
        default: None,
    }
}

impl SettingHandler for TextSetting {
    fn key(&self) -> &'static str {
        self.key
    }

    fn set(&self, args: &[String], config: &mut Config) -> Result<String, SettingError> {
        let value = args.join(" ");
        if value.trim().is_empty() {
            return Err(SettingError::MissingArgs {
                hint: "Provide a value for this setting:",
                example: self.example,
            });
        }
        let message = success_set(self.key, &truncate_with_ellipsis(&value, 50));
        *(self.field)(config) = Some(value);
        Ok(message)
    }

    fn unset(&self, _args: Option<&str>, config: &mut Config) -> Result<String, SettingError> {
        *(self.field)(config) = None;
        Ok(match self.default {
            Some(default) => format!("✅ Unset {} (will use default: {default})", self.key),
            None => format!("✅ Unset {}", self.key),
        })
    }

    fn format(&self, config: &Config) -> String {
        match ((self.current)(config), self.default) {
            (Some(value), _) => {
                let flat = value.replace('\n', " ");
                format!("  {}: {}", self.key, truncate_with_ellipsis(&flat, 50))
            }
            (None, Some(default)) => format!("  {}: (unset, default: {default})", self.key),
            (None, None) => format!("  {}: (unset)", self.key),
        }
    }
}

/// A numeric setting stored as `Option<T>` with a built-in default.
pub struct NumberSetting<T: 'static> {
    key: &'static str,
    example: &'static str,
    unit: &'static str,
    field: fn(&mut Config) -> &mut Option<T>,
    current: fn(&Config) -> Option<T>,
    default: T,
}

pub fn keep_alive_handler() -> NumberSetting<u32> {
    NumberSetting {
        key: "keep-alive",
        example: "hearth set keep-alive 30",
        unit: "minutes",
        field: |config| &mut config.keep_alive,
        current: |config| config.keep_alive,
        default: DEFAULT_KEEP_ALIVE_MINUTES,
    }
}

pub fn tool_timeout_handler() -> NumberSetting<u64> {
    NumberSetting {
        key: "tool-timeout",
        example: "hearth set tool-timeout 60",
        unit: "seconds",
        field: |config| &mut config.tool_timeout_secs,
        current: |config| config.tool_timeout_secs,
        default: DEFAULT_TOOL_TIMEOUT_SECS,
    }
}

pub fn max_tool_rounds_handler() -> NumberSetting<u32> {
    NumberSetting {
        key: "max-tool-rounds",
        example: "hearth set max-tool-rounds 4",
        unit: "rounds",
        field: |config| &mut config.max_tool_rounds,
        current: |config| config.max_tool_rounds,
        default: DEFAULT_MAX_TOOL_ROUNDS,
    }
}

impl<T> SettingHandler for NumberSetting<T>
where
    T: FromStr + Display + Copy + Send + Sync + 'static,
{
    fn key(&self) -> &'static str {
        self.key
    }

    fn set(&self, args: &[String], config: &mut Config) -> Result<String, SettingError> {
        let [raw] = args else {
            return Err(SettingError::MissingArgs {
                hint: "Provide a single whole number:",
                example: self.example,
            });
        };
        let value = raw
            .trim()
            .parse::<T>()
            .map_err(|_| SettingError::InvalidValue {
                key: self.key,
                input: raw.clone(),
            })?;
        *(self.field)(config) = Some(value);
        Ok(success_set(self.key, &format!("{value} {}", self.unit)))
    }

    fn unset(&self, _args: Option<&str>, config: &mut Config) -> Result<String, SettingError> {
        *(self.field)(config) = None;
        Ok(format!(
            "✅ Unset {} (will use default: {} {})",
            self.key, self.default, self.unit
        ))
    }

    fn format(&self, config: &Config) -> String {
        match (self.current)(config) {
            Some(value) => format!("  {}: {value} {}", self.key, self.unit),
            None => format!(
                "  {}: (unset, default: {} {})",
                self.key, self.default, self.unit
            ),
        }
    }
}

/// Handler for `default-tools`, the tool names enabled on new sessions.
pub struct DefaultToolsHandler;

impl SettingHandler for DefaultToolsHandler {
    fn key(&self) -> &'static str {
        "default-tools"
    }

    fn set(&self, args: &[String], config: &mut Config) -> Result<String, SettingError> {
        let tools: Vec<String> = args
            .iter()
            .flat_map(|arg| arg.split(','))
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        // An explicit empty list is allowed and disables every tool.
        let display = if tools.is_empty() {
            "(none)".to_string()
        } else {
            tools.join(", ")
        };
        config.default_tools = Some(tools);
        Ok(success_set("default-tools", &display))
    }

    fn unset(&self, _args: Option<&str>, config: &mut Config) -> Result<String, SettingError> {
        config.default_tools = None;
        Ok("✅ Unset default-tools (new sessions enable every tool)".to_string())
    }

    fn format(&self, config: &Config) -> String {
        match &config.default_tools {
            Some(tools) if tools.is_empty() => "  default-tools: (none)".to_string(),
            Some(tools) => format!("  default-tools: {}", tools.join(", ")),
            None => "  default-tools: (unset, all tools)".to_string(),
        }
    }
}

/// Handler for the `mcp` setting: `hearth set mcp <server> on|off`.
pub struct McpHandler;

impl McpHandler {
    fn validate_server(config: &Config, server_id: &str) -> Result<(), SettingError> {
        if config.get_mcp_server(server_id).is_some() {
            return Ok(());
        }

        let available: Vec<_> = config.mcp_servers.iter().map(|s| s.id.as_str()).collect();
        let hint = if available.is_empty() {
            Some("No MCP servers are configured. Add servers to config.toml first.".into())
        } else {
            Some(format!("Available servers: {}", available.join(", ")))
        };

        Err(SettingError::UnknownItem {
            kind: "MCP server",
            input: server_id.to_string(),
            hint,
        })
    }
}

impl SettingHandler for McpHandler {
    fn key(&self) -> &'static str {
        "mcp"
    }

    fn set(&self, args: &[String], config: &mut Config) -> Result<String, SettingError> {
        let [server_id, state] = args else {
            return Err(SettingError::MissingArgs {
                hint: "To enable or disable an MCP server:",
                example: "hearth set mcp <server> on/off",
            });
        };
        Self::validate_server(config, server_id)?;
        let enabled =
            parse_bool(state).ok_or_else(|| SettingError::InvalidBoolean(state.clone()))?;

        if let Some(server) = config
            .mcp_servers
            .iter_mut()
            .find(|s| s.id.eq_ignore_ascii_case(server_id))
        {
            server.enabled = Some(enabled);
        }
        Ok(format!(
            "✅ MCP server {server_id} {}",
            if enabled { "enabled" } else { "disabled" }
        ))
    }

    fn unset(&self, args: Option<&str>, config: &mut Config) -> Result<String, SettingError> {
        let Some(server_id) = args else {
            return Err(SettingError::MissingArgs {
                hint: "To reset an MCP server to its default (enabled):",
                example: "hearth unset mcp <server>",
            });
        };
        Self::validate_server(config, server_id)?;
        if let Some(server) = config
            .mcp_servers
            .iter_mut()
            .find(|s| s.id.eq_ignore_ascii_case(server_id))
        {
            server.enabled = None;
        }
        Ok(format!("✅ Reset MCP server {server_id} (enabled)"))
    }

    fn format(&self, config: &Config) -> String {
        if config.mcp_servers.is_empty() {
            return "  mcp: (no servers configured)".to_string();
        }
        let mut lines = vec!["  mcp:".to_string()];
        for server in &config.mcp_servers {
            lines.push(format!(
                "    {}: {} ({})",
                server.id,
                if server.is_enabled() { "on" } else { "off" },
                server.command
            ));
        }
        lines.join("\n")
    }
}
