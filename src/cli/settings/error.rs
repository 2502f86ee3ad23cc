//! Error types for settings operations.

use thiserror::Error;

use crate::core::config::ConfigError;

/// Errors that can occur when modifying configuration settings.
#[derive(Debug, Error)]
pub enum SettingError {
    #[error("Unknown config key: {0}")]
    UnknownKey(String),
    /// The provided item (for example an MCP server id) was not found.
    #[error("{kind} '{input}' not found")]
    UnknownItem {
        kind: &'static str,
        input: String,
        hint: Option<String>,
    },
    #[error("Invalid boolean value: {0}")]
    InvalidBoolean(String),
    #[error("Invalid value for {key}: {input}")]
    InvalidValue { key: &'static str, input: String },
    #[error("{hint}")]
    MissingArgs {
        hint: &'static str,
        example: &'static str,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SettingError {
    /// Print the error message to stderr with appropriate formatting.
    pub fn print(&self) {
        match self {
            SettingError::UnknownItem { hint, .. } => {
                eprintln!("❌ {self}.");
                if let Some(hint) = hint {
                    eprintln!("   {hint}");
                }
            }
            SettingError::InvalidBoolean(_) => {
                eprintln!("❌ {self}");
                eprintln!("   Use 'on' or 'off' (also accepts true/false, yes/no)");
            }
            SettingError::MissingArgs { hint, example } => {
                eprintln!("⚠️  {hint}");
                eprintln!("Example: {example}");
            }
            _ => eprintln!("❌ {self}"),
        }
    }
}
