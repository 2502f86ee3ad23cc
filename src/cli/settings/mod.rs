//! Settings management for the `set`, `unset`, and `config` commands.
//!
//! Each configuration key has a handler that knows how to parse, clear, and
//! display it. Handlers mutate an in-memory [`Config`]; the caller decides
//! where it is loaded from and saved to.

pub mod error;
pub mod handlers;
pub mod registry;

pub use error::SettingError;
pub use registry::SettingRegistry;

use std::path::Path;

use crate::core::config::Config;

pub trait SettingHandler: Send + Sync {
    fn key(&self) -> &'static str;

    /// Apply `args` (everything after the key) and return a success message.
    fn set(&self, args: &[String], config: &mut Config) -> Result<String, SettingError>;

    /// Clear the value. `args` carries an optional qualifier.
    fn unset(&self, args: Option<&str>, config: &mut Config) -> Result<String, SettingError>;

    /// One indented line describing the current value.
    fn format(&self, config: &Config) -> String;
}

/// Load the config at `path`, apply `set`, and save it back.
pub fn set_in_file(path: &Path, key: &str, args: &[String]) -> Result<String, SettingError> {
    let registry = SettingRegistry::new();
    let handler = registry
        .get(key)
        .ok_or_else(|| SettingError::UnknownKey(key.to_string()))?;
    let mut config = Config::load_from_path(path)?;
    let message = handler.set(args, &mut config)?;
    config.save_to_path(path)?;
    Ok(message)
}

pub fn unset_in_file(path: &Path, key: &str, args: Option<&str>) -> Result<String, SettingError> {
    let registry = SettingRegistry::new();
    let handler = registry
        .get(key)
        .ok_or_else(|| SettingError::UnknownKey(key.to_string()))?;
    let mut config = Config::load_from_path(path)?;
    let message = handler.unset(args, &mut config)?;
    config.save_to_path(path)?;
    Ok(message)
}

/// Every setting in display order.
pub fn describe(config: &Config) -> String {
    let registry = SettingRegistry::new();
    let mut lines = vec!["Current configuration:".to_string()];
    for key in registry.keys_display_order() {
        if let Some(handler) = registry.get(key) {
            lines.push(handler.format(config));
        }
    }
    lines.join("\n")
}
