//! Registry of setting handlers.

use std::collections::HashMap;

use super::handlers::{
    default_model_handler, keep_alive_handler, max_tool_rounds_handler, system_prompt_handler,
    tool_timeout_handler, DefaultToolsHandler, McpHandler,
};
use super::SettingHandler;

/// Registry of all available setting handlers.
pub struct SettingRegistry {
    handlers: HashMap<&'static str, Box<dyn SettingHandler>>,
    /// Keys in display order for `hearth config` output.
    display_order: Vec<&'static str>,
}

impl SettingRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            handlers: HashMap::new(),
            display_order: Vec::new(),
        };

        registry.register(Box::new(default_model_handler()));
        registry.register(Box::new(system_prompt_handler()));
        registry.register(Box::new(keep_alive_handler()));
        registry.register(Box::new(tool_timeout_handler()));
        registry.register(Box::new(max_tool_rounds_handler()));
        registry.register(Box::new(DefaultToolsHandler));
        registry.register(Box::new(McpHandler));

        registry
    }

    fn register(&mut self, handler: Box<dyn SettingHandler>) {
        let key = handler.key();
        self.display_order.push(key);
        self.handlers.insert(key, handler);
    }

    pub fn get(&self, key: &str) -> Option<&dyn SettingHandler> {
        self.handlers.get(key).map(|h| h.as_ref())
    }

    pub fn keys_display_order(&self) -> &[&'static str] {
        &self.display_order
    }
}

impl Default for SettingRegistry {
    fn default() -> Self {
        Self::new()
    }
}
