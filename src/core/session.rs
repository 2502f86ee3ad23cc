use chrono::{DateTime, Utc};

use crate::core::message::Message;
use crate::core::parameters::{ModelParameters, ResponseFormat};

pub const DEFAULT_SESSION_NAME: &str = "New chat";

/// A persistent conversation with its own model settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: String,
    pub name: String,
    pub model: String,
    pub system: Option<String>,
    pub parameters: ModelParameters,
    pub format: ResponseFormat,
    /// Minutes the server should keep the model loaded after a request.
    pub keep_alive: u32,
    /// Names of tools the model may call in this session.
    pub tools: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub messages: Vec<Message>,
}

impl Session {
    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }

    pub fn tool_enabled(&self, name: &str) -> bool {
        self.tools.iter().any(|tool| tool == name)
    }

    pub fn enable_tool(&mut self, name: &str) -> bool {
        if self.tool_enabled(name) {
            return false;
        }
        self.tools.push(name.to_string());
        true
    }

    pub fn disable_tool(&mut self, name: &str) -> bool {
        let before = self.tools.len();
        self.tools.retain(|tool| tool != name);
        before != self.tools.len()
    }

    /// The most recent assistant reply, if any.
    pub fn last_reply(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|message| message.is_assistant() && message.tool_calls.is_empty())
    }
}

/// Settings used to create a session.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSession {
    pub name: String,
    pub model: String,
    pub system: Option<String>,
    pub parameters: ModelParameters,
    pub format: ResponseFormat,
    pub keep_alive: u32,
    pub tools: Vec<String>,
}

impl NewSession {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            name: DEFAULT_SESSION_NAME.to_string(),
            model: model.into(),
            system: None,
            parameters: ModelParameters::default(),
            format: ResponseFormat::Text,
            keep_alive: 5,
            tools: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_system(mut self, system: Option<String>) -> Self {
        self.system = system.filter(|text| !text.trim().is_empty());
        self
    }

    pub fn with_parameters(mut self, parameters: ModelParameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_keep_alive(mut self, minutes: u32) -> Self {
        self.keep_alive = minutes;
        self
    }

    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.tools = tools;
        self
    }
}

/// Row shown when listing sessions.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub id: String,
    pub name: String,
    pub model: String,
    pub updated_at: DateTime<Utc>,
    pub message_count: u64,
}

pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// Derive a session name from the first user prompt. Long lines are cut
/// at the last word boundary within the limit; a single overlong word is
/// cut mid-word.
pub fn name_from_prompt(prompt: &str) -> String {
    const MAX_CHARS: usize = 40;
    let line = prompt.lines().next().unwrap_or("").trim();
    if line.is_empty() {
        return DEFAULT_SESSION_NAME.to_string();
    }
    let Some((limit, next)) = line.char_indices().nth(MAX_CHARS) else {
        return line.to_string();
    };
    let head = &line[..limit];
    let cut = if next.is_whitespace() {
        head
    } else {
        match head.rfind(char::is_whitespace) {
            Some(space) => &head[..space],
            None => head,
        }
    };
    format!("{}…", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_id_handles_short_strings() {
        assert_eq!(short_id("abc"), "abc");
        assert_eq!(short_id("0123456789"), "01234567");
    }

    #[test]
    fn name_from_prompt_uses_first_line() {
        assert_eq!(name_from_prompt("hello there\nsecond"), "hello there");
        assert_eq!(name_from_prompt("   "), DEFAULT_SESSION_NAME);
        let long = "x".repeat(60);
        let name = name_from_prompt(&long);
        assert_eq!(name.chars().count(), 41);
        assert!(name.ends_with('…'));
    }

    #[test]
    fn long_names_break_between_words() {
        assert_eq!(
            name_from_prompt("please summarize the attached quarterly report for me"),
            "please summarize the attached quarterly…"
        );
        // The limit lands right before a space.
        assert_eq!(
            name_from_prompt("0123456789 0123456789 0123456789 0123456 tail"),
            "0123456789 0123456789 0123456789 0123456…"
        );
        let exact = "a".repeat(40);
        assert_eq!(name_from_prompt(&exact), exact);
    }

    #[test]
    fn blank_system_prompt_is_dropped() {
        let settings = NewSession::new("llama3.2").with_system(Some("  ".to_string()));
        assert!(settings.system.is_none());
    }
}
