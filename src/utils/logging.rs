//! Plain-text transcript logging for `--log` and `/log`.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::core::message::{Message, Role};

pub struct LoggingState {
    file_path: Option<String>,
    is_active: bool,
}

impl LoggingState {
    /// A file given up front starts logging immediately.
    pub fn new(log_file: Option<String>) -> Result<Self, std::io::Error> {
        let mut logging = LoggingState {
            file_path: None,
            is_active: false,
        };
        if let Some(path) = log_file {
            logging.set_log_file(path)?;
        }
        Ok(logging)
    }

    pub fn set_log_file(&mut self, path: String) -> Result<String, std::io::Error> {
        test_file_access(&path)?;

        self.file_path = Some(path.clone());
        self.is_active = true;

        Ok(format!("Logging enabled to: {path}"))
    }

    pub fn toggle_logging(&mut self) -> Result<String, String> {
        let Some(path) = self.file_path.clone() else {
            return Err(
                "No log file specified. Use /log <filename> to enable logging first.".to_string(),
            );
        };
        if self.is_active {
            self.log_message("## Logging paused")
                .map_err(|err| err.to_string())?;
            self.is_active = false;
            Ok(format!("Logging paused (file: {path})"))
        } else {
            self.is_active = true;
            Ok(format!("Logging resumed to: {path}"))
        }
    }

    pub fn log_message(&self, content: &str) -> Result<(), std::io::Error> {
        match (&self.file_path, self.is_active) {
            (Some(path), true) => append_block(path, content),
            _ => Ok(()),
        }
    }

    /// Log a finished exchange line: user lines are prefixed, replies are not.
    pub fn log_chat(&self, role: Role, content: &str) -> Result<(), std::io::Error> {
        match role {
            Role::User => self.log_message(&format!("You: {content}")),
            Role::Assistant if !content.is_empty() => self.log_message(content),
            _ => Ok(()),
        }
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn get_status_string(&self) -> String {
        match (&self.file_path, self.is_active) {
            (None, _) => "disabled".to_string(),
            (Some(path), true) => format!("active ({})", file_name(path)),
            (Some(path), false) => format!("paused ({})", file_name(path)),
        }
    }
}

fn file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .into_owned()
}

fn append_block(path: &str, content: &str) -> Result<(), std::io::Error> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = BufWriter::with_capacity(64 * 1024, file);

    for line in content.lines() {
        writeln!(writer, "{line}")?;
    }
    // Blank line between messages.
    writeln!(writer)?;

    writer.flush()
}

fn test_file_access(path: &str) -> Result<(), std::io::Error> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.flush()
}

/// Render a conversation the way the transcript log does. Tool traffic is
/// summarized on single lines.
pub fn render_transcript(messages: &[Message]) -> String {
    let mut out = String::new();
    for message in messages {
        let block = match message.role {
            Role::User => format!("You: {}", message.content),
            Role::Assistant if !message.tool_calls.is_empty() => message
                .tool_calls
                .iter()
                .map(|call| format!("## Tool call: {} {}", call.name, call.arguments_json()))
                .collect::<Vec<_>>()
                .join("\n"),
            Role::Assistant => message.content.clone(),
            Role::Tool => format!(
                "## Tool result ({}): {}",
                message.tool_name.as_deref().unwrap_or("unknown"),
                message.content
            ),
            Role::System => format!("## System: {}", message.content),
        };
        if block.is_empty() {
            continue;
        }
        for line in block.lines() {
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
    }
    out
}

/// Write `messages` to `path`, refusing to overwrite unless asked.
pub fn export_transcript(
    messages: &[Message],
    path: &Path,
    overwrite: bool,
) -> Result<(), std::io::Error> {
    if path.exists() && !overwrite {
        return Err(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("{} already exists", path.display()),
        ));
    }
    let parent = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut temp_file = NamedTempFile::new_in(parent)?;
    temp_file.write_all(render_transcript(messages).as_bytes())?;
    temp_file.flush()?;
    temp_file.as_file().sync_all()?;
    temp_file.persist(path).map_err(|err| err.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::ToolCall;
    use serde_json::Map;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn log_pause_and_resume() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chat.log");
        let path_str = path.to_string_lossy().to_string();

        let mut logging = LoggingState::new(Some(path_str)).unwrap();
        assert!(logging.is_active());
        logging.log_chat(Role::User, "Hello").unwrap();
        logging.log_chat(Role::Assistant, "Hi there!").unwrap();
        logging.toggle_logging().unwrap();
        logging.log_chat(Role::User, "not logged").unwrap();
        assert!(logging.get_status_string().starts_with("paused"));
        logging.toggle_logging().unwrap();
        logging.log_chat(Role::User, "Back").unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "You: Hello\n\nHi there!\n\n## Logging paused\n\nYou: Back\n\n"
        );
    }

    #[test]
    fn toggle_without_file_is_an_error() {
        let mut logging = LoggingState::new(None).unwrap();
        assert!(logging.toggle_logging().is_err());
        assert_eq!(logging.get_status_string(), "disabled");
    }

    #[test]
    fn export_refuses_to_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("export.txt");
        let mut arguments = Map::new();
        arguments.insert("command".to_string(), serde_json::json!("ls"));
        let messages = vec![
            Message::user("list files"),
            Message::assistant("").with_tool_calls(vec![ToolCall::new("shell", arguments)]),
            Message::tool_result("shell", "Cargo.toml"),
            Message::assistant("There is one file."),
        ];

        export_transcript(&messages, &path, false).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "You: list files\n\n## Tool call: shell {\"command\":\"ls\"}\n\n## Tool result (shell): Cargo.toml\n\nThere is one file.\n\n"
        );

        let err = export_transcript(&messages, &path, false).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::AlreadyExists);
        assert!(export_transcript(&messages[..1], &path, true).is_ok());
    }
}
