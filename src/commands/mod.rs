//! REPL slash commands. Parsing is separate from execution: each command
//! turns its arguments into an [`Action`] that the REPL carries out.

mod registry;

pub use registry::{all_commands, find_command, matching_commands, CommandInvocation};

use std::path::PathBuf;

use crate::core::parameters::ResponseFormat;

#[derive(Debug, Clone, PartialEq)]
pub enum SystemChange {
    Show,
    Clear,
    Set(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Help,
    New { name: Option<String> },
    Sessions,
    Switch(String),
    Delete,
    Rename(String),
    System(SystemChange),
    Model(String),
    Params,
    /// A `None` value clears the parameter.
    Param { key: String, value: Option<String> },
    Format(ResponseFormat),
    KeepAlive(u32),
    Tools,
    Tool { name: String, enabled: bool },
    Image(PathBuf),
    Prompt { server: String, name: String, args: String },
    History,
    Calls,
    Log(Option<String>),
    Export(Option<PathBuf>),
    Quit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    Usage,
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    /// Plain text to send to the model.
    Message(String),
    Action(Action),
    Error(String),
}

pub fn process_input(input: &str) -> CommandResult {
    let trimmed = input.trim();

    if !trimmed.starts_with('/') {
        return CommandResult::Message(input.to_string());
    }

    let mut parts = trimmed[1..].splitn(2, char::is_whitespace);
    let command_name = match parts.next() {
        Some(name) if !name.is_empty() => name,
        _ => return CommandResult::Message(input.to_string()),
    };
    let args = parts.next().unwrap_or("").trim();

    let Some(command) = registry::find_command(command_name) else {
        let suggestions: Vec<String> = registry::matching_commands(command_name)
            .iter()
            .map(|command| format!("/{}", command.name))
            .collect();
        return CommandResult::Error(if suggestions.is_empty() {
            format!("Unknown command: /{command_name}. Type /help for a list of commands.")
        } else {
            format!(
                "Unknown command: /{command_name}. Did you mean {}?",
                suggestions.join(" or ")
            )
        });
    };
    let invocation = CommandInvocation {
        input: trimmed,
        args,
    };
    match (command.parse)(invocation) {
        Ok(action) => CommandResult::Action(action),
        Err(ParseError::Usage) => CommandResult::Error(format!("Usage: {}", command.usage)),
        Err(ParseError::Invalid(message)) => CommandResult::Error(message),
    }
}

pub fn help_text() -> String {
    let width = all_commands()
        .iter()
        .map(|command| command.usage.len())
        .max()
        .unwrap_or(0);
    let mut text = String::from("Commands:\n");
    for command in all_commands() {
        text.push_str(&format!(
            "  {:width$}  {}\n",
            command.usage,
            command.help,
            width = width
        ));
    }
    text.push_str("\nAnything else is sent to the model. Press Ctrl+C to stop a reply.");
    text
}

fn required(args: &str) -> Result<&str, ParseError> {
    if args.is_empty() {
        Err(ParseError::Usage)
    } else {
        Ok(args)
    }
}

fn optional(args: &str) -> Option<String> {
    (!args.is_empty()).then(|| args.to_string())
}

pub(super) fn parse_help(_invocation: CommandInvocation<'_>) -> Result<Action, ParseError> {
    Ok(Action::Help)
}

pub(super) fn parse_sessions(_invocation: CommandInvocation<'_>) -> Result<Action, ParseError> {
    Ok(Action::Sessions)
}

pub(super) fn parse_delete(_invocation: CommandInvocation<'_>) -> Result<Action, ParseError> {
    Ok(Action::Delete)
}

pub(super) fn parse_params(_invocation: CommandInvocation<'_>) -> Result<Action, ParseError> {
    Ok(Action::Params)
}

pub(super) fn parse_tools(_invocation: CommandInvocation<'_>) -> Result<Action, ParseError> {
    Ok(Action::Tools)
}

pub(super) fn parse_history(_invocation: CommandInvocation<'_>) -> Result<Action, ParseError> {
    Ok(Action::History)
}

pub(super) fn parse_calls(_invocation: CommandInvocation<'_>) -> Result<Action, ParseError> {
    Ok(Action::Calls)
}

pub(super) fn parse_quit(_invocation: CommandInvocation<'_>) -> Result<Action, ParseError> {
    Ok(Action::Quit)
}

pub(super) fn parse_new_session(invocation: CommandInvocation<'_>) -> Result<Action, ParseError> {
    Ok(Action::New {
        name: optional(invocation.args),
    })
}

pub(super) fn parse_switch(invocation: CommandInvocation<'_>) -> Result<Action, ParseError> {
    let id = required(invocation.args)?;
    if id.contains(char::is_whitespace) {
        return Err(ParseError::Usage);
    }
    Ok(Action::Switch(id.to_string()))
}

pub(super) fn parse_rename(invocation: CommandInvocation<'_>) -> Result<Action, ParseError> {
    Ok(Action::Rename(required(invocation.args)?.to_string()))
}

pub(super) fn parse_system(invocation: CommandInvocation<'_>) -> Result<Action, ParseError> {
    let change = match invocation.args {
        "" => SystemChange::Show,
        "clear" => SystemChange::Clear,
        text => SystemChange::Set(text.to_string()),
    };
    Ok(Action::System(change))
}

pub(super) fn parse_model(invocation: CommandInvocation<'_>) -> Result<Action, ParseError> {
    Ok(Action::Model(required(invocation.args)?.to_string()))
}

pub(super) fn parse_param(invocation: CommandInvocation<'_>) -> Result<Action, ParseError> {
    let args = required(invocation.args)?;
    let (key, value) = match args.split_once(char::is_whitespace) {
        Some((key, value)) => (key, optional(value.trim())),
        None => (args, None),
    };
    Ok(Action::Param {
        key: key.to_string(),
        value,
    })
}

pub(super) fn parse_format(invocation: CommandInvocation<'_>) -> Result<Action, ParseError> {
    let args = required(invocation.args)?;
    args.parse::<ResponseFormat>()
        .map(Action::Format)
        .map_err(ParseError::Invalid)
}

pub(super) fn parse_keep_alive(invocation: CommandInvocation<'_>) -> Result<Action, ParseError> {
    let args = required(invocation.args)?;
    args.parse::<u32>().map(Action::KeepAlive).map_err(|_| {
        ParseError::Invalid(format!(
            "Keep-alive must be a whole number of minutes, got '{args}'."
        ))
    })
}

pub(super) fn parse_tool(invocation: CommandInvocation<'_>) -> Result<Action, ParseError> {
    let parts: Vec<&str> = invocation.args.split_whitespace().collect();
    let [name, state] = parts.as_slice() else {
        return Err(ParseError::Usage);
    };
    let enabled = match state.to_ascii_lowercase().as_str() {
        "on" | "enable" => true,
        "off" | "disable" => false,
        _ => return Err(ParseError::Usage),
    };
    Ok(Action::Tool {
        name: name.to_string(),
        enabled,
    })
}

pub(super) fn parse_image(invocation: CommandInvocation<'_>) -> Result<Action, ParseError> {
    let path = required(invocation.args)?;
    let path = path
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(path);
    Ok(Action::Image(PathBuf::from(path)))
}

pub(super) fn parse_prompt(invocation: CommandInvocation<'_>) -> Result<Action, ParseError> {
    let mut parts = invocation.args.splitn(3, char::is_whitespace);
    let (Some(server), Some(name)) = (parts.next(), parts.next()) else {
        return Err(ParseError::Usage);
    };
    if server.is_empty() || name.is_empty() {
        return Err(ParseError::Usage);
    }
    Ok(Action::Prompt {
        server: server.to_string(),
        name: name.to_string(),
        args: parts.next().unwrap_or("").trim().to_string(),
    })
}

pub(super) fn parse_log(invocation: CommandInvocation<'_>) -> Result<Action, ParseError> {
    Ok(Action::Log(optional(invocation.args)))
}

pub(super) fn parse_export(invocation: CommandInvocation<'_>) -> Result<Action, ParseError> {
    Ok(Action::Export(optional(invocation.args).map(PathBuf::from)))
}

#[cfg(test)]
mod tests;
