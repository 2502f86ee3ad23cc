use super::{Action, ParseError};

pub type CommandParser = fn(CommandInvocation<'_>) -> Result<Action, ParseError>;

pub struct Command {
    pub name: &'static str,
    pub usage: &'static str,
    pub help: &'static str,
    pub parse: CommandParser,
}

#[derive(Clone, Copy)]
pub struct CommandInvocation<'a> {
    pub input: &'a str,
    pub args: &'a str,
}

pub fn all_commands() -> &'static [Command] {
    COMMANDS
}

pub fn find_command(name: &str) -> Option<&'static Command> {
    all_commands()
        .iter()
        .find(|command| command.name.eq_ignore_ascii_case(name))
}

/// Commands whose name starts with `prefix`, for completion hints.
pub fn matching_commands(prefix: &str) -> Vec<&'static Command> {
    let prefix = prefix.to_ascii_lowercase();
    all_commands()
        .iter()
        .filter(|command| command.name.starts_with(&prefix))
        .collect()
}

const COMMANDS: &[Command] = &[
    Command {
        name: "help",
        usage: "/help",
        help: "Show available commands.",
        parse: super::parse_help,
    },
    Command {
        name: "new",
        usage: "/new [name]",
        help: "Start a new session.",
        parse: super::parse_new_session,
    },
    Command {
        name: "sessions",
        usage: "/sessions",
        help: "List saved sessions, most recent first.",
        parse: super::parse_sessions,
    },
    Command {
        name: "switch",
        usage: "/switch <id>",
        help: "Switch to another session by id or id prefix.",
        parse: super::parse_switch,
    },
    Command {
        name: "delete",
        usage: "/delete",
        help: "Delete the current session and start a new one.",
        parse: super::parse_delete,
    },
    Command {
        name: "rename",
        usage: "/rename <name>",
        help: "Rename the current session.",
        parse: super::parse_rename,
    },
    Command {
        name: "system",
        usage: "/system [text|clear]",
        help: "Show, set, or clear the system prompt.",
        parse: super::parse_system,
    },
    Command {
        name: "model",
        usage: "/model <name>",
        help: "Switch the model used by this session.",
        parse: super::parse_model,
    },
    Command {
        name: "params",
        usage: "/params",
        help: "Show the session's model parameters.",
        parse: super::parse_params,
    },
    Command {
        name: "param",
        usage: "/param <key> [value...]",
        help: "Set a model parameter, or clear it when no value is given.",
        parse: super::parse_param,
    },
    Command {
        name: "format",
        usage: "/format <text|json|JSON schema>",
        help: "Set the response format.",
        parse: super::parse_format,
    },
    Command {
        name: "keepalive",
        usage: "/keepalive <minutes>",
        help: "Set how long the server keeps the model loaded.",
        parse: super::parse_keep_alive,
    },
    Command {
        name: "tools",
        usage: "/tools",
        help: "List available tools and whether they are enabled.",
        parse: super::parse_tools,
    },
    Command {
        name: "tool",
        usage: "/tool <name> on|off",
        help: "Enable or disable a tool for this session.",
        parse: super::parse_tool,
    },
    Command {
        name: "image",
        usage: "/image <path>",
        help: "Attach an image to your next message.",
        parse: super::parse_image,
    },
    Command {
        name: "prompt",
        usage: "/prompt <server> <name> [key=value ...]",
        help: "Send an MCP server prompt as your message.",
        parse: super::parse_prompt,
    },
    Command {
        name: "history",
        usage: "/history",
        help: "Print the conversation so far.",
        parse: super::parse_history,
    },
    Command {
        name: "calls",
        usage: "/calls",
        help: "Show tool calls made in this session.",
        parse: super::parse_calls,
    },
    Command {
        name: "log",
        usage: "/log [file]",
        help: "Toggle transcript logging or set the log file.",
        parse: super::parse_log,
    },
    Command {
        name: "export",
        usage: "/export [file]",
        help: "Export the conversation to a text file.",
        parse: super::parse_export,
    },
    Command {
        name: "quit",
        usage: "/quit",
        help: "Exit hearth.",
        parse: super::parse_quit,
    },
];
