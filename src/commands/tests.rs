use super::*;

fn action(input: &str) -> Action {
    match process_input(input) {
        CommandResult::Action(action) => action,
        other => panic!("expected an action for {input:?}, got {other:?}"),
    }
}

fn error(input: &str) -> String {
    match process_input(input) {
        CommandResult::Error(message) => message,
        other => panic!("expected an error for {input:?}, got {other:?}"),
    }
}

#[test]
fn plain_text_is_sent_as_message() {
    assert_eq!(
        process_input("hello /there"),
        CommandResult::Message("hello /there".to_string())
    );
    assert_eq!(process_input("/"), CommandResult::Message("/".to_string()));
}

#[test]
fn unknown_commands_are_reported() {
    assert_eq!(
        error("/frobnicate now"),
        "Unknown command: /frobnicate. Type /help for a list of commands."
    );
}

#[test]
fn unknown_prefixes_suggest_commands() {
    assert_eq!(error("/se"), "Unknown command: /se. Did you mean /sessions?");
    assert_eq!(
        error("/s"),
        "Unknown command: /s. Did you mean /sessions or /switch or /system?"
    );
}

#[test]
fn command_names_are_case_insensitive() {
    assert_eq!(action("/HELP"), Action::Help);
    assert_eq!(action("/Quit"), Action::Quit);
}

#[test]
fn session_commands() {
    assert_eq!(action("/new"), Action::New { name: None });
    assert_eq!(
        action("/new  Trip planning "),
        Action::New {
            name: Some("Trip planning".to_string())
        }
    );
    assert_eq!(action("/switch 3f2a"), Action::Switch("3f2a".to_string()));
    assert_eq!(error("/switch"), "Usage: /switch <id>");
    assert_eq!(
        action("/rename Weekly notes"),
        Action::Rename("Weekly notes".to_string())
    );
    assert_eq!(error("/rename"), "Usage: /rename <name>");
}

#[test]
fn system_prompt_commands() {
    assert_eq!(action("/system"), Action::System(SystemChange::Show));
    assert_eq!(action("/system clear"), Action::System(SystemChange::Clear));
    assert_eq!(
        action("/system You are terse."),
        Action::System(SystemChange::Set("You are terse.".to_string()))
    );
}

#[test]
fn parameter_commands() {
    assert_eq!(
        action("/param stop <|end|>"),
        Action::Param {
            key: "stop".to_string(),
            value: Some("<|end|>".to_string())
        }
    );
    assert_eq!(
        action("/param temperature"),
        Action::Param {
            key: "temperature".to_string(),
            value: None
        }
    );
    assert_eq!(action("/keepalive 30"), Action::KeepAlive(30));
    assert_eq!(
        error("/keepalive soon"),
        "Keep-alive must be a whole number of minutes, got 'soon'."
    );
}

#[test]
fn format_command_accepts_schema() {
    assert_eq!(action("/format json"), Action::Format(ResponseFormat::Json));
    match action(r#"/format {"type":"object"}"#) {
        Action::Format(ResponseFormat::Schema(schema)) => {
            assert_eq!(schema.get("type").and_then(|v| v.as_str()), Some("object"));
        }
        other => panic!("unexpected action {other:?}"),
    }
    assert_eq!(error("/format yaml"), "Invalid format: 'yaml'");
}

#[test]
fn tool_toggle_requires_state() {
    assert_eq!(
        action("/tool shell off"),
        Action::Tool {
            name: "shell".to_string(),
            enabled: false
        }
    );
    assert_eq!(error("/tool shell"), "Usage: /tool <name> on|off");
    assert_eq!(error("/tool shell maybe"), "Usage: /tool <name> on|off");
}

#[test]
fn prompt_command_keeps_raw_arguments() {
    assert_eq!(
        action("/prompt files review path='src/main.rs' style=terse"),
        Action::Prompt {
            server: "files".to_string(),
            name: "review".to_string(),
            args: "path='src/main.rs' style=terse".to_string()
        }
    );
    assert_eq!(
        error("/prompt files"),
        "Usage: /prompt <server> <name> [key=value ...]"
    );
}

#[test]
fn file_arguments() {
    assert_eq!(
        action("/image \"shots/screen one.png\""),
        Action::Image(PathBuf::from("shots/screen one.png"))
    );
    assert_eq!(action("/export"), Action::Export(None));
    assert_eq!(
        action("/export chat.txt"),
        Action::Export(Some(PathBuf::from("chat.txt")))
    );
    assert_eq!(action("/log"), Action::Log(None));
}

#[test]
fn help_lists_every_command() {
    let help = help_text();
    for command in all_commands() {
        assert!(help.contains(command.usage), "missing {}", command.name);
    }
    assert_eq!(matching_commands("se").len(), 1);
    assert!(find_command("tools").is_some());
}
