use super::*;

fn parse_args(argv: &[&str]) -> Args {
    Args::try_parse_from(argv)
        .unwrap_or_else(|err| panic!("argv={argv:?} should parse successfully: {err}"))
}

#[test]
fn no_subcommand_means_chat_with_top_level_flags() {
    let args = parse_args(&["hearth", "-m", "qwen2.5", "--system", "Be terse."]);
    assert!(args.command.is_none());
    assert_eq!(args.chat.model.as_deref(), Some("qwen2.5"));
    assert_eq!(args.chat.system.as_deref(), Some("Be terse."));
    assert!(!args.chat.new);
}

#[test]
fn chat_subcommand_accepts_the_same_flags() {
    let args = parse_args(&["hearth", "chat", "--new", "--name", "planning", "-l", "chat.log"]);
    match args.command {
        Some(Commands::Chat(chat)) => {
            assert!(chat.new);
            assert_eq!(chat.name.as_deref(), Some("planning"));
            assert_eq!(chat.log.as_deref(), Some("chat.log"));
        }
        other => panic!("expected chat subcommand, got {other:?}"),
    }
}

#[test]
fn session_and_new_conflict() {
    assert!(Args::try_parse_from(["hearth", "--session", "abc", "--new"]).is_err());
}

#[test]
fn say_collects_the_prompt_words() {
    let args = parse_args(&["hearth", "say", "-m", "llama3.2", "what", "is", "recursion?"]);
    assert_eq!(
        args.command,
        Some(Commands::Say {
            model: Some("llama3.2".to_string()),
            session: None,
            prompt: vec!["what".to_string(), "is".to_string(), "recursion?".to_string()],
        })
    );
}

#[test]
fn say_requires_a_prompt() {
    assert!(Args::try_parse_from(["hearth", "say"]).is_err());
}

#[test]
fn set_keeps_multi_word_values() {
    let args = parse_args(&["hearth", "set", "system-prompt", "You", "are", "helpful."]);
    assert_eq!(
        args.command,
        Some(Commands::Set {
            key: "system-prompt".to_string(),
            value: vec!["You".to_string(), "are".to_string(), "helpful.".to_string()],
        })
    );
}

#[test]
fn unset_takes_an_optional_qualifier() {
    let args = parse_args(&["hearth", "unset", "mcp", "files"]);
    assert_eq!(
        args.command,
        Some(Commands::Unset {
            key: "mcp".to_string(),
            value: Some("files".to_string()),
        })
    );

    let args = parse_args(&["hearth", "unset", "default-model"]);
    assert_eq!(
        args.command,
        Some(Commands::Unset {
            key: "default-model".to_string(),
            value: None,
        })
    );
}

#[test]
fn export_output_is_optional() {
    let args = parse_args(&["hearth", "export", "3f2a", "-o", "notes.txt"]);
    assert_eq!(
        args.command,
        Some(Commands::Export {
            id: "3f2a".to_string(),
            output: Some(PathBuf::from("notes.txt")),
        })
    );
}
