//! Argument parsing for `/prompt <server> <name> [args]`.

use std::collections::HashMap;

use rust_mcp_schema::PromptArgument;

/// Parse `key=value` pairs. A prompt with a single argument also accepts a
/// bare value, quoted or not.
pub fn parse_prompt_args(
    input: &str,
    prompt_args: &[PromptArgument],
) -> Result<HashMap<String, String>, String> {
    if input.trim().is_empty() {
        return Ok(HashMap::new());
    }

    if prompt_args.len() == 1 {
        if let Ok(map) = parse_kv_args(input) {
            return Ok(map);
        }
        let value = parse_single_prompt_value(input)?;
        let mut args = HashMap::new();
        args.insert(prompt_args[0].name.clone(), value);
        return Ok(args);
    }

    parse_kv_args(input)
}

/// Reject unknown names and report missing required arguments.
pub fn validate_prompt_args(
    args: &HashMap<String, String>,
    prompt_args: &[PromptArgument],
) -> Result<(), String> {
    let mut allowed: Vec<&str> = prompt_args.iter().map(|arg| arg.name.as_str()).collect();

    for key in args.keys() {
        if !allowed.iter().any(|name| name == key) {
            allowed.sort();
            let allowed_list = if allowed.is_empty() {
                "none".to_string()
            } else {
                allowed.join(", ")
            };
            return Err(format!(
                "Unknown prompt argument '{}'. Allowed: {}.",
                key, allowed_list
            ));
        }
    }

    let missing: Vec<&str> = prompt_args
        .iter()
        .filter(|arg| arg.required.unwrap_or(false) && !args.contains_key(&arg.name))
        .map(|arg| arg.name.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(format!(
            "Missing required prompt argument(s): {}.",
            missing.join(", ")
        ));
    }

    Ok(())
}

fn parse_kv_args(input: &str) -> Result<HashMap<String, String>, String> {
    let tokens = tokenize_prompt_args(input)?;
    let mut args = HashMap::new();
    for token in tokens {
        let Some((key, value)) = token.split_once('=') else {
            return Err(format!(
                "Invalid prompt argument '{}'. Use key=value.",
                token
            ));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err("Prompt argument name cannot be empty.".to_string());
        }
        args.insert(key.to_string(), value.to_string());
    }

    Ok(args)
}

fn parse_single_prompt_value(input: &str) -> Result<String, String> {
    Ok(tokenize_prompt_args(input)?.join(" "))
}

fn tokenize_prompt_args(input: &str) -> Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quote: Option<char> = None;
    for ch in input.chars() {
        match ch {
            '"' | '\'' => match in_quote {
                Some(q) if q == ch => in_quote = None,
                Some(_) => current.push(ch),
                None => in_quote = Some(ch),
            },
            c if c.is_whitespace() && in_quote.is_none() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(ch),
        }
    }
    if let Some(q) = in_quote {
        return Err(format!("Unclosed quote ({}) in prompt arguments.", q));
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arg(name: &str, required: bool) -> PromptArgument {
        PromptArgument {
            name: name.to_string(),
            title: None,
            description: None,
            required: Some(required),
        }
    }

    #[test]
    fn table_driven_prompt_parsing() {
        let one_arg = vec![arg("path", true)];
        let many_args = vec![arg("path", true), arg("style", false)];

        struct Case<'a> {
            input: &'a str,
            schema: &'a [PromptArgument],
            expected: Result<Vec<(&'a str, &'a str)>, &'a str>,
        }

        let cases = vec![
            Case {
                input: "path=src/main.rs style=terse",
                schema: &many_args,
                expected: Ok(vec![("path", "src/main.rs"), ("style", "terse")]),
            },
            Case {
                input: "style='very terse' path=a.rs",
                schema: &many_args,
                expected: Ok(vec![("style", "very terse"), ("path", "a.rs")]),
            },
            Case {
                input: "\"src/my file.rs\"",
                schema: &one_arg,
                expected: Ok(vec![("path", "src/my file.rs")]),
            },
            Case {
                input: "src lib",
                schema: &one_arg,
                expected: Ok(vec![("path", "src lib")]),
            },
            Case {
                input: "path",
                schema: &many_args,
                expected: Err("Invalid prompt argument 'path'. Use key=value."),
            },
            Case {
                input: "path='open",
                schema: &many_args,
                expected: Err("Unclosed quote (') in prompt arguments."),
            },
        ];

        for case in cases {
            let parsed = parse_prompt_args(case.input, case.schema);
            match (parsed, case.expected) {
                (Ok(map), Ok(pairs)) => {
                    assert_eq!(map.len(), pairs.len());
                    for (key, value) in pairs {
                        assert_eq!(map.get(key).map(String::as_str), Some(value));
                    }
                }
                (Err(err), Err(expected)) => assert_eq!(err, expected),
                (outcome, expected) => {
                    panic!("unexpected parse result: {:?} vs {:?}", outcome, expected)
                }
            }
        }
    }

    #[test]
    fn validation_reports_unknown_and_missing_arguments() {
        let schema = vec![arg("path", true), arg("style", false)];

        let unknown = parse_prompt_args("colour=red path=x", &schema).unwrap();
        assert_eq!(
            validate_prompt_args(&unknown, &schema).unwrap_err(),
            "Unknown prompt argument 'colour'. Allowed: path, style."
        );

        let missing = parse_prompt_args("style=terse", &schema).unwrap();
        assert_eq!(
            validate_prompt_args(&missing, &schema).unwrap_err(),
            "Missing required prompt argument(s): path."
        );

        let ok = parse_prompt_args("path=x", &schema).unwrap();
        assert!(validate_prompt_args(&ok, &schema).is_ok());
    }
}
