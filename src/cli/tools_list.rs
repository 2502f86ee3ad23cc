//! `hearth tools`: every tool the model could call, built-in and MCP.

use std::error::Error;

use crate::cli::runtime::Runtime;
use crate::tools::{ToolBridge, ToolSpec};

fn tool_line(spec: &ToolSpec, enabled_by_default: bool) -> String {
    let description = spec
        .description
        .as_deref()
        .and_then(|text| text.lines().next())
        .unwrap_or("");
    format!(
        "  {} {:<20} [{}] {}",
        if enabled_by_default { "●" } else { "○" },
        spec.name,
        spec.source.label(),
        description
    )
}

pub fn describe_tools(bridge: &ToolBridge, default_tools: &[String]) -> Vec<String> {
    bridge
        .specs()
        .map(|spec| tool_line(spec, default_tools.contains(&spec.name)))
        .collect()
}

pub async fn list_tools(runtime: &Runtime) -> Result<(), Box<dyn Error>> {
    let (bridge, mcp) = runtime.tools().await;
    let defaults = runtime.config.initial_tools(&bridge.names());

    println!("🔧 Tools (● enabled on new sessions)");
    for line in describe_tools(&bridge, &defaults) {
        println!("{line}");
    }

    for server in mcp.servers() {
        if server.prompts.is_empty() {
            continue;
        }
        println!();
        println!("📝 Prompts from {}", server.config.label());
        for prompt in &server.prompts {
            let args: Vec<String> = prompt
                .arguments
                .iter()
                .map(|arg| {
                    if arg.required.unwrap_or(false) {
                        arg.name.clone()
                    } else {
                        format!("[{}]", arg.name)
                    }
                })
                .collect();
            println!("  /prompt {} {} {}", server.config.id, prompt.name, args.join(" "));
        }
    }

    mcp.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::builtin::builtin_tools;
    use std::time::Duration;

    #[test]
    fn builtin_tools_are_listed_with_source() {
        let mut bridge = ToolBridge::new(Duration::from_secs(5));
        for tool in builtin_tools(reqwest::Client::new()) {
            bridge.register(tool);
        }
        let lines = describe_tools(&bridge, &["date_time".to_string()]);
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("  ● date_time"));
        assert!(lines[0].contains("[built-in]"));
        assert!(lines[1].starts_with("  ○ shell"));
    }
}
