//! `hearth models`, `hearth show`, and `hearth pull`.

use std::error::Error;
use std::io::{self, Write};

use futures_util::StreamExt;

use crate::api::{ModelInfo, ShowResponse};
use crate::cli::runtime::Runtime;

fn format_size(bytes: u64) -> String {
    const GB: f64 = 1_000_000_000.0;
    const MB: f64 = 1_000_000.0;
    let bytes = bytes as f64;
    if bytes >= GB {
        format!("{:.1} GB", bytes / GB)
    } else {
        format!("{:.0} MB", bytes / MB)
    }
}

fn model_line(model: &ModelInfo, default_model: &str) -> String {
    let mut line = format!("  • {}", model.name);
    if let Some(details) = &model.details {
        let extras: Vec<&str> = [
            details.parameter_size.as_deref(),
            details.quantization_level.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect();
        if !extras.is_empty() {
            line.push_str(&format!(" ({})", extras.join(", ")));
        }
    }
    if let Some(size) = model.size {
        line.push_str(&format!("  {}", format_size(size)));
    }
    if model.name == default_model || model.name == format!("{default_model}:latest") {
        line.push_str("  🎯 default");
    }
    line
}

pub async fn list_models(runtime: &Runtime) -> Result<(), Box<dyn Error>> {
    let models = runtime.client.list_models().await?;
    println!("🤖 Models on {}", runtime.client.base_url());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if models.is_empty() {
        println!("No models installed. Try 'hearth pull {}'.", runtime.config.model());
        return Ok(());
    }
    for model in &models {
        println!("{}", model_line(model, runtime.config.model()));
    }
    Ok(())
}

fn describe_model(name: &str, show: &ShowResponse) -> String {
    let mut lines = vec![format!("🤖 {name}")];
    if let Some(details) = &show.details {
        if let Some(family) = &details.family {
            lines.push(format!("  family: {family}"));
        }
        if let Some(size) = &details.parameter_size {
            lines.push(format!("  parameters: {size}"));
        }
        if let Some(quant) = &details.quantization_level {
            lines.push(format!("  quantization: {quant}"));
        }
    }
    if !show.capabilities.is_empty() {
        lines.push(format!("  capabilities: {}", show.capabilities.join(", ")));
        if !show.supports("tools") {
            lines.push("  ⚠️  no tool support; tool calls will not work with this model".to_string());
        }
    }
    if let Some(system) = show.system.as_deref().filter(|s| !s.trim().is_empty()) {
        lines.push(format!("  system: {}", system.trim()));
    }
    match show.default_parameters() {
        Ok(defaults) if !defaults.is_empty() => {
            lines.push("  defaults:".to_string());
            for (key, value) in defaults.iter() {
                lines.push(format!("    {key} = {value}"));
            }
        }
        Ok(_) => {}
        Err(err) => lines.push(format!("  defaults: unreadable ({err})")),
    }
    lines.join("\n")
}

pub async fn show_model(runtime: &Runtime, model: &str) -> Result<(), Box<dyn Error>> {
    let show = runtime.client.show(model).await?;
    println!("{}", describe_model(model, &show));
    Ok(())
}

pub async fn pull_model(runtime: &Runtime, model: &str) -> Result<(), Box<dyn Error>> {
    let mut progress = runtime.client.pull(model).await?;
    let mut stdout = io::stdout();
    let mut last_status = String::new();
    while let Some(update) = progress.next().await {
        let update = update?;
        match update.percent() {
            Some(percent) => {
                write!(stdout, "\r{}: {percent:>3}%", update.status)?;
            }
            None if update.status != last_status => {
                if !last_status.is_empty() {
                    writeln!(stdout)?;
                }
                write!(stdout, "{}", update.status)?;
            }
            None => {}
        }
        stdout.flush()?;
        last_status = update.status;
    }
    writeln!(stdout)?;
    println!("✅ Pulled {model}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ModelDetails;

    #[test]
    fn model_line_marks_default_and_details() {
        let model = ModelInfo {
            name: "llama3.2:latest".to_string(),
            modified_at: None,
            size: Some(2_019_393_189),
            digest: None,
            details: Some(ModelDetails {
                family: Some("llama".to_string()),
                parameter_size: Some("3.2B".to_string()),
                quantization_level: Some("Q4_K_M".to_string()),
                format: None,
            }),
        };
        assert_eq!(
            model_line(&model, "llama3.2"),
            "  • llama3.2:latest (3.2B, Q4_K_M)  2.0 GB  🎯 default"
        );
    }

    #[test]
    fn describe_model_lists_parsed_defaults_and_missing_tools() {
        let show: ShowResponse = serde_json::from_value(serde_json::json!({
            "parameters": "stop \"<|im_start|>\"\nstop \"<|im_end|>\"\ntemperature 0.7",
            "capabilities": ["completion"]
        }))
        .unwrap();
        assert_eq!(
            describe_model("phi3", &show),
            [
                "🤖 phi3",
                "  capabilities: completion",
                "  ⚠️  no tool support; tool calls will not work with this model",
                "  defaults:",
                "    stop = [\"<|im_start|>\",\"<|im_end|>\"]",
                "    temperature = 0.7",
            ]
            .join("\n")
        );
    }

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_size(734_000_000), "734 MB");
        assert_eq!(format_size(4_700_000_000), "4.7 GB");
    }
}
