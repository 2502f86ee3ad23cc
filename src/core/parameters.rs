//! Model parameters (Ollama runtime options) and response formats.
//!
//! Parameters are entered as `key value` lines, the same shape a Modelfile
//! uses for `PARAMETER` directives. Values are parsed as literals where
//! possible (numbers, booleans, quoted strings, JSON arrays) and kept as raw
//! strings otherwise. Repeating a key collects its values into a list, which is
//! how multiple `stop` sequences are expressed.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Option names accepted by the Ollama runtime.
pub const KNOWN_OPTIONS: &[&str] = &[
    "numa",
    "num_ctx",
    "num_batch",
    "num_gpu",
    "main_gpu",
    "low_vram",
    "f16_kv",
    "logits_all",
    "vocab_only",
    "use_mmap",
    "use_mlock",
    "embedding_only",
    "num_thread",
    "num_keep",
    "seed",
    "num_predict",
    "top_k",
    "top_p",
    "tfs_z",
    "typical_p",
    "repeat_last_n",
    "temperature",
    "repeat_penalty",
    "presence_penalty",
    "frequency_penalty",
    "mirostat",
    "mirostat_tau",
    "mirostat_eta",
    "penalize_newline",
    "stop",
    "min_p",
];

pub fn is_known_option(key: &str) -> bool {
    KNOWN_OPTIONS.contains(&key)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelParameters {
    options: BTreeMap<String, Value>,
}

impl ModelParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `key value` lines. Unknown keys are skipped.
    pub fn parse(text: &str) -> Result<Self, String> {
        let mut params = Self::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, raw_value)) = line.split_once(char::is_whitespace) else {
                return Err(format!("Parameter '{line}' is missing a value."));
            };
            if !is_known_option(key) {
                continue;
            }
            let value = parse_literal(raw_value.trim());
            params.push(key, value);
        }
        Ok(params)
    }

    fn push(&mut self, key: &str, value: Value) {
        match self.options.get_mut(key) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let previous = existing.take();
                *existing = Value::Array(vec![previous, value]);
            }
            None => {
                self.options.insert(key.to_string(), value);
            }
        }
    }

    /// Replace a single option from user text.
    pub fn set(&mut self, key: &str, raw_value: &str) -> Result<(), String> {
        if !is_known_option(key) {
            return Err(format!("Unknown parameter '{key}'."));
        }
        let raw_value = raw_value.trim();
        if raw_value.is_empty() {
            return Err(format!("Parameter '{key}' needs a value."));
        }
        self.options
            .insert(key.to_string(), parse_literal(raw_value));
        Ok(())
    }

    pub fn unset(&mut self, key: &str) -> bool {
        self.options.remove(key).is_some()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.options.iter()
    }

    pub fn to_json_object(&self) -> Map<String, Value> {
        self.options
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(&self.options).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Parse a literal value the way a user would write it in a parameter line.
pub fn parse_literal(raw: &str) -> Value {
    match raw {
        "True" => return Value::Bool(true),
        "False" => return Value::Bool(false),
        "None" => return Value::Null,
        _ => {}
    }

    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        return value;
    }

    if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
        return Value::String(raw[1..raw.len() - 1].to_string());
    }

    Value::String(raw.to_string())
}

/// Output format requested from the model.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ResponseFormat {
    #[default]
    Text,
    Json,
    Schema(Map<String, Value>),
}

impl ResponseFormat {
    /// Wire value for the chat request, `None` for plain text.
    pub fn to_wire(&self) -> Option<Value> {
        match self {
            ResponseFormat::Text => None,
            ResponseFormat::Json => Some(Value::String("json".to_string())),
            ResponseFormat::Schema(schema) => Some(Value::Object(schema.clone())),
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, ResponseFormat::Text)
    }
}

impl FromStr for ResponseFormat {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let trimmed = text.trim();
        match trimmed {
            "" | "text" | "none" => return Ok(ResponseFormat::Text),
            "json" => return Ok(ResponseFormat::Json),
            _ => {}
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::Object(schema)) => Ok(ResponseFormat::Schema(schema)),
            _ => Err(format!("Invalid format: '{trimmed}'")),
        }
    }
}

impl fmt::Display for ResponseFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseFormat::Text => Ok(()),
            ResponseFormat::Json => write!(f, "json"),
            ResponseFormat::Schema(schema) => {
                let text = serde_json::to_string(schema).map_err(|_| fmt::Error)?;
                write!(f, "{text}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_reads_literals_and_skips_unknown_keys() {
        let params = ModelParameters::parse(
            "temperature 0.7\nnum_ctx 4096\nmystery 12\npenalize_newline True\n",
        )
        .unwrap();
        assert_eq!(params.get("temperature"), Some(&json!(0.7)));
        assert_eq!(params.get("num_ctx"), Some(&json!(4096)));
        assert_eq!(params.get("penalize_newline"), Some(&json!(true)));
        assert!(params.get("mystery").is_none());
    }

    #[test]
    fn repeated_keys_collect_into_a_list() {
        let params =
            ModelParameters::parse("stop <|end|>\nstop \"<|user|>\"\nstop '###'").unwrap();
        assert_eq!(
            params.get("stop"),
            Some(&json!(["<|end|>", "<|user|>", "###"]))
        );
    }

    #[test]
    fn parse_rejects_key_without_value() {
        assert!(ModelParameters::parse("temperature").is_err());
    }

    #[test]
    fn set_validates_key() {
        let mut params = ModelParameters::new();
        assert!(params.set("temperature", "0.5").is_ok());
        assert!(params.set("warp_speed", "9").is_err());
        assert!(params.set("seed", " ").is_err());
        assert!(params.unset("temperature"));
        assert!(params.is_empty());
    }

    #[test]
    fn format_parsing_accepts_text_json_and_schema() {
        assert_eq!("".parse::<ResponseFormat>().unwrap(), ResponseFormat::Text);
        assert_eq!("json".parse::<ResponseFormat>().unwrap(), ResponseFormat::Json);

        let schema: ResponseFormat = r#"{"type":"object"}"#.parse().unwrap();
        assert_eq!(schema.to_wire(), Some(json!({"type": "object"})));

        assert!("[1,2]".parse::<ResponseFormat>().is_err());
        assert!("yaml".parse::<ResponseFormat>().is_err());
    }

    #[test]
    fn format_display_round_trips() {
        for text in ["", "json", r#"{"type":"object"}"#] {
            let format: ResponseFormat = text.parse().unwrap();
            assert_eq!(format.to_string(), text);
        }
    }
}
