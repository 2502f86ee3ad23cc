use super::*;
use serde_json::json;

struct EchoTool {
    spec: ToolSpec,
}

impl EchoTool {
    fn new(name: &str, source: ToolSource) -> Self {
        Self {
            spec: ToolSpec {
                name: name.to_string(),
                description: Some(format!("echo from {}", source.label())),
                input_schema: json!({
                    "type": "object",
                    "properties": {"text": {"type": "string"}},
                    "required": ["text"]
                }),
                source,
            },
        }
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn call(&self, arguments: Map<String, Value>) -> Result<ToolOutput, String> {
        let text = arguments
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default();
        Ok(ToolOutput::ok(format!(
            "{}:{}",
            self.spec.source.label(),
            text
        )))
    }
}

struct StallingTool {
    spec: ToolSpec,
}

impl StallingTool {
    fn new() -> Self {
        Self {
            spec: ToolSpec {
                name: "stall".to_string(),
                description: None,
                input_schema: json!({"type": "object"}),
                source: ToolSource::Builtin,
            },
        }
    }
}

#[async_trait]
impl Tool for StallingTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn call(&self, _arguments: Map<String, Value>) -> Result<ToolOutput, String> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(ToolOutput::ok("never"))
    }
}

fn call(name: &str, arguments: Value) -> ToolCall {
    let Value::Object(arguments) = arguments else {
        panic!("arguments must be an object");
    };
    ToolCall::new(name, arguments)
}

fn bridge() -> ToolBridge {
    let mut bridge = ToolBridge::new(Duration::from_millis(50));
    bridge.register(Arc::new(EchoTool::new("echo", ToolSource::Builtin)));
    bridge.register(Arc::new(StallingTool::new()));
    bridge
}

#[tokio::test]
async fn invoke_runs_matching_tool() {
    let outcome = bridge()
        .invoke(&call("echo", json!({"text": "hi"})), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.content, "built-in:hi");
    assert!(!outcome.is_error);
    assert_eq!(outcome.call.name, "echo");
}

#[tokio::test]
async fn unknown_tool_is_an_error_outcome() {
    let outcome = bridge()
        .invoke(&call("nope", json!({})), &CancellationToken::new())
        .await
        .unwrap();
    assert!(outcome.is_error);
    assert_eq!(outcome.content, "Unknown tool: nope");
}

#[tokio::test]
async fn schema_violations_are_reported_without_calling_the_tool() {
    let outcome = bridge()
        .invoke(&call("echo", json!({"text": 5})), &CancellationToken::new())
        .await
        .unwrap();
    assert!(outcome.is_error);
    assert!(outcome
        .content
        .starts_with("Invalid arguments for tool 'echo':"));
}

#[tokio::test]
async fn timeout_becomes_error_outcome() {
    let bridge = bridge();
    let outcome = bridge
        .invoke(&call("stall", json!({})), &CancellationToken::new())
        .await
        .unwrap();
    assert!(outcome.is_error);
    assert_eq!(outcome.content, "Tool 'stall' timed out after 0.05 seconds");

    // The bridge stays usable afterwards.
    let next = bridge
        .invoke(&call("echo", json!({"text": "again"})), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(next.content, "built-in:again");
}

#[tokio::test]
async fn cancellation_interrupts_a_running_tool() {
    let mut bridge = ToolBridge::new(Duration::from_secs(3600));
    bridge.register(Arc::new(StallingTool::new()));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        bridge.invoke(&call("stall", json!({})), &cancel),
    )
    .await
    .expect("cancellation should be prompt");
    assert_eq!(result, Err(ToolCancelled));
}

#[test]
fn first_registration_wins() {
    let mut bridge = ToolBridge::new(Duration::from_secs(1));
    assert!(bridge.register(Arc::new(EchoTool::new("echo", ToolSource::Builtin))));
    assert!(!bridge.register(Arc::new(EchoTool::new(
        "echo",
        ToolSource::Mcp("files".to_string())
    ))));
    let specs: Vec<&ToolSpec> = bridge.specs().collect();
    assert_eq!(specs.len(), 1);
    assert_eq!(specs[0].source, ToolSource::Builtin);
}

#[test]
fn definitions_follow_enabled_names_in_registration_order() {
    let bridge = bridge();
    assert_eq!(bridge.names(), vec!["echo", "stall"]);

    let enabled = vec!["stall".to_string(), "missing".to_string()];
    let definitions = bridge.definitions_for(&enabled);
    assert_eq!(definitions.len(), 1);
    assert_eq!(definitions[0].function.name, "stall");
    assert!(bridge.definitions_for(&[]).is_empty());
}
