//! Tool abstraction types for the management actions exposed to the LLM loop.
//!
//! The engine does not execute tools itself; it only publishes handlers that
//! an external runtime can dispatch by name.

use crate::error::InstinctError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// JSON tool definition sent to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub input_schema: ToolInputSchema,
}

/// JSON Schema for tool input parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInputSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub properties: Value,
    pub required: Vec<String>,
}

impl ToolInputSchema {
    pub fn object(properties: Value, required: &[&str]) -> Self {
        Self {
            schema_type: "object".to_string(),
            properties,
            required: required.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Classification of tool execution errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolErrorKind {
    /// Storage hiccup; worth retrying.
    Transient,
    /// Bad input or unknown id; retrying won't help.
    Permanent,
}

/// Structured result from a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub content: String,
    pub is_error: bool,
    pub error_kind: Option<ToolErrorKind>,
}

impl ToolOutcome {
    pub fn ok(content: String) -> Self {
        Self { content, is_error: false, error_kind: None }
    }

    pub fn transient_error(msg: String) -> Self {
        Self { content: msg, is_error: true, error_kind: Some(ToolErrorKind::Transient) }
    }

    pub fn permanent_error(msg: String) -> Self {
        Self { content: msg, is_error: true, error_kind: Some(ToolErrorKind::Permanent) }
    }

    pub fn from_error(err: &InstinctError) -> Self {
        if err.is_permanent() {
            Self::permanent_error(err.to_string())
        } else {
            Self::transient_error(err.to_string())
        }
    }
}

/// Trait for tool handlers that can be registered and dispatched.
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync {
    /// Unique name used for dispatch (must match the tool name in schema).
    fn name(&self) -> &str;
    /// Human-readable description for logging.
    fn description(&self) -> &str;
    /// JSON schema sent to the LLM so it knows how to call this tool.
    fn schema(&self) -> Tool;
    /// Execute the tool with the given JSON input.
    async fn execute(&self, input: &Value) -> ToolOutcome;
}

// ============================================================================
// ToolRegistry
// ============================================================================

#[derive(Default)]
pub struct ToolRegistry {
    handlers: BTreeMap<String, Box<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool handler. Overwrites any existing handler with the same name.
    pub fn register(&mut self, handler: Box<dyn ToolHandler>) {
        let name = handler.name().to_string();
        tracing::debug!("Registered tool: {}", name);
        self.handlers.insert(name, handler);
    }

    pub fn names(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }

    /// Tool schemas, sorted by name.
    pub fn available_tools(&self) -> Vec<Tool> {
        self.handlers.values().map(|h| h.schema()).collect()
    }

    /// Dispatch a tool call by name.
    pub async fn dispatch(&self, name: &str, input: &Value) -> ToolOutcome {
        match self.handlers.get(name) {
            Some(handler) => handler.execute(input).await,
            None => ToolOutcome::permanent_error(format!("Unknown tool: {}", name)),
        }
    }
}

// ============================================================================
// Input helpers
// ============================================================================

/// Required string field, trimmed and non-empty.
pub fn required_str<'a>(input: &'a Value, key: &str) -> Result<&'a str, ToolOutcome> {
    match input.get(key).and_then(Value::as_str).map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ToolOutcome::permanent_error(format!(
            "Missing required parameter: \"{}\"",
            key
        ))),
    }
}

pub fn optional_str<'a>(input: &'a Value, key: &str) -> Option<&'a str> {
    input.get(key).and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty())
}

/// Optional number; present-but-non-numeric is an error rather than a default.
pub fn optional_f32(input: &Value, key: &str) -> Result<Option<f32>, ToolOutcome> {
    match input.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .map(|n| Some(n as f32))
            .ok_or_else(|| ToolOutcome::permanent_error(format!("Parameter \"{}\" must be a number", key))),
    }
}

pub fn optional_bool(input: &Value, key: &str) -> bool {
    input.get(key).and_then(Value::as_bool).unwrap_or(false)
}
