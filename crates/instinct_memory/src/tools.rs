//! Management tools exposed to the runtime's LLM loop.
//!
//! Every tool takes a `context_id` and operates on that context only.

use crate::coordinator::BehaviorEngine;
use crate::profiles;
use crate::store::ListFilter;
use instinct_core::tools::{
    optional_bool, optional_f32, optional_str, required_str, Tool, ToolHandler, ToolInputSchema, ToolOutcome,
    ToolRegistry,
};
use instinct_core::{Domain, InstinctError, NewInstinct, ValidationError};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagementOp {
    Create,
    List,
    AdjustConfidence,
    Enable,
    Disable,
    Applicable,
    Export,
    Import,
    ApplyProfile,
}

impl ManagementOp {
    pub const ALL: [ManagementOp; 9] = [
        Self::Create,
        Self::List,
        Self::AdjustConfidence,
        Self::Enable,
        Self::Disable,
        Self::Applicable,
        Self::Export,
        Self::Import,
        Self::ApplyProfile,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Create => "create_instinct",
            Self::List => "list_instincts",
            Self::AdjustConfidence => "adjust_instinct_confidence",
            Self::Enable => "enable_instinct",
            Self::Disable => "disable_instinct",
            Self::Applicable => "get_applicable_instincts",
            Self::Export => "export_instincts",
            Self::Import => "import_instincts",
            Self::ApplyProfile => "apply_profile",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            Self::Create => "Create a learned behavior (instinct) for this context.",
            Self::List => "List instincts with their current decayed confidence.",
            Self::AdjustConfidence => "Raise or lower an instinct's base confidence by a delta.",
            Self::Enable => "Re-enable a disabled instinct.",
            Self::Disable => "Disable an instinct so it is never surfaced or reinforced.",
            Self::Applicable => "Show active instincts whose trigger matches the given text.",
            Self::Export => "Export all instincts of this context as JSON.",
            Self::Import => "Import instincts from JSON produced by export_instincts.",
            Self::ApplyProfile => "Seed this context with a preset profile.",
        }
    }

    fn properties(&self) -> (Value, Vec<&'static str>) {
        let ctx = json!({"type": "string", "description": "Conversation context id"});
        let id = json!({"type": "string", "description": "Instinct UUID"});
        match self {
            Self::Create => (
                json!({
                    "context_id": ctx,
                    "domain": {"type": "string", "enum": Domain::ALL.iter().map(Domain::as_str).collect::<Vec<_>>()},
                    "trigger": {"type": "string", "description": "When this applies, e.g. \"user asks for code\" or \"re:^deploy\""},
                    "action": {"type": "string", "description": "What to do"},
                    "source": {"type": "string", "description": "Defaults to explicit-user"},
                    "confidence": {"type": "number", "description": "0.0-1.0, default 0.8"}
                }),
                vec!["context_id", "domain", "trigger", "action"],
            ),
            Self::List => (
                json!({
                    "context_id": ctx,
                    "domain": {"type": "string"},
                    "include_disabled": {"type": "boolean"},
                    "min_confidence": {"type": "number"}
                }),
                vec!["context_id"],
            ),
            Self::AdjustConfidence => (
                json!({"context_id": ctx, "instinct_id": id, "delta": {"type": "number"}}),
                vec!["context_id", "instinct_id", "delta"],
            ),
            Self::Enable => (json!({"context_id": ctx, "instinct_id": id}), vec!["context_id", "instinct_id"]),
            Self::Disable => (
                json!({"context_id": ctx, "instinct_id": id, "reason": {"type": "string"}}),
                vec!["context_id", "instinct_id"],
            ),
            Self::Applicable => (
                json!({
                    "context_id": ctx,
                    "context": {"type": "string", "description": "Text of the current turn"},
                    "max_count": {"type": "integer", "description": "Default 10"}
                }),
                vec!["context_id", "context"],
            ),
            Self::Export => (json!({"context_id": ctx}), vec!["context_id"]),
            Self::Import => (
                json!({"context_id": ctx, "json_data": {"type": "string"}}),
                vec!["context_id", "json_data"],
            ),
            Self::ApplyProfile => (
                json!({
                    "context_id": ctx,
                    "profile_id": {"type": "string", "enum": profiles::ids()},
                    "clear_existing": {"type": "boolean"}
                }),
                vec!["context_id", "profile_id"],
            ),
        }
    }
}

pub struct ManagementTool {
    op: ManagementOp,
    engine: Arc<BehaviorEngine>,
}

impl ManagementTool {
    pub fn new(op: ManagementOp, engine: Arc<BehaviorEngine>) -> Self {
        Self { op, engine }
    }

    async fn run(&self, input: &Value) -> Result<String, ToolOutcome> {
        let store = self.engine.store();
        let context_id = required_str(input, "context_id")?;
        let fail = |e: InstinctError| ToolOutcome::from_error(&e);

        match self.op {
            ManagementOp::Create => {
                let spec = NewInstinct::parse(
                    required_str(input, "domain")?,
                    required_str(input, "trigger")?,
                    required_str(input, "action")?,
                    optional_str(input, "source").unwrap_or("explicit-user"),
                    optional_f32(input, "confidence")?.unwrap_or(0.8),
                )
                .map_err(|e| fail(e.into()))?;
                let created = store.create(context_id, spec).await.map_err(fail)?;
                Ok(format!(
                    "Created instinct {} [{}] (confidence {:.2}): {} -> {}",
                    created.id, created.domain, created.base_confidence, created.trigger, created.action
                ))
            }
            ManagementOp::List => {
                let mut filter = if optional_bool(input, "include_disabled") {
                    ListFilter::all()
                } else {
                    ListFilter::active()
                };
                if let Some(domain) = optional_str(input, "domain") {
                    filter = filter.in_domain(domain.parse().map_err(|e: ValidationError| fail(e.into()))?);
                }
                if let Some(min) = optional_f32(input, "min_confidence")? {
                    filter = filter.min_confidence(min);
                }
                let listed = store.list(context_id, &filter).await.map_err(fail)?;
                to_json(&listed)
            }
            ManagementOp::AdjustConfidence => {
                let id = instinct_id(input)?;
                let delta = optional_f32(input, "delta")?
                    .ok_or_else(|| ToolOutcome::permanent_error("Missing required parameter: \"delta\"".into()))?;
                let updated = store.adjust_confidence(context_id, id, delta).await.map_err(fail)?;
                Ok(format!("Instinct {} confidence is now {:.2}", id, updated.base_confidence))
            }
            ManagementOp::Enable => {
                let id = instinct_id(input)?;
                let changed = store.enable(context_id, id).await.map_err(fail)?;
                Ok(if changed {
                    format!("Enabled instinct {}", id)
                } else {
                    format!("Instinct {} was already enabled", id)
                })
            }
            ManagementOp::Disable => {
                let id = instinct_id(input)?;
                let reason = optional_str(input, "reason").unwrap_or("disabled by user");
                let changed = store.disable(context_id, id, reason).await.map_err(fail)?;
                Ok(if changed {
                    format!("Disabled instinct {}", id)
                } else {
                    format!("Instinct {} was already disabled", id)
                })
            }
            ManagementOp::Applicable => {
                let text = required_str(input, "context")?;
                let max = input.get("max_count").and_then(Value::as_u64).unwrap_or(10) as usize;
                let matching = store.applicable(context_id, text, max).await.map_err(fail)?;
                to_json(&matching)
            }
            ManagementOp::Export => store.export(context_id).await.map_err(fail),
            ManagementOp::Import => {
                let data = required_str(input, "json_data")?;
                let count = store.import(context_id, data).await.map_err(fail)?;
                Ok(format!("Imported {} instincts", count))
            }
            ManagementOp::ApplyProfile => {
                let profile_id = required_str(input, "profile_id")?;
                let clear = optional_bool(input, "clear_existing");
                let count = store.apply_profile(context_id, profile_id, clear).await.map_err(fail)?;
                Ok(format!("Applied profile '{}' ({} instincts)", profile_id, count))
            }
        }
    }
}

fn instinct_id(input: &Value) -> Result<Uuid, ToolOutcome> {
    let raw = required_str(input, "instinct_id")?;
    Uuid::parse_str(raw).map_err(|_| ToolOutcome::permanent_error(format!("Invalid instinct_id: {}", raw)))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, ToolOutcome> {
    serde_json::to_string_pretty(value).map_err(|e| ToolOutcome::transient_error(format!("Serialization failed: {}", e)))
}

#[async_trait::async_trait]
impl ToolHandler for ManagementTool {
    fn name(&self) -> &str {
        self.op.name()
    }

    fn description(&self) -> &str {
        self.op.description()
    }

    fn schema(&self) -> Tool {
        let (properties, required) = self.op.properties();
        Tool {
            name: self.op.name().to_string(),
            description: self.op.description().to_string(),
            input_schema: ToolInputSchema::object(properties, &required),
        }
    }

    async fn execute(&self, input: &Value) -> ToolOutcome {
        match self.run(input).await {
            Ok(content) => ToolOutcome::ok(content),
            Err(outcome) => outcome,
        }
    }
}

/// Register all nine management tools against one engine.
pub fn register_management_tools(registry: &mut ToolRegistry, engine: Arc<BehaviorEngine>) {
    for op in ManagementOp::ALL {
        registry.register(Box::new(ManagementTool::new(op, engine.clone())));
    }
}
