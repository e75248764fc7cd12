//! Planner decisions and their decoding.

use crate::llm::extract_json_object;
use crate::tools::ToolCall;
use serde::Serialize;
use serde_json::{Map, Value};

/// One decision returned by the planner.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Plan {
    /// Shell command to run; empty when the plan uses a tool or is final
    pub command: String,
    pub tool: Option<ToolCall>,
    /// Diagnostic only, never shown to the user
    pub reasoning: String,
    pub reply: String,
    pub files: Vec<String>,
    pub done: bool,
}

impl Plan {
    /// Plan for a reply that could not be decoded as JSON.
    pub fn plain_text(raw: &str) -> Self {
        Self {
            reply: raw.to_string(),
            done: true,
            ..Self::default()
        }
    }

    pub fn has_action(&self) -> bool {
        !self.command.trim().is_empty() || self.tool.is_some()
    }

    /// A plan ends the loop when it says so or when it asks for nothing.
    pub fn is_terminal(&self) -> bool {
        self.done || !self.has_action()
    }

    /// Compact JSON used as the assistant turn in the conversation.
    pub fn to_turn(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.reply.clone())
    }
}

/// Outcome of decoding a raw planner reply.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanDecode {
    /// The reply was a JSON object
    Structured(Plan),
    /// The reply was not a JSON object and became a final plain-text answer
    PlainText(Plan),
}

impl PlanDecode {
    pub fn is_structured(&self) -> bool {
        matches!(self, PlanDecode::Structured(_))
    }

    pub fn into_plan(self) -> Plan {
        match self {
            PlanDecode::Structured(plan) | PlanDecode::PlainText(plan) => plan,
        }
    }
}

/// Decode a planner reply, filling each missing or mistyped field with its default.
pub fn decode_plan(raw: &str) -> PlanDecode {
    let object = extract_json_object(raw)
        .and_then(|json| serde_json::from_str::<Value>(json).ok())
        .and_then(|value| match value {
            Value::Object(map) => Some(map),
            _ => None,
        });

    match object {
        Some(map) => PlanDecode::Structured(plan_from_object(&map)),
        None => PlanDecode::PlainText(Plan::plain_text(raw)),
    }
}

fn plan_from_object(map: &Map<String, Value>) -> Plan {
    let string = |key: &str| {
        map.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    Plan {
        command: string("command"),
        tool: map.get("tool").and_then(tool_from_value),
        reasoning: string("reasoning"),
        reply: string("reply"),
        files: map
            .get("files")
            .and_then(Value::as_array)
            .map(|files| {
                files
                    .iter()
                    .filter_map(Value::as_str)
                    .filter(|f| !f.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        done: map.get("done").and_then(Value::as_bool).unwrap_or(false),
    }
}

fn tool_from_value(value: &Value) -> Option<ToolCall> {
    let object = value.as_object()?;
    let name = object.get("tool")?.as_str()?;
    Some(ToolCall::new(
        name,
        object.get("params").cloned().unwrap_or(Value::Null),
    ))
}
