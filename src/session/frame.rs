//! Wire shapes for the session transport.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConduitError;
use crate::types::Message;

/// One inbound event. Every field is optional and checked independently; a
/// single frame may carry several of them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InboundFrame {
    #[serde(default)]
    pub start: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCallFrame>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolResultFrame>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_approval: Option<ApprovalFrame>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    /// Session id assigned or confirmed by the remote runtime.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    /// History replayed by the runtime when a chat is resumed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Message>>,
}

impl InboundFrame {
    /// Parse one text frame.
    pub fn parse(text: &str) -> Result<Self, ConduitError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| ConduitError::Protocol(format!("frame is not JSON: {e}")))?;
        if !value.is_object() {
            return Err(ConduitError::Protocol("frame is not a JSON object".into()));
        }
        serde_json::from_value(value)
            .map_err(|e| ConduitError::Protocol(format!("unrecognized frame: {e}")))
    }

    /// Human-readable text of the `error` field, if any.
    pub fn error_message(&self) -> Option<String> {
        match self.error.as_ref()? {
            Value::Null | Value::Bool(false) => None,
            Value::String(message) => Some(message.clone()),
            Value::Object(map) => Some(
                map.get("message")
                    .and_then(Value::as_str)
                    .map(ToString::to_string)
                    .unwrap_or_else(|| Value::Object(map.clone()).to_string()),
            ),
            Value::Bool(true) => Some("remote agent reported an error".to_string()),
            other => Some(other.to_string()),
        }
    }
}

/// A tool invocation observed on the remote side.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolCallFrame {
    #[serde(default, alias = "tool_call_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(alias = "tool")]
    pub name: String,
    #[serde(default, alias = "input", alias = "args")]
    pub arguments: Value,
}

/// The outcome of a remote tool invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolResultFrame {
    #[serde(default, alias = "id", skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, alias = "result", alias = "content")]
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResultFrame {
    /// The result's own success flag; absent means "no error reported".
    pub fn succeeded(&self) -> bool {
        self.success.unwrap_or(self.error.is_none())
    }

    /// JSON recorded on the matching tool call.
    pub fn to_value(&self) -> Value {
        let mut value = serde_json::json!({
            "success": self.succeeded(),
            "output": self.output,
        });
        if let Some(error) = &self.error {
            value["error"] = Value::String(error.clone());
        }
        value
    }
}

/// `requires_approval` comes either as a bare flag or as a request object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ApprovalFrame {
    Flag(bool),
    Request {
        #[serde(default, alias = "message")]
        description: Option<String>,
        #[serde(default)]
        tool_call_id: Option<String>,
    },
}

/// Commands sent to the remote runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OutboundCommand {
    Message { content: String, images: Vec<String> },
    Approve { approved: bool },
    ResumeChat { chat_id: String },
    NewChat,
}

impl OutboundCommand {
    pub fn to_json(&self) -> Result<String, ConduitError> {
        serde_json::to_string(self).map_err(ConduitError::from)
    }
}
