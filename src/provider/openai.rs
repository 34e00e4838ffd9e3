//! OpenAI-compatible Chat Completions client.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::CompletionsConfig;
use crate::error::ConduitError;
use crate::types::{Message, Role};

use super::http::{bearer_headers, shared_client, status_to_error};
use super::{CompletionRequest, CompletionResponse, CompletionsProvider, RawToolCall, Usage};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Speaks `POST {base_url}/chat/completions`.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleProvider {
    api_key: String,
    base_url: String,
}

impl OpenAiCompatibleProvider {
    pub fn new(api_key: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    /// Requires an API key in `config`.
    pub fn from_config(config: &CompletionsConfig) -> Result<Self, ConduitError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                ConduitError::Authentication(
                    "Missing API key: set CONDUIT_API_KEY or OPENAI_API_KEY".into(),
                )
            })?;
        Ok(Self::new(api_key, config.base_url.clone()))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_request_body(&self, request: &CompletionRequest) -> Value {
        let messages: Vec<Value> = request.messages.iter().map(message_to_openai).collect();
        let mut body = json!({
            "model": request.model,
            "messages": messages,
        });
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(request.tools.to_function_definitions());
            body["tool_choice"] = Value::String(request.tool_choice.to_string());
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        body
    }
}

#[async_trait]
impl CompletionsProvider for OpenAiCompatibleProvider {
    fn provider_name(&self) -> &str {
        "openai-compatible"
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ConduitError> {
        let body = self.build_request_body(request);
        let url = format!("{}/chat/completions", self.base_url);

        debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.specs().len(),
            "chat completion request"
        );

        let resp = shared_client()
            .post(&url)
            .headers(bearer_headers(&self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status, &body_text));
        }

        let data: ChatResponse = resp.json().await?;
        let choice = data
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ConduitError::Protocol("no choices in completion response".into()))?;

        Ok(CompletionResponse {
            content: choice.message.content,
            tool_calls: choice
                .message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(|tc| RawToolCall {
                    id: tc.id,
                    name: tc.function.name,
                    arguments: tc.function.arguments,
                })
                .collect(),
            finish_reason: choice.finish_reason,
            usage: data.usage.map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
        })
    }
}

fn message_to_openai(message: &Message) -> Value {
    match message.role {
        Role::Tool => json!({
            "role": "tool",
            "tool_call_id": message.tool_call_id,
            "content": message.content,
        }),
        Role::Assistant if message.has_tool_calls() => {
            let tool_calls: Vec<Value> = message
                .tool_calls
                .iter()
                .map(|call| {
                    json!({
                        "id": call.id,
                        "type": "function",
                        "function": {
                            "name": call.name,
                            "arguments": call.arguments.to_string(),
                        }
                    })
                })
                .collect();
            let content = if message.content.is_empty() {
                Value::Null
            } else {
                Value::String(message.content.clone())
            };
            json!({
                "role": "assistant",
                "content": content,
                "tool_calls": tool_calls,
            })
        }
        role => json!({
            "role": role.to_string(),
            "content": message.content,
        }),
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ChatToolCall>>,
}

#[derive(Deserialize)]
struct ChatToolCall {
    id: String,
    function: ChatFunction,
}

#[derive(Deserialize)]
struct ChatFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ToolChoice;
    use crate::tools::{ToolCatalog, ToolParameters, ToolSpec};
    use crate::types::ToolCall;

    #[test]
    fn request_body_carries_tools_and_sampling() {
        let provider = OpenAiCompatibleProvider::new("sk-test", Some("http://localhost/v1/".into()));
        assert_eq!(provider.base_url(), "http://localhost/v1");

        let request = CompletionRequest {
            model: "gpt-4o-mini".into(),
            messages: vec![
                Message::user("balance?"),
                Message::assistant_with_tool_calls(
                    "",
                    vec![ToolCall::new("call_1", "get_balance", json!({"account": "main"}))],
                ),
                Message::tool_result("call_1", "R$ 100.00"),
            ],
            tools: ToolCatalog::empty().with(ToolSpec::new(
                "get_balance",
                "Balance",
                ToolParameters::empty(),
            )),
            tool_choice: ToolChoice::Auto,
            temperature: Some(0.2),
            max_tokens: Some(512),
        };

        let body = provider.build_request_body(&request);
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["messages"][1]["content"], Value::Null);
        assert_eq!(
            body["messages"][1]["tool_calls"][0]["function"]["arguments"],
            r#"{"account":"main"}"#
        );
        assert_eq!(body["messages"][2]["tool_call_id"], "call_1");
    }

    #[test]
    fn empty_catalog_omits_tools() {
        let provider = OpenAiCompatibleProvider::new("sk-test", None);
        let request = CompletionRequest {
            model: "gpt-4o-mini".into(),
            messages: vec![Message::user("hi")],
            tools: ToolCatalog::empty(),
            tool_choice: ToolChoice::Auto,
            temperature: None,
            max_tokens: None,
        };
        let body = provider.build_request_body(&request);
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
        assert!(body.get("temperature").is_none());
    }
}
