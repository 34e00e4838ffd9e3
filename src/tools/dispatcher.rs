//! Tool dispatch: name + arguments in, normalized text and citations out.
//!
//! The dispatcher never fails. Unknown tools and executor errors come back as
//! text so the model can react to them conversationally.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use super::arguments::ToolArguments;
use super::tool::{Principal, Tool, ToolExecutionContext};
use crate::types::{Source, ToolCall};

/// Prefix marking a tool result that reports a failure.
pub const ERROR_MARKER: &str = "[tool error] ";

/// Status update reported to the UI while a tool runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolStatus {
    Started { name: String },
    Finished { name: String },
    Failed { name: String, message: String },
}

/// Fire-and-forget status callback.
pub type StatusCallback = Arc<dyn Fn(ToolStatus) + Send + Sync>;

/// Per-dispatch context: who is acting and where to report progress.
#[derive(Clone, Default)]
pub struct DispatchContext {
    pub principal: Principal,
    pub status: Option<StatusCallback>,
}

impl DispatchContext {
    pub fn new(principal: Principal) -> Self {
        Self {
            principal,
            status: None,
        }
    }

    pub fn with_status(mut self, status: StatusCallback) -> Self {
        self.status = Some(status);
        self
    }

    fn report(&self, status: ToolStatus) {
        if let Some(callback) = &self.status {
            callback(status);
        }
    }
}

impl std::fmt::Debug for DispatchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchContext")
            .field("principal", &self.principal)
            .field("status", &self.status.as_ref().map(|_| ".."))
            .finish()
    }
}

/// Normalized tool result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutput {
    pub text: String,
    pub sources: Vec<Source>,
    pub citation_query: Option<String>,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// An error result, prefixed with [`ERROR_MARKER`].
    pub fn error(message: impl AsRef<str>) -> Self {
        Self {
            text: format!("{ERROR_MARKER}{}", message.as_ref()),
            is_error: true,
            ..Self::default()
        }
    }

    /// Normalize an executor's raw JSON result.
    pub fn from_value(value: Value) -> Self {
        let sources = sources_from_value(&value);
        let citation_query = ["citation_query", "citationQuery"]
            .iter()
            .find_map(|key| value.get(*key).and_then(Value::as_str))
            .map(ToString::to_string);
        let text = match &value {
            Value::String(text) => text.clone(),
            Value::Null => String::new(),
            Value::Object(map) => ["text", "content", "result"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str))
                .map(ToString::to_string)
                .unwrap_or_else(|| value.to_string()),
            other => other.to_string(),
        };
        Self {
            text,
            sources,
            citation_query,
            is_error: false,
        }
    }

    /// The JSON form recorded on the originating [`ToolCall`].
    pub fn to_value(&self) -> Value {
        let mut value = serde_json::json!({
            "text": self.text,
            "success": !self.is_error,
        });
        if !self.sources.is_empty() {
            value["sources"] = serde_json::to_value(&self.sources).unwrap_or(Value::Null);
        }
        if let Some(query) = &self.citation_query {
            value["citation_query"] = Value::String(query.clone());
        }
        value
    }
}

/// Extract citations from a tool result.
///
/// Looks at a `sources` array first, then at search-style `results` entries
/// carrying a `url`. Entries without a URL are skipped.
pub fn sources_from_value(value: &Value) -> Vec<Source> {
    let entries = value
        .get("sources")
        .and_then(Value::as_array)
        .or_else(|| value.get("results").and_then(Value::as_array));
    let Some(entries) = entries else {
        return Vec::new();
    };
    entries.iter().filter_map(source_from_entry).collect()
}

fn source_from_entry(entry: &Value) -> Option<Source> {
    let url = entry.get("url").and_then(Value::as_str)?.trim();
    if url.is_empty() {
        return None;
    }
    let field = |keys: &[&str]| {
        keys.iter()
            .find_map(|key| entry.get(*key).and_then(Value::as_str))
            .map(ToString::to_string)
    };
    Some(Source {
        title: field(&["title", "name"]).unwrap_or_else(|| url.to_string()),
        url: url.to_string(),
        excerpt: field(&["excerpt", "snippet", "content"]).unwrap_or_default(),
        favicon: field(&["favicon"]),
    })
}

/// How many executed call ids a dispatcher remembers by default.
pub const DEFAULT_CALL_HISTORY: usize = 1_024;

/// Recently executed call ids, oldest evicted first.
#[derive(Debug, Default)]
struct CallHistory {
    order: VecDeque<String>,
    seen: HashSet<String>,
}

impl CallHistory {
    /// `false` if `id` is already remembered.
    fn record(&mut self, id: &str, capacity: usize) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        while self.order.len() >= capacity.max(1) {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.order.push_back(id.to_string());
        self.seen.insert(id.to_string());
        true
    }

    fn clear(&mut self) {
        self.order.clear();
        self.seen.clear();
    }
}

/// Maps tool names to executors.
pub struct ToolDispatcher {
    tools: HashMap<String, Arc<dyn Tool>>,
    executed: Mutex<CallHistory>,
    history_limit: usize,
}

impl ToolDispatcher {
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self {
            tools: tools
                .into_iter()
                .map(|tool| (tool.name().to_string(), tool))
                .collect(),
            executed: Mutex::new(CallHistory::default()),
            history_limit: DEFAULT_CALL_HISTORY,
        }
    }

    /// Bound how many executed call ids are remembered for deduplication.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    /// Forget every executed call id, e.g. when a conversation is reset.
    pub fn forget_executed(&self) {
        if let Ok(mut executed) = self.executed.lock() {
            executed.clear();
        }
    }

    pub fn remembered_calls(&self) -> usize {
        self.executed.lock().map(|executed| executed.order.len()).unwrap_or(0)
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn tools(&self) -> Vec<Arc<dyn Tool>> {
        self.tools.values().cloned().collect()
    }

    /// Run the executor registered under `name`.
    pub async fn execute(&self, name: &str, args: Value, ctx: &DispatchContext) -> ToolOutput {
        self.execute_inner(name, None, args, ctx).await
    }

    /// Execute a model-issued call, at most once per call id.
    pub async fn dispatch(&self, call: &ToolCall, ctx: &DispatchContext) -> ToolOutput {
        let first_time = self
            .executed
            .lock()
            .map(|mut executed| executed.record(&call.id, self.history_limit))
            .unwrap_or(false);
        if !first_time {
            tracing::warn!(tool_call_id = %call.id, tool = %call.name, "duplicate tool call id");
            return ToolOutput::error(format!(
                "tool call '{}' was already executed",
                call.id
            ));
        }
        self.execute_inner(&call.name, Some(&call.id), call.arguments.clone(), ctx)
            .await
    }

    async fn execute_inner(
        &self,
        name: &str,
        call_id: Option<&str>,
        args: Value,
        ctx: &DispatchContext,
    ) -> ToolOutput {
        let Some(tool) = self.tools.get(name) else {
            tracing::debug!(tool = name, "tool not implemented");
            return ToolOutput::text(format!("Tool '{name}' is not implemented."));
        };

        ctx.report(ToolStatus::Started {
            name: name.to_string(),
        });
        let exec_ctx = ToolExecutionContext {
            principal: ctx.principal.clone(),
            tool_call_id: call_id.map(ToString::to_string),
            tool_name: Some(name.to_string()),
        };
        match tool.execute(&ToolArguments::new(args), &exec_ctx).await {
            Ok(value) => {
                ctx.report(ToolStatus::Finished {
                    name: name.to_string(),
                });
                ToolOutput::from_value(value)
            }
            Err(error) => {
                tracing::warn!(tool = name, error = %error, "tool execution failed");
                ctx.report(ToolStatus::Failed {
                    name: name.to_string(),
                    message: error.to_string(),
                });
                ToolOutput::error(error.to_string())
            }
        }
    }
}

impl std::fmt::Debug for ToolDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.tools.keys().collect();
        names.sort();
        f.debug_struct("ToolDispatcher").field("tools", &names).finish()
    }
}
