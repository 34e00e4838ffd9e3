//! Settings and outcome types for the tool loop.

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::config::{CompletionsConfig, DEFAULT_MAX_TURNS};
use crate::progress::ProgressStep;
use crate::provider::Usage;
use crate::types::Message;

/// Returned when the turn budget runs out.
pub const FALLBACK_MESSAGE: &str = "Sorry, I couldn't finish that request. \
I ran out of steps while working on it; some actions may already have been carried out.";

/// Per-run model and budget settings.
#[derive(Debug, Clone, Builder)]
pub struct LoopSettings {
    #[builder(into)]
    pub model: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    #[builder(default = DEFAULT_MAX_TURNS)]
    pub max_turns: usize,
    #[builder(into, default = FALLBACK_MESSAGE.to_string())]
    pub fallback_message: String,
}

impl From<&CompletionsConfig> for LoopSettings {
    fn from(config: &CompletionsConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_turns: config.max_turns.max(1),
            fallback_message: FALLBACK_MESSAGE.to_string(),
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoopStatus {
    /// The model produced a turn without tool calls.
    Completed,
    /// The turn budget ran out; the fallback message was returned.
    BudgetExhausted { executed_tool_calls: usize },
}

/// Final result of [`ToolLoop::run`](super::ToolLoop::run).
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    /// The assistant message appended last, decorated with all sources.
    pub message: Message,
    pub status: LoopStatus,
    /// Number of completions calls made.
    pub turns: usize,
    pub executed_tool_calls: usize,
    pub progress: Vec<ProgressStep>,
    pub usage: Usage,
}

impl LoopOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self.status, LoopStatus::Completed)
    }
}
