//! Loop event stream types.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::ToolCall;

/// Events emitted while a run progresses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoopEvent {
    TurnStarted {
        turn: usize,
    },
    ToolCallRequested {
        call: ToolCall,
    },
    ToolCallStarted {
        call_id: String,
        tool_name: String,
    },
    ToolCallFinished {
        call_id: String,
        tool_name: String,
        is_error: bool,
    },
    Completed {
        turns: usize,
    },
    BudgetExhausted {
        turns: usize,
        executed_tool_calls: usize,
    },
}

/// Callback used for streaming loop events.
pub type LoopEventSink = Arc<dyn Fn(LoopEvent) + Send + Sync>;
