//! Convenience re-exports for common use.

pub use crate::agent_loop::{LoopOutcome, LoopSettings, LoopStatus, ToolLoop};
pub use crate::config::ConduitConfig;
pub use crate::error::{ConduitError, Result};
pub use crate::progress::{CorrelationMode, ProgressStep, ProgressTimeline};
pub use crate::provider::{CompletionsProvider, OpenAiCompatibleProvider};
pub use crate::tools::{
    AgentTool, DispatchContext, Principal, Tool, ToolArguments, ToolCatalog, ToolDispatcher,
    ToolParameters,
};
pub use crate::types::{Conversation, Message, Role, Source, ToolCall};

#[cfg(feature = "session")]
pub use crate::session::{SessionClient, SessionEvent, SessionState};
