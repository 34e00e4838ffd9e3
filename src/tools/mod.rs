//! Tool system: executors, catalogs and dispatch.

pub mod arguments;
pub mod builtin;
pub mod catalog;
pub mod dispatcher;
pub mod tool;
pub mod types;

pub use arguments::ToolArguments;
pub use catalog::{ToolCatalog, ToolSpec};
pub use dispatcher::{
    sources_from_value, DispatchContext, StatusCallback, ToolDispatcher, ToolOutput, ToolStatus,
    DEFAULT_CALL_HISTORY, ERROR_MARKER,
};
pub use tool::{AgentTool, Principal, Tool, ToolExecutionContext};
pub use types::ToolParameters;
