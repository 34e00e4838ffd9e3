//! Conduit: agent orchestration core.
//!
//! Two ways to drive an agent:
//!
//! - [`agent_loop::ToolLoop`] runs a bounded tool-use loop against an
//!   OpenAI-compatible completions endpoint, dispatching tool calls through a
//!   [`tools::ToolDispatcher`].
//! - [`session::SessionClient`] keeps a long-lived, resumable streaming session
//!   with a remote agent runtime, including human approval checkpoints.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use conduit::prelude::*;
//!
//! # async fn example() -> conduit::error::Result<()> {
//! let config = ConduitConfig::from_env();
//! let provider = Arc::new(OpenAiCompatibleProvider::from_config(&config.completions)?);
//! let dispatcher = Arc::new(ToolDispatcher::new(Vec::new()));
//! let runner = ToolLoop::new(provider, dispatcher, LoopSettings::from(&config.completions));
//!
//! let mut conversation = Conversation::new();
//! conversation.push(Message::user("What time is it?"))?;
//! let outcome = runner
//!     .run(&mut conversation, &ToolCatalog::empty(), &DispatchContext::default())
//!     .await?;
//! println!("{}", outcome.message.content);
//! # Ok(())
//! # }
//! ```

pub mod agent_loop;
pub mod config;
pub mod error;
pub mod prelude;
pub mod progress;
pub mod provider;
pub mod tools;
pub mod types;
pub mod util;

#[cfg(feature = "session")]
pub mod session;

#[cfg(feature = "cli")]
pub mod cli;
