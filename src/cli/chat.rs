//! `conduit chat`: one tool-loop run printed to the terminal.

use std::sync::Arc;

use crate::agent_loop::{LoopEvent, LoopSettings, LoopStatus, ToolLoop};
use crate::config::ConduitConfig;
use crate::error::ConduitError;
use crate::provider::OpenAiCompatibleProvider;
use crate::tools::builtin::workspace_tools;
use crate::tools::{DispatchContext, Principal, ToolCatalog, ToolDispatcher};
use crate::types::{Conversation, Message};

use super::ChatArgs;

pub async fn handle_chat(args: ChatArgs, mut config: ConduitConfig) -> Result<(), ConduitError> {
    let prompt = args.prompt.ok_or_else(|| {
        ConduitError::InvalidArgument("Usage: conduit chat \"your prompt here\"".into())
    })?;

    if let Some(model) = args.model {
        config.completions.model = model;
    }
    if let Some(temperature) = args.temperature {
        config.completions.temperature = Some(temperature);
    }
    if let Some(max_tokens) = args.max_tokens {
        config.completions.max_tokens = Some(max_tokens);
    }
    if let Some(max_turns) = args.max_turns {
        config.completions.max_turns = max_turns;
    }
    config.validate()?;

    let provider = Arc::new(OpenAiCompatibleProvider::from_config(&config.completions)?);
    let tools = workspace_tools(args.workspace);
    let catalog = ToolCatalog::from_tools(&tools);
    let dispatcher = Arc::new(ToolDispatcher::new(tools));

    let sink = Arc::new(|event: LoopEvent| match event {
        LoopEvent::ToolCallStarted { call_id, tool_name } => {
            eprintln!("⚡ {tool_name} ({call_id})");
        }
        LoopEvent::ToolCallFinished { is_error, .. } => {
            eprintln!("  {}", if is_error { "❌ failed" } else { "✅ done" });
        }
        _ => {}
    });
    let runner = ToolLoop::new(provider, dispatcher, LoopSettings::from(&config.completions))
        .with_event_sink(sink);

    let mut conversation = Conversation::new();
    if let Some(system) = args.system {
        conversation.push(Message::system(system))?;
    }
    conversation.push(Message::user(prompt))?;

    let user = std::env::var("USER").unwrap_or_else(|_| "local".into());
    let outcome = runner
        .run(
            &mut conversation,
            &catalog,
            &DispatchContext::new(Principal::new(user)),
        )
        .await?;

    println!("{}", outcome.message.content);
    for source in &outcome.message.sources {
        println!("  [{}] {}", source.title, source.url);
    }
    if let LoopStatus::BudgetExhausted { executed_tool_calls } = outcome.status {
        eprintln!(
            "(stopped after {} turns, {executed_tool_calls} tool calls)",
            outcome.turns
        );
    }
    Ok(())
}
