//! Bounded request/execute/append cycle against a completions endpoint.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::ConduitError;
use crate::progress::{Detail, ProgressTimeline};
use crate::provider::{CompletionRequest, CompletionsProvider, RawToolCall, ToolChoice, Usage};
use crate::tools::{DispatchContext, ToolArguments, ToolCatalog, ToolDispatcher};
use crate::types::{Conversation, Message, SourceSet, ToolCall};

use super::events::{LoopEvent, LoopEventSink};
use super::types::{LoopOutcome, LoopSettings, LoopStatus};

const RESULT_DETAIL_MAX_CHARS: usize = 200;

/// Drives one agent through tool calls until it produces a final answer.
///
/// Tool calls within a turn run one after another in the order the model
/// listed them, since later calls may depend on earlier side effects.
pub struct ToolLoop {
    provider: Arc<dyn CompletionsProvider>,
    dispatcher: Arc<ToolDispatcher>,
    settings: LoopSettings,
    event_sink: Option<LoopEventSink>,
}

impl ToolLoop {
    pub fn new(
        provider: Arc<dyn CompletionsProvider>,
        dispatcher: Arc<ToolDispatcher>,
        settings: LoopSettings,
    ) -> Self {
        Self {
            provider,
            dispatcher,
            settings,
            event_sink: None,
        }
    }

    pub fn with_event_sink(mut self, sink: LoopEventSink) -> Self {
        self.event_sink = Some(sink);
        self
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    /// Run the loop, appending every produced message to `conversation`.
    ///
    /// Running out of turns is not an error: the fallback message is appended
    /// and returned with [`LoopStatus::BudgetExhausted`]. Errors are reserved
    /// for endpoint failures and malformed tool-call arguments.
    pub async fn run(
        &self,
        conversation: &mut Conversation,
        catalog: &ToolCatalog,
        ctx: &DispatchContext,
    ) -> Result<LoopOutcome, ConduitError> {
        let max_turns = self.settings.max_turns.max(1);
        let mut sources = SourceSet::new();
        let mut timeline = ProgressTimeline::default();
        let mut usage = Usage::default();
        let mut executed_tool_calls = 0usize;

        for turn in 1..=max_turns {
            self.emit(LoopEvent::TurnStarted { turn });

            let request = CompletionRequest {
                model: self.settings.model.clone(),
                messages: conversation.messages().to_vec(),
                tools: catalog.clone(),
                tool_choice: ToolChoice::Auto,
                temperature: self.settings.temperature,
                max_tokens: self.settings.max_tokens,
            };
            let response = self.provider.complete(&request).await?;
            if let Some(turn_usage) = &response.usage {
                usage.accumulate(turn_usage);
            }

            tracing::debug!(
                provider = self.provider.provider_name(),
                turn,
                tool_calls = response.tool_calls.len(),
                "tool loop turn complete"
            );

            let content = response.content.unwrap_or_default();
            if response.tool_calls.is_empty() {
                let message = Message::assistant(content).with_sources(sources.to_vec());
                conversation.push(message.clone())?;
                self.emit(LoopEvent::Completed { turns: turn });
                return Ok(LoopOutcome {
                    message,
                    status: LoopStatus::Completed,
                    turns: turn,
                    executed_tool_calls,
                    progress: timeline.into_steps(),
                    usage,
                });
            }

            let calls = parse_tool_calls(&response.tool_calls)?;
            conversation.push(Message::assistant_with_tool_calls(content, calls.clone()))?;
            for call in &calls {
                timeline.observe_call(&call.id, &call.name, &call.arguments);
                self.emit(LoopEvent::ToolCallRequested { call: call.clone() });
            }

            for call in &calls {
                timeline.mark_running(&call.id);
                self.emit(LoopEvent::ToolCallStarted {
                    call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                });

                let output = self.dispatcher.dispatch(call, ctx).await;
                executed_tool_calls += 1;
                sources.extend(output.sources.iter().cloned());
                conversation.resolve_tool_call(&call.id, output.to_value());
                timeline.close(
                    Some(&call.id),
                    !output.is_error,
                    vec![Detail::new("result", excerpt(&output.text))],
                );
                self.emit(LoopEvent::ToolCallFinished {
                    call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    is_error: output.is_error,
                });

                conversation.push(Message::tool_result(call.id.clone(), output.text))?;
            }
        }

        tracing::warn!(
            max_turns,
            executed_tool_calls,
            "tool loop exhausted its turn budget"
        );
        let message =
            Message::assistant(self.settings.fallback_message.clone()).with_sources(sources.to_vec());
        conversation.push(message.clone())?;
        self.emit(LoopEvent::BudgetExhausted {
            turns: max_turns,
            executed_tool_calls,
        });
        Ok(LoopOutcome {
            message,
            status: LoopStatus::BudgetExhausted {
                executed_tool_calls,
            },
            turns: max_turns,
            executed_tool_calls,
            progress: timeline.into_steps(),
            usage,
        })
    }

    fn emit(&self, event: LoopEvent) {
        if let Some(sink) = &self.event_sink {
            sink(event);
        }
    }
}

/// Decode the JSON-string arguments of every call. Any malformed payload
/// fails the whole turn.
fn parse_tool_calls(raw: &[RawToolCall]) -> Result<Vec<ToolCall>, ConduitError> {
    raw.iter()
        .map(|call| {
            let args = ToolArguments::parse(&call.arguments).map_err(|error| {
                ConduitError::InvalidArgument(format!("tool call '{}' ({}): {error}", call.id, call.name))
            })?;
            let id = if call.id.trim().is_empty() {
                format!("call_{}", Uuid::new_v4().simple())
            } else {
                call.id.clone()
            };
            Ok(ToolCall::new(id, call.name.clone(), args.into_value()))
        })
        .collect()
}

fn excerpt(text: &str) -> String {
    if text.chars().count() <= RESULT_DETAIL_MAX_CHARS {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(RESULT_DETAIL_MAX_CHARS).collect();
    cut.push('…');
    cut
}
