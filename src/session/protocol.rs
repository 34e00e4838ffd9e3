//! Session protocol state machine.
//!
//! `Idle -> Streaming -> (AwaitingApproval | Idle)`. All per-turn buffers live
//! in [`TurnBuffers`], owned by [`SessionMachine`] and reset explicitly; the
//! machine does no I/O and only returns the commands to send.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use super::frame::{ApprovalFrame, InboundFrame, OutboundCommand, ToolResultFrame};
use crate::progress::{CloseOutcome, CorrelationMode, Detail, ProgressTimeline};
use crate::tools::sources_from_value;
use crate::types::{ImageAttachment, Message, SourceSet, ToolCall};

/// Turn progression state.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Streaming,
    AwaitingApproval,
}

/// A human checkpoint blocking the turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApprovalRequest {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_tool_call_id: Option<String>,
}

/// Conversation state for one remote chat. Persisting it is the caller's job.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Session {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_approval: Option<ApprovalRequest>,
}

/// Accumulators for the turn in flight.
#[derive(Debug, Clone, Default)]
pub struct TurnBuffers {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub sources: SourceSet,
}

impl TurnBuffers {
    pub fn is_empty(&self) -> bool {
        self.content.is_empty() && self.tool_calls.is_empty()
    }

    fn reset(&mut self) {
        self.content.clear();
        self.tool_calls.clear();
        self.sources.clear();
    }
}

/// What the session surfaces to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    TurnStarted,
    ContentDelta { text: String },
    Status { text: String },
    ToolCallStarted { call: ToolCall },
    ToolCallFinished { call_id: String, success: bool },
    ApprovalRequired(ApprovalRequest),
    ApprovalResolved { approved: bool },
    TurnCompleted { message: Message },
    TurnFailed { message: String },
    SessionAssigned { chat_id: String },
    ProtocolError { message: String },
    Connected { resumed: bool },
    Disconnected { reason: String },
    Reconnecting { attempt: usize, delay_ms: u64 },
    ConnectionError { message: String },
    Closed { reason: Option<String> },
}

/// Explicit per-session state record driven by inbound frames.
#[derive(Debug, Clone, Default)]
pub struct SessionMachine {
    session: Session,
    state: SessionState,
    turn: TurnBuffers,
    progress: ProgressTimeline,
    last_session_id: Option<String>,
    last_error: Option<String>,
}

impl SessionMachine {
    pub fn new(mode: CorrelationMode) -> Self {
        Self {
            progress: ProgressTimeline::new(mode),
            ..Self::default()
        }
    }

    /// Start from a persisted session. A set `id` is resumed on connect.
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Session {
            pending_approval: None,
            ..session
        };
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn turn(&self) -> &TurnBuffers {
        &self.turn
    }

    pub fn progress(&self) -> &ProgressTimeline {
        &self.progress
    }

    pub fn pending_approval(&self) -> Option<&ApprovalRequest> {
        self.session.pending_approval.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn last_session_id(&self) -> Option<&str> {
        self.last_session_id.as_deref()
    }

    /// `Idle -> Streaming`. Returns `None` (no-op) while a turn is in flight.
    pub fn send_message(
        &mut self,
        content: impl Into<String>,
        images: &[ImageAttachment],
    ) -> Option<OutboundCommand> {
        if self.state != SessionState::Idle {
            tracing::debug!(state = %self.state, "send rejected: turn already in flight");
            return None;
        }
        let content = content.into();
        self.reset_turn();
        self.session.messages.push(Message::user(content.clone()));
        self.state = SessionState::Streaming;
        Some(OutboundCommand::Message {
            content,
            images: images.iter().map(ImageAttachment::to_data_url).collect(),
        })
    }

    /// Parse and apply one text frame. Unparseable frames are dropped.
    pub fn handle_text(&mut self, text: &str) -> Vec<SessionEvent> {
        match InboundFrame::parse(text) {
            Ok(frame) => self.handle_frame(frame),
            Err(error) => {
                tracing::warn!(error = %error, "dropping session frame");
                vec![SessionEvent::ProtocolError {
                    message: error.to_string(),
                }]
            }
        }
    }

    /// Apply one frame, in field order: start, session id, status, content,
    /// tool call, tool result, approval, error, done.
    pub fn handle_frame(&mut self, frame: InboundFrame) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        let error_message = frame.error_message();

        if frame.start {
            self.reset_turn();
            self.last_error = None;
            self.state = SessionState::Streaming;
            events.push(SessionEvent::TurnStarted);
        }

        if let Some(chat_id) = frame.chat_id.filter(|id| !id.is_empty()) {
            if self.session.id.as_deref() != Some(chat_id.as_str()) {
                self.session.id = Some(chat_id.clone());
                events.push(SessionEvent::SessionAssigned { chat_id });
            }
        }
        if let Some(history) = frame.messages {
            self.session.messages = history;
        }

        if let Some(status) = frame.status.filter(|s| !s.trim().is_empty()) {
            self.progress.add_thought(status.clone());
            events.push(SessionEvent::Status { text: status });
        }

        if let Some(text) = frame.content.filter(|t| !t.is_empty()) {
            self.resume_streaming();
            self.turn.content.push_str(&text);
            events.push(SessionEvent::ContentDelta { text });
        }

        if let Some(call) = frame.tool_call {
            self.resume_streaming();
            let id = call
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("call_{}", Uuid::new_v4().simple()));
            let call = ToolCall::new(id, call.name, call.arguments);
            self.progress.observe_call(&call.id, &call.name, &call.arguments);
            self.progress.mark_running(&call.id);
            self.turn.tool_calls.push(call.clone());
            events.push(SessionEvent::ToolCallStarted { call });
        }

        if let Some(result) = frame.tool_result {
            events.extend(self.apply_tool_result(result, frame.tool_call_id.as_deref()));
        }

        if let Some(approval) = frame.requires_approval {
            events.extend(self.request_approval(approval));
        }

        if let Some(message) = error_message {
            tracing::warn!(error = %message, "remote agent reported an error");
            self.reset_turn();
            self.session.pending_approval = None;
            self.last_error = Some(message.clone());
            self.state = SessionState::Idle;
            events.push(SessionEvent::TurnFailed { message });
            return events;
        }

        if frame.done {
            if let Some(message) = self.commit_turn() {
                events.push(SessionEvent::TurnCompleted { message });
            }
        }

        events
    }

    /// Operator approves: `AwaitingApproval -> Streaming`.
    pub fn approve(&mut self) -> Option<OutboundCommand> {
        if self.state != SessionState::AwaitingApproval {
            return None;
        }
        self.session.pending_approval = None;
        self.state = SessionState::Streaming;
        Some(OutboundCommand::Approve { approved: true })
    }

    /// Operator denies: the pending approval is cleared at once, without
    /// waiting for the remote side. `AwaitingApproval -> Idle`.
    pub fn deny(&mut self) -> Option<OutboundCommand> {
        if self.state != SessionState::AwaitingApproval {
            return None;
        }
        self.session.pending_approval = None;
        self.state = SessionState::Idle;
        Some(OutboundCommand::Approve { approved: false })
    }

    /// Resumption request to send after a (re)connect, if a chat is active.
    pub fn on_connected(&self) -> Option<OutboundCommand> {
        self.session
            .id
            .clone()
            .map(|chat_id| OutboundCommand::ResumeChat { chat_id })
    }

    /// The connection dropped: abandon the turn without committing anything.
    pub fn on_disconnect(&mut self) {
        if self.state != SessionState::Idle {
            tracing::debug!(state = %self.state, "abandoning in-flight turn");
        }
        self.reset_turn();
        self.session.pending_approval = None;
        self.state = SessionState::Idle;
    }

    /// Manual disconnect: abandon the turn and stop treating the chat as
    /// active, so the next connect does not resume it on its own.
    pub fn detach(&mut self) {
        self.on_disconnect();
        if let Some(id) = self.session.id.take() {
            self.last_session_id = Some(id);
        }
    }

    /// Explicitly resume `chat_id`, or the last chat if none is given.
    pub fn resume(&mut self, chat_id: Option<String>) -> Option<OutboundCommand> {
        let chat_id = chat_id
            .or_else(|| self.session.id.clone())
            .or_else(|| self.last_session_id.clone())?;
        self.on_disconnect();
        self.session.id = Some(chat_id.clone());
        Some(OutboundCommand::ResumeChat { chat_id })
    }

    /// Forget the current chat and ask the runtime for a fresh one.
    pub fn new_chat(&mut self) -> OutboundCommand {
        self.on_disconnect();
        if let Some(id) = self.session.id.take() {
            self.last_session_id = Some(id);
        }
        self.session.messages.clear();
        self.last_error = None;
        OutboundCommand::NewChat
    }

    fn reset_turn(&mut self) {
        self.turn.reset();
        self.progress.clear();
    }

    /// Remote-driven continuation (after a denial or a resume) re-enters
    /// streaming. An outstanding approval keeps its state.
    fn resume_streaming(&mut self) {
        if self.state == SessionState::Idle {
            self.state = SessionState::Streaming;
        }
    }

    fn apply_tool_result(
        &mut self,
        result: ToolResultFrame,
        frame_call_id: Option<&str>,
    ) -> Vec<SessionEvent> {
        let explicit_id = result
            .tool_call_id
            .as_deref()
            .or(frame_call_id)
            .filter(|id| !id.is_empty())
            .map(ToString::to_string);

        let target = match explicit_id {
            Some(id) => self
                .turn
                .tool_calls
                .iter()
                .position(|call| call.id == id && !call.is_resolved()),
            None if self.progress.mode() == CorrelationMode::Strict => {
                tracing::warn!("dropping tool result without tool_call_id");
                return vec![SessionEvent::ProtocolError {
                    message: "tool_result is missing tool_call_id".into(),
                }];
            }
            None => self
                .turn
                .tool_calls
                .iter()
                .rposition(|call| !call.is_resolved()),
        };
        let Some(index) = target else {
            tracing::debug!(tool_call_id = ?result.tool_call_id, "tool result matches no open call");
            return Vec::new();
        };

        let success = result.succeeded();
        let call = &mut self.turn.tool_calls[index];
        call.attach_result(result.to_value());
        let call_id = call.id.clone();

        self.turn.sources.extend(sources_from_value(&result.output));
        let mut details = Vec::new();
        if let Some(error) = &result.error {
            details.push(Detail::new("error", error.clone()));
        }
        if let CloseOutcome::Unmatched = self.progress.close(Some(&call_id), success, details) {
            tracing::debug!(tool_call_id = %call_id, "no progress step to close");
        }
        vec![SessionEvent::ToolCallFinished { call_id, success }]
    }

    fn request_approval(&mut self, approval: ApprovalFrame) -> Vec<SessionEvent> {
        let (description, related_tool_call_id) = match approval {
            ApprovalFrame::Flag(false) => return Vec::new(),
            ApprovalFrame::Flag(true) => (None, None),
            ApprovalFrame::Request {
                description,
                tool_call_id,
            } => (description, tool_call_id),
        };
        if self.session.pending_approval.is_some() {
            tracing::warn!("approval already pending; ignoring another request");
            return Vec::new();
        }
        let related_tool_call_id = related_tool_call_id.or_else(|| {
            self.turn
                .tool_calls
                .iter()
                .rev()
                .find(|call| !call.is_resolved())
                .map(|call| call.id.clone())
        });
        let description = description
            .filter(|d| !d.trim().is_empty())
            .or_else(|| {
                related_tool_call_id.as_ref().and_then(|id| {
                    self.turn
                        .tool_calls
                        .iter()
                        .find(|call| &call.id == id)
                        .map(|call| format!("Allow {} with {}?", call.name, call.arguments))
                })
            })
            .unwrap_or_else(|| "The agent is asking for permission to continue.".to_string());

        let request = ApprovalRequest {
            description,
            related_tool_call_id,
        };
        self.session.pending_approval = Some(request.clone());
        self.state = SessionState::AwaitingApproval;
        vec![SessionEvent::ApprovalRequired(request)]
    }

    fn commit_turn(&mut self) -> Option<Message> {
        let committed = if self.turn.is_empty() {
            None
        } else {
            let message = Message::assistant_with_tool_calls(
                std::mem::take(&mut self.turn.content),
                std::mem::take(&mut self.turn.tool_calls),
            )
            .with_sources(self.turn.sources.to_vec());
            self.session.messages.push(message.clone());
            Some(message)
        };
        self.turn.reset();
        self.session.pending_approval = None;
        self.state = SessionState::Idle;
        committed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn feed(machine: &mut SessionMachine, frames: &[serde_json::Value]) -> Vec<SessionEvent> {
        frames
            .iter()
            .flat_map(|frame| machine.handle_text(&frame.to_string()))
            .collect()
    }

    fn committed(events: &[SessionEvent]) -> Vec<&Message> {
        events
            .iter()
            .filter_map(|event| match event {
                SessionEvent::TurnCompleted { message } => Some(message),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn streamed_content_commits_one_message() {
        let mut machine = SessionMachine::default();
        let events = feed(
            &mut machine,
            &[
                json!({"start": true}),
                json!({"content": "Hello "}),
                json!({"content": "world"}),
                json!({"done": true}),
            ],
        );

        let messages = committed(&events);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "Hello world");
        assert!(messages[0].tool_calls.is_empty());
        assert_eq!(machine.state(), SessionState::Idle);
        assert_eq!(machine.session().messages.len(), 1);
    }

    #[test]
    fn start_discards_previous_turn_buffers() {
        let mut machine = SessionMachine::default();
        let events = feed(
            &mut machine,
            &[
                json!({"start": true}),
                json!({"content": "stale"}),
                json!({"tool_call": {"id": "t1", "name": "read_file"}}),
                json!({"start": true}),
                json!({"content": "fresh"}),
                json!({"done": true}),
            ],
        );

        let messages = committed(&events);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "fresh");
        assert!(messages[0].tool_calls.is_empty());
        assert!(machine.progress().steps().is_empty());
    }

    #[test]
    fn send_is_rejected_while_streaming() {
        let mut machine = SessionMachine::default();
        let first = machine.send_message("build it", &[]);
        assert!(matches!(first, Some(OutboundCommand::Message { .. })));
        assert_eq!(machine.state(), SessionState::Streaming);

        assert_eq!(machine.send_message("again", &[]), None);
        assert_eq!(machine.session().messages.len(), 1);
    }

    #[test]
    fn tool_result_attaches_by_id_and_closes_step() {
        let mut machine = SessionMachine::default();
        let events = feed(
            &mut machine,
            &[
                json!({"start": true}),
                json!({"tool_call": {"id": "t1", "name": "read_file", "arguments": {"path": "a.rs"}}}),
                json!({"tool_call": {"id": "t2", "name": "run_tests"}}),
                json!({"tool_result": {"success": false, "output": "2 failed"}, "tool_call_id": "t1"}),
            ],
        );

        assert!(events.contains(&SessionEvent::ToolCallFinished {
            call_id: "t1".into(),
            success: false,
        }));
        let calls = &machine.turn().tool_calls;
        assert_eq!(calls[0].result.as_ref().unwrap()["output"], "2 failed");
        assert!(calls[1].result.is_none());

        let steps = machine.progress().steps();
        assert_eq!(steps[0].status, Some(crate::progress::StepStatus::Error));
        assert_eq!(steps[1].status, Some(crate::progress::StepStatus::Running));
    }

    #[test]
    fn idless_result_falls_back_to_latest_open_call() {
        let mut machine = SessionMachine::default();
        feed(
            &mut machine,
            &[
                json!({"start": true}),
                json!({"tool_call": {"id": "t1", "name": "read_file"}}),
                json!({"tool_call": {"id": "t2", "name": "write_file"}}),
                json!({"tool_result": {"output": "written"}}),
            ],
        );
        let calls = &machine.turn().tool_calls;
        assert!(calls[0].result.is_none());
        assert!(calls[1].result.is_some());
    }

    #[test]
    fn strict_correlation_drops_idless_results() {
        let mut machine = SessionMachine::new(CorrelationMode::Strict);
        let events = feed(
            &mut machine,
            &[
                json!({"start": true}),
                json!({"tool_call": {"id": "t1", "name": "read_file"}}),
                json!({"tool_result": {"output": "x"}}),
            ],
        );
        assert!(matches!(events.last(), Some(SessionEvent::ProtocolError { .. })));
        assert!(machine.turn().tool_calls[0].result.is_none());
    }

    #[test]
    fn unmatched_tool_result_is_a_noop() {
        let mut machine = SessionMachine::default();
        feed(
            &mut machine,
            &[
                json!({"start": true}),
                json!({"tool_call": {"id": "t1", "name": "read_file"}}),
            ],
        );
        let steps_before = machine.progress().steps().to_vec();
        let calls_before = machine.turn().tool_calls.clone();

        let events = feed(
            &mut machine,
            &[json!({"tool_result": {"output": "?"}, "tool_call_id": "nope"})],
        );

        assert!(events.is_empty());
        assert_eq!(machine.progress().steps(), steps_before.as_slice());
        assert_eq!(machine.turn().tool_calls, calls_before);
        assert_eq!(machine.state(), SessionState::Streaming);
    }

    #[test]
    fn approval_then_approve_resumes_streaming() {
        let mut machine = SessionMachine::default();
        machine.send_message("clean the build dir", &[]);
        let events = feed(
            &mut machine,
            &[
                json!({"start": true}),
                json!({"tool_call": {"id": "t1", "name": "run_shell", "arguments": {"cmd": "rm -rf build"}}}),
                json!({"requires_approval": true}),
            ],
        );

        let Some(SessionEvent::ApprovalRequired(request)) = events.last() else {
            panic!("expected approval request, got {events:?}");
        };
        assert_eq!(request.related_tool_call_id.as_deref(), Some("t1"));
        assert!(request.description.contains("run_shell"));
        assert_eq!(machine.state(), SessionState::AwaitingApproval);

        assert_eq!(
            machine.approve(),
            Some(OutboundCommand::Approve { approved: true })
        );
        assert_eq!(machine.state(), SessionState::Streaming);
        assert!(machine.pending_approval().is_none());

        let events = feed(
            &mut machine,
            &[
                json!({"tool_result": {"output": "removed"}, "tool_call_id": "t1"}),
                json!({"content": "Done.", "done": true}),
            ],
        );
        let messages = committed(&events);
        assert_eq!(messages[0].content, "Done.");
        assert_eq!(messages[0].tool_calls[0].id, "t1");
        assert_eq!(machine.session().messages.len(), 2);
    }

    #[test]
    fn deny_clears_locally_and_goes_idle() {
        let mut machine = SessionMachine::default();
        feed(
            &mut machine,
            &[
                json!({"start": true}),
                json!({"requires_approval": {"description": "Delete 3 files?"}}),
            ],
        );
        assert_eq!(
            machine.pending_approval().map(|r| r.description.as_str()),
            Some("Delete 3 files?")
        );
        assert_eq!(machine.approve().is_some(), true);
        assert_eq!(machine.deny(), None);

        feed(&mut machine, &[json!({"requires_approval": true})]);
        assert_eq!(
            machine.deny(),
            Some(OutboundCommand::Approve { approved: false })
        );
        assert_eq!(machine.state(), SessionState::Idle);
        assert!(machine.pending_approval().is_none());
        assert_eq!(machine.last_error(), None);
    }

    #[test]
    fn error_frame_fails_turn_without_commit() {
        let mut machine = SessionMachine::default();
        let events = feed(
            &mut machine,
            &[
                json!({"start": true}),
                json!({"content": "partial"}),
                json!({"error": "model overloaded"}),
            ],
        );
        assert_eq!(
            events.last(),
            Some(&SessionEvent::TurnFailed {
                message: "model overloaded".into()
            })
        );
        assert_eq!(machine.state(), SessionState::Idle);
        assert_eq!(machine.last_error(), Some("model overloaded"));
        assert!(machine.session().messages.is_empty());
        assert!(machine.turn().is_empty());
    }

    #[test]
    fn error_in_same_frame_as_content_still_fails_turn() {
        let mut machine = SessionMachine::default();
        let events = feed(
            &mut machine,
            &[
                json!({"start": true}),
                json!({
                    "content": "half an answer",
                    "tool_call": {"id": "t1", "name": "read_file"},
                    "error": {"message": "sandbox crashed"},
                    "done": true
                }),
            ],
        );
        assert!(events.contains(&SessionEvent::ContentDelta {
            text: "half an answer".into()
        }));
        assert_eq!(
            events.last(),
            Some(&SessionEvent::TurnFailed {
                message: "sandbox crashed".into()
            })
        );
        assert_eq!(machine.state(), SessionState::Idle);
        assert!(machine.session().messages.is_empty());
    }

    #[test]
    fn sources_are_deduplicated_within_a_turn() {
        let mut machine = SessionMachine::default();
        let events = feed(
            &mut machine,
            &[
                json!({"start": true}),
                json!({"tool_call": {"id": "a", "name": "web_search"}}),
                json!({"tool_result": {"tool_call_id": "a", "output": {"sources": [
                    {"title": "Docs", "url": "https://docs.rs"},
                    {"title": "Crates", "url": "https://crates.io"}
                ]}}}),
                json!({"tool_call": {"id": "b", "name": "web_search"}}),
                json!({"tool_result": {"tool_call_id": "b", "output": {"sources": [
                    {"title": "Docs again", "url": "https://docs.rs"}
                ]}}}),
                json!({"content": "See sources.", "done": true}),
            ],
        );
        let message = committed(&events)[0];
        let urls: Vec<_> = message.sources.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(urls, vec!["https://docs.rs", "https://crates.io"]);
    }

    #[test]
    fn status_frames_become_thought_steps() {
        let mut machine = SessionMachine::default();
        let events = feed(
            &mut machine,
            &[json!({"start": true}), json!({"status": "Reading the repo"})],
        );
        assert!(events.contains(&SessionEvent::Status {
            text: "Reading the repo".into()
        }));
        assert_eq!(machine.progress().steps()[0].status, None);
    }

    #[test]
    fn garbage_frame_is_dropped_without_state_change() {
        let mut machine = SessionMachine::default();
        machine.send_message("hi", &[]);
        let events = machine.handle_text("{not json");
        assert!(matches!(events[0], SessionEvent::ProtocolError { .. }));
        assert_eq!(machine.state(), SessionState::Streaming);
    }

    #[test]
    fn detach_forgets_active_chat_but_allows_explicit_resume() {
        let mut machine = SessionMachine::default();
        feed(
            &mut machine,
            &[
                json!({"type": "chat-created", "chat_id": "chat-7"}),
                json!({"start": true}),
                json!({"requires_approval": true}),
            ],
        );
        assert_eq!(
            machine.on_connected(),
            Some(OutboundCommand::ResumeChat {
                chat_id: "chat-7".into()
            })
        );

        machine.detach();
        assert!(machine.pending_approval().is_none());
        assert_eq!(machine.state(), SessionState::Idle);
        assert_eq!(machine.on_connected(), None);
        assert_eq!(machine.last_session_id(), Some("chat-7"));

        assert_eq!(
            machine.resume(None),
            Some(OutboundCommand::ResumeChat {
                chat_id: "chat-7".into()
            })
        );
        assert_eq!(machine.session().id.as_deref(), Some("chat-7"));
    }

    #[test]
    fn resumed_history_rehydrates_messages() {
        let mut machine = SessionMachine::default();
        feed(
            &mut machine,
            &[json!({
                "type": "chat-resumed",
                "chat_id": "chat-9",
                "messages": [
                    {"role": "user", "content": "hi"},
                    {"role": "assistant", "content": "hello"}
                ]
            })],
        );
        assert_eq!(machine.session().id.as_deref(), Some("chat-9"));
        assert_eq!(machine.session().messages.len(), 2);
    }

    #[test]
    fn new_chat_clears_history() {
        let mut machine = SessionMachine::default().with_session(Session {
            id: Some("old".into()),
            messages: vec![Message::user("hi")],
            ..Session::default()
        });
        assert_eq!(machine.new_chat(), OutboundCommand::NewChat);
        assert!(machine.session().id.is_none());
        assert!(machine.session().messages.is_empty());
        assert_eq!(machine.last_session_id(), Some("old"));
    }

    #[test]
    fn images_are_sent_as_data_urls() {
        let mut machine = SessionMachine::default();
        let command = machine
            .send_message("what is this?", &[ImageAttachment::new("image/png", vec![0xff])])
            .unwrap();
        assert_eq!(
            command,
            OutboundCommand::Message {
                content: "what is this?".into(),
                images: vec!["data:image/png;base64,/w==".into()],
            }
        );
    }
}
