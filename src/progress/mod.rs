//! Progress correlation: tool calls and their results folded into an
//! ordered, human-readable step timeline.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Lifecycle of a tool step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Done,
    Error,
}

impl StepStatus {
    pub fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

/// What a step represents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    Tool { call_id: String },
    Thought,
}

/// A label/value pair shown under a step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Detail {
    pub label: String,
    pub value: String,
}

impl Detail {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// One entry of the timeline. Thought steps carry no status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressStep {
    pub id: String,
    pub title: String,
    pub kind: StepKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StepStatus>,
    #[serde(default)]
    pub details: Vec<Detail>,
}

impl ProgressStep {
    pub fn call_id(&self) -> Option<&str> {
        match &self.kind {
            StepKind::Tool { call_id } => Some(call_id),
            StepKind::Thought => None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status.is_some_and(StepStatus::is_open)
    }
}

/// How results without a tool-call id are attributed.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CorrelationMode {
    /// Attribute to the most recently opened step that is still open.
    /// Correct for sequential single-call turns; can misattribute under
    /// overlapping calls.
    #[default]
    LastOpen,
    /// Reject id-less results.
    Strict,
}

/// Result of trying to close a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The step with this call id was closed.
    Closed { call_id: String },
    /// No open step matched; nothing changed.
    Unmatched,
    /// The result had no id and strict correlation is on.
    MissingId,
}

/// Strictly ordered step list for one turn.
#[derive(Debug, Clone, Default)]
pub struct ProgressTimeline {
    steps: Vec<ProgressStep>,
    mode: CorrelationMode,
}

impl ProgressTimeline {
    pub fn new(mode: CorrelationMode) -> Self {
        Self {
            steps: Vec::new(),
            mode,
        }
    }

    pub fn mode(&self) -> CorrelationMode {
        self.mode
    }

    /// Open a pending step for an observed tool call.
    pub fn observe_call(&mut self, call_id: &str, tool_name: &str, arguments: &serde_json::Value) {
        let mut details = Vec::new();
        if arguments.as_object().is_some_and(|args| !args.is_empty()) {
            details.push(Detail::new("arguments", arguments.to_string()));
        }
        self.steps.push(ProgressStep {
            id: call_id.to_string(),
            title: humanize_tool_name(tool_name),
            kind: StepKind::Tool {
                call_id: call_id.to_string(),
            },
            status: Some(StepStatus::Pending),
            details,
        });
    }

    /// Move a pending step to running. Returns `false` if no pending step matches.
    pub fn mark_running(&mut self, call_id: &str) -> bool {
        match self
            .steps
            .iter_mut()
            .find(|step| step.call_id() == Some(call_id) && step.status == Some(StepStatus::Pending))
        {
            Some(step) => {
                step.status = Some(StepStatus::Running);
                true
            }
            None => false,
        }
    }

    /// Close the step answered by a tool result.
    pub fn close(&mut self, call_id: Option<&str>, success: bool, details: Vec<Detail>) -> CloseOutcome {
        let index = match call_id {
            Some(id) => self
                .steps
                .iter()
                .position(|step| step.call_id() == Some(id) && step.is_open()),
            None if self.mode == CorrelationMode::Strict => return CloseOutcome::MissingId,
            None => self.steps.iter().rposition(ProgressStep::is_open),
        };
        let Some(index) = index else {
            return CloseOutcome::Unmatched;
        };
        let step = &mut self.steps[index];
        step.status = Some(if success {
            StepStatus::Done
        } else {
            StepStatus::Error
        });
        step.details.extend(details);
        CloseOutcome::Closed {
            call_id: step.id.clone(),
        }
    }

    /// Append a display-only thought step.
    pub fn add_thought(&mut self, text: impl Into<String>) {
        let text = text.into();
        if text.trim().is_empty() {
            return;
        }
        self.steps.push(ProgressStep {
            id: Uuid::new_v4().to_string(),
            title: text,
            kind: StepKind::Thought,
            status: None,
            details: Vec::new(),
        });
    }

    /// Call id of the most recently opened step still open.
    pub fn last_open_call(&self) -> Option<&str> {
        self.steps
            .iter()
            .rev()
            .find(|step| step.is_open())
            .and_then(ProgressStep::call_id)
    }

    pub fn steps(&self) -> &[ProgressStep] {
        &self.steps
    }

    pub fn into_steps(self) -> Vec<ProgressStep> {
        self.steps
    }

    pub fn clear(&mut self) {
        self.steps.clear();
    }
}

/// `get_balance` -> `Get balance`.
fn humanize_tool_name(name: &str) -> String {
    let spaced = name.replace(['_', '-'], " ");
    let mut chars = spaced.trim().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => name.to_string(),
    }
}
