//! AgentExecution: one invocation of an AgentInstance (spec §3).
//!
//! Generalizes the teacher's `AgentExecution`/`AgentExecutionStatus`/
//! `ConversationMessage`/`MessageRole` (`src/models/agent.rs`) from a
//! single-shot request/response record into the envelope-shaped resource
//! with an incrementally-merged status stream spec §4.2's `UpdateStatus`
//! requires.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::impl_has_metadata;
use crate::models::envelope::Metadata;

/// Phase is one of {pending, running, completed, failed, cancelled} and
/// only ever advances forward (spec §3 invariant, §5 "subscribers
/// therefore observe monotonic phases").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExecutionPhase {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionPhase::Completed | ExecutionPhase::Failed | ExecutionPhase::Cancelled
        )
    }

    /// Ordinal used to enforce "advance phase only forward" (spec §4.2
    /// AgentExecution.UpdateStatus). `Cancelled` sits alongside `Failed`/
    /// `Completed` as a terminal phase rather than strictly after them —
    /// any terminal phase can follow `Running` directly.
    fn rank(self) -> u8 {
        match self {
            ExecutionPhase::Pending => 0,
            ExecutionPhase::Running => 1,
            ExecutionPhase::Completed | ExecutionPhase::Failed | ExecutionPhase::Cancelled => 2,
        }
    }

    pub fn can_advance_to(self, next: ExecutionPhase) -> bool {
        next.rank() >= self.rank()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool_call_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentExecutionSpec {
    /// At least one of `session_id`/`agent_id` must be set (spec §4.2
    /// ValidateSessionOrAgent); both may end up populated once
    /// `CreateSessionIfNeeded` runs.
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub agent_id: String,
    pub input_message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentExecutionStatus {
    #[serde(default = "default_phase")]
    pub phase: ExecutionPhase,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub error_message: Option<String>,
    /// Populated by `CreateSessionIfNeeded`; also an invariant target
    /// (spec §3 invariant 4: "always resolves to a Session ... before
    /// transitioning out of pending").
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub agent_instance_id: String,
}

fn default_phase() -> ExecutionPhase {
    ExecutionPhase::Pending
}

impl Default for AgentExecutionStatus {
    fn default() -> Self {
        AgentExecutionStatus {
            phase: ExecutionPhase::Pending,
            messages: Vec::new(),
            tool_calls: Vec::new(),
            error_message: None,
            session_id: String::new(),
            agent_instance_id: String::new(),
        }
    }
}

impl AgentExecutionStatus {
    /// Merge an incoming partial status update (spec §4.2
    /// "AgentExecution.UpdateStatus ... merged incrementally (messages and
    /// tool_calls append, phase advances only forward, update
    /// timestamps)"). Returns `Err` if the update would move phase
    /// backward.
    pub fn merge(&mut self, update: AgentExecutionStatusUpdate) -> Result<(), String> {
        if let Some(phase) = update.phase {
            if !self.phase.can_advance_to(phase) {
                return Err(format!(
                    "cannot advance phase from {:?} to {:?}",
                    self.phase, phase
                ));
            }
            self.phase = phase;
        }
        self.messages.extend(update.messages);
        for incoming in update.tool_calls {
            merge_tool_call(&mut self.tool_calls, incoming);
        }
        if let Some(err) = update.error_message {
            self.error_message = Some(err);
        }
        if let Some(session_id) = update.session_id {
            self.session_id = session_id;
        }
        if let Some(instance_id) = update.agent_instance_id {
            self.agent_instance_id = instance_id;
        }
        Ok(())
    }
}

/// Append-by-default, deduplicated by `tool_call_id` when the incoming
/// record reuses one already present — a Temporal activity retry resends
/// the same tool call id with a (possibly updated) result rather than
/// appending a duplicate entry (DESIGN.md open-question decision).
fn merge_tool_call(existing: &mut Vec<ToolCall>, incoming: ToolCall) {
    if let Some(slot) = existing
        .iter_mut()
        .find(|tc| tc.tool_call_id == incoming.tool_call_id)
    {
        *slot = incoming;
    } else {
        existing.push(incoming);
    }
}

/// The partial update shape `AgentExecution.UpdateStatus` accepts from a
/// running runner activity.
#[derive(Debug, Clone, Default)]
pub struct AgentExecutionStatusUpdate {
    pub phase: Option<ExecutionPhase>,
    pub messages: Vec<Message>,
    pub tool_calls: Vec<ToolCall>,
    pub error_message: Option<String>,
    pub session_id: Option<String>,
    pub agent_instance_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentExecution {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub api_version: String,
    pub metadata: Metadata,
    pub spec: AgentExecutionSpec,
    #[serde(default)]
    pub status: AgentExecutionStatus,
}

impl_has_metadata!(AgentExecution);

pub const KIND_AGENT_EXECUTION: &str = "agentexecution";

#[cfg(test)]
mod tests {
    use super::*;

    fn tool_call(id: &str, result: Option<serde_json::Value>) -> ToolCall {
        ToolCall {
            tool_call_id: id.to_string(),
            tool_name: "search".to_string(),
            arguments: serde_json::json!({}),
            result,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn phase_never_moves_backward() {
        let mut status = AgentExecutionStatus::default();
        status
            .merge(AgentExecutionStatusUpdate {
                phase: Some(ExecutionPhase::Running),
                ..Default::default()
            })
            .unwrap();
        let err = status
            .merge(AgentExecutionStatusUpdate {
                phase: Some(ExecutionPhase::Pending),
                ..Default::default()
            })
            .unwrap_err();
        assert!(err.contains("cannot advance"));
        assert_eq!(status.phase, ExecutionPhase::Running);
    }

    #[test]
    fn terminal_phase_reachable_directly_from_running() {
        let mut status = AgentExecutionStatus::default();
        status
            .merge(AgentExecutionStatusUpdate {
                phase: Some(ExecutionPhase::Running),
                ..Default::default()
            })
            .unwrap();
        status
            .merge(AgentExecutionStatusUpdate {
                phase: Some(ExecutionPhase::Failed),
                ..Default::default()
            })
            .unwrap();
        assert!(status.phase.is_terminal());
    }

    #[test]
    fn tool_calls_dedupe_by_id_on_retry() {
        let mut status = AgentExecutionStatus::default();
        status
            .merge(AgentExecutionStatusUpdate {
                tool_calls: vec![tool_call("tc-1", None)],
                ..Default::default()
            })
            .unwrap();
        status
            .merge(AgentExecutionStatusUpdate {
                tool_calls: vec![tool_call("tc-1", Some(serde_json::json!({"ok": true})))],
                ..Default::default()
            })
            .unwrap();
        assert_eq!(status.tool_calls.len(), 1);
        assert!(status.tool_calls[0].result.is_some());
    }

    #[test]
    fn messages_append_across_merges() {
        let mut status = AgentExecutionStatus::default();
        status
            .merge(AgentExecutionStatusUpdate {
                messages: vec![Message {
                    role: MessageRole::User,
                    content: "hi".into(),
                    timestamp: Utc::now(),
                }],
                ..Default::default()
            })
            .unwrap();
        status
            .merge(AgentExecutionStatusUpdate {
                messages: vec![Message {
                    role: MessageRole::Assistant,
                    content: "hello".into(),
                    timestamp: Utc::now(),
                }],
                ..Default::default()
            })
            .unwrap();
        assert_eq!(status.messages.len(), 2);
    }
}
