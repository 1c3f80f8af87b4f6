//! WorkflowExecution: one invocation of a WorkflowInstance (spec §3
//! "status structure analogous to AgentExecution").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::impl_has_metadata;
use crate::models::agent_execution::ExecutionPhase;
use crate::models::envelope::Metadata;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_name: String,
    pub output: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecutionSpec {
    pub workflow_instance_id: String,
    #[serde(default)]
    pub input: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecutionStatus {
    #[serde(default = "default_phase")]
    pub phase: ExecutionPhase,
    #[serde(default)]
    pub task_results: Vec<TaskResult>,
    #[serde(default)]
    pub error_message: Option<String>,
}

fn default_phase() -> ExecutionPhase {
    ExecutionPhase::Pending
}

impl Default for WorkflowExecutionStatus {
    fn default() -> Self {
        WorkflowExecutionStatus {
            phase: ExecutionPhase::Pending,
            task_results: Vec::new(),
            error_message: None,
        }
    }
}

impl WorkflowExecutionStatus {
    /// Same append/forward-only merge discipline as `AgentExecutionStatus`
    /// (spec §4.2 "WorkflowExecution.Create mirrors AgentExecution.Create").
    pub fn merge(&mut self, update: WorkflowExecutionStatusUpdate) -> Result<(), String> {
        if let Some(phase) = update.phase {
            if !self.phase.can_advance_to(phase) {
                return Err(format!(
                    "cannot advance phase from {:?} to {:?}",
                    self.phase, phase
                ));
            }
            self.phase = phase;
        }
        self.task_results.extend(update.task_results);
        if let Some(err) = update.error_message {
            self.error_message = Some(err);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct WorkflowExecutionStatusUpdate {
    pub phase: Option<ExecutionPhase>,
    pub task_results: Vec<TaskResult>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub api_version: String,
    pub metadata: Metadata,
    pub spec: WorkflowExecutionSpec,
    #[serde(default)]
    pub status: WorkflowExecutionStatus,
}

impl_has_metadata!(WorkflowExecution);

pub const KIND_WORKFLOW_EXECUTION: &str = "workflowexecution";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_advances_forward_only() {
        let mut status = WorkflowExecutionStatus::default();
        status
            .merge(WorkflowExecutionStatusUpdate {
                phase: Some(ExecutionPhase::Running),
                ..Default::default()
            })
            .unwrap();
        assert!(status
            .merge(WorkflowExecutionStatusUpdate {
                phase: Some(ExecutionPhase::Pending),
                ..Default::default()
            })
            .is_err());
    }

    #[test]
    fn task_results_accumulate() {
        let mut status = WorkflowExecutionStatus::default();
        status
            .merge(WorkflowExecutionStatusUpdate {
                task_results: vec![TaskResult {
                    task_name: "notify".to_string(),
                    output: serde_json::json!({"sent": true}),
                    timestamp: Utc::now(),
                }],
                ..Default::default()
            })
            .unwrap();
        assert_eq!(status.task_results.len(), 1);
    }
}
