//! Workflow: a declarative task graph (spec §3 "Workflow").
//!
//! Generalizes the teacher's Petri-net `WorkflowDefinition`/`ActivityDefinition`
//! (`src/models/workflow.rs`, `src/models/activity.rs`) from a places/transitions
//! state machine into the task-kind graph this daemon persists and hands to
//! the workflow-runner: tasks of kinds HTTP call, SET, agent call, wait,
//! listen, raise, switch, for-each, try/catch, fork.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::impl_has_metadata;
use crate::models::envelope::Metadata;

/// A single HTTP header key/value pair stored alongside a call task.
pub type Headers = HashMap<String, String>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpCallTask {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetTask {
    /// Key/value pairs merged into the execution's working data, evaluated
    /// as JSONPath-style expressions against prior task output (spec §3
    /// keeps expression evaluation itself a runner concern; the daemon only
    /// stores the declared expressions).
    pub variables: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCallTask {
    pub agent_id: String,
    pub input_expression: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitTask {
    pub duration_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenTask {
    pub event_type: String,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaiseTask {
    pub error_type: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchCase {
    pub when_expression: String,
    pub then: Vec<Task>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchTask {
    pub cases: Vec<SwitchCase>,
    #[serde(default)]
    pub default: Vec<Task>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForEachTask {
    pub in_expression: String,
    pub item_variable: String,
    pub body: Vec<Task>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TryCatchTask {
    pub try_body: Vec<Task>,
    pub catch_body: Vec<Task>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForkTask {
    /// Each branch runs concurrently; the runner decides join semantics
    /// (daemon only persists the declared branches).
    pub branches: Vec<Vec<Task>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskKind {
    HttpCall(HttpCallTask),
    Set(SetTask),
    AgentCall(AgentCallTask),
    Wait(WaitTask),
    Listen(ListenTask),
    Raise(RaiseTask),
    Switch(SwitchTask),
    ForEach(ForEachTask),
    TryCatch(TryCatchTask),
    Fork(ForkTask),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    #[serde(flatten)]
    pub kind: TaskKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSpec {
    /// Namespacing for the workflow independent of scope (spec §3 "Has its
    /// own slug/namespace/version triple"); distinct workflows in different
    /// namespaces may share a slug.
    #[serde(default)]
    pub namespace: String,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowStatus {
    #[serde(default)]
    pub default_instance_id: String,
    /// Set by the validation workflow run during Create (spec §4.2
    /// "composes a validation step that invokes a Temporal validation
    /// workflow ... before persisting").
    #[serde(default)]
    pub validated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub api_version: String,
    pub metadata: Metadata,
    pub spec: WorkflowSpec,
    #[serde(default)]
    pub status: WorkflowStatus,
}

impl_has_metadata!(Workflow);

pub const KIND_WORKFLOW: &str = "workflow";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_kind_round_trips_through_json() {
        let task = Task {
            name: "notify".to_string(),
            kind: TaskKind::HttpCall(HttpCallTask {
                method: "POST".to_string(),
                url: "https://example.invalid/hook".to_string(),
                headers: Headers::new(),
                body: None,
            }),
        };
        let encoded = serde_json::to_string(&task).unwrap();
        let decoded: Task = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.name, "notify");
        assert!(matches!(decoded.kind, TaskKind::HttpCall(_)));
    }

    #[test]
    fn switch_task_nests_sub_tasks() {
        let task = Task {
            name: "route".to_string(),
            kind: TaskKind::Switch(SwitchTask {
                cases: vec![SwitchCase {
                    when_expression: "$.status == 'ok'".to_string(),
                    then: vec![],
                }],
                default: vec![],
            }),
        };
        match task.kind {
            TaskKind::Switch(switch) => assert_eq!(switch.cases.len(), 1),
            _ => panic!("expected switch task"),
        }
    }
}
