//! The `WorkflowCreator` capability controllers hold to start a Temporal
//! workflow (spec glossary "Creator"; §9 "Nil workflow creator").

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Everything a controller needs to start one workflow run.
#[derive(Debug, Clone)]
pub struct WorkflowStartRequest {
    pub task_queue: String,
    pub workflow_type: String,
    pub workflow_id: String,
    pub input: Value,
}

#[derive(Debug, Clone)]
pub struct WorkflowHandle {
    pub workflow_id: String,
    pub run_id: String,
}

/// A capability that knows how to start a Temporal workflow of some kind
/// (spec glossary "Creator"). Controllers depend on this trait, never on
/// a concrete Temporal client, so the daemon can swap in a fresh one on
/// every reconnect without touching controller code.
#[async_trait]
pub trait WorkflowCreator: Send + Sync {
    async fn start(&self, request: WorkflowStartRequest) -> Result<WorkflowHandle>;
}

/// Implemented by every controller that dispatches work to Temporal
/// (`AgentExecution`, `WorkflowExecution`, `Workflow`'s validation step).
/// Reading returns `None` when Temporal has never connected or the
/// connection was lost and no replacement has arrived yet — callers must
/// treat that as "unavailable" (spec §4.3 "Contract with controllers"),
/// never as "silently skip the workflow".
pub trait WorkflowCreatorProvider: Send + Sync {
    fn workflow_creator(&self) -> Option<std::sync::Arc<dyn WorkflowCreator>>;
}

/// Shared `RwLock<Option<Arc<dyn WorkflowCreator>>>` cell so every
/// controller that starts workflows (`Workflow`, `AgentExecution`,
/// `WorkflowExecution`) can register with `TemporalManager` as a
/// `CreatorSink` without each hand-rolling the same lock.
#[derive(Default)]
pub struct CreatorHandle(RwLock<Option<Arc<dyn WorkflowCreator>>>);

impl CreatorHandle {
    pub fn new() -> Self {
        CreatorHandle(RwLock::new(None))
    }

    pub fn get(&self) -> Option<Arc<dyn WorkflowCreator>> {
        self.0.read().expect("creator handle lock poisoned").clone()
    }
}

impl super::CreatorSink for CreatorHandle {
    fn set_workflow_creator(&self, creator: Option<Arc<dyn WorkflowCreator>>) {
        *self.0.write().expect("creator handle lock poisoned") = creator;
    }
}

impl WorkflowCreatorProvider for CreatorHandle {
    fn workflow_creator(&self) -> Option<Arc<dyn WorkflowCreator>> {
        self.get()
    }
}
