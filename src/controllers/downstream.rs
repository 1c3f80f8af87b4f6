//! In-process direct-call clients (spec §4.2.1): a controller that needs
//! another resource kind's create path depends on a narrow trait here
//! instead of a concrete controller type or a network round-trip. Every
//! controller that is itself a callee below also implements its trait
//! directly — no separate adapter struct needed, since both sides live in
//! the same process and the same crate.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{AgentInstance, Session, WorkflowInstance};

/// Resolves or creates the synthesized default `AgentInstance` behind an
/// Agent (spec §4.2 "CreateDefaultInstance").
#[async_trait]
pub trait AgentInstanceClient: Send + Sync {
    async fn create_default(&self, agent_id: &str, agent_slug: &str) -> Result<AgentInstance>;
}

/// Resolves or creates the Session an AgentExecution lands in when the
/// caller supplied only an agent/instance reference (spec §4.2
/// "CreateSessionIfNeeded").
#[async_trait]
pub trait SessionClient: Send + Sync {
    async fn create_default(&self, agent_instance_id: &str) -> Result<Session>;
}

/// Resolves or creates the synthesized default `WorkflowInstance` behind a
/// Workflow (spec §3 "auto-materialized like AgentInstance").
#[async_trait]
pub trait WorkflowInstanceClient: Send + Sync {
    async fn create_default(&self, workflow_id: &str, workflow_slug: &str) -> Result<WorkflowInstance>;
}
