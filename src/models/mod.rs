//! Domain models: the envelope-shaped resources this daemon persists and
//! serves over gRPC (spec §3). Each submodule owns one resource kind's
//! `<Kind>`/`<Kind>Spec`/`<Kind>Status` triple.

pub mod agent;
pub mod agent_execution;
pub mod agent_instance;
pub mod envelope;
pub mod environment;
pub mod session;
pub mod skill;
pub mod workflow;
pub mod workflow_execution;
pub mod workflow_instance;

pub use agent::{Agent, AgentSpec, AgentStatus, KIND_AGENT};
pub use agent_execution::{
    AgentExecution, AgentExecutionSpec, AgentExecutionStatus, AgentExecutionStatusUpdate,
    ExecutionPhase, Message, MessageRole, ToolCall, KIND_AGENT_EXECUTION,
};
pub use agent_instance::{
    AgentInstance, AgentInstanceSpec, AgentInstanceStatus, KIND_AGENT_INSTANCE,
};
pub use envelope::{HasMetadata, Metadata, Scope, LOCAL_ORGANIZATION};
pub use environment::{Environment, EnvironmentSpec, EnvironmentStatus, EnvironmentValue, KIND_ENVIRONMENT};
pub use session::{Session, SessionSpec, SessionStatus, KIND_SESSION};
pub use skill::{Skill, SkillSpec, SkillStatus, SkillVersion, KIND_SKILL};
pub use workflow::{Task, TaskKind, Workflow, WorkflowSpec, WorkflowStatus, KIND_WORKFLOW};
pub use workflow_execution::{
    TaskResult, WorkflowExecution, WorkflowExecutionSpec, WorkflowExecutionStatus,
    WorkflowExecutionStatusUpdate, KIND_WORKFLOW_EXECUTION,
};
pub use workflow_instance::{
    WorkflowInstance, WorkflowInstanceSpec, WorkflowInstanceStatus, KIND_WORKFLOW_INSTANCE,
};
