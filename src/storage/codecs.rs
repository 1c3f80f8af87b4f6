//! Per-kind `StorageCodec` implementations (spec §4.5). Each conversion
//! mirrors the domain<->pb mapping its gRPC service already performs in
//! `src/grpc/<kind>.rs` (see `crate::grpc::convert` for the shared
//! metadata/scope/JSON-sidecar helpers); storage just reuses the same pb
//! message as the wire format instead of defining a second schema.
//!
//! `kind`/`api_version` are not carried on the wire: every controller's
//! `BuildNewState` stamps them to the same fixed literal per resource kind
//! (see `src/controllers/*.rs`), so `from_storage_proto` reconstructs them
//! as constants rather than persisting a value that never varies.

use chrono::Utc;

use crate::error::Result;
use crate::grpc::convert::{metadata_from_pb, metadata_to_pb, parse_json, to_json};
use crate::grpc::pb;
use crate::models::agent::{Agent, AgentSpec, AgentStatus};
use crate::models::agent_execution::{
    AgentExecution, AgentExecutionSpec, AgentExecutionStatus, ExecutionPhase, Message, MessageRole, ToolCall,
};
use crate::models::agent_instance::{AgentInstance, AgentInstanceSpec, AgentInstanceStatus};
use crate::models::environment::{Environment, EnvironmentSpec, EnvironmentStatus, EnvironmentValue};
use crate::models::session::{Session, SessionSpec, SessionStatus};
use crate::models::skill::{Skill, SkillSpec, SkillStatus, SkillVersion};
use crate::models::workflow::{Task, WorkflowSpec, WorkflowStatus};
use crate::models::workflow_execution::{
    TaskResult, WorkflowExecution, WorkflowExecutionSpec, WorkflowExecutionStatus,
};
use crate::models::workflow_instance::{WorkflowInstance, WorkflowInstanceSpec, WorkflowInstanceStatus};
use crate::models::Workflow;
use crate::storage::codec::StorageCodec;

fn phase_to_pb(phase: ExecutionPhase) -> i32 {
    match phase {
        ExecutionPhase::Pending => pb::ExecutionPhase::Pending as i32,
        ExecutionPhase::Running => pb::ExecutionPhase::Running as i32,
        ExecutionPhase::Completed => pb::ExecutionPhase::Completed as i32,
        ExecutionPhase::Failed => pb::ExecutionPhase::Failed as i32,
        ExecutionPhase::Cancelled => pb::ExecutionPhase::Cancelled as i32,
    }
}

fn phase_from_pb(phase: i32) -> ExecutionPhase {
    match pb::ExecutionPhase::try_from(phase).unwrap_or(pb::ExecutionPhase::Pending) {
        pb::ExecutionPhase::Pending => ExecutionPhase::Pending,
        pb::ExecutionPhase::Running => ExecutionPhase::Running,
        pb::ExecutionPhase::Completed => ExecutionPhase::Completed,
        pb::ExecutionPhase::Failed => ExecutionPhase::Failed,
        pb::ExecutionPhase::Cancelled => ExecutionPhase::Cancelled,
    }
}

fn role_to_pb(role: MessageRole) -> i32 {
    match role {
        MessageRole::System => pb::MessageRole::System as i32,
        MessageRole::User => pb::MessageRole::User as i32,
        MessageRole::Assistant => pb::MessageRole::Assistant as i32,
        MessageRole::Tool => pb::MessageRole::Tool as i32,
    }
}

fn role_from_pb(role: i32) -> MessageRole {
    match pb::MessageRole::try_from(role).unwrap_or(pb::MessageRole::User) {
        pb::MessageRole::System => MessageRole::System,
        pb::MessageRole::User => MessageRole::User,
        pb::MessageRole::Assistant => MessageRole::Assistant,
        pb::MessageRole::Tool => MessageRole::Tool,
    }
}

fn message_to_pb(message: Message) -> pb::Message {
    pb::Message {
        role: role_to_pb(message.role),
        content: message.content,
        timestamp: message.timestamp.to_rfc3339(),
    }
}

fn message_from_pb(message: pb::Message) -> Message {
    Message {
        role: role_from_pb(message.role),
        content: message.content,
        timestamp: message.timestamp.parse().unwrap_or_else(|_| Utc::now()),
    }
}

fn tool_call_to_pb(tool_call: ToolCall) -> pb::ToolCall {
    pb::ToolCall {
        tool_call_id: tool_call.tool_call_id,
        tool_name: tool_call.tool_name,
        arguments_json: serde_json::to_string(&tool_call.arguments).unwrap_or_default(),
        result_json: tool_call
            .result
            .map(|r| serde_json::to_string(&r).unwrap_or_default())
            .unwrap_or_default(),
        timestamp: tool_call.timestamp.to_rfc3339(),
    }
}

fn tool_call_from_pb(tool_call: pb::ToolCall) -> ToolCall {
    ToolCall {
        tool_call_id: tool_call.tool_call_id,
        tool_name: tool_call.tool_name,
        arguments: serde_json::from_str(&tool_call.arguments_json).unwrap_or(serde_json::Value::Null),
        result: (!tool_call.result_json.is_empty())
            .then(|| serde_json::from_str(&tool_call.result_json).unwrap_or(serde_json::Value::Null)),
        timestamp: tool_call.timestamp.parse().unwrap_or_else(|_| Utc::now()),
    }
}

fn skill_version_to_pb(version: SkillVersion) -> pb::SkillVersion {
    pb::SkillVersion {
        content_hash: version.content_hash,
        size_bytes: version.size_bytes,
        pushed_at: version.pushed_at.to_rfc3339(),
    }
}

fn skill_version_from_pb(version: pb::SkillVersion) -> SkillVersion {
    SkillVersion {
        content_hash: version.content_hash,
        size_bytes: version.size_bytes,
        pushed_at: version.pushed_at.parse().unwrap_or_else(|_| Utc::now()),
    }
}

impl StorageCodec for Agent {
    type Proto = pb::Agent;

    fn to_storage_proto(&self) -> Self::Proto {
        pb::Agent {
            metadata: Some(metadata_to_pb(&self.metadata)),
            spec_json: to_json(&self.spec),
            status_json: to_json(&self.status),
        }
    }

    fn from_storage_proto(proto: Self::Proto) -> Result<Self> {
        Ok(Agent {
            kind: "Agent".to_string(),
            api_version: "stigmer/v1".to_string(),
            metadata: metadata_from_pb(proto.metadata),
            spec: parse_json::<AgentSpec>("spec_json", &proto.spec_json)?,
            status: parse_json::<AgentStatus>("status_json", &proto.status_json)?,
        })
    }
}

impl StorageCodec for AgentInstance {
    type Proto = pb::AgentInstance;

    fn to_storage_proto(&self) -> Self::Proto {
        pb::AgentInstance {
            metadata: Some(metadata_to_pb(&self.metadata)),
            agent_id: self.spec.agent_id.clone(),
            resolved_env: self.spec.resolved_env.clone(),
            resolved_instructions: self.spec.resolved_instructions.clone(),
            ready: self.status.ready,
        }
    }

    fn from_storage_proto(proto: Self::Proto) -> Result<Self> {
        Ok(AgentInstance {
            kind: "AgentInstance".to_string(),
            api_version: "stigmer/v1".to_string(),
            metadata: metadata_from_pb(proto.metadata),
            spec: AgentInstanceSpec {
                agent_id: proto.agent_id,
                resolved_env: proto.resolved_env,
                resolved_instructions: proto.resolved_instructions,
            },
            status: AgentInstanceStatus { ready: proto.ready },
        })
    }
}

impl StorageCodec for Session {
    type Proto = pb::Session;

    fn to_storage_proto(&self) -> Self::Proto {
        pb::Session {
            metadata: Some(metadata_to_pb(&self.metadata)),
            agent_instance_id: self.spec.agent_instance_id.clone(),
            execution_count: self.status.execution_count,
        }
    }

    fn from_storage_proto(proto: Self::Proto) -> Result<Self> {
        Ok(Session {
            kind: "Session".to_string(),
            api_version: "stigmer/v1".to_string(),
            metadata: metadata_from_pb(proto.metadata),
            spec: SessionSpec {
                agent_instance_id: proto.agent_instance_id,
            },
            status: SessionStatus {
                execution_count: proto.execution_count,
            },
        })
    }
}

impl StorageCodec for AgentExecution {
    type Proto = pb::AgentExecution;

    fn to_storage_proto(&self) -> Self::Proto {
        pb::AgentExecution {
            metadata: Some(metadata_to_pb(&self.metadata)),
            session_id: self.spec.session_id.clone(),
            agent_id: self.spec.agent_id.clone(),
            input_message: self.spec.input_message.clone(),
            phase: phase_to_pb(self.status.phase),
            messages: self.status.messages.clone().into_iter().map(message_to_pb).collect(),
            tool_calls: self.status.tool_calls.clone().into_iter().map(tool_call_to_pb).collect(),
            error_message: self.status.error_message.clone().unwrap_or_default(),
            resolved_session_id: self.status.session_id.clone(),
            agent_instance_id: self.status.agent_instance_id.clone(),
        }
    }

    fn from_storage_proto(proto: Self::Proto) -> Result<Self> {
        Ok(AgentExecution {
            kind: "AgentExecution".to_string(),
            api_version: "stigmer/v1".to_string(),
            metadata: metadata_from_pb(proto.metadata),
            spec: AgentExecutionSpec {
                session_id: proto.session_id,
                agent_id: proto.agent_id,
                input_message: proto.input_message,
            },
            status: AgentExecutionStatus {
                phase: phase_from_pb(proto.phase),
                messages: proto.messages.into_iter().map(message_from_pb).collect(),
                tool_calls: proto.tool_calls.into_iter().map(tool_call_from_pb).collect(),
                error_message: (!proto.error_message.is_empty()).then_some(proto.error_message),
                session_id: proto.resolved_session_id,
                agent_instance_id: proto.agent_instance_id,
            },
        })
    }
}

impl StorageCodec for Environment {
    type Proto = pb::Environment;

    fn to_storage_proto(&self) -> Self::Proto {
        pb::Environment {
            metadata: Some(metadata_to_pb(&self.metadata)),
            variables: self
                .spec
                .variables
                .iter()
                .map(|(k, v)| {
                    (
                        k.clone(),
                        pb::EnvironmentValue {
                            value: v.value.clone(),
                            secret: v.secret,
                        },
                    )
                })
                .collect(),
        }
    }

    fn from_storage_proto(proto: Self::Proto) -> Result<Self> {
        Ok(Environment {
            kind: "Environment".to_string(),
            api_version: "stigmer/v1".to_string(),
            metadata: metadata_from_pb(proto.metadata),
            spec: EnvironmentSpec {
                variables: proto
                    .variables
                    .into_iter()
                    .map(|(k, v)| {
                        (
                            k,
                            EnvironmentValue {
                                value: v.value,
                                secret: v.secret,
                            },
                        )
                    })
                    .collect(),
            },
            status: EnvironmentStatus {},
        })
    }
}

impl StorageCodec for Skill {
    type Proto = pb::Skill;

    fn to_storage_proto(&self) -> Self::Proto {
        pb::Skill {
            metadata: Some(metadata_to_pb(&self.metadata)),
            description: self.spec.description.clone(),
            current_version: self.status.current_version.clone().map(skill_version_to_pb),
            history: self.status.history.clone().into_iter().map(skill_version_to_pb).collect(),
        }
    }

    fn from_storage_proto(proto: Self::Proto) -> Result<Self> {
        Ok(Skill {
            kind: "Skill".to_string(),
            api_version: "stigmer/v1".to_string(),
            metadata: metadata_from_pb(proto.metadata),
            spec: SkillSpec {
                description: proto.description,
            },
            status: SkillStatus {
                current_version: proto.current_version.map(skill_version_from_pb),
                history: proto.history.into_iter().map(skill_version_from_pb).collect(),
            },
        })
    }
}

impl StorageCodec for Workflow {
    type Proto = pb::Workflow;

    fn to_storage_proto(&self) -> Self::Proto {
        pb::Workflow {
            metadata: Some(metadata_to_pb(&self.metadata)),
            namespace: self.spec.namespace.clone(),
            tasks_json: to_json(&self.spec.tasks),
            default_instance_id: self.status.default_instance_id.clone(),
            validated: self.status.validated,
        }
    }

    fn from_storage_proto(proto: Self::Proto) -> Result<Self> {
        Ok(Workflow {
            kind: "Workflow".to_string(),
            api_version: "stigmer/v1".to_string(),
            metadata: metadata_from_pb(proto.metadata),
            spec: WorkflowSpec {
                namespace: proto.namespace,
                tasks: parse_json::<Vec<Task>>("tasks_json", &proto.tasks_json)?,
            },
            status: WorkflowStatus {
                default_instance_id: proto.default_instance_id,
                validated: proto.validated,
            },
        })
    }
}

impl StorageCodec for WorkflowInstance {
    type Proto = pb::WorkflowInstance;

    fn to_storage_proto(&self) -> Self::Proto {
        pb::WorkflowInstance {
            metadata: Some(metadata_to_pb(&self.metadata)),
            workflow_id: self.spec.workflow_id.clone(),
            resolved_variables_json: to_json(&self.spec.resolved_variables),
            ready: self.status.ready,
        }
    }

    fn from_storage_proto(proto: Self::Proto) -> Result<Self> {
        Ok(WorkflowInstance {
            kind: "WorkflowInstance".to_string(),
            api_version: "stigmer/v1".to_string(),
            metadata: metadata_from_pb(proto.metadata),
            spec: WorkflowInstanceSpec {
                workflow_id: proto.workflow_id,
                resolved_variables: parse_json("resolved_variables_json", &proto.resolved_variables_json)?,
            },
            status: WorkflowInstanceStatus { ready: proto.ready },
        })
    }
}

impl StorageCodec for WorkflowExecution {
    type Proto = pb::WorkflowExecution;

    fn to_storage_proto(&self) -> Self::Proto {
        pb::WorkflowExecution {
            metadata: Some(metadata_to_pb(&self.metadata)),
            workflow_instance_id: self.spec.workflow_instance_id.clone(),
            input_json: to_json(&self.spec.input),
            phase: phase_to_pb(self.status.phase),
            task_results: self
                .status
                .task_results
                .clone()
                .into_iter()
                .map(task_result_to_pb)
                .collect(),
            error_message: self.status.error_message.clone().unwrap_or_default(),
        }
    }

    fn from_storage_proto(proto: Self::Proto) -> Result<Self> {
        Ok(WorkflowExecution {
            kind: "WorkflowExecution".to_string(),
            api_version: "stigmer/v1".to_string(),
            metadata: metadata_from_pb(proto.metadata),
            spec: WorkflowExecutionSpec {
                workflow_instance_id: proto.workflow_instance_id,
                input: parse_json("input_json", &proto.input_json)?,
            },
            status: WorkflowExecutionStatus {
                phase: phase_from_pb(proto.phase),
                task_results: proto.task_results.into_iter().map(task_result_from_pb).collect(),
                error_message: (!proto.error_message.is_empty()).then_some(proto.error_message),
            },
        })
    }
}

fn task_result_to_pb(result: TaskResult) -> pb::TaskResult {
    pb::TaskResult {
        task_name: result.task_name,
        output_json: serde_json::to_string(&result.output).unwrap_or_default(),
        timestamp: result.timestamp.to_rfc3339(),
    }
}

fn task_result_from_pb(result: pb::TaskResult) -> TaskResult {
    TaskResult {
        task_name: result.task_name,
        output: serde_json::from_str(&result.output_json).unwrap_or(serde_json::Value::Null),
        timestamp: result.timestamp.parse().unwrap_or_else(|_| Utc::now()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::envelope::Metadata;

    #[test]
    fn agent_round_trips_through_its_storage_proto() {
        let agent = Agent {
            kind: "Agent".to_string(),
            api_version: "stigmer/v1".to_string(),
            metadata: Metadata::new("Reviewer"),
            spec: AgentSpec {
                instructions: "Review pull requests".to_string(),
                skills: vec!["lint".to_string()],
                mcp_servers: vec![],
                subagents: vec![],
                env: Default::default(),
            },
            status: AgentStatus {
                default_instance_id: "agentinstance-1".to_string(),
            },
        };
        let bytes = crate::storage::codec::encode(&agent);
        let decoded: Agent = crate::storage::codec::decode(&bytes).unwrap();
        assert_eq!(decoded.metadata.name, "Reviewer");
        assert_eq!(decoded.spec.instructions, "Review pull requests");
        assert_eq!(decoded.status.default_instance_id, "agentinstance-1");
    }

    #[test]
    fn agent_execution_messages_and_tool_calls_round_trip() {
        let mut execution = AgentExecution {
            kind: "AgentExecution".to_string(),
            api_version: "stigmer/v1".to_string(),
            metadata: Metadata::new("exec"),
            spec: AgentExecutionSpec {
                session_id: "session-1".to_string(),
                agent_id: "agent-1".to_string(),
                input_message: "hi".to_string(),
            },
            status: AgentExecutionStatus::default(),
        };
        execution
            .status
            .merge(crate::models::agent_execution::AgentExecutionStatusUpdate {
                phase: Some(ExecutionPhase::Running),
                messages: vec![Message {
                    role: MessageRole::User,
                    content: "hi".to_string(),
                    timestamp: Utc::now(),
                }],
                tool_calls: vec![ToolCall {
                    tool_call_id: "tc-1".to_string(),
                    tool_name: "search".to_string(),
                    arguments: serde_json::json!({"q": "rust"}),
                    result: None,
                    timestamp: Utc::now(),
                }],
                error_message: None,
                session_id: None,
                agent_instance_id: None,
            })
            .unwrap();

        let bytes = crate::storage::codec::encode(&execution);
        let decoded: AgentExecution = crate::storage::codec::decode(&bytes).unwrap();
        assert_eq!(decoded.status.phase, ExecutionPhase::Running);
        assert_eq!(decoded.status.messages.len(), 1);
        assert_eq!(decoded.status.tool_calls[0].tool_call_id, "tc-1");
    }

    #[test]
    fn workflow_tasks_round_trip_through_the_json_sidecar() {
        let workflow = Workflow {
            kind: "Workflow".to_string(),
            api_version: "stigmer/v1".to_string(),
            metadata: Metadata::new("nightly-sync"),
            spec: WorkflowSpec {
                namespace: "ops".to_string(),
                tasks: vec![Task {
                    name: "notify".to_string(),
                    kind: crate::models::workflow::TaskKind::Wait(crate::models::workflow::WaitTask {
                        duration_seconds: 5,
                    }),
                }],
            },
            status: WorkflowStatus::default(),
        };
        let bytes = crate::storage::codec::encode(&workflow);
        let decoded: Workflow = crate::storage::codec::decode(&bytes).unwrap();
        assert_eq!(decoded.spec.tasks.len(), 1);
        assert_eq!(decoded.spec.tasks[0].name, "notify");
    }

    #[test]
    fn skill_history_round_trips_through_its_storage_proto() {
        let mut status = SkillStatus::default();
        status.push(SkillVersion {
            content_hash: "abc".to_string(),
            size_bytes: 10,
            pushed_at: Utc::now(),
        });
        status.push(SkillVersion {
            content_hash: "def".to_string(),
            size_bytes: 20,
            pushed_at: Utc::now(),
        });
        let skill = Skill {
            kind: "Skill".to_string(),
            api_version: "stigmer/v1".to_string(),
            metadata: Metadata::new("demo-skill"),
            spec: SkillSpec {
                description: "demo".to_string(),
            },
            status,
        };
        let bytes = crate::storage::codec::encode(&skill);
        let decoded: Skill = crate::storage::codec::decode(&bytes).unwrap();
        assert_eq!(decoded.status.history.len(), 1);
        assert_eq!(decoded.status.current_version.unwrap().content_hash, "def");
    }
}
