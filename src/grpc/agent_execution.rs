//! Thin gRPC service wrapping `AgentExecutionController` (spec §6, §4.4):
//! `Subscribe` drains the controller's `StreamBroker` subscription into a
//! tonic server-streaming response, closing the stream once the execution
//! reaches a terminal phase or the broker channel is closed.

use std::sync::Arc;

use chrono::Utc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};

use crate::controllers::agent_execution::AgentExecutionController;
use crate::grpc::convert::{list_scope_from_pb, metadata_from_pb, metadata_to_pb, reference_from_pb};
use crate::grpc::pb;
use crate::models::agent_execution::{AgentExecutionStatusUpdate, ExecutionPhase, Message, MessageRole, ToolCall};
use crate::models::{AgentExecution, AgentExecutionSpec, AgentExecutionStatus};

pub struct AgentExecutionCommandService {
    pub controller: Arc<AgentExecutionController>,
}

pub struct AgentExecutionQueryService {
    pub controller: Arc<AgentExecutionController>,
}

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

fn domain_to_pb(execution: AgentExecution) -> pb::AgentExecution {
    pb::AgentExecution {
        metadata: Some(metadata_to_pb(&execution.metadata)),
        session_id: execution.spec.session_id,
        agent_id: execution.spec.agent_id,
        input_message: execution.spec.input_message,
        phase: phase_to_pb(execution.status.phase),
        messages: execution.status.messages.into_iter().map(message_to_pb).collect(),
        tool_calls: execution.status.tool_calls.into_iter().map(tool_call_to_pb).collect(),
        error_message: execution.status.error_message.unwrap_or_default(),
        resolved_session_id: execution.status.session_id,
        agent_instance_id: execution.status.agent_instance_id,
    }
}

#[tonic::async_trait]
impl pb::agent_execution_command_controller_server::AgentExecutionCommandController for AgentExecutionCommandService {
    async fn create(
        &self,
        request: Request<pb::CreateAgentExecutionRequest>,
    ) -> Result<Response<pb::AgentExecution>, Status> {
        let request = request.into_inner();
        let execution = AgentExecution {
            kind: String::new(),
            api_version: String::new(),
            metadata: metadata_from_pb(request.metadata),
            spec: AgentExecutionSpec {
                session_id: request.session_id,
                agent_id: request.agent_id,
                input_message: request.input_message,
            },
            status: AgentExecutionStatus::default(),
        };
        let created = self.controller.create(execution).await?;
        Ok(Response::new(domain_to_pb(created)))
    }

    async fn update_status(
        &self,
        request: Request<pb::UpdateAgentExecutionStatusRequest>,
    ) -> Result<Response<pb::AgentExecution>, Status> {
        let request = request.into_inner();
        let update = AgentExecutionStatusUpdate {
            phase: request.phase.map(phase_from_pb),
            messages: request.messages.into_iter().map(message_from_pb).collect(),
            tool_calls: request.tool_calls.into_iter().map(tool_call_from_pb).collect(),
            error_message: request.error_message,
            session_id: request.session_id,
            agent_instance_id: request.agent_instance_id,
        };
        let updated = self.controller.update_status(&request.execution_id, update).await?;
        Ok(Response::new(domain_to_pb(updated)))
    }
}

#[tonic::async_trait]
impl pb::agent_execution_query_controller_server::AgentExecutionQueryController for AgentExecutionQueryService {
    async fn get(&self, request: Request<pb::ResourceRef>) -> Result<Response<pb::AgentExecution>, Status> {
        let reference = reference_from_pb(request.into_inner());
        let execution = self.controller.get(reference).await?;
        Ok(Response::new(domain_to_pb(execution)))
    }

    async fn list(
        &self,
        request: Request<pb::ListAgentExecutionsRequest>,
    ) -> Result<Response<pb::ListAgentExecutionsResponse>, Status> {
        let scope = list_scope_from_pb(request.into_inner().list);
        let executions = self.controller.list(scope).await?;
        Ok(Response::new(pb::ListAgentExecutionsResponse {
            agent_executions: executions.into_iter().map(domain_to_pb).collect(),
        }))
    }

    type SubscribeStream = ReceiverStream<Result<pb::AgentExecution, Status>>;

    async fn subscribe(
        &self,
        request: Request<pb::SubscribeAgentExecutionRequest>,
    ) -> Result<Response<Self::SubscribeStream>, Status> {
        let execution_id = request.into_inner().execution_id;
        let snapshot = self
            .controller
            .get(crate::models::envelope::ResourceRef {
                id: execution_id.clone(),
                slug: String::new(),
                scope: Default::default(),
            })
            .await?;

        let mut subscription = self.controller.subscribe(&execution_id);
        let (tx, rx) = tokio::sync::mpsc::channel(16);

        tokio::spawn(async move {
            if tx.send(Ok(domain_to_pb(snapshot))).await.is_err() {
                return;
            }
            while let Some(update) = subscription.recv().await {
                if tx.send(Ok(domain_to_pb(update))).await.is_err() {
                    break;
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}
