//! Thin gRPC service wrapping `WorkflowExecutionController` (spec §6,
//! §4.4), mirroring `AgentExecutionCommandService`/`AgentExecutionQueryService`.

use std::sync::Arc;

use chrono::Utc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};

use crate::controllers::workflow_execution::WorkflowExecutionController;
use crate::grpc::convert::{list_scope_from_pb, metadata_from_pb, metadata_to_pb, reference_from_pb};
use crate::grpc::pb;
use crate::models::workflow_execution::{TaskResult, WorkflowExecutionStatusUpdate};
use crate::models::{WorkflowExecution, WorkflowExecutionSpec, WorkflowExecutionStatus};

pub struct WorkflowExecutionCommandService {
    pub controller: Arc<WorkflowExecutionController>,
}

pub struct WorkflowExecutionQueryService {
    pub controller: Arc<WorkflowExecutionController>,
}

fn phase_to_pb(phase: crate::models::agent_execution::ExecutionPhase) -> i32 {
    use crate::models::agent_execution::ExecutionPhase;
    match phase {
        ExecutionPhase::Pending => pb::ExecutionPhase::Pending as i32,
        ExecutionPhase::Running => pb::ExecutionPhase::Running as i32,
        ExecutionPhase::Completed => pb::ExecutionPhase::Completed as i32,
        ExecutionPhase::Failed => pb::ExecutionPhase::Failed as i32,
        ExecutionPhase::Cancelled => pb::ExecutionPhase::Cancelled as i32,
    }
}

fn phase_from_pb(phase: i32) -> crate::models::agent_execution::ExecutionPhase {
    use crate::models::agent_execution::ExecutionPhase;
    match pb::ExecutionPhase::try_from(phase).unwrap_or(pb::ExecutionPhase::Pending) {
        pb::ExecutionPhase::Pending => ExecutionPhase::Pending,
        pb::ExecutionPhase::Running => ExecutionPhase::Running,
        pb::ExecutionPhase::Completed => ExecutionPhase::Completed,
        pb::ExecutionPhase::Failed => ExecutionPhase::Failed,
        pb::ExecutionPhase::Cancelled => ExecutionPhase::Cancelled,
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

fn domain_to_pb(execution: WorkflowExecution) -> pb::WorkflowExecution {
    pb::WorkflowExecution {
        metadata: Some(metadata_to_pb(&execution.metadata)),
        workflow_instance_id: execution.spec.workflow_instance_id,
        input_json: serde_json::to_string(&execution.spec.input).unwrap_or_default(),
        phase: phase_to_pb(execution.status.phase),
        task_results: execution.status.task_results.into_iter().map(task_result_to_pb).collect(),
        error_message: execution.status.error_message.unwrap_or_default(),
    }
}

#[tonic::async_trait]
impl pb::workflow_execution_command_controller_server::WorkflowExecutionCommandController
    for WorkflowExecutionCommandService
{
    async fn create(
        &self,
        request: Request<pb::CreateWorkflowExecutionRequest>,
    ) -> Result<Response<pb::WorkflowExecution>, Status> {
        let request = request.into_inner();
        let input = if request.input_json.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&request.input_json)
                .map_err(|err| Status::invalid_argument(format!("input_json: {err}")))?
        };
        let execution = WorkflowExecution {
            kind: String::new(),
            api_version: String::new(),
            metadata: metadata_from_pb(request.metadata),
            spec: WorkflowExecutionSpec {
                workflow_instance_id: request.workflow_instance_id,
                input,
            },
            status: WorkflowExecutionStatus::default(),
        };
        let created = self.controller.create(execution).await?;
        Ok(Response::new(domain_to_pb(created)))
    }

    async fn update_status(
        &self,
        request: Request<pb::UpdateWorkflowExecutionStatusRequest>,
    ) -> Result<Response<pb::WorkflowExecution>, Status> {
        let request = request.into_inner();
        let update = WorkflowExecutionStatusUpdate {
            phase: request.phase.map(phase_from_pb),
            task_results: request.task_results.into_iter().map(task_result_from_pb).collect(),
            error_message: request.error_message,
        };
        let updated = self.controller.update_status(&request.execution_id, update).await?;
        Ok(Response::new(domain_to_pb(updated)))
    }
}

#[tonic::async_trait]
impl pb::workflow_execution_query_controller_server::WorkflowExecutionQueryController
    for WorkflowExecutionQueryService
{
    async fn get(&self, request: Request<pb::ResourceRef>) -> Result<Response<pb::WorkflowExecution>, Status> {
        let reference = reference_from_pb(request.into_inner());
        let execution = self.controller.get(reference).await?;
        Ok(Response::new(domain_to_pb(execution)))
    }

    async fn list(
        &self,
        request: Request<pb::ListWorkflowExecutionsRequest>,
    ) -> Result<Response<pb::ListWorkflowExecutionsResponse>, Status> {
        let scope = list_scope_from_pb(request.into_inner().list);
        let executions = self.controller.list(scope).await?;
        Ok(Response::new(pb::ListWorkflowExecutionsResponse {
            workflow_executions: executions.into_iter().map(domain_to_pb).collect(),
        }))
    }

    type SubscribeStream = ReceiverStream<Result<pb::WorkflowExecution, Status>>;

    async fn subscribe(
        &self,
        request: Request<pb::SubscribeWorkflowExecutionRequest>,
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
