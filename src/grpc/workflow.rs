//! Thin gRPC service wrapping `WorkflowController` (spec §6).

use std::sync::Arc;

use tonic::{Request, Response, Status};

use crate::controllers::workflow::WorkflowController;
use crate::grpc::convert::{list_scope_from_pb, metadata_from_pb, metadata_to_pb, parse_json, reference_from_pb, to_json};
use crate::grpc::pb;
use crate::models::workflow::Task;
use crate::models::{Workflow, WorkflowSpec, WorkflowStatus};

pub struct WorkflowCommandService {
    pub controller: Arc<WorkflowController>,
}

pub struct WorkflowQueryService {
    pub controller: Arc<WorkflowController>,
}

fn domain_to_pb(workflow: Workflow) -> pb::Workflow {
    pb::Workflow {
        metadata: Some(metadata_to_pb(&workflow.metadata)),
        namespace: workflow.spec.namespace,
        tasks_json: to_json(&workflow.spec.tasks),
        default_instance_id: workflow.status.default_instance_id,
        validated: workflow.status.validated,
    }
}

fn tasks_from_json(raw: &str) -> Result<Vec<Task>, Status> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    parse_json("tasks_json", raw)
}

#[tonic::async_trait]
impl pb::workflow_command_controller_server::WorkflowCommandController for WorkflowCommandService {
    async fn create(&self, request: Request<pb::CreateWorkflowRequest>) -> Result<Response<pb::Workflow>, Status> {
        let request = request.into_inner();
        let workflow = Workflow {
            kind: String::new(),
            api_version: String::new(),
            metadata: metadata_from_pb(request.metadata),
            spec: WorkflowSpec {
                namespace: request.namespace,
                tasks: tasks_from_json(&request.tasks_json)?,
            },
            status: WorkflowStatus::default(),
        };
        let created = self.controller.create(workflow).await?;
        Ok(Response::new(domain_to_pb(created)))
    }

    async fn update(&self, request: Request<pb::UpdateWorkflowRequest>) -> Result<Response<pb::Workflow>, Status> {
        let request = request.into_inner();
        let workflow = Workflow {
            kind: String::new(),
            api_version: String::new(),
            metadata: metadata_from_pb(request.metadata),
            spec: WorkflowSpec {
                namespace: request.namespace,
                tasks: tasks_from_json(&request.tasks_json)?,
            },
            status: WorkflowStatus::default(),
        };
        let updated = self.controller.update(workflow).await?;
        Ok(Response::new(domain_to_pb(updated)))
    }

    async fn apply(&self, request: Request<pb::ApplyWorkflowRequest>) -> Result<Response<pb::Workflow>, Status> {
        let request = request.into_inner();
        let workflow = Workflow {
            kind: String::new(),
            api_version: String::new(),
            metadata: metadata_from_pb(request.metadata),
            spec: WorkflowSpec {
                namespace: request.namespace,
                tasks: tasks_from_json(&request.tasks_json)?,
            },
            status: WorkflowStatus::default(),
        };
        let applied = self.controller.apply(workflow).await?;
        Ok(Response::new(domain_to_pb(applied)))
    }

    async fn delete(&self, request: Request<pb::ResourceRef>) -> Result<Response<pb::Workflow>, Status> {
        let reference = reference_from_pb(request.into_inner());
        let deleted = self.controller.delete(reference).await?;
        Ok(Response::new(domain_to_pb(deleted)))
    }
}

#[tonic::async_trait]
impl pb::workflow_query_controller_server::WorkflowQueryController for WorkflowQueryService {
    async fn get(&self, request: Request<pb::ResourceRef>) -> Result<Response<pb::Workflow>, Status> {
        let reference = reference_from_pb(request.into_inner());
        let workflow = self.controller.get(reference).await?;
        Ok(Response::new(domain_to_pb(workflow)))
    }

    async fn get_by_reference(&self, request: Request<pb::ResourceRef>) -> Result<Response<pb::Workflow>, Status> {
        let reference = reference_from_pb(request.into_inner());
        let workflow = self.controller.get(reference).await?;
        Ok(Response::new(domain_to_pb(workflow)))
    }

    async fn list(
        &self,
        request: Request<pb::ListWorkflowsRequest>,
    ) -> Result<Response<pb::ListWorkflowsResponse>, Status> {
        let scope = list_scope_from_pb(request.into_inner().list);
        let workflows = self.controller.list(scope).await?;
        Ok(Response::new(pb::ListWorkflowsResponse {
            workflows: workflows.into_iter().map(domain_to_pb).collect(),
        }))
    }
}
