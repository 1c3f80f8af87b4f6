//! Thin gRPC service wrapping `WorkflowInstanceController` (spec §6).

use std::sync::Arc;

use tonic::{Request, Response, Status};

use crate::controllers::workflow_instance::WorkflowInstanceController;
use crate::grpc::convert::{list_scope_from_pb, metadata_from_pb, metadata_to_pb, parse_json, reference_from_pb, to_json};
use crate::grpc::pb;
use crate::models::{WorkflowInstance, WorkflowInstanceSpec, WorkflowInstanceStatus};

pub struct WorkflowInstanceCommandService {
    pub controller: Arc<WorkflowInstanceController>,
}

pub struct WorkflowInstanceQueryService {
    pub controller: Arc<WorkflowInstanceController>,
}

fn domain_to_pb(instance: WorkflowInstance) -> pb::WorkflowInstance {
    pb::WorkflowInstance {
        metadata: Some(metadata_to_pb(&instance.metadata)),
        workflow_id: instance.spec.workflow_id,
        resolved_variables_json: to_json(&instance.spec.resolved_variables),
        ready: instance.status.ready,
    }
}

#[tonic::async_trait]
impl pb::workflow_instance_command_controller_server::WorkflowInstanceCommandController
    for WorkflowInstanceCommandService
{
    async fn create(
        &self,
        request: Request<pb::CreateWorkflowInstanceRequest>,
    ) -> Result<Response<pb::WorkflowInstance>, Status> {
        let request = request.into_inner();
        let resolved_variables = if request.resolved_variables_json.is_empty() {
            Default::default()
        } else {
            parse_json("resolved_variables_json", &request.resolved_variables_json)?
        };
        let instance = WorkflowInstance {
            kind: String::new(),
            api_version: String::new(),
            metadata: metadata_from_pb(request.metadata),
            spec: WorkflowInstanceSpec {
                workflow_id: request.workflow_id,
                resolved_variables,
            },
            status: WorkflowInstanceStatus::default(),
        };
        let created = self.controller.create(instance).await?;
        Ok(Response::new(domain_to_pb(created)))
    }

    async fn delete(&self, request: Request<pb::ResourceRef>) -> Result<Response<pb::WorkflowInstance>, Status> {
        let reference = reference_from_pb(request.into_inner());
        let deleted = self.controller.delete(reference).await?;
        Ok(Response::new(domain_to_pb(deleted)))
    }
}

#[tonic::async_trait]
impl pb::workflow_instance_query_controller_server::WorkflowInstanceQueryController for WorkflowInstanceQueryService {
    async fn get(&self, request: Request<pb::ResourceRef>) -> Result<Response<pb::WorkflowInstance>, Status> {
        let reference = reference_from_pb(request.into_inner());
        let instance = self.controller.get(reference).await?;
        Ok(Response::new(domain_to_pb(instance)))
    }

    async fn get_by_reference(
        &self,
        request: Request<pb::ResourceRef>,
    ) -> Result<Response<pb::WorkflowInstance>, Status> {
        let reference = reference_from_pb(request.into_inner());
        let instance = self.controller.get(reference).await?;
        Ok(Response::new(domain_to_pb(instance)))
    }

    async fn list(
        &self,
        request: Request<pb::ListWorkflowInstancesRequest>,
    ) -> Result<Response<pb::ListWorkflowInstancesResponse>, Status> {
        let scope = list_scope_from_pb(request.into_inner().list);
        let instances = self.controller.list(scope).await?;
        Ok(Response::new(pb::ListWorkflowInstancesResponse {
            workflow_instances: instances.into_iter().map(domain_to_pb).collect(),
        }))
    }
}
