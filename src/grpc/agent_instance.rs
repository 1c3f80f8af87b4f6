//! Thin gRPC service wrapping `AgentInstanceController` (spec §6).

use std::sync::Arc;

use tonic::{Request, Response, Status};

use crate::controllers::agent_instance::AgentInstanceController;
use crate::grpc::convert::{list_scope_from_pb, metadata_from_pb, metadata_to_pb, reference_from_pb};
use crate::grpc::pb;
use crate::models::{AgentInstance, AgentInstanceSpec, AgentInstanceStatus};

pub struct AgentInstanceCommandService {
    pub controller: Arc<AgentInstanceController>,
}

pub struct AgentInstanceQueryService {
    pub controller: Arc<AgentInstanceController>,
}

fn domain_to_pb(instance: AgentInstance) -> pb::AgentInstance {
    pb::AgentInstance {
        metadata: Some(metadata_to_pb(&instance.metadata)),
        agent_id: instance.spec.agent_id,
        resolved_env: instance.spec.resolved_env,
        resolved_instructions: instance.spec.resolved_instructions,
        ready: instance.status.ready,
    }
}

fn domain_from_create(request: pb::CreateAgentInstanceRequest) -> AgentInstance {
    AgentInstance {
        kind: String::new(),
        api_version: String::new(),
        metadata: metadata_from_pb(request.metadata),
        spec: AgentInstanceSpec {
            agent_id: request.agent_id,
            resolved_env: request.resolved_env,
            resolved_instructions: request.resolved_instructions,
        },
        status: AgentInstanceStatus::default(),
    }
}

#[tonic::async_trait]
impl pb::agent_instance_command_controller_server::AgentInstanceCommandController for AgentInstanceCommandService {
    async fn create(
        &self,
        request: Request<pb::CreateAgentInstanceRequest>,
    ) -> Result<Response<pb::AgentInstance>, Status> {
        let instance = domain_from_create(request.into_inner());
        let created = self.controller.create(instance).await?;
        Ok(Response::new(domain_to_pb(created)))
    }

    async fn delete(&self, request: Request<pb::ResourceRef>) -> Result<Response<pb::AgentInstance>, Status> {
        let reference = reference_from_pb(request.into_inner());
        let deleted = self.controller.delete(reference).await?;
        Ok(Response::new(domain_to_pb(deleted)))
    }
}

#[tonic::async_trait]
impl pb::agent_instance_query_controller_server::AgentInstanceQueryController for AgentInstanceQueryService {
    async fn get(&self, request: Request<pb::ResourceRef>) -> Result<Response<pb::AgentInstance>, Status> {
        let reference = reference_from_pb(request.into_inner());
        let instance = self.controller.get(reference).await?;
        Ok(Response::new(domain_to_pb(instance)))
    }

    async fn get_by_reference(&self, request: Request<pb::ResourceRef>) -> Result<Response<pb::AgentInstance>, Status> {
        let reference = reference_from_pb(request.into_inner());
        let instance = self.controller.get(reference).await?;
        Ok(Response::new(domain_to_pb(instance)))
    }

    async fn list(
        &self,
        request: Request<pb::ListAgentInstancesRequest>,
    ) -> Result<Response<pb::ListAgentInstancesResponse>, Status> {
        let scope = list_scope_from_pb(request.into_inner().list);
        let instances = self.controller.list(scope).await?;
        Ok(Response::new(pb::ListAgentInstancesResponse {
            agent_instances: instances.into_iter().map(domain_to_pb).collect(),
        }))
    }
}
