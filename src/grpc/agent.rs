//! Thin gRPC service wrapping `AgentController` (spec §6). Generalizes the
//! teacher's `src/api/agents/http_handlers.rs` thin-handler pattern
//! (translate the wire request into a domain struct, call the engine,
//! translate the domain struct back) to tonic's generated service traits.

use std::sync::Arc;

use tonic::{Request, Response, Status};

use crate::controllers::agent::AgentController;
use crate::grpc::convert::{list_scope_from_pb, metadata_from_pb, metadata_to_pb, parse_json, reference_from_pb, to_json};
use crate::grpc::pb;
use crate::models::{Agent, AgentSpec, AgentStatus};

pub struct AgentCommandService {
    pub controller: Arc<AgentController>,
}

pub struct AgentQueryService {
    pub controller: Arc<AgentController>,
}

fn domain_to_pb(agent: Agent) -> pb::Agent {
    pb::Agent {
        metadata: Some(metadata_to_pb(&agent.metadata)),
        spec_json: to_json(&agent.spec),
        status_json: to_json(&agent.status),
    }
}

fn domain_from_create(request: pb::CreateAgentRequest) -> Result<Agent, Status> {
    let spec: AgentSpec = parse_json("spec_json", &request.spec_json)?;
    Ok(Agent {
        kind: String::new(),
        api_version: String::new(),
        metadata: metadata_from_pb(request.metadata),
        spec,
        status: AgentStatus::default(),
    })
}

fn domain_from_update(request: pb::UpdateAgentRequest) -> Result<Agent, Status> {
    let spec: AgentSpec = parse_json("spec_json", &request.spec_json)?;
    Ok(Agent {
        kind: String::new(),
        api_version: String::new(),
        metadata: metadata_from_pb(request.metadata),
        spec,
        status: AgentStatus::default(),
    })
}

fn domain_from_apply(request: pb::ApplyAgentRequest) -> Result<Agent, Status> {
    let spec: AgentSpec = parse_json("spec_json", &request.spec_json)?;
    Ok(Agent {
        kind: String::new(),
        api_version: String::new(),
        metadata: metadata_from_pb(request.metadata),
        spec,
        status: AgentStatus::default(),
    })
}

#[tonic::async_trait]
impl pb::agent_command_controller_server::AgentCommandController for AgentCommandService {
    async fn create(&self, request: Request<pb::CreateAgentRequest>) -> Result<Response<pb::Agent>, Status> {
        let agent = domain_from_create(request.into_inner())?;
        let created = self.controller.create(agent).await?;
        Ok(Response::new(domain_to_pb(created)))
    }

    async fn update(&self, request: Request<pb::UpdateAgentRequest>) -> Result<Response<pb::Agent>, Status> {
        let agent = domain_from_update(request.into_inner())?;
        let updated = self.controller.update(agent).await?;
        Ok(Response::new(domain_to_pb(updated)))
    }

    async fn apply(&self, request: Request<pb::ApplyAgentRequest>) -> Result<Response<pb::Agent>, Status> {
        let agent = domain_from_apply(request.into_inner())?;
        let applied = self.controller.apply(agent).await?;
        Ok(Response::new(domain_to_pb(applied)))
    }

    async fn delete(&self, request: Request<pb::ResourceRef>) -> Result<Response<pb::Agent>, Status> {
        let reference = reference_from_pb(request.into_inner());
        let deleted = self.controller.delete(reference).await?;
        Ok(Response::new(domain_to_pb(deleted)))
    }
}

#[tonic::async_trait]
impl pb::agent_query_controller_server::AgentQueryController for AgentQueryService {
    async fn get(&self, request: Request<pb::ResourceRef>) -> Result<Response<pb::Agent>, Status> {
        let reference = reference_from_pb(request.into_inner());
        let agent = self.controller.get(reference).await?;
        Ok(Response::new(domain_to_pb(agent)))
    }

    async fn get_by_reference(&self, request: Request<pb::ResourceRef>) -> Result<Response<pb::Agent>, Status> {
        let reference = reference_from_pb(request.into_inner());
        let agent = self.controller.get(reference).await?;
        Ok(Response::new(domain_to_pb(agent)))
    }

    async fn list(&self, request: Request<pb::ListAgentsRequest>) -> Result<Response<pb::ListAgentsResponse>, Status> {
        let scope = list_scope_from_pb(request.into_inner().list);
        let agents = self.controller.list(scope).await?;
        Ok(Response::new(pb::ListAgentsResponse {
            agents: agents.into_iter().map(domain_to_pb).collect(),
        }))
    }
}
