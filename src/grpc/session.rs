//! Thin gRPC service wrapping `SessionController` (spec §6).

use std::sync::Arc;

use tonic::{Request, Response, Status};

use crate::controllers::session::SessionController;
use crate::grpc::convert::{list_scope_from_pb, metadata_from_pb, metadata_to_pb, reference_from_pb};
use crate::grpc::pb;
use crate::models::{Session, SessionSpec, SessionStatus};

pub struct SessionCommandService {
    pub controller: Arc<SessionController>,
}

pub struct SessionQueryService {
    pub controller: Arc<SessionController>,
}

fn domain_to_pb(session: Session) -> pb::Session {
    pb::Session {
        metadata: Some(metadata_to_pb(&session.metadata)),
        agent_instance_id: session.spec.agent_instance_id,
        execution_count: session.status.execution_count,
    }
}

fn domain_from_create(request: pb::CreateSessionRequest) -> Session {
    Session {
        kind: String::new(),
        api_version: String::new(),
        metadata: metadata_from_pb(request.metadata),
        spec: SessionSpec {
            agent_instance_id: request.agent_instance_id,
        },
        status: SessionStatus::default(),
    }
}

#[tonic::async_trait]
impl pb::session_command_controller_server::SessionCommandController for SessionCommandService {
    async fn create(&self, request: Request<pb::CreateSessionRequest>) -> Result<Response<pb::Session>, Status> {
        let session = domain_from_create(request.into_inner());
        let created = self.controller.create(session).await?;
        Ok(Response::new(domain_to_pb(created)))
    }

    async fn delete(&self, request: Request<pb::ResourceRef>) -> Result<Response<pb::Session>, Status> {
        let reference = reference_from_pb(request.into_inner());
        let deleted = self.controller.delete(reference).await?;
        Ok(Response::new(domain_to_pb(deleted)))
    }
}

#[tonic::async_trait]
impl pb::session_query_controller_server::SessionQueryController for SessionQueryService {
    async fn get(&self, request: Request<pb::ResourceRef>) -> Result<Response<pb::Session>, Status> {
        let reference = reference_from_pb(request.into_inner());
        let session = self.controller.get(reference).await?;
        Ok(Response::new(domain_to_pb(session)))
    }

    async fn get_by_reference(&self, request: Request<pb::ResourceRef>) -> Result<Response<pb::Session>, Status> {
        let reference = reference_from_pb(request.into_inner());
        let session = self.controller.get(reference).await?;
        Ok(Response::new(domain_to_pb(session)))
    }

    async fn list(
        &self,
        request: Request<pb::ListSessionsRequest>,
    ) -> Result<Response<pb::ListSessionsResponse>, Status> {
        let scope = list_scope_from_pb(request.into_inner().list);
        let sessions = self.controller.list(scope).await?;
        Ok(Response::new(pb::ListSessionsResponse {
            sessions: sessions.into_iter().map(domain_to_pb).collect(),
        }))
    }
}
