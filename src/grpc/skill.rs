//! Thin gRPC service wrapping `SkillController` (spec §6, §4.6). `Push` is
//! client-streaming (spec §6 "upload skill artifacts by streaming bytes on
//! `Push`"): the first message carries the header, every following message
//! a chunk of archive bytes.

use std::sync::Arc;

use tonic::{Request, Response, Status, Streaming};

use crate::controllers::skill::SkillController;
use crate::grpc::convert::{list_scope_from_pb, metadata_from_pb, metadata_to_pb, reference_from_pb};
use crate::grpc::pb;
use crate::models::skill::SkillVersion;
use crate::models::Skill;

pub struct SkillCommandService {
    pub controller: Arc<SkillController>,
}

pub struct SkillQueryService {
    pub controller: Arc<SkillController>,
}

fn version_to_pb(version: SkillVersion) -> pb::SkillVersion {
    pb::SkillVersion {
        content_hash: version.content_hash,
        size_bytes: version.size_bytes,
        pushed_at: version.pushed_at.to_rfc3339(),
    }
}

fn domain_to_pb(skill: Skill) -> pb::Skill {
    pb::Skill {
        metadata: Some(metadata_to_pb(&skill.metadata)),
        description: skill.spec.description,
        current_version: skill.status.current_version.map(version_to_pb),
        history: skill.status.history.into_iter().map(version_to_pb).collect(),
    }
}

#[tonic::async_trait]
impl pb::skill_command_controller_server::SkillCommandController for SkillCommandService {
    async fn push(&self, request: Request<Streaming<pb::PushSkillRequest>>) -> Result<Response<pb::Skill>, Status> {
        let mut stream = request.into_inner();

        let header = match stream.message().await? {
            Some(pb::PushSkillRequest {
                payload: Some(pb::push_skill_request::Payload::Header(header)),
            }) => header,
            Some(_) => return Err(Status::invalid_argument("Push: first message must be a header")),
            None => return Err(Status::invalid_argument("Push: empty stream")),
        };

        let mut archive_bytes = Vec::new();
        while let Some(message) = stream.message().await? {
            match message.payload {
                Some(pb::push_skill_request::Payload::Chunk(chunk)) => archive_bytes.extend_from_slice(&chunk),
                Some(pb::push_skill_request::Payload::Header(_)) => {
                    return Err(Status::invalid_argument("Push: header must be the first message only"))
                }
                None => {}
            }
        }

        let metadata = metadata_from_pb(header.metadata);
        let skill = self
            .controller
            .push(metadata, header.description, &archive_bytes)
            .await?;
        Ok(Response::new(domain_to_pb(skill)))
    }

    async fn delete(&self, request: Request<pb::ResourceRef>) -> Result<Response<pb::Skill>, Status> {
        let reference = reference_from_pb(request.into_inner());
        let deleted = self.controller.delete(reference).await?;
        Ok(Response::new(domain_to_pb(deleted)))
    }
}

#[tonic::async_trait]
impl pb::skill_query_controller_server::SkillQueryController for SkillQueryService {
    async fn get(&self, request: Request<pb::ResourceRef>) -> Result<Response<pb::Skill>, Status> {
        let reference = reference_from_pb(request.into_inner());
        let skill = self.controller.get(reference).await?;
        Ok(Response::new(domain_to_pb(skill)))
    }

    async fn get_by_reference(&self, request: Request<pb::ResourceRef>) -> Result<Response<pb::Skill>, Status> {
        let reference = reference_from_pb(request.into_inner());
        let skill = self.controller.get(reference).await?;
        Ok(Response::new(domain_to_pb(skill)))
    }

    async fn list(&self, request: Request<pb::ListSkillsRequest>) -> Result<Response<pb::ListSkillsResponse>, Status> {
        let scope = list_scope_from_pb(request.into_inner().list);
        let skills = self.controller.list(scope).await?;
        Ok(Response::new(pb::ListSkillsResponse {
            skills: skills.into_iter().map(domain_to_pb).collect(),
        }))
    }
}
