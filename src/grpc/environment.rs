//! Thin gRPC service wrapping `EnvironmentController` (spec §6).

use std::collections::HashMap;
use std::sync::Arc;

use tonic::{Request, Response, Status};

use crate::controllers::environment::EnvironmentController;
use crate::grpc::convert::{list_scope_from_pb, metadata_from_pb, metadata_to_pb, reference_from_pb};
use crate::grpc::pb;
use crate::models::environment::EnvironmentValue as DomainEnvironmentValue;
use crate::models::{Environment, EnvironmentSpec, EnvironmentStatus};

pub struct EnvironmentCommandService {
    pub controller: Arc<EnvironmentController>,
}

pub struct EnvironmentQueryService {
    pub controller: Arc<EnvironmentController>,
}

fn value_to_pb(value: DomainEnvironmentValue) -> pb::EnvironmentValue {
    pb::EnvironmentValue {
        value: value.value,
        secret: value.secret,
    }
}

fn value_from_pb(value: pb::EnvironmentValue) -> DomainEnvironmentValue {
    DomainEnvironmentValue {
        value: value.value,
        secret: value.secret,
    }
}

fn variables_from_pb(variables: HashMap<String, pb::EnvironmentValue>) -> HashMap<String, DomainEnvironmentValue> {
    variables.into_iter().map(|(k, v)| (k, value_from_pb(v))).collect()
}

fn domain_to_pb(environment: Environment) -> pb::Environment {
    pb::Environment {
        metadata: Some(metadata_to_pb(&environment.metadata)),
        variables: environment
            .spec
            .variables
            .into_iter()
            .map(|(k, v)| (k, value_to_pb(v)))
            .collect(),
    }
}

#[tonic::async_trait]
impl pb::environment_command_controller_server::EnvironmentCommandController for EnvironmentCommandService {
    async fn create(
        &self,
        request: Request<pb::CreateEnvironmentRequest>,
    ) -> Result<Response<pb::Environment>, Status> {
        let request = request.into_inner();
        let environment = Environment {
            kind: String::new(),
            api_version: String::new(),
            metadata: metadata_from_pb(request.metadata),
            spec: EnvironmentSpec {
                variables: variables_from_pb(request.variables),
            },
            status: EnvironmentStatus::default(),
        };
        let created = self.controller.create(environment).await?;
        Ok(Response::new(domain_to_pb(created)))
    }

    async fn update(
        &self,
        request: Request<pb::UpdateEnvironmentRequest>,
    ) -> Result<Response<pb::Environment>, Status> {
        let request = request.into_inner();
        let environment = Environment {
            kind: String::new(),
            api_version: String::new(),
            metadata: metadata_from_pb(request.metadata),
            spec: EnvironmentSpec {
                variables: variables_from_pb(request.variables),
            },
            status: EnvironmentStatus::default(),
        };
        let updated = self.controller.update(environment).await?;
        Ok(Response::new(domain_to_pb(updated)))
    }

    async fn apply(&self, request: Request<pb::ApplyEnvironmentRequest>) -> Result<Response<pb::Environment>, Status> {
        let request = request.into_inner();
        let environment = Environment {
            kind: String::new(),
            api_version: String::new(),
            metadata: metadata_from_pb(request.metadata),
            spec: EnvironmentSpec {
                variables: variables_from_pb(request.variables),
            },
            status: EnvironmentStatus::default(),
        };
        let applied = self.controller.apply(environment).await?;
        Ok(Response::new(domain_to_pb(applied)))
    }

    async fn delete(&self, request: Request<pb::ResourceRef>) -> Result<Response<pb::Environment>, Status> {
        let reference = reference_from_pb(request.into_inner());
        let deleted = self.controller.delete(reference).await?;
        Ok(Response::new(domain_to_pb(deleted)))
    }
}

#[tonic::async_trait]
impl pb::environment_query_controller_server::EnvironmentQueryController for EnvironmentQueryService {
    async fn get(&self, request: Request<pb::ResourceRef>) -> Result<Response<pb::Environment>, Status> {
        let reference = reference_from_pb(request.into_inner());
        let environment = self.controller.get(reference).await?;
        Ok(Response::new(domain_to_pb(environment)))
    }

    async fn get_by_reference(&self, request: Request<pb::ResourceRef>) -> Result<Response<pb::Environment>, Status> {
        let reference = reference_from_pb(request.into_inner());
        let environment = self.controller.get(reference).await?;
        Ok(Response::new(domain_to_pb(environment)))
    }

    async fn list(
        &self,
        request: Request<pb::ListEnvironmentsRequest>,
    ) -> Result<Response<pb::ListEnvironmentsResponse>, Status> {
        let scope = list_scope_from_pb(request.into_inner().list);
        let environments = self.controller.list(scope).await?;
        Ok(Response::new(pb::ListEnvironmentsResponse {
            environments: environments.into_iter().map(domain_to_pb).collect(),
        }))
    }
}
