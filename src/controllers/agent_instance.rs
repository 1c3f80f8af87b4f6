//! AgentInstance controller (spec §4.2): bound, executable variant of an
//! Agent. Exposes direct CRUD plus the `AgentInstanceClient` in-process
//! call the `AgentController` uses to synthesize a default instance on
//! every Agent create (spec §4.2.1).

use std::sync::Arc;

use async_trait::async_trait;

use crate::controllers::downstream::AgentInstanceClient;
use crate::error::StigmerError;
use crate::models::agent_instance::default_instance_name;
use crate::models::envelope::{HasMetadata, ResourceRef, Scope};
use crate::models::{AgentInstance, AgentInstanceSpec, AgentInstanceStatus, KIND_AGENT_INSTANCE};
use crate::pipeline::steps::{
    BuildNewState, CheckDuplicate, DeleteResource, LoadExisting, LoadExistingForDelete, Persist, ResolveSlug,
    ValidateProto,
};
use crate::pipeline::{Pipeline, RequestContext};
use crate::storage::{self, Store};

pub struct AgentInstanceController {
    store: Arc<dyn Store>,
}

impl AgentInstanceController {
    pub fn new(store: Arc<dyn Store>) -> Self {
        AgentInstanceController { store }
    }

    fn validate(input: &AgentInstance) -> crate::error::Result<()> {
        if input.spec.agent_id.is_empty() {
            return Err(StigmerError::invalid_argument("AgentInstance requires an agent_id"));
        }
        Ok(())
    }

    pub async fn create(&self, mut input: AgentInstance) -> crate::error::Result<AgentInstance> {
        input.kind = "AgentInstance".to_string();
        input.api_version = "stigmer/v1".to_string();
        let pipeline: Pipeline<AgentInstance, ()> = Pipeline::new(vec![
            Box::new(ValidateProto::new(Self::validate)),
            Box::new(ResolveSlug),
            Box::new(CheckDuplicate::<AgentInstance>::new(
                self.store.clone(),
                KIND_AGENT_INSTANCE,
            )),
            Box::new(BuildNewState::<AgentInstance>::new("agentinstance", |instance| {
                instance.status.ready = true;
            })),
            Box::new(Persist::<AgentInstance>::create(self.store.clone(), KIND_AGENT_INSTANCE)),
        ]);
        pipeline.run(RequestContext::new(input)).await
    }

    pub async fn get(&self, reference: ResourceRef) -> crate::error::Result<AgentInstance> {
        let pipeline: Pipeline<ResourceRef, AgentInstance> = Pipeline::new(vec![Box::new(LoadExisting::<
            AgentInstance,
        >::new(
            self.store.clone(),
            KIND_AGENT_INSTANCE,
        ))]);
        let ctx = pipeline.run_with_context(RequestContext::new(reference)).await?;
        ctx.existing_state()
            .cloned()
            .ok_or_else(|| StigmerError::internal("AgentInstance: load step did not populate existing state"))
    }

    pub async fn delete(&self, reference: ResourceRef) -> crate::error::Result<AgentInstance> {
        let pipeline: Pipeline<ResourceRef, AgentInstance> = Pipeline::new(vec![
            Box::new(LoadExistingForDelete::<AgentInstance>::new(
                self.store.clone(),
                KIND_AGENT_INSTANCE,
            )),
            Box::new(DeleteResource::new(self.store.clone(), KIND_AGENT_INSTANCE)),
        ]);
        let ctx = pipeline.run_with_context(RequestContext::new(reference)).await?;
        ctx.existing_state()
            .cloned()
            .ok_or_else(|| StigmerError::internal("AgentInstance: load step did not populate existing state"))
    }

    pub async fn list(&self, scope: Option<Scope>) -> crate::error::Result<Vec<AgentInstance>> {
        let all: Vec<AgentInstance> = storage::list_resources(&*self.store, KIND_AGENT_INSTANCE).await?;
        Ok(match scope {
            Some(scope) => all.into_iter().filter(|i| i.metadata().scope == scope).collect(),
            None => all,
        })
    }

    async fn find_by_slug(&self, slug: &str, scope: &Scope) -> crate::error::Result<Option<AgentInstance>> {
        let all: Vec<AgentInstance> = storage::list_resources(&*self.store, KIND_AGENT_INSTANCE).await?;
        Ok(all
            .into_iter()
            .find(|i| i.metadata.slug == slug && &i.metadata.scope == scope))
    }
}

#[async_trait]
impl AgentInstanceClient for AgentInstanceController {
    async fn create_default(&self, agent_id: &str, agent_slug: &str) -> crate::error::Result<AgentInstance> {
        let scope = Scope::local();
        let slug = default_instance_name(agent_slug);
        if let Some(existing) = self.find_by_slug(&slug, &scope).await? {
            return Ok(existing);
        }
        let mut metadata = crate::models::envelope::Metadata::new(default_instance_name(agent_slug));
        metadata.slug = slug;
        metadata.scope = scope;
        self.create(AgentInstance {
            kind: String::new(),
            api_version: String::new(),
            metadata,
            spec: AgentInstanceSpec {
                agent_id: agent_id.to_string(),
                resolved_env: Default::default(),
                resolved_instructions: String::new(),
            },
            status: AgentInstanceStatus::default(),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::sled_store::SledStore;

    #[tokio::test]
    async fn create_default_is_idempotent_by_slug() {
        let (store, _dir) = SledStore::open_temporary();
        let controller = AgentInstanceController::new(Arc::new(store));
        let first = controller.create_default("agent-1", "code-reviewer").await.unwrap();
        let second = controller.create_default("agent-1", "code-reviewer").await.unwrap();
        assert_eq!(first.metadata.id, second.metadata.id);
        assert_eq!(first.metadata.slug, "code-reviewer-default");
    }

    #[tokio::test]
    async fn create_rejects_missing_agent_id() {
        let (store, _dir) = SledStore::open_temporary();
        let controller = AgentInstanceController::new(Arc::new(store));
        let mut metadata = crate::models::envelope::Metadata::new("broken");
        metadata.scope = Scope::local();
        let err = controller
            .create(AgentInstance {
                kind: String::new(),
                api_version: String::new(),
                metadata,
                spec: AgentInstanceSpec {
                    agent_id: String::new(),
                    resolved_env: Default::default(),
                    resolved_instructions: String::new(),
                },
                status: AgentInstanceStatus::default(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StigmerError::InvalidArgument { .. }));
    }
}
