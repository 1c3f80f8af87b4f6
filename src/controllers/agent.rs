//! Agent controller (spec §4.2): on top of the flat CRUD pipeline, Create
//! additionally synthesizes a default `AgentInstance` and folds its id
//! back into the Agent's own status, using the `AgentInstanceClient`
//! in-process call (spec §4.2.1) rather than depending on
//! `AgentInstanceController` directly.

use std::sync::Arc;

use async_trait::async_trait;

use crate::controllers::downstream::AgentInstanceClient;
use crate::error::StigmerError;
use crate::models::envelope::{HasMetadata, ResourceRef, Scope};
use crate::models::{Agent, KIND_AGENT};
use crate::pipeline::steps::{
    BuildNewState, BuildUpdateState, CheckDuplicate, DeleteResource, LoadExisting, LoadExistingForDelete,
    LoadForApply, Persist, ResolveSlug, ValidateProto,
};
use crate::pipeline::{Pipeline, RequestContext, Step};
use crate::storage::{self, Store};

pub struct AgentController {
    store: Arc<dyn Store>,
    instances: Arc<dyn AgentInstanceClient>,
}

impl AgentController {
    pub fn new(store: Arc<dyn Store>, instances: Arc<dyn AgentInstanceClient>) -> Self {
        AgentController { store, instances }
    }

    fn validate(input: &Agent) -> crate::error::Result<()> {
        if input.spec.instructions.is_empty() {
            return Err(StigmerError::invalid_argument("Agent requires instructions"));
        }
        Ok(())
    }

    pub async fn create(&self, mut input: Agent) -> crate::error::Result<Agent> {
        input.kind = "Agent".to_string();
        input.api_version = "stigmer/v1".to_string();
        let pipeline: Pipeline<Agent, ()> = Pipeline::new(vec![
            Box::new(ValidateProto::new(Self::validate)),
            Box::new(ResolveSlug),
            Box::new(CheckDuplicate::<Agent>::new(self.store.clone(), KIND_AGENT)),
            Box::new(BuildNewState::<Agent>::new("agent", |_| {})),
            Box::new(Persist::<Agent>::create(self.store.clone(), KIND_AGENT)),
            Box::new(CreateDefaultInstance {
                instances: self.instances.clone(),
            }),
            Box::new(UpdateAgentStatusWithDefaultInstance {
                store: self.store.clone(),
            }),
        ]);
        pipeline.run(RequestContext::new(input)).await
    }

    pub async fn get(&self, reference: ResourceRef) -> crate::error::Result<Agent> {
        let pipeline: Pipeline<ResourceRef, Agent> =
            Pipeline::new(vec![Box::new(LoadExisting::<Agent>::new(self.store.clone(), KIND_AGENT))]);
        let ctx = pipeline.run_with_context(RequestContext::new(reference)).await?;
        ctx.existing_state()
            .cloned()
            .ok_or_else(|| StigmerError::internal("Agent: load step did not populate existing state"))
    }

    pub async fn update(&self, input: Agent) -> crate::error::Result<Agent> {
        let mut reference = ResourceRef::default();
        reference.id = input.metadata.id.clone();
        reference.slug = input.metadata.slug.clone();
        reference.scope = input.metadata.scope.clone();

        let load_pipeline: Pipeline<ResourceRef, Agent> =
            Pipeline::new(vec![Box::new(LoadExisting::<Agent>::new(self.store.clone(), KIND_AGENT))]);
        let ctx = load_pipeline.run_with_context(RequestContext::new(reference)).await?;
        let existing = ctx
            .existing_state()
            .cloned()
            .ok_or_else(|| StigmerError::internal("Agent: load step did not populate existing state"))?;

        let mut update_ctx: RequestContext<Agent, Agent> = RequestContext::new(input);
        update_ctx.set_existing_state(existing);

        let pipeline: Pipeline<Agent, Agent> = Pipeline::new(vec![
            Box::new(ValidateProto::new(Self::validate)),
            Box::new(BuildUpdateState::<Agent>::full_spec_replacement(|input, existing| Agent {
                kind: existing.kind.clone(),
                api_version: existing.api_version.clone(),
                metadata: existing.metadata.clone(),
                spec: input.spec,
                status: existing.status.clone(),
            })),
            Box::new(Persist::<Agent>::update(self.store.clone(), KIND_AGENT)),
        ]);
        pipeline.run(update_ctx).await
    }

    pub async fn delete(&self, reference: ResourceRef) -> crate::error::Result<Agent> {
        let pipeline: Pipeline<ResourceRef, Agent> = Pipeline::new(vec![
            Box::new(LoadExistingForDelete::<Agent>::new(self.store.clone(), KIND_AGENT)),
            Box::new(DeleteResource::new(self.store.clone(), KIND_AGENT)),
        ]);
        let ctx = pipeline.run_with_context(RequestContext::new(reference)).await?;
        ctx.existing_state()
            .cloned()
            .ok_or_else(|| StigmerError::internal("Agent: load step did not populate existing state"))
    }

    pub async fn list(&self, scope: Option<Scope>) -> crate::error::Result<Vec<Agent>> {
        let all: Vec<Agent> = storage::list_resources(&*self.store, KIND_AGENT).await?;
        Ok(match scope {
            Some(scope) => all.into_iter().filter(|a| a.metadata().scope == scope).collect(),
            None => all,
        })
    }

    pub async fn apply(&self, input: Agent) -> crate::error::Result<Agent> {
        let mut probe = ResourceRef::default();
        probe.slug = input.metadata.slug.clone();
        probe.scope = input.metadata.scope.clone();
        let probe_pipeline: Pipeline<ResourceRef, Agent> =
            Pipeline::new(vec![Box::new(LoadForApply::<Agent>::new(self.store.clone(), KIND_AGENT))]);
        let ctx = probe_pipeline.run_with_context(RequestContext::new(probe)).await?;
        if ctx.should_create {
            self.create(input).await
        } else {
            self.update(input).await
        }
    }
}

/// Synthesizes the Agent's default `AgentInstance` right after its first
/// persist (spec §4.2 "CreateDefaultInstance").
struct CreateDefaultInstance {
    instances: Arc<dyn AgentInstanceClient>,
}

#[async_trait]
impl Step<Agent, ()> for CreateDefaultInstance {
    fn name(&self) -> &'static str {
        "CreateDefaultInstance"
    }

    async fn execute(&self, ctx: &mut RequestContext<Agent, ()>) -> crate::error::Result<()> {
        let agent_id = ctx.new_state().metadata.id.clone();
        let agent_slug = ctx.new_state().metadata.slug.clone();
        let instance = self.instances.create_default(&agent_id, &agent_slug).await?;
        ctx.scratch_set("default_instance_id", instance.metadata.id);
        Ok(())
    }
}

/// Folds the newly-created default instance's id into the Agent's status
/// and re-persists (spec §4.2
/// "UpdateAgentStatusWithDefaultInstance"). Runs inside the same Create
/// call, after the instance exists, so the Agent record a caller reads
/// back always carries its default instance id.
struct UpdateAgentStatusWithDefaultInstance {
    store: Arc<dyn Store>,
}

#[async_trait]
impl Step<Agent, ()> for UpdateAgentStatusWithDefaultInstance {
    fn name(&self) -> &'static str {
        "UpdateAgentStatusWithDefaultInstance"
    }

    async fn execute(&self, ctx: &mut RequestContext<Agent, ()>) -> crate::error::Result<()> {
        let instance_id = ctx
            .scratch_get("default_instance_id")
            .ok_or_else(|| StigmerError::internal("UpdateAgentStatusWithDefaultInstance: no instance id in scratch"))?
            .to_string();
        ctx.new_state_mut().status.default_instance_id = instance_id;
        let id = ctx.new_state().metadata.id.clone();
        storage::save_resource(&*self.store, KIND_AGENT, &id, ctx.new_state(), true).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::agent_instance::AgentInstanceController;
    use crate::models::envelope::Metadata;
    use crate::models::AgentSpec;
    use crate::storage::sled_store::SledStore;

    fn sample(name: &str) -> Agent {
        Agent {
            kind: String::new(),
            api_version: String::new(),
            metadata: Metadata::new(name),
            spec: AgentSpec {
                instructions: "be helpful".to_string(),
                skills: vec![],
                mcp_servers: vec![],
                subagents: vec![],
                env: Default::default(),
            },
            status: Default::default(),
        }
    }

    #[tokio::test]
    async fn create_synthesizes_a_default_instance() {
        let (store, _dir) = SledStore::open_temporary();
        let store: Arc<dyn Store> = Arc::new(store);
        let instances = Arc::new(AgentInstanceController::new(store.clone()));
        let controller = AgentController::new(store, instances);

        let created = controller.create(sample("Code Reviewer")).await.unwrap();
        assert!(!created.status.default_instance_id.is_empty());
        assert!(created.status.default_instance_id.starts_with("agentinstance-"));
    }

    #[tokio::test]
    async fn create_rejects_missing_instructions() {
        let (store, _dir) = SledStore::open_temporary();
        let store: Arc<dyn Store> = Arc::new(store);
        let instances = Arc::new(AgentInstanceController::new(store.clone()));
        let controller = AgentController::new(store, instances);

        let mut input = sample("broken");
        input.spec.instructions = String::new();
        let err = controller.create(input).await.unwrap_err();
        assert!(matches!(err, StigmerError::InvalidArgument { .. }));
    }
}
