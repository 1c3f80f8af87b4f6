//! WorkflowInstance controller (spec §4.2): bound, executable variant of a
//! Workflow, auto-materialized the same way `AgentInstanceController`
//! materializes an Agent's default instance.

use std::sync::Arc;

use async_trait::async_trait;

use crate::controllers::downstream::WorkflowInstanceClient;
use crate::error::StigmerError;
use crate::models::envelope::{HasMetadata, Metadata, ResourceRef, Scope};
use crate::models::workflow_instance::default_instance_name;
use crate::models::{WorkflowInstance, WorkflowInstanceSpec, WorkflowInstanceStatus, KIND_WORKFLOW_INSTANCE};
use crate::pipeline::steps::{
    BuildNewState, CheckDuplicate, DeleteResource, LoadExisting, LoadExistingForDelete, Persist, ResolveSlug,
    ValidateProto,
};
use crate::pipeline::{Pipeline, RequestContext};
use crate::storage::{self, Store};

pub struct WorkflowInstanceController {
    store: Arc<dyn Store>,
}

impl WorkflowInstanceController {
    pub fn new(store: Arc<dyn Store>) -> Self {
        WorkflowInstanceController { store }
    }

    fn validate(input: &WorkflowInstance) -> crate::error::Result<()> {
        if input.spec.workflow_id.is_empty() {
            return Err(StigmerError::invalid_argument(
                "WorkflowInstance requires a workflow_id",
            ));
        }
        Ok(())
    }

    pub async fn create(&self, mut input: WorkflowInstance) -> crate::error::Result<WorkflowInstance> {
        input.kind = "WorkflowInstance".to_string();
        input.api_version = "stigmer/v1".to_string();
        let pipeline: Pipeline<WorkflowInstance, ()> = Pipeline::new(vec![
            Box::new(ValidateProto::new(Self::validate)),
            Box::new(ResolveSlug),
            Box::new(CheckDuplicate::<WorkflowInstance>::new(
                self.store.clone(),
                KIND_WORKFLOW_INSTANCE,
            )),
            Box::new(BuildNewState::<WorkflowInstance>::new("workflowinstance", |instance| {
                instance.status.ready = true;
            })),
            Box::new(Persist::<WorkflowInstance>::create(
                self.store.clone(),
                KIND_WORKFLOW_INSTANCE,
            )),
        ]);
        pipeline.run(RequestContext::new(input)).await
    }

    pub async fn get(&self, reference: ResourceRef) -> crate::error::Result<WorkflowInstance> {
        let pipeline: Pipeline<ResourceRef, WorkflowInstance> = Pipeline::new(vec![Box::new(LoadExisting::<
            WorkflowInstance,
        >::new(
            self.store.clone(),
            KIND_WORKFLOW_INSTANCE,
        ))]);
        let ctx = pipeline.run_with_context(RequestContext::new(reference)).await?;
        ctx.existing_state()
            .cloned()
            .ok_or_else(|| StigmerError::internal("WorkflowInstance: load step did not populate existing state"))
    }

    pub async fn delete(&self, reference: ResourceRef) -> crate::error::Result<WorkflowInstance> {
        let pipeline: Pipeline<ResourceRef, WorkflowInstance> = Pipeline::new(vec![
            Box::new(LoadExistingForDelete::<WorkflowInstance>::new(
                self.store.clone(),
                KIND_WORKFLOW_INSTANCE,
            )),
            Box::new(DeleteResource::new(self.store.clone(), KIND_WORKFLOW_INSTANCE)),
        ]);
        let ctx = pipeline.run_with_context(RequestContext::new(reference)).await?;
        ctx.existing_state()
            .cloned()
            .ok_or_else(|| StigmerError::internal("WorkflowInstance: load step did not populate existing state"))
    }

    pub async fn list(&self, scope: Option<Scope>) -> crate::error::Result<Vec<WorkflowInstance>> {
        let all: Vec<WorkflowInstance> = storage::list_resources(&*self.store, KIND_WORKFLOW_INSTANCE).await?;
        Ok(match scope {
            Some(scope) => all.into_iter().filter(|i| i.metadata().scope == scope).collect(),
            None => all,
        })
    }

    async fn find_by_slug(&self, slug: &str, scope: &Scope) -> crate::error::Result<Option<WorkflowInstance>> {
        let all: Vec<WorkflowInstance> = storage::list_resources(&*self.store, KIND_WORKFLOW_INSTANCE).await?;
        Ok(all
            .into_iter()
            .find(|i| i.metadata.slug == slug && &i.metadata.scope == scope))
    }
}

#[async_trait]
impl WorkflowInstanceClient for WorkflowInstanceController {
    async fn create_default(&self, workflow_id: &str, workflow_slug: &str) -> crate::error::Result<WorkflowInstance> {
        let scope = Scope::local();
        let slug = default_instance_name(workflow_slug);
        if let Some(existing) = self.find_by_slug(&slug, &scope).await? {
            return Ok(existing);
        }
        let mut metadata = Metadata::new(default_instance_name(workflow_slug));
        metadata.slug = slug;
        metadata.scope = scope;
        self.create(WorkflowInstance {
            kind: String::new(),
            api_version: String::new(),
            metadata,
            spec: WorkflowInstanceSpec {
                workflow_id: workflow_id.to_string(),
                resolved_variables: Default::default(),
            },
            status: WorkflowInstanceStatus::default(),
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
        let controller = WorkflowInstanceController::new(Arc::new(store));
        let first = controller.create_default("wf-1", "nightly-sync").await.unwrap();
        let second = controller.create_default("wf-1", "nightly-sync").await.unwrap();
        assert_eq!(first.metadata.id, second.metadata.id);
        assert_eq!(first.metadata.slug, "nightly-sync-default");
    }
}
