//! Workflow controller (spec §4.2): on top of flat CRUD, Create composes a
//! validation step that invokes a Temporal validation workflow before
//! persisting, then synthesizes a default `WorkflowInstance` the same way
//! `AgentController` does for Agents.

use std::sync::Arc;

use async_trait::async_trait;

use crate::controllers::downstream::WorkflowInstanceClient;
use crate::error::StigmerError;
use crate::models::envelope::{HasMetadata, ResourceRef, Scope};
use crate::models::{Workflow, KIND_WORKFLOW};
use crate::pipeline::steps::{
    BuildNewState, BuildUpdateState, CheckDuplicate, DeleteResource, LoadExisting, LoadExistingForDelete,
    LoadForApply, Persist, ResolveSlug, ValidateProto,
};
use crate::pipeline::{Pipeline, RequestContext, Step};
use crate::storage::{self, Store};
use crate::temporal::{CreatorHandle, WorkflowStartRequest};

pub struct WorkflowController {
    store: Arc<dyn Store>,
    instances: Arc<dyn WorkflowInstanceClient>,
    creator: Arc<CreatorHandle>,
    task_queue: String,
}

impl WorkflowController {
    pub fn new(store: Arc<dyn Store>, instances: Arc<dyn WorkflowInstanceClient>, task_queue_prefix: &str) -> Self {
        WorkflowController {
            store,
            instances,
            creator: Arc::new(CreatorHandle::new()),
            task_queue: format!("{task_queue_prefix}-validation"),
        }
    }

    /// Handed to `TemporalManager::register_sink` so this controller's
    /// validation calls always use the live Temporal creator.
    pub fn creator_handle(&self) -> Arc<CreatorHandle> {
        self.creator.clone()
    }

    fn validate(input: &Workflow) -> crate::error::Result<()> {
        if input.spec.tasks.is_empty() {
            return Err(StigmerError::invalid_argument("Workflow requires at least one task"));
        }
        Ok(())
    }

    pub async fn create(&self, mut input: Workflow) -> crate::error::Result<Workflow> {
        input.kind = "Workflow".to_string();
        input.api_version = "stigmer/v1".to_string();
        let pipeline: Pipeline<Workflow, ()> = Pipeline::new(vec![
            Box::new(ValidateProto::new(Self::validate)),
            Box::new(ResolveSlug),
            Box::new(CheckDuplicate::<Workflow>::new(self.store.clone(), KIND_WORKFLOW)),
            Box::new(BuildNewState::<Workflow>::new("workflow", |_| {})),
            Box::new(ValidateViaTemporal {
                creator: self.creator.clone(),
                task_queue: self.task_queue.clone(),
            }),
            Box::new(Persist::<Workflow>::create(self.store.clone(), KIND_WORKFLOW)),
            Box::new(CreateDefaultInstance {
                instances: self.instances.clone(),
            }),
            Box::new(UpdateWorkflowStatusWithDefaultInstance {
                store: self.store.clone(),
            }),
        ]);
        pipeline.run(RequestContext::new(input)).await
    }

    pub async fn get(&self, reference: ResourceRef) -> crate::error::Result<Workflow> {
        let pipeline: Pipeline<ResourceRef, Workflow> = Pipeline::new(vec![Box::new(LoadExisting::<Workflow>::new(
            self.store.clone(),
            KIND_WORKFLOW,
        ))]);
        let ctx = pipeline.run_with_context(RequestContext::new(reference)).await?;
        ctx.existing_state()
            .cloned()
            .ok_or_else(|| StigmerError::internal("Workflow: load step did not populate existing state"))
    }

    pub async fn update(&self, input: Workflow) -> crate::error::Result<Workflow> {
        let mut reference = ResourceRef::default();
        reference.id = input.metadata.id.clone();
        reference.slug = input.metadata.slug.clone();
        reference.scope = input.metadata.scope.clone();

        let load_pipeline: Pipeline<ResourceRef, Workflow> = Pipeline::new(vec![Box::new(LoadExisting::<
            Workflow,
        >::new(
            self.store.clone(),
            KIND_WORKFLOW,
        ))]);
        let ctx = load_pipeline.run_with_context(RequestContext::new(reference)).await?;
        let existing = ctx
            .existing_state()
            .cloned()
            .ok_or_else(|| StigmerError::internal("Workflow: load step did not populate existing state"))?;

        let mut update_ctx: RequestContext<Workflow, Workflow> = RequestContext::new(input);
        update_ctx.set_existing_state(existing);

        let pipeline: Pipeline<Workflow, Workflow> = Pipeline::new(vec![
            Box::new(ValidateProto::new(Self::validate)),
            Box::new(ValidateViaTemporal {
                creator: self.creator.clone(),
                task_queue: self.task_queue.clone(),
            }),
            Box::new(BuildUpdateState::<Workflow>::full_spec_replacement(|input, existing| Workflow {
                kind: existing.kind.clone(),
                api_version: existing.api_version.clone(),
                metadata: existing.metadata.clone(),
                spec: input.spec,
                status: existing.status.clone(),
            })),
            Box::new(Persist::<Workflow>::update(self.store.clone(), KIND_WORKFLOW)),
        ]);
        pipeline.run(update_ctx).await
    }

    pub async fn delete(&self, reference: ResourceRef) -> crate::error::Result<Workflow> {
        let pipeline: Pipeline<ResourceRef, Workflow> = Pipeline::new(vec![
            Box::new(LoadExistingForDelete::<Workflow>::new(self.store.clone(), KIND_WORKFLOW)),
            Box::new(DeleteResource::new(self.store.clone(), KIND_WORKFLOW)),
        ]);
        let ctx = pipeline.run_with_context(RequestContext::new(reference)).await?;
        ctx.existing_state()
            .cloned()
            .ok_or_else(|| StigmerError::internal("Workflow: load step did not populate existing state"))
    }

    pub async fn list(&self, scope: Option<Scope>) -> crate::error::Result<Vec<Workflow>> {
        let all: Vec<Workflow> = storage::list_resources(&*self.store, KIND_WORKFLOW).await?;
        Ok(match scope {
            Some(scope) => all.into_iter().filter(|w| w.metadata().scope == scope).collect(),
            None => all,
        })
    }

    pub async fn apply(&self, input: Workflow) -> crate::error::Result<Workflow> {
        let mut probe = ResourceRef::default();
        probe.slug = input.metadata.slug.clone();
        probe.scope = input.metadata.scope.clone();
        let probe_pipeline: Pipeline<ResourceRef, Workflow> = Pipeline::new(vec![Box::new(LoadForApply::<
            Workflow,
        >::new(
            self.store.clone(),
            KIND_WORKFLOW,
        ))]);
        let ctx = probe_pipeline.run_with_context(RequestContext::new(probe)).await?;
        if ctx.should_create {
            self.create(input).await
        } else {
            self.update(input).await
        }
    }
}

/// Invokes the Temporal validation workflow over the declared task graph
/// (spec §4.2 "composes a validation step that invokes a Temporal
/// validation workflow"). Like `AgentExecution.StartWorkflow`, this fails
/// `unavailable` rather than silently skip validation when Temporal isn't
/// connected — consistent with spec §7's "never silently persist a
/// resource the system cannot make good on."
struct ValidateViaTemporal {
    creator: Arc<CreatorHandle>,
    task_queue: String,
}

#[async_trait]
impl Step<Workflow, ()> for ValidateViaTemporal {
    fn name(&self) -> &'static str {
        "ValidateViaTemporal"
    }

    async fn execute(&self, ctx: &mut RequestContext<Workflow, ()>) -> crate::error::Result<()> {
        let creator = self.creator.get().ok_or_else(|| {
            StigmerError::unavailable("Temporal workflow creator is not connected; cannot validate workflow")
        })?;
        let workflow = ctx.new_state();
        let request = WorkflowStartRequest {
            task_queue: self.task_queue.clone(),
            workflow_type: "validate_workflow_definition".to_string(),
            workflow_id: format!("validate-{}", workflow.metadata.id),
            input: serde_json::to_value(&workflow.spec)?,
        };
        creator.start(request).await?;
        ctx.new_state_mut().status.validated = true;
        Ok(())
    }
}

struct CreateDefaultInstance {
    instances: Arc<dyn WorkflowInstanceClient>,
}

#[async_trait]
impl Step<Workflow, ()> for CreateDefaultInstance {
    fn name(&self) -> &'static str {
        "CreateDefaultInstance"
    }

    async fn execute(&self, ctx: &mut RequestContext<Workflow, ()>) -> crate::error::Result<()> {
        let workflow_id = ctx.new_state().metadata.id.clone();
        let workflow_slug = ctx.new_state().metadata.slug.clone();
        let instance = self.instances.create_default(&workflow_id, &workflow_slug).await?;
        ctx.scratch_set("default_instance_id", instance.metadata.id);
        Ok(())
    }
}

struct UpdateWorkflowStatusWithDefaultInstance {
    store: Arc<dyn Store>,
}

#[async_trait]
impl Step<Workflow, ()> for UpdateWorkflowStatusWithDefaultInstance {
    fn name(&self) -> &'static str {
        "UpdateWorkflowStatusWithDefaultInstance"
    }

    async fn execute(&self, ctx: &mut RequestContext<Workflow, ()>) -> crate::error::Result<()> {
        let instance_id = ctx
            .scratch_get("default_instance_id")
            .ok_or_else(|| {
                StigmerError::internal("UpdateWorkflowStatusWithDefaultInstance: no instance id in scratch")
            })?
            .to_string();
        ctx.new_state_mut().status.default_instance_id = instance_id;
        let id = ctx.new_state().metadata.id.clone();
        storage::save_resource(&*self.store, KIND_WORKFLOW, &id, ctx.new_state(), true).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::workflow_instance::WorkflowInstanceController;
    use crate::error::Result;
    use crate::models::envelope::Metadata;
    use crate::models::workflow::{HttpCallTask, Task, TaskKind};
    use crate::models::WorkflowSpec;
    use crate::storage::sled_store::SledStore;
    use crate::temporal::{CreatorSink, WorkflowCreator, WorkflowHandle};

    struct AcceptingCreator;

    #[async_trait]
    impl WorkflowCreator for AcceptingCreator {
        async fn start(&self, _request: WorkflowStartRequest) -> Result<WorkflowHandle> {
            Ok(WorkflowHandle {
                workflow_id: "wf-validate-1".to_string(),
                run_id: "run-1".to_string(),
            })
        }
    }

    fn sample(name: &str) -> Workflow {
        Workflow {
            kind: String::new(),
            api_version: String::new(),
            metadata: Metadata::new(name),
            spec: WorkflowSpec {
                namespace: String::new(),
                tasks: vec![Task {
                    name: "notify".to_string(),
                    kind: TaskKind::HttpCall(HttpCallTask {
                        method: "POST".to_string(),
                        url: "https://example.invalid/hook".to_string(),
                        headers: Default::default(),
                        body: None,
                    }),
                }],
            },
            status: Default::default(),
        }
    }

    #[tokio::test]
    async fn create_without_temporal_connected_fails_unavailable() {
        let (store, _dir) = SledStore::open_temporary();
        let store: Arc<dyn Store> = Arc::new(store);
        let instances = Arc::new(WorkflowInstanceController::new(store.clone()));
        let controller = WorkflowController::new(store, instances, "stigmer");
        let err = controller.create(sample("nightly-sync")).await.unwrap_err();
        assert!(matches!(err, StigmerError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn create_validates_then_synthesizes_default_instance() {
        let (store, _dir) = SledStore::open_temporary();
        let store: Arc<dyn Store> = Arc::new(store);
        let instances = Arc::new(WorkflowInstanceController::new(store.clone()));
        let controller = WorkflowController::new(store, instances, "stigmer");
        controller.creator_handle().set_workflow_creator(Some(Arc::new(AcceptingCreator)));

        let created = controller.create(sample("nightly-sync")).await.unwrap();
        assert!(created.status.validated);
        assert!(!created.status.default_instance_id.is_empty());
    }
}
