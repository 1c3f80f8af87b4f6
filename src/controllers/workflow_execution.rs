//! WorkflowExecution controller (spec §4.2: "WorkflowExecution.Create
//! mirrors AgentExecution.Create"): starts the Temporal workflow before
//! persisting, for the same reason `AgentExecutionController` does (spec
//! §3 invariant: never persist a `pending` execution the system cannot
//! run).

use std::sync::Arc;

use async_trait::async_trait;

use crate::broker::StreamBroker;
use crate::error::StigmerError;
use crate::models::agent_execution::ExecutionPhase;
use crate::models::envelope::{HasMetadata, ResourceRef, Scope};
use crate::models::workflow_execution::WorkflowExecutionStatusUpdate;
use crate::models::{WorkflowExecution, KIND_WORKFLOW_EXECUTION};
use crate::pipeline::steps::{BuildNewState, LoadExisting, Persist, ValidateProto};
use crate::pipeline::{Pipeline, RequestContext, Step};
use crate::storage::{self, Store};
use crate::temporal::{CreatorHandle, WorkflowStartRequest};

pub struct WorkflowExecutionController {
    store: Arc<dyn Store>,
    creator: Arc<CreatorHandle>,
    task_queue: String,
    broker: Arc<StreamBroker<WorkflowExecution>>,
}

impl WorkflowExecutionController {
    pub fn new(store: Arc<dyn Store>, task_queue_prefix: &str, broker: Arc<StreamBroker<WorkflowExecution>>) -> Self {
        WorkflowExecutionController {
            store,
            creator: Arc::new(CreatorHandle::new()),
            task_queue: format!("{task_queue_prefix}-workflow-execution"),
            broker,
        }
    }

    pub fn creator_handle(&self) -> Arc<CreatorHandle> {
        self.creator.clone()
    }

    fn validate(input: &WorkflowExecution) -> crate::error::Result<()> {
        if input.spec.workflow_instance_id.is_empty() {
            return Err(StigmerError::invalid_argument(
                "WorkflowExecution requires a workflow_instance_id",
            ));
        }
        Ok(())
    }

    pub async fn create(&self, mut input: WorkflowExecution) -> crate::error::Result<WorkflowExecution> {
        input.kind = "WorkflowExecution".to_string();
        input.api_version = "stigmer/v1".to_string();
        let pipeline: Pipeline<WorkflowExecution, ()> = Pipeline::new(vec![
            Box::new(ValidateProto::new(Self::validate)),
            Box::new(BuildNewState::<WorkflowExecution>::new("workflowexecution", |_| {})),
            Box::new(SetInitialPhase),
            Box::new(StartWorkflow {
                creator: self.creator.clone(),
                task_queue: self.task_queue.clone(),
            }),
            Box::new(Persist::<WorkflowExecution>::create(
                self.store.clone(),
                KIND_WORKFLOW_EXECUTION,
            )),
        ]);
        pipeline.run(RequestContext::new(input)).await
    }

    pub async fn get(&self, reference: ResourceRef) -> crate::error::Result<WorkflowExecution> {
        let pipeline: Pipeline<ResourceRef, WorkflowExecution> = Pipeline::new(vec![Box::new(LoadExisting::<
            WorkflowExecution,
        >::new(
            self.store.clone(),
            KIND_WORKFLOW_EXECUTION,
        ))]);
        let ctx = pipeline.run_with_context(RequestContext::new(reference)).await?;
        ctx.existing_state()
            .cloned()
            .ok_or_else(|| StigmerError::internal("WorkflowExecution: load step did not populate existing state"))
    }

    pub async fn list(&self, scope: Option<Scope>) -> crate::error::Result<Vec<WorkflowExecution>> {
        let all: Vec<WorkflowExecution> = storage::list_resources(&*self.store, KIND_WORKFLOW_EXECUTION).await?;
        Ok(match scope {
            Some(scope) => all.into_iter().filter(|e| e.metadata().scope == scope).collect(),
            None => all,
        })
    }

    pub async fn update_status(
        &self,
        execution_id: &str,
        update: WorkflowExecutionStatusUpdate,
    ) -> crate::error::Result<WorkflowExecution> {
        let mut execution: WorkflowExecution =
            storage::get_resource(&*self.store, KIND_WORKFLOW_EXECUTION, execution_id)
                .await?
                .ok_or_else(|| StigmerError::not_found(format!("workflowexecution/{execution_id} not found")))?;

        execution
            .status
            .merge(update)
            .map_err(StigmerError::failed_precondition)?;
        execution.metadata.updated_at = chrono::Utc::now();

        storage::save_resource(&*self.store, KIND_WORKFLOW_EXECUTION, execution_id, &execution, true).await?;
        self.broker.publish(execution_id, execution.clone());
        if execution.status.phase.is_terminal() {
            self.broker.close(execution_id);
        }
        Ok(execution)
    }

    pub fn subscribe(&self, execution_id: &str) -> crate::broker::Subscription<WorkflowExecution> {
        self.broker.subscribe(execution_id)
    }
}

struct SetInitialPhase;

#[async_trait]
impl Step<WorkflowExecution, ()> for SetInitialPhase {
    fn name(&self) -> &'static str {
        "SetInitialPhase"
    }

    async fn execute(&self, ctx: &mut RequestContext<WorkflowExecution, ()>) -> crate::error::Result<()> {
        ctx.new_state_mut().status.phase = ExecutionPhase::Pending;
        Ok(())
    }
}

struct StartWorkflow {
    creator: Arc<CreatorHandle>,
    task_queue: String,
}

#[async_trait]
impl Step<WorkflowExecution, ()> for StartWorkflow {
    fn name(&self) -> &'static str {
        "StartWorkflow"
    }

    async fn execute(&self, ctx: &mut RequestContext<WorkflowExecution, ()>) -> crate::error::Result<()> {
        let creator = self.creator.get().ok_or_else(|| {
            StigmerError::unavailable("Temporal workflow creator is not connected; cannot start workflow execution")
        })?;
        let execution = ctx.new_state();
        let request = WorkflowStartRequest {
            task_queue: self.task_queue.clone(),
            workflow_type: "run_workflow_execution".to_string(),
            workflow_id: execution.metadata.id.clone(),
            input: serde_json::json!({
                "workflow_instance_id": execution.spec.workflow_instance_id,
                "input": execution.spec.input,
            }),
        };
        creator.start(request).await?;
        ctx.new_state_mut().status.phase = ExecutionPhase::Running;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::models::envelope::Metadata;
    use crate::models::WorkflowExecutionSpec;
    use crate::storage::sled_store::SledStore;
    use crate::temporal::{CreatorSink, WorkflowCreator, WorkflowHandle};

    struct AcceptingCreator;

    #[async_trait]
    impl WorkflowCreator for AcceptingCreator {
        async fn start(&self, _request: WorkflowStartRequest) -> Result<WorkflowHandle> {
            Ok(WorkflowHandle {
                workflow_id: "wf-1".to_string(),
                run_id: "run-1".to_string(),
            })
        }
    }

    fn sample() -> WorkflowExecution {
        WorkflowExecution {
            kind: String::new(),
            api_version: String::new(),
            metadata: Metadata::new("exec"),
            spec: WorkflowExecutionSpec {
                workflow_instance_id: "workflowinstance-1".to_string(),
                input: serde_json::json!({}),
            },
            status: Default::default(),
        }
    }

    #[tokio::test]
    async fn create_without_temporal_fails_unavailable() {
        let (store, _dir) = SledStore::open_temporary();
        let store: Arc<dyn Store> = Arc::new(store);
        let broker = Arc::new(StreamBroker::new());
        let controller = WorkflowExecutionController::new(store, "stigmer", broker);
        let err = controller.create(sample()).await.unwrap_err();
        assert!(matches!(err, StigmerError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn create_then_update_status_publishes_to_broker() {
        let (store, _dir) = SledStore::open_temporary();
        let store: Arc<dyn Store> = Arc::new(store);
        let broker = Arc::new(StreamBroker::new());
        let controller = WorkflowExecutionController::new(store, "stigmer", broker);
        controller.creator_handle().set_workflow_creator(Some(Arc::new(AcceptingCreator)));

        let created = controller.create(sample()).await.unwrap();
        let mut rx = controller.subscribe(&created.metadata.id);

        controller
            .update_status(
                &created.metadata.id,
                WorkflowExecutionStatusUpdate {
                    phase: Some(ExecutionPhase::Completed),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.status.phase, ExecutionPhase::Completed);
        assert!(rx.recv().await.is_none());
    }
}
