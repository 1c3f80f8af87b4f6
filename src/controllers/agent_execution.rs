//! AgentExecution controller (spec §4.2): one invocation of an
//! AgentInstance. `Create` resolves (or synthesizes) the agent instance
//! and session, starts the Temporal workflow, and only then persists —
//! deliberately running `StartWorkflow` before `Persist` so a disconnected
//! Temporal client fails the call outright instead of leaving a `pending`
//! execution the system can never advance (spec §3 invariant: "must fail
//! with unavailable ... must not silently persist a pending resource the
//! system cannot execute"). `UpdateStatus` merges a runner's partial status
//! report and publishes it to the execution stream broker.

use std::sync::Arc;

use async_trait::async_trait;

use crate::broker::StreamBroker;
use crate::controllers::downstream::{AgentInstanceClient, SessionClient};
use crate::error::StigmerError;
use crate::models::agent_execution::{AgentExecutionStatusUpdate, ExecutionPhase};
use crate::models::envelope::{HasMetadata, ResourceRef, Scope};
use crate::models::{AgentExecution, KIND_AGENT_EXECUTION};
use crate::pipeline::steps::{BuildNewState, LoadExisting, Persist, ValidateProto};
use crate::pipeline::{Pipeline, RequestContext, Step};
use crate::storage::{self, Store};
use crate::temporal::{CreatorHandle, WorkflowStartRequest};

pub struct AgentExecutionController {
    store: Arc<dyn Store>,
    instances: Arc<dyn AgentInstanceClient>,
    sessions: Arc<dyn SessionClient>,
    creator: Arc<CreatorHandle>,
    task_queue: String,
    broker: Arc<StreamBroker<AgentExecution>>,
}

impl AgentExecutionController {
    pub fn new(
        store: Arc<dyn Store>,
        instances: Arc<dyn AgentInstanceClient>,
        sessions: Arc<dyn SessionClient>,
        task_queue_prefix: &str,
        broker: Arc<StreamBroker<AgentExecution>>,
    ) -> Self {
        AgentExecutionController {
            store,
            instances,
            sessions,
            creator: Arc::new(CreatorHandle::new()),
            task_queue: format!("{task_queue_prefix}-agent-execution"),
            broker,
        }
    }

    pub fn creator_handle(&self) -> Arc<CreatorHandle> {
        self.creator.clone()
    }

    fn validate(input: &AgentExecution) -> crate::error::Result<()> {
        if input.spec.session_id.is_empty() && input.spec.agent_id.is_empty() {
            return Err(StigmerError::invalid_argument(
                "AgentExecution requires either a session_id or an agent_id",
            ));
        }
        if input.spec.input_message.is_empty() {
            return Err(StigmerError::invalid_argument("AgentExecution requires an input_message"));
        }
        Ok(())
    }

    pub async fn create(&self, mut input: AgentExecution) -> crate::error::Result<AgentExecution> {
        input.kind = "AgentExecution".to_string();
        input.api_version = "stigmer/v1".to_string();
        let pipeline: Pipeline<AgentExecution, ()> = Pipeline::new(vec![
            Box::new(ValidateProto::new(Self::validate)),
            Box::new(BuildNewState::<AgentExecution>::new("agentexecution", |_| {})),
            Box::new(ResolveAgentInstance {
                instances: self.instances.clone(),
                store: self.store.clone(),
            }),
            Box::new(CreateSessionIfNeeded {
                sessions: self.sessions.clone(),
            }),
            Box::new(SetInitialPhase),
            Box::new(StartWorkflow {
                creator: self.creator.clone(),
                task_queue: self.task_queue.clone(),
            }),
            Box::new(Persist::<AgentExecution>::create(
                self.store.clone(),
                KIND_AGENT_EXECUTION,
            )),
        ]);
        pipeline.run(RequestContext::new(input)).await
    }

    pub async fn get(&self, reference: ResourceRef) -> crate::error::Result<AgentExecution> {
        let pipeline: Pipeline<ResourceRef, AgentExecution> = Pipeline::new(vec![Box::new(LoadExisting::<
            AgentExecution,
        >::new(
            self.store.clone(),
            KIND_AGENT_EXECUTION,
        ))]);
        let ctx = pipeline.run_with_context(RequestContext::new(reference)).await?;
        ctx.existing_state()
            .cloned()
            .ok_or_else(|| StigmerError::internal("AgentExecution: load step did not populate existing state"))
    }

    pub async fn list(&self, scope: Option<Scope>) -> crate::error::Result<Vec<AgentExecution>> {
        let all: Vec<AgentExecution> = storage::list_resources(&*self.store, KIND_AGENT_EXECUTION).await?;
        Ok(match scope {
            Some(scope) => all.into_iter().filter(|e| e.metadata().scope == scope).collect(),
            None => all,
        })
    }

    /// Merges a runner's partial status report (spec §4.2
    /// "AgentExecution.UpdateStatus"), persists it without an audit write
    /// (the teacher-grounded convention every status-only write uses), and
    /// publishes the merged record to the broker. Closes the broker's
    /// channel for this execution once the merged phase is terminal.
    pub async fn update_status(
        &self,
        execution_id: &str,
        update: AgentExecutionStatusUpdate,
    ) -> crate::error::Result<AgentExecution> {
        let mut execution: AgentExecution = storage::get_resource(&*self.store, KIND_AGENT_EXECUTION, execution_id)
            .await?
            .ok_or_else(|| StigmerError::not_found(format!("agentexecution/{execution_id} not found")))?;

        execution
            .status
            .merge(update)
            .map_err(StigmerError::failed_precondition)?;
        execution.metadata.updated_at = chrono::Utc::now();

        storage::save_resource(&*self.store, KIND_AGENT_EXECUTION, execution_id, &execution, true).await?;
        self.broker.publish(execution_id, execution.clone());
        if execution.status.phase.is_terminal() {
            self.broker.close(execution_id);
        }
        Ok(execution)
    }

    pub fn subscribe(&self, execution_id: &str) -> crate::broker::Subscription<AgentExecution> {
        self.broker.subscribe(execution_id)
    }
}

/// Resolves `agent_instance_id` from either an explicit session or an
/// agent reference (spec §4.2 "CreateDefaultInstanceIfNeeded"). When the
/// request carries only `agent_id`, synthesizes the agent's default
/// instance via the in-process `AgentInstanceClient`.
struct ResolveAgentInstance {
    instances: Arc<dyn AgentInstanceClient>,
    store: Arc<dyn Store>,
}

#[async_trait]
impl Step<AgentExecution, ()> for ResolveAgentInstance {
    fn name(&self) -> &'static str {
        "ResolveAgentInstance"
    }

    async fn execute(&self, ctx: &mut RequestContext<AgentExecution, ()>) -> crate::error::Result<()> {
        let agent_id = ctx.new_state().spec.agent_id.clone();
        let session_id = ctx.new_state().spec.session_id.clone();

        let instance_id = if !session_id.is_empty() {
            let session: crate::models::Session =
                storage::get_resource(&*self.store, crate::models::KIND_SESSION, &session_id)
                    .await?
                    .ok_or_else(|| StigmerError::not_found(format!("session/{session_id} not found")))?;
            session.spec.agent_instance_id
        } else {
            let agent: crate::models::Agent = storage::get_resource(&*self.store, crate::models::KIND_AGENT, &agent_id)
                .await?
                .ok_or_else(|| StigmerError::not_found(format!("agent/{agent_id} not found")))?;
            let instance = self.instances.create_default(&agent.metadata.id, &agent.metadata.slug).await?;
            instance.metadata.id
        };

        ctx.new_state_mut().status.agent_instance_id = instance_id;
        Ok(())
    }
}

/// Synthesizes a Session when the request named only an agent (spec §4.2
/// "CreateSessionIfNeeded"; spec §3 invariant 4: "always resolves to a
/// Session ... before transitioning out of pending").
struct CreateSessionIfNeeded {
    sessions: Arc<dyn SessionClient>,
}

#[async_trait]
impl Step<AgentExecution, ()> for CreateSessionIfNeeded {
    fn name(&self) -> &'static str {
        "CreateSessionIfNeeded"
    }

    async fn execute(&self, ctx: &mut RequestContext<AgentExecution, ()>) -> crate::error::Result<()> {
        if !ctx.new_state().spec.session_id.is_empty() {
            ctx.new_state_mut().status.session_id = ctx.new_state().spec.session_id.clone();
            return Ok(());
        }
        let agent_instance_id = ctx.new_state().status.agent_instance_id.clone();
        let session = self.sessions.create_default(&agent_instance_id).await?;
        ctx.new_state_mut().spec.session_id = session.metadata.id.clone();
        ctx.new_state_mut().status.session_id = session.metadata.id;
        Ok(())
    }
}

struct SetInitialPhase;

#[async_trait]
impl Step<AgentExecution, ()> for SetInitialPhase {
    fn name(&self) -> &'static str {
        "SetInitialPhase"
    }

    async fn execute(&self, ctx: &mut RequestContext<AgentExecution, ()>) -> crate::error::Result<()> {
        ctx.new_state_mut().status.phase = ExecutionPhase::Pending;
        Ok(())
    }
}

/// Starts the Temporal workflow that actually runs the agent (spec §4.2
/// "StartWorkflow"). Ordered ahead of `Persist` in this controller's
/// pipeline (see module doc) so a missing Temporal creator aborts the
/// whole call rather than leaving an orphaned `pending` record behind.
struct StartWorkflow {
    creator: Arc<CreatorHandle>,
    task_queue: String,
}

#[async_trait]
impl Step<AgentExecution, ()> for StartWorkflow {
    fn name(&self) -> &'static str {
        "StartWorkflow"
    }

    async fn execute(&self, ctx: &mut RequestContext<AgentExecution, ()>) -> crate::error::Result<()> {
        let creator = self.creator.get().ok_or_else(|| {
            StigmerError::unavailable("Temporal workflow creator is not connected; cannot start agent execution")
        })?;
        let execution = ctx.new_state();
        let request = WorkflowStartRequest {
            task_queue: self.task_queue.clone(),
            workflow_type: "run_agent_execution".to_string(),
            workflow_id: execution.metadata.id.clone(),
            input: serde_json::json!({
                "agent_instance_id": execution.status.agent_instance_id,
                "session_id": execution.status.session_id,
                "input_message": execution.spec.input_message,
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
    use crate::controllers::agent::AgentController;
    use crate::controllers::agent_instance::AgentInstanceController;
    use crate::controllers::session::SessionController;
    use crate::error::Result;
    use crate::models::envelope::Metadata;
    use crate::models::{AgentExecutionSpec, AgentSpec};
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

    fn build_controllers(
        store: Arc<dyn Store>,
    ) -> (Arc<AgentController>, AgentExecutionController) {
        let instances = Arc::new(AgentInstanceController::new(store.clone()));
        let agents = Arc::new(AgentController::new(store.clone(), instances.clone()));
        let sessions = Arc::new(SessionController::new(store.clone()));
        let broker = Arc::new(StreamBroker::new());
        let executions = AgentExecutionController::new(store, instances, sessions, "stigmer", broker);
        (agents, executions)
    }

    #[tokio::test]
    async fn create_without_temporal_fails_unavailable_and_does_not_persist() {
        let (store, _dir) = SledStore::open_temporary();
        let store: Arc<dyn Store> = Arc::new(store);
        let (agents, executions) = build_controllers(store.clone());

        let agent = agents
            .create(sample_agent("reviewer"))
            .await
            .unwrap();

        let err = executions
            .create(AgentExecution {
                kind: String::new(),
                api_version: String::new(),
                metadata: Metadata::new("exec"),
                spec: AgentExecutionSpec {
                    session_id: String::new(),
                    agent_id: agent.metadata.id.clone(),
                    input_message: "hello".to_string(),
                },
                status: Default::default(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StigmerError::Unavailable { .. }));

        let all: Vec<AgentExecution> = storage::list_resources(&*store, KIND_AGENT_EXECUTION).await.unwrap();
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn create_resolves_instance_and_session_then_starts_workflow() {
        let (store, _dir) = SledStore::open_temporary();
        let store: Arc<dyn Store> = Arc::new(store);
        let (agents, executions) = build_controllers(store.clone());
        executions.creator_handle().set_workflow_creator(Some(Arc::new(AcceptingCreator)));

        let agent = agents
            .create(sample_agent("reviewer"))
            .await
            .unwrap();

        let created = executions
            .create(AgentExecution {
                kind: String::new(),
                api_version: String::new(),
                metadata: Metadata::new("exec"),
                spec: AgentExecutionSpec {
                    session_id: String::new(),
                    agent_id: agent.metadata.id.clone(),
                    input_message: "hello".to_string(),
                },
                status: Default::default(),
            })
            .await
            .unwrap();

        assert_eq!(created.status.phase, ExecutionPhase::Running);
        assert!(!created.status.agent_instance_id.is_empty());
        assert!(!created.status.session_id.is_empty());
    }

    fn sample_agent(name: &str) -> crate::models::Agent {
        crate::models::Agent {
            kind: String::new(),
            api_version: String::new(),
            metadata: Metadata::new(name),
            spec: AgentSpec {
                instructions: "review code".to_string(),
                skills: vec![],
                mcp_servers: vec![],
                subagents: vec![],
                env: Default::default(),
            },
            status: Default::default(),
        }
    }
}
