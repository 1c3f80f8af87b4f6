//! The low-level dial/health-check/worker-restart operations the manager
//! drives. Isolated behind a trait so the manager's reconnect/backoff
//! logic is testable against a fake without a live Temporal server, and
//! so the one place that actually touches `temporalio-client` /
//! `temporal-sdk-core` stays small (spec §4.3).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::TemporalConfig;
use crate::error::{Result, StigmerError};
use crate::temporal::creator::{WorkflowCreator, WorkflowHandle, WorkflowStartRequest};

/// A task queue this daemon polls, with the activities/workflows it
/// registers there (spec §4.3 "A mutex-guarded list of registered worker
/// specifications").
#[derive(Debug, Clone)]
pub struct WorkerSpec {
    pub task_queue: String,
    pub registered_workflows: Vec<&'static str>,
    pub registered_activities: Vec<&'static str>,
}

#[async_trait]
pub trait TemporalTransport: Send + Sync {
    async fn dial(&self, config: &TemporalConfig) -> Result<Arc<dyn WorkflowCreator>>;

    async fn describe_namespace(&self, config: &TemporalConfig, deadline: Duration) -> Result<()>;

    async fn restart_workers(&self, specs: &[WorkerSpec]) -> Result<()>;
}

/// The real Temporal-backed transport: dials a `temporalio_client::Client`
/// and wraps it as a `WorkflowCreator` that starts workflows via
/// `start_workflow`. Worker registration against `temporal-sdk-core`'s
/// worker runtime is not wired up yet (see `restart_workers` below); this
/// transport only covers workflow start and namespace health checks.
pub struct RealTemporalTransport;

struct ClientWorkflowCreator {
    client: temporalio_client::Client,
}

#[async_trait]
impl WorkflowCreator for ClientWorkflowCreator {
    async fn start(&self, request: WorkflowStartRequest) -> Result<WorkflowHandle> {
        let run = self
            .client
            .start_workflow(
                request.workflow_type.clone(),
                request.task_queue.clone(),
                request.workflow_id.clone(),
                workflow_input_payload(&request.input)?,
            )
            .await
            .map_err(|err| StigmerError::unavailable(format!("Temporal start_workflow failed: {err}")))?;
        Ok(WorkflowHandle {
            workflow_id: request.workflow_id,
            run_id: run.run_id,
        })
    }
}

fn workflow_input_payload(input: &Value) -> Result<Vec<u8>> {
    serde_json::to_vec(input).map_err(StigmerError::from)
}

#[async_trait]
impl TemporalTransport for RealTemporalTransport {
    async fn dial(&self, config: &TemporalConfig) -> Result<Arc<dyn WorkflowCreator>> {
        let client = temporalio_client::Client::connect(temporalio_client::ClientOptions {
            target_url: config.target.clone(),
            namespace: config.namespace.clone(),
            ..Default::default()
        })
        .await
        .map_err(|err| StigmerError::unavailable(format!("Temporal dial failed: {err}")))?;
        Ok(Arc::new(ClientWorkflowCreator { client }))
    }

    async fn describe_namespace(&self, config: &TemporalConfig, deadline: Duration) -> Result<()> {
        let client = temporalio_client::Client::connect(temporalio_client::ClientOptions {
            target_url: config.target.clone(),
            namespace: config.namespace.clone(),
            ..Default::default()
        })
        .await
        .map_err(|err| StigmerError::unavailable(format!("Temporal dial failed: {err}")))?;
        tokio::time::timeout(deadline, client.describe_namespace(config.namespace.clone()))
            .await
            .map_err(|_| StigmerError::unavailable("Temporal DescribeNamespace timed out"))?
            .map_err(|err| StigmerError::unavailable(format!("Temporal DescribeNamespace failed: {err}")))?;
        Ok(())
    }

    async fn restart_workers(&self, specs: &[WorkerSpec]) -> Result<()> {
        // Stop-gracefully-then-start-fresh (spec §4.3 steps 1-2) needs a
        // `temporal-sdk-core` worker built from the client just dialed
        // above, polling each spec's task queue. That worker-runtime
        // wiring isn't implemented yet, so a caller with workers to
        // restart is told plainly rather than being let to believe its
        // workers are live against the new client (spec §9 "never a
        // null-object creator that silently succeeds" applies here too).
        if specs.is_empty() {
            return Ok(());
        }
        let queues: Vec<&str> = specs.iter().map(|spec| spec.task_queue.as_str()).collect();
        Err(StigmerError::unavailable(format!(
            "Temporal worker runtime is not implemented in this build; {} worker(s) on queues [{}] were not restarted against the new client",
            specs.len(),
            queues.join(", "),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_spec_carries_its_registrations() {
        let spec = WorkerSpec {
            task_queue: "stigmer-agent-execution".to_string(),
            registered_workflows: vec!["AgentExecutionWorkflow"],
            registered_activities: vec!["RunAgentTurn"],
        };
        assert_eq!(spec.registered_workflows.len(), 1);
    }

    #[tokio::test]
    async fn restart_workers_fails_loudly_instead_of_pretending_to_succeed() {
        let transport = RealTemporalTransport;
        let specs = vec![WorkerSpec {
            task_queue: "stigmer-agent-execution".to_string(),
            registered_workflows: vec!["AgentExecutionWorkflow"],
            registered_activities: vec!["RunAgentTurn"],
        }];
        let err = transport.restart_workers(&specs).await.unwrap_err();
        assert!(matches!(err, StigmerError::Unavailable { .. }));
        assert!(err.to_string().contains("stigmer-agent-execution"));
    }

    #[tokio::test]
    async fn restart_workers_is_a_no_op_with_no_specs_registered() {
        let transport = RealTemporalTransport;
        transport.restart_workers(&[]).await.unwrap();
    }
}
