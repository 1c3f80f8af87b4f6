//! Daemon entry point: assembles every controller, the Temporal manager,
//! the subprocess/container supervisor, and the watchdog, then serves the
//! gRPC surface and the local log-HTTP endpoint side by side until a
//! shutdown signal arrives.
//!
//! Grounded on teacher `src/bin/server.rs`'s builder-assembly-then-serve
//! shape, generalized from the GraphQL/axum server it bootstraps to the
//! tonic/axum pair this daemon serves.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use stigmer::broker::StreamBroker;
use stigmer::config::{DaemonConfig, Mode};
use stigmer::controllers::agent::AgentController;
use stigmer::controllers::agent_execution::AgentExecutionController;
use stigmer::controllers::agent_instance::AgentInstanceController;
use stigmer::controllers::downstream::{AgentInstanceClient, SessionClient, WorkflowInstanceClient};
use stigmer::controllers::environment::EnvironmentController;
use stigmer::controllers::session::SessionController;
use stigmer::controllers::skill::SkillController;
use stigmer::controllers::workflow::WorkflowController;
use stigmer::controllers::workflow_execution::WorkflowExecutionController;
use stigmer::controllers::workflow_instance::WorkflowInstanceController;
use stigmer::grpc::{self, Controllers};
use stigmer::models::{AgentExecution, WorkflowExecution};
use stigmer::skills_store::SkillArtifactStore;
use stigmer::storage::sled_store::SledStore;
use stigmer::supervisor::logs::LogsState;
use stigmer::supervisor::watchdog::{Probe, Watchdog};
use stigmer::supervisor::{Component, Supervisor};
use stigmer::temporal::transport::RealTemporalTransport;
use stigmer::temporal::{CreatorSink, TemporalManager, WorkerSpec};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = DaemonConfig::load()?;
    let _telemetry_guard = stigmer::telemetry::init(&config.logs_dir(), "stigmerd")?;

    info!(grpc_addr = %config.grpc_addr, mode = ?config.mode, "starting stigmerd");

    let store: Arc<dyn stigmer::storage::Store> = Arc::new(SledStore::open(&config.data_dir())?);
    let artifacts = Arc::new(SkillArtifactStore::new(config.skills_dir()));

    let mut supervisor = Supervisor::new(config.clone())?;
    supervisor.acquire_temporal_lock()?;
    let supervisor = Arc::new(supervisor);

    if config.mode == Mode::Local {
        match supervisor.start_workflow_runner() {
            Ok(pid) => info!(pid, "workflow-runner started"),
            Err(err) => warn!(error = %err, "failed to start workflow-runner; continuing without it"),
        }
    }

    let agent_instance = Arc::new(AgentInstanceController::new(store.clone()));
    let session = Arc::new(SessionController::new(store.clone()));
    let workflow_instance = Arc::new(WorkflowInstanceController::new(store.clone()));
    let environment = Arc::new(EnvironmentController::new(store.clone()));
    let skill = Arc::new(SkillController::new(store.clone(), artifacts));

    let agent = Arc::new(AgentController::new(
        store.clone(),
        agent_instance.clone() as Arc<dyn AgentInstanceClient>,
    ));
    let workflow = Arc::new(WorkflowController::new(
        store.clone(),
        workflow_instance.clone() as Arc<dyn WorkflowInstanceClient>,
        &config.temporal.task_queue_prefix,
    ));

    let agent_execution_broker = Arc::new(StreamBroker::<AgentExecution>::new());
    let workflow_execution_broker = Arc::new(StreamBroker::<WorkflowExecution>::new());

    let agent_execution = Arc::new(AgentExecutionController::new(
        store.clone(),
        agent_instance.clone() as Arc<dyn AgentInstanceClient>,
        session.clone() as Arc<dyn SessionClient>,
        &config.temporal.task_queue_prefix,
        agent_execution_broker,
    ));
    let workflow_execution = Arc::new(WorkflowExecutionController::new(
        store.clone(),
        &config.temporal.task_queue_prefix,
        workflow_execution_broker,
    ));

    let transport = Arc::new(RealTemporalTransport);
    let temporal = TemporalManager::new(config.temporal.clone(), transport);
    temporal.register_sink(workflow.creator_handle() as Arc<dyn CreatorSink>);
    temporal.register_sink(agent_execution.creator_handle() as Arc<dyn CreatorSink>);
    temporal.register_sink(workflow_execution.creator_handle() as Arc<dyn CreatorSink>);
    temporal.register_worker(WorkerSpec {
        task_queue: format!("{}-validation", config.temporal.task_queue_prefix),
        registered_workflows: vec!["validate_workflow_definition"],
        registered_activities: vec![],
    });
    temporal.register_worker(WorkerSpec {
        task_queue: format!("{}-agent-execution", config.temporal.task_queue_prefix),
        registered_workflows: vec!["run_agent_execution"],
        registered_activities: vec!["RunAgentTurn"],
    });
    temporal.register_worker(WorkerSpec {
        task_queue: format!("{}-workflow-execution", config.temporal.task_queue_prefix),
        registered_workflows: vec!["run_workflow_execution"],
        registered_activities: vec!["RunWorkflowStep"],
    });

    temporal.connect_initial().await;
    let health_probe = temporal.spawn_health_probe();

    let watchdog = Arc::new(Watchdog::new());
    watchdog.register(
        Component::Server,
        Arc::new(ServerProbe) as Arc<dyn Probe>,
    );
    watchdog.register(
        Component::WorkflowRunner,
        Arc::new(WorkflowRunnerProbe {
            supervisor: supervisor.clone(),
            grpc_addr: config.grpc_addr.clone(),
        }) as Arc<dyn Probe>,
    );
    watchdog.register(
        Component::AgentRunner,
        Arc::new(AgentRunnerProbe {
            supervisor: supervisor.clone(),
        }) as Arc<dyn Probe>,
    );
    let watchdog_task = watchdog.clone().spawn();

    let logs_state = LogsState {
        server_log_path: config.logs_dir().join("stigmerd.log"),
        workflow_runner_log_path: config.logs_dir().join("workflow-runner.log"),
        agent_runner: Arc::new(stigmer::supervisor::container::ContainerSupervisor::connect(
            config.supervisor.agent_runner_container_name.clone(),
        )?),
    };
    let logs_router = stigmer::supervisor::logs::router(logs_state);
    let log_http_addr: std::net::SocketAddr = config.log_http_addr.parse()?;
    let log_listener = tokio::net::TcpListener::bind(log_http_addr).await?;
    let log_http_task = tokio::spawn(async move {
        if let Err(err) = axum::serve(log_listener, logs_router).await {
            error!(error = %err, "log HTTP server exited");
        }
    });

    let controllers = Controllers {
        agent,
        agent_instance,
        session,
        agent_execution,
        environment,
        skill,
        workflow,
        workflow_instance,
        workflow_execution,
    };
    let router = grpc::build_router(controllers);
    let grpc_addr: std::net::SocketAddr = config.grpc_addr.parse()?;

    let shutdown_signal = wait_for_shutdown_signal();
    tokio::select! {
        result = router.serve_with_shutdown(grpc_addr, shutdown_signal) => {
            if let Err(err) = result {
                error!(error = %err, "gRPC server exited with error");
            }
        }
    }

    info!("shutdown signal received; stopping supervised components");
    health_probe.abort();
    watchdog_task.abort();
    log_http_task.abort();
    supervisor.shutdown(std::time::Duration::from_secs(10)).await;

    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let Ok(mut sig) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) else {
            std::future::pending::<()>().await;
            return;
        };
        sig.recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// The daemon process probing itself: if this loop runs at all the server
/// is alive, and there is no in-process mechanism for the daemon to
/// restart itself, so `restart` only logs (spec §4.7 registers the server
/// as a watched component mainly so its state shows up next to the other
/// two in `stigmer-admin supervisor status`).
struct ServerProbe;

#[async_trait]
impl Probe for ServerProbe {
    async fn startup(&self) -> bool {
        true
    }
    async fn liveness(&self) -> bool {
        true
    }
    async fn restart(&self) -> stigmer::Result<()> {
        warn!("watchdog asked to restart the server component; the daemon cannot restart itself in-process");
        Ok(())
    }
}

struct WorkflowRunnerProbe {
    supervisor: Arc<Supervisor>,
    grpc_addr: String,
}

#[async_trait]
impl Probe for WorkflowRunnerProbe {
    async fn startup(&self) -> bool {
        self.liveness().await
    }

    async fn liveness(&self) -> bool {
        match self.supervisor.workflow_runner_pid() {
            Some(pid) => stigmer::supervisor::process::process_exists(pid),
            None => false,
        }
    }

    async fn restart(&self) -> stigmer::Result<()> {
        let _ = &self.grpc_addr;
        self.supervisor.start_workflow_runner().map(|_| ())
    }
}

struct AgentRunnerProbe {
    supervisor: Arc<Supervisor>,
}

#[async_trait]
impl Probe for AgentRunnerProbe {
    async fn startup(&self) -> bool {
        self.liveness().await
    }

    async fn liveness(&self) -> bool {
        self.supervisor.agent_runner().is_healthy().await.unwrap_or(false)
    }

    async fn restart(&self) -> stigmer::Result<()> {
        Err(stigmer::StigmerError::internal(
            "agent-runner restart requires an image reference; not auto-restarted by the watchdog",
        ))
    }
}
