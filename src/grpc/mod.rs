//! gRPC surface (spec §6): one `<Resource>CommandController` +
//! `<Resource>QueryController` pair per resource kind, each a thin
//! wrapper translating `tonic::Request<pb::X>` into a domain-struct
//! controller call and back — the idiomatic-gRPC equivalent of the
//! teacher's `src/api/agents/http_handlers.rs` thin-handler layer.

pub mod agent;
pub mod agent_execution;
pub mod agent_instance;
pub mod convert;
pub mod environment;
pub mod pb;
pub mod session;
pub mod skill;
pub mod workflow;
pub mod workflow_execution;
pub mod workflow_instance;

use std::sync::Arc;

use tonic::transport::server::Router;
use tonic::transport::Server;

use crate::controllers::agent::AgentController;
use crate::controllers::agent_execution::AgentExecutionController;
use crate::controllers::agent_instance::AgentInstanceController;
use crate::controllers::environment::EnvironmentController;
use crate::controllers::session::SessionController;
use crate::controllers::skill::SkillController;
use crate::controllers::workflow::WorkflowController;
use crate::controllers::workflow_execution::WorkflowExecutionController;
use crate::controllers::workflow_instance::WorkflowInstanceController;

/// Every resource controller, constructed once at daemon bootstrap (spec
/// §4.2 "Controllers are constructed once at daemon bootstrap and injected
/// into the gRPC service layer") and shared across every RPC call.
pub struct Controllers {
    pub agent: Arc<AgentController>,
    pub agent_instance: Arc<AgentInstanceController>,
    pub session: Arc<SessionController>,
    pub agent_execution: Arc<AgentExecutionController>,
    pub environment: Arc<EnvironmentController>,
    pub skill: Arc<SkillController>,
    pub workflow: Arc<WorkflowController>,
    pub workflow_instance: Arc<WorkflowInstanceController>,
    pub workflow_execution: Arc<WorkflowExecutionController>,
}

/// Assembles the tonic router every `<Resource>*Controller` service is
/// registered on, plus the standard health and reflection services (spec
/// §6; grounded on the teacher's tonic-build/tonic-health/tonic-reflection
/// dependency trio).
pub fn build_router(controllers: Controllers) -> Router {
    use pb::agent_command_controller_server::AgentCommandControllerServer;
    use pb::agent_execution_command_controller_server::AgentExecutionCommandControllerServer;
    use pb::agent_execution_query_controller_server::AgentExecutionQueryControllerServer;
    use pb::agent_instance_command_controller_server::AgentInstanceCommandControllerServer;
    use pb::agent_instance_query_controller_server::AgentInstanceQueryControllerServer;
    use pb::agent_query_controller_server::AgentQueryControllerServer;
    use pb::environment_command_controller_server::EnvironmentCommandControllerServer;
    use pb::environment_query_controller_server::EnvironmentQueryControllerServer;
    use pb::session_command_controller_server::SessionCommandControllerServer;
    use pb::session_query_controller_server::SessionQueryControllerServer;
    use pb::skill_command_controller_server::SkillCommandControllerServer;
    use pb::skill_query_controller_server::SkillQueryControllerServer;
    use pb::workflow_command_controller_server::WorkflowCommandControllerServer;
    use pb::workflow_execution_command_controller_server::WorkflowExecutionCommandControllerServer;
    use pb::workflow_execution_query_controller_server::WorkflowExecutionQueryControllerServer;
    use pb::workflow_instance_command_controller_server::WorkflowInstanceCommandControllerServer;
    use pb::workflow_instance_query_controller_server::WorkflowInstanceQueryControllerServer;
    use pb::workflow_query_controller_server::WorkflowQueryControllerServer;

    let reflection = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(pb::FILE_DESCRIPTOR_SET)
        .build_v1()
        .expect("gRPC reflection descriptor set is malformed");

    let (mut health_reporter, health_service) = tonic_health::server::health_reporter();
    // Empty service name reports overall server health (grpc.health.v1 convention).
    tokio::spawn(async move {
        health_reporter
            .set_service_status("", tonic_health::ServingStatus::Serving)
            .await;
    });

    Server::builder()
        .add_service(health_service)
        .add_service(reflection)
        .add_service(AgentCommandControllerServer::new(agent::AgentCommandService {
            controller: controllers.agent.clone(),
        }))
        .add_service(AgentQueryControllerServer::new(agent::AgentQueryService {
            controller: controllers.agent,
        }))
        .add_service(AgentInstanceCommandControllerServer::new(
            agent_instance::AgentInstanceCommandService {
                controller: controllers.agent_instance.clone(),
            },
        ))
        .add_service(AgentInstanceQueryControllerServer::new(
            agent_instance::AgentInstanceQueryService {
                controller: controllers.agent_instance,
            },
        ))
        .add_service(SessionCommandControllerServer::new(session::SessionCommandService {
            controller: controllers.session.clone(),
        }))
        .add_service(SessionQueryControllerServer::new(session::SessionQueryService {
            controller: controllers.session,
        }))
        .add_service(AgentExecutionCommandControllerServer::new(
            agent_execution::AgentExecutionCommandService {
                controller: controllers.agent_execution.clone(),
            },
        ))
        .add_service(AgentExecutionQueryControllerServer::new(
            agent_execution::AgentExecutionQueryService {
                controller: controllers.agent_execution,
            },
        ))
        .add_service(EnvironmentCommandControllerServer::new(
            environment::EnvironmentCommandService {
                controller: controllers.environment.clone(),
            },
        ))
        .add_service(EnvironmentQueryControllerServer::new(environment::EnvironmentQueryService {
            controller: controllers.environment,
        }))
        .add_service(SkillCommandControllerServer::new(skill::SkillCommandService {
            controller: controllers.skill.clone(),
        }))
        .add_service(SkillQueryControllerServer::new(skill::SkillQueryService {
            controller: controllers.skill,
        }))
        .add_service(WorkflowCommandControllerServer::new(workflow::WorkflowCommandService {
            controller: controllers.workflow.clone(),
        }))
        .add_service(WorkflowQueryControllerServer::new(workflow::WorkflowQueryService {
            controller: controllers.workflow,
        }))
        .add_service(WorkflowInstanceCommandControllerServer::new(
            workflow_instance::WorkflowInstanceCommandService {
                controller: controllers.workflow_instance.clone(),
            },
        ))
        .add_service(WorkflowInstanceQueryControllerServer::new(
            workflow_instance::WorkflowInstanceQueryService {
                controller: controllers.workflow_instance,
            },
        ))
        .add_service(WorkflowExecutionCommandControllerServer::new(
            workflow_execution::WorkflowExecutionCommandService {
                controller: controllers.workflow_execution.clone(),
            },
        ))
        .add_service(WorkflowExecutionQueryControllerServer::new(
            workflow_execution::WorkflowExecutionQueryService {
                controller: controllers.workflow_execution,
            },
        ))
}
