//! Resource controllers (spec §4.2): one per resource kind, each composing
//! the standard pipeline step library with resource-specific steps.
//!
//! `downstream` holds the in-process direct-call clients (§4.2.1) that let
//! e.g. `AgentController` invoke `AgentInstanceController` without going
//! over gRPC.

pub mod agent;
pub mod agent_execution;
pub mod agent_instance;
pub mod downstream;
pub mod environment;
pub mod session;
pub mod skill;
pub mod workflow;
pub mod workflow_execution;
pub mod workflow_instance;
