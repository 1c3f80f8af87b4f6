//! stigmer daemon library crate: a local-first control plane coordinating
//! Agents, Workflows, AgentExecutions, and WorkflowExecutions on top of a
//! Temporal workflow engine.
//!
//! `grpc` is the surface callers reach the daemon through; `controllers`
//! implement each resource kind's business logic on top of the shared
//! `pipeline` step library; `storage` is the embedded resource store;
//! `temporal` owns the Temporal client lifecycle; `broker` fans out
//! execution status updates to subscribed streams; `skills_store` and
//! `supervisor` back the Skill and subprocess/container resource kinds.

pub mod broker;
pub mod config;
pub mod controllers;
pub mod error;
pub mod grpc;
pub mod models;
pub mod pipeline;
pub mod skills_store;
pub mod storage;
pub mod supervisor;
pub mod telemetry;
pub mod temporal;

pub use error::{Result, StigmerError};
