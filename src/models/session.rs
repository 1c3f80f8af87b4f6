//! Session: conversational grouping for one or more AgentExecutions over
//! an AgentInstance (spec §3). Auto-created when an AgentExecution is
//! started with only an agent reference.

use serde::{Deserialize, Serialize};

use crate::impl_has_metadata;
use crate::models::envelope::Metadata;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSpec {
    pub agent_instance_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionStatus {
    #[serde(default)]
    pub execution_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub api_version: String,
    pub metadata: Metadata,
    pub spec: SessionSpec,
    #[serde(default)]
    pub status: SessionStatus,
}

impl_has_metadata!(Session);

pub const KIND_SESSION: &str = "session";
