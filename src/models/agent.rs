//! Agent: a declarative AI-agent specification (spec §3 "Agent").
//!
//! Generalizes the teacher's `AgentDefinition` (`src/models/agent.rs`,
//! previously a single LLM-provider-bound struct) into the envelope-shaped
//! resource this daemon persists: a declarative spec the controller
//! validates and stores, plus an observed status the system manages.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::impl_has_metadata;
use crate::models::envelope::Metadata;

/// A binding to an MCP server an agent may call tools on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerBinding {
    pub name: String,
    pub endpoint: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// Reference to another Agent usable as a subagent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubagentRef {
    pub agent_id: String,
    pub alias: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    pub instructions: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub mcp_servers: Vec<McpServerBinding>,
    #[serde(default)]
    pub subagents: Vec<SubagentRef>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentStatus {
    /// Populated by `CreateDefaultInstance`/`UpdateAgentStatusWithDefaultInstance`
    /// (spec §4.2) right after the Agent's first persist.
    #[serde(default)]
    pub default_instance_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub api_version: String,
    pub metadata: Metadata,
    pub spec: AgentSpec,
    #[serde(default)]
    pub status: AgentStatus,
}

impl_has_metadata!(Agent);

pub const KIND_AGENT: &str = "agent";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_default_instance_id_starts_empty() {
        let status = AgentStatus::default();
        assert!(status.default_instance_id.is_empty());
    }
}
