//! AgentInstance: a bound, executable variant of an Agent (spec §3).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::impl_has_metadata;
use crate::models::envelope::Metadata;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInstanceSpec {
    pub agent_id: String,
    /// Resolved configuration overrides captured at bind time (spec §3
    /// "holds resolved configuration").
    #[serde(default)]
    pub resolved_env: HashMap<String, String>,
    #[serde(default)]
    pub resolved_instructions: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentInstanceStatus {
    #[serde(default)]
    pub ready: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInstance {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub api_version: String,
    pub metadata: Metadata,
    pub spec: AgentInstanceSpec,
    #[serde(default)]
    pub status: AgentInstanceStatus,
}

impl_has_metadata!(AgentInstance);

pub const KIND_AGENT_INSTANCE: &str = "agentinstance";

/// Slug pattern for an Agent's auto-materialized default instance (spec
/// §4.2 "synthesize ... an instance named `<agent-slug>-default`").
pub fn default_instance_name(agent_slug: &str) -> String {
    format!("{agent_slug}-default")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_instance_name_appends_suffix() {
        assert_eq!(default_instance_name("code-reviewer"), "code-reviewer-default");
    }
}
