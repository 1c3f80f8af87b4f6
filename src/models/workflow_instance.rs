//! WorkflowInstance: a bound, executable variant of a Workflow (spec §3),
//! auto-materialized the same way AgentInstance is (spec §3
//! "auto-materialized like AgentInstance").

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::impl_has_metadata;
use crate::models::envelope::Metadata;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInstanceSpec {
    pub workflow_id: String,
    #[serde(default)]
    pub resolved_variables: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowInstanceStatus {
    #[serde(default)]
    pub ready: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInstance {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub api_version: String,
    pub metadata: Metadata,
    pub spec: WorkflowInstanceSpec,
    #[serde(default)]
    pub status: WorkflowInstanceStatus,
}

impl_has_metadata!(WorkflowInstance);

pub const KIND_WORKFLOW_INSTANCE: &str = "workflowinstance";

/// Slug pattern for a Workflow's auto-materialized default instance (spec
/// §3 "Slug pattern `<workflow-slug>-default`").
pub fn default_instance_name(workflow_slug: &str) -> String {
    format!("{workflow_slug}-default")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_instance_name_appends_suffix() {
        assert_eq!(default_instance_name("nightly-sync"), "nightly-sync-default");
    }
}
