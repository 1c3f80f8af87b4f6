//! Environment: a named key-value bag of strings or marked-secret strings
//! (spec §3 "Environment"). Scope is organization or identity-account;
//! platform scope is rejected at validation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::impl_has_metadata;
use crate::models::envelope::Metadata;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentValue {
    pub value: String,
    #[serde(default)]
    pub secret: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentSpec {
    #[serde(default)]
    pub variables: HashMap<String, EnvironmentValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentStatus {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub api_version: String,
    pub metadata: Metadata,
    pub spec: EnvironmentSpec,
    #[serde(default)]
    pub status: EnvironmentStatus,
}

impl_has_metadata!(Environment);

pub const KIND_ENVIRONMENT: &str = "environment";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::envelope::Scope;

    #[test]
    fn platform_scope_is_rejected_by_validation_not_construction() {
        // Construction itself doesn't enforce scope; ValidateProto in the
        // pipeline is responsible for rejecting Scope::Platform (spec §3
        // "platform scope is rejected"). This test documents that the
        // struct admits it so the pipeline step is load-bearing.
        let mut metadata = Metadata::new("ci-secrets");
        metadata.scope = Scope::Platform;
        assert!(metadata.scope.is_platform());
    }
}
