//! Shared resource envelope: metadata common to every resource kind.
//!
//! Generalizes the teacher's `Resource`/`ResourceMetadata` split
//! (`src/models/resource.rs`, a single generic workflow-execution resource)
//! into the typed `Metadata`/`Scope` pair spec §3 requires across eight
//! distinct resource kinds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The organization a resource lives under, or the platform namespace
/// shared by no particular organization (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    Platform,
    Organization(String),
}

/// The default organization for a local, single-operator daemon (spec §3:
/// "'local' is the default organization for the local daemon").
pub const LOCAL_ORGANIZATION: &str = "local";

impl Default for Scope {
    fn default() -> Self {
        Scope::Organization(LOCAL_ORGANIZATION.to_string())
    }
}

impl Scope {
    pub fn local() -> Self {
        Scope::Organization(LOCAL_ORGANIZATION.to_string())
    }

    pub fn is_platform(&self) -> bool {
        matches!(self, Scope::Platform)
    }

    /// Stable string form used in storage keys and slug-collision checks.
    pub fn as_key_segment(&self) -> String {
        match self {
            Scope::Platform => "platform".to_string(),
            Scope::Organization(org) => format!("org/{org}"),
        }
    }
}

/// Metadata common to every resource kind (spec §3 "Metadata").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    /// Opaque identifier, generated at create time. Format
    /// `<kind-prefix>-<monotonic-unix-nanoseconds>` (spec §4.1 BuildNewState).
    #[serde(default)]
    pub id: String,

    /// Lowercase DNS-safe derivation of `name`, unique within kind + scope.
    #[serde(default)]
    pub slug: String,

    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub scope: Scope,

    #[serde(default)]
    pub icon_url: String,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,

    /// Advanced on every successful Update (spec §3 Lifecycle); starts at 1
    /// on Create.
    #[serde(default)]
    pub version: u64,
}

impl Metadata {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Metadata {
            id: String::new(),
            slug: String::new(),
            name: name.into(),
            description: String::new(),
            scope: Scope::default(),
            icon_url: String::new(),
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }
}

/// Implemented by every `<Kind>` wrapper so pipeline steps can operate on
/// `&mut dyn HasMetadata` generically (BuildNewState, ResolveSlug, ...)
/// without each resource kind re-deriving the same boilerplate.
pub trait HasMetadata {
    fn metadata(&self) -> &Metadata;
    fn metadata_mut(&mut self) -> &mut Metadata;
}

#[macro_export]
macro_rules! impl_has_metadata {
    ($ty:ty) => {
        impl $crate::models::envelope::HasMetadata for $ty {
            fn metadata(&self) -> &$crate::models::envelope::Metadata {
                &self.metadata
            }
            fn metadata_mut(&mut self) -> &mut $crate::models::envelope::Metadata {
                &mut self.metadata
            }
        }
    };
}

/// A reference to a resource by id or by slug+scope, used by `Get`,
/// `GetByReference`, and `Delete` RPCs across every resource kind (spec
/// §6 "`GetByReference` (slug + scope)").
#[derive(Debug, Clone, Default)]
pub struct ResourceRef {
    pub id: String,
    pub slug: String,
    pub scope: Scope,
}

impl crate::pipeline::steps::ResolveTarget for ResourceRef {
    fn target_id(&self) -> Option<&str> {
        (!self.id.is_empty()).then_some(self.id.as_str())
    }

    fn target_slug(&self) -> Option<&str> {
        (!self.slug.is_empty()).then_some(self.slug.as_str())
    }

    fn target_scope(&self) -> Scope {
        self.scope.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_scope_is_local_organization() {
        assert_eq!(Scope::default(), Scope::local());
        assert_eq!(Scope::local().as_key_segment(), "org/local");
    }

    #[test]
    fn platform_scope_key_segment() {
        assert_eq!(Scope::Platform.as_key_segment(), "platform");
    }
}
