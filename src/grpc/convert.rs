//! Proto <-> domain conversions shared by every `src/grpc/*.rs` service
//! (spec §6). Generalizes the teacher's JSON-request-to-domain-struct
//! conversion in `src/api/agents/http_handlers.rs` to typed proto messages.

use chrono::{DateTime, Utc};

use crate::error::{Result, StigmerError};
use crate::grpc::pb;
use crate::models::envelope::{Metadata, ResourceRef, Scope};

pub fn scope_to_pb(scope: &Scope) -> pb::Scope {
    let kind = match scope {
        Scope::Platform => pb::scope::Kind::Platform(true),
        Scope::Organization(org) => pb::scope::Kind::Organization(org.clone()),
    };
    pb::Scope { kind: Some(kind) }
}

pub fn scope_from_pb(scope: Option<pb::Scope>) -> Scope {
    match scope.and_then(|s| s.kind) {
        Some(pb::scope::Kind::Platform(_)) => Scope::Platform,
        Some(pb::scope::Kind::Organization(org)) => Scope::Organization(org),
        None => Scope::default(),
    }
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339()
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse().unwrap_or_else(|_| Utc::now())
}

pub fn metadata_to_pb(metadata: &Metadata) -> pb::Metadata {
    pb::Metadata {
        id: metadata.id.clone(),
        slug: metadata.slug.clone(),
        name: metadata.name.clone(),
        description: metadata.description.clone(),
        scope: Some(scope_to_pb(&metadata.scope)),
        icon_url: metadata.icon_url.clone(),
        created_at: format_timestamp(metadata.created_at),
        updated_at: format_timestamp(metadata.updated_at),
        version: metadata.version,
    }
}

/// Builds the subset of `Metadata` a Create/Update/Apply request carries:
/// name, description, scope, icon, and (for Update/Apply) id/slug. The
/// pipeline's `BuildNewState`/`BuildUpdateState` steps own everything else
/// (id assignment, timestamps, version counter).
pub fn metadata_from_pb(metadata: Option<pb::Metadata>) -> Metadata {
    let metadata = metadata.unwrap_or_default();
    Metadata {
        id: metadata.id,
        slug: metadata.slug,
        name: metadata.name,
        description: metadata.description,
        scope: scope_from_pb(metadata.scope),
        icon_url: metadata.icon_url,
        created_at: if metadata.created_at.is_empty() {
            Utc::now()
        } else {
            parse_timestamp(&metadata.created_at)
        },
        updated_at: if metadata.updated_at.is_empty() {
            Utc::now()
        } else {
            parse_timestamp(&metadata.updated_at)
        },
        version: metadata.version,
    }
}

pub fn reference_from_pb(reference: pb::ResourceRef) -> ResourceRef {
    ResourceRef {
        id: reference.id,
        slug: reference.slug,
        scope: scope_from_pb(reference.scope),
    }
}

pub fn list_scope_from_pb(list: Option<pb::ListRequest>) -> Option<Scope> {
    let list = list?;
    list.has_scope.then(|| scope_from_pb(list.scope))
}

/// Parses a JSON sidecar field (`spec_json`, `tasks_json`, ...) into `T`,
/// surfacing malformed payloads as `invalid-argument` (spec §7: validation
/// failures return invalid-argument with no side effects).
pub fn parse_json<T: serde::de::DeserializeOwned>(field: &str, raw: &str) -> Result<T> {
    if raw.is_empty() {
        return serde_json::from_str("null")
            .map_err(|err| StigmerError::invalid_argument(format!("{field}: {err}")));
    }
    serde_json::from_str(raw).map_err(|err| StigmerError::invalid_argument(format!("{field}: {err}")))
}

pub fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}
