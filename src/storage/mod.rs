//! The resource store: an embedded, ordered key-value database holding
//! every resource kind's serialized bytes, plus the audit namespace of
//! prior versions (spec §3 "Keys in the store are `<kind>/<id>`...").
//!
//! Generalizes the teacher's `WorkflowStorage` trait (`src/engine/storage.rs`)
//! from two hardcoded resource types (`WorkflowDefinition`, `Resource`) into
//! a byte-oriented store any resource kind can sit on top of, plus a
//! `sled`-backed implementation replacing the teacher's NATS/in-memory
//! backends (spec §4.1's embedded-KV requirement: single-process, no
//! external dependency for local-first operation).

pub mod codec;
pub mod codecs;
pub mod keys;
pub mod sled_store;

use async_trait::async_trait;

use crate::error::Result;
use crate::storage::codec::StorageCodec;

/// Storage backend interface. Operates on raw bytes; resource-kind typing
/// lives one layer up so the trait stays object-safe across all nine
/// resource kinds (spec §3's "Ownership: the store exclusively owns
/// persisted bytes").
#[async_trait]
pub trait Store: Send + Sync {
    /// Persist `bytes` under `<kind>/<id>`. If a prior value exists under
    /// that key, it is archived to the audit namespace first (spec §3
    /// invariant 3) unless `skip_audit` is set (Create and UpdateStatus
    /// bypass the audit write per spec §3's Lifecycle section).
    async fn save_resource(
        &self,
        kind: &str,
        id: &str,
        bytes: Vec<u8>,
        skip_audit: bool,
    ) -> Result<()>;

    async fn get_resource(&self, kind: &str, id: &str) -> Result<Option<Vec<u8>>>;

    async fn list_resources(&self, kind: &str) -> Result<Vec<Vec<u8>>>;

    /// Remove the resource, returning its last-persisted bytes for the
    /// caller to use as the delete response (spec §3 Lifecycle: "existing
    /// state loaded, returned to caller for audit use, then removed").
    async fn delete_resource(&self, kind: &str, id: &str) -> Result<Option<Vec<u8>>>;

    /// Remove every resource of a kind; used by administrative cleanup.
    async fn delete_resources_by_kind(&self, kind: &str) -> Result<u64>;
}

/// Encode `resource` to its storage proto and save it, per spec §4.5.
pub async fn save_resource<T: StorageCodec + Sync>(
    store: &dyn Store,
    kind: &str,
    id: &str,
    resource: &T,
    skip_audit: bool,
) -> Result<()> {
    let bytes = codec::encode(resource);
    store.save_resource(kind, id, bytes, skip_audit).await
}

/// Fetch and decode a resource; `Ok(None)` means the key is absent.
pub async fn get_resource<T: StorageCodec>(store: &dyn Store, kind: &str, id: &str) -> Result<Option<T>> {
    match store.get_resource(kind, id).await? {
        Some(bytes) => Ok(Some(codec::decode(&bytes)?)),
        None => Ok(None),
    }
}

/// List and decode every resource of a kind. A single corrupt record
/// fails the whole call rather than silently dropping entries.
pub async fn list_resources<T: StorageCodec>(store: &dyn Store, kind: &str) -> Result<Vec<T>> {
    store
        .list_resources(kind)
        .await?
        .into_iter()
        .map(|bytes| codec::decode(&bytes))
        .collect()
}

pub async fn delete_resource<T: StorageCodec>(store: &dyn Store, kind: &str, id: &str) -> Result<Option<T>> {
    match store.delete_resource(kind, id).await? {
        Some(bytes) => Ok(Some(codec::decode(&bytes)?)),
        None => Ok(None),
    }
}
