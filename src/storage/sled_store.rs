//! `sled`-backed `Store` implementation (spec §4.1: an embedded ordered KV
//! store keeps the daemon single-process and dependency-free for local-first
//! operation, replacing the teacher's NATS-backed `NatsStorage`
//! (`src/engine/nats_storage.rs`)).
//!
//! `sled` is itself synchronous; every operation here runs on the blocking
//! thread pool via `spawn_blocking` so callers can `.await` it from the
//! async controller pipelines without stalling the reactor.

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{Result, StigmerError};
use crate::storage::keys;
use crate::storage::Store;

pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    pub fn open(path: &Path) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(SledStore { db })
    }

    #[cfg(test)]
    pub fn open_temporary() -> (Self, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let store = Self::open(dir.path()).expect("open sled db");
        (store, dir)
    }
}

fn join_error(err: tokio::task::JoinError) -> StigmerError {
    StigmerError::internal(format!("blocking task panicked: {err}"))
}

#[async_trait]
impl Store for SledStore {
    async fn save_resource(
        &self,
        kind: &str,
        id: &str,
        bytes: Vec<u8>,
        skip_audit: bool,
    ) -> Result<()> {
        let db = self.db.clone();
        let kind = kind.to_string();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let primary = keys::primary_key(&kind, &id);
            if skip_audit {
                db.insert(primary, bytes)?;
            } else {
                // Audit-then-overwrite must be atomic (spec §3 invariant 3):
                // snapshot the prior value to the audit namespace and
                // overwrite the primary key in one transaction.
                let nanos = Utc::now().timestamp_nanos_opt().unwrap_or(0);
                let audit = keys::audit_key(&kind, &id, nanos);
                db.transaction(|tx| {
                    if let Some(prior) = tx.get(&primary)? {
                        tx.insert(audit.as_slice(), prior)?;
                    }
                    tx.insert(primary.as_slice(), bytes.as_slice())?;
                    Ok::<(), sled::transaction::ConflictableTransactionError<sled::Error>>(())
                })
                .map_err(|e| StigmerError::internal(format!("audit transaction failed: {e}")))?;
            }
            db.flush()?;
            Ok(())
        })
        .await
        .map_err(join_error)??;
        Ok(())
    }

    async fn get_resource(&self, kind: &str, id: &str) -> Result<Option<Vec<u8>>> {
        let db = self.db.clone();
        let primary = keys::primary_key(kind, id);
        tokio::task::spawn_blocking(move || -> Result<Option<Vec<u8>>> {
            Ok(db.get(primary)?.map(|ivec| ivec.to_vec()))
        })
        .await
        .map_err(join_error)?
    }

    async fn list_resources(&self, kind: &str) -> Result<Vec<Vec<u8>>> {
        let db = self.db.clone();
        let prefix = keys::kind_prefix(kind);
        tokio::task::spawn_blocking(move || -> Result<Vec<Vec<u8>>> {
            let mut out = Vec::new();
            for entry in db.scan_prefix(&prefix) {
                let (_, value) = entry?;
                out.push(value.to_vec());
            }
            Ok(out)
        })
        .await
        .map_err(join_error)?
    }

    async fn delete_resource(&self, kind: &str, id: &str) -> Result<Option<Vec<u8>>> {
        let db = self.db.clone();
        let primary = keys::primary_key(kind, id);
        tokio::task::spawn_blocking(move || -> Result<Option<Vec<u8>>> {
            let prior = db.remove(primary)?.map(|ivec| ivec.to_vec());
            db.flush()?;
            Ok(prior)
        })
        .await
        .map_err(join_error)?
    }

    async fn delete_resources_by_kind(&self, kind: &str) -> Result<u64> {
        let db = self.db.clone();
        let prefix = keys::kind_prefix(kind);
        tokio::task::spawn_blocking(move || -> Result<u64> {
            let keys_to_remove: Vec<_> = db
                .scan_prefix(&prefix)
                .keys()
                .collect::<std::result::Result<Vec<_>, _>>()?;
            let count = keys_to_remove.len() as u64;
            for key in keys_to_remove {
                db.remove(key)?;
            }
            db.flush()?;
            Ok(count)
        })
        .await
        .map_err(join_error)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_get_round_trips() {
        let (store, _dir) = SledStore::open_temporary();
        store
            .save_resource("agent", "agent-1", b"hello".to_vec(), true)
            .await
            .unwrap();
        let bytes = store.get_resource("agent", "agent-1").await.unwrap();
        assert_eq!(bytes, Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn update_archives_prior_version_before_overwrite() {
        let (store, _dir) = SledStore::open_temporary();
        store
            .save_resource("agent", "agent-1", b"v1".to_vec(), true)
            .await
            .unwrap();
        store
            .save_resource("agent", "agent-1", b"v2".to_vec(), false)
            .await
            .unwrap();

        let current = store.get_resource("agent", "agent-1").await.unwrap();
        assert_eq!(current, Some(b"v2".to_vec()));

        let audit_prefix = keys::audit_prefix("agent", "agent-1");
        let mut found_prior = false;
        for entry in store.db.scan_prefix(&audit_prefix) {
            let (_, value) = entry.unwrap();
            if value.as_ref() == b"v1" {
                found_prior = true;
            }
        }
        assert!(found_prior, "expected prior version snapshotted to audit namespace");
    }

    #[tokio::test]
    async fn list_resources_only_returns_matching_kind() {
        let (store, _dir) = SledStore::open_temporary();
        store
            .save_resource("agent", "agent-1", b"a".to_vec(), true)
            .await
            .unwrap();
        store
            .save_resource("session", "session-1", b"s".to_vec(), true)
            .await
            .unwrap();
        let agents = store.list_resources("agent").await.unwrap();
        assert_eq!(agents, vec![b"a".to_vec()]);
    }

    #[tokio::test]
    async fn delete_resource_returns_prior_bytes_and_removes_key() {
        let (store, _dir) = SledStore::open_temporary();
        store
            .save_resource("agent", "agent-1", b"a".to_vec(), true)
            .await
            .unwrap();
        let deleted = store.delete_resource("agent", "agent-1").await.unwrap();
        assert_eq!(deleted, Some(b"a".to_vec()));
        assert_eq!(store.get_resource("agent", "agent-1").await.unwrap(), None);
    }
}
