//! Session controller (spec §4.2): conversational grouping over an
//! AgentInstance, usually synthesized by `AgentExecution.Create` via the
//! `SessionClient` in-process call rather than created directly by a
//! caller.

use std::sync::Arc;

use async_trait::async_trait;

use crate::controllers::downstream::SessionClient;
use crate::error::StigmerError;
use crate::models::envelope::{HasMetadata, Metadata, ResourceRef, Scope};
use crate::models::{Session, SessionSpec, SessionStatus, KIND_SESSION};
use crate::pipeline::steps::{BuildNewState, DeleteResource, LoadExisting, LoadExistingForDelete, ValidateProto};
use crate::pipeline::{Pipeline, RequestContext};
use crate::storage::{self, Store};

pub struct SessionController {
    store: Arc<dyn Store>,
}

impl SessionController {
    pub fn new(store: Arc<dyn Store>) -> Self {
        SessionController { store }
    }

    fn validate(input: &Session) -> crate::error::Result<()> {
        if input.spec.agent_instance_id.is_empty() {
            return Err(StigmerError::invalid_argument("Session requires an agent_instance_id"));
        }
        Ok(())
    }

    pub async fn create(&self, mut input: Session) -> crate::error::Result<Session> {
        input.kind = "Session".to_string();
        input.api_version = "stigmer/v1".to_string();
        let pipeline: Pipeline<Session, ()> = Pipeline::new(vec![
            Box::new(ValidateProto::new(Self::validate)),
            Box::new(BuildNewState::<Session>::new("session", |_| {})),
            Box::new(crate::pipeline::steps::Persist::<Session>::create(
                self.store.clone(),
                KIND_SESSION,
            )),
        ]);
        pipeline.run(RequestContext::new(input)).await
    }

    pub async fn get(&self, reference: ResourceRef) -> crate::error::Result<Session> {
        let pipeline: Pipeline<ResourceRef, Session> = Pipeline::new(vec![Box::new(LoadExisting::<Session>::new(
            self.store.clone(),
            KIND_SESSION,
        ))]);
        let ctx = pipeline.run_with_context(RequestContext::new(reference)).await?;
        ctx.existing_state()
            .cloned()
            .ok_or_else(|| StigmerError::internal("Session: load step did not populate existing state"))
    }

    pub async fn delete(&self, reference: ResourceRef) -> crate::error::Result<Session> {
        let pipeline: Pipeline<ResourceRef, Session> = Pipeline::new(vec![
            Box::new(LoadExistingForDelete::<Session>::new(self.store.clone(), KIND_SESSION)),
            Box::new(DeleteResource::new(self.store.clone(), KIND_SESSION)),
        ]);
        let ctx = pipeline.run_with_context(RequestContext::new(reference)).await?;
        ctx.existing_state()
            .cloned()
            .ok_or_else(|| StigmerError::internal("Session: load step did not populate existing state"))
    }

    pub async fn list(&self, scope: Option<Scope>) -> crate::error::Result<Vec<Session>> {
        let all: Vec<Session> = storage::list_resources(&*self.store, KIND_SESSION).await?;
        Ok(match scope {
            Some(scope) => all.into_iter().filter(|s| s.metadata().scope == scope).collect(),
            None => all,
        })
    }
}

#[async_trait]
impl SessionClient for SessionController {
    async fn create_default(&self, agent_instance_id: &str) -> crate::error::Result<Session> {
        let metadata = Metadata::new(format!("session-for-{agent_instance_id}"));
        self.create(Session {
            kind: String::new(),
            api_version: String::new(),
            metadata,
            spec: SessionSpec {
                agent_instance_id: agent_instance_id.to_string(),
            },
            status: SessionStatus::default(),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::sled_store::SledStore;

    #[tokio::test]
    async fn create_default_builds_a_fresh_session_each_call() {
        let (store, _dir) = SledStore::open_temporary();
        let controller = SessionController::new(Arc::new(store));
        let first = controller.create_default("instance-1").await.unwrap();
        let second = controller.create_default("instance-1").await.unwrap();
        assert_ne!(first.metadata.id, second.metadata.id);
        assert_eq!(first.spec.agent_instance_id, "instance-1");
    }

    #[tokio::test]
    async fn create_rejects_missing_agent_instance_id() {
        let (store, _dir) = SledStore::open_temporary();
        let controller = SessionController::new(Arc::new(store));
        let err = controller
            .create(Session {
                kind: String::new(),
                api_version: String::new(),
                metadata: Metadata::new("broken"),
                spec: SessionSpec {
                    agent_instance_id: String::new(),
                },
                status: SessionStatus::default(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StigmerError::InvalidArgument { .. }));
    }
}
