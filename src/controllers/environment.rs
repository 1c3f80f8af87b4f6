//! Environment controller (spec §4.2): flat CRUD, no side-effect steps —
//! the simplest of the nine controllers, used here to validate the
//! generic step library's wiring end to end before the more involved
//! controllers are built on top of it.

use std::sync::Arc;

use crate::error::StigmerError;
use crate::models::envelope::{HasMetadata, ResourceRef, Scope};
use crate::models::{Environment, KIND_ENVIRONMENT};
use crate::pipeline::steps::{
    BuildNewState, BuildUpdateState, CheckDuplicate, DeleteResource, LoadExisting, LoadExistingForDelete,
    LoadForApply, Persist, ResolveSlug, ValidateProto,
};
use crate::pipeline::{Pipeline, RequestContext};
use crate::storage::{self, Store};

pub struct EnvironmentController {
    store: Arc<dyn Store>,
}

impl EnvironmentController {
    pub fn new(store: Arc<dyn Store>) -> Self {
        EnvironmentController { store }
    }

    fn validate(input: &Environment) -> crate::error::Result<()> {
        if input.metadata.scope.is_platform() {
            return Err(StigmerError::invalid_argument(
                "Environment cannot be created in the platform scope",
            ));
        }
        if input.metadata.name.is_empty() {
            return Err(StigmerError::invalid_argument("Environment name is required"));
        }
        Ok(())
    }

    pub async fn create(&self, mut input: Environment) -> crate::error::Result<Environment> {
        input.kind = "Environment".to_string();
        input.api_version = "stigmer/v1".to_string();
        let pipeline: Pipeline<Environment, ()> = Pipeline::new(vec![
            Box::new(ValidateProto::new(Self::validate)),
            Box::new(ResolveSlug),
            Box::new(CheckDuplicate::<Environment>::new(self.store.clone(), KIND_ENVIRONMENT)),
            Box::new(BuildNewState::<Environment>::new("environment", |_| {})),
            Box::new(Persist::<Environment>::create(self.store.clone(), KIND_ENVIRONMENT)),
        ]);
        pipeline.run(RequestContext::new(input)).await
    }

    pub async fn get(&self, reference: ResourceRef) -> crate::error::Result<Environment> {
        let pipeline: Pipeline<ResourceRef, Environment> = Pipeline::new(vec![Box::new(LoadExisting::<
            Environment,
        >::new(
            self.store.clone(),
            KIND_ENVIRONMENT,
        ))]);
        let ctx = pipeline.run_with_context(RequestContext::new(reference)).await?;
        ctx.existing_state()
            .cloned()
            .ok_or_else(|| StigmerError::internal("Environment: load step did not populate existing state"))
    }

    pub async fn update(&self, input: Environment) -> crate::error::Result<Environment> {
        let mut reference = ResourceRef::default();
        reference.id = input.metadata.id.clone();
        reference.slug = input.metadata.slug.clone();
        reference.scope = input.metadata.scope.clone();

        let load_pipeline: Pipeline<ResourceRef, Environment> =
            Pipeline::new(vec![Box::new(LoadExisting::<Environment>::new(
                self.store.clone(),
                KIND_ENVIRONMENT,
            ))]);
        let ctx = load_pipeline.run_with_context(RequestContext::new(reference)).await?;
        let existing = ctx
            .existing_state()
            .cloned()
            .ok_or_else(|| StigmerError::internal("Environment: load step did not populate existing state"))?;

        let mut update_ctx: RequestContext<Environment, Environment> = RequestContext::new(input);
        update_ctx.set_existing_state(existing);

        let pipeline: Pipeline<Environment, Environment> = Pipeline::new(vec![
            Box::new(ValidateProto::new(Self::validate)),
            Box::new(BuildUpdateState::<Environment>::full_spec_replacement(|input, existing| {
                Environment {
                    kind: existing.kind.clone(),
                    api_version: existing.api_version.clone(),
                    metadata: existing.metadata.clone(),
                    spec: input.spec,
                    status: existing.status.clone(),
                }
            })),
            Box::new(Persist::<Environment>::update(self.store.clone(), KIND_ENVIRONMENT)),
        ]);
        pipeline.run(update_ctx).await
    }

    pub async fn delete(&self, reference: ResourceRef) -> crate::error::Result<Environment> {
        let pipeline: Pipeline<ResourceRef, Environment> = Pipeline::new(vec![
            Box::new(LoadExistingForDelete::<Environment>::new(
                self.store.clone(),
                KIND_ENVIRONMENT,
            )),
            Box::new(DeleteResource::new(self.store.clone(), KIND_ENVIRONMENT)),
        ]);
        let ctx = pipeline.run_with_context(RequestContext::new(reference)).await?;
        ctx.existing_state()
            .cloned()
            .ok_or_else(|| StigmerError::internal("Environment: load step did not populate existing state"))
    }

    pub async fn list(&self, scope: Option<Scope>) -> crate::error::Result<Vec<Environment>> {
        let all: Vec<Environment> = storage::list_resources(&*self.store, KIND_ENVIRONMENT).await?;
        Ok(match scope {
            Some(scope) => all.into_iter().filter(|e| e.metadata().scope == scope).collect(),
            None => all,
        })
    }

    /// Create-or-update by slug (spec §4.1 "LoadForApply"/`Apply`).
    pub async fn apply(&self, input: Environment) -> crate::error::Result<Environment> {
        let scope = input.metadata.scope.clone();
        let slug = input.metadata.slug.clone();
        let probe = {
            let mut probe = ResourceRef::default();
            probe.slug = slug;
            probe.scope = scope;
            probe
        };
        let probe_pipeline: Pipeline<ResourceRef, Environment> =
            Pipeline::new(vec![Box::new(LoadForApply::<Environment>::new(
                self.store.clone(),
                KIND_ENVIRONMENT,
            ))]);
        let ctx = probe_pipeline.run_with_context(RequestContext::new(probe)).await?;
        if ctx.should_create {
            self.create(input).await
        } else {
            self.update(input).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::envelope::Metadata;
    use crate::models::{EnvironmentSpec, EnvironmentStatus};
    use crate::storage::sled_store::SledStore;

    fn sample(name: &str) -> Environment {
        Environment {
            kind: String::new(),
            api_version: String::new(),
            metadata: Metadata::new(name),
            spec: EnvironmentSpec::default(),
            status: EnvironmentStatus::default(),
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let (store, _dir) = SledStore::open_temporary();
        let controller = EnvironmentController::new(Arc::new(store));
        let created = controller.create(sample("CI Secrets")).await.unwrap();
        assert_eq!(created.metadata.slug, "ci-secrets");

        let mut reference = ResourceRef::default();
        reference.id = created.metadata.id.clone();
        let fetched = controller.get(reference).await.unwrap();
        assert_eq!(fetched.metadata.id, created.metadata.id);
    }

    #[tokio::test]
    async fn platform_scope_is_rejected() {
        let (store, _dir) = SledStore::open_temporary();
        let controller = EnvironmentController::new(Arc::new(store));
        let mut input = sample("shared");
        input.metadata.scope = Scope::Platform;
        let err = controller.create(input).await.unwrap_err();
        assert!(matches!(err, StigmerError::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn apply_creates_then_updates_by_slug() {
        let (store, _dir) = SledStore::open_temporary();
        let controller = EnvironmentController::new(Arc::new(store));
        let first = controller.apply(sample("apply-me")).await.unwrap();
        assert_eq!(first.metadata.version, 1);

        let mut second_input = sample("apply-me");
        second_input.metadata.slug = "apply-me".to_string();
        let second = controller.apply(second_input).await.unwrap();
        assert_eq!(second.metadata.id, first.metadata.id);
        assert_eq!(second.metadata.version, 2);
    }

    #[tokio::test]
    async fn duplicate_slug_in_same_scope_is_rejected() {
        let (store, _dir) = SledStore::open_temporary();
        let controller = EnvironmentController::new(Arc::new(store));
        controller.create(sample("dup")).await.unwrap();
        let err = controller.create(sample("dup")).await.unwrap_err();
        assert!(matches!(err, StigmerError::AlreadyExists { .. }));
    }
}
