//! Standard step library (spec §4.1): the steps every controller composes
//! alongside its own resource-specific steps. Each step is generic over
//! the resource type it operates on so the nine controllers share one
//! implementation instead of nine near-identical copies.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{Result, StigmerError};
use crate::models::envelope::{HasMetadata, Scope};
use crate::pipeline::slug;
use crate::pipeline::{RequestContext, Step};
use crate::storage::codec::StorageCodec;
use crate::storage::{self, Store};

/// Read access to "which resource does this request target" — implemented
/// automatically for every `HasMetadata` resource (id/slug/scope live on
/// its own `Metadata`), and by hand for delete-request types whose id
/// lives under a differently-named field (spec §4.1 "ExtractResourceId /
/// Manual id extraction").
pub trait ResolveTarget {
    fn target_id(&self) -> Option<&str>;
    fn target_slug(&self) -> Option<&str>;
    fn target_scope(&self) -> Scope;
}

impl<T: HasMetadata> ResolveTarget for T {
    fn target_id(&self) -> Option<&str> {
        let id = self.metadata().id.as_str();
        (!id.is_empty()).then_some(id)
    }

    fn target_slug(&self) -> Option<&str> {
        let slug = self.metadata().slug.as_str();
        (!slug.is_empty()).then_some(slug)
    }

    fn target_scope(&self) -> Scope {
        self.metadata().scope.clone()
    }
}

/// Monotonically increasing unix-nanosecond id suffix (spec §4.1
/// "`<kind-prefix>-<monotonic-unix-nanoseconds>`"). A plain
/// `Utc::now().timestamp_nanos()` is not guaranteed to strictly increase
/// across two calls in rapid succession on every platform clock, so a
/// process-wide counter floors each new value at the previous one plus
/// one.
static LAST_NANOS: AtomicI64 = AtomicI64::new(0);

fn monotonic_nanos() -> i64 {
    let now = Utc::now().timestamp_nanos_opt().unwrap_or(0);
    let mut last = LAST_NANOS.load(Ordering::SeqCst);
    loop {
        let next = if now > last { now } else { last + 1 };
        match LAST_NANOS.compare_exchange_weak(last, next, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => return next,
            Err(observed) => last = observed,
        }
    }
}

pub fn next_resource_id(kind_prefix: &str) -> String {
    format!("{kind_prefix}-{}", monotonic_nanos())
}

/// Applies declarative field constraints to the input (spec §4.1
/// "ValidateProto"). The constraint set is resource-specific, so the
/// controller supplies it as a closure rather than this step trying to
/// express every kind's rules generically.
pub struct ValidateProto<T> {
    validate: Box<dyn Fn(&T) -> Result<()> + Send + Sync>,
}

impl<T> ValidateProto<T> {
    pub fn new(validate: impl Fn(&T) -> Result<()> + Send + Sync + 'static) -> Self {
        ValidateProto {
            validate: Box::new(validate),
        }
    }
}

#[async_trait]
impl<T, Existing> Step<T, Existing> for ValidateProto<T>
where
    T: Send + Sync,
    Existing: Send + Sync,
{
    fn name(&self) -> &'static str {
        "ValidateProto"
    }

    async fn execute(&self, ctx: &mut RequestContext<T, Existing>) -> Result<()> {
        (self.validate)(ctx.new_state())
    }
}

/// Derives `metadata.slug` from `metadata.name` when the caller didn't
/// supply one (spec §4.1 "ResolveSlug").
pub struct ResolveSlug;

#[async_trait]
impl<T, Existing> Step<T, Existing> for ResolveSlug
where
    T: HasMetadata + Send + Sync,
    Existing: Send + Sync,
{
    fn name(&self) -> &'static str {
        "ResolveSlug"
    }

    async fn execute(&self, ctx: &mut RequestContext<T, Existing>) -> Result<()> {
        let metadata = ctx.new_state_mut().metadata_mut();
        if metadata.slug.is_empty() && !metadata.name.is_empty() {
            metadata.slug = slug::derive(&metadata.name)?;
        }
        Ok(())
    }
}

/// Fails if another resource of this kind already uses the same slug in
/// the same scope (spec §4.1 "CheckDuplicate"; spec §5 documents the
/// narrow TOCTOU race against a concurrent `Persist` as accepted for
/// local-only use).
pub struct CheckDuplicate<T> {
    store: Arc<dyn Store>,
    kind: &'static str,
    _marker: PhantomData<T>,
}

impl<T> CheckDuplicate<T> {
    pub fn new(store: Arc<dyn Store>, kind: &'static str) -> Self {
        CheckDuplicate {
            store,
            kind,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T, Existing> Step<T, Existing> for CheckDuplicate<T>
where
    T: HasMetadata + StorageCodec + Send + Sync,
    Existing: Send + Sync,
{
    fn name(&self) -> &'static str {
        "CheckDuplicate"
    }

    async fn execute(&self, ctx: &mut RequestContext<T, Existing>) -> Result<()> {
        let metadata = ctx.new_state().metadata();
        let slug = metadata.slug.clone();
        let scope = metadata.scope.clone();
        let existing: Vec<T> = storage::list_resources(&*self.store, self.kind).await?;
        if existing
            .iter()
            .any(|r| r.metadata().slug == slug && r.metadata().scope == scope)
        {
            return Err(StigmerError::already_exists(format!(
                "slug {slug:?} already in use within scope"
            )));
        }
        Ok(())
    }
}

/// Assigns a fresh id, kind/api_version fields, and initializes timestamps
/// (spec §4.1 "BuildNewState"). `init_kind_fields` sets the resource's own
/// `kind`/`api_version` strings, which differ per resource type and so
/// aren't expressible through `HasMetadata` alone.
pub struct BuildNewState<T> {
    kind_prefix: &'static str,
    init_kind_fields: Box<dyn Fn(&mut T) + Send + Sync>,
}

impl<T> BuildNewState<T> {
    pub fn new(kind_prefix: &'static str, init_kind_fields: impl Fn(&mut T) + Send + Sync + 'static) -> Self {
        BuildNewState {
            kind_prefix,
            init_kind_fields: Box::new(init_kind_fields),
        }
    }
}

#[async_trait]
impl<T, Existing> Step<T, Existing> for BuildNewState<T>
where
    T: HasMetadata + Send + Sync,
    Existing: Send + Sync,
{
    fn name(&self) -> &'static str {
        "BuildNewState"
    }

    async fn execute(&self, ctx: &mut RequestContext<T, Existing>) -> Result<()> {
        (self.init_kind_fields)(ctx.new_state_mut());
        let now = Utc::now();
        let metadata = ctx.new_state_mut().metadata_mut();
        metadata.id = next_resource_id(self.kind_prefix);
        metadata.created_at = now;
        metadata.updated_at = now;
        metadata.version = 1;
        Ok(())
    }
}

/// Loads the current persisted resource by id (preferred, O(1)) or by slug
/// (prefix scan + match) for update flows (spec §4.1 "LoadExisting").
pub struct LoadExisting<Existing> {
    store: Arc<dyn Store>,
    kind: &'static str,
    _marker: PhantomData<Existing>,
}

impl<Existing> LoadExisting<Existing> {
    pub fn new(store: Arc<dyn Store>, kind: &'static str) -> Self {
        LoadExisting {
            store,
            kind,
            _marker: PhantomData,
        }
    }
}

async fn load_by_id_or_slug<Existing>(
    store: &dyn Store,
    kind: &str,
    id: Option<&str>,
    slug: Option<&str>,
    scope: Scope,
) -> Result<Existing>
where
    Existing: HasMetadata + StorageCodec + Send + Sync,
{
    if let Some(id) = id {
        return storage::get_resource(store, kind, id)
            .await?
            .ok_or_else(|| StigmerError::not_found(format!("{kind}/{id} not found")));
    }
    if let Some(slug) = slug {
        let all: Vec<Existing> = storage::list_resources(store, kind).await?;
        return all
            .into_iter()
            .find(|r| r.metadata().slug == slug && r.metadata().scope == scope)
            .ok_or_else(|| StigmerError::not_found(format!("{kind} with slug {slug:?} not found")));
    }
    Err(StigmerError::invalid_argument(
        "request must specify either an id or a slug",
    ))
}

#[async_trait]
impl<New, Existing> Step<New, Existing> for LoadExisting<Existing>
where
    New: ResolveTarget + Send + Sync,
    Existing: HasMetadata + StorageCodec + Send + Sync,
{
    fn name(&self) -> &'static str {
        "LoadExisting"
    }

    async fn execute(&self, ctx: &mut RequestContext<New, Existing>) -> Result<()> {
        let id = ctx.new_state().target_id().map(str::to_string);
        let slug = ctx.new_state().target_slug().map(str::to_string);
        let scope = ctx.new_state().target_scope();
        let loaded: Existing =
            load_by_id_or_slug(&*self.store, self.kind, id.as_deref(), slug.as_deref(), scope).await?;
        let resolved_id = loaded.metadata().id.clone();
        ctx.set_existing_state(loaded);
        ctx.scratch_set("resolved_id", resolved_id);
        Ok(())
    }
}

/// Same lookup as `LoadExisting`; used ahead of a delete so the prior
/// value is available to return to the caller (spec §4.1
/// "LoadExistingForDelete").
pub struct LoadExistingForDelete<Existing> {
    store: Arc<dyn Store>,
    kind: &'static str,
    _marker: PhantomData<Existing>,
}

impl<Existing> LoadExistingForDelete<Existing> {
    pub fn new(store: Arc<dyn Store>, kind: &'static str) -> Self {
        LoadExistingForDelete {
            store,
            kind,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<New, Existing> Step<New, Existing> for LoadExistingForDelete<Existing>
where
    New: ResolveTarget + Send + Sync,
    Existing: HasMetadata + StorageCodec + Send + Sync,
{
    fn name(&self) -> &'static str {
        "LoadExistingForDelete"
    }

    async fn execute(&self, ctx: &mut RequestContext<New, Existing>) -> Result<()> {
        let id = ctx.new_state().target_id().map(str::to_string);
        let slug = ctx.new_state().target_slug().map(str::to_string);
        let scope = ctx.new_state().target_scope();
        let loaded: Existing =
            load_by_id_or_slug(&*self.store, self.kind, id.as_deref(), slug.as_deref(), scope).await?;
        let resolved_id = loaded.metadata().id.clone();
        ctx.set_existing_state(loaded);
        ctx.scratch_set("resolved_id", resolved_id);
        Ok(())
    }
}

/// Looks up by slug and records whether a resource was found, without
/// failing when it wasn't (spec §4.1 "LoadForApply"). The controller reads
/// `ctx.should_create` afterward to decide whether to delegate to
/// `Create` or `Update`.
pub struct LoadForApply<Existing> {
    store: Arc<dyn Store>,
    kind: &'static str,
    _marker: PhantomData<Existing>,
}

impl<Existing> LoadForApply<Existing> {
    pub fn new(store: Arc<dyn Store>, kind: &'static str) -> Self {
        LoadForApply {
            store,
            kind,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<New, Existing> Step<New, Existing> for LoadForApply<Existing>
where
    New: ResolveTarget + Send + Sync,
    Existing: HasMetadata + StorageCodec + Send + Sync,
{
    fn name(&self) -> &'static str {
        "LoadForApply"
    }

    async fn execute(&self, ctx: &mut RequestContext<New, Existing>) -> Result<()> {
        let slug = ctx.new_state().target_slug().map(str::to_string);
        let scope = ctx.new_state().target_scope();
        let Some(slug) = slug else {
            ctx.should_create = true;
            return Ok(());
        };
        let all: Vec<Existing> = storage::list_resources(&*self.store, self.kind).await?;
        match all
            .into_iter()
            .find(|r| r.metadata().slug == slug && r.metadata().scope == scope)
        {
            Some(found) => {
                ctx.scratch_set("resolved_id", found.metadata().id.clone());
                ctx.set_existing_state(found);
                ctx.should_create = false;
            }
            None => ctx.should_create = true,
        }
        Ok(())
    }
}

/// Merges the caller's input into the loaded existing resource (spec §4.1
/// "BuildUpdateState"). Default policy is full spec replacement with
/// status preserved (spec §4.2's controller-specific merge policies pass
/// their own closure when that default isn't right).
pub struct BuildUpdateState<T> {
    merge: Box<dyn Fn(T, &T) -> T + Send + Sync>,
}

impl<T> BuildUpdateState<T> {
    pub fn new(merge: impl Fn(T, &T) -> T + Send + Sync + 'static) -> Self {
        BuildUpdateState {
            merge: Box::new(merge),
        }
    }

    /// Default merge: take the caller's spec, keep everything else
    /// (id, timestamps except `updated_at`, status) from `existing`, bump
    /// `version`.
    pub fn full_spec_replacement<F>(apply_spec: F) -> Self
    where
        F: Fn(T, &T) -> T + Send + Sync + 'static,
    {
        BuildUpdateState::new(apply_spec)
    }
}

#[async_trait]
impl<T> Step<T, T> for BuildUpdateState<T>
where
    T: HasMetadata + Clone + Send + Sync,
{
    fn name(&self) -> &'static str {
        "BuildUpdateState"
    }

    async fn execute(&self, ctx: &mut RequestContext<T, T>) -> Result<()> {
        let existing = ctx
            .existing_state()
            .cloned()
            .ok_or_else(|| StigmerError::internal("BuildUpdateState: no existing state loaded"))?;
        let input = ctx.new_state().clone();
        let mut merged = (self.merge)(input, &existing);
        let metadata = merged.metadata_mut();
        metadata.id = existing.metadata().id.clone();
        metadata.created_at = existing.metadata().created_at;
        metadata.updated_at = Utc::now();
        metadata.version = existing.metadata().version + 1;
        ctx.set_new_state(merged);
        Ok(())
    }
}

/// Marshal the new state and persist it under `<kind>/<id>`, archiving the
/// prior version first unless `skip_audit` (spec §4.1 "Persist"; spec §3
/// Lifecycle: "audit entry is unnecessary on first write").
pub struct Persist<T> {
    store: Arc<dyn Store>,
    kind: &'static str,
    skip_audit: bool,
    _marker: PhantomData<T>,
}

impl<T> Persist<T> {
    pub fn create(store: Arc<dyn Store>, kind: &'static str) -> Self {
        Persist {
            store,
            kind,
            skip_audit: true,
            _marker: PhantomData,
        }
    }

    pub fn update(store: Arc<dyn Store>, kind: &'static str) -> Self {
        Persist {
            store,
            kind,
            skip_audit: false,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T, Existing> Step<T, Existing> for Persist<T>
where
    T: HasMetadata + StorageCodec + Send + Sync,
    Existing: Send + Sync,
{
    fn name(&self) -> &'static str {
        "Persist"
    }

    async fn execute(&self, ctx: &mut RequestContext<T, Existing>) -> Result<()> {
        let id = ctx.new_state().metadata().id.clone();
        storage::save_resource(&*self.store, self.kind, &id, ctx.new_state(), self.skip_audit).await
    }
}

/// Removes the primary key (spec §4.1 "DeleteResource"). Relies on
/// `LoadExistingForDelete` having already resolved and stashed the id.
pub struct DeleteResource {
    store: Arc<dyn Store>,
    kind: &'static str,
}

impl DeleteResource {
    pub fn new(store: Arc<dyn Store>, kind: &'static str) -> Self {
        DeleteResource { store, kind }
    }
}

#[async_trait]
impl<New, Existing> Step<New, Existing> for DeleteResource
where
    New: Send + Sync,
    Existing: Send + Sync,
{
    fn name(&self) -> &'static str {
        "DeleteResource"
    }

    async fn execute(&self, ctx: &mut RequestContext<New, Existing>) -> Result<()> {
        let id = ctx
            .scratch_get("resolved_id")
            .ok_or_else(|| StigmerError::internal("DeleteResource: no resolved id in scratch"))?
            .to_string();
        self.store.delete_resource(self.kind, &id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grpc::convert::{metadata_from_pb, metadata_to_pb};
    use crate::grpc::pb;
    use crate::models::envelope::Metadata;
    use crate::storage::sled_store::SledStore;

    #[derive(Clone)]
    struct Dummy {
        metadata: Metadata,
        value: u32,
    }

    crate::impl_has_metadata!(Dummy);

    #[derive(Clone, PartialEq, prost::Message)]
    struct DummyProto {
        #[prost(message, tag = "1")]
        metadata: Option<pb::Metadata>,
        #[prost(uint32, tag = "2")]
        value: u32,
    }

    impl StorageCodec for Dummy {
        type Proto = DummyProto;

        fn to_storage_proto(&self) -> DummyProto {
            DummyProto {
                metadata: Some(metadata_to_pb(&self.metadata)),
                value: self.value,
            }
        }

        fn from_storage_proto(proto: DummyProto) -> Result<Self> {
            Ok(Dummy {
                metadata: metadata_from_pb(proto.metadata),
                value: proto.value,
            })
        }
    }

    #[tokio::test]
    async fn check_duplicate_rejects_same_slug_same_scope() {
        let (store, _dir) = SledStore::open_temporary();
        let store: Arc<dyn Store> = Arc::new(store);
        let mut existing_metadata = Metadata::new("Taken");
        existing_metadata.id = "dummy-1".to_string();
        existing_metadata.slug = "taken".to_string();
        storage::save_resource(
            &*store,
            "dummy",
            "dummy-1",
            &Dummy {
                metadata: existing_metadata,
                value: 1,
            },
            true,
        )
        .await
        .unwrap();

        let mut new_metadata = Metadata::new("Taken");
        new_metadata.slug = "taken".to_string();
        let ctx: RequestContext<Dummy, ()> = RequestContext::new(Dummy {
            metadata: new_metadata,
            value: 2,
        });
        let step = CheckDuplicate::<Dummy>::new(store, "dummy");
        let mut ctx = ctx;
        let err = step.execute(&mut ctx).await.unwrap_err();
        assert!(matches!(err, StigmerError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn build_new_state_assigns_id_and_version_one() {
        let step = BuildNewState::<Dummy>::new("dummy", |_| {});
        let mut ctx: RequestContext<Dummy, ()> = RequestContext::new(Dummy {
            metadata: Metadata::new("x"),
            value: 0,
        });
        step.execute(&mut ctx).await.unwrap();
        assert!(ctx.new_state().metadata.id.starts_with("dummy-"));
        assert_eq!(ctx.new_state().metadata.version, 1);
    }

    #[tokio::test]
    async fn monotonic_nanos_strictly_increases_across_rapid_calls() {
        let a = next_resource_id("x");
        let b = next_resource_id("x");
        assert_ne!(a, b);
    }
}
