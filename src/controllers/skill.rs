//! Skill controller (spec §4.2, §4.6): `Push` validates and ingests an
//! archive through the skill artifact store, then upserts the Skill
//! resource's status by slug+scope. `Get`/`Delete`/`List` are flat CRUD
//! over the resource envelope; the archive bytes themselves are never
//! touched by those paths.

use std::sync::Arc;

use chrono::Utc;

use crate::error::StigmerError;
use crate::models::envelope::{HasMetadata, Metadata, ResourceRef, Scope};
use crate::models::skill::SkillVersion;
use crate::models::{Skill, SkillSpec, SkillStatus, KIND_SKILL};
use crate::pipeline::slug;
use crate::pipeline::steps::{next_resource_id, ResolveTarget};
use crate::skills_store::SkillArtifactStore;
use crate::storage::keys;
use crate::storage::{self, Store};

pub struct SkillController {
    store: Arc<dyn Store>,
    artifacts: Arc<SkillArtifactStore>,
}

impl SkillController {
    pub fn new(store: Arc<dyn Store>, artifacts: Arc<SkillArtifactStore>) -> Self {
        SkillController { store, artifacts }
    }

    fn validate(metadata: &Metadata) -> crate::error::Result<()> {
        if metadata.name.is_empty() && metadata.slug.is_empty() {
            return Err(StigmerError::invalid_argument("Skill requires a name or slug"));
        }
        Ok(())
    }

    /// Direct key lookup under the Skill schema (spec §6 "Skill schema:
    /// `skill/<scope>/<slug>`") rather than a scan over every stored
    /// Skill: the scope+slug pair is the whole key, so this is one
    /// `sled` point read.
    async fn find_by_slug(&self, slug: &str, scope: &Scope) -> crate::error::Result<Option<Skill>> {
        let id = keys::skill_key(&scope.as_key_segment(), slug);
        storage::get_resource(&*self.store, KIND_SKILL, &id).await
    }

    /// Validates and stores `archive_bytes`, then creates the Skill
    /// resource if this is the first push for its slug+scope, or merges a
    /// new version into the existing one otherwise (spec §4.6 processing
    /// contract).
    pub async fn push(
        &self,
        mut metadata: Metadata,
        description: String,
        archive_bytes: &[u8],
    ) -> crate::error::Result<Skill> {
        Self::validate(&metadata)?;
        if metadata.slug.is_empty() {
            metadata.slug = slug::derive(&metadata.name)?;
        }

        let pushed = self.artifacts.push(archive_bytes)?;
        let version = SkillVersion {
            content_hash: pushed.content_hash,
            size_bytes: pushed.size_bytes,
            pushed_at: Utc::now(),
        };

        let key = keys::skill_key(&metadata.scope.as_key_segment(), &metadata.slug);

        match self.find_by_slug(&metadata.slug, &metadata.scope).await? {
            Some(mut existing) => {
                existing.spec.description = description;
                existing.status.push(version);
                existing.metadata.updated_at = Utc::now();
                existing.metadata.version += 1;
                storage::save_resource(&*self.store, KIND_SKILL, &key, &existing, false).await?;
                Ok(existing)
            }
            None => {
                let mut fresh_metadata = metadata;
                fresh_metadata.id = next_resource_id("skill");
                let now = Utc::now();
                fresh_metadata.created_at = now;
                fresh_metadata.updated_at = now;
                fresh_metadata.version = 1;
                let mut status = SkillStatus::default();
                status.push(version);
                let skill = Skill {
                    kind: "Skill".to_string(),
                    api_version: "stigmer/v1".to_string(),
                    metadata: fresh_metadata,
                    spec: SkillSpec { description },
                    status,
                };
                storage::save_resource(&*self.store, KIND_SKILL, &key, &skill, true).await?;
                Ok(skill)
            }
        }
    }

    /// Resolves by slug+scope first, since that is the Skill's real
    /// storage key (spec §6) and therefore the O(1) path; a bare id
    /// reference (no slug) has no dedicated index under the scope+slug
    /// schema and falls back to a scan, which only matters for this
    /// rarer lookup shape rather than the common push/get-by-slug path.
    pub async fn get(&self, reference: ResourceRef) -> crate::error::Result<Skill> {
        if !reference.slug.is_empty() {
            return self
                .find_by_slug(&reference.slug, &reference.scope)
                .await?
                .ok_or_else(|| StigmerError::not_found(format!("skill with slug {:?} not found", reference.slug)));
        }
        if let Some(id) = reference.target_id() {
            let all: Vec<Skill> = storage::list_resources(&*self.store, KIND_SKILL).await?;
            return all
                .into_iter()
                .find(|s| s.metadata.id == id)
                .ok_or_else(|| StigmerError::not_found(format!("skill/{id} not found")));
        }
        Err(StigmerError::invalid_argument("Skill lookup requires a slug or an id"))
    }

    pub async fn delete(&self, reference: ResourceRef) -> crate::error::Result<Skill> {
        let skill = self.get(reference).await?;
        let key = keys::skill_key(&skill.metadata.scope.as_key_segment(), &skill.metadata.slug);
        storage::delete_resource::<Skill>(&*self.store, KIND_SKILL, &key)
            .await?
            .ok_or_else(|| StigmerError::internal("Skill: delete did not find the resource get() just returned"))
    }

    pub async fn list(&self, scope: Option<Scope>) -> crate::error::Result<Vec<Skill>> {
        let all: Vec<Skill> = storage::list_resources(&*self.store, KIND_SKILL).await?;
        Ok(match scope {
            Some(scope) => all.into_iter().filter(|s| s.metadata().scope == scope).collect(),
            None => all,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::tempdir;

    fn build_archive() -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let cursor = std::io::Cursor::new(&mut buf);
            let mut writer = zip::ZipWriter::new(cursor);
            let options = zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
            writer.start_file("SKILL.md", options).unwrap();
            writer.write_all(b"# Demo Skill\n").unwrap();
            writer.finish().unwrap();
        }
        buf
    }

    #[tokio::test]
    async fn push_creates_then_push_again_adds_a_version() {
        let (store, _dir) = crate::storage::sled_store::SledStore::open_temporary();
        let artifacts_dir = tempdir().unwrap();
        let controller = SkillController::new(
            Arc::new(store),
            Arc::new(SkillArtifactStore::new(artifacts_dir.path().to_path_buf())),
        );

        let first = controller
            .push(Metadata::new("Demo Skill"), "first".to_string(), &build_archive())
            .await
            .unwrap();
        assert_eq!(first.metadata.version, 1);
        assert!(first.status.history.is_empty());

        let mut second_metadata = Metadata::new("Demo Skill");
        second_metadata.slug = first.metadata.slug.clone();
        let second = controller
            .push(second_metadata, "second".to_string(), &build_archive())
            .await
            .unwrap();
        assert_eq!(second.metadata.id, first.metadata.id);
    }

    #[tokio::test]
    async fn pushed_skill_is_addressable_at_the_scope_slug_key() {
        let (store, _dir) = crate::storage::sled_store::SledStore::open_temporary();
        let artifacts_dir = tempdir().unwrap();
        let controller = SkillController::new(
            Arc::new(store),
            Arc::new(SkillArtifactStore::new(artifacts_dir.path().to_path_buf())),
        );

        let skill = controller
            .push(Metadata::new("Demo Skill"), "first".to_string(), &build_archive())
            .await
            .unwrap();

        let by_slug = controller
            .get(ResourceRef {
                id: String::new(),
                slug: skill.metadata.slug.clone(),
                scope: skill.metadata.scope.clone(),
            })
            .await
            .unwrap();
        assert_eq!(by_slug.metadata.id, skill.metadata.id);
    }

    #[tokio::test]
    async fn same_slug_in_different_scopes_does_not_collide() {
        let (store, _dir) = crate::storage::sled_store::SledStore::open_temporary();
        let artifacts_dir = tempdir().unwrap();
        let controller = SkillController::new(
            Arc::new(store),
            Arc::new(SkillArtifactStore::new(artifacts_dir.path().to_path_buf())),
        );

        let mut platform_metadata = Metadata::new("Demo Skill");
        platform_metadata.slug = "demo-skill".to_string();
        let platform = controller
            .push(platform_metadata, "platform copy".to_string(), &build_archive())
            .await
            .unwrap();

        let mut org_metadata = Metadata::new("Demo Skill");
        org_metadata.slug = "demo-skill".to_string();
        org_metadata.scope = Scope::Organization("acme".to_string());
        let org = controller
            .push(org_metadata, "org copy".to_string(), &build_archive())
            .await
            .unwrap();

        assert_ne!(platform.metadata.id, org.metadata.id);
        assert!(platform.status.history.is_empty());
        assert!(org.status.history.is_empty());
    }
}
