//! Skill: a content-addressed, versioned artifact usable by an agent
//! (spec §3 "Skill", §6 glossary). Keyed by scope + slug in the main
//! namespace; each push archives the prior version (spec §3 invariant 5:
//! "A Skill version is the SHA-256 of its artifact bytes").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::impl_has_metadata;
use crate::models::envelope::Metadata;

/// One uploaded version of a Skill's archive. The archive itself lives in
/// the skill artifact store, addressed by `content_hash`; this record is
/// the pointer + provenance kept in the resource's status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillVersion {
    /// Lowercase hex SHA-256 of the archive bytes.
    pub content_hash: String,
    pub size_bytes: u64,
    pub pushed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillSpec {
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillStatus {
    /// The currently active version; prior entries remain in `history` for
    /// audit/rollback but are not servable as "current".
    #[serde(default)]
    pub current_version: Option<SkillVersion>,
    #[serde(default)]
    pub history: Vec<SkillVersion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub api_version: String,
    pub metadata: Metadata,
    pub spec: SkillSpec,
    #[serde(default)]
    pub status: SkillStatus,
}

impl_has_metadata!(Skill);

pub const KIND_SKILL: &str = "skill";

impl SkillStatus {
    /// Push a newly-uploaded version. If the content hash matches the
    /// current version, this is a no-op push (spec §3 invariant 5: "the
    /// same bytes produce a single stored file regardless of upload
    /// count") — no new history entry, no version bump.
    pub fn push(&mut self, version: SkillVersion) {
        if let Some(current) = &self.current_version {
            if current.content_hash == version.content_hash {
                return;
            }
            self.history.push(current.clone());
        }
        self.current_version = Some(version);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(hash: &str) -> SkillVersion {
        SkillVersion {
            content_hash: hash.to_string(),
            size_bytes: 128,
            pushed_at: Utc::now(),
        }
    }

    #[test]
    fn repeated_push_of_same_bytes_is_a_no_op() {
        let mut status = SkillStatus::default();
        status.push(version("abc123"));
        status.push(version("abc123"));
        assert!(status.history.is_empty());
        assert_eq!(status.current_version.unwrap().content_hash, "abc123");
    }

    #[test]
    fn new_content_archives_the_prior_version() {
        let mut status = SkillStatus::default();
        status.push(version("abc123"));
        status.push(version("def456"));
        assert_eq!(status.history.len(), 1);
        assert_eq!(status.history[0].content_hash, "abc123");
        assert_eq!(status.current_version.unwrap().content_hash, "def456");
    }
}
