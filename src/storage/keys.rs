//! Storage key formatting (spec §3: "Keys in the store are `<kind>/<id>`.
//! An additional audit namespace `<kind>_audit/<id>/<unix-nano>` stores
//! prior-version snapshots on update.").

/// Primary key for a resource of the given kind and id.
pub fn primary_key(kind: &str, id: &str) -> Vec<u8> {
    format!("{kind}/{id}").into_bytes()
}

/// Prefix shared by every primary key of a kind; used for prefix-iteration
/// list queries.
pub fn kind_prefix(kind: &str) -> Vec<u8> {
    format!("{kind}/").into_bytes()
}

/// Audit snapshot key for a prior version of a resource, ordered by
/// `unix_nanos` so a prefix scan returns snapshots oldest-first.
pub fn audit_key(kind: &str, id: &str, unix_nanos: i64) -> Vec<u8> {
    format!("{kind}_audit/{id}/{unix_nanos:020}").into_bytes()
}

/// Prefix shared by every audit snapshot of a single resource.
pub fn audit_prefix(kind: &str, id: &str) -> Vec<u8> {
    format!("{kind}_audit/{id}/").into_bytes()
}

/// Skill resources are addressed by scope+slug rather than a synthetic
/// id (spec §6 "Skill schema: `skill/<scope>/<slug>`", distinct from the
/// generic `<kind>/<id>` schema every other resource uses). This returns
/// the composite id to pass as the `id` argument of the generic
/// `storage::save_resource`/`get_resource`/`delete_resource` calls under
/// `KIND_SKILL`, so the resulting primary key is exactly
/// `skill/<scope>/<slug>` and a push or lookup by slug never needs to
/// scan every stored Skill.
pub fn skill_key(scope: &str, slug: &str) -> String {
    format!("{scope}/{slug}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_key_matches_kind_slash_id() {
        assert_eq!(primary_key("agent", "agent-1"), b"agent/agent-1".to_vec());
    }

    #[test]
    fn audit_keys_sort_chronologically_as_bytes() {
        let earlier = audit_key("agent", "agent-1", 100);
        let later = audit_key("agent", "agent-1", 200);
        assert!(earlier < later);
    }

    #[test]
    fn audit_prefix_is_a_strict_prefix_of_its_keys() {
        let prefix = audit_prefix("agent", "agent-1");
        let key = audit_key("agent", "agent-1", 42);
        assert!(key.starts_with(&prefix[..]));
    }

    #[test]
    fn skill_key_composes_scope_and_slug_under_the_skill_kind() {
        let id = skill_key("platform", "my-skill");
        assert_eq!(primary_key("skill", &id), b"skill/platform/my-skill".to_vec());
    }

    #[test]
    fn skill_key_distinguishes_org_scoped_skills() {
        assert_ne!(skill_key("platform", "my-skill"), skill_key("org/acme", "my-skill"));
    }
}
