//! Slug derivation (spec §3 invariant 1, §8 boundary cases). No direct
//! teacher analogue; plain functions in the teacher's doc-comment-first
//! style.

use crate::error::{Result, StigmerError};

/// Derive a DNS-safe slug from a human-readable name: lowercase,
/// whitespace and disallowed characters become single hyphens,
/// consecutive hyphens collapse, leading/trailing hyphens are stripped.
/// Non-ASCII input is rejected rather than silently dropped (spec §8:
/// "'é-test' fails (non-ASCII)"). No truncation.
pub fn derive(name: &str) -> Result<String> {
    if !name.is_ascii() {
        return Err(StigmerError::invalid_argument(format!(
            "slug derivation requires ASCII input, got {name:?}"
        )));
    }

    let mut slug = String::with_capacity(name.len());
    let mut last_was_hyphen = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            slug.push('-');
            last_was_hyphen = true;
        }
    }

    let trimmed = slug.trim_matches('-').to_string();
    if trimmed.is_empty() {
        return Err(StigmerError::invalid_argument(format!(
            "slug derived from {name:?} is empty after trimming"
        )));
    }
    Ok(trimmed)
}

/// Idempotence check used by property tests (spec §8): re-deriving from
/// an already-valid slug must return the same slug unchanged.
pub fn is_valid(slug: &str) -> bool {
    !slug.is_empty()
        && slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && !slug.contains("--")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_whitespace_runs_into_single_hyphens() {
        assert_eq!(derive("  Hello  World  ").unwrap(), "hello-world");
    }

    #[test]
    fn strips_punctuation() {
        assert_eq!(derive("A@B!C").unwrap(), "abc");
    }

    #[test]
    fn rejects_non_ascii() {
        assert!(derive("é-test").is_err());
    }

    #[test]
    fn rejects_all_punctuation_input() {
        assert!(derive("---").is_err());
    }

    #[test]
    fn derivation_is_idempotent_on_an_already_valid_slug() {
        let slug = derive("Code Reviewer").unwrap();
        assert_eq!(derive(&slug).unwrap(), slug);
        assert!(is_valid(&slug));
    }

    #[test]
    fn is_valid_rejects_consecutive_hyphens_and_edge_hyphens() {
        assert!(!is_valid("a--b"));
        assert!(!is_valid("-a"));
        assert!(!is_valid("a-"));
        assert!(!is_valid(""));
    }
}
