//! Skill artifact store (spec §4.6): content-addressed archive blobs plus
//! the `SKILL.md` extraction needed for prompt injection. Executables
//! inside a pushed archive are never extracted here — they stay sealed
//! bytes until the sandboxed agent-runner container opens them (spec §4.6
//! "Critical property").
//!
//! `zip` reads the archive (pack precedent: `linggen-linggen-agent`,
//! `stencila-stencila`); traversal/symlink/size-ratio checks are enforced
//! in this module's own code around it, per §9 "Safe archive extraction":
//! "the library defends against traversal but not against exhaustion."
//! `sha2` computes the content hash.

use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{Result, StigmerError};

pub const MAX_COMPRESSED_BYTES: u64 = 100 * 1024 * 1024;
pub const MAX_UNCOMPRESSED_BYTES: u64 = 500 * 1024 * 1024;
pub const MAX_COMPRESSION_RATIO: u64 = 100;
pub const MAX_FILE_COUNT: usize = 10_000;
pub const MAX_SKILL_MD_BYTES: usize = 1024 * 1024;

pub const SKILL_MANIFEST_NAME: &str = "SKILL.md";

/// Result of successfully validating and ingesting a pushed archive.
pub struct PushedSkill {
    /// Lowercase hex SHA-256 of the original archive bytes.
    pub content_hash: String,
    pub size_bytes: u64,
    /// Contents of `SKILL.md`, capped at `MAX_SKILL_MD_BYTES`.
    pub manifest_text: String,
    /// `true` if this exact content hash was already stored (spec §3
    /// invariant 5: "the same bytes produce a single stored file
    /// regardless of upload count").
    pub deduplicated: bool,
}

pub struct SkillArtifactStore {
    root: PathBuf,
}

impl SkillArtifactStore {
    pub fn new(root: PathBuf) -> Self {
        SkillArtifactStore { root }
    }

    fn blob_path(&self, content_hash: &str) -> PathBuf {
        self.root.join(format!("{content_hash}.zip"))
    }

    /// Validate, hash, and (if new) store a pushed archive (spec §4.6
    /// processing contract, steps 1-4).
    pub fn push(&self, archive_bytes: &[u8]) -> Result<PushedSkill> {
        if archive_bytes.len() as u64 > MAX_COMPRESSED_BYTES {
            return Err(StigmerError::invalid_argument(format!(
                "archive is {} bytes, exceeds the {}-byte compressed limit",
                archive_bytes.len(),
                MAX_COMPRESSED_BYTES
            )));
        }

        let manifest_text = validate_and_extract_manifest(archive_bytes)?;

        let mut hasher = Sha256::new();
        hasher.update(archive_bytes);
        let content_hash = hex_encode(&hasher.finalize());

        let path = self.blob_path(&content_hash);
        let deduplicated = path.exists();
        if !deduplicated {
            std::fs::create_dir_all(&self.root)
                .map_err(|e| StigmerError::internal(format!("creating skills dir: {e}")))?;
            write_owner_only(&path, archive_bytes)?;
        }

        Ok(PushedSkill {
            content_hash,
            size_bytes: archive_bytes.len() as u64,
            manifest_text,
            deduplicated,
        })
    }

    pub fn blob_exists(&self, content_hash: &str) -> bool {
        self.blob_path(content_hash).exists()
    }
}

#[cfg(unix)]
fn write_owner_only(path: &Path, bytes: &[u8]) -> Result<()> {
    use std::os::unix::fs::OpenOptionsExt;
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .map_err(|e| StigmerError::internal(format!("opening skill blob for write: {e}")))?;
    use std::io::Write;
    file.write_all(bytes)
        .map_err(|e| StigmerError::internal(format!("writing skill blob: {e}")))
}

#[cfg(not(unix))]
fn write_owner_only(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes).map_err(|e| StigmerError::internal(format!("writing skill blob: {e}")))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Validates the archive against spec §4.6's safety ceilings and entry
/// checks, then returns the text of `SKILL.md`. Runs the full entry scan
/// before trusting any single entry, so a bomb can't sneak a valid
/// `SKILL.md` in ahead of an oversized later entry.
fn validate_and_extract_manifest(archive_bytes: &[u8]) -> Result<String> {
    let reader = std::io::Cursor::new(archive_bytes);
    let mut archive = zip::ZipArchive::new(reader)
        .map_err(|e| StigmerError::invalid_argument(format!("not a valid zip archive: {e}")))?;

    if archive.len() > MAX_FILE_COUNT {
        return Err(StigmerError::invalid_argument(format!(
            "archive has {} entries, exceeds the {MAX_FILE_COUNT}-entry limit",
            archive.len()
        )));
    }

    let mut total_uncompressed: u64 = 0;
    let mut manifest_text: Option<String> = None;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| StigmerError::invalid_argument(format!("reading archive entry {i}: {e}")))?;

        let name = entry.name().to_string();
        reject_unsafe_entry_path(&name)?;

        if entry.is_dir() {
            continue;
        }

        if let Some(mode) = entry.unix_mode() {
            const S_IFLNK: u32 = 0o120000;
            if mode & 0o170000 == S_IFLNK {
                return Err(StigmerError::invalid_argument(format!(
                    "archive entry {name:?} is a symlink, which is not allowed"
                )));
            }
        }

        let compressed = entry.compressed_size();
        let uncompressed = entry.size();
        total_uncompressed += uncompressed;
        if total_uncompressed > MAX_UNCOMPRESSED_BYTES {
            return Err(StigmerError::invalid_argument(format!(
                "archive expands past the {MAX_UNCOMPRESSED_BYTES}-byte uncompressed limit"
            )));
        }
        if compressed > 0 && uncompressed / compressed.max(1) > MAX_COMPRESSION_RATIO {
            return Err(StigmerError::invalid_argument(format!(
                "archive entry {name:?} exceeds the {MAX_COMPRESSION_RATIO}:1 compression ratio limit"
            )));
        }

        if name == SKILL_MANIFEST_NAME && manifest_text.is_none() {
            if uncompressed as usize > MAX_SKILL_MD_BYTES {
                return Err(StigmerError::invalid_argument(format!(
                    "{SKILL_MANIFEST_NAME} is {uncompressed} bytes, exceeds the {MAX_SKILL_MD_BYTES}-byte cap"
                )));
            }
            let mut buf = Vec::with_capacity(uncompressed as usize);
            entry
                .take(MAX_SKILL_MD_BYTES as u64)
                .read_to_end(&mut buf)
                .map_err(|e| StigmerError::invalid_argument(format!("reading {SKILL_MANIFEST_NAME}: {e}")))?;
            manifest_text = Some(
                String::from_utf8(buf)
                    .map_err(|_| StigmerError::invalid_argument(format!("{SKILL_MANIFEST_NAME} is not valid UTF-8")))?,
            );
        }
    }

    manifest_text.ok_or_else(|| {
        StigmerError::invalid_argument(format!("archive is missing required {SKILL_MANIFEST_NAME}"))
    })
}

/// Rejects absolute paths, parent-directory traversal, and any other path
/// that would escape the extraction root (spec §8: "a relative-path entry
/// `../etc/passwd` is rejected"). The daemon never actually extracts
/// these entries to disk, but a path-traversal name is itself a signal of
/// a malicious archive and is rejected outright rather than merely
/// ignored.
fn reject_unsafe_entry_path(name: &str) -> Result<()> {
    let path = Path::new(name);
    if path.is_absolute() {
        return Err(StigmerError::invalid_argument(format!(
            "archive entry {name:?} has an absolute path"
        )));
    }
    if path.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
        return Err(StigmerError::invalid_argument(format!(
            "archive entry {name:?} attempts path traversal"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn build_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let cursor = std::io::Cursor::new(&mut buf);
            let mut writer = zip::ZipWriter::new(cursor);
            let options = zip::write::FileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated);
            for (name, contents) in entries {
                writer.start_file(*name, options).unwrap();
                writer.write_all(contents).unwrap();
            }
            writer.finish().unwrap();
        }
        buf
    }

    #[test]
    fn push_stores_a_new_archive_and_extracts_the_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let store = SkillArtifactStore::new(dir.path().to_path_buf());
        let archive = build_archive(&[
            (SKILL_MANIFEST_NAME, b"# My Skill\n"),
            ("scripts/run.sh", b"#!/bin/sh\necho hi\n"),
        ]);

        let pushed = store.push(&archive).unwrap();
        assert!(!pushed.deduplicated);
        assert_eq!(pushed.manifest_text, "# My Skill\n");
        assert!(store.blob_exists(&pushed.content_hash));
    }

    #[test]
    fn pushing_identical_bytes_twice_deduplicates() {
        let dir = tempfile::tempdir().unwrap();
        let store = SkillArtifactStore::new(dir.path().to_path_buf());
        let archive = build_archive(&[(SKILL_MANIFEST_NAME, b"hello")]);

        let first = store.push(&archive).unwrap();
        let second = store.push(&archive).unwrap();
        assert!(!first.deduplicated);
        assert!(second.deduplicated);
        assert_eq!(first.content_hash, second.content_hash);
    }

    #[test]
    fn missing_manifest_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = SkillArtifactStore::new(dir.path().to_path_buf());
        let archive = build_archive(&[("README.md", b"nothing to see here")]);
        let err = store.push(&archive).unwrap_err();
        assert!(matches!(err, StigmerError::InvalidArgument { .. }));
    }

    #[test]
    fn path_traversal_entry_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = SkillArtifactStore::new(dir.path().to_path_buf());
        let archive = build_archive(&[
            (SKILL_MANIFEST_NAME, b"# ok"),
            ("../../../etc/passwd", b"root:x:0:0"),
        ]);
        let err = store.push(&archive).unwrap_err();
        assert!(err.to_string().contains("traversal"));
    }

    #[test]
    fn oversized_compressed_archive_is_rejected_before_any_disk_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = SkillArtifactStore::new(dir.path().to_path_buf());
        let huge = vec![0u8; (MAX_COMPRESSED_BYTES + 1) as usize];
        let err = store.push(&huge).unwrap_err();
        assert!(matches!(err, StigmerError::InvalidArgument { .. }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
