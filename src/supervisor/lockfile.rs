//! Exclusive OS file lock guarding single-instance subprocess ownership
//! (spec §4.7 step 2), grounded on the teacher's analogous pattern in
//! `groblegark-oddjobs`'s `crates/daemon/src/lifecycle.rs` (acquire the
//! lock before writing the PID, so the lock itself is the race-free gate).
//!
//! The lock is held via an open file descriptor; the OS releases it the
//! moment the process dies, crash or clean exit alike, so a stale lock
//! file left on disk after a hard crash never wedges the next start.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use fs2::FileExt;

use crate::error::{Result, StigmerError};

pub struct Lockfile {
    file: File,
}

impl Lockfile {
    /// Acquires the lock at `path`, creating the file if needed, and writes
    /// the current PID into it. Fails immediately (non-blocking) if another
    /// process already holds the lock.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| StigmerError::internal(format!("creating lock directory: {err}")))?;
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|err| StigmerError::internal(format!("opening lock file {}: {err}", path.display())))?;

        file.try_lock_exclusive().map_err(|err| {
            StigmerError::failed_precondition(format!("lock {} already held: {err}", path.display()))
        })?;

        file.set_len(0)
            .map_err(|err| StigmerError::internal(format!("truncating lock file: {err}")))?;
        writeln!(file, "{}", std::process::id())
            .map_err(|err| StigmerError::internal(format!("writing pid to lock file: {err}")))?;

        Ok(Lockfile { file })
    }
}

impl Drop for Lockfile {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_on_same_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("component.lock");
        let _first = Lockfile::acquire(&path).unwrap();
        assert!(Lockfile::acquire(&path).is_err());
    }

    #[test]
    fn lock_is_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("component.lock");
        {
            let _first = Lockfile::acquire(&path).unwrap();
        }
        let second = Lockfile::acquire(&path);
        assert!(second.is_ok());
    }
}
