//! Per-family publish lock.
//!
//! Two publishers working on the same family would race on the staging tree
//! and the pointer. The CLI holds an exclusive advisory lock on
//! `<public_root>/.<family>.lock` for the whole run; the lock is released
//! when the guard drops.

use camino::{Utf8Path, Utf8PathBuf};
use fs2::FileExt;
use log::{debug, warn};
use std::fs::{File, OpenOptions};
use std::io;

use crate::release::ReleaseLayout;

/// Errors raised while taking the lock.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// Another process holds the lock.
    #[error("another publish for this family is running (lock held on {path})")]
    Held {
        /// The lock file.
        path: Utf8PathBuf,
    },

    /// The lock file could not be opened or locked.
    #[error("could not open or lock {path}: {source}")]
    Open {
        /// The lock file.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// An exclusive lock on a family, held until dropped.
#[derive(Debug)]
pub struct FamilyLock {
    file: File,
    path: Utf8PathBuf,
}

impl FamilyLock {
    /// Location of the lock file for `layout`'s family.
    #[must_use]
    pub fn path_for(layout: &ReleaseLayout) -> Utf8PathBuf {
        layout.public_root.join(format!(".{}.lock", layout.family))
    }

    /// Take the lock without waiting.
    ///
    /// The public root is created if absent.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Held`] when another process holds it and
    /// [`LockError::Open`] when the file cannot be created or locking fails
    /// for any other reason.
    pub fn acquire(layout: &ReleaseLayout) -> Result<Self, LockError> {
        let path = Self::path_for(layout);
        let open_error = |source| LockError::Open {
            path: path.clone(),
            source,
        };

        std::fs::create_dir_all(&layout.public_root).map_err(open_error)?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(open_error)?;
        if let Err(err) = FileExt::try_lock_exclusive(&file) {
            return Err(lock_error(path, err));
        }
        debug!("acquired {path}");
        Ok(Self { file, path })
    }

    /// The lock file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

/// Only contention means another publisher; every other failure is reported
/// with its cause.
fn lock_error(path: Utf8PathBuf, err: io::Error) -> LockError {
    let contended = fs2::lock_contended_error();
    let is_contended = err.kind() == io::ErrorKind::WouldBlock
        || (err.raw_os_error().is_some() && err.raw_os_error() == contended.raw_os_error());
    if is_contended {
        LockError::Held { path }
    } else {
        LockError::Open { path, source: err }
    }
}

impl Drop for FamilyLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("could not release {}: {e}", self.path);
        }
    }
}
