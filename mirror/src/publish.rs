//! Promotion of a staged release to the public root.
//!
//! The publication pointer is a symlink at `<public_root>/<family>`. Readers
//! follow it, so it is only ever retargeted at a complete tree, and the swap
//! itself is a rename of a freshly created link over the old one.
//!
//! When a tree for the same version is already public it is renamed aside
//! before the new tree moves in and deleted only once the pointer is
//! rewritten. A failed move puts it back.

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use log::{debug, info, warn};
use std::io::{self, ErrorKind, Write};
use walkdir::WalkDir;

use crate::output::write_stderr_line;
use crate::prompt::{Checkpoint, Confirmer};
use crate::release::{Release, ReleaseLayout, ReleaseVersion};

/// Errors raised while publishing a release or reading the pointer.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// Something other than a symlink occupies the pointer location.
    #[error("{path} exists and is not a symlink; refusing to replace it")]
    PointerNotSymlink {
        /// The pointer location.
        path: Utf8PathBuf,
    },

    /// The operator declined to replace an existing public tree.
    #[error("{path} already exists and was not replaced")]
    CollisionDeclined {
        /// The existing public tree.
        path: Utf8PathBuf,
    },

    /// The staging tree could not be moved into the public root.
    #[error("could not move {from} to {to}: {source}")]
    Move {
        /// The staging tree.
        from: Utf8PathBuf,
        /// The intended public tree.
        to: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The existing public tree could not be set aside.
    #[error("could not set aside existing {path}: {source}")]
    Supersede {
        /// The existing public tree.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The new pointer could not be created or renamed into place.
    #[error("could not point {pointer} at {target}: {source}")]
    PointerSwap {
        /// The pointer location.
        pointer: Utf8PathBuf,
        /// The intended target.
        target: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The pointer's target is not valid UTF-8.
    #[error("{pointer} targets a non-UTF-8 path: {target}")]
    NonUtf8Target {
        /// The pointer location.
        pointer: Utf8PathBuf,
        /// Lossy rendering of the target.
        target: String,
    },

    /// The pointer location could not be inspected.
    #[error("could not inspect {path}: {source}")]
    Inspect {
        /// The inspected path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Outcome of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    /// The version now live.
    pub version: ReleaseVersion,
    /// Where its tree lives.
    pub public_path: Utf8PathBuf,
    /// The pointer that was rewritten.
    pub pointer: Utf8PathBuf,
    /// The pointer's new target.
    pub target: Utf8PathBuf,
    /// The pointer's target before the swap, if there was a pointer.
    pub previous_target: Option<Utf8PathBuf>,
    /// Whether an existing tree for this version was replaced.
    pub replaced_existing: bool,
}

/// What the pointer currently references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentPublication {
    /// The pointer location.
    pub pointer: Utf8PathBuf,
    /// The raw symlink target.
    pub target: Utf8PathBuf,
    /// The version parsed from the `<family>-<version>` component of the
    /// target, when one is present.
    pub version: Option<ReleaseVersion>,
    /// Whether the target resolves to an existing directory.
    pub target_exists: bool,
}

/// Options for one publish.
#[derive(Debug, Clone, Copy, Default)]
pub struct PublishOptions {
    /// Suppress progress output.
    pub quiet: bool,
}

/// Owner of a family's publication pointer.
#[derive(Debug, Clone)]
pub struct PublishSwitch {
    layout: ReleaseLayout,
}

impl PublishSwitch {
    /// Create a switch for the family described by `layout`.
    #[must_use]
    pub fn new(layout: ReleaseLayout) -> Self {
        Self { layout }
    }

    /// Move `release`'s staging tree into the public root and retarget the
    /// pointer at its data subdirectory.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::PointerNotSymlink`] before touching anything
    /// when the pointer location holds a regular file or directory,
    /// [`PublishError::CollisionDeclined`] when the operator keeps an existing
    /// tree, and [`PublishError::Move`], [`PublishError::Supersede`] or
    /// [`PublishError::PointerSwap`] when the filesystem refuses. A failed
    /// move restores any tree that was set aside; the pointer is unchanged.
    /// A failed pointer swap leaves the new tree in place and keeps any tree
    /// that was set aside at `.<family>-<version>.superseded` in the public
    /// root, naming it in a warning on `stderr`.
    pub fn publish(
        &self,
        release: &Release,
        confirmer: &dyn Confirmer,
        options: PublishOptions,
        stderr: &mut dyn Write,
    ) -> Result<Publication, PublishError> {
        let pointer = self.layout.pointer_path();
        let previous_target = read_pointer(&pointer)?;
        let staging_path = release.staging_path();
        let public_path = release.public_path();

        let superseded = if exists(&public_path)? {
            let question = format!("{public_path} already exists. Overwrite it");
            if !confirmer.confirm(Checkpoint::Overwrite, &question) {
                return Err(PublishError::CollisionDeclined { path: public_path });
            }
            Some(self.set_aside(release, &public_path)?)
        } else {
            None
        };

        if !options.quiet {
            write_stderr_line(stderr, format!("Moving {staging_path} to {public_path}"));
        }
        if let Err(source) = move_tree(&staging_path, &public_path) {
            if let Some(aside) = &superseded {
                restore(aside, &public_path);
            }
            return Err(PublishError::Move {
                from: staging_path,
                to: public_path,
                source,
            });
        }

        let target = release.link_target();
        if !options.quiet {
            write_stderr_line(stderr, format!("Pointing {pointer} at {target}"));
        }
        if let Err(err) = self.swap_pointer(&pointer, &target) {
            if let Some(aside) = &superseded {
                warn!("pointer swap failed; previous tree for this version kept at {aside}");
                write_stderr_line(stderr, format!("Warning: previous tree kept at {aside}"));
            }
            return Err(err);
        }
        info!("{pointer} now targets {target}");

        if let Some(aside) = &superseded {
            if let Err(e) = std::fs::remove_dir_all(aside) {
                warn!("published, but could not remove superseded tree {aside}: {e}");
                write_stderr_line(stderr, format!("Warning: could not remove {aside}: {e}"));
            }
        }

        Ok(Publication {
            version: release.version().clone(),
            public_path,
            pointer,
            target,
            previous_target,
            replaced_existing: superseded.is_some(),
        })
    }

    /// Report what the pointer currently references.
    ///
    /// Returns `Ok(None)` when there is no pointer yet.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::PointerNotSymlink`] when the pointer location
    /// is occupied by something else, or [`PublishError::Inspect`] when it
    /// cannot be read.
    pub fn current(&self) -> Result<Option<CurrentPublication>, PublishError> {
        let pointer = self.layout.pointer_path();
        let Some(target) = read_pointer(&pointer)? else {
            return Ok(None);
        };

        let relative = target
            .strip_prefix(&self.layout.public_root)
            .unwrap_or(&target);
        let version = relative.components().find_map(|component| match component {
            Utf8Component::Normal(name) => self.layout.family.version_from_tree_name(name),
            _ => None,
        });
        let target_exists = pointer.is_dir();

        Ok(Some(CurrentPublication {
            pointer,
            target,
            version,
            target_exists,
        }))
    }

    fn set_aside(
        &self,
        release: &Release,
        public_path: &Utf8Path,
    ) -> Result<Utf8PathBuf, PublishError> {
        let tree_name = release.family().tree_name(release.version());
        let aside = self.layout.public_root.join(format!(".{tree_name}.superseded"));
        let supersede_error = |source| PublishError::Supersede {
            path: public_path.to_owned(),
            source,
        };

        if exists(&aside)? {
            debug!("removing stale {aside}");
            std::fs::remove_dir_all(&aside).map_err(supersede_error)?;
        }
        std::fs::rename(public_path, &aside).map_err(supersede_error)?;
        debug!("set {public_path} aside as {aside}");
        Ok(aside)
    }

    fn swap_pointer(&self, pointer: &Utf8Path, target: &Utf8Path) -> Result<(), PublishError> {
        let swap_error = |source| PublishError::PointerSwap {
            pointer: pointer.to_owned(),
            target: target.to_owned(),
            source,
        };
        let next = self
            .layout
            .public_root
            .join(format!(".{}.next", self.layout.family));

        if exists(&next)? {
            std::fs::remove_file(&next).map_err(swap_error)?;
        }
        create_symlink(target, &next).map_err(swap_error)?;
        replace_pointer(&next, pointer).map_err(|source| {
            if let Err(e) = std::fs::remove_file(&next) {
                debug!("could not remove {next}: {e}");
            }
            swap_error(source)
        })
    }
}

/// Read the pointer's target, or `None` when there is no pointer.
fn read_pointer(pointer: &Utf8Path) -> Result<Option<Utf8PathBuf>, PublishError> {
    let metadata = match std::fs::symlink_metadata(pointer) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(PublishError::Inspect {
                path: pointer.to_owned(),
                source,
            });
        }
    };
    if !metadata.file_type().is_symlink() {
        return Err(PublishError::PointerNotSymlink {
            path: pointer.to_owned(),
        });
    }

    let target = std::fs::read_link(pointer).map_err(|source| PublishError::Inspect {
        path: pointer.to_owned(),
        source,
    })?;
    Utf8PathBuf::from_path_buf(target)
        .map(Some)
        .map_err(|target| PublishError::NonUtf8Target {
            pointer: pointer.to_owned(),
            target: target.display().to_string(),
        })
}

/// Whether anything, including a dangling symlink, exists at `path`.
fn exists(path: &Utf8Path) -> Result<bool, PublishError> {
    match std::fs::symlink_metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(source) => Err(PublishError::Inspect {
            path: path.to_owned(),
            source,
        }),
    }
}

fn restore(aside: &Utf8Path, public_path: &Utf8Path) {
    if exists(public_path).unwrap_or(true) {
        if let Err(e) = std::fs::remove_dir_all(public_path) {
            warn!("could not clear {public_path} before restoring {aside}: {e}");
        }
    }
    match std::fs::rename(aside, public_path) {
        Ok(()) => info!("restored {public_path} after failed publish"),
        Err(e) => warn!("could not restore {public_path} from {aside}: {e}"),
    }
}

/// Rename `from` to `to`, copying across filesystems when a rename cannot.
///
/// The copy lands in a hidden sibling of `to` first so `to` only appears
/// once it is complete.
fn move_tree(from: &Utf8Path, to: &Utf8Path) -> io::Result<()> {
    match std::fs::rename(from, to) {
        Err(e) if e.kind() == ErrorKind::CrossesDevices => {
            debug!("{from} and {to} are on different filesystems; copying");
        }
        other => return other,
    }

    let incoming = incoming_path(to)?;
    if incoming.exists() {
        std::fs::remove_dir_all(&incoming)?;
    }
    if let Err(e) = copy_tree(from, &incoming).and_then(|()| std::fs::rename(&incoming, to)) {
        if let Err(cleanup) = std::fs::remove_dir_all(&incoming) {
            debug!("could not remove partial copy {incoming}: {cleanup}");
        }
        return Err(e);
    }
    if let Err(e) = std::fs::remove_dir_all(from) {
        warn!("published copy of {from}, but could not remove it: {e}");
    }
    Ok(())
}

fn incoming_path(to: &Utf8Path) -> io::Result<Utf8PathBuf> {
    let (Some(parent), Some(name)) = (to.parent(), to.file_name()) else {
        return Err(io::Error::new(
            ErrorKind::InvalidInput,
            format!("{to} has no parent directory"),
        ));
    };
    Ok(parent.join(format!(".{name}.incoming")))
}

/// Recursively copy `from` into a new directory `to`, preserving symlinks.
fn copy_tree(from: &Utf8Path, to: &Utf8Path) -> io::Result<()> {
    for entry in WalkDir::new(from) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(io::Error::other)?;
        let dest = to.as_std_path().join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            std::fs::create_dir_all(&dest)?;
        } else if file_type.is_symlink() {
            let link = std::fs::read_link(entry.path())?;
            copy_symlink(&link, &dest)?;
        } else {
            std::fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn create_symlink(target: &Utf8Path, link: &Utf8Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn create_symlink(target: &Utf8Path, link: &Utf8Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}

#[cfg(unix)]
fn copy_symlink(target: &std::path::Path, link: &std::path::Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn copy_symlink(target: &std::path::Path, link: &std::path::Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

#[cfg(unix)]
fn replace_pointer(next: &Utf8Path, pointer: &Utf8Path) -> io::Result<()> {
    std::fs::rename(next, pointer)
}

// Windows cannot rename over an existing directory symlink.
#[cfg(windows)]
fn replace_pointer(next: &Utf8Path, pointer: &Utf8Path) -> io::Result<()> {
    if std::fs::symlink_metadata(pointer).is_ok() {
        std::fs::remove_dir(pointer)?;
    }
    std::fs::rename(next, pointer)
}

#[cfg(all(test, unix))]
#[path = "publish_tests.rs"]
mod tests;
