//! Error types for the mirror pipeline and CLI.
//!
//! Each stage reports its own error enum. They are folded into
//! [`MirrorError`] at the pipeline boundary, where every variant maps to a
//! distinct process exit code.

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::artefact::extraction::ExpansionFailure;
use crate::artefact::fetcher::FetchError;
use crate::artefact::index::IndexError;
use crate::config::ConfigError;
use crate::lock::LockError;
use crate::preflight::PreflightError;
use crate::publish::PublishError;
use crate::relocation::RelocationError;
use crate::release::ReleaseError;

/// Errors that end a mirror run.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// The invocation context failed the operator check.
    #[error("pre-flight check failed: {}", join_errors(.errors))]
    Preflight {
        /// Every failed check.
        errors: Vec<PreflightError>,
    },

    /// The release index could not be retrieved.
    #[error("could not retrieve the release index: {0}")]
    ManifestFetch(#[source] IndexError),

    /// The release index did not describe any artifacts.
    #[error("could not read the release index: {0}")]
    ManifestParse(#[source] IndexError),

    /// The operator declined the discovered artifact list.
    #[error("cancelled by operator before downloading")]
    DiscoveryDeclined,

    /// The staging directory could not be created.
    #[error("could not prepare staging area: {0}")]
    Staging(#[source] FetchError),

    /// An artifact failed on every permitted attempt.
    #[error("{0}")]
    Transfer(#[source] FetchError),

    /// The operator chose not to retry a failed transfer.
    #[error("{0}")]
    TransferAborted(#[source] FetchError),

    /// An archive could not be expanded; the release is considered corrupt.
    #[error("{0}")]
    Expansion(#[from] ExpansionFailure),

    /// The manifest or readme could not be relocated.
    #[error("metadata relocation failed: {0}")]
    Relocation(#[from] RelocationError),

    /// The operator kept an existing public tree.
    #[error("{path} already exists; overwrite declined")]
    PublishCollisionDeclined {
        /// The existing public tree.
        path: Utf8PathBuf,
    },

    /// Something other than a symlink occupies the pointer location.
    #[error("{path} exists and is not a symlink; refusing to replace it")]
    PointerNotSymlink {
        /// The pointer location.
        path: Utf8PathBuf,
    },

    /// The staging tree could not be moved into the public root.
    #[error("publish failed: {0}")]
    PublishMove(#[source] PublishError),

    /// The pointer could not be retargeted.
    #[error("publish failed: {0}")]
    PointerSwap(#[source] PublishError),

    /// The requested version or configured family is unusable.
    #[error(transparent)]
    InvalidVersion(#[from] ReleaseError),

    /// Configuration could not be loaded or is invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Another publisher holds the family lock.
    #[error("another publish is already running (lock held on {path})")]
    LockHeld {
        /// The lock file.
        path: Utf8PathBuf,
    },

    /// The lock file could not be opened.
    #[error("{0}")]
    Lock(#[source] LockError),

    /// Output could not be serialised.
    #[error("could not serialise output: {0}")]
    Json(#[from] serde_json::Error),

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn join_errors(errors: &[PreflightError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl MirrorError {
    /// Process exit code for this failure class.
    ///
    /// ```
    /// use caldb_mirror::error::MirrorError;
    ///
    /// assert_eq!(MirrorError::DiscoveryDeclined.exit_code(), 3);
    /// ```
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Preflight { .. } => 2,
            Self::DiscoveryDeclined => 3,
            Self::ManifestFetch(_) | Self::ManifestParse(_) => 4,
            Self::Transfer(_) | Self::TransferAborted(_) => 5,
            Self::Expansion(_) => 6,
            Self::Relocation(_) => 7,
            Self::PublishCollisionDeclined { .. } => 8,
            Self::PublishMove(_) | Self::PointerSwap(_) | Self::PointerNotSymlink { .. } => 9,
            Self::LockHeld { .. } => 10,
            Self::Staging(_)
            | Self::InvalidVersion(_)
            | Self::Config(_)
            | Self::Lock(_)
            | Self::Json(_)
            | Self::Io(_) => 1,
        }
    }

    /// Whether the operator chose to stop rather than something failing.
    #[must_use]
    pub fn is_declined(&self) -> bool {
        matches!(
            self,
            Self::DiscoveryDeclined
                | Self::TransferAborted(_)
                | Self::PublishCollisionDeclined { .. }
        )
    }
}

impl From<IndexError> for MirrorError {
    fn from(err: IndexError) -> Self {
        if err.is_fetch() {
            Self::ManifestFetch(err)
        } else {
            Self::ManifestParse(err)
        }
    }
}

impl From<FetchError> for MirrorError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::CreateStaging { .. } => Self::Staging(err),
            FetchError::Aborted { .. } => Self::TransferAborted(err),
            FetchError::Exhausted { .. } => Self::Transfer(err),
        }
    }
}

impl From<PublishError> for MirrorError {
    fn from(err: PublishError) -> Self {
        match err {
            PublishError::CollisionDeclined { path } => Self::PublishCollisionDeclined { path },
            PublishError::PointerNotSymlink { path } => Self::PointerNotSymlink { path },
            PublishError::PointerSwap { .. } | PublishError::NonUtf8Target { .. } => {
                Self::PointerSwap(err)
            }
            PublishError::Move { .. }
            | PublishError::Supersede { .. }
            | PublishError::Inspect { .. } => Self::PublishMove(err),
        }
    }
}

impl From<LockError> for MirrorError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Held { path } => Self::LockHeld { path },
            LockError::Open { .. } => Self::Lock(err),
        }
    }
}

/// Result type alias using [`MirrorError`].
pub type Result<T> = std::result::Result<T, MirrorError>;
