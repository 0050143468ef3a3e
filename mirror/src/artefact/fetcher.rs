//! Staging-area population.
//!
//! Creates the staging directory and pulls every artifact into it through an
//! [`ArtifactTransfer`], asking the operator whether to retry after each
//! failed attempt.

use camino::Utf8Path;
use log::{info, warn};
use std::io::Write;
use std::num::NonZeroU32;

use super::download::{ArtifactTransfer, TransferError};
use super::index::RemoteArtifact;
use crate::output::write_stderr_line;
use crate::prompt::{Checkpoint, Confirmer};

/// Why fetching stopped before every artifact arrived.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The staging directory could not be created.
    #[error("could not create staging directory {path}: {source}")]
    CreateStaging {
        /// The staging directory.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The operator declined to retry a failed transfer.
    #[error("transfer of {filename} aborted by operator: {source}")]
    Aborted {
        /// The artifact whose transfer failed.
        filename: String,
        /// The last transfer error.
        #[source]
        source: Box<TransferError>,
    },

    /// The artifact failed on every permitted attempt.
    #[error("transfer of {filename} failed after {attempts} attempt(s): {source}")]
    Exhausted {
        /// The artifact whose transfer failed.
        filename: String,
        /// Number of attempts made.
        attempts: u32,
        /// The last transfer error.
        #[source]
        source: Box<TransferError>,
    },
}

/// Settings for one fetch run.
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    /// Upper bound on attempts per artifact, including the first.
    pub max_attempts: NonZeroU32,
    /// Suppress progress output.
    pub quiet: bool,
}

/// Ensure every artifact exists in `staging_dir`.
///
/// The directory (and its parents) is created if absent. Re-running against
/// a populated directory is safe: transfers overwrite what is there.
///
/// # Errors
///
/// Returns [`FetchError`] when the directory cannot be created, the operator
/// declines a retry, or an artifact exhausts its attempts. Artifacts already
/// transferred stay in place.
pub fn fetch_all(
    staging_dir: &Utf8Path,
    artifacts: &[RemoteArtifact],
    transfer: &dyn ArtifactTransfer,
    confirmer: &dyn Confirmer,
    options: FetchOptions,
    stderr: &mut dyn Write,
) -> Result<(), FetchError> {
    std::fs::create_dir_all(staging_dir).map_err(|source| FetchError::CreateStaging {
        path: staging_dir.to_string(),
        source,
    })?;

    for artifact in artifacts {
        fetch_one(staging_dir, artifact, transfer, confirmer, options, stderr)?;
    }
    info!(
        "fetched {} artifact(s) into {staging_dir}",
        artifacts.len()
    );
    Ok(())
}

fn fetch_one(
    staging_dir: &Utf8Path,
    artifact: &RemoteArtifact,
    transfer: &dyn ArtifactTransfer,
    confirmer: &dyn Confirmer,
    options: FetchOptions,
    stderr: &mut dyn Write,
) -> Result<(), FetchError> {
    let mut attempt = 1;
    loop {
        if !options.quiet {
            write_stderr_line(stderr, format!("Downloading {}", artifact.url()));
        }
        let error = match transfer.transfer(artifact, staging_dir.as_std_path()) {
            Ok(path) if path.is_file() => return Ok(()),
            Ok(path) => TransferError::MissingOutput {
                url: artifact.url().to_owned(),
                path,
            },
            Err(error) => error,
        };
        warn!("attempt {attempt} for {} failed: {error}", artifact.filename());
        write_stderr_line(stderr, format!("Problem downloading {}: {error}", artifact.filename()));

        if attempt >= options.max_attempts.get() {
            return Err(FetchError::Exhausted {
                filename: artifact.filename().to_owned(),
                attempts: attempt,
                source: Box::new(error),
            });
        }
        let question = format!("Retry {}", artifact.filename());
        if !confirmer.confirm(Checkpoint::TransferFailure, &question) {
            return Err(FetchError::Aborted {
                filename: artifact.filename().to_owned(),
                source: Box::new(error),
            });
        }
        attempt += 1;
    }
}
