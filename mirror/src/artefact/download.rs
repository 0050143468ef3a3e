//! Artifact transfer mechanisms.
//!
//! Provides a trait-based abstraction for moving one remote artifact into a
//! local directory, with an HTTP implementation and an external-downloader
//! implementation, so tests can inject stubs without network access.

use log::{debug, trace};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use wait_timeout::ChildExt;

use super::index::RemoteArtifact;

/// Transfers one artifact into a directory.
///
/// Implementations must leave the artifact at `dest_dir/<filename>` on
/// success and may overwrite a file that is already there.
#[cfg_attr(test, mockall::automock)]
pub trait ArtifactTransfer {
    /// Transfer `artifact` into `dest_dir`, returning the written path.
    ///
    /// # Errors
    ///
    /// Returns a [`TransferError`] when the transfer fails or times out.
    fn transfer(&self, artifact: &RemoteArtifact, dest_dir: &Path)
    -> Result<PathBuf, TransferError>;
}

/// Errors arising from a single artifact transfer.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// HTTP request failed.
    #[error("download failed for {url}: {reason}")]
    Http {
        /// The URL that was requested.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// The requested artifact was not found (HTTP 404).
    #[error("artifact not found: {url}")]
    NotFound {
        /// The URL that returned 404.
        url: String,
    },

    /// The external downloader could not be started.
    #[error("could not run {program}: {source}")]
    Spawn {
        /// The downloader program.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The external downloader exited unsuccessfully.
    #[error("{program} exited with {status} for {url}")]
    CommandFailed {
        /// The downloader program.
        program: String,
        /// The URL being fetched.
        url: String,
        /// Exit status description.
        status: String,
    },

    /// The transfer did not finish within its time budget.
    #[error("transfer of {url} timed out after {seconds}s")]
    TimedOut {
        /// The URL being fetched.
        url: String,
        /// The budget that expired.
        seconds: u64,
    },

    /// The transfer reported success but the file is absent.
    #[error("transfer of {url} reported success but {path} does not exist")]
    MissingOutput {
        /// The URL being fetched.
        url: String,
        /// Where the file was expected.
        path: PathBuf,
    },

    /// I/O error writing the downloaded file.
    #[error("I/O error writing download: {0}")]
    Io(#[from] std::io::Error),
}

/// Build a `ureq` agent whose requests expire after `timeout`.
pub(crate) fn http_agent(timeout: Duration) -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build();
    ureq::Agent::new_with_config(config)
}

/// HTTP transfer using `ureq`, streaming to a hidden temporary file that is
/// renamed into place once complete.
#[derive(Debug, Clone)]
pub struct HttpTransfer {
    agent: ureq::Agent,
    timeout: Duration,
}

impl HttpTransfer {
    /// Create a transfer whose per-artifact requests expire after `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: http_agent(timeout),
            timeout,
        }
    }
}

impl ArtifactTransfer for HttpTransfer {
    fn transfer(
        &self,
        artifact: &RemoteArtifact,
        dest_dir: &Path,
    ) -> Result<PathBuf, TransferError> {
        let url = artifact.url();
        let dest = dest_dir.join(artifact.filename());

        let response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| map_ureq_error(url, &e, self.timeout))?;
        let mut partial = tempfile::Builder::new()
            .prefix(".download-")
            .tempfile_in(dest_dir)?;
        std::io::copy(&mut response.into_body().as_reader(), partial.as_file_mut()).map_err(
            |e| TransferError::Http {
                url: url.to_owned(),
                reason: e.to_string(),
            },
        )?;
        partial.persist(&dest).map_err(|e| TransferError::Io(e.error))?;
        debug!("downloaded {url} to {}", dest.display());
        Ok(dest)
    }
}

/// Map a ureq error to a [`TransferError`].
fn map_ureq_error(url: &str, err: &ureq::Error, timeout: Duration) -> TransferError {
    match err {
        ureq::Error::StatusCode(404) => TransferError::NotFound {
            url: url.to_owned(),
        },
        ureq::Error::Timeout(_) => TransferError::TimedOut {
            url: url.to_owned(),
            seconds: timeout.as_secs(),
        },
        other => TransferError::Http {
            url: url.to_owned(),
            reason: other.to_string(),
        },
    }
}

/// Transfer through an external downloader such as `wget`.
///
/// The program runs with `dest_dir` as its working directory and the URL as
/// its final argument, so it deposits a same-named file there.
#[derive(Debug, Clone)]
pub struct CommandTransfer {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandTransfer {
    /// Create a transfer from a command line (program followed by arguments).
    ///
    /// Returns `None` when `command` is empty.
    ///
    /// ```
    /// use caldb_mirror::artefact::download::CommandTransfer;
    /// use std::time::Duration;
    ///
    /// let wget = ["wget", "-q", "-N"].map(String::from);
    /// assert!(CommandTransfer::from_command_line(&wget, Duration::from_secs(60)).is_some());
    /// assert!(CommandTransfer::from_command_line(&[], Duration::from_secs(60)).is_none());
    /// ```
    #[must_use]
    pub fn from_command_line(command: &[String], timeout: Duration) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout,
        })
    }
}

impl ArtifactTransfer for CommandTransfer {
    fn transfer(
        &self,
        artifact: &RemoteArtifact,
        dest_dir: &Path,
    ) -> Result<PathBuf, TransferError> {
        let url = artifact.url();
        debug!("running {} {} {url}", self.program, self.args.join(" "));
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(url)
            .current_dir(dest_dir)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|source| TransferError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let Some(status) = child.wait_timeout(self.timeout)? else {
            if let Err(e) = child.kill() {
                trace!("could not kill {}: {e}", self.program);
            }
            child.wait()?;
            return Err(TransferError::TimedOut {
                url: url.to_owned(),
                seconds: self.timeout.as_secs(),
            });
        };

        if !status.success() {
            return Err(TransferError::CommandFailed {
                program: self.program.clone(),
                url: url.to_owned(),
                status: status.to_string(),
            });
        }

        let dest = dest_dir.join(artifact.filename());
        if !dest.is_file() {
            return Err(TransferError::MissingOutput {
                url: url.to_owned(),
                path: dest,
            });
        }
        Ok(dest)
    }
}
