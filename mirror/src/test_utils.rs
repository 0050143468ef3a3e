//! Stub collaborators and fixture builders for pipeline tests.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::artefact::download::{ArtifactTransfer, TransferError};
use crate::artefact::index::{IndexError, IndexSource, RemoteArtifact};
use crate::prompt::{Checkpoint, Confirmer};

/// Render an index page whose first table lists `urls`, one per row, with
/// the link in the second cell.
#[must_use]
pub fn index_html(urls: &[&str]) -> String {
    let rows: String = urls
        .iter()
        .map(|url| format!("<tr><td>file</td><td><a href=\"{url}\">{url}</a></td></tr>\n"))
        .collect();
    format!(
        concat!(
            "<html><body>\n",
            "<table>\n<tr><th>Description</th><th>Download</th></tr>\n{}</table>\n",
            "<table><tr><td>other</td><td><a href=\"ignored.tar\">x</a></td></tr></table>\n",
            "</body></html>\n"
        ),
        rows
    )
}

/// An [`IndexSource`] serving a fixed document.
#[derive(Debug, Clone)]
pub struct StubIndexSource {
    html: Result<String, String>,
}

impl StubIndexSource {
    /// Serve `html` for every URL.
    #[must_use]
    pub fn serving(html: impl Into<String>) -> Self {
        Self {
            html: Ok(html.into()),
        }
    }

    /// Fail every fetch with `reason`.
    #[must_use]
    pub fn unreachable(reason: impl Into<String>) -> Self {
        Self {
            html: Err(reason.into()),
        }
    }
}

impl IndexSource for StubIndexSource {
    fn fetch_index(&self, url: &str) -> Result<String, IndexError> {
        self.html.clone().map_err(|reason| IndexError::Fetch {
            url: url.to_owned(),
            reason,
        })
    }
}

/// An [`ArtifactTransfer`] that writes canned bytes by filename.
///
/// Unknown filenames fail with [`TransferError::NotFound`]. A filename can be
/// scripted to fail a number of times before succeeding.
#[derive(Debug, Default)]
pub struct StubTransfer {
    files: HashMap<String, Vec<u8>>,
    failures: RefCell<HashMap<String, u32>>,
    calls: RefCell<Vec<String>>,
}

impl StubTransfer {
    /// Create a transfer that knows no files.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `bytes` for `filename`.
    #[must_use]
    pub fn with_file(mut self, filename: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.files.insert(filename.to_owned(), bytes.into());
        self
    }

    /// Fail the first `times` transfers of `filename`.
    #[must_use]
    pub fn failing(self, filename: &str, times: u32) -> Self {
        self.failures.borrow_mut().insert(filename.to_owned(), times);
        self
    }

    /// Filenames requested so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl ArtifactTransfer for StubTransfer {
    fn transfer(
        &self,
        artifact: &RemoteArtifact,
        dest_dir: &Path,
    ) -> Result<PathBuf, TransferError> {
        let name = artifact.filename();
        self.calls.borrow_mut().push(name.to_owned());

        if let Some(remaining) = self.failures.borrow_mut().get_mut(name) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(TransferError::Http {
                    url: artifact.url().to_owned(),
                    reason: "connection reset by stub".to_owned(),
                });
            }
        }

        let Some(bytes) = self.files.get(name) else {
            return Err(TransferError::NotFound {
                url: artifact.url().to_owned(),
            });
        };
        let dest = dest_dir.join(name);
        std::fs::write(&dest, bytes)?;
        Ok(dest)
    }
}

/// A [`Confirmer`] answering from a script, declining once it runs out.
#[derive(Debug, Default)]
pub struct ScriptedConfirmer {
    answers: RefCell<VecDeque<bool>>,
    asked: RefCell<Vec<Checkpoint>>,
}

impl ScriptedConfirmer {
    /// Answer with `answers` in order.
    #[must_use]
    pub fn new(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            answers: RefCell::new(answers.into_iter().collect()),
            asked: RefCell::new(Vec::new()),
        }
    }

    /// Checkpoints asked so far, in order.
    #[must_use]
    pub fn asked(&self) -> Vec<Checkpoint> {
        self.asked.borrow().clone()
    }
}

impl Confirmer for ScriptedConfirmer {
    fn confirm(&self, checkpoint: Checkpoint, _question: &str) -> bool {
        self.asked.borrow_mut().push(checkpoint);
        self.answers.borrow_mut().pop_front().unwrap_or(false)
    }
}

/// Build a gzip-compressed tarball holding `entries` (path, contents).
///
/// # Errors
///
/// Returns any I/O error from the encoder.
pub fn tar_gz(entries: &[(&str, &[u8])]) -> std::io::Result<Vec<u8>> {
    let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, contents) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, *contents)?;
    }
    let mut encoder = builder.into_inner()?;
    encoder.flush()?;
    encoder.finish()
}
