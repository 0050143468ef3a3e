//! Operator-facing text for the mirror CLI.
//!
//! Progress lines go to an injected writer rather than straight to the
//! process's stderr so the pipeline can be exercised against a buffer.

use camino::Utf8Path;
use std::fmt::Display;
use std::io::Write;

use crate::artefact::index::RemoteArtifact;
use crate::release::Release;

/// Write one line to `stderr`, ignoring write failures.
pub fn write_stderr_line(stderr: &mut dyn Write, message: impl Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort output; ignore write failures.
    }
}

/// Format the artifact list shown before the discovery checkpoint.
///
/// ```
/// use caldb_mirror::artefact::index::RemoteArtifact;
/// use caldb_mirror::output::artifact_listing;
///
/// let artifacts = vec![
///     RemoteArtifact::from_url("https://example.test/a.tar.gz").expect("artifact"),
/// ];
/// let text = artifact_listing(&artifacts);
/// assert!(text.contains("1 file(s)"));
/// assert!(text.contains("  https://example.test/a.tar.gz"));
/// ```
#[must_use]
pub fn artifact_listing(artifacts: &[RemoteArtifact]) -> String {
    let mut lines = vec![format!(
        "The release consists of {} file(s):",
        artifacts.len()
    )];
    lines.extend(artifacts.iter().map(|a| format!("  {}", a.url())));
    lines.join("\n")
}

/// Format the message printed once a release is live.
#[must_use]
pub fn published_message(release: &Release, link_target: &Utf8Path) -> String {
    format!(
        "Published {} {} at {}; {} now points to {link_target}",
        release.family(),
        release.version(),
        release.public_path(),
        release.pointer_path(),
    )
}

/// Everything a dry run reports.
#[derive(Debug)]
pub struct DryRunPlan<'a> {
    /// The release that would be published.
    pub release: &'a Release,
    /// Remote index that lists the release's files.
    pub index_url: &'a str,
    /// Artifacts the index resolved to.
    pub artifacts: &'a [RemoteArtifact],
    /// Whether a public tree for this version already exists.
    pub replaces_existing: bool,
}

impl DryRunPlan<'_> {
    /// Format the plan for display.
    #[must_use]
    pub fn display_text(&self) -> String {
        let mut lines = vec![
            "Dry run - no files will be modified".to_owned(),
            String::new(),
            format!("Family: {}", self.release.family()),
            format!("Version: {}", self.release.version()),
            format!("Index: {}", self.index_url),
            format!("Staging tree: {}", self.release.staging_path()),
            format!("Public tree: {}", self.release.public_path()),
            format!(
                "Pointer: {} -> {}",
                self.release.pointer_path(),
                self.release.link_target()
            ),
        ];
        if self.replaces_existing {
            lines.push("Existing public tree would be replaced (after confirmation)".to_owned());
        }
        lines.push(String::new());
        lines.push(artifact_listing(self.artifacts));
        lines.join("\n")
    }
}
