//! Publish pipeline orchestration.
//!
//! Runs the stages strictly in order (discover, fetch, expand, relocate,
//! publish); each stage's success gates the next. Collaborators that touch
//! the network or the operator are injected so the whole run can be driven
//! from tests.

use log::info;
use std::io::Write;
use std::num::NonZeroU32;

use crate::artefact::download::ArtifactTransfer;
use crate::artefact::extraction::{ArchiveExtractor, expand_archives};
use crate::artefact::fetcher::{FetchOptions, fetch_all};
use crate::artefact::index::{IndexSource, RemoteArtifact, resolve_artifacts};
use crate::error::{MirrorError, Result};
use crate::output::{DryRunPlan, artifact_listing, published_message, write_stderr_line};
use crate::prompt::{Checkpoint, Confirmer};
use crate::publish::{Publication, PublishOptions, PublishSwitch};
use crate::relocation::relocate_metadata;
use crate::release::Release;

/// Settings for one pipeline run.
#[derive(Debug, Clone, Copy)]
pub struct PipelineContext<'a> {
    /// The release being published.
    pub release: &'a Release,
    /// Remote index listing the release's files.
    pub index_url: &'a str,
    /// Attempts per artifact, including the first.
    pub max_attempts: NonZeroU32,
    /// Suppress progress output (errors still shown).
    pub quiet: bool,
}

/// The injected side-effecting collaborators.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    /// Retrieves the index document.
    pub index: &'a dyn IndexSource,
    /// Transfers artifacts into staging.
    pub transfer: &'a dyn ArtifactTransfer,
    /// Expands archives in staging.
    pub extractor: &'a dyn ArchiveExtractor,
    /// Answers the checkpoints.
    pub confirmer: &'a dyn Confirmer,
}

/// Resolve the release's artifacts and print them.
///
/// # Errors
///
/// Returns [`MirrorError::ManifestFetch`] or [`MirrorError::ManifestParse`].
pub fn discover(
    context: &PipelineContext<'_>,
    index: &dyn IndexSource,
    stderr: &mut dyn Write,
) -> Result<Vec<RemoteArtifact>> {
    if !context.quiet {
        write_stderr_line(stderr, format!("Reading release index {}", context.index_url));
    }
    let artifacts = resolve_artifacts(index, context.index_url)?;
    info!(
        "{} {} consists of {} artifact(s)",
        context.release.family(),
        context.release.version(),
        artifacts.len()
    );
    if !context.quiet {
        write_stderr_line(stderr, artifact_listing(&artifacts));
    }
    Ok(artifacts)
}

/// Resolve the release and print what a publish would do, without touching
/// the filesystem.
///
/// # Errors
///
/// Returns the discovery errors of [`discover`].
pub fn dry_run(
    context: &PipelineContext<'_>,
    index: &dyn IndexSource,
    stderr: &mut dyn Write,
) -> Result<Vec<RemoteArtifact>> {
    let quiet_context = PipelineContext {
        quiet: true,
        ..*context
    };
    let artifacts = discover(&quiet_context, index, stderr)?;
    let plan = DryRunPlan {
        release: context.release,
        index_url: context.index_url,
        artifacts: &artifacts,
        replaces_existing: context.release.public_path().exists(),
    };
    write_stderr_line(stderr, plan.display_text());
    Ok(artifacts)
}

/// Run every stage and publish the release.
///
/// Nothing is written to disk until the operator accepts the discovered
/// artifact list. A failure at any stage stops the run; the staging tree is
/// left as it was for inspection and the publication pointer is untouched.
///
/// # Errors
///
/// Returns the [`MirrorError`] of the first stage that failed or was
/// declined.
pub fn run_pipeline(
    context: &PipelineContext<'_>,
    collaborators: &Collaborators<'_>,
    stderr: &mut dyn Write,
) -> Result<Publication> {
    let result = run_stages(context, collaborators, stderr);
    if let Err(err) = &result {
        let verb = if err.is_declined() { "Cancelled" } else { "Failed" };
        write_stderr_line(
            stderr,
            format!(
                "{verb}: aborting publish of {} {}",
                context.release.family(),
                context.release.version()
            ),
        );
    }
    result
}

fn run_stages(
    context: &PipelineContext<'_>,
    collaborators: &Collaborators<'_>,
    stderr: &mut dyn Write,
) -> Result<Publication> {
    let release = context.release;
    let artifacts = discover(context, collaborators.index, stderr)?;
    let question = format!("Download {} file(s) for {}", artifacts.len(), release.version());
    if !collaborators.confirmer.confirm(Checkpoint::Discovery, &question) {
        return Err(MirrorError::DiscoveryDeclined);
    }

    let staging = release.staging_path();
    let fetch_options = FetchOptions {
        max_attempts: context.max_attempts,
        quiet: context.quiet,
    };
    fetch_all(
        &staging,
        &artifacts,
        collaborators.transfer,
        collaborators.confirmer,
        fetch_options,
        stderr,
    )?;

    let expanded = expand_archives(&staging, collaborators.extractor, context.quiet, stderr)?;
    info!("expanded {expanded} archive(s) in {staging}");

    relocate_metadata(&staging, release, context.quiet, stderr)?;

    let switch = PublishSwitch::new(release.layout().clone());
    let publication = switch.publish(
        release,
        collaborators.confirmer,
        PublishOptions {
            quiet: context.quiet,
        },
        stderr,
    )?;

    if !context.quiet {
        write_stderr_line(stderr, published_message(release, &publication.target));
    }
    Ok(publication)
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
