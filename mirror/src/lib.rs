//! CALDB mirror library.
//!
//! This crate synchronises a versioned calibration database release into a
//! locally served mirror and promotes it to "current" by retargeting a
//! symlink. It is used by the `caldb-mirror` CLI binary and can be driven
//! programmatically with injected collaborators for testing.
//!
//! # Modules
//!
//! - [`artefact`] - Release discovery, transfer, and archive expansion
//! - [`cli`] - Command-line argument definitions
//! - [`config`] - Layered TOML configuration
//! - [`dirs`] - Directory resolution abstraction for platform-specific paths
//! - [`error`] - Pipeline error taxonomy and exit codes
//! - [`lock`] - Per-family publish lock
//! - [`output`] - Operator-facing progress and summary text
//! - [`pipeline`] - Publish pipeline orchestration
//! - [`preflight`] - Operator identity check
//! - [`prompt`] - Operator confirmation policies
//! - [`publish`] - Staging-to-public move and pointer swap
//! - [`release`] - Release identity and path layout
//! - [`relocation`] - Manifest and readme relocation
//! - [`status`] - Current publication report

pub mod artefact;
pub mod cli;
pub mod config;
pub mod dirs;
pub mod error;
pub mod lock;
pub mod output;
pub mod pipeline;
pub mod preflight;
pub mod prompt;
pub mod publish;
pub mod release;
pub mod relocation;
pub mod status;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
