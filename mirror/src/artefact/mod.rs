//! Remote artifact discovery, transfer, and expansion.
//!
//! # Sub-modules
//!
//! - [`index`] - Remote index parsing (`RemoteArtifact`, `IndexSource`).
//! - [`download`] - Transfer trait with HTTP and external-command backends.
//! - [`fetcher`] - Staging directory population with operator-mediated retry.
//! - [`extraction`] - Archive expansion with path traversal protection.

pub mod download;
pub mod extraction;
pub mod fetcher;
pub mod index;
