//! Status command implementation.
//!
//! Reports which release the publication pointer currently references,
//! either as text or as JSON for scripting.

use camino::Utf8PathBuf;
use serde::Serialize;
use std::io::Write;

use crate::error::Result;
use crate::publish::{CurrentPublication, PublishSwitch};
use crate::release::ReleaseLayout;

/// Serialisable view of the pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    /// Archive family.
    pub family: String,
    /// Pointer location.
    pub pointer: Utf8PathBuf,
    /// Whether a pointer exists.
    pub published: bool,
    /// Raw pointer target.
    pub target: Option<Utf8PathBuf>,
    /// Version parsed from the target.
    pub version: Option<String>,
    /// Whether the target resolves to a directory.
    pub target_exists: bool,
}

impl StatusReport {
    /// Build a report from what [`PublishSwitch::current`] returned.
    #[must_use]
    pub fn new(layout: &ReleaseLayout, current: Option<CurrentPublication>) -> Self {
        let pointer = layout.pointer_path();
        let family = layout.family.to_string();
        match current {
            None => Self {
                family,
                pointer,
                published: false,
                target: None,
                version: None,
                target_exists: false,
            },
            Some(current) => Self {
                family,
                pointer: current.pointer,
                published: true,
                target: Some(current.target),
                version: current.version.map(|v| v.to_string()),
                target_exists: current.target_exists,
            },
        }
    }

    /// Human-readable rendering.
    #[must_use]
    pub fn display_text(&self) -> String {
        let Some(target) = &self.target else {
            return format!("{}: nothing published ({} does not exist)", self.family, self.pointer);
        };
        let version = self.version.as_deref().unwrap_or("unknown version");
        let mut text = format!("{}: {version}\n  {} -> {target}", self.family, self.pointer);
        if !self.target_exists {
            text.push_str("\n  warning: target does not exist");
        }
        text
    }
}

/// Print the current publication for `layout`'s family to `stdout`.
///
/// # Errors
///
/// Returns an error when the pointer cannot be read, the report cannot be
/// serialised, or `stdout` cannot be written.
pub fn run_status(layout: &ReleaseLayout, json: bool, stdout: &mut dyn Write) -> Result<()> {
    let current = PublishSwitch::new(layout.clone()).current()?;
    let report = StatusReport::new(layout, current);
    let output = if json {
        serde_json::to_string_pretty(&report)?
    } else {
        report.display_text()
    };
    writeln!(stdout, "{output}")?;
    Ok(())
}
