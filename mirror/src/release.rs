//! Release identity and filesystem layout.
//!
//! A [`Release`] ties a [`ReleaseVersion`] to an [`ArchiveFamily`] and derives
//! every path the pipeline touches: the staging tree, the public tree, the
//! publication pointer, and the names of the two metadata files shipped with
//! each release.

use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;
use thiserror::Error;

/// Errors raised when a version or family token cannot be used in a path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReleaseError {
    /// The version token is empty or would escape its parent directory.
    #[error("invalid release version \"{value}\": {reason}")]
    InvalidVersion {
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The family name is empty or would escape its parent directory.
    #[error("invalid archive family \"{value}\": {reason}")]
    InvalidFamily {
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: &'static str,
    },
}

/// Check that `value` can be used as a single path component.
fn path_token_problem(value: &str) -> Option<&'static str> {
    if value.is_empty() {
        return Some("must not be empty");
    }
    if value == "." || value == ".." {
        return Some("must not be a relative directory reference");
    }
    if value.contains(['/', '\\']) {
        return Some("must not contain path separators");
    }
    if value.chars().any(char::is_whitespace) {
        return Some("must not contain whitespace");
    }
    None
}

/// An opaque release version token such as `4.7.8`.
///
/// Surrounding whitespace is trimmed; the remaining token must be usable as a
/// single path component.
///
/// # Examples
///
/// ```
/// use caldb_mirror::release::ReleaseVersion;
///
/// let version: ReleaseVersion = " 4.7.8 ".try_into().expect("valid version");
/// assert_eq!(version.as_str(), "4.7.8");
/// assert!(ReleaseVersion::try_from("../etc").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReleaseVersion(String);

impl ReleaseVersion {
    /// Return the version as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for ReleaseVersion {
    type Error = ReleaseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let trimmed = value.trim();
        match path_token_problem(trimmed) {
            Some(reason) => Err(ReleaseError::InvalidVersion {
                value: value.to_owned(),
                reason,
            }),
            None => Ok(Self(trimmed.to_owned())),
        }
    }
}

impl TryFrom<String> for ReleaseVersion {
    type Error = ReleaseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The name of an archive family (for example `chandra`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchiveFamily(String);

impl ArchiveFamily {
    /// Return the family name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Directory name of a release tree: `<family>-<version>`.
    #[must_use]
    pub fn tree_name(&self, version: &ReleaseVersion) -> String {
        format!("{}-{}", self.0, version)
    }

    /// Recover the version from a `<family>-<version>` directory name.
    ///
    /// ```
    /// use caldb_mirror::release::ArchiveFamily;
    ///
    /// let family: ArchiveFamily = "chandra".try_into().expect("valid family");
    /// let version = family.version_from_tree_name("chandra-4.7.8");
    /// assert_eq!(version.map(|v| v.to_string()), Some("4.7.8".to_owned()));
    /// ```
    #[must_use]
    pub fn version_from_tree_name(&self, name: &str) -> Option<ReleaseVersion> {
        name.strip_prefix(self.0.as_str())
            .and_then(|rest| rest.strip_prefix('-'))
            .and_then(|version| ReleaseVersion::try_from(version).ok())
    }
}

impl TryFrom<&str> for ArchiveFamily {
    type Error = ReleaseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match path_token_problem(value) {
            Some(reason) => Err(ReleaseError::InvalidFamily {
                value: value.to_owned(),
                reason,
            }),
            None => Ok(Self(value.to_owned())),
        }
    }
}

impl fmt::Display for ArchiveFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Directory roots and naming knobs shared by every release of a family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseLayout {
    /// Archive family name.
    pub family: ArchiveFamily,
    /// Root under which staging trees are assembled.
    pub staging_root: Utf8PathBuf,
    /// Root under which release trees and the pointer are published.
    pub public_root: Utf8PathBuf,
    /// Subdirectory of a release tree that holds the family's data.
    pub data_subdir: String,
    /// Prefix between `README_` and the version in the readme filename.
    pub readme_prefix: String,
}

impl ReleaseLayout {
    /// Bind the layout to a concrete version.
    #[must_use]
    pub fn release(&self, version: ReleaseVersion) -> Release {
        Release {
            version,
            layout: self.clone(),
        }
    }

    /// Location of the publication pointer: `<public_root>/<family>`.
    #[must_use]
    pub fn pointer_path(&self) -> Utf8PathBuf {
        self.public_root.join(self.family.as_str())
    }
}

/// One versioned snapshot of the archive and the paths derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    version: ReleaseVersion,
    layout: ReleaseLayout,
}

impl Release {
    /// The release version.
    #[must_use]
    pub fn version(&self) -> &ReleaseVersion {
        &self.version
    }

    /// The archive family.
    #[must_use]
    pub fn family(&self) -> &ArchiveFamily {
        &self.layout.family
    }

    /// The layout this release was derived from.
    #[must_use]
    pub fn layout(&self) -> &ReleaseLayout {
        &self.layout
    }

    /// `<staging_root>/<family>-<version>`
    #[must_use]
    pub fn staging_path(&self) -> Utf8PathBuf {
        self.layout
            .staging_root
            .join(self.layout.family.tree_name(&self.version))
    }

    /// `<public_root>/<family>-<version>`
    #[must_use]
    pub fn public_path(&self) -> Utf8PathBuf {
        self.layout
            .public_root
            .join(self.layout.family.tree_name(&self.version))
    }

    /// `<public_root>/<family>`
    #[must_use]
    pub fn pointer_path(&self) -> Utf8PathBuf {
        self.layout.pointer_path()
    }

    /// Where the pointer must aim once this release is published:
    /// `<public_path>/<data_subdir>/<family>`.
    #[must_use]
    pub fn link_target(&self) -> Utf8PathBuf {
        self.public_path()
            .join(&self.layout.data_subdir)
            .join(self.layout.family.as_str())
    }

    /// `MANIFEST_<version>_main.txt`
    #[must_use]
    pub fn manifest_filename(&self) -> String {
        format!("MANIFEST_{}_main.txt", self.version)
    }

    /// `README_<readme_prefix><version>.txt`
    #[must_use]
    pub fn readme_filename(&self) -> String {
        format!("README_{}{}.txt", self.layout.readme_prefix, self.version)
    }

    /// `docs/<family>` relative to a release tree.
    #[must_use]
    pub fn docs_dir(&self) -> Utf8PathBuf {
        Utf8Path::new("docs").join(self.layout.family.as_str())
    }

    /// `docs/<family>/manifests` relative to a release tree.
    #[must_use]
    pub fn manifests_dir(&self) -> Utf8PathBuf {
        self.docs_dir().join("manifests")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn layout() -> ReleaseLayout {
        ReleaseLayout {
            family: ArchiveFamily::try_from("chandra").expect("family"),
            staging_root: Utf8PathBuf::from("/FTP/caldb/staging/cxc"),
            public_root: Utf8PathBuf::from("/FTP/caldb/data"),
            data_subdir: "data".to_owned(),
            readme_prefix: "caldb".to_owned(),
        }
    }

    #[fixture]
    fn release(layout: ReleaseLayout) -> Release {
        layout.release(ReleaseVersion::try_from("4.7.8").expect("version"))
    }

    #[rstest]
    fn derives_staging_and_public_paths(release: Release) {
        assert_eq!(
            release.staging_path(),
            Utf8PathBuf::from("/FTP/caldb/staging/cxc/chandra-4.7.8")
        );
        assert_eq!(
            release.public_path(),
            Utf8PathBuf::from("/FTP/caldb/data/chandra-4.7.8")
        );
    }

    #[rstest]
    fn pointer_targets_family_data_subpath(release: Release) {
        assert_eq!(release.pointer_path(), Utf8PathBuf::from("/FTP/caldb/data/chandra"));
        assert_eq!(
            release.link_target(),
            Utf8PathBuf::from("/FTP/caldb/data/chandra-4.7.8/data/chandra")
        );
    }

    #[rstest]
    fn metadata_filenames_embed_version(release: Release) {
        assert_eq!(release.manifest_filename(), "MANIFEST_4.7.8_main.txt");
        assert_eq!(release.readme_filename(), "README_caldb4.7.8.txt");
        assert_eq!(release.manifests_dir(), Utf8PathBuf::from("docs/chandra/manifests"));
    }

    #[rstest]
    #[case::empty("")]
    #[case::blank("   ")]
    #[case::parent("..")]
    #[case::separator("4.7/8")]
    #[case::backslash("4.7\\8")]
    #[case::inner_space("4.7 8")]
    fn rejects_unusable_versions(#[case] raw: &str) {
        assert!(matches!(
            ReleaseVersion::try_from(raw),
            Err(ReleaseError::InvalidVersion { .. })
        ));
    }

    #[rstest]
    fn version_round_trips_through_tree_name(layout: ReleaseLayout) {
        let version = ReleaseVersion::try_from("4.11.0").expect("version");
        let name = layout.family.tree_name(&version);
        assert_eq!(name, "chandra-4.11.0");
        assert_eq!(layout.family.version_from_tree_name(&name), Some(version));
        assert_eq!(layout.family.version_from_tree_name("xmm-1.0"), None);
    }
}
