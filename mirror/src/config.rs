//! Mirror configuration.
//!
//! Settings are layered: built-in defaults, then a TOML file, then command
//! line overrides. The file is either named explicitly or discovered at
//! `<config_dir>/caldb-mirror/config.toml`; a missing default file is not an
//! error.

use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::time::Duration;

use crate::dirs::BaseDirs;
use crate::release::{ArchiveFamily, ReleaseError, ReleaseLayout};

/// Directory under the platform config directory holding `config.toml`.
pub const CONFIG_DIR_NAME: &str = "caldb-mirror";

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("could not read {path}: {source}")]
    Read {
        /// The file that was read.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML or has unknown keys.
    #[error("invalid configuration in {path}: {source}")]
    Parse {
        /// The file that was parsed.
        path: Utf8PathBuf,
        /// Underlying parse error.
        #[source]
        source: Box<toml::de::Error>,
    },

    /// A setting holds a value the mirror cannot use.
    #[error("invalid setting {key}: {reason}")]
    Invalid {
        /// The offending key.
        key: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// The family name cannot be used as a path component.
    #[error(transparent)]
    Family(#[from] ReleaseError),
}

/// How artifacts are transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransferMethod {
    /// Built-in HTTP client.
    #[default]
    Http,
    /// External downloader from `transfer.command`.
    Command,
}

/// The `[transfer]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransferConfig {
    /// Transfer backend.
    pub method: TransferMethod,
    /// Per-artifact time budget in seconds.
    pub timeout_secs: u64,
    /// Attempts per artifact, including the first.
    pub max_attempts: u32,
    /// Downloader program and arguments for [`TransferMethod::Command`].
    pub command: Vec<String>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            method: TransferMethod::Http,
            timeout_secs: 3600,
            max_attempts: 3,
            command: ["wget", "-q", "-N"].map(String::from).to_vec(),
        }
    }
}

/// The `[operator]` table: who may publish, and from where.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OperatorConfig {
    /// Required login name.
    pub user: Option<String>,
    /// Substring the host name must contain.
    pub host: Option<String>,
}

/// Complete mirror configuration.
///
/// ```
/// use caldb_mirror::config::{MirrorConfig, TransferMethod};
///
/// let config = MirrorConfig::from_toml_str("family = \"fam\"\n[transfer]\nmethod = \"command\"\n")
///     .expect("valid configuration");
/// assert_eq!(config.family, "fam");
/// assert_eq!(config.transfer.method, TransferMethod::Command);
/// assert_eq!(config.data_subdir, "data");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MirrorConfig {
    /// Archive family name.
    pub family: String,
    /// URL of the HTML page whose first table lists the release files.
    pub index_url: String,
    /// Time budget for fetching the index, in seconds.
    pub index_timeout_secs: u64,
    /// Where staging trees are assembled.
    pub staging_root: Utf8PathBuf,
    /// Where release trees and the pointer are published.
    pub public_root: Utf8PathBuf,
    /// Data subdirectory inside a release tree.
    pub data_subdir: String,
    /// Readme name prefix (`README_<prefix><version>.txt`).
    pub readme_prefix: String,
    /// Transfer settings.
    pub transfer: TransferConfig,
    /// Operator identity requirements.
    pub operator: OperatorConfig,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            family: "chandra".to_owned(),
            index_url: "https://cxc.harvard.edu/ciao/download/caldb.html".to_owned(),
            index_timeout_secs: 30,
            staging_root: Utf8PathBuf::from("/FTP/caldb/staging/cxc"),
            public_root: Utf8PathBuf::from("/FTP/caldb/data"),
            data_subdir: "data".to_owned(),
            readme_prefix: "caldb".to_owned(),
            transfer: TransferConfig::default(),
            operator: OperatorConfig::default(),
        }
    }
}

/// Values supplied on the command line, applied over the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    /// Replaces `family`.
    pub family: Option<String>,
    /// Replaces `index_url`.
    pub index_url: Option<String>,
    /// Replaces `staging_root`.
    pub staging_root: Option<Utf8PathBuf>,
    /// Replaces `public_root`.
    pub public_root: Option<Utf8PathBuf>,
    /// Replaces `transfer.method`.
    pub transfer: Option<TransferMethod>,
}

impl MirrorConfig {
    /// Parse configuration from TOML text. Absent keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns the `toml` error for malformed input or unknown keys.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Resolve the configuration file and parse it.
    ///
    /// `explicit` must exist. Without it the default location is used when a
    /// file is present there; otherwise the built-in defaults apply.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn load(explicit: Option<&Utf8Path>, dirs: &dyn BaseDirs) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => path.to_owned(),
            None => match default_config_path(dirs) {
                Some(path) if path.is_file() => path,
                _ => {
                    debug!("no configuration file found; using defaults");
                    return Ok(Self::default());
                }
            },
        };

        debug!("loading configuration from {path}");
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Self::from_toml_str(&text).map_err(|source| ConfigError::Parse {
            path,
            source: Box::new(source),
        })
    }

    /// Apply command line overrides.
    #[must_use]
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(family) = overrides.family {
            self.family = family;
        }
        if let Some(index_url) = overrides.index_url {
            self.index_url = index_url;
        }
        if let Some(staging_root) = overrides.staging_root {
            self.staging_root = staging_root;
        }
        if let Some(public_root) = overrides.public_root {
            self.public_root = public_root;
        }
        if let Some(method) = overrides.transfer {
            self.transfer.method = method;
        }
        self
    }

    /// Build the release layout, validating the naming settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Family`] for an unusable family name and
    /// [`ConfigError::Invalid`] for an unusable data subdirectory or readme
    /// prefix.
    pub fn layout(&self) -> Result<ReleaseLayout, ConfigError> {
        let family = ArchiveFamily::try_from(self.family.as_str())?;
        if self.data_subdir.is_empty() || self.data_subdir.contains(['/', '\\']) {
            return Err(ConfigError::Invalid {
                key: "data_subdir",
                reason: format!("\"{}\" must be a single path component", self.data_subdir),
            });
        }
        if self.readme_prefix.contains(['/', '\\']) {
            return Err(ConfigError::Invalid {
                key: "readme_prefix",
                reason: "must not contain path separators".to_owned(),
            });
        }
        Ok(ReleaseLayout {
            family,
            staging_root: self.staging_root.clone(),
            public_root: self.public_root.clone(),
            data_subdir: self.data_subdir.clone(),
            readme_prefix: self.readme_prefix.clone(),
        })
    }

    /// Attempts per artifact.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when `transfer.max_attempts` is zero.
    pub fn max_attempts(&self) -> Result<NonZeroU32, ConfigError> {
        NonZeroU32::new(self.transfer.max_attempts).ok_or_else(|| ConfigError::Invalid {
            key: "transfer.max_attempts",
            reason: "must be at least 1".to_owned(),
        })
    }

    /// Time budget for each artifact transfer.
    #[must_use]
    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer.timeout_secs)
    }

    /// Time budget for fetching the index.
    #[must_use]
    pub fn index_timeout(&self) -> Duration {
        Duration::from_secs(self.index_timeout_secs)
    }
}

/// `<config_dir>/caldb-mirror/config.toml`, when a config directory exists
/// and is valid UTF-8.
#[must_use]
pub fn default_config_path(dirs: &dyn BaseDirs) -> Option<Utf8PathBuf> {
    let dir = Utf8PathBuf::try_from(dirs.config_dir()?).ok()?;
    Some(dir.join(CONFIG_DIR_NAME).join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dirs::MockBaseDirs;
    use rstest::rstest;

    fn dirs_at(path: Option<&Utf8Path>) -> MockBaseDirs {
        let path = path.map(|p| p.as_std_path().to_path_buf());
        let mut dirs = MockBaseDirs::new();
        dirs.expect_config_dir().returning(move || path.clone());
        dirs
    }

    #[test]
    fn empty_file_yields_defaults() {
        let config = MirrorConfig::from_toml_str("").expect("parse");
        assert_eq!(config, MirrorConfig::default());
        assert_eq!(config.transfer.command, vec!["wget", "-q", "-N"]);
    }

    #[test]
    fn nested_tables_parse() {
        let config = MirrorConfig::from_toml_str(concat!(
            "family = \"fam\"\n",
            "public_root = \"/srv/caldb\"\n",
            "[transfer]\n",
            "max_attempts = 5\n",
            "command = [\"curl\", \"-sSfO\"]\n",
            "[operator]\n",
            "user = \"caldbmgr\"\n",
        ))
        .expect("parse");

        assert_eq!(config.public_root, Utf8PathBuf::from("/srv/caldb"));
        assert_eq!(config.transfer.max_attempts, 5);
        assert_eq!(config.transfer.command, vec!["curl", "-sSfO"]);
        assert_eq!(config.operator.user.as_deref(), Some("caldbmgr"));
        assert_eq!(config.operator.host, None);
    }

    #[rstest]
    #[case::top_level("staging_dir = \"/tmp\"\n")]
    #[case::nested("[transfer]\nretries = 2\n")]
    fn unknown_keys_are_rejected(#[case] text: &str) {
        assert!(MirrorConfig::from_toml_str(text).is_err());
    }

    #[test]
    fn missing_default_file_yields_defaults() {
        let temp = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).expect("UTF-8 path");
        let config = MirrorConfig::load(None, &dirs_at(Some(&root))).expect("load");
        assert_eq!(config, MirrorConfig::default());
    }

    #[test]
    fn default_file_is_discovered() {
        let temp = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).expect("UTF-8 path");
        std::fs::create_dir_all(root.join(CONFIG_DIR_NAME)).expect("config dir");
        std::fs::write(root.join("caldb-mirror/config.toml"), "family = \"fam\"\n").expect("write");

        let config = MirrorConfig::load(None, &dirs_at(Some(&root))).expect("load");
        assert_eq!(config.family, "fam");
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let err = MirrorConfig::load(Some(Utf8Path::new("/nonexistent/mirror.toml")), &dirs_at(None))
            .expect_err("missing file");
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn malformed_file_names_its_path() {
        let temp = tempfile::NamedTempFile::new().expect("temp file");
        std::fs::write(temp.path(), "family = [").expect("write");
        let path = Utf8PathBuf::try_from(temp.path().to_path_buf()).expect("UTF-8 path");

        let err = MirrorConfig::load(Some(&path), &dirs_at(None)).expect_err("malformed");
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains(path.as_str()));
    }

    #[test]
    fn overrides_replace_only_supplied_values() {
        let config = MirrorConfig::default().with_overrides(ConfigOverrides {
            family: Some("fam".to_owned()),
            transfer: Some(TransferMethod::Command),
            ..ConfigOverrides::default()
        });
        assert_eq!(config.family, "fam");
        assert_eq!(config.transfer.method, TransferMethod::Command);
        assert_eq!(config.public_root, MirrorConfig::default().public_root);
    }

    #[rstest]
    #[case::empty_family("family = \"\"\n")]
    #[case::nested_data_subdir("data_subdir = \"a/b\"\n")]
    #[case::prefix_with_separator("readme_prefix = \"../x\"\n")]
    fn layout_rejects_unusable_names(#[case] text: &str) {
        let config = MirrorConfig::from_toml_str(text).expect("parse");
        assert!(config.layout().is_err());
    }

    #[test]
    fn zero_attempts_is_invalid() {
        let config = MirrorConfig::from_toml_str("[transfer]\nmax_attempts = 0\n").expect("parse");
        assert!(matches!(
            config.max_attempts(),
            Err(ConfigError::Invalid { key: "transfer.max_attempts", .. })
        ));
    }
}
