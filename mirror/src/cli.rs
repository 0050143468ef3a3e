//! CLI argument definitions for the mirror.
//!
//! Kept apart from the entrypoint so argument parsing can be unit tested.

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

use crate::config::{ConfigOverrides, TransferMethod};
use crate::prompt::FixedPolicy;

/// Mirror a versioned CALDB release and publish it behind the family pointer.
#[derive(Parser, Debug)]
#[command(name = "caldb-mirror")]
#[command(version, about)]
#[command(long_about = concat!(
    "Mirror a versioned CALDB release and publish it behind the family pointer.\n\n",
    "The publish command reads the remote index, downloads every listed file into a ",
    "staging tree, expands archives, moves the manifest and readme into docs/<family>/, ",
    "then moves the tree into the public root and repoints <public_root>/<family> at ",
    "its data directory. The previous release stays served until the new one is in place.",
))]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Publish a release, answering prompts interactively:\n",
    "    $ caldb-mirror publish 4.7.8\n\n",
    "  Preview the files and paths without touching disk:\n",
    "    $ caldb-mirror publish 4.7.8 --dry-run\n\n",
    "  Publish unattended with an external downloader:\n",
    "    $ caldb-mirror publish 4.7.8 --yes --transfer command\n\n",
    "  Show the currently published release:\n",
    "    $ caldb-mirror status --json\n\n",
    "EXIT STATUS:\n",
    "  0 success, 1 configuration or I/O error, 2 pre-flight check failed,\n",
    "  3 cancelled, 4 index error, 5 transfer error, 6 archive expansion error,\n",
    "  7 metadata relocation error, 8 overwrite declined, 9 publish error,\n",
    "  10 another publish is running",
))]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file [default: <config_dir>/caldb-mirror/config.toml].
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<Utf8PathBuf>,

    /// Increase log verbosity (repeatable: -v, -vv).
    #[arg(
        short,
        long = "verbose",
        global = true,
        action = clap::ArgAction::Count,
        conflicts_with = "quiet"
    )]
    pub verbosity: u8,

    /// Suppress progress output (errors still shown).
    #[arg(short, long, global = true, conflicts_with = "verbosity")]
    pub quiet: bool,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Download, assemble, and publish a release.
    Publish(PublishArgs),

    /// Show the currently published release.
    Status(StatusArgs),
}

/// Path and family overrides shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct LayoutArgs {
    /// Archive family name.
    #[arg(long, value_name = "NAME")]
    pub family: Option<String>,

    /// Root under which staging trees are assembled.
    #[arg(long, value_name = "DIR")]
    pub staging_root: Option<Utf8PathBuf>,

    /// Root under which releases and the pointer are published.
    #[arg(long, value_name = "DIR")]
    pub public_root: Option<Utf8PathBuf>,
}

/// Arguments for the publish command.
#[derive(Args, Debug, Clone, Default)]
pub struct PublishArgs {
    /// Release version, for example 4.7.8.
    #[arg(value_name = "VERSION")]
    pub version: String,

    /// Resolve the release and show the plan without touching disk.
    #[arg(long)]
    pub dry_run: bool,

    /// Answer yes at every prompt.
    #[arg(short = 'y', long, conflicts_with = "no")]
    pub yes: bool,

    /// Answer no at every prompt.
    #[arg(long, conflicts_with = "yes")]
    pub no: bool,

    /// URL of the release index page.
    #[arg(long, value_name = "URL")]
    pub index_url: Option<String>,

    /// Transfer backend.
    #[arg(long, value_enum, value_name = "METHOD")]
    pub transfer: Option<TransferMethod>,

    /// Path and family overrides.
    #[command(flatten)]
    pub layout: LayoutArgs,
}

/// Arguments for the status command.
#[derive(Args, Debug, Clone, Default)]
pub struct StatusArgs {
    /// Output in JSON format for scripting.
    #[arg(long)]
    pub json: bool,

    /// Path and family overrides.
    #[command(flatten)]
    pub layout: LayoutArgs,
}

impl LayoutArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            family: self.family.clone(),
            staging_root: self.staging_root.clone(),
            public_root: self.public_root.clone(),
            ..ConfigOverrides::default()
        }
    }
}

impl PublishArgs {
    /// The non-interactive policy selected by `--yes` or `--no`, if any.
    ///
    /// ```
    /// use caldb_mirror::cli::PublishArgs;
    /// use caldb_mirror::prompt::FixedPolicy;
    ///
    /// let args = PublishArgs { yes: true, ..PublishArgs::default() };
    /// assert_eq!(args.fixed_policy(), Some(FixedPolicy::AutoApprove));
    /// assert_eq!(PublishArgs::default().fixed_policy(), None);
    /// ```
    #[must_use]
    pub fn fixed_policy(&self) -> Option<FixedPolicy> {
        if self.yes {
            Some(FixedPolicy::AutoApprove)
        } else if self.no {
            Some(FixedPolicy::AutoDeny)
        } else {
            None
        }
    }

    /// Configuration overrides supplied on the command line.
    #[must_use]
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            index_url: self.index_url.clone(),
            transfer: self.transfer,
            ..self.layout.overrides()
        }
    }
}

impl StatusArgs {
    /// Configuration overrides supplied on the command line.
    #[must_use]
    pub fn overrides(&self) -> ConfigOverrides {
        self.layout.overrides()
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
