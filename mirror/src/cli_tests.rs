//! Tests for CLI parsing and the values derived from it.

use super::*;
use rstest::rstest;

fn publish_args(cli: Cli) -> PublishArgs {
    match cli.command {
        Command::Publish(args) => args,
        Command::Status(_) => panic!("expected Publish command"),
    }
}

#[test]
fn publish_parses_defaults() {
    let cli = Cli::parse_from(["caldb-mirror", "publish", "4.7.8"]);
    assert!(cli.config.is_none());
    assert_eq!(cli.verbosity, 0);
    assert!(!cli.quiet);

    let args = publish_args(cli);
    assert_eq!(args.version, "4.7.8");
    assert!(!args.dry_run);
    assert_eq!(args.fixed_policy(), None);
    assert_eq!(args.overrides(), ConfigOverrides::default());
}

#[test]
fn publish_requires_a_version() {
    assert!(Cli::try_parse_from(["caldb-mirror", "publish"]).is_err());
}

#[test]
fn subcommand_is_required() {
    assert!(Cli::try_parse_from(["caldb-mirror"]).is_err());
}

#[rstest]
#[case::yes(&["--yes"], Some(FixedPolicy::AutoApprove))]
#[case::short_yes(&["-y"], Some(FixedPolicy::AutoApprove))]
#[case::no(&["--no"], Some(FixedPolicy::AutoDeny))]
#[case::interactive(&[], None)]
fn decision_flags_select_policy(#[case] flags: &[&str], #[case] expected: Option<FixedPolicy>) {
    let mut argv = vec!["caldb-mirror", "publish", "1.0"];
    argv.extend_from_slice(flags);
    let args = publish_args(Cli::parse_from(argv));
    assert_eq!(args.fixed_policy(), expected);
}

#[test]
fn yes_and_no_conflict() {
    assert!(Cli::try_parse_from(["caldb-mirror", "publish", "1.0", "--yes", "--no"]).is_err());
}

#[test]
fn quiet_and_verbose_conflict() {
    assert!(Cli::try_parse_from(["caldb-mirror", "-q", "-v", "status"]).is_err());
}

#[test]
fn global_flags_follow_subcommand() {
    let cli = Cli::parse_from([
        "caldb-mirror",
        "status",
        "-vv",
        "--config",
        "/etc/caldb-mirror.toml",
    ]);
    assert_eq!(cli.verbosity, 2);
    assert_eq!(cli.config, Some(Utf8PathBuf::from("/etc/caldb-mirror.toml")));
}

#[test]
fn publish_overrides_collect_every_flag() {
    let args = publish_args(Cli::parse_from([
        "caldb-mirror",
        "publish",
        "1.0",
        "--family",
        "fam",
        "--staging-root",
        "/srv/staging",
        "--public-root",
        "/srv/public",
        "--index-url",
        "https://example.test/index.html",
        "--transfer",
        "command",
    ]));

    assert_eq!(
        args.overrides(),
        ConfigOverrides {
            family: Some("fam".to_owned()),
            index_url: Some("https://example.test/index.html".to_owned()),
            staging_root: Some(Utf8PathBuf::from("/srv/staging")),
            public_root: Some(Utf8PathBuf::from("/srv/public")),
            transfer: Some(TransferMethod::Command),
        }
    );
}

#[test]
fn status_parses_json_and_public_root() {
    let cli = Cli::parse_from(["caldb-mirror", "status", "--json", "--public-root", "/srv"]);
    match cli.command {
        Command::Status(args) => {
            assert!(args.json);
            assert_eq!(args.overrides().public_root, Some(Utf8PathBuf::from("/srv")));
        }
        Command::Publish(_) => panic!("expected Status command"),
    }
}

#[test]
fn unknown_transfer_method_is_rejected() {
    assert!(
        Cli::try_parse_from(["caldb-mirror", "publish", "1.0", "--transfer", "ftp"]).is_err()
    );
}
