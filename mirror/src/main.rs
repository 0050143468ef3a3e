//! CALDB mirror CLI entrypoint.
//!
//! This binary publishes a versioned CALDB release into a locally served
//! mirror and reports which release is currently live.

use caldb_mirror::artefact::download::{ArtifactTransfer, CommandTransfer, HttpTransfer};
use caldb_mirror::artefact::extraction::StandardExtractor;
use caldb_mirror::artefact::index::HttpIndexSource;
use caldb_mirror::cli::{Cli, Command, PublishArgs, StatusArgs};
use caldb_mirror::config::{ConfigError, ConfigOverrides, MirrorConfig, TransferMethod};
use caldb_mirror::dirs::{BaseDirs, SystemBaseDirs};
use caldb_mirror::error::{MirrorError, Result};
use caldb_mirror::lock::FamilyLock;
use caldb_mirror::output::write_stderr_line;
use caldb_mirror::pipeline::{Collaborators, PipelineContext, dry_run, run_pipeline};
use caldb_mirror::preflight::check_operator;
use caldb_mirror::prompt::{Confirmer, InteractivePrompt};
use caldb_mirror::release::ReleaseVersion;
use caldb_mirror::status::run_status;
use clap::Parser;
use std::io::Write;

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbosity, cli.quiet);

    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    let run_result = run(&cli, &SystemBaseDirs, &mut stdout, &mut stderr);
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

/// Route `log` output to stderr; `RUST_LOG` overrides the flag-derived level.
fn init_logging(verbosity: u8, quiet: bool) {
    let level = match (quiet, verbosity) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn run(
    cli: &Cli,
    dirs: &dyn BaseDirs,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> Result<()> {
    match &cli.command {
        Command::Publish(args) => run_publish(cli, args, dirs, stderr),
        Command::Status(args) => run_status_command(cli, args, dirs, stdout),
    }
}

/// Loads the configuration file and applies command line overrides.
fn load_config(
    cli: &Cli,
    overrides: ConfigOverrides,
    dirs: &dyn BaseDirs,
) -> Result<MirrorConfig> {
    Ok(MirrorConfig::load(cli.config.as_deref(), dirs)?.with_overrides(overrides))
}

fn run_publish(
    cli: &Cli,
    args: &PublishArgs,
    dirs: &dyn BaseDirs,
    stderr: &mut dyn Write,
) -> Result<()> {
    let config = load_config(cli, args.overrides(), dirs)?;
    let layout = config.layout()?;
    let release = layout.release(ReleaseVersion::try_from(args.version.as_str())?);
    let context = PipelineContext {
        release: &release,
        index_url: &config.index_url,
        max_attempts: config.max_attempts()?,
        quiet: cli.quiet,
    };
    let index = HttpIndexSource::new(config.index_timeout());

    // Dry-run mode: show what would be done without side effects
    if args.dry_run {
        dry_run(&context, &index, stderr)?;
        return Ok(());
    }

    let errors = check_operator(&config.operator);
    if !errors.is_empty() {
        return Err(MirrorError::Preflight { errors });
    }

    let _lock = FamilyLock::acquire(&layout)?;
    let transfer = build_transfer(&config)?;
    let policy = args.fixed_policy();
    let interactive = InteractivePrompt::new(std::io::stdin().lock(), std::io::stderr());
    let confirmer: &dyn Confirmer = match &policy {
        Some(policy) => policy,
        None => &interactive,
    };

    let collaborators = Collaborators {
        index: &index,
        transfer: transfer.as_ref(),
        extractor: &StandardExtractor,
        confirmer,
    };
    run_pipeline(&context, &collaborators, stderr)?;
    Ok(())
}

fn run_status_command(
    cli: &Cli,
    args: &StatusArgs,
    dirs: &dyn BaseDirs,
    stdout: &mut dyn Write,
) -> Result<()> {
    let config = load_config(cli, args.overrides(), dirs)?;
    run_status(&config.layout()?, args.json, stdout)
}

/// Builds the configured transfer backend.
fn build_transfer(config: &MirrorConfig) -> Result<Box<dyn ArtifactTransfer>> {
    let timeout = config.transfer_timeout();
    match config.transfer.method {
        TransferMethod::Http => Ok(Box::new(HttpTransfer::new(timeout))),
        TransferMethod::Command => {
            let transfer = CommandTransfer::from_command_line(&config.transfer.command, timeout)
                .ok_or_else(|| ConfigError::Invalid {
                    key: "transfer.command",
                    reason: "must name a downloader program".to_owned(),
                })?;
            Ok(Box::new(transfer))
        }
    }
}

fn exit_code_for_run_result(result: Result<()>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            write_stderr_line(stderr, format!("error: {err}"));
            err.exit_code()
        }
    }
}
