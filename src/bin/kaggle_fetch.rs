use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use kaggle_fetch::config::ConfigLoader;
use kaggle_fetch::credentials::EnvSecretStore;
use kaggle_fetch::domain::{DatasetRef, FetchRequest, RuntimeMode};
use kaggle_fetch::error::FetchError;
use kaggle_fetch::fetcher::{DatasetFetcher, FetchAction, FetchOptions, FetchOutcome};
use kaggle_fetch::manifest::Manifest;
use kaggle_fetch::output::{ConsoleOutput, JsonOutput, OutputMode};
use kaggle_fetch::runner::SystemCommandRunner;

#[derive(Parser)]
#[command(name = "kaggle-fetch")]
#[command(about = "Download a Kaggle dataset or competition and unpack it into data/")]
#[command(version, author)]
struct Cli {
    /// Print JSON results instead of progress and a summary.
    #[arg(long, global = true)]
    non_interactive: bool,

    /// Tool settings file (defaults to ./kaggle-fetch.json when present).
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download and extract a dataset")]
    Fetch(FetchArgs),
    #[command(about = "Show what a data directory holds")]
    Info(TargetArgs),
}

#[derive(Args, Clone)]
struct TargetArgs {
    #[arg(long, value_enum, default_value_t = RuntimeMode::Local)]
    mode: RuntimeMode,

    /// Repository root (local mode).
    #[arg(long)]
    repo: Option<Utf8PathBuf>,

    /// Namespace under <repo>/data (local mode).
    #[arg(long)]
    session: Option<String>,
}

#[derive(Args, Clone)]
struct FetchArgs {
    /// <owner>/<dataset>, or the competition slug with --competition.
    identifier: String,

    #[command(flatten)]
    target: TargetArgs,

    #[arg(long)]
    competition: bool,

    #[arg(long)]
    force: bool,

    #[arg(long)]
    dry_run: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<FetchError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &FetchError) -> u8 {
    match error {
        FetchError::InvalidIdentifier(_)
        | FetchError::RepoRootRequired
        | FetchError::CredentialsMissing(_)
        | FetchError::SessionLabelRequired
        | FetchError::InvalidSessionLabel(_)
        | FetchError::MissingSecret(_) => 2,
        FetchError::ExternalToolInstallFailed(_)
        | FetchError::DownloadInvocationFailed { .. }
        | FetchError::NoArchiveFound(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let fetcher = DatasetFetcher::new(config, EnvSecretStore, SystemCommandRunner::new());

    match cli.command {
        Commands::Fetch(args) => run_fetch(args, &fetcher, output_mode),
        Commands::Info(args) => run_info(args, &fetcher, output_mode),
    }
}

fn run_fetch(
    args: FetchArgs,
    fetcher: &DatasetFetcher<EnvSecretStore, SystemCommandRunner>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let FetchArgs {
        identifier,
        target,
        competition,
        force,
        dry_run,
    } = args;

    let request = FetchRequest {
        dataset: identifier.parse::<DatasetRef>()?,
        runtime_mode: target.mode,
        is_competition: competition,
        local_repo_root: target.repo,
        session_label: target.session,
    };
    let options = FetchOptions { force, dry_run };

    match output_mode {
        OutputMode::NonInteractive => {
            let outcome = fetcher.fetch(&request, options, &JsonOutput)?;
            JsonOutput::print_fetch(&outcome).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            let outcome = fetcher.fetch(&request, options, &ConsoleOutput)?;
            print_fetch_summary(&outcome);
        }
    }
    Ok(())
}

fn run_info(
    args: TargetArgs,
    fetcher: &DatasetFetcher<EnvSecretStore, SystemCommandRunner>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let target = fetcher.resolve_target(args.mode, args.repo.as_deref(), args.session.as_deref())?;
    let manifest = Manifest::read(&target.directory_path)?;

    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_info(manifest.as_ref()).into_diagnostic()?,
        OutputMode::Interactive => match manifest {
            Some(manifest) => {
                println!("{}", target.directory_path);
                println!("  {} {}", manifest.kind, manifest.dataset);
                println!("  archive: {}", manifest.archive);
                for file in &manifest.files {
                    println!("    {file}");
                }
                println!("  fetched: {} via {}", manifest.fetched_at, manifest.tool);
            }
            None => println!("{}: no kaggle-fetch manifest", target.directory_path),
        },
    }
    Ok(())
}

fn print_fetch_summary(outcome: &FetchOutcome) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";

    let color = match outcome.action {
        FetchAction::Downloaded => green,
        FetchAction::AlreadyPresent => yellow,
        FetchAction::Planned => cyan,
    };
    println!(
        "{color}{} {} ({}){reset}",
        outcome.kind,
        outcome.dataset,
        outcome.action.as_str()
    );
    println!("{color}   data: {}{reset}", outcome.target.directory_path);
    if let Some(archive) = &outcome.archive {
        println!("{color}   archive: {archive}{reset}");
    }
    if !outcome.files.is_empty() {
        println!("{color}   files: {}{reset}", outcome.files.len());
    }
    if outcome.action == FetchAction::Planned {
        for command in &outcome.commands {
            println!("{cyan}   $ {command}{reset}");
        }
    }
}
