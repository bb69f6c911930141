use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use synthetics_ci::{
    api::{ApiClient, SyntheticsApi},
    batch::{search_triggers, AbortSignal, BatchOrchestrator, TriggerConfig},
    clock::{Clock, TokioClock},
    config::{
        find_test_files, load_config, load_trigger_configs, resolve_api_settings,
        resolve_public_ids, resolve_run_config, resolve_search_query, resolve_upload_config,
        EnvironmentBuilder, EnvironmentContext, RunTestsArgs, SyntheticsConfig,
        UploadApplicationArgs,
    },
    metadata::Metadata,
    mobile::{upload_application_version, AppUploader},
    report::save_results_file,
    reporter::{print_outcome, ConsoleUploadReporter},
    retry::RetryPolicy,
};

#[derive(Parser, Debug)]
#[command(
    name = "synthetics-ci",
    version,
    about = "Trigger synthetic tests and upload mobile applications from CI",
    disable_help_subcommand = true
)]
struct Cli {
    /// Directory or file containing synthetics-ci.json
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Env file loaded over the process environment
    #[arg(short, long, global = true)]
    env_file: Option<PathBuf>,

    /// Override base directory used for resolving paths
    #[arg(long, global = true)]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Trigger tests, wait for their results and report a verdict
    RunTests(RunTestsCommand),
    /// Upload a new version of a mobile application
    UploadApplication(UploadApplicationCommand),
}

#[derive(Args, Debug)]
struct RunTestsCommand {
    /// Public id or URL of a test to run (repeatable)
    #[arg(short, long = "public-id", value_name = "ID")]
    public_ids: Vec<String>,

    /// Test file or directory of test files (repeatable)
    #[arg(short, long, value_name = "PATH")]
    files: Vec<String>,

    /// Run the tests matching this search query
    #[arg(short, long, value_name = "QUERY")]
    search: Option<String>,

    /// Variable passed to every test (repeatable)
    #[arg(short = 'v', long = "variable", value_name = "KEY=VALUE")]
    variables: Vec<String>,

    /// Location every test runs from (repeatable or comma separated)
    #[arg(long, value_name = "LOCATION", value_delimiter = ',')]
    locations: Vec<String>,

    /// Fail the run when results time out
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    fail_on_timeout: Option<bool>,

    /// Fail the run when results hit a critical error
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    fail_on_critical_errors: Option<bool>,

    /// Fail the run when requested tests do not exist
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    fail_on_missing_tests: Option<bool>,

    /// Give up waiting for results after this many milliseconds
    #[arg(long, value_name = "MS")]
    polling_timeout: Option<u64>,

    /// Write results as CSV to this file
    #[arg(long, value_name = "PATH")]
    csv_output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct UploadApplicationCommand {
    #[arg(long, value_name = "ID")]
    mobile_application_id: Option<String>,

    #[arg(long, value_name = "PATH")]
    mobile_application_version_file_path: Option<String>,

    #[arg(long, value_name = "NAME")]
    version_name: Option<String>,

    /// Mark the new version as the latest one
    #[arg(long)]
    latest: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {err:#}", "Error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("synthetics_ci=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let base_dir = match cli.cwd.as_deref() {
        Some(cwd) => resolve_path(cwd)?,
        None => std::env::current_dir()?,
    };

    let config_target = cli
        .config
        .as_ref()
        .map(|p| resolve_relative(&base_dir, p))
        .unwrap_or_else(|| base_dir.clone());

    let loaded = load_config(&config_target).context("loading configuration")?;
    let config_dir = loaded.as_ref().map(|c| c.dir.clone()).unwrap_or_else(|| {
        if config_target.is_dir() {
            config_target.clone()
        } else {
            config_target
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| config_target.clone())
        }
    });
    if let Some(loaded) = &loaded {
        debug!(path = %loaded.path.display(), "loaded configuration");
    }
    let config = loaded
        .as_ref()
        .map(|c| c.config.clone())
        .unwrap_or_default();

    let environment = EnvironmentBuilder::new(
        base_dir.clone(),
        config_dir,
        loaded,
        cli.env_file.as_ref().map(|p| resolve_relative(&base_dir, p)),
    )
    .build()?;

    let settings = resolve_api_settings(&config, &environment.env)?;
    let client = ApiClient::new(&settings.base_url, settings.credentials)?;
    debug!(base_url = %client.base_url(), "using API");

    match cli.command {
        Commands::RunTests(command) => run_tests(&client, &config, &environment, command).await,
        Commands::UploadApplication(command) => {
            upload_application(&client, &config, &environment, command).await
        }
    }
}

async fn run_tests(
    client: &ApiClient,
    config: &SyntheticsConfig,
    environment: &EnvironmentContext,
    command: RunTestsCommand,
) -> Result<ExitCode> {
    let base_dir = &environment.base_dir;
    let args = RunTestsArgs {
        public_ids: command.public_ids,
        files: command.files,
        fail_on_timeout: command.fail_on_timeout,
        fail_on_critical_errors: command.fail_on_critical_errors,
        fail_on_missing_tests: command.fail_on_missing_tests,
        polling_timeout_ms: command.polling_timeout,
        variables: command.variables,
        locations: command.locations,
        search: command.search,
    };
    let run_config = resolve_run_config(config, &args, base_dir);
    let clock = TokioClock;
    let triggers =
        collect_triggers(client, &clock, &run_config.retry, config, &args, base_dir).await?;
    info!(tests = triggers.len(), "starting run");

    let reporter = ConsoleUploadReporter::new();
    let (abort_handle, abort_signal) = AbortSignal::new();
    let mut orchestrator = BatchOrchestrator::new(client, &clock, run_config)
        .with_reporter(&reporter)
        .with_metadata(Metadata::from_env(&environment.env))
        .with_abort_signal(abort_signal);

    let outcome = {
        let run = orchestrator.run(&triggers);
        tokio::pin!(run);
        tokio::select! {
            outcome = &mut run => outcome,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, stopping run");
                abort_handle.abort();
                run.await
            }
        }
    }?;

    print_outcome(&outcome);

    let csv_output = command.csv_output.or_else(|| config.csv_output.as_ref().map(PathBuf::from));
    if let Some(path) = csv_output {
        let path = resolve_relative(base_dir, &path);
        save_results_file(&path, &outcome.results)?;
        info!(path = %path.display(), "results written");
    }

    let code = outcome.exit_code(orchestrator.config());
    Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
}

/// Public ids win over a search query, which wins over test files.
async fn collect_triggers(
    api: &dyn SyntheticsApi,
    clock: &dyn Clock,
    retry: &RetryPolicy,
    config: &SyntheticsConfig,
    args: &RunTestsArgs,
    base_dir: &Path,
) -> Result<Vec<TriggerConfig>> {
    let triggers = resolve_public_ids(config, args);
    if !triggers.is_empty() {
        return Ok(triggers);
    }

    if let Some(query) = resolve_search_query(config, args) {
        return Ok(search_triggers(api, clock, retry, &query).await?);
    }

    let files = if args.files.is_empty() {
        &config.files
    } else {
        &args.files
    };
    let paths = find_test_files(base_dir, files)?;
    debug!(files = paths.len(), "found test files");
    load_trigger_configs(base_dir, &paths)
}

async fn upload_application(
    client: &ApiClient,
    config: &SyntheticsConfig,
    environment: &EnvironmentContext,
    command: UploadApplicationCommand,
) -> Result<ExitCode> {
    let args = UploadApplicationArgs {
        mobile_application_id: command.mobile_application_id,
        mobile_application_version_file_path: command.mobile_application_version_file_path,
        version_name: command.version_name,
        latest: command.latest,
    };
    let upload_config = resolve_upload_config(config, &args, &environment.base_dir);

    let clock = TokioClock;
    let uploader = AppUploader::new(client, &clock);
    let artifact = upload_application_version(&uploader, &upload_config).await?;

    println!(
        "{} {}",
        "Uploaded".green().bold(),
        artifact.file_name.cyan()
    );
    if let Some(uuid) = artifact
        .validation
        .valid_app_result
        .as_ref()
        .and_then(|r| r.app_version_uuid.as_deref())
    {
        println!("{} {}", "Version:".bold(), uuid);
    }
    Ok(ExitCode::SUCCESS)
}

fn resolve_path(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

fn resolve_relative(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
