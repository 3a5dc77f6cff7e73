/// # modelcat CLI Interface (Module)
///
/// Command parsing and the glue between arguments and the core crate. The
/// `modelcat` binary exposes `setup`, `validate` and `upload` as
/// subcommands; `modelcat_setup`, `modelcat_validate` and `modelcat_upload`
/// parse the same argument groups standalone and route into the same
/// [`run`].
///
/// All behaviour lives in `modelcat-connector-core`; this module only
/// builds collaborators (AWS CLI, HTTP client, stdin prompter), prints the
/// transcript and maps failures to an exit code.
use crate::api::{ApiConfig, ModelCatClient};
use crate::load_config::load_settings;
use crate::logging::init_logging;
use crate::prompt::StdinPrompter;
use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use modelcat_connector_core::config::{PlatformConfig, PACKAGE_NAME};
use modelcat_connector_core::setup::{SetupInputs, SetupWizard};
use modelcat_connector_core::signature::{write_log, SIGNATURE_PREFIX};
use modelcat_connector_core::storage::AwsCli;
use modelcat_connector_core::upload::{DatasetUploader, UploadOptions};
use modelcat_connector_core::validate::{DatasetValidator, ValidateOptions};
use std::path::PathBuf;
use std::process::ExitCode;

const BANNER_WIDTH: usize = 100;

/// CLI for modelcat-connector: validate, sign and upload datasets.
#[derive(Parser, Debug)]
#[clap(
    name = "modelcat",
    version,
    about = "Validate, sign and upload datasets to the ModelCat platform"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// One-time setup: store platform credentials and configure the AWS CLI profile
    Setup(SetupArgs),
    /// Check a dataset directory and sign it when it passes
    Validate(ValidateArgs),
    /// Upload a validated dataset and register it on the platform
    Upload(UploadArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// Verbosity level: -v, -vv
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
    /// YAML file overriding connector settings
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct SetupArgs {
    /// Group ID; prompted for when omitted
    #[arg(long)]
    pub group_id: Option<String>,
    /// OAuth token; prompted for when omitted
    #[arg(long)]
    pub token: Option<String>,
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    /// Path to the root directory of the dataset.
    #[arg(short = 'd', long = "dataset_path", visible_alias = "dataset-path")]
    pub dataset_path: PathBuf,
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Args, Debug, Clone)]
pub struct UploadArgs {
    /// Path to the root directory of the dataset.
    #[arg(short = 'd', long = "dataset_path", visible_alias = "dataset-path")]
    pub dataset_path: PathBuf,
    /// Upload without checking the validation signature
    #[arg(long)]
    pub ignore_validation: bool,
    #[command(flatten)]
    pub common: CommonArgs,
}

impl Cli {
    pub fn common(&self) -> &CommonArgs {
        match &self.command {
            Commands::Setup(args) => &args.common,
            Commands::Validate(args) => &args.common,
            Commands::Upload(args) => &args.common,
        }
    }
}

/// `modelcat_setup`
#[derive(Parser, Debug)]
#[clap(name = "modelcat_setup", version, about = "ModelCat one-time setup wizard")]
pub struct SetupCli {
    #[command(flatten)]
    pub args: SetupArgs,
}

/// `modelcat_validate`
#[derive(Parser, Debug)]
#[clap(name = "modelcat_validate", version, about = "ModelCat dataset validation utility")]
pub struct ValidateCli {
    #[command(flatten)]
    pub args: ValidateArgs,
}

/// `modelcat_upload`
#[derive(Parser, Debug)]
#[clap(name = "modelcat_upload", version, about = "ModelCat dataset upload utility")]
pub struct UploadCli {
    #[command(flatten)]
    pub args: UploadArgs,
}

fn print_banner(tool: &str) {
    let title = format!(
        "{PACKAGE_NAME} (v{}) - {tool}",
        env!("CARGO_PKG_VERSION")
    );
    println!("{title:^BANNER_WIDTH$}");
    println!();
    println!("{}", "-".repeat(BANNER_WIDTH));
}

/// Load `.env`, install logging, run, and turn the outcome into an exit code.
pub async fn execute(cli: Cli) -> ExitCode {
    dotenvy::dotenv().ok();
    init_logging(cli.common().verbose);
    tracing::info!("CLI arguments parsed, invoking run");
    match run(cli).await {
        Ok(()) => {
            tracing::info!("CLI completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "CLI exited with error");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Extracted async CLI logic entrypoint for integration tests and the binaries.
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Setup(args) => run_setup(args).await,
        Commands::Validate(args) => run_validate(args),
        Commands::Upload(args) => run_upload(args).await,
    }
}

async fn run_setup(args: SetupArgs) -> Result<()> {
    print_banner("one-time setup wizard");
    let settings = load_settings(args.common.settings.as_ref())?;
    let storage = AwsCli::new();
    let prompter = StdinPrompter;
    let mut wizard = SetupWizard::new(&settings, &storage, &prompter);
    wizard.inputs = SetupInputs {
        group_id: args.group_id,
        oauth_token: args.token,
    };

    let api_url = settings.api_url.clone();
    let report = wizard
        .run(|token| {
            ModelCatClient::new(ApiConfig::new(api_url, Some(token.as_str().to_string())))
        })
        .await?;
    tracing::info!(
        group_id = %report.group_id,
        config = %report.config_path.display(),
        expires = %report.credentials_expire,
        "Setup complete"
    );
    Ok(())
}

fn run_validate(args: ValidateArgs) -> Result<()> {
    print_banner("dataset validation utility");
    // validation needs no platform settings, but a bad --settings file is still an error
    load_settings(args.common.settings.as_ref())?;
    tracing::info!(command = "validate", dataset = %args.dataset_path.display(), "Starting validation");

    let validator = DatasetValidator::new(
        &args.dataset_path,
        ValidateOptions {
            verbose: args.common.verbose > 0,
        },
    );
    let report = validator.validate()?;
    for finding in &report.findings {
        println!("{finding}");
    }
    println!();
    println!("{}", report.summary());

    let log_path = write_log(&args.dataset_path, &report)
        .with_context(|| format!("Failed to write validator log in {}", args.dataset_path.display()))?;
    tracing::info!(log = %log_path.display(), "Validator log written");

    match &report.signature {
        Some(signature) => {
            println!("{SIGNATURE_PREFIX}{signature}");
            Ok(())
        }
        None => bail!(
            "dataset validation failed with {} critical error(s)",
            report.errors()
        ),
    }
}

async fn run_upload(args: UploadArgs) -> Result<()> {
    print_banner("dataset upload utility");
    let settings = load_settings(args.common.settings.as_ref())?;
    let platform = PlatformConfig::load(&settings.config_dir()?)?;
    tracing::info!(group_id = %platform.group_id, "Loaded platform config");

    let storage = AwsCli::new();
    let uploader = DatasetUploader::prepare(
        &args.dataset_path,
        &platform,
        &settings,
        &storage,
        UploadOptions {
            ignore_validation: args.ignore_validation,
            ..UploadOptions::default()
        },
    )
    .await?;

    let api = ModelCatClient::new(ApiConfig::new(
        settings.api_url.clone(),
        Some(platform.oauth_token.clone()),
    ))?;
    let report = uploader.upload(&api).await?;

    println!("{}", "-".repeat(BANNER_WIDTH));
    println!(
        "Dataset uploaded with uuid '{}'. You can view your dataset at: {}",
        report.dataset_uuid, report.dataset_url
    );
    Ok(())
}
