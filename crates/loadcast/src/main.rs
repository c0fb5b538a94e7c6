use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use loadcast_core::config::PipelineConfig;
use loadcast_core::jobs::{run_postprocess, run_preprocess};
use loadcast_core::object_store::{bucket_store_from_env, S3Location};
use loadcast_core::trigger::{dispatch, StorageNotification};
use loadcast_core::workflow::StepFunctionsStarter;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_SCRATCH_DIR: &str = "/tmp";

#[derive(Parser, Debug)]
#[command(author, version, about = "Household load forecasting pipeline steps", long_about = None)]
struct Cli {
    /// Pipeline config (TOML); falls back to LOADCAST_CONFIG, then built-in defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Local working directory; falls back to LOADCAST_SCRATCH_DIR, then /tmp
    #[arg(long, global = true)]
    scratch_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Window a raw dataset archive into training and test JSON lines
    Preprocess(PreprocessArgs),
    /// Flatten batch-transform forecasts into per-file CSV tables
    Postprocess(PostprocessArgs),
    /// Start one workflow execution for an object-created notification
    Trigger(TriggerArgs),
}

#[derive(Args, Debug)]
struct PreprocessArgs {
    /// Bucket holding the raw archive and receiving the JSON datasets
    #[arg(long)]
    bucket: String,
    /// Object key of the raw zip archive
    #[arg(long)]
    fileuri: String,
}

#[derive(Args, Debug)]
struct PostprocessArgs {
    /// Batch-transform output location, `s3://bucket/prefix`
    #[arg(long)]
    forecastdir: String,
}

#[derive(Args, Debug, Default)]
struct TriggerArgs {
    /// Notification JSON file; read from stdin when omitted
    #[arg(long)]
    event: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let scratch = cli
        .scratch_dir
        .or_else(|| std::env::var_os("LOADCAST_SCRATCH_DIR").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SCRATCH_DIR));

    match cli.command {
        Command::Preprocess(args) => handle_preprocess(args, &scratch, &config).await,
        Command::Postprocess(args) => handle_postprocess(args, &scratch, &config).await,
        Command::Trigger(args) => handle_trigger(args, &config).await,
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let from_env = std::env::var_os("LOADCAST_CONFIG").map(PathBuf::from);
    let path = path.map(Path::to_path_buf).or(from_env);
    PipelineConfig::load(path.as_deref()).context("failed to load pipeline config")
}

async fn handle_preprocess(
    args: PreprocessArgs,
    scratch: &Path,
    config: &PipelineConfig,
) -> Result<()> {
    let store = bucket_store_from_env(&args.bucket)
        .await
        .context("failed to configure object store")?;
    let report = run_preprocess(store.as_ref(), &args.fileuri, scratch, config).await?;
    info!(
        bucket = %args.bucket,
        fileuri = %args.fileuri,
        entities = report.entity_count,
        train_windows = report.train_windows,
        test_windows = report.test_windows,
        uploaded = report.uploaded_keys.len(),
        "preprocess complete"
    );
    Ok(())
}

async fn handle_postprocess(
    args: PostprocessArgs,
    scratch: &Path,
    config: &PipelineConfig,
) -> Result<()> {
    let location: S3Location = args
        .forecastdir
        .parse()
        .context("invalid --forecastdir")?;
    let store = bucket_store_from_env(&location.bucket)
        .await
        .context("failed to configure object store")?;
    let report = run_postprocess(store.as_ref(), &location.prefix, scratch, config).await?;
    info!(
        location = %location,
        files = report.files_processed,
        rows = report.rows_written,
        uploaded = report.uploaded_keys.len(),
        "postprocess complete"
    );
    Ok(())
}

async fn handle_trigger(args: TriggerArgs, config: &PipelineConfig) -> Result<()> {
    let content = match &args.event {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read notification from stdin")?;
            buffer
        }
    };

    let notification =
        StorageNotification::from_json(&content).context("invalid storage notification")?;
    let starter = StepFunctionsStarter::from_env()
        .await
        .context("failed to configure workflow client")?;
    let output = dispatch(
        &starter,
        &notification,
        chrono::Utc::now(),
        &config.trigger.resource_prefix,
    )
    .await?;

    println!("{output}");
    Ok(())
}
