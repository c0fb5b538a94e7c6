use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use loadcast_core::object_store::bucket_store_from_env;
use loadcast_core::sample_data::{fetch_sample_data, FetchOutcome, SAMPLE_BUCKET};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Loadcast administrative tooling", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download the public household electricity dataset
    FetchSampleData(FetchSampleDataArgs),
}

#[derive(Args, Debug)]
struct FetchSampleDataArgs {
    /// Directory receiving the archive
    #[arg(long, default_value = ".")]
    dest: PathBuf,
    /// Extract the archive after downloading
    #[arg(long)]
    extract: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::FetchSampleData(args) => handle_fetch_sample_data(args).await,
    }
}

async fn handle_fetch_sample_data(args: FetchSampleDataArgs) -> Result<()> {
    dotenvy::dotenv().ok();

    std::fs::create_dir_all(&args.dest)
        .with_context(|| format!("failed to create {}", args.dest.display()))?;

    let store = bucket_store_from_env(SAMPLE_BUCKET)
        .await
        .context("failed to configure object store")?;

    match fetch_sample_data(store.as_ref(), &args.dest, args.extract).await? {
        FetchOutcome::AlreadyPresent(path) => {
            println!("{} already present, nothing to do.", path.display());
        }
        FetchOutcome::ExtractedExisting(archive) => {
            println!("Extracted existing {}.", archive.display());
        }
        FetchOutcome::Downloaded { archive, extracted } => {
            info!(archive = %archive.display(), extracted, "sample data ready");
            println!("Downloaded {}.", archive.display());
            if !extracted {
                println!("Run again with --extract to unpack the archive.");
            }
        }
    }

    Ok(())
}
