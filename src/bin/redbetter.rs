//! Command-line entry point.

use clap::Parser;
use redbetter::api::{RedactedApi, TrackerApi};
use redbetter::cache::{Outcome, OutcomeCache};
use redbetter::config::Config;
use redbetter::formats::Format;
use redbetter::pipeline::candidates::{self, Candidate};
use redbetter::pipeline::prompt::StdinPrompter;
use redbetter::pipeline::{Pipeline, PipelineOptions};
use redbetter::tagging::MetaflacTagValidator;
use redbetter::transcode::CliTranscodeEngine;
use std::collections::HashSet;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Transcode seeded FLAC releases and publish the missing formats.
#[derive(Debug, Parser)]
#[command(name = "redbetter", version, about)]
struct Args {
    /// Release permalinks to process instead of the full seeding listing
    release_urls: Vec<String>,

    /// Publish at most one format per release
    #[arg(long)]
    single: bool,

    /// Configuration file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Outcome cache file
    #[arg(long, default_value = "cache.json")]
    cache: PathBuf,

    /// Override the configured encoder worker count
    #[arg(long)]
    threads: Option<usize>,

    /// Override the configured seeding page size
    #[arg(long)]
    page_size: Option<u32>,

    /// Produce these formats unconditionally (requires release URLs)
    #[arg(long = "force-format", value_name = "FORMAT")]
    force_format: Vec<String>,

    /// Reprocess candidates cached with these outcomes
    #[arg(long, value_name = "OUTCOME")]
    retry: Vec<String>,

    /// Stage torrents for manual upload instead of uploading
    #[arg(long)]
    no_upload: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "run failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> redbetter::Result<()> {
    let mut config = Config::load(&args.config)?;
    if let Some(threads) = args.threads {
        config.transcode.threads = threads;
    }
    if let Some(page_size) = args.page_size {
        config.tracker.page_size = page_size;
    }
    if args.no_upload {
        config.behaviour.upload = false;
    }

    let forced: Vec<Format> = args
        .force_format
        .iter()
        .map(|f| f.parse())
        .collect::<redbetter::Result<_>>()?;
    if !forced.is_empty() && args.release_urls.is_empty() {
        return Err(redbetter::Error::Config {
            message: "--force-format only applies to explicitly supplied release URLs".to_string(),
            key: None,
        });
    }
    let retry: HashSet<Outcome> = args
        .retry
        .iter()
        .map(|o| o.parse())
        .collect::<redbetter::Result<_>>()?;

    let engine = CliTranscodeEngine::discover(config.effective_threads())?;
    let cache = OutcomeCache::load(&args.cache)?;
    let api = Arc::new(RedactedApi::connect(&config.tracker).await?);

    let queue: Vec<Candidate> = if args.release_urls.is_empty() {
        candidates::discover(api.as_ref()).await?
    } else {
        args.release_urls
            .iter()
            .map(|url| candidates::parse_release_url(url))
            .collect::<redbetter::Result<_>>()?
    };

    let options = PipelineOptions {
        wanted: config.wanted_formats()?,
        forced,
        retry,
        single: args.single,
        upload: config.behaviour.upload,
        mislabel_policy: config.behaviour.mislabelled_24bit,
        piece_length: config.transcode.piece_length,
    };
    let mut pipeline = Pipeline::new(
        api,
        Arc::new(engine),
        Arc::new(MetaflacTagValidator),
        Arc::new(StdinPrompter),
        cache,
        config.directories.clone(),
        options,
    );

    let summary = pipeline.run(&queue).await?;
    println!(
        "Processed {} of {} candidates ({} already cached): {} published, {} skipped, {} failed",
        summary.processed,
        queue.len(),
        summary.skipped_cached,
        summary.published,
        summary.skipped,
        summary.failed,
    );
    Ok(())
}
