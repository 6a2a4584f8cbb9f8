use anyhow::{bail, Context, Result};
use auraframes::api::{AccountApi, ApiClient, ProxyImageFetcher};
use auraframes::aws::{CognitoExchange, CredentialLease, S3ObjectStore, SqsQueuePoller};
use auraframes::caption::{CaptionOptions, CaptionService};
use auraframes::config::Config;
use auraframes::device::AuraDevice;
use auraframes::export::{ExportOptions, ExportOrchestrator};
use auraframes::geocode::{GeocodeCache, NominatimGeocoder};
use auraframes::retry::RetryPolicy;
use auraframes::upload::{UploadOrchestrator, UploadPhoto};
use auraframes::BatchOutcome;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "auraframes", about = "Unofficial Aura photo-frame client", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download a frame's photos with embedded metadata
    Export {
        frame_id: String,
        /// Directory to export into
        #[arg(short, long, default_value = "./export")]
        output: PathBuf,
        /// Re-download photos that already exist on disk
        #[arg(long)]
        force: bool,
    },
    /// Upload local photos to a frame
    Upload {
        frame_id: String,
        /// Photo files to upload
        #[arg(required = true)]
        photos: Vec<PathBuf>,
    },
    /// Replace the caption on every photo of an album
    Caption {
        frame_id: String,
        playlist_id: String,
        /// Caption text
        caption: String,
        /// Append each photo's capture month, e.g. "(June 2023)"
        #[arg(long)]
        include_date: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load().context("Failed to load configuration")?;

    init_tracing(&config.log_level);

    let client = Arc::new(
        ApiClient::new(&config.api.base_url, config.request_timeout())
            .context("Failed to build API client")?,
    );
    AccountApi::new(client.clone())
        .login(&config.account)
        .await
        .context("Login failed")?;

    let device = Arc::new(AuraDevice::new(client, config.api.page_limit));
    let retry = RetryPolicy::from_config(&config.retry);

    // Ctrl+C cancels in-flight batches at their next suspension point.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling");
                cancel.cancel();
            }
        });
    }

    match cli.command {
        Command::Export {
            frame_id,
            output,
            force,
        } => {
            let http = reqwest::Client::builder()
                .user_agent(concat!("auraframes/", env!("CARGO_PKG_VERSION")))
                .build()
                .context("Failed to build HTTP client")?;
            let fetcher = Arc::new(ProxyImageFetcher::new(
                http.clone(),
                &config.api.image_proxy_base_url,
            ));
            let geocode = GeocodeCache::new(
                NominatimGeocoder::new(http, NominatimGeocoder::DEFAULT_BASE_URL),
                config.export.geocode_cache_size,
            );

            let orchestrator = ExportOrchestrator::new(device, fetcher, geocode, retry);
            let options = ExportOptions {
                destination: output,
                concurrency: config.export.download_concurrency,
                page_delay: config.page_delay(),
                force: force || config.export.force,
            };

            let report = orchestrator
                .export_frame(&frame_id, &options, &cancel)
                .await
                .context("Export failed")?;
            info!(directory = %report.directory.display(), "export written");
            finish(report.outcome)
        }
        Command::Upload { frame_id, photos } => {
            let upload_pool = config
                .aws
                .upload_identity_pool_id
                .as_deref()
                .context("aws.upload_identity_pool_id is required for upload")?;
            let sqs_pool = config
                .aws
                .sqs_identity_pool_id
                .as_deref()
                .context("aws.sqs_identity_pool_id is required for upload")?;

            let store = Arc::new(S3ObjectStore::new(
                CredentialLease::new(CognitoExchange::new(&config.aws.region, upload_pool).await),
                &config.aws.region,
            ));
            let queue = Arc::new(SqsQueuePoller::new(
                CredentialLease::new(CognitoExchange::new(&config.aws.region, sqs_pool).await),
                &config.aws.region,
            ));

            let mut staged = Vec::with_capacity(photos.len());
            for path in &photos {
                staged.push(
                    UploadPhoto::from_file(path)
                        .await
                        .with_context(|| format!("Could not read {}", path.display()))?,
                );
            }

            let orchestrator = UploadOrchestrator::new(device, store, queue, retry);
            finish(orchestrator.upload_batch(&frame_id, staged, &cancel).await)
        }
        Command::Caption {
            frame_id,
            playlist_id,
            caption,
            include_date,
        } => {
            let service = CaptionService::new(device, retry);
            let options = CaptionOptions {
                caption,
                include_date,
                concurrency: config.caption.concurrency,
                page_delay: config.page_delay(),
            };
            let outcome = service
                .caption_album(&frame_id, &playlist_id, &options, &cancel)
                .await
                .context("Captioning failed")?;
            finish(outcome)
        }
    }
}

/// Report a batch outcome and fail the process when any item failed.
fn finish<T>(outcome: BatchOutcome<T>) -> Result<()> {
    info!(
        succeeded = outcome.succeeded.len(),
        failed = outcome.failed.len(),
        "done"
    );
    for failure in &outcome.failed {
        warn!(item = %failure.item, error = %failure.error, "item failed");
    }
    if !outcome.is_complete_success() {
        bail!("{} item(s) failed", outcome.failed.len());
    }
    Ok(())
}

fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer())
        .init();
}
