//! Upload orchestration.
//!
//! Replays the mobile client's upload sequence for each photo:
//!
//! 1. `select_asset` with the client-generated local identifier, which
//!    creates the placeholder asset on the service;
//! 2. a mandatory drain of the frame's SQS client queue (the service gates
//!    later steps on the poll having happened; the messages themselves are
//!    discarded);
//! 3. `select_asset` again, confirming the association;
//! 4. the S3 object upload;
//! 5. `batch_update` with the object key and MD5, which finalizes the asset.
//!
//! A `number_failed > 0` from either select fails the photo before any
//! bytes are uploaded. Photos are processed one at a time, as the mobile
//! client does; failures are collected per photo and never abort the batch.

use crate::aws::s3::ObjectStore;
use crate::aws::sqs::QueuePoller;
use crate::device::DeviceApi;
use crate::error::{AuraError, BatchOutcome, Result};
use crate::exif;
use crate::models::{AssetRef, AssetUpdate};
use crate::retry::RetryPolicy;
use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// A local photo staged for upload.
#[derive(Debug, Clone)]
pub struct UploadPhoto {
    /// Client-generated identifier correlating the placeholder asset with
    /// the finalize call.
    pub local_identifier: String,
    pub data: Bytes,
    /// Extension without the dot, e.g. `jpg`.
    pub extension: String,
    pub taken_at: Option<DateTime<Utc>>,
    /// `(latitude, longitude)`
    pub location: Option<(f64, f64)>,
}

impl UploadPhoto {
    /// Stage a photo from disk. Capture time and GPS position are pulled
    /// from the file's EXIF block when present.
    pub async fn from_file(path: &Path) -> Result<Self> {
        let data = tokio::fs::read(path).await?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("jpg")
            .to_ascii_lowercase();

        let summary = exif::read_exif_summary(&data);
        let taken_at = summary
            .as_ref()
            .and_then(|s| s.date_time_original.as_deref().or(s.date_time.as_deref()))
            .and_then(parse_exif_datetime);
        let location = summary
            .as_ref()
            .and_then(|s| Some((s.latitude?, s.longitude?)));

        Ok(Self {
            // The mobile client sends uppercase UUIDs for local identifiers.
            local_identifier: Uuid::new_v4().to_string().to_uppercase(),
            data: Bytes::from(data),
            extension,
            taken_at,
            location,
        })
    }
}

/// A photo that reached the finalized state.
#[derive(Debug, Clone)]
pub struct UploadedAsset {
    pub local_identifier: String,
    /// Object key in the image bucket, now the asset's remote file name.
    pub file_name: String,
    pub md5_base64: String,
}

pub struct UploadOrchestrator {
    device: Arc<dyn DeviceApi>,
    store: Arc<dyn ObjectStore>,
    queue: Arc<dyn QueuePoller>,
    retry: RetryPolicy,
}

impl UploadOrchestrator {
    pub fn new(
        device: Arc<dyn DeviceApi>,
        store: Arc<dyn ObjectStore>,
        queue: Arc<dyn QueuePoller>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            device,
            store,
            queue,
            retry,
        }
    }

    /// Upload a batch of photos to a frame. Every photo ends up either in
    /// the outcome's successes or its failures; a cancelled batch records
    /// the unprocessed remainder as cancelled.
    #[instrument(skip(self, photos, cancel), fields(frame_id = %frame_id, count = photos.len()))]
    pub async fn upload_batch(
        &self,
        frame_id: &str,
        photos: Vec<UploadPhoto>,
        cancel: &CancellationToken,
    ) -> BatchOutcome<UploadedAsset> {
        let mut outcome = BatchOutcome::new();

        for photo in photos {
            let local_identifier = photo.local_identifier.clone();
            if cancel.is_cancelled() {
                outcome.record_failure(local_identifier, AuraError::Cancelled);
                continue;
            }

            match self.upload_one(frame_id, &photo, cancel).await {
                Ok(uploaded) => {
                    info!(
                        local_identifier = %uploaded.local_identifier,
                        file_name = %uploaded.file_name,
                        "photo finalized"
                    );
                    outcome.record_success(uploaded);
                }
                Err(e) => {
                    warn!(local_identifier = %local_identifier, error = %e, "photo failed");
                    outcome.record_failure(local_identifier, e);
                }
            }
        }

        info!(
            succeeded = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            "upload batch finished"
        );
        outcome
    }

    async fn upload_one(
        &self,
        frame_id: &str,
        photo: &UploadPhoto,
        cancel: &CancellationToken,
    ) -> Result<UploadedAsset> {
        let asset_ref = AssetRef::LocalIdentifier(photo.local_identifier.clone());

        self.select(frame_id, &asset_ref, cancel).await?;
        debug!(local_identifier = %photo.local_identifier, "placeholder asset selected");

        // Result intentionally discarded.
        self.retry
            .run("poll_frame_queue", cancel, || {
                self.queue.poll_frame_queue(frame_id)
            })
            .await?;

        self.select(frame_id, &asset_ref, cancel).await?;

        let stored = self
            .retry
            .run("put_image", cancel, || {
                self.store.put_image(photo.data.clone(), &photo.extension)
            })
            .await?;
        debug!(file_name = %stored.file_name, "object uploaded");

        let update = AssetUpdate {
            local_identifier: photo.local_identifier.clone(),
            file_name: stored.file_name.clone(),
            md5_hash: stored.md5_base64.clone(),
            taken_at: photo
                .taken_at
                .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true)),
            location: photo.location.map(|(lat, lon)| vec![lat, lon]),
        };
        self.retry
            .run("batch_update", cancel, || {
                self.device.batch_update(frame_id, update.clone())
            })
            .await?;

        Ok(UploadedAsset {
            local_identifier: photo.local_identifier.clone(),
            file_name: stored.file_name,
            md5_base64: stored.md5_base64,
        })
    }

    async fn select(
        &self,
        frame_id: &str,
        asset_ref: &AssetRef,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let number_failed = self
            .retry
            .run("select_asset", cancel, || {
                self.device.select_asset(frame_id, asset_ref)
            })
            .await?;
        if number_failed > 0 {
            return Err(AuraError::Api {
                status: 200,
                message: format!("service reported {number_failed} failed association(s)"),
            });
        }
        Ok(())
    }
}

/// Parse the EXIF `YYYY:MM:DD HH:MM:SS` timestamp as UTC.
fn parse_exif_datetime(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, "%Y:%m:%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}
